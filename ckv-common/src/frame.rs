//! # Wire Framing
//!
//! Purpose: Encode requests into length-prefixed frames and validate the
//! pieces of a frame as they come off the socket.
//!
//! ## Layout
//! ```text
//! +----------------+--------------+-------------------+
//! | length: u32 BE | code: u8     | payload: N bytes  |
//! +----------------+--------------+-------------------+
//!             length = 1 + len(payload)
//! ```
//!
//! ## Design Principles
//! 1. **Caller-Owned Buffers**: Encoding appends into a `BytesMut` the caller
//!    can reuse between requests.
//! 2. **Split Validation**: The 4-byte header is checked before the body is
//!    read, so a bogus length never triggers a huge allocation.
//! 3. **Fail Fast**: Zero length, oversize length, empty body and unknown
//!    codes are protocol errors.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codes::MessageCode;
use crate::error::{CkvError, CkvResult};

/// Size of the big-endian length prefix.
pub const HEADER_LEN: usize = 4;

/// Largest body (code byte + payload) the client will read.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// One decoded frame: message code plus raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: MessageCode,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(code: MessageCode, payload: impl Into<Bytes>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    /// Frame with no payload (ping, list buckets, sentinel responses).
    pub fn empty(code: MessageCode) -> Self {
        Self::new(code, Bytes::new())
    }

    /// Appends the wire form of this frame to `out`.
    pub fn encode(&self, out: &mut BytesMut) -> CkvResult<()> {
        encode_frame(self.code, &self.payload, out)
    }

    /// Wire form as a fresh buffer.
    pub fn to_bytes(&self) -> CkvResult<Bytes> {
        let mut out = BytesMut::with_capacity(HEADER_LEN + 1 + self.payload.len());
        self.encode(&mut out)?;
        Ok(out.freeze())
    }
}

/// Appends `u32_be(1 + len(payload)) || code || payload` to `out`.
///
/// Payloads the peer would refuse as oversize are rejected and leave `out`
/// untouched.
pub fn encode_frame(code: MessageCode, payload: &[u8], out: &mut BytesMut) -> CkvResult<()> {
    if payload.len() >= MAX_FRAME_LEN {
        return Err(CkvError::InvalidRequest(format!(
            "{} payload of {} bytes exceeds the maximum frame size",
            code,
            payload.len()
        )));
    }
    out.reserve(HEADER_LEN + 1 + payload.len());
    out.put_u32(1 + payload.len() as u32);
    out.put_u8(code.as_u8());
    out.put_slice(payload);
    Ok(())
}

/// Validates a length prefix and returns the body size it announces.
pub fn parse_length(header: [u8; HEADER_LEN]) -> CkvResult<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len == 0 {
        return Err(CkvError::ZeroLength);
    }
    if len > MAX_FRAME_LEN {
        return Err(CkvError::FrameTooLarge(len));
    }
    Ok(len)
}

/// Splits a frame body (code byte + payload) into a [`Frame`].
pub fn decode_body(mut body: Bytes) -> CkvResult<Frame> {
    if body.is_empty() {
        return Err(CkvError::CorruptHeader);
    }
    let raw = body[0];
    let code = MessageCode::from_u8(raw).ok_or(CkvError::UnknownMessageCode(raw))?;
    let payload = body.split_off(1);
    Ok(Frame { code, payload })
}

/// Decodes one complete wire frame held in memory (header included).
pub fn decode_frame(buf: &[u8]) -> CkvResult<Frame> {
    if buf.len() < HEADER_LEN {
        return Err(CkvError::CorruptHeader);
    }
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&buf[..HEADER_LEN]);
    let len = parse_length(header)?;
    let body = &buf[HEADER_LEN..];
    if body.len() != len {
        return Err(CkvError::CorruptHeader);
    }
    decode_body(Bytes::copy_from_slice(body))
}
