//! # Error Taxonomy
//!
//! Purpose: One error type for the whole client, classified so callers (and
//! the retry layer) can tell transport faults from protocol faults from
//! answers the server gave on purpose.
//!
//! ## Classes
//! 1. **Transport**: the socket failed. Counts against endpoint health.
//! 2. **Protocol**: bytes arrived but were malformed. Not retried.
//! 3. **Application**: the server answered (not found, explicit error).
//! 4. **Pool**: no endpoint could be handed out.
//! 5. **Usage**: bad input from the caller (config, address, request).

use thiserror::Error;

use crate::codes::MessageCode;

/// Result type shared by all ClusterKV crates.
pub type CkvResult<T> = Result<T, CkvError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum CkvError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not open a connection to the endpoint.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Read deadline passed before any byte of the frame arrived.
    #[error("read timeout")]
    ReadTimeout,

    /// Write deadline passed before any byte of the frame was sent.
    #[error("write timeout")]
    WriteTimeout,

    /// The endpoint has no open socket.
    #[error("endpoint {0} is not connected")]
    NotConnected(String),

    /// Length prefix of zero.
    #[error("length response 0")]
    ZeroLength,

    /// Length prefix larger than the client accepts.
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    /// Frame body too short to hold its header.
    #[error("corrupt header")]
    CorruptHeader,

    /// Code byte outside the message table.
    #[error("no such command: {0}")]
    UnknownMessageCode(u8),

    /// Response code does not answer the request that was sent.
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: MessageCode,
        actual: MessageCode,
    },

    /// Payload could not be decoded as the message its code announced.
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Get-style request answered with an empty body.
    #[error("object not found")]
    ObjectNotFound,

    /// Object exists but carries no sibling to operate on.
    #[error("object has no content")]
    NoContent,

    /// Server answered with an error frame.
    #[error("server error {code}: {message}")]
    Server { code: u32, message: String },

    /// No endpoint is eligible for selection.
    #[error("all nodes down")]
    AllNodesDown,

    /// The pool holds no endpoints at all.
    #[error("zero nodes in pool")]
    ZeroNodes,

    /// The client was already closed.
    #[error("client has been closed")]
    Closed,

    /// Address could not be resolved into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Configuration failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Caller asked for something the protocol cannot express.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse classification of a [`CkvError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Application,
    Pool,
    Usage,
}

impl CkvError {
    /// Returns the class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CkvError::Io(_)
            | CkvError::Connect { .. }
            | CkvError::ReadTimeout
            | CkvError::WriteTimeout
            | CkvError::NotConnected(_) => ErrorKind::Transport,
            CkvError::ZeroLength
            | CkvError::FrameTooLarge(_)
            | CkvError::CorruptHeader
            | CkvError::UnknownMessageCode(_)
            | CkvError::UnexpectedResponse { .. }
            | CkvError::Decode(_) => ErrorKind::Protocol,
            CkvError::ObjectNotFound | CkvError::NoContent | CkvError::Server { .. } => {
                ErrorKind::Application
            }
            CkvError::AllNodesDown | CkvError::ZeroNodes | CkvError::Closed => ErrorKind::Pool,
            CkvError::InvalidAddress(_)
            | CkvError::InvalidConfig(_)
            | CkvError::InvalidRequest(_) => ErrorKind::Usage,
        }
    }

    /// True for timeouts that left the stream untouched.
    ///
    /// These are the only errors a retry policy may repeat.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CkvError::ReadTimeout | CkvError::WriteTimeout)
    }

    /// True when the error should count against endpoint health.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert_eq!(CkvError::ReadTimeout.kind(), ErrorKind::Transport);
        assert_eq!(CkvError::ZeroLength.kind(), ErrorKind::Protocol);
        assert_eq!(CkvError::ObjectNotFound.kind(), ErrorKind::Application);
        assert_eq!(CkvError::NoContent.kind(), ErrorKind::Application);
        assert_eq!(CkvError::AllNodesDown.kind(), ErrorKind::Pool);
        assert_eq!(
            CkvError::InvalidConfig("x".into()).kind(),
            ErrorKind::Usage
        );
    }

    #[test]
    fn only_timeouts_are_retryable() {
        assert!(CkvError::ReadTimeout.is_retryable());
        assert!(CkvError::WriteTimeout.is_retryable());
        assert!(!CkvError::ObjectNotFound.is_retryable());
        assert!(!CkvError::Io(std::io::ErrorKind::BrokenPipe.into()).is_retryable());
        assert!(!CkvError::UnknownMessageCode(99).is_retryable());
    }

    #[test]
    fn server_error_display() {
        let err = CkvError::Server {
            code: 7,
            message: "overload".into(),
        };
        assert_eq!(err.to_string(), "server error 7: overload");
    }
}
