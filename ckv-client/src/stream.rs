//! # Streaming Responses
//!
//! Purpose: Reassemble the multi-frame answers of list-keys and map/reduce
//! into one result.
//!
//! ## Design Principles
//! 1. **Same Connection**: Continuation frames are read from the lease that
//!    sent the request; no further request is written.
//! 2. **All or Nothing**: A read or decode failure before the `done` frame
//!    drops everything accumulated so far.
//! 3. **Server Order**: Items are returned in the order they arrived.

use bytes::Bytes;
use ckv_common::{
    decode_response, CkvError, CkvResult, Frame, MessageCode, Response, RpbListKeysResp,
    RpbMapRedResp,
};

/// One frame of a streaming response.
pub trait StreamChunk: Sized {
    /// What each frame contributes to the final result.
    type Item;

    /// Request code that starts this stream.
    const REQUEST: MessageCode;

    /// Extracts the chunk from a decoded response.
    fn from_response(response: Response) -> CkvResult<Self>;

    /// True on the last frame of the stream.
    fn is_done(&self) -> bool;

    fn into_items(self) -> Vec<Self::Item>;
}

impl StreamChunk for RpbListKeysResp {
    type Item = Vec<u8>;
    const REQUEST: MessageCode = MessageCode::ListKeysReq;

    fn from_response(response: Response) -> CkvResult<Self> {
        match response {
            Response::Keys(keys) => Ok(keys),
            other => Err(CkvError::UnexpectedResponse {
                expected: MessageCode::ListKeysResp,
                actual: other.code(),
            }),
        }
    }

    fn is_done(&self) -> bool {
        self.done.unwrap_or(false)
    }

    fn into_items(self) -> Vec<Vec<u8>> {
        self.keys
    }
}

/// Output of one map/reduce phase frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRedChunk {
    pub phase: Option<u32>,
    pub response: Vec<u8>,
}

impl StreamChunk for RpbMapRedResp {
    type Item = MapRedChunk;
    const REQUEST: MessageCode = MessageCode::MapRedReq;

    fn from_response(response: Response) -> CkvResult<Self> {
        match response {
            Response::MapReduce(chunk) => Ok(chunk),
            other => Err(CkvError::UnexpectedResponse {
                expected: MessageCode::MapRedResp,
                actual: other.code(),
            }),
        }
    }

    fn is_done(&self) -> bool {
        self.done.unwrap_or(false)
    }

    fn into_items(self) -> Vec<MapRedChunk> {
        // the terminating frame usually carries no phase output
        match self.response {
            Some(response) => vec![MapRedChunk {
                phase: self.phase,
                response,
            }],
            None => Vec::new(),
        }
    }
}

/// Ordered accumulator for one streaming operation.
#[derive(Debug)]
pub struct ResponseAggregator<T> {
    items: Vec<T>,
    done: bool,
}

impl<T> ResponseAggregator<T> {
    pub fn new() -> Self {
        ResponseAggregator {
            items: Vec::new(),
            done: false,
        }
    }

    /// Appends the items of `chunk`; returns true once the stream is done.
    pub fn push<C: StreamChunk<Item = T>>(&mut self, chunk: C) -> bool {
        self.done = chunk.is_done();
        self.items.extend(chunk.into_items());
        self.done
    }

    /// Appends one raw payload.
    pub fn push_item(&mut self, item: T, done: bool) -> bool {
        self.items.push(item);
        self.done = done;
        self.done
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> Default for ResponseAggregator<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads frames from `next` until the done frame, collecting typed items.
pub fn collect_chunks<C, F>(mut next: F) -> CkvResult<Vec<C::Item>>
where
    C: StreamChunk,
    F: FnMut() -> CkvResult<Frame>,
{
    let mut aggregator = ResponseAggregator::new();
    loop {
        let frame = next()?;
        let chunk = C::from_response(decode_response(&frame, C::REQUEST)?)?;
        if aggregator.push(chunk) {
            return Ok(aggregator.into_items());
        }
    }
}

fn collect_payloads<C, F>(mut next: F) -> CkvResult<Vec<Bytes>>
where
    C: StreamChunk,
    F: FnMut() -> CkvResult<Frame>,
{
    let mut aggregator = ResponseAggregator::new();
    loop {
        let frame = next()?;
        let chunk = C::from_response(decode_response(&frame, C::REQUEST)?)?;
        if aggregator.push_item(frame.payload, chunk.is_done()) {
            return Ok(aggregator.into_items());
        }
    }
}

/// Reads frames from `next` until the done frame, keeping each raw payload.
pub fn collect_raw<F>(request: MessageCode, next: F) -> CkvResult<Vec<Bytes>>
where
    F: FnMut() -> CkvResult<Frame>,
{
    match request {
        MessageCode::ListKeysReq => collect_payloads::<RpbListKeysResp, _>(next),
        MessageCode::MapRedReq => collect_payloads::<RpbMapRedResp, _>(next),
        other => Err(CkvError::InvalidRequest(format!(
            "{} does not have a streaming response",
            other
        ))),
    }
}
