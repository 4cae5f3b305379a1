//! # Protobuf Payloads
//!
//! Purpose: Typed payloads for every message in the code table, derived with
//! `prost` so they encode to exactly the bytes the server's proto2 schema
//! expects.
//!
//! Field tags mirror the server's `.proto` definitions and are part of the
//! wire contract. Messages with no fields (ping, list buckets, ...) have no
//! struct here; their frames carry an empty payload.

use prost::Message;

use crate::codes::MessageCode;

/// Server-side error, carried by code 0.
#[derive(Clone, PartialEq, Message)]
pub struct RpbErrorResp {
    #[prost(bytes = "vec", required, tag = "1")]
    pub errmsg: Vec<u8>,
    #[prost(uint32, required, tag = "2")]
    pub errcode: u32,
}

/// Generic key/value pair (user metadata, index entries, search fields).
#[derive(Clone, PartialEq, Message)]
pub struct RpbPair {
    #[prost(bytes = "vec", required, tag = "1")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub value: Option<Vec<u8>>,
}

/// Link from one object to another.
#[derive(Clone, PartialEq, Message)]
pub struct RpbLink {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub bucket: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub tag: Option<Vec<u8>>,
}

/// One sibling of a stored object.
#[derive(Clone, PartialEq, Message)]
pub struct RpbContent {
    #[prost(bytes = "vec", required, tag = "1")]
    pub value: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub content_type: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub charset: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub content_encoding: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub vtag: Option<Vec<u8>>,
    #[prost(message, repeated, tag = "6")]
    pub links: Vec<RpbLink>,
    #[prost(uint32, optional, tag = "7")]
    pub last_mod: Option<u32>,
    #[prost(uint32, optional, tag = "8")]
    pub last_mod_usecs: Option<u32>,
    #[prost(message, repeated, tag = "9")]
    pub usermeta: Vec<RpbPair>,
    #[prost(message, repeated, tag = "10")]
    pub indexes: Vec<RpbPair>,
    #[prost(bool, optional, tag = "11")]
    pub deleted: Option<bool>,
}

impl RpbContent {
    /// Content with an explicit content type.
    pub fn with_type(value: impl Into<Vec<u8>>, content_type: &str) -> Self {
        RpbContent {
            value: value.into(),
            content_type: Some(content_type.as_bytes().to_vec()),
            ..Default::default()
        }
    }

    /// Plain text content.
    pub fn text(value: impl Into<String>) -> Self {
        Self::with_type(value.into().into_bytes(), "text/plain")
    }

    /// JSON document content; the caller supplies already-encoded JSON.
    pub fn json(value: impl Into<Vec<u8>>) -> Self {
        Self::with_type(value, "application/json")
    }

    /// Opaque binary content.
    pub fn binary(value: impl Into<Vec<u8>>) -> Self {
        Self::with_type(value, "application/octet-stream")
    }

    /// Adds a secondary index entry (`name` should end in `_bin` or `_int`).
    pub fn add_index(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        self.indexes.push(RpbPair {
            key: name.as_bytes().to_vec(),
            value: Some(value.into()),
        });
    }

    /// Adds a link to `bucket/key` with `tag`.
    pub fn add_link(&mut self, bucket: &str, key: &str, tag: &str) {
        self.links.push(RpbLink {
            bucket: Some(bucket.as_bytes().to_vec()),
            key: Some(key.as_bytes().to_vec()),
            tag: Some(tag.as_bytes().to_vec()),
        });
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbGetClientIdResp {
    #[prost(bytes = "vec", required, tag = "1")]
    pub client_id: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbSetClientIdReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub client_id: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbGetServerInfoResp {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub node: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub server_version: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbGetReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub key: Vec<u8>,
    #[prost(uint32, optional, tag = "3")]
    pub r: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub pr: Option<u32>,
    #[prost(bool, optional, tag = "5")]
    pub basic_quorum: Option<bool>,
    #[prost(bool, optional, tag = "6")]
    pub notfound_ok: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub if_modified: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "8")]
    pub head: Option<bool>,
    #[prost(bool, optional, tag = "9")]
    pub deletedvclock: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbGetResp {
    #[prost(message, repeated, tag = "1")]
    pub content: Vec<RpbContent>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub vclock: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "3")]
    pub unchanged: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbPutReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub vclock: Option<Vec<u8>>,
    #[prost(message, optional, tag = "4")]
    pub content: Option<RpbContent>,
    #[prost(uint32, optional, tag = "5")]
    pub w: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub dw: Option<u32>,
    #[prost(bool, optional, tag = "7")]
    pub return_body: Option<bool>,
    #[prost(uint32, optional, tag = "8")]
    pub pw: Option<u32>,
    #[prost(bool, optional, tag = "9")]
    pub if_not_modified: Option<bool>,
    #[prost(bool, optional, tag = "10")]
    pub if_none_match: Option<bool>,
    #[prost(bool, optional, tag = "11")]
    pub return_head: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbPutResp {
    #[prost(message, repeated, tag = "1")]
    pub content: Vec<RpbContent>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub vclock: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub key: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbDelReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub key: Vec<u8>,
    #[prost(uint32, optional, tag = "3")]
    pub rw: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub vclock: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "5")]
    pub r: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub w: Option<u32>,
    #[prost(uint32, optional, tag = "7")]
    pub pr: Option<u32>,
    #[prost(uint32, optional, tag = "8")]
    pub pw: Option<u32>,
    #[prost(uint32, optional, tag = "9")]
    pub dw: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbListBucketsResp {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub buckets: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbListKeysReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
}

/// One page of a key listing; the last page carries `done = true`.
#[derive(Clone, PartialEq, Message)]
pub struct RpbListKeysResp {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub keys: Vec<Vec<u8>>,
    #[prost(bool, optional, tag = "2")]
    pub done: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbBucketProps {
    #[prost(uint32, optional, tag = "1")]
    pub n_val: Option<u32>,
    #[prost(bool, optional, tag = "2")]
    pub allow_mult: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbGetBucketReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbGetBucketResp {
    #[prost(message, optional, tag = "1")]
    pub props: Option<RpbBucketProps>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbSetBucketReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub props: Option<RpbBucketProps>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbMapRedReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub request: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub content_type: Vec<u8>,
}

/// One phase output of a map/reduce job; the last frame carries `done = true`.
#[derive(Clone, PartialEq, Message)]
pub struct RpbMapRedResp {
    #[prost(uint32, optional, tag = "1")]
    pub phase: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub response: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "3")]
    pub done: Option<bool>,
}

/// Secondary index query shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum IndexQueryType {
    Eq = 0,
    Range = 1,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbIndexReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub index: Vec<u8>,
    #[prost(enumeration = "IndexQueryType", required, tag = "3")]
    pub qtype: i32,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub range_min: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub range_max: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbIndexResp {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub keys: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbSearchQueryReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub q: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub index: Vec<u8>,
    #[prost(uint32, optional, tag = "3")]
    pub rows: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub start: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub sort: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub filter: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub df: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub op: Option<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "9")]
    pub fl: Vec<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "10")]
    pub presort: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbSearchDoc {
    #[prost(message, repeated, tag = "1")]
    pub fields: Vec<RpbPair>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpbSearchQueryResp {
    #[prost(message, repeated, tag = "1")]
    pub docs: Vec<RpbSearchDoc>,
    #[prost(float, optional, tag = "2")]
    pub max_score: Option<f32>,
    #[prost(uint32, optional, tag = "3")]
    pub num_found: Option<u32>,
}

// ============================================================================
// REQUEST / RESPONSE UNIONS
// ============================================================================

/// Every request the client can send, each with its typed payload.
///
/// The code byte is derived from the variant, so a request can never be
/// framed under the wrong code.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping,
    GetClientId,
    SetClientId(RpbSetClientIdReq),
    GetServerInfo,
    Get(RpbGetReq),
    Put(RpbPutReq),
    Delete(RpbDelReq),
    ListBuckets,
    ListKeys(RpbListKeysReq),
    GetBucket(RpbGetBucketReq),
    SetBucket(RpbSetBucketReq),
    MapReduce(RpbMapRedReq),
    Index(RpbIndexReq),
    Search(RpbSearchQueryReq),
}

impl Request {
    /// Wire code for this request.
    pub const fn code(&self) -> MessageCode {
        match self {
            Request::Ping => MessageCode::PingReq,
            Request::GetClientId => MessageCode::GetClientIdReq,
            Request::SetClientId(_) => MessageCode::SetClientIdReq,
            Request::GetServerInfo => MessageCode::GetServerInfoReq,
            Request::Get(_) => MessageCode::GetReq,
            Request::Put(_) => MessageCode::PutReq,
            Request::Delete(_) => MessageCode::DelReq,
            Request::ListBuckets => MessageCode::ListBucketsReq,
            Request::ListKeys(_) => MessageCode::ListKeysReq,
            Request::GetBucket(_) => MessageCode::GetBucketReq,
            Request::SetBucket(_) => MessageCode::SetBucketReq,
            Request::MapReduce(_) => MessageCode::MapRedReq,
            Request::Index(_) => MessageCode::IndexReq,
            Request::Search(_) => MessageCode::SearchQueryReq,
        }
    }

    /// Serialized payload (empty for field-less requests).
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Request::Ping
            | Request::GetClientId
            | Request::GetServerInfo
            | Request::ListBuckets => Vec::new(),
            Request::SetClientId(msg) => msg.encode_to_vec(),
            Request::Get(msg) => msg.encode_to_vec(),
            Request::Put(msg) => msg.encode_to_vec(),
            Request::Delete(msg) => msg.encode_to_vec(),
            Request::ListKeys(msg) => msg.encode_to_vec(),
            Request::GetBucket(msg) => msg.encode_to_vec(),
            Request::SetBucket(msg) => msg.encode_to_vec(),
            Request::MapReduce(msg) => msg.encode_to_vec(),
            Request::Index(msg) => msg.encode_to_vec(),
            Request::Search(msg) => msg.encode_to_vec(),
        }
    }
}

/// Literal returned for empty-bodied success responses.
pub const SUCCESS_SENTINEL: &[u8] = b"Success";

/// Literal returned for a ping response.
pub const PONG_SENTINEL: &[u8] = b"Pong";

/// Every response the client can decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Pong,
    ClientId(RpbGetClientIdResp),
    ClientIdSet,
    ServerInfo(RpbGetServerInfoResp),
    Object(RpbGetResp),
    /// `None` when the server signalled success with an empty body.
    Stored(Option<RpbPutResp>),
    Deleted,
    Buckets(RpbListBucketsResp),
    Keys(RpbListKeysResp),
    BucketProps(RpbGetBucketResp),
    BucketSet,
    MapReduce(RpbMapRedResp),
    Index(RpbIndexResp),
    Search(RpbSearchQueryResp),
}

impl Response {
    /// Wire code this response was decoded from.
    pub const fn code(&self) -> MessageCode {
        match self {
            Response::Pong => MessageCode::PingResp,
            Response::ClientId(_) => MessageCode::GetClientIdResp,
            Response::ClientIdSet => MessageCode::SetClientIdResp,
            Response::ServerInfo(_) => MessageCode::GetServerInfoResp,
            Response::Object(_) => MessageCode::GetResp,
            Response::Stored(_) => MessageCode::PutResp,
            Response::Deleted => MessageCode::DelResp,
            Response::Buckets(_) => MessageCode::ListBucketsResp,
            Response::Keys(_) => MessageCode::ListKeysResp,
            Response::BucketProps(_) => MessageCode::GetBucketResp,
            Response::BucketSet => MessageCode::SetBucketResp,
            Response::MapReduce(_) => MessageCode::MapRedResp,
            Response::Index(_) => MessageCode::IndexResp,
            Response::Search(_) => MessageCode::SearchQueryResp,
        }
    }

    /// Sentinel literal for responses that carry no payload.
    pub const fn sentinel(&self) -> Option<&'static [u8]> {
        match self {
            Response::Pong => Some(PONG_SENTINEL),
            Response::ClientIdSet
            | Response::Stored(None)
            | Response::Deleted
            | Response::BucketSet => Some(SUCCESS_SENTINEL),
            _ => None,
        }
    }
}
