// codes.rs - message code table for the ClusterKV wire protocol
//
// Every frame on the wire carries a single code byte right after the length
// prefix. The code names the semantic type of the payload that follows.
//
// ============================================================================
// WIRE CONTRACT
// ============================================================================
//
// The table below is fixed per protocol version and must match the server's
// table byte for byte. It is not negotiated at runtime:
//
//   0        error response (errcode + errmsg)
//   1 / 2    ping request / response
//   3 / 4    get client id
//   5 / 6    set client id
//   7 / 8    get server info
//   9 / 10   get object
//   11 / 12  put object
//   13 / 14  delete object
//   15 / 16  list buckets
//   17 / 18  list keys            (streaming response)
//   19 / 20  get bucket props
//   21 / 22  set bucket props
//   23 / 24  map/reduce           (streaming response)
//   25 / 26  secondary index query
//   27 / 28  search query
//
// Requests are odd, responses are even, and each request's response is the
// next code up. Code 0 can answer any request.

/// Error response (server-side failure with errcode + errmsg).
pub const CODE_ERROR_RESP: u8 = 0;
pub const CODE_PING_REQ: u8 = 1;
pub const CODE_PING_RESP: u8 = 2;
pub const CODE_GET_CLIENT_ID_REQ: u8 = 3;
pub const CODE_GET_CLIENT_ID_RESP: u8 = 4;
pub const CODE_SET_CLIENT_ID_REQ: u8 = 5;
pub const CODE_SET_CLIENT_ID_RESP: u8 = 6;
pub const CODE_GET_SERVER_INFO_REQ: u8 = 7;
pub const CODE_GET_SERVER_INFO_RESP: u8 = 8;
pub const CODE_GET_REQ: u8 = 9;
pub const CODE_GET_RESP: u8 = 10;
pub const CODE_PUT_REQ: u8 = 11;
pub const CODE_PUT_RESP: u8 = 12;
pub const CODE_DEL_REQ: u8 = 13;
pub const CODE_DEL_RESP: u8 = 14;
pub const CODE_LIST_BUCKETS_REQ: u8 = 15;
pub const CODE_LIST_BUCKETS_RESP: u8 = 16;
pub const CODE_LIST_KEYS_REQ: u8 = 17;
pub const CODE_LIST_KEYS_RESP: u8 = 18;
pub const CODE_GET_BUCKET_REQ: u8 = 19;
pub const CODE_GET_BUCKET_RESP: u8 = 20;
pub const CODE_SET_BUCKET_REQ: u8 = 21;
pub const CODE_SET_BUCKET_RESP: u8 = 22;
pub const CODE_MAP_RED_REQ: u8 = 23;
pub const CODE_MAP_RED_RESP: u8 = 24;
pub const CODE_INDEX_REQ: u8 = 25;
pub const CODE_INDEX_RESP: u8 = 26;
pub const CODE_SEARCH_QUERY_REQ: u8 = 27;
pub const CODE_SEARCH_QUERY_RESP: u8 = 28;

/// Highest code defined by this protocol version.
pub const MAX_MESSAGE_CODE: u8 = CODE_SEARCH_QUERY_RESP;

// ============================================================================
// CODE ENUMERATION
// ============================================================================

/// All message codes understood by the client.
///
/// Each variant corresponds to one of the `CODE_*` constants above.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCode {
    ErrorResp = CODE_ERROR_RESP,
    PingReq = CODE_PING_REQ,
    PingResp = CODE_PING_RESP,
    GetClientIdReq = CODE_GET_CLIENT_ID_REQ,
    GetClientIdResp = CODE_GET_CLIENT_ID_RESP,
    SetClientIdReq = CODE_SET_CLIENT_ID_REQ,
    SetClientIdResp = CODE_SET_CLIENT_ID_RESP,
    GetServerInfoReq = CODE_GET_SERVER_INFO_REQ,
    GetServerInfoResp = CODE_GET_SERVER_INFO_RESP,
    GetReq = CODE_GET_REQ,
    GetResp = CODE_GET_RESP,
    PutReq = CODE_PUT_REQ,
    PutResp = CODE_PUT_RESP,
    DelReq = CODE_DEL_REQ,
    DelResp = CODE_DEL_RESP,
    ListBucketsReq = CODE_LIST_BUCKETS_REQ,
    ListBucketsResp = CODE_LIST_BUCKETS_RESP,
    ListKeysReq = CODE_LIST_KEYS_REQ,
    ListKeysResp = CODE_LIST_KEYS_RESP,
    GetBucketReq = CODE_GET_BUCKET_REQ,
    GetBucketResp = CODE_GET_BUCKET_RESP,
    SetBucketReq = CODE_SET_BUCKET_REQ,
    SetBucketResp = CODE_SET_BUCKET_RESP,
    MapRedReq = CODE_MAP_RED_REQ,
    MapRedResp = CODE_MAP_RED_RESP,
    IndexReq = CODE_INDEX_REQ,
    IndexResp = CODE_INDEX_RESP,
    SearchQueryReq = CODE_SEARCH_QUERY_REQ,
    SearchQueryResp = CODE_SEARCH_QUERY_RESP,
}

impl MessageCode {
    /// Every code in wire order.
    pub const ALL: [MessageCode; 29] = [
        Self::ErrorResp,
        Self::PingReq,
        Self::PingResp,
        Self::GetClientIdReq,
        Self::GetClientIdResp,
        Self::SetClientIdReq,
        Self::SetClientIdResp,
        Self::GetServerInfoReq,
        Self::GetServerInfoResp,
        Self::GetReq,
        Self::GetResp,
        Self::PutReq,
        Self::PutResp,
        Self::DelReq,
        Self::DelResp,
        Self::ListBucketsReq,
        Self::ListBucketsResp,
        Self::ListKeysReq,
        Self::ListKeysResp,
        Self::GetBucketReq,
        Self::GetBucketResp,
        Self::SetBucketReq,
        Self::SetBucketResp,
        Self::MapRedReq,
        Self::MapRedResp,
        Self::IndexReq,
        Self::IndexResp,
        Self::SearchQueryReq,
        Self::SearchQueryResp,
    ];

    /// Convert code to its wire byte.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to create a code from its wire byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        if value > MAX_MESSAGE_CODE {
            return None;
        }
        Some(Self::ALL[value as usize])
    }

    /// Wire name, as used by the server's protobuf definitions.
    pub const fn name(self) -> &'static str {
        match self {
            Self::ErrorResp => "RpbErrorResp",
            Self::PingReq => "RpbPingReq",
            Self::PingResp => "RpbPingResp",
            Self::GetClientIdReq => "RpbGetClientIdReq",
            Self::GetClientIdResp => "RpbGetClientIdResp",
            Self::SetClientIdReq => "RpbSetClientIdReq",
            Self::SetClientIdResp => "RpbSetClientIdResp",
            Self::GetServerInfoReq => "RpbGetServerInfoReq",
            Self::GetServerInfoResp => "RpbGetServerInfoResp",
            Self::GetReq => "RpbGetReq",
            Self::GetResp => "RpbGetResp",
            Self::PutReq => "RpbPutReq",
            Self::PutResp => "RpbPutResp",
            Self::DelReq => "RpbDelReq",
            Self::DelResp => "RpbDelResp",
            Self::ListBucketsReq => "RpbListBucketsReq",
            Self::ListBucketsResp => "RpbListBucketsResp",
            Self::ListKeysReq => "RpbListKeysReq",
            Self::ListKeysResp => "RpbListKeysResp",
            Self::GetBucketReq => "RpbGetBucketReq",
            Self::GetBucketResp => "RpbGetBucketResp",
            Self::SetBucketReq => "RpbSetBucketReq",
            Self::SetBucketResp => "RpbSetBucketResp",
            Self::MapRedReq => "RpbMapRedReq",
            Self::MapRedResp => "RpbMapRedResp",
            Self::IndexReq => "RpbIndexReq",
            Self::IndexResp => "RpbIndexResp",
            Self::SearchQueryReq => "RpbSearchQueryReq",
            Self::SearchQueryResp => "RpbSearchQueryResp",
        }
    }

    /// Check if code is sent by the client.
    pub const fn is_request(self) -> bool {
        (self as u8) % 2 == 1
    }

    /// Check if code is sent by the server.
    pub const fn is_response(self) -> bool {
        !self.is_request()
    }

    /// Paired response code for a request, `None` for response codes.
    pub const fn response_code(self) -> Option<Self> {
        if self.is_request() {
            Self::from_u8(self as u8 + 1)
        } else {
            None
        }
    }

    /// Check if the server answers this request with a multi-frame stream.
    pub const fn is_streaming(self) -> bool {
        matches!(
            self,
            Self::ListKeysReq | Self::ListKeysResp | Self::MapRedReq | Self::MapRedResp
        )
    }
}

impl std::fmt::Display for MessageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_conversion() {
        for code in MessageCode::ALL {
            assert_eq!(MessageCode::from_u8(code.as_u8()), Some(code));
        }
    }

    #[test]
    fn test_table_is_in_wire_order() {
        for (idx, code) in MessageCode::ALL.iter().enumerate() {
            assert_eq!(code.as_u8() as usize, idx, "{} out of place", code);
        }
    }

    #[test]
    fn test_invalid_code() {
        assert_eq!(MessageCode::from_u8(29), None);
        assert_eq!(MessageCode::from_u8(255), None);
    }

    #[test]
    fn test_request_response_pairs() {
        assert_eq!(
            MessageCode::PingReq.response_code(),
            Some(MessageCode::PingResp)
        );
        assert_eq!(
            MessageCode::SearchQueryReq.response_code(),
            Some(MessageCode::SearchQueryResp)
        );
        assert_eq!(MessageCode::GetResp.response_code(), None);
        assert!(MessageCode::ErrorResp.is_response());
        assert!(MessageCode::PutReq.is_request());
    }

    #[test]
    fn test_streaming_classification() {
        assert!(MessageCode::ListKeysReq.is_streaming());
        assert!(MessageCode::MapRedResp.is_streaming());
        assert!(!MessageCode::ListBucketsReq.is_streaming());
        assert!(!MessageCode::GetReq.is_streaming());
    }

    #[test]
    fn test_code_display() {
        assert_eq!(format!("{}", MessageCode::GetReq), "RpbGetReq");
        assert_eq!(MessageCode::ErrorResp.name(), "RpbErrorResp");
    }
}
