//! # Response Codec
//!
//! Purpose: Turn a decoded [`Frame`] into the response the caller asked for,
//! either as a typed [`Response`] or as raw payload bytes.
//!
//! ## Design Principles
//! 1. **Paired Codes**: A response is accepted only if its code is the one
//!    paired with the request that was sent (or the error code 0).
//! 2. **Sentinels Are Not Parsed**: Ping, delete, set-client-id and
//!    set-bucket answer with an empty body; those map to fixed values.
//! 3. **Empty Get Is Not Success**: An empty get/get-bucket body means the
//!    object does not exist and surfaces as [`CkvError::ObjectNotFound`].

use bytes::{Bytes, BytesMut};
use prost::Message;

use crate::codes::MessageCode;
use crate::error::{CkvError, CkvResult};
use crate::frame::{encode_frame, Frame};
use crate::messages::*;

/// Encodes a typed request as a complete wire frame.
pub fn encode_request(request: &Request) -> CkvResult<Bytes> {
    let payload = request.encode_payload();
    let mut out = BytesMut::new();
    encode_frame(request.code(), &payload, &mut out)?;
    Ok(out.freeze())
}

/// Decodes the payload of an error frame into [`CkvError::Server`].
pub fn decode_server_error(payload: &[u8]) -> CkvError {
    match RpbErrorResp::decode(payload) {
        Ok(resp) => CkvError::Server {
            code: resp.errcode,
            message: String::from_utf8_lossy(&resp.errmsg).into_owned(),
        },
        Err(err) => CkvError::Decode(err),
    }
}

/// Checks that `frame` answers `request`, converting error frames.
fn check_code(frame: &Frame, request: MessageCode) -> CkvResult<()> {
    let expected = request.response_code().ok_or_else(|| {
        CkvError::InvalidRequest(format!("{} is not a request code", request))
    })?;
    if frame.code == MessageCode::ErrorResp {
        return Err(decode_server_error(&frame.payload));
    }
    if frame.code != expected {
        return Err(CkvError::UnexpectedResponse {
            expected,
            actual: frame.code,
        });
    }
    Ok(())
}

/// Decodes a frame into the typed response for `request`.
pub fn decode_response(frame: &Frame, request: MessageCode) -> CkvResult<Response> {
    check_code(frame, request)?;
    let payload = &frame.payload[..];

    let response = match frame.code {
        MessageCode::PingResp => Response::Pong,
        MessageCode::SetClientIdResp => Response::ClientIdSet,
        MessageCode::DelResp => Response::Deleted,
        MessageCode::SetBucketResp => Response::BucketSet,
        MessageCode::PutResp if payload.is_empty() => Response::Stored(None),
        MessageCode::PutResp => Response::Stored(Some(RpbPutResp::decode(payload)?)),
        MessageCode::GetResp | MessageCode::GetBucketResp if payload.is_empty() => {
            return Err(CkvError::ObjectNotFound)
        }
        MessageCode::GetResp => Response::Object(RpbGetResp::decode(payload)?),
        MessageCode::GetBucketResp => Response::BucketProps(RpbGetBucketResp::decode(payload)?),
        MessageCode::GetClientIdResp => Response::ClientId(RpbGetClientIdResp::decode(payload)?),
        MessageCode::GetServerInfoResp => {
            Response::ServerInfo(RpbGetServerInfoResp::decode(payload)?)
        }
        MessageCode::ListBucketsResp => Response::Buckets(RpbListBucketsResp::decode(payload)?),
        MessageCode::ListKeysResp => Response::Keys(RpbListKeysResp::decode(payload)?),
        MessageCode::MapRedResp => Response::MapReduce(RpbMapRedResp::decode(payload)?),
        MessageCode::IndexResp => Response::Index(RpbIndexResp::decode(payload)?),
        MessageCode::SearchQueryResp => Response::Search(RpbSearchQueryResp::decode(payload)?),
        // check_code only lets paired response codes through
        other => {
            return Err(CkvError::UnexpectedResponse {
                expected: request.response_code().unwrap_or(MessageCode::ErrorResp),
                actual: other,
            })
        }
    };
    Ok(response)
}

/// Decodes a frame into raw payload bytes for `request`.
///
/// Sentinel responses yield `b"Pong"` or `b"Success"`; everything else
/// returns the undecoded protobuf payload.
pub fn decode_raw(frame: &Frame, request: MessageCode) -> CkvResult<Bytes> {
    check_code(frame, request)?;
    match frame.code {
        MessageCode::PingResp => Ok(Bytes::from_static(PONG_SENTINEL)),
        MessageCode::SetClientIdResp | MessageCode::DelResp | MessageCode::SetBucketResp => {
            Ok(Bytes::from_static(SUCCESS_SENTINEL))
        }
        MessageCode::PutResp if frame.payload.is_empty() => {
            Ok(Bytes::from_static(SUCCESS_SENTINEL))
        }
        MessageCode::GetResp | MessageCode::GetBucketResp if frame.payload.is_empty() => {
            Err(CkvError::ObjectNotFound)
        }
        _ => Ok(frame.payload.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::decode_frame;

    fn frame(code: MessageCode, payload: Vec<u8>) -> Frame {
        Frame::new(code, payload)
    }

    #[test]
    fn empty_put_is_success_sentinel() {
        let bytes = frame(MessageCode::PutResp, Vec::new()).to_bytes().unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 1, 12]);
        let decoded = decode_frame(&bytes).unwrap();

        assert_eq!(
            decode_raw(&decoded, MessageCode::PutReq).unwrap(),
            Bytes::from_static(b"Success")
        );
        assert_eq!(
            decode_response(&decoded, MessageCode::PutReq).unwrap(),
            Response::Stored(None)
        );
    }

    #[test]
    fn empty_get_is_not_found() {
        let decoded = decode_frame(&[0, 0, 0, 1, 10]).unwrap();
        assert!(matches!(
            decode_raw(&decoded, MessageCode::GetReq),
            Err(CkvError::ObjectNotFound)
        ));
        assert!(matches!(
            decode_response(&decoded, MessageCode::GetReq),
            Err(CkvError::ObjectNotFound)
        ));
    }

    #[test]
    fn empty_bucket_props_is_not_found() {
        let empty = frame(MessageCode::GetBucketResp, Vec::new());
        assert!(matches!(
            decode_response(&empty, MessageCode::GetBucketReq),
            Err(CkvError::ObjectNotFound)
        ));
    }

    #[test]
    fn sentinel_responses() {
        let pong = frame(MessageCode::PingResp, Vec::new());
        assert_eq!(decode_raw(&pong, MessageCode::PingReq).unwrap(), &b"Pong"[..]);
        assert_eq!(
            decode_response(&pong, MessageCode::PingReq).unwrap(),
            Response::Pong
        );

        let cases = [
            (MessageCode::DelReq, MessageCode::DelResp, Response::Deleted),
            (
                MessageCode::SetClientIdReq,
                MessageCode::SetClientIdResp,
                Response::ClientIdSet,
            ),
            (
                MessageCode::SetBucketReq,
                MessageCode::SetBucketResp,
                Response::BucketSet,
            ),
        ];
        for (request, code, expected) in cases {
            let f = frame(code, Vec::new());
            assert_eq!(decode_raw(&f, request).unwrap(), &b"Success"[..]);
            assert_eq!(decode_response(&f, request).unwrap(), expected);
        }
    }

    #[test]
    fn put_with_body_decodes() {
        let body = RpbPutResp {
            key: Some(b"generated".to_vec()),
            ..Default::default()
        };
        let f = frame(MessageCode::PutResp, body.encode_to_vec());
        assert_eq!(
            decode_response(&f, MessageCode::PutReq).unwrap(),
            Response::Stored(Some(body.clone()))
        );
        assert_eq!(
            decode_raw(&f, MessageCode::PutReq).unwrap(),
            Bytes::from(body.encode_to_vec())
        );
    }

    #[test]
    fn get_with_content_decodes() {
        let body = RpbGetResp {
            content: vec![RpbContent::text("hello")],
            vclock: Some(vec![1, 2, 3]),
            unchanged: None,
        };
        let f = frame(MessageCode::GetResp, body.encode_to_vec());
        match decode_response(&f, MessageCode::GetReq).unwrap() {
            Response::Object(resp) => assert_eq!(resp.content[0].value, b"hello".to_vec()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn error_frame_becomes_server_error() {
        let err = RpbErrorResp {
            errmsg: b"no quorum".to_vec(),
            errcode: 3,
        };
        let f = frame(MessageCode::ErrorResp, err.encode_to_vec());
        match decode_response(&f, MessageCode::GetReq) {
            Err(CkvError::Server { code, message }) => {
                assert_eq!(code, 3);
                assert_eq!(message, "no quorum");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            decode_raw(&f, MessageCode::PingReq),
            Err(CkvError::Server { .. })
        ));
    }

    #[test]
    fn mismatched_code_is_rejected() {
        let f = frame(MessageCode::DelResp, Vec::new());
        match decode_response(&f, MessageCode::GetReq) {
            Err(CkvError::UnexpectedResponse { expected, actual }) => {
                assert_eq!(expected, MessageCode::GetResp);
                assert_eq!(actual, MessageCode::DelResp);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn response_code_as_request_is_invalid() {
        let f = frame(MessageCode::PingResp, Vec::new());
        assert!(matches!(
            decode_raw(&f, MessageCode::PingResp),
            Err(CkvError::InvalidRequest(_))
        ));
    }

    #[test]
    fn garbage_payload_is_decode_error() {
        let f = frame(MessageCode::ListKeysResp, vec![0xff, 0xff, 0xff]);
        assert!(matches!(
            decode_response(&f, MessageCode::ListKeysReq),
            Err(CkvError::Decode(_))
        ));
    }

    #[test]
    fn encodes_typed_request() {
        let bytes = encode_request(&Request::Ping).unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 1, 1]);

        let list = Request::ListKeys(RpbListKeysReq {
            bucket: b"b".to_vec(),
        });
        let bytes = encode_request(&list).unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 4, 17, 0x0a, 1, b'b']);
    }
}
