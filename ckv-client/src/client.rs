//! # Cluster Client API
//!
//! Purpose: Expose a compact, blocking API over a pool of cluster endpoints
//! speaking the length-prefixed protobuf protocol.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides selection, framing, retries and
//!    stream reassembly behind `request`, `do_raw` and `do_streaming`.
//! 2. **One Lease per Call**: Each call leases one endpoint for its whole
//!    exchange and releases it on return, error paths included.
//! 3. **Fail Fast**: Pool exhaustion and protocol errors surface
//!    immediately; only timeouts go through the retry policy.
//! 4. **Recovery Elsewhere**: A failed call never redials; the health loop
//!    owns that.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use ckv_common::*;
use parking_lot::Mutex;
use tracing::info;

use crate::config::ClientConfig;
use crate::endpoint::Lease;
use crate::health::{HealthCheckConfig, HealthChecker, HealthMonitor};
use crate::pool::EndpointPool;
use crate::retry::{RetryPolicy, SimpleRetryPolicy};
use crate::stream::{collect_chunks, collect_raw, MapRedChunk, StreamChunk};

/// Blocking client for a cluster of endpoints.
///
/// `Client` is `Send + Sync`; share it between threads behind an `Arc`.
pub struct Client {
    config: ClientConfig,
    pool: Arc<EndpointPool>,
    retry: Box<dyn RetryPolicy>,
    monitor: Mutex<Option<HealthMonitor>>,
    closed: AtomicBool,
}

impl Client {
    /// Creates a client without connecting.
    pub fn new(config: ClientConfig) -> CkvResult<Self> {
        config.validate()?;
        let pool = Arc::new(EndpointPool::new(&config));
        let retry = SimpleRetryPolicy::new(config.retry_attempts, config.retry_delay());
        Ok(Client {
            config,
            pool,
            retry: Box::new(retry),
            monitor: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Creates a client for `cluster` with default settings and dials it.
    pub fn connect<I, S>(cluster: I) -> CkvResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Client::new(ClientConfig::with_cluster(cluster))?;
        client.dial()?;
        Ok(client)
    }

    /// Replaces the retry policy applied to every frame read and write.
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry = Box::new(policy);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    /// Dials every endpoint and starts the health loop.
    ///
    /// Endpoints that fail to connect are left to the health loop. Returns
    /// the number of endpoints connected.
    pub fn dial(&self) -> CkvResult<usize> {
        self.ensure_open()?;
        let connected = self.pool.dial_all()?;

        let mut monitor = self.monitor.lock();
        if monitor.is_none() {
            let checker = HealthChecker::new(
                Arc::clone(&self.pool),
                HealthCheckConfig::from(&self.config),
            );
            *monitor = Some(HealthMonitor::spawn(checker)?);
        }
        Ok(connected)
    }

    /// Stops the health loop and closes every endpoint.
    ///
    /// A second call returns [`CkvError::Closed`].
    pub fn close(&self) -> CkvResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(CkvError::Closed);
        }
        if let Some(mut monitor) = self.monitor.lock().take() {
            monitor.stop();
        }
        self.pool.close();
        info!("client closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends a typed request and decodes its single-frame response.
    pub fn request(&self, request: &Request) -> CkvResult<Response> {
        let code = request.code();
        reject_streaming(code)?;
        let frame = encode_request(request)?;
        self.exchange(&frame, |lease, retry| {
            let reply = read_reply(lease, retry)?;
            decode_response(&reply, code)
        })
    }

    /// Sends a streaming request and collects every chunk until done.
    pub fn request_streaming<C: StreamChunk>(&self, request: &Request) -> CkvResult<Vec<C::Item>> {
        if request.code() != C::REQUEST {
            return Err(CkvError::InvalidRequest(format!(
                "{} does not start a {} stream",
                request.code(),
                C::REQUEST
            )));
        }
        let frame = encode_request(request)?;
        self.exchange(&frame, |lease, retry| {
            read_stream(lease, |lease| {
                collect_chunks::<C, _>(|| retry.read(&mut || lease.read()))
            })
        })
    }

    /// Sends a pre-encoded payload and returns the raw response payload.
    ///
    /// Empty-bodied successes yield `b"Success"`, a ping yields `b"Pong"`.
    pub fn do_raw(&self, code: MessageCode, payload: &[u8]) -> CkvResult<Bytes> {
        check_request_code(code)?;
        reject_streaming(code)?;
        let frame = raw_frame(code, payload)?;
        self.exchange(&frame, |lease, retry| {
            let reply = read_reply(lease, retry)?;
            decode_raw(&reply, code)
        })
    }

    /// Sends a list-keys or map/reduce payload and returns every response
    /// payload up to and including the done frame.
    pub fn do_streaming(&self, code: MessageCode, payload: &[u8]) -> CkvResult<Vec<Bytes>> {
        check_request_code(code)?;
        if !code.is_streaming() {
            return Err(CkvError::InvalidRequest(format!(
                "{} does not have a streaming response",
                code
            )));
        }
        let frame = raw_frame(code, payload)?;
        self.exchange(&frame, |lease, retry| {
            read_stream(lease, |lease| {
                collect_raw(code, || retry.read(&mut || lease.read()))
            })
        })
    }

    /// Leases an endpoint, writes `frame`, then hands the lease to `read`.
    fn exchange<T>(
        &self,
        frame: &[u8],
        read: impl FnOnce(&mut Lease<'_>, &dyn RetryPolicy) -> CkvResult<T>,
    ) -> CkvResult<T> {
        self.ensure_open()?;
        let endpoint = self.pool.select()?;
        let mut lease = endpoint.lease();
        self.retry.write(&mut |data| lease.write(data), frame)?;
        read(&mut lease, self.retry.as_ref())
    }

    fn ensure_open(&self) -> CkvResult<()> {
        if self.is_closed() {
            Err(CkvError::Closed)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Typed operations
    // ------------------------------------------------------------------

    /// Round trip to one endpoint.
    pub fn ping(&self) -> CkvResult<()> {
        match self.request(&Request::Ping)? {
            Response::Pong => Ok(()),
            other => Err(unexpected(MessageCode::PingReq, &other)),
        }
    }

    pub fn get_client_id(&self) -> CkvResult<Vec<u8>> {
        match self.request(&Request::GetClientId)? {
            Response::ClientId(resp) => Ok(resp.client_id),
            other => Err(unexpected(MessageCode::GetClientIdReq, &other)),
        }
    }

    pub fn set_client_id(&self, client_id: &[u8]) -> CkvResult<()> {
        let request = Request::SetClientId(RpbSetClientIdReq {
            client_id: client_id.to_vec(),
        });
        match self.request(&request)? {
            Response::ClientIdSet => Ok(()),
            other => Err(unexpected(MessageCode::SetClientIdReq, &other)),
        }
    }

    /// Node name and server version of whichever endpoint answers.
    pub fn server_info(&self) -> CkvResult<RpbGetServerInfoResp> {
        match self.request(&Request::GetServerInfo)? {
            Response::ServerInfo(info) => Ok(info),
            other => Err(unexpected(MessageCode::GetServerInfoReq, &other)),
        }
    }

    /// Fetches an object; a missing key is [`CkvError::ObjectNotFound`].
    pub fn fetch(&self, bucket: &[u8], key: &[u8]) -> CkvResult<RpbGetResp> {
        self.fetch_with(RpbGetReq {
            bucket: bucket.to_vec(),
            key: key.to_vec(),
            ..Default::default()
        })
    }

    /// Fetch with quorum and conditional options.
    pub fn fetch_with(&self, request: RpbGetReq) -> CkvResult<RpbGetResp> {
        match self.request(&Request::Get(request))? {
            Response::Object(object) => Ok(object),
            other => Err(unexpected(MessageCode::GetReq, &other)),
        }
    }

    /// Stores `content` under `bucket/key`; with no key the server picks one
    /// and returns it in the response.
    pub fn store(
        &self,
        bucket: &[u8],
        key: Option<&[u8]>,
        content: RpbContent,
    ) -> CkvResult<Option<RpbPutResp>> {
        self.store_with(RpbPutReq {
            bucket: bucket.to_vec(),
            key: key.map(<[u8]>::to_vec),
            content: Some(content),
            ..Default::default()
        })
    }

    /// Store with vclock, quorum and return-body options.
    pub fn store_with(&self, request: RpbPutReq) -> CkvResult<Option<RpbPutResp>> {
        match self.request(&Request::Put(request))? {
            Response::Stored(stored) => Ok(stored),
            other => Err(unexpected(MessageCode::PutReq, &other)),
        }
    }

    pub fn delete(&self, bucket: &[u8], key: &[u8]) -> CkvResult<()> {
        let request = Request::Delete(RpbDelReq {
            bucket: bucket.to_vec(),
            key: key.to_vec(),
            ..Default::default()
        });
        match self.request(&request)? {
            Response::Deleted => Ok(()),
            other => Err(unexpected(MessageCode::DelReq, &other)),
        }
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    /// Adds a link from `bucket/key` to `link_bucket/link_key` with `tag`.
    ///
    /// The object is fetched, the link appended to its first sibling, and
    /// the sibling stored back under the fetched vclock.
    pub fn link_add(
        &self,
        bucket: &[u8],
        key: &[u8],
        link_bucket: &[u8],
        link_key: &[u8],
        tag: &[u8],
    ) -> CkvResult<()> {
        let (vclock, mut content) = self.fetch_first_sibling(bucket, key)?;
        content.links.push(RpbLink {
            bucket: Some(link_bucket.to_vec()),
            key: Some(link_key.to_vec()),
            tag: Some(tag.to_vec()),
        });
        self.store_sibling(bucket, key, vclock, content)
    }

    /// Removes the first link from `bucket/key` to `link_bucket/link_key`.
    ///
    /// Nothing is stored when no such link exists.
    pub fn link_remove(
        &self,
        bucket: &[u8],
        key: &[u8],
        link_bucket: &[u8],
        link_key: &[u8],
    ) -> CkvResult<()> {
        let (vclock, mut content) = self.fetch_first_sibling(bucket, key)?;
        let position = content.links.iter().position(|link| {
            link.bucket.as_deref() == Some(link_bucket) && link.key.as_deref() == Some(link_key)
        });
        match position {
            Some(idx) => {
                content.links.remove(idx);
                self.store_sibling(bucket, key, vclock, content)
            }
            None => Ok(()),
        }
    }

    /// Follows a link: fetches the object it points at.
    pub fn link_walk(&self, link_bucket: &[u8], link_key: &[u8]) -> CkvResult<RpbGetResp> {
        self.fetch(link_bucket, link_key)
    }

    fn fetch_first_sibling(
        &self,
        bucket: &[u8],
        key: &[u8],
    ) -> CkvResult<(Option<Vec<u8>>, RpbContent)> {
        let object = self.fetch(bucket, key)?;
        let content = object
            .content
            .into_iter()
            .next()
            .ok_or(CkvError::NoContent)?;
        Ok((object.vclock, content))
    }

    fn store_sibling(
        &self,
        bucket: &[u8],
        key: &[u8],
        vclock: Option<Vec<u8>>,
        content: RpbContent,
    ) -> CkvResult<()> {
        self.store_with(RpbPutReq {
            bucket: bucket.to_vec(),
            key: Some(key.to_vec()),
            vclock,
            content: Some(content),
            ..Default::default()
        })
        .map(|_| ())
    }

    pub fn list_buckets(&self) -> CkvResult<Vec<Vec<u8>>> {
        match self.request(&Request::ListBuckets)? {
            Response::Buckets(resp) => Ok(resp.buckets),
            other => Err(unexpected(MessageCode::ListBucketsReq, &other)),
        }
    }

    /// Every key in `bucket`, reassembled from the paged stream.
    pub fn list_keys(&self, bucket: &[u8]) -> CkvResult<Vec<Vec<u8>>> {
        let request = Request::ListKeys(RpbListKeysReq {
            bucket: bucket.to_vec(),
        });
        self.request_streaming::<RpbListKeysResp>(&request)
    }

    pub fn get_bucket(&self, bucket: &[u8]) -> CkvResult<RpbBucketProps> {
        let request = Request::GetBucket(RpbGetBucketReq {
            bucket: bucket.to_vec(),
        });
        match self.request(&request)? {
            Response::BucketProps(resp) => Ok(resp.props.unwrap_or_default()),
            other => Err(unexpected(MessageCode::GetBucketReq, &other)),
        }
    }

    pub fn set_bucket(&self, bucket: &[u8], props: RpbBucketProps) -> CkvResult<()> {
        let request = Request::SetBucket(RpbSetBucketReq {
            bucket: bucket.to_vec(),
            props: Some(props),
        });
        match self.request(&request)? {
            Response::BucketSet => Ok(()),
            other => Err(unexpected(MessageCode::SetBucketReq, &other)),
        }
    }

    /// Runs a map/reduce job given as `content_type` (usually
    /// `application/json`) and returns each phase output in arrival order.
    pub fn map_reduce(&self, job: &[u8], content_type: &str) -> CkvResult<Vec<MapRedChunk>> {
        let request = Request::MapReduce(RpbMapRedReq {
            request: job.to_vec(),
            content_type: content_type.as_bytes().to_vec(),
        });
        self.request_streaming::<RpbMapRedResp>(&request)
    }

    /// Keys whose secondary index `index` equals `key`.
    pub fn index_eq(&self, bucket: &[u8], index: &str, key: &[u8]) -> CkvResult<Vec<Vec<u8>>> {
        self.index(RpbIndexReq {
            bucket: bucket.to_vec(),
            index: index.as_bytes().to_vec(),
            qtype: IndexQueryType::Eq as i32,
            key: Some(key.to_vec()),
            ..Default::default()
        })
    }

    /// Keys whose secondary index `index` lies in `min..=max`.
    pub fn index_range(
        &self,
        bucket: &[u8],
        index: &str,
        min: &[u8],
        max: &[u8],
    ) -> CkvResult<Vec<Vec<u8>>> {
        self.index(RpbIndexReq {
            bucket: bucket.to_vec(),
            index: index.as_bytes().to_vec(),
            qtype: IndexQueryType::Range as i32,
            range_min: Some(min.to_vec()),
            range_max: Some(max.to_vec()),
            ..Default::default()
        })
    }

    pub fn index(&self, request: RpbIndexReq) -> CkvResult<Vec<Vec<u8>>> {
        match self.request(&Request::Index(request))? {
            Response::Index(resp) => Ok(resp.keys),
            other => Err(unexpected(MessageCode::IndexReq, &other)),
        }
    }

    /// Full-text query `q` against search index `index`.
    pub fn search(&self, index: &str, q: &str) -> CkvResult<RpbSearchQueryResp> {
        self.search_with(RpbSearchQueryReq {
            q: q.as_bytes().to_vec(),
            index: index.as_bytes().to_vec(),
            ..Default::default()
        })
    }

    pub fn search_with(&self, request: RpbSearchQueryReq) -> CkvResult<RpbSearchQueryResp> {
        match self.request(&Request::Search(request))? {
            Response::Search(resp) => Ok(resp),
            other => Err(unexpected(MessageCode::SearchQueryReq, &other)),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(mut monitor) = self.monitor.get_mut().take() {
            monitor.stop();
        }
    }
}

/// Reads one response frame under the retry policy.
///
/// A read that still times out after the last attempt may be answered
/// later, so the socket is closed rather than left for the next caller.
fn read_reply(lease: &mut Lease<'_>, retry: &dyn RetryPolicy) -> CkvResult<Frame> {
    match retry.read(&mut || lease.read()) {
        Err(CkvError::ReadTimeout) => {
            lease.close();
            Err(CkvError::ReadTimeout)
        }
        other => other,
    }
}

/// Runs a stream reader; on any failure the unread rest of the stream is
/// dropped with the socket.
fn read_stream<T>(
    lease: &mut Lease<'_>,
    collect: impl FnOnce(&mut Lease<'_>) -> CkvResult<T>,
) -> CkvResult<T> {
    let result = collect(&mut *lease);
    if result.is_err() {
        lease.close();
    }
    result
}

fn raw_frame(code: MessageCode, payload: &[u8]) -> CkvResult<Bytes> {
    let mut out = BytesMut::new();
    encode_frame(code, payload, &mut out)?;
    Ok(out.freeze())
}

fn check_request_code(code: MessageCode) -> CkvResult<()> {
    if code.is_request() {
        Ok(())
    } else {
        Err(CkvError::InvalidRequest(format!("{} is not a request code", code)))
    }
}

fn reject_streaming(code: MessageCode) -> CkvResult<()> {
    if code.is_streaming() {
        Err(CkvError::InvalidRequest(format!(
            "{} has a streaming response",
            code
        )))
    } else {
        Ok(())
    }
}

fn unexpected(request: MessageCode, response: &Response) -> CkvError {
    CkvError::UnexpectedResponse {
        expected: request.response_code().unwrap_or(MessageCode::ErrorResp),
        actual: response.code(),
    }
}
