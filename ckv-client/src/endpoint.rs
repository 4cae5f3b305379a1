//! # Endpoint
//!
//! Purpose: One TCP connection to one cluster member, with deadlines on every
//! transfer and a decaying error score that drives selection.
//!
//! ## Design Principles
//! 1. **Lease Guard**: The socket sits behind a mutex; holding a [`Lease`] is
//!    the only way to read or write, so one request/response exchange
//!    (streaming continuation included) owns the stream end to end.
//! 2. **Clean or Closed**: A timeout before any byte moved leaves the stream
//!    usable. Anything that moved part of a frame closes the socket.
//! 3. **Background Recovery**: The request path only ever marks an endpoint
//!    unhealthy; the health loop is what brings it back.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use ckv_common::{decode_body, decode_raw, parse_length, CkvError, CkvResult, Frame, MessageCode};
use ckv_common::{HEADER_LEN, PONG_SENTINEL};
use parking_lot::{Mutex, MutexGuard};
use socket2::SockRef;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::decaying::DecayingCounter;

/// Score added when a dial fails.
pub const DIAL_FAILURE_WEIGHT: f64 = 10.0;

/// Score added for each failed read or write.
pub const IO_FAILURE_WEIGHT: f64 = 1.0;

const PING_FRAME: [u8; HEADER_LEN + 1] = [0, 0, 0, 1, MessageCode::PingReq as u8];

/// Per-endpoint settings, derived from [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct EndpointOptions {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub connect_timeout: Duration,
    pub half_life: Duration,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        EndpointOptions::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for EndpointOptions {
    fn from(config: &ClientConfig) -> Self {
        EndpointOptions {
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            connect_timeout: config.connect_timeout(),
            half_life: config.decay_half_life(),
        }
    }
}

/// A single cluster member.
pub struct Endpoint {
    addr: String,
    options: EndpointOptions,
    stream: Mutex<Option<TcpStream>>,
    score: DecayingCounter,
    healthy: AtomicBool,
    connected: AtomicBool,
}

impl Endpoint {
    /// Creates an endpoint without connecting. It stays unhealthy until the
    /// first successful dial.
    pub fn new(addr: impl Into<String>, options: EndpointOptions) -> Self {
        let score = DecayingCounter::with_half_life(options.half_life);
        Endpoint {
            addr: addr.into(),
            options,
            stream: Mutex::new(None),
            score,
            healthy: AtomicBool::new(false),
            connected: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Current decayed error score.
    pub fn score(&self) -> f64 {
        self.score.value()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Healthy, connected and below `threshold`.
    pub fn is_eligible(&self, threshold: f64) -> bool {
        self.is_healthy() && self.is_connected() && self.score() < threshold
    }

    /// Marks the endpoint usable again; optionally forgets past errors.
    pub fn mark_healthy(&self, reset_score: bool) {
        if reset_score {
            self.score.reset();
        }
        self.healthy.store(true, Ordering::Release);
    }

    /// Adds `weight` to the score and takes the endpoint out of selection.
    pub fn record_failure(&self, weight: f64) {
        self.score.add(weight);
        self.healthy.store(false, Ordering::Release);
    }

    /// Blocks until the socket is free.
    pub fn lease(&self) -> Lease<'_> {
        Lease {
            endpoint: self,
            stream: self.stream.lock(),
        }
    }

    /// Returns `None` when another thread holds the socket.
    pub fn try_lease(&self) -> Option<Lease<'_>> {
        self.stream.try_lock().map(|stream| Lease {
            endpoint: self,
            stream,
        })
    }

    /// Opens (or reopens) the connection.
    pub fn dial(&self) -> CkvResult<()> {
        self.lease().dial()
    }

    /// Ping round trip; true only for a pong.
    pub fn ping(&self) -> bool {
        self.lease().ping()
    }

    /// Closes the socket. Closing a closed endpoint is a no-op.
    pub fn close(&self) {
        self.lease().close();
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("addr", &self.addr)
            .field("score", &self.score())
            .field("healthy", &self.is_healthy())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Exclusive access to an endpoint's socket for one exchange.
///
/// Dropping the lease releases the socket to the next caller.
pub struct Lease<'a> {
    endpoint: &'a Endpoint,
    stream: MutexGuard<'a, Option<TcpStream>>,
}

impl<'a> Lease<'a> {
    pub fn endpoint(&self) -> &'a Endpoint {
        self.endpoint
    }

    /// Resolves the address and connects, replacing any open socket.
    pub fn dial(&mut self) -> CkvResult<()> {
        self.close();
        let endpoint = self.endpoint;
        match connect_stream(&endpoint.addr, &endpoint.options) {
            Ok(stream) => {
                *self.stream = Some(stream);
                endpoint.connected.store(true, Ordering::Release);
                endpoint.healthy.store(true, Ordering::Release);
                debug!(addr = %endpoint.addr, "endpoint connected");
                Ok(())
            }
            Err(err) => {
                endpoint.record_failure(DIAL_FAILURE_WEIGHT);
                warn!(addr = %endpoint.addr, error = %err, "dial failed");
                Err(err)
            }
        }
    }

    /// Writes one complete frame before the write deadline.
    pub fn write(&mut self, frame: &[u8]) -> CkvResult<()> {
        let deadline = Instant::now() + self.endpoint.options.write_timeout;
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(self.not_connected()),
        };
        match write_full(stream, frame, deadline) {
            Ok(()) => Ok(()),
            Err(failure) => Err(self.transfer_failed(failure, CkvError::WriteTimeout)),
        }
    }

    /// Reads one complete frame before the read deadline.
    pub fn read(&mut self) -> CkvResult<Frame> {
        let deadline = Instant::now() + self.endpoint.options.read_timeout;
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(self.not_connected()),
        };

        let mut header = [0u8; HEADER_LEN];
        if let Err(failure) = read_full(stream, &mut header, deadline, 0) {
            return Err(self.transfer_failed(failure, CkvError::ReadTimeout));
        }
        let len = match parse_length(header) {
            Ok(len) => len,
            Err(err) => {
                // stream position is unknown past a bad header
                self.close();
                return Err(err);
            }
        };

        let mut body = vec![0u8; len];
        if let Err(failure) = read_full(stream, &mut body, deadline, HEADER_LEN) {
            return Err(self.transfer_failed(failure, CkvError::ReadTimeout));
        }
        decode_body(Bytes::from(body))
    }

    /// Sends a ping and waits for the pong.
    ///
    /// A failed ping closes the socket: a pong arriving after the deadline
    /// would otherwise answer the next request.
    pub fn ping(&mut self) -> bool {
        let pong = self.write(&PING_FRAME).is_ok()
            && match self.read() {
                Ok(frame) => matches!(
                    decode_raw(&frame, MessageCode::PingReq),
                    Ok(bytes) if &bytes[..] == PONG_SENTINEL
                ),
                Err(_) => false,
            };
        if !pong {
            self.close();
        }
        pong
    }

    /// Shuts down and drops the socket.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.endpoint.connected.store(false, Ordering::Release);
    }

    fn not_connected(&self) -> CkvError {
        self.endpoint.record_failure(IO_FAILURE_WEIGHT);
        CkvError::NotConnected(self.endpoint.addr.clone())
    }

    fn transfer_failed(&mut self, failure: TransferFailure, timeout: CkvError) -> CkvError {
        self.endpoint.record_failure(IO_FAILURE_WEIGHT);
        if failure.transferred == 0 && is_timeout(&failure.error) {
            return timeout;
        }
        debug!(
            addr = %self.endpoint.addr,
            transferred = failure.transferred,
            error = %failure.error,
            "closing poisoned stream"
        );
        self.close();
        CkvError::Io(failure.error)
    }
}

struct TransferFailure {
    transferred: usize,
    error: io::Error,
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn remaining(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        None
    } else {
        Some(left)
    }
}

fn write_full(stream: &mut TcpStream, buf: &[u8], deadline: Instant) -> Result<(), TransferFailure> {
    let mut written = 0;
    while written < buf.len() {
        let transferred = written;
        let fail = move |error: io::Error| TransferFailure { transferred, error };
        let left = remaining(deadline).ok_or_else(|| fail(io::ErrorKind::TimedOut.into()))?;
        stream.set_write_timeout(Some(left)).map_err(fail)?;
        match stream.write(&buf[written..]) {
            Ok(0) => return Err(fail(io::ErrorKind::WriteZero.into())),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(fail(e)),
        }
    }
    Ok(())
}

/// Fills `buf`; `already` counts bytes of the same frame read earlier.
fn read_full(
    stream: &mut TcpStream,
    buf: &mut [u8],
    deadline: Instant,
    already: usize,
) -> Result<(), TransferFailure> {
    let mut filled = 0;
    while filled < buf.len() {
        let transferred = already + filled;
        let fail = move |error: io::Error| TransferFailure { transferred, error };
        let left = remaining(deadline).ok_or_else(|| fail(io::ErrorKind::TimedOut.into()))?;
        stream.set_read_timeout(Some(left)).map_err(fail)?;
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Err(fail(io::ErrorKind::UnexpectedEof.into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(fail(e)),
        }
    }
    Ok(())
}

fn connect_stream(addr: &str, options: &EndpointOptions) -> CkvResult<TcpStream> {
    let socket_addrs = addr
        .to_socket_addrs()
        .map_err(|e| CkvError::InvalidAddress(format!("{}: {}", addr, e)))?;

    let mut last_err = None;
    for socket_addr in socket_addrs {
        match TcpStream::connect_timeout(&socket_addr, options.connect_timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                SockRef::from(&stream).set_keepalive(true)?;
                stream.set_read_timeout(Some(options.read_timeout))?;
                stream.set_write_timeout(Some(options.write_timeout))?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(CkvError::Connect {
        addr: addr.to_string(),
        source: last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn options(timeout_ms: u64) -> EndpointOptions {
        EndpointOptions {
            read_timeout: Duration::from_millis(timeout_ms),
            write_timeout: Duration::from_millis(timeout_ms),
            connect_timeout: Duration::from_millis(timeout_ms),
            half_life: Duration::from_secs(10),
        }
    }

    #[test]
    fn starts_unhealthy() {
        let endpoint = Endpoint::new("127.0.0.1:1", options(100));
        assert!(!endpoint.is_healthy());
        assert!(!endpoint.is_connected());
        assert!(!endpoint.is_eligible(0.1));
    }

    #[test]
    fn failed_dial_penalises_score() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::new(addr.to_string(), options(200));
        assert!(endpoint.dial().is_err());
        assert!(endpoint.score() > 9.0);
        assert!(!endpoint.is_healthy());
    }

    #[test]
    fn unresolvable_address_is_rejected() {
        let endpoint = Endpoint::new("not-an-address", options(100));
        assert!(matches!(endpoint.dial(), Err(CkvError::InvalidAddress(_))));
    }

    #[test]
    fn read_without_connection_is_transport_error() {
        let endpoint = Endpoint::new("127.0.0.1:1", options(100));
        let err = endpoint.lease().read().unwrap_err();
        assert!(matches!(err, CkvError::NotConnected(_)));
        assert!(err.is_transport());
        assert!(endpoint.score() > 0.9);
    }

    #[test]
    fn silent_server_times_out_and_keeps_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(300));
            drop(stream);
        });

        let endpoint = Endpoint::new(addr.to_string(), options(50));
        endpoint.dial().unwrap();
        assert!(endpoint.is_healthy());

        let err = endpoint.lease().read().unwrap_err();
        assert!(matches!(err, CkvError::ReadTimeout));
        assert!(err.is_retryable());
        assert!(endpoint.is_connected());
        assert!(!endpoint.is_healthy());
        assert!(endpoint.score() > 0.9);
        server.join().unwrap();
    }

    #[test]
    fn partial_frame_closes_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // announce 10 bytes, send 2
            stream.write_all(&[0, 0, 0, 10, 2, 0]).unwrap();
            thread::sleep(Duration::from_millis(300));
        });

        let endpoint = Endpoint::new(addr.to_string(), options(100));
        endpoint.dial().unwrap();
        let err = endpoint.lease().read().unwrap_err();
        assert!(matches!(err, CkvError::Io(_)));
        assert!(!err.is_retryable());
        assert!(!endpoint.is_connected());
        server.join().unwrap();
    }

    #[test]
    fn zero_length_header_is_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&[0, 0, 0, 0]).unwrap();
            thread::sleep(Duration::from_millis(100));
        });

        let endpoint = Endpoint::new(addr.to_string(), options(500));
        endpoint.dial().unwrap();
        let err = endpoint.lease().read().unwrap_err();
        assert!(matches!(err, CkvError::ZeroLength));
        assert_eq!(endpoint.score(), 0.0);
        assert!(endpoint.is_healthy());
        assert!(!endpoint.is_connected());
        server.join().unwrap();
    }

    #[test]
    fn ping_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 5];
            stream.read_exact(&mut request).unwrap();
            assert_eq!(request, [0, 0, 0, 1, 1]);
            stream.write_all(&[0, 0, 0, 1, 2]).unwrap();
        });

        let endpoint = Endpoint::new(addr.to_string(), options(500));
        endpoint.dial().unwrap();
        assert!(endpoint.ping());
        server.join().unwrap();
    }

    #[test]
    fn late_pong_closes_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 5];
            stream.read_exact(&mut request).unwrap();
            thread::sleep(Duration::from_millis(150));
            // the client has hung up by now
            let _ = stream.write_all(&[0, 0, 0, 1, 2]);
        });

        let endpoint = Endpoint::new(addr.to_string(), options(50));
        endpoint.dial().unwrap();
        let mut lease = endpoint.lease();
        assert!(!lease.ping());
        assert!(!endpoint.is_connected());

        let request = Frame::empty(MessageCode::DelReq).to_bytes().unwrap();
        assert!(matches!(lease.write(&request), Err(CkvError::NotConnected(_))));
        drop(lease);
        server.join().unwrap();
    }

    #[test]
    fn full_send_buffer_reports_write_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let server = thread::spawn(move || {
            // accept and never read
            let (stream, _) = listener.accept().unwrap();
            let _ = release_rx.recv();
            drop(stream);
        });

        let endpoint = Endpoint::new(addr.to_string(), options(100));
        endpoint.dial().unwrap();
        let mut lease = endpoint.lease();

        // fill both socket buffers until a whole frame no longer fits
        let chunk = Frame::new(MessageCode::PutReq, vec![0u8; 64 * 1024]).to_bytes().unwrap();
        let mut outcome = Ok(());
        for _ in 0..1024 {
            outcome = lease.write(&chunk);
            if outcome.is_err() {
                break;
            }
        }
        let err = outcome.unwrap_err();
        match &err {
            // nothing of the frame went out: stream is intact
            CkvError::WriteTimeout => {
                assert!(err.is_retryable());
                assert!(endpoint.is_connected());
            }
            // part of the frame went out: stream is poisoned
            CkvError::Io(_) => {
                assert!(!err.is_retryable());
                assert!(!endpoint.is_connected());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_transport());
        assert!(!endpoint.is_healthy());
        assert!(endpoint.score() > 0.9);

        drop(lease);
        release_tx.send(()).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn try_lease_fails_while_leased() {
        let endpoint = Endpoint::new("127.0.0.1:1", options(100));
        let lease = endpoint.lease();
        assert!(endpoint.try_lease().is_none());
        drop(lease);
        assert!(endpoint.try_lease().is_some());
    }

    #[test]
    fn double_close_is_harmless() {
        let endpoint = Endpoint::new("127.0.0.1:1", options(100));
        endpoint.close();
        endpoint.close();
        assert!(!endpoint.is_connected());
    }
}
