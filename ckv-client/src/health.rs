//! # Health Loop
//!
//! Purpose: Bring failed endpoints back into selection in the background.
//!
//! ## Design Principles
//! 1. **Probe, Then Redial**: A connected endpoint gets a ping first; only a
//!    failed ping (or a missing socket) leads to close and redial.
//! 2. **Bounded Backoff**: Redials of one endpoint are spaced by a linear
//!    backoff with a ceiling, reset on success.
//! 3. **Never Block Requests**: Endpoints leased by a request are skipped for
//!    the tick.
//! 4. **Supervised Thread**: The loop stops when its monitor is stopped or
//!    dropped; nothing outlives the client.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ckv_common::CkvResult;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{debug, info};

use crate::config::{BackoffConfig, ClientConfig};
use crate::endpoint::Endpoint;
use crate::pool::EndpointPool;

/// Health loop settings.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub backoff: BackoffConfig,
    pub reset_score_on_recovery: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        HealthCheckConfig::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for HealthCheckConfig {
    fn from(config: &ClientConfig) -> Self {
        HealthCheckConfig {
            interval: config.health_check_interval(),
            backoff: config.backoff.clone(),
            reset_score_on_recovery: config.reset_score_on_recovery,
        }
    }
}

/// What one tick did to one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Nothing to do.
    Fine,
    /// Held by a request.
    Busy,
    /// Waiting out the redial backoff.
    BackingOff,
    /// Ping succeeded.
    Pinged,
    /// Redial succeeded.
    Redialed,
    /// Redial failed.
    Failed,
}

#[derive(Debug)]
struct RedialState {
    failures: u32,
    next_attempt: Instant,
}

/// One pass over the pool; owned by the monitor thread.
pub struct HealthChecker {
    pool: Arc<EndpointPool>,
    config: HealthCheckConfig,
    redial: HashMap<String, RedialState>,
}

impl HealthChecker {
    pub fn new(pool: Arc<EndpointPool>, config: HealthCheckConfig) -> Self {
        HealthChecker {
            pool,
            config,
            redial: HashMap::new(),
        }
    }

    /// Probes every endpoint that needs it.
    pub fn check_all(&mut self) -> Vec<(String, ProbeOutcome)> {
        let now = Instant::now();
        let endpoints = self.pool.endpoints();
        self.redial
            .retain(|addr, _| endpoints.iter().any(|e| e.addr() == addr));
        endpoints
            .iter()
            .map(|endpoint| (endpoint.addr().to_string(), self.check_endpoint(endpoint, now)))
            .collect()
    }

    /// Consecutive failed redials recorded for `addr`.
    pub fn redial_failures(&self, addr: &str) -> u32 {
        self.redial.get(addr).map_or(0, |state| state.failures)
    }

    fn check_endpoint(&mut self, endpoint: &Endpoint, now: Instant) -> ProbeOutcome {
        let threshold = self.pool.error_threshold();
        if endpoint.is_eligible(threshold) {
            self.redial.remove(endpoint.addr());
            return ProbeOutcome::Fine;
        }

        let mut lease = match endpoint.try_lease() {
            Some(lease) => lease,
            None => return ProbeOutcome::Busy,
        };

        if endpoint.is_connected() && lease.ping() {
            endpoint.mark_healthy(self.config.reset_score_on_recovery);
            self.redial.remove(endpoint.addr());
            debug!(addr = %endpoint.addr(), score = endpoint.score(), "ping ok");
            return ProbeOutcome::Pinged;
        }

        if let Some(state) = self.redial.get(endpoint.addr()) {
            if now < state.next_attempt {
                return ProbeOutcome::BackingOff;
            }
        }

        match lease.dial() {
            Ok(()) => {
                endpoint.mark_healthy(self.config.reset_score_on_recovery);
                self.redial.remove(endpoint.addr());
                info!(addr = %endpoint.addr(), score = endpoint.score(), "endpoint recovered");
                ProbeOutcome::Redialed
            }
            Err(err) => {
                let state = self
                    .redial
                    .entry(endpoint.addr().to_string())
                    .or_insert(RedialState {
                        failures: 0,
                        next_attempt: now,
                    });
                state.failures += 1;
                let delay = self.config.backoff.delay_for(state.failures);
                state.next_attempt = now + delay;
                debug!(
                    addr = %endpoint.addr(),
                    failures = state.failures,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "redial failed"
                );
                ProbeOutcome::Failed
            }
        }
    }
}

/// Handle to the background health thread.
pub struct HealthMonitor {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Starts a thread running `checker` every `interval`.
    pub fn spawn(mut checker: HealthChecker) -> CkvResult<Self> {
        let interval = if checker.config.interval.is_zero() {
            Duration::from_millis(1)
        } else {
            checker.config.interval
        };
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let join = thread::Builder::new()
            .name("ckv-health".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        checker.check_all();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        debug!(interval_ms = interval.as_millis() as u64, "health monitor started");
        Ok(HealthMonitor {
            stop: Some(stop_tx),
            join: Some(join),
        })
    }

    pub fn is_running(&self) -> bool {
        self.join.is_some()
    }

    /// Signals the thread and waits for it to exit.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
            debug!("health monitor stopped");
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointOptions;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn options() -> EndpointOptions {
        EndpointOptions {
            read_timeout: Duration::from_millis(200),
            write_timeout: Duration::from_millis(200),
            connect_timeout: Duration::from_millis(200),
            half_life: Duration::from_secs(10),
        }
    }

    fn checker(pool: &Arc<EndpointPool>, reset: bool) -> HealthChecker {
        HealthChecker::new(
            Arc::clone(pool),
            HealthCheckConfig {
                interval: Duration::from_millis(10),
                backoff: BackoffConfig::default(),
                reset_score_on_recovery: reset,
            },
        )
    }

    fn dead_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    }

    #[test]
    fn redials_disconnected_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let pool = Arc::new(EndpointPool::empty(options(), 0.1));
        pool.add_endpoint(&addr).unwrap();

        let mut checker = checker(&pool, true);
        let outcomes = checker.check_all();
        assert_eq!(outcomes, vec![(addr.clone(), ProbeOutcome::Redialed)]);
        assert!(pool.select().is_ok());
    }

    #[test]
    fn failed_redial_backs_off() {
        let addr = dead_addr();
        let pool = Arc::new(EndpointPool::empty(options(), 0.1));
        pool.add_endpoint(&addr).unwrap();

        let mut checker = checker(&pool, false);
        assert_eq!(checker.check_all()[0].1, ProbeOutcome::Failed);
        assert_eq!(checker.redial_failures(&addr), 1);
        // next attempt is 500ms away
        assert_eq!(checker.check_all()[0].1, ProbeOutcome::BackingOff);
        assert!(pool.get(&addr).unwrap().score() > 9.0);
    }

    #[test]
    fn skips_leased_endpoint() {
        let addr = dead_addr();
        let pool = Arc::new(EndpointPool::empty(options(), 0.1));
        let endpoint = pool.add_endpoint(&addr).unwrap();

        let mut checker = checker(&pool, false);
        let _lease = endpoint.lease();
        assert_eq!(checker.check_all()[0].1, ProbeOutcome::Busy);
    }

    #[test]
    fn ping_restores_unhealthy_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 5];
            stream.read_exact(&mut request).unwrap();
            stream.write_all(&[0, 0, 0, 1, 2]).unwrap();
        });

        let pool = Arc::new(EndpointPool::empty(options(), 0.1));
        let endpoint = pool.add_endpoint(&addr).unwrap();
        endpoint.dial().unwrap();
        endpoint.record_failure(1.0);
        assert!(pool.select().is_err());

        let mut checker = checker(&pool, true);
        assert_eq!(checker.check_all()[0].1, ProbeOutcome::Pinged);
        assert!(endpoint.is_healthy());
        assert_eq!(endpoint.score(), 0.0);
        assert!(pool.select().is_ok());
        server.join().unwrap();
    }

    #[test]
    fn monitor_stops_on_request() {
        let pool = Arc::new(EndpointPool::empty(options(), 0.1));
        let mut monitor = HealthMonitor::spawn(checker(&pool, false)).unwrap();
        assert!(monitor.is_running());
        thread::sleep(Duration::from_millis(30));
        monitor.stop();
        assert!(!monitor.is_running());
        monitor.stop();
    }
}
