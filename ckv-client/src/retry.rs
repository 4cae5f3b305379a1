//! # Retry Policies
//!
//! Purpose: Wrap one raw read or write with a bounded number of attempts.
//!
//! Only errors that leave the stream intact ([`CkvError::is_retryable`]) are
//! repeated. Everything else returns on the first failure.

use std::thread;
use std::time::Duration;

use ckv_common::{CkvResult, Frame};
use tracing::debug;

/// Strategy applied around every frame read and write.
pub trait RetryPolicy: Send + Sync {
    /// Runs `op` until it succeeds or the policy gives up.
    fn read(&self, op: &mut dyn FnMut() -> CkvResult<Frame>) -> CkvResult<Frame>;

    /// Runs `op(data)` until it succeeds or the policy gives up.
    fn write(&self, op: &mut dyn FnMut(&[u8]) -> CkvResult<()>, data: &[u8]) -> CkvResult<()>;
}

/// Fixed number of attempts with a fixed pause between them.
#[derive(Debug, Clone)]
pub struct SimpleRetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl SimpleRetryPolicy {
    /// `attempts` is the total number of invocations, at least one.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        SimpleRetryPolicy {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn run<T>(&self, mut op: impl FnMut() -> CkvResult<T>) -> CkvResult<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    debug!(attempt, error = %err, "retrying");
                    attempt += 1;
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for SimpleRetryPolicy {
    fn default() -> Self {
        SimpleRetryPolicy::new(3, Duration::from_millis(50))
    }
}

impl RetryPolicy for SimpleRetryPolicy {
    fn read(&self, op: &mut dyn FnMut() -> CkvResult<Frame>) -> CkvResult<Frame> {
        self.run(op)
    }

    fn write(&self, op: &mut dyn FnMut(&[u8]) -> CkvResult<()>, data: &[u8]) -> CkvResult<()> {
        self.run(|| op(data))
    }
}

/// Single attempt, errors returned untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn read(&self, op: &mut dyn FnMut() -> CkvResult<Frame>) -> CkvResult<Frame> {
        op()
    }

    fn write(&self, op: &mut dyn FnMut(&[u8]) -> CkvResult<()>, data: &[u8]) -> CkvResult<()> {
        op(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ckv_common::{CkvError, MessageCode};

    fn pong() -> Frame {
        Frame::empty(MessageCode::PingResp)
    }

    #[test]
    fn succeeds_on_third_attempt() {
        let policy = SimpleRetryPolicy::new(3, Duration::ZERO);
        let mut calls = 0;
        let result = policy.read(&mut || {
            calls += 1;
            if calls < 3 {
                Err(CkvError::ReadTimeout)
            } else {
                Ok(pong())
            }
        });
        assert_eq!(result.unwrap(), pong());
        assert_eq!(calls, 3);
    }

    #[test]
    fn returns_last_error_after_all_attempts() {
        let policy = SimpleRetryPolicy::new(3, Duration::ZERO);
        let mut calls = 0;
        let result = policy.write(
            &mut |_| {
                calls += 1;
                Err(CkvError::WriteTimeout)
            },
            b"frame",
        );
        assert!(matches!(result, Err(CkvError::WriteTimeout)));
        assert_eq!(calls, 3);
    }

    #[test]
    fn does_not_retry_permanent_errors() {
        let policy = SimpleRetryPolicy::new(3, Duration::ZERO);
        let mut calls = 0;
        let result = policy.read(&mut || {
            calls += 1;
            Err(CkvError::ObjectNotFound)
        });
        assert!(matches!(result, Err(CkvError::ObjectNotFound)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn write_passes_data_through() {
        let policy = SimpleRetryPolicy::default();
        let mut seen = Vec::new();
        policy
            .write(
                &mut |data| {
                    seen.extend_from_slice(data);
                    Ok(())
                },
                b"abc",
            )
            .unwrap();
        assert_eq!(seen, b"abc");
    }

    #[test]
    fn no_retry_invokes_once() {
        let mut calls = 0;
        let result = NoRetry.read(&mut || {
            calls += 1;
            Err(CkvError::ReadTimeout)
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        assert_eq!(SimpleRetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }
}
