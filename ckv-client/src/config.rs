//! # Client Configuration
//!
//! Purpose: Every tunable of the client in one serializable struct, with
//! defaults that match a small local cluster.
//!
//! Durations are stored as milliseconds so a config file reads naturally:
//!
//! ```json
//! { "cluster": ["10.0.0.1:8087", "10.0.0.2:8087"], "read_timeout_ms": 2000 }
//! ```

use std::time::Duration;

use ckv_common::{CkvError, CkvResult};
use serde::{Deserialize, Serialize};

/// Linear backoff between background redial attempts of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Wait before the first redial after a failure.
    /// Default: 500ms
    pub initial_ms: u64,
    /// Added to the wait after each further failed redial.
    /// Default: 500ms
    pub step_ms: u64,
    /// Upper bound for the wait.
    /// Default: 5000ms
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            step_ms: 500,
            max_ms: 5000,
        }
    }
}

impl BackoffConfig {
    /// Wait after `failures` consecutive failed redials (`failures >= 1`).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let extra = self
            .step_ms
            .saturating_mul(u64::from(failures.saturating_sub(1)));
        Duration::from_millis(self.initial_ms.saturating_add(extra).min(self.max_ms))
    }
}

/// Configuration for [`Client`](crate::Client) and its endpoint pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Cluster member addresses, e.g. "127.0.0.1:8087".
    pub cluster: Vec<String>,
    /// Deadline for reading one frame.
    pub read_timeout_ms: u64,
    /// Deadline for writing one frame.
    pub write_timeout_ms: u64,
    /// Deadline for opening a TCP connection.
    pub connect_timeout_ms: u64,
    /// Period of the background health loop.
    pub health_check_interval_ms: u64,
    /// Endpoints whose decayed error score reaches this value are skipped.
    pub error_threshold: f64,
    /// Half-life of the per-endpoint error score.
    pub decay_half_life_ms: u64,
    /// Total attempts for a timed-out read or write.
    pub retry_attempts: u32,
    /// Pause between retry attempts.
    pub retry_delay_ms: u64,
    /// Redial backoff used by the health loop.
    pub backoff: BackoffConfig,
    /// Zero an endpoint's score when the health loop restores it.
    pub reset_score_on_recovery: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cluster: vec!["127.0.0.1:8087".to_string()],
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
            connect_timeout_ms: 1000,
            health_check_interval_ms: 1000,
            error_threshold: 0.1,
            decay_half_life_ms: 10_000,
            retry_attempts: 3,
            retry_delay_ms: 50,
            backoff: BackoffConfig::default(),
            reset_score_on_recovery: false,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `cluster`.
    pub fn with_cluster<I, S>(cluster: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cluster: cluster.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> CkvResult<Self> {
        let config: ClientConfig =
            serde_json::from_str(json).map_err(|e| CkvError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the client cannot operate with.
    pub fn validate(&self) -> CkvResult<()> {
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 || self.connect_timeout_ms == 0
        {
            return Err(CkvError::InvalidConfig(
                "timeouts must be greater than zero".into(),
            ));
        }
        if self.health_check_interval_ms == 0 {
            return Err(CkvError::InvalidConfig(
                "health_check_interval_ms must be greater than zero".into(),
            ));
        }
        if !(self.error_threshold.is_finite() && self.error_threshold > 0.0) {
            return Err(CkvError::InvalidConfig(
                "error_threshold must be a positive number".into(),
            ));
        }
        if self.decay_half_life_ms == 0 {
            return Err(CkvError::InvalidConfig(
                "decay_half_life_ms must be greater than zero".into(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(CkvError::InvalidConfig(
                "retry_attempts must be at least 1".into(),
            ));
        }
        if self.backoff.initial_ms > self.backoff.max_ms {
            return Err(CkvError::InvalidConfig(
                "backoff.initial_ms exceeds backoff.max_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn decay_half_life(&self) -> Duration {
        Duration::from_millis(self.decay_half_life_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
