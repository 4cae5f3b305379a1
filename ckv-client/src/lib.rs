//! # ClusterKV Sync Client
//!
//! Purpose: Turn a set of cluster endpoints, each independently healthy or
//! not, into one logical blocking connection.
//!
//! ## Design Principles
//! 1. **Health-Scored Selection**: Each endpoint carries a decaying error
//!    score; requests only go to endpoints below the threshold.
//! 2. **Exclusive Leases**: One request/response exchange owns a socket
//!    from the first byte written to the last byte read.
//! 3. **Bounded Everything**: Every transfer has a deadline, every retry
//!    loop a limit, every background redial a backoff ceiling.
//! 4. **Protocol Clarity**: Framing and dispatch live in `ckv-common`; this
//!    crate never inspects payload bytes itself.

mod client;
mod config;
mod decaying;
mod endpoint;
mod health;
mod pool;
mod retry;
mod stream;

pub use ckv_common::{CkvError, CkvResult, ErrorKind, MessageCode, Request, Response};
pub use client::Client;
pub use config::{BackoffConfig, ClientConfig};
pub use decaying::DecayingCounter;
pub use endpoint::{Endpoint, EndpointOptions, Lease, DIAL_FAILURE_WEIGHT, IO_FAILURE_WEIGHT};
pub use health::{HealthCheckConfig, HealthChecker, HealthMonitor, ProbeOutcome};
pub use pool::{EndpointPool, EndpointStatus};
pub use retry::{NoRetry, RetryPolicy, SimpleRetryPolicy};
pub use stream::{collect_chunks, collect_raw, MapRedChunk, ResponseAggregator, StreamChunk};
