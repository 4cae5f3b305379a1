//! # Endpoint Pool
//!
//! Purpose: Hold every cluster member and pick a good one per request.
//!
//! ## Design Principles
//! 1. **Strict Selection**: Only endpoints that are healthy, connected and
//!    below the error threshold are handed out. When none qualify the caller
//!    gets [`CkvError::AllNodesDown`] instead of a known-bad endpoint.
//! 2. **Short Critical Section**: The map lock covers the snapshot and the
//!    random pick, never network I/O.
//! 3. **Per-Endpoint Locks**: Requests against different endpoints never
//!    contend; each endpoint guards its own socket and score.

use std::collections::HashMap;
use std::fmt;
use std::net::ToSocketAddrs;
use std::sync::Arc;

use ckv_common::{CkvError, CkvResult};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::endpoint::{Endpoint, EndpointOptions};

/// Point-in-time view of one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointStatus {
    pub addr: String,
    pub score: f64,
    pub healthy: bool,
    pub connected: bool,
}

/// Set of endpoints keyed by address.
pub struct EndpointPool {
    endpoints: RwLock<HashMap<String, Arc<Endpoint>>>,
    options: EndpointOptions,
    error_threshold: f64,
}

impl EndpointPool {
    /// Builds a pool from `config.cluster`. Addresses that do not resolve
    /// are logged and left out.
    pub fn new(config: &ClientConfig) -> Self {
        let pool = EndpointPool::empty(EndpointOptions::from(config), config.error_threshold);
        for addr in &config.cluster {
            if let Err(err) = pool.add_endpoint(addr) {
                warn!(addr = %addr, error = %err, "rejecting endpoint");
            }
        }
        info!(
            endpoints = pool.len(),
            threshold = pool.error_threshold,
            "endpoint pool created"
        );
        pool
    }

    /// Pool with no endpoints.
    pub fn empty(options: EndpointOptions, error_threshold: f64) -> Self {
        EndpointPool {
            endpoints: RwLock::new(HashMap::new()),
            options,
            error_threshold,
        }
    }

    pub fn error_threshold(&self) -> f64 {
        self.error_threshold
    }

    /// Adds an endpoint for `addr` (not dialed). Re-adding a known address
    /// keeps the existing endpoint.
    pub fn add_endpoint(&self, addr: &str) -> CkvResult<Arc<Endpoint>> {
        let resolved = addr
            .to_socket_addrs()
            .map_err(|e| CkvError::InvalidAddress(format!("{}: {}", addr, e)))?;
        if resolved.count() == 0 {
            return Err(CkvError::InvalidAddress(addr.to_string()));
        }

        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints
            .entry(addr.to_string())
            .or_insert_with(|| Arc::new(Endpoint::new(addr, self.options.clone())));
        Ok(endpoint.clone())
    }

    /// Removes and closes the endpoint for `addr`.
    pub fn remove_endpoint(&self, addr: &str) -> Option<Arc<Endpoint>> {
        let removed = self.endpoints.write().remove(addr);
        if let Some(endpoint) = &removed {
            endpoint.close();
            info!(addr = %addr, "endpoint removed");
        }
        removed
    }

    pub fn get(&self, addr: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.read().get(addr).cloned()
    }

    /// Snapshot of all endpoints.
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    /// Dials every endpoint and returns how many connected.
    ///
    /// Failed dials are left for the health loop to retry.
    pub fn dial_all(&self) -> CkvResult<usize> {
        let endpoints = self.endpoints();
        if endpoints.is_empty() {
            return Err(CkvError::ZeroNodes);
        }
        let connected = endpoints.iter().filter(|e| e.dial().is_ok()).count();
        info!(connected, total = endpoints.len(), "dialed cluster");
        Ok(connected)
    }

    /// Picks a random eligible endpoint.
    pub fn select(&self) -> CkvResult<Arc<Endpoint>> {
        let endpoints = self.endpoints.read();
        let eligible: Vec<&Arc<Endpoint>> = endpoints
            .values()
            .filter(|e| e.is_eligible(self.error_threshold))
            .collect();
        eligible
            .choose(&mut rand::thread_rng())
            .map(|e| Arc::clone(*e))
            .ok_or(CkvError::AllNodesDown)
    }

    /// Status of every endpoint, sorted by address.
    pub fn status(&self) -> Vec<EndpointStatus> {
        let mut status: Vec<EndpointStatus> = self
            .endpoints
            .read()
            .values()
            .map(|e| EndpointStatus {
                addr: e.addr().to_string(),
                score: e.score(),
                healthy: e.is_healthy(),
                connected: e.is_connected(),
            })
            .collect();
        status.sort_by(|a, b| a.addr.cmp(&b.addr));
        status
    }

    /// Closes every socket. Safe to call more than once.
    pub fn close(&self) {
        for endpoint in self.endpoints() {
            endpoint.close();
        }
    }
}

impl fmt::Display for EndpointPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, status) in self.status().iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "[{} {:.3}]", status.addr, status.score)?;
        }
        Ok(())
    }
}

impl fmt::Debug for EndpointPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointPool")
            .field("endpoints", &self.status())
            .field("error_threshold", &self.error_threshold)
            .finish()
    }
}
