//! # Cluster Benchmark Harness
//!
//! Purpose: Drive a live cluster through the client so throughput of the
//! pool, framing and selection path can be compared over time.
//!
//! Usage: `ckv-bench [cluster] [ops] [threads] [value_size]` where `cluster`
//! is a comma-separated address list.
//!
//! ## Design Principles
//! 1. **Shared Client**: All worker threads go through one `Client`, the
//!    same way an application would.
//! 2. **Allocation Control**: The stored value is built once, before timing.
//! 3. **Phase Isolation**: Ping, store and fetch are timed separately.

use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use ckv_client::{Client, ClientConfig};
use ckv_common::RpbContent;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CLUSTER: &str = "127.0.0.1:8087";
const DEFAULT_OP_COUNT: usize = 10_000;
const DEFAULT_THREADS: usize = 4;
const DEFAULT_VALUE_SIZE: usize = 128;
const BENCH_BUCKET: &[u8] = b"ckv-bench";

struct BenchConfig {
    cluster: Vec<String>,
    op_count: usize,
    threads: usize,
    value_size: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let cluster = args
            .next()
            .unwrap_or_else(|| DEFAULT_CLUSTER.to_string())
            .split(',')
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty())
            .collect();
        let op_count = parse_usize(args.next(), DEFAULT_OP_COUNT);
        let threads = parse_usize(args.next(), DEFAULT_THREADS).max(1);
        let value_size = parse_usize(args.next(), DEFAULT_VALUE_SIZE);

        BenchConfig {
            cluster,
            op_count,
            threads,
            value_size,
        }
    }

    fn ops_per_thread(&self) -> usize {
        (self.op_count / self.threads).max(1)
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn bench_key(thread: usize, idx: usize) -> Vec<u8> {
    format!("k{thread:02}-{idx:08}").into_bytes()
}

fn report(label: &str, ops: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let micros_per_op = (secs * 1e6) / (ops as f64);
    println!(
        "{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {micros_per_op:.1} us/op)"
    );
}

/// Runs `op(thread, idx)` on every worker and returns the wall time.
fn run_phase<F>(client: &Arc<Client>, config: &BenchConfig, op: F) -> Result<Duration>
where
    F: Fn(&Client, usize, usize) -> ckv_client::CkvResult<()> + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let per_thread = config.ops_per_thread();
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|thread_idx| {
            let client = Arc::clone(client);
            let op = Arc::clone(&op);
            thread::spawn(move || -> ckv_client::CkvResult<()> {
                for idx in 0..per_thread {
                    op(&client, thread_idx, idx)?;
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow!("worker thread panicked"))??;
    }
    Ok(start.elapsed())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("ckv-bench failed: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = BenchConfig::from_args();
    let client_config = ClientConfig::with_cluster(config.cluster.clone());
    let client = Client::new(client_config).context("building client")?;
    let connected = client.dial().context("dialing cluster")?;
    info!(connected, "cluster ready");
    let client = Arc::new(client);

    let total = config.ops_per_thread() * config.threads;
    println!(
        "cluster={}, connected={}, ops={}, threads={}, value_size={}",
        config.cluster.join(","),
        connected,
        total,
        config.threads,
        config.value_size
    );

    let elapsed = run_phase(&client, &config, |client, _, _| client.ping())?;
    report("ping", total, elapsed);

    let value = Arc::new(vec![b'v'; config.value_size]);
    let elapsed = run_phase(&client, &config, move |client, thread_idx, idx| {
        let content = RpbContent::binary(value.as_slice());
        client
            .store(BENCH_BUCKET, Some(bench_key(thread_idx, idx).as_slice()), content)
            .map(|_| ())
    })?;
    report("store", total, elapsed);

    let elapsed = run_phase(&client, &config, |client, thread_idx, idx| {
        client.fetch(BENCH_BUCKET, &bench_key(thread_idx, idx)).map(|_| ())
    })?;
    report("fetch", total, elapsed);

    println!("pool: {}", client.pool());
    client.close().context("closing client")?;
    Ok(())
}
