// src/core/probe.rs

//! Concurrent TCP probing.
//!
//! Every probe is a full TCP connect bounded by a timeout, optionally followed
//! by a single bounded read to capture a service banner. Batches of ports are
//! dispatched to a pool of at most `max_concurrency` tokio tasks guarded by a
//! semaphore; workers push their outcome into a channel drained by a single
//! aggregating consumer, so the host map always holds exactly one entry per
//! requested port.
//!
//! Per-port failures never abort a batch and never escape this module: they
//! are recorded in the port's [`ProbeResult`]. There is no cancellation input;
//! an in-flight batch finishes once every task has connected or timed out.

use crate::config::MAX_PROBE_CONCURRENCY;
use crate::core::models::{ResultTree, ResultValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use strum::Display;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const BANNER_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum PortState {
    Open,
    Closed,
    FilteredOrError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection refused")]
    Refused,
    #[error("could not resolve '{host}': {reason}")]
    Resolve { host: String, reason: String },
    #[error("{0}")]
    Io(String),
    #[error("probe worker aborted")]
    Aborted,
}

/// One port-connectivity test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTask {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub connect_timeout: Duration,
    /// When set, the open connection is read once for a banner.
    pub read_timeout: Option<Duration>,
}

impl ProbeTask {
    pub fn tcp(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: Protocol::Tcp,
            connect_timeout,
            read_timeout: None,
        }
    }

    pub fn with_banner(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    /// Resolves the host and runs the probe.
    pub async fn execute(self) -> ProbeResult {
        match resolve_host(&self.host).await {
            Ok(ip) => probe_resolved(ip, &self).await,
            Err(e) => ProbeResult::failed(self.port, e),
        }
    }
}

/// Outcome of a single [`ProbeTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub port: u16,
    pub state: PortState,
    pub banner: Option<String>,
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    fn open(port: u16, banner: Option<String>) -> Self {
        Self { port, state: PortState::Open, banner, error: None }
    }

    fn failed(port: u16, error: ProbeError) -> Self {
        let state = match error {
            ProbeError::Refused => PortState::Closed,
            _ => PortState::FilteredOrError,
        };
        Self { port, state, banner: None, error: Some(error) }
    }
}

impl From<&ProbeResult> for ResultValue {
    fn from(result: &ProbeResult) -> Self {
        let mut tree = ResultTree::new()
            .with("Port", result.port)
            .with("State", result.state.to_string());
        if let Some(banner) = &result.banner {
            tree.insert("Banner", banner.as_str());
        }
        if let Some(error) = &result.error {
            tree.insert("Error", error.to_string());
        }
        tree.into()
    }
}

/// Host-level results keyed by port.
pub type HostProbeMap = BTreeMap<u16, ProbeResult>;

/// Resolves `host` to a single address, preferring IPv4.
pub async fn resolve_host(host: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let resolve_err = |reason: String| ProbeError::Resolve { host: host.to_string(), reason };
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| resolve_err(e.to_string()))?
        .collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .map(SocketAddr::ip)
        .ok_or_else(|| resolve_err("no addresses returned".to_string()))
}

/// Connects within `connect_timeout`, distinguishing refusal from timeout.
async fn connect(addr: SocketAddr, connect_timeout: Duration) -> Result<TcpStream, ProbeError> {
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => Err(ProbeError::Refused),
        Ok(Err(e)) => Err(ProbeError::Io(e.to_string())),
        Err(_) => Err(ProbeError::Timeout(connect_timeout)),
    }
}

/// Single bounded read. Silence, EOF or a whitespace-only payload is "no banner".
async fn read_banner(stream: &mut TcpStream, read_timeout: Duration) -> Result<Option<String>, ProbeError> {
    let mut buffer = [0u8; BANNER_BUFFER_SIZE];
    match timeout(read_timeout, stream.read(&mut buffer)).await {
        Ok(Ok(0)) => Ok(None),
        Ok(Ok(n)) => {
            let banner = String::from_utf8_lossy(&buffer[..n]).trim().to_string();
            Ok(Some(banner).filter(|b| !b.is_empty()))
        }
        Ok(Err(e)) => Err(ProbeError::Io(e.to_string())),
        Err(_) => Ok(None),
    }
}

async fn probe_resolved(ip: IpAddr, task: &ProbeTask) -> ProbeResult {
    let addr = SocketAddr::new(ip, task.port);
    let mut stream = match connect(addr, task.connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!(port = task.port, error = %e, "Port not open.");
            return ProbeResult::failed(task.port, e);
        }
    };
    debug!(port = task.port, "Port open.");

    let Some(read_timeout) = task.read_timeout else {
        return ProbeResult::open(task.port, None);
    };
    match read_banner(&mut stream, read_timeout).await {
        Ok(banner) => ProbeResult::open(task.port, banner),
        // The handshake succeeded, so the port stays open even if the read failed.
        Err(e) => ProbeResult { error: Some(e), ..ProbeResult::open(task.port, None) },
    }
}

/// Runs `worker` once per port on a semaphore-bounded set of tasks and folds
/// the outcomes into a map through a single consumer.
///
/// A port whose worker never reports back (a panicking task) is filled in
/// with `lost(port)`, so the map always has one entry per requested port.
async fn fan_out<T, F, Fut>(
    ports: &BTreeSet<u16>,
    max_concurrency: usize,
    worker: F,
    lost: impl Fn(u16) -> T,
) -> BTreeMap<u16, T>
where
    T: Send + 'static,
    F: Fn(u16) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let limit = max_concurrency.clamp(1, MAX_PROBE_CONCURRENCY);
    let semaphore = Arc::new(Semaphore::new(limit));
    let worker = Arc::new(worker);
    let (tx, mut rx) = mpsc::unbounded_channel::<(u16, T)>();

    for &port in ports {
        // The semaphore is never closed, so acquisition only fails on shutdown.
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            warn!("Probe semaphore closed, stopping dispatch.");
            break;
        };
        let tx = tx.clone();
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            let outcome = worker(port).await;
            drop(permit);
            let _ = tx.send((port, outcome));
        });
    }
    drop(tx);

    let mut results = BTreeMap::new();
    while let Some((port, outcome)) = rx.recv().await {
        results.insert(port, outcome);
    }
    for &port in ports {
        results.entry(port).or_insert_with(|| {
            warn!(port, "Probe worker did not report a result.");
            lost(port)
        });
    }
    results
}

/// Probes every port of `host` with the same options.
///
/// The host is resolved once; if that fails every port is recorded as
/// `FilteredOrError` carrying the resolution error.
pub async fn probe_host(
    host: &str,
    ports: &BTreeSet<u16>,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    max_concurrency: usize,
) -> HostProbeMap {
    info!(host, ports = ports.len(), max_concurrency, "Starting port probe batch.");

    let ip = match resolve_host(host).await {
        Ok(ip) => ip,
        Err(e) => {
            warn!(host, error = %e, "Host resolution failed.");
            return ports.iter().map(|&p| (p, ProbeResult::failed(p, e.clone()))).collect();
        }
    };

    let host_owned = host.to_string();
    let results = fan_out(
        ports,
        max_concurrency,
        move |port| {
            let task = ProbeTask {
                host: host_owned.clone(),
                port,
                protocol: Protocol::Tcp,
                connect_timeout,
                read_timeout,
            };
            async move { probe_resolved(ip, &task).await }
        },
        |port| ProbeResult::failed(port, ProbeError::Aborted),
    )
    .await;

    let open = results.values().filter(|r| r.state == PortState::Open).count();
    info!(host, probed = results.len(), open, "Port probe batch finished.");
    results
}

/// Determines which of `ports` accept a TCP connection within `per_connect_timeout`.
pub async fn scan_ports(
    host: &str,
    ports: &BTreeSet<u16>,
    per_connect_timeout: Duration,
    max_concurrency: usize,
) -> HostProbeMap {
    probe_host(host, ports, per_connect_timeout, None, max_concurrency).await
}

/// Opens a fresh connection and performs one bounded read.
///
/// `Ok(None)` means the peer accepted but sent nothing before `read_timeout`;
/// a failed connect is always an `Err`.
pub async fn grab_banner(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Option<String>, ProbeError> {
    let ip = resolve_host(host).await?;
    let mut stream = connect(SocketAddr::new(ip, port), connect_timeout).await?;
    let banner = read_banner(&mut stream, read_timeout).await;
    debug!(host, port, received = matches!(banner, Ok(Some(_))), "Banner grab finished.");
    banner
}

/// Grabs banners from several ports concurrently.
pub async fn grab_banners(
    host: &str,
    ports: &BTreeSet<u16>,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_concurrency: usize,
) -> BTreeMap<u16, Result<Option<String>, ProbeError>> {
    let host_owned = host.to_string();
    fan_out(
        ports,
        max_concurrency,
        move |port| {
            let host = host_owned.clone();
            async move { grab_banner(&host, port, connect_timeout, read_timeout).await }
        },
        |_| Err(ProbeError::Aborted),
    )
    .await
}
