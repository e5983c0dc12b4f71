//! Node Configuration
//!
//! Command-line configuration of a node and the serde-friendly settings
//! structs handed to the work manager and the worker pools.

use crate::executor::pool::PoolConfig;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Default per-call timeout for remote requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkManagerConfig {
    /// Broadcast statistics deltas to peers.
    pub statistics_enabled: bool,
    /// Upper bound for every request/response transport call.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
}

impl Default for WorkManagerConfig {
    fn default() -> Self {
        Self {
            statistics_enabled: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Which admission policy a node installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyChoice {
    Always,
    Never,
    WaterMark(u64),
}

impl FromStr for PolicyChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "always" => Ok(PolicyChoice::Always),
            "never" => Ok(PolicyChoice::Never),
            other => match other.strip_prefix("watermark:") {
                Some(level) => Ok(PolicyChoice::WaterMark(
                    level
                        .parse()
                        .with_context(|| format!("invalid watermark level '{}'", level))?,
                )),
                None => bail!("unknown policy '{}'", other),
            },
        }
    }
}

/// Which node selector a node installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorChoice {
    FirstAvailable,
    MaxFreeWorkers,
}

impl FromStr for SelectorChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first-available" => Ok(SelectorChoice::FirstAvailable),
            "max-free" => Ok(SelectorChoice::MaxFreeWorkers),
            other => bail!("unknown selector '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Gossip address; RPC listens on port + 1 and HTTP on port + 1000.
    pub bind_addr: SocketAddr,
    pub seed_nodes: Vec<SocketAddr>,
    pub policy: PolicyChoice,
    pub selector: SelectorChoice,
    pub work_manager: WorkManagerConfig,
    pub pool: PoolConfig,
}

impl NodeConfig {
    pub const USAGE: &'static str = "--bind <addr:port> [--seed <addr:port>]... \
        [--policy always|never|watermark:<n>] [--selector first-available|max-free] \
        [--timeout-ms <n>] [--short-threads <n>] [--long-threads <n>] [--no-statistics]";

    /// Parses the process arguments (without the program name).
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();

        let mut bind_addr: Option<SocketAddr> = None;
        let mut seed_nodes = vec![];
        let mut policy = PolicyChoice::Always;
        let mut selector = SelectorChoice::FirstAvailable;
        let mut work_manager = WorkManagerConfig::default();
        let mut pool = PoolConfig::default();

        let value = |i: usize| -> Result<&str> {
            args.get(i + 1)
                .map(String::as_str)
                .with_context(|| format!("missing value for {}", args[i]))
        };

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--bind" => {
                    bind_addr = Some(value(i)?.parse()?);
                    i += 2;
                }
                "--seed" => {
                    seed_nodes.push(value(i)?.parse()?);
                    i += 2;
                }
                "--policy" => {
                    policy = value(i)?.parse()?;
                    i += 2;
                }
                "--selector" => {
                    selector = value(i)?.parse()?;
                    i += 2;
                }
                "--timeout-ms" => {
                    work_manager.request_timeout = Duration::from_millis(value(i)?.parse()?);
                    i += 2;
                }
                "--short-threads" => {
                    pool.short_running_threads = value(i)?.parse()?;
                    i += 2;
                }
                "--long-threads" => {
                    pool.long_running_threads = value(i)?.parse()?;
                    i += 2;
                }
                "--no-statistics" => {
                    work_manager.statistics_enabled = false;
                    i += 1;
                }
                other => {
                    tracing::warn!("Ignoring unknown argument '{}'", other);
                    i += 1;
                }
            }
        }

        let bind_addr = bind_addr.context("--bind is required")?;

        if work_manager.request_timeout.is_zero() {
            bail!("--timeout-ms must be greater than zero");
        }
        if pool.short_running_threads == 0 || pool.long_running_threads == 0 {
            bail!("worker pools need at least one thread each");
        }

        Ok(Self {
            bind_addr,
            seed_nodes,
            policy,
            selector,
            work_manager,
            pool,
        })
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr.ip(), self.bind_addr.port() + 1)
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr.ip(), self.bind_addr.port() + 1000)
    }
}

/// Serializes a `Duration` as whole milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
