use chrono::{DateTime, Local};
use std::time::Duration;

/// One snapshot of a host, produced by the collector once per cycle.
#[derive(Debug, Clone, Default)]
pub struct HostMetrics {
    pub timestamp: Option<DateTime<Local>>,
    pub cpu: CpuMetrics,
    pub ram: RamMetrics,
    pub gpu: Option<GpuMetrics>,
    pub network: Vec<NetworkInterface>,
    pub processes: Vec<ProcessInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct CpuMetrics {
    /// Aggregate usage in [0, 100].
    pub percent: f64,
    pub cores: usize,
    /// 1/5/15 minute load averages.
    pub load_avg: [f64; 3],
}

#[derive(Debug, Clone, Default)]
pub struct RamMetrics {
    pub used_bytes: i64,
    pub total_bytes: i64,
    pub cached_bytes: i64,
    pub available_bytes: i64,
}

impl RamMetrics {
    pub fn percent(&self) -> f64 {
        if self.total_bytes <= 0 {
            return 0.0;
        }
        return self.used_bytes as f64 / self.total_bytes as f64 * 100.0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct GpuMetrics {
    pub name: String,
    pub percent: f64,
    pub memory_used_bytes: i64,
    pub memory_total_bytes: i64,
    pub temperature_c: i64,
    pub power_watts: i64,
}

/// Cumulative interface counters, not rates.
#[derive(Debug, Clone, Default)]
pub struct NetworkInterface {
    pub name: String,
    pub bytes_in: i64,
    pub bytes_out: i64,
    pub packets_in: i64,
    pub packets_out: i64,
}

/// Already sorted by CPU on the remote side, bounded at 15 entries.
#[derive(Debug, Clone, Default)]
pub struct ProcessInfo {
    pub pid: i64,
    pub user: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub time: String,
    pub command: String,
}

/// Every known host has exactly one status at all times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Connecting,
    Idle,
    /// Online and holding a foreign rr lock.
    Running,
    /// Advisory, nothing assigns it yet.
    Slow,
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct HostLockInfo {
    pub is_locked: bool,
    pub holder: String,
    pub started_at: Option<DateTime<Local>>,
    pub command: String,
}

/// Per-host connection tracking owned by the model.
#[derive(Debug, Clone, Default)]
pub struct HostConnectionState {
    /// Successive failed cycles since the last success.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// At least one success ever.
    pub connected: bool,
    pub last_attempt: Option<DateTime<Local>>,
}

/// The unit streamed from the collector to the model.
#[derive(Debug, Clone, Default)]
pub struct HostResult {
    pub alias: String,
    pub metrics: Option<HostMetrics>,
    pub error: Option<String>,
    pub lock_info: Option<HostLockInfo>,
    /// Endpoint that won the dial race.
    pub connected_via: String,
    /// Round trip of the lightweight probe, not the metrics command.
    pub latency: Option<Duration>,
}

impl HostResult {
    pub fn failed(alias: &str, error: String) -> Self {
        return HostResult {
            alias: alias.to_string(),
            error: Some(error),
            ..Default::default()
        };
    }
}
