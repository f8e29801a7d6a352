use chrono::Local;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::monitor::lock;
use crate::monitor::metrics::{HostLockInfo, HostResult};
use crate::monitor::parser::{self, CpuTimes};
use crate::monitor::platform::{Platform, split_sections};
use crate::monitor::pool::ConnectionPool;
use crate::monitor::transport::Session;

/// One tick's fan-out: the bounded result stream plus the cancellation
/// handle of the whole cycle. Exactly one result per host arrives before
/// the channel closes.
pub struct Cycle {
    pub results: tokio::sync::mpsc::Receiver<HostResult>,
    pub cancel: CancellationToken,
}

impl Drop for Cycle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct Collector {
    pool: Arc<ConnectionPool>,
    hosts: Vec<String>,
    host_timeout: Duration,
    lock_dir: String,
    stale_lock: chrono::Duration,
    /// Previous /proc/stat snapshot per alias; host tasks race on distinct
    /// keys but share the map.
    cpu_times: Arc<Mutex<HashMap<String, CpuTimes>>>,
}

impl Collector {
    pub fn new(
        pool: Arc<ConnectionPool>,
        hosts: Vec<String>,
        host_timeout: Duration,
        lock_dir: String,
        stale_lock: chrono::Duration,
    ) -> Self {
        return Collector {
            pool,
            hosts,
            host_timeout,
            lock_dir,
            stale_lock,
            cpu_times: Arc::new(Mutex::new(HashMap::new())),
        };
    }

    pub fn hosts(&self) -> &[String] {
        return &self.hosts;
    }

    /// Launches one task per host and streams results as they complete.
    /// No cross-host ordering; a slow host never stalls the others.
    pub fn collect_streaming(&self) -> Cycle {
        let cancel = CancellationToken::new();
        let (result_tx, result_rx) =
            tokio::sync::mpsc::channel::<HostResult>(self.hosts.len().max(1));

        for alias in &self.hosts {
            let task = HostTask {
                alias: alias.clone(),
                pool: self.pool.clone(),
                host_timeout: self.host_timeout,
                lock_dir: self.lock_dir.clone(),
                stale_lock: self.stale_lock,
                cpu_times: self.cpu_times.clone(),
            };
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let result = tokio::select! {
                    result = task.run() => result,
                    _ = cancel.cancelled() => return,
                };
                // A task that got this far is allowed to finish its send
                // even if the cycle is being torn down
                let _ = result_tx.send(result).await;
            });
        }

        // Envelope backstop: the per-host timeout bounds each task, this
        // bounds the whole cycle however many hosts there are
        let envelope = self.host_timeout + Duration::from_secs(self.hosts.len().max(1) as u64);
        let watchdog = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(envelope) => watchdog.cancel(),
                _ = watchdog.cancelled() => {}
            }
        });

        return Cycle {
            results: result_rx,
            cancel,
        };
    }
}

struct HostTask {
    alias: String,
    pool: Arc<ConnectionPool>,
    host_timeout: Duration,
    lock_dir: String,
    stale_lock: chrono::Duration,
    cpu_times: Arc<Mutex<HashMap<String, CpuTimes>>>,
}

impl HostTask {
    async fn run(&self) -> HostResult {
        match tokio::time::timeout(self.host_timeout, self.collect()).await {
            Ok(result) => return result,
            Err(_) => {
                // The session may be wedged mid-command; evict it so the
                // next cycle starts from a fresh dial
                self.pool.close_one(&self.alias);
                return HostResult::failed(
                    &self.alias,
                    format!(
                        "timed out after {}s. Check the host is responsive",
                        self.host_timeout.as_secs()
                    ),
                );
            }
        }
    }

    async fn collect(&self) -> HostResult {
        let pooled = match self.pool.get_with_platform(&self.alias).await {
            Ok(pooled) => pooled,
            Err(err) => {
                self.pool.close_one(&self.alias);
                return HostResult::failed(&self.alias, format!("{:#}", err));
            }
        };

        let latency = self.probe_latency(pooled.session.as_ref()).await;

        let output = match self.run_metrics(pooled.session.as_ref(), pooled.platform).await {
            Ok(output) => output,
            Err(err) => {
                self.pool.close_one(&self.alias);
                return HostResult::failed(&self.alias, format!("{:#}", err));
            }
        };

        let sections = split_sections(&output);
        let mut parsed = match parser::parse_sections(pooled.platform, &sections) {
            Ok(parsed) => parsed,
            Err(err) => {
                // Parse failures are not transport failures; the session
                // stays pooled
                return HostResult::failed(&self.alias, format!("{:#}", err));
            }
        };

        if let Some(current) = parsed.cpu_times {
            parsed.metrics.cpu.percent = self.apply_cpu_delta(current);
        }
        parsed.metrics.timestamp = Some(Local::now());

        let lock_info = self.probe_lock(pooled.session.as_ref()).await;

        return HostResult {
            alias: self.alias.clone(),
            metrics: Some(parsed.metrics),
            error: None,
            lock_info,
            connected_via: pooled.connected_via,
            latency,
        };
    }

    /// Cheap round trip measured on its own channel, so the number means
    /// "how far away is this host" rather than "how slow is ps aux".
    async fn probe_latency(&self, session: &dyn Session) -> Option<Duration> {
        let probe_started = Instant::now();
        let mut channel = session.open_channel().await.ok()?;
        channel.run_combined("echo 1").await.ok()?;
        channel.close().await;
        return Some(probe_started.elapsed());
    }

    async fn run_metrics(&self, session: &dyn Session, platform: Platform) -> anyhow::Result<String> {
        let mut channel = session.open_channel().await?;
        let output = channel.run_combined(&platform.metrics_command()).await?;
        channel.close().await;
        return Ok(String::from_utf8_lossy(&output).into_owned());
    }

    fn apply_cpu_delta(&self, current: CpuTimes) -> f64 {
        let mut cpu_times = self.cpu_times.lock().unwrap();
        let previous = cpu_times.insert(self.alias.clone(), current);
        return parser::cpu_percent_delta(previous, current);
    }

    /// Non-fatal on every path: a host without the lock file, or one that
    /// refuses the probe, simply reads as unlocked.
    async fn probe_lock(&self, session: &dyn Session) -> Option<HostLockInfo> {
        let mut channel = session.open_channel().await.ok()?;
        let output = channel
            .run_combined(&lock::lock_command(&self.lock_dir))
            .await
            .ok()?;
        channel.close().await;

        let raw = String::from_utf8_lossy(&output);
        if raw.trim().is_empty() {
            return None;
        }
        return lock::parse_lock_info(&raw, self.stale_lock, Local::now());
    }
}
