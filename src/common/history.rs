use std::collections::HashMap;
use std::sync::RwLock;

use crate::common::RingBuffer;
use crate::monitor::metrics::HostMetrics;

/// Derived per-interface transfer rate.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceRate {
    pub name: String,
    pub bytes_in_per_sec: f64,
    pub bytes_out_per_sec: f64,
}

struct InterfaceHistory {
    bytes_in: RingBuffer,
    bytes_out: RingBuffer,
}

/// Ring buffers of one host: CPU %, RAM %, optional GPU % and cumulative
/// byte counters per interface. GPU and interface rings are created lazily
/// on the first sample that carries them.
struct HostHistory {
    cpu: RingBuffer,
    ram: RingBuffer,
    gpu: Option<RingBuffer>,
    network: HashMap<String, InterfaceHistory>,
}

impl HostHistory {
    fn new(capacity: usize) -> Self {
        return HostHistory {
            cpu: RingBuffer::new(capacity),
            ram: RingBuffer::new(capacity),
            gpu: None,
            network: HashMap::new(),
        };
    }
}

/// Sample history for every host, one writer (the result delivery thread)
/// and many readers (renderers). Readers get owned copies, never references
/// into the rings.
pub struct HistoryStore {
    capacity: usize,
    hosts: RwLock<HashMap<String, HostHistory>>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        return HistoryStore {
            capacity,
            hosts: RwLock::new(HashMap::new()),
        };
    }

    pub fn push(&self, alias: &str, metrics: Option<&HostMetrics>) {
        let Some(metrics) = metrics else {
            return;
        };

        let mut hosts = self.hosts.write().unwrap();
        let history = hosts
            .entry(alias.to_string())
            .or_insert_with(|| HostHistory::new(self.capacity));

        history.cpu.push(metrics.cpu.percent);
        if metrics.ram.total_bytes > 0 {
            history.ram.push(metrics.ram.percent());
        }
        if let Some(gpu) = &metrics.gpu {
            history
                .gpu
                .get_or_insert_with(|| RingBuffer::new(self.capacity))
                .push(gpu.percent);
        }
        for interface in &metrics.network {
            let entry = history
                .network
                .entry(interface.name.clone())
                .or_insert_with(|| InterfaceHistory {
                    bytes_in: RingBuffer::new(self.capacity),
                    bytes_out: RingBuffer::new(self.capacity),
                });
            entry.bytes_in.push(interface.bytes_in as f64);
            entry.bytes_out.push(interface.bytes_out as f64);
        }
    }

    pub fn get_cpu(&self, alias: &str, k: usize) -> Option<Vec<f64>> {
        let hosts = self.hosts.read().unwrap();
        return hosts.get(alias).map(|h| h.cpu.tail(k));
    }

    pub fn get_ram(&self, alias: &str, k: usize) -> Option<Vec<f64>> {
        let hosts = self.hosts.read().unwrap();
        return hosts.get(alias).map(|h| h.ram.tail(k));
    }

    pub fn get_gpu(&self, alias: &str, k: usize) -> Option<Vec<f64>> {
        let hosts = self.hosts.read().unwrap();
        return hosts.get(alias).and_then(|h| h.gpu.as_ref()).map(|g| g.tail(k));
    }

    /// (bytes-in, bytes-out) tail windows of one interface.
    pub fn get_network_history(
        &self,
        alias: &str,
        interface: &str,
        k: usize,
    ) -> Option<(Vec<f64>, Vec<f64>)> {
        let hosts = self.hosts.read().unwrap();
        return hosts
            .get(alias)
            .and_then(|h| h.network.get(interface))
            .map(|i| (i.bytes_in.tail(k), i.bytes_out.tail(k)));
    }

    /// Per-interface rates derived from the last two counter samples.
    /// Counter wrap/reset shows up as a negative delta and clamps to 0.
    pub fn get_network_rates(&self, alias: &str, interval_seconds: f64) -> Vec<InterfaceRate> {
        if interval_seconds <= 0.0 {
            return Vec::new();
        }

        let hosts = self.hosts.read().unwrap();
        let Some(history) = hosts.get(alias) else {
            return Vec::new();
        };

        let rate = |ring: &RingBuffer| -> f64 {
            let window = ring.tail(2);
            if window.len() < 2 {
                return 0.0;
            }
            return (window[1] - window[0]).max(0.0) / interval_seconds;
        };

        let mut rates: Vec<InterfaceRate> = history
            .network
            .iter()
            .map(|(name, interface)| InterfaceRate {
                name: name.clone(),
                bytes_in_per_sec: rate(&interface.bytes_in),
                bytes_out_per_sec: rate(&interface.bytes_out),
            })
            .collect();
        rates.sort_by(|a, b| a.name.cmp(&b.name));
        return rates;
    }

    /// Sum of interface rates excluding loopback.
    pub fn get_total_network_rate(&self, alias: &str, interval_seconds: f64) -> (f64, f64) {
        let mut total_in = 0.0;
        let mut total_out = 0.0;
        for rate in self.get_network_rates(alias, interval_seconds) {
            if rate.name == "lo" || rate.name == "lo0" {
                continue;
            }
            total_in += rate.bytes_in_per_sec;
            total_out += rate.bytes_out_per_sec;
        }
        return (total_in, total_out);
    }

    pub fn count(&self, alias: &str) -> usize {
        let hosts = self.hosts.read().unwrap();
        return hosts.get(alias).map_or(0, |h| h.cpu.len());
    }

    pub fn clear(&self, alias: &str) {
        self.hosts.write().unwrap().remove(alias);
    }

    pub fn clear_all(&self) {
        self.hosts.write().unwrap().clear();
    }
}
