use anyhow::{Result, anyhow};

use crate::monitor::metrics::{GpuMetrics, NetworkInterface, RamMetrics};

/// Raw jiffies snapshot of /proc/stat; CPU usage needs two of these.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub total: u64,
    pub idle: u64,
    pub cores: usize,
}

pub fn parse_stat(section: &str) -> CpuTimes {
    let mut times = CpuTimes::default();

    for line in section.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(&label) = fields.first() else {
            continue;
        };

        if label == "cpu" {
            for field in &fields[1..] {
                times.total += field.parse::<u64>().unwrap_or(0);
            }
            // idle + iowait both count as idle time
            times.idle = fields.get(4).and_then(|f| f.parse().ok()).unwrap_or(0)
                + fields.get(5).and_then(|f| f.parse().ok()).unwrap_or(0);
        } else if label.starts_with("cpu") && label[3..].chars().all(|c| c.is_ascii_digit()) {
            times.cores += 1;
        }
    }

    return times;
}

/// Usage between two consecutive snapshots. The first sample of a host has
/// no previous snapshot and reports 0.
pub fn cpu_percent_delta(prev: Option<CpuTimes>, current: CpuTimes) -> f64 {
    let Some(prev) = prev else {
        return 0.0;
    };

    let delta_total = current.total.saturating_sub(prev.total);
    let delta_idle = current.idle.saturating_sub(prev.idle);
    if delta_total == 0 {
        return 0.0;
    }

    let percent = (delta_total.saturating_sub(delta_idle)) as f64 / delta_total as f64 * 100.0;
    return percent.clamp(0.0, 100.0);
}

pub fn parse_loadavg(section: &str) -> [f64; 3] {
    let mut load = [0.0; 3];
    let fields: Vec<&str> = section.split_whitespace().collect();
    for (i, slot) in load.iter_mut().enumerate() {
        *slot = fields.get(i).and_then(|f| f.parse().ok()).unwrap_or(0.0);
    }
    return load;
}

/// /proc/meminfo. This is the one parser that fails the whole host record:
/// with fewer than three of the expected fields the numbers derived below
/// would be garbage rather than merely incomplete.
pub fn parse_meminfo(section: &str) -> Result<RamMetrics> {
    let mut total = 0i64;
    let mut free = 0i64;
    let mut available = 0i64;
    let mut buffers = 0i64;
    let mut cached = 0i64;
    let mut found = 0;

    for line in section.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        let value_kib: i64 = fields[1].parse().unwrap_or(0);
        let target = match fields[0].trim_end_matches(':') {
            "MemTotal" => &mut total,
            "MemFree" => &mut free,
            "MemAvailable" => &mut available,
            "Buffers" => &mut buffers,
            "Cached" => &mut cached,
            _ => continue,
        };
        *target = value_kib * 1024;
        found += 1;
    }

    if found < 3 {
        return Err(anyhow!(
            "unrecognized /proc/meminfo output ({} of 5 expected fields)",
            found
        ));
    }

    return Ok(RamMetrics {
        used_bytes: total - free - buffers - cached,
        total_bytes: total,
        cached_bytes: cached + buffers,
        available_bytes: available,
    });
}

pub fn parse_net_dev(section: &str) -> Vec<NetworkInterface> {
    let mut interfaces = Vec::new();

    // Two header lines, then one line per interface:
    //   eth0: bytes packets errs drop fifo frame compressed multicast bytes ...
    for line in section.lines().skip(2) {
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<&str> = counters.split_whitespace().collect();
        if fields.len() < 16 {
            continue;
        }

        let field = |i: usize| -> i64 { fields[i].parse().unwrap_or(0) };
        interfaces.push(NetworkInterface {
            name: name.trim().to_string(),
            bytes_in: field(0),
            packets_in: field(1),
            bytes_out: field(8),
            packets_out: field(9),
        });
    }

    return interfaces;
}

const NVIDIA_FAILURE_MARKERS: &[&str] = &[
    "no devices",
    "not found",
    "failed",
    "error",
    "command not found",
];

/// nvidia-smi CSV row: name, util %, mem used MiB, mem total MiB, temp, W.
/// Returns None ("no GPU") for hosts without a working nvidia-smi.
pub fn parse_nvidia_csv(section: &str) -> Option<GpuMetrics> {
    let trimmed = section.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if NVIDIA_FAILURE_MARKERS.iter().any(|m| lowered.contains(m)) {
        return None;
    }

    let fields: Vec<&str> = trimmed
        .lines()
        .next()
        .unwrap_or_default()
        .split(',')
        .map(|f| f.trim())
        .collect();
    if fields.len() < 6 {
        return None;
    }

    // "[N/A]" and empty fields stay zero
    let number = |i: usize| -> f64 {
        let field = fields[i];
        if field.is_empty() || field == "[N/A]" {
            return 0.0;
        }
        return field.parse().unwrap_or(0.0);
    };

    return Some(GpuMetrics {
        name: fields[0].to_string(),
        percent: number(1),
        memory_used_bytes: (number(2) * 1024.0 * 1024.0) as i64,
        memory_total_bytes: (number(3) * 1024.0 * 1024.0) as i64,
        temperature_c: number(4) as i64,
        power_watts: number(5).round() as i64,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STAT: &str = "\
cpu  100 0 200 600 100 0 0 0 0 0
cpu0 25 0 50 150 25 0 0 0 0 0
cpu1 25 0 50 150 25 0 0 0 0 0
cpu2 25 0 50 150 25 0 0 0 0 0
cpu3 25 0 50 150 25 0 0 0 0 0
intr 12345
ctxt 67890";

    #[test]
    fn test_parse_stat() {
        let times = parse_stat(STAT);
        assert_eq!(times.total, 1000);
        assert_eq!(times.idle, 700);
        assert_eq!(times.cores, 4);
    }

    #[test]
    fn test_cpu_percent_first_sample_is_zero() {
        let current = CpuTimes {
            total: 1000,
            idle: 800,
            cores: 4,
        };
        assert_eq!(cpu_percent_delta(None, current), 0.0);
    }

    #[test]
    fn test_cpu_percent_delta() {
        let prev = CpuTimes {
            total: 1000,
            idle: 800,
            cores: 4,
        };
        let current = CpuTimes {
            total: 1500,
            idle: 1100,
            cores: 4,
        };
        // (500 - 300) / 500 * 100
        assert_eq!(cpu_percent_delta(Some(prev), current), 40.0);
    }

    #[test]
    fn test_cpu_percent_no_progress() {
        let sample = CpuTimes {
            total: 1000,
            idle: 800,
            cores: 4,
        };
        assert_eq!(cpu_percent_delta(Some(sample), sample), 0.0);
        // Counter went backwards (host reboot)
        let earlier = CpuTimes {
            total: 500,
            idle: 400,
            cores: 4,
        };
        assert_eq!(cpu_percent_delta(Some(sample), earlier), 0.0);
    }

    #[test]
    fn test_parse_loadavg() {
        assert_eq!(
            parse_loadavg("0.52 1.10 2.50 2/1234 56789\n"),
            [0.52, 1.10, 2.50]
        );
        assert_eq!(parse_loadavg(""), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_parse_meminfo() {
        let section = "\
MemTotal:       16384000 kB
MemFree:         1234567 kB
MemAvailable:    8765432 kB
Buffers:          123456 kB
Cached:          4567890 kB
SwapTotal:       2097152 kB";
        let ram = parse_meminfo(section).unwrap();
        assert_eq!(ram.total_bytes, 16384000 * 1024);
        assert_eq!(ram.available_bytes, 8765432 * 1024);
        assert_eq!(ram.cached_bytes, (4567890 + 123456) * 1024);
        assert_eq!(
            ram.used_bytes,
            (16384000 - 1234567 - 123456 - 4567890) * 1024
        );
    }

    #[test]
    fn test_parse_meminfo_too_few_fields() {
        assert_eq!(parse_meminfo("MemTotal: 1 kB\nMemFree: 1 kB").is_err(), true);
        assert_eq!(parse_meminfo("").is_err(), true);
        assert_eq!(parse_meminfo("garbage\nmore garbage").is_err(), true);
    }

    #[test]
    fn test_parse_net_dev() {
        let section = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000    10    0    0    0     0          0         0     1000    10    0    0    0     0       0          0
  eth0: 55555   444   0    0    0     0          0         0     66666   333   0    0    0     0       0          0";
        let interfaces = parse_net_dev(section);
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[1].name, "eth0");
        assert_eq!(interfaces[1].bytes_in, 55555);
        assert_eq!(interfaces[1].packets_in, 444);
        assert_eq!(interfaces[1].bytes_out, 66666);
        assert_eq!(interfaces[1].packets_out, 333);
    }

    #[test]
    fn test_parse_net_dev_short_line_skipped() {
        let section = "header\nheader\n  bad0: 1 2 3\n";
        assert_eq!(parse_net_dev(section).len(), 0);
    }

    #[test]
    fn test_parse_nvidia_csv() {
        let gpu =
            parse_nvidia_csv("NVIDIA GeForce RTX 3080, 45, 2048, 10240, 65, 220").unwrap();
        assert_eq!(gpu.name, "NVIDIA GeForce RTX 3080");
        assert_eq!(gpu.percent, 45.0);
        assert_eq!(gpu.memory_used_bytes, 2048 * 1024 * 1024);
        assert_eq!(gpu.memory_total_bytes, 10240 * 1024 * 1024);
        assert_eq!(gpu.temperature_c, 65);
        assert_eq!(gpu.power_watts, 220);
    }

    #[test]
    fn test_parse_nvidia_csv_no_gpu() {
        assert_eq!(parse_nvidia_csv("").is_none(), true);
        assert_eq!(parse_nvidia_csv("No devices were found").is_none(), true);
        assert_eq!(
            parse_nvidia_csv("nvidia-smi: command not found").is_none(),
            true
        );
        assert_eq!(
            parse_nvidia_csv("NVIDIA-SMI has failed because it couldn't communicate").is_none(),
            true
        );
    }

    #[test]
    fn test_parse_nvidia_csv_not_available_fields() {
        let gpu = parse_nvidia_csv("Tesla K80, [N/A], 100, 11441, [N/A], ").unwrap();
        assert_eq!(gpu.percent, 0.0);
        assert_eq!(gpu.temperature_c, 0);
        assert_eq!(gpu.power_watts, 0);
        assert_eq!(gpu.memory_used_bytes, 100 * 1024 * 1024);
    }
}
