mod darwin;
mod linux;
mod process;

pub use linux::CpuTimes;
pub use linux::cpu_percent_delta;

use anyhow::Result;

use crate::monitor::metrics::HostMetrics;
use crate::monitor::platform::Platform;

/// Parsed batched-command output. Linux CPU usage needs two snapshots, so
/// the raw jiffies travel alongside the metrics and the collector fills
/// `cpu.percent` from its per-host delta state.
#[derive(Debug, Clone, Default)]
pub struct ParsedSections {
    pub metrics: HostMetrics,
    pub cpu_times: Option<CpuTimes>,
}

/// Maps the split sections to the per-platform parsers. Absent sections
/// leave their sub-record zero-valued; a present-but-unreadable meminfo
/// section is the single hard failure (§ the numbers would be garbage).
pub fn parse_sections(platform: Platform, sections: &[&str]) -> Result<ParsedSections> {
    let mut parsed = ParsedSections::default();

    match platform {
        Platform::Linux | Platform::Unknown => {
            if let Some(section) = sections.first() {
                let times = linux::parse_stat(section);
                parsed.metrics.cpu.cores = times.cores;
                parsed.cpu_times = Some(times);
            }
            if let Some(section) = sections.get(1) {
                parsed.metrics.cpu.load_avg = linux::parse_loadavg(section);
            }
            if let Some(section) = sections.get(2) {
                parsed.metrics.ram = linux::parse_meminfo(section)?;
            }
            if let Some(section) = sections.get(3) {
                parsed.metrics.network = linux::parse_net_dev(section);
            }
            if let Some(section) = sections.get(4) {
                parsed.metrics.gpu = linux::parse_nvidia_csv(section);
            }
            if let Some(section) = sections.get(5) {
                parsed.metrics.processes = process::parse_ps_aux(section);
            }
        }
        Platform::Darwin => {
            if let Some(section) = sections.first() {
                let (percent, load_avg) = darwin::parse_top(section);
                parsed.metrics.cpu.percent = percent;
                parsed.metrics.cpu.load_avg = load_avg;
            }
            if let Some(section) = sections.get(1) {
                parsed.metrics.ram = darwin::parse_vm_stat(section);
            }
            if let Some(section) = sections.get(2) {
                parsed.metrics.network = darwin::parse_netstat(section);
            }
            if let Some(section) = sections.get(3) {
                parsed.metrics.gpu = darwin::parse_ioreg(section);
            }
            if let Some(section) = sections.get(4) {
                parsed.metrics.processes = process::parse_ps_aux(section);
            }
        }
    }

    return Ok(parsed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::platform::split_sections;
    use pretty_assertions::assert_eq;

    const LINUX_OUTPUT: &str = "\
cpu  100 0 200 600 100 0 0 0 0 0
cpu0 50 0 100 300 50 0 0 0 0 0
cpu1 50 0 100 300 50 0 0 0 0 0
---
0.52 0.48 0.40 2/1234 56789
---
MemTotal:       16384000 kB
MemFree:         1234567 kB
MemAvailable:    8765432 kB
Buffers:          123456 kB
Cached:          4567890 kB
---
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
  eth0: 1000 10 0 0 0 0 0 0 2000 20 0 0 0 0 0 0
---
NVIDIA GeForce RTX 3080, 45, 2048, 10240, 65, 220
---
USER PID %CPU %MEM VSZ RSS TT STAT STARTED TIME COMMAND
root 1 1.5 0.1 1000 2000 ?? Ss 09:00 0:01.00 /sbin/init";

    #[test]
    fn test_parse_linux_sections() {
        let sections = split_sections(LINUX_OUTPUT);
        assert_eq!(sections.len(), 6);

        let parsed = parse_sections(Platform::Linux, &sections).unwrap();
        assert_eq!(parsed.cpu_times.unwrap().total, 1000);
        assert_eq!(parsed.metrics.cpu.cores, 2);
        assert_eq!(parsed.metrics.cpu.load_avg, [0.52, 0.48, 0.40]);
        assert_eq!(parsed.metrics.ram.total_bytes, 16384000 * 1024);
        assert_eq!(parsed.metrics.network.len(), 1);
        assert_eq!(parsed.metrics.gpu.as_ref().unwrap().percent, 45.0);
        assert_eq!(parsed.metrics.processes.len(), 1);
    }

    #[test]
    fn test_parse_linux_missing_tail_sections() {
        // Host returned CPU and loadavg only
        let output = "cpu  1 2 3 4 5 6 7 8 0 0\n---\n0.1 0.2 0.3 1/2 3";
        let sections = split_sections(output);
        let parsed = parse_sections(Platform::Linux, &sections).unwrap();
        assert_eq!(parsed.cpu_times.is_some(), true);
        assert_eq!(parsed.metrics.ram.total_bytes, 0);
        assert_eq!(parsed.metrics.gpu.is_none(), true);
        assert_eq!(parsed.metrics.processes.len(), 0);
    }

    #[test]
    fn test_parse_linux_bad_meminfo_fails_host() {
        let output = "cpu  1 2 3 4 5 6 7 8 0 0\n---\n0.1 0.2 0.3\n---\ngarbage";
        let sections = split_sections(output);
        assert_eq!(parse_sections(Platform::Linux, &sections).is_err(), true);
    }

    const DARWIN_OUTPUT: &str = "\
Processes: 601 total, 2 running
Load Avg: 1.87, 2.08, 2.03
CPU usage: 10.0% user, 10.0% sys, 80.0% idle
---
Mach Virtual Memory Statistics: (page size of 16384 bytes)
Pages free: 10000.
Pages active: 40000.
Pages inactive: 30000.
Pages speculative: 5000.
Pages wired down: 20000.
Pages purgeable: 2000.
File-backed pages: 25000.
Pages occupied by compressor: 15000.
hw.memsize: 34359738368
---
Name       Mtu   Network       Address            Ipkts Ierrs     Ibytes    Opkts Oerrs     Obytes  Coll
en0        1500  <Link#12>     aa:bb:cc:dd:ee:ff  77777     2   99999999    55555     0   88888888     0
---
    \"model\" = \"Apple M1 Pro\"
    \"PerformanceStatistics\" = {\"Device Utilization %\"=37,\"In use system memory\"=766286848}
---
USER PID %CPU %MEM VSZ RSS TT STAT STARTED TIME COMMAND
root 1 1.5 0.1 1000 2000 ?? Ss 09:00 0:01.00 /sbin/launchd";

    #[test]
    fn test_parse_darwin_sections() {
        let sections = split_sections(DARWIN_OUTPUT);
        assert_eq!(sections.len(), 5);

        let parsed = parse_sections(Platform::Darwin, &sections).unwrap();
        assert_eq!(parsed.cpu_times.is_none(), true);
        assert_eq!(parsed.metrics.cpu.percent, 20.0);
        assert_eq!(parsed.metrics.cpu.load_avg, [1.87, 2.08, 2.03]);
        assert_eq!(parsed.metrics.ram.total_bytes, 34359738368);
        assert_eq!(parsed.metrics.network.len(), 1);
        assert_eq!(parsed.metrics.gpu.as_ref().unwrap().name, "Apple M1 Pro");
        assert_eq!(parsed.metrics.processes.len(), 1);
    }
}
