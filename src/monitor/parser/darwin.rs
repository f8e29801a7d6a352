use crate::monitor::metrics::{GpuMetrics, NetworkInterface, RamMetrics};

/// Apple Silicon page size; overridden by the vm_stat header marker.
const DEFAULT_PAGE_SIZE: i64 = 16384;

/// `top -l 1 -n 0` header: CPU usage plus the load triple.
pub fn parse_top(section: &str) -> (f64, [f64; 3]) {
    let mut percent = 0.0;
    let mut load = [0.0; 3];

    for line in section.lines() {
        if let Some(usage) = line.strip_prefix("CPU usage:") {
            // The part naming "idle" leads with the idle percentage
            for part in usage.split(',') {
                if !part.contains("idle") {
                    continue;
                }
                let idle: f64 = part
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .trim_end_matches('%')
                    .parse()
                    .unwrap_or(100.0);
                percent = (100.0 - idle).clamp(0.0, 100.0);
            }
        } else if let Some(avg) = line.strip_prefix("Load Avg:") {
            for (i, part) in avg.split(',').take(3).enumerate() {
                load[i] = part.trim().parse().unwrap_or(0.0);
            }
        }
    }

    return (percent, load);
}

/// vm_stat page counts plus the `sysctl hw.memsize` line appended to the
/// same section.
pub fn parse_vm_stat(section: &str) -> RamMetrics {
    let mut page_size = DEFAULT_PAGE_SIZE;
    let mut pages: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
    let mut memsize: Option<i64> = None;

    for line in section.lines() {
        if line.contains("page size of") {
            // "Mach Virtual Memory Statistics: (page size of 16384 bytes)"
            let fields: Vec<&str> = line.split_whitespace().collect();
            if let Some(position) = fields.iter().position(|f| *f == "of") {
                if let Some(size) = fields.get(position + 1).and_then(|f| f.parse().ok()) {
                    page_size = size;
                }
            }
            continue;
        }
        if let Some(value) = line.strip_prefix("hw.memsize:") {
            memsize = value.trim().parse().ok();
            continue;
        }
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let count: i64 = value.trim().trim_end_matches('.').parse().unwrap_or(0);
        pages.insert(label.trim().to_string(), count);
    }

    let page = |label: &str| -> i64 { pages.get(label).copied().unwrap_or(0) };

    let used = (page("Pages active")
        + page("Pages wired down")
        + page("Pages occupied by compressor"))
        * page_size;
    let available = (page("Pages free")
        + page("Pages inactive")
        + page("Pages purgeable")
        + page("Pages speculative"))
        * page_size;

    return RamMetrics {
        used_bytes: used,
        // hw.memsize may be missing when sysctl failed on the remote side
        total_bytes: memsize.unwrap_or(used + available),
        cached_bytes: page("File-backed pages") * page_size,
        available_bytes: available,
    };
}

/// `netstat -ib`. Only the `<Link#N>` rows carry interface-level counters;
/// per-address rows for the same interface are dropped (first seen wins).
pub fn parse_netstat(section: &str) -> Vec<NetworkInterface> {
    let mut interfaces: Vec<NetworkInterface> = Vec::new();
    let mut in_table = false;

    for line in section.lines() {
        if !in_table {
            in_table = line.starts_with("Name");
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if !fields.iter().any(|f| f.starts_with("<Link#")) {
            continue;
        }
        let Some(&name) = fields.first() else {
            continue;
        };
        if interfaces.iter().any(|i| i.name == name) {
            continue;
        }

        // Numeric fields in row order: Mtu Ipkts Ierrs Ibytes Opkts Oerrs
        // Obytes; the address column (a MAC, or nothing) is not numeric.
        let numbers: Vec<i64> = fields[1..]
            .iter()
            .filter_map(|f| f.parse().ok())
            .collect();
        if numbers.len() < 7 {
            continue;
        }

        interfaces.push(NetworkInterface {
            name: name.to_string(),
            packets_in: numbers[1],
            bytes_in: numbers[3],
            packets_out: numbers[4],
            bytes_out: numbers[6],
        });
    }

    return interfaces;
}

/// Apple GPU statistics scraped from `ioreg -c IOAccelerator`.
pub fn parse_ioreg(section: &str) -> Option<GpuMetrics> {
    let model = extract_quoted(section, "\"model\" = \"");
    let stats = extract_braced(section, "\"PerformanceStatistics\" = {");

    let mut gpu = GpuMetrics::default();
    let mut extracted = false;

    if let Some(model) = model {
        gpu.name = model;
        extracted = true;
    }
    if let Some(stats) = stats {
        if let Some(utilization) = scrape_number(&stats, "\"Device Utilization %\"") {
            gpu.percent = (utilization as f64).clamp(0.0, 100.0);
            extracted = true;
        }
        if let Some(in_use) = scrape_number(&stats, "\"In use system memory\"") {
            gpu.memory_used_bytes = in_use;
            extracted = true;
        }
        if let Some(alloc) = scrape_number(&stats, "\"Alloc system memory\"") {
            gpu.memory_total_bytes = alloc;
            extracted = true;
        }
    }

    if !extracted {
        return None;
    }
    if gpu.name.is_empty() {
        gpu.name = "Apple GPU".to_string();
    }
    return Some(gpu);
}

fn extract_quoted(haystack: &str, marker: &str) -> Option<String> {
    let start = haystack.find(marker)? + marker.len();
    let end = haystack[start..].find('"')?;
    return Some(haystack[start..start + end].to_string());
}

fn extract_braced(haystack: &str, marker: &str) -> Option<String> {
    let start = haystack.find(marker)? + marker.len();
    let end = haystack[start..].find('}')?;
    return Some(haystack[start..start + end].to_string());
}

fn scrape_number(haystack: &str, key: &str) -> Option<i64> {
    let start = haystack.find(key)? + key.len();
    let digits: String = haystack[start..]
        .chars()
        .skip_while(|c| *c == '=' || c.is_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    return digits.parse().ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TOP: &str = "\
Processes: 601 total, 2 running, 599 sleeping, 3263 threads
2026/07/30 17:21:04
Load Avg: 1.87, 2.08, 2.03
CPU usage: 7.89% user, 11.5% sys, 80.59% idle
SharedLibs: 248M resident, 41M data, 19M linkedit.";

    #[test]
    fn test_parse_top() {
        let (percent, load) = parse_top(TOP);
        assert_eq!((percent * 100.0).round() / 100.0, 19.41);
        assert_eq!(load, [1.87, 2.08, 2.03]);
    }

    #[test]
    fn test_parse_top_empty() {
        let (percent, load) = parse_top("");
        assert_eq!(percent, 0.0);
        assert_eq!(load, [0.0; 3]);
    }

    const VM_STAT: &str = "\
Mach Virtual Memory Statistics: (page size of 16384 bytes)
Pages free:                               10000.
Pages active:                             40000.
Pages inactive:                           30000.
Pages speculative:                         5000.
Pages throttled:                              0.
Pages wired down:                         20000.
Pages purgeable:                           2000.
\"Translation faults\":                 123456789.
File-backed pages:                        25000.
Anonymous pages:                          50000.
Pages occupied by compressor:             15000.
hw.memsize: 34359738368";

    #[test]
    fn test_parse_vm_stat() {
        let ram = parse_vm_stat(VM_STAT);
        assert_eq!(ram.used_bytes, (40000 + 20000 + 15000) * 16384);
        assert_eq!(ram.available_bytes, (10000 + 30000 + 2000 + 5000) * 16384);
        assert_eq!(ram.cached_bytes, 25000 * 16384);
        assert_eq!(ram.total_bytes, 34359738368);
    }

    #[test]
    fn test_parse_vm_stat_memsize_fallback() {
        let section = "\
Mach Virtual Memory Statistics: (page size of 4096 bytes)
Pages free: 100.
Pages active: 100.
Pages wired down: 50.";
        let ram = parse_vm_stat(section);
        assert_eq!(ram.used_bytes, 150 * 4096);
        assert_eq!(ram.available_bytes, 100 * 4096);
        assert_eq!(ram.total_bytes, 250 * 4096);
    }

    const NETSTAT: &str = "\
Name       Mtu   Network       Address            Ipkts Ierrs     Ibytes    Opkts Oerrs     Obytes  Coll
lo0        16384 <Link#1>                         12345     0    1111111    12345     0    2222222     0
lo0        16384 127           127.0.0.1          12345     -    1111111    12345     -    2222222     -
en0        1500  <Link#12>     aa:bb:cc:dd:ee:ff  77777     2   99999999    55555     0   88888888     0
en0        1500  192.168.1     192.168.1.10       77777     -   99999999    55555     -   88888888     -
utun0      1380  <Link#18>                          321     0      54321      123     0      12345     0";

    #[test]
    fn test_parse_netstat() {
        let interfaces = parse_netstat(NETSTAT);
        assert_eq!(interfaces.len(), 3);

        assert_eq!(interfaces[0].name, "lo0");
        assert_eq!(interfaces[0].packets_in, 12345);
        assert_eq!(interfaces[0].bytes_in, 1111111);
        assert_eq!(interfaces[0].bytes_out, 2222222);

        // The MAC address column must not shift the counter positions
        assert_eq!(interfaces[1].name, "en0");
        assert_eq!(interfaces[1].packets_in, 77777);
        assert_eq!(interfaces[1].bytes_in, 99999999);
        assert_eq!(interfaces[1].packets_out, 55555);
        assert_eq!(interfaces[1].bytes_out, 88888888);
    }

    #[test]
    fn test_parse_netstat_no_header() {
        assert_eq!(parse_netstat("garbage\nmore garbage").len(), 0);
    }

    const IOREG: &str = r#"
    | |   "model" = "Apple M1 Pro"
    | |   "PerformanceStatistics" = {"Device Utilization %"=37,"Renderer Utilization %"=35,"In use system memory"=766286848,"Alloc system memory"=1073741824,"Tiler Utilization %"=12}
"#;

    #[test]
    fn test_parse_ioreg() {
        let gpu = parse_ioreg(IOREG).unwrap();
        assert_eq!(gpu.name, "Apple M1 Pro");
        assert_eq!(gpu.percent, 37.0);
        assert_eq!(gpu.memory_used_bytes, 766286848);
        assert_eq!(gpu.memory_total_bytes, 1073741824);
    }

    #[test]
    fn test_parse_ioreg_no_gpu() {
        assert_eq!(parse_ioreg("").is_none(), true);
        assert_eq!(parse_ioreg("no matching services found").is_none(), true);
    }

    #[test]
    fn test_parse_ioreg_stats_without_model() {
        let section = r#""PerformanceStatistics" = {"Device Utilization %"=5}"#;
        let gpu = parse_ioreg(section).unwrap();
        assert_eq!(gpu.name, "Apple GPU");
        assert_eq!(gpu.percent, 5.0);
    }
}
