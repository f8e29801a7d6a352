/// Separator echoed between the batched sub-commands; the collector splits
/// the combined output on it.
pub const SECTION_SEPARATOR: &str = "---";

pub const DETECT_COMMAND: &str = "uname -s";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Darwin,
    Unknown,
}

impl Platform {
    pub fn from_uname(output: &str) -> Self {
        return match output.trim() {
            "Linux" => Platform::Linux,
            "Darwin" => Platform::Darwin,
            _ => Platform::Unknown,
        };
    }

    /// One batched command per cycle instead of one round trip per metric.
    /// GPU and process sub-commands are shielded with `|| true` so a host
    /// without nvidia-smi (or a busy one) still yields the other sections.
    pub fn metrics_command(&self) -> String {
        let sections: &[&str] = match self {
            // Unknown falls back to the Linux command set
            Platform::Linux | Platform::Unknown => &[
                "cat /proc/stat",
                "cat /proc/loadavg",
                "cat /proc/meminfo",
                "cat /proc/net/dev",
                "nvidia-smi --query-gpu=name,utilization.gpu,memory.used,memory.total,temperature.gpu,power.draw --format=csv,noheader,nounits 2>/dev/null || true",
                "ps aux --sort=-%cpu 2>/dev/null | head -16 || true",
            ],
            Platform::Darwin => &[
                "top -l 1 -n 0",
                "vm_stat; sysctl hw.memsize 2>/dev/null || true",
                "netstat -ib",
                "ioreg -r -d 1 -w 0 -c IOAccelerator 2>/dev/null | grep -E '\"model\"|PerformanceStatistics' || true",
                "ps aux -r 2>/dev/null | head -16 || true",
            ],
        };

        return sections.join(&format!("; echo \"{}\"; ", SECTION_SEPARATOR));
    }

    pub fn section_count(&self) -> usize {
        return match self {
            Platform::Linux | Platform::Unknown => 6,
            Platform::Darwin => 5,
        };
    }
}

/// Splits combined command output into its sections. Fewer sections than
/// expected is fine, the parsers only touch the indexes that are present.
pub fn split_sections(output: &str) -> Vec<&str> {
    return output.split("\n---\n").collect();
}
