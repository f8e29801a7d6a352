use crate::monitor::metrics::ProcessInfo;

const COMMAND_MAX: usize = 50;

/// `ps aux` rows, already sorted by CPU and bounded (head -16) on the
/// remote side.
pub fn parse_ps_aux(section: &str) -> Vec<ProcessInfo> {
    let mut processes = Vec::new();

    for line in section.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 11 {
            continue;
        }

        // USER PID %CPU %MEM VSZ RSS TT STAT STARTED TIME COMMAND...
        let command = fields[10..].join(" ");
        processes.push(ProcessInfo {
            user: fields[0].to_string(),
            pid: fields[1].parse().unwrap_or(0),
            cpu_percent: fields[2].parse().unwrap_or(0.0),
            memory_percent: fields[3].parse().unwrap_or(0.0),
            time: fields[9].to_string(),
            command: truncate_command(&command),
        });
    }

    return processes;
}

fn truncate_command(command: &str) -> String {
    if command.chars().count() <= COMMAND_MAX {
        return command.to_string();
    }
    let truncated: String = command.chars().take(COMMAND_MAX).collect();
    return format!("{}...", truncated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PS: &str = "\
USER               PID  %CPU %MEM      VSZ    RSS   TT  STAT STARTED      TIME COMMAND
root               123  42.5  1.2   408628  19664   ??  Ss   Mon09AM   1:23.45 /usr/libexec/syslogd
deploy            4567  12.0  3.4   512000  65536   ??  R    10:00AM   0:07.89 python3 train.py --epochs 100
deploy            4568   0.0  0.1     1234    567   ??  S    10:00AM   0:00.01 bash";

    #[test]
    fn test_parse_ps_aux() {
        let processes = parse_ps_aux(PS);
        assert_eq!(processes.len(), 3);

        assert_eq!(processes[0].user, "root");
        assert_eq!(processes[0].pid, 123);
        assert_eq!(processes[0].cpu_percent, 42.5);
        assert_eq!(processes[0].memory_percent, 1.2);
        assert_eq!(processes[0].time, "1:23.45");
        assert_eq!(processes[0].command, "/usr/libexec/syslogd");

        // Multi-word commands are joined back together
        assert_eq!(processes[1].command, "python3 train.py --epochs 100");
    }

    #[test]
    fn test_parse_ps_aux_short_lines_skipped() {
        let section = "HEADER\ntoo short\n";
        assert_eq!(parse_ps_aux(section).len(), 0);
    }

    #[test]
    fn test_command_truncation() {
        let long = "x".repeat(80);
        let truncated = truncate_command(&long);
        assert_eq!(truncated.chars().count(), 53);
        assert_eq!(truncated.ends_with("..."), true);

        assert_eq!(truncate_command("short"), "short");
    }
}
