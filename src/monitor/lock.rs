use chrono::{DateTime, Duration, Local, TimeZone};
use serde::Deserialize;

use crate::monitor::metrics::HostLockInfo;

/// Probe that fails fast when no lock directory exists, so the happy path
/// costs one stat on the remote side.
pub fn lock_command(lock_dir: &str) -> String {
    return format!(
        "if [ -d {dir}/rr.lock ] && [ -f {dir}/rr.lock/info.json ]; then cat {dir}/rr.lock/info.json; else exit 1; fi",
        dir = lock_dir
    );
}

#[derive(Deserialize)]
struct LockRecord {
    #[serde(default)]
    holder: String,
    #[serde(default)]
    started: serde_json::Value,
    #[serde(default)]
    command: String,
}

/// Decodes a lock record. Malformed JSON, or a record older than the stale
/// threshold, reads as "unlocked" (None).
pub fn parse_lock_info(
    raw: &str,
    stale_threshold: Duration,
    now: DateTime<Local>,
) -> Option<HostLockInfo> {
    let record: LockRecord = serde_json::from_str(raw.trim()).ok()?;

    let started_at = parse_started(&record.started);
    if let Some(started_at) = started_at {
        if now.signed_duration_since(started_at) > stale_threshold {
            return None;
        }
    }

    return Some(HostLockInfo {
        is_locked: true,
        holder: record.holder,
        started_at,
        command: record.command,
    });
}

/// `started` is written by different rr versions as either an RFC3339
/// string or epoch seconds.
fn parse_started(value: &serde_json::Value) -> Option<DateTime<Local>> {
    match value {
        serde_json::Value::String(s) => {
            return DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Local));
        }
        serde_json::Value::Number(n) => {
            let seconds = n.as_f64()?;
            return Local.timestamp_opt(seconds as i64, 0).single();
        }
        _ => return None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn threshold() -> Duration {
        return Duration::try_minutes(30).unwrap();
    }

    #[test]
    fn test_lock_command_uses_lock_dir() {
        let command = lock_command("/var/lock");
        assert_eq!(command.contains("/var/lock/rr.lock/info.json"), true);
        assert_eq!(command.contains("exit 1"), true);
    }

    #[test]
    fn test_fresh_lock() {
        let now = Local::now();
        let started = (now - Duration::try_minutes(5).unwrap()).to_rfc3339();
        let raw = format!(
            r#"{{"holder": "alice", "started": "{}", "command": "rr run train"}}"#,
            started
        );

        let info = parse_lock_info(&raw, threshold(), now).unwrap();
        assert_eq!(info.is_locked, true);
        assert_eq!(info.holder, "alice");
        assert_eq!(info.command, "rr run train");
        assert_eq!(info.started_at.is_some(), true);
    }

    #[test]
    fn test_stale_lock_dropped() {
        let now = Local::now();
        let started = (now - Duration::try_minutes(45).unwrap()).to_rfc3339();
        let raw = format!(r#"{{"holder": "bob", "started": "{}", "command": "x"}}"#, started);

        assert_eq!(parse_lock_info(&raw, threshold(), now).is_none(), true);
    }

    #[test]
    fn test_epoch_seconds_started() {
        let now = Local::now();
        let started = now.timestamp() - 60;
        let raw = format!(r#"{{"holder": "carol", "started": {}, "command": "x"}}"#, started);

        let info = parse_lock_info(&raw, threshold(), now).unwrap();
        assert_eq!(info.holder, "carol");
    }

    #[test]
    fn test_malformed_is_unlocked() {
        let now = Local::now();
        assert_eq!(parse_lock_info("", threshold(), now).is_none(), true);
        assert_eq!(parse_lock_info("not json", threshold(), now).is_none(), true);
        assert_eq!(parse_lock_info("[1,2,3]", threshold(), now).is_none(), true);
    }

    #[test]
    fn test_missing_started_is_kept() {
        let now = Local::now();
        let info =
            parse_lock_info(r#"{"holder": "dave", "command": "x"}"#, threshold(), now).unwrap();
        assert_eq!(info.started_at, None);
        assert_eq!(info.is_locked, true);
    }
}
