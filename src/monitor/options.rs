use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser};
use clap_complete::{Shell, generate};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use std::time;

#[derive(Parser, Clone)]
#[command(name = "rrtop")]
#[command(author, version, about, long_about = None)]
pub struct RRTopOptions {
    /// Host aliases to watch (default: every host in the config)
    pub hosts: Vec<String>,

    #[command(flatten)]
    pub connection: ConnectionOptions,
    #[command(flatten)]
    pub view: ViewOptions,
    #[command(flatten)]
    service: ServiceOptions,
}

#[derive(Args, Clone, Default)]
pub struct ConnectionOptions {
    /// Hosts config (YAML mapping of alias to ssh_endpoints)
    #[arg(short('c'), long, env = "RRTOP_CONFIG")]
    pub config: Option<String>,

    /// Identity file for publickey auth (can be given multiple times,
    /// falls back to ~/.ssh/id_ed25519 and ~/.ssh/id_rsa)
    #[arg(short('i'), long)]
    pub identity: Vec<PathBuf>,

    #[arg(
        long,
        value_parser = |arg: &str| -> Result<time::Duration> {Ok(time::Duration::from_secs(arg.parse()?))},
        default_value = "10",
    )]
    /// Dial timeout per endpoint, in seconds
    pub connect_timeout: time::Duration,

    #[arg(
        long,
        value_parser = |arg: &str| -> Result<time::Duration> {Ok(time::Duration::from_secs(arg.parse()?))},
        default_value = "8",
    )]
    /// Per-host budget for one collection cycle, in seconds
    pub host_timeout: time::Duration,
}

#[derive(Args, Clone)]
pub struct ViewOptions {
    #[arg(
        short('d'),
        long,
        value_parser = |arg: &str| -> Result<time::Duration> {Ok(time::Duration::from_millis(arg.parse()?))},
        default_value = "5000",
    )]
    /// Refresh interval, in milliseconds
    pub delay_interval: time::Duration,

    /// Samples kept per metric series
    #[arg(long, default_value_t = 300)]
    pub history: usize,

    /// Directory holding the rr.lock marker on the remote hosts
    #[arg(long)]
    pub lock_dir: Option<String>,

    /// Locks older than this are treated as gone
    #[arg(long)]
    pub stale_lock_minutes: Option<i64>,
}

#[derive(Args, Clone, Default)]
pub struct ServiceOptions {
    /// Generate shell completion and exit
    #[arg(long, value_enum)]
    completion: Option<Shell>,

    /// Log file (the terminal belongs to the UI; default: no logging)
    #[arg(long, env = "RRTOP_LOG")]
    pub log_file: Option<PathBuf>,

    /// Log spec when a log file is set, e.g. "debug" or
    /// "info,russh=warn" (RUST_LOG overrides)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct HostConfigEntry {
    #[serde(default)]
    pub ssh_endpoints: Vec<String>,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct HostsConfig {
    #[serde(default)]
    pub hosts: HashMap<String, HostConfigEntry>,
    pub lock_dir: Option<String>,
    pub stale_lock_minutes: Option<i64>,
}

/// Everything the model and collector need, with the config file and the
/// command line merged.
pub struct Fleet {
    /// Aliases in display order: command-line order when given there,
    /// alphabetical when taken from the config mapping.
    pub hosts: Vec<String>,
    pub endpoints: HashMap<String, Vec<String>>,
    pub lock_dir: String,
    pub stale_lock: chrono::Duration,
}

pub fn read_hosts_config(path: &str) -> Result<HostsConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("cannot read config {}", path))?;
    let config: HostsConfig =
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse config {}", path))?;
    return Ok(config);
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join("rrtop/hosts.yaml"));
    }
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config/rrtop/hosts.yaml"));
    }
    return None;
}

pub fn resolve_fleet(options: &RRTopOptions) -> Result<Fleet> {
    let config = match &options.connection.config {
        Some(path) => read_hosts_config(path)?,
        None => match default_config_path() {
            // The default config is optional; explicit aliases still work
            Some(path) if path.exists() => {
                read_hosts_config(path.to_str().unwrap_or_default())?
            }
            _ => HostsConfig::default(),
        },
    };

    let hosts = if options.hosts.is_empty() {
        let mut hosts: Vec<String> = config.hosts.keys().cloned().collect();
        hosts.sort();
        hosts
    } else {
        options.hosts.clone()
    };
    if hosts.is_empty() {
        return Err(anyhow!(
            "no hosts to watch. Pass aliases on the command line or configure some in hosts.yaml"
        ));
    }

    let endpoints = config
        .hosts
        .into_iter()
        .map(|(alias, entry)| (alias, entry.ssh_endpoints))
        .collect();

    let lock_dir = options
        .view
        .lock_dir
        .clone()
        .or(config.lock_dir)
        .unwrap_or_else(|| "/tmp".to_string());
    let stale_minutes = options
        .view
        .stale_lock_minutes
        .or(config.stale_lock_minutes)
        .unwrap_or(30);

    return Ok(Fleet {
        hosts,
        endpoints,
        lock_dir,
        stale_lock: chrono::Duration::try_minutes(stale_minutes)
            .unwrap_or_else(|| chrono::Duration::try_minutes(30).unwrap()),
    });
}

pub fn parse() -> RRTopOptions {
    let options = RRTopOptions::parse();

    // Generate autocompletion
    if let Some(shell) = options.service.completion {
        let mut cmd = RRTopOptions::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut io::stdout());
        process::exit(0);
    }

    return options;
}

impl RRTopOptions {
    pub fn log_file(&self) -> Option<&PathBuf> {
        return self.service.log_file.as_ref();
    }

    pub fn log_level(&self) -> &str {
        return &self.service.log_level;
    }
}
