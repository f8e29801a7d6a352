use anyhow::Result;
use backtrace::Backtrace;
use flexi_logger::{FileSpec, Logger};
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::sync::mpsc;

use rrtop::app::App;
use rrtop::common::HistoryStore;
use rrtop::monitor::{Collector, ConnectionPool, SshTransport, Worker, options};
use rrtop::tui;

fn panic_hook(info: &PanicHookInfo<'_>) {
    // Get the shell back before printing anything
    tui::restore_terminal();

    let message = match info.payload().downcast_ref::<&'static str>() {
        Some(s) => *s,
        None => match info.payload().downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<Any>",
        },
    };
    let location = info
        .location()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "<unknown>".to_string());
    eprintln!("thread panicked at '{}', {}", message, location);

    if cfg!(debug_assertions) {
        eprintln!("{:?}", Backtrace::new());
    }
}

fn main() -> Result<()> {
    let options = options::parse();

    // The terminal belongs to the UI, so logs only ever go to a file
    if let Some(log_file) = options.log_file() {
        Logger::try_with_env_or_str(options.log_level())
            .expect("Could not create Logger from environment")
            .log_to_file(FileSpec::try_from(log_file.clone())?)
            .start()
            .expect("Failed to initialize logger");
    }

    let fleet = options::resolve_fleet(&options)?;

    let transport = SshTransport::new(options.connection.identity.clone());
    let pool = Arc::new(ConnectionPool::new(
        Arc::new(transport),
        fleet.endpoints.clone(),
        options.connection.connect_timeout,
    ));
    let collector = Collector::new(
        pool.clone(),
        fleet.hosts.clone(),
        options.connection.host_timeout,
        fleet.lock_dir.clone(),
        fleet.stale_lock,
    );
    let history = Arc::new(HistoryStore::new(options.view.history));

    let (event_tx, event_rx) = mpsc::channel();
    let worker = Worker::start(collector, pool.clone(), event_tx.clone());

    panic::set_hook(Box::new(|info| {
        panic_hook(info);
    }));

    let mut tui = tui::Tui::new()?;
    tui::spawn_event_thread(event_tx, options.view.delay_interval);

    let mut app = App::new(fleet.hosts, history, options.view.delay_interval);

    log::info!("rrtop started ({} hosts)", app.hosts.len());
    let result = app.run(&mut tui, event_rx, &worker);

    // Shuts the worker down and closes every pooled session
    drop(worker);
    drop(tui);

    return result;
}
