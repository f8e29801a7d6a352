use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use crate::monitor::collector::Collector;
use crate::monitor::pool::ConnectionPool;
use crate::tui::{AppEvent, EventSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Collect,
    Shutdown,
}

/// Runs collection cycles on a background tokio runtime and pumps every
/// host result into the UI mailbox. The UI thread stays free to render.
pub struct Worker {
    sender: mpsc::Sender<Event>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub fn start(collector: Collector, pool: Arc<ConnectionPool>, app: EventSender) -> Self {
        let (sender, receiver) = mpsc::channel::<Event>();
        let thread = thread::spawn(move || {
            start_tokio(collector, pool, receiver, app);
        });
        return Worker {
            sender,
            thread: Some(thread),
        };
    }

    pub fn send(&self, event: Event) {
        // A send after shutdown has nowhere to go, which is fine
        let _ = self.sender.send(event);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        log::debug!("stopping worker");
        let _ = self.sender.send(Event::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        log::debug!("worker stopped");
    }
}

#[tokio::main(worker_threads = 2)]
async fn start_tokio(
    collector: Collector,
    pool: Arc<ConnectionPool>,
    receiver: mpsc::Receiver<Event>,
    app: EventSender,
) {
    while let Ok(event) = receiver.recv() {
        match event {
            Event::Collect => {
                let cycle_started = Instant::now();
                let mut cycle = collector.collect_streaming();
                while let Some(result) = cycle.results.recv().await {
                    if app.send(AppEvent::Host(result)).is_err() {
                        // UI is gone; stop pumping
                        return;
                    }
                }
                let _ = app.send(AppEvent::CycleFinished {
                    elapsed_ms: cycle_started.elapsed().as_millis() as u64,
                });
            }
            Event::Shutdown => {
                pool.close().await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::transport::testing::{MockEndpoint, MockTransport};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_worker_pumps_results_and_cycle_end() {
        let transport = MockTransport::default()
            .with_endpoint("a", MockEndpoint::default())
            .with_endpoint(
                "b",
                MockEndpoint {
                    dial_fails: true,
                    ..Default::default()
                },
            );
        let endpoints = [("a", vec!["a"]), ("b", vec!["b"])]
            .into_iter()
            .map(|(alias, list)| {
                (
                    alias.to_string(),
                    list.into_iter().map(String::from).collect(),
                )
            })
            .collect();
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(transport),
            endpoints,
            Duration::from_secs(2),
        ));
        let collector = Collector::new(
            pool.clone(),
            vec!["a".to_string(), "b".to_string()],
            Duration::from_secs(2),
            "/tmp".to_string(),
            chrono::Duration::try_minutes(30).unwrap(),
        );

        let (app_tx, app_rx) = mpsc::channel();
        let worker = Worker::start(collector, pool, app_tx);
        worker.send(Event::Collect);

        let mut hosts = 0;
        let mut finished = 0;
        for _ in 0..3 {
            match app_rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                AppEvent::Host(_) => hosts += 1,
                AppEvent::CycleFinished { .. } => finished += 1,
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(hosts, 2);
        assert_eq!(finished, 1);
    }
}
