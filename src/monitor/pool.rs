use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::monitor::platform::{DETECT_COMMAND, Platform};
use crate::monitor::transport::{Session, Transport};

/// How long to keep waiting for a more-preferred endpoint once a
/// less-preferred dial already succeeded. Strict upper bound.
const PREFERENCE_GRACE: Duration = Duration::from_millis(500);

/// Session handed out by the pool; the caller opens channels off it, the
/// pool keeps owning it.
pub struct Pooled {
    pub session: Arc<dyn Session>,
    pub platform: Platform,
    pub connected_via: String,
}

struct PoolEntry {
    session: Arc<dyn Session>,
    platform: Option<Platform>,
    last_used: Instant,
    connected_via: String,
}

/// Long-lived multiplexed sessions keyed by host alias.
///
/// Sessions are returned optimistically, with no liveness probing on get: a
/// dead session surfaces at the use site (channel open or command run) and
/// the caller is expected to `close_one` it, so the next get re-dials.
pub struct ConnectionPool {
    transport: Arc<dyn Transport>,
    endpoints: HashMap<String, Vec<String>>,
    dial_timeout: Duration,
    entries: Mutex<HashMap<String, PoolEntry>>,
}

impl ConnectionPool {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoints: HashMap<String, Vec<String>>,
        dial_timeout: Duration,
    ) -> Self {
        return ConnectionPool {
            transport,
            endpoints,
            dial_timeout,
            entries: Mutex::new(HashMap::new()),
        };
    }

    pub async fn get(&self, alias: &str) -> Result<(Arc<dyn Session>, String)> {
        // Fast path under the lock; dials never hold it
        {
            let mut entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get_mut(alias) {
                entry.last_used = Instant::now();
                return Ok((entry.session.clone(), entry.connected_via.clone()));
            }
        }

        // An unknown alias (or an empty endpoint list) dials the alias itself
        let endpoints = match self.endpoints.get(alias) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => vec![alias.to_string()],
        };

        let (session, connected_via) = self.dial_race(&endpoints).await?;

        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get_mut(alias) {
            // Somebody re-populated the entry while we were dialing; keep
            // theirs and fold ours
            existing.last_used = Instant::now();
            tokio::spawn(async move { session.close().await });
            return Ok((existing.session.clone(), existing.connected_via.clone()));
        }
        entries.insert(
            alias.to_string(),
            PoolEntry {
                session: session.clone(),
                platform: None,
                last_used: Instant::now(),
                connected_via: connected_via.clone(),
            },
        );
        return Ok((session, connected_via));
    }

    /// Like `get`, plus the detected platform, cached per entry after one
    /// `uname -s` round trip.
    pub async fn get_with_platform(&self, alias: &str) -> Result<Pooled> {
        let (session, connected_via) = self.get(alias).await?;

        let cached = {
            let entries = self.entries.lock().unwrap();
            entries.get(alias).and_then(|entry| entry.platform)
        };
        if let Some(platform) = cached {
            return Ok(Pooled {
                session,
                platform,
                connected_via,
            });
        }

        let mut channel = session.open_channel().await?;
        let output = channel.run_combined(DETECT_COMMAND).await?;
        channel.close().await;
        let platform = Platform::from_uname(&String::from_utf8_lossy(&output));
        log::debug!("detected {:?} on {}", platform, alias);

        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(alias) {
            entry.platform = Some(platform);
        }
        return Ok(Pooled {
            session,
            platform,
            connected_via,
        });
    }

    /// Evicts one alias after a confirmed use-site failure. The next get
    /// re-dials.
    pub fn close_one(&self, alias: &str) {
        let removed = self.entries.lock().unwrap().remove(alias);
        if let Some(entry) = removed {
            log::debug!(
                "evicting {} (idle {}ms)",
                alias,
                entry.last_used.elapsed().as_millis()
            );
            tokio::spawn(async move { entry.session.close().await });
        }
    }

    pub async fn close(&self) {
        let entries: Vec<PoolEntry> = {
            let mut map = self.entries.lock().unwrap();
            map.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.session.close().await;
        }
    }

    /// Dials every endpoint of the alias concurrently and settles on the
    /// most-preferred winner the grace window allows.
    async fn dial_race(&self, endpoints: &[String]) -> Result<(Arc<dyn Session>, String)> {
        if endpoints.len() == 1 {
            let session = self.transport.dial(&endpoints[0], self.dial_timeout).await?;
            return Ok((Arc::from(session), endpoints[0].clone()));
        }

        let (result_tx, mut result_rx) = tokio::sync::mpsc::channel(endpoints.len());
        for (index, endpoint) in endpoints.iter().enumerate() {
            let transport = self.transport.clone();
            let endpoint = endpoint.clone();
            let result_tx = result_tx.clone();
            let dial_timeout = self.dial_timeout;
            tokio::spawn(async move {
                let result = transport.dial(&endpoint, dial_timeout).await;
                let _ = result_tx.send((index, endpoint, result)).await;
            });
        }
        drop(result_tx);

        let mut best: Option<(usize, Arc<dyn Session>, String)> = None;
        let mut last_error = anyhow!("no endpoints to dial");
        let mut grace_deadline: Option<tokio::time::Instant> = None;

        loop {
            let message = match grace_deadline {
                Some(deadline) => {
                    tokio::select! {
                        message = result_rx.recv() => message,
                        _ = tokio::time::sleep_until(deadline) => break,
                    }
                }
                None => result_rx.recv().await,
            };
            // Channel closed: every dial reported
            let Some((index, endpoint, result)) = message else {
                break;
            };

            let session: Arc<dyn Session> = match result {
                Ok(session) => Arc::from(session),
                Err(err) => {
                    log::debug!("dial {} failed: {:#}", endpoint, err);
                    last_error = err;
                    continue;
                }
            };

            if index == 0 {
                // The most-preferred endpoint wins immediately
                if let Some((_, surplus, _)) = best.take() {
                    tokio::spawn(async move { surplus.close().await });
                }
                best = Some((index, session, endpoint));
                break;
            }

            match &best {
                Some((best_index, ..)) if *best_index < index => {
                    tokio::spawn(async move { session.close().await });
                }
                _ => {
                    if let Some((_, surplus, _)) = best.replace((index, session, endpoint)) {
                        tokio::spawn(async move { surplus.close().await });
                    }
                    if grace_deadline.is_none() {
                        grace_deadline = Some(tokio::time::Instant::now() + PREFERENCE_GRACE);
                    }
                }
            }
        }

        // Late wins from dials still in flight get folded quietly
        tokio::spawn(async move {
            while let Some((_, _, result)) = result_rx.recv().await {
                if let Ok(session) = result {
                    let session: Arc<dyn Session> = Arc::from(session);
                    session.close().await;
                }
            }
        });

        return match best {
            Some((_, session, endpoint)) => {
                log::debug!("connected via {}", endpoint);
                Ok((session, endpoint))
            }
            None => Err(last_error),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::transport::testing::{MockEndpoint, MockTransport};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn pool_with(
        transport: MockTransport,
        endpoints: &[(&str, &[&str])],
    ) -> (Arc<MockTransport>, ConnectionPool) {
        let transport = Arc::new(transport);
        let endpoints = endpoints
            .iter()
            .map(|(alias, list)| {
                (
                    alias.to_string(),
                    list.iter().map(|e| e.to_string()).collect(),
                )
            })
            .collect();
        let pool = ConnectionPool::new(transport.clone(), endpoints, Duration::from_secs(5));
        return (transport, pool);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_endpoint_dials_serially() {
        let transport = MockTransport::default().with_endpoint("a", MockEndpoint::default());
        let (transport, pool) = pool_with(transport, &[("host", &["a"])]);

        let (_, connected_via) = pool.get("host").await.unwrap();
        assert_eq!(connected_via, "a");
        assert_eq!(transport.dial_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_reused_across_gets() {
        let transport = MockTransport::default().with_endpoint("a", MockEndpoint::default());
        let (transport, pool) = pool_with(transport, &[("host", &["a"])]);

        pool.get("host").await.unwrap();
        pool.get("host").await.unwrap();
        assert_eq!(transport.dial_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_alias_dials_itself() {
        let transport =
            MockTransport::default().with_endpoint("stray-host", MockEndpoint::default());
        let (_, pool) = pool_with(transport, &[]);

        let (_, connected_via) = pool.get("stray-host").await.unwrap();
        assert_eq!(connected_via, "stray-host");
    }

    #[tokio::test(start_paused = true)]
    async fn test_preferred_endpoint_wins_within_grace_window() {
        let transport = MockTransport::default()
            .with_endpoint(
                "lan",
                MockEndpoint {
                    dial_delay: Duration::from_millis(300),
                    ..Default::default()
                },
            )
            .with_endpoint(
                "tailscale",
                MockEndpoint {
                    dial_delay: Duration::from_millis(100),
                    ..Default::default()
                },
            );
        let (transport, pool) = pool_with(transport, &[("host", &["lan", "tailscale"])]);

        let (_, connected_via) = pool.get("host").await.unwrap();
        assert_eq!(connected_via, "lan");

        // The less-preferred win gets closed in the background
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.closed_endpoints(), vec!["tailscale".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_window_expiry_settles_on_best() {
        let transport = MockTransport::default()
            .with_endpoint(
                "lan",
                MockEndpoint {
                    dial_delay: Duration::from_secs(3),
                    ..Default::default()
                },
            )
            .with_endpoint(
                "tailscale",
                MockEndpoint {
                    dial_delay: Duration::from_millis(100),
                    ..Default::default()
                },
            );
        let (transport, pool) = pool_with(transport, &[("host", &["lan", "tailscale"])]);

        let started = tokio::time::Instant::now();
        let (_, connected_via) = pool.get("host").await.unwrap();
        assert_eq!(connected_via, "tailscale");
        // Settled at grace expiry, well before the slow dial finished
        assert_eq!(started.elapsed() < Duration::from_secs(1), true);

        // The late win drains and closes
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(transport.closed_endpoints(), vec!["lan".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_dials_fail() {
        let transport = MockTransport::default()
            .with_endpoint(
                "a",
                MockEndpoint {
                    dial_fails: true,
                    ..Default::default()
                },
            )
            .with_endpoint(
                "b",
                MockEndpoint {
                    dial_fails: true,
                    dial_delay: Duration::from_millis(10),
                    ..Default::default()
                },
            );
        let (_, pool) = pool_with(transport, &[("host", &["a", "b"])]);

        let error = pool.get("host").await.unwrap_err();
        assert_eq!(error.to_string().contains("refused"), true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_platform_detected_once() {
        let transport = MockTransport::default().with_endpoint(
            "a",
            MockEndpoint {
                uname: "Darwin",
                ..Default::default()
            },
        );
        let (transport, pool) = pool_with(transport, &[("host", &["a"])]);

        let pooled = pool.get_with_platform("host").await.unwrap();
        assert_eq!(pooled.platform, Platform::Darwin);

        let pooled = pool.get_with_platform("host").await.unwrap();
        assert_eq!(pooled.platform, Platform::Darwin);

        let unames = transport
            .ran_commands()
            .iter()
            .filter(|c| *c == DETECT_COMMAND)
            .count();
        assert_eq!(unames, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_one_forces_redial() {
        let transport = MockTransport::default().with_endpoint("a", MockEndpoint::default());
        let (transport, pool) = pool_with(transport, &[("host", &["a"])]);

        pool.get("host").await.unwrap();
        pool.close_one("host");
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.get("host").await.unwrap();

        assert_eq!(transport.dial_count.load(Ordering::SeqCst), 2);
        assert_eq!(transport.closed_endpoints(), vec!["a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_one_unknown_alias_is_noop() {
        let transport = MockTransport::default();
        let (_, pool) = pool_with(transport, &[]);
        pool.close_one("never-seen");
    }
}
