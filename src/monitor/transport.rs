use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use russh::client;
use russh::keys::PublicKey;
use russh::keys::key::PrivateKeyWithHashAlg;
use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// The remote-shell surface the pool and collector are written against:
/// dial an endpoint, open channels off the multiplexed session, run one
/// command per channel, read combined output.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn dial(&self, endpoint: &str, timeout: Duration) -> Result<Box<dyn Session>>;
}

#[async_trait]
pub trait Session: Send + Sync + std::fmt::Debug {
    async fn open_channel(&self) -> Result<Box<dyn Channel>>;
    async fn close(&self);
}

#[async_trait]
pub trait Channel: Send {
    /// Runs a command and drains stdout+stderr interleaved, in arrival
    /// order, until the remote side closes the stream.
    async fn run_combined(&mut self, command: &str) -> Result<Vec<u8>>;
    async fn close(&mut self);
}

/// `[user@]host[:port]`, user defaulting to the local login, port to 22.
pub fn parse_endpoint(endpoint: &str) -> (String, String, u16) {
    let (user, rest) = match endpoint.split_once('@') {
        Some((user, rest)) => (user.to_string(), rest),
        None => (whoami::username(), endpoint),
    };

    if let Some((host, port)) = rest.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            return (user, host.to_string(), port);
        }
    }
    return (user, rest.to_string(), 22);
}

/// Accepts any host key. rrtop is a fleet dashboard driven by an explicit
/// host list, not an interactive client; strict checking belongs to the
/// rr tool that provisions the fleet.
struct AcceptingHandler;

impl client::Handler for AcceptingHandler {
    type Error = anyhow::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool> {
        return Ok(true);
    }
}

pub struct SshTransport {
    identities: Vec<PathBuf>,
}

impl SshTransport {
    pub fn new(identities: Vec<PathBuf>) -> Self {
        let mut identities = identities;
        if identities.is_empty() {
            if let Ok(home) = std::env::var("HOME") {
                identities.push(PathBuf::from(&home).join(".ssh/id_ed25519"));
                identities.push(PathBuf::from(&home).join(".ssh/id_rsa"));
            }
        }
        return SshTransport { identities };
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn dial(&self, endpoint: &str, timeout: Duration) -> Result<Box<dyn Session>> {
        let (user, host, port) = parse_endpoint(endpoint);

        let socket_addr = format!("{}:{}", host, port)
            .to_socket_addrs()
            .with_context(|| format!("cannot resolve {}", host))?
            .next()
            .ok_or_else(|| anyhow!("no address found for {}", host))?;

        let config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let mut handle = tokio::time::timeout(
            timeout,
            client::connect(Arc::new(config), socket_addr, AcceptingHandler),
        )
        .await
        .map_err(|_| anyhow!("connection to {} timed out. Check the host is up and reachable", endpoint))?
        .with_context(|| format!("connection to {} failed", endpoint))?;

        log::debug!("handshake with {} completed", endpoint);

        let mut last_error = anyhow!(
            "no usable identity for {}. Make sure ~/.ssh/id_ed25519 or --identity exists",
            endpoint
        );
        for identity in &self.identities {
            if !identity.exists() {
                continue;
            }
            let key = match russh::keys::load_secret_key(identity, None) {
                Ok(key) => key,
                Err(err) => {
                    last_error = anyhow!("cannot load {}: {}", identity.display(), err);
                    continue;
                }
            };

            let authenticated = handle
                .authenticate_publickey(&user, PrivateKeyWithHashAlg::new(Arc::new(key), None))
                .await
                .with_context(|| format!("authentication to {} failed", endpoint))?;
            if authenticated.success() {
                log::debug!("authenticated to {} as {}", endpoint, user);
                return Ok(Box::new(SshSession {
                    handle: Mutex::new(handle),
                }));
            }
            last_error = anyhow!(
                "{} rejected {}. Check the key is authorized for {}",
                endpoint,
                identity.display(),
                user
            );
        }

        return Err(last_error);
    }
}

struct SshSession {
    handle: Mutex<client::Handle<AcceptingHandler>>,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession").finish_non_exhaustive()
    }
}

#[async_trait]
impl Session for SshSession {
    async fn open_channel(&self) -> Result<Box<dyn Channel>> {
        let handle = self.handle.lock().await;
        let channel = handle
            .channel_open_session()
            .await
            .context("cannot open channel")?;
        return Ok(Box::new(SshChannel { channel }));
    }

    async fn close(&self) {
        let handle = self.handle.lock().await;
        let _ = handle
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await;
    }
}

struct SshChannel {
    channel: russh::Channel<client::Msg>,
}

#[async_trait]
impl Channel for SshChannel {
    async fn run_combined(&mut self, command: &str) -> Result<Vec<u8>> {
        self.channel
            .exec(true, command)
            .await
            .context("exec failed")?;

        let mut output = Vec::new();
        while let Some(msg) = self.channel.wait().await {
            match msg {
                russh::ChannelMsg::Data { data } => {
                    output.extend_from_slice(&data);
                }
                russh::ChannelMsg::ExtendedData { data, .. } => {
                    output.extend_from_slice(&data);
                }
                russh::ChannelMsg::Eof | russh::ChannelMsg::Close => {
                    break;
                }
                russh::ChannelMsg::ExitStatus { .. } | russh::ChannelMsg::ExitSignal { .. } => {
                    // Batched commands shield their own failures; a non-zero
                    // exit still carries whatever sections did print.
                }
                _ => {}
            }
        }
        return Ok(output);
    }

    async fn close(&mut self) {
        let _ = self.channel.eof().await;
    }
}
