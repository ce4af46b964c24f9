//! SSH tunnel support
//!
//! Opens an SSH session (optionally through a bastion host), binds an
//! ephemeral local port and forwards every accepted socket to the database
//! server over a `direct-tcpip` channel.

use anyhow::Context;
use async_trait::async_trait;
use omniql_core::security::{SshAuthMethod, SshBastion, SshTunnelConfig};
use omniql_core::{OmniqlError, ServerConfig};
use parking_lot::Mutex;
use ssh2::Session;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::tunnel::{Tunnel, TunnelConnector, TunnelHandle};

const LOCAL_HOST: &str = "127.0.0.1";

#[derive(Debug, thiserror::Error)]
pub enum SshTunnelError {
    #[error("Failed to resolve SSH host {host}:{port}")]
    ResolveFailed { host: String, port: u16 },

    #[error("Failed to connect to SSH server {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[error("SSH handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("SSH authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Failed to establish port forwarding: {0}")]
    PortForwardingFailed(String),

    #[error("SSH agent not available: {0}")]
    AgentNotAvailable(String),

    #[error("Private key file not found: {path}")]
    PrivateKeyNotFound { path: String },

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
}

/// A running SSH port forward.
///
/// Dropping it stops the forwarding thread, closes the session and then
/// closes the bastion hop, if any.
pub struct SshTunnel {
    session: Session,
    local_port: u16,
    remote_host: String,
    remote_port: u16,
    is_running: Arc<AtomicBool>,
    forward_thread: Option<thread::JoinHandle<()>>,
    // Dropped after this tunnel's own Drop has closed the session
    hop: Option<Box<SshTunnel>>,
}

impl std::fmt::Debug for SshTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTunnel")
            .field("local_port", &self.local_port)
            .field("remote_host", &self.remote_host)
            .field("remote_port", &self.remote_port)
            .field("is_running", &self.is_running.load(Ordering::SeqCst))
            .field("via_bastion", &self.hop.is_some())
            .finish_non_exhaustive()
    }
}

impl SshTunnel {
    /// Establish a tunnel to `remote_host:remote_port` as seen from the SSH host.
    ///
    /// Blocks until the session is authenticated and the local port is bound.
    pub fn open(config: &SshTunnelConfig, remote_host: &str, remote_port: u16) -> anyhow::Result<Self> {
        config.validate().context("Invalid SSH configuration")?;

        info!(
            ssh_host = %config.host,
            ssh_port = config.port,
            remote_host = %remote_host,
            remote_port,
            via_bastion = config.bastion.is_some(),
            "establishing SSH tunnel"
        );

        // With a bastion, first forward a local port to the SSH host through it
        let hop = match &config.bastion {
            Some(bastion) => {
                let hop_config = bastion_config(config, bastion);
                let hop = SshTunnel::open(&hop_config, &config.host, config.port)
                    .context("Failed to reach SSH host through bastion")?;
                Some(Box::new(hop))
            }
            None => None,
        };

        let (ssh_host, ssh_port) = match &hop {
            Some(hop) => (LOCAL_HOST, hop.local_port),
            None => (config.host.as_str(), config.port),
        };
        let session = open_session(config, ssh_host, ssh_port)?;

        let listener = TcpListener::bind((LOCAL_HOST, 0)).context("Failed to bind local port")?;
        let local_port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;

        let is_running = Arc::new(AtomicBool::new(true));
        let forward_thread = start_forwarding_thread(
            listener,
            session.clone(),
            remote_host.to_string(),
            remote_port,
            is_running.clone(),
        );

        info!(
            local_port,
            remote = format!("{remote_host}:{remote_port}"),
            "SSH tunnel established"
        );

        Ok(Self {
            session,
            local_port,
            remote_host: remote_host.to_string(),
            remote_port,
            is_running,
            forward_thread: Some(forward_thread),
            hop,
        })
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        info!(local_port = self.local_port, "closing SSH tunnel");

        self.is_running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.forward_thread.take() {
            let _ = handle.join();
        }

        if let Err(e) = self.session.disconnect(None, "Tunnel closed", None) {
            warn!("Error disconnecting SSH session: {}", e);
        }

        debug!("SSH tunnel closed");
    }
}

/// Connection settings for the bastion hop, inheriting timeouts from the tunnel
fn bastion_config(config: &SshTunnelConfig, bastion: &SshBastion) -> SshTunnelConfig {
    SshTunnelConfig {
        host: bastion.host.clone(),
        port: bastion.port,
        username: bastion.username.clone(),
        auth: bastion.auth.clone(),
        bastion: None,
        timeout_seconds: config.timeout_seconds,
        keepalive_seconds: config.keepalive_seconds,
    }
}

fn open_session(config: &SshTunnelConfig, host: &str, port: u16) -> anyhow::Result<Session> {
    let timeout = Duration::from_secs(u64::from(config.timeout_seconds));
    let addr = (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| SshTunnelError::ResolveFailed {
            host: host.to_string(),
            port,
        })?;

    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
        SshTunnelError::ConnectionFailed {
            host: host.to_string(),
            port,
            source: e,
        }
    })?;
    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))?;

    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| SshTunnelError::HandshakeFailed(e.to_string()))?;

    authenticate(&mut session, &config.username, &config.auth)?;

    if config.keepalive_seconds > 0 {
        session.set_keepalive(true, config.keepalive_seconds);
    }

    Ok(session)
}

fn authenticate(session: &mut Session, username: &str, auth: &SshAuthMethod) -> anyhow::Result<()> {
    match auth {
        SshAuthMethod::Password { password } => {
            debug!("authenticating with password");
            session
                .userauth_password(username, password)
                .map_err(|e| SshTunnelError::AuthenticationFailed(e.to_string()))?;
        }
        SshAuthMethod::PrivateKey { path, passphrase } => {
            debug!(path = %path.display(), "authenticating with private key");
            if !path.exists() {
                return Err(SshTunnelError::PrivateKeyNotFound {
                    path: path.display().to_string(),
                }
                .into());
            }
            session
                .userauth_pubkey_file(username, None, path, passphrase.as_deref())
                .map_err(|e| SshTunnelError::InvalidPrivateKey(e.to_string()))?;
        }
        SshAuthMethod::Agent => {
            debug!("authenticating with SSH agent");
            authenticate_with_agent(session, username)?;
        }
    }

    if !session.authenticated() {
        return Err(SshTunnelError::AuthenticationFailed(
            "Authentication not confirmed".to_string(),
        )
        .into());
    }

    debug!("SSH authentication successful");
    Ok(())
}

fn authenticate_with_agent(session: &mut Session, username: &str) -> anyhow::Result<()> {
    let mut agent = session
        .agent()
        .map_err(|e| SshTunnelError::AgentNotAvailable(e.to_string()))?;

    agent
        .connect()
        .map_err(|e| SshTunnelError::AgentNotAvailable(e.to_string()))?;

    agent.list_identities().map_err(|e| {
        SshTunnelError::AgentNotAvailable(format!("Failed to list identities: {e}"))
    })?;

    let identities = agent.identities()?;
    if identities.is_empty() {
        return Err(SshTunnelError::AgentNotAvailable("No identities in agent".to_string()).into());
    }

    for identity in identities {
        if agent.userauth(username, &identity).is_ok() && session.authenticated() {
            debug!("authenticated with agent identity");
            return Ok(());
        }
    }

    Err(SshTunnelError::AuthenticationFailed("No agent identity worked".to_string()).into())
}

fn start_forwarding_thread(
    listener: TcpListener,
    session: Session,
    remote_host: String,
    remote_port: u16,
    is_running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while is_running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((local_stream, _)) => {
                    let session = session.clone();
                    let remote_host = remote_host.clone();
                    let is_running = is_running.clone();

                    thread::spawn(move || {
                        if let Err(e) = handle_connection(
                            local_stream,
                            &session,
                            &remote_host,
                            remote_port,
                            &is_running,
                        ) {
                            debug!("forwarded connection ended with error: {e:#}");
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    if is_running.load(Ordering::SeqCst) {
                        error!("Error accepting tunnel connection: {}", e);
                    }
                    break;
                }
            }
        }

        debug!("port forwarding thread exiting");
    })
}

/// Pump bytes between one local socket and its SSH channel
fn handle_connection(
    mut local_stream: TcpStream,
    session: &Session,
    remote_host: &str,
    remote_port: u16,
    is_running: &AtomicBool,
) -> anyhow::Result<()> {
    local_stream.set_nonblocking(false)?;
    local_stream.set_read_timeout(Some(Duration::from_millis(100)))?;

    let mut channel = session
        .channel_direct_tcpip(remote_host, remote_port, None)
        .map_err(|e| SshTunnelError::PortForwardingFailed(e.to_string()))?;

    session.set_blocking(false);

    let mut local_buf = [0u8; 8192];
    let mut remote_buf = [0u8; 8192];

    while is_running.load(Ordering::SeqCst) {
        let mut activity = false;

        match local_stream.read(&mut local_buf) {
            Ok(0) => break,
            Ok(n) => {
                session.set_blocking(true);
                channel.write_all(&local_buf[..n])?;
                session.set_blocking(false);
                activity = true;
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => return Err(e.into()),
        }

        match channel.read(&mut remote_buf) {
            Ok(0) => {
                if channel.eof() {
                    break;
                }
            }
            Ok(n) => {
                local_stream.write_all(&remote_buf[..n])?;
                activity = true;
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }

        if !activity {
            thread::sleep(Duration::from_millis(1));
        }
    }

    session.set_blocking(true);
    let _ = channel.send_eof();
    let _ = channel.wait_close();

    Ok(())
}

struct SshTunnelHandle {
    tunnel: Mutex<Option<SshTunnel>>,
}

#[async_trait]
impl TunnelHandle for SshTunnelHandle {
    async fn shutdown(&self) -> omniql_core::Result<()> {
        let tunnel = self.tunnel.lock().take();
        if let Some(tunnel) = tunnel {
            // Drop joins the forwarding thread
            tokio::task::spawn_blocking(move || drop(tunnel))
                .await
                .map_err(|e| OmniqlError::Tunnel(format!("SSH tunnel shutdown failed: {e}")))?;
        }
        Ok(())
    }
}

/// Production [`TunnelConnector`] backed by `ssh2`
#[derive(Debug, Default, Clone, Copy)]
pub struct SshTunnelConnector;

impl SshTunnelConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TunnelConnector for SshTunnelConnector {
    #[tracing::instrument(skip(self, server), fields(engine = %server.engine))]
    async fn connect_tunnel(&self, server: &ServerConfig) -> omniql_core::Result<Tunnel> {
        let ssh = server.ssh.clone().ok_or_else(|| {
            OmniqlError::Configuration("server has no SSH configuration".to_string())
        })?;
        let remote = server.remote_endpoint()?;

        let tunnel = tokio::task::spawn_blocking(move || {
            SshTunnel::open(&ssh, &remote.host, remote.port)
        })
        .await
        .map_err(|e| OmniqlError::Tunnel(format!("SSH tunnel task failed: {e}")))?
        .map_err(|e| {
            error!(error = %format!("{e:#}"), "failed to establish SSH tunnel");
            OmniqlError::Tunnel(format!("{e:#}"))
        })?;

        let local_port = tunnel.local_port();
        Ok(Tunnel::new(
            LOCAL_HOST,
            local_port,
            Box::new(SshTunnelHandle {
                tunnel: Mutex::new(Some(tunnel)),
            }),
        ))
    }
}
