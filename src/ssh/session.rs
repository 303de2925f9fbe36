//! SSH session management built on russh.

use crate::config::SshConfig;
use crate::error::TunnelError;
use async_trait::async_trait;
use russh::client;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A bidirectional byte stream usable by the database driver exactly as a raw
/// socket would be.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

pub type BoxedStream = Box<dyn ByteStream>;

impl std::fmt::Debug for dyn ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ByteStream")
    }
}

/// An authenticated secure-shell session that can open logical byte-stream
/// channels to remote addresses.
///
/// Channel opens must be safe to call concurrently: the connection pool may
/// bring up several transports in parallel.
#[async_trait]
pub trait TunnelSession: Send + Sync {
    /// Open a channel to `host:port` through the session. Failures (channel
    /// refused, session closed) are forwarded verbatim.
    async fn open_channel(&self, host: &str, port: u16) -> Result<BoxedStream, TunnelError>;

    /// Tear the session down. Channel opens fail afterwards.
    async fn close(&self) -> Result<(), TunnelError>;
}

struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    // Host keys are not pinned: any server key is accepted. Known limitation
    // of the password-only tunnel setup.
    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Production `TunnelSession` backed by a russh client with password
/// authentication.
pub struct SshSession {
    handle: Mutex<client::Handle<ClientHandler>>,
}

impl SshSession {
    /// Connect and authenticate. A failure here is fatal to connection setup;
    /// nothing is registered until this returns `Ok`.
    pub async fn connect(config: &SshConfig) -> Result<Self, TunnelError> {
        let ssh_config = Arc::new(client::Config::default());

        let mut handle = tokio::time::timeout(
            CONNECT_TIMEOUT,
            client::connect(
                ssh_config,
                (config.host.as_str(), config.port),
                ClientHandler,
            ),
        )
        .await
        .map_err(|_| TunnelError::ConnectTimeout(config.addr()))??;

        let authenticated = handle
            .authenticate_password(config.user.as_str(), config.password.as_str())
            .await?;
        if !authenticated {
            return Err(TunnelError::AuthFailed {
                user: config.user.clone(),
            });
        }

        tracing::info!(
            "ssh session established for {}@{}:{}",
            config.user,
            config.host,
            config.port
        );

        Ok(Self {
            handle: Mutex::new(handle),
        })
    }
}

#[async_trait]
impl TunnelSession for SshSession {
    async fn open_channel(&self, host: &str, port: u16) -> Result<BoxedStream, TunnelError> {
        let channel = {
            let handle = self.handle.lock().await;
            handle
                .channel_open_direct_tcpip(host, port as u32, "127.0.0.1", 0)
                .await?
        };
        tracing::debug!("opened direct-tcpip channel to {}:{}", host, port);
        Ok(Box::new(channel.into_stream()))
    }

    async fn close(&self) -> Result<(), TunnelError> {
        let handle = self.handle.lock().await;
        handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}
