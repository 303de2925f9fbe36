//! Connection lifecycle: tunnel first, then the pooled database client.

use crate::config::MysqlConfig;
use crate::error::{Error, Result};
use crate::ssh::{SshSession, TransportForward, TransportRegistry, TunnelDialer, TunnelSession};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::sync::Arc;
use std::time::Duration;

/// Transport name the data-source string references for tunneled
/// connections; direct connections use the literal `tcp`.
pub const TUNNEL_TRANSPORT: &str = "mysql+ssh";

/// Owns the connection lifecycle: tunnel session, transport registration, and
/// the pooled database client, in that order.
///
/// Caller-owned; construct once with [`ConnectionManager::connect`] and tear
/// down with [`ConnectionManager::close`]. The pool itself is safe for
/// concurrent use through `&self`.
pub struct ConnectionManager {
    pool: Option<MySqlPool>,
    session: Option<Arc<dyn TunnelSession>>,
    forward: Option<TransportForward>,
    registry: TransportRegistry,
    config: MysqlConfig,
}

impl ConnectionManager {
    /// Connect to the database described by `config`.
    ///
    /// When a tunnel is configured the SSH session is established,
    /// registered, and forwarding before the pool is opened. Any failure here
    /// is setup-fatal: the partial state is torn down and the error surfaces.
    pub async fn connect(config: MysqlConfig) -> Result<Self> {
        let session: Option<Arc<dyn TunnelSession>> = match &config.tunnel {
            Some(ssh) => Some(Arc::new(SshSession::connect(ssh).await?)),
            None => None,
        };
        Self::connect_with(config, session).await
    }

    /// Connect over an already-established tunnel session in place of the
    /// password-authenticated default. The session is registered under the
    /// tunnel transport name and owned by the manager; shutdown order is
    /// unchanged.
    pub async fn connect_with_session(
        config: MysqlConfig,
        session: Arc<dyn TunnelSession>,
    ) -> Result<Self> {
        Self::connect_with(config, Some(session)).await
    }

    async fn connect_with(
        config: MysqlConfig,
        session: Option<Arc<dyn TunnelSession>>,
    ) -> Result<Self> {
        let mut registry = TransportRegistry::new();
        let mut forward: Option<TransportForward> = None;

        let mut transport = "tcp";
        let mut dial_host = config.host.clone();
        let mut dial_port = config.port;

        if let Some(tunnel) = &session {
            registry.register(TUNNEL_TRANSPORT, TunnelDialer::new(tunnel.clone()))?;

            let dialer = registry.dialer(TUNNEL_TRANSPORT)?.clone();
            let target = format!("{}:{}", config.host, config.port);
            let fwd = TransportForward::start(dialer, target)
                .await
                .map_err(Error::Tunnel)?;

            // The driver dials the forward's loopback socket; each pooled
            // connection then rides its own channel on the session.
            dial_host = fwd.local_addr().ip().to_string();
            dial_port = fwd.local_addr().port();
            transport = TUNNEL_TRANSPORT;
            forward = Some(fwd);
        }

        tracing::info!(
            "opening mysql pool for {}@{}:{}/{} via {} transport",
            config.user,
            config.host,
            config.port,
            config.database,
            transport
        );

        let options = MySqlConnectOptions::new()
            .host(&dial_host)
            .port(dial_port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)
            .charset(&config.charset);

        let pool = pool_options(&config).connect_with(options).await;

        let pool = match pool {
            Ok(pool) => pool,
            Err(e) => {
                if let Some(fwd) = &forward {
                    fwd.shutdown();
                }
                if let Some(session) = &session {
                    let _ = session.close().await;
                }
                return Err(Error::Setup(e));
            }
        };

        Ok(Self {
            pool: Some(pool),
            session,
            forward,
            registry,
            config,
        })
    }

    /// The driver-level data-source string for this connection:
    /// `user:password@transport(host:port)/schema?charset=<set>&timeout=<ms>ms`.
    pub fn data_source(&self) -> String {
        data_source(&self.config, self.transport_name())
    }

    /// `tcp` for direct connections, the registered transport name otherwise.
    pub fn transport_name(&self) -> &'static str {
        if self.forward.is_some() {
            TUNNEL_TRANSPORT
        } else {
            "tcp"
        }
    }

    pub fn registry(&self) -> &TransportRegistry {
        &self.registry
    }

    pub fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    pub(crate) fn pool(&self) -> Result<&MySqlPool> {
        self.pool.as_ref().ok_or(Error::NotConnected)
    }

    /// Tear down in order: pool, forwarder, session. Idempotent; each step
    /// logs what it closed.
    pub async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            tracing::info!("mysql pool closed");
        }
        if let Some(forward) = self.forward.take() {
            forward.shutdown();
        }
        if let Some(session) = self.session.take() {
            match session.close().await {
                Ok(()) => tracing::info!("ssh session closed"),
                Err(e) => tracing::warn!("ssh session close: {}", e),
            }
        }
    }
}

// The idle-connection cap has no direct pool equivalent; the nearest knob is
// a floor of open connections, clamped so it never exceeds the maximum.
fn pool_options(config: &MysqlConfig) -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(config.max_open_conns)
        .min_connections(config.max_idle_conns.min(config.max_open_conns))
        .max_lifetime(Duration::from_secs(config.conn_max_lifetime_secs))
        .acquire_timeout(Duration::from_millis(config.timeout_ms as u64))
}

fn data_source(config: &MysqlConfig, transport: &str) -> String {
    format!(
        "{}:{}@{}({}:{})/{}?charset={}&timeout={}ms",
        config.user,
        config.password,
        transport,
        config.host,
        config.port,
        config.database,
        config.charset,
        config.timeout_ms,
    )
}
