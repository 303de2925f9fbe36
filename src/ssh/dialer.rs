//! Transport dialing through an established SSH session.

use super::session::{BoxedStream, TunnelSession};
use crate::error::TunnelError;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Backoff after a failed accept; a persistent error (such as descriptor
/// exhaustion) must not spin the loop hot.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Dials remote addresses through the session it is bound to, standing in for
/// a raw TCP dial.
#[derive(Clone)]
pub struct TunnelDialer {
    session: Arc<dyn TunnelSession>,
}

impl std::fmt::Debug for TunnelDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelDialer").finish_non_exhaustive()
    }
}

impl TunnelDialer {
    pub fn new(session: Arc<dyn TunnelSession>) -> Self {
        Self { session }
    }

    /// Open a logical channel to `addr` (`host:port`) and return it as a byte
    /// stream. No retry and no extra timeout; the caller owns its own
    /// connection-retry policy.
    pub async fn dial(&self, addr: &str) -> Result<BoxedStream, TunnelError> {
        let (host, port) = split_host_port(addr)?;
        self.session.open_channel(host, port).await
    }
}

fn split_host_port(addr: &str) -> Result<(&str, u16), TunnelError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| TunnelError::BadAddress(addr.to_string()))?;
    if host.is_empty() {
        return Err(TunnelError::BadAddress(addr.to_string()));
    }
    let port = port
        .parse()
        .map_err(|_| TunnelError::BadAddress(addr.to_string()))?;
    Ok((host, port))
}

/// Append-only mapping from transport name to the dialer bound to a session.
///
/// Owned by the connection manager rather than living in process-global
/// state; a name must be registered exactly once before the driver opens a
/// connection referencing it.
#[derive(Default)]
pub struct TransportRegistry {
    dialers: HashMap<String, TunnelDialer>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` once. Re-registration is a configuration error, not a
    /// silent overwrite.
    pub fn register(&mut self, name: &str, dialer: TunnelDialer) -> Result<(), TunnelError> {
        if self.dialers.contains_key(name) {
            return Err(TunnelError::AlreadyRegistered(name.to_string()));
        }
        self.dialers.insert(name.to_string(), dialer);
        tracing::debug!("registered transport `{}`", name);
        Ok(())
    }

    pub fn dialer(&self, name: &str) -> Result<&TunnelDialer, TunnelError> {
        self.dialers
            .get(name)
            .ok_or_else(|| TunnelError::UnknownTransport(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dialers.contains_key(name)
    }
}

/// Loopback listener that bridges accepted connections onto session channels.
///
/// The database driver dials TCP itself, so the tunneled transport is exposed
/// as a local listening socket: each pooled connection the driver opens is
/// carried over its own logical channel on the session, released when the
/// driver closes its end.
pub struct TransportForward {
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl TransportForward {
    /// Bind a loopback port and start forwarding accepted connections to
    /// `target` through `dialer`.
    pub async fn start(dialer: TunnelDialer, target: String) -> Result<Self, TunnelError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local_addr = listener.local_addr()?;
        let cancel = CancellationToken::new();

        tracing::info!(
            "transport forward listening on {} for {}",
            local_addr,
            target
        );

        let loop_cancel = cancel.clone();
        tokio::spawn(async move {
            Self::run(listener, dialer, target, loop_cancel).await;
        });

        Ok(Self { local_addr, cancel })
    }

    /// The local address the driver should dial.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and close active bridges.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        tracing::info!("transport forward on {} stopped", self.local_addr);
    }

    async fn run(
        listener: TcpListener,
        dialer: TunnelDialer,
        target: String,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!("forwarding connection from {} to {}", peer, target);
                            let dialer = dialer.clone();
                            let target = target.clone();
                            let cancel = cancel.clone();
                            tokio::spawn(async move {
                                if let Err(e) = Self::bridge(stream, dialer, &target, cancel).await {
                                    tracing::warn!("tunnel forwarding error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("failed to accept tunnel connection: {}", e);
                            tokio::select! {
                                _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                                _ = cancel.cancelled() => break,
                            }
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    break;
                }
            }
        }
    }

    async fn bridge(
        mut local: TcpStream,
        dialer: TunnelDialer,
        target: &str,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError> {
        let mut channel = dialer.dial(target).await?;
        tokio::select! {
            copied = tokio::io::copy_bidirectional(&mut local, &mut channel) => {
                copied?;
            }
            _ = cancel.cancelled() => {}
        }
        Ok(())
    }
}

impl Drop for TransportForward {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Mock session that records channel opens and answers each one with an
    /// echo stream.
    struct MockSession {
        opened: Mutex<Vec<(String, u16)>>,
    }

    impl MockSession {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                opened: Mutex::new(Vec::new()),
            })
        }

        fn opened(&self) -> Vec<(String, u16)> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TunnelSession for MockSession {
        async fn open_channel(&self, host: &str, port: u16) -> Result<BoxedStream, TunnelError> {
            self.opened.lock().unwrap().push((host.to_string(), port));

            let (near, mut far) = tokio::io::duplex(4096);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match far.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if far.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
            Ok(Box::new(near))
        }

        async fn close(&self) -> Result<(), TunnelError> {
            Ok(())
        }
    }

    /// Refuses every channel open.
    struct ClosedSession;

    #[async_trait]
    impl TunnelSession for ClosedSession {
        async fn open_channel(&self, _host: &str, _port: u16) -> Result<BoxedStream, TunnelError> {
            Err(TunnelError::Ssh(russh::Error::Disconnect))
        }

        async fn close(&self) -> Result<(), TunnelError> {
            Ok(())
        }
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("db-host:3306").unwrap(), ("db-host", 3306));
        assert_eq!(split_host_port("10.0.0.1:22").unwrap(), ("10.0.0.1", 22));
        assert!(split_host_port("no-port").is_err());
        assert!(split_host_port(":3306").is_err());
        assert!(split_host_port("host:not-a-port").is_err());
    }

    #[tokio::test]
    async fn test_dial_routes_through_bound_session() {
        let session = MockSession::new();
        let mut registry = TransportRegistry::new();
        registry
            .register("mysql+ssh", TunnelDialer::new(session.clone()))
            .unwrap();

        let dialer = registry.dialer("mysql+ssh").unwrap();
        let mut stream = dialer.dial("db-host:3306").await.unwrap();

        // The channel was opened on the exact session the transport is bound
        // to, with the dialed address.
        assert_eq!(session.opened(), vec![("db-host".to_string(), 3306)]);

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_dial_forwards_channel_open_failure() {
        let dialer = TunnelDialer::new(Arc::new(ClosedSession));
        let err = dialer.dial("db-host:3306").await.unwrap_err();
        assert!(matches!(err, TunnelError::Ssh(_)));
    }

    #[tokio::test]
    async fn test_register_twice_is_an_error() {
        let session = MockSession::new();
        let mut registry = TransportRegistry::new();
        registry
            .register("mysql+ssh", TunnelDialer::new(session.clone()))
            .unwrap();

        let err = registry
            .register("mysql+ssh", TunnelDialer::new(session))
            .unwrap_err();
        assert!(matches!(err, TunnelError::AlreadyRegistered(name) if name == "mysql+ssh"));
    }

    #[tokio::test]
    async fn test_unknown_transport() {
        let registry = TransportRegistry::new();
        let err = registry.dialer("missing").unwrap_err();
        assert!(matches!(err, TunnelError::UnknownTransport(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_forward_bridges_tcp_through_session() {
        let session = MockSession::new();
        let forward = TransportForward::start(
            TunnelDialer::new(session.clone()),
            "db-host:3306".to_string(),
        )
        .await
        .unwrap();

        let mut conn = TcpStream::connect(forward.local_addr()).await.unwrap();
        conn.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        // Each accepted connection consumed one channel on the session.
        assert_eq!(session.opened(), vec![("db-host".to_string(), 3306)]);

        forward.shutdown();
    }

    #[tokio::test]
    async fn test_forward_stops_accepting_after_shutdown() {
        let session = MockSession::new();
        let forward =
            TransportForward::start(TunnelDialer::new(session), "db-host:3306".to_string())
                .await
                .unwrap();
        let addr = forward.local_addr();
        forward.shutdown();

        // Give the accept loop a moment to observe cancellation.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let refused = match TcpStream::connect(addr).await {
            Err(_) => true,
            // The listener socket may linger briefly; a connect that succeeds
            // must at least see the bridge closed immediately.
            Ok(mut conn) => {
                let mut buf = [0u8; 1];
                matches!(conn.read(&mut buf).await, Ok(0) | Err(_))
            }
        };
        assert!(refused);
    }
}
