//! SSH tunneling for database connections.
//!
//! This module provides:
//! - `TunnelSession` / `SshSession` - an authenticated SSH session that opens
//!   logical byte-stream channels on demand
//! - `TunnelDialer` - dials a `host:port` address through a bound session
//! - `TransportRegistry` - named transports, registered exactly once
//! - `TransportForward` - loopback listener bridging driver sockets onto
//!   session channels

mod dialer;
mod session;

pub use dialer::{TransportForward, TransportRegistry, TunnelDialer};
pub use session::{BoxedStream, ByteStream, SshSession, TunnelSession};
