//! Error types for tunnel setup, query execution, and row decoding.
//!
//! The split mirrors how failures are handled: tunnel and pool setup errors
//! are fatal to `connect` and leave no partial state behind, query errors are
//! returned to the caller to retry or surface, and decode errors only occur
//! for unsigned overflow (everything else in the coercion table is
//! best-effort and total).

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error for connection-manager operations.
#[derive(Debug, Error)]
pub enum Error {
    /// SSH session or transport setup failed; startup aborts.
    #[error("tunnel setup failed: {0}")]
    Tunnel(#[from] TunnelError),

    /// The database pool could not be opened.
    #[error("database setup failed: {0}")]
    Setup(#[source] sqlx::Error),

    /// A query or statement failed. Recoverable; the caller decides.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Decoding the result set failed (unsigned 64-bit overflow).
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// An operation was attempted before `connect` or after `close`.
    #[error("not connected to a database")]
    NotConnected,
}

/// Errors from the SSH session, dialer, and transport registry.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("ssh: {0}")]
    Ssh(#[from] russh::Error),

    #[error("ssh connect to {0} timed out")]
    ConnectTimeout(String),

    #[error("ssh authentication failed for user `{user}`")]
    AuthFailed { user: String },

    #[error("invalid dial address `{0}` (expected host:port)")]
    BadAddress(String),

    /// Registering a transport name twice is a configuration error, never a
    /// silent overwrite.
    #[error("transport `{0}` is already registered")]
    AlreadyRegistered(String),

    #[error("no transport registered under `{0}`")]
    UnknownTransport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The one unrecoverable coercion failure: an unsigned 64-bit value that does
/// not fit a signed 64-bit integer aborts the whole decode rather than
/// truncating the value beyond recognition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsigned value {value} in column `{column}` overflows a signed 64-bit integer")]
    UnsignedOverflow { column: String, value: u64 },
}
