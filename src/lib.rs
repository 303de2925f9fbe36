//! MySQL access through an SSH tunnel, with dynamically typed row records.
//!
//! The crate has two halves. The `ssh` module adapts an authenticated SSH
//! session into a named transport the database driver can dial in place of a
//! raw TCP socket. The `db` module opens a pooled sqlx connection over that
//! transport (or directly over TCP) and decodes arbitrary, schema-unknown
//! result sets into ordered name-to-value records with a deterministic
//! per-column coercion policy.
//!
//! ```no_run
//! use burrow::{ConnectionManager, MysqlConfig, SshConfig};
//!
//! # async fn run() -> Result<(), burrow::Error> {
//! let config = MysqlConfig {
//!     host: "db.internal".into(),
//!     user: "app".into(),
//!     password: "secret".into(),
//!     database: "inventory".into(),
//!     tunnel: Some(SshConfig {
//!         host: "bastion.example.com".into(),
//!         port: 22,
//!         user: "deploy".into(),
//!         password: "ssh-secret".into(),
//!     }),
//!     ..MysqlConfig::default()
//! };
//!
//! let mut db = ConnectionManager::connect(config).await?;
//! for record in db.query_rows("SELECT id, name FROM parts").await? {
//!     println!("{:?}", record.get("name"));
//! }
//! db.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod ssh;

pub use config::{MysqlConfig, SshConfig};
pub use db::{ConnectionManager, Param, Record, ScanKind, Value};
pub use error::{DecodeError, Error, Result, TunnelError};
