//! Query Demo Binary
//!
//! Connects to MySQL, optionally through an SSH tunnel, runs a query, and
//! prints the decoded records.
//!
//! Run with:
//!   DB_HOST=... DB_USER=... DB_PASS=... DB_NAME=... cargo run --bin query-demo
//!
//! Set SSH_HOST/SSH_USER/SSH_PASS to route the connection through a tunnel.

use anyhow::Result;
use burrow::{ConnectionManager, MysqlConfig, SshConfig};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("query_demo=debug".parse()?)
                .add_directive("burrow=debug".parse()?)
                .add_directive("warn".parse()?),
        )
        .init();

    let tunnel = env::var("SSH_HOST").ok().map(|host| SshConfig {
        host,
        port: env::var("SSH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(22),
        user: env::var("SSH_USER").unwrap_or_default(),
        password: env::var("SSH_PASS").unwrap_or_default(),
    });

    let config = MysqlConfig {
        host: env::var("DB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        user: env::var("DB_USER").unwrap_or_else(|_| "root".to_string()),
        password: env::var("DB_PASS").unwrap_or_default(),
        database: env::var("DB_NAME").unwrap_or_else(|_| "mysql".to_string()),
        tunnel,
        ..MysqlConfig::default()
    };

    let mut db = ConnectionManager::connect(config).await?;
    println!("connected via {} transport", db.transport_name());

    let sql = env::var("DEMO_SQL").unwrap_or_else(|_| "SHOW TABLES".to_string());
    let records = db.query_rows(&sql).await?;
    println!("{} row(s)", records.len());
    for record in &records {
        for (name, value) in record.iter() {
            print!("{}={} ", name, value);
        }
        println!();
    }

    db.close().await;
    Ok(())
}
