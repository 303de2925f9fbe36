//! Connection configuration.

use serde::Deserialize;

/// Settings for the database connection and pool. Defaults match the values
/// a bare config ships with: MySQL port, utf8mb4, a small pool.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database/schema selected on connect.
    pub database: String,
    pub charset: String,
    /// Connect timeout in milliseconds; also the pool acquire timeout.
    pub timeout_ms: u32,
    pub max_open_conns: u32,
    /// Cap on idle connections. The pool keeps this many connections open
    /// (never more than `max_open_conns`) instead of trimming down to it.
    pub max_idle_conns: u32,
    pub conn_max_lifetime_secs: u64,
    /// When set, the connection is carried over an SSH tunnel instead of a
    /// direct TCP socket.
    pub tunnel: Option<SshConfig>,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 3306,
            user: String::new(),
            password: String::new(),
            database: String::new(),
            charset: "utf8mb4".to_string(),
            timeout_ms: 5000,
            max_open_conns: 2,
            max_idle_conns: 0,
            conn_max_lifetime_secs: 2,
            tunnel: None,
        }
    }
}

/// SSH endpoint and password credentials for the tunnel.
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
}

fn default_ssh_port() -> u16 {
    22
}

impl SshConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_config_defaults() {
        let config = MysqlConfig::default();
        assert_eq!(config.port, 3306);
        assert_eq!(config.charset, "utf8mb4");
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.max_open_conns, 2);
        assert_eq!(config.max_idle_conns, 0);
        assert_eq!(config.conn_max_lifetime_secs, 2);
        assert!(config.tunnel.is_none());
    }

    #[test]
    fn test_ssh_config_addr() {
        let config = SshConfig {
            host: "bastion.example.com".to_string(),
            port: 2222,
            user: "deploy".to_string(),
            password: "secret".to_string(),
        };
        assert_eq!(config.addr(), "bastion.example.com:2222");
    }

    #[test]
    fn test_ssh_port_defaults_to_22() {
        let config: SshConfig =
            serde_json::from_str(r#"{"host":"h","user":"u","password":"p"}"#).unwrap();
        assert_eq!(config.port, 22);
    }
}
