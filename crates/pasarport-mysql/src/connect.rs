use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::info;

use pasarport_core::{Error, Result};

pub const DEFAULT_PORT: u16 = 3306;

/// Connection settings for one MySQL database.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: "root".to_string(),
            password: String::new(),
            database: String::new(),
        }
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .charset("utf8mb4")
    }
}

/// Redacted form, safe to log.
impl fmt::Display for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// Open a single connection. `label` names the database in logs and errors.
pub async fn connect(options: &MySqlConnectOptions, label: &str) -> Result<MySqlConnection> {
    let mut conn = options
        .connect()
        .await
        .map_err(|err| Error::Connection(format!("{label}: {err}")))?;
    conn.ping()
        .await
        .map_err(|err| Error::Connection(format!("{label}: {err}")))?;
    info!(database = %label, "connected");
    Ok(conn)
}

/// Map a driver error onto the pipeline's error tiers.
pub fn store_error(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => Error::Connection(err.to_string()),
        other => Error::Statement(other.to_string()),
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_hides_password() {
        let config = DatabaseConfig {
            password: "hunter2".into(),
            database: "marzneshin".into(),
            ..DatabaseConfig::default()
        };
        assert_eq!(config.to_string(), "root@localhost:3306/marzneshin");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("users"), "`users`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn io_errors_are_connection_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(store_error(sqlx::Error::Io(io)).is_fatal());
        assert!(!store_error(sqlx::Error::RowNotFound).is_fatal());
    }
}
