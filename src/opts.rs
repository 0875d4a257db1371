//! Connection and pool options.

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::value::{DecodeFn, decode_record_value};

/// Connection options for MySQL, shared by `Conn` and `Pool`.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname or IP address.
    ///
    /// Default: `"localhost"`
    pub host: String,

    /// Port number for the MySQL server.
    ///
    /// Default: `3306`
    pub port: u16,

    /// Username for authentication.
    ///
    /// Default: `"root"`
    pub user: String,

    /// Password for authentication. Empty sends an empty auth response.
    ///
    /// Default: `""`
    pub password: String,

    /// Database to select during the handshake.
    ///
    /// Default: `None`
    pub database: Option<String>,

    /// Idle connections above this count are closed once they have been
    /// idle for `idle_timeout`.
    ///
    /// Default: `2`
    pub min_connections: usize,

    /// Upper bound on live pooled connections (idle plus checked out).
    ///
    /// Default: `8`
    pub max_connections: usize,

    /// How long a pooled connection may sit idle before it is a candidate
    /// for closing.
    ///
    /// Default: 5 minutes
    pub idle_timeout: Duration,

    /// Set TCP_NODELAY on new sockets.
    ///
    /// Default: `true`
    pub tcp_nodelay: bool,

    /// Decoder applied to every non-NULL value of a result row.
    ///
    /// Default: [`decode_record_value`]
    pub decode: DecodeFn,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: None,
            min_connections: 2,
            max_connections: 8,
            idle_timeout: Duration::from_secs(5 * 60),
            tcp_nodelay: true,
            decode: decode_record_value,
        }
    }
}

impl Opts {
    /// Check the options for values no connection or pool can work with.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::InvalidUsage("host is empty".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidUsage(
                "port must be in range 1 to 65535".into(),
            ));
        }
        if self.max_connections == 0 {
            return Err(Error::InvalidUsage("max_connections must be >= 1".into()));
        }
        if self.max_connections < self.min_connections {
            return Err(Error::InvalidUsage(format!(
                "max_connections must be >= min_connections: {} < {}",
                self.max_connections, self.min_connections
            )));
        }
        Ok(())
    }

    /// `host:port` for socket connects.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "True" | "1" | "yes" | "on" => Ok(true),
        "false" | "False" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidUsage(format!("Invalid {key}: {value}"))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidUsage(format!("Invalid {key}: {value}")))
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a MySQL connection URL.
    ///
    /// Format: `mysql://[user[:password]@]host[:port][/database][?param1=value1&..]`
    ///
    /// Supported query parameters:
    /// - `min_connections`, `max_connections`: pool bounds (non-negative integers)
    /// - `idle_timeout_ms`: idle timeout in milliseconds
    /// - `tcp_nodelay`: true/True/1/yes/on or false/False/0/no/off
    fn try_from(url: &Url) -> Result<Self> {
        if url.scheme() != "mysql" {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'mysql://', got '{}://'",
                url.scheme()
            )));
        }

        let defaults = Opts::default();
        let mut opts = Opts {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(defaults.port),
            user: if url.username().is_empty() {
                defaults.user.clone()
            } else {
                url.username().to_string()
            },
            password: url.password().unwrap_or_default().to_string(),
            database: url
                .path()
                .strip_prefix('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            ..defaults
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "min_connections" => opts.min_connections = parse_number(&key, &value)?,
                "max_connections" => opts.max_connections = parse_number(&key, &value)?,
                "idle_timeout_ms" => {
                    opts.idle_timeout = Duration::from_millis(parse_number(&key, &value)?);
                }
                "tcp_nodelay" => opts.tcp_nodelay = parse_bool(&key, &value)?,
                other => {
                    return Err(Error::InvalidUsage(format!(
                        "Unknown connection parameter: {other}"
                    )));
                }
            }
        }

        opts.validate()?;
        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}
