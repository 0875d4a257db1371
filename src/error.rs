//! Error types for wisp-mysql.

use thiserror::Error;

use crate::error_codes::error_code_symbol;

/// Result type for wisp-mysql operations.
pub type Result<T> = core::result::Result<T, Error>;

/// SQL text longer than this is shortened before being attached to an error.
const MAX_ERROR_SQL_TEXT_LEN: usize = 1024;

/// Error reported by the server in an ERR packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Numeric server error code (e.g. 1045)
    pub code: u16,
    /// Symbolic name of `code` (e.g. `ER_ACCESS_DENIED_ERROR`)
    pub symbol: &'static str,
    /// SQLSTATE (5 characters)
    pub sql_state: String,
    /// Human-readable message
    pub message: String,
    /// SQL text of the query that failed, if any
    pub sql_text: Option<String>,
}

impl ServerError {
    /// Build an error from a numeric code, resolving its symbolic name.
    pub fn new(code: u16, sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            symbol: error_code_symbol(code),
            sql_state: sql_state.into(),
            message: message.into(),
            sql_text: None,
        }
    }

    /// Error used when the server sent an ERR packet too short to decode.
    pub fn unknown() -> Self {
        Self {
            code: 0,
            symbol: "ER_UNKNOWN",
            sql_state: "HY000".to_string(),
            message: "invalid mysql error packet".to_string(),
            sql_text: None,
        }
    }

    /// Attach the SQL text that caused this error.
    ///
    /// Long statements keep their head and tail joined by `" ... "`.
    pub fn set_sql_text(&mut self, sql: &str) {
        let char_count = sql.chars().count();
        if char_count > MAX_ERROR_SQL_TEXT_LEN {
            let half = MAX_ERROR_SQL_TEXT_LEN / 2;
            let head: String = sql.chars().take(half).collect();
            let tail: String = sql.chars().skip(char_count - half).collect();
            self.sql_text = Some(format!("{head} ... {tail}"));
        } else {
            self.sql_text = Some(sql.to_string());
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, SQLSTATE {}): {}",
            self.symbol, self.code, self.sql_state, self.message
        )?;
        if let Some(sql) = &self.sql_text {
            write!(f, "\nSQL: {}", sql)?;
        }
        Ok(())
    }
}

/// Error type for wisp-mysql.
#[derive(Debug, Error)]
pub enum Error {
    /// Server error response (ERR packet)
    #[error("MySQL error: {0}")]
    Server(ServerError),

    /// A complete payload was shorter than its contents require
    #[error("invalid buffer length: {0}")]
    BufferSize(String),

    /// A frame arrived out of order; the connection is desynchronized
    #[error("invalid server sequence id: expected {expected}, received {received}")]
    SequenceId {
        /// Sequence id the client expected next
        expected: u8,
        /// Sequence id found in the frame header
        received: u8,
    },

    /// Server greeted with a protocol version this client does not speak
    #[error("unsupported handshake version: {0}")]
    UnsupportedHandshakeVersion(u8),

    /// Server handshake lacks the CLIENT_PLUGIN_AUTH capability
    #[error("server did not enable plugin authentication")]
    AuthPluginNotEnabled,

    /// Server asked for an authentication plugin other than mysql_native_password
    #[error("unsupported auth plugin: {0}")]
    AuthPlugin(String),

    /// Server handshake is structurally invalid
    #[error("malformed server handshake: {0}")]
    MalformedHandshake(&'static str),

    /// Server replied with a packet that is not valid in the current state
    #[error("invalid server reply: {0}")]
    InvalidServerReply(&'static str),

    /// A text row carried more values than the result set has columns
    #[error("invalid column count in text result set row: more than {columns} values")]
    ServerResultset {
        /// Column count announced by the result set header
        columns: usize,
    },

    /// All retries were used up
    #[error("retry count exceeded after {} attempts", .errors.len())]
    MaxRetries {
        /// Configured retry budget
        max_retries: u32,
        /// Every error observed, oldest first
        errors: Vec<Error>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection is broken and cannot be reused
    #[error("Connection is broken")]
    ConnectionBroken,

    /// Invalid usage (bad configuration, missing template parameter, ...)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// The pool dropped a waiting caller
    #[error("Pool closed")]
    PoolClosed,
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Server(_)
            | Error::MaxRetries { .. }
            | Error::InvalidUsage(_)
            | Error::PoolClosed => false,
            Error::BufferSize(_)
            | Error::SequenceId { .. }
            | Error::UnsupportedHandshakeVersion(_)
            | Error::AuthPluginNotEnabled
            | Error::AuthPlugin(_)
            | Error::MalformedHandshake(_)
            | Error::InvalidServerReply(_)
            | Error::ServerResultset { .. }
            | Error::Io(_)
            | Error::ConnectionClosed
            | Error::ConnectionBroken => true,
        }
    }

    /// Stable error code: `ERR_*` for client-side kinds, the server's
    /// symbolic name (e.g. `ER_LOCK_DEADLOCK`) for server errors.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Server(e) => e.symbol,
            Error::BufferSize(_) => "ERR_BUFFER_SIZE",
            Error::SequenceId { .. } => "ERR_SERVER_ERROR",
            Error::UnsupportedHandshakeVersion(_) => "ERR_UNSUPPORTED_HANDSHAKE_VERSION",
            Error::AuthPluginNotEnabled => "ERR_AUTH_PLUGIN_NOT_ENABLED",
            Error::AuthPlugin(_) => "ERR_AUTH_PLUGIN",
            Error::MalformedHandshake(_) => "ERR_MALFORMED_HANDSHAKE",
            Error::InvalidServerReply(_) => "ERR_INVALID_SERVER_REPLY",
            Error::ServerResultset { .. } => "ERR_SERVER_RESULTSET",
            Error::MaxRetries { .. } => "ERR_MAX_RETRIES",
            Error::Io(_) => "ERR_IO",
            Error::ConnectionClosed => "ERR_CONNECTION_CLOSED",
            Error::ConnectionBroken => "ERR_CONNECTION_BROKEN",
            Error::InvalidUsage(_) => "ERR_INVALID_USAGE",
            Error::PoolClosed => "ERR_POOL_CLOSED",
        }
    }

    /// Get the server error if this is one.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Error::Server(e) => Some(e),
            _ => None,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        self.server_error().map(|e| e.sql_state.as_str())
    }

    /// Get the numeric server error code if this is a server error.
    pub fn sql_code(&self) -> Option<u16> {
        self.server_error().map(|e| e.code)
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Error::Server(err)
    }
}
