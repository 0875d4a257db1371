//! An async MySQL client with connection pooling and query retry.
//!
//! # Features
//!
//! - **Sans-I/O state machines**: handshake and query decoding are separated from I/O
//! - **Text protocol**: COM_QUERY results decoded through a pluggable [`DecodeFn`]
//! - **Pooling**: MRU idle reuse, FIFO waiters, idle eviction, live reconfiguration
//! - **Retry**: per-call predicate, bounded attempts, jittered delay
//!
//! # Example
//!
//! ```no_run
//! use wisp_mysql::tokio::Pool;
//! use wisp_mysql::{Opts, QueryOptions};
//!
//! # async fn run() -> wisp_mysql::Result<()> {
//! let pool = Pool::new(Opts {
//!     host: "localhost".into(),
//!     user: "app".into(),
//!     password: "secret".into(),
//!     database: Some("shop".into()),
//!     ..Default::default()
//! })?;
//!
//! let deadlock_retry = QueryOptions::new()
//!     .retry_on(|e| e.code() == "ER_LOCK_DEADLOCK")
//!     .max_retries(3);
//! let result = pool.query_with("SELECT id, name FROM items", &deadlock_retry).await?;
//! if let Some(rows) = result.result_set() {
//!     for record in rows.records() {
//!         println!("{:?}", record.get("name"));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod buffer_pool;
mod buffer_set;
pub mod error;
pub mod error_codes;
pub mod opts;
pub mod protocol;
pub mod result;
pub mod retry;
pub mod sql;
pub mod state;
pub mod value;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use buffer_set::BufferSet;
pub use error::{Error, Result, ServerError};
pub use error_codes::error_code_symbol;
pub use opts::Opts;
pub use protocol::response::{ColumnDefinition, OkPacket};
pub use result::{QueryResult, Record, ResultSet};
#[cfg(feature = "tokio")]
pub use retry::with_retry;
pub use retry::{QueryOptions, RetryDecision, RetryState};
pub use sql::ToSql;
pub use value::{DecodeFn, Value, decode_record_value};
