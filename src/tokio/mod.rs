//! Asynchronous MySQL client using Tokio.

mod conn;
mod pool;
mod stream;
mod transaction;

pub use conn::Conn;
pub use pool::{Pool, PoolStatus, PooledConn};
pub use stream::Stream;
pub use transaction::Transaction;
