//! Transaction support for asynchronous MySQL connections.

use std::ops::DerefMut;

use tracing::debug;

use super::Conn;
use crate::error::Result;
use crate::protocol::response::OkPacket;
use crate::result::QueryResult;
use crate::retry::QueryOptions;
use crate::sql::ToSql;

/// A MySQL transaction.
///
/// Holds its connection, either borrowed (`&mut Conn` from
/// [`Conn::begin`]) or owned (`PooledConn` from `Pool::begin`).
/// `commit` and `rollback` consume the transaction; an owned pooled
/// connection goes back to the pool afterwards.
///
/// Dropping a transaction without finishing it leaves the server-side
/// transaction open. A pooled connection in that state is discarded on
/// release instead of being reused.
pub struct Transaction<C: DerefMut<Target = Conn>> {
    conn: C,
}

impl<C: DerefMut<Target = Conn>> Transaction<C> {
    /// Send BEGIN on `conn`.
    pub(crate) async fn begin(mut conn: C) -> Result<Self> {
        conn.query("BEGIN").await?;
        debug!(connection_id = conn.connection_id(), "transaction started");
        Ok(Self { conn })
    }

    /// The underlying connection.
    pub fn conn(&mut self) -> &mut Conn {
        &mut self.conn
    }

    pub async fn query(&mut self, sql: &str) -> Result<QueryResult> {
        self.conn.query(sql).await
    }

    pub async fn query_with(&mut self, sql: &str, options: &QueryOptions) -> Result<QueryResult> {
        self.conn.query_with(sql, options).await
    }

    pub async fn insert(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: &[&[&dyn ToSql]],
    ) -> Result<OkPacket> {
        self.conn.insert(table, columns, rows).await
    }

    /// `SET autocommit = 1` or `0`.
    pub async fn set_autocommit(&mut self, on: bool) -> Result<()> {
        let sql = if on {
            "SET autocommit = 1"
        } else {
            "SET autocommit = 0"
        };
        self.conn.query(sql).await?;
        Ok(())
    }

    /// Commit the transaction.
    pub async fn commit(mut self) -> Result<()> {
        self.conn.query("COMMIT").await?;
        Ok(())
    }

    /// Rollback the transaction.
    pub async fn rollback(mut self) -> Result<()> {
        self.conn.query("ROLLBACK").await?;
        Ok(())
    }
}
