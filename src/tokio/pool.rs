//! Asynchronous connection pool.
//!
//! Idle connections are reused most-recently-released first. Callers that
//! find the pool at `max_connections` queue up and are served in arrival
//! order, either by a released connection or by a fresh one opened when a
//! slot frees up.

use std::collections::VecDeque;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::response::OkPacket;
use crate::result::QueryResult;
use crate::retry::{QueryOptions, with_retry};
use crate::sql::ToSql;

use super::Conn;
use super::transaction::Transaction;

/// A connection tagged with the config generation it was opened under.
type Tagged = (Conn, u64);
type Waiter = oneshot::Sender<Result<Handoff>>;

/// A connection on its way to a waiter. Released back to the pool if it is
/// dropped before the waiter takes it.
struct Handoff {
    pool: Arc<PoolInner>,
    conn: Option<Tagged>,
}

impl Handoff {
    fn take(&mut self) -> Option<Tagged> {
        self.conn.take()
    }
}

impl Drop for Handoff {
    fn drop(&mut self) {
        if let Some((conn, generation)) = self.conn.take() {
            self.pool.release(conn, generation);
        }
    }
}

struct IdleConn {
    conn: Conn,
    generation: u64,
    epoch: u64,
    eviction: AbortHandle,
}

struct PoolState {
    opts: Arc<Opts>,
    generation: u64,
    /// Idle plus checked out plus being opened.
    live: usize,
    /// Most recently released last.
    idle: Vec<IdleConn>,
    waiters: VecDeque<Waiter>,
    next_epoch: u64,
}

struct PoolInner {
    state: Mutex<PoolState>,
}

/// Counts reported by [`Pool::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub live: usize,
    pub idle: usize,
    pub waiting: usize,
}

enum Checkout {
    Idle(Tagged),
    Open(Arc<Opts>, u64),
    Wait(oneshot::Receiver<Result<Handoff>>),
}

/// Releases a reserved slot unless defused; covers a `get()` future that
/// is dropped while opening a connection.
struct SlotGuard<'a> {
    inner: &'a Arc<PoolInner>,
    armed: bool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.free_slot();
        }
    }
}

/// Asynchronous MySQL connection pool. Cheap to clone.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool. No connection is opened until the first `get()`.
    pub fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        opts.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    opts: Arc::new(opts),
                    generation: 0,
                    live: 0,
                    idle: Vec::new(),
                    waiters: VecDeque::new(),
                    next_epoch: 0,
                }),
            }),
        })
    }

    /// Check out a connection.
    ///
    /// Reuses an idle connection without suspending, opens a new one if
    /// below `max_connections`, or waits for one to be released.
    pub async fn get(&self) -> Result<PooledConn> {
        let checkout = {
            let mut state = self.inner.state.lock();
            if let Some(idle) = state.idle.pop() {
                idle.eviction.abort();
                Checkout::Idle((idle.conn, idle.generation))
            } else if state.live < state.opts.max_connections {
                state.live += 1;
                Checkout::Open(Arc::clone(&state.opts), state.generation)
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                debug!(waiting = state.waiters.len(), "pool exhausted, waiting");
                Checkout::Wait(rx)
            }
        };

        let (conn, generation) = match checkout {
            Checkout::Idle(tagged) => tagged,
            Checkout::Open(opts, generation) => {
                let mut guard = SlotGuard {
                    inner: &self.inner,
                    armed: true,
                };
                let conn = Conn::connect(&opts).await?;
                guard.armed = false;
                (conn, generation)
            }
            Checkout::Wait(rx) => rx
                .await
                .map_err(|_| Error::PoolClosed)??
                .take()
                .ok_or(Error::PoolClosed)?,
        };

        Ok(PooledConn {
            conn: ManuallyDrop::new(conn),
            generation,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Replace the configuration.
    ///
    /// Idle connections are closed right away; checked-out connections are
    /// closed when released. Waiters are served if the new limit allows.
    pub fn configure<O: TryInto<Opts>>(&self, opts: O) -> Result<()>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        opts.validate()?;
        let drained: Vec<IdleConn> = {
            let mut state = self.inner.state.lock();
            state.opts = Arc::new(opts);
            state.generation += 1;
            let drained: Vec<IdleConn> = state.idle.drain(..).collect();
            state.live -= drained.len();
            debug!(
                generation = state.generation,
                closed = drained.len(),
                "pool reconfigured"
            );
            self.inner.serve_waiters(&mut state);
            drained
        };
        for idle in drained {
            idle.eviction.abort();
            close_in_background(idle.conn);
        }
        Ok(())
    }

    /// Current live / idle / waiting counts.
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            live: state.live,
            idle: state.idle.len(),
            waiting: state.waiters.iter().filter(|w| !w.is_closed()).count(),
        }
    }

    /// Snapshot of the current configuration.
    pub fn opts(&self) -> Arc<Opts> {
        Arc::clone(&self.inner.state.lock().opts)
    }

    /// Run a query on a pooled connection.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.get().await?.query(sql).await
    }

    /// Run a query with retries. Every attempt checks out a connection, so
    /// a broken connection is not retried on.
    pub async fn query_with(&self, sql: &str, options: &QueryOptions) -> Result<QueryResult> {
        with_retry(options, async || self.query(sql).await).await
    }

    /// Insert rows on a pooled connection.
    pub async fn insert(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[&[&dyn ToSql]],
    ) -> Result<OkPacket> {
        self.get().await?.insert(table, columns, rows).await
    }

    /// Start a transaction on a pooled connection. The connection is
    /// released once the transaction is committed or rolled back.
    pub async fn begin(&self) -> Result<Transaction<PooledConn>> {
        Transaction::begin(self.get().await?).await
    }
}

impl PoolInner {
    /// A live connection went away (broken, stale or failed to open).
    fn free_slot(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.live -= 1;
        self.serve_waiters(&mut state);
    }

    /// Open connections for the oldest waiters while capacity allows.
    fn serve_waiters(self: &Arc<Self>, state: &mut PoolState) {
        // left queued until a release happens on a runtime
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        while state.live < state.opts.max_connections {
            let Some(waiter) = pop_waiter(&mut state.waiters) else {
                return;
            };
            state.live += 1;
            let opts = Arc::clone(&state.opts);
            let generation = state.generation;
            let inner = Arc::clone(self);
            runtime.spawn(async move {
                match Conn::connect(&opts).await {
                    Ok(conn) => {
                        let handoff = Handoff {
                            pool: inner,
                            conn: Some((conn, generation)),
                        };
                        // a returned handoff releases itself on drop
                        let _ = waiter.send(Ok(handoff));
                    }
                    Err(e) => {
                        debug!(error = %e, "open for waiter failed");
                        inner.free_slot();
                        let _ = waiter.send(Err(e));
                    }
                }
            });
        }
    }

    fn release(self: &Arc<Self>, conn: Conn, generation: u64) {
        let Ok(runtime) = Handle::try_current() else {
            debug!(
                connection_id = conn.connection_id(),
                "released outside a runtime, dropping"
            );
            drop(conn);
            self.free_slot();
            return;
        };
        if conn.is_broken() || conn.in_transaction() {
            debug!(
                connection_id = conn.connection_id(),
                broken = conn.is_broken(),
                "discarding connection"
            );
            drop(conn);
            self.free_slot();
            return;
        }

        let mut state = self.state.lock();
        if generation != state.generation {
            state.live -= 1;
            self.serve_waiters(&mut state);
            drop(state);
            close_in_background(conn);
            return;
        }

        let mut conn = conn;
        while let Some(waiter) = pop_waiter(&mut state.waiters) {
            let handoff = Handoff {
                pool: Arc::clone(self),
                conn: Some((conn, generation)),
            };
            match waiter.send(Ok(handoff)) {
                Ok(()) => return,
                Err(Ok(mut returned)) => match returned.take() {
                    Some((back, _)) => conn = back,
                    None => return,
                },
                Err(Err(_)) => return,
            }
        }

        let epoch = state.next_epoch;
        state.next_epoch += 1;
        let timeout = state.opts.idle_timeout;
        let weak = Arc::downgrade(self);
        let eviction = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.evict(epoch);
            }
        })
        .abort_handle();
        state.idle.push(IdleConn {
            conn,
            generation,
            epoch,
            eviction,
        });
    }

    fn evict(&self, epoch: u64) {
        let conn = {
            let mut state = self.state.lock();
            let Some(pos) = state.idle.iter().position(|c| c.epoch == epoch) else {
                return;
            };
            if state.idle.len() <= state.opts.min_connections {
                return;
            }
            state.live -= 1;
            state.idle.remove(pos).conn
        };
        debug!(connection_id = conn.connection_id(), "closing idle connection");
        close_in_background(conn);
    }
}

/// Pop the oldest waiter whose caller is still waiting.
fn pop_waiter(waiters: &mut VecDeque<Waiter>) -> Option<Waiter> {
    while let Some(waiter) = waiters.pop_front() {
        if !waiter.is_closed() {
            return Some(waiter);
        }
    }
    None
}

fn close_in_background(conn: Conn) {
    if let Ok(runtime) = Handle::try_current() {
        runtime.spawn(async move {
            let _ = conn.close().await;
        });
    }
}

/// A connection checked out of a [`Pool`]; released on drop.
pub struct PooledConn {
    pool: Arc<PoolInner>,
    generation: u64,
    conn: ManuallyDrop<Conn>,
}

impl Deref for PooledConn {
    type Target = Conn;
    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        // SAFETY: conn is never accessed after this
        let conn = unsafe { ManuallyDrop::take(&mut self.conn) };
        self.pool.release(conn, self.generation);
    }
}
