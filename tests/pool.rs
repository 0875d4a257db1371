//! Pool tests against the in-process mock server.

mod common;

use std::time::Duration;

use common::{MockServer, Reply};
use tokio::sync::mpsc;
use wisp_mysql::protocol::constant::ColumnType;
use wisp_mysql::tokio::{Pool, PoolStatus};
use wisp_mysql::{Error, Opts, QueryOptions, ToSql};

fn pool_opts(server: &MockServer, min: usize, max: usize) -> Opts {
    Opts {
        min_connections: min,
        max_connections: max,
        ..server.opts()
    }
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_idle_connection_is_reused() {
    let server = MockServer::simple().await;
    let pool = Pool::new(pool_opts(&server, 1, 4)).unwrap();

    let first_id = {
        let conn = pool.get().await.unwrap();
        conn.connection_id()
    };
    assert_eq!(
        pool.status(),
        PoolStatus {
            live: 1,
            idle: 1,
            waiting: 0
        }
    );

    let conn = pool.get().await.unwrap();
    assert_eq!(conn.connection_id(), first_id);
    assert_eq!(pool.status().idle, 0);
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn test_most_recently_released_is_reused_first() {
    let server = MockServer::simple().await;
    let pool = Pool::new(pool_opts(&server, 2, 4)).unwrap();

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    let b_id = b.connection_id();
    drop(a);
    drop(b);

    let conn = pool.get().await.unwrap();
    assert_eq!(conn.connection_id(), b_id);
}

#[tokio::test]
async fn test_live_connections_never_exceed_max() {
    let server = MockServer::start(|_| {
        Reply::Delay(
            Duration::from_millis(10),
            Box::new(Reply::single("1", ColumnType::LongLong, "1")),
        )
    })
    .await;
    let pool = Pool::new(pool_opts(&server, 0, 3)).unwrap();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            pool.query("SELECT 1").await.map(|_| ())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert!(server.max_open() <= 3);
    assert!(pool.status().live <= 3);
    assert_eq!(pool.status().waiting, 0);
}

#[tokio::test]
async fn test_waiters_are_served_in_order() {
    let server = MockServer::simple().await;
    let pool = Pool::new(pool_opts(&server, 1, 1)).unwrap();
    let held = pool.get().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    for i in 0..3 {
        let task_pool = pool.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let _conn = task_pool.get().await.unwrap();
            tx.send(i).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        });
        wait_for(|| pool.status().waiting == i + 1).await;
    }

    drop(held);
    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(rx.recv().await.unwrap());
    }
    assert_eq!(order, [0, 1, 2]);
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn test_cancelled_waiter_is_skipped() {
    let server = MockServer::simple().await;
    let pool = Pool::new(pool_opts(&server, 1, 1)).unwrap();
    let held = pool.get().await.unwrap();
    let held_id = held.connection_id();

    let gave_up = tokio::time::timeout(Duration::from_millis(20), pool.get()).await;
    assert!(gave_up.is_err());
    assert_eq!(pool.status().waiting, 0);

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.unwrap().connection_id() })
    };
    wait_for(|| pool.status().waiting == 1).await;
    drop(held);
    assert_eq!(waiter.await.unwrap(), held_id);
}

#[tokio::test]
async fn test_connection_handed_to_cancelled_waiter_returns_to_pool() {
    let server = MockServer::simple().await;
    let pool = Pool::new(pool_opts(&server, 1, 1)).unwrap();
    let held = pool.get().await.unwrap();
    let held_id = held.connection_id();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.map(|c| c.connection_id()) })
    };
    wait_for(|| pool.status().waiting == 1).await;

    // handed off before the waiting task runs again
    drop(held);
    waiter.abort();
    assert!(waiter.await.unwrap_err().is_cancelled());
    assert_eq!(
        pool.status(),
        PoolStatus {
            live: 1,
            idle: 1,
            waiting: 0
        }
    );

    let conn = tokio::time::timeout(Duration::from_millis(500), pool.get())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conn.connection_id(), held_id);
}

#[tokio::test]
async fn test_opened_connection_for_cancelled_waiter_returns_to_pool() {
    let server = MockServer::simple().await;
    let pool = Pool::new(pool_opts(&server, 1, 1)).unwrap();
    let held = pool.get().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.map(|c| c.connection_id()) })
    };
    wait_for(|| pool.status().waiting == 1).await;

    // stale on release, so a fresh connection is opened for the waiter
    pool.configure(pool_opts(&server, 1, 1)).unwrap();
    drop(held);
    waiter.abort();
    let _ = waiter.await;

    wait_for(|| pool.status().idle == 1).await;
    assert_eq!(pool.status().live, 1);
    let conn = tokio::time::timeout(Duration::from_millis(500), pool.get())
        .await
        .unwrap()
        .unwrap();
    assert!(!conn.is_broken());
}

#[test]
fn test_release_after_runtime_shutdown() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (pool, conn) = runtime.block_on(async {
        let server = MockServer::simple().await;
        let pool = Pool::new(pool_opts(&server, 1, 1)).unwrap();
        let conn = pool.get().await.unwrap();
        (pool, conn)
    });
    drop(runtime);

    drop(conn);
    assert_eq!(
        pool.status(),
        PoolStatus {
            live: 0,
            idle: 0,
            waiting: 0
        }
    );
}

#[tokio::test]
async fn test_sequence_desync_is_not_reused() {
    let server = MockServer::start(|sql| {
        if sql == "SELECT 1" {
            Reply::SkipSequence
        } else {
            Reply::ok()
        }
    })
    .await;
    let pool = Pool::new(pool_opts(&server, 1, 1)).unwrap();

    let mut conn = pool.get().await.unwrap();
    let broken_id = conn.connection_id();
    assert!(matches!(
        conn.query("SELECT 1").await,
        Err(Error::SequenceId { .. })
    ));
    drop(conn);
    assert_eq!(pool.status().live, 0);

    let mut conn = pool.get().await.unwrap();
    assert_ne!(conn.connection_id(), broken_id);
    conn.query("DO 1").await.unwrap();
}

#[tokio::test]
async fn test_idle_connections_are_evicted_above_min() {
    let server = MockServer::simple().await;
    let pool = Pool::new(Opts {
        idle_timeout: Duration::from_millis(30),
        ..pool_opts(&server, 1, 4)
    })
    .unwrap();

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    let c = pool.get().await.unwrap();
    drop((a, b, c));
    assert_eq!(pool.status().idle, 3);

    wait_for(|| pool.status().idle == 1).await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(
        pool.status(),
        PoolStatus {
            live: 1,
            idle: 1,
            waiting: 0
        }
    );
    wait_for(|| server.open() == 1).await;
}

#[tokio::test]
async fn test_reuse_cancels_eviction() {
    let server = MockServer::simple().await;
    let pool = Pool::new(Opts {
        idle_timeout: Duration::from_millis(50),
        ..pool_opts(&server, 0, 2)
    })
    .unwrap();

    drop(pool.get().await.unwrap());
    tokio::time::sleep(Duration::from_millis(20)).await;
    let mut conn = pool.get().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(pool.status().live, 1);
    conn.ping().await.unwrap();
    drop(conn);

    wait_for(|| pool.status().live == 0).await;
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn test_broken_connection_is_discarded() {
    let server = MockServer::start(|sql| {
        if sql == "KILL" {
            Reply::Close
        } else {
            Reply::ok()
        }
    })
    .await;
    let pool = Pool::new(pool_opts(&server, 1, 2)).unwrap();

    let mut conn = pool.get().await.unwrap();
    let broken_id = conn.connection_id();
    assert!(conn.query("KILL").await.is_err());
    drop(conn);
    assert_eq!(pool.status().live, 0);

    let conn = pool.get().await.unwrap();
    assert_ne!(conn.connection_id(), broken_id);
}

#[tokio::test]
async fn test_unfinished_transaction_is_not_reused() {
    let server = MockServer::simple().await;
    let pool = Pool::new(pool_opts(&server, 1, 2)).unwrap();

    let tx = pool.begin().await.unwrap();
    drop(tx);
    assert_eq!(pool.status().live, 0);

    let tx = pool.begin().await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(pool.status().idle, 1);
}

#[tokio::test]
async fn test_configure_replaces_connections() {
    let server = MockServer::simple().await;
    let pool = Pool::new(pool_opts(&server, 2, 4)).unwrap();

    let held = pool.get().await.unwrap();
    drop(pool.get().await.unwrap());
    assert_eq!(pool.status().idle, 1);

    pool.configure(pool_opts(&server, 0, 2)).unwrap();
    assert_eq!(
        pool.status(),
        PoolStatus {
            live: 1,
            idle: 0,
            waiting: 0
        }
    );
    assert_eq!(pool.opts().max_connections, 2);

    let old_id = held.connection_id();
    drop(held);
    assert_eq!(pool.status().live, 0);

    let conn = pool.get().await.unwrap();
    assert_ne!(conn.connection_id(), old_id);
    wait_for(|| server.open() == 1).await;
}

#[tokio::test]
async fn test_configure_rejects_invalid_opts() {
    let server = MockServer::simple().await;
    let pool = Pool::new(pool_opts(&server, 1, 2)).unwrap();
    let err = pool.configure(pool_opts(&server, 3, 2)).unwrap_err();
    assert!(matches!(err, Error::InvalidUsage(_)));
    assert_eq!(pool.opts().max_connections, 2);
}

#[tokio::test]
async fn test_waiter_receives_open_failure() {
    let server = MockServer::simple().await;
    let pool = Pool::new(pool_opts(&server, 1, 1)).unwrap();
    let held = pool.get().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.map(|c| c.connection_id()) })
    };
    wait_for(|| pool.status().waiting == 1).await;

    // stale on release, so the waiter gets a freshly opened connection
    pool.configure(pool_opts(&server, 1, 1)).unwrap();
    server.reject_next_auth(1);
    drop(held);

    let err = waiter.await.unwrap().unwrap_err();
    assert_eq!(err.code(), "ER_ACCESS_DENIED_ERROR");
    assert_eq!(pool.status().live, 0);

    pool.get().await.unwrap().ping().await.unwrap();
}

#[tokio::test]
async fn test_open_failure_is_returned_to_caller() {
    let server = MockServer::simple().await;
    let pool = Pool::new(pool_opts(&server, 1, 1)).unwrap();
    server.reject_next_auth(1);
    let err = pool.get().await.err().unwrap();
    assert_eq!(err.sql_code(), Some(1045));
    assert_eq!(pool.status().live, 0);
    pool.get().await.unwrap();
}

#[tokio::test]
async fn test_pool_query_with_retries_on_fresh_checkout() {
    let server = MockServer::start(|sql| {
        if sql == "KILL" {
            Reply::Close
        } else {
            Reply::ok()
        }
    })
    .await;
    let pool = Pool::new(pool_opts(&server, 1, 1)).unwrap();
    let options = QueryOptions::new()
        .retry_on(|e| e.is_connection_broken())
        .max_retries(1)
        .retry_delay(Duration::ZERO, Duration::ZERO);

    match pool.query_with("KILL", &options).await {
        Err(Error::MaxRetries { errors, .. }) => assert_eq!(errors.len(), 2),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(server.accepted(), 2);
}

#[tokio::test]
async fn test_pool_insert() {
    let server = MockServer::start(|_| Reply::Ok {
        affected_rows: 1,
        last_insert_id: 5,
    })
    .await;
    let pool = Pool::new(pool_opts(&server, 1, 1)).unwrap();
    let row: [&dyn ToSql; 1] = [&"x"];
    let ok = pool.insert("t", &["a"], &[&row[..]]).await.unwrap();
    assert_eq!(ok.last_insert_id, 5);
    assert_eq!(pool.status().idle, 1);
}
