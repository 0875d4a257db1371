//! In-process MySQL test double built from the crate's own encoders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use wisp_mysql::protocol::constant::{ColumnType, header, status};
use wisp_mysql::protocol::handshake::HandshakeV10;
use wisp_mysql::protocol::packet::PacketCodec;
use wisp_mysql::protocol::response::write_err_packet;
use wisp_mysql::protocol::response::write_text_row;
use wisp_mysql::{ColumnDefinition, OkPacket, Opts};

/// What the server answers to a COM_QUERY.
#[derive(Clone)]
pub enum Reply {
    Ok { affected_rows: u64, last_insert_id: u64 },
    Err { code: u16, state: &'static str, message: String },
    Rows {
        columns: Vec<ColumnDefinition>,
        rows: Vec<Vec<Option<Vec<u8>>>>,
    },
    /// Answer after a delay.
    Delay(Duration, Box<Reply>),
    /// Drop the socket without answering.
    Close,
    /// Start a one-column result set, then send the column definition
    /// with a sequence id one past the expected one.
    SkipSequence,
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Ok {
            affected_rows: 0,
            last_insert_id: 0,
        }
    }

    pub fn err(code: u16, state: &'static str, message: &str) -> Self {
        Reply::Err {
            code,
            state,
            message: message.to_string(),
        }
    }

    pub fn single(name: &str, ty: ColumnType, value: &str) -> Self {
        Reply::Rows {
            columns: vec![ColumnDefinition::new(name, ty)],
            rows: vec![vec![Some(value.as_bytes().to_vec())]],
        }
    }
}

type Handler = Arc<dyn Fn(&str) -> Reply + Send + Sync>;

#[derive(Default)]
pub struct Stats {
    /// Connections that completed authentication.
    pub accepted: AtomicUsize,
    /// Connections currently open.
    pub open: AtomicUsize,
    /// Highest value `open` reached.
    pub max_open: AtomicUsize,
    /// Number of upcoming handshakes to reject with ER_ACCESS_DENIED_ERROR.
    pub reject_auth: AtomicUsize,
    pub queries: Mutex<Vec<String>>,
    next_connection_id: AtomicU32,
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub stats: Arc<Stats>,
}

impl MockServer {
    /// Start a server answering `BEGIN`/`COMMIT`/`ROLLBACK` itself and
    /// everything else through `handler`.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(Stats::default());
        stats.next_connection_id.store(1, Ordering::SeqCst);
        let handler: Handler = Arc::new(handler);

        let server_stats = Arc::clone(&stats);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let stats = Arc::clone(&server_stats);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let now = stats.open.fetch_add(1, Ordering::SeqCst) + 1;
                    stats.max_open.fetch_max(now, Ordering::SeqCst);
                    serve(socket, &stats, &handler).await;
                    stats.open.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        Self { addr, stats }
    }

    /// Server that answers every query with `SELECT 1`-style rows.
    pub async fn simple() -> Self {
        Self::start(|_| Reply::single("1", ColumnType::LongLong, "1")).await
    }

    pub fn opts(&self) -> Opts {
        Opts {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            user: "app".into(),
            password: "secret".into(),
            database: Some("shop".into()),
            ..Opts::default()
        }
    }

    pub fn accepted(&self) -> usize {
        self.stats.accepted.load(Ordering::SeqCst)
    }

    pub fn open(&self) -> usize {
        self.stats.open.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.stats.max_open.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.stats.queries.lock().clone()
    }

    pub fn reject_next_auth(&self, n: usize) {
        self.stats.reject_auth.store(n, Ordering::SeqCst);
    }
}

struct Session {
    socket: TcpStream,
    codec: PacketCodec,
    chunk: Vec<u8>,
    status_flags: u16,
}

impl Session {
    async fn read(&mut self) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            if self.codec.decode(&mut out).ok()? {
                return Some(out);
            }
            let n = self.socket.read(&mut self.chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            self.codec.push(&self.chunk[..n]);
        }
    }

    async fn write(&mut self, payloads: &[Vec<u8>]) -> Option<()> {
        let mut frames = Vec::new();
        for payload in payloads {
            self.codec.encode(payload, &mut frames);
        }
        self.socket.write_all(&frames).await.ok()
    }

    fn ok_payload(&self, affected_rows: u64, last_insert_id: u64, header_byte: u8) -> Vec<u8> {
        let mut out = Vec::new();
        OkPacket {
            affected_rows,
            last_insert_id,
            status_flags: self.status_flags,
            warnings: 0,
        }
        .write(&mut out, header_byte);
        out
    }
}

fn read_user(response: &[u8]) -> String {
    let rest = &response[32..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    String::from_utf8_lossy(&rest[..end]).into_owned()
}

async fn serve(socket: TcpStream, stats: &Stats, handler: &Handler) {
    let mut session = Session {
        socket,
        codec: PacketCodec::new(),
        chunk: vec![0; 4096],
        status_flags: status::SERVER_STATUS_AUTOCOMMIT,
    };

    let connection_id = stats.next_connection_id.fetch_add(1, Ordering::SeqCst);
    let greeting = HandshakeV10 {
        server_version: "8.0.36-mock".into(),
        connection_id,
        capability_flags: 0xFFFF_FFFF,
        charset: 255,
        status_flags: session.status_flags,
        auth_plugin_data: (1..=20).chain([0]).collect(),
        auth_plugin_name: "mysql_native_password".into(),
    };
    let mut payload = Vec::new();
    greeting.write(&mut payload);
    if session.write(&[payload]).await.is_none() {
        return;
    }

    let Some(response) = session.read().await else {
        return;
    };
    let rejected = stats
        .reject_auth
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if rejected {
        let mut err = Vec::new();
        let message = format!("Access denied for user '{}'", read_user(&response));
        write_err_packet(&mut err, 1045, "28000", &message);
        let _ = session.write(&[err]).await;
        return;
    }
    let ok = session.ok_payload(0, 0, header::OK);
    if session.write(&[ok]).await.is_none() {
        return;
    }
    stats.accepted.fetch_add(1, Ordering::SeqCst);

    loop {
        session.codec.reset_sequence();
        let Some(command) = session.read().await else {
            return;
        };
        match command.first() {
            Some(0x01) => return,
            Some(0x0E) => {
                let ok = session.ok_payload(0, 0, header::OK);
                if session.write(&[ok]).await.is_none() {
                    return;
                }
            }
            Some(0x03) => {
                let sql = String::from_utf8_lossy(&command[1..]).into_owned();
                stats.queries.lock().push(sql.clone());
                let reply = match sql.to_ascii_uppercase().as_str() {
                    "BEGIN" => {
                        session.status_flags |= status::SERVER_STATUS_IN_TRANS;
                        Reply::ok()
                    }
                    "COMMIT" | "ROLLBACK" => {
                        session.status_flags &= !status::SERVER_STATUS_IN_TRANS;
                        Reply::ok()
                    }
                    _ => handler(&sql),
                };
                if answer(&mut session, reply).await.is_none() {
                    return;
                }
            }
            _ => {
                let mut err = Vec::new();
                write_err_packet(&mut err, 1047, "08S01", "Unknown command");
                if session.write(&[err]).await.is_none() {
                    return;
                }
            }
        }
    }
}

async fn answer(session: &mut Session, mut reply: Reply) -> Option<()> {
    while let Reply::Delay(delay, inner) = reply {
        tokio::time::sleep(delay).await;
        reply = *inner;
    }
    match reply {
        Reply::Ok {
            affected_rows,
            last_insert_id,
        } => {
            let ok = session.ok_payload(affected_rows, last_insert_id, header::OK);
            session.write(&[ok]).await
        }
        Reply::Err {
            code,
            state,
            message,
        } => {
            let mut err = Vec::new();
            write_err_packet(&mut err, code, state, &message);
            session.write(&[err]).await
        }
        Reply::Rows { columns, rows } => {
            let mut payloads = Vec::new();
            let mut count = Vec::new();
            wisp_mysql::protocol::codec::write_lenenc_int(&mut count, columns.len() as u64);
            payloads.push(count);
            for column in &columns {
                let mut out = Vec::new();
                column.write(&mut out);
                payloads.push(out);
            }
            for row in &rows {
                let values: Vec<Option<&[u8]>> = row.iter().map(|v| v.as_deref()).collect();
                let mut out = Vec::new();
                write_text_row(&mut out, &values);
                payloads.push(out);
            }
            payloads.push(session.ok_payload(0, 0, header::EOF));
            session.write(&payloads).await
        }
        Reply::SkipSequence => {
            let mut frames = Vec::new();
            let mut count = Vec::new();
            wisp_mysql::protocol::codec::write_lenenc_int(&mut count, 1);
            session.codec.encode(&count, &mut frames);

            let mut column = Vec::new();
            ColumnDefinition::new("1", ColumnType::LongLong).write(&mut column);
            let skipped = session.codec.sequence_id().wrapping_add(1);
            frames.extend_from_slice(&(column.len() as u32).to_le_bytes()[..3]);
            frames.push(skipped);
            frames.extend_from_slice(&column);
            session.socket.write_all(&frames).await.ok()
        }
        Reply::Close => None,
        Reply::Delay(..) => unreachable!(),
    }
}

/// Lookup table helper for handlers that answer by exact SQL text.
pub fn table(entries: Vec<(&'static str, Reply)>) -> impl Fn(&str) -> Reply + Send + Sync {
    let map: HashMap<&'static str, Reply> = entries.into_iter().collect();
    move |sql| map.get(sql).cloned().unwrap_or_else(Reply::ok)
}
