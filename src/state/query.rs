//! COM_QUERY and COM_PING state machines.

use tracing::trace;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::codec::read_lenenc_int;
use crate::protocol::command::{write_ping, write_query};
use crate::protocol::constant::{MAX_PACKET_LEN, header};
use crate::protocol::response::{ColumnDefinition, OkPacket, TextRow, parse_err_packet};
use crate::result::{QueryResult, ResultSet};
use crate::value::{DecodeFn, Value};

use super::StateMachine;
use super::action::Action;

/// Upper bound on the column count of a result set (MySQL's column limit).
const MAX_COLUMNS: usize = 4096;

/// Query state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    /// Waiting for OK, ERR or a column count.
    Header,
    /// Reading column definitions.
    Column { remaining: usize },
    /// Waiting for the EOF that ends column definitions (no CLIENT_DEPRECATE_EOF).
    ColumnsEof,
    /// Reading rows until the terminating OK/EOF.
    Row,
    Finished,
}

/// Text protocol query state machine.
///
/// `Initial → Header → Column { remaining } → Row → Finished`
pub struct QueryStateMachine<'a> {
    state: State,
    sql: &'a str,
    decode: DecodeFn,
    deprecate_eof: bool,
    columns: Vec<ColumnDefinition>,
    rows: Vec<Vec<Value>>,
    result: Option<QueryResult>,
}

impl<'a> QueryStateMachine<'a> {
    /// Create a new query state machine.
    ///
    /// `deprecate_eof` tells whether result sets end with an OK packet
    /// (negotiated CLIENT_DEPRECATE_EOF) or with classic EOF packets.
    pub fn new(sql: &'a str, decode: DecodeFn, deprecate_eof: bool) -> Self {
        Self {
            state: State::Initial,
            sql,
            decode,
            deprecate_eof,
            columns: Vec::new(),
            rows: Vec::new(),
            result: None,
        }
    }

    /// Take the result once the state machine has finished.
    pub fn take_result(&mut self) -> Option<QueryResult> {
        self.result.take()
    }

    fn parse_terminator(&self, payload: &[u8]) -> Result<OkPacket> {
        if self.deprecate_eof {
            OkPacket::parse(payload)
        } else {
            OkPacket::parse_eof(payload)
        }
    }

    fn finish(&mut self, result: QueryResult) -> Action {
        self.result = Some(result);
        self.state = State::Finished;
        Action::Finished
    }

    fn handle_header(&mut self, payload: &[u8]) -> Result<Action> {
        match payload.first() {
            None => Err(Error::BufferSize("empty query response".into())),
            Some(&header::ERR) => {
                self.state = State::Finished;
                Err(Error::Server(parse_err_packet(payload)))
            }
            Some(&header::OK) => {
                let ok = OkPacket::parse(payload)?;
                Ok(self.finish(QueryResult::Ok(ok)))
            }
            Some(&header::EOF) => {
                let ok = self.parse_terminator(payload)?;
                Ok(self.finish(QueryResult::Ok(ok)))
            }
            Some(&header::LOCAL_INFILE) => Err(Error::InvalidServerReply(
                "LOCAL INFILE requests are not supported",
            )),
            Some(_) => {
                let (count, _) = read_lenenc_int(payload)?;
                let count = match usize::try_from(count) {
                    Ok(count @ 1..=MAX_COLUMNS) => count,
                    _ => return Err(Error::InvalidServerReply("bad column count")),
                };
                trace!(columns = count, "result set header");
                self.columns.reserve(count);
                self.state = State::Column { remaining: count };
                Ok(Action::ReadPacket)
            }
        }
    }

    fn handle_column(&mut self, payload: &[u8], remaining: usize) -> Result<Action> {
        self.columns.push(ColumnDefinition::parse(payload)?);
        let remaining = remaining.saturating_sub(1);
        self.state = if remaining > 0 {
            State::Column { remaining }
        } else if self.deprecate_eof {
            State::Row
        } else {
            State::ColumnsEof
        };
        Ok(Action::ReadPacket)
    }

    /// A leading 0x00 is row data (an empty first value), so only a short
    /// 0xFE packet ends the result set.
    fn handle_row(&mut self, payload: &[u8]) -> Result<Action> {
        match payload.first() {
            Some(&header::ERR) => {
                self.state = State::Finished;
                Err(Error::Server(parse_err_packet(payload)))
            }
            Some(&header::EOF) if payload.len() < MAX_PACKET_LEN => {
                let status = self.parse_terminator(payload)?;
                let columns = std::mem::take(&mut self.columns);
                let rows = std::mem::take(&mut self.rows);
                trace!(rows = rows.len(), "result set end");
                Ok(self.finish(QueryResult::Rows(ResultSet::new(columns, rows, status))))
            }
            _ => {
                let mut row = Vec::with_capacity(self.columns.len());
                let mut columns = self.columns.iter();
                for raw in TextRow::new(payload, self.columns.len()) {
                    let raw = raw?;
                    let Some(column) = columns.next() else {
                        return Err(Error::ServerResultset {
                            columns: self.columns.len(),
                        });
                    };
                    row.push(match raw {
                        Some(bytes) => (self.decode)(bytes, column),
                        None => Value::Null,
                    });
                }
                self.rows.push(row);
                Ok(Action::ReadPacket)
            }
        }
    }
}

impl StateMachine for QueryStateMachine<'_> {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match self.state {
            State::Initial => {
                buffer_set.write_buffer.clear();
                write_query(&mut buffer_set.write_buffer, self.sql);
                self.state = State::Header;
                Ok(Action::WriteAndReadPacket)
            }
            State::Header => self.handle_header(&buffer_set.read_buffer),
            State::Column { remaining } => self.handle_column(&buffer_set.read_buffer, remaining),
            State::ColumnsEof => {
                if buffer_set.read_buffer.first() != Some(&header::EOF) {
                    return Err(Error::InvalidServerReply(
                        "expected EOF after column definitions",
                    ));
                }
                self.state = State::Row;
                Ok(Action::ReadPacket)
            }
            State::Row => self.handle_row(&buffer_set.read_buffer),
            State::Finished => Err(Error::InvalidUsage(
                "query state machine stepped after finishing".into(),
            )),
        }
    }
}

/// COM_PING state machine.
pub struct PingStateMachine {
    started: bool,
}

impl PingStateMachine {
    pub fn new() -> Self {
        Self { started: false }
    }
}

impl Default for PingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for PingStateMachine {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        if !self.started {
            self.started = true;
            buffer_set.write_buffer.clear();
            write_ping(&mut buffer_set.write_buffer);
            return Ok(Action::WriteAndReadPacket);
        }
        let payload = &buffer_set.read_buffer;
        match payload.first() {
            Some(&header::OK) => {
                OkPacket::parse(payload)?;
                Ok(Action::Finished)
            }
            Some(&header::ERR) => Err(Error::Server(parse_err_packet(payload))),
            Some(_) => Err(Error::InvalidServerReply("bad header")),
            None => Err(Error::InvalidServerReply("no header")),
        }
    }
}
