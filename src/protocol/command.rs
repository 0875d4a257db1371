//! Client command payloads.

use super::constant::command;

/// Write a COM_QUERY payload: command byte followed by the raw SQL text.
pub fn write_query(out: &mut Vec<u8>, sql: &str) {
    out.reserve(1 + sql.len());
    out.push(command::COM_QUERY);
    out.extend_from_slice(sql.as_bytes());
}

/// Write a COM_PING payload.
pub fn write_ping(out: &mut Vec<u8>) {
    out.push(command::COM_PING);
}

/// Write a COM_QUIT payload.
pub fn write_quit(out: &mut Vec<u8>) {
    out.push(command::COM_QUIT);
}
