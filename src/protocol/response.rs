//! Server reply payloads: OK, ERR, column definitions and text rows.
//!
//! Each type has a `parse` for the client side and a `write` producing the
//! same bytes, which is what a server (or a test double) sends.

use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::codec::{
    read_bytes, read_lenenc_bytes, read_lenenc_bytes_or_null, read_lenenc_int, read_u8, read_u16,
    to_string_lossy, write_lenenc_bytes, write_lenenc_int, write_u16,
};
use super::constant::{ColumnType, column_flag, header, status};
use crate::error::{Error, Result, ServerError};

/// Smallest ERR payload that carries code, SQL state marker and SQL state.
const MIN_ERR_PACKET_LEN: usize = 1 + 2 + 1 + 5;

/// Reply to a command that produced no result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
}

impl OkPacket {
    /// Parse an OK (0x00) or EOF-as-OK (0xFE) payload, header byte included.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (_header, rest) = read_u8(payload)?;
        let (affected_rows, rest) = read_lenenc_int(rest)?;
        let (last_insert_id, rest) = read_lenenc_int(rest)?;
        let (status_flags, rest) = read_u16(rest)?;
        let (warnings, _info) = read_u16(rest)?;
        Ok(Self {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
        })
    }

    /// Parse a pre-4.1-style EOF payload (0xFE, warnings, status), used when
    /// CLIENT_DEPRECATE_EOF was not negotiated.
    pub fn parse_eof(payload: &[u8]) -> Result<Self> {
        let (_header, rest) = read_u8(payload)?;
        let (warnings, rest) = read_u16(rest)?;
        let (status_flags, _) = read_u16(rest)?;
        Ok(Self {
            warnings,
            status_flags,
            ..Self::default()
        })
    }

    /// Write this packet with the given header byte (0x00 or 0xFE).
    pub fn write(&self, out: &mut Vec<u8>, header_byte: u8) {
        out.push(header_byte);
        write_lenenc_int(out, self.affected_rows);
        write_lenenc_int(out, self.last_insert_id);
        write_u16(out, self.status_flags);
        write_u16(out, self.warnings);
    }

    fn has(&self, flag: u16) -> bool {
        self.status_flags & flag != 0
    }

    pub fn is_in_transaction(&self) -> bool {
        self.has(status::SERVER_STATUS_IN_TRANS)
    }

    pub fn is_autocommit(&self) -> bool {
        self.has(status::SERVER_STATUS_AUTOCOMMIT)
    }

    pub fn more_results_exist(&self) -> bool {
        self.has(status::SERVER_MORE_RESULTS_EXISTS)
    }

    pub fn was_database_dropped(&self) -> bool {
        self.has(status::SERVER_STATUS_DB_DROPPED)
    }

    pub fn is_backslash_escape_disabled(&self) -> bool {
        self.has(status::SERVER_STATUS_NO_BACKSLASH_ESCAPES)
    }

    pub fn was_query_slow(&self) -> bool {
        self.has(status::SERVER_QUERY_WAS_SLOW)
    }

    pub fn has_session_state_changed(&self) -> bool {
        self.has(status::SERVER_SESSION_STATE_CHANGED)
    }
}

/// Decode an ERR payload (0xFF header included).
///
/// Payloads too short to hold code and SQL state yield [`ServerError::unknown`].
pub fn parse_err_packet(payload: &[u8]) -> ServerError {
    if payload.len() < MIN_ERR_PACKET_LEN {
        return ServerError::unknown();
    }
    let code = u16::from_le_bytes([payload[1], payload[2]]);
    let sql_state = to_string_lossy(&payload[4..9]);
    let message = to_string_lossy(&payload[9..]);
    ServerError::new(code, sql_state, message)
}

/// Write an ERR payload.
pub fn write_err_packet(out: &mut Vec<u8>, code: u16, sql_state: &str, message: &str) {
    out.push(header::ERR);
    write_u16(out, code);
    out.push(b'#');
    let mut state = [b'0'; 5];
    for (dst, src) in state.iter_mut().zip(sql_state.bytes()) {
        *dst = src;
    }
    out.extend_from_slice(&state);
    out.extend_from_slice(message.as_bytes());
}

/// Fixed-length tail of a column definition.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ColumnDefinitionTail {
    /// Length of the fixed fields, always 0x0C
    pub fixed_len: u8,
    pub charset: U16,
    pub column_length: U32,
    pub column_type: u8,
    pub flags: U16,
    pub decimals: u8,
}

/// Metadata of one result set column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub catalog: String,
    pub schema: String,
    /// Table name as written in the query (alias)
    pub table: String,
    pub org_table: String,
    /// Column name as written in the query (alias)
    pub name: String,
    pub org_name: String,
    pub charset: u16,
    pub column_length: u32,
    /// Raw type code, see [`ColumnType`]
    pub column_type: u8,
    pub flags: u16,
    pub decimals: u8,
}

impl ColumnDefinition {
    /// Build a definition with the given name and type; other fields are empty.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        Self {
            catalog: "def".into(),
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            org_name: name.clone(),
            name,
            charset: super::constant::UTF8MB4_CHARSET as u16,
            column_length: 0,
            column_type: column_type as u8,
            flags: 0,
            decimals: 0,
        }
    }

    /// Builder-style helper to set column flags.
    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    /// Builder-style helper to set the display length.
    pub fn with_length(mut self, column_length: u32) -> Self {
        self.column_length = column_length;
        self
    }

    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (catalog, rest) = read_lenenc_bytes(payload)?;
        let (schema, rest) = read_lenenc_bytes(rest)?;
        let (table, rest) = read_lenenc_bytes(rest)?;
        let (org_table, rest) = read_lenenc_bytes(rest)?;
        let (name, rest) = read_lenenc_bytes(rest)?;
        let (org_name, rest) = read_lenenc_bytes(rest)?;
        let (tail, _) = read_bytes(rest, size_of::<ColumnDefinitionTail>())?;
        let tail = ColumnDefinitionTail::ref_from_bytes(tail)
            .map_err(|e| Error::BufferSize(format!("column definition: {e:?}")))?;
        Ok(Self {
            catalog: to_string_lossy(catalog),
            schema: to_string_lossy(schema),
            table: to_string_lossy(table),
            org_table: to_string_lossy(org_table),
            name: to_string_lossy(name),
            org_name: to_string_lossy(org_name),
            charset: tail.charset.get(),
            column_length: tail.column_length.get(),
            column_type: tail.column_type,
            flags: tail.flags.get(),
            decimals: tail.decimals,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_lenenc_bytes(out, self.catalog.as_bytes());
        write_lenenc_bytes(out, self.schema.as_bytes());
        write_lenenc_bytes(out, self.table.as_bytes());
        write_lenenc_bytes(out, self.org_table.as_bytes());
        write_lenenc_bytes(out, self.name.as_bytes());
        write_lenenc_bytes(out, self.org_name.as_bytes());
        let tail = ColumnDefinitionTail {
            fixed_len: 0x0C,
            charset: U16::new(self.charset),
            column_length: U32::new(self.column_length),
            column_type: self.column_type,
            flags: U16::new(self.flags),
            decimals: self.decimals,
        };
        out.extend_from_slice(tail.as_bytes());
        out.extend_from_slice(&[0, 0]);
    }

    /// Typed view of the raw type code. Unknown codes yield `None`.
    pub fn column_type(&self) -> Option<ColumnType> {
        ColumnType::from_u8(self.column_type)
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags & column_flag::UNSIGNED != 0
    }

    pub fn is_binary(&self) -> bool {
        self.flags & column_flag::BINARY != 0
    }
}

/// Iterator over the raw values of a text-protocol row.
///
/// Yields `None` for SQL NULL. More values than `columns` is an error.
pub struct TextRow<'a> {
    rest: &'a [u8],
    columns: usize,
    seen: usize,
}

impl<'a> TextRow<'a> {
    pub fn new(payload: &'a [u8], columns: usize) -> Self {
        Self {
            rest: payload,
            columns,
            seen: 0,
        }
    }
}

impl<'a> Iterator for TextRow<'a> {
    type Item = Result<Option<&'a [u8]>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if self.seen == self.columns {
            self.rest = &[];
            return Some(Err(Error::ServerResultset {
                columns: self.columns,
            }));
        }
        self.seen += 1;
        match read_lenenc_bytes_or_null(self.rest) {
            Ok((value, rest)) => {
                self.rest = rest;
                Some(Ok(value))
            }
            Err(e) => {
                self.rest = &[];
                Some(Err(e))
            }
        }
    }
}

/// Write a text-protocol row.
pub fn write_text_row(out: &mut Vec<u8>, values: &[Option<&[u8]>]) {
    for value in values {
        match value {
            Some(bytes) => write_lenenc_bytes(out, bytes),
            None => out.push(super::codec::LENENC_NULL),
        }
    }
}
