//! Protocol constants: command bytes, capability and status flags, column types.

/// Maximum payload length of a single physical frame (2^24 - 1).
pub const MAX_PACKET_LEN: usize = 0xFF_FFFF;

/// Character set id sent in the handshake response (utf8mb4_0900_ai_ci).
pub const UTF8MB4_CHARSET: u8 = 224;

/// Character set id of binary columns.
pub const BINARY_CHARSET: u16 = 63;

/// Auth plugin supported by this client.
pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";

/// Command bytes (first byte of a client command payload).
pub mod command {
    pub const COM_QUIT: u8 = 0x01;
    pub const COM_INIT_DB: u8 = 0x02;
    pub const COM_QUERY: u8 = 0x03;
    pub const COM_PING: u8 = 0x0E;
}

/// First byte of server reply payloads.
pub mod header {
    /// OK packet
    pub const OK: u8 = 0x00;
    /// LOCAL INFILE request
    pub const LOCAL_INFILE: u8 = 0xFB;
    /// EOF packet, or OK packet when CLIENT_DEPRECATE_EOF is negotiated
    pub const EOF: u8 = 0xFE;
    /// ERR packet
    pub const ERR: u8 = 0xFF;
}

/// Capability flags exchanged during the handshake.
pub mod capability {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_STATEMENTS: u32 = 1 << 16;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;
}

/// Server status flags carried in OK/EOF packets.
pub mod status {
    pub const SERVER_STATUS_IN_TRANS: u16 = 1;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 1 << 1;
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 1 << 3;
    pub const SERVER_STATUS_DB_DROPPED: u16 = 1 << 8;
    pub const SERVER_STATUS_NO_BACKSLASH_ESCAPES: u16 = 1 << 9;
    pub const SERVER_QUERY_WAS_SLOW: u16 = 1 << 11;
    pub const SERVER_SESSION_STATE_CHANGED: u16 = 1 << 14;
}

/// Column definition flags.
pub mod column_flag {
    pub const NOT_NULL: u16 = 1;
    pub const PRI_KEY: u16 = 1 << 1;
    pub const UNIQUE_KEY: u16 = 1 << 2;
    pub const BLOB: u16 = 1 << 4;
    pub const UNSIGNED: u16 = 1 << 5;
    pub const BINARY: u16 = 1 << 7;
    pub const ENUM: u16 = 1 << 8;
    pub const AUTO_INCREMENT: u16 = 1 << 9;
    pub const SET: u16 = 1 << 11;
}

/// Column type codes found in column definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Int24 = 0x09,
    Date = 0x0A,
    Time = 0x0B,
    DateTime = 0x0C,
    Year = 0x0D,
    NewDate = 0x0E,
    VarChar = 0x0F,
    Bit = 0x10,
    Timestamp2 = 0x11,
    DateTime2 = 0x12,
    Time2 = 0x13,
    Json = 0xF5,
    NewDecimal = 0xF6,
    Enum = 0xF7,
    Set = 0xF8,
    TinyBlob = 0xF9,
    MediumBlob = 0xFA,
    LongBlob = 0xFB,
    Blob = 0xFC,
    VarString = 0xFD,
    String = 0xFE,
    Geometry = 0xFF,
}

impl ColumnType {
    /// Map a wire type code to a column type. Unknown codes yield `None`.
    pub fn from_u8(code: u8) -> Option<Self> {
        use ColumnType::*;
        let ty = match code {
            0x00 => Decimal,
            0x01 => Tiny,
            0x02 => Short,
            0x03 => Long,
            0x04 => Float,
            0x05 => Double,
            0x06 => Null,
            0x07 => Timestamp,
            0x08 => LongLong,
            0x09 => Int24,
            0x0A => Date,
            0x0B => Time,
            0x0C => DateTime,
            0x0D => Year,
            0x0E => NewDate,
            0x0F => VarChar,
            0x10 => Bit,
            0x11 => Timestamp2,
            0x12 => DateTime2,
            0x13 => Time2,
            0xF5 => Json,
            0xF6 => NewDecimal,
            0xF7 => Enum,
            0xF8 => Set,
            0xF9 => TinyBlob,
            0xFA => MediumBlob,
            0xFB => LongBlob,
            0xFC => Blob,
            0xFD => VarString,
            0xFE => String,
            0xFF => Geometry,
            _ => return None,
        };
        Some(ty)
    }
}
