//! MySQL wire protocol implementation.
//!
//! This module contains the low-level protocol encoding and decoding.
//!
//! # Structure
//!
//! - `packet`: Frame splitting, reassembly and sequence ids
//! - `handshake`: Server greeting and client handshake response
//! - `auth`: `mysql_native_password` scramble
//! - `response`: OK / ERR packets, column definitions, text rows
//! - `command`: COM_QUERY, COM_PING, COM_QUIT
//! - `codec`: Low-level encoding/decoding primitives
//! - `constant`: Command bytes, flags and column types

pub mod auth;
pub mod codec;
pub mod command;
pub mod constant;
pub mod handshake;
pub mod packet;
pub mod response;

pub use constant::ColumnType;
pub use handshake::ServerHandshake;
pub use packet::PacketCodec;
pub use response::{ColumnDefinition, OkPacket};
