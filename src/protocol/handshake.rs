//! Server handshake parsing and the client handshake response.

use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::codec::{read_null_terminated, read_u32, read_u8, to_string_lossy, write_null_terminated};
use super::constant::{UTF8MB4_CHARSET, capability};
use crate::error::{Error, Result};

/// Minimum length of the second scramble part in a v10 handshake.
const AUTH_DATA_PART2_MIN_LEN: usize = 13;

/// Fixed-size section of a v10 handshake following the server version.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct HandshakeV10Fixed {
    pub connection_id: U32,
    pub auth_data_part1: [u8; 8],
    pub filler: u8,
    pub capability_lower: U16,
    pub charset: u8,
    pub status_flags: U16,
    pub capability_upper: U16,
    pub auth_data_len: u8,
    pub reserved: [u8; 10],
}

/// Protocol version 9 handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeV9 {
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_data: Vec<u8>,
}

/// Protocol version 10 handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeV10 {
    pub server_version: String,
    pub connection_id: u32,
    pub capability_flags: u32,
    pub charset: u8,
    pub status_flags: u16,
    /// Both scramble parts concatenated.
    pub auth_plugin_data: Vec<u8>,
    pub auth_plugin_name: String,
}

/// Initial handshake sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerHandshake {
    V9(HandshakeV9),
    V10(HandshakeV10),
}

impl ServerHandshake {
    /// Parse the first payload sent by the server.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (version, rest) =
            read_u8(payload).map_err(|_| Error::MalformedHandshake("empty handshake"))?;
        match version {
            9 => parse_v9(rest).map(Self::V9),
            10 => parse_v10(rest).map(Self::V10),
            other => Err(Error::UnsupportedHandshakeVersion(other)),
        }
    }

    pub fn protocol_version(&self) -> u8 {
        match self {
            Self::V9(_) => 9,
            Self::V10(_) => 10,
        }
    }

    pub fn server_version(&self) -> &str {
        match self {
            Self::V9(h) => &h.server_version,
            Self::V10(h) => &h.server_version,
        }
    }

    pub fn connection_id(&self) -> u32 {
        match self {
            Self::V9(h) => h.connection_id,
            Self::V10(h) => h.connection_id,
        }
    }

    pub fn auth_plugin_data(&self) -> &[u8] {
        match self {
            Self::V9(h) => &h.auth_plugin_data,
            Self::V10(h) => &h.auth_plugin_data,
        }
    }
}

fn read_server_version(data: &[u8]) -> Result<(String, &[u8])> {
    let (version, rest) = read_null_terminated(data)
        .map_err(|_| Error::MalformedHandshake("missing server version string"))?;
    Ok((to_string_lossy(version), rest))
}

fn parse_v9(data: &[u8]) -> Result<HandshakeV9> {
    let (server_version, rest) = read_server_version(data)?;
    let (connection_id, rest) =
        read_u32(rest).map_err(|_| Error::MalformedHandshake("bad packet size"))?;
    let (auth_plugin_data, _) = read_null_terminated(rest)
        .map_err(|_| Error::MalformedHandshake("missing auth plugin data"))?;
    Ok(HandshakeV9 {
        server_version,
        connection_id,
        auth_plugin_data: auth_plugin_data.to_vec(),
    })
}

fn parse_v10(data: &[u8]) -> Result<HandshakeV10> {
    let (server_version, rest) = read_server_version(data)?;
    let (fixed, rest) = HandshakeV10Fixed::ref_from_prefix(rest)
        .map_err(|_| Error::MalformedHandshake("bad packet size"))?;

    let capability_flags =
        fixed.capability_lower.get() as u32 | ((fixed.capability_upper.get() as u32) << 16);
    if capability_flags & capability::CLIENT_PLUGIN_AUTH == 0 {
        return Err(Error::AuthPluginNotEnabled);
    }

    let part2_len = AUTH_DATA_PART2_MIN_LEN.max((fixed.auth_data_len as usize).saturating_sub(8));
    if rest.len() < part2_len {
        return Err(Error::MalformedHandshake("bad packet size"));
    }
    let (part2, rest) = rest.split_at(part2_len);

    let mut auth_plugin_data = Vec::with_capacity(8 + part2_len);
    auth_plugin_data.extend_from_slice(&fixed.auth_data_part1);
    auth_plugin_data.extend_from_slice(part2);

    let (plugin_name, _) = read_null_terminated(rest)
        .map_err(|_| Error::MalformedHandshake("missing auth plugin name"))?;

    Ok(HandshakeV10 {
        server_version,
        connection_id: fixed.connection_id.get(),
        capability_flags,
        charset: fixed.charset,
        status_flags: fixed.status_flags.get(),
        auth_plugin_data,
        auth_plugin_name: to_string_lossy(plugin_name),
    })
}

impl HandshakeV10 {
    /// Write this handshake as a server greeting payload.
    pub fn write(&self, out: &mut Vec<u8>) {
        let mut part1 = [0u8; 8];
        let split = self.auth_plugin_data.len().min(8);
        part1[..split].copy_from_slice(&self.auth_plugin_data[..split]);
        let part2 = &self.auth_plugin_data[split..];

        out.push(10);
        write_null_terminated(out, self.server_version.as_bytes());
        let fixed = HandshakeV10Fixed {
            connection_id: U32::new(self.connection_id),
            auth_data_part1: part1,
            filler: 0,
            capability_lower: U16::new(self.capability_flags as u16),
            charset: self.charset,
            status_flags: U16::new(self.status_flags),
            capability_upper: U16::new((self.capability_flags >> 16) as u16),
            auth_data_len: self.auth_plugin_data.len().min(u8::MAX as usize) as u8,
            reserved: [0; 10],
        };
        out.extend_from_slice(fixed.as_bytes());
        out.extend_from_slice(part2);
        for _ in part2.len()..AUTH_DATA_PART2_MIN_LEN {
            out.push(0);
        }
        write_null_terminated(out, self.auth_plugin_name.as_bytes());
    }
}

/// Capability flags sent in the handshake response.
pub fn client_capabilities(with_database: bool) -> u32 {
    let mut flags = capability::CLIENT_PROTOCOL_41
        | capability::CLIENT_TRANSACTIONS
        | capability::CLIENT_DEPRECATE_EOF;
    if with_database {
        flags |= capability::CLIENT_CONNECT_WITH_DB;
    }
    flags
}

/// Write a HandshakeResponse41 payload.
pub fn write_handshake_response(
    out: &mut Vec<u8>,
    user: &str,
    auth_response: &[u8],
    database: Option<&str>,
) -> Result<()> {
    let auth_len = u8::try_from(auth_response.len()).map_err(|_| {
        Error::InvalidUsage(format!("auth response too long: {}", auth_response.len()))
    })?;
    out.extend_from_slice(&client_capabilities(database.is_some()).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(UTF8MB4_CHARSET);
    out.extend_from_slice(&[0u8; 23]);
    write_null_terminated(out, user.as_bytes());
    out.push(auth_len);
    out.extend_from_slice(auth_response);
    if let Some(db) = database {
        write_null_terminated(out, db.as_bytes());
    }
    Ok(())
}
