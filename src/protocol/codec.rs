//! MySQL wire protocol encoding and decoding primitives.
//!
//! MySQL uses little-endian for all fixed-width integers and a
//! variable-width "length-encoded" integer for counts and string lengths.

use zerocopy::FromBytes;
use zerocopy::little_endian::{U16, U32, U64};

use crate::error::{Error, Result};

/// Prefix byte of a 2-byte length-encoded integer.
pub const LENENC_2: u8 = 0xFC;
/// Prefix byte of a 3-byte length-encoded integer.
pub const LENENC_3: u8 = 0xFD;
/// Prefix byte of an 8-byte length-encoded integer.
pub const LENENC_8: u8 = 0xFE;
/// NULL marker inside a text result row.
pub const LENENC_NULL: u8 = 0xFB;

fn too_short(what: &str, have: usize, need: usize) -> Error {
    Error::BufferSize(format!("{what}: buffer too short: {have} < {need}"))
}

/// Read 1-byte unsigned integer.
#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&b, rest)) => Ok((b, rest)),
        None => Err(too_short("read_u8", 0, 1)),
    }
}

/// Read 2-byte little-endian unsigned integer.
#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    if data.len() < 2 {
        return Err(too_short("read_u16", data.len(), 2));
    }
    let value = U16::read_from_bytes(&data[..2])
        .map_err(|e| Error::BufferSize(format!("read_u16: {e:?}")))?
        .get();
    Ok((value, &data[2..]))
}

/// Read 3-byte little-endian unsigned integer.
#[inline]
pub fn read_u24(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 3 {
        return Err(too_short("read_u24", data.len(), 3));
    }
    let value = u32::from_le_bytes([data[0], data[1], data[2], 0]);
    Ok((value, &data[3..]))
}

/// Read 4-byte little-endian unsigned integer.
#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 4 {
        return Err(too_short("read_u32", data.len(), 4));
    }
    let value = U32::read_from_bytes(&data[..4])
        .map_err(|e| Error::BufferSize(format!("read_u32: {e:?}")))?
        .get();
    Ok((value, &data[4..]))
}

/// Read 8-byte little-endian unsigned integer.
#[inline]
pub fn read_u64(data: &[u8]) -> Result<(u64, &[u8])> {
    if data.len() < 8 {
        return Err(too_short("read_u64", data.len(), 8));
    }
    let value = U64::read_from_bytes(&data[..8])
        .map_err(|e| Error::BufferSize(format!("read_u64: {e:?}")))?
        .get();
    Ok((value, &data[8..]))
}

/// Read fixed-length bytes.
#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(too_short("read_bytes", data.len(), len));
    }
    Ok((&data[..len], &data[len..]))
}

/// Read NUL-terminated bytes.
/// Returns the bytes (without the terminator) and remaining data.
#[inline]
pub fn read_null_terminated(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(Error::BufferSize(
            "read_null_terminated: no NUL terminator found".into(),
        )),
    }
}

/// Read a length-encoded integer.
///
/// `0xFB` (NULL) and `0xFF` are not integers and are rejected here; callers
/// that accept NULL check for it first.
#[inline]
pub fn read_lenenc_int(data: &[u8]) -> Result<(u64, &[u8])> {
    let (first, rest) = read_u8(data)?;
    match first {
        0..=0xFA => Ok((first as u64, rest)),
        LENENC_2 => {
            let (v, rest) = read_u16(rest)?;
            Ok((v as u64, rest))
        }
        LENENC_3 => {
            let (v, rest) = read_u24(rest)?;
            Ok((v as u64, rest))
        }
        LENENC_8 => read_u64(rest),
        _ => Err(Error::InvalidServerReply("invalid length-encoded integer")),
    }
}

/// Read length-encoded bytes: a length-encoded integer followed by that many bytes.
#[inline]
pub fn read_lenenc_bytes(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = read_lenenc_int(data)?;
    let len = usize::try_from(len)
        .map_err(|_| Error::BufferSize(format!("read_lenenc_bytes: length {len} overflows")))?;
    read_bytes(rest, len)
}

/// Read length-encoded bytes, mapping the `0xFB` marker to `None`.
#[inline]
pub fn read_lenenc_bytes_or_null(data: &[u8]) -> Result<(Option<&[u8]>, &[u8])> {
    if data.first() == Some(&LENENC_NULL) {
        return Ok((None, &data[1..]));
    }
    let (bytes, rest) = read_lenenc_bytes(data)?;
    Ok((Some(bytes), rest))
}

/// Decode bytes as UTF-8, replacing invalid sequences.
#[inline]
pub fn to_string_lossy(bytes: &[u8]) -> String {
    match simdutf8::basic::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Write 1-byte unsigned integer.
#[inline]
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte little-endian unsigned integer.
#[inline]
pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 3-byte little-endian unsigned integer. The high byte of `value` is dropped.
#[inline]
pub fn write_u24(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes()[..3]);
}

/// Write 4-byte little-endian unsigned integer.
#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 8-byte little-endian unsigned integer.
#[inline]
pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write raw bytes.
#[inline]
pub fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

/// Write NUL-terminated bytes.
#[inline]
pub fn write_null_terminated(out: &mut Vec<u8>, s: &[u8]) {
    out.extend_from_slice(s);
    out.push(0);
}

/// Write a length-encoded integer using the shortest form.
#[inline]
pub fn write_lenenc_int(out: &mut Vec<u8>, value: u64) {
    if value < LENENC_NULL as u64 {
        out.push(value as u8);
    } else if value <= 0xFFFF {
        out.push(LENENC_2);
        write_u16(out, value as u16);
    } else if value <= 0xFF_FFFF {
        out.push(LENENC_3);
        write_u24(out, value as u32);
    } else {
        out.push(LENENC_8);
        write_u64(out, value);
    }
}

/// Write length-encoded bytes.
#[inline]
pub fn write_lenenc_bytes(out: &mut Vec<u8>, data: &[u8]) {
    write_lenenc_int(out, data.len() as u64);
    out.extend_from_slice(data);
}
