//! Packet framing and reassembly.
//!
//! A logical packet is one or more physical frames, each prefixed by a
//! 3-byte little-endian length and a 1-byte sequence id. A frame whose
//! length equals [`MAX_PACKET_LEN`] is continued by the next frame.
//!
//! The sequence counter is shared by both directions of a command
//! exchange: every frame read or written takes the next id, and the
//! counter is reset to zero before each new command.

use tracing::{trace, warn};

use super::codec::write_u24;
use super::constant::MAX_PACKET_LEN;
use crate::error::{Error, Result};

const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Waiting for a 4-byte frame header.
    Header,
    /// Header parsed; waiting for `len` payload bytes.
    Payload { len: usize },
    /// A sequence violation was seen; the stream is unusable.
    Failed,
}

/// Sans-I/O packet codec.
///
/// Bytes are fed with [`push`](Self::push) in arrival order and complete
/// payloads are taken out with [`decode`](Self::decode). Running short of
/// bytes is never an error; `decode` simply returns `Ok(false)`.
#[derive(Debug)]
pub struct PacketCodec {
    state: DecodeState,
    buffer: Vec<u8>,
    start: usize,
    message: Vec<u8>,
    next_seq: u8,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Header,
            buffer: Vec::with_capacity(8192),
            start: 0,
            message: Vec::new(),
            next_seq: 0,
        }
    }

    /// Sequence id the next frame (read or written) must carry.
    pub fn sequence_id(&self) -> u8 {
        self.next_seq
    }

    /// Reset the sequence counter at the start of a command.
    pub fn reset_sequence(&mut self) {
        self.next_seq = 0;
    }

    /// Returns true once a sequence violation has been detected.
    pub fn is_failed(&self) -> bool {
        self.state == DecodeState::Failed
    }

    /// Number of received bytes not yet consumed by `decode`.
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.start
    }

    /// Append received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.start == self.buffer.len() {
            self.buffer.clear();
            self.start = 0;
        } else if self.start > self.buffer.len() / 2 {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
        self.buffer.extend_from_slice(chunk);
    }

    /// Try to take the next complete payload out of the buffered bytes.
    ///
    /// On success `out` is replaced by the payload and `Ok(true)` is
    /// returned. `Ok(false)` means more bytes are needed.
    pub fn decode(&mut self, out: &mut Vec<u8>) -> Result<bool> {
        loop {
            match self.state {
                DecodeState::Failed => return Err(Error::ConnectionBroken),
                DecodeState::Header => {
                    let available = &self.buffer[self.start..];
                    if available.len() < HEADER_LEN {
                        return Ok(false);
                    }
                    let len = u32::from_le_bytes([available[0], available[1], available[2], 0])
                        as usize;
                    let seq = available[3];
                    if seq != self.next_seq {
                        warn!(
                            expected = self.next_seq,
                            received = seq,
                            "packet sequence mismatch"
                        );
                        self.state = DecodeState::Failed;
                        return Err(Error::SequenceId {
                            expected: self.next_seq,
                            received: seq,
                        });
                    }
                    trace!(len, seq, "frame header");
                    self.next_seq = self.next_seq.wrapping_add(1);
                    self.start += HEADER_LEN;
                    self.state = DecodeState::Payload { len };
                }
                DecodeState::Payload { len } => {
                    let available = &self.buffer[self.start..];
                    if available.len() < len {
                        return Ok(false);
                    }
                    self.message.extend_from_slice(&available[..len]);
                    self.start += len;
                    self.state = DecodeState::Header;
                    if len < MAX_PACKET_LEN {
                        out.clear();
                        std::mem::swap(out, &mut self.message);
                        return Ok(true);
                    }
                }
            }
        }
    }

    /// Frame `payload` into `out`, taking consecutive sequence ids.
    ///
    /// A payload whose length is a multiple of [`MAX_PACKET_LEN`] (including
    /// an empty one) ends with an empty frame.
    pub fn encode(&mut self, payload: &[u8], out: &mut Vec<u8>) {
        out.reserve(payload.len() + HEADER_LEN * (payload.len() / MAX_PACKET_LEN + 1));
        for chunk in payload.chunks(MAX_PACKET_LEN) {
            self.write_frame(chunk, out);
        }
        if payload.len() % MAX_PACKET_LEN == 0 {
            self.write_frame(&[], out);
        }
    }

    fn write_frame(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        trace!(len = chunk.len(), seq = self.next_seq, "write frame");
        write_u24(out, chunk.len() as u32);
        out.push(self.next_seq);
        out.extend_from_slice(chunk);
        self.next_seq = self.next_seq.wrapping_add(1);
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}
