//! Buffers shared between a connection and its state machines.

/// Read, write and framing buffers for one connection.
///
/// `Default` is empty and allocation-free; [`BufferSet::new`] preallocates.
#[derive(Debug, Default)]
pub struct BufferSet {
    /// Payload of the last packet read
    pub read_buffer: Vec<u8>,
    /// Payload of the next packet to write
    pub write_buffer: Vec<u8>,
    /// Framed bytes ready for the socket
    pub frame_buffer: Vec<u8>,
}

impl BufferSet {
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            write_buffer: Vec::with_capacity(8192),
            frame_buffer: Vec::with_capacity(8192),
        }
    }

    /// Clear all buffers, keeping their capacity.
    pub fn clear(&mut self) {
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.frame_buffer.clear();
    }
}
