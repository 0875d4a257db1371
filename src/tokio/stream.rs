//! Async packet stream for tokio.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::packet::PacketCodec;

/// A TCP stream that reads and writes whole MySQL packets.
pub struct Stream {
    reader: BufReader<TcpStream>,
    codec: PacketCodec,
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self {
            reader: BufReader::new(stream),
            codec: PacketCodec::new(),
        }
    }

    /// Start a new command exchange at sequence id 0.
    pub fn reset_sequence(&mut self) {
        self.codec.reset_sequence();
    }

    /// Read the next complete payload into `out`.
    pub async fn read_packet(&mut self, out: &mut Vec<u8>) -> Result<()> {
        loop {
            if self.codec.decode(out)? {
                return Ok(());
            }
            let chunk = self.reader.fill_buf().await?;
            if chunk.is_empty() {
                return Err(Error::ConnectionClosed);
            }
            let n = chunk.len();
            trace!(bytes = n, "read");
            self.codec.push(chunk);
            self.reader.consume(n);
        }
    }

    /// Frame `payload` through `frame_buffer` and send it.
    pub async fn write_packet(&mut self, payload: &[u8], frame_buffer: &mut Vec<u8>) -> Result<()> {
        frame_buffer.clear();
        self.codec.encode(payload, frame_buffer);
        let stream = self.reader.get_mut();
        stream.write_all(frame_buffer).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Shut down the write half.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.reader.get_mut().shutdown().await
    }
}
