//! Action types for state machine I/O requests.

/// Action requested by a state machine.
///
/// The caller should perform the requested I/O and then call the
/// state machine's `step()` method again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read one complete packet payload into `buffer_set.read_buffer`.
    ReadPacket,

    /// Write `buffer_set.write_buffer`, then read the reply packet.
    ///
    /// Used for commands: write the command, then read the first response.
    WriteAndReadPacket,

    /// The state machine has finished successfully.
    Finished,
}
