//! Sans-I/O state machines for the MySQL protocol.
//!
//! These state machines handle the protocol logic without performing any I/O.
//! They produce `Action` values that tell the caller what to do next.

pub mod action;
pub mod connection;
pub mod query;

pub use action::Action;
pub use connection::{ConnectionState, ConnectionStateMachine};
pub use query::{PingStateMachine, QueryStateMachine};

use crate::buffer_set::BufferSet;
use crate::error::Result;

/// A protocol exchange driven by `Conn::drive`.
pub trait StateMachine {
    /// Advance using the packet in `buffer_set.read_buffer` (if one was requested).
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action>;
}
