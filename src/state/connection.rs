//! Connection handshake and authentication state machine.

use tracing::debug;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::auth::auth_response;
use crate::protocol::constant::{capability, header};
use crate::protocol::handshake::{ServerHandshake, client_capabilities, write_handshake_response};
use crate::protocol::response::{OkPacket, parse_err_packet};

use super::StateMachine;
use super::action::Action;

/// Connection state during startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initial,
    WaitingHandshake,
    WaitingAuthResult,
    Ready,
    Failed,
}

/// Connection startup state machine.
///
/// Reads the server greeting, answers with a HandshakeResponse41 carrying
/// the `mysql_native_password` scramble and waits for the auth verdict.
pub struct ConnectionStateMachine {
    state: ConnectionState,
    user: String,
    password: String,
    database: Option<String>,
    connection_id: u32,
    server_version: String,
    capability_flags: u32,
    status_flags: u16,
}

impl ConnectionStateMachine {
    /// Create a new connection state machine.
    pub fn new(opts: &Opts) -> Self {
        Self {
            state: ConnectionState::Initial,
            user: opts.user.clone(),
            password: opts.password.clone(),
            database: opts.database.clone(),
            connection_id: 0,
            server_version: String::new(),
            capability_flags: 0,
            status_flags: 0,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Server-assigned connection id.
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Capabilities both sides agreed on.
    pub fn capability_flags(&self) -> u32 {
        self.capability_flags
    }

    /// Status flags from the final OK packet.
    pub fn status_flags(&self) -> u16 {
        self.status_flags
    }

    fn handle_handshake(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let handshake = match ServerHandshake::parse(&buffer_set.read_buffer)? {
            ServerHandshake::V10(h) => h,
            ServerHandshake::V9(_) => return Err(Error::UnsupportedHandshakeVersion(9)),
        };
        debug!(
            connection_id = handshake.connection_id,
            server_version = %handshake.server_version,
            plugin = %handshake.auth_plugin_name,
            "server handshake"
        );

        let auth = auth_response(
            &handshake.auth_plugin_name,
            &self.password,
            &handshake.auth_plugin_data,
        )?;

        self.connection_id = handshake.connection_id;
        self.server_version = handshake.server_version;
        self.capability_flags =
            client_capabilities(self.database.is_some()) & handshake.capability_flags;

        buffer_set.write_buffer.clear();
        write_handshake_response(
            &mut buffer_set.write_buffer,
            &self.user,
            &auth,
            self.database.as_deref(),
        )?;
        self.state = ConnectionState::WaitingAuthResult;
        Ok(Action::WriteAndReadPacket)
    }

    fn handle_auth_result(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let payload = &buffer_set.read_buffer;
        match payload.first() {
            None => Err(Error::InvalidServerReply("no header")),
            Some(&header::ERR) => Err(Error::Server(parse_err_packet(payload))),
            Some(&header::OK) => {
                self.status_flags = OkPacket::parse(payload)?.status_flags;
                self.state = ConnectionState::Ready;
                Ok(Action::Finished)
            }
            Some(&header::EOF) => {
                self.state = ConnectionState::Ready;
                Ok(Action::Finished)
            }
            Some(_) => Err(Error::InvalidServerReply("bad header")),
        }
    }

    /// Returns true if the server agreed to end result sets with an OK packet.
    pub fn deprecate_eof(&self) -> bool {
        self.capability_flags & capability::CLIENT_DEPRECATE_EOF != 0
    }
}

impl StateMachine for ConnectionStateMachine {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let result = match self.state {
            ConnectionState::Initial => {
                self.state = ConnectionState::WaitingHandshake;
                Ok(Action::ReadPacket)
            }
            ConnectionState::WaitingHandshake => self.handle_handshake(buffer_set),
            ConnectionState::WaitingAuthResult => self.handle_auth_result(buffer_set),
            ConnectionState::Ready | ConnectionState::Failed => Err(Error::InvalidUsage(format!(
                "connection state machine stepped in state {:?}",
                self.state
            ))),
        };
        if result.is_err() {
            self.state = ConnectionState::Failed;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::auth::native_password;
    use crate::protocol::handshake::HandshakeV10;
    use crate::protocol::response::write_err_packet;

    fn greeting(capability_flags: u32, plugin: &str) -> Vec<u8> {
        let handshake = HandshakeV10 {
            server_version: "8.0.36".into(),
            connection_id: 42,
            capability_flags,
            charset: 255,
            status_flags: 2,
            auth_plugin_data: (1..=20).chain([0]).collect(),
            auth_plugin_name: plugin.into(),
        };
        let mut out = Vec::new();
        handshake.write(&mut out);
        out
    }

    fn opts() -> Opts {
        Opts {
            user: "app".into(),
            password: "secret".into(),
            database: Some("shop".into()),
            ..Opts::default()
        }
    }

    #[test]
    fn test_successful_handshake() {
        let mut sm = ConnectionStateMachine::new(&opts());
        let mut buffers = BufferSet::new();
        assert_eq!(sm.step(&mut buffers).unwrap(), Action::ReadPacket);

        buffers.read_buffer = greeting(0xFFFF_FFFF, "mysql_native_password");
        assert_eq!(sm.step(&mut buffers).unwrap(), Action::WriteAndReadPacket);
        assert_eq!(sm.connection_id(), 42);
        assert_eq!(sm.server_version(), "8.0.36");
        assert!(sm.deprecate_eof());

        let scramble: Vec<u8> = (1..=20).collect();
        let expected = native_password(b"secret", &scramble);
        let response = &buffers.write_buffer;
        assert_eq!(&response[32..36], b"app\0");
        assert_eq!(response[36] as usize, expected.len());
        assert_eq!(&response[37..57], &expected[..]);
        assert_eq!(&response[57..], b"shop\0");

        buffers.read_buffer = vec![0x00, 0, 0, 0x02, 0x00, 0, 0];
        assert_eq!(sm.step(&mut buffers).unwrap(), Action::Finished);
        assert_eq!(sm.state(), ConnectionState::Ready);
        assert_eq!(sm.status_flags(), 2);
    }

    #[test]
    fn test_access_denied() {
        let mut sm = ConnectionStateMachine::new(&opts());
        let mut buffers = BufferSet::new();
        sm.step(&mut buffers).unwrap();
        buffers.read_buffer = greeting(0xFFFF_FFFF, "mysql_native_password");
        sm.step(&mut buffers).unwrap();

        buffers.read_buffer.clear();
        write_err_packet(&mut buffers.read_buffer, 1045, "28000", "Access denied");
        let err = sm.step(&mut buffers).unwrap_err();
        assert_eq!(err.code(), "ER_ACCESS_DENIED_ERROR");
        assert!(!err.is_connection_broken());
        assert_eq!(sm.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_bad_auth_reply() {
        let mut sm = ConnectionStateMachine::new(&opts());
        let mut buffers = BufferSet::new();
        sm.step(&mut buffers).unwrap();
        buffers.read_buffer = greeting(0xFFFF_FFFF, "mysql_native_password");
        sm.step(&mut buffers).unwrap();

        buffers.read_buffer = vec![0x01];
        assert!(matches!(
            sm.step(&mut buffers),
            Err(Error::InvalidServerReply("bad header"))
        ));

        let mut sm = ConnectionStateMachine::new(&opts());
        sm.step(&mut buffers).unwrap();
        buffers.read_buffer = greeting(0xFFFF_FFFF, "mysql_native_password");
        sm.step(&mut buffers).unwrap();
        buffers.read_buffer.clear();
        assert!(matches!(
            sm.step(&mut buffers),
            Err(Error::InvalidServerReply("no header"))
        ));
    }

    #[test]
    fn test_unsupported_plugin() {
        let mut sm = ConnectionStateMachine::new(&opts());
        let mut buffers = BufferSet::new();
        sm.step(&mut buffers).unwrap();
        buffers.read_buffer = greeting(0xFFFF_FFFF, "caching_sha2_password");
        assert!(matches!(sm.step(&mut buffers), Err(Error::AuthPlugin(_))));
    }

    #[test]
    fn test_v9_is_rejected() {
        let mut sm = ConnectionStateMachine::new(&opts());
        let mut buffers = BufferSet::new();
        sm.step(&mut buffers).unwrap();
        let mut payload = vec![9];
        payload.extend_from_slice(b"3.23\0");
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(b"scramble\0");
        buffers.read_buffer = payload;
        assert!(matches!(
            sm.step(&mut buffers),
            Err(Error::UnsupportedHandshakeVersion(9))
        ));
    }

    #[test]
    fn test_empty_password_sends_empty_auth() {
        let mut sm = ConnectionStateMachine::new(&Opts::default());
        let mut buffers = BufferSet::new();
        sm.step(&mut buffers).unwrap();
        buffers.read_buffer = greeting(0xFFFF_FFFF, "mysql_native_password");
        sm.step(&mut buffers).unwrap();
        assert_eq!(&buffers.write_buffer[32..], b"root\0\0");
    }
}
