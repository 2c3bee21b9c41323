use log::trace;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    connection::Connection,
    error::{ConnectionError, RconError, Result},
    packet::{Packet, PacketType},
};

/// Id the server puts in its auth response when the password is wrong.
pub const AUTH_FAILED_ID: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    AuthSent { id: u32 },
    AuthAccepted,
    AuthRejected,
}

/// Login state machine. It decides what the server's replies mean; moving
/// bytes is left to [AuthHandshake::perform].
#[derive(Debug)]
pub struct AuthHandshake {
    state: AuthState,
    // some servers send an empty SERVERDATA_RESPONSE_VALUE before the result
    echo_seen: bool,
}

impl Default for AuthHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthHandshake {
    pub fn new() -> Self {
        AuthHandshake {
            state: AuthState::Idle,
            echo_seen: false,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Builds the auth packet and moves to [AuthState::AuthSent].
    pub fn start(&mut self, id: u32, password: &str) -> Result<Packet> {
        if self.state != AuthState::Idle {
            return Err(
                ConnectionError::UnexpectedAuthReply("handshake already started".into()).into(),
            );
        }
        let packet = Packet::new(id, PacketType::Auth, password)?;
        self.state = AuthState::AuthSent { id };
        Ok(packet)
    }

    /// Feeds one reply from the server. Returns the new state; anything that
    /// does not fit the exchange is a failed connection.
    pub fn observe(&mut self, packet: &Packet) -> Result<AuthState> {
        let sent_id = match self.state {
            AuthState::AuthSent { id } => id,
            _ => {
                return Err(ConnectionError::UnexpectedAuthReply(format!(
                    "packet {} arrived outside of the handshake",
                    packet.id()
                ))
                .into())
            }
        };

        match packet.packet_type() {
            PacketType::Response
                if !self.echo_seen
                    && packet.body().is_empty()
                    && (packet.id() == sent_id || packet.id() == AUTH_FAILED_ID) =>
            {
                trace!("skipping empty response echo before auth result");
                self.echo_seen = true;
                Ok(self.state)
            }
            PacketType::AUTH_RESPONSE if packet.id() == sent_id => {
                self.state = AuthState::AuthAccepted;
                Ok(self.state)
            }
            PacketType::AUTH_RESPONSE if packet.id() == AUTH_FAILED_ID => {
                self.state = AuthState::AuthRejected;
                Ok(self.state)
            }
            other => Err(ConnectionError::UnexpectedAuthReply(format!(
                "packet id {} of type {:?} while waiting for auth response to {}",
                packet.id(),
                other,
                sent_id
            ))
            .into()),
        }
    }

    /// Runs the whole login over `conn`. The password is sent once and the
    /// replies are read until the server has made up its mind.
    pub async fn perform<S>(
        &mut self,
        conn: &mut Connection<S>,
        id: u32,
        password: &str,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let auth_packet = self.start(id, password).map_err(|e| match e {
            RconError::UnserializableCommand => ConnectionError::UnexpectedAuthReply(
                "password cannot be encoded".into(),
            )
            .into(),
            other => other,
        })?;

        trace!("sending auth packet to server");
        conn.write_packets(&[auth_packet]).await?;

        loop {
            let response = conn
                .read_packet()
                .await
                .map_err(|failure| failure.into_handshake_error())?;
            trace!("receive response for packet id {}", response.id());

            match self.observe(&response)? {
                AuthState::AuthAccepted => return Ok(()),
                AuthState::AuthRejected => {
                    return Err(ConnectionError::AuthenticationRejected.into())
                }
                _ => continue,
            }
        }
    }
}
