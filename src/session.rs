use log::trace;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::Mutex,
};

use crate::{
    auth::{AuthHandshake, AUTH_FAILED_ID},
    config::ClientConfig,
    connection::{self, Connection},
    error::{ConnectionError, RconError, Result},
    packet::{Packet, PacketType},
    reassembly::{FragmentReassembler, Progress},
};

/// Hands out request ids. Wraps around at `u32::MAX` and never yields the id
/// servers use to reject a login.
#[derive(Debug, Clone)]
pub struct RequestIds {
    next: u32,
}

impl Default for RequestIds {
    fn default() -> Self {
        RequestIds { next: 1 }
    }
}

impl RequestIds {
    pub fn starting_at(next: u32) -> Self {
        RequestIds { next }
    }

    pub fn next_id(&mut self) -> u32 {
        if self.next == AUTH_FAILED_ID {
            self.next = self.next.wrapping_add(1);
        }
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }
}

/// Simple asynchronous rcon session. Use [RconSession::connect] to establish
/// a connection and authenticate.
///
/// Commands are serialized: if several tasks share one session (e.g. through
/// an `Arc`), each `send_command` waits until the previous one has read its
/// full response before writing anything.
///
/// ## Example
/// ```no_run
/// use raptor::session::RconSession;
/// use std::error::Error;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn Error>> {
///     let session = RconSession::connect("localhost", 25575, "<put rcon password here>").await?;
///     let version = session.send_command("version").await?;
///
///     println!("{}", version);
///     Ok(())
/// }
/// ```
pub struct RconSession<S = TcpStream> {
    inner: Mutex<Inner<S>>,
    peer: Option<(String, u16)>,
}

struct Inner<S> {
    conn: Connection<S>,
    ids: RequestIds,
    reassembler: FragmentReassembler,
    authenticated: bool,
    dropped_packets: u64,
}

impl RconSession<TcpStream> {
    pub async fn connect(host: &str, port: u16, password: &str) -> Result<Self> {
        Self::connect_with(host, port, password, &ClientConfig::default()).await
    }

    pub async fn connect_with(
        host: &str,
        port: u16,
        password: &str,
        config: &ClientConfig,
    ) -> Result<Self> {
        let stream = connection::connect(host, port, config).await?;
        trace!("attempting auth");
        let mut session = Self::establish(stream, password, config).await?;
        session.peer = Some((host.to_owned(), port));
        Ok(session)
    }
}

impl<S> RconSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Logs in over an already open stream. No session is returned unless
    /// the server accepted the password.
    pub async fn establish(stream: S, password: &str, config: &ClientConfig) -> Result<Self> {
        let mut conn = Connection::new(stream, config);
        let mut ids = RequestIds::default();

        AuthHandshake::new()
            .perform(&mut conn, ids.next_id(), password)
            .await?;
        trace!("auth complete");

        Ok(RconSession {
            inner: Mutex::new(Inner {
                conn,
                ids,
                reassembler: FragmentReassembler::new(config.max_fragments),
                authenticated: true,
                dropped_packets: 0,
            }),
            peer: None,
        })
    }

    /// Runs a command and returns the server's response. In case of a
    /// response being split between multiple packets, they are joined
    /// together in the order they arrived.
    ///
    /// After a [RconError::ConnectionFailed] or [RconError::InvalidResponse]
    /// the session is dead and every later call fails right away.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        if !inner.authenticated {
            return Err(ConnectionError::SessionBroken.into());
        }

        // stays cleared if this future is dropped halfway through the
        // exchange, since the stream may then hold a partial frame or
        // replies nobody will read
        inner.authenticated = false;
        let result = inner.round_trip(command).await;
        inner.authenticated = match &result {
            Ok(_) => true,
            Err(e) => !e.is_fatal(),
        };
        result
    }

    /// Host and port the session was opened to by [RconSession::connect].
    /// `None` for sessions built over a caller-supplied stream.
    pub fn peer(&self) -> Option<(&str, u16)> {
        self.peer.as_ref().map(|(host, port)| (host.as_str(), *port))
    }

    /// False once a command failed in a way that leaves the stream in an
    /// unknown state.
    pub async fn is_usable(&self) -> bool {
        self.inner.lock().await.authenticated
    }

    /// Number of packets thrown away because nobody was waiting for their id.
    pub async fn dropped_packets(&self) -> u64 {
        self.inner.lock().await.dropped_packets
    }

    pub async fn close(self) -> Result<()> {
        self.inner.into_inner().conn.close().await
    }
}

impl<S> Inner<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn round_trip(&mut self, command: &str) -> Result<String> {
        let command_packet = Packet::new(self.ids.next_id(), PacketType::Exec, command)?;
        // the server can split up the response but it won't tell us how many
        // packets to expect, so a blank command goes right after ours. Its
        // reply marks the end of the response.
        let probe_packet = Packet::new(self.ids.next_id(), PacketType::Exec, "")?;

        trace!(
            "sending packet {} and probe {} to server",
            command_packet.id(),
            probe_packet.id()
        );
        self.reassembler.open(command_packet.id(), probe_packet.id());

        let result = self.collect(&command_packet, &probe_packet).await;
        if result.is_err() {
            self.reassembler.discard(command_packet.id());
        }
        result
    }

    async fn collect(&mut self, command_packet: &Packet, probe_packet: &Packet) -> Result<String> {
        self.conn
            .write_packets(&[command_packet.clone(), probe_packet.clone()])
            .await?;

        loop {
            let response = self
                .conn
                .read_packet()
                .await
                .map_err(|failure| failure.into_command_error())?;
            trace!("receive response for packet id {}", response.id());

            match self.reassembler.feed(response)? {
                Progress::Pending => continue,
                Progress::Dropped { .. } => self.dropped_packets += 1,
                Progress::Complete { id, body } if id == command_packet.id() => {
                    trace!("that was the probe, completing response");
                    return Ok(body);
                }
                Progress::Complete { id, .. } => {
                    return Err(RconError::InvalidResponse(format!(
                        "completed request {} while waiting for {}",
                        id,
                        command_packet.id()
                    )))
                }
            }
        }
    }
}
