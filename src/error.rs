use thiserror::Error;

pub type Result<T> = std::result::Result<T, RconError>;

/// Possible errors for the package.
#[derive(Error, Debug)]
pub enum RconError {
    /// Returned if a buffer is shorter than the packet header, or if the
    /// declared size disagrees with the number of bytes actually present.
    #[error("invalid packet size: expected {expected} bytes, got {actual}")]
    InvalidPacketSize { expected: usize, actual: usize },
    /// Returned if we received a packet that does not have a type known to us.
    #[error("unknown rcon packet type: {0}")]
    InvalidPacketType(u32),
    /// Returned if the body contains bytes outside of the ASCII range.
    #[error("packet body is not valid ascii")]
    InvalidBodyEncoding,
    /// Returned if a command or password cannot be put on the wire (non-ascii
    /// characters or an embedded NUL).
    #[error("command cannot be encoded as an rcon packet body")]
    UnserializableCommand,
    /// Returned if the server sent something that does not fit the protocol
    /// at this point of the exchange. The session is dead afterwards.
    #[error("invalid response from server: {0}")]
    InvalidResponse(String),
    /// Returned if the transport or the login failed. The session is dead
    /// afterwards.
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] ConnectionError),
}

/// Underlying cause of [RconError::ConnectionFailed].
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Returned if the host is down or behind a firewall.
    #[error("host cannot be reached")]
    UnreachableHost(#[source] std::io::Error),
    #[error("cannot send message to host")]
    SendError(#[source] std::io::Error),
    #[error("cannot receive response from host")]
    ReceiveError(#[source] std::io::Error),
    /// Returned if you can't remember the password.
    #[error("bad password")]
    AuthenticationRejected,
    /// The server answered the login with something other than our id or
    /// the rejection sentinel.
    #[error("unexpected reply during authentication: {0}")]
    UnexpectedAuthReply(String),
    /// Returned if the server did not respond in time.
    #[error("timeout")]
    Timeout,
    /// The session already failed once and cannot be used anymore.
    #[error("session is no longer usable")]
    SessionBroken,
}

impl RconError {
    /// Whether the session that produced this error has to be thrown away.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RconError::InvalidResponse(_) | RconError::ConnectionFailed(_)
        )
    }
}

impl From<ConnectionError> for RconError {
    fn from(value: ConnectionError) -> Self {
        RconError::ConnectionFailed(value)
    }
}
