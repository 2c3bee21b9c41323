use std::io;
use std::time::Duration;

use log::trace;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

use crate::{
    config::ClientConfig,
    error::{ConnectionError, RconError},
    packet::Packet,
};

/// Opens the TCP stream a session runs over.
pub async fn connect(
    host: &str,
    port: u16,
    config: &ClientConfig,
) -> Result<TcpStream, RconError> {
    let stream = timeout(config.connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ConnectionError::Timeout)?
        .map_err(ConnectionError::UnreachableHost)?;

    stream
        .set_nodelay(true)
        .map_err(ConnectionError::UnreachableHost)?;

    trace!("opened tcp stream to {}:{}", host, port);
    Ok(stream)
}

/// Why reading a packet off the stream did not work out. What this means for
/// the caller depends on whether we are still logging in or running a command.
#[derive(Debug)]
pub enum ReadFailure {
    Timeout,
    /// The peer closed the stream, possibly halfway through a packet.
    Closed,
    Io(io::Error),
    /// Bytes arrived but they are not a packet.
    Malformed(RconError),
}

impl ReadFailure {
    /// During the handshake, everything is a failed connection.
    pub fn into_handshake_error(self) -> RconError {
        match self {
            ReadFailure::Timeout => ConnectionError::Timeout.into(),
            ReadFailure::Closed => {
                ConnectionError::ReceiveError(io::ErrorKind::UnexpectedEof.into()).into()
            }
            ReadFailure::Io(e) => ConnectionError::ReceiveError(e).into(),
            ReadFailure::Malformed(e) => {
                ConnectionError::UnexpectedAuthReply(e.to_string()).into()
            }
        }
    }

    /// Once authenticated, a reply that does not arrive intact is an invalid
    /// response; only genuine socket errors count as a failed connection.
    pub fn into_command_error(self) -> RconError {
        match self {
            ReadFailure::Timeout => {
                RconError::InvalidResponse("timed out waiting for response".into())
            }
            ReadFailure::Closed => {
                RconError::InvalidResponse("connection closed mid-response".into())
            }
            ReadFailure::Io(e) => ConnectionError::ReceiveError(e).into(),
            ReadFailure::Malformed(e) => RconError::InvalidResponse(e.to_string()),
        }
    }
}

/// Packet-level view of a byte stream.
pub struct Connection<S> {
    stream: S,
    read_timeout: Duration,
    max_packet_size: u32,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, config: &ClientConfig) -> Self {
        Connection {
            stream,
            read_timeout: config.read_timeout,
            max_packet_size: config.max_packet_size,
        }
    }

    /// Writes all packets with a single write so they reach the server back
    /// to back.
    pub async fn write_packets(&mut self, packets: &[Packet]) -> Result<(), RconError> {
        let payload: Vec<u8> = packets.iter().flat_map(Packet::pack).collect();

        self.stream
            .write_all(&payload)
            .await
            .map_err(ConnectionError::SendError)?;
        self.stream
            .flush()
            .await
            .map_err(ConnectionError::SendError)?;
        Ok(())
    }

    /// Reads exactly one packet, giving up after the read timeout.
    pub async fn read_packet(&mut self) -> Result<Packet, ReadFailure> {
        match timeout(self.read_timeout, self.read_frame()).await {
            Ok(result) => result,
            Err(_) => Err(ReadFailure::Timeout),
        }
    }

    async fn read_frame(&mut self) -> Result<Packet, ReadFailure> {
        let mut size_field = [0u8; 4];
        read_exact(&mut self.stream, &mut size_field).await?;

        let size = u32::from_le_bytes(size_field);
        if size < Packet::BASE_PACKET_SIZE {
            return Err(ReadFailure::Malformed(RconError::InvalidPacketSize {
                expected: Packet::MIN_FRAME_LEN,
                actual: size as usize + 4,
            }));
        }
        if size > self.max_packet_size {
            return Err(ReadFailure::Malformed(RconError::InvalidPacketSize {
                expected: self.max_packet_size as usize + 4,
                actual: size as usize + 4,
            }));
        }

        let mut frame = vec![0u8; size as usize + 4];
        frame[..4].copy_from_slice(&size_field);
        read_exact(&mut self.stream, &mut frame[4..]).await?;

        let packet = Packet::unpack(&frame).map_err(ReadFailure::Malformed)?;
        trace!(
            "read packet id {} type {:?} ({} bytes)",
            packet.id(),
            packet.packet_type(),
            frame.len()
        );
        Ok(packet)
    }

    pub async fn close(mut self) -> Result<(), RconError> {
        self.stream
            .shutdown()
            .await
            .map_err(ConnectionError::SendError)?;
        Ok(())
    }
}

async fn read_exact<S>(stream: &mut S, buf: &mut [u8]) -> Result<(), ReadFailure>
where
    S: AsyncRead + Unpin,
{
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ReadFailure::Closed),
        Err(e) => Err(ReadFailure::Io(e)),
    }
}
