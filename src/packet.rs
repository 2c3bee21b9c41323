use crate::error::{RconError, Result};

/// Wire-level packet type tag.
///
/// `SERVERDATA_EXECCOMMAND` and `SERVERDATA_AUTH_RESPONSE` share the value 2,
/// so there is a single [PacketType::Exec] tag for both. Which of the two a
/// packet means depends on where in the exchange it shows up, which is
/// something only the handshake or the session knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    // SERVERDATA_AUTH
    Auth,
    // SERVERDATA_EXECCOMMAND / SERVERDATA_AUTH_RESPONSE
    Exec,
    // SERVERDATA_RESPONSE_VALUE
    Response,
}

impl PacketType {
    /// The tag the server uses to answer an [PacketType::Auth] packet.
    pub const AUTH_RESPONSE: PacketType = PacketType::Exec;

    pub fn value(self) -> u32 {
        match self {
            PacketType::Auth => 3,
            PacketType::Exec => 2,
            PacketType::Response => 0,
        }
    }

    pub fn to_le_bytes(self) -> [u8; 4] {
        self.value().to_le_bytes()
    }
}

impl TryFrom<u32> for PacketType {
    type Error = RconError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            3 => Ok(PacketType::Auth),
            2 => Ok(PacketType::Exec),
            0 => Ok(PacketType::Response),
            other => Err(RconError::InvalidPacketType(other)),
        }
    }
}

/// A single rcon packet. The body is kept without its NUL terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: u32,
    packet_type: PacketType,
    body: String,
}

impl Packet {
    /// id + type + body terminator + packet terminator
    pub const BASE_PACKET_SIZE: u32 = 10;
    /// size + id + type
    pub const HEADER_LEN: usize = 12;
    /// Shortest well-formed frame: header plus the two terminators.
    pub const MIN_FRAME_LEN: usize = Self::HEADER_LEN + 2;

    /// Builds a packet, refusing bodies the wire format cannot carry.
    pub fn new(id: u32, packet_type: PacketType, body: &str) -> Result<Self> {
        if !is_encodable(body) {
            return Err(RconError::UnserializableCommand);
        }

        Ok(Packet {
            id,
            packet_type,
            body: body.to_owned(),
        })
    }

    // Since the only one of these values that can change in length is the body,
    // an easy way to calculate the size of a packet is to find the byte-length
    // of the packet body, then add 10 to it.
    pub fn size(&self) -> u32 {
        self.body.len() as u32 + Self::BASE_PACKET_SIZE
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn body(&self) -> &str {
        self.body.as_ref()
    }

    pub fn into_body(self) -> String {
        self.body
    }

    pub fn pack(&self) -> Vec<u8> {
        // Size, ID, Type, Body, Terminator
        let mut payload = Vec::with_capacity(self.size() as usize + 4);
        payload.extend_from_slice(&self.size().to_le_bytes());
        payload.extend_from_slice(&self.id.to_le_bytes());
        payload.extend_from_slice(&self.packet_type.to_le_bytes());
        payload.extend_from_slice(self.body.as_bytes());
        // null terminate the body, then null terminate the entire packet
        payload.extend_from_slice(&[0u8, 0u8]);
        payload
    }

    /// Parses one complete frame, size field included. The buffer has to be
    /// exactly as long as the frame declares.
    pub fn unpack(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::HEADER_LEN {
            return Err(RconError::InvalidPacketSize {
                expected: Self::HEADER_LEN,
                actual: buf.len(),
            });
        }

        let size = read_u32_le(buf, 0)?;
        let id = read_u32_le(buf, 4)?;
        let packet_type = PacketType::try_from(read_u32_le(buf, 8)?)?;

        let expected = (size as usize).saturating_add(4);
        if expected != buf.len() {
            return Err(RconError::InvalidPacketSize {
                expected,
                actual: buf.len(),
            });
        }
        if buf.len() < Self::MIN_FRAME_LEN {
            return Err(RconError::InvalidPacketSize {
                expected: Self::MIN_FRAME_LEN,
                actual: buf.len(),
            });
        }

        let body = &buf[Self::HEADER_LEN..buf.len() - 2];
        if !body.is_ascii() {
            return Err(RconError::InvalidBodyEncoding);
        }
        let body = String::from_utf8(body.to_vec()).map_err(|_| RconError::InvalidBodyEncoding)?;

        Ok(Packet {
            id,
            packet_type,
            body,
        })
    }
}

/// Encodes `(id, type, body)` into its wire representation.
pub fn encode(id: u32, packet_type: PacketType, body: &str) -> Result<Vec<u8>> {
    Ok(Packet::new(id, packet_type, body)?.pack())
}

/// Decodes one complete frame.
pub fn decode(buf: &[u8]) -> Result<Packet> {
    Packet::unpack(buf)
}

/// Bodies are NUL terminated on the wire and must be plain ascii.
pub fn is_encodable(body: &str) -> bool {
    body.bytes().all(|b| b.is_ascii() && b != 0)
}

fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32> {
    buf.get(offset..offset + 4)
        .and_then(|field| <[u8; 4]>::try_from(field).ok())
        .map(u32::from_le_bytes)
        .ok_or(RconError::InvalidPacketSize {
            expected: offset + 4,
            actual: buf.len(),
        })
}
