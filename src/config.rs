//! Client tunables.

use std::time::Duration;

use crate::packet::Packet;

/// Largest body we are willing to buffer for a single packet.
pub const DEFAULT_MAX_BODY_LEN: u32 = 64 * 1024;

/// Timeouts and limits used by a [crate::session::RconSession].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long to wait for the TCP connection to be established.
    pub connect_timeout: Duration,
    /// How long to wait for a single packet to arrive, during the handshake
    /// and while collecting a command response.
    pub read_timeout: Duration,
    /// Upper bound on the number of fragments one response may consist of.
    pub max_fragments: usize,
    /// Upper bound on the `size` field of an incoming packet.
    pub max_packet_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            max_fragments: 1024,
            max_packet_size: DEFAULT_MAX_BODY_LEN + Packet::BASE_PACKET_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_fragments(mut self, max_fragments: usize) -> Self {
        self.max_fragments = max_fragments.max(1);
        self
    }

    pub fn with_max_packet_size(mut self, max_packet_size: u32) -> Self {
        self.max_packet_size = max_packet_size.max(Packet::BASE_PACKET_SIZE);
        self
    }
}
