//! Pure Rust async client for the [Source RCON protocol], as spoken by
//! Minecraft and Source engine servers.
//!
//! [Source RCON protocol]: https://developer.valvesoftware.com/wiki/Source_RCON_Protocol
pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod packet;
pub mod reassembly;
pub mod session;

pub use config::ClientConfig;
pub use error::{ConnectionError, RconError, Result};
pub use packet::{decode, encode, Packet, PacketType};
pub use session::RconSession;
