//! Gluing multi-packet responses back together.
//!
//! srcds and Minecraft split large responses over several packets but never
//! say how many to expect. Every command is therefore followed by an empty
//! probe packet with its own id: the server answers in order, so once the
//! probe's echo shows up every fragment of the command has been seen.

use std::collections::HashMap;

use log::warn;

use crate::{
    error::{RconError, Result},
    packet::{Packet, PacketType},
};

/// Fragments collected so far for one command.
#[derive(Debug)]
pub struct PendingRequest {
    id: u32,
    probe_id: u32,
    fragments: Vec<String>,
}

impl PendingRequest {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn probe_id(&self) -> u32 {
        self.probe_id
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
}

/// Result of feeding one packet to the reassembler.
#[derive(Debug, PartialEq, Eq)]
pub enum Progress {
    /// The packet was a fragment; keep reading.
    Pending,
    /// The probe echo arrived; here is the whole body.
    Complete { id: u32, body: String },
    /// Nobody is waiting for this id. The packet was thrown away.
    Dropped { id: u32 },
}

#[derive(Debug)]
pub struct FragmentReassembler {
    pending: HashMap<u32, PendingRequest>,
    // probe id -> command id
    probes: HashMap<u32, u32>,
    max_fragments: usize,
}

impl FragmentReassembler {
    pub fn new(max_fragments: usize) -> Self {
        FragmentReassembler {
            pending: HashMap::new(),
            probes: HashMap::new(),
            max_fragments,
        }
    }

    /// Starts tracking a command whose response ends with the echo of
    /// `probe_id`.
    pub fn open(&mut self, id: u32, probe_id: u32) {
        self.probes.insert(probe_id, id);
        self.pending.insert(
            id,
            PendingRequest {
                id,
                probe_id,
                fragments: Vec::new(),
            },
        );
    }

    pub fn is_pending(&self, id: u32) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn pending(&self, id: u32) -> Option<&PendingRequest> {
        self.pending.get(&id)
    }

    /// Forgets a request, e.g. after its session failed.
    pub fn discard(&mut self, id: u32) {
        if let Some(request) = self.pending.remove(&id) {
            self.probes.remove(&request.probe_id);
        }
    }

    pub fn feed(&mut self, packet: Packet) -> Result<Progress> {
        let id = packet.id();

        if let Some(request) = self.pending.get_mut(&id) {
            if packet.packet_type() != PacketType::Response {
                let id = request.id;
                self.discard(id);
                return Err(RconError::InvalidResponse(format!(
                    "fragment for request {} has type {:?}",
                    id,
                    packet.packet_type()
                )));
            }

            if request.fragments.len() >= self.max_fragments {
                let id = request.id;
                self.discard(id);
                return Err(RconError::InvalidResponse(format!(
                    "response to request {} exceeded {} fragments",
                    id, self.max_fragments
                )));
            }

            request.fragments.push(packet.into_body());
            return Ok(Progress::Pending);
        }

        if let Some(request_id) = self.probes.remove(&id) {
            let body = self
                .pending
                .remove(&request_id)
                .map(|request| request.fragments.concat())
                .unwrap_or_default();
            return Ok(Progress::Complete {
                id: request_id,
                body,
            });
        }

        warn!("dropping packet with unexpected id {}", id);
        Ok(Progress::Dropped { id })
    }
}
