//! Participant connection tracking for the ordering relay.
//!
//! This module owns the relay-side view of who is connected: address to
//! participant-id mapping, liveness timestamps, and the capacity limit. It
//! knows nothing about the world model; the relay wires the two together.

use log::info;
use shared::ParticipantId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// How long a participant may stay silent before the relay declares it gone.
/// Clients ping every second, so this tolerates a few lost pings.
pub const PARTICIPANT_TIMEOUT: Duration = Duration::from_secs(5);

/// One connected participant.
///
/// `last_seen` is relay-local liveness bookkeeping, unrelated to the logical
/// clock stamped onto events.
#[derive(Debug)]
pub struct Participant {
    /// Relay-assigned identifier, also used in every replicated event.
    pub id: ParticipantId,
    /// Network address for response routing and broadcast.
    pub addr: SocketAddr,
    /// Last time any packet arrived from this address.
    pub last_seen: Instant,
}

impl Participant {
    pub fn new(id: ParticipantId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks all connected participants and enforces the capacity limit.
///
/// Participant ids start from 1 and are never reused within a relay run, so
/// a reconnecting player is a new participant as far as the replicated world
/// is concerned.
pub struct ParticipantTable {
    participants: HashMap<ParticipantId, Participant>,
    next_id: ParticipantId,
    max_participants: usize,
}

impl ParticipantTable {
    pub fn new(max_participants: usize) -> Self {
        Self {
            participants: HashMap::new(),
            next_id: 1,
            max_participants,
        }
    }

    /// Registers a new participant. Returns None when the relay is full.
    pub fn add(&mut self, addr: SocketAddr) -> Option<ParticipantId> {
        if self.participants.len() >= self.max_participants {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;

        info!("Participant {} connected from {}", id, addr);
        self.participants.insert(id, Participant::new(id, addr));
        Some(id)
    }

    /// Removes a participant. Returns true if it was present.
    pub fn remove(&mut self, id: ParticipantId) -> bool {
        if self.participants.remove(&id).is_some() {
            info!("Participant {} disconnected", id);
            true
        } else {
            false
        }
    }

    /// Looks up the participant connected from `addr`. Packets from unknown
    /// addresses are dropped by the relay, so this is on the hot path.
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<ParticipantId> {
        self.participants
            .iter()
            .find(|(_, participant)| participant.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Refreshes liveness for the participant at `addr`. Returns its id, or
    /// None if the address is unknown.
    pub fn touch_addr(&mut self, addr: SocketAddr) -> Option<ParticipantId> {
        let id = self.find_by_addr(addr)?;
        if let Some(participant) = self.participants.get_mut(&id) {
            participant.touch();
        }
        Some(id)
    }

    /// Removes and returns every participant that exceeded the timeout.
    pub fn check_timeouts(&mut self) -> Vec<ParticipantId> {
        let timed_out: Vec<ParticipantId> = self
            .participants
            .iter()
            .filter(|(_, participant)| participant.is_timed_out(PARTICIPANT_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        for id in &timed_out {
            self.remove(*id);
        }

        timed_out
    }

    /// Addresses of every connected participant, for broadcast fan-out.
    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.participants
            .values()
            .map(|participant| participant.addr)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
