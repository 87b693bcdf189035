//! Wire protocol between participants and the ordering relay.
//!
//! Everything on the wire is a bincode-encoded [`Packet`]. Participants only
//! ever send `Hello`, `Intent`, `Ping` and `Goodbye`; the relay answers with
//! `Welcome`/`Rejected` and fans out `Event` packets carrying the single
//! global order every participant replays.

use crate::{Facing, MapDimensions, MovementState, ParticipantId, PlayerRecord, PlayerUpdate};
use serde::{Deserialize, Serialize};

/// A desired state change, published to the shared channel before being
/// applied to the model. The sender never includes its own id: the relay
/// attaches the id it assigned to the sending connection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Intent {
    Move {
        x: f32,
        y: f32,
        facing: Facing,
        movement: MovementState,
    },
    Update {
        update: PlayerUpdate,
    },
    Chat {
        message: String,
    },
}

/// One entry of the totally-ordered event stream.
///
/// Join carries the spawn position so that the randomness behind it is
/// computed exactly once (by the relay) and replayed verbatim everywhere.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum WorldEvent {
    Join {
        participant: ParticipantId,
        spawn_x: f32,
        spawn_y: f32,
    },
    Leave {
        participant: ParticipantId,
    },
    Move {
        participant: ParticipantId,
        x: f32,
        y: f32,
        facing: Facing,
        movement: MovementState,
    },
    Update {
        participant: ParticipantId,
        update: PlayerUpdate,
    },
    Chat {
        participant: ParticipantId,
        message: String,
    },
}

impl WorldEvent {
    pub fn participant(&self) -> ParticipantId {
        match self {
            WorldEvent::Join { participant, .. }
            | WorldEvent::Leave { participant }
            | WorldEvent::Move { participant, .. }
            | WorldEvent::Update { participant, .. }
            | WorldEvent::Chat { participant, .. } => *participant,
        }
    }

    /// Builds the event a given participant's intent translates to.
    pub fn from_intent(participant: ParticipantId, intent: Intent) -> Self {
        match intent {
            Intent::Move {
                x,
                y,
                facing,
                movement,
            } => WorldEvent::Move {
                participant,
                x,
                y,
                facing,
                movement,
            },
            Intent::Update { update } => WorldEvent::Update {
                participant,
                update,
            },
            Intent::Chat { message } => WorldEvent::Chat {
                participant,
                message,
            },
        }
    }
}

/// Catch-up state handed to a joining participant so it can reconstruct the
/// model mid-session before replaying live events.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub players: Vec<PlayerRecord>,
    pub game_started: bool,
    pub map: MapDimensions,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Hello {
        client_version: u32,
    },
    Intent {
        intent: Intent,
    },
    Ping,
    Goodbye,

    Welcome {
        participant: ParticipantId,
        snapshot: WorldSnapshot,
        /// Sequence number the first live event will carry.
        next_seq: u64,
        /// Logical clock at the moment the snapshot was taken.
        clock: u64,
    },
    Rejected {
        reason: String,
    },
    Event {
        seq: u64,
        clock: u64,
        event: WorldEvent,
    },
}
