//! The replicated world model.
//!
//! Every participant owns one [`ReplicatedWorld`] instance and feeds it the
//! same totally-ordered event stream. Applying an event is a pure function of
//! (current state, event, logical clock): no wall-clock reads, no local
//! randomness. Two instances fed the same sequence therefore stay
//! field-for-field identical after every event, which is the correctness
//! property the view layers build on.

use crate::protocol::{WorldEvent, WorldSnapshot};
use crate::{MapDimensions, ParticipantId, PlayerRecord, PlayerUpdate};

/// Stable topic names for change notifications on the view bus.
pub mod topics {
    pub const WORLD_STARTED: &str = "world-started";
    pub const PLAYER_JOINED: &str = "player-joined";
    pub const PLAYER_LEFT: &str = "player-left";
    pub const PLAYER_MOVED: &str = "player-moved";
    pub const PLAYER_UPDATED: &str = "player-updated";
    pub const CHAT_RECEIVED: &str = "chat-received";
}

/// Change notification emitted by event application.
///
/// Roster snapshots are sorted by id so they compare equal across
/// participants regardless of map iteration order.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    WorldStarted {
        map: MapDimensions,
    },
    PlayerJoined {
        player: PlayerRecord,
        roster: Vec<PlayerRecord>,
    },
    PlayerLeft {
        participant: ParticipantId,
        roster: Vec<PlayerRecord>,
    },
    PlayerMoved {
        participant: ParticipantId,
        player: PlayerRecord,
    },
    PlayerUpdated {
        participant: ParticipantId,
        player: PlayerRecord,
    },
    ChatReceived {
        participant: ParticipantId,
        name: String,
        message: String,
        timestamp: u64,
    },
}

impl Notification {
    pub fn topic(&self) -> &'static str {
        match self {
            Notification::WorldStarted { .. } => topics::WORLD_STARTED,
            Notification::PlayerJoined { .. } => topics::PLAYER_JOINED,
            Notification::PlayerLeft { .. } => topics::PLAYER_LEFT,
            Notification::PlayerMoved { .. } => topics::PLAYER_MOVED,
            Notification::PlayerUpdated { .. } => topics::PLAYER_UPDATED,
            Notification::ChatReceived { .. } => topics::CHAT_RECEIVED,
        }
    }
}

/// Roster plus world metadata, mutated only through [`ReplicatedWorld::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicatedWorld {
    players: std::collections::HashMap<ParticipantId, PlayerRecord>,
    game_started: bool,
    map: MapDimensions,
}

impl ReplicatedWorld {
    pub fn new() -> Self {
        Self {
            players: std::collections::HashMap::new(),
            game_started: false,
            map: MapDimensions::default(),
        }
    }

    pub fn from_snapshot(snapshot: WorldSnapshot) -> Self {
        Self {
            players: snapshot
                .players
                .into_iter()
                .map(|record| (record.id, record))
                .collect(),
            game_started: snapshot.game_started,
            map: snapshot.map,
        }
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            players: self.roster(),
            game_started: self.game_started,
            map: self.map,
        }
    }

    pub fn player(&self, id: ParticipantId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn game_started(&self) -> bool {
        self.game_started
    }

    pub fn map(&self) -> MapDimensions {
        self.map
    }

    /// Full roster snapshot, sorted by id.
    pub fn roster(&self) -> Vec<PlayerRecord> {
        let mut roster: Vec<PlayerRecord> = self.players.values().cloned().collect();
        roster.sort_by_key(|record| record.id);
        roster
    }

    /// Applies one ordered event, returning the notifications it produced in
    /// emission order. Events addressed to absent ids are silently dropped;
    /// a late move racing a leave must not diverge the roster.
    pub fn apply(&mut self, event: &WorldEvent, clock: u64) -> Vec<Notification> {
        match event {
            WorldEvent::Join {
                participant,
                spawn_x,
                spawn_y,
            } => self.apply_join(*participant, *spawn_x, *spawn_y, clock),
            WorldEvent::Leave { participant } => self.apply_leave(*participant),
            WorldEvent::Move {
                participant,
                x,
                y,
                facing,
                movement,
            } => self.apply_move(*participant, *x, *y, *facing, *movement, clock),
            WorldEvent::Update {
                participant,
                update,
            } => self.apply_update(*participant, update, clock),
            WorldEvent::Chat {
                participant,
                message,
            } => self.apply_chat(*participant, message, clock),
        }
    }

    fn apply_join(
        &mut self,
        participant: ParticipantId,
        spawn_x: f32,
        spawn_y: f32,
        clock: u64,
    ) -> Vec<Notification> {
        if self.players.contains_key(&participant) {
            return Vec::new();
        }

        let was_empty = self.players.is_empty();
        let record = PlayerRecord::new(participant, spawn_x, spawn_y, clock);
        self.players.insert(participant, record.clone());

        let mut notifications = Vec::new();
        if was_empty {
            self.game_started = true;
            notifications.push(Notification::WorldStarted { map: self.map });
        }
        notifications.push(Notification::PlayerJoined {
            player: record,
            roster: self.roster(),
        });
        notifications
    }

    fn apply_leave(&mut self, participant: ParticipantId) -> Vec<Notification> {
        if self.players.remove(&participant).is_none() {
            return Vec::new();
        }

        if self.players.is_empty() {
            self.game_started = false;
        }
        vec![Notification::PlayerLeft {
            participant,
            roster: self.roster(),
        }]
    }

    fn apply_move(
        &mut self,
        participant: ParticipantId,
        x: f32,
        y: f32,
        facing: crate::Facing,
        movement: crate::MovementState,
        clock: u64,
    ) -> Vec<Notification> {
        let record = match self.players.get_mut(&participant) {
            Some(record) => record,
            None => return Vec::new(),
        };

        record.x = x;
        record.y = y;
        record.facing = facing;
        record.movement = movement;
        record.last_update = clock;

        vec![Notification::PlayerMoved {
            participant,
            player: record.clone(),
        }]
    }

    fn apply_update(
        &mut self,
        participant: ParticipantId,
        update: &PlayerUpdate,
        clock: u64,
    ) -> Vec<Notification> {
        let record = match self.players.get_mut(&participant) {
            Some(record) => record,
            None => return Vec::new(),
        };

        update.apply_to(record);
        record.last_update = clock;

        vec![Notification::PlayerUpdated {
            participant,
            player: record.clone(),
        }]
    }

    fn apply_chat(
        &mut self,
        participant: ParticipantId,
        message: &str,
        clock: u64,
    ) -> Vec<Notification> {
        // Chat is never persisted in the roster; the notification carries the
        // record's current display name.
        let record = match self.players.get(&participant) {
            Some(record) => record,
            None => return Vec::new(),
        };

        vec![Notification::ChatReceived {
            participant,
            name: record.name.clone(),
            message: message.to_string(),
            timestamp: clock,
        }]
    }
}

impl Default for ReplicatedWorld {
    fn default() -> Self {
        Self::new()
    }
}
