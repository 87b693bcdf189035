use serde::{Deserialize, Serialize};

pub mod protocol;
pub mod world;

pub use protocol::{Intent, Packet, WorldEvent, WorldSnapshot};
pub use world::{Notification, ReplicatedWorld};

pub const MAP_WIDTH: f32 = 1280.0; // 40 tiles * 32px
pub const MAP_HEIGHT: f32 = 960.0; // 30 tiles * 32px
pub const SPAWN_RADIUS: f32 = 100.0;
pub const POSITION_EPSILON: f32 = 1.0;
pub const MOVE_INTERVAL_MS: u64 = 50;
pub const GLIDE_DURATION: f32 = 0.1;
pub const MIN_COLOR_CHANNEL: u8 = 0x40;
pub const PROTOCOL_VERSION: u32 = 1;

/// Opaque per-connection identifier assigned by the relay on join.
pub type ParticipantId = u32;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum MovementState {
    Idle,
    Moving,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct MapDimensions {
    pub width: f32,
    pub height: f32,
}

impl MapDimensions {
    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }
}

impl Default for MapDimensions {
    fn default() -> Self {
        Self {
            width: MAP_WIDTH,
            height: MAP_HEIGHT,
        }
    }
}

/// One record per connected participant.
///
/// Every field except `id` is mutated exclusively by applying ordered events
/// to [`ReplicatedWorld`]. `joined_at` and `last_update` are logical clock
/// values stamped by the relay, never local wall-clock time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: ParticipantId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub facing: Facing,
    pub movement: MovementState,
    pub custom_state: Option<String>,
    pub joined_at: u64,
    pub last_update: u64,
}

impl PlayerRecord {
    pub fn new(id: ParticipantId, x: f32, y: f32, joined_at: u64) -> Self {
        Self {
            id,
            name: format!("Player {}", id),
            x,
            y,
            facing: Facing::Down,
            movement: MovementState::Idle,
            custom_state: None,
            joined_at,
            last_update: joined_at,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.movement == MovementState::Moving
    }
}

/// Explicit tagged set of updatable fields, last-write-wins per field.
///
/// Replaces free-form partial-object merges: only the fields listed here can
/// be changed through an update event.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PlayerUpdate {
    pub name: Option<String>,
    pub custom_state: Option<String>,
}

impl PlayerUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.custom_state.is_none()
    }

    pub fn apply_to(&self, record: &mut PlayerRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(state) = &self.custom_state {
            record.custom_state = Some(state.clone());
        }
    }
}
