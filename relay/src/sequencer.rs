//! Event sequencing and session randomness.
//!
//! The sequencer is the heart of the ordering guarantee: every event the
//! relay broadcasts passes through [`EventSequencer::stamp`], which assigns
//! the next global sequence number and the logical-clock reading. Because
//! stamping is the single choke point, the stream every participant receives
//! is one total order by construction.
//!
//! Session randomness lives here too: a join's spawn position is drawn once,
//! on the relay, and distributed inside the join event. Participants replay
//! the value instead of rolling their own, which keeps the replicated worlds
//! identical without seeded RNG gymnastics.

use rand::Rng;
use shared::{MapDimensions, SPAWN_RADIUS};
use std::time::Instant;

/// Monotonic sequence and logical-clock source for one relay run.
pub struct EventSequencer {
    next_seq: u64,
    epoch: Instant,
}

impl EventSequencer {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            epoch: Instant::now(),
        }
    }

    /// Milliseconds since the relay started. This is the logical clock every
    /// replicated timestamp derives from; participants never read their own.
    pub fn clock_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Sequence number the next stamped event will carry.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Assigns the next (seq, clock) pair.
    pub fn stamp(&mut self) -> (u64, u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        (seq, self.clock_ms())
    }
}

impl Default for EventSequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Draws a spawn position uniformly within [`SPAWN_RADIUS`] of the map
/// center. The sqrt on the distance keeps the distribution uniform over the
/// disc area rather than clustered at the center.
pub fn spawn_point(map: MapDimensions, rng: &mut impl Rng) -> (f32, f32) {
    let (cx, cy) = map.center();
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let distance = SPAWN_RADIUS * rng.gen::<f32>().sqrt();
    (cx + distance * angle.cos(), cy + distance * angle.sin())
}
