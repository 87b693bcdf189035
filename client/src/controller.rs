//! Local player intent publication with change detection and throttling.
//!
//! The controller never computes motion itself: input polling and predicted
//! physics are external collaborators. Each rendering tick the caller samples
//! the predicted pose and offers it here; the controller decides whether the
//! change is worth a `Move` intent on the shared channel.

use shared::protocol::Intent;
use shared::{Facing, MovementState, PlayerUpdate, MOVE_INTERVAL_MS, POSITION_EPSILON};

/// Snapshot of the locally-predicted motion state for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub facing: Facing,
    pub movement: MovementState,
}

/// Source of locally-predicted motion, driven at rendering-frame granularity
/// by whoever owns the frame loop.
pub trait MotionSource {
    fn tick(&mut self, dt: f32) -> Pose;
}

/// Decides when the local pose is worth broadcasting.
///
/// A `Move` intent goes out when the pose moved more than
/// [`POSITION_EPSILON`] on either axis or facing/movement changed, and at
/// least [`MOVE_INTERVAL_MS`] elapsed since the previous intent. That bounds
/// bus traffic to ~20 updates/sec per player regardless of frame rate. Chat
/// and field updates are never throttled.
pub struct LocalController {
    last_broadcast: Option<Pose>,
    last_sent_ms: u64,
}

impl LocalController {
    pub fn new() -> Self {
        Self {
            last_broadcast: None,
            last_sent_ms: 0,
        }
    }

    /// Offers the current predicted pose; returns a `Move` intent when it
    /// should be published. `now_ms` is any monotonic millisecond reading —
    /// it only feeds the local throttle, never replicated state.
    pub fn sample(&mut self, pose: Pose, now_ms: u64) -> Option<Intent> {
        let changed = match &self.last_broadcast {
            None => true,
            Some(prev) => {
                (pose.x - prev.x).abs() > POSITION_EPSILON
                    || (pose.y - prev.y).abs() > POSITION_EPSILON
                    || pose.facing != prev.facing
                    || pose.movement != prev.movement
            }
        };

        if !changed {
            return None;
        }

        if self.last_broadcast.is_some()
            && now_ms.saturating_sub(self.last_sent_ms) < MOVE_INTERVAL_MS
        {
            return None;
        }

        self.last_broadcast = Some(pose);
        self.last_sent_ms = now_ms;

        Some(Intent::Move {
            x: pose.x,
            y: pose.y,
            facing: pose.facing,
            movement: pose.movement,
        })
    }

    /// Chat intents are published immediately on user action, unthrottled.
    pub fn chat(&self, message: impl Into<String>) -> Intent {
        Intent::Chat {
            message: message.into(),
        }
    }

    /// Field-update intents are published immediately, unthrottled.
    pub fn update(&self, update: PlayerUpdate) -> Intent {
        Intent::Update { update }
    }

    pub fn last_broadcast(&self) -> Option<&Pose> {
        self.last_broadcast.as_ref()
    }
}

impl Default for LocalController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(x: f32, y: f32) -> Pose {
        Pose {
            x,
            y,
            facing: Facing::Down,
            movement: MovementState::Moving,
        }
    }

    #[test]
    fn test_first_sample_always_broadcasts() {
        let mut controller = LocalController::new();
        assert!(controller.sample(pose(100.0, 100.0), 0).is_some());
    }

    #[test]
    fn test_sub_epsilon_motion_is_suppressed() {
        let mut controller = LocalController::new();
        controller.sample(pose(100.0, 100.0), 0);

        // 0.5 units on each axis is below the 1-unit epsilon.
        assert!(controller.sample(pose(100.5, 100.5), 1000).is_none());
        // Just over the epsilon on one axis qualifies.
        assert!(controller.sample(pose(101.1, 100.0), 2000).is_some());
    }

    #[test]
    fn test_facing_change_bypasses_epsilon() {
        let mut controller = LocalController::new();
        controller.sample(pose(100.0, 100.0), 0);

        let mut turned = pose(100.0, 100.0);
        turned.facing = Facing::Left;
        assert!(controller.sample(turned, 1000).is_some());
    }

    #[test]
    fn test_movement_state_change_bypasses_epsilon() {
        let mut controller = LocalController::new();
        controller.sample(pose(100.0, 100.0), 0);

        let mut stopped = pose(100.0, 100.0);
        stopped.movement = MovementState::Idle;
        assert!(controller.sample(stopped, 1000).is_some());
    }

    #[test]
    fn test_throttle_bounds_emission_rate() {
        let mut controller = LocalController::new();

        // Continuous movement sampled at 60 Hz for one second.
        let mut sent = 0;
        let mut x = 0.0;
        for frame in 0..60 {
            x += 5.0;
            let now_ms = frame * 1000 / 60;
            if controller.sample(pose(x, 0.0), now_ms).is_some() {
                sent += 1;
            }
        }

        assert!(sent <= 20, "sent {} intents, throttle allows at most 20", sent);
        assert!(sent >= 15, "throttle should still let most updates through");
    }

    #[test]
    fn test_unchanged_pose_never_rebroadcast() {
        let mut controller = LocalController::new();
        controller.sample(pose(100.0, 100.0), 0);

        for t in 1..100u64 {
            assert!(controller.sample(pose(100.0, 100.0), t * 100).is_none());
        }
    }

    #[test]
    fn test_chat_and_update_are_unthrottled() {
        let controller = LocalController::new();

        match controller.chat("hello") {
            Intent::Chat { message } => assert_eq!(message, "hello"),
            other => panic!("Unexpected intent: {:?}", other),
        }

        let update = PlayerUpdate {
            name: Some("Ada".to_string()),
            custom_state: None,
        };
        match controller.update(update.clone()) {
            Intent::Update { update: u } => assert_eq!(u, update),
            other => panic!("Unexpected intent: {:?}", other),
        }
    }
}
