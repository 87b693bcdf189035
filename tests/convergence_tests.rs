//! Cross-crate convergence tests.
//!
//! These exercise the determinism contract without any networking: identical
//! event sequences must leave every component in identical state, and the
//! view-side layers must converge on what the model says.

use client::controller::{LocalController, Pose};
use client::reconciler::RemoteReconciler;
use relay::sequencer::{spawn_point, EventSequencer};
use shared::protocol::WorldEvent;
use shared::world::Notification;
use shared::{
    Facing, MapDimensions, MovementState, PlayerUpdate, ReplicatedWorld, GLIDE_DURATION,
    SPAWN_RADIUS,
};

fn join(participant: u32, x: f32, y: f32) -> WorldEvent {
    WorldEvent::Join {
        participant,
        spawn_x: x,
        spawn_y: y,
    }
}

fn moved(participant: u32, x: f32, y: f32) -> WorldEvent {
    WorldEvent::Move {
        participant,
        x,
        y,
        facing: Facing::Right,
        movement: MovementState::Moving,
    }
}

/// MODEL CONVERGENCE TESTS
mod model_tests {
    use super::*;

    /// A busy mixed sequence applied to many replicas leaves all of them
    /// identical, including the notifications they emitted along the way.
    #[test]
    fn replicas_converge_over_busy_sequence() {
        let events: Vec<(WorldEvent, u64)> = vec![
            (join(1, 620.0, 470.0), 10),
            (join(2, 700.0, 500.0), 20),
            (moved(1, 640.0, 470.0), 30),
            (moved(2, 690.0, 510.0), 35),
            (
                WorldEvent::Update {
                    participant: 1,
                    update: PlayerUpdate {
                        name: Some("Ada".to_string()),
                        custom_state: None,
                    },
                },
                40,
            ),
            (
                WorldEvent::Chat {
                    participant: 1,
                    message: "hello".to_string(),
                },
                45,
            ),
            (join(3, 580.0, 430.0), 50),
            (WorldEvent::Leave { participant: 2 }, 60),
            // Stale events for the departed participant.
            (moved(2, 0.0, 0.0), 61),
            (
                WorldEvent::Chat {
                    participant: 2,
                    message: "ghost".to_string(),
                },
                62,
            ),
            (moved(3, 600.0, 430.0), 70),
        ];

        let mut replicas: Vec<ReplicatedWorld> =
            (0..5).map(|_| ReplicatedWorld::new()).collect();

        for (event, clock) in &events {
            let mut emitted: Vec<Vec<Notification>> = Vec::new();
            for replica in &mut replicas {
                emitted.push(replica.apply(event, *clock));
            }
            for notifications in &emitted[1..] {
                assert_eq!(notifications, &emitted[0]);
            }
        }

        for replica in &replicas[1..] {
            assert_eq!(replica, &replicas[0]);
        }
        assert_eq!(replicas[0].len(), 2);
        assert_eq!(replicas[0].player(1).unwrap().name, "Ada");
    }

    /// A replica seeded from another's snapshot then fed the same tail stays
    /// converged. This is exactly the late-joiner path.
    #[test]
    fn snapshot_seeded_replica_tracks_the_original() {
        let mut original = ReplicatedWorld::new();
        original.apply(&join(1, 600.0, 450.0), 10);
        original.apply(&moved(1, 620.0, 450.0), 20);

        let mut late = ReplicatedWorld::from_snapshot(original.snapshot());
        assert_eq!(late, original);

        let tail: Vec<(WorldEvent, u64)> = vec![
            (join(2, 700.0, 500.0), 30),
            (moved(1, 640.0, 460.0), 40),
            (WorldEvent::Leave { participant: 1 }, 50),
        ];
        for (event, clock) in &tail {
            original.apply(event, *clock);
            late.apply(event, *clock);
        }
        assert_eq!(late, original);
    }

    /// Last empty leave clears the started flag, and the next join starts
    /// the world again.
    #[test]
    fn world_restarts_after_emptying() {
        let mut world = ReplicatedWorld::new();
        world.apply(&join(1, 600.0, 450.0), 10);
        world.apply(&WorldEvent::Leave { participant: 1 }, 20);
        assert!(!world.game_started());

        let notifications = world.apply(&join(2, 700.0, 500.0), 30);
        assert!(world.game_started());
        assert!(matches!(
            notifications[0],
            Notification::WorldStarted { .. }
        ));
    }
}

/// CONTROLLER THROTTLE TESTS
mod controller_tests {
    use super::*;

    /// Sampling at a simulated 120 Hz, the throttle still bounds intent
    /// output to one per 50 ms.
    #[test]
    fn throttle_holds_at_high_frame_rates() {
        let mut controller = LocalController::new();
        let mut sent = 0;

        for frame in 0..240u64 {
            let now_ms = frame * 1000 / 120;
            let pose = Pose {
                x: frame as f32 * 3.0,
                y: 0.0,
                facing: Facing::Right,
                movement: MovementState::Moving,
            };
            if controller.sample(pose, now_ms).is_some() {
                sent += 1;
            }
        }

        // Two seconds of continuous movement: at most 40 intents.
        assert!(sent <= 40, "sent {} intents", sent);
        assert!(sent >= 30);
    }

    /// An idle player costs zero bandwidth no matter how long it idles.
    #[test]
    fn idle_player_sends_nothing() {
        let mut controller = LocalController::new();
        let pose = Pose {
            x: 500.0,
            y: 500.0,
            facing: Facing::Down,
            movement: MovementState::Idle,
        };

        assert!(controller.sample(pose, 0).is_some());
        for frame in 1..600u64 {
            assert!(controller.sample(pose, frame * 16).is_none());
        }
    }
}

/// RECONCILER CONVERGENCE TESTS
mod reconciler_tests {
    use super::*;

    fn feed(reconciler: &mut RemoteReconciler, world: &mut ReplicatedWorld, event: &WorldEvent, clock: u64) {
        for notification in world.apply(event, clock) {
            reconciler.apply(&notification);
        }
    }

    /// Visuals mirror the model roster: one per remote player, none for the
    /// local player, destroyed on leave.
    #[test]
    fn visuals_mirror_the_roster() {
        let local_id = 1;
        let mut world = ReplicatedWorld::new();
        let mut reconciler = RemoteReconciler::new(local_id);

        feed(&mut reconciler, &mut world, &join(1, 600.0, 450.0), 10);
        feed(&mut reconciler, &mut world, &join(2, 700.0, 500.0), 20);
        feed(&mut reconciler, &mut world, &join(3, 500.0, 400.0), 30);

        assert_eq!(reconciler.len(), 2);
        assert!(reconciler.visual(1).is_none());

        feed(
            &mut reconciler,
            &mut world,
            &WorldEvent::Leave { participant: 2 },
            40,
        );
        assert_eq!(reconciler.len(), 1);
        assert!(reconciler.visual(2).is_none());
        assert!(reconciler.visual(3).is_some());
    }

    /// After the glide duration elapses, the rendered position equals the
    /// authoritative one exactly.
    #[test]
    fn glide_converges_on_authoritative_position() {
        let mut world = ReplicatedWorld::new();
        let mut reconciler = RemoteReconciler::new(1);

        feed(&mut reconciler, &mut world, &join(2, 600.0, 450.0), 10);
        feed(&mut reconciler, &mut world, &moved(2, 650.0, 470.0), 20);

        // Advance well past the transition in frame-sized steps.
        for _ in 0..30 {
            reconciler.tick(1.0 / 60.0);
        }

        let visual = reconciler.visual(2).unwrap();
        let record = world.player(2).unwrap();
        assert!((visual.x - record.x).abs() < 0.001);
        assert!((visual.y - record.y).abs() < 0.001);
    }

    /// A burst of rapid retargets still lands on the final position.
    #[test]
    fn rapid_retargets_end_at_final_target() {
        let mut world = ReplicatedWorld::new();
        let mut reconciler = RemoteReconciler::new(1);

        feed(&mut reconciler, &mut world, &join(2, 0.0, 0.0), 10);
        for step in 1..=10 {
            feed(
                &mut reconciler,
                &mut world,
                &moved(2, step as f32 * 20.0, 0.0),
                10 + step,
            );
            reconciler.tick(GLIDE_DURATION / 4.0);
        }
        for _ in 0..30 {
            reconciler.tick(1.0 / 60.0);
        }

        assert!((reconciler.visual(2).unwrap().x - 200.0).abs() < 0.001);
    }
}

/// RELAY SEQUENCING TESTS
mod sequencing_tests {
    use super::*;

    /// Sequence numbers and clocks from one sequencer are strictly ordered.
    #[test]
    fn stamps_are_strictly_ordered() {
        let mut sequencer = EventSequencer::new();
        let mut last_seq = 0;
        let mut last_clock = 0;

        for _ in 0..100 {
            let (seq, clock) = sequencer.stamp();
            assert!(seq > last_seq);
            assert!(clock >= last_clock);
            last_seq = seq;
            last_clock = clock;
        }
    }

    /// Spawn points land inside the spawn disc around the map center.
    #[test]
    fn spawn_points_bounded_by_radius() {
        let map = MapDimensions::default();
        let (cx, cy) = map.center();
        let mut rng = rand::thread_rng();

        for _ in 0..500 {
            let (x, y) = spawn_point(map, &mut rng);
            let distance = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
            assert!(distance <= SPAWN_RADIUS + 0.001);
            assert!(x >= 0.0 && x <= map.width);
            assert!(y >= 0.0 && y <= map.height);
        }
    }
}
