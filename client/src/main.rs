mod bus;
mod controller;
mod reconciler;
mod session;

use clap::Parser;
use controller::{MotionSource, Pose};
use log::info;
use rand::Rng;
use session::{Session, SessionConfig};
use shared::{Facing, MapDimensions, MovementState};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay address to join
    #[arg(short = 'r', long, default_value = "127.0.0.1:8080")]
    relay: String,

    /// Display name announced after joining
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Walk speed in world units per second
    #[arg(short = 's', long, default_value = "120.0")]
    speed: f32,

    /// Seconds to wait for the relay's welcome
    #[arg(long, default_value = "5")]
    join_timeout: u64,
}

/// Headless stand-in for a player: wanders the map, occasionally pausing or
/// picking a new direction. Exercises the full intent path without a real
/// input device.
struct Wanderer {
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
    speed: f32,
    map: MapDimensions,
    until_change: f32,
    paused: bool,
}

impl Wanderer {
    fn new(x: f32, y: f32, speed: f32, map: MapDimensions) -> Self {
        let mut wanderer = Wanderer {
            x,
            y,
            dx: 0.0,
            dy: 0.0,
            speed,
            map,
            until_change: 0.0,
            paused: false,
        };
        wanderer.pick_direction();
        wanderer
    }

    fn pick_direction(&mut self) {
        let mut rng = rand::thread_rng();
        self.paused = rng.gen_bool(0.25);
        if self.paused {
            self.dx = 0.0;
            self.dy = 0.0;
        } else {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            self.dx = angle.cos();
            self.dy = angle.sin();
        }
        self.until_change = rng.gen_range(0.5..2.5);
    }

    fn facing(&self) -> Facing {
        if self.dx.abs() >= self.dy.abs() {
            if self.dx >= 0.0 {
                Facing::Right
            } else {
                Facing::Left
            }
        } else if self.dy >= 0.0 {
            Facing::Down
        } else {
            Facing::Up
        }
    }
}

impl MotionSource for Wanderer {
    fn tick(&mut self, dt: f32) -> Pose {
        self.until_change -= dt;
        if self.until_change <= 0.0 {
            self.pick_direction();
        }

        self.x = (self.x + self.dx * self.speed * dt).clamp(0.0, self.map.width);
        self.y = (self.y + self.dy * self.speed * dt).clamp(0.0, self.map.height);

        Pose {
            x: self.x,
            y: self.y,
            facing: self.facing(),
            movement: if self.paused {
                MovementState::Idle
            } else {
                MovementState::Moving
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Joining relay at: {}", args.relay);

    let mut session = Session::join(SessionConfig {
        relay_addr: args.relay,
        display_name: args.name,
        join_timeout: Duration::from_secs(args.join_timeout),
    })
    .await?;

    session.on_chat(|name, message| {
        info!("[chat] {}: {}", name, message);
    });
    session.send_chat("hello, world").await;

    let map = session.world().map();
    let (start_x, start_y) = session
        .world()
        .player(session.local_id())
        .map(|record| (record.x, record.y))
        .unwrap_or_else(|| map.center());
    let mut wanderer = Wanderer::new(start_x, start_y, args.speed, map);

    tokio::select! {
        result = session.run(&mut wanderer) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, leaving session");
        }
    }

    session.leave().await;
    Ok(())
}
