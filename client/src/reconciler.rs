//! View-side reconciliation of remote players.
//!
//! Authoritative positions arrive at roughly 20 Hz; snapping a sprite to each
//! sample makes remote avatars teleport. The reconciler keeps a decoupled
//! visual state per remote player and glides it toward every new
//! authoritative position over a short ease-out transition, so remote motion
//! reads as continuous. The local player is never tracked here — its visuals
//! come straight from predicted motion, which would otherwise lag behind its
//! own echo.

use log::debug;
use rand::Rng;
use shared::world::Notification;
use shared::{ParticipantId, PlayerRecord, GLIDE_DURATION, MIN_COLOR_CHANNEL};
use std::collections::HashMap;

/// Tint shift applied per channel while a remote player is moving.
const MOVING_TINT_SHIFT: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Random avatar color with every channel above [`MIN_COLOR_CHANNEL`],
    /// so no avatar comes out near-black against the tilemap.
    pub fn random_bright(rng: &mut impl Rng) -> Self {
        Self {
            r: rng.gen_range(MIN_COLOR_CHANNEL..=u8::MAX),
            g: rng.gen_range(MIN_COLOR_CHANNEL..=u8::MAX),
            b: rng.gen_range(MIN_COLOR_CHANNEL..=u8::MAX),
        }
    }

    pub fn darkened(self, amount: u8) -> Self {
        Self {
            r: self.r.saturating_sub(amount),
            g: self.g.saturating_sub(amount),
            b: self.b.saturating_sub(amount),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Glide {
    from_x: f32,
    from_y: f32,
    to_x: f32,
    to_y: f32,
    elapsed: f32,
}

fn ease_out(t: f32) -> f32 {
    1.0 - (1.0 - t) * (1.0 - t)
}

/// Render target for one remote player, decoupled from the authoritative
/// record so interpolation never fights event application.
#[derive(Debug)]
pub struct RemoteVisualState {
    pub x: f32,
    pub y: f32,
    pub tint: Color,
    pub label: String,
    base_color: Color,
    glide: Option<Glide>,
}

impl RemoteVisualState {
    fn new(record: &PlayerRecord, base_color: Color) -> Self {
        Self {
            x: record.x,
            y: record.y,
            tint: base_color,
            label: record.name.clone(),
            base_color,
            glide: None,
        }
    }

    pub fn base_color(&self) -> Color {
        self.base_color
    }

    pub fn is_gliding(&self) -> bool {
        self.glide.is_some()
    }

    fn retarget(&mut self, x: f32, y: f32) {
        self.glide = Some(Glide {
            from_x: self.x,
            from_y: self.y,
            to_x: x,
            to_y: y,
            elapsed: 0.0,
        });
    }

    fn refresh_cosmetics(&mut self, record: &PlayerRecord) {
        self.tint = if record.is_moving() {
            self.base_color.darkened(MOVING_TINT_SHIFT)
        } else {
            self.base_color
        };
        if self.label != record.name {
            self.label = record.name.clone();
        }
    }

    fn tick(&mut self, dt: f32) {
        let Some(mut glide) = self.glide.take() else {
            return;
        };

        glide.elapsed += dt;
        let t = (glide.elapsed / GLIDE_DURATION).min(1.0);
        let k = ease_out(t);
        self.x = glide.from_x + (glide.to_x - glide.from_x) * k;
        self.y = glide.from_y + (glide.to_y - glide.from_y) * k;

        if t < 1.0 {
            self.glide = Some(glide);
        }
    }
}

/// Owns every remote player's visual state and keeps it converging on the
/// replicated roster.
pub struct RemoteReconciler {
    local_id: ParticipantId,
    visuals: HashMap<ParticipantId, RemoteVisualState>,
}

impl RemoteReconciler {
    pub fn new(local_id: ParticipantId) -> Self {
        Self {
            local_id,
            visuals: HashMap::new(),
        }
    }

    /// Routes a model notification to the matching handler. World-started and
    /// chat notifications carry nothing the reconciler renders.
    pub fn apply(&mut self, notification: &Notification) {
        match notification {
            Notification::PlayerJoined { player, .. } => self.on_player_joined(player),
            Notification::PlayerLeft { participant, .. } => self.on_player_left(*participant),
            Notification::PlayerMoved {
                participant,
                player,
            } => self.on_player_moved(*participant, player),
            Notification::PlayerUpdated {
                participant,
                player,
            } => self.on_player_updated(*participant, player),
            Notification::WorldStarted { .. } | Notification::ChatReceived { .. } => {}
        }
    }

    pub fn on_player_joined(&mut self, player: &PlayerRecord) {
        if player.id == self.local_id || self.visuals.contains_key(&player.id) {
            return;
        }
        let color = Color::random_bright(&mut rand::thread_rng());
        self.visuals
            .insert(player.id, RemoteVisualState::new(player, color));
        debug!("Created visual for remote player {}", player.id);
    }

    pub fn on_player_moved(&mut self, participant: ParticipantId, player: &PlayerRecord) {
        if participant == self.local_id {
            return;
        }
        let Some(visual) = self.visuals.get_mut(&participant) else {
            // Ordering race on join: drop this single update, the visual
            // appears once the join notification lands.
            debug!("No visual yet for player {}, dropping move", participant);
            return;
        };
        visual.retarget(player.x, player.y);
        visual.refresh_cosmetics(player);
    }

    pub fn on_player_updated(&mut self, participant: ParticipantId, player: &PlayerRecord) {
        if participant == self.local_id {
            return;
        }
        let Some(visual) = self.visuals.get_mut(&participant) else {
            debug!("No visual yet for player {}, dropping update", participant);
            return;
        };
        visual.refresh_cosmetics(player);
    }

    /// Leave destroys the visual and its label immediately — no glide-out.
    pub fn on_player_left(&mut self, participant: ParticipantId) {
        if self.visuals.remove(&participant).is_some() {
            debug!("Destroyed visual for remote player {}", participant);
        }
    }

    /// Advances all in-flight glides by one frame.
    pub fn tick(&mut self, dt: f32) {
        for visual in self.visuals.values_mut() {
            visual.tick(dt);
        }
    }

    pub fn visual(&self, participant: ParticipantId) -> Option<&RemoteVisualState> {
        self.visuals.get(&participant)
    }

    pub fn visuals(&self) -> impl Iterator<Item = (&ParticipantId, &RemoteVisualState)> {
        self.visuals.iter()
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }

    pub fn clear(&mut self) {
        self.visuals.clear();
    }
}
