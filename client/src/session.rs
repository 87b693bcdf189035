//! Session lifecycle: join handshake, live event ingestion, teardown.
//!
//! The session owns the UDP socket to the relay, the local copy of the
//! replicated world, the notification bus and the remote reconciler, and
//! wires them together. Incoming `Event` packets pass through an
//! [`EventCursor`] that restores the relay's total order before anything
//! touches the model, so UDP reordering can never diverge this participant
//! from the others.

use crate::bus::{EventBus, SubscriptionId};
use crate::controller::{LocalController, MotionSource};
use crate::reconciler::RemoteReconciler;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::protocol::{Intent, Packet, WorldEvent};
use shared::world::{topics, Notification};
use shared::{ParticipantId, PlayerUpdate, ReplicatedWorld, PROTOCOL_VERSION};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

pub struct SessionConfig {
    pub relay_addr: String,
    pub display_name: Option<String>,
    pub join_timeout: Duration,
}

/// Reorders incoming events back into the relay's sequence.
///
/// Stale and duplicate sequence numbers are dropped; events arriving ahead of
/// a gap are held until the gap fills, then released in order. The relay
/// resends nothing, so a genuinely lost datagram stalls the cursor — with the
/// relay on a LAN or loopback that loss is rare enough to accept.
pub struct EventCursor {
    next_seq: u64,
    held: BTreeMap<u64, (u64, WorldEvent)>,
}

impl EventCursor {
    pub fn new(next_seq: u64) -> Self {
        Self {
            next_seq,
            held: BTreeMap::new(),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Offers one received event; returns every event that is now ready to
    /// apply, in sequence order.
    pub fn offer(&mut self, seq: u64, clock: u64, event: WorldEvent) -> Vec<(u64, u64, WorldEvent)> {
        if seq < self.next_seq {
            debug!("Dropping stale event seq {} (expecting {})", seq, self.next_seq);
            return Vec::new();
        }
        if seq > self.next_seq {
            self.held.insert(seq, (clock, event));
            return Vec::new();
        }

        let mut ready = vec![(seq, clock, event)];
        self.next_seq += 1;
        while let Some((clock, event)) = self.held.remove(&self.next_seq) {
            ready.push((self.next_seq, clock, event));
            self.next_seq += 1;
        }
        ready
    }
}

type ChatHandler = Box<dyn FnMut(&str, &str)>;

/// One participant's connection to a shared world.
///
/// Single-threaded by design: the bus and reconciler live behind `Rc`, and
/// the whole session is driven from one cooperative task.
pub struct Session {
    socket: UdpSocket,
    state: ConnectionState,
    local_id: ParticipantId,
    world: ReplicatedWorld,
    bus: EventBus<Notification>,
    reconciler: Rc<RefCell<RemoteReconciler>>,
    controller: LocalController,
    player_count: Rc<Cell<usize>>,
    cursor: EventCursor,
    subscriptions: Vec<SubscriptionId>,
    chat_handler: Rc<RefCell<Option<ChatHandler>>>,
    epoch: Instant,
    left: bool,
}

impl Session {
    /// Performs the full join handshake: hello, welcome, snapshot adoption.
    ///
    /// Live events that race ahead of the welcome are buffered and replayed
    /// through the cursor once the snapshot is in place, so a join during a
    /// busy session loses nothing.
    pub async fn join(config: SessionConfig) -> Result<Session, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(&config.relay_addr).await?;
        info!("Joining session at {}", config.relay_addr);

        let hello = serialize(&Packet::Hello {
            client_version: PROTOCOL_VERSION,
        })?;
        socket.send(&hello).await?;

        type Welcomed = (ParticipantId, shared::WorldSnapshot, u64, u64);

        let mut buffer = [0u8; 4096];
        let mut early_events: Vec<(u64, u64, WorldEvent)> = Vec::new();
        let handshake = async {
            loop {
                let len = socket.recv(&mut buffer).await?;
                match deserialize::<Packet>(&buffer[0..len]) {
                    Ok(Packet::Welcome {
                        participant,
                        snapshot,
                        next_seq,
                        clock,
                    }) => return Ok((participant, snapshot, next_seq, clock)),
                    Ok(Packet::Rejected { reason }) => {
                        return Err(format!("join rejected: {}", reason).into());
                    }
                    Ok(Packet::Event { seq, clock, event }) => {
                        early_events.push((seq, clock, event));
                    }
                    Ok(_) => warn!("Unexpected packet during handshake"),
                    Err(e) => warn!("Undecodable packet during handshake: {}", e),
                }
            }
        };

        let deadline: Result<Result<Welcomed, Box<dyn std::error::Error>>, _> =
            timeout(config.join_timeout, handshake).await;
        let (local_id, snapshot, next_seq, clock) = match deadline {
            Ok(result) => result?,
            Err(_) => {
                return Err("join timed out waiting for welcome".into());
            }
        };
        info!(
            "Welcomed as participant {} ({} players in session, clock {})",
            local_id,
            snapshot.players.len(),
            clock
        );

        let mut session = Session {
            socket,
            state: ConnectionState::Connected,
            local_id,
            world: ReplicatedWorld::from_snapshot(snapshot),
            bus: EventBus::new(),
            reconciler: Rc::new(RefCell::new(RemoteReconciler::new(local_id))),
            controller: LocalController::new(),
            player_count: Rc::new(Cell::new(0)),
            cursor: EventCursor::new(next_seq),
            subscriptions: Vec::new(),
            chat_handler: Rc::new(RefCell::new(None)),
            epoch: Instant::now(),
            left: false,
        };

        session.player_count.set(session.world.len());
        session.attach_view();
        session.seed_visuals();

        for (seq, clock, event) in early_events {
            session.ingest_event(seq, clock, event);
        }

        if let Some(name) = config.display_name {
            let intent = session.controller.update(PlayerUpdate {
                name: Some(name),
                custom_state: None,
            });
            session.send_intent(&intent).await;
        }

        Ok(session)
    }

    /// Subscribes the view-side handlers. The bus is the only path from
    /// applied events to the reconciler and the chat sink.
    fn attach_view(&mut self) {
        let reconciler = Rc::clone(&self.reconciler);
        let count = Rc::clone(&self.player_count);
        self.subscriptions.push(self.bus.subscribe(
            topics::PLAYER_JOINED,
            move |notification: &Notification| {
                if let Notification::PlayerJoined { roster, .. } = notification {
                    count.set(roster.len());
                }
                reconciler.borrow_mut().apply(notification);
            },
        ));

        let reconciler = Rc::clone(&self.reconciler);
        let count = Rc::clone(&self.player_count);
        self.subscriptions.push(self.bus.subscribe(
            topics::PLAYER_LEFT,
            move |notification: &Notification| {
                if let Notification::PlayerLeft { roster, .. } = notification {
                    count.set(roster.len());
                }
                reconciler.borrow_mut().apply(notification);
            },
        ));

        for topic in [topics::PLAYER_MOVED, topics::PLAYER_UPDATED] {
            let reconciler = Rc::clone(&self.reconciler);
            self.subscriptions.push(self.bus.subscribe(
                topic,
                move |notification: &Notification| {
                    reconciler.borrow_mut().apply(notification);
                },
            ));
        }

        self.subscriptions.push(self.bus.subscribe(
            topics::WORLD_STARTED,
            |notification: &Notification| {
                if let Notification::WorldStarted { map } = notification {
                    info!("World started ({}x{})", map.width, map.height);
                }
            },
        ));

        let chat_handler = Rc::clone(&self.chat_handler);
        self.subscriptions.push(self.bus.subscribe(
            topics::CHAT_RECEIVED,
            move |notification: &Notification| {
                if let Notification::ChatReceived { name, message, .. } = notification {
                    if let Some(handler) = chat_handler.borrow_mut().as_mut() {
                        handler(name, message);
                    }
                }
            },
        ));
    }

    /// Creates visuals for players already present in the adopted snapshot.
    /// They never produced join notifications on this bus.
    fn seed_visuals(&mut self) {
        let mut reconciler = self.reconciler.borrow_mut();
        for record in self.world.roster() {
            reconciler.on_player_joined(&record);
        }
    }

    fn ingest_event(&mut self, seq: u64, clock: u64, event: WorldEvent) {
        for (_, clock, event) in self.cursor.offer(seq, clock, event) {
            for notification in self.world.apply(&event, clock) {
                self.bus.publish(notification.topic(), notification);
            }
        }
    }

    async fn send_packet(&self, packet: &Packet) {
        match serialize(packet) {
            Ok(data) => {
                if let Err(e) = self.socket.send(&data).await {
                    error!("Error sending packet: {}", e);
                }
            }
            Err(e) => error!("Error serializing packet: {}", e),
        }
    }

    async fn send_intent(&self, intent: &Intent) {
        self.send_packet(&Packet::Intent {
            intent: intent.clone(),
        })
        .await;
    }

    /// Drives the session: ingests relay events, samples the motion source at
    /// frame rate, publishes throttled move intents, advances glides, pings.
    /// Runs until cancelled or the relay rejects us.
    pub async fn run(
        &mut self,
        motion: &mut dyn MotionSource,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut frame_interval = interval(Duration::from_millis(16));
        let mut ping_interval = interval(Duration::from_secs(1));
        let mut buffer = [0u8; 4096];

        loop {
            tokio::select! {
                result = self.socket.recv(&mut buffer) => {
                    match result {
                        Ok(len) => match deserialize::<Packet>(&buffer[0..len]) {
                            Ok(Packet::Event { seq, clock, event }) => {
                                self.ingest_event(seq, clock, event);
                            }
                            Ok(Packet::Rejected { reason }) => {
                                warn!("Relay rejected session: {}", reason);
                                self.state = ConnectionState::Failed;
                                return Ok(());
                            }
                            Ok(_) => warn!("Unexpected packet type"),
                            Err(e) => warn!("Undecodable packet: {}", e),
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = frame_interval.tick() => {
                    let dt = 1.0 / 60.0;
                    let pose = motion.tick(dt);
                    let now_ms = self.epoch.elapsed().as_millis() as u64;
                    if let Some(intent) = self.controller.sample(pose, now_ms) {
                        self.send_intent(&intent).await;
                    }
                    self.reconciler.borrow_mut().tick(dt);
                },

                _ = ping_interval.tick() => {
                    self.send_packet(&Packet::Ping).await;
                },
            }
        }
    }

    pub async fn send_chat(&self, message: impl Into<String>) {
        self.send_intent(&self.controller.chat(message)).await;
    }

    pub async fn send_update(&self, update: PlayerUpdate) {
        if update.is_empty() {
            debug!("Skipping empty update intent");
            return;
        }
        self.send_intent(&self.controller.update(update)).await;
    }

    /// Graceful teardown: view detaches before the goodbye goes out, so no
    /// handler observes a half-dismantled session. Safe to call twice.
    pub async fn leave(&mut self) {
        if self.left {
            return;
        }
        self.left = true;

        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
        self.bus.clear();
        self.reconciler.borrow_mut().clear();

        self.send_packet(&Packet::Goodbye).await;
        info!("Left session");
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn local_id(&self) -> ParticipantId {
        self.local_id
    }

    pub fn player_count(&self) -> usize {
        self.player_count.get()
    }

    pub fn world(&self) -> &ReplicatedWorld {
        &self.world
    }

    pub fn reconciler(&self) -> Rc<RefCell<RemoteReconciler>> {
        Rc::clone(&self.reconciler)
    }

    pub fn bus(&self) -> EventBus<Notification> {
        self.bus.clone()
    }

    /// Installs the chat sink. Called with (display name, message) for every
    /// ordered chat event, including the local player's own echo.
    pub fn on_chat(&self, handler: impl FnMut(&str, &str) + 'static) {
        *self.chat_handler.borrow_mut() = Some(Box::new(handler));
    }
}
