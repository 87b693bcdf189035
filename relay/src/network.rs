//! Relay network layer: UDP plumbing and the event-ordering loop.
//!
//! The relay is not a game server. It validates packets at the boundary,
//! assigns participant ids, and turns accepted intents into stamped events on
//! one totally-ordered stream. It keeps its own [`ReplicatedWorld`] purely so
//! a late joiner can be handed a snapshot consistent with the stream position
//! in its welcome.

use crate::participants::ParticipantTable;
use crate::sequencer::{spawn_point, EventSequencer};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::protocol::{Packet, WorldEvent};
use shared::{Intent, ParticipantId, ReplicatedWorld, PROTOCOL_VERSION};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from background tasks to the ordering loop.
#[derive(Debug)]
pub enum RelayMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ParticipantTimeout {
        participant: ParticipantId,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the ordering loop to the network sender task.
#[derive(Debug)]
pub enum OutboundMessage {
    Send { packet: Packet, addr: SocketAddr },
    Broadcast { packet: Packet },
}

/// The ordering relay: one of these per session.
pub struct Relay {
    socket: Arc<UdpSocket>,
    participants: Arc<RwLock<ParticipantTable>>,
    world: ReplicatedWorld,
    sequencer: EventSequencer,

    relay_tx: mpsc::UnboundedSender<RelayMessage>,
    relay_rx: mpsc::UnboundedReceiver<RelayMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Relay {
    pub async fn new(addr: &str, max_participants: usize) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Relay listening on {}", socket.local_addr()?);

        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Relay {
            socket,
            participants: Arc::new(RwLock::new(ParticipantTable::new(max_participants))),
            world: ReplicatedWorld::new(),
            sequencer: EventSequencer::new(),
            relay_tx,
            relay_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    /// Actual bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns the task that listens for incoming packets.
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let relay_tx = self.relay_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 4096];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                relay_tx.send(RelayMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to ordering loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outbound queue. Sending through this
    /// single task preserves the stream order per destination.
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let participants = Arc::clone(&self.participants);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::Send { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::Broadcast { packet } => {
                        let addrs = {
                            let participants_guard = participants.read().await;
                            participants_guard.addrs()
                        };

                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to broadcast to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns the task that evicts silent participants.
    fn spawn_timeout_checker(&self) {
        let participants = Arc::clone(&self.participants);
        let relay_tx = self.relay_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut participants_guard = participants.write().await;
                    participants_guard.check_timeouts()
                };

                for participant in timed_out {
                    if let Err(e) = relay_tx.send(RelayMessage::ParticipantTimeout { participant })
                    {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> io::Result<()> {
        let data =
            serialize(packet).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.outbound_tx.send(OutboundMessage::Send { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet) {
        if let Err(e) = self.outbound_tx.send(OutboundMessage::Broadcast { packet }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Stamps one event into the global order, applies it to the relay's own
    /// world copy, and fans it out to every participant. This is the only
    /// place events enter the stream.
    fn sequence_and_broadcast(&mut self, event: WorldEvent) {
        let (seq, clock) = self.sequencer.stamp();
        let notifications = self.world.apply(&event, clock);
        debug!(
            "Sequenced event {} at clock {} ({} notifications)",
            seq,
            clock,
            notifications.len()
        );
        self.broadcast_packet(Packet::Event { seq, clock, event });
    }

    /// Boundary validation and translation of one incoming packet.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Hello { client_version } => {
                self.handle_hello(client_version, addr).await;
            }

            Packet::Intent { intent } => {
                let participant = {
                    let mut participants = self.participants.write().await;
                    participants.touch_addr(addr)
                };

                let Some(participant) = participant else {
                    debug!("Dropping intent from unregistered address {}", addr);
                    return;
                };

                if let Some(reason) = Self::rejectable(&intent) {
                    debug!(
                        "Dropping intent from participant {}: {}",
                        participant, reason
                    );
                    return;
                }

                self.sequence_and_broadcast(WorldEvent::from_intent(participant, intent));
            }

            Packet::Ping => {
                let mut participants = self.participants.write().await;
                if participants.touch_addr(addr).is_none() {
                    debug!("Ping from unregistered address {}", addr);
                }
            }

            Packet::Goodbye => {
                let participant = {
                    let participants = self.participants.read().await;
                    participants.find_by_addr(addr)
                };

                if let Some(participant) = participant {
                    {
                        let mut participants = self.participants.write().await;
                        participants.remove(participant);
                    }
                    self.sequence_and_broadcast(WorldEvent::Leave { participant });
                }
            }

            _ => {
                warn!("Unexpected packet type from {}", addr);
            }
        }
    }

    async fn handle_hello(&mut self, client_version: u32, addr: SocketAddr) {
        info!("Join request from {} (version: {})", addr, client_version);

        if client_version != PROTOCOL_VERSION {
            self.send_packet(
                Packet::Rejected {
                    reason: format!(
                        "unsupported protocol version {} (relay speaks {})",
                        client_version, PROTOCOL_VERSION
                    ),
                },
                addr,
            );
            return;
        }

        // A hello from an already-registered address supersedes the old
        // connection: the stale participant leaves, the new one joins fresh.
        let existing = {
            let participants = self.participants.read().await;
            participants.find_by_addr(addr)
        };
        if let Some(existing) = existing {
            info!("Superseding participant {} at {}", existing, addr);
            {
                let mut participants = self.participants.write().await;
                participants.remove(existing);
            }
            self.sequence_and_broadcast(WorldEvent::Leave {
                participant: existing,
            });
        }

        let participant = {
            let mut participants = self.participants.write().await;
            participants.add(addr)
        };

        let Some(participant) = participant else {
            self.send_packet(
                Packet::Rejected {
                    reason: "relay full".to_string(),
                },
                addr,
            );
            return;
        };

        // The welcome snapshot precedes the newcomer's own join in the
        // stream: the joiner learns about itself the same way everyone else
        // does, from the join event.
        self.send_packet(
            Packet::Welcome {
                participant,
                snapshot: self.world.snapshot(),
                next_seq: self.sequencer.next_seq(),
                clock: self.sequencer.clock_ms(),
            },
            addr,
        );

        let (spawn_x, spawn_y) = {
            let mut rng = rand::thread_rng();
            spawn_point(self.world.map(), &mut rng)
        };
        self.sequence_and_broadcast(WorldEvent::Join {
            participant,
            spawn_x,
            spawn_y,
        });
    }

    /// Boundary checks on intents that never deserve a slot in the stream.
    fn rejectable(intent: &Intent) -> Option<&'static str> {
        match intent {
            Intent::Update { update } if update.is_empty() => Some("empty update"),
            Intent::Chat { message } if message.trim().is_empty() => Some("empty chat message"),
            _ => None,
        }
    }

    /// Main ordering loop. Everything that mutates the stream funnels
    /// through here, single-threaded by construction.
    pub async fn run(&mut self) -> io::Result<()> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Relay started successfully");

        while let Some(message) = self.relay_rx.recv().await {
            match message {
                RelayMessage::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr).await;
                }
                RelayMessage::ParticipantTimeout { participant } => {
                    info!("Participant {} timed out", participant);
                    self.sequence_and_broadcast(WorldEvent::Leave { participant });
                }
                RelayMessage::Shutdown => {
                    info!("Relay shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
