//! # Participant Client Library
//!
//! Client-side implementation for the replicated-world session: joining a
//! relay, replaying the ordered event stream into a local model, publishing
//! local intents, and presenting remote players smoothly.
//!
//! ## Architecture Overview
//!
//! Every participant holds a full copy of the world and mutates it only by
//! applying the relay's totally-ordered event stream. The client never
//! mutates replicated state directly: local actions become intents on the
//! shared channel, come back as ordered events, and take effect when the
//! model applies them, the same way they take effect for everyone else.
//!
//! ### Event Bus (`bus`)
//! Topic-scoped synchronous publish/subscribe connecting model change
//! notifications to view-side handlers. Deliveries are ordered and
//! non-interleaved; a panicking handler cannot starve its peers.
//!
//! ### Local Controller (`controller`)
//! Samples the locally-predicted pose each frame and decides when it is
//! worth a move intent, throttling publication to ~20 updates/sec.
//!
//! ### Remote Reconciler (`reconciler`)
//! Keeps a decoupled visual state per remote player and glides it toward
//! each authoritative position over a short ease-out, instead of snapping.
//!
//! ### Session (`session`)
//! Lifecycle and plumbing: the join handshake, the ordered-ingestion cursor
//! that undoes UDP reordering, the run loop, and graceful teardown.

pub mod bus;
pub mod controller;
pub mod reconciler;
pub mod session;
