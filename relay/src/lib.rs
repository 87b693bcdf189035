//! # Ordering Relay Library
//!
//! The relay is the reflector at the center of a replicated-world session.
//! It holds no gameplay authority: clients do not ask it to simulate
//! anything. Its one job is to accept intents from participants and emit
//! them back to everyone as a single totally-ordered event stream, stamped
//! with a global sequence number and a logical clock.
//!
//! ## Core Responsibilities
//!
//! ### Total Ordering
//! Every accepted intent passes through one sequencer on one task, so the
//! stream each participant receives is identical by construction. Replaying
//! that stream is what keeps every participant's world copy converged.
//!
//! ### Membership
//! The relay assigns participant ids, tracks liveness, enforces the
//! capacity limit, and synthesizes join/leave events for connections,
//! disconnections, and timeouts.
//!
//! ### Late-Joiner Catch-Up
//! The relay maintains its own copy of the replicated world by applying the
//! same stream it broadcasts. A joiner receives that copy as a snapshot in
//! its welcome, positioned exactly at the stream point where its live
//! events begin.
//!
//! ## Module Organization
//!
//! - `participants`: connection table, id assignment, timeout eviction
//! - `sequencer`: sequence numbers, logical clock, spawn randomness
//! - `network`: UDP tasks and the ordering loop

pub mod network;
pub mod participants;
pub mod sequencer;
