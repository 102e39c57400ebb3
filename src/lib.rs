//! Deterministic, event-driven simulator for data-link-layer ARQ protocols.
//!
//! Reproduces the behaviour of five sliding-window protocols (stop-and-wait,
//! PAR, go-back-N, and selective repeat with piggybacked NAKs) over a noisy,
//! lossy, finite-capacity virtual channel, collecting throughput statistics
//! and detecting deadlocks.

#![forbid(unsafe_code, unused_must_use)]
#![warn(clippy::all, missing_docs)]

/// The six driver<->worker channels: two peer frame links, two control pairs.
pub mod channel;

/// CLI argument parsing and validation.
pub mod cli;

/// Common simulation-wide constants.
pub mod common;

/// The simulation driver: spawns peer workers, advances the clock, detects deadlock.
pub mod driver;

/// Fatal error types shared across the crate.
pub mod error;

/// Frame and packet wire format, and the byte-image peer channel.
pub mod frame;

/// Protocol-engine state machines (protocols 1-6).
pub mod protocol;

/// Per-peer worker runtime: event queue, timers, statistics, runtime primitives.
pub mod worker;
