//! Fatal error conditions, surfaced to the simulation driver.
//!
//! The original simulator called `exit(1)` from deep inside the worker on
//! any of these conditions. Here every fallible runtime primitive returns
//! `Result<_, SimError>` instead, so a worker thread unwinds cleanly back to
//! [`crate::driver`], which still reports whatever per-peer statistics were
//! collected before terminating.

use thiserror::Error;

/// A fatal condition that ends the simulation run immediately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// A packet was delivered to the network layer out of sequence.
    #[error(
        "Proc {peer} got protocol error. Packet delivered out of order. \
         Expected payload {expected} but got payload {actual}"
    )]
    OutOfOrderDelivery {
        /// Which peer (0 or 1) observed the violation.
        peer: usize,
        /// The payload counter that should have arrived.
        expected: u32,
        /// The payload counter that actually arrived.
        actual: u32,
    },

    /// The inbound frame queue exceeded [`crate::common::MAX_QUEUE`].
    #[error("Proc {peer}: out of queue space, increase MAX_QUEUE and retry")]
    QueueOverflow {
        /// Which peer (0 or 1) overflowed its queue.
        peer: usize,
    },

    /// `check_timers` believed a timer had expired but could not locate it.
    #[error("Proc {peer}: check_timers failed to find the lowest timer at tick {tick}")]
    TimerInvariantViolation {
        /// Which peer (0 or 1) hit the inconsistency.
        peer: usize,
        /// The tick at which the inconsistency was observed.
        tick: u64,
    },
}

/// An error in the command-line configuration. Reported to stderr; no
/// simulation is started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `protocol` was outside `MIN_PROTOCOL..=MAX_PROTOCOL`.
    #[error("protocol {0} is not valid")]
    InvalidProtocol(u8),

    /// `events` must be positive.
    #[error("number of simulation events must be positive")]
    NonPositiveEvents,

    /// `timeout` must be positive for protocols above 2.
    #[error("timeout interval must be positive")]
    NonPositiveTimeout,

    /// `loss` was outside `0..=99`.
    #[error("packet loss rate must be between 0 and 99")]
    InvalidLoss(u8),

    /// `cksum` was outside `0..=99`.
    #[error("packet cksum error rate must be between 0 and 99")]
    InvalidCksum(u8),
}
