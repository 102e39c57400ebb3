//! Simulation-wide constants shared by the worker runtime and the driver.

/// Number of per-buffer data-frame timers available to a worker.
pub const NR_TIMERS: usize = 8;

/// Maximum number of frames a worker's inbound queue may hold before
/// overflow is treated as a fatal simulation error.
pub const MAX_QUEUE: usize = 100_000;

/// Internal tick granularity. Every externally visible "event" advances the
/// virtual clock by this many ticks, so that timers started during the same
/// external event can still be given distinct expiry values.
pub const DELTA: u64 = 10;

/// The auxiliary (ack) timer runs at `timeout_interval / AUX`.
pub const AUX: u64 = 2;

/// Highest protocol number the driver will dispatch.
pub const MAX_PROTOCOL: u8 = 6;

/// Lowest protocol number the driver will dispatch.
pub const MIN_PROTOCOL: u8 = 2;

/// Tick interval between periodic progress log lines (debug bit [`PERIODIC`]).
pub const PERIODIC_INTERVAL: u64 = 100_000;

/// Debug bit: log every frame sent.
pub const SENDS: u32 = 0x1;
/// Debug bit: log every frame received.
pub const RECEIVES: u32 = 0x2;
/// Debug bit: log every timeout and ack timeout.
pub const TIMEOUTS: u32 = 0x4;
/// Debug bit: log a periodic progress line every [`PERIODIC_INTERVAL`] ticks.
pub const PERIODIC: u32 = 0x8;

/// Sequence-number modulus (`MAX_SEQ`) and sender/receiver window size
/// (`NR_BUFS`) for a given protocol number.
///
/// `MAX_SEQ` is the highest representable sequence number; sequence
/// arithmetic is performed modulo `MAX_SEQ + 1`.
pub fn protocol_window(protocol: u8) -> (u32, usize) {
    match protocol {
        2 | 3 | 4 => (1, 2),
        5 => (7, 7),
        6 => (7, 4),
        _ => unreachable!("protocol {protocol} has no window parameters"),
    }
}
