//! Protocol-engine state machines.
//!
//! Each function here implements one protocol number's sender and/or
//! receiver logic. Every function interacts with its [`WorkerContext`]
//! exclusively through the primitives in §6.1 — no protocol function reads
//! or writes simulator state directly.

use std::ops::ControlFlow;

use crate::error::SimError;
use crate::frame::{Event, Frame, FrameKind, Packet};
use crate::worker::{Stats, WorkerContext};

/// Circular-ordering predicate used throughout the sliding-window logic:
/// true iff traversing the sequence-number ring from `a` reaches `b`
/// before `c`.
pub fn between(a: u32, b: u32, c: u32) -> bool {
    (a <= b && b < c) || (c < a && a <= b) || (b < c && c < a)
}

/// Protocol 1 (utopia): unidirectional, error-free, infinite-speed
/// receiver. The sender never waits for an event at all — it is a tight
/// loop pumping packets onto an error-free wire as fast as it can produce
/// them. That means it has no synchronization point with the driver's
/// turn-granting loop, so unlike protocols 2-6 it cannot be expressed as a
/// [`WorkerContext`]-driven thread in this simulator (the driver always
/// expects a worker it has just granted a turn to, to eventually report a
/// status word back). This matches the disposition already explicit in the
/// dispatch table: protocol 1 is not one of the 2..=6 values the CLI
/// accepts. The algorithm is kept here as a pure, uncoupled function for
/// reference.
pub fn protocol1_sender_frame(payload: Packet) -> Frame {
    Frame {
        kind: FrameKind::Data,
        seq: 0,
        ack: 0,
        info: payload,
    }
}

/// Protocol 2 (stop-and-wait) sender: transmit, then block until the
/// receiver's dummy frame gives the go-ahead.
pub fn run_protocol2_sender(ctx: &mut WorkerContext) -> Result<Stats, SimError> {
    let mut buffer = ctx.from_network_layer();
    loop {
        let s = Frame {
            info: buffer,
            ..Frame::default()
        };
        ctx.to_physical_layer(s);
        match ctx.wait_for_event()? {
            ControlFlow::Break(stats) => return Ok(stats),
            ControlFlow::Continue(_frame_arrival) => {
                buffer = ctx.from_network_layer();
            }
        }
    }
}

/// Protocol 2 (stop-and-wait) receiver: deliver, then send a dummy frame
/// purely to release the sender.
pub fn run_protocol2_receiver(ctx: &mut WorkerContext) -> Result<Stats, SimError> {
    loop {
        match ctx.wait_for_event()? {
            ControlFlow::Break(stats) => return Ok(stats),
            ControlFlow::Continue(_frame_arrival) => {
                let r = ctx.from_physical_layer();
                ctx.to_network_layer(r.info)?;
                ctx.to_physical_layer(Frame::default());
            }
        }
    }
}

/// Protocol 3 (PAR, `MAX_SEQ = 1`) sender: transmit with a timer running;
/// on a matching ack, fetch the next packet and flip the sequence number;
/// on a checksum error or timeout, retransmit the same frame.
pub fn run_protocol3_sender(ctx: &mut WorkerContext) -> Result<Stats, SimError> {
    let mut next_frame_to_send = 0u32;
    let mut buffer = ctx.from_network_layer();

    loop {
        let s = Frame {
            kind: FrameKind::Data,
            seq: next_frame_to_send,
            ack: 0,
            info: buffer,
        };
        ctx.to_physical_layer(s);
        ctx.start_timer(s.seq);

        match ctx.wait_for_event()? {
            ControlFlow::Break(stats) => return Ok(stats),
            ControlFlow::Continue(Event::FrameArrival) => {
                let r = ctx.from_physical_layer();
                if r.ack == next_frame_to_send {
                    buffer = ctx.from_network_layer();
                    next_frame_to_send = ctx.inc(next_frame_to_send);
                }
            }
            ControlFlow::Continue(Event::ChecksumError | Event::Timeout) => {
                // retransmit unchanged on the next loop iteration
            }
            ControlFlow::Continue(other) => {
                unreachable!("protocol 3 sender cannot observe {other:?}")
            }
        }
    }
}

/// Protocol 3 (PAR) receiver: accept only the expected frame, always ack
/// the complementary sequence number.
pub fn run_protocol3_receiver(ctx: &mut WorkerContext) -> Result<Stats, SimError> {
    let mut frame_expected = 0u32;

    loop {
        match ctx.wait_for_event()? {
            ControlFlow::Break(stats) => return Ok(stats),
            ControlFlow::Continue(Event::FrameArrival) => {
                let r = ctx.from_physical_layer();
                if r.seq == frame_expected {
                    ctx.to_network_layer(r.info)?;
                    frame_expected = ctx.inc(frame_expected);
                }
                // MAX_SEQ == 1, so the ack is just the complement of what we expect next.
                let s = Frame {
                    ack: ctx.max_seq() - frame_expected,
                    ..Frame::default()
                };
                ctx.to_physical_layer(s);
            }
            ControlFlow::Continue(Event::ChecksumError) => { /* garbled: ignore */ }
            ControlFlow::Continue(other) => {
                unreachable!("protocol 3 receiver cannot observe {other:?}")
            }
        }
    }
}

/// Protocol 4 (sliding window of size 1 with piggybacked acks,
/// `MAX_SEQ = 1`), bidirectional: the same function runs on both peers.
fn send_protocol4(ctx: &mut WorkerContext, buffer: Packet, next_frame_to_send: u32, frame_expected: u32) {
    let s = Frame {
        kind: FrameKind::Data,
        seq: next_frame_to_send,
        ack: ctx.max_seq() - frame_expected,
        info: buffer,
    };
    ctx.to_physical_layer(s);
    ctx.start_timer(next_frame_to_send);
}

pub fn run_protocol4(ctx: &mut WorkerContext) -> Result<Stats, SimError> {
    let mut next_frame_to_send = 0u32;
    let mut frame_expected = 0u32;

    let mut buffer = ctx.from_network_layer();
    send_protocol4(ctx, buffer, next_frame_to_send, frame_expected);

    loop {
        match ctx.wait_for_event()? {
            ControlFlow::Break(stats) => return Ok(stats),
            ControlFlow::Continue(event) => {
                if event == Event::FrameArrival {
                    let r = ctx.from_physical_layer();
                    if r.seq == frame_expected {
                        ctx.to_network_layer(r.info)?;
                        frame_expected = ctx.inc(frame_expected);
                    }
                    if r.ack == next_frame_to_send {
                        ctx.stop_timer(r.ack);
                        buffer = ctx.from_network_layer();
                        next_frame_to_send = ctx.inc(next_frame_to_send);
                    }
                }
                // cksum_err and timeout fall through: resend the current frame.
                send_protocol4(ctx, buffer, next_frame_to_send, frame_expected);
            }
        }
    }
}

fn piggyback_ack(max_seq: u32, frame_expected: u32) -> u32 {
    (frame_expected + max_seq) % (max_seq + 1)
}

fn send_protocol5(
    ctx: &mut WorkerContext,
    frame_nr: u32,
    frame_expected: u32,
    max_seq: u32,
    nr_bufs: usize,
    buffer: &[Packet],
) {
    let s = Frame {
        kind: FrameKind::Data,
        seq: frame_nr,
        ack: piggyback_ack(max_seq, frame_expected),
        info: buffer[frame_nr as usize % nr_bufs],
    };
    ctx.to_physical_layer(s);
    ctx.start_timer(frame_nr % nr_bufs as u32);
}

/// Protocol 5 (pipelining / go-back-N, `MAX_SEQ = 7`, `NR_BUFS = MAX_SEQ`),
/// bidirectional: the same function runs on both peers. The receiver does
/// not buffer out-of-order frames; a late timeout resends the entire
/// outstanding window.
pub fn run_protocol5(ctx: &mut WorkerContext) -> Result<Stats, SimError> {
    let max_seq = ctx.max_seq();
    let nr_bufs = ctx.nr_bufs();

    let mut next_frame_to_send = 0u32;
    let mut ack_expected = 0u32;
    let mut frame_expected = 0u32;
    let mut nbuffered: u32 = 0;
    let mut buffer = vec![Packet::default(); nr_bufs];

    ctx.enable_network_layer();

    loop {
        match ctx.wait_for_event()? {
            ControlFlow::Break(stats) => return Ok(stats),
            ControlFlow::Continue(Event::NetworkLayerReady) => {
                buffer[next_frame_to_send as usize % nr_bufs] = ctx.from_network_layer();
                nbuffered += 1;
                send_protocol5(ctx, next_frame_to_send, frame_expected, max_seq, nr_bufs, &buffer);
                next_frame_to_send = ctx.inc(next_frame_to_send);
            }
            ControlFlow::Continue(Event::FrameArrival) => {
                let r = ctx.from_physical_layer();
                if r.seq == frame_expected {
                    ctx.to_network_layer(r.info)?;
                    frame_expected = ctx.inc(frame_expected);
                }
                while between(ack_expected, r.ack, next_frame_to_send) {
                    nbuffered -= 1;
                    ctx.stop_timer(ack_expected % nr_bufs as u32);
                    ack_expected = ctx.inc(ack_expected);
                }
            }
            ControlFlow::Continue(Event::ChecksumError) => { /* damaged frame: ignore */ }
            ControlFlow::Continue(Event::Timeout) => {
                next_frame_to_send = ack_expected;
                for _ in 0..nbuffered {
                    send_protocol5(ctx, next_frame_to_send, frame_expected, max_seq, nr_bufs, &buffer);
                    next_frame_to_send = ctx.inc(next_frame_to_send);
                }
            }
            ControlFlow::Continue(other) => {
                unreachable!("protocol 5 cannot observe {other:?}")
            }
        }

        if (nbuffered as usize) < nr_bufs {
            ctx.enable_network_layer();
        } else {
            ctx.disable_network_layer();
        }
    }
}

/// Protocol 6 (selective repeat with piggybacked NAKs, `MAX_SEQ = 7`,
/// `NR_BUFS = (MAX_SEQ + 1) / 2`), bidirectional: the same function runs on
/// both peers. Frames may be accepted out of order at the receiver, but
/// are delivered to the network layer strictly in order; each outstanding
/// frame has its own timer, so a timeout retransmits only that frame.
pub fn run_protocol6(ctx: &mut WorkerContext) -> Result<Stats, SimError> {
    let max_seq = ctx.max_seq();
    let nr_bufs = ctx.nr_bufs();

    let mut ack_expected = 0u32;
    let mut next_frame_to_send = 0u32;
    let mut frame_expected = 0u32;
    let mut too_far = nr_bufs as u32;
    let mut nbuffered: u32 = 0;
    let mut no_nak = true;

    let mut out_buf = vec![Packet::default(); nr_bufs];
    let mut in_buf = vec![Packet::default(); nr_bufs];
    let mut arrived = vec![false; nr_bufs];

    ctx.enable_network_layer();

    loop {
        match ctx.wait_for_event()? {
            ControlFlow::Break(stats) => return Ok(stats),
            ControlFlow::Continue(Event::NetworkLayerReady) => {
                nbuffered += 1;
                out_buf[next_frame_to_send as usize % nr_bufs] = ctx.from_network_layer();
                send6(
                    ctx,
                    FrameKind::Data,
                    next_frame_to_send,
                    frame_expected,
                    max_seq,
                    nr_bufs,
                    &out_buf,
                    &mut no_nak,
                );
                next_frame_to_send = ctx.inc(next_frame_to_send);
            }
            ControlFlow::Continue(Event::FrameArrival) => {
                let r = ctx.from_physical_layer();
                if r.kind == FrameKind::Data {
                    if r.seq != frame_expected && no_nak {
                        send6(
                            ctx,
                            FrameKind::Nak,
                            0,
                            frame_expected,
                            max_seq,
                            nr_bufs,
                            &out_buf,
                            &mut no_nak,
                        );
                    } else {
                        ctx.start_ack_timer();
                    }
                    if between(frame_expected, r.seq, too_far) && !arrived[r.seq as usize % nr_bufs] {
                        arrived[r.seq as usize % nr_bufs] = true;
                        in_buf[r.seq as usize % nr_bufs] = r.info;
                        while arrived[frame_expected as usize % nr_bufs] {
                            ctx.to_network_layer(in_buf[frame_expected as usize % nr_bufs])?;
                            no_nak = true;
                            arrived[frame_expected as usize % nr_bufs] = false;
                            frame_expected = ctx.inc(frame_expected);
                            too_far = ctx.inc(too_far);
                            ctx.start_ack_timer();
                        }
                    }
                }
                if r.kind == FrameKind::Nak
                    && between(ack_expected, (r.ack + 1) % (max_seq + 1), next_frame_to_send)
                {
                    send6(
                        ctx,
                        FrameKind::Data,
                        (r.ack + 1) % (max_seq + 1),
                        frame_expected,
                        max_seq,
                        nr_bufs,
                        &out_buf,
                        &mut no_nak,
                    );
                }
                while between(ack_expected, r.ack, next_frame_to_send) {
                    nbuffered -= 1;
                    ctx.stop_timer(ack_expected % nr_bufs as u32);
                    ack_expected = ctx.inc(ack_expected);
                }
            }
            ControlFlow::Continue(Event::ChecksumError) => {
                if no_nak {
                    send6(
                        ctx,
                        FrameKind::Nak,
                        0,
                        frame_expected,
                        max_seq,
                        nr_bufs,
                        &out_buf,
                        &mut no_nak,
                    );
                }
            }
            ControlFlow::Continue(Event::Timeout) => {
                send6(
                    ctx,
                    FrameKind::Data,
                    ctx.oldest_frame,
                    frame_expected,
                    max_seq,
                    nr_bufs,
                    &out_buf,
                    &mut no_nak,
                );
            }
            ControlFlow::Continue(Event::AckTimeout) => {
                send6(
                    ctx,
                    FrameKind::Ack,
                    0,
                    frame_expected,
                    max_seq,
                    nr_bufs,
                    &out_buf,
                    &mut no_nak,
                );
            }
        }

        if (nbuffered as usize) < nr_bufs {
            ctx.enable_network_layer();
        } else {
            ctx.disable_network_layer();
        }
    }
}

/// Constructs and sends a data, ack, or nak frame for protocol 6, mirroring
/// the shared `send_frame` helper the original protocol uses for all three
/// kinds.
#[allow(clippy::too_many_arguments)]
fn send6(
    ctx: &mut WorkerContext,
    kind: FrameKind,
    frame_nr: u32,
    frame_expected: u32,
    max_seq: u32,
    nr_bufs: usize,
    out_buf: &[Packet],
    no_nak: &mut bool,
) {
    let info = if kind == FrameKind::Data {
        out_buf[frame_nr as usize % nr_bufs]
    } else {
        Packet::default()
    };
    let s = Frame {
        kind,
        seq: frame_nr,
        ack: piggyback_ack(max_seq, frame_expected),
        info,
    };
    if kind == FrameKind::Nak {
        *no_nak = false;
    }
    ctx.to_physical_layer(s);
    if kind == FrameKind::Data {
        ctx.start_timer(frame_nr % nr_bufs as u32);
    }
    ctx.stop_ack_timer();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn between_matches_circular_ordering_law() {
        // For MAX_SEQ = 7 (mod 8), exactly |c - a| mod 8 values of b satisfy
        // between(a, b, c) for a != c.
        let modulus = 8u32;
        for a in 0..modulus {
            for c in 0..modulus {
                if a == c {
                    continue;
                }
                let count = (0..modulus).filter(|&b| between(a, b, c)).count() as u32;
                let expected = (c + modulus - a) % modulus;
                assert_eq!(count, expected, "a={a} c={c}");
            }
        }
    }

    #[test]
    fn between_tie_rules() {
        assert!(between(3, 3, 5));
        assert!(!between(3, 5, 3));
    }

    #[test]
    fn piggyback_ack_is_one_behind_frame_expected() {
        assert_eq!(piggyback_ack(7, 0), 7);
        assert_eq!(piggyback_ack(7, 5), 4);
        assert_eq!(piggyback_ack(1, 0), 1);
    }
}
