//! Per-peer worker runtime.
//!
//! One [`WorkerContext`] is created per peer thread. It owns the inbound
//! frame queue, the timer array, the network-layer pump, the outbound peer
//! channel, and the statistics counters, and exposes exactly the primitives
//! the protocol engine is allowed to call (§6.1). All per-worker state lives
//! here rather than in module-level globals, including `oldest_frame`,
//! which [`WorkerContext::check_timers`] sets and protocol 6's timeout
//! handler reads back.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::mpsc::{Receiver, Sender};

use rand::Rng;
use tracing::{debug, trace};

use crate::channel::{ControlMsg, PeerChannelRx, PeerChannelTx, WorkerStatus};
use crate::common::{AUX, MAX_QUEUE, NR_TIMERS, PERIODIC, PERIODIC_INTERVAL, RECEIVES, SENDS, TIMEOUTS};
use crate::error::SimError;
use crate::frame::{Event, Frame, FrameKind, Packet};

/// Bucket width random draws are compared against: `loss`/`garbled` are
/// scaled from percent (0..=99) to this 1024-bucket resolution before
/// being stored here, matching the original simulator's "1000 is close
/// enough to 1024" approximation.
pub const RANDOM_BUCKETS: u32 = 1024;

/// Immutable configuration a worker is built from.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Which peer this is: 0 or 1.
    pub id: usize,
    /// Protocol number, 2..=6.
    pub protocol: u8,
    /// Highest representable sequence number.
    pub max_seq: u32,
    /// Sender/receiver window size.
    pub nr_bufs: usize,
    /// Main retransmission timeout, in internal ticks.
    pub timeout_interval: u64,
    /// Packet loss rate, scaled to `0..RANDOM_BUCKETS`.
    pub pkt_loss: u32,
    /// Checksum error rate, scaled to `0..RANDOM_BUCKETS`.
    pub garbled: u32,
    /// Tracing debug bitmask (§6.2).
    pub debug: u32,
}

/// Per-peer throughput and retransmission statistics, as printed at the end
/// of a run and aggregated by the driver into the overall efficiency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Data frames sent (including retransmissions), before loss is applied.
    pub data_sent: u64,
    /// Of those, how many were retransmissions.
    pub data_retransmitted: u64,
    /// Data frames selected for simulated loss.
    pub data_lost: u64,
    /// Data frames actually placed on the peer channel.
    pub data_not_lost: u64,
    /// Data frames received without a simulated checksum error.
    pub good_data_recd: u64,
    /// Data frames received with a simulated checksum error.
    pub cksum_data_recd: u64,
    /// Ack frames sent.
    pub acks_sent: u64,
    /// Ack frames selected for simulated loss.
    pub acks_lost: u64,
    /// Ack frames actually placed on the peer channel.
    pub acks_not_lost: u64,
    /// Ack/nak frames received without a simulated checksum error.
    pub good_acks_recd: u64,
    /// Ack/nak frames received with a simulated checksum error.
    pub cksum_acks_recd: u64,
    /// Packets delivered to the network layer.
    pub payloads_accepted: u64,
    /// Data-frame timeouts observed.
    pub timeouts: u64,
    /// Ack-timer timeouts observed.
    pub ack_timeouts: u64,
}

/// The runtime state and primitives available to one peer's protocol
/// function.
pub struct WorkerContext {
    cfg: WorkerConfig,
    tick: u64,
    offset: u64,
    retransmitting: bool,

    ack_timer: [u64; NR_TIMERS],
    seqs: [u32; NR_TIMERS],
    lowest_timer: u64,
    aux_timer: u64,

    network_layer_status: bool,
    next_net_pkt: u32,
    last_pkt_given: Option<u32>,
    last_frame: Option<Frame>,

    /// Set by [`WorkerContext::check_timers`] on a data-frame timeout; read
    /// by protocol 6's timeout handler to know which frame to retransmit.
    pub oldest_frame: u32,

    queue: VecDeque<Frame>,
    stats: Stats,

    peer_tx: PeerChannelTx,
    peer_rx: PeerChannelRx,
    down_rx: Receiver<ControlMsg>,
    up_tx: Sender<WorkerStatus>,
}

impl WorkerContext {
    /// Creates a new worker context, ready to run its protocol function.
    pub fn new(
        cfg: WorkerConfig,
        peer_tx: PeerChannelTx,
        peer_rx: PeerChannelRx,
        down_rx: Receiver<ControlMsg>,
        up_tx: Sender<WorkerStatus>,
    ) -> Self {
        Self {
            cfg,
            tick: 0,
            offset: 0,
            retransmitting: false,
            ack_timer: [0; NR_TIMERS],
            seqs: [0; NR_TIMERS],
            lowest_timer: 0,
            aux_timer: 0,
            network_layer_status: false,
            next_net_pkt: 0,
            last_pkt_given: None,
            last_frame: None,
            oldest_frame: 0,
            queue: VecDeque::new(),
            stats: Stats::default(),
            peer_tx,
            peer_rx,
            down_rx,
            up_tx,
        }
    }

    /// This worker's peer id (0 or 1).
    pub fn id(&self) -> usize {
        self.cfg.id
    }

    /// Highest representable sequence number for this worker's protocol.
    pub fn max_seq(&self) -> u32 {
        self.cfg.max_seq
    }

    /// Sender/receiver window size for this worker's protocol.
    pub fn nr_bufs(&self) -> usize {
        self.cfg.nr_bufs
    }

    /// A snapshot of this worker's statistics so far.
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Circular increment of a sequence number: `(k + 1) mod (MAX_SEQ + 1)`.
    pub fn inc(&self, k: u32) -> u32 {
        if k < self.cfg.max_seq {
            k + 1
        } else {
            0
        }
    }

    // ---- §6.1 protocol-to-runtime primitives ----

    /// Populates a packet with the next network-layer payload. Never fails.
    pub fn from_network_layer(&mut self) -> Packet {
        let p = Packet::from_counter(self.next_net_pkt);
        self.next_net_pkt = self.next_net_pkt.wrapping_add(1);
        p
    }

    /// Delivers a packet to the network layer; fatal if its sequence
    /// counter is not `last + 1`.
    pub fn to_network_layer(&mut self, p: Packet) -> Result<(), SimError> {
        let actual = p.counter();
        let expected = self.last_pkt_given.map_or(0, |v| v.wrapping_add(1));
        if actual != expected {
            return Err(SimError::OutOfOrderDelivery {
                peer: self.cfg.id,
                expected,
                actual,
            });
        }
        self.last_pkt_given = Some(actual);
        self.stats.payloads_accepted += 1;
        Ok(())
    }

    /// Copies the most recently classified inbound frame.
    pub fn from_physical_layer(&self) -> Frame {
        self.last_frame
            .expect("from_physical_layer called with no pending frame")
    }

    /// Transmits a frame on the peer channel, subject to stochastic loss.
    /// Fills in fields the caller's protocol does not set, matching the
    /// per-protocol defaulting worker.c performs so a trace always shows
    /// fully-populated frames.
    pub fn to_physical_layer(&mut self, mut s: Frame) {
        match self.cfg.protocol {
            2 => {
                s.seq = 0;
                s.kind = if self.cfg.id == 0 {
                    FrameKind::Data
                } else {
                    FrameKind::Ack
                };
                if s.kind == FrameKind::Ack {
                    s.info = Packet::default();
                }
            }
            3 => {
                s.kind = if self.cfg.id == 0 {
                    FrameKind::Data
                } else {
                    FrameKind::Ack
                };
                if s.kind == FrameKind::Ack {
                    s.seq = 0;
                    s.info = Packet::default();
                }
            }
            4 | 5 => {
                s.kind = FrameKind::Data;
            }
            6 => {
                if s.kind == FrameKind::Nak {
                    s.info = Packet::default();
                }
                // Recorded here, not in start_timer, because start_timer
                // only ever sees the buffer slot, not the full sequence
                // number.
                if s.kind == FrameKind::Data {
                    self.seqs[s.seq as usize % self.cfg.nr_bufs] = s.seq;
                }
            }
            _ => {}
        }

        match s.kind {
            FrameKind::Data => self.stats.data_sent += 1,
            FrameKind::Ack => self.stats.acks_sent += 1,
            FrameKind::Nak => {}
        }
        if self.retransmitting {
            self.stats.data_retransmitted += 1;
        }

        let roll = self.roll();
        if roll < self.cfg.pkt_loss {
            match s.kind {
                FrameKind::Data => self.stats.data_lost += 1,
                FrameKind::Ack => self.stats.acks_lost += 1,
                FrameKind::Nak => {}
            }
            if self.cfg.debug & SENDS != 0 {
                trace!(tick = self.tick_external(), id = self.cfg.id, kind = ?s.kind, seq = s.seq, ack = s.ack, "sent frame, lost in transit");
            }
            return;
        }
        match s.kind {
            FrameKind::Data => self.stats.data_not_lost += 1,
            FrameKind::Ack => self.stats.acks_not_lost += 1,
            FrameKind::Nak => {}
        }
        if self.cfg.debug & SENDS != 0 {
            trace!(tick = self.tick_external(), id = self.cfg.id, kind = ?s.kind, seq = s.seq, ack = s.ack, "sent frame");
        }
        self.peer_tx.send(s);
    }

    /// Arms the per-buffer timer for slot `k`.
    pub fn start_timer(&mut self, k: u32) {
        let idx = k as usize % NR_TIMERS;
        self.ack_timer[idx] = self.tick + self.cfg.timeout_interval + self.offset;
        self.offset += 1;
        self.recalc_timers();
    }

    /// Disarms the per-buffer timer for slot `k`.
    pub fn stop_timer(&mut self, k: u32) {
        let idx = k as usize % NR_TIMERS;
        self.ack_timer[idx] = 0;
        self.recalc_timers();
    }

    /// Arms the auxiliary ack timer.
    pub fn start_ack_timer(&mut self) {
        self.aux_timer = self.tick + self.cfg.timeout_interval / AUX;
        self.offset += 1;
    }

    /// Disarms the auxiliary ack timer.
    pub fn stop_ack_timer(&mut self) {
        self.aux_timer = 0;
    }

    /// Allows `network_layer_ready` events to occur.
    pub fn enable_network_layer(&mut self) {
        self.network_layer_status = true;
    }

    /// Forbids `network_layer_ready` events from occurring.
    pub fn disable_network_layer(&mut self) {
        self.network_layer_status = false;
    }

    // ---- internal runtime machinery ----

    fn tick_external(&self) -> u64 {
        self.tick / crate::common::DELTA
    }

    fn roll(&mut self) -> u32 {
        rand::rng().random_range(0..RANDOM_BUCKETS)
    }

    fn recalc_timers(&mut self) {
        let lowest = self
            .ack_timer
            .iter()
            .copied()
            .filter(|&v| v > 0)
            .min()
            .unwrap_or(0);
        self.lowest_timer = lowest;
    }

    /// Checks whether the lowest-armed data timer has expired. If so,
    /// disarms it, sets [`WorkerContext::oldest_frame`] from the shadow
    /// `seqs[]` array, and returns the slot index.
    fn check_timers(&mut self) -> Result<Option<u32>, SimError> {
        if self.lowest_timer == 0 || self.tick < self.lowest_timer {
            return Ok(None);
        }
        for i in 0..NR_TIMERS {
            if self.ack_timer[i] == self.lowest_timer {
                self.ack_timer[i] = 0;
                self.recalc_timers();
                self.oldest_frame = self.seqs[i];
                return Ok(Some(i as u32));
            }
        }
        Err(SimError::TimerInvariantViolation {
            peer: self.cfg.id,
            tick: self.tick,
        })
    }

    fn check_ack_timer(&mut self) -> bool {
        if self.aux_timer > 0 && self.tick >= self.aux_timer {
            self.aux_timer = 0;
            true
        } else {
            false
        }
    }

    fn drain_inbound(&mut self) -> Result<(), SimError> {
        let incoming = self.peer_rx.drain();
        if self.queue.len() + incoming.len() > MAX_QUEUE {
            return Err(SimError::QueueOverflow { peer: self.cfg.id });
        }
        self.queue.extend(incoming);
        Ok(())
    }

    /// Pops the earliest queued frame and stochastically classifies it as a
    /// clean arrival or a checksum error.
    fn classify_next_frame(&mut self) -> Event {
        let frame = self
            .queue
            .pop_front()
            .expect("classify_next_frame called on an empty queue");
        self.last_frame = Some(frame);

        let roll = self.roll();
        let event = if roll < self.cfg.garbled {
            Event::ChecksumError
        } else {
            Event::FrameArrival
        };

        match (frame.kind, event) {
            (FrameKind::Data, Event::ChecksumError) => self.stats.cksum_data_recd += 1,
            (FrameKind::Data, _) => self.stats.good_data_recd += 1,
            (_, Event::ChecksumError) => self.stats.cksum_acks_recd += 1,
            (_, _) => self.stats.good_acks_recd += 1,
        }

        if self.cfg.debug & RECEIVES != 0 {
            let good = event == Event::FrameArrival;
            trace!(
                tick = self.tick_external(),
                id = self.cfg.id,
                good,
                kind = ?frame.kind,
                seq = frame.seq,
                ack = frame.ack,
                "received frame"
            );
        }
        event
    }

    /// Picks the single highest-priority event possible right now, per the
    /// protocol-dependent priority order in §4.2.
    fn pick_event(&mut self) -> Result<Option<Event>, SimError> {
        match self.cfg.protocol {
            2 => {
                if self.queue.is_empty() && self.lowest_timer == 0 {
                    Ok(None)
                } else {
                    Ok(Some(self.classify_next_frame()))
                }
            }
            3 | 4 => {
                if !self.queue.is_empty() {
                    Ok(Some(self.classify_next_frame()))
                } else if self.check_timers()?.is_some() {
                    Ok(Some(Event::Timeout))
                } else {
                    Ok(None)
                }
            }
            5 => {
                if !self.queue.is_empty() {
                    Ok(Some(self.classify_next_frame()))
                } else if self.network_layer_status {
                    Ok(Some(Event::NetworkLayerReady))
                } else if self.check_timers()?.is_some() {
                    Ok(Some(Event::Timeout))
                } else {
                    Ok(None)
                }
            }
            6 => {
                if self.check_ack_timer() {
                    Ok(Some(Event::AckTimeout))
                } else if !self.queue.is_empty() {
                    Ok(Some(self.classify_next_frame()))
                } else if self.network_layer_status {
                    Ok(Some(Event::NetworkLayerReady))
                } else if self.check_timers()?.is_some() {
                    Ok(Some(Event::Timeout))
                } else {
                    Ok(None)
                }
            }
            other => unreachable!("protocol {other} has no event priority order"),
        }
    }

    /// Blocks until exactly one event is delivered, or the simulation ends.
    ///
    /// Drains the inbound queue, reports readiness to the driver, reads
    /// back the next tick (or the termination sentinel), and picks the
    /// single highest-priority possible event.
    pub fn wait_for_event(&mut self) -> Result<ControlFlow<Stats, Event>, SimError> {
        self.offset = 0;
        self.retransmitting = false;
        let mut status = WorkerStatus::Ok;

        loop {
            self.drain_inbound()?;

            if self.up_tx.send(status).is_err() {
                // The driver is gone; behave as if it had sent Terminate.
                return Ok(ControlFlow::Break(self.stats));
            }

            let msg = match self.down_rx.recv() {
                Ok(msg) => msg,
                Err(_) => return Ok(ControlFlow::Break(self.stats)),
            };

            match msg {
                ControlMsg::Terminate => {
                    self.log_final_stats();
                    return Ok(ControlFlow::Break(self.stats));
                }
                ControlMsg::Tick(t) => {
                    self.tick = t;
                    if self.cfg.debug & PERIODIC != 0 && self.tick % PERIODIC_INTERVAL == 0 {
                        debug!(
                            tick = self.tick_external(),
                            id = self.cfg.id,
                            data_sent = self.stats.data_sent,
                            payloads_accepted = self.stats.payloads_accepted,
                            timeouts = self.stats.timeouts,
                            "periodic progress"
                        );
                    }
                }
            }

            match self.pick_event()? {
                None => {
                    status = if self.lowest_timer == 0 {
                        WorkerStatus::Nothing
                    } else {
                        WorkerStatus::Ok
                    };
                    continue;
                }
                Some(event) => {
                    if event == Event::Timeout {
                        self.retransmitting = true;
                        self.stats.timeouts += 1;
                        if self.cfg.debug & TIMEOUTS != 0 {
                            debug!(
                                tick = self.tick_external(),
                                id = self.cfg.id,
                                oldest_frame = self.oldest_frame,
                                "timeout"
                            );
                        }
                    }
                    if event == Event::AckTimeout {
                        self.stats.ack_timeouts += 1;
                        if self.cfg.debug & TIMEOUTS != 0 {
                            debug!(tick = self.tick_external(), id = self.cfg.id, "ack timeout");
                        }
                    }
                    return Ok(ControlFlow::Continue(event));
                }
            }
        }
    }

    fn log_final_stats(&self) {
        let s = &self.stats;
        tracing::info!(
            id = self.cfg.id,
            data_sent = s.data_sent,
            data_lost = s.data_lost,
            data_not_lost = s.data_not_lost,
            data_retransmitted = s.data_retransmitted,
            good_acks_recd = s.good_acks_recd,
            cksum_acks_recd = s.cksum_acks_recd,
            good_data_recd = s.good_data_recd,
            cksum_data_recd = s.cksum_data_recd,
            payloads_accepted = s.payloads_accepted,
            acks_sent = s.acks_sent,
            acks_lost = s.acks_lost,
            acks_not_lost = s.acks_not_lost,
            timeouts = s.timeouts,
            ack_timeouts = s.ack_timeouts,
            "final statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{control_pair, peer_channel};

    fn make_ctx(protocol: u8) -> WorkerContext {
        let (max_seq, nr_bufs) = crate::common::protocol_window(protocol);
        let (_driver_ctrl, worker_ctrl) = control_pair();
        let (peer_tx, _peer_rx_other_side) = peer_channel();
        let (_peer_tx_other_side, peer_rx) = peer_channel();
        let cfg = WorkerConfig {
            id: 0,
            protocol,
            max_seq,
            nr_bufs,
            timeout_interval: 400,
            pkt_loss: 0,
            garbled: 0,
            debug: 0,
        };
        WorkerContext::new(cfg, peer_tx, peer_rx, worker_ctrl.down_rx, worker_ctrl.up_tx)
    }

    #[test]
    fn from_network_layer_counts_up() {
        let mut ctx = make_ctx(6);
        assert_eq!(ctx.from_network_layer().counter(), 0);
        assert_eq!(ctx.from_network_layer().counter(), 1);
        assert_eq!(ctx.from_network_layer().counter(), 2);
    }

    #[test]
    fn to_network_layer_accepts_in_order() {
        let mut ctx = make_ctx(6);
        ctx.to_network_layer(Packet::from_counter(0)).unwrap();
        ctx.to_network_layer(Packet::from_counter(1)).unwrap();
        assert_eq!(ctx.stats().payloads_accepted, 2);
    }

    #[test]
    fn to_network_layer_rejects_out_of_order() {
        let mut ctx = make_ctx(6);
        ctx.to_network_layer(Packet::from_counter(0)).unwrap();
        let err = ctx.to_network_layer(Packet::from_counter(5)).unwrap_err();
        assert_eq!(
            err,
            SimError::OutOfOrderDelivery {
                peer: 0,
                expected: 1,
                actual: 5
            }
        );
    }

    #[test]
    fn inc_wraps_circularly() {
        let ctx = make_ctx(6);
        assert_eq!(ctx.inc(7), 0);
        assert_eq!(ctx.inc(3), 4);
    }

    #[test]
    fn start_timer_twice_keeps_unique_expiries() {
        let mut ctx = make_ctx(6);
        ctx.tick = 100;
        ctx.start_timer(0);
        ctx.start_timer(1);
        assert_ne!(ctx.ack_timer[0], ctx.ack_timer[1]);
    }

    #[test]
    fn check_timers_reports_none_before_expiry() {
        let mut ctx = make_ctx(6);
        ctx.tick = 100;
        ctx.start_timer(0);
        ctx.tick = 100;
        assert_eq!(ctx.check_timers().unwrap(), None);
    }

    #[test]
    fn check_timers_fires_and_sets_oldest_frame() {
        let mut ctx = make_ctx(6);
        ctx.tick = 100;
        ctx.seqs[0] = 42;
        ctx.start_timer(0);
        ctx.tick = ctx.ack_timer[0];
        let fired = ctx.check_timers().unwrap();
        assert_eq!(fired, Some(0));
        assert_eq!(ctx.oldest_frame, 42);
        assert_eq!(ctx.lowest_timer, 0);
    }
}
