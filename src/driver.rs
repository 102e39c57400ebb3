//! The simulation driver.
//!
//! Builds the six channels connecting two peer workers (§5), spawns one
//! thread per peer, and runs the round-robin lockstep loop that hands out
//! turns, tracks per-peer idleness for deadlock detection, and reports
//! final statistics.

use std::thread;

use rand::Rng;
use tracing::info;

use crate::channel::{control_pair, peer_channel, ControlMsg, DriverControl, WorkerStatus};
use crate::cli::RunConfig;
use crate::common::{protocol_window, DELTA};
use crate::error::SimError;
use crate::protocol::{
    run_protocol2_receiver, run_protocol2_sender, run_protocol3_receiver, run_protocol3_sender,
    run_protocol4, run_protocol5, run_protocol6,
};
use crate::worker::{Stats, WorkerConfig, WorkerContext};

/// How the simulation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `tick` reached `last_tick` without either peer going fully idle.
    EndOfSimulation,
    /// Both peers reported `NOTHING` for `3 * timeout_interval` ticks.
    Deadlock,
}

/// The driver's report of a completed run.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// How the run ended.
    pub outcome: Outcome,
    /// Each peer's final statistics, in peer-id order.
    pub peer_stats: [Stats; 2],
    /// `100 * payloads_accepted / data_sent`, aggregated across both peers.
    pub efficiency: f64,
    /// A fatal error surfaced by a worker thread, if one occurred. When
    /// set, `outcome` and `peer_stats` reflect whatever state was reachable
    /// before the failure, per §7's channel-failure-is-end-of-simulation rule.
    pub fatal: Option<SimError>,
}

fn dispatch(protocol: u8, ctx: &mut WorkerContext) -> Result<Stats, SimError> {
    match (protocol, ctx.id()) {
        (2, 0) => run_protocol2_sender(ctx),
        (2, 1) => run_protocol2_receiver(ctx),
        (3, 0) => run_protocol3_sender(ctx),
        (3, 1) => run_protocol3_receiver(ctx),
        (4, _) => run_protocol4(ctx),
        (5, _) => run_protocol5(ctx),
        (6, _) => run_protocol6(ctx),
        (other, id) => unreachable!("no dispatch for protocol {other}, peer {id}"),
    }
}

/// Runs one complete simulation to termination.
pub fn run(cfg: RunConfig) -> SimulationReport {
    let (max_seq, nr_bufs) = protocol_window(cfg.protocol);

    let (tx_0to1, rx_0to1) = peer_channel();
    let (tx_1to0, rx_1to0) = peer_channel();
    let (driver_ctrl0, worker_ctrl0) = control_pair();
    let (driver_ctrl1, worker_ctrl1) = control_pair();

    let cfg0 = WorkerConfig {
        id: 0,
        protocol: cfg.protocol,
        max_seq,
        nr_bufs,
        timeout_interval: cfg.timeout_interval,
        pkt_loss: cfg.pkt_loss,
        garbled: cfg.garbled,
        debug: cfg.debug,
    };
    let cfg1 = WorkerConfig { id: 1, ..cfg0 };

    let protocol = cfg.protocol;
    let handle0 = thread::spawn(move || {
        let mut ctx = WorkerContext::new(
            cfg0,
            tx_0to1,
            rx_1to0,
            worker_ctrl0.down_rx,
            worker_ctrl0.up_tx,
        );
        dispatch(protocol, &mut ctx)
    });
    let handle1 = thread::spawn(move || {
        let mut ctx = WorkerContext::new(
            cfg1,
            tx_1to0,
            rx_0to1,
            worker_ctrl1.down_rx,
            worker_ctrl1.up_tx,
        );
        dispatch(protocol, &mut ctx)
    });

    let outcome = drive(cfg, [driver_ctrl0, driver_ctrl1]);

    let results = [
        handle0.join().expect("peer 0 thread panicked"),
        handle1.join().expect("peer 1 thread panicked"),
    ];

    let fatal = results.iter().find_map(|r| r.as_ref().err().cloned());
    let peer_stats = [
        results[0].clone().unwrap_or_default(),
        results[1].clone().unwrap_or_default(),
    ];

    let data_sent: u64 = peer_stats.iter().map(|s| s.data_sent).sum();
    let payloads_accepted: u64 = peer_stats.iter().map(|s| s.payloads_accepted).sum();
    let efficiency = if data_sent == 0 {
        0.0
    } else {
        100.0 * payloads_accepted as f64 / data_sent as f64
    };

    info!(
        ?outcome,
        efficiency,
        data_sent,
        payloads_accepted,
        "simulation finished"
    );

    SimulationReport {
        outcome,
        peer_stats,
        efficiency,
        fatal,
    }
}

/// Runs the round-robin lockstep loop until end-of-simulation, deadlock, or
/// a worker's control channel fails (treated as end-of-simulation, per §7).
fn drive(cfg: RunConfig, controls: [DriverControl; 2]) -> Outcome {
    let [ctrl0, ctrl1] = controls;
    let down_tx = [ctrl0.down_tx, ctrl1.down_tx];
    let up_rx = [ctrl0.up_rx, ctrl1.up_rx];

    let mut tick = 0u64;
    let mut hanging = [0u64; 2];
    let deadlock_threshold = 3 * cfg.timeout_interval;

    let outcome = loop {
        if tick >= cfg.last_tick {
            break Outcome::EndOfSimulation;
        }

        let process = rand::rng().random_range(0..2usize);
        tick += DELTA;

        let status = match up_rx[process].recv() {
            Ok(status) => status,
            Err(_) => break Outcome::EndOfSimulation,
        };

        match status {
            WorkerStatus::Ok => hanging[process] = 0,
            WorkerStatus::Nothing => hanging[process] += DELTA,
        }

        if hanging[0] >= deadlock_threshold && hanging[1] >= deadlock_threshold {
            break Outcome::Deadlock;
        }

        if down_tx[process].send(ControlMsg::Tick(tick)).is_err() {
            break Outcome::EndOfSimulation;
        }
    };

    for tx in &down_tx {
        let _ = tx.send(ControlMsg::Terminate);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    fn run_config(protocol: u8, events: u64, timeout: u64, loss: u8, cksum: u8) -> RunConfig {
        Cli {
            protocol,
            events,
            timeout,
            loss,
            cksum,
            debug: 0,
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn lossless_stop_and_wait_is_fully_efficient() {
        let report = run(run_config(2, 200, 20, 0, 0));
        assert_eq!(report.outcome, Outcome::EndOfSimulation);
        assert!(report.fatal.is_none());
        assert_eq!(report.efficiency, 100.0);
        assert_eq!(report.peer_stats[0].data_retransmitted, 0);
        assert_eq!(report.peer_stats[0].timeouts, 0);
    }

    #[test]
    fn lossless_selective_repeat_needs_no_retransmission() {
        let report = run(run_config(6, 1000, 40, 0, 0));
        assert_eq!(report.outcome, Outcome::EndOfSimulation);
        assert!(report.fatal.is_none());
        for stats in &report.peer_stats {
            assert_eq!(stats.data_lost, 0);
            assert_eq!(stats.data_retransmitted, 0);
            assert_eq!(stats.timeouts, 0);
        }
    }

    #[test]
    fn tight_timeout_under_heavy_loss_eventually_deadlocks_or_ends() {
        let report = run(run_config(6, 200, 1, 90, 0));
        assert!(matches!(
            report.outcome,
            Outcome::EndOfSimulation | Outcome::Deadlock
        ));
    }

    #[test]
    fn lossy_par_makes_progress_despite_retransmission() {
        let report = run(run_config(3, 1000, 40, 20, 20));
        assert!(report.fatal.is_none());
        assert!(report.peer_stats[1].payloads_accepted > 0);
        assert!(report.peer_stats[0].data_sent > report.peer_stats[1].payloads_accepted);
    }

    #[test]
    fn selective_repeat_under_heavy_loss_is_less_efficient_than_lossless() {
        let baseline = run(run_config(6, 1000, 40, 0, 0));
        assert_eq!(baseline.outcome, Outcome::EndOfSimulation);

        let lossy = run(run_config(6, 5000, 40, 30, 30));
        assert!(matches!(
            lossy.outcome,
            Outcome::EndOfSimulation | Outcome::Deadlock
        ));
        if lossy.outcome == Outcome::EndOfSimulation {
            assert!(lossy.efficiency < baseline.efficiency);
        }
    }

    #[test]
    fn queued_out_of_order_frame_surfaces_as_protocol_error() {
        use crate::frame::{Frame, FrameKind, Packet};
        use crate::worker::WorkerConfig;

        let (max_seq, nr_bufs) = protocol_window(2);
        let (inbound_tx, inbound_rx) = peer_channel();
        let (outbound_tx, _outbound_rx) = peer_channel();
        let (driver_ctrl, worker_ctrl) = control_pair();

        let cfg = WorkerConfig {
            id: 1,
            protocol: 2,
            max_seq,
            nr_bufs,
            timeout_interval: 0,
            pkt_loss: 0,
            garbled: 0,
            debug: 0,
        };

        let handle = thread::spawn(move || {
            let mut ctx = WorkerContext::new(
                cfg,
                outbound_tx,
                inbound_rx,
                worker_ctrl.down_rx,
                worker_ctrl.up_tx,
            );
            run_protocol2_receiver(&mut ctx)
        });

        let mut tick = 0u64;
        let mut round = |frame: Option<Frame>| {
            driver_ctrl.up_rx.recv().expect("worker exited early");
            if let Some(f) = frame {
                inbound_tx.send(f);
            }
            tick += DELTA;
            let _ = driver_ctrl.down_tx.send(ControlMsg::Tick(tick));
        };

        // An in-order frame takes two ticks to land: one for drain_inbound
        // to pick it up, one for the receiver to act on it.
        round(Some(Frame {
            kind: FrameKind::Data,
            seq: 0,
            ack: 0,
            info: Packet::from_counter(0),
        }));
        round(None);

        // A frame claiming counter 5 is next is out of order; rejected as
        // soon as it is drained and acted on.
        round(Some(Frame {
            kind: FrameKind::Data,
            seq: 0,
            ack: 0,
            info: Packet::from_counter(5),
        }));
        round(None);

        let err = handle
            .join()
            .expect("receiver thread panicked")
            .expect_err("out-of-order frame should be rejected");
        assert_eq!(
            err,
            SimError::OutOfOrderDelivery {
                peer: 1,
                expected: 1,
                actual: 5,
            }
        );
    }
}
