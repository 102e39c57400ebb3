//! The six unidirectional channels that connect the driver to its two peer
//! workers (§5): two peer-to-peer frame channels carrying raw wire images,
//! and two driver<->worker control channels per peer.
//!
//! Everything here is plain `std::sync::mpsc` — there is no shared memory
//! and no locking anywhere in the simulation path.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::frame::{Frame, FRAME_SIZE};

/// The receiving half of a peer-to-peer transport: reads back wire images
/// sent by the peer holding the matching [`PeerChannelTx`].
pub struct PeerChannelRx {
    rx: Receiver<[u8; FRAME_SIZE]>,
}

impl PeerChannelRx {
    /// Drains every currently queued frame without blocking.
    pub fn drain(&self) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Ok(bytes) = self.rx.try_recv() {
            if let Some(frame) = Frame::from_bytes(&bytes) {
                out.push(frame);
            }
        }
        out
    }
}

/// The transmitting half of a peer-to-peer transport.
pub struct PeerChannelTx {
    tx: Sender<[u8; FRAME_SIZE]>,
}

impl PeerChannelTx {
    /// Transmits a frame's wire image. A closed receiver (the peer thread
    /// has already exited) is tolerated exactly like a lost frame: it is
    /// silently dropped rather than propagated as an error.
    pub fn send(&self, frame: Frame) {
        let _ = self.tx.send(frame.to_bytes());
    }
}

/// Builds one direction of a peer frame channel.
pub fn peer_channel() -> (PeerChannelTx, PeerChannelRx) {
    let (tx, rx) = mpsc::channel();
    (PeerChannelTx { tx }, PeerChannelRx { rx })
}

/// A message the driver sends a worker on its down-channel: either the new
/// current tick (the worker's turn to run), or the end-of-simulation
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMsg {
    /// It is tick `T`; run until no more progress is possible.
    Tick(u64),
    /// End the simulation: flush statistics and exit.
    Terminate,
}

/// A status word a worker sends the driver on its up-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// The worker made progress (consumed or produced an event).
    Ok,
    /// The worker is idle: no event was possible and no timer is armed.
    Nothing,
}

/// One worker's half of the driver<->worker control channels.
pub struct WorkerControl {
    /// Receives ticks and the termination sentinel from the driver.
    pub down_rx: Receiver<ControlMsg>,
    /// Reports status words back to the driver.
    pub up_tx: Sender<WorkerStatus>,
}

/// The driver's half of one worker's control channels.
pub struct DriverControl {
    /// Sends ticks and the termination sentinel to the worker.
    pub down_tx: Sender<ControlMsg>,
    /// Receives status words from the worker.
    pub up_rx: Receiver<WorkerStatus>,
}

/// Builds one driver/worker control channel pair.
pub fn control_pair() -> (DriverControl, WorkerControl) {
    let (down_tx, down_rx) = mpsc::channel();
    let (up_tx, up_rx) = mpsc::channel();
    (
        DriverControl { down_tx, up_rx },
        WorkerControl { down_rx, up_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameKind, Packet};

    #[test]
    fn peer_channel_round_trips_wire_images() {
        let (tx, rx) = peer_channel();
        let f = Frame {
            kind: FrameKind::Data,
            seq: 1,
            ack: 0,
            info: Packet::from_counter(7),
        };
        tx.send(f);
        let drained = rx.drain();
        assert_eq!(drained, vec![f]);
    }

    #[test]
    fn control_pair_carries_tick_and_terminate() {
        let (driver, worker) = control_pair();
        driver.down_tx.send(ControlMsg::Tick(10)).unwrap();
        assert_eq!(worker.down_rx.recv().unwrap(), ControlMsg::Tick(10));
        worker.up_tx.send(WorkerStatus::Ok).unwrap();
        assert_eq!(driver.up_rx.recv().unwrap(), WorkerStatus::Ok);
        driver.down_tx.send(ControlMsg::Terminate).unwrap();
        assert_eq!(worker.down_rx.recv().unwrap(), ControlMsg::Terminate);
    }
}
