//! Frame and packet wire format.
//!
//! A [`Frame`] is the fixed-size record that crosses a peer channel. It
//! serializes to a fixed-size byte image (§6.3): one kind tag, two
//! big-endian sequence/ack numbers, and the four-byte packet payload. No
//! framing delimiters are needed because each channel message already
//! carries exactly one image.

/// Size in bytes of a [`Frame`]'s wire image: 1 (kind) + 4 (seq) + 4 (ack) + 4 (payload).
pub const FRAME_SIZE: usize = 13;

/// The kind of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameKind {
    /// Carries a network-layer payload.
    #[default]
    Data,
    /// Acknowledges frames up to and including `ack`.
    Ack,
    /// Negatively acknowledges the frame identified by `ack + 1`.
    Nak,
}

impl FrameKind {
    fn to_tag(self) -> u8 {
        match self {
            FrameKind::Data => 0,
            FrameKind::Ack => 1,
            FrameKind::Nak => 2,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FrameKind::Data),
            1 => Some(FrameKind::Ack),
            2 => Some(FrameKind::Nak),
            _ => None,
        }
    }
}

/// A fixed four-byte network-layer payload: a big-endian 32-bit sequence
/// counter, assigned by the sender's network-layer pump and checked for
/// strict `+1` monotonicity at the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Packet {
    data: [u8; 4],
}

impl Packet {
    /// Wraps a raw counter value as a packet payload.
    pub fn from_counter(counter: u32) -> Self {
        Self {
            data: counter.to_be_bytes(),
        }
    }

    /// Extracts the counter value carried by this packet.
    pub fn counter(&self) -> u32 {
        u32::from_be_bytes(self.data)
    }
}

/// A frame: the unit transmitted on a peer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    /// What kind of frame this is.
    pub kind: FrameKind,
    /// The frame's own sequence number (meaningful for data frames only).
    pub seq: u32,
    /// The acknowledgement/nak number carried by this frame.
    pub ack: u32,
    /// The network-layer packet carried by a data frame (zeroed otherwise).
    pub info: Packet,
}

impl Frame {
    /// Serializes this frame to its fixed-size wire image.
    pub fn to_bytes(self) -> [u8; FRAME_SIZE] {
        let mut buf = [0u8; FRAME_SIZE];
        buf[0] = self.kind.to_tag();
        buf[1..5].copy_from_slice(&self.seq.to_be_bytes());
        buf[5..9].copy_from_slice(&self.ack.to_be_bytes());
        buf[9..13].copy_from_slice(&self.info.data);
        buf
    }

    /// Parses a frame from its fixed-size wire image.
    ///
    /// Returns `None` if the image is malformed (wrong length or an
    /// unrecognized kind tag) — this never happens for frames produced by
    /// [`Frame::to_bytes`], so a malformed image indicates a bug in the
    /// transport rather than a simulated channel condition.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != FRAME_SIZE {
            return None;
        }
        let kind = FrameKind::from_tag(buf[0])?;
        let seq = u32::from_be_bytes(buf[1..5].try_into().ok()?);
        let ack = u32::from_be_bytes(buf[5..9].try_into().ok()?);
        let info = Packet {
            data: buf[9..13].try_into().ok()?,
        };
        Some(Frame {
            kind,
            seq,
            ack,
            info,
        })
    }
}

/// The event alphabet a protocol can observe. A protocol only ever sees
/// events from its declared subset; the worker runtime never emits an
/// event outside that subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// An uncorrupted frame has arrived.
    FrameArrival,
    /// A frame arrived with a simulated checksum error.
    ChecksumError,
    /// A data-frame timer expired.
    Timeout,
    /// The network layer has a new packet ready and is enabled.
    NetworkLayerReady,
    /// The auxiliary ack timer expired.
    AckTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_counter_round_trips() {
        let p = Packet::from_counter(0xdead_beef);
        assert_eq!(p.counter(), 0xdead_beef);
    }

    #[test]
    fn frame_wire_image_round_trips() {
        let f = Frame {
            kind: FrameKind::Nak,
            seq: 3,
            ack: 6,
            info: Packet::from_counter(42),
        };
        let bytes = f.to_bytes();
        assert_eq!(bytes.len(), FRAME_SIZE);
        let back = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn malformed_image_is_rejected() {
        assert!(Frame::from_bytes(&[0u8; FRAME_SIZE - 1]).is_none());
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[0] = 0xff;
        assert!(Frame::from_bytes(&bytes).is_none());
    }
}
