//! Keyframe buffer for fast viewer start
//!
//! Keeps the most recent VP8 frame seen on a room's ingress so a newly joined
//! viewer can be primed immediately instead of waiting for the next frame.
//! Frame boundaries come from the payload descriptor S bit and the RTP marker
//! bit (RFC 7741 section 4.5.1).

use parking_lot::RwLock;
use tracing::warn;
use webrtc::rtp::codecs::vp8::Vp8Packet;
use webrtc::rtp::packet::Packet;
use webrtc::rtp::packetizer::Depacketizer;

#[derive(Default)]
struct BufferState {
    packets: Vec<Packet>,
    /// A partition head has been seen and the frame is not finished yet
    collecting: bool,
}

/// Single-frame packet cache
pub struct KeyframeBuffer {
    state: RwLock<BufferState>,
}

impl KeyframeBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(BufferState {
                packets: Vec::with_capacity(capacity),
                collecting: false,
            }),
        }
    }

    /// Offer a packet to the buffer. Returns whether it was kept.
    pub fn put(&self, packet: Packet) -> bool {
        let mut vp8 = Vp8Packet::default();
        if let Err(e) = vp8.depacketize(&packet.payload) {
            warn!(
                sequence_number = packet.header.sequence_number,
                error = %e,
                "Unable to parse VP8 payload"
            );
            return false;
        }

        let mut state = self.state.write();

        if vp8.s == 1 {
            // A new frame start always wins over an unfinished one
            if !state.collecting {
                let capacity = state.packets.len();
                state.packets = Vec::with_capacity(capacity);
            }
            state.packets.push(packet);
            state.collecting = true;
            return true;
        }

        if packet.header.marker {
            state.packets.push(packet);
            state.collecting = false;
            return true;
        }

        if state.collecting {
            state.packets.push(packet);
            return true;
        }

        false
    }

    /// Snapshot of the buffered frame
    #[must_use]
    pub fn packets(&self) -> Vec<Packet> {
        self.state.read().packets.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().packets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().packets.is_empty()
    }
}
