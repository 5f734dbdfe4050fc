//! Per-viewer outbound stream
//!
//! Every viewer gets its own sequence number and timestamp space. Incoming
//! packets carry timestamp deltas (see [`crate::room`]); the stream sums them
//! into a private running clock and renumbers packets consecutively, so the
//! viewer's decoder sees one continuous stream no matter which room feeds it.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use webrtc::rtp::packet::Packet;
use webrtc::util::marshal::MarshalSize;

use crate::error::Result;
use crate::negotiator::MediaSink;
use crate::types::ViewerId;

#[derive(Debug, Default)]
struct RewriteState {
    sequence_number: u16,
    timestamp: u32,
}

struct StreamStatsInner {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    write_errors: AtomicU64,
}

/// Stream statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub write_errors: u64,
}

/// One viewer's outbound media stream
pub struct EgressStream {
    pub id: ViewerId,
    sink: Arc<dyn MediaSink>,
    /// Held across the sink write so concurrent fan-outs never interleave
    state: Mutex<RewriteState>,
    stats: StreamStatsInner,
}

impl EgressStream {
    pub fn new(id: ViewerId, sink: Arc<dyn MediaSink>) -> Self {
        Self {
            id,
            sink,
            state: Mutex::new(RewriteState::default()),
            stats: StreamStatsInner {
                packets_sent: AtomicU64::new(0),
                bytes_sent: AtomicU64::new(0),
                write_errors: AtomicU64::new(0),
            },
        }
    }

    /// Rewrite a delta-timestamped packet into this stream's numbering and send it
    pub async fn write_rtp(&self, mut packet: Packet) -> Result<()> {
        let mut state = self.state.lock().await;

        state.timestamp = state.timestamp.wrapping_add(packet.header.timestamp);
        packet.header.timestamp = state.timestamp;
        packet.header.sequence_number = state.sequence_number;
        state.sequence_number = state.sequence_number.wrapping_add(1);

        let size = packet.header.marshal_size() + packet.payload.len();
        let result = self.sink.write_rtp(&packet).await;
        self.record(size, result.is_ok());
        result
    }

    /// Forward an already serialized datagram without touching its numbering
    pub async fn write_raw(&self, data: &[u8]) -> Result<()> {
        let _state = self.state.lock().await;
        let result = self.sink.write_raw(data).await;
        self.record(data.len(), result.is_ok());
        result
    }

    /// Close the underlying connection
    pub async fn close(&self) -> Result<()> {
        debug!(viewer_id = %self.id, "Closing egress stream");
        self.sink.close().await
    }

    fn record(&self, size: usize, ok: bool) {
        if ok {
            self.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
            self.stats.bytes_sent.fetch_add(size as u64, Ordering::Relaxed);
        } else {
            self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            packets_sent: self.stats.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
            write_errors: self.stats.write_errors.load(Ordering::Relaxed),
        }
    }
}
