//! Room: one ingress source fanned out to many viewers

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use webrtc::rtp::packet::Packet;

use crate::buffer::KeyframeBuffer;
use crate::config::SfuConfig;
use crate::egress::EgressStream;
use crate::error::Result;
use crate::ingress::{IngressListener, Receiver};
use crate::types::{RoomId, ViewerId};

#[derive(Default)]
struct RoomState {
    participants: HashMap<ViewerId, Arc<EgressStream>>,
    /// Absolute source timestamp of the previous packet
    last_timestamp: Option<u32>,
}

/// Fan-out hub bound to one UDP ingress
pub struct Room {
    pub id: RoomId,
    ingress: IngressListener,
    state: RwLock<RoomState>,
    keyframes: KeyframeBuffer,
    packets_received: AtomicU64,
    packets_buffered: AtomicU64,
}

impl Room {
    /// Bind the ingress socket and start receiving
    pub async fn bind(port: u16, config: &SfuConfig) -> Result<Arc<Self>> {
        let ingress = IngressListener::bind(port, config.max_datagram_size, config.ingress_mode).await?;
        let room = Arc::new(Self::with_ingress(RoomId::generate(), ingress, config));

        let receiver: Weak<dyn Receiver> = Arc::downgrade(&room) as Weak<dyn Receiver>;
        room.ingress.start(receiver);

        info!(room_id = %room.id, port = room.port(), "Room created");
        Ok(room)
    }

    fn with_ingress(id: RoomId, ingress: IngressListener, config: &SfuConfig) -> Self {
        Self {
            id,
            ingress,
            state: RwLock::new(RoomState::default()),
            keyframes: KeyframeBuffer::new(config.keyframe_buffer_capacity),
            packets_received: AtomicU64::new(0),
            packets_buffered: AtomicU64::new(0),
        }
    }

    /// Subscribe a viewer and prime it with the buffered frame
    pub async fn add_participant(&self, stream: Arc<EgressStream>) {
        let mut state = self.state.write().await;
        state.participants.insert(stream.id.clone(), Arc::clone(&stream));

        // Buffered packets already carry rebased deltas
        let buffered = self.keyframes.packets();
        let replayed = buffered.len();
        for packet in buffered {
            if let Err(e) = stream.write_rtp(packet).await {
                warn!(
                    room_id = %self.id,
                    viewer_id = %stream.id,
                    error = %e,
                    "Unable to replay buffered packet"
                );
            }
        }

        info!(
            room_id = %self.id,
            viewer_id = %stream.id,
            replayed,
            participants = state.participants.len(),
            "Participant added"
        );
    }

    pub async fn remove_participant(&self, stream: &EgressStream) {
        let mut state = self.state.write().await;
        if state.participants.remove(&stream.id).is_some() {
            info!(
                room_id = %self.id,
                viewer_id = %stream.id,
                participants = state.participants.len(),
                "Participant removed"
            );
        }
    }

    pub async fn has(&self, viewer_id: &ViewerId) -> bool {
        self.state.read().await.participants.contains_key(viewer_id)
    }

    pub async fn participants(&self) -> Vec<Arc<EgressStream>> {
        self.state.read().await.participants.values().cloned().collect()
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.ingress.port()
    }

    #[must_use]
    pub fn keyframe_buffer(&self) -> &KeyframeBuffer {
        &self.keyframes
    }

    /// Stop the ingress receive loop
    pub fn close(&self) {
        self.ingress.close();
    }

    pub async fn get_stats(&self) -> RoomStats {
        RoomStats {
            participant_count: self.state.read().await.participants.len(),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_buffered: self.packets_buffered.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Receiver for Room {
    async fn receive_raw(&self, data: Bytes) -> Result<()> {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read().await;

        for participant in state.participants.values() {
            if let Err(e) = participant.write_raw(&data).await {
                warn!(
                    room_id = %self.id,
                    viewer_id = %participant.id,
                    error = %e,
                    "Unable to write data to egress stream"
                );
            }
        }

        Ok(())
    }

    async fn receive_parsed(&self, mut packet: Packet) -> Result<()> {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.write().await;

        let absolute = packet.header.timestamp;
        packet.header.timestamp = match state.last_timestamp {
            None => 0,
            Some(last) => absolute.wrapping_sub(last),
        };
        state.last_timestamp = Some(absolute);

        // Rebase state is settled; fan out under the shared lock
        let state = state.downgrade();

        if self.keyframes.put(packet.clone()) {
            self.packets_buffered.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!(
                room_id = %self.id,
                sequence_number = packet.header.sequence_number,
                "Packet not buffered"
            );
        }

        for participant in state.participants.values() {
            if let Err(e) = participant.write_rtp(packet.clone()).await {
                warn!(
                    room_id = %self.id,
                    viewer_id = %participant.id,
                    error = %e,
                    "Unable to write data to egress stream"
                );
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoomStats {
    pub participant_count: usize,
    pub packets_received: u64,
    pub packets_buffered: u64,
}
