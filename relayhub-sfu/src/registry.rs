//! Registry - top-level directory of rooms and viewer sessions
//!
//! This module provides:
//! - Room creation (one UDP ingress each)
//! - Viewer session creation through a [`Negotiator`]
//! - Switching viewers between rooms
//! - Detaching and evicting viewers whose connection closed
//!
//! Room membership lives in each [`Room`]'s subscriber set. The registry only
//! maps ids to shared handles and never holds its own lock across an await.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::config::SfuConfig;
use crate::egress::EgressStream;
use crate::error::{Error, Result};
use crate::negotiator::Negotiator;
use crate::room::Room;
use crate::types::{RoomId, ViewerId};

/// Where a viewer ended up after a switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "roomId", rename_all = "snake_case")]
pub enum SwitchOutcome {
    /// Subscribed to the target room
    Joined(RoomId),
    /// No target was given; the viewer left its room
    Detached,
    /// The target does not exist; the viewer left its room and is in none
    TargetNotFound,
}

/// A freshly negotiated viewer
pub struct ViewerSession {
    pub stream: Arc<EgressStream>,
    pub answer: RTCSessionDescription,
}

#[derive(Default)]
struct RegistryState {
    rooms: HashMap<RoomId, Arc<Room>>,
    viewers: HashMap<ViewerId, Arc<EgressStream>>,
}

/// Registry statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryStats {
    pub rooms: usize,
    pub viewers: usize,
}

pub struct Registry {
    config: Arc<SfuConfig>,
    negotiator: Arc<dyn Negotiator>,
    state: RwLock<RegistryState>,
    /// Serializes switches so a viewer can never end up in two rooms
    switch_lock: Mutex<()>,
}

impl Registry {
    pub fn new(config: SfuConfig, negotiator: Arc<dyn Negotiator>) -> Arc<Self> {
        info!(
            max_datagram_size = config.max_datagram_size,
            ingress_mode = ?config.ingress_mode,
            "Registry initialized"
        );

        Arc::new(Self {
            config: Arc::new(config),
            negotiator,
            state: RwLock::new(RegistryState::default()),
            switch_lock: Mutex::new(()),
        })
    }

    /// Create a room listening on `port` (0 = OS-assigned)
    pub async fn add_room(&self, port: u16) -> Result<Arc<Room>> {
        let room = Room::bind(port, &self.config).await?;

        let mut state = self.state.write();
        state.rooms.insert(room.id.clone(), Arc::clone(&room));
        info!(room_id = %room.id, port = room.port(), total_rooms = state.rooms.len(), "Registered room");

        Ok(room)
    }

    /// Negotiate a viewer session and register it.
    ///
    /// When the viewer's connection closes, it is detached from every room and
    /// dropped from the registry.
    pub async fn add_viewer(self: &Arc<Self>, offer: RTCSessionDescription) -> Result<ViewerSession> {
        let session = self.negotiator.negotiate(offer).await?;
        let stream = Arc::new(EgressStream::new(ViewerId::generate(), session.sink));

        {
            let mut state = self.state.write();
            state.viewers.insert(stream.id.clone(), Arc::clone(&stream));
            info!(viewer_id = %stream.id, total_viewers = state.viewers.len(), "Registered viewer");
        }

        let registry = Arc::downgrade(self);
        let viewer_id = stream.id.clone();
        let closed = session.closed;
        tokio::spawn(async move {
            if closed.await.is_err() {
                debug!(viewer_id = %viewer_id, "Connection dropped without a close notification");
            }
            if let Some(registry) = registry.upgrade() {
                registry.evict_viewer(&viewer_id).await;
            }
        });

        Ok(ViewerSession {
            stream,
            answer: session.answer,
        })
    }

    /// Move a viewer to `target`, or out of every room when `target` is `None` or empty
    pub async fn switch(&self, viewer_id: &ViewerId, target: Option<&RoomId>) -> Result<SwitchOutcome> {
        let _guard = self.switch_lock.lock().await;

        let (viewer, target_room, rooms) = {
            let state = self.state.read();
            let viewer = state
                .viewers
                .get(viewer_id)
                .cloned()
                .ok_or_else(|| Error::ViewerNotFound(viewer_id.clone()))?;
            let target_room = target
                .filter(|id| !id.is_empty())
                .and_then(|id| state.rooms.get(id).cloned());
            let rooms: Vec<Arc<Room>> = state.rooms.values().cloned().collect();
            (viewer, target_room, rooms)
        };

        // A viewer should be in at most one room; scan them all regardless
        for room in &rooms {
            if room.has(viewer_id).await {
                room.remove_participant(&viewer).await;
            }
        }

        let outcome = match (target.filter(|id| !id.is_empty()), target_room) {
            (_, Some(room)) => {
                room.add_participant(Arc::clone(&viewer)).await;
                SwitchOutcome::Joined(room.id.clone())
            }
            (None, None) => SwitchOutcome::Detached,
            (Some(missing), None) => {
                warn!(viewer_id = %viewer_id, room_id = %missing, "Switch target not found, viewer detached");
                SwitchOutcome::TargetNotFound
            }
        };

        debug!(viewer_id = %viewer_id, outcome = ?outcome, "Switch complete");
        Ok(outcome)
    }

    /// Detach a viewer from all rooms and forget it
    async fn evict_viewer(&self, viewer_id: &ViewerId) {
        match self.switch(viewer_id, None).await {
            Ok(_) | Err(Error::ViewerNotFound(_)) => {}
            Err(e) => warn!(viewer_id = %viewer_id, error = %e, "Failed to detach closed viewer"),
        }

        if self.state.write().viewers.remove(viewer_id).is_some() {
            info!(viewer_id = %viewer_id, "Viewer connection closed, evicted");
        }
    }

    #[must_use]
    pub fn list_rooms(&self) -> Vec<Arc<Room>> {
        self.state.read().rooms.values().cloned().collect()
    }

    #[must_use]
    pub fn room(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.state.read().rooms.get(room_id).cloned()
    }

    #[must_use]
    pub fn viewer(&self, viewer_id: &ViewerId) -> Option<Arc<EgressStream>> {
        self.state.read().viewers.get(viewer_id).cloned()
    }

    #[must_use]
    pub fn get_stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            rooms: state.rooms.len(),
            viewers: state.viewers.len(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SfuConfig {
        &self.config
    }

    /// Stop every ingress and close every viewer connection
    pub async fn shutdown(&self) {
        let (rooms, viewers) = {
            let state = self.state.read();
            let rooms: Vec<Arc<Room>> = state.rooms.values().cloned().collect();
            let viewers: Vec<Arc<EgressStream>> = state.viewers.values().cloned().collect();
            (rooms, viewers)
        };

        info!(rooms = rooms.len(), viewers = viewers.len(), "Shutting down registry");

        for room in &rooms {
            room.close();
        }
        for viewer in &viewers {
            if let Err(e) = viewer.close().await {
                warn!(viewer_id = %viewer.id, error = %e, "Failed to close viewer connection");
            }
        }
    }
}
