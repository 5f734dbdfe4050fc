//! Relay configuration

use serde::{Deserialize, Serialize};

/// How an ingress listener hands datagrams to its room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngressMode {
    /// Parse RTP, rebase timestamps, renumber per viewer
    #[default]
    Rewrite,
    /// Forward datagrams byte-for-byte (no keyframe buffer, no renumbering)
    Passthrough,
}

/// Media-path configuration shared by rooms and viewer sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SfuConfig {
    /// ICE server URLs handed to every viewer peer connection (e.g. `stun:stun.l.google.com:19302`)
    pub ice_servers: Vec<String>,
    /// Receive buffer size for ingress datagrams (typically 1500 bytes for MTU)
    pub max_datagram_size: usize,
    /// Initial packet capacity reserved by each room's keyframe buffer
    pub keyframe_buffer_capacity: usize,
    pub ingress_mode: IngressMode,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            max_datagram_size: 1500,
            keyframe_buffer_capacity: 100,
            ingress_mode: IngressMode::Rewrite,
        }
    }
}
