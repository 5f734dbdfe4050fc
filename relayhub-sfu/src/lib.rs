//! relayhub SFU (Selective Forwarding Unit)
//!
//! Media-routing core of the relay. Each room receives one VP8 RTP stream over
//! UDP and forwards it to any number of WebRTC viewers. Viewers can be moved
//! between rooms at runtime without breaking their decoder state.
//!
//! ## Architecture
//!
//! - **`KeyframeBuffer`**: Keeps the latest complete frame for fast viewer start
//! - **`EgressStream`**: One viewer's output, renumbered into a private sequence/timestamp space
//! - **`IngressListener`**: UDP receive loop feeding a room
//! - **`Room`**: Rebases source timestamps into deltas and fans packets out
//! - **`Registry`**: Directory of rooms and viewers; implements switching
//! - **`WebRtcNegotiator`**: Offer/answer and transport setup for viewers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relayhub_sfu::{Registry, SfuConfig, WebRtcNegotiator};
//!
//! let config = SfuConfig::default();
//! let negotiator = Arc::new(WebRtcNegotiator::new(&config)?);
//! let registry = Registry::new(config, negotiator);
//!
//! let room = registry.add_room(0).await?;
//! let session = registry.add_viewer(offer).await?;
//! registry.switch(&session.stream.id, Some(&room.id)).await?;
//! ```

mod buffer;
mod config;
mod egress;
mod error;
mod ingress;
mod negotiator;
mod registry;
mod room;
mod types;

pub use buffer::KeyframeBuffer;
pub use config::{IngressMode, SfuConfig};
pub use egress::{EgressStream, StreamStats};
pub use error::{Error, Result};
pub use ingress::{IngressListener, Receiver};
pub use negotiator::{MediaSink, NegotiatedSession, Negotiator, RecordingSink, WebRtcNegotiator};
pub use registry::{Registry, RegistryStats, SwitchOutcome, ViewerSession};
pub use room::{Room, RoomStats};
pub use types::{RoomId, ViewerId};

pub use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
pub use webrtc::rtp::packet::Packet;
