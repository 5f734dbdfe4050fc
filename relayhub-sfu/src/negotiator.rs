//! Viewer session negotiation
//!
//! The relay core only ever writes packets into a [`MediaSink`]. Producing one
//! (offer/answer, ICE, DTLS) is the job of a [`Negotiator`]; the production
//! implementation is [`WebRtcNegotiator`], built on the `webrtc` crate.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::configure_rtcp_reports;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry as InterceptorRegistry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};

use crate::config::SfuConfig;
use crate::error::{Error, Result};

/// Outbound media handle of one negotiated viewer connection
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Write one RTP packet as-is
    async fn write_rtp(&self, packet: &Packet) -> Result<()>;

    /// Write an already serialized RTP datagram
    async fn write_raw(&self, data: &[u8]) -> Result<()>;

    /// Tear down the underlying connection
    async fn close(&self) -> Result<()>;
}

/// Result of a successful negotiation
pub struct NegotiatedSession {
    /// Local description to return to the viewer
    pub answer: RTCSessionDescription,
    pub sink: Arc<dyn MediaSink>,
    /// Fires once when the connection reaches the closed state
    pub closed: oneshot::Receiver<()>,
}

#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn negotiate(&self, offer: RTCSessionDescription) -> Result<NegotiatedSession>;
}

/// Negotiates one send-only VP8 track per viewer
pub struct WebRtcNegotiator {
    api: API,
    ice_servers: Vec<String>,
}

impl WebRtcNegotiator {
    pub fn new(config: &SfuConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = configure_rtcp_reports(InterceptorRegistry::new());

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        info!(
            ice_servers = config.ice_servers.len(),
            "WebRTC negotiator initialized"
        );

        Ok(Self {
            api,
            ice_servers: config.ice_servers.clone(),
        })
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }

    async fn setup(
        &self,
        peer_connection: &Arc<RTCPeerConnection>,
        offer: RTCSessionDescription,
    ) -> Result<(RTCSessionDescription, Arc<TrackLocalStaticRTP>)> {
        let track = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            "relayhub".to_owned(),
        ));

        let rtp_sender = peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // Drain RTCP so interceptors keep running; ends when the sender closes
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        peer_connection.set_remote_description(offer).await?;

        let mut gather_complete = peer_connection.gathering_complete_promise().await;
        let answer = peer_connection.create_answer(None).await?;
        peer_connection.set_local_description(answer).await?;
        let _ = gather_complete.recv().await;

        let local = peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::Negotiation("local description missing after gathering".to_string()))?;

        Ok((local, track))
    }
}

#[async_trait]
impl Negotiator for WebRtcNegotiator {
    async fn negotiate(&self, offer: RTCSessionDescription) -> Result<NegotiatedSession> {
        let peer_connection = Arc::new(self.api.new_peer_connection(self.rtc_configuration()).await?);

        let weak_pc: Weak<RTCPeerConnection> = Arc::downgrade(&peer_connection);
        peer_connection.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            debug!(state = %state, "ICE connection state changed");
            let weak_pc = weak_pc.clone();
            Box::pin(async move {
                if state == RTCIceConnectionState::Failed {
                    if let Some(pc) = weak_pc.upgrade() {
                        if let Err(e) = pc.close().await {
                            warn!(error = %e, "Cannot close peer connection after ICE failure");
                        }
                    }
                }
            })
        }));

        let (closed_tx, closed_rx) = oneshot::channel();
        let closed_tx = Arc::new(Mutex::new(Some(closed_tx)));
        peer_connection.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(state = %state, "Peer connection state changed");
            if state == RTCPeerConnectionState::Closed {
                if let Some(tx) = closed_tx.lock().take() {
                    let _ = tx.send(());
                }
            }
            Box::pin(async {})
        }));

        match self.setup(&peer_connection, offer).await {
            Ok((answer, track)) => Ok(NegotiatedSession {
                answer,
                sink: Arc::new(TrackSink {
                    track,
                    peer_connection,
                }),
                closed: closed_rx,
            }),
            Err(e) => {
                warn!(error = %e, "Viewer negotiation failed");
                if let Err(close_err) = peer_connection.close().await {
                    warn!(error = %close_err, "Cannot close peer connection after failed negotiation");
                }
                Err(e)
            }
        }
    }
}

/// [`MediaSink`] backed by a local static RTP track
struct TrackSink {
    track: Arc<TrackLocalStaticRTP>,
    peer_connection: Arc<RTCPeerConnection>,
}

#[async_trait]
impl MediaSink for TrackSink {
    async fn write_rtp(&self, packet: &Packet) -> Result<()> {
        self.track.write_rtp(packet).await?;
        Ok(())
    }

    async fn write_raw(&self, data: &[u8]) -> Result<()> {
        self.track.write(data).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// In-memory sink, useful for tests and for diagnosing the media path
#[derive(Default)]
pub struct RecordingSink {
    packets: Mutex<Vec<Packet>>,
    raw: Mutex<Vec<Bytes>>,
    closed: Mutex<bool>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets written so far, in write order
    #[must_use]
    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().clone()
    }

    #[must_use]
    pub fn raw(&self) -> Vec<Bytes> {
        self.raw.lock().clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

#[async_trait]
impl MediaSink for RecordingSink {
    async fn write_rtp(&self, packet: &Packet) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SinkClosed);
        }
        self.packets.lock().push(packet.clone());
        Ok(())
    }

    async fn write_raw(&self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SinkClosed);
        }
        self.raw.lock().push(Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}
