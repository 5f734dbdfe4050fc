use thiserror::Error;

use crate::types::ViewerId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Viewer not found: {0}")]
    ViewerNotFound(ViewerId),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Media sink closed")]
    SinkClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
