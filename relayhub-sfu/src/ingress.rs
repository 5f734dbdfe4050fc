//! UDP ingress
//!
//! Each room owns one listener. The listener runs a single receive task for
//! the socket's lifetime, so packets reach the room in arrival order.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::rtp::packet::Packet;
use webrtc::util::marshal::Unmarshal;

use crate::config::IngressMode;
use crate::error::Result;

/// Consumer of ingress datagrams
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Handle a datagram that is forwarded without parsing
    async fn receive_raw(&self, data: Bytes) -> Result<()>;

    /// Handle a parsed RTP packet
    async fn receive_parsed(&self, packet: Packet) -> Result<()>;
}

/// Bound UDP socket feeding one [`Receiver`]
pub struct IngressListener {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    max_datagram_size: usize,
    mode: IngressMode,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IngressListener {
    /// Bind `0.0.0.0:port`. Port 0 lets the OS pick one.
    pub async fn bind(port: u16, max_datagram_size: usize, mode: IngressMode) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        let local_addr = socket.local_addr()?;

        info!(bind_addr = %local_addr, mode = ?mode, "Ingress listener bound");

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            max_datagram_size,
            mode,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    /// Spawn the receive loop. The listener only holds a weak handle, so it
    /// never keeps its receiver alive on its own.
    pub fn start(&self, receiver: Weak<dyn Receiver>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let socket = Arc::clone(&self.socket);
        let cancel = self.cancel.clone();
        let max_datagram_size = self.max_datagram_size;
        let mode = self.mode;
        let port = self.local_addr.port();

        *task = Some(tokio::spawn(async move {
            Self::run(socket, receiver, cancel, max_datagram_size, mode).await;
            info!(port, "Ingress receive loop stopped");
        }));
    }

    async fn run(
        socket: Arc<UdpSocket>,
        receiver: Weak<dyn Receiver>,
        cancel: CancellationToken,
        max_datagram_size: usize,
        mode: IngressMode,
    ) {
        let mut buf = vec![0u8; max_datagram_size];

        loop {
            let len = tokio::select! {
                () = cancel.cancelled() => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, _)) => len,
                    Err(e) => {
                        warn!(error = %e, "Failed to receive UDP datagram");
                        break;
                    }
                },
            };

            let Some(receiver) = receiver.upgrade() else {
                debug!("Ingress receiver dropped");
                break;
            };

            let result = match mode {
                IngressMode::Passthrough => receiver.receive_raw(Bytes::copy_from_slice(&buf[..len])).await,
                IngressMode::Rewrite => {
                    let mut raw = &buf[..len];
                    match Packet::unmarshal(&mut raw) {
                        Ok(packet) => receiver.receive_parsed(packet).await,
                        Err(e) => {
                            // Malformed datagrams are dropped; the loop keeps running
                            warn!(len, error = %e, "Unable to unmarshal RTP packet");
                            continue;
                        }
                    }
                }
            };

            if let Err(e) = result {
                warn!(error = %e, "Receiver rejected packet");
            }
        }
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the receive loop; the socket is released once the task exits
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for IngressListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
