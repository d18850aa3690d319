//! In-memory transport.
//!
//! A bidirectional [`MemoryTransport`] pair backed by tokio channels. Useful for
//! tests and for embedding a client next to an in-process server.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::Message;
use crate::transport::half::Half;
use crate::transport::Transport;
use crate::utils::timeout::until_cancelled;

/// A message transport backed by in-process channels.
///
/// Create connected endpoints with [`memory_transport_pair`].
pub struct MemoryTransport {
    tx: Half<mpsc::Sender<Message>>,
    rx: Half<mpsc::Receiver<Message>>,
    connected: AtomicBool,
    closed: CancellationToken,
}

impl MemoryTransport {
    fn new(tx: mpsc::Sender<Message>, rx: mpsc::Receiver<Message>) -> Self {
        Self {
            tx: Half::new(tx),
            rx: Half::new(rx),
            connected: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.is_disposed()
    }

    pub fn is_disposed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Create a connected pair of in-memory transports.
///
/// `buffer` is the channel capacity for each direction. Each endpoint must still
/// have `connect()` called before it can send.
pub fn memory_transport_pair(buffer: usize) -> (MemoryTransport, MemoryTransport) {
    let (a_to_b_tx, a_to_b_rx) = mpsc::channel(buffer);
    let (b_to_a_tx, b_to_a_rx) = mpsc::channel(buffer);

    let a = MemoryTransport::new(a_to_b_tx, b_to_a_rx);
    let b = MemoryTransport::new(b_to_a_tx, a_to_b_rx);
    (a, b)
}

impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(ProtocolError::TransportError(
                constants::ERR_TRANSPORT_DISPOSED.to_string(),
            ));
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn send(&self, msg: &Message) -> Result<()> {
        if !self.is_connected() {
            return Err(ProtocolError::TransportError(
                constants::ERR_NOT_CONNECTED.to_string(),
            ));
        }

        let mut tx = self.tx.acquire(&self.closed).await?;
        let sender = tx.get()?;
        until_cancelled(
            async {
                sender.send(msg.clone()).await.map_err(|_| {
                    ProtocolError::TransportError(constants::ERR_PEER_DISCONNECTED.to_string())
                })
            },
            &self.closed,
        )
        .await
    }

    async fn receive(&self) -> Result<Message> {
        let mut rx = self.rx.acquire(&self.closed).await?;
        let receiver = rx.get()?;
        until_cancelled(
            async { receiver.recv().await.ok_or(ProtocolError::ConnectionClosed) },
            &self.closed,
        )
        .await
    }

    fn dispose(&self) {
        self.closed.cancel();
        self.connected.store(false, Ordering::Release);
        let released_tx = self.tx.release();
        let released_rx = self.rx.release();
        if released_tx || released_rx {
            debug!("Memory transport released");
        }
    }
}
