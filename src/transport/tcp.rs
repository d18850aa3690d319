use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::ClientConfig;
use crate::core::codec::PacketCodec;
use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::Message;
use crate::transport::half::Half;
use crate::transport::Transport;
use crate::utils::timeout::{until_cancelled, with_timeout_error, DEFAULT_TIMEOUT};

type FramedTcp = Framed<TcpStream, PacketCodec>;

/// Plain TCP transport carrying control-channel frames.
///
/// The framed stream is split on connect; the sink and the stream are locked
/// separately.
pub struct TcpTransport {
    address: String,
    connect_timeout: Duration,
    writer: Half<SplitSink<FramedTcp, Packet>>,
    reader: Half<SplitStream<FramedTcp>>,
    connected: AtomicBool,
    closed: CancellationToken,
}

impl TcpTransport {
    /// Transport for `address` (`host:port`), not yet connected.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: DEFAULT_TIMEOUT,
            writer: Half::empty(),
            reader: Half::empty(),
            connected: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.address()).with_connect_timeout(config.connect_timeout)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.closed.is_cancelled()
    }

    fn disposed_error() -> ProtocolError {
        ProtocolError::TransportError(constants::ERR_TRANSPORT_DISPOSED.to_string())
    }
}

impl Transport for TcpTransport {
    #[instrument(skip(self), fields(address = %self.address))]
    async fn connect(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Self::disposed_error());
        }

        let stream = with_timeout_error(
            async {
                TcpStream::connect(&self.address)
                    .await
                    .map_err(ProtocolError::from)
            },
            self.connect_timeout,
        )
        .await?;
        stream.set_nodelay(true)?;

        let (sink, stream) = Framed::new(stream, PacketCodec).split();
        self.writer.install(sink).await;
        self.reader.install(stream).await;

        // disposed while connecting
        if self.closed.is_cancelled() {
            self.writer.release();
            self.reader.release();
            return Err(Self::disposed_error());
        }

        self.connected.store(true, Ordering::Release);
        info!("TCP connection established");
        Ok(())
    }

    async fn send(&self, msg: &Message) -> Result<()> {
        let packet = msg.to_packet()?;
        let mut writer = self.writer.acquire(&self.closed).await?;
        let sink = writer.get()?;

        debug!(kind = %msg.kind(), bytes = packet.payload.len(), "Sending message");
        until_cancelled(sink.send(packet), &self.closed).await
    }

    async fn receive(&self) -> Result<Message> {
        let mut reader = self.reader.acquire(&self.closed).await?;
        let stream = reader.get()?;

        let next = until_cancelled(
            async { Ok::<_, ProtocolError>(stream.next().await) },
            &self.closed,
        )
        .await?;
        let packet = match next {
            Some(Ok(packet)) => packet,
            Some(Err(e)) => return Err(e),
            None => return Err(ProtocolError::ConnectionClosed),
        };

        Message::from_packet(&packet)
    }

    fn dispose(&self) {
        self.closed.cancel();
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        // halves held by an operation are dropped when that operation lets go
        self.writer.release();
        self.reader.release();
        if was_connected {
            info!(address = %self.address, "TCP connection released");
        }
    }
}
