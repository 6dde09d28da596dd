//! # Client Driver
//!
//! Connects, authenticates, then runs two tasks over the split connection:
//!
//! - a **writer task** that owns the frame sink and is the only thing that ever writes to
//!   the socket after the handshake, fed by [`ClientSender`] handles over an mpsc queue;
//! - a **receive task** that turns the inbound byte stream into [`Inbound`] items.
//!
//! Because every frame goes through the one writer, frames from concurrent senders are
//! never interleaved on the wire.
//!
//! The server answers with text status lines while frames start with a discriminant in
//! `0x01..=0x03`, so the receive task looks at the first pending byte to decide which of
//! the two to read.

use futures::SinkExt;
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tracing::{debug, info, instrument, warn};

use crate::config::NetworkConfig;
use crate::core::codec::FrameCodec;
use crate::core::frame::{decode_with_limit, Decoded, Frame, MessageType};
use crate::core::reader::read_line;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::client_handshake;
use crate::utils::timeout::with_timeout_error;

/// Something the server sent after the handshake
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A status line, trimmed
    Status(String),
    /// A frame, checked or not
    Frame(Decoded),
}

impl fmt::Display for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inbound::Status(line) => f.write_str(line),
            Inbound::Frame(Decoded::Message {
                frame,
                integrity_ok: true,
            }) => write!(f, "Received {frame}"),
            Inbound::Frame(Decoded::Message {
                frame,
                integrity_ok: false,
            }) => write!(f, "Received {} with invalid checksum", frame.message_type()),
            Inbound::Frame(Decoded::Unknown { type_byte }) => {
                write!(f, "Unknown message type: 0x{type_byte:02x}")
            }
        }
    }
}

/// Where received items are shown
pub trait MessageSink: Send {
    fn display(&mut self, inbound: &Inbound);
}

/// Read one inbound item. Returns `None` when the server closed at an item boundary.
pub async fn receive<R>(reader: &mut R, max_field_len: u32) -> Result<Option<Inbound>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let pending = reader.fill_buf().await?;
    let Some(&first) = pending.first() else {
        return Ok(None);
    };

    let inbound = if MessageType::from_byte(first).is_some() {
        Inbound::Frame(decode_with_limit(reader, max_field_len).await?)
    } else {
        Inbound::Status(read_line(reader).await?)
    };
    Ok(Some(inbound))
}

struct OutboundRequest {
    frame: Frame,
    done: oneshot::Sender<Result<()>>,
}

/// Cloneable handle for sending frames through the writer task
#[derive(Clone)]
pub struct ClientSender {
    tx: mpsc::Sender<OutboundRequest>,
}

impl ClientSender {
    /// Queue `frame` and wait until it has been flushed to the connection.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        let (done, ack) = oneshot::channel();
        self.tx
            .send(OutboundRequest { frame, done })
            .await
            .map_err(|_| ProtocolError::Custom(constants::ERR_WRITER_GONE.into()))?;
        ack.await
            .map_err(|_| ProtocolError::Custom(constants::ERR_WRITER_GONE.into()))?
    }

    pub async fn send_text(&self, text: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Frame::text(text)).await
    }

    pub async fn send_command(
        &self,
        command: impl Into<Vec<u8>>,
        parameter: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.send(Frame::command(command, parameter)).await
    }

    pub async fn send_data_packet(
        &self,
        int_field: u32,
        float_field: f64,
        text: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.send(Frame::data_packet(int_field, float_field, text))
            .await
    }

    /// Whether the writer task is still accepting frames
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Receiving end of an authenticated connection
pub struct Inbox {
    rx: mpsc::Receiver<Result<Inbound>>,
    reader: JoinHandle<()>,
}

impl Inbox {
    /// Next item from the server.
    ///
    /// `None` once the server has closed the connection; a transport or framing error
    /// is yielded once and then the inbox ends.
    pub async fn next(&mut self) -> Option<Result<Inbound>> {
        self.rx.recv().await
    }

    /// Hand every item to `sink` until the connection ends.
    pub async fn pump<S>(&mut self, sink: &mut S) -> Result<()>
    where
        S: MessageSink + ?Sized,
    {
        while let Some(item) = self.next().await {
            sink.display(&item?);
        }
        Ok(())
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// An authenticated client connection
pub struct Client {
    sender: ClientSender,
    inbox: Inbox,
    verdict: String,
    writer: JoinHandle<()>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("verdict", &self.verdict)
            .field("writer_open", &self.sender.is_open())
            .finish()
    }
}

impl Client {
    /// Connect to `config.client.address` and authenticate.
    ///
    /// The connection attempt and the handshake are each bounded by
    /// `config.client.connection_timeout`. A rejected
    /// handshake yields [`ProtocolError::AuthenticationRejected`] and the connection is
    /// dropped without sending anything else.
    #[instrument(skip(config, password), fields(address = %config.client.address))]
    pub async fn connect(config: &NetworkConfig, username: &str, password: &str) -> Result<Self> {
        let stream = with_timeout_error(
            async { Ok(TcpStream::connect(&config.client.address).await?) },
            config.client.connection_timeout,
        )
        .await?;
        stream.set_nodelay(true)?;
        debug!("Connected");

        with_timeout_error(
            Self::handshake_over(stream, config, username, password),
            config.client.connection_timeout,
        )
        .await
    }

    /// Authenticate over an already-connected stream and start the connection tasks.
    pub async fn handshake_over<S>(
        stream: S,
        config: &NetworkConfig,
        username: &str,
        password: &str,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let verdict = client_handshake(&mut reader, &mut write_half, username, password).await?;
        info!(%username, "Authenticated");

        let max_field_len = config.transport.max_field_size;
        let (tx, rx) = mpsc::channel(config.client.outbound_buffer);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.client.inbound_buffer);

        let writer = tokio::spawn(run_writer(
            FramedWrite::new(write_half, FrameCodec::new(max_field_len)),
            rx,
        ));
        let reader = tokio::spawn(run_receiver(reader, inbound_tx, max_field_len));

        Ok(Self {
            sender: ClientSender { tx },
            inbox: Inbox {
                rx: inbound_rx,
                reader,
            },
            verdict,
            writer,
        })
    }

    /// The verdict line the server sent
    pub fn verdict(&self) -> &str {
        &self.verdict
    }

    /// A new handle onto the writer task
    pub fn sender(&self) -> ClientSender {
        self.sender.clone()
    }

    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.sender.send(frame).await
    }

    pub async fn next_inbound(&mut self) -> Option<Result<Inbound>> {
        self.inbox.next().await
    }

    /// Separate the sending and receiving halves so they can be driven from different
    /// tasks. The writer keeps running until every sender is dropped.
    pub fn into_parts(self) -> (ClientSender, Inbox) {
        (self.sender, self.inbox)
    }

    /// Close the sending side and wait for queued frames to be flushed.
    ///
    /// Completes once every [`ClientSender`] clone has been dropped.
    pub async fn shutdown(self) -> Result<()> {
        let Client { sender, writer, .. } = self;
        drop(sender);
        writer
            .await
            .map_err(|e| ProtocolError::Custom(format!("Writer task failed: {e}")))
    }
}

async fn run_writer<W>(
    mut sink: FramedWrite<W, FrameCodec>,
    mut rx: mpsc::Receiver<OutboundRequest>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(OutboundRequest { frame, done }) = rx.recv().await {
        let kind = frame.message_type();
        let result = sink.send(frame).await;
        let broken = matches!(result, Err(ProtocolError::Io(_) | ProtocolError::ConnectionClosed));
        if let Err(e) = &result {
            warn!(%kind, error = %e, "Failed to send frame");
        } else {
            debug!(%kind, "Frame sent");
        }
        let _ = done.send(result);
        if broken {
            break;
        }
    }

    if let Err(e) = SinkExt::<Frame>::close(&mut sink).await {
        debug!(error = %e, "Error closing connection writer");
    }
    debug!("Writer task finished");
}

async fn run_receiver<R>(
    mut reader: R,
    tx: mpsc::Sender<Result<Inbound>>,
    max_field_len: u32,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        match receive(&mut reader, max_field_len).await {
            Ok(Some(inbound)) => {
                if tx.send(Ok(inbound)).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("Server closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Receive failed");
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}
