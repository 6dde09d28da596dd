//! # Server Session
//!
//! Per-connection state machine:
//!
//! ```text
//! Connecting -> Authenticating -> Authenticated -> Closed
//!                     |
//!                     +--------> Rejected ------> Closed
//! ```
//!
//! A session owns both halves of its connection and is never shared. After a successful
//! handshake it decodes frames one at a time and answers each with exactly one status
//! line. Checksum failures and unknown message types are answered and the loop keeps
//! going; transport failures close the session.

use futures::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio_util::codec::{FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, info, instrument, warn};

use crate::config::MAX_FIELD_SIZE;
use crate::core::frame::{decode_with_limit, Decoded};
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::handshake::{authenticate, AuthResult, CredentialStore};
use crate::protocol::status::Status;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout_error;

/// Lifecycle phase of a server session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Authenticating,
    Authenticated,
    Rejected,
    Closed,
}

impl Phase {
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Authenticated)
                | (Authenticating, Rejected)
                | (Rejected, Closed)
                | (Connecting, Closed)
                | (Authenticating, Closed)
                | (Authenticated, Closed)
        )
    }
}

/// How a session ended when it ended without a transport error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Credentials did not match; no frames were read
    Rejected,
    /// Peer closed the connection at a frame boundary
    Finished { username: String, frames: u64 },
}

/// Server side of one connection
pub struct Session<R, W> {
    reader: BufReader<R>,
    writer: FramedWrite<W, LinesCodec>,
    phase: Phase,
    peer: String,
    peer_username: Option<String>,
    frames: u64,
    max_field_len: u32,
    handshake_timeout: Option<Duration>,
    dispatcher: Dispatcher,
    metrics: Option<Arc<Metrics>>,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap the two halves of a freshly accepted connection
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: FramedWrite::new(writer, LinesCodec::new()),
            phase: Phase::Connecting,
            peer: String::from("unknown"),
            peer_username: None,
            frames: 0,
            max_field_len: MAX_FIELD_SIZE,
            handshake_timeout: None,
            dispatcher: Dispatcher::new(),
            metrics: None,
        }
    }

    /// Label used in logs, usually the peer address
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_max_field_len(mut self, max_field_len: u32) -> Self {
        self.max_field_len = max_field_len;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn peer_username(&self) -> Option<&str> {
        self.peer_username.as_deref()
    }

    /// Number of frames answered so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Drive the session to completion: handshake, then the message loop.
    ///
    /// Returns `Ok` when the peer was rejected or closed cleanly, and the transport or
    /// framing error otherwise. The session is `Closed` either way.
    #[instrument(skip_all, fields(peer = %self.peer))]
    pub async fn run(&mut self, store: &dyn CredentialStore) -> Result<SessionOutcome> {
        let result = self.run_inner(store).await;
        if self.phase != Phase::Closed {
            self.transition(Phase::Closed)?;
        }
        let _ = SinkExt::<&str>::close(&mut self.writer).await;

        match &result {
            Ok(SessionOutcome::Finished { username, frames }) => {
                info!(%username, frames, "Session finished");
            }
            Ok(SessionOutcome::Rejected) => {}
            Err(e) if e.is_disconnect() => warn!(error = %e, "Peer dropped mid-message"),
            Err(e) => warn!(error = %e, "Session aborted"),
        }
        result
    }

    async fn run_inner(&mut self, store: &dyn CredentialStore) -> Result<SessionOutcome> {
        let verdict = self.handshake(store).await?;
        let AuthResult::Authenticated { username } = verdict else {
            return Ok(SessionOutcome::Rejected);
        };

        while self.serve_next().await?.is_some() {}

        Ok(SessionOutcome::Finished {
            username,
            frames: self.frames,
        })
    }

    /// Run the handshake and write the verdict line.
    ///
    /// A rejected peer leaves the session in `Closed` without entering the message loop.
    pub async fn handshake(&mut self, store: &dyn CredentialStore) -> Result<AuthResult> {
        self.transition(Phase::Authenticating)?;

        let verdict = match self.handshake_timeout {
            Some(deadline) => {
                with_timeout_error(authenticate(&mut self.reader, store), deadline).await?
            }
            None => authenticate(&mut self.reader, store).await?,
        };

        if let Some(metrics) = &self.metrics {
            if verdict.is_authenticated() {
                metrics.handshake_success();
            } else {
                metrics.handshake_failed();
            }
        }
        self.write_line(verdict.verdict_line()).await?;

        match &verdict {
            AuthResult::Authenticated { username } => {
                info!(%username, "Authentication successful");
                self.peer_username = Some(username.clone());
                self.transition(Phase::Authenticated)?;
            }
            AuthResult::Rejected => {
                warn!("Authentication failed");
                self.transition(Phase::Rejected)?;
                self.transition(Phase::Closed)?;
            }
        }

        Ok(verdict)
    }

    /// Read, handle and answer one frame.
    ///
    /// Returns `None` when the peer closed the connection at a frame boundary.
    pub async fn serve_next(&mut self) -> Result<Option<Status>> {
        if self.phase != Phase::Authenticated {
            return Err(ProtocolError::Custom(format!(
                "Cannot read frames in phase {:?}",
                self.phase
            )));
        }

        if self.reader.fill_buf().await?.is_empty() {
            debug!("Connection closed by peer");
            self.transition(Phase::Closed)?;
            return Ok(None);
        }

        let decoded = decode_with_limit(&mut self.reader, self.max_field_len).await?;
        if let Some(metrics) = &self.metrics {
            metrics.frame_received(&decoded);
        }

        let status = self.handle(&decoded);
        self.write_line(&status.line()).await?;
        self.frames += 1;
        Ok(Some(status))
    }

    /// Decide the acknowledgement for one decoded frame.
    fn handle(&self, decoded: &Decoded) -> Status {
        match decoded {
            Decoded::Message {
                frame,
                integrity_ok: true,
            } => {
                debug!(kind = %frame.message_type(), content = %frame, "Frame received");
                match self.dispatcher.dispatch(frame) {
                    Ok(_) => Status::Received(frame.clone()),
                    Err(e) => {
                        warn!(kind = %frame.message_type(), error = %e, "Frame handler failed");
                        Status::HandlerFailed(frame.message_type())
                    }
                }
            }
            Decoded::Message {
                frame,
                integrity_ok: false,
            } => {
                warn!(kind = %frame.message_type(), "Checksum mismatch");
                Status::for_decoded(decoded)
            }
            Decoded::Unknown { type_byte } => {
                warn!(type_byte, "Unknown message type");
                Status::for_decoded(decoded)
            }
        }
    }

    fn transition(&mut self, next: Phase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(ProtocolError::Custom(format!(
                "Invalid session transition {:?} -> {:?}",
                self.phase, next
            )));
        }
        debug!(from = ?self.phase, to = ?next, "Session transition");
        self.phase = next;
        Ok(())
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.send(line).await.map_err(|e| match e {
            LinesCodecError::Io(io) => ProtocolError::from(io),
            LinesCodecError::MaxLineLengthExceeded => {
                ProtocolError::Custom("Status line too long".into())
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::core::frame::{Frame, MessageType};
    use crate::protocol::handshake::{sha256_hex, Credential, MemoryCredentialStore};
    use crate::protocol::status::{AUTH_FAILED, AUTH_SUCCESS};
    use tokio::io::AsyncReadExt;

    fn store() -> MemoryCredentialStore {
        MemoryCredentialStore::new()
            .with_credential(Credential::from_password("user1", "password").unwrap())
    }

    fn handshake_bytes(user: &str, password: &str) -> Vec<u8> {
        format!("{user}\n{}\n", sha256_hex(password)).into_bytes()
    }

    fn lines(out: &[u8]) -> Vec<String> {
        String::from_utf8(out.to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn phase_transitions() {
        assert!(Phase::Connecting.can_transition_to(Phase::Authenticating));
        assert!(Phase::Authenticating.can_transition_to(Phase::Rejected));
        assert!(Phase::Rejected.can_transition_to(Phase::Closed));
        assert!(!Phase::Rejected.can_transition_to(Phase::Authenticated));
        assert!(!Phase::Connecting.can_transition_to(Phase::Authenticated));
        assert!(!Phase::Closed.can_transition_to(Phase::Authenticating));
    }

    #[tokio::test]
    async fn rejected_peer_never_reaches_message_loop() {
        let mut input = handshake_bytes("user1", "wrong");
        input.extend(Frame::text("ignored").to_bytes().unwrap());
        let mut out = Vec::new();

        let mut session = Session::new(&input[..], &mut out);
        let outcome = session.run(&store()).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Rejected);
        assert_eq!(session.phase(), Phase::Closed);
        assert_eq!(session.frames(), 0);
        drop(session);
        assert_eq!(lines(&out), vec![AUTH_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn finished_session_shuts_down_its_writer() {
        let input = handshake_bytes("user1", "wrong");
        let (writer, mut peer) = tokio::io::duplex(1024);

        let mut session = Session::new(&input[..], writer);
        session.run(&store()).await.unwrap();

        let mut out = Vec::new();
        peer.read_to_end(&mut out).await.unwrap();
        assert_eq!(lines(&out), vec![AUTH_FAILED.to_string()]);
        drop(session);
    }

    #[tokio::test]
    async fn answers_one_line_per_frame() {
        let mut input = handshake_bytes("user1", "password");
        input.extend(Frame::text("hello").to_bytes().unwrap());
        let mut corrupt = Frame::command("status", "now").to_bytes().unwrap();
        corrupt[6] ^= 0x01;
        input.extend(corrupt);
        input.push(0x09);
        input.extend(Frame::data_packet(42, 0.25, "ok").to_bytes().unwrap());
        let mut out = Vec::new();

        let mut session = Session::new(&input[..], &mut out);
        let outcome = session.run(&store()).await.unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::Finished {
                username: "user1".into(),
                frames: 4
            }
        );
        assert_eq!(session.peer_username(), Some("user1"));
        drop(session);
        assert_eq!(
            lines(&out),
            vec![
                AUTH_SUCCESS.to_string(),
                "Text message received successfully".to_string(),
                "Invalid command message checksum".to_string(),
                "Unknown message type: 0x09".to_string(),
                "Data packet received successfully: 42, 0.25, ok".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn truncated_frame_is_an_error_and_closes() {
        let mut input = handshake_bytes("user1", "password");
        let frame = Frame::text("hello").to_bytes().unwrap();
        input.extend_from_slice(&frame[..frame.len() - 1]);
        let mut out = Vec::new();

        let mut session = Session::new(&input[..], &mut out);
        let err = session.run(&store()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
        assert_eq!(session.phase(), Phase::Closed);
    }

    #[tokio::test]
    async fn oversized_field_closes_session() {
        let mut input = handshake_bytes("user1", "password");
        input.push(0x01);
        input.extend_from_slice(&1_000u32.to_be_bytes());
        let mut out = Vec::new();

        let mut session = Session::new(&input[..], &mut out).with_max_field_len(64);
        let err = session.run(&store()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedField { len: 1000, max: 64 }));
    }

    #[tokio::test]
    async fn handler_failure_is_reported_and_loop_continues() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .register(MessageType::Text, |_| Err(ProtocolError::Custom("nope".into())))
            .unwrap();

        let mut input = handshake_bytes("user1", "password");
        input.extend(Frame::text("a").to_bytes().unwrap());
        input.extend(Frame::command("b", "c").to_bytes().unwrap());
        let mut out = Vec::new();

        let mut session = Session::new(&input[..], &mut out).with_dispatcher(dispatcher);
        session.run(&store()).await.unwrap();
        drop(session);
        assert_eq!(
            lines(&out)[1..],
            [
                "Failed to process text message".to_string(),
                "Command message received successfully".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn serve_next_requires_authentication() {
        let mut out = Vec::new();
        let mut session = Session::new(&b""[..], &mut out);
        assert!(session.serve_next().await.is_err());
    }

    #[tokio::test]
    async fn metrics_follow_the_session() {
        let metrics = Arc::new(Metrics::new());
        let mut input = handshake_bytes("user1", "password");
        input.extend(Frame::text("hello").to_bytes().unwrap());
        input.push(0xEE);
        let mut out = Vec::new();

        let mut session =
            Session::new(&input[..], &mut out).with_metrics(Arc::clone(&metrics));
        session.run(&store()).await.unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.handshakes_success, 1);
        assert_eq!(snapshot.frames_ok, 1);
        assert_eq!(snapshot.unknown_types, 1);
    }
}
