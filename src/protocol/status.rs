//! Status lines the server writes back.
//!
//! Exactly one line per handshake verdict and one per processed frame. The wording is
//! application-level; clients surface it verbatim.

use std::fmt;

use crate::core::frame::{Decoded, Frame, MessageType};

pub const AUTH_SUCCESS: &str = "Authentication successful";
pub const AUTH_FAILED: &str = "Authentication failed";

/// Per-frame acknowledgement
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// Intact frame, handled
    Received(Frame),
    /// Checksum trailer did not match
    InvalidChecksum(MessageType),
    /// Discriminant not recognised
    UnknownType(u8),
    /// Intact frame, but a registered handler failed
    HandlerFailed(MessageType),
}

impl Status {
    /// Status for a decode outcome, assuming any handler succeeded
    pub fn for_decoded(decoded: &Decoded) -> Self {
        match decoded {
            Decoded::Message {
                frame,
                integrity_ok: true,
            } => Status::Received(frame.clone()),
            Decoded::Message {
                frame,
                integrity_ok: false,
            } => Status::InvalidChecksum(frame.message_type()),
            Decoded::Unknown { type_byte } => Status::UnknownType(*type_byte),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Received(_))
    }

    /// The line as written to the wire, without the trailing newline
    pub fn line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Received(Frame::Text { .. }) => {
                f.write_str("Text message received successfully")
            }
            Status::Received(Frame::Command { .. }) => {
                f.write_str("Command message received successfully")
            }
            Status::Received(Frame::DataPacket {
                int_field,
                float_field,
                text,
            }) => write!(
                f,
                "Data packet received successfully: {}, {}, {}",
                int_field,
                float_field,
                sanitize(&String::from_utf8_lossy(text))
            ),
            Status::InvalidChecksum(kind) => write!(f, "Invalid {kind} checksum"),
            Status::UnknownType(byte) => write!(f, "Unknown message type: 0x{byte:02x}"),
            Status::HandlerFailed(kind) => write!(f, "Failed to process {kind}"),
        }
    }
}

/// Keep peer-supplied text from splitting the reply into several lines.
fn sanitize(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
