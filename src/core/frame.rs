//! # Frames
//!
//! The three application messages and their wire form.
//!
//! ```text
//! 0x01 Text        [len u32] [text]
//! 0x02 Command     [cmd_len u32] [cmd] [param_len u32] [param]
//! 0x03 DataPacket  [int u32] [float f64 bits] [str_len u32] [str]
//! ```
//!
//! Every frame is followed by a big-endian CRC-32 of the discriminant and all fields.
//! All integers are big-endian.
//!
//! Decoding reads field by field from the stream, so it never needs the whole frame to
//! be buffered up front. A checksum mismatch is a normal outcome reported through
//! [`Decoded::Message::integrity_ok`], and an unknown discriminant is reported as
//! [`Decoded::Unknown`] so the caller can answer and keep the connection.

use bytes::{BufMut, BytesMut};
use std::fmt;
use tokio::io::AsyncRead;
use tracing::trace;

use crate::config::MAX_FIELD_SIZE;
use crate::core::checksum::{self, CHECKSUM_LEN};
use crate::core::reader::read_exact_into;
use crate::error::{ProtocolError, Result};

/// Discriminant byte of each message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageType {
    Text = 0x01,
    Command = 0x02,
    DataPacket = 0x03,
}

impl MessageType {
    /// All known kinds, in discriminant order
    pub const ALL: [MessageType; 3] = [
        MessageType::Text,
        MessageType::Command,
        MessageType::DataPacket,
    ];

    pub fn type_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(MessageType::Text),
            0x02 => Some(MessageType::Command),
            0x03 => Some(MessageType::DataPacket),
            _ => None,
        }
    }

    /// Human-readable name used in status lines and logs
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Text => "text message",
            MessageType::Command => "command message",
            MessageType::DataPacket => "data packet",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One application message
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text {
        text: Vec<u8>,
    },
    Command {
        command: Vec<u8>,
        parameter: Vec<u8>,
    },
    DataPacket {
        int_field: u32,
        float_field: f64,
        text: Vec<u8>,
    },
}

impl Frame {
    pub fn text(text: impl Into<Vec<u8>>) -> Self {
        Frame::Text { text: text.into() }
    }

    pub fn command(command: impl Into<Vec<u8>>, parameter: impl Into<Vec<u8>>) -> Self {
        Frame::Command {
            command: command.into(),
            parameter: parameter.into(),
        }
    }

    pub fn data_packet(int_field: u32, float_field: f64, text: impl Into<Vec<u8>>) -> Self {
        Frame::DataPacket {
            int_field,
            float_field,
            text: text.into(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Frame::Text { .. } => MessageType::Text,
            Frame::Command { .. } => MessageType::Command,
            Frame::DataPacket { .. } => MessageType::DataPacket,
        }
    }

    /// Total encoded size including discriminant and trailer
    pub fn encoded_len(&self) -> usize {
        let body = match self {
            Frame::Text { text } => 4 + text.len(),
            Frame::Command { command, parameter } => 4 + command.len() + 4 + parameter.len(),
            Frame::DataPacket { text, .. } => 4 + 8 + 4 + text.len(),
        };
        1 + body + CHECKSUM_LEN
    }

    /// Append the wire form of this frame to `dst`.
    ///
    /// Fails without touching `dst` if any length-prefixed field exceeds `max_field_len`.
    pub fn encode_into(&self, dst: &mut BytesMut, max_field_len: u32) -> Result<()> {
        match self {
            Frame::Text { text } => check_len(text, max_field_len)?,
            Frame::Command { command, parameter } => {
                check_len(command, max_field_len)?;
                check_len(parameter, max_field_len)?;
            }
            Frame::DataPacket { text, .. } => check_len(text, max_field_len)?,
        }

        let start = dst.len();
        dst.reserve(self.encoded_len());
        dst.put_u8(self.message_type().type_byte());
        match self {
            Frame::Text { text } => put_field(dst, text),
            Frame::Command { command, parameter } => {
                put_field(dst, command);
                put_field(dst, parameter);
            }
            Frame::DataPacket {
                int_field,
                float_field,
                text,
            } => {
                dst.put_u32(*int_field);
                dst.put_u64(float_field.to_bits());
                put_field(dst, text);
            }
        }
        let crc = checksum::checksum(&dst[start..]);
        dst.put_u32(crc);
        Ok(())
    }

    /// Encode into a fresh buffer using the default field cap.
    pub fn encode(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf, MAX_FIELD_SIZE)?;
        Ok(buf)
    }

    /// Encode into a `Vec<u8>` using the default field cap.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.encode()?.to_vec())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Text { text } => write!(f, "text: {}", String::from_utf8_lossy(text)),
            Frame::Command { command, parameter } => write!(
                f,
                "command: {}, parameter: {}",
                String::from_utf8_lossy(command),
                String::from_utf8_lossy(parameter)
            ),
            Frame::DataPacket {
                int_field,
                float_field,
                text,
            } => write!(
                f,
                "data packet: {}, {}, {}",
                int_field,
                float_field,
                String::from_utf8_lossy(text)
            ),
        }
    }
}

/// Result of decoding one frame from a stream
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A known message; `integrity_ok` is false when the trailer did not match
    Message { frame: Frame, integrity_ok: bool },
    /// The discriminant was not one of the known message types
    Unknown { type_byte: u8 },
}

impl Decoded {
    pub fn is_intact(&self) -> bool {
        matches!(
            self,
            Decoded::Message {
                integrity_ok: true,
                ..
            }
        )
    }
}

/// Decode one frame from `source` with the default field cap.
pub async fn decode<R>(source: &mut R) -> Result<Decoded>
where
    R: AsyncRead + Unpin + ?Sized,
{
    decode_with_limit(source, MAX_FIELD_SIZE).await
}

/// Decode one frame from `source`, rejecting any length prefix above `max_field_len`.
///
/// Fails only on transport errors and oversized length prefixes. Checksum mismatches
/// and unknown discriminants are returned as values.
pub async fn decode_with_limit<R>(source: &mut R, max_field_len: u32) -> Result<Decoded>
where
    R: AsyncRead + Unpin + ?Sized,
{
    // Raw bytes as read, so the trailer is checked against exactly what arrived.
    let mut raw = BytesMut::with_capacity(64);
    read_exact_into(source, &mut raw, 1).await?;
    let type_byte = raw[0];

    let Some(kind) = MessageType::from_byte(type_byte) else {
        trace!(type_byte, "Unknown message discriminant");
        return Ok(Decoded::Unknown { type_byte });
    };

    let frame = match kind {
        MessageType::Text => {
            let text = read_field(source, &mut raw, max_field_len).await?;
            Frame::Text { text }
        }
        MessageType::Command => {
            let command = read_field(source, &mut raw, max_field_len).await?;
            let parameter = read_field(source, &mut raw, max_field_len).await?;
            Frame::Command { command, parameter }
        }
        MessageType::DataPacket => {
            let int_field = read_u32(source, &mut raw).await?;
            let start = raw.len();
            read_exact_into(source, &mut raw, 8).await?;
            let mut bits = [0u8; 8];
            bits.copy_from_slice(&raw[start..start + 8]);
            let float_field = f64::from_bits(u64::from_be_bytes(bits));
            let text = read_field(source, &mut raw, max_field_len).await?;
            Frame::DataPacket {
                int_field,
                float_field,
                text,
            }
        }
    };

    read_exact_into(source, &mut raw, CHECKSUM_LEN).await?;
    let integrity_ok = checksum::verify(&raw);
    trace!(%kind, bytes = raw.len(), integrity_ok, "Decoded frame");

    Ok(Decoded::Message {
        frame,
        integrity_ok,
    })
}

fn check_len(field: &[u8], max_field_len: u32) -> Result<()> {
    let len = field.len() as u64;
    if len > u64::from(max_field_len) {
        return Err(ProtocolError::OversizedField {
            len,
            max: max_field_len,
        });
    }
    Ok(())
}

fn put_field(dst: &mut BytesMut, field: &[u8]) {
    // Length already checked against a u32 cap.
    dst.put_u32(field.len() as u32);
    dst.put_slice(field);
}

async fn read_u32<R>(source: &mut R, raw: &mut BytesMut) -> Result<u32>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let start = raw.len();
    read_exact_into(source, raw, 4).await?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&raw[start..start + 4]);
    Ok(u32::from_be_bytes(bytes))
}

async fn read_field<R>(source: &mut R, raw: &mut BytesMut, max_field_len: u32) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = read_u32(source, raw).await?;
    if len > max_field_len {
        return Err(ProtocolError::OversizedField {
            len: u64::from(len),
            max: max_field_len,
        });
    }
    let start = raw.len();
    read_exact_into(source, raw, len as usize).await?;
    Ok(raw[start..].to_vec())
}
