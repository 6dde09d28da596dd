//! # Error Types
//!
//! Error handling for the protocol core.
//!
//! Transport failures (`Io`, `ConnectionClosed`, `OversizedField`) are fatal to the
//! connection that produced them and nothing else. Checksum mismatches and unknown
//! message types are not errors at all: the codec reports them as decode outcomes and
//! the session answers them with a status line.
//!
//! ## Error Categories
//! - **Transport**: I/O failures and peer closes
//! - **Framing**: length prefixes above the configured cap
//! - **Handshake**: rejected credentials, malformed handshake lines
//! - **Configuration**: invalid or unreadable settings
//!
//! ## Example Usage
//! ```rust
//! use authlink::error::{ProtocolError, Result};
//!
//! fn require_open(bytes_read: usize) -> Result<()> {
//!     if bytes_read == 0 {
//!         return Err(ProtocolError::ConnectionClosed);
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_open(0).is_err());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    pub const ERR_WRITER_GONE: &str = "Connection writer task has stopped";
    pub const ERR_EMPTY_USERNAME: &str = "Username cannot be empty";
    pub const ERR_USERNAME_NEWLINE: &str = "Username cannot contain a newline";
    pub const ERR_INVALID_HASH: &str =
        "Password hash must be 64 lowercase hexadecimal characters";
    pub const ERR_LINE_TOO_LONG: &str = "Handshake line exceeds maximum length";
}

/// Primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Field too large: {len} bytes (maximum {max})")]
    OversizedField { len: u64, max: u32 },

    #[error("Handshake line is not valid UTF-8")]
    InvalidUtf8,

    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        // A short read means the peer hung up mid-message.
        match err.kind() {
            io::ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
            _ => ProtocolError::Io(err),
        }
    }
}

impl ProtocolError {
    /// Whether the error means the peer went away rather than something breaking.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::ConnectionClosed => true,
            ProtocolError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
