//! # authlink
//!
//! A small authenticated message protocol over ordered byte streams.
//!
//! A client connects, proves its identity with a username and a SHA-256 password
//! digest, and then sends typed frames (text, command, data packet). Every frame carries
//! a CRC-32 trailer; the server checks it and answers each frame with one status line.
//!
//! ## Layout
//! - [`core`]: checksums, exact reads, the frame format and its codec
//! - [`protocol`]: handshake, status lines, dispatch, and the server session
//! - [`service`]: the client driver
//! - [`transport`]: the TCP server
//! - [`config`], [`error`], [`utils`]: ambient plumbing
//!
//! ## Security
//! The channel is not encrypted and the handshake digest is replayable. Deploy behind a
//! secure tunnel when either matters.

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::NetworkConfig;
pub use crate::core::frame::{Decoded, Frame, MessageType};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::handshake::{Credential, CredentialStore, MemoryCredentialStore};
pub use crate::protocol::session::{Session, SessionOutcome};
pub use crate::service::client::{Client, ClientSender, Inbound};
pub use crate::transport::tcp::Server;
