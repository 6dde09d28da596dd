//! # Protocol Layer
//!
//! Authentication and per-connection session handling on top of the frame codec.
//!
//! ## Components
//! - **Handshake**: username and password-digest exchange, credential stores
//! - **Status**: the reply lines a server writes
//! - **Dispatcher**: routes intact frames to application handlers
//! - **Session**: the per-connection state machine that ties the above together

pub mod dispatcher;
pub mod handshake;
pub mod session;
pub mod status;
