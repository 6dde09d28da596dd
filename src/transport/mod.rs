//! # Transport Layer
//!
//! Listener side of the protocol. Sessions are generic over any byte stream; this layer
//! binds TCP, applies deadlines at the edge, and owns graceful shutdown.

pub mod tcp;
