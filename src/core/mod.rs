//! # Core Protocol Components
//!
//! Checksums, exact reads, and the frame codec. Nothing in here knows about
//! authentication or sessions.
//!
//! ## Components
//! - **Checksum**: CRC-32 trailer computation and verification
//! - **Reader**: exact-length and line reads that absorb short reads
//! - **Frame**: the three message kinds and their stream decoder
//! - **Codec**: `tokio_util` encoder for single-writer sinks
//!
//! ## Wire Format
//! ```text
//! [Type(1)] [Fields(N)] [CRC-32(4)]
//! ```
//!
//! ## Security
//! - Every length prefix is checked against a configurable cap before allocating
//! - Integrity failures are surfaced, never silently accepted

pub mod checksum;
pub mod codec;
pub mod frame;
pub mod reader;
