//! Observability and Metrics
//!
//! Atomic counters for server-side sessions. The server owns one `Metrics` behind an
//! `Arc` and hands clones to each connection task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

use crate::core::frame::Decoded;

/// Counters for protocol operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently active connections
    pub connections_active: AtomicU64,
    /// Connections refused because the server was full
    pub connections_refused: AtomicU64,
    /// Successful handshakes
    pub handshakes_success: AtomicU64,
    /// Rejected handshakes
    pub handshakes_failed: AtomicU64,
    /// Frames received with a valid checksum
    pub frames_ok: AtomicU64,
    /// Frames received with a checksum mismatch
    pub checksum_failures: AtomicU64,
    /// Frames with an unknown discriminant
    pub unknown_types: AtomicU64,
    /// Bytes of frame data received
    pub bytes_received: AtomicU64,
    /// Connections that ended on a transport or framing error
    pub connection_errors: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_refused: AtomicU64::new(0),
            handshakes_success: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            frames_ok: AtomicU64::new(0),
            checksum_failures: AtomicU64::new(0),
            unknown_types: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_refused(&self) {
        self.connections_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_success(&self) {
        self.handshakes_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one decoded frame and its wire size
    pub fn frame_received(&self, decoded: &Decoded) {
        match decoded {
            Decoded::Message {
                frame,
                integrity_ok,
            } => {
                self.bytes_received
                    .fetch_add(frame.encoded_len() as u64, Ordering::Relaxed);
                if *integrity_ok {
                    self.frames_ok.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.checksum_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
            Decoded::Unknown { .. } => {
                self.bytes_received.fetch_add(1, Ordering::Relaxed);
                self.unknown_types.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_refused: self.connections_refused.load(Ordering::Relaxed),
            handshakes_success: self.handshakes_success.load(Ordering::Relaxed),
            handshakes_failed: self.handshakes_failed.load(Ordering::Relaxed),
            frames_ok: self.frames_ok.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            unknown_types: self.unknown_types.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connections_refused = snapshot.connections_refused,
            handshakes_success = snapshot.handshakes_success,
            handshakes_failed = snapshot.handshakes_failed,
            frames_ok = snapshot.frames_ok,
            checksum_failures = snapshot.checksum_failures,
            unknown_types = snapshot.unknown_types,
            bytes_received = snapshot.bytes_received,
            connection_errors = snapshot.connection_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Session metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_refused: u64,
    pub handshakes_success: u64,
    pub handshakes_failed: u64,
    pub frames_ok: u64,
    pub checksum_failures: u64,
    pub unknown_types: u64,
    pub bytes_received: u64,
    pub connection_errors: u64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::Frame;

    #[test]
    fn frame_outcomes_are_counted_separately() {
        let metrics = Metrics::new();
        metrics.frame_received(&Decoded::Message {
            frame: Frame::text("hi"),
            integrity_ok: true,
        });
        metrics.frame_received(&Decoded::Message {
            frame: Frame::text("hi"),
            integrity_ok: false,
        });
        metrics.frame_received(&Decoded::Unknown { type_byte: 9 });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_ok, 1);
        assert_eq!(snapshot.checksum_failures, 1);
        assert_eq!(snapshot.unknown_types, 1);
        assert_eq!(
            snapshot.bytes_received,
            2 * Frame::text("hi").encoded_len() as u64 + 1
        );
    }

    #[test]
    fn active_connections_track_open_and_close() {
        let metrics = Metrics::new();
        metrics.connection_established();
        metrics.connection_established();
        metrics.connection_closed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_total, 2);
        assert_eq!(snapshot.connections_active, 1);
    }
}
