//! # Utility Modules
//!
//! Supporting pieces shared by the server and the client driver.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup from configuration
//! - **Metrics**: Thread-safe session counters
//! - **Timeout**: Deadline wrappers applied at the transport edge

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
