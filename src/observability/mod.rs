//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarding engine produces:
//!     → traffic.rs (byte/request counters served at /metrics/traffic)
//!     → metrics.rs (Prometheus counters and histograms)
//!     → logging.rs (structured log events)
//! ```
//!
//! # Design Decisions
//! - Request ID (x-request-id) appears on every proxy log line
//! - Traffic counters live in memory only and reset on restart

pub mod logging;
pub mod metrics;
pub mod traffic;

pub use traffic::{DomainStats, TrafficRecorder, TrafficSnapshot};
