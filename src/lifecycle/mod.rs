//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Metrics exporter → Server state → Bind listener → Serve
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger → Stop accepting → Drain in-flight requests → Exit
//! ```

pub mod signals;
pub mod startup;

pub use signals::Shutdown;
