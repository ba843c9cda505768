//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Proxied request:
//!     → target.rs (normalize URL, extract domain)
//!     → allowlist.rs (regex allow-list, open when empty)
//!     → rate_limit.rs (fixed window per client IP and per domain)
//!     → destination.rs (resolve, refuse private and loopback ranges)
//!     → headers.rs (strip hop-by-hop and framing headers both ways)
//! ```
//!
//! # Design Decisions
//! - Fail closed on every check except an inconclusive resolution
//! - Allow-list and rate limit settings are mutable at runtime via the admin API

pub mod allowlist;
pub mod destination;
pub mod headers;
pub mod rate_limit;
pub mod target;
