//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, connect info)
//!     → request.rs (request ID, client identity, method policy)
//!     → proxy.rs (security checks, rate limit, upstream call)
//!     → response.rs (classify, buffer or stream, quota headers)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
