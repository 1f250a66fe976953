//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → TraceLayer / TimeoutLayer (tower-http)
//!     → /admin/* → admin.rs (bearer auth, JSON views and controls)
//!     → anything else → guarded middleware chain → terminal handler
//! ```

pub mod admin;
pub mod server;

pub use server::{welcome_handler, AppState, HttpServer};
