//! HTTP server for tinyledger.
//!
//! - [`api`]: routes, handlers, readiness gate, CORS
//! - [`config`]: flags and environment
//! - [`server`]: startup, signal handling, shutdown

pub mod api;
pub mod config;
pub mod server;

pub use api::{build_router, AppState};
pub use config::ServerConfig;
