//!
//! Flowline Server - HTTP server for the Flowline platform
//!
//! This module exports all the components of the Flowline Server.

/// API module
pub mod api;

/// Server module
pub mod server;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Redis flow lock
#[cfg(feature = "redis")]
pub mod redis_lock;

// Re-export key types
pub use config::{LockBackend, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{AppState, FlowlineServer, StateRepositories};

/// Build the server from configuration and run it until shutdown
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    FlowlineServer::new(config).await?.run().await
}
