//! Switchboard - chat-completion gateway
//!
//! Accepts one provider-agnostic chat request shape, dispatches it to the
//! upstream LLM API selected from the model id, and normalizes every
//! upstream's response mode into one uniform SSE delta protocol with a
//! guaranteed terminal frame.

pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod providers;
pub mod routes;
pub mod streaming;
pub mod types;

use std::time::Instant;

use anyhow::Result;

pub use crate::config::Config;
pub use crate::providers::ProviderRegistry;

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    /// Read-only after startup; requests never mutate it
    pub registry: ProviderRegistry,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config) -> Result<Self> {
        // HTTP client with connection pooling; generous timeout because
        // upstream completions can stream for minutes.
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        let registry = ProviderRegistry::from_config(&config);

        Ok(Self {
            config,
            http_client,
            registry,
            start_time: Instant::now(),
        })
    }
}
