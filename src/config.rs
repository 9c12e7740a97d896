//! Configuration management for Switchboard
//!
//! Configuration is loaded from environment variables once at startup.
//! Provider base URLs are overridable so tests can point them at mock servers.

use anyhow::{Context, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// OpenRouter API base URL
    pub openrouter_api_url: String,
    /// OpenRouter API key (default provider credential)
    pub openrouter_api_key: Option<String>,

    /// Google Generative Language API base URL
    pub google_api_url: String,
    /// Google API key (sent as a query parameter, not a header)
    pub google_api_key: Option<String>,

    /// Anthropic API base URL
    pub anthropic_api_url: String,
    /// Anthropic API key (sent as x-api-key header)
    pub anthropic_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SWITCHBOARD_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SWITCHBOARD_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("Invalid SWITCHBOARD_PORT")?,

            openrouter_api_url: env::var("OPENROUTER_API_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
            openrouter_api_key: env::var("OPENROUTER_API_KEY").ok(),

            google_api_url: env::var("GOOGLE_API_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            google_api_key: env::var("GEMINI_API_KEY").ok(),

            anthropic_api_url: env::var("ANTHROPIC_API_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com/v1".to_string()),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_parsing() {
        env::set_var("SWITCHBOARD_PORT", "8181");
        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 8181);
        env::remove_var("SWITCHBOARD_PORT");
    }

    #[test]
    fn test_default_urls() {
        // No provider keys are required at startup; absence is surfaced
        // per-request when the provider is actually selected.
        let config = Config::from_env().unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.openrouter_api_url, "https://openrouter.ai/api/v1");
        assert_eq!(
            config.google_api_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(config.anthropic_api_url, "https://api.anthropic.com/v1");
    }
}
