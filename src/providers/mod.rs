//! Provider registry
//!
//! Maps a model-id prefix to an upstream provider descriptor. The registry is
//! built once at startup from a static table plus credentials in [`Config`]
//! and is read-only afterwards; request handling never mutates it.
//!
//! Dispatch is data-driven: each descriptor names its response shape and auth
//! scheme, and the transformer/normalizer pair is selected from those instead
//! of string-prefix branching on the request path.

pub mod transform;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// How an upstream delivers its response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Token-delimited SSE stream already in the canonical framing; relayed
    /// verbatim.
    SsePassthrough,
    /// One JSON document for the whole completion; emitted as a single delta.
    SingleJson,
    /// JSON values split arbitrarily across network chunks, possibly
    /// concatenated without separators; needs incremental reassembly.
    BufferedJsonStream,
}

/// How the provider credential is attached to the upstream call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>` header
    Bearer,
    /// `x-api-key: <key>` header
    ApiKeyHeader,
    /// `?key=<key>` query parameter
    QueryKey,
}

/// An upstream LLM API known to the gateway
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Model-id prefix selecting this provider (left of the first `/`)
    pub tag: &'static str,
    /// Environment variable the credential came from (named in errors)
    pub auth_env: &'static str,
    pub auth_scheme: AuthScheme,
    pub shape: ResponseShape,
    /// Whether the request body must carry `"stream": true`
    pub requires_stream_flag: bool,
    /// Endpoint template; `{model}` is replaced with the upstream model name
    endpoint: String,
    credential: Option<String>,
}

impl ProviderDescriptor {
    /// The provider credential, or a configuration error naming the missing
    /// environment variable. Must be consulted before any network call.
    pub fn credential(&self) -> AppResult<&str> {
        self.credential
            .as_deref()
            .ok_or(AppError::MissingCredential(self.auth_env))
    }

    /// Build the upstream URL for a model, attaching the key for
    /// query-authenticated providers.
    pub fn endpoint_url(&self, model: &str, credential: &str) -> String {
        let url = self.endpoint.replace("{model}", model);
        match self.auth_scheme {
            AuthScheme::QueryKey => format!("{}?key={}", url, credential),
            _ => url,
        }
    }
}

/// Read-only table of providers, resolved by model-id prefix
pub struct ProviderRegistry {
    providers: Vec<ProviderDescriptor>,
    default_tag: &'static str,
}

impl ProviderRegistry {
    /// Build the registry from configuration. Credentials are captured here
    /// once; absence is not an error until the provider is selected.
    pub fn from_config(config: &Config) -> Self {
        let providers = vec![
            ProviderDescriptor {
                tag: "openrouter",
                auth_env: "OPENROUTER_API_KEY",
                auth_scheme: AuthScheme::Bearer,
                shape: ResponseShape::SsePassthrough,
                requires_stream_flag: true,
                endpoint: format!("{}/chat/completions", config.openrouter_api_url),
                credential: config.openrouter_api_key.clone(),
            },
            ProviderDescriptor {
                tag: "google",
                auth_env: "GEMINI_API_KEY",
                auth_scheme: AuthScheme::QueryKey,
                shape: ResponseShape::BufferedJsonStream,
                requires_stream_flag: false,
                endpoint: format!("{}/models/{{model}}:streamGenerateContent", config.google_api_url),
                credential: config.google_api_key.clone(),
            },
            ProviderDescriptor {
                tag: "anthropic",
                auth_env: "ANTHROPIC_API_KEY",
                auth_scheme: AuthScheme::ApiKeyHeader,
                shape: ResponseShape::SingleJson,
                requires_stream_flag: false,
                endpoint: format!("{}/messages", config.anthropic_api_url),
                credential: config.anthropic_api_key.clone(),
            },
        ];

        Self {
            providers,
            default_tag: "openrouter",
        }
    }

    /// Resolve a model id to a provider and the upstream model name.
    ///
    /// The id is split on the first `/`; a matching tag selects that provider
    /// with the right segment as the upstream model. No `/`, or an unknown
    /// tag, falls back to the default provider with the whole id passed
    /// through unchanged. Fails fast when the selected provider's credential
    /// is absent, before any upstream connection is opened.
    pub fn resolve<'a, 'b>(
        &'a self,
        model_id: &'b str,
    ) -> AppResult<(&'a ProviderDescriptor, &'b str)> {
        let (provider, upstream_model) = match model_id.split_once('/') {
            Some((tag, rest)) => match self.lookup(tag) {
                Some(provider) => (provider, rest),
                None => (self.default(), model_id),
            },
            None => (self.default(), model_id),
        };

        provider.credential()?;
        Ok((provider, upstream_model))
    }

    fn lookup(&self, tag: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.tag == tag)
    }

    fn default(&self) -> &ProviderDescriptor {
        self.lookup(self.default_tag)
            .expect("default provider must be registered")
    }
}
