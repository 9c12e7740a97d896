//! Request transformers
//!
//! One transformer per provider family, converting the canonical message list
//! into that family's wire body and headers. Message order is always
//! preserved; only role mapping and system-message placement differ.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::providers::{AuthScheme, ProviderDescriptor, ResponseShape};
use crate::types::{Message, Role};

/// Required by Anthropic's messages API; the canonical request has no
/// max-tokens knob, so one-shot calls use this ceiling.
const ANTHROPIC_MAX_TOKENS: u32 = 1024;

/// A fully built upstream call: where to send it and what to send
#[derive(Debug)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Build the upstream request for a resolved provider.
///
/// The transformer is selected by the provider's response shape; the caller
/// has already verified the credential exists via [`ProviderRegistry::resolve`].
///
/// [`ProviderRegistry::resolve`]: crate::providers::ProviderRegistry::resolve
pub fn build_upstream_request(
    provider: &ProviderDescriptor,
    upstream_model: &str,
    messages: &[Message],
) -> AppResult<UpstreamRequest> {
    let credential = provider.credential()?;
    let url = provider.endpoint_url(upstream_model, credential);
    let headers = auth_headers(provider.auth_scheme, credential);

    let body = match provider.shape {
        ResponseShape::SsePassthrough => {
            openai_style_body(upstream_model, messages, provider.requires_stream_flag)
        }
        ResponseShape::BufferedJsonStream => google_style_body(messages),
        ResponseShape::SingleJson => anthropic_style_body(upstream_model, messages),
    };

    Ok(UpstreamRequest { url, headers, body })
}

fn auth_headers(scheme: AuthScheme, credential: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    match scheme {
        AuthScheme::Bearer => {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", credential))
                    .expect("Invalid API key"),
            );
        }
        AuthScheme::ApiKeyHeader => {
            headers.insert(
                "x-api-key",
                HeaderValue::from_str(credential).expect("Invalid API key"),
            );
            headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        }
        // Credential travels in the URL, not a header.
        AuthScheme::QueryKey => {}
    }

    headers
}

/// OpenAI-style chat body. Messages are rebuilt from role/content only so any
/// client-side metadata that survived parsing can never leak upstream.
fn openai_style_body(model: &str, messages: &[Message], stream: bool) -> Value {
    let sanitized: Vec<Value> = messages
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": sanitized,
    });
    if stream {
        body["stream"] = json!(true);
    }
    body
}

/// Google generateContent body.
///
/// Google's schema has no `system` role: the first system message becomes a
/// dedicated `systemInstruction` whose role is fixed to `user` (Google's own
/// constraint), and every later system message is dropped, not merged. That
/// first-one-wins rule is deliberate and load-bearing; see DESIGN.md.
/// Remaining messages map to `contents` entries with `assistant` renamed to
/// `model`.
fn google_style_body(messages: &[Message]) -> Value {
    let mut system_instruction: Option<&str> = None;
    let mut contents = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                if system_instruction.is_none() && !msg.content.is_empty() {
                    system_instruction = Some(&msg.content);
                }
            }
            Role::User | Role::Assistant => {
                let role = if msg.role == Role::Assistant {
                    "model"
                } else {
                    "user"
                };
                contents.push(json!({
                    "role": role,
                    "parts": [{"text": msg.content}],
                }));
            }
        }
    }

    let mut body = json!({ "contents": contents });
    if let Some(text) = system_instruction {
        body["systemInstruction"] = json!({
            "role": "user",
            "parts": [{"text": text}],
        });
    }
    body
}

/// Anthropic messages body. System text is a top-level field rather than a
/// message; the first system message wins, mirroring the Google rule.
fn anthropic_style_body(model: &str, messages: &[Message]) -> Value {
    let mut system: Option<&str> = None;
    let mut turns = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                if system.is_none() && !msg.content.is_empty() {
                    system = Some(&msg.content);
                }
            }
            Role::User | Role::Assistant => {
                turns.push(json!({"role": msg.role.as_str(), "content": msg.content}));
            }
        }
    }

    let mut body = json!({
        "model": model,
        "max_tokens": ANTHROPIC_MAX_TOKENS,
        "messages": turns,
    });
    if let Some(text) = system {
        body["system"] = json!(text);
    }
    body
}
