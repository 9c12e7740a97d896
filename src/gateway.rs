//! Gateway session
//!
//! Orchestrates one chat request end to end: provider resolution, request
//! transformation, the upstream call, and driving the response normalizer
//! matching the provider's shape. Every path through here ends with exactly
//! one terminal frame, written last.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, AppResult},
    middleware::auth::CallerIdentity,
    providers::{transform::build_upstream_request, ProviderDescriptor, ResponseShape},
    streaming::{
        format_delta_frame, format_done_frame, format_error_frame, JsonStreamBuffer,
        SseLineBuffer,
    },
    types::ChatRequest,
    AppState,
};

/// Handle one chat request, returning the SSE response.
///
/// Failures before the upstream call (missing credential) and upstream
/// rejections are surfaced as an error frame on the stream itself, not as an
/// HTTP error status: the caller has one protocol to parse either way, and
/// the terminal frame is guaranteed in all cases.
pub async fn relay_chat(
    state: Arc<AppState>,
    caller: CallerIdentity,
    request: ChatRequest,
) -> AppResult<Response> {
    let (provider, upstream_model) = match state.registry.resolve(&request.model) {
        Ok(resolved) => resolved,
        Err(err) => {
            warn!(model = %request.model, error = %err, "Provider resolution failed");
            return sse_response(error_then_done(err.to_string()));
        }
    };

    info!(
        provider = provider.tag,
        model = upstream_model,
        caller = %caller.id,
        shape = ?provider.shape,
        "Dispatching chat request"
    );

    let upstream = build_upstream_request(provider, upstream_model, &request.messages)?;

    let response = match state
        .http_client
        .post(&upstream.url)
        .headers(upstream.headers)
        .json(&upstream.body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            warn!(provider = provider.tag, error = %err, "Upstream connection failed");
            return sse_response(error_then_done(format!(
                "Upstream connection failed: {}",
                err
            )));
        }
    };

    let status = response.status();
    if !status.is_success() {
        let message = upstream_error_message(status.as_u16(), response).await;
        warn!(provider = provider.tag, status = %status, message = %message, "Upstream rejected request");
        return sse_response(error_then_done(message));
    }

    debug!(provider = provider.tag, status = %status, "Upstream accepted, streaming response");

    let body = match provider.shape {
        ResponseShape::SsePassthrough => passthrough_stream(response),
        ResponseShape::SingleJson => single_json_stream(response),
        ResponseShape::BufferedJsonStream => buffered_json_stream(response, provider),
    };

    sse_response(body)
}

/// Pull the upstream's own error message out of a non-success body when it
/// carries the common `{"error":{"message":...}}` shape; otherwise synthesize
/// a description that at least names the status code.
async fn upstream_error_message(status: u16, response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| format!("Upstream returned status {}", status))
}

/// A stream that emits one error frame followed by the terminal frame
fn error_then_done(message: String) -> Body {
    Body::from_stream(async_stream::stream! {
        yield Ok::<_, std::io::Error>(format_error_frame(&message));
        yield Ok(format_done_frame());
    })
}

/// sse-passthrough: relay upstream bytes verbatim.
///
/// A line-buffer tap watches the relayed bytes for the upstream's own
/// terminal marker so the session appends its own only when the upstream
/// never produced one; either way the caller sees exactly one.
fn passthrough_stream(response: reqwest::Response) -> Body {
    let mut upstream = response.bytes_stream();

    Body::from_stream(async_stream::stream! {
        let mut tap = SseLineBuffer::new();
        let mut saw_done = false;

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    let lines = tap.feed(&bytes);
                    if SseLineBuffer::saw_done(&lines) {
                        saw_done = true;
                    }
                    yield Ok::<_, std::io::Error>(bytes);
                }
                Err(err) => {
                    warn!(error = %err, "Upstream stream failed mid-relay");
                    yield Ok(format_error_frame(&format!("Upstream stream failed: {}", err)));
                    break;
                }
            }
        }

        if !saw_done {
            yield Ok(format_done_frame());
        }
    })
}

/// single-json: read the whole body, extract the text, emit one delta.
///
/// An absent extraction path yields an empty delta rather than an error.
fn single_json_stream(response: reqwest::Response) -> Body {
    Body::from_stream(async_stream::stream! {
        match response.json::<Value>().await {
            Ok(value) => {
                let text = extract_anthropic_text(&value).unwrap_or_default();
                yield Ok::<_, std::io::Error>(format_delta_frame(&text));
            }
            Err(err) => {
                warn!(error = %err, "Failed to read one-shot upstream body");
                yield Ok(format_error_frame(&format!("Upstream body unreadable: {}", err)));
            }
        }
        yield Ok(format_done_frame());
    })
}

/// buffered-json-stream: incremental reassembly via [`JsonStreamBuffer`].
///
/// Parse exhaustion inside the buffer is logged and dropped there; the
/// session keeps streaming. Any partial buffer left at connection close is
/// discarded with the buffer itself.
fn buffered_json_stream(response: reqwest::Response, provider: &ProviderDescriptor) -> Body {
    let mut upstream = response.bytes_stream();
    let provider_tag = provider.tag;

    Body::from_stream(async_stream::stream! {
        let mut buffer = JsonStreamBuffer::new();

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    for text in buffer.feed(&bytes) {
                        yield Ok::<_, std::io::Error>(format_delta_frame(&text));
                    }
                }
                Err(err) => {
                    warn!(provider = provider_tag, error = %err, "Upstream stream failed mid-read");
                    yield Ok(format_error_frame(&format!("Upstream stream failed: {}", err)));
                    break;
                }
            }
        }

        if buffer.has_pending() {
            debug!(provider = provider_tag, "Discarding partial buffer at stream end");
        }
        yield Ok(format_done_frame());
    })
}

/// Text extraction path for the single-json family: `content[0].text`
fn extract_anthropic_text(value: &Value) -> Option<String> {
    value
        .get("content")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

/// Wrap a frame stream in the SSE response envelope. Frames are flushed to
/// the caller as they are produced; nothing is held back until completion.
fn sse_response(body: Body) -> AppResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}
