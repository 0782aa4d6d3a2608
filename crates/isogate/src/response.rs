//! # Gateway Responses
//!
//! Owned response representation used everywhere past the interception
//! boundary. Upstream bodies are collected into `Bytes` so the same value
//! can be returned to the client, stored in the cache, and replayed later
//! without re-reading anything.
//!
//! Header policy lives here too: isolation headers on every same-origin
//! response, caching directives per lane, and the hop-by-hop strip applied
//! when an upstream response is captured.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::error::GatewayError;

const COOP_HEADER: HeaderName = HeaderName::from_static("cross-origin-opener-policy");
const COEP_HEADER: HeaderName = HeaderName::from_static("cross-origin-embedder-policy");

const COOP_VALUE: HeaderValue = HeaderValue::from_static("same-origin");
const COEP_VALUE: HeaderValue = HeaderValue::from_static("require-corp");

const IMMUTABLE_CACHING: HeaderValue =
    HeaderValue::from_static("public, max-age=31536000, immutable");
const NO_STORE: HeaderValue = HeaderValue::from_static("no-store");

/// A fully buffered response owned by the gateway
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Reason phrase, kept for replay fidelity
    pub status_text: String,
    /// Response headers after the hop-by-hop strip
    pub headers: HeaderMap,
    /// Complete body
    pub body: Bytes,
}

impl GatewayResponse {
    /// Build a response from scratch
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            status_text: status
                .canonical_reason()
                .unwrap_or_default()
                .to_string(),
            headers,
            body,
        }
    }

    /// Capture an upstream response, buffering the body and dropping
    /// hop-by-hop headers that only made sense on the original connection.
    pub async fn from_upstream(response: reqwest::Response) -> Result<Self, GatewayError> {
        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        let body = response.bytes().await?;

        Ok(Self::new(status, headers, body))
    }

    /// Synthesized bad-gateway response used when neither the network nor
    /// the cache can satisfy an intercepted request.
    pub fn bad_gateway(reason: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );

        let mut response = Self::new(
            StatusCode::BAD_GATEWAY,
            headers,
            Bytes::from(format!("Gateway error: {reason}")),
        );
        response.apply_no_store();
        response
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Stamp the cross-origin isolation headers. Applied to every
    /// same-origin response the gateway answers, cached or fresh.
    pub fn apply_isolation(&mut self) {
        self.headers.insert(COOP_HEADER, COOP_VALUE);
        self.headers.insert(COEP_HEADER, COEP_VALUE);
    }

    /// Mark the response as immutable for a year. Static assets are
    /// versioned by cache generation, never edited in place.
    pub fn apply_immutable_caching(&mut self) {
        self.headers.insert(header::CACHE_CONTROL, IMMUTABLE_CACHING);
    }

    /// Forbid any downstream caching of this response
    pub fn apply_no_store(&mut self) {
        self.headers.insert(header::CACHE_CONTROL, NO_STORE);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Headers scoped to a single hop, per RFC 9110. They are stripped when a
/// response is captured so replays from the cache never carry them.
static HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Guess a content type from a path's extension.
///
/// Used when a response is synthesized from a compressed sibling, where the
/// stored headers describe the sibling file rather than the original asset.
pub fn content_type_for_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or_default();
    match ext {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" => "text/javascript",
        "css" => "text/css",
        "wasm" => "application/wasm",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
