//! # Request Classification
//!
//! Every request handed to the gateway is sorted into exactly one lane
//! before any response work happens. Classification looks only at the
//! request URL's origin and the request mode, never at the path shape,
//! so adding new asset types upstream needs no classifier change.

use reqwest::Method;
use url::Url;

use crate::error::GatewayError;

/// How the client issued the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level document load
    Navigate,
    /// Anything else (scripts, fetch calls, media, workers)
    Subresource,
}

/// A request captured at the interception boundary
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    /// Full request URL
    pub url: Url,
    /// HTTP method
    pub method: Method,
    /// Request mode as reported by the client
    pub mode: RequestMode,
    path: String,
}

impl InterceptedRequest {
    /// Build a request from its URL string
    pub fn new(url: &str, method: Method, mode: RequestMode) -> Result<Self, GatewayError> {
        let url = Url::parse(url).map_err(|e| GatewayError::UrlError(e.to_string()))?;
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        Ok(Self {
            url,
            method,
            mode,
            path,
        })
    }

    /// GET navigation request for a URL, the common top-level case
    pub fn navigation(url: &str) -> Result<Self, GatewayError> {
        Self::new(url, Method::GET, RequestMode::Navigate)
    }

    /// GET subresource request for a URL
    pub fn subresource(url: &str) -> Result<Self, GatewayError> {
        Self::new(url, Method::GET, RequestMode::Subresource)
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Root-relative path of the request, including the query string when
    /// one is present
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// The lane a classified request is routed down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestLane {
    /// Same-origin top-level document load
    Navigation,
    /// Same-origin subresource
    StaticAsset,
    /// Cross-origin request, not ours to answer
    PassThrough,
}

/// Sorts intercepted requests into lanes by origin and mode
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    origin: Url,
}

impl RequestClassifier {
    pub fn new(origin: Url) -> Self {
        Self { origin }
    }

    /// Classify a request. Origin comparison uses the full scheme, host
    /// and port triple, so `http://site` and `https://site` are distinct.
    pub fn classify(&self, request: &InterceptedRequest) -> RequestLane {
        if request.url.origin() != self.origin.origin() {
            return RequestLane::PassThrough;
        }

        match request.mode {
            RequestMode::Navigate => RequestLane::Navigation,
            RequestMode::Subresource => RequestLane::StaticAsset,
        }
    }
}
