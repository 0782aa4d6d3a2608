//! Shared cache types: generation identifiers and the on-disk metadata
//! sidecar persisted next to each cached body.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::response::GatewayResponse;

/// Identifies one cache generation. Stores from different generations
/// never share entries; a generation bump plus activation is the only
/// invalidation mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationId(pub u32);

impl GenerationId {
    /// Directory name this generation's store lives under
    pub fn dir_name(&self) -> String {
        format!("v{}", self.0)
    }

    /// Parse a store directory name back into a generation id
    pub fn parse_dir_name(name: &str) -> Option<Self> {
        name.strip_prefix('v')
            .and_then(|n| n.parse::<u32>().ok())
            .map(Self)
    }
}

impl std::fmt::Display for GenerationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Metadata persisted alongside a cached body so the original response
/// can be replayed faithfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// HTTP status code of the captured response
    pub status: u16,
    /// Reason phrase
    pub status_text: String,
    /// Response headers as name/value string pairs
    pub headers: Vec<(String, String)>,
    /// Unix timestamp of when the entry was stored
    pub cached_at: u64,
    /// Body size in bytes
    pub size: u64,
}

impl EntryMetadata {
    pub fn from_response(response: &GatewayResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            status: response.status.as_u16(),
            status_text: response.status_text.clone(),
            headers,
            cached_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            size: response.body.len() as u64,
        }
    }

    /// Rebuild the response this metadata was captured from
    pub fn into_response(self, body: Bytes) -> GatewayResponse {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        GatewayResponse {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            status_text: self.status_text,
            headers,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header;

    #[test]
    fn test_generation_dir_name_round_trip() {
        let generation = GenerationId(42);
        assert_eq!(generation.dir_name(), "v42");
        assert_eq!(GenerationId::parse_dir_name("v42"), Some(generation));
    }

    #[test]
    fn test_parse_rejects_foreign_dir_names() {
        assert_eq!(GenerationId::parse_dir_name("tmp"), None);
        assert_eq!(GenerationId::parse_dir_name("v"), None);
        assert_eq!(GenerationId::parse_dir_name("vabc"), None);
        assert_eq!(GenerationId::parse_dir_name("42"), None);
    }

    #[test]
    fn test_metadata_round_trip() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/wasm".parse().unwrap());
        let response = GatewayResponse::new(
            StatusCode::OK,
            headers,
            Bytes::from_static(b"\0asm"),
        );

        let meta = EntryMetadata::from_response(&response);
        assert_eq!(meta.status, 200);
        assert_eq!(meta.size, 4);

        let rebuilt = meta.into_response(response.body.clone());
        assert_eq!(rebuilt.status, StatusCode::OK);
        assert_eq!(rebuilt.status_text, "OK");
        assert_eq!(
            rebuilt.headers.get(header::CONTENT_TYPE).unwrap(),
            "application/wasm"
        );
        assert_eq!(rebuilt.body, response.body);
    }
}
