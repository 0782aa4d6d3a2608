//! # Precache Manifest
//!
//! Static configuration produced by the asset build pipeline: the ordered
//! list of root-relative paths to fetch eagerly at install time, plus the
//! mapping from original asset paths to their precompressed siblings.
//!
//! The manifest is immutable at runtime. Changing either the precache list
//! or the sibling map requires bumping the cache generation so stale stores
//! are never reused against a mismatched manifest.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// One asset to precache at install time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Root-relative path of the asset (e.g. "/emulators/core.wasm")
    pub path: String,
    /// Root-relative path of the precompressed sibling, if the build
    /// pipeline produced one (e.g. "/emulators/core.wasm.br")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed: Option<String>,
}

impl ManifestEntry {
    /// Create a plain entry with no compressed sibling
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            compressed: None,
        }
    }

    /// Set the compressed sibling path
    pub fn with_compressed(mut self, sibling: impl Into<String>) -> Self {
        self.compressed = Some(sibling.into());
        self
    }
}

/// The full precache manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Ordered list of assets to fetch and store at install time
    #[serde(default)]
    pub precache: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parse a manifest from its JSON representation
    pub fn from_json(json: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(json).map_err(|e| GatewayError::ManifestError(e.to_string()))
    }

    /// Build the read-only variant map from the manifest's sibling entries
    pub fn variant_map(&self) -> CompressionVariantMap {
        CompressionVariantMap::from_entries(&self.precache)
    }

    /// All paths that install-time precache should fetch: every original
    /// plus every configured sibling, in manifest order.
    pub fn precache_paths(&self) -> Vec<&str> {
        let mut paths = Vec::with_capacity(self.precache.len());
        for entry in &self.precache {
            paths.push(entry.path.as_str());
            if let Some(sibling) = &entry.compressed {
                paths.push(sibling.as_str());
            }
        }
        paths
    }
}

/// Fixed mapping from an original asset path to its precompressed sibling.
///
/// Consulted, never mutated, during static-asset resolution.
#[derive(Debug, Clone, Default)]
pub struct CompressionVariantMap {
    siblings: HashMap<String, String>,
}

impl CompressionVariantMap {
    /// Build the map from manifest entries that carry a sibling path
    pub fn from_entries(entries: &[ManifestEntry]) -> Self {
        let siblings = entries
            .iter()
            .filter_map(|e| {
                e.compressed
                    .as_ref()
                    .map(|sibling| (e.path.clone(), sibling.clone()))
            })
            .collect();

        Self { siblings }
    }

    /// Look up the compressed sibling registered for an original path
    pub fn sibling_for(&self, path: &str) -> Option<&str> {
        self.siblings.get(path).map(String::as_str)
    }

    /// Content-encoding token for a sibling path, inferred from its extension
    pub fn encoding_for(sibling_path: &str) -> Option<&'static str> {
        if sibling_path.ends_with(".br") {
            Some("br")
        } else if sibling_path.ends_with(".gz") || sibling_path.ends_with(".gzip") {
            Some("gzip")
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.siblings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_json() {
        let json = r#"{
            "precache": [
                { "path": "/index.html" },
                { "path": "/emulators/core.wasm", "compressed": "/emulators/core.wasm.br" }
            ]
        }"#;

        let manifest = Manifest::from_json(json).unwrap();
        assert_eq!(manifest.precache.len(), 2);
        assert_eq!(manifest.precache[0].path, "/index.html");
        assert!(manifest.precache[0].compressed.is_none());
        assert_eq!(
            manifest.precache[1].compressed.as_deref(),
            Some("/emulators/core.wasm.br")
        );
    }

    #[test]
    fn test_parse_invalid_manifest() {
        let result = Manifest::from_json("not json");
        assert!(matches!(result, Err(GatewayError::ManifestError(_))));
    }

    #[test]
    fn test_precache_paths_include_siblings() {
        let manifest = Manifest {
            precache: vec![
                ManifestEntry::new("/index.html"),
                ManifestEntry::new("/core.bin").with_compressed("/core.bin.br"),
            ],
        };

        let paths = manifest.precache_paths();
        assert_eq!(paths, vec!["/index.html", "/core.bin", "/core.bin.br"]);
    }

    #[test]
    fn test_variant_map_lookup() {
        let manifest = Manifest {
            precache: vec![
                ManifestEntry::new("/index.html"),
                ManifestEntry::new("/app.wasm").with_compressed("/app.wasm.br"),
            ],
        };

        let variants = manifest.variant_map();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants.sibling_for("/app.wasm"), Some("/app.wasm.br"));
        assert_eq!(variants.sibling_for("/index.html"), None);
        assert_eq!(variants.sibling_for("/missing"), None);
    }

    #[test]
    fn test_encoding_from_sibling_extension() {
        assert_eq!(CompressionVariantMap::encoding_for("/a.wasm.br"), Some("br"));
        assert_eq!(CompressionVariantMap::encoding_for("/a.js.gz"), Some("gzip"));
        assert_eq!(CompressionVariantMap::encoding_for("/a.js.gzip"), Some("gzip"));
        assert_eq!(CompressionVariantMap::encoding_for("/a.wasm"), None);
    }
}
