//! # Gateway Configuration
//!
//! Everything the gateway needs to run: the origin it fronts, cache
//! generation and placement, the precache manifest, and the transfer
//! settings for the upstream HTTP client.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::HeaderMap;
use url::Url;

use crate::builder::GatewayConfigBuilder;
use crate::cache::GenerationId;
use crate::error::GatewayError;
use crate::manifest::Manifest;
use crate::proxy::ProxyConfig;

/// Default document served for bare navigations
pub const DEFAULT_ENTRY_PATH: &str = "/index.html";
/// Default budget for the in-memory cache tier
pub const DEFAULT_MAX_MEMORY_CACHE_SIZE: u64 = 64 * 1024 * 1024;
/// Default retry count for precache fetches
pub const DEFAULT_PRECACHE_RETRIES: u32 = 2;
/// Default user agent for upstream requests
pub const DEFAULT_USER_AGENT: &str = concat!("isogate/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for an isolation gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Origin the gateway fronts; requests to any other origin pass through
    pub origin: Url,
    /// Path served when a navigation targets "/"
    pub entry_path: String,
    /// Cache generation this gateway runs as
    pub generation: GenerationId,
    /// Cache root directory. `None` places the cache in a temp directory.
    pub cache_root: Option<PathBuf>,
    /// Path prefix that limits which static assets get cached on demand.
    /// `None` caches every successful same-origin GET.
    pub cache_scope: Option<String>,
    /// Byte budget for the in-memory cache tier
    pub max_memory_cache_size: u64,
    /// Retries per precache fetch before giving up on an asset
    pub precache_retries: u32,
    /// Assets to fetch eagerly at install time
    pub manifest: Manifest,
    /// Overall request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read timeout
    pub read_timeout: Duration,
    /// Whether upstream redirects are followed
    pub follow_redirects: bool,
    /// User agent sent upstream
    pub user_agent: String,
    /// Extra headers sent on every upstream request
    pub headers: HeaderMap,
    /// Egress proxy for upstream traffic
    pub proxy: Option<ProxyConfig>,
    /// Whether to honor system proxy settings when no explicit proxy is set
    pub use_system_proxy: bool,
}

impl GatewayConfig {
    /// Configuration with defaults for the given origin
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            entry_path: DEFAULT_ENTRY_PATH.to_string(),
            generation: GenerationId(1),
            cache_root: None,
            cache_scope: None,
            max_memory_cache_size: DEFAULT_MAX_MEMORY_CACHE_SIZE,
            precache_retries: DEFAULT_PRECACHE_RETRIES,
            manifest: Manifest::default(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: HeaderMap::new(),
            proxy: None,
            use_system_proxy: false,
        }
    }

    /// Fluent builder for the given origin
    pub fn builder(origin: Url) -> GatewayConfigBuilder {
        GatewayConfigBuilder::new(origin)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(GatewayError::ConfigError(format!(
                "origin must be http or https, got {}",
                self.origin.scheme()
            )));
        }
        if !self.origin.has_host() {
            return Err(GatewayError::ConfigError(
                "origin URL must have a host".to_string(),
            ));
        }
        if !self.entry_path.starts_with('/') {
            return Err(GatewayError::ConfigError(format!(
                "entry path must be root-relative, got {:?}",
                self.entry_path
            )));
        }
        if let Some(scope) = &self.cache_scope {
            if !scope.starts_with('/') {
                return Err(GatewayError::ConfigError(format!(
                    "cache scope must be root-relative, got {scope:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://play.example.com").unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::new(origin());
        assert_eq!(config.entry_path, "/index.html");
        assert_eq!(config.generation, GenerationId(1));
        assert!(config.cache_root.is_none());
        assert!(config.cache_scope.is_none());
        assert!(config.follow_redirects);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_http_origin() {
        let config = GatewayConfig::new(Url::parse("ftp://files.example.com").unwrap());
        assert!(matches!(
            config.validate(),
            Err(GatewayError::ConfigError(_))
        ));
    }

    #[test]
    fn test_rejects_relative_entry_path() {
        let mut config = GatewayConfig::new(origin());
        config.entry_path = "index.html".to_string();
        assert!(matches!(
            config.validate(),
            Err(GatewayError::ConfigError(_))
        ));
    }

    #[test]
    fn test_rejects_relative_cache_scope() {
        let mut config = GatewayConfig::new(origin());
        config.cache_scope = Some("emulators/".to_string());
        assert!(matches!(
            config.validate(),
            Err(GatewayError::ConfigError(_))
        ));
    }
}
