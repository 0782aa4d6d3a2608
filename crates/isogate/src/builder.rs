//! Fluent builder for [`GatewayConfig`].

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::cache::GenerationId;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::manifest::Manifest;
use crate::proxy::ProxyConfig;

/// Builder for gateway configuration
///
/// ```no_run
/// use isogate_engine::{GatewayConfig, GenerationId};
/// use url::Url;
///
/// let origin = Url::parse("https://play.example.com").unwrap();
/// let config = GatewayConfig::builder(origin)
///     .with_generation(GenerationId(7))
///     .with_cache_scope("/emulators/")
///     .build()
///     .unwrap();
/// ```
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn new(origin: Url) -> Self {
        Self {
            config: GatewayConfig::new(origin),
        }
    }

    /// Path served when a navigation targets "/"
    pub fn with_entry_path(mut self, entry_path: impl Into<String>) -> Self {
        self.config.entry_path = entry_path.into();
        self
    }

    /// Cache generation to run as
    pub fn with_generation(mut self, generation: GenerationId) -> Self {
        self.config.generation = generation;
        self
    }

    /// Directory the cache generations live under
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.cache_root = Some(root.into());
        self
    }

    /// Restrict on-demand caching to paths under this prefix
    pub fn with_cache_scope(mut self, scope: impl Into<String>) -> Self {
        self.config.cache_scope = Some(scope.into());
        self
    }

    /// Byte budget for the in-memory cache tier
    pub fn with_max_memory_cache_size(mut self, bytes: u64) -> Self {
        self.config.max_memory_cache_size = bytes;
        self
    }

    /// Retries per precache fetch
    pub fn with_precache_retries(mut self, retries: u32) -> Self {
        self.config.precache_retries = retries;
        self
    }

    /// Precache manifest
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.config.manifest = manifest;
        self
    }

    /// Overall request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Whether upstream redirects are followed
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// User agent sent upstream
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a header to every upstream request
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, GatewayError> {
        let name = name
            .parse::<HeaderName>()
            .map_err(|e| GatewayError::ConfigError(format!("invalid header name: {e}")))?;
        let value = value
            .parse::<HeaderValue>()
            .map_err(|e| GatewayError::ConfigError(format!("invalid header value: {e}")))?;
        self.config.headers.insert(name, value);
        Ok(self)
    }

    /// Replace the full upstream header set
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers = headers;
        self
    }

    /// Egress proxy for upstream traffic
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    /// Honor system proxy settings when no explicit proxy is configured
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        self.config.use_system_proxy = use_system_proxy;
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<GatewayConfig, GatewayError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
