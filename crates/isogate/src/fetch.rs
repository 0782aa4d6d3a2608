//! # Upstream Fetching
//!
//! The [`Upstream`] trait is the gateway's only door to the network.
//! Response lanes and the precache path both go through it, which keeps
//! transfer policy (retries, backoff) in one place and lets tests swap
//! the real HTTP client for a scripted stub.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, redirect};
use rustls_platform_verifier::BuilderVerifierExt;
use tracing::{debug, warn};
use url::Url;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::proxy::build_proxy_from_config;
use crate::response::GatewayResponse;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Source of fresh responses for same-origin paths
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch a root-relative path from the origin server
    async fn fetch(&self, method: Method, path: &str) -> Result<GatewayResponse, GatewayError>;

    /// GET a root-relative path
    async fn get(&self, path: &str) -> Result<GatewayResponse, GatewayError> {
        self.fetch(Method::GET, path).await
    }

    /// GET with exponential backoff between attempts. Transport errors are
    /// retried; responses with error status codes are returned as-is.
    async fn get_with_retries(
        &self,
        path: &str,
        retries: u32,
    ) -> Result<GatewayResponse, GatewayError> {
        let mut attempt = 0u32;
        loop {
            match self.fetch(Method::GET, path).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt.min(4));
                    warn!(
                        path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "upstream fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// HTTP upstream backed by a shared reqwest client
pub struct HttpUpstream {
    client: reqwest::Client,
    origin: Url,
}

impl HttpUpstream {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            client: create_client(config)?,
            origin: config.origin.clone(),
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, method: Method, path: &str) -> Result<GatewayResponse, GatewayError> {
        let url = self
            .origin
            .join(path)
            .map_err(|e| GatewayError::UrlError(format!("{path}: {e}")))?;

        debug!(%method, %url, "fetching from upstream");
        let response = self.client.request(method, url).send().await?;
        GatewayResponse::from_upstream(response).await
    }
}

/// Build the shared HTTP client with platform certificate verification
pub(crate) fn create_client(config: &GatewayConfig) -> Result<reqwest::Client, GatewayError> {
    let crypto_provider = rustls::crypto::aws_lc_rs::default_provider();
    let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(crypto_provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| GatewayError::ConfigError(format!("TLS protocol setup failed: {e}")))?
        .with_platform_verifier()
        .map_err(|e| GatewayError::ConfigError(format!("TLS verifier setup failed: {e}")))?
        .with_no_client_auth();

    let mut builder = reqwest::Client::builder()
        .use_preconfigured_tls(tls_config)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .user_agent(config.user_agent.as_str());

    builder = if config.follow_redirects {
        builder.redirect(redirect::Policy::limited(10))
    } else {
        builder.redirect(redirect::Policy::none())
    };

    if !config.headers.is_empty() {
        builder = builder.default_headers(config.headers.clone());
    }

    if let Some(proxy_config) = &config.proxy {
        builder = builder.proxy(build_proxy_from_config(proxy_config)?);
    } else if !config.use_system_proxy {
        builder = builder.no_proxy();
    }

    builder.build().map_err(GatewayError::HttpError)
}
