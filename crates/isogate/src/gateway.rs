//! # Isolation Gateway
//!
//! The public facade. Wires the classifier, the generation cache and the
//! response pipeline together and exposes the three lifecycle points:
//! [`install`](IsolationGateway::install),
//! [`activate`](IsolationGateway::activate) and
//! [`fetch`](IsolationGateway::fetch).

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, trace, warn};

use crate::cache::{GenerationCacheManager, GenerationId};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::fetch::{HttpUpstream, Upstream};
use crate::pipeline::ResponsePipeline;
use crate::request::{InterceptedRequest, RequestClassifier};
use crate::response::GatewayResponse;

/// Cross-origin isolation gateway for one origin
pub struct IsolationGateway {
    classifier: RequestClassifier,
    manager: Arc<GenerationCacheManager>,
    upstream: Arc<dyn Upstream>,
    pipeline: ResponsePipeline,
}

impl IsolationGateway {
    /// Build a gateway with an HTTP upstream derived from the configuration
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(&config)?);
        Self::with_upstream(config, upstream)
    }

    /// Build a gateway over a custom upstream implementation
    pub fn with_upstream(
        config: GatewayConfig,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let cache_root = config
            .cache_root
            .clone()
            .unwrap_or_else(default_cache_root);

        let manager = Arc::new(GenerationCacheManager::new(
            cache_root,
            config.generation,
            config.max_memory_cache_size,
            config.precache_retries,
            config.manifest.clone(),
        ));

        let classifier = RequestClassifier::new(config.origin.clone());
        let pipeline = ResponsePipeline::new(&config, Arc::clone(&manager), Arc::clone(&upstream));

        Ok(Self {
            classifier,
            manager,
            upstream,
            pipeline,
        })
    }

    pub fn generation(&self) -> GenerationId {
        self.manager.generation()
    }

    /// Whether the gateway runs without cache acceleration
    pub fn is_degraded(&self) -> bool {
        self.manager.is_degraded()
    }

    /// Install-time setup: open the current generation's store and warm it
    /// from the precache manifest. Infallible; a gateway whose store cannot
    /// open keeps running and only injects headers.
    pub async fn install(&self) {
        info!(generation = %self.manager.generation(), "installing gateway");
        self.manager.initialize(self.upstream.as_ref()).await;
        if self.manager.is_degraded() {
            warn!("gateway installed without cache acceleration");
        } else {
            info!("gateway installed");
        }
    }

    /// Activation: reclaim every cache generation other than the current
    /// one. Safe to call repeatedly.
    pub async fn activate(&self) {
        info!(generation = %self.manager.generation(), "activating gateway");
        if let Err(e) = self.manager.activate().await {
            warn!(error = %e, "stale generation cleanup failed");
        }
    }

    /// Intercept one request. `Some` is the gateway's answer; `None` means
    /// the request is cross-origin and must go to the network untouched.
    pub async fn fetch(&self, request: &InterceptedRequest) -> Option<GatewayResponse> {
        let lane = self.classifier.classify(request);
        trace!(path = request.path(), ?lane, "classified request");
        self.pipeline.respond(lane, request).await
    }
}

fn default_cache_root() -> PathBuf {
    std::env::temp_dir().join("isogate-cache")
}
