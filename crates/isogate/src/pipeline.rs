//! # Response Pipeline
//!
//! Turns a classified request into a response. Each lane is a
//! [`LanePolicy`]: navigation rides network-first with a cache fallback,
//! static assets ride cache-first with compressed-sibling preference.
//! Cross-origin requests never reach a lane.
//!
//! Lanes are infallible. Whatever goes wrong underneath, a lane settles
//! with some response so interception never leaves a request hanging.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{self, HeaderValue};
use tracing::{debug, trace, warn};

use crate::cache::GenerationCacheManager;
use crate::config::GatewayConfig;
use crate::fetch::Upstream;
use crate::manifest::CompressionVariantMap;
use crate::request::{InterceptedRequest, RequestLane};
use crate::response::{GatewayResponse, content_type_for_path};

/// Response strategy for one request lane
#[async_trait]
pub trait LanePolicy: Send + Sync {
    /// Produce the response for a request routed down this lane
    async fn respond(&self, request: &InterceptedRequest) -> GatewayResponse;
}

/// Network-first lane for top-level document loads.
///
/// The network copy wins when reachable. When it is not, a cached copy of
/// the document keeps the app bootable offline, and only after a second
/// network attempt also fails does the lane give up with a 502. Documents
/// are always marked no-store so a stale shell never outlives the gateway.
pub struct NavigationLane {
    entry_path: String,
    manager: Arc<GenerationCacheManager>,
    upstream: Arc<dyn Upstream>,
}

impl NavigationLane {
    pub fn new(
        entry_path: String,
        manager: Arc<GenerationCacheManager>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            entry_path,
            manager,
            upstream,
        }
    }

    /// Bare navigations share a cache entry with the entry document
    fn normalize<'a>(&'a self, path: &'a str) -> &'a str {
        if path == "/" { &self.entry_path } else { path }
    }

    fn finish(&self, mut response: GatewayResponse) -> GatewayResponse {
        response.apply_isolation();
        response.apply_no_store();
        response
    }
}

#[async_trait]
impl LanePolicy for NavigationLane {
    async fn respond(&self, request: &InterceptedRequest) -> GatewayResponse {
        let path = self.normalize(request.path());

        let first_error = match self.upstream.fetch(request.method.clone(), path).await {
            Ok(response) => {
                if request.is_get() && response.is_success() {
                    self.manager.put(path, &response).await;
                }
                return self.finish(response);
            }
            Err(e) => e,
        };

        warn!(path, error = %first_error, "navigation fetch failed, trying cache fallback");

        if let Some(cached) = self.manager.get(path).await {
            debug!(path, "serving navigation from cache fallback");
            return self.finish(cached);
        }

        // Last cache resort: the entry document keeps the app bootable
        // even when the failed navigation targeted another route.
        if path != self.entry_path {
            if let Some(cached) = self.manager.get(&self.entry_path).await {
                debug!(path, entry = %self.entry_path, "serving entry document as fallback");
                return self.finish(cached);
            }
        }

        match self.upstream.fetch(request.method.clone(), path).await {
            Ok(response) => self.finish(response),
            Err(e) => {
                warn!(path, error = %e, "navigation failed with no cached fallback");
                let mut response = GatewayResponse::bad_gateway("origin unreachable");
                response.apply_isolation();
                response
            }
        }
    }
}

/// Cache-first lane for same-origin subresources.
///
/// Lookup order: precompressed sibling, plain cached copy, network. A
/// sibling hit is re-dressed as the original asset, with the content type
/// taken from the original path and the content encoding from the sibling
/// extension. Only in-scope GETs are cached; everything else is proxied
/// with isolation headers applied.
pub struct StaticAssetLane {
    variants: CompressionVariantMap,
    cache_scope: Option<String>,
    manager: Arc<GenerationCacheManager>,
    upstream: Arc<dyn Upstream>,
}

impl StaticAssetLane {
    pub fn new(
        variants: CompressionVariantMap,
        cache_scope: Option<String>,
        manager: Arc<GenerationCacheManager>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            variants,
            cache_scope,
            manager,
            upstream,
        }
    }

    fn in_scope(&self, path: &str) -> bool {
        match &self.cache_scope {
            Some(scope) => path.starts_with(scope.as_str()),
            None => true,
        }
    }

    /// Present a cached compressed sibling as the original asset
    fn from_sibling(&self, path: &str, sibling: &str, cached: GatewayResponse) -> GatewayResponse {
        let mut headers = cached.headers;
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type_for_path(path)),
        );
        if let Some(encoding) = CompressionVariantMap::encoding_for(sibling) {
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(encoding));
        }

        let mut response = GatewayResponse::new(cached.status, headers, cached.body);
        response.apply_isolation();
        response.apply_immutable_caching();
        response
    }
}

#[async_trait]
impl LanePolicy for StaticAssetLane {
    async fn respond(&self, request: &InterceptedRequest) -> GatewayResponse {
        let path = request.path();
        let cacheable = request.is_get() && self.in_scope(path);

        if cacheable {
            if let Some(sibling) = self.variants.sibling_for(path) {
                if let Some(cached) = self.manager.get(sibling).await {
                    trace!(path, sibling, "serving precompressed sibling");
                    return self.from_sibling(path, sibling, cached);
                }
            }

            if let Some(mut cached) = self.manager.get(path).await {
                trace!(path, "static asset cache hit");
                cached.apply_isolation();
                cached.apply_immutable_caching();
                return cached;
            }
        }

        match self.upstream.fetch(request.method.clone(), path).await {
            Ok(mut response) => {
                let store = cacheable && response.is_success();
                if store {
                    self.manager.put(path, &response).await;
                }
                response.apply_isolation();
                if store {
                    response.apply_immutable_caching();
                }
                response
            }
            Err(e) => {
                warn!(path, error = %e, "static asset unavailable from network and cache");
                let mut response = GatewayResponse::bad_gateway("upstream unavailable");
                response.apply_isolation();
                response
            }
        }
    }
}

/// Routes classified requests to their lane
pub struct ResponsePipeline {
    navigation: Box<dyn LanePolicy>,
    static_asset: Box<dyn LanePolicy>,
}

impl ResponsePipeline {
    pub fn new(
        config: &GatewayConfig,
        manager: Arc<GenerationCacheManager>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        let navigation = NavigationLane::new(
            config.entry_path.clone(),
            Arc::clone(&manager),
            Arc::clone(&upstream),
        );
        let static_asset = StaticAssetLane::new(
            config.manifest.variant_map(),
            config.cache_scope.clone(),
            manager,
            upstream,
        );

        Self {
            navigation: Box::new(navigation),
            static_asset: Box::new(static_asset),
        }
    }

    /// Respond for a classified request. `None` means the request is not
    /// ours and must go to the network untouched.
    pub async fn respond(
        &self,
        lane: RequestLane,
        request: &InterceptedRequest,
    ) -> Option<GatewayResponse> {
        match lane {
            RequestLane::Navigation => Some(self.navigation.respond(request).await),
            RequestLane::StaticAsset => Some(self.static_asset.respond(request).await),
            RequestLane::PassThrough => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::GenerationId;
    use crate::fetch::testing::ScriptedUpstream;
    use crate::manifest::{Manifest, ManifestEntry};
    use bytes::Bytes;
    use reqwest::{Method, StatusCode};
    use url::Url;

    const ORIGIN: &str = "https://play.example.com";

    fn config_with(manifest: Manifest, cache_scope: Option<&str>) -> GatewayConfig {
        let mut builder =
            GatewayConfig::builder(Url::parse(ORIGIN).unwrap()).with_manifest(manifest);
        if let Some(scope) = cache_scope {
            builder = builder.with_cache_scope(scope);
        }
        builder.with_precache_retries(0).build().unwrap()
    }

    async fn pipeline_for(
        config: &GatewayConfig,
        upstream: Arc<ScriptedUpstream>,
        root: &std::path::Path,
        precache: bool,
    ) -> (ResponsePipeline, Arc<GenerationCacheManager>) {
        crate::fetch::testing::init_test_logging();
        let manager = Arc::new(GenerationCacheManager::new(
            root.to_path_buf(),
            GenerationId(1),
            1024 * 1024,
            0,
            if precache {
                config.manifest.clone()
            } else {
                Manifest::default()
            },
        ));
        manager.initialize(upstream.as_ref()).await;

        let pipeline = ResponsePipeline::new(
            config,
            Arc::clone(&manager),
            Arc::clone(&upstream) as Arc<dyn Upstream>,
        );
        (pipeline, manager)
    }

    fn assert_isolated(response: &GatewayResponse) {
        assert_eq!(
            response.headers.get("cross-origin-opener-policy").unwrap(),
            "same-origin"
        );
        assert_eq!(
            response.headers.get("cross-origin-embedder-policy").unwrap(),
            "require-corp"
        );
    }

    fn cache_control(response: &GatewayResponse) -> &str {
        response
            .headers
            .get(header::CACHE_CONTROL)
            .unwrap()
            .to_str()
            .unwrap()
    }

    #[tokio::test]
    async fn test_navigation_network_first() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(ScriptedUpstream::new().ok(
            "/index.html",
            "text/html",
            b"<html>fresh</html>",
        ));
        let config = config_with(Manifest::default(), None);
        let (pipeline, manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request = InterceptedRequest::navigation(&format!("{ORIGIN}/index.html")).unwrap();
        let response = pipeline
            .respond(RequestLane::Navigation, &request)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"<html>fresh</html>"));
        assert_isolated(&response);
        assert_eq!(cache_control(&response), "no-store");

        // The successful document was kept as an offline fallback.
        assert!(manager.get("/index.html").await.is_some());
    }

    #[tokio::test]
    async fn test_navigation_falls_back_to_cache() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .ok("/index.html", "text/html", b"<html>cached</html>")
                .fail("/index.html"),
        );
        let config = config_with(Manifest::default(), None);
        let (pipeline, manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request = InterceptedRequest::navigation(&format!("{ORIGIN}/index.html")).unwrap();

        // First navigation succeeds and seeds the fallback copy.
        pipeline.respond(RequestLane::Navigation, &request).await;
        assert!(manager.get("/index.html").await.is_some());

        // Second navigation hits the scripted failure and rides the cache.
        let response = pipeline
            .respond(RequestLane::Navigation, &request)
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"<html>cached</html>"));
        assert_isolated(&response);
        assert_eq!(cache_control(&response), "no-store");
    }

    #[tokio::test]
    async fn test_navigation_falls_back_to_entry_document() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .ok("/index.html", "text/html", b"<html>shell</html>")
                .fail("/index.html")
                .fail("/levels/2.html"),
        );
        let config = config_with(Manifest::default(), None);
        let (pipeline, _manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        // Seed the entry document.
        let entry = InterceptedRequest::navigation(&format!("{ORIGIN}/index.html")).unwrap();
        pipeline.respond(RequestLane::Navigation, &entry).await;

        // A different route fails over the network and has no cached copy
        // of its own, so the entry document answers.
        let request = InterceptedRequest::navigation(&format!("{ORIGIN}/levels/2.html")).unwrap();
        let response = pipeline
            .respond(RequestLane::Navigation, &request)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"<html>shell</html>"));
        assert_isolated(&response);
    }

    #[tokio::test]
    async fn test_navigation_retry_after_fallback_miss() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .fail("/index.html")
                .ok("/index.html", "text/html", b"<html>retry</html>"),
        );
        let config = config_with(Manifest::default(), None);
        let (pipeline, _manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request = InterceptedRequest::navigation(&format!("{ORIGIN}/index.html")).unwrap();
        let response = pipeline
            .respond(RequestLane::Navigation, &request)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"<html>retry</html>"));
        assert_eq!(upstream.call_count("/index.html"), 2);
    }

    #[tokio::test]
    async fn test_navigation_total_failure_synthesizes_bad_gateway() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(ScriptedUpstream::new().fail("/index.html"));
        let config = config_with(Manifest::default(), None);
        let (pipeline, _manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request = InterceptedRequest::navigation(&format!("{ORIGIN}/index.html")).unwrap();
        let response = pipeline
            .respond(RequestLane::Navigation, &request)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_isolated(&response);
        assert_eq!(cache_control(&response), "no-store");
    }

    #[tokio::test]
    async fn test_bare_navigation_shares_entry_document() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(ScriptedUpstream::new().ok(
            "/index.html",
            "text/html",
            b"<html>entry</html>",
        ));
        let config = config_with(Manifest::default(), None);
        let (pipeline, manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request = InterceptedRequest::navigation(&format!("{ORIGIN}/")).unwrap();
        let response = pipeline
            .respond(RequestLane::Navigation, &request)
            .await
            .unwrap();

        assert_eq!(response.body, Bytes::from_static(b"<html>entry</html>"));
        assert_eq!(upstream.call_count("/index.html"), 1);
        assert_eq!(upstream.call_count("/"), 0);
        assert!(manager.get("/index.html").await.is_some());
    }

    #[tokio::test]
    async fn test_static_asset_cache_first() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(ScriptedUpstream::new().ok(
            "/emulators/core.wasm",
            "application/wasm",
            b"\0asm",
        ));
        let config = config_with(Manifest::default(), None);
        let (pipeline, _manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request =
            InterceptedRequest::subresource(&format!("{ORIGIN}/emulators/core.wasm")).unwrap();

        // Miss: fetched from the network, then stored.
        let first = pipeline
            .respond(RequestLane::StaticAsset, &request)
            .await
            .unwrap();
        assert_eq!(first.status, StatusCode::OK);
        assert_isolated(&first);
        assert_eq!(cache_control(&first), "public, max-age=31536000, immutable");

        // Hit: second request never reaches the upstream.
        let second = pipeline
            .respond(RequestLane::StaticAsset, &request)
            .await
            .unwrap();
        assert_eq!(second.body, Bytes::from_static(b"\0asm"));
        assert_isolated(&second);
        assert_eq!(cache_control(&second), "public, max-age=31536000, immutable");
        assert_eq!(upstream.call_count("/emulators/core.wasm"), 1);
    }

    #[tokio::test]
    async fn test_static_asset_prefers_compressed_sibling() {
        let root = tempfile::tempdir().unwrap();
        let manifest = Manifest {
            precache: vec![
                ManifestEntry::new("/emulators/core.wasm")
                    .with_compressed("/emulators/core.wasm.br"),
            ],
        };
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .ok("/emulators/core.wasm", "application/wasm", b"\0asm plain")
                .ok("/emulators/core.wasm.br", "application/octet-stream", b"br-bytes"),
        );
        let config = config_with(manifest, None);
        let (pipeline, _manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), true).await;
        let precache_calls = upstream.total_calls();

        let request =
            InterceptedRequest::subresource(&format!("{ORIGIN}/emulators/core.wasm")).unwrap();
        let response = pipeline
            .respond(RequestLane::StaticAsset, &request)
            .await
            .unwrap();

        // Sibling body, original content type, sibling encoding.
        assert_eq!(response.body, Bytes::from_static(b"br-bytes"));
        assert_eq!(
            response.headers.get(header::CONTENT_TYPE).unwrap(),
            "application/wasm"
        );
        assert_eq!(response.headers.get(header::CONTENT_ENCODING).unwrap(), "br");
        assert_isolated(&response);
        assert_eq!(cache_control(&response), "public, max-age=31536000, immutable");
        assert_eq!(upstream.total_calls(), precache_calls);
    }

    #[tokio::test]
    async fn test_sibling_miss_falls_back_to_plain_entry() {
        let root = tempfile::tempdir().unwrap();
        let manifest = Manifest {
            precache: vec![
                ManifestEntry::new("/emulators/core.wasm")
                    .with_compressed("/emulators/core.wasm.br"),
            ],
        };
        let upstream = Arc::new(ScriptedUpstream::new().ok(
            "/emulators/core.wasm",
            "application/wasm",
            b"\0asm plain",
        ));
        let config = config_with(manifest, None);
        // No precache: the sibling is configured but never cached.
        let (pipeline, manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request =
            InterceptedRequest::subresource(&format!("{ORIGIN}/emulators/core.wasm")).unwrap();
        let response = pipeline
            .respond(RequestLane::StaticAsset, &request)
            .await
            .unwrap();

        // Served from the network as the plain asset; no sibling fetch.
        assert_eq!(response.body, Bytes::from_static(b"\0asm plain"));
        assert!(response.headers.get(header::CONTENT_ENCODING).is_none());
        assert_eq!(upstream.call_count("/emulators/core.wasm.br"), 0);
        assert!(manager.get("/emulators/core.wasm").await.is_some());
    }

    #[tokio::test]
    async fn test_static_asset_failure_synthesizes_bad_gateway() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(ScriptedUpstream::new().fail("/emulators/core.wasm"));
        let config = config_with(Manifest::default(), None);
        let (pipeline, _manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request =
            InterceptedRequest::subresource(&format!("{ORIGIN}/emulators/core.wasm")).unwrap();
        let response = pipeline
            .respond(RequestLane::StaticAsset, &request)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_isolated(&response);
        assert_eq!(cache_control(&response), "no-store");
    }

    #[tokio::test]
    async fn test_non_get_subresource_not_cached() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(ScriptedUpstream::new().ok("/api/save", "application/json", b"{}"));
        let config = config_with(Manifest::default(), None);
        let (pipeline, manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request = InterceptedRequest::new(
            &format!("{ORIGIN}/api/save"),
            Method::POST,
            crate::request::RequestMode::Subresource,
        )
        .unwrap();

        for _ in 0..2 {
            let response = pipeline
                .respond(RequestLane::StaticAsset, &request)
                .await
                .unwrap();
            assert_eq!(response.status, StatusCode::OK);
            assert_isolated(&response);
            assert!(response.headers.get(header::CACHE_CONTROL).is_none());
        }

        assert_eq!(upstream.call_count("/api/save"), 2);
        assert!(manager.get("/api/save").await.is_none());
    }

    #[tokio::test]
    async fn test_out_of_scope_asset_not_cached() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(ScriptedUpstream::new().ok("/api/state", "application/json", b"{}"));
        let config = config_with(Manifest::default(), Some("/emulators/"));
        let (pipeline, manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request = InterceptedRequest::subresource(&format!("{ORIGIN}/api/state")).unwrap();

        for _ in 0..2 {
            let response = pipeline
                .respond(RequestLane::StaticAsset, &request)
                .await
                .unwrap();
            assert_isolated(&response);
        }

        assert_eq!(upstream.call_count("/api/state"), 2);
        assert!(manager.get("/api/state").await.is_none());
    }

    #[tokio::test]
    async fn test_error_status_not_cached() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(
            ScriptedUpstream::new().status("/emulators/gone.wasm", StatusCode::NOT_FOUND),
        );
        let config = config_with(Manifest::default(), None);
        let (pipeline, manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request =
            InterceptedRequest::subresource(&format!("{ORIGIN}/emulators/gone.wasm")).unwrap();
        let response = pipeline
            .respond(RequestLane::StaticAsset, &request)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_isolated(&response);
        assert!(response.headers.get(header::CACHE_CONTROL).is_none());
        assert!(manager.get("/emulators/gone.wasm").await.is_none());
    }

    #[tokio::test]
    async fn test_pass_through_yields_none() {
        let root = tempfile::tempdir().unwrap();
        let upstream = Arc::new(ScriptedUpstream::new());
        let config = config_with(Manifest::default(), None);
        let (pipeline, _manager) = pipeline_for(&config, Arc::clone(&upstream), root.path(), false).await;

        let request =
            InterceptedRequest::subresource("https://cdn.example.net/lib.js").unwrap();
        let response = pipeline.respond(RequestLane::PassThrough, &request).await;

        assert!(response.is_none());
        assert_eq!(upstream.total_calls(), 0);
    }
}
