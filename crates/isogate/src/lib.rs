//! # Isogate Engine
//!
//! Client-side interception gateway that makes an origin cross-origin
//! isolated without touching its server. Every same-origin response gets
//! the `Cross-Origin-Opener-Policy: same-origin` and
//! `Cross-Origin-Embedder-Policy: require-corp` headers injected, and
//! large static assets are accelerated through a generation-versioned
//! local cache with precompressed-variant negotiation.
//!
//! ## Architecture
//!
//! - [`request`]: classifies intercepted requests into navigation,
//!   static-asset and pass-through lanes
//! - [`pipeline`]: per-lane response strategies (network-first documents,
//!   cache-first assets)
//! - [`cache`]: the generation-versioned store and its install/activate
//!   lifecycle
//! - [`fetch`]: the upstream HTTP client behind the [`Upstream`] trait
//! - [`gateway`]: the facade tying it all together
//!
//! ## Example
//!
//! ```no_run
//! use isogate_engine::{GatewayConfig, GenerationId, InterceptedRequest, IsolationGateway};
//! use url::Url;
//!
//! # async fn run() -> Result<(), isogate_engine::GatewayError> {
//! let origin = Url::parse("https://play.example.com").unwrap();
//! let config = GatewayConfig::builder(origin)
//!     .with_generation(GenerationId(3))
//!     .with_cache_scope("/emulators/")
//!     .build()?;
//!
//! let gateway = IsolationGateway::new(config)?;
//! gateway.install().await;
//! gateway.activate().await;
//!
//! let request = InterceptedRequest::navigation("https://play.example.com/")?;
//! if let Some(response) = gateway.fetch(&request).await {
//!     assert!(response.headers.contains_key("cross-origin-opener-policy"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod manifest;
pub mod pipeline;
pub mod proxy;
pub mod request;
pub mod response;

pub use builder::GatewayConfigBuilder;
pub use cache::{GenerationCacheManager, GenerationId, GenerationStore};
pub use config::{
    DEFAULT_ENTRY_PATH, DEFAULT_MAX_MEMORY_CACHE_SIZE, DEFAULT_PRECACHE_RETRIES,
    DEFAULT_USER_AGENT, GatewayConfig,
};
pub use error::GatewayError;
pub use fetch::{HttpUpstream, Upstream};
pub use gateway::IsolationGateway;
pub use manifest::{CompressionVariantMap, Manifest, ManifestEntry};
pub use pipeline::{LanePolicy, NavigationLane, ResponsePipeline, StaticAssetLane};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use request::{InterceptedRequest, RequestClassifier, RequestLane, RequestMode};
pub use response::{GatewayResponse, content_type_for_path};
