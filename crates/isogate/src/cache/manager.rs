//! Generation lifecycle: opening the current store, best-effort precache
//! at install time, and garbage collection of stale generations at
//! activation.
//!
//! Every cache failure here degrades instead of propagating. A gateway
//! whose store never opened keeps answering requests from the network
//! with isolation headers applied; it just stops accelerating them.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, trace, warn};

use crate::cache::store::{self, GenerationStore};
use crate::cache::types::GenerationId;
use crate::fetch::Upstream;
use crate::manifest::Manifest;
use crate::response::GatewayResponse;

/// Owns the current generation's store and drives the install/activate
/// lifecycle around it.
pub struct GenerationCacheManager {
    root: PathBuf,
    generation: GenerationId,
    max_memory_bytes: u64,
    precache_retries: u32,
    manifest: Manifest,
    store: RwLock<Option<Arc<GenerationStore>>>,
}

impl GenerationCacheManager {
    pub fn new(
        root: PathBuf,
        generation: GenerationId,
        max_memory_bytes: u64,
        precache_retries: u32,
        manifest: Manifest,
    ) -> Self {
        Self {
            root,
            generation,
            max_memory_bytes,
            precache_retries,
            manifest,
            store: RwLock::new(None),
        }
    }

    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    /// Whether the store failed to open and the gateway is running without
    /// acceleration
    pub fn is_degraded(&self) -> bool {
        self.snapshot().is_none()
    }

    /// Install-time setup: open the current generation's store and warm it
    /// from the precache manifest. Never fails; a store that cannot open
    /// leaves the manager degraded, and precache fetches that fail are
    /// logged and skipped.
    pub async fn initialize(&self, upstream: &dyn Upstream) {
        let opened =
            GenerationStore::open(&self.root, self.generation, self.max_memory_bytes).await;
        let store = match opened {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!(
                    generation = %self.generation,
                    root = %self.root.display(),
                    error = %e,
                    "cache store unavailable, continuing without acceleration"
                );
                return;
            }
        };

        self.publish(Some(Arc::clone(&store)));
        self.precache(&store, upstream).await;
    }

    /// Activation-time garbage collection: every generation directory other
    /// than the current one is deleted. Safe to call repeatedly.
    pub async fn activate(&self) -> io::Result<()> {
        let generations = store::list_generations(&self.root).await?;
        for stale in generations {
            if stale == self.generation {
                continue;
            }
            match store::remove_generation(&self.root, stale).await {
                Ok(()) => info!(
                    stale = %stale,
                    current = %self.generation,
                    "removed stale cache generation"
                ),
                Err(e) => warn!(stale = %stale, error = %e, "failed to remove stale generation"),
            }
        }
        Ok(())
    }

    /// Look up a cached response in the current generation
    pub async fn get(&self, path: &str) -> Option<GatewayResponse> {
        let store = self.snapshot()?;
        store.get(path).await
    }

    /// Store a response, best-effort. Failures are logged, never surfaced;
    /// a write that did not land only costs a future network fetch.
    pub async fn put(&self, path: &str, response: &GatewayResponse) {
        let Some(store) = self.snapshot() else {
            trace!(path, "cache degraded, skipping store");
            return;
        };
        if let Err(e) = store.put(path, response).await {
            warn!(path, error = %e, "failed to cache response");
        }
    }

    async fn precache(&self, store: &Arc<GenerationStore>, upstream: &dyn Upstream) {
        let paths = self.manifest.precache_paths();
        if paths.is_empty() {
            return;
        }

        info!(count = paths.len(), generation = %self.generation, "precaching assets");

        let tasks = paths.into_iter().map(|path| {
            let store = Arc::clone(store);
            async move {
                if store.contains(path).await {
                    trace!(path, "already cached, skipping precache");
                    return;
                }
                match upstream.get_with_retries(path, self.precache_retries).await {
                    Ok(response) if response.is_success() => {
                        if let Err(e) = store.put(path, &response).await {
                            warn!(path, error = %e, "failed to store precached asset");
                        } else {
                            debug!(path, size = response.body.len(), "precached asset");
                        }
                    }
                    Ok(response) => {
                        warn!(path, status = %response.status, "precache fetch returned error status");
                    }
                    Err(e) => warn!(path, error = %e, "precache fetch failed"),
                }
            }
        });

        futures::future::join_all(tasks).await;
    }

    /// Snapshot the store handle. In-flight requests hold the Arc they
    /// grabbed, so swapping or dropping the slot never races a lookup.
    fn snapshot(&self) -> Option<Arc<GenerationStore>> {
        match self.store.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, store: Option<Arc<GenerationStore>>) {
        match self.store.write() {
            Ok(mut guard) => *guard = store,
            Err(poisoned) => *poisoned.into_inner() = store,
        }
    }
}
