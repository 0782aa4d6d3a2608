//! Per-generation cache store.
//!
//! Two tiers: a moka in-memory cache fronting a directory of files on
//! disk. Bodies live in `<sha256(path)>.bin`, replay metadata in a JSON
//! `.meta` sidecar. Disk writes go through a temp file and rename so a
//! crash mid-write never leaves a partial entry behind.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, trace, warn};

use crate::cache::types::{EntryMetadata, GenerationId};
use crate::response::GatewayResponse;

/// Cache store for a single generation
pub struct GenerationStore {
    generation: GenerationId,
    dir: PathBuf,
    memory: Cache<String, GatewayResponse>,
    max_memory_bytes: u64,
}

impl GenerationStore {
    /// Open (creating if needed) the store directory for a generation
    pub async fn open(
        root: &Path,
        generation: GenerationId,
        max_memory_bytes: u64,
    ) -> io::Result<Self> {
        let dir = root.join(generation.dir_name());
        fs::create_dir_all(&dir).await?;

        let memory = Cache::builder()
            .max_capacity(max_memory_bytes)
            .weigher(|_path: &String, response: &GatewayResponse| {
                response.body.len().try_into().unwrap_or(u32::MAX)
            })
            .build();

        debug!(generation = %generation, dir = %dir.display(), "opened cache store");

        Ok(Self {
            generation,
            dir,
            memory,
            max_memory_bytes,
        })
    }

    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    /// Look up a cached response by root-relative path
    pub async fn get(&self, path: &str) -> Option<GatewayResponse> {
        if let Some(response) = self.memory.get(path).await {
            trace!(path, "memory cache hit");
            return Some(response);
        }

        match self.read_from_disk(path).await {
            Ok(Some(response)) => {
                trace!(path, "disk cache hit");
                if (response.body.len() as u64) <= self.max_memory_bytes {
                    self.memory.insert(path.to_string(), response.clone()).await;
                }
                Some(response)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(path, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Store a response under a root-relative path
    pub async fn put(&self, path: &str, response: &GatewayResponse) -> io::Result<()> {
        let stem = file_stem(path);
        let metadata = EntryMetadata::from_response(response);
        let meta_bytes = serde_json::to_vec(&metadata)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // Body first, sidecar last: a meta file on disk means the entry
        // is complete.
        write_atomic(&self.dir, &format!("{stem}.bin"), &response.body).await?;
        write_atomic(&self.dir, &format!("{stem}.meta"), &meta_bytes).await?;

        if (response.body.len() as u64) <= self.max_memory_bytes {
            self.memory.insert(path.to_string(), response.clone()).await;
        }

        trace!(path, size = response.body.len(), "cached response");
        Ok(())
    }

    /// Whether an entry exists for the path, in either tier
    pub async fn contains(&self, path: &str) -> bool {
        if self.memory.contains_key(path) {
            return true;
        }
        let stem = file_stem(path);
        fs::try_exists(self.dir.join(format!("{stem}.meta")))
            .await
            .unwrap_or(false)
    }

    /// Drop an entry from both tiers
    pub async fn remove(&self, path: &str) -> io::Result<()> {
        self.memory.invalidate(path).await;
        let stem = file_stem(path);
        remove_if_present(&self.dir.join(format!("{stem}.meta"))).await?;
        remove_if_present(&self.dir.join(format!("{stem}.bin"))).await?;
        Ok(())
    }

    async fn read_from_disk(&self, path: &str) -> io::Result<Option<GatewayResponse>> {
        let stem = file_stem(path);
        let meta_path = self.dir.join(format!("{stem}.meta"));
        let bin_path = self.dir.join(format!("{stem}.bin"));

        let meta_bytes = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let metadata: EntryMetadata = match serde_json::from_slice(&meta_bytes) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path, error = %e, "corrupt cache sidecar, evicting entry");
                remove_if_present(&meta_path).await?;
                remove_if_present(&bin_path).await?;
                return Ok(None);
            }
        };

        let body = match fs::read(&bin_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                remove_if_present(&meta_path).await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        Ok(Some(metadata.into_response(Bytes::from(body))))
    }
}

/// List every generation with a store directory under the cache root
pub async fn list_generations(root: &Path) -> io::Result<Vec<GenerationId>> {
    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut generations = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if let Some(generation) = entry
            .file_name()
            .to_str()
            .and_then(GenerationId::parse_dir_name)
        {
            generations.push(generation);
        }
    }

    generations.sort();
    Ok(generations)
}

/// Delete a generation's store directory and everything in it
pub async fn remove_generation(root: &Path, generation: GenerationId) -> io::Result<()> {
    match fs::remove_dir_all(root.join(generation.dir_name())).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn file_stem(path: &str) -> String {
    hex::encode(Sha256::digest(path.as_bytes()))
}

async fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<()> {
    let tmp = dir.join(format!("{name}.tmp"));
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, dir.join(name)).await?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
