// src/resolver/cache.rs

//! Cache of match results
//!
//! Entries are keyed by an xxh128 digest of the repository and the query
//! parameters and carry the repository checksum they were computed against.
//! A lookup serves an entry only if that checksum is still current and every
//! id it mentions is still available.

use super::MatchOptions;
use super::result::{MatchResult, NotFoundReason};
use crate::error::Result;
use crate::hash::xxh128;
use crate::repository::RepositoryBackend;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub checksum: String,
    pub result: MatchResult,
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    repository: &'a str,
    namespace: &'a str,
    atom: &'a str,
    match_slot: Option<&'a str>,
    multi: bool,
    mask_filter: bool,
    extended: bool,
}

#[derive(Debug, Default)]
pub struct MatchCache {
    entries: DashMap<String, CacheEntry>,
}

impl MatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a query against a backend
    pub fn key_for<B: RepositoryBackend>(backend: &B, atom: &str, options: &MatchOptions) -> Result<String> {
        let namespace = backend.cache_namespace();
        let material = KeyMaterial {
            repository: backend.repository_id(),
            namespace: &namespace,
            atom,
            match_slot: options.match_slot.as_deref(),
            multi: options.multi_match,
            mask_filter: options.mask_filter,
            extended: options.extended,
        };
        Ok(xxh128(&serde_json::to_vec(&material)?))
    }

    /// A still valid result for `key`
    ///
    /// Entries computed against another checksum are misses; entries naming
    /// an id that vanished are evicted.
    pub fn get<B: RepositoryBackend>(&self, backend: &B, key: &str) -> Result<Option<MatchResult>> {
        let Some(entry) = self.entries.get(key).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        if entry.checksum != backend.checksum(false)? {
            return Ok(None);
        }
        if !backend.are_available(&entry.result.ids())? {
            debug!("Evicting cached match {} referring to removed packages", key);
            self.entries.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.result))
    }

    /// Store a result computed against the current checksum
    pub fn insert<B: RepositoryBackend>(&self, backend: &B, key: String, result: &MatchResult) -> Result<()> {
        if result.not_found_reason() == Some(NotFoundReason::BackendUnavailable) {
            return Ok(());
        }
        let entry = CacheEntry {
            checksum: backend.checksum(false)?,
            result: result.clone(),
        };
        self.entries.insert(key, entry);
        Ok(())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the cache to a JSON file
    pub fn persist(&self, path: &Path) -> Result<()> {
        let snapshot: BTreeMap<String, CacheEntry> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_vec(&snapshot)?)?;
        info!("Persisted {} cached matches to {}", snapshot.len(), path.display());
        Ok(())
    }

    /// Read a cache written by `persist`; a missing file gives an empty cache
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let snapshot: BTreeMap<String, CacheEntry> = serde_json::from_slice(&std::fs::read(path)?)?;
        debug!("Loaded {} cached matches from {}", snapshot.len(), path.display());
        Ok(Self {
            entries: snapshot.into_iter().collect(),
        })
    }
}
