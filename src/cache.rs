//! # Persistent Tile Cache with Quota-Bounded Eviction
//!
//! A checksum-verified, size- and count-bounded store of compressed tile
//! payloads keyed by tile ID. Layout on disk:
//!
//! - `<dir>/index.json` — the record table (metadata only)
//! - `<dir>/<tileId>.tile` — one compressed payload blob per tile
//!
//! ## Eviction Policy
//!
//! After every `put`, if the cache exceeds `max_tiles` or `max_bytes`,
//! records are sorted ascending by `(access_count, last_accessed_at)` and
//! deleted from the front until both limits hold. The two-key sort protects
//! frequently-used tiles that haven't been touched recently *and* freshly
//! downloaded tiles that haven't been used yet. The full-table sort is a
//! known scaling ceiling — fine at the target scale of at most a few hundred
//! tiles.
//!
//! ## Integrity
//!
//! Every read re-hashes the blob against the record's SHA-256. A mismatch is
//! treated as a cache miss: the corrupt entry is deleted on the spot and the
//! caller sees `None`, never corrupted bytes.
//!
//! ## Concurrency
//!
//! All operations funnel through one `Mutex`, so a `put` and a concurrent
//! `get` cannot tear the statistics, and the quota check and the eviction it
//! triggers are atomic. Single process, single device; there is no
//! cross-process coordination.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tile::sha256_hex;

/// Cache size limits. Both must hold after every mutating operation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CacheLimits {
    pub max_tiles: usize,
    pub max_bytes: u64,
}

impl Default for CacheLimits {
    fn default() -> Self {
        // A few dozen coastal tiles at ~200 KiB each fits comfortably on
        // storage-constrained clients.
        Self {
            max_tiles: 64,
            max_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Persisted metadata for one cached tile. The compressed payload lives in a
/// sibling blob file, not in the index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedTileRecord {
    pub id: String,
    pub size_bytes: u64,
    /// SHA-256 hex over the stored compressed bytes.
    pub checksum: String,
    pub version: u32,
    pub downloaded_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
}

/// A record together with its payload bytes, as returned by `get`.
#[derive(Clone, Debug)]
pub struct CachedTile {
    pub record: CachedTileRecord,
    pub compressed_payload: Vec<u8>,
}

/// Point-in-time cache totals.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub count: usize,
    pub total_bytes: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache IO: {0}")]
    Io(#[from] io::Error),
    #[error("cache index corrupt: {0}")]
    Index(#[from] serde_json::Error),
    #[error("tile id {0:?} is not path-safe")]
    InvalidTileId(String),
}

const INDEX_FILE: &str = "index.json";
const BLOB_EXTENSION: &str = "tile";

/// The persistent tile cache. All methods are safe to call from multiple
/// threads; mutations are serialized internally.
pub struct TileCache {
    inner: Mutex<Inner>,
}

struct Inner {
    dir: PathBuf,
    limits: CacheLimits,
    records: HashMap<String, CachedTileRecord>,
}

impl TileCache {
    /// Open (or create) a cache rooted at `dir`.
    ///
    /// Reloads the persisted index and reconciles it against the blob files
    /// actually on disk: records without a blob are dropped, blobs without a
    /// record are removed.
    pub fn open(dir: impl AsRef<Path>, limits: CacheLimits) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let index_path = dir.join(INDEX_FILE);
        let mut records: HashMap<String, CachedTileRecord> = if index_path.exists() {
            let data = fs::read(&index_path)?;
            match serde_json::from_slice::<Vec<CachedTileRecord>>(&data) {
                Ok(list) => list.into_iter().map(|r| (r.id.clone(), r)).collect(),
                Err(e) => {
                    // A corrupt index is recoverable: start empty and let the
                    // orphan sweep clean the blobs up.
                    tracing::warn!(error = %e, "cache index corrupt, rebuilding empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        // Drop records whose blob vanished.
        records.retain(|id, _| dir.join(blob_name(id)).exists());

        // Remove orphan blobs left behind by crashes mid-delete.
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(BLOB_EXTENSION) {
                let id = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default();
                if !records.contains_key(id) {
                    tracing::debug!(tile = id, "removing orphan blob");
                    let _ = fs::remove_file(&path);
                }
            }
        }

        let inner = Inner {
            dir,
            limits,
            records,
        };
        inner.persist_index()?;
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Store a tile's compressed payload, then enforce the quota.
    ///
    /// Replaces any existing entry for the same ID. The record's checksum is
    /// computed here, over the stored bytes.
    pub fn put(&self, tile_id: &str, version: u32, compressed: &[u8]) -> Result<(), CacheError> {
        check_tile_id(tile_id)?;
        let mut inner = self.lock();

        let blob_path = inner.dir.join(blob_name(tile_id));
        fs::write(&blob_path, compressed)?;

        let now = Utc::now();
        inner.records.insert(
            tile_id.to_string(),
            CachedTileRecord {
                id: tile_id.to_string(),
                size_bytes: compressed.len() as u64,
                checksum: sha256_hex(compressed),
                version,
                downloaded_at: now,
                last_accessed_at: now,
                access_count: 0,
            },
        );
        tracing::debug!(tile = tile_id, bytes = compressed.len(), "cached tile");

        inner.evict_over_quota();
        inner.persist_index()
    }

    /// Load a tile, re-validating its checksum.
    ///
    /// A checksum mismatch (or unreadable blob) self-heals: the entry is
    /// deleted and the call returns `Ok(None)`, indistinguishable from a
    /// plain miss. A hit bumps `last_accessed_at` and `access_count`.
    pub fn get(&self, tile_id: &str) -> Result<Option<CachedTile>, CacheError> {
        let mut inner = self.lock();

        let Some(record) = inner.records.get(tile_id).cloned() else {
            return Ok(None);
        };

        let blob_path = inner.dir.join(blob_name(tile_id));
        let bytes = match fs::read(&blob_path) {
            Ok(bytes) if sha256_hex(&bytes) == record.checksum => bytes,
            Ok(_) => {
                tracing::warn!(tile = tile_id, "checksum mismatch, healing cache entry");
                inner.remove_entry(tile_id);
                inner.persist_index()?;
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(tile = tile_id, error = %e, "unreadable blob, healing cache entry");
                inner.remove_entry(tile_id);
                inner.persist_index()?;
                return Ok(None);
            }
        };

        let record = inner
            .records
            .get_mut(tile_id)
            .expect("record checked above");
        record.last_accessed_at = Utc::now();
        record.access_count += 1;
        let record = record.clone();
        inner.persist_index()?;

        Ok(Some(CachedTile {
            record,
            compressed_payload: bytes,
        }))
    }

    /// Remove one tile. Returns whether it existed.
    pub fn delete(&self, tile_id: &str) -> Result<bool, CacheError> {
        let mut inner = self.lock();
        let existed = inner.remove_entry(tile_id);
        if existed {
            inner.persist_index()?;
        }
        Ok(existed)
    }

    /// Current totals. Oldest/newest refer to download time.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let mut stats = CacheStats {
            count: inner.records.len(),
            ..CacheStats::default()
        };
        for record in inner.records.values() {
            stats.total_bytes += record.size_bytes;
            stats.oldest = Some(match stats.oldest {
                Some(t) => t.min(record.downloaded_at),
                None => record.downloaded_at,
            });
            stats.newest = Some(match stats.newest {
                Some(t) => t.max(record.downloaded_at),
                None => record.downloaded_at,
            });
        }
        stats
    }

    /// Remove every entry and blob.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut inner = self.lock();
        let ids: Vec<String> = inner.records.keys().cloned().collect();
        for id in ids {
            inner.remove_entry(&id);
        }
        inner.persist_index()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means another thread panicked mid-operation; the
        // on-disk state is still consistent (index persists last), so
        // continuing with the data is safe.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Inner {
    /// Delete least-valuable records until both limits hold.
    ///
    /// Ascending sort by `(access_count, last_accessed_at)`: least-used
    /// first, ties broken by least-recently-used.
    fn evict_over_quota(&mut self) {
        let over = |records: &HashMap<String, CachedTileRecord>, limits: &CacheLimits| {
            records.len() > limits.max_tiles
                || records.values().map(|r| r.size_bytes).sum::<u64>() > limits.max_bytes
        };
        if !over(&self.records, &self.limits) {
            return;
        }

        let mut order: Vec<(u64, DateTime<Utc>, String)> = self
            .records
            .values()
            .map(|r| (r.access_count, r.last_accessed_at, r.id.clone()))
            .collect();
        order.sort();

        for (_, _, id) in order {
            if !over(&self.records, &self.limits) {
                break;
            }
            tracing::info!(tile = %id, "evicting tile over quota");
            self.remove_entry(&id);
        }
    }

    fn remove_entry(&mut self, tile_id: &str) -> bool {
        let existed = self.records.remove(tile_id).is_some();
        if existed {
            let _ = fs::remove_file(self.dir.join(blob_name(tile_id)));
        }
        existed
    }

    fn persist_index(&self) -> Result<(), CacheError> {
        let list: Vec<&CachedTileRecord> = self.records.values().collect();
        let data = serde_json::to_vec(&list)?;
        fs::write(self.dir.join(INDEX_FILE), data)?;
        Ok(())
    }
}

fn blob_name(tile_id: &str) -> String {
    format!("{tile_id}.{BLOB_EXTENSION}")
}

fn check_tile_id(tile_id: &str) -> Result<(), CacheError> {
    let ok = !tile_id.is_empty()
        && !tile_id.starts_with('.')
        && tile_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(CacheError::InvalidTileId(tile_id.to_string()))
    }
}
