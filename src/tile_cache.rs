//! # Tile Cache
//!
//! Key-value storage for map tile bytes with a time-to-live per entry.
//!
//! The cache never touches the network. Fetching is injected through the
//! [`TileFetcher`] trait and combined with a cache by [`get_or_fetch`], which
//! degrades to [`BLANK_TILE`] when the source is unreachable so map rendering
//! keeps going offline.
//!
//! Two backends are provided:
//! - [`MemoryTileCache`] for tests and short-lived sessions
//! - `SqliteTileCache` (feature `persistence`) for durable offline storage

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::Result;

/// Default tile lifetime: one day.
pub const DEFAULT_TILE_TTL: Duration = Duration::from_secs(86_400);

/// Returned in place of a tile the source could not provide.
pub const BLANK_TILE: &[u8] = &[];

// ============================================================================
// Keys and entries
// ============================================================================

/// Identifies one tile of one tile source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TileKey {
    /// Tile source name, e.g. "topo" or "satellite"
    pub source: String,
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(source: impl Into<String>, zoom: u8, x: u32, y: u32) -> Self {
        Self {
            source: source.into(),
            zoom,
            x,
            y,
        }
    }

    /// Storage identifier, `source/z/x/y`.
    pub fn cache_id(&self) -> String {
        format!("{}/{}/{}/{}", self.source, self.zoom, self.x, self.y)
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}/{}", self.source, self.zoom, self.x, self.y)
    }
}

/// A stored tile. Times are Unix milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTile {
    pub key: TileKey,
    pub data: Vec<u8>,
    pub fetched_at: i64,
    pub expires_at: i64,
}

impl CachedTile {
    /// Build an entry fetched at `now_ms` that lives for `ttl`.
    pub fn new(key: TileKey, data: Vec<u8>, now_ms: i64, ttl: Duration) -> Self {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            key,
            data,
            fetched_at: now_ms,
            expires_at: now_ms.saturating_add(ttl_ms),
        }
    }

    /// Fresh strictly before `expires_at`, so a zero TTL is stale immediately.
    pub fn is_fresh_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at
    }
}

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

// ============================================================================
// Cache trait
// ============================================================================

/// Tile storage with per-entry expiry.
///
/// Implementations must be safe to share between threads. Reads of absent or
/// expired entries are misses, and a read that fails in the backend is logged
/// and reported as a miss too.
pub trait TileCache: Send + Sync {
    /// Fresh tile bytes, or `None`.
    fn get(&self, key: &TileKey) -> Option<Vec<u8>>;

    /// Store or replace a tile. Replacing is atomic: readers see the old or the
    /// new entry, never a mix.
    fn put(&self, key: TileKey, data: Vec<u8>, ttl: Duration) -> Result<()>;

    /// The stored entry regardless of freshness.
    fn entry(&self, key: &TileKey) -> Option<CachedTile>;

    /// Delete expired entries, returning how many were removed.
    fn prune(&self) -> Result<usize>;

    /// Number of stored entries, stale ones included.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local tile cache behind a reader-writer lock.
#[derive(Debug, Default)]
pub struct MemoryTileCache {
    entries: RwLock<HashMap<String, CachedTile>>,
}

impl MemoryTileCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TileCache for MemoryTileCache {
    fn get(&self, key: &TileKey) -> Option<Vec<u8>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let now = now_millis();
        entries
            .get(&key.cache_id())
            .filter(|tile| tile.is_fresh_at(now))
            .map(|tile| tile.data.clone())
    }

    fn put(&self, key: TileKey, data: Vec<u8>, ttl: Duration) -> Result<()> {
        let id = key.cache_id();
        let tile = CachedTile::new(key, data, now_millis(), ttl);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(id, tile);
        Ok(())
    }

    fn entry(&self, key: &TileKey) -> Option<CachedTile> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&key.cache_id()).cloned()
    }

    fn prune(&self) -> Result<usize> {
        let now = now_millis();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, tile| tile.is_fresh_at(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("[TileCache] Pruned {} expired tiles from memory", removed);
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// ============================================================================
// Fetching
// ============================================================================

/// Source of tile bytes, usually a network tile server.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, key: &TileKey) -> Result<Vec<u8>>;
}

impl<F> TileFetcher for F
where
    F: Fn(&TileKey) -> Result<Vec<u8>> + Send + Sync,
{
    fn fetch(&self, key: &TileKey) -> Result<Vec<u8>> {
        self(key)
    }
}

/// Where the bytes of a [`TileResponse`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOrigin {
    Cache,
    Fetched,
    /// Fetch failed; data is [`BLANK_TILE`]
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileResponse {
    pub data: Vec<u8>,
    pub origin: TileOrigin,
}

/// Serve a tile from the cache, fetching and storing it on a miss.
///
/// A failed fetch yields [`BLANK_TILE`] and nothing is cached, so the next call
/// tries the source again. A failed store after a successful fetch still
/// returns the fetched bytes.
///
/// # Example
///
/// ```rust
/// use track_coverage::{get_or_fetch, MemoryTileCache, TileKey, TileOrigin, DEFAULT_TILE_TTL};
///
/// let cache = MemoryTileCache::new();
/// let fetcher = |_: &TileKey| -> track_coverage::Result<Vec<u8>> { Ok(b"\x89PNG".to_vec()) };
/// let key = TileKey::new("topo", 12, 2132, 1450);
///
/// let first = get_or_fetch(&cache, &fetcher, &key, DEFAULT_TILE_TTL);
/// assert_eq!(first.origin, TileOrigin::Fetched);
///
/// let second = get_or_fetch(&cache, &fetcher, &key, DEFAULT_TILE_TTL);
/// assert_eq!(second.origin, TileOrigin::Cache);
/// assert_eq!(second.data, first.data);
/// ```
pub fn get_or_fetch<C, F>(cache: &C, fetcher: &F, key: &TileKey, ttl: Duration) -> TileResponse
where
    C: TileCache + ?Sized,
    F: TileFetcher + ?Sized,
{
    if let Some(data) = cache.get(key) {
        return TileResponse {
            data,
            origin: TileOrigin::Cache,
        };
    }

    match fetcher.fetch(key) {
        Ok(data) => {
            if let Err(e) = cache.put(key.clone(), data.clone(), ttl) {
                warn!("[TileCache] Failed to store {}: {}", key, e);
            }
            TileResponse {
                data,
                origin: TileOrigin::Fetched,
            }
        }
        Err(e) => {
            warn!("[TileCache] Fetch failed for {}, serving blank tile: {}", key, e);
            TileResponse {
                data: BLANK_TILE.to_vec(),
                origin: TileOrigin::Fallback,
            }
        }
    }
}
