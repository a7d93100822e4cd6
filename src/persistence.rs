//! SQLite-backed tile cache for offline map use.
//!
//! Tiles live in a single `tiles` table keyed by `source/z/x/y`. Every cache
//! operation opens its own short-lived connection, so concurrent readers never
//! queue behind one shared handle. The database runs in WAL mode, which lets
//! readers proceed while a writer commits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::tile_cache::{now_millis, CachedTile, TileCache, TileKey};
use crate::Result;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable [`TileCache`] stored in a SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteTileCache {
    path: PathBuf,
}

impl SqliteTileCache {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (creating if needed) the cache database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let cache = Self {
            path: path.as_ref().to_path_buf(),
        };

        let conn = cache.connect()?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Self::init_schema(&conn)?;

        info!(
            "[TileCache] Opened SQLite tile cache at {} (journal_mode={})",
            cache.path.display(),
            mode
        );
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tiles (
                tile_id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                zoom INTEGER NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                data BLOB NOT NULL,
                fetched_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tiles_expires ON tiles(expires_at);
            "#,
        )?;
        Ok(())
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn lookup(&self, key: &TileKey) -> Result<Option<CachedTile>> {
        let conn = self.connect()?;
        let tile = conn
            .query_row(
                "SELECT source, zoom, x, y, data, fetched_at, expires_at
                 FROM tiles WHERE tile_id = ?1",
                params![key.cache_id()],
                |row| {
                    Ok(CachedTile {
                        key: TileKey {
                            source: row.get(0)?,
                            zoom: row.get(1)?,
                            x: row.get(2)?,
                            y: row.get(3)?,
                        },
                        data: row.get(4)?,
                        fetched_at: row.get(5)?,
                        expires_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(tile)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl TileCache for SqliteTileCache {
    fn get(&self, key: &TileKey) -> Option<Vec<u8>> {
        match self.lookup(key) {
            Ok(Some(tile)) if tile.is_fresh_at(now_millis()) => Some(tile.data),
            Ok(_) => None,
            Err(e) => {
                warn!("[TileCache] Read failed for {}, treating as miss: {}", key, e);
                None
            }
        }
    }

    fn put(&self, key: TileKey, data: Vec<u8>, ttl: Duration) -> Result<()> {
        let tile = CachedTile::new(key, data, now_millis(), ttl);
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO tiles (tile_id, source, zoom, x, y, data, fetched_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(tile_id) DO UPDATE SET
                data = excluded.data,
                fetched_at = excluded.fetched_at,
                expires_at = excluded.expires_at",
            params![
                tile.key.cache_id(),
                tile.key.source,
                tile.key.zoom,
                tile.key.x,
                tile.key.y,
                tile.data,
                tile.fetched_at,
                tile.expires_at,
            ],
        )?;
        debug!("[TileCache] Stored {} ({} bytes)", tile.key, tile.data.len());
        Ok(())
    }

    fn entry(&self, key: &TileKey) -> Option<CachedTile> {
        self.lookup(key).unwrap_or_else(|e| {
            warn!("[TileCache] Read failed for {}: {}", key, e);
            None
        })
    }

    fn prune(&self) -> Result<usize> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM tiles WHERE expires_at <= ?1",
            params![now_millis()],
        )?;
        if removed > 0 {
            info!("[TileCache] Pruned {} expired tiles", removed);
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.count().unwrap_or_else(|e| {
            warn!("[TileCache] Count failed: {}", e);
            0
        })
    }
}

#[cfg(all(test, feature = "persistence"))]
mod tests {
    use super::*;
    use crate::tile_cache::{get_or_fetch, TileOrigin, DEFAULT_TILE_TTL};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, SqliteTileCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteTileCache::open(dir.path().join("tiles.db")).unwrap();
        (dir, cache)
    }

    fn key() -> TileKey {
        TileKey::new("satellite", 15, 17062, 11607)
    }

    #[test]
    fn test_open_creates_empty_cache() {
        let (_dir, cache) = open_temp();
        assert!(cache.is_empty());
        assert!(cache.path().exists());
    }

    #[test]
    fn test_zero_ttl_is_miss() {
        let (_dir, cache) = open_temp();
        cache.put(key(), vec![1, 2, 3], Duration::ZERO).unwrap();
        assert!(cache.get(&key()).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_hour_ttl_is_hit() {
        let (_dir, cache) = open_temp();
        cache.put(key(), vec![4, 5, 6], Duration::from_secs(3600)).unwrap();
        assert_eq!(cache.get(&key()), Some(vec![4, 5, 6]));
    }

    #[test]
    fn test_upsert_keeps_one_row_with_latest() {
        let (_dir, cache) = open_temp();
        cache.put(key(), vec![1], Duration::from_secs(10)).unwrap();
        cache.put(key(), vec![2, 2], Duration::from_secs(7200)).unwrap();

        assert_eq!(cache.len(), 1);
        let entry = cache.entry(&key()).unwrap();
        assert_eq!(entry.key, key());
        assert_eq!(entry.data, vec![2, 2]);
        assert_eq!(entry.expires_at - entry.fetched_at, 7_200_000);
    }

    #[test]
    fn test_prune_expired() {
        let (_dir, cache) = open_temp();
        cache.put(key(), vec![1], Duration::ZERO).unwrap();
        cache
            .put(TileKey::new("satellite", 15, 17063, 11607), vec![2], DEFAULT_TILE_TTL)
            .unwrap();

        assert_eq!(cache.prune().unwrap(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.entry(&key()).is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.db");
        {
            let cache = SqliteTileCache::open(&path).unwrap();
            cache.put(key(), vec![42], DEFAULT_TILE_TTL).unwrap();
        }
        let reopened = SqliteTileCache::open(&path).unwrap();
        assert_eq!(reopened.get(&key()), Some(vec![42]));
    }

    #[test]
    fn test_unreadable_database_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteTileCache {
            path: dir.path().join("missing").join("tiles.db"),
        };
        assert!(cache.get(&key()).is_none());
        assert_eq!(cache.len(), 0);
        assert!(cache.put(key(), vec![1], DEFAULT_TILE_TTL).is_err());
    }

    #[test]
    fn test_get_or_fetch_populates() {
        let (_dir, cache) = open_temp();
        let fetcher = |_: &TileKey| -> Result<Vec<u8>> { Ok(vec![7, 7, 7]) };

        let first = get_or_fetch(&cache, &fetcher, &key(), DEFAULT_TILE_TTL);
        assert_eq!(first.origin, TileOrigin::Fetched);
        let second = get_or_fetch(&cache, &fetcher, &key(), DEFAULT_TILE_TTL);
        assert_eq!(second.origin, TileOrigin::Cache);
        assert_eq!(second.data, vec![7, 7, 7]);
    }

    #[test]
    fn test_concurrent_access() {
        let (_dir, cache) = open_temp();
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..6u32)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let key = TileKey::new("topo", 12, i, i);
                    cache.put(key.clone(), vec![i as u8; 64], DEFAULT_TILE_TTL).unwrap();
                    cache.get(&key).map(|data| data.len())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(64));
        }
        assert_eq!(cache.len(), 6);
    }

    #[test]
    fn test_concurrent_writes_to_same_key() {
        let (_dir, cache) = open_temp();
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..6u8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.put(key(), vec![i; 8192], DEFAULT_TILE_TTL))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(cache.len(), 1);
        let data = cache.get(&key()).unwrap();
        assert_eq!(data.len(), 8192);
        assert!(data.iter().all(|b| *b == data[0]), "mixed payloads");
        assert!(data[0] < 6);
    }
}
