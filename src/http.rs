//! HTTP tile fetching with rate limiting.
//!
//! Downloads map tiles from a slippy-map tile server for the tile cache:
//! - Connection pooling shared by all requests of one fetcher
//! - Dispatch rate limiting (spaces out request starts)
//! - Parallel fetching with bounded concurrency
//! - Automatic retry with exponential backoff on 429 and transport errors

use log::{debug, info, warn};
use reqwest::Client;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tokio::task;
use tokio::sync::Mutex;

use crate::tile_cache::{TileCache, TileFetcher, TileKey};
use crate::{Result, TrackError};

// 20 requests/s dispatch ceiling
const DISPATCH_INTERVAL_MS: u64 = 50;
const MAX_CONCURRENCY: usize = 8;
const MAX_RETRIES: u32 = 3;
const USER_AGENT: &str = concat!("track-coverage/", env!("CARGO_PKG_VERSION"));

/// Outcome of fetching one tile in a batch.
#[derive(Debug, Clone)]
pub struct TileFetchResult {
    pub key: TileKey,
    pub data: Option<Vec<u8>>,
    pub success: bool,
    pub error: Option<String>,
}

impl TileFetchResult {
    fn from_result(key: TileKey, result: Result<Vec<u8>>) -> Self {
        match result {
            Ok(data) => Self {
                key,
                data: Some(data),
                success: true,
                error: None,
            },
            Err(e) => Self {
                key,
                data: None,
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Dispatch rate limiter - spaces out when requests START, so bursts of
/// cache misses never hit the tile server faster than one request per
/// DISPATCH_INTERVAL_MS.
#[derive(Debug)]
struct DispatchRateLimiter {
    interval: Duration,
    next_dispatch: Mutex<Instant>,
    dispatched_count: AtomicU32,
    consecutive_429s: AtomicU32,
}

impl DispatchRateLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_dispatch: Mutex::new(Instant::now()),
            dispatched_count: AtomicU32::new(0),
            consecutive_429s: AtomicU32::new(0),
        }
    }

    /// Wait for our dispatch slot. Each caller gets a unique slot
    /// spaced `interval` apart.
    async fn wait_for_dispatch_slot(&self) -> u32 {
        let (wait_duration, dispatch_num) = {
            let mut next = self.next_dispatch.lock().await;
            let now = Instant::now();

            let dispatch_at = if *next > now { *next } else { now };

            // Reserve the next slot for the next caller
            *next = dispatch_at + self.interval;

            let num = self.dispatched_count.fetch_add(1, Ordering::Relaxed) + 1;
            (dispatch_at.saturating_duration_since(now), num)
        };

        // Wait outside the lock
        if wait_duration > Duration::from_millis(5) {
            debug!("[Dispatch #{}] Waiting {:?} for slot", dispatch_num, wait_duration);
            tokio::time::sleep(wait_duration).await;
        }

        dispatch_num
    }

    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        // Exponential backoff: 1s, 2s, 4s max
        let backoff = Duration::from_millis(500 * (1 << count.min(3)));
        warn!("[DispatchRateLimiter] Got 429! Consecutive: {}, backing off {:?}", count, backoff);
        backoff
    }
}

/// Tile downloader for one URL template.
///
/// The template uses `{z}`, `{x}` and `{y}` placeholders, e.g.
/// `https://tile.example.org/{z}/{x}/{y}.png`. The tile source name of a
/// [`TileKey`] only matters to the cache; every key is fetched from this
/// fetcher's template.
///
/// [`HttpTileFetcher::fetch_tiles`] is async and runs on the caller's tokio
/// runtime. The blocking [`TileFetcher`] impl drives a runtime owned by the
/// fetcher, or blocks in place when called from a multi-threaded tokio
/// runtime. On a current-thread runtime it cannot block and reports a fetch
/// error instead, which [`get_or_fetch`](crate::get_or_fetch) turns into a
/// blank tile.
#[derive(Debug)]
pub struct HttpTileFetcher {
    client: Client,
    url_template: String,
    rate_limiter: Arc<DispatchRateLimiter>,
    runtime: OnceLock<Runtime>,
}

impl HttpTileFetcher {
    /// Create a fetcher for the given URL template.
    pub fn new(url_template: impl Into<String>) -> Result<Self> {
        Self::with_dispatch_interval(url_template, Duration::from_millis(DISPATCH_INTERVAL_MS))
    }

    fn with_dispatch_interval(url_template: impl Into<String>, interval: Duration) -> Result<Self> {
        let url_template = url_template.into();
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !url_template.contains(placeholder) {
                return Err(TrackError::TileFetch(format!(
                    "URL template {} is missing {}",
                    url_template, placeholder
                )));
            }
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(MAX_CONCURRENCY * 2)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TrackError::TileFetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url_template,
            rate_limiter: Arc::new(DispatchRateLimiter::new(interval)),
            runtime: OnceLock::new(),
        })
    }

    /// URL of one tile.
    pub fn tile_url(&self, key: &TileKey) -> String {
        self.url_template
            .replace("{z}", &key.zoom.to_string())
            .replace("{x}", &key.x.to_string())
            .replace("{y}", &key.y.to_string())
    }

    /// Fetch many tiles concurrently. Results arrive in completion order.
    pub async fn fetch_tiles(&self, keys: Vec<TileKey>) -> Vec<TileFetchResult> {
        use futures::stream::{self, StreamExt};

        let total = keys.len();
        let completed = Arc::new(AtomicU32::new(0));
        info!(
            "[TileFetcher] Starting fetch of {} tiles (dispatch interval: {:?}, max concurrent: {})",
            total, self.rate_limiter.interval, MAX_CONCURRENCY
        );
        let start = Instant::now();

        let results: Vec<TileFetchResult> = stream::iter(keys)
            .map(|key| {
                let completed = Arc::clone(&completed);
                async move {
                    let result = self.fetch_one(&key).await;
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(
                        "[Progress] {}/{} | {} | done@{:.2}s",
                        done,
                        total,
                        key,
                        start.elapsed().as_secs_f64()
                    );
                    TileFetchResult::from_result(key, result)
                }
            })
            .buffer_unordered(MAX_CONCURRENCY)
            .collect()
            .await;

        let success_count = results.iter().filter(|r| r.success).count();
        info!(
            "[TileFetcher] DONE: {}/{} success ({} errors) in {:.2}s",
            success_count,
            total,
            total - success_count,
            start.elapsed().as_secs_f64()
        );

        results
    }

    async fn fetch_one(&self, key: &TileKey) -> Result<Vec<u8>> {
        self.rate_limiter.wait_for_dispatch_slot().await;
        Self::fetch_single_tile(&self.client, &self.rate_limiter, &self.tile_url(key)).await
    }

    async fn fetch_single_tile(
        client: &Client,
        rate_limiter: &DispatchRateLimiter,
        url: &str,
    ) -> Result<Vec<u8>> {
        let mut retries = 0;
        let req_start = Instant::now();

        loop {
            match client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > MAX_RETRIES {
                            return Err(TrackError::TileFetch(format!(
                                "{}: max retries exceeded (429)",
                                url
                            )));
                        }

                        let wait = rate_limiter.record_429();
                        warn!(
                            "[TileFetcher] 429 for {} after {:?}, retry {} with {:?} backoff",
                            url,
                            req_start.elapsed(),
                            retries,
                            wait
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    rate_limiter.record_success();

                    if !status.is_success() {
                        return Err(TrackError::TileFetch(format!("{}: HTTP {}", url, status)));
                    }

                    let bytes = resp.bytes().await.map_err(|e| {
                        TrackError::TileFetch(format!("{}: body download error: {}", url, e))
                    })?;

                    debug!(
                        "[TileFetcher] {} {:.1}KB in {:?}",
                        url,
                        bytes.len() as f64 / 1024.0,
                        req_start.elapsed()
                    );
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return Err(TrackError::TileFetch(format!(
                            "{}: request error: {}",
                            url, e
                        )));
                    }

                    let wait = Duration::from_millis(200 * (1 << retries));
                    warn!(
                        "[TileFetcher] Error for {}: {}, retry {} after {:?}",
                        url, e, retries, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn runtime(&self) -> Result<&Runtime> {
        if let Some(rt) = self.runtime.get() {
            return Ok(rt);
        }
        let rt = Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| TrackError::TileFetch(format!("Failed to create tokio runtime: {}", e)))?;
        Ok(self.runtime.get_or_init(|| rt))
    }
}

impl TileFetcher for HttpTileFetcher {
    fn fetch(&self, key: &TileKey) -> Result<Vec<u8>> {
        match Handle::try_current() {
            // Already on a runtime: a nested block_on would panic
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::MultiThread => {
                    task::block_in_place(|| handle.block_on(self.fetch_one(key)))
                }
                _ => Err(TrackError::TileFetch(format!(
                    "{}: blocking fetch called on a current-thread runtime, use fetch_tiles",
                    key
                ))),
            },
            Err(_) => self.runtime()?.block_on(self.fetch_one(key)),
        }
    }
}

/// Download tiles into a cache ahead of going offline.
///
/// Returns how many tiles were fetched and stored. Tiles that fail to
/// download or store are logged and skipped.
pub fn prefetch_tiles_sync(
    cache: &dyn TileCache,
    url_template: &str,
    keys: Vec<TileKey>,
    ttl: Duration,
) -> usize {
    info!("[TileFetcher] prefetch_tiles_sync called for {} tiles", keys.len());

    let rt = match Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            warn!("[TileFetcher] Failed to create tokio runtime: {}", e);
            return 0;
        }
    };

    let fetcher = match HttpTileFetcher::new(url_template) {
        Ok(f) => f,
        Err(e) => {
            warn!("[TileFetcher] Failed to create fetcher: {}", e);
            return 0;
        }
    };

    let results = rt.block_on(fetcher.fetch_tiles(keys));

    let mut stored = 0;
    for result in results {
        match (result.data, result.error) {
            (Some(data), _) => match cache.put(result.key.clone(), data, ttl) {
                Ok(()) => stored += 1,
                Err(e) => warn!("[TileFetcher] Failed to store {}: {}", result.key, e),
            },
            (None, error) => debug!(
                "[TileFetcher] Skipping {}: {}",
                result.key,
                error.unwrap_or_default()
            ),
        }
    }

    info!("[TileFetcher] Prefetched {} tiles", stored);
    stored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile_cache::{get_or_fetch, MemoryTileCache, TileOrigin, BLANK_TILE, DEFAULT_TILE_TTL};
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Serve `connections` HTTP requests on a local port, answering each with
    /// the status and body chosen by `handler` for the request path.
    fn serve(connections: usize, handler: fn(&str) -> (u16, Vec<u8>)) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            for _ in 0..connections {
                let (mut stream, _) = match listener.accept() {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let mut buf = [0u8; 4096];
                let n = stream.read(&mut buf).unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (status, body) = handler(&path);
                let head = format!(
                    "HTTP/1.1 {} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
            }
        });

        format!("http://{}", addr)
    }

    fn tile_body(path: &str) -> (u16, Vec<u8>) {
        if path.starts_with("/1/") {
            (404, Vec::new())
        } else {
            (200, path.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn test_dispatch_rate_limiter() {
        let limiter = DispatchRateLimiter::new(Duration::from_millis(50));

        // First request should not wait
        let start = Instant::now();
        let num = limiter.wait_for_dispatch_slot().await;
        assert_eq!(num, 1);
        assert!(start.elapsed() < Duration::from_millis(10));

        // Second request should wait ~50ms
        let start2 = Instant::now();
        let num2 = limiter.wait_for_dispatch_slot().await;
        assert_eq!(num2, 2);
        let elapsed = start2.elapsed();
        assert!(elapsed >= Duration::from_millis(40), "Expected ~50ms wait, got {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(150), "Expected ~50ms wait, got {:?}", elapsed);
    }

    #[test]
    fn test_backoff_grows_and_resets() {
        let limiter = DispatchRateLimiter::new(Duration::from_millis(50));
        assert_eq!(limiter.record_429(), Duration::from_millis(1000));
        assert_eq!(limiter.record_429(), Duration::from_millis(2000));
        assert_eq!(limiter.record_429(), Duration::from_millis(4000));
        assert_eq!(limiter.record_429(), Duration::from_millis(4000));
        limiter.record_success();
        assert_eq!(limiter.record_429(), Duration::from_millis(1000));
    }

    #[test]
    fn test_tile_url() {
        let fetcher = HttpTileFetcher::new("https://tiles.example.org/{z}/{x}/{y}.png").unwrap();
        let key = TileKey::new("topo", 13, 4265, 2901);
        assert_eq!(
            fetcher.tile_url(&key),
            "https://tiles.example.org/13/4265/2901.png"
        );
    }

    #[test]
    fn test_template_requires_placeholders() {
        let err = HttpTileFetcher::new("https://tiles.example.org/{z}/{x}.png").unwrap_err();
        assert!(matches!(err, TrackError::TileFetch(_)));
        assert!(!err.is_validation());
    }

    #[tokio::test]
    async fn test_fetch_tiles_reports_each_key() {
        let base = serve(3, tile_body);
        let fetcher = HttpTileFetcher::with_dispatch_interval(
            format!("{}/{{z}}/{{x}}/{{y}}.png", base),
            Duration::from_millis(1),
        )
        .unwrap();

        let keys = vec![
            TileKey::new("topo", 5, 16, 11),
            TileKey::new("topo", 1, 0, 0),
            TileKey::new("topo", 6, 33, 22),
        ];
        let mut results = fetcher.fetch_tiles(keys).await;
        results.sort_by_key(|r| r.key.zoom);

        assert_eq!(results.len(), 3);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap_or("").contains("404"));
        assert_eq!(results[1].data.as_deref(), Some(&b"/5/16/11.png"[..]));
        assert!(results[2].success);
    }

    #[tokio::test]
    async fn test_retries_after_429() {
        use std::sync::atomic::AtomicUsize;
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        fn flaky(_: &str) -> (u16, Vec<u8>) {
            if CALLS.fetch_add(1, Ordering::SeqCst) == 0 {
                (429, Vec::new())
            } else {
                (200, b"tile".to_vec())
            }
        }

        let base = serve(2, flaky);
        let fetcher =
            HttpTileFetcher::new(format!("{}/{{z}}/{{x}}/{{y}}.png", base)).unwrap();
        let results = fetcher.fetch_tiles(vec![TileKey::new("topo", 3, 1, 1)]).await;

        assert!(results[0].success, "{:?}", results[0].error);
        assert_eq!(results[0].data.as_deref(), Some(&b"tile"[..]));
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_blocking_fetch_through_cache() {
        let base = serve(1, tile_body);
        let fetcher = HttpTileFetcher::new(format!("{}/{{z}}/{{x}}/{{y}}.png", base)).unwrap();
        let cache = MemoryTileCache::new();
        let key = TileKey::new("topo", 9, 266, 180);

        let first = get_or_fetch(&cache, &fetcher, &key, DEFAULT_TILE_TTL);
        assert_eq!(first.origin, TileOrigin::Fetched);
        assert_eq!(first.data, b"/9/266/180.png".to_vec());

        // Served from the cache; the server only accepts one connection
        let second = get_or_fetch(&cache, &fetcher, &key, DEFAULT_TILE_TTL);
        assert_eq!(second.origin, TileOrigin::Cache);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_fetch_inside_multi_thread_runtime() {
        let base = serve(1, tile_body);
        let fetcher = HttpTileFetcher::new(format!("{}/{{z}}/{{x}}/{{y}}.png", base)).unwrap();
        let cache = MemoryTileCache::new();
        let key = TileKey::new("topo", 8, 133, 90);

        let response = get_or_fetch(&cache, &fetcher, &key, DEFAULT_TILE_TTL);
        assert_eq!(response.origin, TileOrigin::Fetched);
        assert_eq!(response.data, b"/8/133/90.png".to_vec());
    }

    #[tokio::test]
    async fn test_blocking_fetch_on_current_thread_runtime_falls_back() {
        let fetcher = HttpTileFetcher::new("http://127.0.0.1:9/{z}/{x}/{y}.png").unwrap();
        let cache = MemoryTileCache::new();
        let key = TileKey::new("topo", 8, 133, 90);

        let response = get_or_fetch(&cache, &fetcher, &key, DEFAULT_TILE_TTL);
        assert_eq!(response.origin, TileOrigin::Fallback);
        assert_eq!(response.data, BLANK_TILE);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_prefetch_stores_successes() {
        let base = serve(3, tile_body);
        let cache = MemoryTileCache::new();
        let keys = vec![
            TileKey::new("topo", 4, 8, 5),
            TileKey::new("topo", 1, 1, 0),
            TileKey::new("topo", 4, 8, 6),
        ];

        let stored = prefetch_tiles_sync(
            &cache,
            &format!("{}/{{z}}/{{x}}/{{y}}.png", base),
            keys,
            DEFAULT_TILE_TTL,
        );

        assert_eq!(stored, 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&TileKey::new("topo", 1, 1, 0)).is_none());
    }

    #[test]
    fn test_prefetch_rejects_bad_template() {
        let cache = MemoryTileCache::new();
        let stored = prefetch_tiles_sync(
            &cache,
            "https://tiles.example.org/{z}.png",
            vec![TileKey::new("topo", 1, 0, 0)],
            DEFAULT_TILE_TTL,
        );
        assert_eq!(stored, 0);
    }
}
