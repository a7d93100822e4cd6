//! Prefetch map tiles into the SQLite cache for offline use.
//!
//! Run with: cargo run --example tile_prefetch --features "http persistence" -- <url-template> [db-path]
//!
//! The URL template uses {z}/{x}/{y} placeholders, e.g.
//! https://tile.openstreetmap.org/{z}/{x}/{y}.png

use std::time::Instant;

use track_coverage::{
    get_or_fetch, prefetch_tiles_sync, HttpTileFetcher, SqliteTileCache, TileCache, TileKey, DEFAULT_TILE_TTL,
};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let Some(template) = args.get(1) else {
        eprintln!("Usage: tile_prefetch <url-template> [db-path]");
        return;
    };
    let db_path = args.get(2).map(String::as_str).unwrap_or("tiles.db");

    let cache = match SqliteTileCache::open(db_path) {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("Failed to open cache: {}", e);
            return;
        }
    };

    println!("Tile Prefetch Example\n");
    println!("Cache: {} ({} tiles stored)", db_path, cache.len());

    // A 4x4 block of zoom 14 tiles
    let keys: Vec<TileKey> = (0..16)
        .map(|i| TileKey::new("osm", 14, 8529 + i % 4, 5803 + i / 4))
        .collect();

    let start = Instant::now();
    let stored = prefetch_tiles_sync(&cache, template, keys.clone(), DEFAULT_TILE_TTL);
    println!(
        "Prefetched {}/{} tiles in {:.2}s",
        stored,
        keys.len(),
        start.elapsed().as_secs_f64()
    );

    // Reads now come from the cache
    let fetcher = match HttpTileFetcher::new(template.as_str()) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            eprintln!("Failed to create fetcher: {}", e);
            return;
        }
    };
    let response = get_or_fetch(&cache, &fetcher, &keys[0], DEFAULT_TILE_TTL);
    println!("{} -> {:?}, {} bytes", keys[0], response.origin, response.data.len());

    match cache.prune() {
        Ok(removed) => println!("Pruned {} expired tiles", removed),
        Err(e) => eprintln!("Prune failed: {}", e),
    }
}
