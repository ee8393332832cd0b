//! Tile cache with asynchronous fetch and graceful degradation.
//!
//! Owns the active [`SurveyParams`] and a byte-budgeted store of decoded
//! tiles keyed by `(generation, level, pixel)`. Lookups from the render
//! thread are synchronous and never block on I/O: a miss schedules a
//! background fetch+decode and immediately returns the best available
//! stand-in (an upsampled crop of a resident ancestor, or a crop of the
//! all-sky mosaic), or `None` when nothing usable is resident yet.
//!
//! # Concurrency
//!
//! The tile store is a `moka` sync cache (lock-free reads, byte-weighted
//! LRU eviction); pending/failed bookkeeping lives in a `DashMap`. Fetch
//! completions insert from Tokio tasks while the render thread reads;
//! both paths are safe to run concurrently. Resident tiles are handed
//! out as `Arc` clones, so eviction can never invalidate a tile a frame
//! is still drawing.
//!
//! # Configuration changes
//!
//! [`TileCache::set_params`] bumps a generation counter and invalidates
//! everything. In-flight fetches carry the generation they were issued
//! under; a completion whose generation is stale is dropped inertly.

mod survey;
mod tile;

pub use survey::{SurveyParams, ALLSKY_LEVEL, ALLSKY_TILES_PER_ROW};
pub use tile::{Tile, TileHandle, TileKey};

use crate::fetch::{FetchError, TileFetcher};
use crate::healpix::PixelId;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Default decoded-byte budget for resident tiles (256 MiB).
pub const DEFAULT_CAPACITY_BYTES: u64 = 256 * 1024 * 1024;

/// Synchronous tile lookup surface consumed by the renderer.
///
/// Split from [`TileCache`] so renderer tests can substitute a scripted
/// source and verify the ownership contract of [`TileHandle`].
pub trait TileSource {
    /// Snapshot of the active survey configuration.
    fn params(&self) -> SurveyParams;

    /// Best available tile for `(level, pixel)`, or `None`.
    ///
    /// Never blocks; may trigger background work as a side effect.
    fn tile(&self, allsky: bool, level: u8, pixel: PixelId) -> Option<TileHandle>;
}

/// Point-in-time cache counters, for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fallbacks: u64,
    pub fetch_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    Pending,
    Failed,
}

struct CacheInner {
    params: RwLock<SurveyParams>,
    generation: AtomicU64,
    tiles: moka::sync::Cache<TileKey, Arc<Tile>>,
    status: DashMap<TileKey, FetchState>,
    fetcher: Arc<dyn TileFetcher>,
    runtime: tokio::runtime::Handle,
    hits: AtomicU64,
    misses: AtomicU64,
    fallbacks: AtomicU64,
    fetch_failures: AtomicU64,
}

/// Shared handle to the tile cache. Clones are cheap and refer to the
/// same store.
#[derive(Clone)]
pub struct TileCache {
    inner: Arc<CacheInner>,
}

impl TileCache {
    /// Creates a cache with the default byte budget.
    pub fn new(
        params: SurveyParams,
        fetcher: Arc<dyn TileFetcher>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self::with_capacity(params, fetcher, runtime, DEFAULT_CAPACITY_BYTES)
    }

    /// Creates a cache bounded by `capacity_bytes` of decoded tile data.
    pub fn with_capacity(
        params: SurveyParams,
        fetcher: Arc<dyn TileFetcher>,
        runtime: tokio::runtime::Handle,
        capacity_bytes: u64,
    ) -> Self {
        let tiles = moka::sync::Cache::builder()
            .weigher(|_key: &TileKey, tile: &Arc<Tile>| {
                tile.byte_size().min(u32::MAX as u64) as u32
            })
            .max_capacity(capacity_bytes)
            .build();

        Self {
            inner: Arc::new(CacheInner {
                params: RwLock::new(params),
                generation: AtomicU64::new(0),
                tiles,
                status: DashMap::new(),
                fetcher,
                runtime,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                fallbacks: AtomicU64::new(0),
                fetch_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Atomically replaces the survey configuration.
    ///
    /// Resident tiles and pending/failed bookkeeping of the previous
    /// survey are invalidated; fetches already in flight complete against
    /// the old generation and are dropped on arrival.
    pub fn set_params(&self, params: SurveyParams) {
        {
            let mut guard = self.inner.params.write();
            *guard = params;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.tiles.invalidate_all();
        self.inner.tiles.run_pending_tasks();
        self.inner.status.clear();
        debug!(generation, "survey configuration replaced");
    }

    /// Snapshot of the current configuration.
    pub fn params(&self) -> SurveyParams {
        self.inner.params.read().clone()
    }

    /// Current configuration generation (bumped by [`set_params`]).
    ///
    /// [`set_params`]: TileCache::set_params
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Number of resident tiles.
    pub fn entry_count(&self) -> u64 {
        self.inner.tiles.run_pending_tasks();
        self.inner.tiles.entry_count()
    }

    /// Decoded bytes currently resident.
    pub fn resident_bytes(&self) -> u64 {
        self.inner.tiles.run_pending_tasks();
        self.inner.tiles.weighted_size()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            fallbacks: self.inner.fallbacks.load(Ordering::Relaxed),
            fetch_failures: self.inner.fetch_failures.load(Ordering::Relaxed),
        }
    }

    /// Best available tile; see [`TileSource::tile`].
    pub fn tile(&self, allsky: bool, level: u8, pixel: PixelId) -> Option<TileHandle> {
        let params = self.params();
        if !params.is_configured() {
            return None;
        }
        let generation = self.generation();

        if allsky && params.show_allsky {
            return self.allsky_tile(generation, &params, pixel);
        }

        let key = TileKey::Survey {
            generation,
            level,
            pixel,
        };
        if let Some(tile) = self.inner.tiles.get(&key) {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            return Some(TileHandle::Cached(tile));
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        self.request(key, params.tile_url(level, pixel));
        self.ancestor_fallback(generation, &params, level, pixel)
    }

    /// All-sky path: crop the requested pixel's cell out of the resident
    /// order-3 mosaic, fetching the mosaic on first use.
    fn allsky_tile(
        &self,
        generation: u64,
        params: &SurveyParams,
        pixel: PixelId,
    ) -> Option<TileHandle> {
        let key = TileKey::Allsky { generation };
        match self.inner.tiles.get(&key) {
            Some(mosaic) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                let edge = (mosaic.width() / ALLSKY_TILES_PER_ROW).max(1);
                let col = pixel.0 as u32 % ALLSKY_TILES_PER_ROW;
                let row = pixel.0 as u32 / ALLSKY_TILES_PER_ROW;
                Some(TileHandle::Synthesized(mosaic.crop_square(col, row, edge)))
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                self.request(key, params.allsky_url());
                None
            }
        }
    }

    /// Walks up the hierarchy looking for a resident ancestor and returns
    /// the matching quadrant upsampled to tile size.
    fn ancestor_fallback(
        &self,
        generation: u64,
        params: &SurveyParams,
        level: u8,
        pixel: PixelId,
    ) -> Option<TileHandle> {
        let mut ancestor = pixel;
        let mut ancestor_level = level;
        // Quadrant descent path from the ancestor back down to `pixel`,
        // innermost step first.
        let mut path = Vec::new();

        while ancestor_level > 1 {
            path.push(ancestor.quadrant());
            ancestor = ancestor.parent();
            ancestor_level -= 1;

            let key = TileKey::Survey {
                generation,
                level: ancestor_level,
                pixel: ancestor,
            };
            if let Some(tile) = self.inner.tiles.get(&key) {
                self.inner.fallbacks.fetch_add(1, Ordering::Relaxed);
                let (mut u0, mut v0, mut size) = (0.0, 0.0, 1.0);
                for quadrant in path.iter().rev() {
                    size /= 2.0;
                    // u follows the grid's y axis, v its x axis; see the
                    // texture convention in `cache::tile`.
                    u0 += ((quadrant >> 1) & 1) as f64 * size;
                    v0 += (quadrant & 1) as f64 * size;
                }
                trace!(
                    pixel = %pixel,
                    ancestor = %ancestor,
                    levels_up = level - ancestor_level,
                    "serving upsampled ancestor crop"
                );
                return Some(TileHandle::Synthesized(tile.crop_upsampled(
                    u0,
                    v0,
                    size,
                    params.tile_width,
                )));
            }
        }
        None
    }

    /// Schedules a background fetch+decode for `key` unless one is already
    /// pending or has failed for this generation.
    fn request(&self, key: TileKey, url: String) {
        use dashmap::mapref::entry::Entry;
        match self.inner.status.entry(key) {
            Entry::Occupied(_) => return,
            Entry::Vacant(entry) => {
                entry.insert(FetchState::Pending);
            }
        }

        debug!(%url, "fetching tile");
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let fetcher = Arc::clone(&inner.fetcher);
            let fetch_url = url.clone();
            let result = tokio::task::spawn_blocking(move || -> Result<Tile, FetchError> {
                let bytes = fetcher.fetch(&fetch_url)?;
                Tile::from_bytes(&bytes)
                    .map_err(|e| FetchError::Network(format!("undecodable payload: {e}")))
            })
            .await;

            if inner.generation.load(Ordering::SeqCst) != key.generation() {
                trace!(%url, "dropping completion for superseded survey");
                return;
            }

            match result {
                Ok(Ok(tile)) => {
                    inner.tiles.insert(key, Arc::new(tile));
                    inner.tiles.run_pending_tasks();
                    inner.status.remove(&key);
                }
                Ok(Err(error)) => {
                    warn!(%url, %error, "tile fetch failed");
                    inner.fetch_failures.fetch_add(1, Ordering::Relaxed);
                    inner.status.insert(key, FetchState::Failed);
                }
                Err(join_error) => {
                    warn!(%url, %join_error, "tile fetch task panicked");
                    inner.fetch_failures.fetch_add(1, Ordering::Relaxed);
                    inner.status.insert(key, FetchState::Failed);
                }
            }
        });
    }
}

impl TileSource for TileCache {
    fn params(&self) -> SurveyParams {
        TileCache::params(self)
    }

    fn tile(&self, allsky: bool, level: u8, pixel: PixelId) -> Option<TileHandle> {
        TileCache::tile(self, allsky, level, pixel)
    }
}
