//! Placement cache for multi-month runs.
//!
//! Entropy fitting and luminance sampling dominate per-photo cost. When a
//! month range is longer than the photo list, photos are reused round-robin
//! and every reuse would recompute the same placement. This module keeps the
//! computed [`Placement`] per photo path for the lifetime of one run.
//!
//! # Design
//!
//! The cache is in-memory only. Keys are the photo path exactly as the batch
//! driver produced it; no content hashing happens, since a run never sees a
//! photo change underneath it.
//!
//! Workers share one cache through `&PlacementCache`. Lookups and inserts
//! each take the lock; a placement is computed outside the lock, so two
//! workers racing on the same photo may both compute it. The second insert
//! overwrites the first with an identical value.
//!
//! ## When to cache
//!
//! [`cache_enabled`] decides from the photo and month counts. With
//! `months = q * photos + r`:
//!
//! | Condition | Cache |
//! |---|---|
//! | `q > 1` (every photo used at least twice) | on |
//! | `q < 1` (fewer months than photos) | off |
//! | `r == 0` (each photo used exactly once) | off |
//! | otherwise | on iff `photos / r <= 6` |
//!
//! The last row skips the cache when only a small tail of photos repeats.

use crate::placement::Placement;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Whether a run over `num_photos` and `num_months` should cache placements.
pub fn cache_enabled(num_photos: usize, num_months: usize) -> bool {
    if num_photos == 0 {
        return false;
    }
    let q = num_months / num_photos;
    let r = num_months % num_photos;
    if q > 1 {
        return true;
    }
    if q < 1 || r == 0 {
        return false;
    }
    num_photos as f64 / r as f64 <= 6.0
}

/// Summary of cache effectiveness for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} computed ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} computed", self.misses)
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<PathBuf, Placement>,
    stats: CacheStats,
}

/// Thread-safe map from photo path to its placement.
#[derive(Debug, Default)]
pub struct PlacementCache {
    inner: Mutex<Inner>,
}

impl PlacementCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panicking worker leaves the map consistent; keep using it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a placement, counting the hit or miss.
    pub fn get(&self, photo: &Path) -> Option<Placement> {
        let mut inner = self.lock();
        let found = inner.entries.get(photo).copied();
        match found {
            Some(_) => inner.stats.hit(),
            None => inner.stats.miss(),
        }
        found
    }

    pub fn insert(&self, photo: &Path, placement: Placement) {
        self.lock().entries.insert(photo.to_path_buf(), placement);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}
