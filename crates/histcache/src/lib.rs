//! # histcache
//!
//! LRU cache of decoded histograms, one per opened container.
//!
//! ## Architecture
//! - **HashMap**: AHash for fast lookups (O(1))
//! - **LRU List**: slab-backed recency list for eviction (O(1))
//! - **Integration**: wraps a `histstore::HistFile`; misses decode the
//!   histogram and compute its statistics once

#![warn(missing_docs)]

mod cache;
mod lru;
mod stats;

pub use cache::{CachedHistogram, HistCache};
pub use lru::LruCache;
pub use stats::{CacheStats, StatsSnapshot};
