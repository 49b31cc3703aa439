//! HistCache: read-through LRU over a histogram container

use std::path::Path;
use std::sync::Arc;
use parking_lot::Mutex;
use histstore::{HistFile, HistStats, Histogram, Result};

use crate::lru::LruCache;
use crate::stats::CacheStats;

/// A decoded histogram with its summary statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CachedHistogram {
    /// Container key the histogram was read from
    pub key: String,
    /// Decoded bins
    pub histogram: Histogram,
    /// Statistics computed once at decode time
    pub stats: HistStats,
}

/// Histogram cache bound to one container
pub struct HistCache {
    /// Underlying container
    file: Arc<HistFile>,

    /// Decoded histograms by key
    cache: Mutex<LruCache<String, Arc<CachedHistogram>>>,

    /// Cache statistics
    stats: CacheStats,

    /// Cache capacity
    capacity: usize,
}

impl HistCache {
    /// Default number of cached histograms per container
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Wrap an open container. A zero capacity is raised to one.
    pub fn new(file: Arc<HistFile>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            file,
            cache: Mutex::new(LruCache::new(capacity)),
            stats: CacheStats::new(),
            capacity,
        }
    }

    /// Open a container and wrap it
    ///
    /// # Arguments
    /// * `path` - Container file path
    /// * `capacity` - Maximum number of decoded histograms kept
    pub fn open<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let file = HistFile::open(path)?;
        Ok(Self::new(Arc::new(file), capacity))
    }

    /// Fetch a histogram, decoding it on a miss
    ///
    /// # Arguments
    /// * `key` - Container key (`path;cycle` or bare path)
    ///
    /// # Returns
    /// * `Result<Arc<CachedHistogram>>` - Shared decoded entry
    pub fn get(&self, key: &str) -> Result<Arc<CachedHistogram>> {
        if let Some(entry) = self.cache.lock().get(key) {
            self.stats.record_hit();
            return Ok(Arc::clone(entry));
        }

        // Decode outside the lock
        self.stats.record_miss();
        let histogram = match self.file.read_histogram(key) {
            Ok(histogram) => histogram,
            Err(e) => {
                self.stats.record_failure();
                return Err(e);
            }
        };
        self.stats.record_decode(histogram.bins());
        let entry = Arc::new(CachedHistogram {
            key: key.to_string(),
            stats: HistStats::from_histogram(&histogram),
            histogram,
        });

        let evicted = self.cache.lock().put(key.to_string(), Arc::clone(&entry));
        if evicted.is_some() {
            self.stats.record_eviction();
        }

        Ok(entry)
    }

    /// True if `key` is currently cached
    pub fn contains(&self, key: &str) -> bool {
        self.cache.lock().contains(key)
    }

    /// The wrapped container
    pub fn file(&self) -> &HistFile {
        &self.file
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get current cache size
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all cached histograms and reset statistics
    pub fn clear(&self) {
        self.cache.lock().clear();
        self.stats.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use histstore::{ContainerWriter, Error};
    use tempfile::TempDir;

    fn container(dir: &TempDir, n: usize) -> std::path::PathBuf {
        let path = dir.path().join("cells.hgrid");
        let mut writer = ContainerWriter::new().compress(true);
        for i in 0..n {
            let hist = Histogram::uniform(format!("cell {}", i), 0.0, 2.0, vec![i as f64, 1.0])
                .unwrap();
            writer.add_histogram(&format!("h_ieta{}_iphi0", i), &hist).unwrap();
        }
        writer.finish(&path).unwrap();
        path
    }

    #[test]
    fn test_miss_then_hit() {
        let dir = TempDir::new().unwrap();
        let cache = HistCache::open(container(&dir, 3), 10).unwrap();

        let first = cache.get("h_ieta2_iphi0;1").unwrap();
        assert_eq!(first.histogram.counts, vec![2.0, 1.0]);
        assert_eq!(first.stats.entries, 3);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.stats().hits(), 0);

        let second = cache.get("h_ieta2_iphi0;1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().hit_ratio(), 0.5);
    }

    #[test]
    fn test_eviction() {
        let dir = TempDir::new().unwrap();
        let cache = HistCache::open(container(&dir, 3), 2).unwrap();

        cache.get("h_ieta0_iphi0;1").unwrap();
        cache.get("h_ieta1_iphi0;1").unwrap();
        cache.get("h_ieta2_iphi0;1").unwrap();

        assert_eq!(cache.cache_len(), 2);
        assert_eq!(cache.stats().evictions(), 1);
        assert!(!cache.contains("h_ieta0_iphi0;1"));
        assert!(cache.contains("h_ieta2_iphi0;1"));

        // evicted entry decodes again
        cache.get("h_ieta0_iphi0;1").unwrap();
        assert_eq!(cache.stats().misses(), 4);
    }

    #[test]
    fn test_missing_key_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = HistCache::open(container(&dir, 1), 4).unwrap();

        let result = cache.get("nope;1");
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(cache.cache_len(), 0);
        let snap = cache.stats().snapshot();
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.inserts(), 0);
    }

    #[test]
    fn test_zero_capacity_raised() {
        let dir = TempDir::new().unwrap();
        let cache = HistCache::open(container(&dir, 2), 0).unwrap();

        assert_eq!(cache.capacity(), 1);
        cache.get("h_ieta0_iphi0;1").unwrap();
        cache.get("h_ieta1_iphi0;1").unwrap();
        assert_eq!(cache.cache_len(), 1);
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let cache = HistCache::open(container(&dir, 2), 4).unwrap();

        cache.get("h_ieta0_iphi0;1").unwrap();
        cache.get("h_ieta0_iphi0;1").unwrap();
        cache.clear();

        assert_eq!(cache.cache_len(), 0);
        assert_eq!(cache.stats().hits(), 0);
        assert_eq!(cache.file().len(), 2);
    }
}
