//! Bounded cache for derived noise samples.
//!
//! Terrain synthesis queries the same columns repeatedly (height synthesis,
//! biome classification and edge blending all walk overlapping footprints),
//! so derived noise values are memoised. The cache is insertion-order FIFO
//! with bulk eviction: when full, the oldest fifth of the entries is dropped
//! in one pass rather than evicting per insert.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

/// Default entry bound. Roughly four chunk footprints of fbm samples.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Which derived-noise operation produced a cached value.
///
/// Part of the cache key so variants sampled at the same column never
/// collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoiseVariant {
    Fbm,
    Ridged,
    Warped,
}

/// Cache key for a derived 2D noise sample.
///
/// Coordinates are quantised to 1/100 of a block before hashing. Two samples
/// closer than that share a value; the hit-rate gain is worth the loss in
/// accuracy for terrain-scale frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoiseKey {
    variant: NoiseVariant,
    xq: i64,
    zq: i64,
    freq: u64,
    octaves: u32,
    persistence: u64,
    lacunarity: u64,
}

impl NoiseKey {
    /// Build a key from sample coordinates and the full parameter set.
    ///
    /// `f64` parameters are keyed by their bit pattern, which is exact and
    /// avoids imposing any rounding on the configuration space.
    #[must_use]
    pub fn new(
        variant: NoiseVariant,
        x: f64,
        z: f64,
        freq: f64,
        octaves: u32,
        persistence: f64,
        lacunarity: f64,
    ) -> Self {
        Self {
            variant,
            xq: quantise(x),
            zq: quantise(z),
            freq: freq.to_bits(),
            octaves,
            persistence: persistence.to_bits(),
            lacunarity: lacunarity.to_bits(),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn quantise(v: f64) -> i64 {
    (v * 100.0).round() as i64
}

/// Insertion-order bounded map from noise key to sample value.
pub struct NoiseCache {
    map: FxHashMap<NoiseKey, f64>,
    order: VecDeque<NoiseKey>,
    capacity: usize,
}

impl NoiseCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::default(),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub fn get(&self, key: &NoiseKey) -> Option<f64> {
        self.map.get(key).copied()
    }

    /// Insert a sample, evicting the oldest 20% of entries when full.
    pub fn insert(&mut self, key: NoiseKey, value: f64) {
        if self.map.len() >= self.capacity {
            let drop_count = (self.capacity / 5).max(1);
            for _ in 0..drop_count {
                if let Some(old) = self.order.pop_front() {
                    self.map.remove(&old);
                } else {
                    break;
                }
            }
        }
        if self.map.insert(key, value).is_none() {
            self.order.push_back(key);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for NoiseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(x: f64, z: f64) -> NoiseKey {
        NoiseKey::new(NoiseVariant::Fbm, x, z, 0.01, 4, 0.5, 2.0)
    }

    #[test]
    fn quantisation_merges_nearby_samples() {
        // 1/100 resolution: 1.001 and 1.004 land on the same cell.
        assert_eq!(key(1.001, 0.0), key(1.004, 0.0));
        assert_ne!(key(1.001, 0.0), key(1.011, 0.0));
    }

    #[test]
    fn eviction_drops_oldest_fifth() {
        let mut cache = NoiseCache::new(100);
        for i in 0..100 {
            cache.insert(key(f64::from(i), 0.0), f64::from(i));
        }
        assert_eq!(cache.len(), 100);

        cache.insert(key(0.0, 1.0), 1.0);
        // 20 oldest evicted, one inserted.
        assert_eq!(cache.len(), 81);
        assert!(cache.get(&key(0.0, 0.0)).is_none());
        assert!(cache.get(&key(99.0, 0.0)).is_some());
    }

    #[test]
    fn variants_do_not_collide() {
        let a = NoiseKey::new(NoiseVariant::Fbm, 5.0, 5.0, 0.01, 4, 0.5, 2.0);
        let b = NoiseKey::new(NoiseVariant::Ridged, 5.0, 5.0, 0.01, 4, 0.5, 2.0);
        assert_ne!(a, b);
    }
}
