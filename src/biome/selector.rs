//! Per-column biome classification, label smoothing, edge detection and
//! transition insertion.
//!
//! Labels are computed in three pure layers, each cached per global column:
//! the raw multi-noise classification, a smoothed label (3x3 majority vote
//! over raw labels), and the final label (transitional biome substitution
//! along incompatible borders, decided over smoothed labels). Every layer is
//! a pure function of (seed, x, z), so a column's label never depends on
//! which chunk asked for it first.

use rustc_hash::FxHashMap;

use super::{Biome, BiomeIndex, BiomeRegistry, TransitionPolicy};
use crate::noise::{FbmConfig, NoiseGenerator};

/// Warp offset amplitude in world units.
const WARP_AMPLITUDE: f64 = 400.0;
/// Base frequency of the warp field, divided by the configured biome scale.
const WARP_FREQ: f64 = 0.0008;

// The three stacked biome noises at increasing frequency, the detail noise
// and the climate fields. All are divided by the biome scale so one knob
// resizes the whole layout.
const BIOME_FREQ_1: f64 = 0.002;
const BIOME_FREQ_2: f64 = 0.004;
const BIOME_FREQ_3: f64 = 0.008;
const DETAIL_FREQ: f64 = 0.02;
const ELEVATION_FREQ: f64 = 0.0012;
const TEMPERATURE_FREQ: f64 = 0.0006;
const MOISTURE_FREQ: f64 = 0.0009;

/// Cells of slack pre-classified around the chunk footprint so the
/// smoothing votes at the chunk rim find warm caches.
pub const LABEL_BUFFER: i32 = 8;

/// Soft bound on the label caches; everything is cleared wholesale when the
/// raw map outgrows it (cheapest eviction that cannot split a chunk's
/// working set).
const LABEL_CACHE_CAP: usize = 10_000;

const EDGE_DIRS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Climate and noise sample bundle for one (warped) column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnEnv {
    /// Expanded Fahrenheit-like scale, 10..=130.
    pub temperature: f64,
    /// 0..=1.
    pub moisture: f64,
    /// Estimated terrain elevation in world y.
    pub elevation: f64,
    /// Raw elevation noise in [-1, 1].
    pub elevation_noise: f64,
    /// First biome noise; its third selects the pick method.
    pub first: f64,
    /// Sum of the three biome noises and the detail noise.
    pub combined: f64,
    pub detail: f64,
}

/// Cached border information for a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeInfo {
    pub is_edge: bool,
    /// The first differing biome found by the ring scan.
    pub nearby: Option<BiomeIndex>,
    /// Scan distance of that biome over the scan radius, in (0, 1];
    /// 1.0 when no edge was found.
    pub edge_distance: f64,
}

impl EdgeInfo {
    const INTERIOR: Self = Self {
        is_edge: false,
        nearby: None,
        edge_distance: 1.0,
    };
}

/// Per-worker biome label and edge caches plus the classifier itself.
pub struct BiomeMap {
    raw: FxHashMap<(i32, i32), BiomeIndex>,
    smoothed: FxHashMap<(i32, i32), BiomeIndex>,
    finals: FxHashMap<(i32, i32), BiomeIndex>,
    edges: FxHashMap<(i32, i32), EdgeInfo>,
    biome_scale: f64,
    sea_level: i32,
}

impl BiomeMap {
    #[must_use]
    pub fn new(biome_scale: f64, sea_level: i32) -> Self {
        Self {
            raw: FxHashMap::default(),
            smoothed: FxHashMap::default(),
            finals: FxHashMap::default(),
            edges: FxHashMap::default(),
            biome_scale: biome_scale.max(0.05),
            sea_level,
        }
    }

    /// Warm the caches for a chunk footprint plus [`LABEL_BUFFER`] cells of
    /// slack, and apply the cache bound. Purely an optimisation: lookups
    /// outside the warmed region compute on demand to the same values.
    pub fn prepare_chunk(
        &mut self,
        cx: i32,
        cz: i32,
        chunk_size: i32,
        noise: &mut NoiseGenerator,
        registry: &BiomeRegistry,
    ) {
        if registry.is_empty() {
            return;
        }
        if self.raw.len() > LABEL_CACHE_CAP {
            self.raw.clear();
            self.smoothed.clear();
            self.finals.clear();
            self.edges.clear();
        }

        let x0 = cx * chunk_size - LABEL_BUFFER;
        let x1 = (cx + 1) * chunk_size + LABEL_BUFFER;
        let z0 = cz * chunk_size - LABEL_BUFFER;
        let z1 = (cz + 1) * chunk_size + LABEL_BUFFER;
        for wx in x0..x1 {
            for wz in z0..z1 {
                self.raw_label_at(wx, wz, noise, registry);
            }
        }

        for wx in (cx * chunk_size)..((cx + 1) * chunk_size) {
            for wz in (cz * chunk_size)..((cz + 1) * chunk_size) {
                self.label_at(wx, wz, noise, registry);
            }
        }
    }

    /// Final biome label for a global column: smoothed, with transitional
    /// substitution along incompatible borders.
    pub fn label_at(
        &mut self,
        wx: i32,
        wz: i32,
        noise: &mut NoiseGenerator,
        registry: &BiomeRegistry,
    ) -> BiomeIndex {
        if let Some(&label) = self.finals.get(&(wx, wz)) {
            return label;
        }

        let smoothed = self.smoothed_at(wx, wz, noise, registry);
        let mut label = smoothed;
        let info = self.scan_edge(wx, wz, noise, registry);
        self.edges.entry((wx, wz)).or_insert(info);
        if let Some(nearby) = info.nearby
            && registry.policy(smoothed, nearby) == TransitionPolicy::Incompatible
            && let Some(t) = self.transitional_for(smoothed, nearby, wx, wz, noise, registry)
            && registry.policy(t, smoothed) != TransitionPolicy::Incompatible
            && registry.policy(t, nearby) != TransitionPolicy::Incompatible
        {
            label = t;
        }

        self.finals.insert((wx, wz), label);
        label
    }

    /// Edge information for a global column, scanning on miss.
    pub fn edge_at(
        &mut self,
        wx: i32,
        wz: i32,
        noise: &mut NoiseGenerator,
        registry: &BiomeRegistry,
    ) -> EdgeInfo {
        if let Some(&info) = self.edges.get(&(wx, wz)) {
            return info;
        }
        let info = self.scan_edge(wx, wz, noise, registry);
        self.edges.insert((wx, wz), info);
        info
    }

    /// Raw classification for a column, before smoothing. Cheap compared to
    /// [`Self::label_at`]; coarse samplers (cross-biome height blending)
    /// use it so a single lookup never cascades into a smoothing
    /// neighbourhood.
    pub fn raw_label_at(
        &mut self,
        wx: i32,
        wz: i32,
        noise: &mut NoiseGenerator,
        registry: &BiomeRegistry,
    ) -> BiomeIndex {
        if let Some(&label) = self.raw.get(&(wx, wz)) {
            return label;
        }
        let label = self.classify(wx, wz, noise, registry);
        self.raw.insert((wx, wz), label);
        label
    }

    /// Smoothed label: a raw label out-voted 5-to-8 by a single differing
    /// raw label in its 3x3 neighbourhood takes the majority label. Voting
    /// always reads raw labels, so the result does not depend on evaluation
    /// order and a second pass changes nothing.
    fn smoothed_at(
        &mut self,
        wx: i32,
        wz: i32,
        noise: &mut NoiseGenerator,
        registry: &BiomeRegistry,
    ) -> BiomeIndex {
        if let Some(&label) = self.smoothed.get(&(wx, wz)) {
            return label;
        }

        let center = self.raw_label_at(wx, wz, noise, registry);
        let mut counts: FxHashMap<BiomeIndex, u32> = FxHashMap::default();
        for (dx, dz) in EDGE_DIRS {
            let neighbor = self.raw_label_at(wx + dx, wz + dz, noise, registry);
            *counts.entry(neighbor).or_insert(0) += 1;
        }

        let majority = counts
            .iter()
            .filter(|&(&label, _)| label != center)
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)));
        let label = match majority {
            Some((&label, &votes)) if votes >= 5 => label,
            _ => center,
        };

        self.smoothed.insert((wx, wz), label);
        label
    }

    fn warp(&self, x: f64, z: f64, noise: &mut NoiseGenerator) -> (f64, f64) {
        let wf = WARP_FREQ / self.biome_scale;
        let dx = noise.noise2(x * wf + 11.3, z * wf + 47.2) * WARP_AMPLITUDE;
        let dz = noise.noise2(x * wf - 71.7, z * wf + 23.9) * WARP_AMPLITUDE;
        (x + dx, z + dz)
    }

    fn env(&self, sx: f64, sz: f64, noise: &mut NoiseGenerator) -> ColumnEnv {
        let s = self.biome_scale;
        let n1 = noise.fbm(sx, sz, &FbmConfig::with(BIOME_FREQ_1 / s, 1));
        let n2 = noise.fbm(sx, sz, &FbmConfig::with(BIOME_FREQ_2 / s, 1));
        let n3 = noise.fbm(sx, sz, &FbmConfig::with(BIOME_FREQ_3 / s, 1));
        let detail = noise.fbm(sx, sz, &FbmConfig::with(DETAIL_FREQ, 2));
        let elevation_noise = noise.fbm(sx, sz, &FbmConfig::with(ELEVATION_FREQ / s, 2));
        let temp_noise = noise.fbm(sx, sz, &FbmConfig::with(TEMPERATURE_FREQ / s, 1));
        let moist_noise = noise.fbm(sx, sz, &FbmConfig::with(MOISTURE_FREQ / s, 1));

        // Expanded Fahrenheit-like range, biased downward with altitude.
        let temperature =
            (70.0 + temp_noise * 60.0 - elevation_noise.max(0.0) * 20.0).clamp(10.0, 130.0);
        let moisture = ((moist_noise + 1.0) / 2.0).clamp(0.0, 1.0);
        let elevation = f64::from(self.sea_level) + elevation_noise * 60.0;

        ColumnEnv {
            temperature,
            moisture,
            elevation,
            elevation_noise,
            first: n1,
            combined: n1 + n2 + n3 + detail,
            detail,
        }
    }

    fn classify(
        &self,
        wx: i32,
        wz: i32,
        noise: &mut NoiseGenerator,
        registry: &BiomeRegistry,
    ) -> BiomeIndex {
        let (sx, sz) = self.warp(f64::from(wx), f64::from(wz), noise);
        let env = self.env(sx, sz, noise);

        // Score every biome: rarity and size gate how much land a biome
        // claims, environmental fit pulls it toward its climate envelope.
        let mut scored: Vec<(BiomeIndex, f64, f64)> = Vec::with_capacity(registry.len());
        for (i, biome) in registry.all().iter().enumerate() {
            let temp_compat = (1.0 - (env.temperature - biome.temperature).abs() / 60.0).max(0.05);
            let moist_compat = (1.0 - (env.moisture - biome.moisture).abs() / 0.6).max(0.05);
            let env_fit = (temp_compat + moist_compat) / 2.0;
            let weight =
                (biome.rarity.max(0.0).cbrt() * 0.4 + 0.5) * biome.size * env_fit.powf(0.7);
            #[allow(clippy::cast_possible_truncation)]
            scored.push((i as BiomeIndex, weight, env_fit));
        }

        // Elevation compatibility filter, topped back up to three candidates
        // from the weight ranking so selection always has a real choice.
        let mut candidates: Vec<(BiomeIndex, f64, f64)> = scored
            .iter()
            .filter(|(i, weight, _)| {
                let biome = &registry.all()[usize::from(*i)];
                (env.elevation - biome.base_height).abs() < 4.0 * biome.height_variation
                    || *weight > 0.5
            })
            .copied()
            .collect();
        if candidates.len() < 3 {
            let mut ranked = scored.clone();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            for cand in ranked {
                if candidates.len() >= 3 {
                    break;
                }
                if !candidates.iter().any(|c| c.0 == cand.0) {
                    candidates.push(cand);
                }
            }
        }
        if candidates.is_empty() {
            return 0;
        }

        // A third of the first biome noise picks the selection method.
        if env.first < -1.0 / 3.0 {
            Self::pick_weighted(&candidates, env.detail)
        } else if env.first < 1.0 / 3.0 {
            Self::pick_top_by_weight(&candidates, env.detail, env.combined)
        } else {
            Self::pick_top_by_fit(&candidates, env.elevation_noise)
        }
    }

    /// Weighted pick proportional to candidate weight.
    fn pick_weighted(candidates: &[(BiomeIndex, f64, f64)], roll_noise: f64) -> BiomeIndex {
        let total: f64 = candidates.iter().map(|c| c.1).sum();
        if total <= 0.0 {
            return candidates[0].0;
        }
        let roll = ((roll_noise + 1.0) / 2.0).clamp(0.0, 0.999_999) * total;
        let mut acc = 0.0;
        for &(index, weight, _) in candidates {
            acc += weight;
            if roll < acc {
                return index;
            }
        }
        candidates[candidates.len() - 1].0
    }

    /// Index into the four heaviest candidates by |detail * combined|.
    fn pick_top_by_weight(
        candidates: &[(BiomeIndex, f64, f64)],
        detail: f64,
        combined: f64,
    ) -> BiomeIndex {
        let mut ranked = candidates.to_vec();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let top = ranked.len().min(4);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pick = ((detail * combined).abs() * 4.0) as usize % top;
        ranked[pick].0
    }

    /// Index into the three environmentally best-fitting candidates.
    fn pick_top_by_fit(candidates: &[(BiomeIndex, f64, f64)], elevation_noise: f64) -> BiomeIndex {
        let mut ranked = candidates.to_vec();
        ranked.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));
        let top = ranked.len().min(3);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pick = (((elevation_noise + 1.0) / 2.0) * 3.0) as usize % top;
        ranked[pick].0
    }

    #[allow(clippy::cast_possible_truncation)]
    fn edge_radius(biome: &Biome) -> i32 {
        biome
            .edges
            .as_ref()
            .map_or(8, |e| (50.0 * e.size).ceil() as i32)
            .clamp(1, 8)
    }

    /// Ring scan over smoothed labels in the 8 cardinal and diagonal
    /// directions; the first differing label marks the edge.
    fn scan_edge(
        &mut self,
        wx: i32,
        wz: i32,
        noise: &mut NoiseGenerator,
        registry: &BiomeRegistry,
    ) -> EdgeInfo {
        let center = self.smoothed_at(wx, wz, noise, registry);
        let Some(biome) = registry.get(center) else {
            return EdgeInfo::INTERIOR;
        };
        let radius = Self::edge_radius(biome);

        for r in 1..=radius {
            for (dx, dz) in EDGE_DIRS {
                let label = self.smoothed_at(wx + dx * r, wz + dz * r, noise, registry);
                if label != center {
                    return EdgeInfo {
                        is_edge: true,
                        nearby: Some(label),
                        edge_distance: f64::from(r) / f64::from(radius),
                    };
                }
            }
        }
        EdgeInfo::INTERIOR
    }

    /// Transitional biome for an incompatible pair, chosen by feature
    /// keyword with a noise-binned fallback.
    fn transitional_for(
        &self,
        a: BiomeIndex,
        b: BiomeIndex,
        wx: i32,
        wz: i32,
        noise: &mut NoiseGenerator,
        registry: &BiomeRegistry,
    ) -> Option<BiomeIndex> {
        const KEYWORDS: [(&str, &str); 4] = [
            ("mountain", "hills"),
            ("desert", "savanna"),
            ("ocean", "swamp"),
            ("snow", "tundra"),
        ];

        let names = [registry.get(a)?, registry.get(b)?];
        for (keyword, transitional) in KEYWORDS {
            if names.iter().any(|biome| biome.name_contains(keyword))
                && let Some(t) = registry.by_name(transitional)
            {
                return Some(t);
            }
        }

        const FALLBACK: [&str; 3] = ["plains", "meadow", "savanna"];
        let n = noise.noise2(f64::from(wx) * 0.005 + 31.7, f64::from(wz) * 0.005 - 17.3);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bin = (((n + 1.0) / 2.0) * 3.0) as usize % 3;
        (0..3).find_map(|offset| registry.by_name(FALLBACK[(bin + offset) % 3]))
    }

    /// Raw labels currently cached.
    #[must_use]
    pub fn cached_labels(&self) -> usize {
        self.raw.len()
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&mut self, wx: i32, wz: i32, label: BiomeIndex) {
        self.raw.insert((wx, wz), label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::BiomeAdjacency;

    fn registry() -> BiomeRegistry {
        let names = ["desert", "forest", "hills", "meadow", "mountains", "ocean", "plains"];
        let biomes = names
            .iter()
            .map(|n| Biome {
                name: (*n).to_string(),
                ..Biome::default()
            })
            .collect();
        BiomeRegistry::new(biomes, BiomeAdjacency::default())
    }

    #[test]
    fn labels_are_deterministic() {
        let reg = registry();
        let mut a = BiomeMap::new(1.0, 64);
        let mut b = BiomeMap::new(1.0, 64);
        let mut noise_a = NoiseGenerator::new(1234);
        let mut noise_b = NoiseGenerator::new(1234);

        for wx in -20..20 {
            for wz in -20..20 {
                assert_eq!(
                    a.label_at(wx, wz, &mut noise_a, &reg),
                    b.label_at(wx, wz, &mut noise_b, &reg),
                );
            }
        }
    }

    #[test]
    fn labels_do_not_depend_on_query_order() {
        let reg = registry();

        // One map prepares a whole chunk first, the other asks point-blank.
        let mut warmed = BiomeMap::new(1.0, 64);
        let mut warmed_noise = NoiseGenerator::new(555);
        warmed.prepare_chunk(0, 0, 16, &mut warmed_noise, &reg);

        let mut cold = BiomeMap::new(1.0, 64);
        let mut cold_noise = NoiseGenerator::new(555);

        for (wx, wz) in [(0, 0), (7, 12), (15, 15), (3, 9)] {
            assert_eq!(
                warmed.label_at(wx, wz, &mut warmed_noise, &reg),
                cold.label_at(wx, wz, &mut cold_noise, &reg),
            );
        }
    }

    #[test]
    fn speckle_center_is_replaced() {
        let reg = registry();
        let mut map = BiomeMap::new(1.0, 64);
        let mut noise = NoiseGenerator::new(1);
        for wx in 0..3 {
            for wz in 0..3 {
                map.insert_raw(wx, wz, 1);
            }
        }
        map.insert_raw(1, 1, 5);

        assert_eq!(map.smoothed_at(1, 1, &mut noise, &reg), 1);
    }

    #[test]
    fn smoothing_keeps_settled_borders() {
        // A half-and-half split has no out-voted cells.
        let reg = registry();
        let mut map = BiomeMap::new(1.0, 64);
        let mut noise = NoiseGenerator::new(1);
        for wx in 0..8 {
            for wz in 0..8 {
                map.insert_raw(wx, wz, if wx < 4 { 1 } else { 3 });
            }
        }
        for wx in 1..7 {
            for wz in 1..7 {
                let expected = if wx < 4 { 1 } else { 3 };
                assert_eq!(map.smoothed_at(wx, wz, &mut noise, &reg), expected);
            }
        }
    }

    #[test]
    fn interior_column_has_no_edge() {
        let reg = registry();
        let mut map = BiomeMap::new(1.0, 64);
        let mut noise = NoiseGenerator::new(9);
        // Paint a large uniform patch so the scan cannot leave it.
        for wx in -12..12 {
            for wz in -12..12 {
                map.insert_raw(wx, wz, 2);
            }
        }
        let info = map.edge_at(0, 0, &mut noise, &reg);
        assert!(!info.is_edge);
        assert_eq!(info.edge_distance, 1.0);
    }

    #[test]
    fn border_column_reports_neighbour() {
        let reg = registry();
        let mut map = BiomeMap::new(1.0, 64);
        let mut noise = NoiseGenerator::new(9);
        for wx in -12..12 {
            for wz in -12..12 {
                map.insert_raw(wx, wz, if wx < 3 { 2 } else { 6 });
            }
        }
        let info = map.edge_at(0, 0, &mut noise, &reg);
        assert!(info.is_edge);
        assert_eq!(info.nearby, Some(6));
        assert!(info.edge_distance > 0.0 && info.edge_distance <= 1.0);
    }
}
