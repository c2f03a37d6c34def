//! Chunk content generation.
//!
//! Two generator strategies sit behind the same `generate_chunk_data`
//! surface: the biome-aware pipeline (classifier, geological height
//! synthesis, layered stratification, structures) used when a biome set is
//! configured, and the lean cave-and-stratify pipeline used without one.
//! Either way the output is a pure function of (seed, constants, cx, cz).

pub mod column;
pub mod height;
pub mod structures;

use serde::Deserialize;

use crate::biome::{BiomeMap, BiomeRegistry};
use crate::block::BlockCatalog;
use crate::chunk::Chunk;
use crate::noise::{FbmConfig, NoiseGenerator};

pub use structures::StructureRegistry;

/// Host-configurable elevation clamp (`TERRAIN_BOUNDS`).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TerrainBounds {
    pub min_elevation: i32,
    pub max_elevation: i32,
}

impl Default for TerrainBounds {
    fn default() -> Self {
        Self {
            min_elevation: 1,
            max_elevation: i32::MAX,
        }
    }
}

/// Host-configurable noise stack frequencies (`NOISE_CONFIG`).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NoiseTuning {
    pub continental_frequency: f64,
    pub regional_frequency: f64,
}

impl Default for NoiseTuning {
    fn default() -> Self {
        Self {
            continental_frequency: 0.003,
            regional_frequency: 0.01,
        }
    }
}

/// Host-configurable formation behaviour (`GEOLOGICAL_FORMATIONS`).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormationTuning {
    pub frequency: f64,
    pub plateau_threshold: f64,
}

impl Default for FormationTuning {
    fn default() -> Self {
        Self {
            frequency: 0.005,
            plateau_threshold: 0.35,
        }
    }
}

/// Resolved tuning shared by the height synthesiser.
#[derive(Debug, Clone, Copy)]
pub struct TerrainTuning {
    pub sea_level: i32,
    pub min_elevation: i32,
    pub max_elevation: i32,
    pub continental_frequency: f64,
    pub regional_frequency: f64,
    pub formation_frequency: f64,
    pub plateau_threshold: f64,
}

impl Default for TerrainTuning {
    fn default() -> Self {
        Self::resolve(64, 255, None, None, None)
    }
}

impl TerrainTuning {
    /// Merge the optional host tables over the defaults. The elevation
    /// ceiling is additionally clamped into the world's vertical range.
    #[must_use]
    pub fn resolve(
        sea_level: i32,
        max_y: i32,
        bounds: Option<TerrainBounds>,
        noise: Option<NoiseTuning>,
        formations: Option<FormationTuning>,
    ) -> Self {
        let bounds = bounds.unwrap_or_default();
        let noise = noise.unwrap_or_default();
        let formations = formations.unwrap_or_default();
        Self {
            sea_level,
            min_elevation: bounds.min_elevation.max(0),
            max_elevation: bounds.max_elevation.min(max_y),
            continental_frequency: noise.continental_frequency,
            regional_frequency: noise.regional_frequency,
            formation_frequency: formations.frequency,
            plateau_threshold: formations.plateau_threshold,
        }
    }
}

// Lean-pipeline height shape: rolling base plus masked ridged mountains.
const SIMPLE_BASE_CFG: FbmConfig = FbmConfig {
    frequency: 0.01,
    amplitude: 1.0,
    octaves: 4,
    persistence: 0.5,
    lacunarity: 2.0,
};
const SIMPLE_MOUNTAIN_CFG: FbmConfig = FbmConfig {
    frequency: 0.008,
    amplitude: 1.0,
    octaves: 3,
    persistence: 0.5,
    lacunarity: 2.0,
};

/// The worker's terrain generator: owns the seed, the noise stack, and the
/// biome machinery when a biome set is configured.
pub struct TerrainGenerator {
    seed: u64,
    noise: NoiseGenerator,
    chunk_size: usize,
    world_height: usize,
    tuning: TerrainTuning,
    biomes: Option<BiomeRegistry>,
    biome_map: BiomeMap,
    structures: StructureRegistry,
}

impl TerrainGenerator {
    #[must_use]
    pub fn new(
        seed: u64,
        chunk_size: usize,
        world_height: usize,
        biome_scale: f64,
        tuning: TerrainTuning,
        biomes: Option<BiomeRegistry>,
        structures: StructureRegistry,
    ) -> Self {
        Self {
            seed,
            noise: NoiseGenerator::new(seed),
            chunk_size,
            world_height,
            tuning,
            biomes,
            biome_map: BiomeMap::new(biome_scale, tuning.sea_level),
            structures,
        }
    }

    /// Whether the rich biome pipeline is active.
    #[must_use]
    pub fn has_biomes(&self) -> bool {
        self.biomes.as_ref().is_some_and(|reg| !reg.is_empty())
    }

    /// Generate the full block volume for a chunk.
    #[must_use]
    pub fn generate_chunk_data(&mut self, cx: i32, cz: i32, catalog: &BlockCatalog) -> Chunk {
        if self.has_biomes() {
            self.generate_biome_chunk(cx, cz, catalog)
        } else {
            self.generate_simple_chunk(cx, cz, catalog)
        }
    }

    fn generate_biome_chunk(&mut self, cx: i32, cz: i32, catalog: &BlockCatalog) -> Chunk {
        let mut chunk = Chunk::new(cx, cz, self.chunk_size, self.world_height);
        let registry = self
            .biomes
            .as_ref()
            .expect("generate_biome_chunk requires a biome set");

        #[allow(clippy::cast_possible_wrap)]
        let size = self.chunk_size as i32;
        self.biome_map
            .prepare_chunk(cx, cz, size, &mut self.noise, registry);

        for lx in 0..self.chunk_size {
            for lz in 0..self.chunk_size {
                #[allow(clippy::cast_possible_wrap)]
                let wx = cx * size + lx as i32;
                #[allow(clippy::cast_possible_wrap)]
                let wz = cz * size + lz as i32;

                let label = self.biome_map.label_at(wx, wz, &mut self.noise, registry);
                let surface = height::column_height(
                    &mut self.noise,
                    &mut self.biome_map,
                    registry,
                    &self.tuning,
                    label,
                    wx,
                    wz,
                );

                let Some(biome) = registry.get(label) else {
                    continue;
                };

                // Border columns may swap in the edge profile's layer list.
                let edge = self.biome_map.edge_at(wx, wz, &mut self.noise, registry);
                let layers = match (&biome.edges, edge.is_edge) {
                    (Some(profile), true) => {
                        profile.layers.as_deref().unwrap_or(&biome.layers)
                    }
                    _ => &biome.layers,
                };

                column::fill_biome_column(
                    &mut chunk,
                    catalog,
                    &column::ColumnFill {
                        biome,
                        layers,
                        structures: &self.structures,
                        seed: self.seed,
                        local: (lx, lz),
                        world: (wx, wz),
                        surface,
                    },
                );
            }
        }
        chunk
    }

    fn generate_simple_chunk(&mut self, cx: i32, cz: i32, catalog: &BlockCatalog) -> Chunk {
        let mut chunk = Chunk::new(cx, cz, self.chunk_size, self.world_height);
        let palette = column::SimplePalette::resolve(catalog);

        #[allow(clippy::cast_possible_wrap)]
        let size = self.chunk_size as i32;
        for lx in 0..self.chunk_size {
            for lz in 0..self.chunk_size {
                #[allow(clippy::cast_possible_wrap)]
                let wx = cx * size + lx as i32;
                #[allow(clippy::cast_possible_wrap)]
                let wz = cz * size + lz as i32;

                let surface = self.simple_height(wx, wz);
                column::fill_simple_column(
                    &mut chunk,
                    &palette,
                    &self.noise,
                    self.seed,
                    (lx, lz),
                    (wx, wz),
                    surface,
                    self.tuning.sea_level,
                );
            }
        }
        chunk
    }

    /// Lean height: rolling base terrain, ridged mountains faded in by a
    /// low-frequency mask, and fine surface detail.
    fn simple_height(&mut self, wx: i32, wz: i32) -> i32 {
        let x = f64::from(wx);
        let z = f64::from(wz);
        let sea = f64::from(self.tuning.sea_level);

        let base = self.noise.fbm(x, z, &SIMPLE_BASE_CFG) * 20.0;
        let mountain_mask = (self.noise.noise2(x * 0.002, z * 0.002) + 1.0) / 2.0;
        let mountains = self.noise.ridged(x, z, &SIMPLE_MOUNTAIN_CFG) * 14.0 * mountain_mask;
        let detail = self.noise.noise2(x * 0.1, z * 0.1) * 2.0;

        let h = sea - 4.0 + base + mountains + detail;
        #[allow(clippy::cast_possible_truncation)]
        let floored = h.floor() as i32;
        floored.clamp(self.tuning.min_elevation, self.tuning.max_elevation)
    }

    /// Derived-noise cache occupancy, exposed for diagnostics.
    #[must_use]
    pub fn cached_noise_samples(&self) -> usize {
        self.noise.cached_samples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::{Biome, BiomeAdjacency};
    use crate::block::BlockProps;
    use std::collections::HashMap;

    fn catalog() -> BlockCatalog {
        let mut types = HashMap::new();
        for (i, name) in ["air", "stone", "dirt", "grass", "water", "sand"].iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            types.insert((*name).to_string(), i as u16);
        }
        BlockCatalog::new(&types, &HashMap::<String, BlockProps>::new())
    }

    fn tuning(max_y: i32) -> TerrainTuning {
        TerrainTuning::resolve(64, max_y, None, None, None)
    }

    #[test]
    fn simple_generation_is_deterministic() {
        let cat = catalog();
        let mut a = TerrainGenerator::new(42, 16, 128, 1.0, tuning(127), None, StructureRegistry::builtin());
        let mut b = TerrainGenerator::new(42, 16, 128, 1.0, tuning(127), None, StructureRegistry::builtin());

        let ca = a.generate_chunk_data(0, 0, &cat);
        let cb = b.generate_chunk_data(0, 0, &cat);
        assert_eq!(ca.blocks(), cb.blocks());

        let ca2 = a.generate_chunk_data(3, -2, &cat);
        let cb2 = b.generate_chunk_data(3, -2, &cat);
        assert_eq!(ca2.blocks(), cb2.blocks());
    }

    #[test]
    fn simple_chunk_has_terrain_and_tops() {
        let cat = catalog();
        let mut generator =
            TerrainGenerator::new(7, 16, 128, 1.0, tuning(127), None, StructureRegistry::builtin());
        let chunk = generator.generate_chunk_data(0, 0, &cat);

        let mut columns_with_ground = 0;
        for x in 0..16 {
            for z in 0..16 {
                if chunk.top_y(x, z) > 0 {
                    columns_with_ground += 1;
                }
            }
        }
        assert_eq!(columns_with_ground, 256);
    }

    #[test]
    fn biome_generation_is_deterministic() {
        let cat = catalog();
        let biomes = vec![
            Biome::default(),
            Biome {
                name: "mountains".to_string(),
                base_height: 92.0,
                height_variation: 22.0,
                ..Biome::default()
            },
        ];
        let make = || {
            TerrainGenerator::new(
                11,
                16,
                128,
                1.0,
                tuning(127),
                Some(BiomeRegistry::new(biomes.clone(), BiomeAdjacency::default())),
                StructureRegistry::builtin(),
            )
        };
        let mut a = make();
        let mut b = make();
        assert_eq!(
            a.generate_chunk_data(1, 1, &cat).blocks(),
            b.generate_chunk_data(1, 1, &cat).blocks()
        );
    }

    #[test]
    fn strategy_follows_biome_presence() {
        let with = TerrainGenerator::new(
            1,
            8,
            64,
            1.0,
            tuning(63),
            Some(BiomeRegistry::new(vec![Biome::default()], BiomeAdjacency::default())),
            StructureRegistry::builtin(),
        );
        let without =
            TerrainGenerator::new(1, 8, 64, 1.0, tuning(63), None, StructureRegistry::builtin());
        assert!(with.has_biomes());
        assert!(!without.has_biomes());
    }
}
