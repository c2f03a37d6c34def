//! Vertical stratification of a column.
//!
//! The biome-aware filler walks the biome's declared layers top-down,
//! resolves each layer's thickness spec against the column rng, fills the
//! remainder with the biome's below-layers block, floods air with the liquid
//! fill, then rolls once against the summed structure CDF. The lean filler
//! used by the simple strategy stratifies by height band and carves caves
//! with a 3D density field.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::biome::{Biome, Layer};
use crate::block::{BlockCatalog, blocks};
use crate::chunk::Chunk;
use crate::noise::{FbmConfig, NoiseGenerator, column_seed};

use super::structures::{StructureRegistry, apply_blueprint};

/// Cave density field configuration for the lean filler.
const CAVE_CFG: FbmConfig = FbmConfig {
    frequency: 0.03,
    amplitude: 1.0,
    octaves: 3,
    persistence: 0.5,
    lacunarity: 2.0,
};
/// Base carve threshold: density below it becomes a cave.
const CAVE_THRESHOLD: f64 = -0.4;
/// Surface shell in which carving is attenuated.
const CAVE_SURFACE_SHELL: f64 = 20.0;

/// Parameters for one biome-aware column fill.
pub struct ColumnFill<'a> {
    pub biome: &'a Biome,
    /// Layer list already resolved against the edge profile.
    pub layers: &'a [Layer],
    pub structures: &'a StructureRegistry,
    pub seed: u64,
    /// Local coordinates inside the chunk.
    pub local: (usize, usize),
    /// Global column coordinates.
    pub world: (i32, i32),
    /// Surface height (inclusive top of the stack).
    pub surface: i32,
}

/// Fill one column from a biome definition.
pub fn fill_biome_column(chunk: &mut Chunk, catalog: &BlockCatalog, fill: &ColumnFill) {
    let (lx, lz) = fill.local;
    let (wx, wz) = fill.world;
    let mut rng = StdRng::seed_from_u64(column_seed(fill.seed, wx, wz));

    #[allow(clippy::cast_possible_wrap)]
    let world_height = chunk.height() as i32;
    let surface = fill.surface.clamp(0, world_height - 1);

    // Walk layers top-down; `remaining` counts the cells still unfilled
    // below the surface (surface cell included).
    let mut remaining = surface + 1;
    for layer in fill.layers {
        if remaining <= 0 {
            break;
        }
        let (lo, hi) = layer.thickness.bounds();
        let thickness = if lo == hi { lo } else { rng.gen_range(lo..=hi) };
        #[allow(clippy::cast_possible_wrap)]
        let thickness = (thickness as i32).min(remaining);
        if thickness == 0 {
            continue;
        }
        let id = catalog.id_or_air(&layer.block);
        #[allow(clippy::cast_sign_loss)]
        for y in (remaining - thickness)..remaining {
            chunk.set(lx, y as usize, lz, id);
        }
        remaining -= thickness;
    }

    // Everything below the layers is the biome's default fill.
    if remaining > 0 {
        let below = catalog.id_or_air(&fill.biome.below);
        #[allow(clippy::cast_sign_loss)]
        for y in 0..remaining {
            chunk.set(lx, y as usize, lz, below);
        }
    }

    // Liquid fill floods remaining air up to the configured height.
    if let Some(liquid) = &fill.biome.fill {
        let id = catalog.id_or_air(&liquid.block);
        if id != blocks::AIR {
            let top = liquid.height.clamp(0, world_height);
            #[allow(clippy::cast_sign_loss)]
            for y in 0..top {
                let y = y as usize;
                if chunk.get(lx, y, lz) == blocks::AIR {
                    chunk.set(lx, y, lz, id);
                }
            }
        }
    }

    // One roll against the summed structure CDF; at most one structure per
    // column, anchored on the cell above the surface.
    if !fill.biome.structures.is_empty() {
        let roll = rng.r#gen::<f64>() * 100.0;
        let mut cumulative = 0.0;
        for structure in &fill.biome.structures {
            cumulative += structure.frequency.max(0.0);
            if roll < cumulative {
                if let Some(blueprint) = fill.structures.generate(&structure.name, &mut rng) {
                    #[allow(clippy::cast_possible_wrap)]
                    let anchor = (lx as i32, surface + 1, lz as i32);
                    apply_blueprint(chunk, catalog, &blueprint, anchor);
                } else {
                    log::debug!("no structure generator named {:?}", structure.name);
                }
                break;
            }
        }
    }
}

/// Named ids the lean filler resolves once per chunk.
pub struct SimplePalette {
    pub grass: crate::block::BlockId,
    pub dirt: crate::block::BlockId,
    pub sand: crate::block::BlockId,
    pub stone: crate::block::BlockId,
    pub water: crate::block::BlockId,
}

impl SimplePalette {
    #[must_use]
    pub fn resolve(catalog: &BlockCatalog) -> Self {
        Self {
            grass: catalog.id_or_air("grass"),
            dirt: catalog.id_or_air("dirt"),
            sand: catalog.id_or_air("sand"),
            stone: catalog.id_or_air("stone"),
            water: catalog.id_or_air("water"),
        }
    }
}

/// Fill one column of the lean cave-and-stratify pipeline.
#[allow(clippy::too_many_arguments)]
pub fn fill_simple_column(
    chunk: &mut Chunk,
    palette: &SimplePalette,
    noise: &NoiseGenerator,
    seed: u64,
    local: (usize, usize),
    world: (i32, i32),
    surface: i32,
    sea_level: i32,
) {
    let (lx, lz) = local;
    let (wx, wz) = world;
    let mut rng = StdRng::seed_from_u64(column_seed(seed, wx, wz));

    #[allow(clippy::cast_possible_wrap)]
    let world_height = chunk.height() as i32;
    let surface = surface.clamp(0, world_height - 1);

    // Height bands: bare stone well above sea level, grass on regular
    // terrain, sand on the sea floor.
    let stone_band = surface > sea_level + 28;
    let grass_band = surface >= sea_level - 1;
    let (top, sub) = if stone_band {
        (palette.stone, palette.stone)
    } else if grass_band {
        (palette.grass, palette.dirt)
    } else {
        (palette.sand, palette.sand)
    };
    let sub_depth = rng.gen_range(1..=3);

    for y in 0..=surface {
        let depth = surface - y;

        // Carve caves where the 3D density field dips under the threshold,
        // demanding deeper dips near the surface.
        let density = noise.fbm3(f64::from(wx), f64::from(y), f64::from(wz), &CAVE_CFG);
        let threshold = if f64::from(depth) < CAVE_SURFACE_SHELL {
            CAVE_THRESHOLD - 0.3 * (1.0 - f64::from(depth) / CAVE_SURFACE_SHELL)
        } else {
            CAVE_THRESHOLD
        };
        if density < threshold {
            continue;
        }

        let id = if depth == 0 {
            top
        } else if depth <= sub_depth {
            sub
        } else {
            palette.stone
        };
        #[allow(clippy::cast_sign_loss)]
        chunk.set(lx, y as usize, lz, id);
    }

    // Open water above sunken terrain.
    if surface < sea_level - 1 && palette.water != blocks::AIR {
        #[allow(clippy::cast_sign_loss)]
        for y in (surface + 1)..sea_level {
            let y = y as usize;
            if chunk.get(lx, y, lz) == blocks::AIR {
                chunk.set(lx, y, lz, palette.water);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::{Fill, StructureRef, ThicknessSpec};
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

    #[test]
    fn layers_stack_top_down() {
        let cat = catalog();
        let mut chunk = Chunk::new(0, 0, 4, 32);
        let biome = Biome {
            layers: vec![
                Layer {
                    block: "grass".to_string(),
                    thickness: ThicknessSpec::Count(1),
                },
                Layer {
                    block: "dirt".to_string(),
                    thickness: ThicknessSpec::Count(3),
                },
            ],
            below: "stone".to_string(),
            ..Biome::default()
        };
        let registry = StructureRegistry::builtin();
        fill_biome_column(
            &mut chunk,
            &cat,
            &ColumnFill {
                biome: &biome,
                layers: &biome.layers,
                structures: &registry,
                seed: 1,
                local: (1, 1),
                world: (1, 1),
                surface: 10,
            },
        );

        assert_eq!(chunk.get(1, 10, 1), cat.id("grass").unwrap());
        for y in 7..10 {
            assert_eq!(chunk.get(1, y, 1), cat.id("dirt").unwrap());
        }
        for y in 0..7 {
            assert_eq!(chunk.get(1, y, 1), cat.id("stone").unwrap());
        }
        assert_eq!(chunk.get(1, 11, 1), blocks::AIR);
    }

    #[test]
    fn liquid_fill_covers_air_only() {
        let cat = catalog();
        let mut chunk = Chunk::new(0, 0, 4, 32);
        let biome = Biome {
            layers: vec![Layer {
                block: "sand".to_string(),
                thickness: ThicknessSpec::Count(2),
            }],
            below: "stone".to_string(),
            fill: Some(Fill {
                block: "water".to_string(),
                height: 12,
            }),
            ..Biome::default()
        };
        let registry = StructureRegistry::builtin();
        fill_biome_column(
            &mut chunk,
            &cat,
            &ColumnFill {
                biome: &biome,
                layers: &biome.layers,
                structures: &registry,
                seed: 1,
                local: (0, 0),
                world: (0, 0),
                surface: 5,
            },
        );

        let water = cat.id("water").unwrap();
        for y in 6..12 {
            assert_eq!(chunk.get(0, y, 0), water);
        }
        assert_eq!(chunk.get(0, 12, 0), blocks::AIR);
        // Terrain below the water line is untouched.
        assert_eq!(chunk.get(0, 5, 0), cat.id("sand").unwrap());
    }

    #[test]
    fn certain_structure_is_placed_once() {
        let cat = catalog();
        let mut chunk = Chunk::new(0, 0, 8, 32);
        let biome = Biome {
            structures: vec![StructureRef {
                name: "boulder".to_string(),
                frequency: 100.0,
            }],
            ..Biome::default()
        };
        let registry = StructureRegistry::builtin();
        fill_biome_column(
            &mut chunk,
            &cat,
            &ColumnFill {
                biome: &biome,
                layers: &biome.layers,
                structures: &registry,
                seed: 42,
                local: (3, 3),
                world: (3, 3),
                surface: 8,
            },
        );

        // The boulder anchors at the cell above the surface.
        let stone = cat.id("stone").unwrap();
        assert_eq!(chunk.get(3, 9, 3), stone);
    }

    #[test]
    fn simple_column_bands_and_water() {
        let cat = catalog();
        let palette = SimplePalette::resolve(&cat);
        let noise = NoiseGenerator::new(1);
        let mut chunk = Chunk::new(0, 0, 4, 64);

        // Above sea level: grass over dirt over stone.
        fill_simple_column(&mut chunk, &palette, &noise, 1, (0, 0), (0, 0), 40, 32);
        assert_eq!(chunk.get(0, 40, 0), palette.grass);

        // Sunken column: sand top, water above up to sea level.
        fill_simple_column(&mut chunk, &palette, &noise, 1, (1, 0), (1, 0), 20, 32);
        assert_eq!(chunk.get(1, 20, 0), palette.sand);
        for y in 21..32 {
            assert_eq!(chunk.get(1, y, 0), palette.water, "water missing at y={y}");
        }
        assert_eq!(chunk.get(1, 32, 0), blocks::AIR);
    }

    #[test]
    fn same_seed_fills_identically() {
        let cat = catalog();
        let biome = Biome::default();
        let registry = StructureRegistry::builtin();

        let mut a = Chunk::new(0, 0, 4, 32);
        let mut b = Chunk::new(0, 0, 4, 32);
        for chunk in [&mut a, &mut b] {
            fill_biome_column(
                chunk,
                &cat,
                &ColumnFill {
                    biome: &biome,
                    layers: &biome.layers,
                    structures: &registry,
                    seed: 99,
                    local: (2, 2),
                    world: (18, -7),
                    surface: 12,
                },
            );
        }
        assert_eq!(a.blocks(), b.blocks());
    }
}
