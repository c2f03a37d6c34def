//! Per-column elevation synthesis.
//!
//! Two paths share the entry point: biomes carrying an advanced terrain
//! bundle run the full geological pipeline (continental and regional shape,
//! formations, climate-driven erosion, ornament sprinkles, keyword
//! post-adjustments, cross-biome blending); biomes without it run the
//! classic multi-octave synthesis with edge-lerped overrides. Both end
//! clamped to the terrain bounds and floored to an integer surface y.

use crate::biome::{AdvancedTerrain, Biome, BiomeIndex, BiomeMap, BiomeRegistry};
use crate::noise::{FbmConfig, NoiseGenerator};

use super::TerrainTuning;

/// Range of the cross-biome elevation blend, in world units.
const BLEND_RANGE: f64 = 150.0;
/// Ring step for neighbour-biome sampling.
const BLEND_STEP: i32 = 50;

const BLEND_DIRS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Synthesise the integer surface height of a column.
pub fn column_height(
    noise: &mut NoiseGenerator,
    biome_map: &mut BiomeMap,
    registry: &BiomeRegistry,
    tuning: &TerrainTuning,
    label: BiomeIndex,
    wx: i32,
    wz: i32,
) -> i32 {
    let Some(biome) = registry.get(label) else {
        return tuning.sea_level;
    };

    let h = match biome.terrain {
        Some(adv) => {
            let h = geological_height(noise, tuning, biome, &adv, wx, wz);
            blend_with_neighbours(noise, biome_map, registry, label, h, wx, wz)
        }
        None => classic_height(noise, biome_map, registry, biome, wx, wz),
    };

    #[allow(clippy::cast_possible_truncation)]
    let floored = h.floor() as i32;
    floored.clamp(tuning.min_elevation, tuning.max_elevation)
}

/// The full geological pipeline.
#[allow(clippy::too_many_lines)]
fn geological_height(
    noise: &mut NoiseGenerator,
    tuning: &TerrainTuning,
    biome: &Biome,
    adv: &AdvancedTerrain,
    wx: i32,
    wz: i32,
) -> f64 {
    let x = f64::from(wx);
    let z = f64::from(wz);
    let sea = f64::from(tuning.sea_level);
    let orn = &biome.ornaments;

    // Continental and regional shape set the broad strokes.
    let continental = noise.fbm(x, z, &FbmConfig::with(tuning.continental_frequency, 4));
    let regional = noise.fbm(x, z, &FbmConfig::with(tuning.regional_frequency, 4));
    let shape = 0.7 * continental + 0.3 * regional;
    let mut h = sea + shape * adv.uplift * 100.0;

    // Geological formations, gated by biome flags and a formation field.
    let formation = noise.fbm(x, z, &FbmConfig::with(tuning.formation_frequency, 2));
    if adv.plateau && formation > tuning.plateau_threshold {
        h += noise.ridged(x, z, &FbmConfig::with(0.01, 3)) * (1.0 + orn.mesa) * 6.0 * formation;
    }
    if adv.ridges {
        h += noise.ridged(x, z, &FbmConfig::with(0.008, 3))
            * adv.height_amplitude
            * adv.hill_density
            * (1.0 + orn.ridge)
            * 5.0;
    }
    if adv.canyons {
        let canyon = noise.fbm(x, z, &FbmConfig::with(0.015, 3));
        if canyon < -0.2 {
            h -= (-0.2 - canyon) * adv.erosion_factor * (1.0 + orn.valley) * 40.0;
        }
    }
    if adv.rivers && adv.river_carving > 0.0 {
        let river = noise.fbm(x, z, &FbmConfig::with(0.004, 2));
        let threshold = 0.02 + adv.river_carving * 0.06;
        if river.abs() < threshold {
            let depth = 1.0 - river.abs() / threshold;
            h -= depth * depth * (6.0 + orn.river * 10.0);
        }
    }

    // Local relief from the biome's own three noise layers, steepened by a
    // warped slope factor.
    let primary = noise.fbm(
        x,
        z,
        &FbmConfig {
            frequency: biome.primary_noise_scale,
            amplitude: 1.0,
            octaves: biome.octaves.max(1),
            persistence: biome.persistence,
            lacunarity: biome.lacunarity,
        },
    );
    let secondary = noise.fbm(
        x,
        z,
        &FbmConfig {
            frequency: biome.secondary_noise_scale,
            amplitude: 1.0,
            octaves: biome.octaves.saturating_sub(1).max(1),
            persistence: biome.persistence,
            lacunarity: biome.lacunarity,
        },
    );
    let detail = noise.fbm(x, z, &FbmConfig::with(biome.detail_noise_scale, 2));
    let slope = 1.0
        + noise.domain_warp(
            x,
            z,
            &FbmConfig::with(biome.detail_noise_scale, 2),
            biome.domain_warp,
        ) * adv.slope_intensity;
    h += (primary * 0.6 + secondary * 0.3 + detail * 0.1)
        * adv.terrain_roughness
        * biome.height_variation
        * slope;

    // Weathering and climate erosion work on the relief, not the sea floor.
    if adv.weathering_rate > 0.0 {
        h = sea + (h - sea) * (1.0 - 0.3 * adv.weathering_rate);
    }
    if adv.wind_erosion > 0.0 {
        let directional = noise.noise2(x * 0.02 + z * 0.013, z * 0.02).max(0.0);
        h -= directional * adv.wind_erosion * 3.0;
    }
    if adv.rain_erosion > 0.0 {
        h = sea + (h - sea) * (1.0 - 0.2 * adv.rain_erosion);
    }
    if adv.frost_heave > 0.0 {
        h += noise.noise2(x * 0.09 + 13.7, z * 0.09).abs() * adv.frost_heave * 2.0;
    }
    if adv.snow_load > 0.0 {
        h -= ((noise.noise2(x * 0.05 - 7.1, z * 0.05) + 1.0) / 2.0) * adv.snow_load * 2.0;
    }
    if adv.thermal_expansion > 0.0 {
        h += noise.noise2(x * 0.31, z * 0.31 + 3.3) * adv.thermal_expansion;
    }

    // Sparse surface ornaments, each behind its own noise threshold.
    if orn.crater > 0.0 {
        let n = noise.noise2(x * 0.02 + 101.0, z * 0.02 - 47.0);
        if n > 0.75 {
            h -= (n - 0.75) * orn.crater * 30.0;
        }
    }
    if orn.outcrop > 0.0 {
        let n = noise.noise2(x * 0.06 - 59.0, z * 0.06 + 23.0);
        if n > 0.8 {
            h += (n - 0.8) * orn.outcrop * 25.0;
        }
    }
    if orn.boulder > 0.0 {
        let n = noise.noise2(x * 0.11 + 7.0, z * 0.11 + 91.0);
        if n > 0.85 {
            h += orn.boulder * 2.0;
        }
    }
    if orn.scree > 0.0 {
        let n = noise.noise2(x * 0.04 - 13.0, z * 0.04 - 83.0);
        if n > 0.6 {
            h -= (n - 0.6) * orn.scree * 4.0;
        }
    }
    if orn.arch > 0.0 {
        let n = noise.noise2(x * 0.015 + 67.0, z * 0.015 + 29.0);
        if n > 0.9 {
            h += orn.arch * 6.0;
        }
    }

    // Optional global field adjustments.
    if adv.voronoi_influence > 0.0 {
        let v = noise.domain_warp(x, z, &FbmConfig::with(0.01, 1), 30.0);
        h += v * adv.voronoi_influence * 8.0;
    }
    if adv.harmonic_influence > 0.0 {
        let harmonic =
            noise.noise2(x * 0.01, z * 0.01) + noise.noise2(x * 0.03, z * 0.03) * 0.5;
        h += harmonic * adv.harmonic_influence * 5.0;
    }
    if adv.simplex_blend > 0.0 {
        let alt = sea + noise.fbm(x, z, &FbmConfig::with(0.006, 3)) * 20.0;
        let t = adv.simplex_blend.clamp(0.0, 1.0);
        h = h * (1.0 - t) + alt * t;
    }

    // Fractal-dimension factor scales the whole relief.
    let fd = (adv.fractal_dimension / 2.0).powi(2);
    h = sea + (h - sea) * fd;

    // Sedimentation fills in the deepest excursions below the biome's base.
    if adv.sedimentation_rate > 0.0 && h < biome.base_height {
        let damp = 1.0 - adv.sedimentation_rate.clamp(0.0, 1.0) * 0.5;
        h = biome.base_height + (h - biome.base_height) * damp;
    }

    // Named-keyword post-adjustments.
    if biome.name_contains("mountain") || biome.name_contains("peak") {
        h += noise.ridged(x, z, &FbmConfig::with(0.012, 4)) * 8.0;
    } else if biome.name_contains("desert") || biome.name_contains("dune") {
        h += noise.domain_warp(x, z, &FbmConfig::with(0.02, 2), 25.0) * 4.0;
    } else if biome.name_contains("ocean") || biome.name_contains("lake") {
        h = sea + (h - sea) * 0.3;
    }

    h
}

/// Pull the column toward the base height of nearby differing biomes so
/// seams between biomes ramp instead of cliff.
fn blend_with_neighbours(
    noise: &mut NoiseGenerator,
    biome_map: &mut BiomeMap,
    registry: &BiomeRegistry,
    label: BiomeIndex,
    h: f64,
    wx: i32,
    wz: i32,
) -> f64 {
    let mut weight_sum = 0.0;
    let mut target_sum = 0.0;

    let mut distance = BLEND_STEP;
    while f64::from(distance) <= BLEND_RANGE {
        for (dx, dz) in BLEND_DIRS {
            // Raw labels: a coarse ring sample must not pull a whole
            // smoothing neighbourhood into the caches.
            let sample =
                biome_map.raw_label_at(wx + dx * distance, wz + dz * distance, noise, registry);
            if sample == label {
                continue;
            }
            let Some(neighbor) = registry.get(sample) else {
                continue;
            };
            let weight = (1.0 - f64::from(distance) / BLEND_RANGE).max(0.0);
            let local = noise.fbm(
                f64::from(wx),
                f64::from(wz),
                &FbmConfig::with(neighbor.primary_noise_scale, 2),
            ) * neighbor.height_variation
                * 0.5;
            target_sum += weight * (neighbor.base_height + local);
            weight_sum += weight;
        }
        distance += BLEND_STEP;
    }

    if weight_sum <= 0.0 {
        return h;
    }
    let target = target_sum / weight_sum;
    let factor = (weight_sum / 16.0).min(0.5);
    h * (1.0 - factor) + target * factor
}

/// The classic multi-octave path for biomes without the advanced bundle.
fn classic_height(
    noise: &mut NoiseGenerator,
    biome_map: &mut BiomeMap,
    registry: &BiomeRegistry,
    biome: &Biome,
    wx: i32,
    wz: i32,
) -> f64 {
    let x = f64::from(wx);
    let z = f64::from(wz);

    let mut base = biome.base_height;
    let mut variation = biome.height_variation;
    let mut frequency = biome.primary_noise_scale;

    // Near a border the edge profile overrides take over proportionally.
    let edge = biome_map.edge_at(wx, wz, noise, registry);
    if edge.is_edge
        && let Some(profile) = &biome.edges
    {
        let t = 1.0 - edge.edge_distance;
        if let Some(b) = profile.base_height {
            base = lerp(base, b, t);
        }
        if let Some(v) = profile.height_variation {
            variation = lerp(variation, v, t);
        }
        if let Some(f) = profile.frequency {
            frequency = lerp(frequency, f, t);
        }
    }

    let (octaves, amplitude) = if biome.name_contains("mountain") {
        (5, 1.6)
    } else if biome.name_contains("desert") {
        (3, 0.9)
    } else if biome.name_contains("ocean") {
        (3, 0.5)
    } else if biome.name_contains("plain") {
        (3, 0.8)
    } else {
        (4, 1.0)
    };

    let n = noise.fbm(
        x,
        z,
        &FbmConfig {
            frequency,
            amplitude: 1.0,
            octaves,
            persistence: biome.persistence,
            lacunarity: biome.lacunarity,
        },
    );
    base + n * variation * amplitude
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::BiomeAdjacency;

    fn tuning() -> TerrainTuning {
        TerrainTuning {
            sea_level: 64,
            min_elevation: 1,
            max_elevation: 127,
            ..TerrainTuning::default()
        }
    }

    fn registry(biomes: Vec<Biome>) -> BiomeRegistry {
        BiomeRegistry::new(biomes, BiomeAdjacency::default())
    }

    #[test]
    fn heights_are_deterministic_and_bounded() {
        let reg = registry(vec![
            Biome {
                name: "mountains".to_string(),
                base_height: 90.0,
                height_variation: 24.0,
                terrain: Some(AdvancedTerrain {
                    ridges: true,
                    plateau: true,
                    ..AdvancedTerrain::default()
                }),
                ..Biome::default()
            },
            Biome::default(),
        ]);
        let t = tuning();

        let mut noise_a = NoiseGenerator::new(11);
        let mut map_a = BiomeMap::new(1.0, 64);
        let mut noise_b = NoiseGenerator::new(11);
        let mut map_b = BiomeMap::new(1.0, 64);

        for wx in 0..24 {
            let a = column_height(&mut noise_a, &mut map_a, &reg, &t, 0, wx, 5);
            let b = column_height(&mut noise_b, &mut map_b, &reg, &t, 0, wx, 5);
            assert_eq!(a, b);
            assert!((t.min_elevation..=t.max_elevation).contains(&a));
        }
    }

    #[test]
    fn ocean_keyword_flattens_towards_sea_level() {
        let ocean = Biome {
            name: "ocean".to_string(),
            base_height: 40.0,
            height_variation: 6.0,
            terrain: Some(AdvancedTerrain::default()),
            ..Biome::default()
        };
        let plains = Biome {
            name: "plains".to_string(),
            terrain: Some(AdvancedTerrain {
                uplift: 0.8,
                ..AdvancedTerrain::default()
            }),
            ..Biome::default()
        };
        let reg = registry(vec![ocean, plains]);
        let t = tuning();

        let mut noise = NoiseGenerator::new(5);
        let mut map = BiomeMap::new(1.0, 64);
        let ocean_label = reg.by_name("ocean").unwrap();
        let plains_label = reg.by_name("plains").unwrap();

        let mut ocean_spread = 0.0f64;
        let mut plains_spread = 0.0f64;
        for wx in 0..32 {
            let o = f64::from(column_height(&mut noise, &mut map, &reg, &t, ocean_label, wx, 9));
            let p = f64::from(column_height(&mut noise, &mut map, &reg, &t, plains_label, wx, 9));
            ocean_spread = ocean_spread.max((o - 64.0).abs());
            plains_spread = plains_spread.max((p - 64.0).abs());
        }
        assert!(ocean_spread < plains_spread);
    }

    #[test]
    fn classic_path_tracks_base_height() {
        let hills = Biome {
            name: "hills".to_string(),
            base_height: 80.0,
            height_variation: 6.0,
            terrain: None,
            ..Biome::default()
        };
        let reg = registry(vec![hills]);
        let t = tuning();
        let mut noise = NoiseGenerator::new(2);
        let mut map = BiomeMap::new(1.0, 64);

        for wx in 0..16 {
            let h = column_height(&mut noise, &mut map, &reg, &t, 0, wx, 0);
            assert!((70..=92).contains(&h), "classic height {h} strayed from base");
        }
    }
}
