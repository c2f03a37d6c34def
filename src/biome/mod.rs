//! Biome definitions and the biome registry.
//!
//! A biome is a named parameter bundle: elevation shape, stratification
//! layers, liquid fill, ornament amplitudes, erosion behaviour and structure
//! placement. The host may supply the full biome set (and the pairwise
//! adjacency table) in the `init` message; when it does not, the built-in
//! definitions in `data/biomes.ron` are used.
//!
//! Registry entries are sorted by name so that every iteration-order
//! dependent decision downstream (weight ties, CDF walks) is reproducible
//! regardless of how the host serialised its biome map.

use std::collections::HashMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

pub mod selector;

pub use selector::{BiomeMap, ColumnEnv, EdgeInfo};

/// Index of a biome inside its registry. Used as the label value in the
/// per-column caches; cheaper to copy and compare than a name.
pub type BiomeIndex = u16;

/// How a biome hands over to its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransitionMode {
    #[default]
    None,
    Partial,
    Full,
}

/// Pairwise transition policy from the adjacency table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// The two biomes may touch directly.
    #[default]
    Direct,
    /// Edge profiles blend the border but no third biome is inserted.
    Buffered,
    /// A transitional biome is inserted between the two.
    Incompatible,
}

/// Layer thickness: either a fixed count or a `"a-b"` uniform range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThicknessSpec {
    Count(u32),
    Range(String),
}

impl Default for ThicknessSpec {
    fn default() -> Self {
        Self::Count(1)
    }
}

impl ThicknessSpec {
    /// Bounds of the spec as `(min, max)`.
    ///
    /// Malformed range strings degrade: a parseable numeric prefix becomes a
    /// fixed thickness, anything else is 0. Never fails.
    #[must_use]
    pub fn bounds(&self) -> (u32, u32) {
        match self {
            Self::Count(n) => (*n, *n),
            Self::Range(spec) => {
                let digits: String = spec.chars().take_while(char::is_ascii_digit).collect();
                let Ok(lo) = digits.parse::<u32>() else {
                    return (0, 0);
                };
                let rest = &spec[digits.len()..];
                if let Some(hi_str) = rest.strip_prefix('-')
                    && let Ok(hi) = hi_str.trim().parse::<u32>()
                    && hi >= lo
                {
                    (lo, hi)
                } else {
                    (lo, lo)
                }
            }
        }
    }
}

/// One stratification layer, applied top-down from the surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub block: String,
    #[serde(default)]
    pub thickness: ThicknessSpec,
}

/// Liquid fill applied after stratification: air cells below `height`
/// become `block`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub block: String,
    pub height: i32,
}

/// Overrides applied near biome borders.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct EdgeProfile {
    /// Fraction controlling the border scan radius (radius = min(8, 50·size)).
    pub size: f64,
    pub base_height: Option<f64>,
    pub height_variation: Option<f64>,
    pub frequency: Option<f64>,
    pub layers: Option<Vec<Layer>>,
}

/// Amplitudes of the optional surface ornaments. Zero disables an ornament.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrnamentAmplitudes {
    pub ridge: f64,
    pub valley: f64,
    pub river: f64,
    pub mesa: f64,
    pub crater: f64,
    pub outcrop: f64,
    pub boulder: f64,
    pub scree: f64,
    pub arch: f64,
}

/// Advanced terrain parameter bundle; its presence selects the full
/// geological height pipeline for the biome, its absence the classic
/// multi-octave path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdvancedTerrain {
    /// Vertical scale of the continental/regional shape.
    pub uplift: f64,
    pub terrain_roughness: f64,
    pub slope_intensity: f64,
    pub hill_density: f64,
    pub height_amplitude: f64,
    /// Canyon carving strength.
    pub erosion_factor: f64,
    /// River threshold width; 0 disables river carving.
    pub river_carving: f64,
    pub plateau: bool,
    pub ridges: bool,
    pub canyons: bool,
    pub rivers: bool,
    pub weathering_rate: f64,
    pub wind_erosion: f64,
    pub rain_erosion: f64,
    pub frost_heave: f64,
    pub snow_load: f64,
    pub thermal_expansion: f64,
    /// Dampens negative excursions of the synthesised height.
    pub sedimentation_rate: f64,
    /// Roughness exponent input; contributes `(fd/2)^2` as a final factor.
    pub fractal_dimension: f64,
    pub voronoi_influence: f64,
    pub harmonic_influence: f64,
    pub simplex_blend: f64,
}

impl Default for AdvancedTerrain {
    fn default() -> Self {
        Self {
            uplift: 0.3,
            terrain_roughness: 0.5,
            slope_intensity: 0.5,
            hill_density: 0.5,
            height_amplitude: 1.0,
            erosion_factor: 0.0,
            river_carving: 0.0,
            plateau: false,
            ridges: false,
            canyons: false,
            rivers: false,
            weathering_rate: 0.0,
            wind_erosion: 0.0,
            rain_erosion: 0.0,
            frost_heave: 0.0,
            snow_load: 0.0,
            thermal_expansion: 0.0,
            sedimentation_rate: 0.0,
            fractal_dimension: 2.0,
            voronoi_influence: 0.0,
            harmonic_influence: 0.0,
            simplex_blend: 0.0,
        }
    }
}

/// Reference to a structure generator with a placement frequency in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureRef {
    pub name: String,
    /// Chance per surface column, in percent.
    #[serde(default)]
    pub frequency: f64,
}

/// A named biome parameter bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Biome {
    pub name: String,

    // Elevation shape.
    pub base_height: f64,
    pub height_variation: f64,

    // Climate envelope, on the same scales the classifier produces:
    // temperature 10..=130, moisture 0..=1.
    pub temperature: f64,
    pub moisture: f64,

    // Classifier weighting.
    pub rarity: f64,
    pub size: f64,
    pub transition: TransitionMode,

    // Local terrain noise.
    pub primary_noise_scale: f64,
    pub secondary_noise_scale: f64,
    pub detail_noise_scale: f64,
    pub octaves: u32,
    pub persistence: f64,
    pub lacunarity: f64,
    pub domain_warp: f64,

    pub ornaments: OrnamentAmplitudes,
    pub terrain: Option<AdvancedTerrain>,

    // Stratification.
    pub layers: Vec<Layer>,
    /// Block filling everything below the declared layers.
    pub below: String,
    pub fill: Option<Fill>,
    pub edges: Option<EdgeProfile>,

    pub structures: Vec<StructureRef>,
}

impl Default for Biome {
    fn default() -> Self {
        Self {
            name: "plains".to_string(),
            base_height: 66.0,
            height_variation: 4.0,
            temperature: 65.0,
            moisture: 0.5,
            rarity: 1.0,
            size: 1.0,
            transition: TransitionMode::None,
            primary_noise_scale: 0.01,
            secondary_noise_scale: 0.04,
            detail_noise_scale: 0.1,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            domain_warp: 0.0,
            ornaments: OrnamentAmplitudes::default(),
            terrain: None,
            layers: vec![
                Layer {
                    block: "grass".to_string(),
                    thickness: ThicknessSpec::Count(1),
                },
                Layer {
                    block: "dirt".to_string(),
                    thickness: ThicknessSpec::Range("2-4".to_string()),
                },
            ],
            below: "stone".to_string(),
            fill: None,
            edges: None,
            structures: Vec::new(),
        }
    }
}

impl Biome {
    /// Keyword test against the biome name, used by formation post-passes
    /// and transition selection.
    #[must_use]
    pub fn name_contains(&self, keyword: &str) -> bool {
        self.name.to_ascii_lowercase().contains(keyword)
    }
}

/// Pairwise transition policies. Lookup is order-insensitive.
#[derive(Debug, Clone, Default)]
pub struct BiomeAdjacency {
    table: HashMap<(String, String), TransitionPolicy>,
}

impl BiomeAdjacency {
    /// Build from the nested `{a: {b: policy}}` map the host sends.
    #[must_use]
    pub fn new(table: &HashMap<String, HashMap<String, TransitionPolicy>>) -> Self {
        let mut flat = HashMap::new();
        for (a, row) in table {
            for (b, policy) in row {
                flat.insert(Self::key(a, b), *policy);
            }
        }
        Self { table: flat }
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    /// Policy for a biome pair; unlisted pairs may touch directly.
    #[must_use]
    pub fn policy(&self, a: &str, b: &str) -> TransitionPolicy {
        self.table
            .get(&Self::key(a, b))
            .copied()
            .unwrap_or_default()
    }
}

/// The worker's biome set, compiled at init.
pub struct BiomeRegistry {
    biomes: Vec<Biome>,
    by_name: FxHashMap<String, BiomeIndex>,
    adjacency: BiomeAdjacency,
}

impl BiomeRegistry {
    /// Compile a registry from a host-provided biome map and adjacency
    /// table. Biomes are sorted by name for reproducible iteration.
    #[must_use]
    pub fn new(biomes: Vec<Biome>, adjacency: BiomeAdjacency) -> Self {
        let mut biomes = biomes;
        biomes.sort_by(|a, b| a.name.cmp(&b.name));
        biomes.dedup_by(|a, b| a.name == b.name);

        #[allow(clippy::cast_possible_truncation)]
        let by_name = biomes
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.clone(), i as BiomeIndex))
            .collect();

        Self {
            biomes,
            by_name,
            adjacency,
        }
    }

    /// The built-in biome set from `data/biomes.ron`.
    ///
    /// # Panics
    /// Panics if the embedded definitions fail to parse, which is a build
    /// defect rather than a runtime condition.
    #[must_use]
    pub fn builtin() -> Self {
        let biomes: Vec<Biome> = ron::from_str(include_str!("../../data/biomes.ron"))
            .expect("embedded data/biomes.ron parses");
        Self::new(biomes, BiomeAdjacency::default())
    }

    #[must_use]
    pub fn get(&self, index: BiomeIndex) -> Option<&Biome> {
        self.biomes.get(usize::from(index))
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<BiomeIndex> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.biomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.biomes.is_empty()
    }

    /// All biomes in registry (name-sorted) order.
    #[must_use]
    pub fn all(&self) -> &[Biome] {
        &self.biomes
    }

    #[must_use]
    pub fn adjacency(&self) -> &BiomeAdjacency {
        &self.adjacency
    }

    /// Transition policy between two registry entries.
    #[must_use]
    pub fn policy(&self, a: BiomeIndex, b: BiomeIndex) -> TransitionPolicy {
        match (self.get(a), self.get(b)) {
            (Some(a), Some(b)) => self.adjacency.policy(&a.name, &b.name),
            _ => TransitionPolicy::Direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thickness_bounds() {
        assert_eq!(ThicknessSpec::Count(3).bounds(), (3, 3));
        assert_eq!(ThicknessSpec::Range("2-5".to_string()).bounds(), (2, 5));
        // Malformed: numeric prefix wins, otherwise zero.
        assert_eq!(ThicknessSpec::Range("4junk".to_string()).bounds(), (4, 4));
        assert_eq!(ThicknessSpec::Range("7-3".to_string()).bounds(), (7, 7));
        assert_eq!(ThicknessSpec::Range("x-3".to_string()).bounds(), (0, 0));
    }

    #[test]
    fn registry_is_name_sorted_and_deduped() {
        let reg = BiomeRegistry::new(
            vec![
                Biome {
                    name: "zeta".to_string(),
                    ..Biome::default()
                },
                Biome {
                    name: "alpha".to_string(),
                    ..Biome::default()
                },
                Biome {
                    name: "alpha".to_string(),
                    ..Biome::default()
                },
            ],
            BiomeAdjacency::default(),
        );
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(0).unwrap().name, "alpha");
        assert_eq!(reg.by_name("zeta"), Some(1));
    }

    #[test]
    fn adjacency_is_order_insensitive() {
        let mut nested = HashMap::new();
        nested.insert("mountains".to_string(), {
            let mut row = HashMap::new();
            row.insert("ocean".to_string(), TransitionPolicy::Incompatible);
            row
        });
        let adj = BiomeAdjacency::new(&nested);
        assert_eq!(adj.policy("ocean", "mountains"), TransitionPolicy::Incompatible);
        assert_eq!(adj.policy("ocean", "plains"), TransitionPolicy::Direct);
    }

    #[test]
    fn builtin_set_parses() {
        let reg = BiomeRegistry::builtin();
        assert!(reg.by_name("plains").is_some());
        assert!(reg.by_name("ocean").is_some());
        assert!(reg.by_name("mountains").is_some());
    }
}
