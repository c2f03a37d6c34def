//! Data-driven structure generation.
//!
//! A structure is a blueprint: a bounded box of block writes relative to an
//! anchor cell. Blueprints come from a registry of pure generator functions
//! keyed by name; the biome config references generators by name with a
//! placement frequency. Generators draw their variation from the caller's
//! column rng, so placement stays a pure function of (seed, column).

use std::collections::BTreeMap;

use rand::Rng;
use rand::rngs::StdRng;

use crate::block::{BlockCatalog, blocks};
use crate::chunk::Chunk;

/// A single relative block write.
pub type BlockWrite = ((i32, i32, i32), &'static str);

/// A generated structure: extent is the bounding box the writes stay inside.
pub struct StructureBlueprint {
    pub extent: (i32, i32, i32),
    pub writes: Vec<BlockWrite>,
}

type GeneratorFn = fn(&mut StdRng) -> StructureBlueprint;

/// Named registry of structure generators.
pub struct StructureRegistry {
    generators: BTreeMap<String, GeneratorFn>,
}

impl StructureRegistry {
    /// The built-in generator set.
    #[must_use]
    pub fn builtin() -> Self {
        let mut generators: BTreeMap<String, GeneratorFn> = BTreeMap::new();
        generators.insert("tree".to_string(), generate_tree as GeneratorFn);
        generators.insert("cactus".to_string(), generate_cactus as GeneratorFn);
        generators.insert("boulder".to_string(), generate_boulder as GeneratorFn);
        Self { generators }
    }

    /// Restrict the built-in set to the names the host enabled.
    #[must_use]
    pub fn with_enabled(names: &[String]) -> Self {
        let mut all = Self::builtin();
        all.generators.retain(|name, _| names.iter().any(|n| n == name));
        all
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    /// Run the named generator. Unknown names yield `None`; the caller
    /// degrades to placing nothing.
    #[must_use]
    pub fn generate(&self, name: &str, rng: &mut StdRng) -> Option<StructureBlueprint> {
        self.generators.get(name).map(|generator| generator(rng))
    }
}

impl Default for StructureRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Stamp a blueprint into the chunk at a local anchor. Writes that fall
/// outside the chunk are dropped, and existing terrain is never overwritten:
/// structures only claim air.
pub fn apply_blueprint(
    chunk: &mut Chunk,
    catalog: &BlockCatalog,
    blueprint: &StructureBlueprint,
    anchor: (i32, i32, i32),
) {
    #[allow(clippy::cast_possible_wrap)]
    let size = chunk.size() as i32;
    #[allow(clippy::cast_possible_wrap)]
    let height = chunk.height() as i32;

    for ((dx, dy, dz), block) in &blueprint.writes {
        let x = anchor.0 + dx;
        let y = anchor.1 + dy;
        let z = anchor.2 + dz;
        if x < 0 || x >= size || y < 0 || y >= height || z < 0 || z >= size {
            continue;
        }
        let id = catalog.id_or_air(block);
        if id == blocks::AIR {
            continue;
        }
        #[allow(clippy::cast_sign_loss)]
        let (x, y, z) = (x as usize, y as usize, z as usize);
        if chunk.get(x, y, z) == blocks::AIR {
            chunk.set(x, y, z, id);
        }
    }
}

fn generate_tree(rng: &mut StdRng) -> StructureBlueprint {
    let trunk = rng.gen_range(3..=5);
    let mut writes = Vec::new();

    for y in 0..trunk {
        writes.push(((0, y, 0), "wood"));
    }
    // Leaf canopy: a ring around the two top trunk cells plus a cap.
    for y in (trunk - 2)..trunk {
        for dx in -1..=1 {
            for dz in -1..=1 {
                if dx == 0 && dz == 0 {
                    continue;
                }
                writes.push(((dx, y, dz), "leaves"));
            }
        }
    }
    writes.push(((0, trunk, 0), "leaves"));

    StructureBlueprint {
        extent: (3, trunk + 1, 3),
        writes,
    }
}

fn generate_cactus(rng: &mut StdRng) -> StructureBlueprint {
    let height = rng.gen_range(2..=3);
    let writes = (0..height).map(|y| ((0, y, 0), "cactus")).collect();
    StructureBlueprint {
        extent: (1, height, 1),
        writes,
    }
}

fn generate_boulder(rng: &mut StdRng) -> StructureBlueprint {
    let mut writes = Vec::new();
    for dx in 0..2 {
        for dy in 0..2 {
            for dz in 0..2 {
                // Chip a few corners off so boulders are not perfect cubes.
                if dy == 1 && rng.gen_bool(0.4) {
                    continue;
                }
                writes.push(((dx, dy, dz), "stone"));
            }
        }
    }
    StructureBlueprint {
        extent: (2, 2, 2),
        writes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockProps;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn catalog() -> BlockCatalog {
        let mut types = HashMap::new();
        for (i, name) in ["air", "stone", "wood", "leaves", "cactus"].iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            types.insert((*name).to_string(), i as u16);
        }
        BlockCatalog::new(&types, &HashMap::<String, BlockProps>::new())
    }

    #[test]
    fn tree_blueprint_is_deterministic() {
        let reg = StructureRegistry::builtin();
        let a = reg.generate("tree", &mut StdRng::seed_from_u64(7)).unwrap();
        let b = reg.generate("tree", &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a.writes, b.writes);
        assert!(a.writes.iter().any(|(_, block)| *block == "wood"));
    }

    #[test]
    fn unknown_generator_degrades() {
        let reg = StructureRegistry::builtin();
        assert!(reg.generate("ziggurat", &mut StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn blueprint_respects_bounds_and_terrain() {
        let cat = catalog();
        let mut chunk = Chunk::new(0, 0, 4, 16);
        chunk.set(0, 5, 0, 1);

        let reg = StructureRegistry::builtin();
        let mut rng = StdRng::seed_from_u64(3);
        let tree = reg.generate("tree", &mut rng).unwrap();
        // Anchor at a corner: canopy writes at x = -1 / z = -1 are dropped.
        apply_blueprint(&mut chunk, &cat, &tree, (0, 5, 0));

        // The stone the trunk would start in is untouched.
        assert_eq!(chunk.get(0, 5, 0), 1);
        // Trunk continues above it.
        assert_eq!(chunk.get(0, 6, 0), cat.id("wood").unwrap());
    }

    #[test]
    fn enabled_filter_limits_generators() {
        let reg = StructureRegistry::with_enabled(&["cactus".to_string()]);
        assert!(reg.contains("cactus"));
        assert!(!reg.contains("tree"));
    }
}
