//! Block property definitions and the compiled catalogue.
//!
//! The host hands the worker a `name -> id` map and a `name -> properties`
//! table at init. The catalogue compiles both into dense id-indexed arrays so
//! the mesher's inner loop gets O(1) lookups with no hashing. Unknown ids
//! resolve to a neutral default instead of failing: a stale or modded id in a
//! chunk volume degrades to an invisible block, it never crashes meshing.

use std::collections::HashMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::BlockId;

/// How the mesher treats a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderClass {
    /// Cube faces through the face-culling mesher.
    #[default]
    Solid,
    /// Sloped per-column surface through the smooth mesher.
    Mesh,
    /// Host-rendered model; the cube mesher skips it.
    Structure,
}

/// Base colour in linear `[0, 1]` components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for Rgb {
    fn default() -> Self {
        Self {
            r: 1.0,
            g: 1.0,
            b: 1.0,
        }
    }
}

/// Which faces carry a dedicated texture.
///
/// A set flag routes that face into a per-(block, face) textured group
/// instead of the untextured colour stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceTextureFlags {
    pub front: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub top: bool,
    pub bottom: bool,
}

impl FaceTextureFlags {
    #[must_use]
    pub fn any(&self) -> bool {
        self.front || self.back || self.left || self.right || self.top || self.bottom
    }
}

/// Per-block render properties as declared by the host (or the built-in
/// definitions). Declared blocks default to opaque; contrast with
/// [`BlockProps::neutral`], the stand-in for ids the catalogue has never
/// heard of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlockProps {
    /// 0 = fully opaque, 1 = fully invisible.
    pub transparency: f32,
    /// Transparent-class block (water, glass): rendered but not occluding.
    pub see_through: bool,
    /// Per-face texture flags.
    pub textures: FaceTextureFlags,
    /// Single texture applied to all faces, keyed by block name.
    pub default_texture: bool,
    /// Base colour for the untextured vertex-colour path.
    pub color: Rgb,
    /// Render class.
    pub render: RenderClass,
}

impl Default for BlockProps {
    fn default() -> Self {
        Self {
            transparency: 0.0,
            see_through: false,
            textures: FaceTextureFlags::default(),
            default_texture: false,
            color: Rgb::default(),
            render: RenderClass::Solid,
        }
    }
}

impl BlockProps {
    /// The degraded stand-in for ids without a catalogue entry:
    /// fully transparent, white, untextured, solid.
    #[must_use]
    pub fn neutral() -> Self {
        Self {
            transparency: 1.0,
            ..Self::default()
        }
    }

    /// Whether a cell with these properties fails to occlude its neighbours.
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        self.see_through || self.transparency > 0.0
    }
}

/// One entry of the built-in block definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDef {
    pub name: String,
    pub id: BlockId,
    #[serde(default)]
    pub props: BlockProps,
}

/// Dense, id-indexed block lookup tables.
pub struct BlockCatalog {
    names: Vec<String>,
    props: Vec<BlockProps>,
    transparent: Vec<bool>,
    ids_by_name: FxHashMap<String, BlockId>,
    neutral: BlockProps,
}

impl BlockCatalog {
    /// Compile the catalogue from a `name -> id` map and a `name -> props`
    /// table. Ids without a props entry get [`BlockProps::default`]; id 0 is
    /// forced to air (transparency 1, no textures) whatever the input says.
    #[must_use]
    pub fn new(block_types: &HashMap<String, BlockId>, colors: &HashMap<String, BlockProps>) -> Self {
        let max_id = block_types.values().copied().max().unwrap_or(0);
        let len = usize::from(max_id) + 1;

        let mut names = vec![String::new(); len];
        let mut props = vec![BlockProps::default(); len];
        let mut ids_by_name = FxHashMap::default();

        for (name, &id) in block_types {
            let idx = usize::from(id);
            names[idx] = name.clone();
            if let Some(p) = colors.get(name) {
                props[idx] = p.clone();
            }
            ids_by_name.insert(name.clone(), id);
        }

        // Id 0 is air by contract.
        props[0] = BlockProps::neutral();
        if names[0].is_empty() {
            names[0] = "air".to_string();
        }

        let transparent = props.iter().map(BlockProps::is_transparent).collect();

        Self {
            names,
            props,
            transparent,
            ids_by_name,
            neutral: BlockProps::neutral(),
        }
    }

    /// Build from the built-in definition list.
    #[must_use]
    pub fn from_defs(defs: &[BlockDef]) -> Self {
        let mut types = HashMap::new();
        let mut colors = HashMap::new();
        for def in defs {
            types.insert(def.name.clone(), def.id);
            colors.insert(def.name.clone(), def.props.clone());
        }
        Self::new(&types, &colors)
    }

    /// Block name for `id`, used as the texture lookup key. Unknown ids
    /// yield the empty string.
    #[must_use]
    pub fn name(&self, id: BlockId) -> &str {
        self.names.get(usize::from(id)).map_or("", String::as_str)
    }

    /// Properties for `id`, or the neutral default when unknown.
    #[must_use]
    pub fn props(&self, id: BlockId) -> &BlockProps {
        self.props.get(usize::from(id)).unwrap_or(&self.neutral)
    }

    /// Precomputed transparency class for `id`. Unknown ids are transparent.
    #[must_use]
    pub fn is_transparent(&self, id: BlockId) -> bool {
        self.transparent.get(usize::from(id)).copied().unwrap_or(true)
    }

    #[must_use]
    pub fn render_class(&self, id: BlockId) -> RenderClass {
        self.props(id).render
    }

    /// Numeric id for a block name.
    #[must_use]
    pub fn id(&self, name: &str) -> Option<BlockId> {
        self.ids_by_name.get(name).copied()
    }

    /// Numeric id for a block name, degrading to air when unknown.
    #[must_use]
    pub fn id_or_air(&self, name: &str) -> BlockId {
        self.id(name).unwrap_or(super::blocks::AIR)
    }

    /// Number of compiled entries (max id + 1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.props.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> BlockCatalog {
        let mut types = HashMap::new();
        types.insert("air".to_string(), 0);
        types.insert("stone".to_string(), 1);
        types.insert("water".to_string(), 4);

        let mut colors = HashMap::new();
        colors.insert(
            "stone".to_string(),
            BlockProps {
                color: Rgb { r: 0.5, g: 0.5, b: 0.5 },
                ..BlockProps::default()
            },
        );
        colors.insert(
            "water".to_string(),
            BlockProps {
                transparency: 0.4,
                see_through: true,
                ..BlockProps::default()
            },
        );
        BlockCatalog::new(&types, &colors)
    }

    #[test]
    fn air_is_always_transparent() {
        let cat = catalog();
        assert!(cat.is_transparent(0));
        assert_eq!(cat.props(0).transparency, 1.0);
        assert!(!cat.props(0).textures.any());
    }

    #[test]
    fn unknown_ids_degrade_to_neutral() {
        let cat = catalog();
        // Id 3 was never declared, 999 is out of table range.
        assert!(cat.is_transparent(3));
        assert!(cat.is_transparent(999));
        assert_eq!(cat.props(999), &BlockProps::neutral());
        assert_eq!(cat.name(999), "");
    }

    #[test]
    fn declared_blocks_resolve_both_ways() {
        let cat = catalog();
        assert_eq!(cat.id("stone"), Some(1));
        assert_eq!(cat.name(1), "stone");
        assert!(!cat.is_transparent(1));
        assert!(cat.is_transparent(4));
        assert_eq!(cat.id_or_air("nope"), 0);
    }
}
