//! The worker's message schema.
//!
//! Requests arrive as tagged JSON objects; responses mirror the host's
//! expected shapes exactly: a fresh chunk is an untagged `{cx, cz,
//! chunkData?, geometryData}` object, re-meshes and the init ack carry a
//! `type` discriminator. Geometry buffers are moved into the response when
//! it is built, which is the ownership hand-off: the worker keeps nothing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::biome::{Biome, TransitionPolicy};
use crate::block::{BlockId, BlockProps};
use crate::chunk::GeometryData;
use crate::terrain::{FormationTuning, NoiseTuning, TerrainBounds};

/// World configuration delivered by `init` (or inline with a back-compat
/// `requestChunk`). Field names match the host's constant table.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldConstants {
    #[serde(rename = "CHUNK_SIZE", default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(rename = "WORLD_HEIGHT", default = "default_world_height")]
    pub world_height: usize,
    #[serde(rename = "BLOCK_TYPES", default)]
    pub block_types: HashMap<String, BlockId>,
    #[serde(rename = "SEA_LEVEL", default = "default_sea_level")]
    pub sea_level: i32,
    #[serde(rename = "blockColors", default)]
    pub block_colors: HashMap<String, BlockProps>,
    #[serde(rename = "BIOMES", default)]
    pub biomes: Option<HashMap<String, Biome>>,
    #[serde(rename = "BIOME_ADJACENCY", default)]
    pub biome_adjacency: Option<HashMap<String, HashMap<String, TransitionPolicy>>>,
    #[serde(rename = "GEOLOGICAL_FORMATIONS", default)]
    pub geological_formations: Option<FormationTuning>,
    #[serde(rename = "TERRAIN_BOUNDS", default)]
    pub terrain_bounds: Option<TerrainBounds>,
    #[serde(rename = "NOISE_CONFIG", default)]
    pub noise_config: Option<NoiseTuning>,
    #[serde(rename = "StructureGenerators", default)]
    pub structure_generators: Option<Vec<String>>,
    #[serde(rename = "biomeScale", default = "default_biome_scale")]
    pub biome_scale: f64,
}

fn default_chunk_size() -> usize {
    16
}

fn default_world_height() -> usize {
    128
}

fn default_sea_level() -> i32 {
    64
}

fn default_biome_scale() -> f64 {
    1.0
}

fn default_request_geometry() -> bool {
    true
}

/// Per-request neighbour chunk snapshots for seam-aware meshing, as flat
/// volumes in the same layout as `chunkData`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NeighborPayload {
    #[serde(default)]
    pub left: Option<Vec<BlockId>>,
    #[serde(default)]
    pub right: Option<Vec<BlockId>>,
    #[serde(default)]
    pub front: Option<Vec<BlockId>>,
    #[serde(default)]
    pub back: Option<Vec<BlockId>>,
}

/// Ingress messages.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    Init {
        constants: Box<WorldConstants>,
        seed: u64,
    },
    #[serde(rename_all = "camelCase")]
    RequestChunk {
        cx: i32,
        cz: i32,
        #[serde(default = "default_request_geometry")]
        request_geometry: bool,
        /// Back-compat: constants inline with the first chunk request.
        #[serde(default)]
        constants: Option<Box<WorldConstants>>,
        #[serde(default)]
        seed: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    UpdateChunk {
        cx: i32,
        cz: i32,
        modified_chunk: Vec<BlockId>,
        #[serde(default)]
        neighbors: Option<NeighborPayload>,
        /// Cells the edit touched; reserved for delta meshing, which stays
        /// off until the host can merge partial buffers.
        #[serde(default)]
        modified_positions: Option<Vec<[i32; 3]>>,
    },
}

/// Literal `type` values of the tagged egress messages.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum ResponseKind {
    #[serde(rename = "initialized")]
    Initialized,
    #[serde(rename = "chunkUpdated")]
    ChunkUpdated,
}

/// Egress messages.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Initialized {
        #[serde(rename = "type")]
        kind: ResponseKind,
    },
    #[serde(rename_all = "camelCase")]
    Chunk {
        cx: i32,
        cz: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        chunk_data: Option<Vec<BlockId>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        geometry_data: Option<GeometryData>,
    },
    #[serde(rename_all = "camelCase")]
    ChunkUpdated {
        #[serde(rename = "type")]
        kind: ResponseKind,
        cx: i32,
        cz: i32,
        geometry_data: GeometryData,
    },
}

impl Response {
    #[must_use]
    pub fn initialized() -> Self {
        Self::Initialized {
            kind: ResponseKind::Initialized,
        }
    }

    #[must_use]
    pub fn chunk_updated(cx: i32, cz: i32, geometry_data: GeometryData) -> Self {
        Self::ChunkUpdated {
            kind: ResponseKind::ChunkUpdated,
            cx,
            cz,
            geometry_data,
        }
    }
}
