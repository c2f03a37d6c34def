//! The worker core: message handling, chunk caching, edit propagation.
//!
//! A worker processes one request at a time to completion; the host gets
//! parallelism by running several workers, each owning its own catalogue,
//! noise stack and chunk storage. Responses for a chunk key therefore keep
//! request order, and no locking exists anywhere in the crate.

pub mod protocol;

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::biome::{Biome, BiomeAdjacency, BiomeRegistry};
use crate::block::BlockCatalog;
use crate::chunk::mesher::{self, MesherConfig};
use crate::chunk::{Chunk, ChunkStore, GeometryData, Neighborhood};
use crate::terrain::{StructureRegistry, TerrainGenerator, TerrainTuning};

pub use protocol::{NeighborPayload, Request, Response, WorldConstants};

/// Worker start-up options, surfaced as binary flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerOptions {
    /// Load the built-in biome set when `init` carries none, instead of
    /// degrading to the lean generator.
    pub builtin_biomes: bool,
    /// Show faces at unknown seams instead of culling them.
    pub show_unknown_seams: bool,
}

struct WorkerState {
    chunk_size: usize,
    world_height: usize,
    catalog: BlockCatalog,
    terrain: TerrainGenerator,
    store: ChunkStore,
}

/// A single worker instance. Feed it [`Request`]s, collect [`Response`]s.
pub struct Worker {
    state: Option<WorkerState>,
    options: WorkerOptions,
    mesher: MesherConfig,
}

impl Worker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(WorkerOptions::default())
    }

    #[must_use]
    pub fn with_options(options: WorkerOptions) -> Self {
        Self {
            state: None,
            options,
            mesher: MesherConfig {
                cull_unknown_seams: !options.show_unknown_seams,
            },
        }
    }

    /// Whether `init` (or an inline-constants request) has been processed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Handle one raw message line; unknown or malformed input is ignored.
    pub fn handle_line(&mut self, line: &str) -> Vec<String> {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                debug!("ignoring unparseable message: {err}");
                return Vec::new();
            }
        };
        self.handle(request)
            .into_iter()
            .filter_map(|response| match serde_json::to_string(&response) {
                Ok(json) => Some(json),
                Err(err) => {
                    warn!("failed to serialize response: {err}");
                    None
                }
            })
            .collect()
    }

    /// Handle one request, producing zero or more responses in emit order.
    pub fn handle(&mut self, request: Request) -> Vec<Response> {
        match request {
            Request::Init { constants, seed } => {
                self.init(&constants, seed);
                vec![Response::initialized()]
            }
            Request::RequestChunk {
                cx,
                cz,
                request_geometry,
                constants,
                seed,
            } => {
                if self.state.is_none() {
                    if let Some(constants) = constants {
                        self.init(&constants, seed.unwrap_or(0));
                    } else {
                        warn!("requestChunk before init; dropping ({cx}, {cz})");
                        return Vec::new();
                    }
                }
                self.request_chunk(cx, cz, request_geometry)
            }
            Request::UpdateChunk {
                cx,
                cz,
                modified_chunk,
                neighbors,
                modified_positions,
            } => {
                // Delta positions are accepted but full meshes are posted
                // until the host grows a partial-buffer merge path.
                let _ = modified_positions;
                self.update_chunk(cx, cz, modified_chunk, neighbors)
            }
        }
    }

    fn init(&mut self, constants: &WorldConstants, seed: u64) {
        let catalog = if constants.block_types.is_empty() {
            let defs: Vec<crate::block::BlockDef> =
                ron::from_str(include_str!("../../data/blocks.ron"))
                    .expect("embedded data/blocks.ron parses");
            BlockCatalog::from_defs(&defs)
        } else {
            BlockCatalog::new(&constants.block_types, &constants.block_colors)
        };

        let registry = Self::biome_registry(constants, self.options.builtin_biomes);
        let structures = match &constants.structure_generators {
            Some(names) => StructureRegistry::with_enabled(names),
            None => StructureRegistry::builtin(),
        };

        #[allow(clippy::cast_possible_wrap)]
        let max_y = constants.world_height.saturating_sub(1) as i32;
        let tuning = TerrainTuning::resolve(
            constants.sea_level,
            max_y,
            constants.terrain_bounds,
            constants.noise_config,
            constants.geological_formations,
        );

        let terrain = TerrainGenerator::new(
            seed,
            constants.chunk_size,
            constants.world_height,
            constants.biome_scale,
            tuning,
            registry,
            structures,
        );

        info!(
            "worker initialized: seed {seed}, chunk {size}x{height}, {blocks} block ids, {mode}",
            size = constants.chunk_size,
            height = constants.world_height,
            blocks = catalog.len(),
            mode = if terrain.has_biomes() {
                "biome terrain"
            } else {
                "simple terrain"
            },
        );

        self.state = Some(WorkerState {
            chunk_size: constants.chunk_size,
            world_height: constants.world_height,
            catalog,
            terrain,
            store: ChunkStore::new(),
        });
    }

    fn biome_registry(constants: &WorldConstants, builtin: bool) -> Option<BiomeRegistry> {
        let adjacency = constants
            .biome_adjacency
            .as_ref()
            .map_or_else(BiomeAdjacency::default, BiomeAdjacency::new);

        match &constants.biomes {
            Some(map) if !map.is_empty() => {
                let biomes = map
                    .iter()
                    .map(|(name, biome)| {
                        // The map key is the biome's identity; an inline
                        // `name` field never overrides it.
                        let mut biome = biome.clone();
                        biome.name.clone_from(name);
                        biome
                    })
                    .collect();
                Some(BiomeRegistry::new(biomes, adjacency))
            }
            _ if builtin => {
                let defaults: Vec<Biome> = BiomeRegistry::builtin().all().to_vec();
                Some(BiomeRegistry::new(defaults, adjacency))
            }
            _ => None,
        }
    }

    fn request_chunk(&mut self, cx: i32, cz: i32, request_geometry: bool) -> Vec<Response> {
        let state = self.state.as_mut().expect("initialized before requests");

        if state.store.contains(cx, cz) {
            let geometry = request_geometry.then(|| {
                let chunk = state.store.get(cx, cz).expect("checked above");
                let hood = Neighborhood::from_store(&state.store, cx, cz);
                mesher::build_geometry(chunk, &state.catalog, &hood, &self.mesher)
            });
            let chunk = state.store.get(cx, cz).expect("checked above");
            return vec![Response::Chunk {
                cx,
                cz,
                chunk_data: Some(chunk.blocks().to_vec()),
                geometry_data: geometry,
            }];
        }

        let generated = state.terrain.generate_chunk_data(cx, cz, &state.catalog);
        state.store.insert(generated);

        let mut responses = Vec::new();
        {
            let chunk = state.store.get(cx, cz).expect("just inserted");
            let hood = Neighborhood::from_store(&state.store, cx, cz);
            let geometry = mesher::build_geometry(chunk, &state.catalog, &hood, &self.mesher);
            responses.push(Response::Chunk {
                cx,
                cz,
                chunk_data: Some(chunk.blocks().to_vec()),
                geometry_data: Some(geometry),
            });
        }

        // The fresh chunk turns its neighbours' unknown seams into known
        // ones, so every cached neighbour gets a re-mesh.
        for (nx, nz) in [(cx - 1, cz), (cx + 1, cz), (cx, cz - 1), (cx, cz + 1)] {
            if let Some(geometry) = Self::mesh_stored(state, &self.mesher, nx, nz) {
                responses.push(Response::chunk_updated(nx, nz, geometry));
            }
        }
        responses
    }

    fn update_chunk(
        &mut self,
        cx: i32,
        cz: i32,
        modified_chunk: Vec<crate::block::BlockId>,
        neighbors: Option<NeighborPayload>,
    ) -> Vec<Response> {
        let Some(state) = self.state.as_mut() else {
            warn!("updateChunk before init; dropping ({cx}, {cz})");
            return Vec::new();
        };

        let incoming = Chunk::from_blocks(
            cx,
            cz,
            state.chunk_size,
            state.world_height,
            modified_chunk,
        );

        // Which seams actually changed decides which neighbours re-mesh.
        let size = state.chunk_size;
        let seams_changed = match state.store.get(cx, cz) {
            Some(old) => [
                old.plane_differs(&incoming, true, 0),        // left  (x = 0)
                old.plane_differs(&incoming, true, size - 1), // right (x = size-1)
                old.plane_differs(&incoming, false, 0),       // back  (z = 0)
                old.plane_differs(&incoming, false, size - 1), // front (z = size-1)
            ],
            // No previous volume to diff against: assume every seam moved.
            None => [true; 4],
        };

        state.store.insert(incoming);

        let snapshots = neighbors.unwrap_or_default();
        let snapshot_chunks = SnapshotChunks::build(&snapshots, cx, cz, size, state.world_height);

        let mut responses = Vec::new();
        {
            let chunk = state.store.get(cx, cz).expect("just inserted");
            let hood = snapshot_chunks.neighborhood(&state.store, cx, cz);
            let geometry = mesher::build_geometry(chunk, &state.catalog, &hood, &self.mesher);
            responses.push(Response::chunk_updated(cx, cz, geometry));
        }

        let neighbours = [
            (cx - 1, cz),
            (cx + 1, cz),
            (cx, cz - 1),
            (cx, cz + 1),
        ];
        for (changed, (nx, nz)) in seams_changed.into_iter().zip(neighbours) {
            if !changed {
                continue;
            }
            if let Some(geometry) = Self::mesh_stored(state, &self.mesher, nx, nz) {
                responses.push(Response::chunk_updated(nx, nz, geometry));
            }
        }
        responses
    }

    /// Mesh a stored chunk against the store's own neighbourhood. `None`
    /// when the chunk is not cached.
    fn mesh_stored(
        state: &WorkerState,
        config: &MesherConfig,
        cx: i32,
        cz: i32,
    ) -> Option<GeometryData> {
        let chunk = state.store.get(cx, cz)?;
        let hood = Neighborhood::from_store(&state.store, cx, cz);
        Some(mesher::build_geometry(chunk, &state.catalog, &hood, config))
    }

    /// Stored chunk count, exposed for diagnostics and tests.
    #[must_use]
    pub fn cached_chunks(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.store.len())
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned per-request neighbour snapshots, converted from the payload.
struct SnapshotChunks {
    left: Option<Chunk>,
    right: Option<Chunk>,
    front: Option<Chunk>,
    back: Option<Chunk>,
}

impl SnapshotChunks {
    fn build(payload: &NeighborPayload, cx: i32, cz: i32, size: usize, height: usize) -> Self {
        let convert = |blocks: &Option<Vec<crate::block::BlockId>>, ncx: i32, ncz: i32| {
            blocks
                .as_ref()
                .map(|b| Chunk::from_blocks(ncx, ncz, size, height, b.clone()))
        };
        Self {
            left: convert(&payload.left, cx - 1, cz),
            right: convert(&payload.right, cx + 1, cz),
            front: convert(&payload.front, cx, cz + 1),
            back: convert(&payload.back, cx, cz - 1),
        }
    }

    /// Request snapshots take precedence; the store fills the gaps.
    fn neighborhood<'a>(&'a self, store: &'a ChunkStore, cx: i32, cz: i32) -> Neighborhood<'a> {
        Neighborhood {
            left: self.left.as_ref().or_else(|| store.get(cx - 1, cz)),
            right: self.right.as_ref().or_else(|| store.get(cx + 1, cz)),
            front: self.front.as_ref().or_else(|| store.get(cx, cz + 1)),
            back: self.back.as_ref().or_else(|| store.get(cx, cz - 1)),
        }
    }
}

/// Convenience used by the binary and tests: build `init` constants from
/// plain maps.
#[must_use]
pub fn constants_from_parts(
    chunk_size: usize,
    world_height: usize,
    sea_level: i32,
    block_types: HashMap<String, crate::block::BlockId>,
    block_colors: HashMap<String, crate::block::BlockProps>,
) -> WorldConstants {
    let raw = serde_json::json!({
        "CHUNK_SIZE": chunk_size,
        "WORLD_HEIGHT": world_height,
        "SEA_LEVEL": sea_level,
    });
    let mut constants: WorldConstants =
        serde_json::from_value(raw).expect("constant skeleton deserializes");
    constants.block_types = block_types;
    constants.block_colors = block_colors;
    constants
}
