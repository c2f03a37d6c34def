//! Chunk volumes, the per-worker chunk store, and cross-seam access.
//!
//! A chunk is a dense `CHUNK_SIZE x WORLD_HEIGHT x CHUNK_SIZE` block volume
//! at integer coordinates `(cx, cz)`. The volume is a flat buffer in
//! `[x][y][z]` order so a whole column is contiguous, and each chunk keeps a
//! height-map side table (topmost non-air y per column) that generation
//! writes once and the mesher uses to stop scanning sky.

pub mod mesher;
pub mod surface;

use rustc_hash::FxHashMap;

use crate::block::{BlockId, blocks};

pub use mesher::{GeometryBuffers, GeometryData, IndexData, MesherConfig, TexturedGroup};

/// A dense block volume with its chunk coordinates and column height map.
#[derive(Clone)]
pub struct Chunk {
    pub cx: i32,
    pub cz: i32,
    size: usize,
    height: usize,
    blocks: Vec<BlockId>,
    height_map: Vec<i32>,
}

impl Chunk {
    /// An all-air chunk of the given dimensions.
    #[must_use]
    pub fn new(cx: i32, cz: i32, size: usize, height: usize) -> Self {
        Self {
            cx,
            cz,
            size,
            height,
            blocks: vec![blocks::AIR; size * size * height],
            height_map: vec![-1; size * size],
        }
    }

    /// Wrap a host-provided flat volume, rebuilding the height map. A
    /// payload of the wrong length is padded with air / truncated rather
    /// than rejected.
    #[must_use]
    pub fn from_blocks(cx: i32, cz: i32, size: usize, height: usize, mut blocks: Vec<BlockId>) -> Self {
        blocks.resize(size * size * height, blocks::AIR);
        let mut chunk = Self {
            cx,
            cz,
            size,
            height,
            blocks,
            height_map: vec![-1; size * size],
        };
        chunk.rebuild_height_map();
        chunk
    }

    #[inline]
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.height + y) * self.size + z
    }

    #[inline]
    fn column(&self, x: usize, z: usize) -> usize {
        x * self.size + z
    }

    /// Block at local coordinates; air when out of bounds.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> BlockId {
        if x >= self.size || y >= self.height || z >= self.size {
            blocks::AIR
        } else {
            self.blocks[self.index(x, y, z)]
        }
    }

    /// Write a block, keeping the column height map current.
    pub fn set(&mut self, x: usize, y: usize, z: usize, block: BlockId) {
        if x >= self.size || y >= self.height || z >= self.size {
            return;
        }
        let idx = self.index(x, y, z);
        self.blocks[idx] = block;

        let col = self.column(x, z);
        #[allow(clippy::cast_possible_wrap)]
        let y_i = y as i32;
        if block != blocks::AIR {
            if y_i > self.height_map[col] {
                self.height_map[col] = y_i;
            }
        } else if y_i == self.height_map[col] {
            // The old column top was cleared; scan down for the new one.
            let mut top = -1;
            for yy in (0..y).rev() {
                if self.blocks[self.index(x, yy, z)] != blocks::AIR {
                    #[allow(clippy::cast_possible_wrap)]
                    {
                        top = yy as i32;
                    }
                    break;
                }
            }
            self.height_map[col] = top;
        }
    }

    /// Topmost non-air y of a column, or -1 when the column is empty.
    #[inline]
    #[must_use]
    pub fn top_y(&self, x: usize, z: usize) -> i32 {
        if x >= self.size || z >= self.size {
            -1
        } else {
            self.height_map[self.column(x, z)]
        }
    }

    fn rebuild_height_map(&mut self) {
        for x in 0..self.size {
            for z in 0..self.size {
                let mut top = -1;
                for y in (0..self.height).rev() {
                    if self.blocks[self.index(x, y, z)] != blocks::AIR {
                        #[allow(clippy::cast_possible_wrap)]
                        {
                            top = y as i32;
                        }
                        break;
                    }
                }
                let idx = self.column(x, z);
                self.height_map[idx] = top;
            }
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn key(&self) -> (i32, i32) {
        (self.cx, self.cz)
    }

    /// The flat volume in `[x][y][z]` order.
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Compare one boundary plane against another chunk's same plane.
    /// `axis_x` selects the x planes, `at` the fixed coordinate.
    #[must_use]
    pub fn plane_differs(&self, other: &Self, axis_x: bool, at: usize) -> bool {
        if self.size != other.size || self.height != other.height {
            return true;
        }
        for a in 0..self.size {
            for y in 0..self.height {
                let (sx, sz) = if axis_x { (at, a) } else { (a, at) };
                if self.get(sx, y, sz) != other.get(sx, y, sz) {
                    return true;
                }
            }
        }
        false
    }
}

/// Per-worker chunk storage keyed by `(cx, cz)`.
#[derive(Default)]
pub struct ChunkStore {
    chunks: FxHashMap<(i32, i32), Chunk>,
}

impl ChunkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, cx: i32, cz: i32) -> Option<&Chunk> {
        self.chunks.get(&(cx, cz))
    }

    #[must_use]
    pub fn contains(&self, cx: i32, cz: i32) -> bool {
        self.chunks.contains_key(&(cx, cz))
    }

    pub fn insert(&mut self, chunk: Chunk) -> Option<Chunk> {
        self.chunks.insert(chunk.key(), chunk)
    }

    pub fn remove(&mut self, cx: i32, cz: i32) -> Option<Chunk> {
        self.chunks.remove(&(cx, cz))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Snapshot view of the four horizontal neighbours of a chunk, used by the
/// meshers to see across seams. A missing entry means the seam is unknown.
#[derive(Default, Clone, Copy)]
pub struct Neighborhood<'a> {
    /// Chunk at `(cx - 1, cz)`.
    pub left: Option<&'a Chunk>,
    /// Chunk at `(cx + 1, cz)`.
    pub right: Option<&'a Chunk>,
    /// Chunk at `(cx, cz + 1)`.
    pub front: Option<&'a Chunk>,
    /// Chunk at `(cx, cz - 1)`.
    pub back: Option<&'a Chunk>,
}

impl<'a> Neighborhood<'a> {
    /// Collect the stored neighbours of `(cx, cz)`.
    #[must_use]
    pub fn from_store(store: &'a ChunkStore, cx: i32, cz: i32) -> Self {
        Self {
            left: store.get(cx - 1, cz),
            right: store.get(cx + 1, cz),
            front: store.get(cx, cz + 1),
            back: store.get(cx, cz - 1),
        }
    }

    /// Resolve a possibly out-of-chunk local coordinate against the chunk or
    /// one of its snapshots.
    ///
    /// Returns `None` when the covering chunk is not available (unknown
    /// seam, or the diagonal chunk which is never part of the snapshot set).
    /// Vertical out-of-range resolves to air.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn sample(&self, chunk: &Chunk, x: i32, y: i32, z: i32) -> Option<BlockId> {
        #[allow(clippy::cast_possible_wrap)]
        let size = chunk.size() as i32;
        #[allow(clippy::cast_possible_wrap)]
        let height = chunk.height() as i32;

        if y < 0 || y >= height {
            return Some(blocks::AIR);
        }

        let x_out = x < 0 || x >= size;
        let z_out = z < 0 || z >= size;
        match (x_out, z_out) {
            (false, false) => Some(chunk.get(x as usize, y as usize, z as usize)),
            (true, true) => None,
            (true, false) => {
                let (neighbor, lx) = if x < 0 {
                    (self.left, x + size)
                } else {
                    (self.right, x - size)
                };
                neighbor.map(|c| c.get(lx as usize, y as usize, z as usize))
            }
            (false, true) => {
                let (neighbor, lz) = if z < 0 {
                    (self.back, z + size)
                } else {
                    (self.front, z - size)
                };
                neighbor.map(|c| c.get(x as usize, y as usize, lz as usize))
            }
        }
    }
}
