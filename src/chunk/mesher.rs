//! The face-culling cube mesher.
//!
//! Scans a chunk volume and emits one quad per visible block face, culling
//! faces whose neighbour occludes them. Neighbour cells across a horizontal
//! seam come from the per-request chunk snapshots; when a seam's chunk is
//! not available the face is culled (the host re-requests once the
//! neighbour arrives, so a hidden face is temporary while a shown one would
//! have to be retracted).
//!
//! Output is split into three streams so the host can bind pipelines once
//! per stream: opaque untextured, transparent untextured (both vertex
//! coloured), and one group per (block, face-override) pair for textured
//! blocks. Vertex positions are in world space; indices are `u16` whenever
//! the group stays under the 16-bit limit.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use serde::Serialize;

use super::{Chunk, Neighborhood};
use crate::block::{BlockCatalog, BlockId, RenderClass, Rgb, blocks};

/// Meshing policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct MesherConfig {
    /// Cull faces at seams whose neighbour chunk is unknown. On by default;
    /// turning it off shows provisional faces instead.
    pub cull_unknown_seams: bool,
}

impl Default for MesherConfig {
    fn default() -> Self {
        Self {
            cull_unknown_seams: true,
        }
    }
}

/// The six cube faces in the engine's canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    /// +z
    Front,
    /// -z
    Back,
    /// +x
    Right,
    /// -x
    Left,
    /// +y
    Top,
    /// -y
    Bottom,
}

pub const FACES: [Face; 6] = [
    Face::Front,
    Face::Back,
    Face::Right,
    Face::Left,
    Face::Top,
    Face::Bottom,
];

impl Face {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
            Self::Right => "right",
            Self::Left => "left",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }

    #[must_use]
    pub fn delta(self) -> (i32, i32, i32) {
        match self {
            Self::Front => (0, 0, 1),
            Self::Back => (0, 0, -1),
            Self::Right => (1, 0, 0),
            Self::Left => (-1, 0, 0),
            Self::Top => (0, 1, 0),
            Self::Bottom => (0, -1, 0),
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn normal(self) -> [f32; 3] {
        let (dx, dy, dz) = self.delta();
        [dx as f32, dy as f32, dz as f32]
    }

    /// Unit-cube corner offsets, wound CCW as seen from outside the face.
    #[must_use]
    pub fn corners(self) -> [[f32; 3]; 4] {
        match self {
            Self::Front => [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]],
            Self::Back => [[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
            Self::Right => [[1.0, 0.0, 1.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0]],
            Self::Left => [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0]],
            Self::Top => [[0.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            Self::Bottom => [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
        }
    }

    fn texture_flag(self, props: &crate::block::BlockProps) -> bool {
        let t = &props.textures;
        match self {
            Self::Front => t.front,
            Self::Back => t.back,
            Self::Right => t.right,
            Self::Left => t.left,
            Self::Top => t.top,
            Self::Bottom => t.bottom,
        }
    }
}

const QUAD_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

/// Index buffer with the width chosen per group: `u16` while the group's
/// vertex count fits, `u32` beyond that.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices widened to `u32` regardless of storage.
    #[must_use]
    pub fn to_u32(&self) -> Vec<u32> {
        match self {
            Self::U16(v) => v.iter().map(|&i| u32::from(i)).collect(),
            Self::U32(v) => v.clone(),
        }
    }
}

/// One finished vertex stream. `colors` is empty for textured groups.
#[derive(Debug, Clone, Serialize)]
pub struct GeometryBuffers {
    pub vertices: Vec<f32>,
    pub indices: IndexData,
    pub uvs: Vec<f32>,
    pub colors: Vec<f32>,
    pub normals: Vec<f32>,
}

/// A textured output group for one (block, face-override) pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TexturedGroup {
    pub key: String,
    pub block_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_name: Option<String>,
    pub color: Rgb,
    pub vertices: Vec<f32>,
    pub indices: IndexData,
    pub uvs: Vec<f32>,
    pub normals: Vec<f32>,
}

/// The complete geometry payload for one chunk.
#[derive(Debug, Clone, Serialize)]
pub struct GeometryData {
    pub opaque: GeometryBuffers,
    pub transparent: GeometryBuffers,
    pub textured: Vec<TexturedGroup>,
}

/// Growable quad sink; finalised into [`GeometryBuffers`] once the chunk is
/// scanned.
#[derive(Default)]
pub(crate) struct QuadSink {
    vertices: Vec<f32>,
    uvs: Vec<f32>,
    colors: Vec<f32>,
    normals: Vec<f32>,
    indices: Vec<u32>,
}

impl QuadSink {
    /// Append a quad: 4 vertices, 4 UVs, 6 indices, a shared normal, and an
    /// optional per-vertex colour (untextured streams only).
    pub(crate) fn push_quad(
        &mut self,
        corners: &[[f32; 3]; 4],
        uvs: &[[f32; 2]; 4],
        normal: [f32; 3],
        color: Option<Rgb>,
    ) {
        #[allow(clippy::cast_possible_truncation)]
        let base = (self.vertices.len() / 3) as u32;

        for corner in corners {
            self.vertices.extend_from_slice(corner);
            self.normals.extend_from_slice(&normal);
        }
        for uv in uvs {
            self.uvs.extend_from_slice(uv);
        }
        if let Some(c) = color {
            for _ in 0..4 {
                self.colors.extend_from_slice(&[c.r, c.g, c.b]);
            }
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub(crate) fn finish(self) -> GeometryBuffers {
        let indices = narrow_indices(self.indices, self.vertices.len() / 3);
        GeometryBuffers {
            vertices: self.vertices,
            indices,
            uvs: self.uvs,
            colors: self.colors,
            normals: self.normals,
        }
    }
}

/// Pick the index width for a finished group.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn narrow_indices(indices: Vec<u32>, vertex_count: usize) -> IndexData {
    if vertex_count <= usize::from(u16::MAX) {
        IndexData::U16(indices.into_iter().map(|i| i as u16).collect())
    } else {
        IndexData::U32(indices)
    }
}

struct TexturedSink {
    block_name: String,
    face_name: Option<String>,
    color: Rgb,
    sink: QuadSink,
}

/// Build the full render geometry for a chunk: cube faces here, smooth
/// `mesh`-classed surfaces from [`super::surface::build_mesh_surface`],
/// merged into one payload.
#[must_use]
pub fn build_geometry(
    chunk: &Chunk,
    catalog: &BlockCatalog,
    neighborhood: &Neighborhood,
    config: &MesherConfig,
) -> GeometryData {
    build_geometry_delta(chunk, catalog, neighborhood, config, None)
}

/// Like [`build_geometry`], optionally restricted to the 3x3x3
/// neighbourhoods of a set of modified cells. Partial output is only useful
/// to a host that can merge buffers, so the worker currently always passes
/// `None`.
#[must_use]
pub fn build_geometry_delta(
    chunk: &Chunk,
    catalog: &BlockCatalog,
    neighborhood: &Neighborhood,
    config: &MesherConfig,
    modified: Option<&[(i32, i32, i32)]>,
) -> GeometryData {
    let mut opaque = QuadSink::default();
    let mut transparent = QuadSink::default();
    // BTreeMap so group order is independent of insertion order.
    let mut textured: BTreeMap<String, TexturedSink> = BTreeMap::new();

    let mask = modified.map(|cells| {
        let mut set = FxHashSet::default();
        for &(mx, my, mz) in cells {
            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        set.insert((mx + dx, my + dy, mz + dz));
                    }
                }
            }
        }
        set
    });

    let size = chunk.size();
    for x in 0..size {
        for z in 0..size {
            let top = chunk.top_y(x, z);
            if top < 0 {
                continue;
            }
            #[allow(clippy::cast_sign_loss)]
            for y in 0..=(top as usize) {
                if let Some(mask) = &mask {
                    #[allow(clippy::cast_possible_wrap)]
                    if !mask.contains(&(x as i32, y as i32, z as i32)) {
                        continue;
                    }
                }

                let id = chunk.get(x, y, z);
                if id == blocks::AIR || catalog.render_class(id) != RenderClass::Solid {
                    continue;
                }
                mesh_cell(
                    chunk,
                    catalog,
                    neighborhood,
                    config,
                    (x, y, z),
                    id,
                    &mut opaque,
                    &mut transparent,
                    &mut textured,
                );
            }
        }
    }

    let mut surface_groups = super::surface::build_mesh_surface(chunk, catalog, neighborhood);

    let mut groups: Vec<TexturedGroup> = textured
        .into_iter()
        .filter(|(_, sink)| !sink.sink.is_empty())
        .map(|(key, sink)| {
            let buffers = sink.sink.finish();
            TexturedGroup {
                key,
                block_name: sink.block_name,
                face_name: sink.face_name,
                color: sink.color,
                vertices: buffers.vertices,
                indices: buffers.indices,
                uvs: buffers.uvs,
                normals: buffers.normals,
            }
        })
        .collect();
    groups.append(&mut surface_groups);

    GeometryData {
        opaque: opaque.finish(),
        transparent: transparent.finish(),
        textured: groups,
    }
}

#[allow(clippy::too_many_arguments)]
fn mesh_cell(
    chunk: &Chunk,
    catalog: &BlockCatalog,
    neighborhood: &Neighborhood,
    config: &MesherConfig,
    (x, y, z): (usize, usize, usize),
    id: BlockId,
    opaque: &mut QuadSink,
    transparent: &mut QuadSink,
    textured: &mut BTreeMap<String, TexturedSink>,
) {
    let props = catalog.props(id);
    let self_transparent = catalog.is_transparent(id);

    #[allow(clippy::cast_possible_wrap)]
    let (xi, yi, zi) = (x as i32, y as i32, z as i32);

    for face in FACES {
        let (dx, dy, dz) = face.delta();
        let neighbor = neighborhood.sample(chunk, xi + dx, yi + dy, zi + dz);

        let visible = match neighbor {
            // Unknown seam: the face is culled by default; the host
            // re-requests once the neighbour chunk exists.
            None => !config.cull_unknown_seams,
            Some(nid) => face_visible(catalog, id, self_transparent, nid),
        };
        if !visible {
            continue;
        }

        // World-space quad corners.
        #[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
        let origin = [
            (chunk.cx * chunk.size() as i32 + xi) as f32,
            yi as f32,
            (chunk.cz * chunk.size() as i32 + zi) as f32,
        ];
        let mut corners = face.corners();
        for corner in &mut corners {
            corner[0] += origin[0];
            corner[1] += origin[1];
            corner[2] += origin[2];
        }

        let face_textured = face.texture_flag(props);
        if face_textured || props.default_texture {
            let block_name = catalog.name(id).to_string();
            let (key, face_name) = if face_textured {
                (format!("{}_{}", block_name, face.name()), Some(face.name().to_string()))
            } else {
                (block_name.clone(), None)
            };
            let entry = textured.entry(key).or_insert_with(|| TexturedSink {
                block_name,
                face_name,
                color: props.color,
                sink: QuadSink::default(),
            });
            entry.sink.push_quad(&corners, &QUAD_UVS, face.normal(), None);
        } else {
            let sink = if self_transparent { &mut *transparent } else { &mut *opaque };
            sink.push_quad(&corners, &QUAD_UVS, face.normal(), Some(props.color));
        }
    }
}

/// The culling truth table. `id` is a non-air cell, `nid` its neighbour.
fn face_visible(catalog: &BlockCatalog, id: BlockId, self_transparent: bool, nid: BlockId) -> bool {
    if nid == blocks::AIR {
        return true;
    }
    // Non-solid render classes never occlude: a plant model or a smooth
    // surface block must not punch holes into adjacent cubes.
    if catalog.render_class(nid) != RenderClass::Solid {
        return true;
    }
    let neighbor_transparent = catalog.is_transparent(nid);
    if self_transparent {
        // Transparent cells hide only the interface against their own kind.
        nid != id
    } else {
        // Solid cells are hidden by solid neighbours, shown against
        // transparent ones.
        neighbor_transparent
    }
}
