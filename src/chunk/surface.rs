//! Smooth surface builder for `mesh`-classed blocks.
//!
//! Blocks classed `mesh` (sand dunes, snow drifts) do not render as cubes.
//! Instead every column topped by such a block gets a single quad whose four
//! corners sit at the interpolated heights of the four surrounding columns,
//! producing continuous sloped terrain. Corner columns are sampled across
//! seams through the neighbourhood snapshots; a corner with no mesh column
//! borrows the nearest available corner height so the surface never tears.

use std::collections::BTreeMap;

use super::mesher::{QuadSink, TexturedGroup};
use super::{Chunk, Neighborhood};
use crate::block::{BlockCatalog, BlockId, RenderClass};

/// UVs for the surface quad, in corner order
/// `(x,z) (x,z+1) (x+1,z+1) (x+1,z)`.
const SURFACE_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];

struct SurfaceSink {
    block_name: String,
    color: crate::block::Rgb,
    sink: QuadSink,
}

/// Build the per-column smooth surface groups for a chunk, one group per
/// mesh block name, each keyed with the `top` face.
#[must_use]
pub fn build_mesh_surface(
    chunk: &Chunk,
    catalog: &BlockCatalog,
    neighborhood: &Neighborhood,
) -> Vec<TexturedGroup> {
    let mut groups: BTreeMap<BlockId, SurfaceSink> = BTreeMap::new();
    let size = chunk.size();

    for x in 0..size {
        for z in 0..size {
            #[allow(clippy::cast_possible_wrap)]
            let (xi, zi) = (x as i32, z as i32);

            // Corner columns in quad order; the cell owns the quad only when
            // its own column is mesh-topped.
            let corners = [
                top_mesh_column(chunk, catalog, neighborhood, xi, zi),
                top_mesh_column(chunk, catalog, neighborhood, xi, zi + 1),
                top_mesh_column(chunk, catalog, neighborhood, xi + 1, zi + 1),
                top_mesh_column(chunk, catalog, neighborhood, xi + 1, zi),
            ];
            if corners[0].is_none() {
                continue;
            }

            let heights = resolve_heights(&corners);
            let majority = majority_block(&corners);

            #[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
            let wx = (chunk.cx * size as i32 + xi) as f32;
            #[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
            let wz = (chunk.cz * size as i32 + zi) as f32;

            // Quad corners at surface height (top face of the corner block).
            #[allow(clippy::cast_precision_loss)]
            let quad = [
                [wx, (heights[0] + 1) as f32, wz],
                [wx, (heights[1] + 1) as f32, wz + 1.0],
                [wx + 1.0, (heights[2] + 1) as f32, wz + 1.0],
                [wx + 1.0, (heights[3] + 1) as f32, wz],
            ];
            let normal = quad_normal(&quad);

            let entry = groups.entry(majority).or_insert_with(|| {
                let props = catalog.props(majority);
                SurfaceSink {
                    block_name: catalog.name(majority).to_string(),
                    color: props.color,
                    sink: QuadSink::default(),
                }
            });
            entry.sink.push_quad(&quad, &SURFACE_UVS, normal, None);
        }
    }

    groups
        .into_values()
        .map(|group| {
            let buffers = group.sink.finish();
            TexturedGroup {
                key: format!("{}_top", group.block_name),
                block_name: group.block_name,
                face_name: Some("top".to_string()),
                color: group.color,
                vertices: buffers.vertices,
                indices: buffers.indices,
                uvs: buffers.uvs,
                normals: buffers.normals,
            }
        })
        .collect()
}

/// Topmost mesh-classed block of a column, local coordinates possibly
/// reaching into a neighbour chunk. `None` when the column is unknown or
/// has no mesh block.
fn top_mesh_column(
    chunk: &Chunk,
    catalog: &BlockCatalog,
    neighborhood: &Neighborhood,
    x: i32,
    z: i32,
) -> Option<(i32, BlockId)> {
    #[allow(clippy::cast_possible_wrap)]
    let size = chunk.size() as i32;

    let (target, lx, lz) = if (0..size).contains(&x) && (0..size).contains(&z) {
        (Some(chunk), x, z)
    } else if x >= size && (0..size).contains(&z) {
        (neighborhood.right, x - size, z)
    } else if x < 0 && (0..size).contains(&z) {
        (neighborhood.left, x + size, z)
    } else if z >= size && (0..size).contains(&x) {
        (neighborhood.front, x, z - size)
    } else if z < 0 && (0..size).contains(&x) {
        (neighborhood.back, x, z + size)
    } else {
        // Diagonal chunk; not part of the snapshot set.
        (None, 0, 0)
    };
    let target = target?;

    #[allow(clippy::cast_sign_loss)]
    let (lx, lz) = (lx as usize, lz as usize);
    let top = target.top_y(lx, lz);
    if top < 0 {
        return None;
    }
    #[allow(clippy::cast_sign_loss)]
    for y in (0..=top as usize).rev() {
        let id = target.get(lx, y, lz);
        if catalog.render_class(id) == RenderClass::Mesh {
            #[allow(clippy::cast_possible_wrap)]
            return Some((y as i32, id));
        }
    }
    None
}

/// Fill missing corner heights from the nearest available corner, falling
/// back to 0 so the quad always exists.
fn resolve_heights(corners: &[Option<(i32, BlockId)>; 4]) -> [i32; 4] {
    // For each corner, the two adjacent corners first, the opposite last.
    const NEAREST: [[usize; 3]; 4] = [[1, 3, 2], [0, 2, 3], [1, 3, 0], [0, 2, 1]];

    std::array::from_fn(|i| {
        if let Some((h, _)) = corners[i] {
            return h;
        }
        NEAREST[i]
            .iter()
            .find_map(|&j| corners[j].map(|(h, _)| h))
            .unwrap_or(0)
    })
}

/// Majority block id across the corner columns, ties broken by the highest
/// corner.
fn majority_block(corners: &[Option<(i32, BlockId)>; 4]) -> BlockId {
    let mut tally: Vec<(BlockId, u32, i32)> = Vec::with_capacity(4);
    for &(height, id) in corners.iter().flatten() {
        if let Some(entry) = tally.iter_mut().find(|e| e.0 == id) {
            entry.1 += 1;
            entry.2 = entry.2.max(height);
        } else {
            tally.push((id, 1, height));
        }
    }
    tally
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)).then(b.0.cmp(&a.0)))
        .map_or(crate::block::blocks::AIR, |e| e.0)
}

/// Face normal of a (possibly non-planar) quad from its diagonals.
fn quad_normal(quad: &[[f32; 3]; 4]) -> [f32; 3] {
    let d1 = [
        quad[2][0] - quad[0][0],
        quad[2][1] - quad[0][1],
        quad[2][2] - quad[0][2],
    ];
    let d2 = [
        quad[3][0] - quad[1][0],
        quad[3][1] - quad[1][1],
        quad[3][2] - quad[1][2],
    ];
    let n = [
        d1[1] * d2[2] - d1[2] * d2[1],
        d1[2] * d2[0] - d1[0] * d2[2],
        d1[0] * d2[1] - d1[1] * d2[0],
    ];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > 1e-6 {
        [n[0] / len, n[1] / len, n[2] / len]
    } else {
        [0.0, 1.0, 0.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockProps;
    use crate::chunk::ChunkStore;
    use std::collections::HashMap;

    fn catalog() -> BlockCatalog {
        let mut types = HashMap::new();
        types.insert("air".to_string(), 0);
        types.insert("stone".to_string(), 1);
        types.insert("sand".to_string(), 5);

        let mut colors = HashMap::new();
        colors.insert("stone".to_string(), BlockProps::default());
        colors.insert(
            "sand".to_string(),
            BlockProps {
                render: RenderClass::Mesh,
                ..BlockProps::default()
            },
        );
        BlockCatalog::new(&types, &colors)
    }

    /// Fill a column with stone up to `top - 1` and a mesh block at `top`.
    fn mesh_column(chunk: &mut Chunk, x: usize, z: usize, top: usize) {
        for y in 0..top {
            chunk.set(x, y, z, 1);
        }
        chunk.set(x, top, z, 5);
    }

    #[test]
    fn sloped_corner_heights() {
        let cat = catalog();
        let mut chunk = Chunk::new(0, 0, 4, 32);
        // Corner heights 10 / 11 / 11 / 12 around cell (1, 1).
        mesh_column(&mut chunk, 1, 1, 10);
        mesh_column(&mut chunk, 1, 2, 11);
        mesh_column(&mut chunk, 2, 2, 12);
        mesh_column(&mut chunk, 2, 1, 11);

        let groups = build_mesh_surface(&chunk, &cat, &Neighborhood::default());
        let sand = groups.iter().find(|g| g.block_name == "sand").unwrap();

        // The quad owned by cell (1, 1) has y coordinates 11, 12, 13, 12.
        let quad: Vec<[f32; 3]> = sand
            .vertices
            .chunks(3)
            .map(|v| [v[0], v[1], v[2]])
            .filter(|v| v[0] >= 1.0 && v[0] <= 2.0 && v[2] >= 1.0 && v[2] <= 2.0)
            .collect();
        let cell_quad: Vec<f32> = quad.iter().map(|v| v[1]).collect();
        assert!(cell_quad.contains(&11.0));
        assert!(cell_quad.contains(&13.0));

        // Exact check: find the 4 vertices starting at (1, _, 1).
        let ys: Vec<f32> = sand
            .vertices
            .chunks(3)
            .collect::<Vec<_>>()
            .chunks(4)
            .find(|quad| quad[0][0] == 1.0 && quad[0][2] == 1.0)
            .unwrap()
            .iter()
            .map(|v| v[1])
            .collect();
        assert_eq!(ys, vec![11.0, 12.0, 13.0, 12.0]);
    }

    #[test]
    fn surface_group_shape() {
        let cat = catalog();
        let mut chunk = Chunk::new(0, 0, 4, 16);
        mesh_column(&mut chunk, 0, 0, 5);
        mesh_column(&mut chunk, 0, 1, 5);

        let groups = build_mesh_surface(&chunk, &cat, &Neighborhood::default());
        assert_eq!(groups.len(), 1);
        let g = &groups[0];
        assert_eq!(g.key, "sand_top");
        assert_eq!(g.face_name.as_deref(), Some("top"));
        let n = g.vertices.len() / 3;
        assert_eq!(g.uvs.len(), 2 * n);
        assert_eq!(g.normals.len(), 3 * n);
        for i in g.indices.to_u32() {
            assert!((i as usize) < n);
        }
    }

    #[test]
    fn flat_surface_has_up_normals() {
        let cat = catalog();
        let mut chunk = Chunk::new(0, 0, 4, 16);
        for x in 0..3 {
            for z in 0..3 {
                mesh_column(&mut chunk, x, z, 6);
            }
        }
        let groups = build_mesh_surface(&chunk, &cat, &Neighborhood::default());
        let g = &groups[0];
        for normal in g.normals.chunks(3) {
            assert!((normal[1] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn seam_corners_use_neighbor_chunks() {
        let cat = catalog();
        let size = 4;
        let mut center = Chunk::new(0, 0, size, 32);
        mesh_column(&mut center, size - 1, 0, 10);

        let mut right = Chunk::new(1, 0, size, 32);
        mesh_column(&mut right, 0, 0, 14);
        mesh_column(&mut right, 0, 1, 14);

        let mut store = ChunkStore::new();
        store.insert(right);
        let hood = Neighborhood::from_store(&store, 0, 0);

        let groups = build_mesh_surface(&center, &cat, &hood);
        let g = groups.iter().find(|g| g.block_name == "sand").unwrap();
        // The right-edge quad picks up the neighbour's 14-high columns.
        assert!(g.vertices.chunks(3).any(|v| (v[1] - 15.0).abs() < 1e-6));
    }

    #[test]
    fn missing_corners_fall_back_without_holes() {
        let cat = catalog();
        let mut chunk = Chunk::new(0, 0, 4, 16);
        mesh_column(&mut chunk, 2, 2, 8);

        let groups = build_mesh_surface(&chunk, &cat, &Neighborhood::default());
        let g = &groups[0];
        // A lone column still produces a full quad at its own height.
        assert_eq!(g.vertices.len() / 3, 4);
        for v in g.vertices.chunks(3) {
            assert!((v[1] - 9.0).abs() < 1e-6);
        }
    }
}
