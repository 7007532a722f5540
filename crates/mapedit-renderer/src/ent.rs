//! Point-Entity Proxies
//!
//! Entities without a brush model render as small solid cubes. Each cube
//! carries three prebuilt vertex buffers (normal fill, highlight fill, and
//! a highlight wireframe) plus its AABB for picking. Cubes are shared via
//! `Rc` so every entity of the same look reuses one mesh.

use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use mapedit_common::bspfile::BspMap;
use mapedit_common::entity::Entity;
use mapedit_common::math::{mat4_identity, mat4_translation, Mat4, Vec3, VEC3_ORIGIN};

/// Flat-colored vertex for entity cubes.
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
#[repr(C)]
pub struct ColorVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorVertex {
    fn new(pos: Vec3, color: [u8; 4]) -> ColorVertex {
        ColorVertex {
            x: pos[0],
            y: pos[1],
            z: pos[2],
            r: color[0],
            g: color[1],
            b: color[2],
            a: color[3],
        }
    }
}

/// Fill color of an unselected point entity.
pub const ENT_CUBE_COLOR: [u8; 4] = [255, 0, 255, 255];
/// Fill color of the selected point entity.
pub const ENT_SELECT_COLOR: [u8; 4] = [220, 0, 0, 255];
/// Wireframe color drawn over the selected point entity.
pub const ENT_WIREFRAME_COLOR: [u8; 4] = [255, 255, 0, 255];

/// Shared mesh and bounds for one point-entity look.
#[derive(Debug)]
pub struct EntCube {
    pub mins: Vec3,
    pub maxs: Vec3,
    /// 36 triangle verts in the normal color.
    pub buffer: Vec<ColorVertex>,
    /// Same triangles in the highlight color.
    pub select_buffer: Vec<ColorVertex>,
    /// 24 line verts outlining the 12 box edges.
    pub wireframe_buffer: Vec<ColorVertex>,
}

impl EntCube {
    pub fn new(mins: Vec3, maxs: Vec3, color: [u8; 4]) -> EntCube {
        EntCube {
            mins,
            maxs,
            buffer: cube_triangles(&mins, &maxs, color),
            select_buffer: cube_triangles(&mins, &maxs, ENT_SELECT_COLOR),
            wireframe_buffer: cube_edges(&mins, &maxs, ENT_WIREFRAME_COLOR),
        }
    }
}

fn box_corners(mins: &Vec3, maxs: &Vec3) -> [Vec3; 8] {
    // bit 0 = x at maxs, bit 1 = y at maxs, bit 2 = z at maxs
    let mut corners = [VEC3_ORIGIN; 8];
    for (i, corner) in corners.iter_mut().enumerate() {
        *corner = [
            if i & 1 != 0 { maxs[0] } else { mins[0] },
            if i & 2 != 0 { maxs[1] } else { mins[1] },
            if i & 4 != 0 { maxs[2] } else { mins[2] },
        ];
    }
    corners
}

fn cube_triangles(mins: &Vec3, maxs: &Vec3, color: [u8; 4]) -> Vec<ColorVertex> {
    let c = box_corners(mins, maxs);

    // two triangles per face, corners indexed by the bit pattern above
    const FACES: [[usize; 6]; 6] = [
        [0, 2, 3, 0, 3, 1], // -z
        [4, 5, 7, 4, 7, 6], // +z
        [0, 1, 5, 0, 5, 4], // -y
        [2, 6, 7, 2, 7, 3], // +y
        [0, 4, 6, 0, 6, 2], // -x
        [1, 3, 7, 1, 7, 5], // +x
    ];

    let mut verts = Vec::with_capacity(36);
    for face in &FACES {
        for &idx in face {
            verts.push(ColorVertex::new(c[idx], color));
        }
    }
    verts
}

fn cube_edges(mins: &Vec3, maxs: &Vec3, color: [u8; 4]) -> Vec<ColorVertex> {
    let c = box_corners(mins, maxs);

    const EDGES: [[usize; 2]; 12] = [
        [0, 1], [1, 3], [3, 2], [2, 0], // bottom ring
        [4, 5], [5, 7], [7, 6], [6, 4], // top ring
        [0, 4], [1, 5], [2, 6], [3, 7], // verticals
    ];

    let mut verts = Vec::with_capacity(24);
    for edge in &EDGES {
        for &idx in edge {
            verts.push(ColorVertex::new(c[idx], color));
        }
    }
    verts
}

/// Chooses the cube mesh for a point entity.
///
/// The default provider hands every entity the same small box. An editor
/// front-end can substitute per-classname sizes and colors from its
/// entity definitions.
pub trait PointEntProvider {
    fn ent_cube(&self, ent: &Entity) -> Rc<EntCube>;
}

/// One shared 16-unit cube centered on the origin.
pub struct DefaultPointEntProvider {
    cube: Rc<EntCube>,
}

impl DefaultPointEntProvider {
    pub fn new() -> DefaultPointEntProvider {
        DefaultPointEntProvider {
            cube: Rc::new(EntCube::new(
                [-8.0, -8.0, -8.0],
                [8.0, 8.0, 8.0],
                ENT_CUBE_COLOR,
            )),
        }
    }
}

impl Default for DefaultPointEntProvider {
    fn default() -> Self {
        DefaultPointEntProvider::new()
    }
}

impl PointEntProvider for DefaultPointEntProvider {
    fn ent_cube(&self, _ent: &Entity) -> Rc<EntCube> {
        Rc::clone(&self.cube)
    }
}

/// Per-entity render state resolved at load time.
#[derive(Debug)]
pub struct RenderEnt {
    /// Translation into converted render axes.
    pub model_mat: Mat4,
    /// Raw map-space origin, applied to face and cube bounds when picking.
    pub offset: Vec3,
    /// Index into the model lump, -1 for point entities.
    pub model_idx: i32,
    pub cube: Rc<EntCube>,
}

/// Resolve transforms and cube meshes for every entity in the level.
pub fn build_render_ents(map: &BspMap, provider: &dyn PointEntProvider) -> Vec<RenderEnt> {
    let mut render_ents = Vec::with_capacity(map.ents.len());

    for ent in &map.ents {
        let mut model_mat = mat4_identity();
        let mut offset = VEC3_ORIGIN;

        if ent.has_key("origin") {
            let origin = ent.origin();
            model_mat = mat4_translation(origin[0], origin[2], -origin[1]);
            offset = origin;
        }

        render_ents.push(RenderEnt {
            model_mat,
            offset,
            model_idx: ent.bsp_model_idx(),
            cube: provider.ent_cube(ent),
        });
    }

    render_ents
}
