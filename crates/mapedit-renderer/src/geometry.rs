//! Face Geometry Compiler
//!
//! Turns each BSP face into renderable vertices: an edge-loop walk with
//! texture and lightmap UVs, fanned into a triangle list plus a line list
//! for wireframe overlays. Faces sharing the same texture, lightmap pages
//! and transparency class collapse into one render group per submodel so a
//! whole group draws as a single call.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use log::debug;

use mapedit_common::bspfile::{BspMap, LIGHTMAP_TEXEL_SIZE, MAX_LIGHT_STYLES, STYLE_UNUSED};
use mapedit_common::math::dot_product;

use crate::atlas::LIGHTMAP_ATLAS_SIZE;
use crate::lightmap::BuiltLightmaps;
use crate::texture::{TexHandle, TextureStore};

/// Interleaved vertex for lightmapped world geometry.
///
/// Layout matches the vertex attribute order the draw backend binds:
/// texture UV, one atlas UV + blend scale per light style, opacity, then
/// position. `Pod` so a buffer uploads as raw bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct LightmapVertex {
    pub u: f32,
    pub v: f32,
    /// Per style: atlas u, atlas v, blend scale (0 disables the style).
    pub luv: [[f32; 3]; MAX_LIGHT_STYLES],
    pub opacity: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Batch identity: faces with equal keys draw together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GroupKey {
    texture: TexHandle,
    lightmap_atlas: [TexHandle; MAX_LIGHT_STYLES],
    transparent: bool,
}

/// One draw batch: every face of a submodel that shares a texture, a set of
/// lightmap pages, and a transparency class.
#[derive(Debug)]
pub struct RenderGroup {
    pub texture: TexHandle,
    pub lightmap_atlas: [TexHandle; MAX_LIGHT_STYLES],
    pub transparent: bool,
    pub verts: Box<[LightmapVertex]>,
    pub wireframe_verts: Box<[LightmapVertex]>,
}

/// Render groups of one BSP submodel. Index 0 is the world.
#[derive(Debug, Default)]
pub struct RenderModel {
    pub groups: Vec<RenderGroup>,
}

impl RenderModel {
    pub fn has_transparent_group(&self) -> bool {
        self.groups.iter().any(|g| g.transparent)
    }
}

/// A single face compiled to vertices, before batching.
#[derive(Debug)]
pub struct CompiledFace {
    pub texture: TexHandle,
    pub lightmap_atlas: [TexHandle; MAX_LIGHT_STYLES],
    pub transparent: bool,
    pub tris: Vec<LightmapVertex>,
    pub wireframe: Vec<LightmapVertex>,
}

pub fn compile_face(
    map: &BspMap,
    tex_handles: &[TexHandle],
    lightmaps: &BuiltLightmaps,
    face_idx: usize,
) -> CompiledFace {
    let face = &map.faces[face_idx];
    let texinfo = &map.texinfos[face.texinfo as usize];
    let miptex = &map.textures[texinfo.miptex as usize];
    let lmap = &lightmaps.infos[face_idx];

    let texture = tex_handles[texinfo.miptex as usize];
    let mut lightmap_atlas = [TexHandle(0); MAX_LIGHT_STYLES];
    for s in 0..MAX_LIGHT_STYLES {
        lightmap_atlas[s] = lightmaps.pages[lmap.atlas_id[s] as usize];
    }

    let is_special = texinfo.is_special();
    let has_lighting = face.styles[0] != STYLE_UNUSED && face.light_ofs >= 0 && !is_special;
    if is_special {
        // unlit faces sample flat white in style slot 0
        lightmap_atlas[0] = TextureStore::WHITE;
    }
    let opacity = if is_special { 0.5 } else { 1.0 };

    // texture UVs normalize against the miptex header size, not the
    // resolved image, so placeholder textures do not stretch the mapping
    let tw = 1.0 / miptex.width as f32;
    let th = 1.0 / miptex.height as f32;

    let lw = lmap.w as f32 / LIGHTMAP_ATLAS_SIZE as f32;
    let lh = lmap.h as f32 / LIGHTMAP_ATLAS_SIZE as f32;
    let pixel_step = 1.0 / LIGHTMAP_ATLAS_SIZE as f32;
    let texel = LIGHTMAP_TEXEL_SIZE as f32;

    let edge_count = face.edge_count as usize;
    let mut loop_verts = Vec::with_capacity(edge_count);

    for e in 0..edge_count {
        let vert = map.face_vert(face, e);
        let mut out = LightmapVertex {
            opacity,
            // levels are built z-up, rendering is y-up
            x: vert[0],
            y: vert[2],
            z: -vert[1],
            ..Default::default()
        };

        let f_u = dot_product(&texinfo.vs, &vert) + texinfo.shift_s;
        let f_v = dot_product(&texinfo.vt, &vert) + texinfo.shift_t;
        out.u = f_u * tw;
        out.v = f_v * th;

        if has_lighting {
            let lm_u = lmap.mid_tex_u + (f_u - lmap.mid_poly_u) / texel;
            let lm_v = lmap.mid_tex_v + (f_v - lmap.mid_poly_v) / texel;

            let uu = (lm_u / lmap.w as f32) * lw;
            let vv = (lm_v / lmap.h as f32) * lh;

            for s in 0..MAX_LIGHT_STYLES {
                out.luv[s][0] = uu + lmap.x[s] as f32 * pixel_step;
                out.luv[s][1] = vv + lmap.y[s] as f32 * pixel_step;
            }
        }

        for s in 0..MAX_LIGHT_STYLES {
            out.luv[s][2] = if has_lighting && face.styles[s] != STYLE_UNUSED {
                1.0
            } else {
                0.0
            };
        }
        if is_special {
            out.luv[0][2] = 1.0;
        }

        loop_verts.push(out);
    }

    // fan the loop into a triangle list so whole groups draw in one call
    let mut tris = Vec::with_capacity(edge_count.saturating_sub(2) * 3);
    for k in 2..edge_count {
        tris.push(loop_verts[0]);
        tris.push(loop_verts[k - 1]);
        tris.push(loop_verts[k]);
    }

    // boundary edges as line segments, closing the loop; wireframes ignore
    // lightmaps and blending
    let mut wireframe = Vec::with_capacity(edge_count * 2);
    for k in 0..edge_count {
        for vert in [loop_verts[k], loop_verts[(k + 1) % edge_count]] {
            let mut vert = vert;
            vert.luv[0][2] = 1.0;
            vert.luv[1][2] = 0.0;
            vert.luv[2][2] = 0.0;
            vert.luv[3][2] = 0.0;
            vert.opacity = 1.0;
            wireframe.push(vert);
        }
    }

    CompiledFace {
        texture,
        lightmap_atlas,
        transparent: opacity < 1.0,
        tris,
        wireframe,
    }
}

/// Compile every submodel into its batched render groups. Group order is
/// first-seen face order, which also fixes the draw order inside a pass.
pub fn build_render_models(
    map: &BspMap,
    tex_handles: &[TexHandle],
    lightmaps: &BuiltLightmaps,
) -> Vec<RenderModel> {
    let mut models = Vec::with_capacity(map.models.len());

    for (m, model) in map.models.iter().enumerate() {
        let mut index: HashMap<GroupKey, usize> = HashMap::new();
        let mut keys: Vec<GroupKey> = Vec::new();
        let mut tris: Vec<Vec<LightmapVertex>> = Vec::new();
        let mut wires: Vec<Vec<LightmapVertex>> = Vec::new();

        for k in 0..model.face_count as usize {
            let face_idx = model.first_face as usize + k;
            let compiled = compile_face(map, tex_handles, lightmaps, face_idx);

            let key = GroupKey {
                texture: compiled.texture,
                lightmap_atlas: compiled.lightmap_atlas,
                transparent: compiled.transparent,
            };
            let slot = *index.entry(key).or_insert_with(|| {
                keys.push(key);
                tris.push(Vec::new());
                wires.push(Vec::new());
                keys.len() - 1
            });

            tris[slot].extend_from_slice(&compiled.tris);
            wires[slot].extend_from_slice(&compiled.wireframe);
        }

        let groups: Vec<RenderGroup> = keys
            .into_iter()
            .zip(tris.into_iter().zip(wires))
            .map(|(key, (t, w))| RenderGroup {
                texture: key.texture,
                lightmap_atlas: key.lightmap_atlas,
                transparent: key.transparent,
                verts: t.into_boxed_slice(),
                wireframe_verts: w.into_boxed_slice(),
            })
            .collect();

        debug!("added {} render groups for model {}", groups.len(), m);
        models.push(RenderModel { groups });
    }

    models
}
