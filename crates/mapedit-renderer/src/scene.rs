//! Scene Renderer
//!
//! Owns every derived array of a loaded level and walks them in draw order.
//! Drawing goes through the [`DrawBackend`] trait so the crate never talks
//! to a graphics API directly; the editor supplies a backend that uploads
//! the texture store once and then replays bind/draw calls per frame.
//!
//! A frame is two passes: pass 0 draws opaque groups and the point-entity
//! cubes, pass 1 draws transparent groups. Transparency is order-by-group
//! within the pass, not depth-sorted.

use std::path::Path;

use bitflags::bitflags;
use log::info;

use mapedit_common::bspfile::BspMap;
use mapedit_common::math::{vector_add, Mat4, Vec3, VEC3_ORIGIN};

use crate::ent::{build_render_ents, ColorVertex, PointEntProvider, RenderEnt};
use crate::facemath::{calc_face_maths, FaceMath};
use crate::geometry::{build_render_models, LightmapVertex, RenderModel};
use crate::lightmap::{build_lightmaps, BuiltLightmaps};
use crate::pick::{pick_aabb, pick_model_faces, PickInfo};
use crate::texture::{load_map_textures, open_archives, ArchiveOpener, TexHandle, TextureStore};

bitflags! {
    /// Visibility and sampling toggles, combined freely by the editor UI.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RenderFlags: u32 {
        /// Sample real textures; otherwise flat white.
        const TEXTURES = 1 << 0;
        /// Sample lightmap atlases; otherwise white/black neutrals.
        const LIGHTMAPS = 1 << 1;
        /// Overlay grey wireframe on every group.
        const WIREFRAME = 1 << 2;
        /// Show opaque brush entities.
        const ENTS = 1 << 3;
        /// Show special world faces (sky, water, triggers).
        const SPECIAL = 1 << 4;
        /// Show brush entities with transparent groups.
        const SPECIAL_ENTS = 1 << 5;
        /// Show point-entity cubes.
        const POINT_ENTS = 1 << 6;
    }
}

impl Default for RenderFlags {
    /// Everything visible, no wireframe overlay.
    fn default() -> Self {
        RenderFlags::TEXTURES
            | RenderFlags::LIGHTMAPS
            | RenderFlags::ENTS
            | RenderFlags::SPECIAL
            | RenderFlags::SPECIAL_ENTS
            | RenderFlags::POINT_ENTS
    }
}

/// Errors surfaced by a draw backend.
#[derive(Debug)]
pub enum RenderError {
    /// Uploading the texture store failed.
    TextureUpload(String),
    /// The backend rejected a state change or draw call.
    Backend(String),
    /// Resource not found.
    NotFound(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::TextureUpload(msg) => write!(f, "Texture upload error: {}", msg),
            RenderError::Backend(msg) => write!(f, "Backend error: {}", msg),
            RenderError::NotFound(name) => write!(f, "Resource not found: {}", name),
        }
    }
}

impl std::error::Error for RenderError {}

/// Draw seam implemented by the embedding editor.
///
/// The renderer binds textures to numbered units: unit 0 is the surface
/// texture, units 1 through 4 are the four lightmap style slots. Model
/// matrices nest push/pop around entity draws.
pub trait DrawBackend {
    /// Upload the texture store and wire sampler uniforms to their units.
    /// Called once after load, before the first frame.
    fn prepare(&mut self, store: &TextureStore) -> Result<(), RenderError>;

    fn bind_texture(&mut self, unit: u32, tex: TexHandle);

    fn draw_triangles(&mut self, verts: &[LightmapVertex]);
    fn draw_lines(&mut self, verts: &[LightmapVertex]);

    fn draw_color_triangles(&mut self, verts: &[ColorVertex]);
    fn draw_color_lines(&mut self, verts: &[ColorVertex]);

    fn push_model_matrix(&mut self, mat: &Mat4);
    fn pop_model_matrix(&mut self);
}

/// A fully loaded level, ready to draw and pick.
pub struct BspRenderer {
    map: BspMap,
    textures: TextureStore,
    lightmaps: BuiltLightmaps,
    render_models: Vec<RenderModel>,
    render_ents: Vec<RenderEnt>,
    face_maths: Vec<FaceMath>,
    pub render_flags: RenderFlags,
}

impl BspRenderer {
    /// Run the whole load pipeline: resolve textures from the level and its
    /// archives, pack lightmaps, compile faces into batched groups, resolve
    /// entity transforms and cubes, and precompute picking math.
    pub fn new(
        map: BspMap,
        game_path: &Path,
        opener: &ArchiveOpener,
        point_ents: &dyn PointEntProvider,
    ) -> BspRenderer {
        let mut textures = TextureStore::new();

        let archives = open_archives(&map, game_path, opener);
        let tex_handles = load_map_textures(&map, &archives, &mut textures);
        drop(archives);

        let lightmaps = build_lightmaps(&map, &mut textures);
        let render_models = build_render_models(&map, &tex_handles, &lightmaps);
        let render_ents = build_render_ents(&map, point_ents);
        let face_maths = calc_face_maths(&map);

        info!(
            "level ready: {} models, {} faces, {} ents",
            render_models.len(),
            face_maths.len(),
            render_ents.len()
        );

        BspRenderer {
            map,
            textures,
            lightmaps,
            render_models,
            render_ents,
            face_maths,
            render_flags: RenderFlags::default(),
        }
    }

    pub fn map(&self) -> &BspMap {
        &self.map
    }

    pub fn textures(&self) -> &TextureStore {
        &self.textures
    }

    pub fn lightmaps(&self) -> &BuiltLightmaps {
        &self.lightmaps
    }

    pub fn render_models(&self) -> &[RenderModel] {
        &self.render_models
    }

    pub fn render_ents(&self) -> &[RenderEnt] {
        &self.render_ents
    }

    pub fn face_maths(&self) -> &[FaceMath] {
        &self.face_maths
    }

    /// Upload level resources to the backend. Call once before rendering.
    pub fn prepare_backend(&self, backend: &mut dyn DrawBackend) -> Result<(), RenderError> {
        backend.prepare(&self.textures)
    }

    /// Draw one frame. `highlight_ent` is the selected entity index, or a
    /// value below 1 for no selection.
    pub fn render(&self, backend: &mut dyn DrawBackend, highlight_ent: i32) {
        // selected ent edges go down first so other wireframes cannot
        // overdraw them
        if highlight_ent > 0 && (highlight_ent as usize) < self.render_ents.len() {
            let ent = &self.render_ents[highlight_ent as usize];
            if ent.model_idx >= 0 {
                backend.push_model_matrix(&ent.model_mat);
                self.draw_model(backend, ent.model_idx as usize, false, true, true);
                self.draw_model(backend, ent.model_idx as usize, true, true, true);
                backend.pop_model_matrix();
            }
        }

        for pass in 0..2 {
            let draw_transparent_faces = pass == 1;

            self.draw_model(backend, 0, draw_transparent_faces, false, false);

            for (i, ent) in self.render_ents.iter().enumerate() {
                if ent.model_idx >= 0 {
                    backend.push_model_matrix(&ent.model_mat);
                    self.draw_model(
                        backend,
                        ent.model_idx as usize,
                        draw_transparent_faces,
                        i as i32 == highlight_ent,
                        false,
                    );
                    backend.pop_model_matrix();
                }
            }

            if self.render_flags.contains(RenderFlags::POINT_ENTS) && pass == 0 {
                self.draw_point_entities(backend, highlight_ent);
            }
        }
    }

    fn draw_model(
        &self,
        backend: &mut dyn DrawBackend,
        model_idx: usize,
        transparent: bool,
        highlight: bool,
        edges_only: bool,
    ) {
        if edges_only {
            for group in &self.render_models[model_idx].groups {
                let edge = if highlight {
                    TextureStore::YELLOW
                } else {
                    TextureStore::GREY
                };
                backend.bind_texture(0, edge);
                backend.bind_texture(1, TextureStore::WHITE);
                backend.draw_lines(&group.wireframe_verts);
            }
            return;
        }

        for group in &self.render_models[model_idx].groups {
            if group.transparent != transparent {
                continue;
            }

            if group.transparent {
                if model_idx == 0 && !self.render_flags.contains(RenderFlags::SPECIAL) {
                    continue;
                }
                if model_idx != 0 && !self.render_flags.contains(RenderFlags::SPECIAL_ENTS) {
                    continue;
                }
            } else if model_idx != 0 && !self.render_flags.contains(RenderFlags::ENTS) {
                continue;
            }

            if self.render_flags.contains(RenderFlags::TEXTURES) {
                backend.bind_texture(0, group.texture);
            } else {
                backend.bind_texture(0, TextureStore::WHITE);
            }

            for (s, &atlas) in group.lightmap_atlas.iter().enumerate() {
                let unit = 1 + s as u32;
                if highlight {
                    backend.bind_texture(unit, TextureStore::RED);
                } else if self.render_flags.contains(RenderFlags::LIGHTMAPS) {
                    backend.bind_texture(unit, atlas);
                } else if s == 0 {
                    backend.bind_texture(unit, TextureStore::WHITE);
                } else {
                    backend.bind_texture(unit, TextureStore::BLACK);
                }
            }

            backend.draw_triangles(&group.verts);

            if highlight || self.render_flags.contains(RenderFlags::WIREFRAME) {
                let edge = if highlight {
                    TextureStore::YELLOW
                } else {
                    TextureStore::GREY
                };
                backend.bind_texture(0, edge);
                backend.bind_texture(1, TextureStore::WHITE);
                backend.draw_lines(&group.wireframe_verts);
            }
        }
    }

    fn draw_point_entities(&self, backend: &mut dyn DrawBackend, highlight_ent: i32) {
        // ent 0 is worldspawn
        for (i, ent) in self.render_ents.iter().enumerate().skip(1) {
            if ent.model_idx >= 0 {
                continue;
            }

            backend.push_model_matrix(&ent.model_mat);

            if i as i32 == highlight_ent {
                backend.draw_color_triangles(&ent.cube.select_buffer);
                backend.draw_color_lines(&ent.cube.wireframe_buffer);
            } else {
                backend.draw_color_triangles(&ent.cube.buffer);
            }

            backend.pop_model_matrix();
        }
    }

    /// Trace a ray through everything visible and report the nearest hit.
    /// The world is tested first, then every entity: brush models through
    /// their faces, point entities through their cube bounds.
    pub fn pick_poly(&self, start: Vec3, dir: Vec3, pick_info: &mut PickInfo) -> bool {
        let mut found_better_pick = false;
        let skip_special = !self.render_flags.contains(RenderFlags::SPECIAL);

        if pick_model_faces(
            &self.map,
            &self.face_maths,
            start,
            dir,
            VEC3_ORIGIN,
            0,
            skip_special,
            pick_info,
        ) {
            pick_info.ent_idx = 0;
            pick_info.model_idx = 0;
            found_better_pick = true;
        }

        for (i, ent) in self.render_ents.iter().enumerate() {
            if ent.model_idx >= 0 {
                let is_special =
                    self.render_models[ent.model_idx as usize].has_transparent_group();

                if is_special && !self.render_flags.contains(RenderFlags::SPECIAL_ENTS) {
                    continue;
                }
                if !is_special && !self.render_flags.contains(RenderFlags::ENTS) {
                    continue;
                }

                if pick_model_faces(
                    &self.map,
                    &self.face_maths,
                    start,
                    dir,
                    ent.offset,
                    ent.model_idx as usize,
                    skip_special,
                    pick_info,
                ) {
                    pick_info.ent_idx = i as i32;
                    pick_info.model_idx = ent.model_idx;
                    found_better_pick = true;
                }
            } else if self.render_flags.contains(RenderFlags::POINT_ENTS) {
                let mins = vector_add(&ent.offset, &ent.cube.mins);
                let maxs = vector_add(&ent.offset, &ent.cube.maxs);
                if pick_aabb(start, dir, mins, maxs, pick_info) {
                    pick_info.ent_idx = i as i32;
                    pick_info.model_idx = -1;
                    pick_info.face_idx = -1;
                    found_better_pick = true;
                }
            }
        }

        found_better_pick
    }
}
