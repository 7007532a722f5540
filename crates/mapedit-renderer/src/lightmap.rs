//! Lightmap Builder
//!
//! Computes each face's lightmap rectangle from its texture-space extents,
//! packs every used light style into shared atlas pages, and copies the raw
//! RGB samples in. Pages become ordinary store textures once packing is
//! done. Page 0 is also written to `atlas.png` as a load-time diagnostic.

use log::{info, warn};

use mapedit_common::bspfile::{BspMap, LIGHTMAP_TEXEL_SIZE, MAX_LIGHT_STYLES, STYLE_UNUSED};
use mapedit_common::math::dot_product;

use crate::atlas::{LightmapNode, LIGHTMAP_ATLAS_SIZE};
use crate::texture::{TexHandle, Texture, TextureStore};

/// Placement of one face's lightmap: texel size, the midpoints used to
/// project vertices into lightmap space, and the per-style atlas slots.
///
/// Faces without a lightmap keep the zeroed default; their style scales stay
/// zero in the compiled geometry so the slot contents never show.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightmapInfo {
    pub w: u32,
    pub h: u32,
    pub mid_tex_u: f32,
    pub mid_tex_v: f32,
    pub mid_poly_u: f32,
    pub mid_poly_v: f32,
    pub atlas_id: [u32; MAX_LIGHT_STYLES],
    pub x: [u32; MAX_LIGHT_STYLES],
    pub y: [u32; MAX_LIGHT_STYLES],
}

/// Output of [`build_lightmaps`]: one info per face (same index order as
/// `map.faces`) and the atlas pages as store textures.
#[derive(Debug)]
pub struct BuiltLightmaps {
    pub infos: Vec<LightmapInfo>,
    pub pages: Vec<TexHandle>,
}

/// Texture-space bounds of a face, snapped to the lightmap grid.
/// Returns (mins, maxs) in 16-unit texels.
pub fn face_extents(map: &BspMap, face_idx: usize) -> ([i32; 2], [i32; 2]) {
    let face = &map.faces[face_idx];
    let texinfo = &map.texinfos[face.texinfo as usize];

    let mut mins = [f32::MAX, f32::MAX];
    let mut maxs = [f32::MIN, f32::MIN];

    for e in 0..face.edge_count as usize {
        let vert = map.face_vert(face, e);
        let u = dot_product(&texinfo.vs, &vert) + texinfo.shift_s;
        let v = dot_product(&texinfo.vt, &vert) + texinfo.shift_t;

        mins[0] = mins[0].min(u);
        mins[1] = mins[1].min(v);
        maxs[0] = maxs[0].max(u);
        maxs[1] = maxs[1].max(v);
    }

    let texel = LIGHTMAP_TEXEL_SIZE as f32;
    let imins = [
        (mins[0] / texel).floor() as i32,
        (mins[1] / texel).floor() as i32,
    ];
    let imaxs = [
        (maxs[0] / texel).ceil() as i32,
        (maxs[1] / texel).ceil() as i32,
    ];
    (imins, imaxs)
}

/// Lightmap rectangle size in texels, one sample past the extent span.
pub fn face_lightmap_size(map: &BspMap, face_idx: usize) -> (u32, u32) {
    let (imins, imaxs) = face_extents(map, face_idx);
    (
        (imaxs[0] - imins[0] + 1) as u32,
        (imaxs[1] - imins[1] + 1) as u32,
    )
}

pub fn build_lightmaps(map: &BspMap, store: &mut TextureStore) -> BuiltLightmaps {
    let page_bytes = (LIGHTMAP_ATLAS_SIZE * LIGHTMAP_ATLAS_SIZE * 3) as usize;

    let mut packers = vec![LightmapNode::new(LIGHTMAP_ATLAS_SIZE, LIGHTMAP_ATLAS_SIZE)];
    let mut pages: Vec<Vec<u8>> = vec![vec![0u8; page_bytes]];
    let mut infos = vec![LightmapInfo::default(); map.faces.len()];

    info!("calculating lightmaps");

    let mut packed = 0usize;
    let mut atlas_id = 0usize;

    for i in 0..map.faces.len() {
        let face = &map.faces[i];
        let texinfo = &map.texinfos[face.texinfo as usize];

        if face.light_ofs < 0 || texinfo.is_special() {
            continue;
        }

        let (imins, imaxs) = face_extents(map, i);
        let (w, h) = face_lightmap_size(map, i);

        let info = &mut infos[i];
        info.w = w;
        info.h = h;
        info.mid_tex_u = w as f32 / 2.0;
        info.mid_tex_v = h as f32 / 2.0;
        info.mid_poly_u = ((imins[0] + imaxs[0]) * LIGHTMAP_TEXEL_SIZE) as f32 / 2.0;
        info.mid_poly_v = ((imins[1] + imaxs[1]) * LIGHTMAP_TEXEL_SIZE) as f32 / 2.0;

        // each used style stores a full w*h RGB block, back to back
        let style_len = (w * h * 3) as usize;
        let row_len = (w * 3) as usize;

        for s in 0..MAX_LIGHT_STYLES {
            if face.styles[s] == STYLE_UNUSED {
                continue;
            }

            // only the newest page is tried; older pages are never revisited
            let slot = match packers[atlas_id].insert(w, h) {
                Some(slot) => Some(slot),
                None => {
                    packers.push(LightmapNode::new(LIGHTMAP_ATLAS_SIZE, LIGHTMAP_ATLAS_SIZE));
                    pages.push(vec![0u8; page_bytes]);
                    atlas_id += 1;
                    packers[atlas_id].insert(w, h)
                }
            };

            let Some((x, y)) = slot else {
                warn!("lightmap for face {} too big for atlas size", i);
                continue;
            };

            packed += 1;
            info.atlas_id[s] = atlas_id as u32;
            info.x[s] = x;
            info.y[s] = y;

            let src_base = face.light_ofs as usize + s * style_len;
            let page = &mut pages[atlas_id];
            for row in 0..h as usize {
                let src = src_base + row * row_len;
                let dst = ((y as usize + row) * LIGHTMAP_ATLAS_SIZE as usize + x as usize) * 3;
                page[dst..dst + row_len].copy_from_slice(&map.lighting[src..src + row_len]);
            }
        }
    }

    match image::RgbImage::from_raw(LIGHTMAP_ATLAS_SIZE, LIGHTMAP_ATLAS_SIZE, pages[0].clone()) {
        Some(img) => {
            if let Err(err) = img.save("atlas.png") {
                warn!("failed to write atlas.png: {}", err);
            }
        }
        None => warn!("atlas page 0 has unexpected size, skipping atlas.png"),
    }

    info!("fit {} lightmaps into {} atlases", packed, atlas_id + 1);

    let pages = pages
        .into_iter()
        .map(|data| store.add(Texture::new(LIGHTMAP_ATLAS_SIZE, LIGHTMAP_ATLAS_SIZE, data)))
        .collect();

    BuiltLightmaps { infos, pages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapedit_common::bspfile::{BspEdge, BspFace, BspModel, BspPlane, BspTexInfo};

    // Square faces on the z=0 plane, axis-aligned texture mapping. Each face
    // covers side_units world units, placed far enough apart that vertex
    // positions never collide.
    fn quad_map(faces: &[(f32, [u8; MAX_LIGHT_STYLES])]) -> BspMap {
        let mut map = BspMap {
            planes: vec![BspPlane {
                normal: [0.0, 0.0, 1.0],
                dist: 0.0,
                plane_type: 0,
            }],
            texinfos: vec![BspTexInfo {
                vs: [1.0, 0.0, 0.0],
                shift_s: 0.0,
                vt: [0.0, 1.0, 0.0],
                shift_t: 0.0,
                miptex: 0,
                flags: 0,
            }],
            edges: vec![BspEdge::default()],
            ..Default::default()
        };

        let mut light_ofs = 0i32;
        for (f, &(side, styles)) in faces.iter().enumerate() {
            let base = map.verts.len() as u16;
            let x0 = f as f32 * 100000.0;
            map.verts.push([x0, 0.0, 0.0]);
            map.verts.push([x0, side, 0.0]);
            map.verts.push([x0 + side, side, 0.0]);
            map.verts.push([x0 + side, 0.0, 0.0]);

            let first_edge = map.surfedges.len() as i32;
            for e in 0..4u16 {
                map.edges.push(BspEdge {
                    v: [base + e, base + (e + 1) % 4],
                });
                map.surfedges.push((map.edges.len() - 1) as i32);
            }

            map.faces.push(BspFace {
                plane: 0,
                plane_side: 0,
                first_edge,
                edge_count: 4,
                texinfo: 0,
                styles,
                light_ofs,
            });

            // worst case allocation: shift keeps extents positive, so the
            // square covers at most (side/16 + 1)^2 texels per style
            let texels = ((side / 16.0).ceil() as usize + 1).pow(2);
            let used = styles.iter().filter(|&&s| s != STYLE_UNUSED).count();
            let block = texels * 3 * used.max(1);
            map.lighting.resize(light_ofs as usize + block, 0);
            light_ofs += block as i32;
        }

        map.models.push(BspModel {
            first_face: 0,
            face_count: map.faces.len() as i32,
            ..Default::default()
        });
        map
    }

    #[test]
    fn test_extents_and_mid_values() {
        let map = quad_map(&[(32.0, [0, 255, 255, 255])]);

        let (imins, imaxs) = face_extents(&map, 0);
        assert_eq!(imins, [0, 0]);
        assert_eq!(imaxs, [2, 2]);
        assert_eq!(face_lightmap_size(&map, 0), (3, 3));

        let mut store = TextureStore::new();
        let built = build_lightmaps(&map, &mut store);
        let info = &built.infos[0];
        assert_eq!((info.w, info.h), (3, 3));
        assert!((info.mid_tex_u - 1.5).abs() < 1e-6);
        assert!((info.mid_poly_u - 16.0).abs() < 1e-6);
        assert!((info.mid_poly_v - 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_style_blocks_copied_into_page() {
        let mut map = quad_map(&[(32.0, [0, 11, 255, 255])]);
        // style 0 samples read 10, style 1 samples read 20
        let style_len = 3 * 3 * 3;
        map.lighting[..style_len].fill(10);
        map.lighting[style_len..style_len * 2].fill(20);

        let mut store = TextureStore::new();
        let built = build_lightmaps(&map, &mut store);
        let info = &built.infos[0];

        assert_eq!(built.infos.len(), map.faces.len());
        assert_eq!(info.atlas_id[0], 0);
        assert_eq!(info.atlas_id[1], 0);
        assert_ne!((info.x[0], info.y[0]), (info.x[1], info.y[1]));

        let page = store.get(built.pages[0]);
        let texel = |x: u32, y: u32| {
            let ofs = ((y * LIGHTMAP_ATLAS_SIZE + x) * 3) as usize;
            page.data[ofs]
        };
        assert_eq!(texel(info.x[0], info.y[0]), 10);
        assert_eq!(texel(info.x[0] + 2, info.y[0] + 2), 10);
        assert_eq!(texel(info.x[1], info.y[1]), 20);
    }

    #[test]
    fn test_unlit_and_special_faces_skipped() {
        let mut map = quad_map(&[(32.0, [0, 255, 255, 255]), (32.0, [0, 255, 255, 255])]);
        map.faces[0].light_ofs = -1;
        map.texinfos.push(BspTexInfo {
            flags: mapedit_common::bspfile::TEX_SPECIAL,
            ..map.texinfos[0]
        });
        map.faces[1].texinfo = 1;

        let mut store = TextureStore::new();
        let built = build_lightmaps(&map, &mut store);

        assert_eq!(built.infos[0].w, 0);
        assert_eq!(built.infos[1].w, 0);
        assert_eq!(built.pages.len(), 1);
    }

    #[test]
    fn test_only_latest_page_is_tried() {
        // 257-texel squares: two can never share one 512 page, and once the
        // second page opens, the small face lands there even though page 0
        // still has room
        let big = 256.0 * 16.0;
        let map = quad_map(&[
            (big, [0, 255, 255, 255]),
            (big, [0, 255, 255, 255]),
            (16.0, [0, 255, 255, 255]),
        ]);

        let mut store = TextureStore::new();
        let built = build_lightmaps(&map, &mut store);

        assert_eq!(built.infos[0].atlas_id[0], 0);
        assert_eq!(built.infos[1].atlas_id[0], 1);
        assert_eq!(built.infos[2].atlas_id[0], 1);
        assert_eq!(built.pages.len(), 2);
    }

    #[test]
    fn test_oversized_style_dropped() {
        // 600-texel square cannot fit even a fresh page; the fresh page then
        // takes the next face
        let map = quad_map(&[
            (599.0 * 16.0, [0, 255, 255, 255]),
            (16.0, [0, 255, 255, 255]),
        ]);

        let mut store = TextureStore::new();
        let built = build_lightmaps(&map, &mut store);

        assert_eq!(built.pages.len(), 2);
        // dropped style keeps the zeroed slot
        assert_eq!(built.infos[0].x[0], 0);
        assert_eq!(built.infos[0].y[0], 0);
        assert_eq!(built.infos[1].atlas_id[0], 1);
    }
}
