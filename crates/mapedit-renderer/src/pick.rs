//! Mouse-Ray Picking
//!
//! Ray tests against face polygons and point-entity boxes. Both routines
//! refine a shared `PickInfo`: a hit is only recorded when it lands closer
//! than the best distance found so far, so callers can probe the world and
//! every entity in sequence and end up with the nearest surface.

use mapedit_common::bspfile::{BspMap, TEX_SPECIAL};
use mapedit_common::math::{
    dot_product, mat4_mul_vec4, vector_add, vector_compare, vector_length, vector_ma,
    vector_scale, vector_subtract, Vec2, Vec3, VEC3_ORIGIN,
};

use crate::facemath::FaceMath;

/// Running result of a pick sweep. `best_dist` starts at infinity and
/// shrinks as closer hits are found.
#[derive(Debug, Clone, Copy)]
pub struct PickInfo {
    pub valid: bool,
    pub ent_idx: i32,
    pub model_idx: i32,
    pub face_idx: i32,
    pub best_dist: f32,
}

impl Default for PickInfo {
    fn default() -> Self {
        PickInfo {
            valid: false,
            ent_idx: -1,
            model_idx: -1,
            face_idx: -1,
            best_dist: f32::MAX,
        }
    }
}

/// Test the ray against every face of one model. `offset` is the owning
/// entity's origin; the world passes zero. Returns true when a face of this
/// model became the new best hit.
pub fn pick_model_faces(
    map: &BspMap,
    face_maths: &[FaceMath],
    start: Vec3,
    dir: Vec3,
    offset: Vec3,
    model_idx: usize,
    skip_special: bool,
    pick_info: &mut PickInfo,
) -> bool {
    let model = &map.models[model_idx];
    let mut found_better_pick = false;
    let mut local_verts: Vec<Vec2> = Vec::new();

    for k in 0..model.face_count as usize {
        let face_idx = model.first_face as usize + k;
        let face_math = &face_maths[face_idx];
        let face = &map.faces[face_idx];

        // sky, water and other unlit surfaces are only pickable when shown
        if skip_special && model_idx == 0 {
            let info = &map.texinfos[face.texinfo as usize];
            if info.flags & TEX_SPECIAL != 0 {
                continue;
            }
        }

        let plane_normal = face_math.normal;
        let mut f_dist = face_math.dist;

        if !vector_compare(&offset, &VEC3_ORIGIN) {
            let new_plane_ori = vector_add(&offset, &vector_scale(&plane_normal, f_dist));
            f_dist = dot_product(&plane_normal, &new_plane_ori)
                / dot_product(&plane_normal, &plane_normal);
        }

        let dot = dot_product(&dir, &plane_normal);

        // don't select backfaces or parallel faces
        if dot >= 0.0 {
            continue;
        }

        let plane_point = vector_scale(&plane_normal, f_dist);
        let t = dot_product(&vector_subtract(&plane_point, &start), &plane_normal) / dot;

        if t < 0.0 {
            continue; // intersection behind the ray start
        }

        let intersection = vector_ma(&start, t, &dir);

        // transform to the face's 2D coordinate system
        let local = mat4_mul_vec4(
            &face_math.world_to_local,
            &[intersection[0], intersection[1], intersection[2], 1.0],
        );
        let local_ray_point = [local[0], local[1]];

        local_verts.clear();
        for vert in &face_math.verts {
            let shifted = vector_add(vert, &offset);
            let v = mat4_mul_vec4(
                &face_math.world_to_local,
                &[shifted[0], shifted[1], shifted[2], 1.0],
            );
            local_verts.push([v[0], v[1]]);
        }

        // half-plane containment against each boundary edge
        let mut inside = true;
        for i in 0..local_verts.len() {
            let v1 = local_verts[i];
            let v2 = local_verts[(i + 1) % local_verts.len()];

            if v1[0] == local_ray_point[0] && v1[1] == local_ray_point[1] {
                break; // on a vertex counts as inside
            }

            let d = (local_ray_point[0] - v1[0]) * (v2[1] - v1[1])
                - (local_ray_point[1] - v1[1]) * (v2[0] - v1[0]);

            if d < 0.0 {
                inside = false;
                break;
            }
        }
        if !inside {
            continue;
        }

        if t < pick_info.best_dist {
            found_better_pick = true;
            pick_info.best_dist = t;
            pick_info.face_idx = face_idx as i32;
            pick_info.valid = true;
        }
    }

    found_better_pick
}

#[derive(Clone, Copy, PartialEq)]
enum Quadrant {
    Right,
    Left,
    Middle,
}

/// Ray/box intersection (Woo's slab method from Graphics Gems). A ray
/// starting inside the box does not hit it, so an entity the camera sits in
/// never swallows the click. Updates `pick_info` when the box is the new
/// closest hit.
pub fn pick_aabb(start: Vec3, dir: Vec3, mins: Vec3, maxs: Vec3, pick_info: &mut PickInfo) -> bool {
    let mut inside = true;
    let mut quadrant = [Quadrant::Middle; 3];
    let mut candidate_plane = [0.0f32; 3];

    for i in 0..3 {
        if start[i] < mins[i] {
            quadrant[i] = Quadrant::Left;
            candidate_plane[i] = mins[i];
            inside = false;
        } else if start[i] > maxs[i] {
            quadrant[i] = Quadrant::Right;
            candidate_plane[i] = maxs[i];
            inside = false;
        }
    }

    if inside {
        return false;
    }

    let mut max_t = [-1.0f32; 3];
    for i in 0..3 {
        if quadrant[i] != Quadrant::Middle && dir[i] != 0.0 {
            max_t[i] = (candidate_plane[i] - start[i]) / dir[i];
        }
    }

    let mut which_plane = 0;
    for i in 1..3 {
        if max_t[which_plane] < max_t[i] {
            which_plane = i;
        }
    }

    if max_t[which_plane] < 0.0 {
        return false;
    }

    let mut coord = [0.0f32; 3];
    for i in 0..3 {
        if which_plane != i {
            coord[i] = start[i] + max_t[which_plane] * dir[i];
            if coord[i] < mins[i] || coord[i] > maxs[i] {
                return false;
            }
        } else {
            coord[i] = candidate_plane[i];
        }
    }

    let dist = vector_length(&vector_subtract(&coord, &start));

    if dist < pick_info.best_dist {
        pick_info.best_dist = dist;
        pick_info.valid = true;
        return true;
    }

    false
}
