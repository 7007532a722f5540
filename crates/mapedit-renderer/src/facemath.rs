//! Per-Face Picking Math
//!
//! Precomputed plane equation, world-space vertex loop, and a world-to-local
//! projection matrix for every face in the level. The picker intersects rays
//! against the plane and then runs the point-in-polygon test in the face's
//! local 2D frame, so all of this is computed once at load.

use mapedit_common::bspfile::BspMap;
use mapedit_common::math::{
    cross_product, mat4_identity, vector_normalize, vector_subtract, Mat4, Vec3,
};

/// Plane and projection data for one face.
#[derive(Debug, Clone)]
pub struct FaceMath {
    /// Plane normal, flipped when the face winds against its plane.
    pub normal: Vec3,
    pub dist: f32,
    /// World-space vertex loop in winding order.
    pub verts: Vec<Vec3>,
    /// Rotates world points into the face frame: x along the first edge,
    /// y across it, z along the normal.
    pub world_to_local: Mat4,
}

/// Build the math block for every face of the level.
pub fn calc_face_maths(map: &BspMap) -> Vec<FaceMath> {
    let mut maths = Vec::with_capacity(map.faces.len());

    for face in &map.faces {
        let plane = &map.planes[face.plane as usize];
        let (normal, dist) = if face.plane_side != 0 {
            (
                [-plane.normal[0], -plane.normal[1], -plane.normal[2]],
                -plane.dist,
            )
        } else {
            (plane.normal, plane.dist)
        };

        let mut verts = Vec::with_capacity(face.edge_count as usize);
        for e in 0..face.edge_count as usize {
            verts.push(map.face_vert(face, e));
        }

        let mut plane_x = vector_subtract(&verts[1], &verts[0]);
        vector_normalize(&mut plane_x);
        let mut plane_y = cross_product(&normal, &plane_x);
        vector_normalize(&mut plane_y);
        let plane_z = normal;

        let mut world_to_local = mat4_identity();
        world_to_local[0] = plane_x[0];
        world_to_local[4] = plane_x[1];
        world_to_local[8] = plane_x[2];
        world_to_local[1] = plane_y[0];
        world_to_local[5] = plane_y[1];
        world_to_local[9] = plane_y[2];
        world_to_local[2] = plane_z[0];
        world_to_local[6] = plane_z[1];
        world_to_local[10] = plane_z[2];

        maths.push(FaceMath {
            normal,
            dist,
            verts,
            world_to_local,
        });
    }

    maths
}
