//! Normal computation

use crate::mesh::TriangleMesh;
use crate::point::{Point3f, Vector3f};
use rayon::prelude::*;

/// Unnormalized face normal; its length is twice the triangle area
#[inline]
pub fn face_normal_weighted(v0: &Point3f, v1: &Point3f, v2: &Point3f) -> Vector3f {
    (v1 - v0).cross(&(v2 - v0))
}

/// Unit face normal, or `None` for a degenerate triangle
#[inline]
pub fn face_normal(v0: &Point3f, v1: &Point3f, v2: &Point3f) -> Option<Vector3f> {
    let n = face_normal_weighted(v0, v1, v2);
    let len = n.norm();
    if len > f32::EPSILON && len.is_finite() {
        Some(n / len)
    } else {
        None
    }
}

/// Area-weighted per-face normals, computed in parallel
pub fn weighted_face_normals(mesh: &TriangleMesh) -> Vec<Vector3f> {
    mesh.faces
        .par_iter()
        .map(|f| face_normal_weighted(&mesh.vertices[f[0]], &mesh.vertices[f[1]], &mesh.vertices[f[2]]))
        .collect()
}

/// Recompute per-vertex normals directly, without touching overlays.
///
/// Face normals are accumulated with area weighting; vertices with no
/// usable incident triangle get +Z.
pub fn quick_compute_vertex_normals(mesh: &mut TriangleMesh) {
    let face_normals = weighted_face_normals(mesh);
    let mut normals = vec![Vector3f::zeros(); mesh.vertices.len()];
    for (face, n) in mesh.faces.iter().zip(&face_normals) {
        for &v in face {
            normals[v] += n;
        }
    }
    for n in &mut normals {
        let len = n.norm();
        *n = if len > 1e-12 && len.is_finite() {
            *n / len
        } else {
            Vector3f::z()
        };
    }
    mesh.normals = Some(normals);
}
