//! Procedural meshes

use crate::error::{Error, Result};
use crate::mesh::TriangleMesh;
use crate::point::Point3f;
use std::f32::consts::PI;

impl TriangleMesh {
    /// Closed UV sphere centered at the origin, with per-vertex UVs.
    ///
    /// Poles sit on the Z axis and each get a single vertex, so the sphere
    /// has `2 * slices * (stacks - 1)` triangles.
    pub fn uv_sphere(radius: f32, slices: usize, stacks: usize) -> Result<Self> {
        if slices < 3 || stacks < 2 {
            return Err(Error::InvalidInput(format!(
                "A sphere needs at least 3 slices and 2 stacks, got {} and {}",
                slices, stacks
            )));
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::InvalidInput(format!("Sphere radius must be positive, got {}", radius)));
        }

        let mut vertices = Vec::with_capacity(slices * (stacks - 1) + 2);
        let mut uvs = Vec::with_capacity(vertices.capacity());
        vertices.push(Point3f::new(0.0, 0.0, radius));
        uvs.push([0.5, 0.0]);
        for i in 1..stacks {
            let phi = PI * i as f32 / stacks as f32;
            for j in 0..slices {
                let theta = 2.0 * PI * j as f32 / slices as f32;
                vertices.push(Point3f::new(
                    radius * phi.sin() * theta.cos(),
                    radius * phi.sin() * theta.sin(),
                    radius * phi.cos(),
                ));
                uvs.push([j as f32 / slices as f32, i as f32 / stacks as f32]);
            }
        }
        vertices.push(Point3f::new(0.0, 0.0, -radius));
        uvs.push([0.5, 1.0]);
        let south = vertices.len() - 1;

        let ring = |i: usize, j: usize| 1 + (i - 1) * slices + j % slices;
        let mut faces = Vec::with_capacity(2 * slices * (stacks - 1));
        for j in 0..slices {
            faces.push([0, ring(1, j), ring(1, j + 1)]);
        }
        for i in 1..stacks - 1 {
            for j in 0..slices {
                let (a, b) = (ring(i, j), ring(i, j + 1));
                let (c, d) = (ring(i + 1, j), ring(i + 1, j + 1));
                faces.push([a, c, d]);
                faces.push([a, d, b]);
            }
        }
        for j in 0..slices {
            faces.push([south, ring(stacks - 1, j + 1), ring(stacks - 1, j)]);
        }

        let mut mesh = Self::from_vertices_and_faces(vertices, faces);
        mesh.set_uvs(uvs);
        Ok(mesh)
    }
}
