//! Mesh data structures and functionality

use crate::attributes::{MeshAttributes, Overlay};
use crate::error::{Error, Result};
use crate::normals::face_normal;
use crate::point::*;
use serde::{Deserialize, Serialize};

/// A triangle mesh with per-vertex data, per-triangle ids and an optional
/// attribute overlay layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<[u8; 3]>>,
    pub uvs: Option<Vec<Uv>>,
    /// Per-triangle material ids
    pub material_ids: Option<Vec<u32>>,
    /// Per-triangle polygroup ids
    pub polygroups: Option<Vec<i32>>,
    /// Overlay layer; `None` means attributes are disabled
    pub attributes: Option<MeshAttributes>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            ..Default::default()
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Alias of [`face_count`](Self::face_count)
    pub fn triangle_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    pub fn has_attributes(&self) -> bool {
        self.attributes.is_some()
    }

    pub fn has_vertex_normals(&self) -> bool {
        self.normals.is_some()
    }

    pub fn has_vertex_uvs(&self) -> bool {
        self.uvs.is_some()
    }

    pub fn has_vertex_colors(&self) -> bool {
        self.colors.is_some()
    }

    pub fn has_polygroups(&self) -> bool {
        self.polygroups.is_some()
    }

    pub fn has_material_ids(&self) -> bool {
        self.material_ids.is_some()
    }

    /// True if normals are available either per vertex or in a populated
    /// normal overlay
    pub fn has_any_normals(&self) -> bool {
        self.has_vertex_normals()
            || self
                .attributes
                .as_ref()
                .is_some_and(|a| !a.normals.is_empty())
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Unit face normals; degenerate faces get a zero vector
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let [v0, v1, v2] = face.map(|v| self.vertices[v]);
                face_normal(&v0, &v1, &v2).unwrap_or_else(Vector3f::zeros)
            })
            .collect()
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Set vertex UVs
    pub fn set_uvs(&mut self, uvs: Vec<Uv>) {
        if uvs.len() == self.vertices.len() {
            self.uvs = Some(uvs);
        }
    }

    /// Set per-triangle polygroup ids
    pub fn set_polygroups(&mut self, groups: Vec<i32>) {
        if groups.len() == self.faces.len() {
            self.polygroups = Some(groups);
        }
    }

    /// Set per-triangle material ids
    pub fn set_material_ids(&mut self, ids: Vec<u32>) {
        if ids.len() == self.faces.len() {
            self.material_ids = Some(ids);
        }
    }

    /// Polygroup of a triangle, 0 when the mesh has no polygroups
    pub fn polygroup(&self, triangle: usize) -> i32 {
        self.polygroups.as_ref().map_or(0, |g| g[triangle])
    }

    /// Enable the overlay layer with empty overlays. Existing overlays are
    /// left untouched.
    pub fn enable_attributes(&mut self) {
        if self.attributes.is_none() {
            self.attributes = Some(MeshAttributes::new(self.faces.len()));
        }
    }

    /// Drop the overlay layer
    pub fn discard_attributes(&mut self) {
        self.attributes = None;
    }

    /// Replace this mesh with a copy of `source`. Per-vertex data and
    /// per-triangle ids are always copied; overlays only when
    /// `with_attributes` is set.
    pub fn copy_from(&mut self, source: &TriangleMesh, with_attributes: bool) {
        self.vertices.clone_from(&source.vertices);
        self.faces.clone_from(&source.faces);
        self.normals.clone_from(&source.normals);
        self.colors.clone_from(&source.colors);
        self.uvs.clone_from(&source.uvs);
        self.material_ids.clone_from(&source.material_ids);
        self.polygroups.clone_from(&source.polygroups);
        if with_attributes {
            self.attributes.clone_from(&source.attributes);
        } else {
            self.attributes = None;
        }
    }

    /// Remove unreferenced vertices and overlay elements, renumbering
    /// everything densely.
    pub fn compact(&mut self) {
        let mut referenced = vec![false; self.vertices.len()];
        for face in &self.faces {
            for &v in face {
                referenced[v] = true;
            }
        }
        if referenced.iter().all(|r| *r) {
            return;
        }
        // surviving vertices keep their relative order
        let mut remap: Vec<Option<usize>> = vec![None; self.vertices.len()];
        let mut next = 0;
        for (v, _) in referenced.iter().enumerate().filter(|(_, r)| **r) {
            remap[v] = Some(next);
            next += 1;
        }

        fn gather<T: Clone>(data: &[T], remap: &[Option<usize>], count: usize) -> Vec<T> {
            let mut slots: Vec<Option<T>> = vec![None; count];
            for (old, new) in remap.iter().enumerate() {
                if let Some(new) = new {
                    slots[*new] = Some(data[old].clone());
                }
            }
            slots.into_iter().flatten().collect()
        }

        self.vertices = gather(&self.vertices, &remap, next);
        self.normals = self.normals.as_ref().map(|n| gather(n, &remap, next));
        self.colors = self.colors.as_ref().map(|c| gather(c, &remap, next));
        self.uvs = self.uvs.as_ref().map(|u| gather(u, &remap, next));
        for face in &mut self.faces {
            for v in face.iter_mut() {
                // every face vertex was assigned above
                *v = remap[*v].unwrap_or(*v);
            }
        }
        if let Some(attributes) = self.attributes.as_mut() {
            let kept: Vec<usize> = (0..self.faces.len()).collect();
            attributes.compact(&kept, &remap);
        }
    }

    /// Check index ranges and per-element array lengths
    pub fn validate(&self) -> Result<()> {
        let nv = self.vertices.len();
        let nf = self.faces.len();
        if let Some((fi, _)) = self
            .faces
            .iter()
            .enumerate()
            .find(|(_, f)| f.iter().any(|&v| v >= nv))
        {
            return Err(Error::InvalidData(format!(
                "Face {} references a vertex outside 0..{}",
                fi, nv
            )));
        }
        let check = |name: &str, len: Option<usize>, expected: usize| -> Result<()> {
            match len {
                Some(len) if len != expected => Err(Error::InvalidData(format!(
                    "{} count mismatch: {} for {} elements",
                    name, len, expected
                ))),
                _ => Ok(()),
            }
        };
        check("Normal", self.normals.as_ref().map(Vec::len), nv)?;
        check("Color", self.colors.as_ref().map(Vec::len), nv)?;
        check("UV", self.uvs.as_ref().map(Vec::len), nv)?;
        check("Material id", self.material_ids.as_ref().map(Vec::len), nf)?;
        check("Polygroup", self.polygroups.as_ref().map(Vec::len), nf)?;
        if let Some(attributes) = &self.attributes {
            check("UV overlay triangle", Some(attributes.uv.triangle_count()), nf)?;
            check("Normal overlay triangle", Some(attributes.normals.triangle_count()), nf)?;
            check_overlay("UV", &attributes.uv, &self.faces)?;
            check_overlay("Normal", &attributes.normals, &self.faces)?;
        }
        Ok(())
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Every set overlay triangle must reference existing elements owned by the
/// face's vertex at the same corner
fn check_overlay<T: Clone>(name: &str, overlay: &Overlay<T>, faces: &[[usize; 3]]) -> Result<()> {
    let count = overlay.element_count();
    for (fi, face) in faces.iter().enumerate() {
        let Some(elements) = overlay.triangle(fi) else {
            continue;
        };
        for (corner, &e) in elements.iter().enumerate() {
            if e >= count {
                return Err(Error::InvalidData(format!(
                    "{} overlay triangle {} references element {} outside 0..{}",
                    name, fi, e, count
                )));
            }
            if overlay.parent_vertex(e) != face[corner] {
                return Err(Error::InvalidData(format!(
                    "{} overlay element {} belongs to vertex {} but face {} uses vertex {}",
                    name,
                    e,
                    overlay.parent_vertex(e),
                    fi,
                    face[corner]
                )));
            }
        }
    }
    Ok(())
}
