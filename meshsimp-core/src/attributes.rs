//! Attribute overlays
//!
//! An overlay stores attribute values (UVs, normals) separately from vertex
//! positions. Each triangle corner references an overlay element, so a single
//! vertex may carry several values where the attribute is discontinuous
//! (a seam). Every element belongs to exactly one parent vertex.

use crate::point::{Uv, Vector3f};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-corner attribute storage for one attribute channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay<T> {
    elements: Vec<T>,
    parent_vertex: Vec<usize>,
    triangles: Vec<Option<[usize; 3]>>,
}

impl<T: Clone> Overlay<T> {
    /// Create an overlay for `triangle_count` triangles with no elements set
    pub fn new(triangle_count: usize) -> Self {
        Self {
            elements: Vec::new(),
            parent_vertex: Vec::new(),
            triangles: vec![None; triangle_count],
        }
    }

    /// Number of elements
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Number of triangle slots
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// True when no triangle references any element
    pub fn is_empty(&self) -> bool {
        self.triangles.iter().all(Option::is_none)
    }

    /// True when every triangle has its three elements set
    pub fn is_complete(&self) -> bool {
        self.triangles.iter().all(Option::is_some)
    }

    pub fn element(&self, element: usize) -> &T {
        &self.elements[element]
    }

    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    pub fn set_element(&mut self, element: usize, value: T) {
        self.elements[element] = value;
    }

    pub fn parent_vertex(&self, element: usize) -> usize {
        self.parent_vertex[element]
    }

    pub fn set_parent_vertex(&mut self, element: usize, parent: usize) {
        self.parent_vertex[element] = parent;
    }

    /// Append a new element owned by `parent` and return its index
    pub fn append_element(&mut self, value: T, parent: usize) -> usize {
        self.elements.push(value);
        self.parent_vertex.push(parent);
        self.elements.len() - 1
    }

    pub fn triangle(&self, triangle: usize) -> Option<[usize; 3]> {
        self.triangles.get(triangle).copied().flatten()
    }

    pub fn set_triangle(&mut self, triangle: usize, elements: [usize; 3]) {
        if triangle >= self.triangles.len() {
            self.triangles.resize(triangle + 1, None);
        }
        self.triangles[triangle] = Some(elements);
    }

    /// Append a triangle slot, returning its index
    pub fn push_triangle(&mut self, elements: Option<[usize; 3]>) -> usize {
        self.triangles.push(elements);
        self.triangles.len() - 1
    }

    /// Drop all elements and unset every triangle
    pub fn clear(&mut self) {
        self.elements.clear();
        self.parent_vertex.clear();
        for t in &mut self.triangles {
            *t = None;
        }
    }

    /// Resize the triangle table, unsetting any new slots
    pub fn resize_triangles(&mut self, triangle_count: usize) {
        self.triangles.resize(triangle_count, None);
    }

    /// Element referenced by `triangle` at the corner holding `vertex`
    pub fn element_at_vertex(&self, faces: &[[usize; 3]], triangle: usize, vertex: usize) -> Option<usize> {
        let corner = faces[triangle].iter().position(|&v| v == vertex)?;
        self.triangle(triangle).map(|t| t[corner])
    }

    /// True if the two triangles sharing edge `(a, b)` reference different
    /// elements at either endpoint.
    pub fn is_seam_edge(&self, faces: &[[usize; 3]], t0: usize, t1: usize, a: usize, b: usize) -> bool {
        let lhs = (
            self.element_at_vertex(faces, t0, a),
            self.element_at_vertex(faces, t0, b),
        );
        let rhs = (
            self.element_at_vertex(faces, t1, a),
            self.element_at_vertex(faces, t1, b),
        );
        lhs != rhs
    }

    /// Replace all elements with one element per vertex taken from
    /// `values`, then split any element whose corners do not form a single
    /// fan.
    pub fn copy_from_vertex_data(&mut self, faces: &[[usize; 3]], values: &[T]) {
        self.elements = values.to_vec();
        self.parent_vertex = (0..values.len()).collect();
        self.triangles = faces.iter().map(|f| Some(*f)).collect();
        self.split_bowties(faces);
    }

    /// Group every element's corners into edge-connected fans. Two corners
    /// of the same element are connected when their triangles share a mesh
    /// edge through the element's vertex and agree on the element at the
    /// edge's other endpoint.
    fn element_fans(&self, faces: &[[usize; 3]]) -> HashMap<usize, Vec<Vec<(usize, usize)>>> {
        let mut corners: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
        for (ti, tri) in self.triangles.iter().enumerate() {
            if let Some(tri) = tri {
                for (corner, &e) in tri.iter().enumerate() {
                    corners.entry(e).or_default().push((ti, corner));
                }
            }
        }

        let mut fans = HashMap::with_capacity(corners.len());
        for (element, list) in corners {
            if list.len() == 1 {
                fans.insert(element, vec![list]);
                continue;
            }
            let mut parent: Vec<usize> = (0..list.len()).collect();
            for i in 0..list.len() {
                for j in (i + 1)..list.len() {
                    if self.corners_connected(faces, list[i], list[j]) {
                        let (ri, rj) = (find_root(&mut parent, i), find_root(&mut parent, j));
                        if ri != rj {
                            parent[rj] = ri;
                        }
                    }
                }
            }
            let mut groups: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
            for (i, &c) in list.iter().enumerate() {
                let root = find_root(&mut parent, i);
                groups.entry(root).or_default().push(c);
            }
            let mut groups: Vec<_> = groups.into_values().collect();
            groups.sort_by_key(|g| g.iter().map(|c| c.0).min());
            fans.insert(element, groups);
        }
        fans
    }

    fn corners_connected(&self, faces: &[[usize; 3]], a: (usize, usize), b: (usize, usize)) -> bool {
        let (ta, ca) = a;
        let (tb, cb) = b;
        let v = faces[ta][ca];
        if faces[tb][cb] != v {
            return false;
        }
        let (Some(ea), Some(eb)) = (self.triangle(ta), self.triangle(tb)) else {
            return false;
        };
        for k in [1, 2] {
            let wa = faces[ta][(ca + k) % 3];
            for m in [1, 2] {
                let wb = faces[tb][(cb + m) % 3];
                if wa == wb && ea[(ca + k) % 3] == eb[(cb + m) % 3] {
                    return true;
                }
            }
        }
        false
    }

    /// Elements whose corners form more than one fan
    pub fn bowtie_elements(&self, faces: &[[usize; 3]]) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .element_fans(faces)
            .into_iter()
            .filter(|(_, groups)| groups.len() > 1)
            .map(|(e, _)| e)
            .collect();
        out.sort_unstable();
        out
    }

    /// Duplicate bowtie elements so each element has a single fan. Returns
    /// the number of new elements created.
    pub fn split_bowties(&mut self, faces: &[[usize; 3]]) -> usize {
        let mut fans: Vec<_> = self
            .element_fans(faces)
            .into_iter()
            .filter(|(_, groups)| groups.len() > 1)
            .collect();
        fans.sort_by_key(|(e, _)| *e);

        let mut created = 0;
        for (element, groups) in fans {
            for group in groups.into_iter().skip(1) {
                let value = self.elements[element].clone();
                let parent = self.parent_vertex[element];
                let new_element = self.append_element(value, parent);
                for (ti, corner) in group {
                    if let Some(tri) = self.triangles[ti].as_mut() {
                        tri[corner] = new_element;
                    }
                }
                created += 1;
            }
        }
        created
    }

    /// Keep only the triangles listed in `kept_faces` (in that order), remap
    /// parent vertices through `vertex_remap` and drop unreferenced elements.
    pub fn compact(&mut self, kept_faces: &[usize], vertex_remap: &[Option<usize>]) {
        let triangles: Vec<Option<[usize; 3]>> =
            kept_faces.iter().map(|&f| self.triangle(f)).collect();

        let mut element_remap: Vec<Option<usize>> = vec![None; self.elements.len()];
        let mut elements = Vec::new();
        let mut parents = Vec::new();
        for tri in triangles.iter().flatten() {
            for &e in tri {
                if element_remap[e].is_none() {
                    let Some(parent) = vertex_remap.get(self.parent_vertex[e]).copied().flatten() else {
                        continue;
                    };
                    element_remap[e] = Some(elements.len());
                    elements.push(self.elements[e].clone());
                    parents.push(parent);
                }
            }
        }

        self.triangles = triangles
            .into_iter()
            .map(|tri| {
                let tri = tri?;
                Some([element_remap[tri[0]]?, element_remap[tri[1]]?, element_remap[tri[2]]?])
            })
            .collect();
        self.elements = elements;
        self.parent_vertex = parents;
    }
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// The overlay layer of a mesh: one UV channel and one normal channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshAttributes {
    pub uv: Overlay<Uv>,
    pub normals: Overlay<Vector3f>,
}

impl MeshAttributes {
    /// Enabled but empty overlays for `triangle_count` triangles
    pub fn new(triangle_count: usize) -> Self {
        Self {
            uv: Overlay::new(triangle_count),
            normals: Overlay::new(triangle_count),
        }
    }

    pub fn is_uv_seam_edge(&self, faces: &[[usize; 3]], t0: usize, t1: usize, a: usize, b: usize) -> bool {
        !self.uv.is_empty() && self.uv.is_seam_edge(faces, t0, t1, a, b)
    }

    pub fn is_normal_seam_edge(&self, faces: &[[usize; 3]], t0: usize, t1: usize, a: usize, b: usize) -> bool {
        !self.normals.is_empty() && self.normals.is_seam_edge(faces, t0, t1, a, b)
    }

    /// True if the edge is a seam in any channel
    pub fn is_seam_edge(&self, faces: &[[usize; 3]], t0: usize, t1: usize, a: usize, b: usize) -> bool {
        self.is_uv_seam_edge(faces, t0, t1, a, b) || self.is_normal_seam_edge(faces, t0, t1, a, b)
    }

    /// Split bowtie elements in every channel
    pub fn split_all_bowties(&mut self, faces: &[[usize; 3]]) -> usize {
        self.uv.split_bowties(faces) + self.normals.split_bowties(faces)
    }

    pub fn compact(&mut self, kept_faces: &[usize], vertex_remap: &[Option<usize>]) {
        self.uv.compact(kept_faces, vertex_remap);
        self.normals.compact(kept_faces, vertex_remap);
    }
}
