//! Edge adjacency queries over an indexed triangle list

use itertools::Itertools;
use std::collections::BTreeMap;

/// Undirected edge key with the smaller vertex index first
#[inline]
pub fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// The three directed edges of a triangle, in winding order
#[inline]
pub fn triangle_edges(face: &[usize; 3]) -> impl Iterator<Item = (usize, usize)> + '_ {
    face.iter().copied().circular_tuple_windows()
}

/// Undirected edge to incident triangle map.
///
/// Ordered maps keep iteration deterministic, so constraint sets and
/// remeshing results do not depend on hash seeds.
#[derive(Debug, Clone, Default)]
pub struct EdgeTopology {
    edges: BTreeMap<(usize, usize), Vec<usize>>,
}

impl EdgeTopology {
    pub fn new(faces: &[[usize; 3]]) -> Self {
        let mut edges: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        for (fi, face) in faces.iter().enumerate() {
            for (a, b) in triangle_edges(face) {
                edges.entry(edge_key(a, b)).or_default().push(fi);
            }
        }
        Self { edges }
    }

    /// All undirected edges with their incident triangles
    pub fn edges(&self) -> impl Iterator<Item = (&(usize, usize), &Vec<usize>)> {
        self.edges.iter()
    }

    pub fn edge_triangles(&self, a: usize, b: usize) -> &[usize] {
        self.edges
            .get(&edge_key(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True if the edge exists and has exactly one incident triangle
    pub fn is_boundary_edge(&self, a: usize, b: usize) -> bool {
        self.edge_triangles(a, b).len() == 1
    }

    pub fn boundary_edges(&self) -> Vec<(usize, usize)> {
        self.edges
            .iter()
            .filter(|(_, tris)| tris.len() == 1)
            .map(|(&e, _)| e)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron_faces() -> Vec<[usize; 3]> {
        vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]]
    }

    #[test]
    fn test_edge_key_is_ordered() {
        assert_eq!(edge_key(4, 2), (2, 4));
        assert_eq!(edge_key(2, 4), (2, 4));
    }

    #[test]
    fn test_triangle_edges_wrap_around() {
        let edges: Vec<_> = triangle_edges(&[3, 5, 7]).collect();
        assert_eq!(edges, vec![(3, 5), (5, 7), (7, 3)]);
    }

    #[test]
    fn test_closed_tetrahedron() {
        let topo = EdgeTopology::new(&tetrahedron_faces());
        assert_eq!(topo.edges().count(), 6);
        assert!(topo.boundary_edges().is_empty());
        assert_eq!(topo.edge_triangles(0, 1).len(), 2);
    }

    #[test]
    fn test_single_triangle_boundary() {
        let topo = EdgeTopology::new(&[[0, 1, 2]]);
        assert_eq!(topo.boundary_edges().len(), 3);
        assert!(topo.is_boundary_edge(2, 0));
    }
}
