//! Edge and vertex constraints protecting boundaries, seams, polygroup
//! borders and material borders during reduction.

use meshsimp_core::{edge_key, EdgeTopology, TriangleMesh};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// How strongly an edge is protected. Levels are ordered, so combining two
/// sources of protection takes the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum EdgeProtection {
    #[default]
    Unconstrained,
    /// The edge may collapse along its own line but never flip
    NoFlip,
    /// The edge may not flip, split or collapse
    FullyConstrained,
}

/// Fixed protection policy applied to every run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintPolicy {
    pub mesh_boundary: EdgeProtection,
    pub polygroup_boundary: EdgeProtection,
    pub material_boundary: EdgeProtection,
    /// Treat normal seams as features. Seam collapse is permitted exactly
    /// when this is set.
    pub preserve_sharp_edges: bool,
}

impl ConstraintPolicy {
    pub const DEFAULT: ConstraintPolicy = ConstraintPolicy {
        mesh_boundary: EdgeProtection::NoFlip,
        polygroup_boundary: EdgeProtection::Unconstrained,
        material_boundary: EdgeProtection::Unconstrained,
        preserve_sharp_edges: true,
    };

    pub fn allow_seam_collapse(&self) -> bool {
        self.preserve_sharp_edges
    }

    /// Protection given to attribute seam edges
    pub fn seam_protection(&self) -> EdgeProtection {
        if self.allow_seam_collapse() {
            EdgeProtection::NoFlip
        } else {
            EdgeProtection::FullyConstrained
        }
    }
}

impl Default for ConstraintPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Why an edge is constrained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeFeatures {
    pub mesh_boundary: bool,
    pub seam: bool,
    pub polygroup_boundary: bool,
    pub material_boundary: bool,
    pub nonmanifold: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeConstraint {
    pub protection: EdgeProtection,
    pub features: EdgeFeatures,
}

impl EdgeConstraint {
    pub fn can_flip(&self) -> bool {
        self.protection == EdgeProtection::Unconstrained
    }

    pub fn can_collapse(&self) -> bool {
        self.protection != EdgeProtection::FullyConstrained
    }

    fn merge(&mut self, other: &EdgeConstraint) {
        self.protection = self.protection.max(other.protection);
        let (a, b) = (&mut self.features, &other.features);
        a.mesh_boundary |= b.mesh_boundary;
        a.seam |= b.seam;
        a.polygroup_boundary |= b.polygroup_boundary;
        a.material_boundary |= b.material_boundary;
        a.nonmanifold |= b.nonmanifold;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexConstraint {
    pub can_move: bool,
    pub can_delete: bool,
    /// Lies on a collapsible feature line; may only slide along it
    pub on_feature: bool,
}

impl VertexConstraint {
    pub const FIXED: VertexConstraint = VertexConstraint {
        can_move: false,
        can_delete: false,
        on_feature: true,
    };

    pub const FEATURE: VertexConstraint = VertexConstraint {
        can_move: true,
        can_delete: true,
        on_feature: true,
    };

    pub fn is_fixed(&self) -> bool {
        !self.can_move && !self.can_delete
    }
}

/// Constraint set handed to a reduction engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshConstraints {
    edges: BTreeMap<(usize, usize), EdgeConstraint>,
    vertices: BTreeMap<usize, VertexConstraint>,
    /// Other endpoints of the constrained edges at each vertex
    neighbours: BTreeMap<usize, BTreeSet<usize>>,
}

impl MeshConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.vertices.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge(&self, a: usize, b: usize) -> Option<&EdgeConstraint> {
        self.edges.get(&edge_key(a, b))
    }

    pub fn vertex(&self, v: usize) -> Option<&VertexConstraint> {
        self.vertices.get(&v)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&(usize, usize), &EdgeConstraint)> {
        self.edges.iter()
    }

    pub fn set_edge(&mut self, a: usize, b: usize, constraint: EdgeConstraint) {
        self.edges
            .entry(edge_key(a, b))
            .and_modify(|c| c.merge(&constraint))
            .or_insert(constraint);
        self.neighbours.entry(a).or_default().insert(b);
        self.neighbours.entry(b).or_default().insert(a);
    }

    fn remove_edge(&mut self, a: usize, b: usize) -> Option<EdgeConstraint> {
        for (v, w) in [(a, b), (b, a)] {
            if let Some(set) = self.neighbours.get_mut(&v) {
                set.remove(&w);
                if set.is_empty() {
                    self.neighbours.remove(&v);
                }
            }
        }
        self.edges.remove(&edge_key(a, b))
    }

    /// Vertices sharing a constrained edge with `v`
    pub fn constrained_neighbours(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighbours.get(&v).into_iter().flatten().copied()
    }

    /// Set or tighten a vertex constraint
    pub fn set_vertex(&mut self, v: usize, constraint: VertexConstraint) {
        self.vertices
            .entry(v)
            .and_modify(|c| {
                c.can_move &= constraint.can_move;
                c.can_delete &= constraint.can_delete;
                c.on_feature |= constraint.on_feature;
            })
            .or_insert(constraint);
    }

    pub fn can_collapse_edge(&self, a: usize, b: usize) -> bool {
        self.edge(a, b).map_or(true, EdgeConstraint::can_collapse)
    }

    pub fn is_removable(&self, v: usize) -> bool {
        self.vertex(v).map_or(true, |c| c.can_delete)
    }

    pub fn is_movable(&self, v: usize) -> bool {
        self.vertex(v).map_or(true, |c| c.can_move)
    }

    pub fn is_on_feature(&self, v: usize) -> bool {
        self.vertex(v).is_some_and(|c| c.on_feature)
    }

    /// Carry the constraints of `removed` over to `kept` after an edge
    /// collapse merged the two vertices.
    pub fn merge_vertex(&mut self, kept: usize, removed: usize) {
        self.remove_edge(kept, removed);
        let others: Vec<usize> = self.constrained_neighbours(removed).collect();
        for other in others {
            if let Some(constraint) = self.remove_edge(removed, other) {
                self.set_edge(kept, other, constraint);
            }
        }
        if let Some(constraint) = self.vertices.remove(&removed) {
            self.set_vertex(kept, constraint);
        }
    }
}

/// Build the constraint set for `mesh` under `policy`.
///
/// Callers that allow seam collapse must split overlay bowties first, or
/// edges around a non-manifold seam vertex may be tagged incorrectly.
pub fn build_constraints(mesh: &TriangleMesh, policy: &ConstraintPolicy) -> MeshConstraints {
    let topology = EdgeTopology::new(&mesh.faces);
    let mut constraints = MeshConstraints::new();

    for (&(a, b), tris) in topology.edges() {
        let mut protection = EdgeProtection::Unconstrained;
        let mut features = EdgeFeatures::default();

        match tris.as_slice() {
            [_] => {
                features.mesh_boundary = true;
                protection = protection.max(policy.mesh_boundary);
            }
            [t0, t1] => {
                let (t0, t1) = (*t0, *t1);
                if let Some(groups) = &mesh.polygroups {
                    if groups[t0] != groups[t1] {
                        features.polygroup_boundary = true;
                        protection = protection.max(policy.polygroup_boundary);
                    }
                }
                if let Some(ids) = &mesh.material_ids {
                    if ids[t0] != ids[t1] {
                        features.material_boundary = true;
                        protection = protection.max(policy.material_boundary);
                    }
                }
                if let Some(attributes) = &mesh.attributes {
                    let uv_seam = attributes.is_uv_seam_edge(&mesh.faces, t0, t1, a, b);
                    let normal_seam = policy.preserve_sharp_edges
                        && attributes.is_normal_seam_edge(&mesh.faces, t0, t1, a, b);
                    if uv_seam || normal_seam {
                        features.seam = true;
                        protection = protection.max(policy.seam_protection());
                    }
                }
            }
            _ => {
                features.nonmanifold = true;
                protection = EdgeProtection::FullyConstrained;
            }
        }

        if protection != EdgeProtection::Unconstrained {
            constraints.set_edge(a, b, EdgeConstraint { protection, features });
        }
    }

    // Vertices on fully constrained edges are pinned; vertices on
    // collapsible feature lines may only slide along them, and feature
    // vertices that do not sit in the middle of a single line are corners.
    let mut feature_valence: BTreeMap<usize, usize> = BTreeMap::new();
    let edges: Vec<_> = constraints.edges().map(|(k, c)| (*k, c.protection)).collect();
    for ((a, b), protection) in edges {
        match protection {
            EdgeProtection::FullyConstrained => {
                constraints.set_vertex(a, VertexConstraint::FIXED);
                constraints.set_vertex(b, VertexConstraint::FIXED);
            }
            EdgeProtection::NoFlip => {
                for v in [a, b] {
                    *feature_valence.entry(v).or_default() += 1;
                    constraints.set_vertex(v, VertexConstraint::FEATURE);
                }
            }
            EdgeProtection::Unconstrained => {}
        }
    }
    for (v, valence) in feature_valence {
        if valence != 2 {
            constraints.set_vertex(v, VertexConstraint::FIXED);
        }
    }

    debug!(
        edges = constraints.edge_count(),
        vertices = constraints.vertex_count(),
        "Built mesh constraints"
    );
    constraints
}
