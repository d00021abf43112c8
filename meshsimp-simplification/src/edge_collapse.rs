//! Edge collapse reduction
//!
//! Implements iterative edge collapse mesh simplification using a half-edge
//! data structure for efficient topology operations and quadric error metrics
//! (QEM) for error-driven edge prioritization. Collapses honor the
//! [`MeshConstraints`] handed over in [`ReducerSetup`], and attribute
//! overlays, per-vertex data and per-triangle ids are carried through every
//! collapse.

use crate::constraints::MeshConstraints;
use crate::engine::{
    CollapseMode, ProjectionMode, ReducerKind, ReducerSetup, ReductionEngine, ReductionStats,
};
use crate::projection::ProjectionTarget;
use crate::target::StopCondition;
use meshsimp_core::normals::face_normal;
use meshsimp_core::{
    edge_key, lerp_uv, uv_distance_squared, MeshAttributes, Overlay, Point3f, Result, TriangleMesh,
    Uv, Vector3f,
};
use nalgebra::{Matrix4, Vector4};
use priority_queue::PriorityQueue;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

const INVALID: usize = usize::MAX;

/// Weight of the perpendicular planes that pin boundary and feature edges
const FEATURE_EDGE_WEIGHT: f64 = 100.0;

/// Weight of normal and UV differences in attribute-aware costs
const ATTRIBUTE_WEIGHT: f64 = 1.0;

// ============================================================
// Half-Edge Data Structure
// ============================================================

#[derive(Debug, Clone)]
struct HalfEdge {
    target: usize,
    twin: usize,
    next: usize,
    prev: usize,
    face: usize,
}

/// Per-run collapse parameters derived from the reducer setup and the
/// stop condition
#[derive(Debug, Clone, Copy)]
struct CollapseRules {
    mode: CollapseMode,
    retain_quadric_memory: bool,
    edge_flip_tolerance: f64,
    attribute_aware: bool,
    /// Cosine of the flatness angle for shape-preserving reduction
    flat_cosine: Option<f64>,
    /// Only edges shorter than this are candidates
    max_edge_length: Option<f64>,
}

impl CollapseRules {
    fn new(kind: ReducerKind, setup: &ReducerSetup, stop: StopCondition) -> Self {
        let (flat_cosine, max_edge_length) = match stop {
            StopCondition::MinimalShapePreserving {
                angle_tolerance_degrees,
            } => (Some(angle_tolerance_degrees.max(0.0).to_radians().cos()), None),
            StopCondition::EdgeLength(length) => (None, Some(length)),
            _ => (None, None),
        };
        Self {
            mode: setup.collapse_mode,
            retain_quadric_memory: setup.retain_quadric_memory,
            edge_flip_tolerance: setup.edge_flip_tolerance.unwrap_or(0.0),
            attribute_aware: kind == ReducerKind::AttributeAware,
            flat_cosine,
            max_edge_length,
        }
    }
}

/// A planned collapse: `remove` merges into `keep`, which moves to
/// `position`
#[derive(Debug, Clone)]
struct CollapseTarget {
    keep: usize,
    remove: usize,
    position: Point3f,
    quadric: Matrix4<f64>,
}

/// Half-edge mesh for topology-aware edge collapse operations.
struct HalfEdgeMesh {
    half_edges: Vec<HalfEdge>,
    /// One outgoing half-edge per vertex (INVALID if removed)
    vertex_edge: Vec<usize>,
    /// One half-edge per face (INVALID if removed)
    face_edge: Vec<usize>,
    active_face_count: usize,
    active_vertex_count: usize,
    positions: Vec<Point3f>,
    normals: Option<Vec<Vector3f>>,
    colors: Option<Vec<[u8; 3]>>,
    uvs: Option<Vec<Uv>>,
    material_ids: Option<Vec<u32>>,
    polygroups: Option<Vec<i32>>,
    attributes: Option<MeshAttributes>,
    constraints: MeshConstraints,
    quadrics: Vec<Matrix4<f64>>,
    vertex_removed: Vec<bool>,
}

impl HalfEdgeMesh {
    fn from_triangle_mesh(mesh: &TriangleMesh, constraints: MeshConstraints) -> Self {
        let nv = mesh.vertices.len();
        let nf = mesh.faces.len();

        let mut half_edges = Vec::with_capacity(nf * 3);
        let mut vertex_edge = vec![INVALID; nv];
        let mut face_edge = Vec::with_capacity(nf);

        for (fi, face) in mesh.faces.iter().enumerate() {
            let base = fi * 3;
            for j in 0..3usize {
                half_edges.push(HalfEdge {
                    target: face[(j + 1) % 3],
                    twin: INVALID,
                    next: base + (j + 1) % 3,
                    prev: base + (j + 2) % 3,
                    face: fi,
                });
                if vertex_edge[face[j]] == INVALID {
                    vertex_edge[face[j]] = base + j;
                }
            }
            face_edge.push(base);
        }

        // Build twin pointers; edges shared by more than two faces or with
        // inconsistent winding stay unpaired
        let mut edge_map: HashMap<(usize, usize), usize> = HashMap::with_capacity(nf * 3);
        for (he_idx, he) in half_edges.iter().enumerate() {
            let src = half_edges[he.prev].target;
            edge_map.entry((src, he.target)).or_insert(he_idx);
        }
        for he_idx in 0..half_edges.len() {
            if half_edges[he_idx].twin != INVALID {
                continue;
            }
            let src = half_edges[half_edges[he_idx].prev].target;
            let tgt = half_edges[he_idx].target;
            if let Some(&twin_idx) = edge_map.get(&(tgt, src)) {
                if twin_idx != he_idx && half_edges[twin_idx].twin == INVALID {
                    half_edges[he_idx].twin = twin_idx;
                    half_edges[twin_idx].twin = he_idx;
                }
            }
        }

        let vertex_removed: Vec<bool> = vertex_edge.iter().map(|&he| he == INVALID).collect();
        let active_vertex_count = vertex_removed.iter().filter(|removed| !**removed).count();

        let mut hem = HalfEdgeMesh {
            half_edges,
            vertex_edge,
            face_edge,
            active_face_count: nf,
            active_vertex_count,
            positions: mesh.vertices.clone(),
            normals: mesh.normals.clone(),
            colors: mesh.colors.clone(),
            uvs: mesh.uvs.clone(),
            material_ids: mesh.material_ids.clone(),
            polygroups: mesh.polygroups.clone(),
            attributes: mesh.attributes.clone(),
            constraints,
            quadrics: vec![Matrix4::zeros(); nv],
            vertex_removed,
        };
        hem.initialize_quadrics();
        hem
    }

    #[inline]
    fn source(&self, he: usize) -> usize {
        self.half_edges[self.half_edges[he].prev].target
    }

    #[inline]
    fn is_alive(&self, v: usize) -> bool {
        !self.vertex_removed[v] && self.vertex_edge[v] != INVALID
    }

    /// Corner vertices of a face in their original corner order
    fn face_vertices(&self, fi: usize) -> [usize; 3] {
        let base = fi * 3;
        [self.source(base), self.source(base + 1), self.source(base + 2)]
    }

    fn compute_plane(v0: &Point3f, v1: &Point3f, v2: &Point3f) -> Option<Vector4<f64>> {
        let n = face_normal(v0, v1, v2)?;
        let d = -n.dot(&v0.coords);
        Some(Vector4::new(n.x as f64, n.y as f64, n.z as f64, d as f64))
    }

    fn plane_to_quadric(p: &Vector4<f64>) -> Matrix4<f64> {
        p * p.transpose()
    }

    /// Quadric of the plane through edge `a`-`b` perpendicular to the face
    /// with normal `n`
    fn edge_quadric(a: &Point3f, b: &Point3f, n: &Vector3f) -> Option<Matrix4<f64>> {
        let dir = b - a;
        let length_sq = dir.norm_squared() as f64;
        let perp = dir.cross(n).try_normalize(f32::EPSILON)?;
        let d = -perp.dot(&a.coords);
        let plane = Vector4::new(perp.x as f64, perp.y as f64, perp.z as f64, d as f64);
        Some(Self::plane_to_quadric(&plane) * (FEATURE_EDGE_WEIGHT * length_sq))
    }

    /// Boundary edges and edges that may not flip
    fn is_feature_half_edge(&self, he: usize) -> bool {
        self.half_edges[he].twin == INVALID
            || self
                .constraints
                .edge(self.source(he), self.half_edges[he].target)
                .is_some_and(|c| !c.can_flip())
    }

    /// Sum of the plane quadrics of the faces around `v` plus the
    /// perpendicular quadrics of its feature edges
    fn vertex_quadric(&self, v: usize) -> Matrix4<f64> {
        let mut q = Matrix4::zeros();
        for he in self.outgoing_half_edges(v) {
            let fi = self.half_edges[he].face;
            if fi == INVALID {
                continue;
            }
            let [a, b, c] = self.face_vertices(fi).map(|x| self.positions[x]);
            let Some(plane) = Self::compute_plane(&a, &b, &c) else {
                continue;
            };
            q += Self::plane_to_quadric(&plane);

            let n = Vector3f::new(plane[0] as f32, plane[1] as f32, plane[2] as f32);
            let prev = self.half_edges[he].prev;
            for edge in [he, prev] {
                if self.is_feature_half_edge(edge) {
                    let from = self.positions[self.source(edge)];
                    let to = self.positions[self.half_edges[edge].target];
                    if let Some(eq) = Self::edge_quadric(&from, &to, &n) {
                        q += eq;
                    }
                }
            }
        }
        q
    }

    fn initialize_quadrics(&mut self) {
        for v in 0..self.positions.len() {
            if self.is_alive(v) {
                self.quadrics[v] = self.vertex_quadric(v);
            }
        }
    }

    /// Get all outgoing half-edges from a vertex (handles boundary vertices).
    fn outgoing_half_edges(&self, v: usize) -> Vec<usize> {
        let start = self.vertex_edge[v];
        if start == INVALID {
            return vec![];
        }
        let limit = self.half_edges.len();

        let mut result = Vec::new();
        let mut current = start;

        // Rotate counterclockwise: current.prev.twin
        loop {
            result.push(current);
            let prev = self.half_edges[current].prev;
            let twin = self.half_edges[prev].twin;
            if twin == INVALID || result.len() > limit {
                break;
            }
            current = twin;
            if current == start {
                return result;
            }
        }

        // Boundary: also rotate clockwise from start via twin.next
        let twin_of_start = self.half_edges[start].twin;
        if twin_of_start != INVALID {
            let mut current = self.half_edges[twin_of_start].next;
            while current != start && result.len() <= limit {
                result.push(current);
                let twin = self.half_edges[current].twin;
                if twin == INVALID {
                    break;
                }
                current = self.half_edges[twin].next;
            }
        }

        result
    }

    /// Targets of outgoing half-edges plus the sources of incoming ones,
    /// so boundary fans report both rim neighbors
    fn neighbors(&self, v: usize) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        for he in self.outgoing_half_edges(v) {
            out.insert(self.half_edges[he].target);
            out.insert(self.half_edges[self.half_edges[he].next].target);
        }
        out.remove(&v);
        out
    }

    fn is_boundary_vertex(&self, v: usize) -> bool {
        self.outgoing_half_edges(v).iter().any(|&he| {
            self.half_edges[he].twin == INVALID
                || self.half_edges[self.half_edges[he].prev].twin == INVALID
        })
    }

    fn find_half_edge(&self, from: usize, to: usize) -> Option<usize> {
        self.outgoing_half_edges(from)
            .into_iter()
            .find(|&he| self.half_edges[he].target == to)
    }

    /// A half-edge of edge `a`-`b` in either direction
    fn find_edge(&self, a: usize, b: usize) -> Option<usize> {
        self.find_half_edge(a, b).or_else(|| self.find_half_edge(b, a))
    }

    fn is_boundary_edge(&self, a: usize, b: usize) -> bool {
        self.find_edge(a, b)
            .is_some_and(|he| self.half_edges[he].twin == INVALID)
    }

    /// Boundary edges and edges that may not flip
    fn is_feature_edge(&self, a: usize, b: usize) -> bool {
        self.is_boundary_edge(a, b) || self.constraints.edge(a, b).is_some_and(|c| !c.can_flip())
    }

    /// Vertices opposite edge `a`-`b` in its one or two faces
    fn edge_apexes(&self, a: usize, b: usize) -> Vec<usize> {
        let Some(h) = self.find_edge(a, b) else {
            return vec![];
        };
        let mut apexes = vec![self.half_edges[self.half_edges[h].next].target];
        let twin = self.half_edges[h].twin;
        if twin != INVALID {
            apexes.push(self.half_edges[self.half_edges[twin].next].target);
        }
        apexes
    }

    /// Check the link condition: common neighbors must equal exactly the
    /// face apices opposite the edge (2 for interior, 1 for boundary).
    fn check_link_condition(&self, v1: usize, v2: usize) -> bool {
        let n1 = self.neighbors(v1);
        let n2 = self.neighbors(v2);
        let common_count = n1.intersection(&n2).count();

        let h = match self.find_edge(v1, v2) {
            Some(h) => h,
            None => return false,
        };
        let is_boundary = self.half_edges[h].twin == INVALID;
        let expected = if is_boundary { 1 } else { 2 };
        common_count == expected
    }

    /// Link condition plus the checks that keep the result a manifold:
    /// no interior edge between two boundary vertices and no interior apex
    /// dropping below valence three.
    fn is_topologically_safe(&self, a: usize, b: usize) -> bool {
        if !self.check_link_condition(a, b) {
            return false;
        }
        if !self.is_boundary_edge(a, b) && self.is_boundary_vertex(a) && self.is_boundary_vertex(b) {
            return false;
        }
        self.edge_apexes(a, b)
            .into_iter()
            .all(|apex| self.is_boundary_vertex(apex) || self.neighbors(apex).len() > 3)
    }

    fn quadric_error(q: &Matrix4<f64>, p: &Point3f) -> f64 {
        let vh = Vector4::new(p.x as f64, p.y as f64, p.z as f64, 1.0);
        (vh.transpose() * q * vh)[0].max(0.0)
    }

    fn mode_position(&self, keep: usize, remove: usize, q: &Matrix4<f64>, mode: CollapseMode) -> Point3f {
        let pk = self.positions[keep];
        let pr = self.positions[remove];
        let mid = Point3f::from((pk.coords + pr.coords) * 0.5);
        match mode {
            CollapseMode::AverageVertexPosition => mid,
            CollapseMode::MinimalExistingVertexError => {
                if Self::quadric_error(q, &pk) <= Self::quadric_error(q, &pr) {
                    pk
                } else {
                    pr
                }
            }
            CollapseMode::MinimalQuadricPositionError => {
                let q3 = q.fixed_view::<3, 3>(0, 0).clone_owned();
                let q1 = q.fixed_view::<3, 1>(0, 3).clone_owned();
                let edge_length = (pr - pk).norm();
                let optimal = if q3.determinant().abs() > 1e-12 {
                    q3.try_inverse().map(|inv| {
                        let p = -inv * q1;
                        Point3f::new(p[0] as f32, p[1] as f32, p[2] as f32)
                    })
                } else {
                    None
                };
                // near-singular systems can place the vertex far away
                match optimal {
                    Some(p) if p.coords.iter().all(|x| x.is_finite()) && (p - mid).norm() <= 2.0 * edge_length => p,
                    _ => [pk, pr, mid]
                        .into_iter()
                        .min_by(|a, b| Self::quadric_error(q, a).total_cmp(&Self::quadric_error(q, b)))
                        .unwrap_or(mid),
                }
            }
        }
    }

    /// Decide which endpoint survives and where it goes, honoring the
    /// vertex and edge constraints. `None` if the edge may not collapse.
    fn collapse_target(&self, a: usize, b: usize, rules: &CollapseRules) -> Option<CollapseTarget> {
        let c = &self.constraints;
        if !c.can_collapse_edge(a, b) {
            return None;
        }
        let (ra, rb) = (c.is_removable(a), c.is_removable(b));
        let (fa, fb) = (c.is_on_feature(a), c.is_on_feature(b));
        let (ba, bb) = (self.is_boundary_vertex(a), self.is_boundary_vertex(b));
        let along_feature = self.is_feature_edge(a, b);

        // never pinch two feature lines together across an ordinary edge
        if (fa || ba) && (fb || bb) && !along_feature {
            return None;
        }

        let (keep, remove) = if !rb {
            if !ra {
                return None;
            }
            (b, a)
        } else if !ra {
            (a, b)
        } else if (fb && !fa) || (bb && !ba) {
            (b, a)
        } else {
            (a, b)
        };

        let keep_on_line = c.is_on_feature(keep) || self.is_boundary_vertex(keep);
        let remove_on_line = c.is_on_feature(remove) || self.is_boundary_vertex(remove);
        if remove_on_line && !keep_on_line {
            return None;
        }

        let quadric = self.quadrics[a] + self.quadrics[b];
        let pk = self.positions[keep];
        let position = if !c.is_movable(keep) || (keep_on_line && !remove_on_line) {
            pk
        } else {
            let p = self.mode_position(keep, remove, &quadric, rules.mode);
            if keep_on_line {
                clamp_to_segment(&p, &pk, &self.positions[remove])
            } else {
                p
            }
        };

        Some(CollapseTarget {
            keep,
            remove,
            position,
            quadric,
        })
    }

    /// Unit normals of the live faces around `v`
    fn vertex_face_normals(&self, v: usize) -> Vec<Vector3f> {
        self.outgoing_half_edges(v)
            .into_iter()
            .filter_map(|he| {
                let fi = self.half_edges[he].face;
                if fi == INVALID {
                    return None;
                }
                let [a, b, c] = self.face_vertices(fi).map(|x| self.positions[x]);
                face_normal(&a, &b, &c)
            })
            .collect()
    }

    /// Neighbors of `v` connected through boundary or feature edges
    fn line_neighbors(&self, v: usize) -> Vec<usize> {
        self.neighbors(v)
            .into_iter()
            .filter(|&x| self.is_feature_edge(v, x))
            .collect()
    }

    /// True if removing `v` by collapsing it toward `toward` leaves the
    /// shape unchanged: its faces are coplanar within the angle and, on a
    /// boundary or feature line, the line is straight through `v` and the
    /// collapse runs along it.
    fn is_flat(&self, v: usize, toward: usize, cosine: f64) -> bool {
        let normals = self.vertex_face_normals(v);
        let Some(n0) = normals.first() else {
            return false;
        };
        if normals.iter().any(|n| (n.dot(n0) as f64) < cosine) {
            return false;
        }
        let line = self.line_neighbors(v);
        if line.is_empty() {
            return true;
        }
        if line.len() != 2 || !line.contains(&toward) {
            return false;
        }
        let p = self.positions[v];
        let incoming = (p - self.positions[line[0]]).try_normalize(f32::EPSILON);
        let outgoing = (self.positions[line[1]] - p).try_normalize(f32::EPSILON);
        match (incoming, outgoing) {
            (Some(d0), Some(d1)) => d0.dot(&d1) as f64 >= cosine,
            _ => false,
        }
    }

    /// Shape-preserving variant of [`Self::collapse_target`]: the removed
    /// vertex must be flat, and the survivor only moves when it is flat too.
    fn minimal_target(&self, a: usize, b: usize, rules: &CollapseRules, cosine: f64) -> Option<CollapseTarget> {
        let base = self.collapse_target(a, b, rules)?;
        let c = &self.constraints;
        for (keep, remove) in [(base.keep, base.remove), (base.remove, base.keep)] {
            let keep_on_line = c.is_on_feature(keep) || self.is_boundary_vertex(keep);
            let remove_on_line = c.is_on_feature(remove) || self.is_boundary_vertex(remove);
            if !c.is_removable(remove) || (remove_on_line && !keep_on_line) {
                continue;
            }
            if !self.is_flat(remove, keep, cosine) {
                continue;
            }
            let pk = self.positions[keep];
            let keep_flat = c.is_movable(keep)
                && c.is_removable(keep)
                && keep_on_line == remove_on_line
                && self.is_flat(keep, remove, cosine);
            let position = if keep_flat {
                let p = self.mode_position(keep, remove, &base.quadric, rules.mode);
                clamp_to_segment(&p, &pk, &self.positions[remove])
            } else {
                pk
            };
            return Some(CollapseTarget {
                keep,
                remove,
                position,
                quadric: base.quadric,
            });
        }
        None
    }

    /// Reject collapses that flip or degenerate a surviving face
    fn preserves_orientation(&self, target: &CollapseTarget, tolerance: f64) -> bool {
        let CollapseTarget {
            keep,
            remove,
            position,
            ..
        } = *target;
        for v in [keep, remove] {
            for he in self.outgoing_half_edges(v) {
                let fi = self.half_edges[he].face;
                if fi == INVALID {
                    continue;
                }
                let corners = self.face_vertices(fi);
                if corners.contains(&keep) && corners.contains(&remove) {
                    continue;
                }
                let [a, b, c] = corners.map(|x| self.positions[x]);
                let Some(before) = face_normal(&a, &b, &c) else {
                    continue;
                };
                let [a, b, c] = corners.map(|x| if x == keep || x == remove { position } else { self.positions[x] });
                let Some(after) = face_normal(&a, &b, &c) else {
                    return false;
                };
                if (before.dot(&after) as f64) < tolerance {
                    return false;
                }
            }
        }
        true
    }

    fn plan_collapse(&self, a: usize, b: usize, rules: &CollapseRules) -> Option<CollapseTarget> {
        let target = match rules.flat_cosine {
            Some(cosine) => self.minimal_target(a, b, rules, cosine)?,
            None => self.collapse_target(a, b, rules)?,
        };
        if !self.is_topologically_safe(a, b) {
            return None;
        }
        if !self.preserves_orientation(&target, rules.edge_flip_tolerance) {
            return None;
        }
        Some(target)
    }

    /// Overlay value at the corner of `v` in one of its faces
    fn overlay_value<T: Clone>(&self, overlay: &Overlay<T>, v: usize) -> Option<T> {
        if overlay.is_empty() {
            return None;
        }
        let he = self.vertex_edge[v];
        if he == INVALID {
            return None;
        }
        let tri = overlay.triangle(self.half_edges[he].face)?;
        Some(overlay.element(tri[he % 3]).clone())
    }

    fn vertex_normal(&self, v: usize) -> Option<Vector3f> {
        match (&self.normals, &self.attributes) {
            (Some(normals), _) => Some(normals[v]),
            (None, Some(attributes)) => self.overlay_value(&attributes.normals, v),
            _ => None,
        }
    }

    fn vertex_uv(&self, v: usize) -> Option<Uv> {
        match (&self.uvs, &self.attributes) {
            (Some(uvs), _) => Some(uvs[v]),
            (None, Some(attributes)) => self.overlay_value(&attributes.uv, v),
            _ => None,
        }
    }

    fn attribute_penalty(&self, a: usize, b: usize) -> f64 {
        let length_sq = (self.positions[a] - self.positions[b]).norm_squared() as f64;
        let normal_term = match (self.vertex_normal(a), self.vertex_normal(b)) {
            (Some(na), Some(nb)) => (1.0 - na.dot(&nb) as f64).max(0.0) * length_sq,
            _ => 0.0,
        };
        let uv_term = match (self.vertex_uv(a), self.vertex_uv(b)) {
            (Some(ua), Some(ub)) => uv_distance_squared(ua, ub) as f64,
            _ => 0.0,
        };
        ATTRIBUTE_WEIGHT * (normal_term + uv_term)
    }

    fn edge_cost(&self, a: usize, b: usize, rules: &CollapseRules) -> Option<EdgeCost> {
        if let Some(max_length) = rules.max_edge_length {
            if (self.positions[a] - self.positions[b]).norm() as f64 >= max_length {
                return None;
            }
        }
        let target = self.collapse_target(a, b, rules)?;
        let mut cost = Self::quadric_error(&target.quadric, &target.position);
        if rules.attribute_aware {
            cost += self.attribute_penalty(a, b);
        }
        Some(EdgeCost { cost })
    }

    /// Build the initial priority queue of edge collapse candidates.
    fn build_queue(&self, rules: &CollapseRules) -> PriorityQueue<(usize, usize), EdgeCost> {
        let mut queue = PriorityQueue::new();
        for v in 0..self.positions.len() {
            if !self.is_alive(v) {
                continue;
            }
            for x in self.neighbors(v) {
                if v < x {
                    if let Some(cost) = self.edge_cost(v, x, rules) {
                        queue.push((v, x), cost);
                    }
                }
            }
        }
        queue
    }

    fn update_queue(&self, queue: &mut PriorityQueue<(usize, usize), EdgeCost>, a: usize, b: usize, rules: &CollapseRules) {
        let key = edge_key(a, b);
        match self.edge_cost(a, b, rules) {
            Some(cost) => {
                queue.push(key, cost);
            }
            None => {
                queue.remove(&key);
            }
        }
    }

    /// Find any valid outgoing half-edge from a vertex (linear scan fallback).
    fn find_valid_outgoing(&self, v: usize) -> usize {
        for (i, he) in self.half_edges.iter().enumerate() {
            if he.face != INVALID && self.source(i) == v {
                return i;
            }
        }
        INVALID
    }

    /// Collapse the planned edge, merging `remove` into `keep`.
    /// Returns true on success.
    fn collapse_edge(&mut self, target: &CollapseTarget, rules: &CollapseRules) -> bool {
        let CollapseTarget {
            keep,
            remove,
            position,
            ..
        } = *target;
        let h = match self.find_edge(keep, remove) {
            Some(h) => h,
            None => return false,
        };

        let h_twin = self.half_edges[h].twin;
        let h_next = self.half_edges[h].next;
        let h_prev = self.half_edges[h].prev;
        let face_a = self.half_edges[h].face;
        let h_next_twin = self.half_edges[h_next].twin;
        let h_prev_twin = self.half_edges[h_prev].twin;
        let c = self.half_edges[h_next].target;

        let (face_b, ht_next, ht_prev, ht_next_twin, ht_prev_twin, d) = if h_twin != INVALID {
            let hn = self.half_edges[h_twin].next;
            let hp = self.half_edges[h_twin].prev;
            (
                self.half_edges[h_twin].face,
                hn,
                hp,
                self.half_edges[hn].twin,
                self.half_edges[hp].twin,
                self.half_edges[hn].target,
            )
        } else {
            (INVALID, INVALID, INVALID, INVALID, INVALID, INVALID)
        };

        // Collect remove's outgoing edges and corners BEFORE any modifications
        let remove_outgoing = self.outgoing_half_edges(remove);
        let removed_faces: Vec<(usize, usize, usize)> = [face_a, face_b]
            .into_iter()
            .filter(|&f| f != INVALID)
            .filter_map(|f| {
                let corners = self.face_vertices(f);
                let kc = corners.iter().position(|&x| x == keep)?;
                let rc = corners.iter().position(|&x| x == remove)?;
                Some((f, kc, rc))
            })
            .collect();
        let remove_corners: Vec<(usize, usize)> = remove_outgoing
            .iter()
            .map(|&he| (self.half_edges[he].face, he % 3))
            .filter(|&(f, _)| f != INVALID && f != face_a && f != face_b)
            .collect();

        let pk = self.positions[keep];
        let pr = self.positions[remove];
        let span = (pr - pk).norm_squared();
        let t = if span > 0.0 {
            ((position - pk).dot(&(pr - pk)) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Re-pair twins for face A border edges
        if h_next_twin != INVALID {
            self.half_edges[h_next_twin].twin = h_prev_twin;
        }
        if h_prev_twin != INVALID {
            self.half_edges[h_prev_twin].twin = h_next_twin;
        }

        // Mark face A as removed
        self.half_edges[h].face = INVALID;
        self.half_edges[h_next].face = INVALID;
        self.half_edges[h_prev].face = INVALID;
        self.face_edge[face_a] = INVALID;
        self.active_face_count -= 1;

        // Handle face B
        if face_b != INVALID {
            if ht_next_twin != INVALID {
                self.half_edges[ht_next_twin].twin = ht_prev_twin;
            }
            if ht_prev_twin != INVALID {
                self.half_edges[ht_prev_twin].twin = ht_next_twin;
            }
            self.half_edges[h_twin].face = INVALID;
            self.half_edges[ht_next].face = INVALID;
            self.half_edges[ht_prev].face = INVALID;
            self.face_edge[face_b] = INVALID;
            self.active_face_count -= 1;
        }

        // Redirect all remove references to keep
        for &he in &remove_outgoing {
            let prev = self.half_edges[he].prev;
            self.half_edges[prev].target = keep;

            let twin = self.half_edges[he].twin;
            if twin != INVALID && self.half_edges[twin].face != INVALID {
                self.half_edges[twin].target = keep;
            }
        }

        // Mark remove as removed
        self.vertex_edge[remove] = INVALID;
        self.vertex_removed[remove] = true;
        self.active_vertex_count -= 1;

        // Fix vertex_edge pointers for the survivor and both apexes
        let candidates = [h_next_twin, h_prev_twin, ht_next_twin, ht_prev_twin];
        for v in [keep, c, d] {
            if v == INVALID || self.vertex_removed[v] {
                continue;
            }
            let current = self.vertex_edge[v];
            if current != INVALID && self.half_edges[current].face != INVALID && self.source(current) == v {
                continue;
            }
            let replacement = candidates
                .iter()
                .chain(remove_outgoing.iter())
                .copied()
                .find(|&he| he != INVALID && self.half_edges[he].face != INVALID && self.source(he) == v)
                .unwrap_or_else(|| self.find_valid_outgoing(v));
            self.vertex_edge[v] = replacement;
            if replacement == INVALID {
                // lost its last face
                self.vertex_removed[v] = true;
                self.active_vertex_count -= 1;
            }
        }

        self.merge_vertex_data(keep, remove, t, &removed_faces, &remove_corners);

        self.positions[keep] = position;
        self.constraints.merge_vertex(keep, remove);
        if rules.retain_quadric_memory {
            let removed_quadric = self.quadrics[remove];
            self.quadrics[keep] += removed_quadric;
        } else if !self.vertex_removed[keep] {
            self.quadrics[keep] = self.vertex_quadric(keep);
        }

        true
    }

    /// Blend per-vertex data and overlay elements of `remove` into `keep`,
    /// `t` being the survivor's new position along the edge.
    fn merge_vertex_data(
        &mut self,
        keep: usize,
        remove: usize,
        t: f32,
        removed_faces: &[(usize, usize, usize)],
        remove_corners: &[(usize, usize)],
    ) {
        if let Some(ref mut normals) = self.normals {
            normals[keep] = blend_normal(&normals[keep], &normals[remove], t);
        }

        if let Some(ref mut colors) = self.colors {
            let (c1, c2) = (colors[keep], colors[remove]);
            colors[keep] = std::array::from_fn(|i| (c1[i] as f32 + (c2[i] as f32 - c1[i] as f32) * t).round() as u8);
        }

        if let Some(ref mut uvs) = self.uvs {
            uvs[keep] = lerp_uv(uvs[keep], uvs[remove], t);
        }

        if let Some(ref mut attributes) = self.attributes {
            merge_overlay(&mut attributes.uv, keep, removed_faces, remove_corners, |a, b| lerp_uv(*a, *b, t));
            merge_overlay(&mut attributes.normals, keep, removed_faces, remove_corners, |a, b| {
                blend_normal(a, b, t)
            });
        }
    }

    /// Snap every live, movable vertex onto `target`
    fn project_onto(&mut self, target: &dyn ProjectionTarget) {
        let movable: Vec<bool> = (0..self.positions.len())
            .map(|v| self.is_alive(v) && self.constraints.is_movable(v))
            .collect();
        self.positions
            .par_iter_mut()
            .zip(movable.par_iter())
            .filter(|(_, m)| **m)
            .for_each(|(p, _)| *p = target.project(p));
    }

    fn reached(&self, stop: StopCondition) -> bool {
        match stop {
            StopCondition::TriangleCount(n) => self.active_face_count <= n,
            StopCondition::VertexCount(n) => self.active_vertex_count <= n,
            StopCondition::EdgeLength(_) | StopCondition::MinimalShapePreserving { .. } => false,
        }
    }

    fn into_triangle_mesh(self) -> TriangleMesh {
        let kept: Vec<usize> = (0..self.face_edge.len())
            .filter(|&fi| self.face_edge[fi] != INVALID)
            .filter(|&fi| {
                let [a, b, c] = self.face_vertices(fi);
                a != b && b != c && c != a
            })
            .collect();
        let faces: Vec<[usize; 3]> = kept.iter().map(|&fi| self.face_vertices(fi)).collect();
        let vertex_count = self.positions.len();

        let mut mesh = TriangleMesh::from_vertices_and_faces(self.positions, faces);
        mesh.normals = self.normals;
        mesh.colors = self.colors;
        mesh.uvs = self.uvs;
        mesh.material_ids = self
            .material_ids
            .map(|ids| kept.iter().map(|&fi| ids[fi]).collect());
        mesh.polygroups = self
            .polygroups
            .map(|groups| kept.iter().map(|&fi| groups[fi]).collect());
        mesh.attributes = self.attributes.map(|mut attributes| {
            let identity: Vec<Option<usize>> = (0..vertex_count).map(Some).collect();
            attributes.compact(&kept, &identity);
            attributes
        });
        mesh.compact();
        mesh
    }
}

fn clamp_to_segment(p: &Point3f, a: &Point3f, b: &Point3f) -> Point3f {
    let ab = b - a;
    let length_sq = ab.norm_squared();
    if length_sq <= 0.0 {
        return *a;
    }
    let t = ((p - a).dot(&ab) / length_sq).clamp(0.0, 1.0);
    a + ab * t
}

fn blend_normal(a: &Vector3f, b: &Vector3f, t: f32) -> Vector3f {
    (a * (1.0 - t) + b * t).try_normalize(f32::EPSILON).unwrap_or(*a)
}

/// Fold the overlay elements of a collapsed edge: elements of `remove`
/// in the removed faces merge into the matching `keep` elements, and every
/// other element of `remove` is handed over to `keep`.
fn merge_overlay<T: Clone>(
    overlay: &mut Overlay<T>,
    keep: usize,
    removed_faces: &[(usize, usize, usize)],
    remove_corners: &[(usize, usize)],
    blend: impl Fn(&T, &T) -> T,
) {
    if overlay.is_empty() {
        return;
    }
    let mut remap: HashMap<usize, usize> = HashMap::new();
    for &(fi, kc, rc) in removed_faces {
        let Some(tri) = overlay.triangle(fi) else {
            continue;
        };
        let (ek, er) = (tri[kc], tri[rc]);
        if ek == er || remap.contains_key(&er) {
            continue;
        }
        let merged = blend(overlay.element(ek), overlay.element(er));
        overlay.set_element(ek, merged);
        remap.insert(er, ek);
    }
    for &(fi, corner) in remove_corners {
        let Some(mut tri) = overlay.triangle(fi) else {
            continue;
        };
        let element = tri[corner];
        match remap.get(&element) {
            Some(&replacement) => {
                tri[corner] = replacement;
                overlay.set_triangle(fi, tri);
            }
            None => overlay.set_parent_vertex(element, keep),
        }
    }
}

// ============================================================
// Edge Cost for Priority Queue
// ============================================================

#[derive(Debug, Clone, Copy)]
struct EdgeCost {
    cost: f64,
}

impl PartialEq for EdgeCost {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal
    }
}
impl Eq for EdgeCost {}

impl PartialOrd for EdgeCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCost {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smallest cost first
        other.cost.total_cmp(&self.cost)
    }
}

// ============================================================
// Edge Collapse Reducer
// ============================================================

/// Edge collapse reducer using a half-edge data structure and QEM.
///
/// The reducer builds a half-edge mesh for efficient local topology
/// queries (neighbor iteration, boundary detection, link condition checks)
/// and uses quadric error metrics to prioritize edge collapses. The
/// attribute-aware kind adds normal and UV differences to each edge's cost.
pub struct EdgeCollapseReducer {
    kind: ReducerKind,
    setup: Option<ReducerSetup>,
    projection: Option<Arc<dyn ProjectionTarget>>,
    geometric_tolerance: Option<f64>,
}

impl EdgeCollapseReducer {
    pub fn new(kind: ReducerKind) -> Self {
        Self {
            kind,
            setup: None,
            projection: None,
            geometric_tolerance: None,
        }
    }

    pub fn quadric() -> Self {
        Self::new(ReducerKind::Quadric)
    }

    pub fn attribute_aware() -> Self {
        Self::new(ReducerKind::AttributeAware)
    }

    pub fn kind(&self) -> ReducerKind {
        self.kind
    }

    /// Reject a collapse whose new position strays beyond the geometric
    /// tolerance from the projection target
    fn within_tolerance(&self, position: &Point3f) -> bool {
        match (&self.projection, self.geometric_tolerance) {
            (Some(target), Some(tolerance)) => target.distance(position) as f64 <= tolerance,
            _ => true,
        }
    }
}

impl ReductionEngine for EdgeCollapseReducer {
    fn configure(&mut self, setup: ReducerSetup) {
        self.setup = Some(setup);
    }

    fn set_projection_target(&mut self, target: Arc<dyn ProjectionTarget>) {
        self.projection = Some(target);
    }

    fn set_geometric_error_criterion(&mut self, tolerance: f64) {
        self.geometric_tolerance = Some(tolerance);
    }

    fn reduce(&mut self, mesh: &mut TriangleMesh, stop: StopCondition) -> Result<ReductionStats> {
        let mut stats = ReductionStats::default();
        if mesh.is_empty() {
            return Ok(stats);
        }
        mesh.validate()?;

        let setup = self
            .setup
            .clone()
            .unwrap_or_else(|| ReducerSetup::new(MeshConstraints::new()));
        let rules = CollapseRules::new(self.kind, &setup, stop);
        let mut hem = HalfEdgeMesh::from_triangle_mesh(mesh, setup.constraints);
        let mut queue = hem.build_queue(&rules);

        while !hem.reached(stop) {
            let ((a, b), _) = match queue.pop() {
                Some(item) => item,
                None => break,
            };

            // Validate: both vertices still alive and still neighbors
            if !hem.is_alive(a) || !hem.is_alive(b) || hem.find_edge(a, b).is_none() {
                continue;
            }

            let target = match hem.plan_collapse(a, b, &rules) {
                Some(target) if self.within_tolerance(&target.position) => target,
                _ => {
                    stats.collapses_rejected += 1;
                    continue;
                }
            };

            let stale = hem.neighbors(target.remove);
            if !hem.collapse_edge(&target, &rules) {
                stats.collapses_rejected += 1;
                continue;
            }
            stats.collapses_performed += 1;

            for x in stale {
                queue.remove(&edge_key(target.remove, x));
            }
            if hem.is_alive(target.keep) {
                for x in hem.neighbors(target.keep) {
                    hem.update_queue(&mut queue, target.keep, x, &rules);
                }
            }
        }

        if setup.projection_mode == ProjectionMode::AfterRefinement {
            if let Some(target) = &self.projection {
                hem.project_onto(target.as_ref());
            }
        }

        let before = mesh.triangle_count();
        *mesh = hem.into_triangle_mesh();
        debug!(
            kind = ?self.kind,
            ?stop,
            before,
            after = mesh.triangle_count(),
            collapses = stats.collapses_performed,
            rejected = stats.collapses_rejected,
            "Edge collapse reduction finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{build_constraints, ConstraintPolicy};
    use crate::projection::MeshProjectionIndex;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use std::collections::HashSet;

    fn make_single_triangle() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
    }

    fn make_tetrahedron() -> TriangleMesh {
        // Consistently wound: each shared edge appears in opposite directions
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
                Point3::new(0.5, 0.5, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    fn make_plane_grid(size: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        for y in 0..size {
            for x in 0..size {
                vertices.push(Point3::new(x as f32, y as f32, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..(size - 1) {
            for x in 0..(size - 1) {
                let tl = y * size + x;
                let tr = tl + 1;
                let bl = (y + 1) * size + x;
                let br = bl + 1;
                faces.push([tl, bl, tr]);
                faces.push([tr, bl, br]);
            }
        }
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    fn make_curved_surface(size: usize) -> TriangleMesh {
        let mut mesh = make_plane_grid(size);
        for p in &mut mesh.vertices {
            let fx = p.x / (size - 1) as f32 * std::f32::consts::PI;
            let fy = p.y / (size - 1) as f32 * std::f32::consts::PI;
            p.z = (fx.sin() * fy.sin()) * 2.0;
        }
        mesh
    }

    fn make_diamond() -> TriangleMesh {
        // Two tetrahedra glued at base, consistently wound (6 faces)
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
                Point3::new(0.5, 0.5, 1.0),
                Point3::new(0.5, 0.5, -1.0),
            ],
            vec![
                [0, 1, 3],
                [1, 2, 3],
                [0, 3, 2],
                [0, 4, 1],
                [1, 4, 2],
                [0, 2, 4],
            ],
        )
    }

    fn configured(kind: ReducerKind, mesh: &TriangleMesh, mode: CollapseMode) -> EdgeCollapseReducer {
        let mut reducer = EdgeCollapseReducer::new(kind);
        let mut setup = ReducerSetup::new(build_constraints(mesh, &ConstraintPolicy::DEFAULT));
        setup.collapse_mode = mode;
        reducer.configure(setup);
        reducer
    }

    fn quantized(p: &Point3f) -> (i32, i32, i32) {
        ((p.x * 100.0).round() as i32, (p.y * 100.0).round() as i32, (p.z * 100.0).round() as i32)
    }

    // ---- Half-edge structure tests ----

    #[test]
    fn test_halfedge_construction() {
        let mesh = make_tetrahedron();
        let hem = HalfEdgeMesh::from_triangle_mesh(&mesh, MeshConstraints::new());
        assert_eq!(hem.half_edges.len(), 12); // 4 faces * 3
        assert_eq!(hem.active_face_count, 4);
        assert_eq!(hem.active_vertex_count, 4);

        // Every interior half-edge should have a twin
        for he in &hem.half_edges {
            assert_ne!(he.twin, INVALID, "interior half-edge should have twin");
        }
    }

    #[test]
    fn test_halfedge_boundary() {
        let mesh = make_single_triangle();
        let hem = HalfEdgeMesh::from_triangle_mesh(&mesh, MeshConstraints::new());
        for he in &hem.half_edges {
            assert_eq!(he.twin, INVALID);
        }
        for v in 0..3 {
            assert!(hem.is_boundary_vertex(v));
            assert_eq!(hem.neighbors(v).len(), 2);
        }
    }

    #[test]
    fn test_halfedge_neighbors() {
        let mesh = make_tetrahedron();
        let hem = HalfEdgeMesh::from_triangle_mesh(&mesh, MeshConstraints::new());
        for v in 0..4 {
            assert_eq!(hem.neighbors(v).len(), 3, "tetrahedron vertex should have 3 neighbors");
        }
    }

    #[test]
    fn test_boundary_corner_sees_both_rim_neighbors() {
        let mesh = make_plane_grid(3);
        let hem = HalfEdgeMesh::from_triangle_mesh(&mesh, MeshConstraints::new());
        // corner 0 touches only face [0, 3, 1]
        assert_eq!(hem.neighbors(0), BTreeSet::from([1, 3]));
        assert!(hem.is_boundary_edge(0, 1));
        assert!(!hem.is_boundary_vertex(4));
    }

    #[test]
    fn test_link_condition_tetrahedron() {
        let mesh = make_tetrahedron();
        let hem = HalfEdgeMesh::from_triangle_mesh(&mesh, MeshConstraints::new());
        assert!(hem.check_link_condition(0, 1));
        assert!(hem.check_link_condition(1, 2));
        // but collapsing would leave a valence-2 apex
        assert!(!hem.is_topologically_safe(0, 1));
    }

    #[test]
    fn test_interior_edge_between_boundary_vertices_rejected() {
        let mesh = make_plane_grid(3);
        let hem = HalfEdgeMesh::from_triangle_mesh(&mesh, MeshConstraints::new());
        // edge 1-3 is interior but joins two boundary vertices
        assert!(hem.find_edge(1, 3).is_some());
        assert!(!hem.is_boundary_edge(1, 3));
        assert!(!hem.is_topologically_safe(1, 3));
    }

    // ---- Reduction tests ----

    #[test]
    fn test_empty_mesh_is_noop() {
        let mut reducer = EdgeCollapseReducer::quadric();
        let mut mesh = TriangleMesh::new();
        let stats = reducer.reduce_to_triangle_count(&mut mesh, 0).unwrap();
        assert_eq!(stats, ReductionStats::default());
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_invalid_indices_rejected() {
        let mut reducer = EdgeCollapseReducer::quadric();
        let mut mesh = make_single_triangle();
        mesh.faces[0] = [0, 1, 7];
        assert!(reducer.reduce_to_triangle_count(&mut mesh, 0).is_err());
    }

    #[test]
    fn test_target_already_met() {
        let mut reducer = EdgeCollapseReducer::quadric();
        let mut mesh = make_curved_surface(5);
        let before = mesh.clone();
        let stats = reducer.reduce_to_triangle_count(&mut mesh, 100).unwrap();
        assert_eq!(stats.collapses_performed, 0);
        assert_eq!(mesh.faces, before.faces);
        assert_eq!(mesh.vertices, before.vertices);
    }

    #[test]
    fn test_closed_mesh_never_collapses_below_manifold() {
        let mut reducer = EdgeCollapseReducer::quadric();
        let mut mesh = make_diamond();
        reducer.reduce_to_triangle_count(&mut mesh, 0).unwrap();
        assert!(mesh.face_count() >= 4);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_curved_surface_triangle_target() {
        let mut mesh = make_curved_surface(8);
        let original_faces = mesh.face_count();
        let mut reducer = configured(ReducerKind::Quadric, &mesh, CollapseMode::MinimalQuadricPositionError);

        let stats = reducer.reduce_to_triangle_count(&mut mesh, original_faces / 2).unwrap();
        assert!(stats.collapses_performed > 0);
        assert!(mesh.face_count() <= original_faces / 2);
        assert!(mesh.face_count() > 0);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_vertex_count_target() {
        let mut mesh = make_curved_surface(8);
        let mut reducer = configured(ReducerKind::Quadric, &mesh, CollapseMode::MinimalQuadricPositionError);
        reducer.reduce_to_vertex_count(&mut mesh, 40).unwrap();
        assert!(mesh.vertex_count() <= 40);
    }

    #[test]
    fn test_edge_length_target_only_collapses_short_edges() {
        let mut mesh = make_plane_grid(5);
        let before = mesh.clone();
        let mut reducer = configured(ReducerKind::Quadric, &mesh, CollapseMode::MinimalQuadricPositionError);
        // every grid edge is at least 1.0 long
        let stats = reducer.reduce_to_edge_length(&mut mesh, 0.5).unwrap();
        assert_eq!(stats.collapses_performed, 0);
        assert_eq!(mesh.face_count(), before.face_count());
    }

    #[test]
    fn test_boundary_preservation() {
        let size = 6;
        let mut mesh = make_plane_grid(size);
        let original_boundary: HashSet<(i32, i32, i32)> = mesh
            .vertices
            .iter()
            .filter(|p| p.x == 0.0 || p.y == 0.0 || p.x == (size - 1) as f32 || p.y == (size - 1) as f32)
            .map(quantized)
            .collect();

        let mut reducer = configured(ReducerKind::Quadric, &mesh, CollapseMode::MinimalQuadricPositionError);
        reducer.reduce_to_triangle_count(&mut mesh, 25).unwrap();

        // boundary vertices may only slide along the square's outline
        for p in &mesh.vertices {
            let on_outline = p.x.abs() < 1e-4
                || p.y.abs() < 1e-4
                || (p.x - (size - 1) as f32).abs() < 1e-4
                || (p.y - (size - 1) as f32).abs() < 1e-4;
            let interior = p.x > 0.0 && p.y > 0.0 && p.x < (size - 1) as f32 && p.y < (size - 1) as f32;
            assert!(on_outline || interior);
        }
        // corners are fixed
        let result: HashSet<(i32, i32, i32)> = mesh.vertices.iter().map(quantized).collect();
        for corner in [(0, 0, 0), (500, 0, 0), (0, 500, 0), (500, 500, 0)] {
            assert!(original_boundary.contains(&corner));
            assert!(result.contains(&corner), "corner {:?} should survive", corner);
        }
    }

    #[test]
    fn test_existing_vertex_mode_keeps_original_positions() {
        let mut mesh = make_curved_surface(7);
        let original: HashSet<(i32, i32, i32)> = mesh.vertices.iter().map(quantized).collect();
        let mut reducer = configured(ReducerKind::Quadric, &mesh, CollapseMode::MinimalExistingVertexError);
        reducer.reduce_to_triangle_count(&mut mesh, 30).unwrap();
        for p in &mesh.vertices {
            assert!(original.contains(&quantized(p)), "{:?} is not an input position", p);
        }
    }

    #[test]
    fn test_minimal_reduction_flattens_planar_grid() {
        let mut mesh = make_plane_grid(6);
        let mut reducer = configured(ReducerKind::Quadric, &mesh, CollapseMode::AverageVertexPosition);
        let stats = reducer.reduce_to_minimal_shape_preserving(&mut mesh, 0.01).unwrap();

        assert!(stats.collapses_performed > 0);
        // a flat square needs no more than its corners and rim
        assert!(mesh.face_count() < 50);
        for p in &mesh.vertices {
            assert_relative_eq!(p.z, 0.0, epsilon = 1e-6);
            assert!(p.x >= -1e-5 && p.x <= 5.0 + 1e-5 && p.y >= -1e-5 && p.y <= 5.0 + 1e-5);
        }
        // surface area is unchanged
        let area: f32 = mesh
            .faces
            .iter()
            .map(|f| {
                let (a, b, c) = (mesh.vertices[f[0]], mesh.vertices[f[1]], mesh.vertices[f[2]]);
                (b - a).cross(&(c - a)).norm() * 0.5
            })
            .sum();
        assert_relative_eq!(area, 25.0, epsilon = 1e-3);
    }

    #[test]
    fn test_minimal_reduction_keeps_curvature() {
        let mut mesh = make_curved_surface(6);
        let before = mesh.face_count();
        let mut reducer = configured(ReducerKind::Quadric, &mesh, CollapseMode::AverageVertexPosition);
        reducer.reduce_to_minimal_shape_preserving(&mut mesh, 0.01).unwrap();
        // interior vertices all sit on curved patches
        assert!(mesh.face_count() > before / 2);
    }

    #[test]
    fn test_fully_constrained_edges_survive() {
        let mut mesh = make_plane_grid(5);
        let mut constraints = build_constraints(&mesh, &ConstraintPolicy::DEFAULT);
        // pin the middle row
        for x in 0..4 {
            constraints.set_edge(
                10 + x,
                11 + x,
                crate::constraints::EdgeConstraint {
                    protection: crate::constraints::EdgeProtection::FullyConstrained,
                    features: Default::default(),
                },
            );
        }
        for v in 10..15 {
            constraints.set_vertex(v, crate::constraints::VertexConstraint::FIXED);
        }
        let mut reducer = EdgeCollapseReducer::quadric();
        reducer.configure(ReducerSetup::new(constraints));
        reducer.reduce_to_triangle_count(&mut mesh, 4).unwrap();

        let result: HashSet<(i32, i32, i32)> = mesh.vertices.iter().map(quantized).collect();
        for x in 0..5 {
            assert!(result.contains(&(x * 100, 200, 0)));
        }
    }

    #[test]
    fn test_attribute_preservation_normals() {
        let mut mesh = make_plane_grid(5);
        mesh.set_normals(vec![Vector3f::new(0.0, 0.0, 1.0); mesh.vertex_count()]);

        let mut reducer = configured(ReducerKind::AttributeAware, &mesh, CollapseMode::MinimalQuadricPositionError);
        reducer.reduce_to_triangle_count(&mut mesh, 20).unwrap();
        let result_normals = mesh.normals.as_ref().unwrap();
        assert_eq!(result_normals.len(), mesh.vertex_count());
        for n in result_normals {
            assert!(n.z > 0.9, "normal z should be close to 1.0, got {}", n.z);
        }
    }

    #[test]
    fn test_attribute_preservation_colors_and_ids() {
        let mut mesh = make_plane_grid(5);
        mesh.set_colors(vec![[128, 64, 200]; mesh.vertex_count()]);
        mesh.set_polygroups(vec![3; mesh.face_count()]);
        mesh.set_material_ids(vec![1; mesh.face_count()]);

        let mut reducer = configured(ReducerKind::Quadric, &mesh, CollapseMode::MinimalQuadricPositionError);
        reducer.reduce_to_triangle_count(&mut mesh, 16).unwrap();
        assert_eq!(mesh.colors.as_ref().unwrap().len(), mesh.vertex_count());
        assert!(mesh.colors.as_ref().unwrap().iter().all(|c| *c == [128, 64, 200]));
        assert_eq!(mesh.polygroups.as_ref().unwrap().len(), mesh.face_count());
        assert!(mesh.polygroups.as_ref().unwrap().iter().all(|&g| g == 3));
        assert_eq!(mesh.material_ids.as_ref().unwrap().len(), mesh.face_count());
    }

    #[test]
    fn test_overlays_follow_collapses() {
        let mut mesh = make_curved_surface(6);
        let uvs: Vec<Uv> = mesh.vertices.iter().map(|p| [p.x / 5.0, p.y / 5.0]).collect();
        mesh.enable_attributes();
        if let Some(attributes) = mesh.attributes.as_mut() {
            attributes.uv.copy_from_vertex_data(&mesh.faces, &uvs);
        }

        let mut reducer = configured(ReducerKind::AttributeAware, &mesh, CollapseMode::MinimalQuadricPositionError);
        reducer.reduce_to_triangle_count(&mut mesh, 20).unwrap();

        let attributes = mesh.attributes.as_ref().unwrap();
        assert_eq!(attributes.uv.triangle_count(), mesh.face_count());
        assert!(attributes.uv.is_complete());
        for tri in 0..mesh.face_count() {
            let elements = attributes.uv.triangle(tri).unwrap();
            for (corner, &e) in elements.iter().enumerate() {
                assert_eq!(attributes.uv.parent_vertex(e), mesh.faces[tri][corner]);
                let uv = attributes.uv.element(e);
                assert!((0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1]));
            }
        }
    }

    #[test]
    fn test_projection_after_refinement() {
        let mut mesh = make_curved_surface(8);
        let reference = mesh.clone();
        let index: Arc<dyn ProjectionTarget> = Arc::new(MeshProjectionIndex::build(&reference));

        let mut reducer = EdgeCollapseReducer::quadric();
        let mut setup = ReducerSetup::new(build_constraints(&mesh, &ConstraintPolicy::DEFAULT));
        setup.projection_mode = ProjectionMode::AfterRefinement;
        reducer.configure(setup);
        reducer.set_projection_target(index.clone());
        reducer.reduce_to_triangle_count(&mut mesh, 40).unwrap();

        for p in &mesh.vertices {
            assert!(index.distance(p) < 1e-4);
        }
    }

    #[test]
    fn test_geometric_error_criterion_limits_deviation() {
        let mut mesh = make_curved_surface(8);
        let reference = mesh.clone();
        let index: Arc<dyn ProjectionTarget> = Arc::new(MeshProjectionIndex::build(&reference));

        let mut reducer = configured(ReducerKind::Quadric, &mesh, CollapseMode::MinimalQuadricPositionError);
        reducer.set_projection_target(index.clone());
        reducer.set_geometric_error_criterion(0.05);
        reducer.reduce_to_triangle_count(&mut mesh, 0).unwrap();

        for p in &mesh.vertices {
            assert!(index.distance(p) <= 0.05 + 1e-5);
        }
        assert!(mesh.face_count() > 0);
    }

    #[test]
    fn test_edge_cost_ordering() {
        let cheap = EdgeCost { cost: 0.5 };
        let expensive = EdgeCost { cost: 2.0 };
        // the queue pops the largest priority first
        assert!(cheap > expensive);
    }

    #[test]
    fn test_clamp_to_segment() {
        let a = Point3f::new(0.0, 0.0, 0.0);
        let b = Point3f::new(2.0, 0.0, 0.0);
        assert_eq!(clamp_to_segment(&Point3f::new(1.0, 3.0, 0.0), &a, &b), Point3f::new(1.0, 0.0, 0.0));
        assert_eq!(clamp_to_segment(&Point3f::new(-4.0, 0.0, 0.0), &a, &b), a);
        assert_eq!(clamp_to_segment(&Point3f::new(9.0, 1.0, 0.0), &a, &b), b);
    }
}
