//! Polygroup-preserving remeshing
//!
//! Every polygroup is replaced by a constrained planar triangulation of its
//! boundary loops. Interior vertices of a group disappear, and group-boundary
//! vertices survive only where the boundary turns by more than the angle
//! tolerance or where three or more groups meet.

use meshsimp_core::normals::face_normal_weighted;
use meshsimp_core::{
    edge_key, triangle_edges, EdgeTopology, Error, Overlay, Point3f, Result, TriangleMesh, Vector3f,
};
use itertools::Itertools;
use nalgebra::Matrix3;
use spade::{ConstrainedDelaunayTriangulation, Point2, Triangulation};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Group-boundary view of a mesh: which edges separate polygroups (mesh
/// boundaries and non-manifold edges included) and which triangles belong
/// to each group.
#[derive(Debug, Clone, Default)]
pub struct GroupTopology {
    groups: BTreeMap<i32, Vec<usize>>,
    boundary_edges: BTreeSet<(usize, usize)>,
    valence: BTreeMap<usize, usize>,
}

impl GroupTopology {
    pub fn new(mesh: &TriangleMesh) -> Self {
        let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for tri in 0..mesh.face_count() {
            groups.entry(mesh.polygroup(tri)).or_default().push(tri);
        }

        let topology = EdgeTopology::new(&mesh.faces);
        let mut boundary_edges = BTreeSet::new();
        let mut valence: BTreeMap<usize, usize> = BTreeMap::new();
        for (&(a, b), tris) in topology.edges() {
            let is_boundary = match tris.as_slice() {
                [t0, t1] => mesh.polygroup(*t0) != mesh.polygroup(*t1),
                _ => true,
            };
            if is_boundary {
                boundary_edges.insert((a, b));
                *valence.entry(a).or_default() += 1;
                *valence.entry(b).or_default() += 1;
            }
        }

        Self {
            groups,
            boundary_edges,
            valence,
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.groups.keys().copied()
    }

    pub fn group_triangles(&self, group: i32) -> &[usize] {
        self.groups.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_group_boundary_edge(&self, a: usize, b: usize) -> bool {
        self.boundary_edges.contains(&edge_key(a, b))
    }

    pub fn boundary_edge_count(&self) -> usize {
        self.boundary_edges.len()
    }

    /// Number of group-boundary edges at `v`
    pub fn boundary_valence(&self, v: usize) -> usize {
        self.valence.get(&v).copied().unwrap_or(0)
    }

    /// Group-boundary vertices where the boundary branches or ends
    pub fn corners(&self) -> impl Iterator<Item = usize> + '_ {
        self.valence
            .iter()
            .filter(|(_, &n)| n != 2)
            .map(|(&v, _)| v)
    }

    /// Neighbors of `v` along group-boundary edges
    pub fn boundary_neighbors(&self, v: usize) -> Vec<usize> {
        self.boundary_edges
            .iter()
            .filter_map(|&(a, b)| {
                if a == v {
                    Some(b)
                } else if b == v {
                    Some(a)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Closed directed boundary loops of `group` in its winding order.
    /// `None` when the group has a pinched or open boundary.
    pub fn boundary_loops(&self, mesh: &TriangleMesh, group: i32) -> Option<Vec<Vec<usize>>> {
        let mut next: BTreeMap<usize, usize> = BTreeMap::new();
        for &tri in self.group_triangles(group) {
            for (a, b) in triangle_edges(&mesh.faces[tri]) {
                if self.is_group_boundary_edge(a, b) && next.insert(a, b).is_some() {
                    return None;
                }
            }
        }

        let mut loops = Vec::new();
        while let Some((&start, _)) = next.iter().next() {
            let mut ring = vec![start];
            let mut current = next.remove(&start)?;
            while current != start {
                ring.push(current);
                current = next.remove(&current)?;
            }
            loops.push(ring);
        }
        Some(loops)
    }
}

/// Triangulates a planar region bounded by closed loops.
pub trait PlanarTriangulator {
    /// Triangulate the region enclosed by `loops` (indices into `points`)
    /// under the even-odd rule. Triangles come back counter-clockwise.
    fn triangulate(&self, points: &[[f64; 2]], loops: &[Vec<usize>]) -> Result<Vec<[usize; 3]>>;
}

/// Constrained Delaunay triangulation backed by `spade`
#[derive(Debug, Clone, Copy, Default)]
pub struct SpadeTriangulator;

impl SpadeTriangulator {
    pub fn new() -> Self {
        Self
    }
}

impl PlanarTriangulator for SpadeTriangulator {
    fn triangulate(&self, points: &[[f64; 2]], loops: &[Vec<usize>]) -> Result<Vec<[usize; 3]>> {
        let mut cdt: ConstrainedDelaunayTriangulation<Point2<f64>> = ConstrainedDelaunayTriangulation::new();

        let mut handles = Vec::with_capacity(points.len());
        let mut index_of: HashMap<usize, usize> = HashMap::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            let handle = cdt
                .insert(Point2::new(p[0], p[1]))
                .map_err(|e| Error::Algorithm(format!("Failed to insert point in constrained triangulation: {:?}", e)))?;
            if index_of.insert(handle.index(), i).is_some() {
                return Err(Error::Algorithm(format!("Point {} duplicates an earlier point", i)));
            }
            handles.push(handle);
        }

        for ring in loops {
            for (&from, &to) in ring.iter().circular_tuple_windows() {
                let (hf, ht) = (handles[from], handles[to]);
                if !cdt.can_add_constraint(hf, ht) {
                    return Err(Error::Algorithm("Boundary loops intersect".to_string()));
                }
                cdt.add_constraint(hf, ht);
            }
        }

        let mut triangles = Vec::new();
        for face in cdt.inner_faces() {
            let vertices = face.vertices();
            let mut tri = [0usize; 3];
            for (slot, v) in tri.iter_mut().zip(vertices.iter()) {
                *slot = *index_of
                    .get(&v.fix().index())
                    .ok_or_else(|| Error::Algorithm("Triangulation created a vertex".to_string()))?;
            }
            let [a, b, c] = tri.map(|i| points[i]);
            let centroid = [(a[0] + b[0] + c[0]) / 3.0, (a[1] + b[1] + c[1]) / 3.0];
            if !inside_loops(&centroid, points, loops) {
                continue;
            }
            if signed_area(&a, &b, &c) < 0.0 {
                tri.swap(1, 2);
            }
            triangles.push(tri);
        }

        // a region with V boundary vertices, C outer loops and H holes has
        // V + 2H - 2C triangles
        let (outer, holes) = loops.iter().fold((0usize, 0usize), |(outer, holes), ring| {
            if loop_depth(ring, points, loops) % 2 == 0 {
                (outer + 1, holes)
            } else {
                (outer, holes + 1)
            }
        });
        let vertex_count: usize = loops.iter().map(Vec::len).sum();
        let expected = (vertex_count + 2 * holes).checked_sub(2 * outer);
        if expected != Some(triangles.len()) {
            return Err(Error::Algorithm(format!(
                "Expected {:?} triangles, triangulation produced {}",
                expected,
                triangles.len()
            )));
        }
        Ok(triangles)
    }
}

fn signed_area(a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]) -> f64 {
    0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1]))
}

/// Even-odd point-in-polygon test over every loop edge
fn inside_loops(p: &[f64; 2], points: &[[f64; 2]], loops: &[Vec<usize>]) -> bool {
    let mut inside = false;
    for ring in loops {
        for (&i, &j) in ring.iter().circular_tuple_windows() {
            let (a, b) = (points[i], points[j]);
            if (a[1] > p[1]) != (b[1] > p[1]) {
                let x = a[0] + (p[1] - a[1]) / (b[1] - a[1]) * (b[0] - a[0]);
                if p[0] < x {
                    inside = !inside;
                }
            }
        }
    }
    inside
}

/// Number of other loops enclosing `ring`. Each loop is tested against a
/// vertex of `ring` that it does not share; a loop sharing every vertex of
/// `ring` does not count.
fn loop_depth(ring: &[usize], points: &[[f64; 2]], loops: &[Vec<usize>]) -> usize {
    loops
        .iter()
        .filter(|other| other.as_slice() != ring)
        .filter(|other| {
            ring.iter()
                .find(|&&v| !other.contains(&v))
                .is_some_and(|&v| inside_loops(&points[v], points, std::slice::from_ref(*other)))
        })
        .count()
}

/// Statistics of one remeshing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemeshStats {
    pub groups_remeshed: usize,
    pub groups_preserved: usize,
}

/// Re-triangulates a mesh group by group.
pub trait PolygroupRemesher {
    fn compute(
        &mut self,
        mesh: &mut TriangleMesh,
        topology: &GroupTopology,
        angle_tolerance_degrees: f64,
        triangulator: &dyn PlanarTriangulator,
    ) -> Result<RemeshStats>;
}

/// Drops every vertex not needed to describe the group boundaries and fills
/// each group with a constrained planar triangulation. A group whose
/// boundary cannot be triangulated on its best-fit plane keeps its original
/// triangles, and all of its boundary vertices, so neighbouring groups stay
/// watertight.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstrainedPolygroupRemesher;

impl ConstrainedPolygroupRemesher {
    pub fn new() -> Self {
        Self
    }
}

enum GroupOutcome {
    Remeshed(Vec<[usize; 3]>),
    Preserved,
}

impl PolygroupRemesher for ConstrainedPolygroupRemesher {
    fn compute(
        &mut self,
        mesh: &mut TriangleMesh,
        topology: &GroupTopology,
        angle_tolerance_degrees: f64,
        triangulator: &dyn PlanarTriangulator,
    ) -> Result<RemeshStats> {
        if mesh.is_empty() {
            return Ok(RemeshStats::default());
        }
        mesh.validate()?;

        let cosine = angle_tolerance_degrees.max(0.0).to_radians().cos();
        let mut keep = kept_boundary_vertices(mesh, topology, cosine);

        // a preserved group pins its whole boundary, which can change the
        // loops of its neighbours, so iterate until no new group fails
        let mut outcomes: BTreeMap<i32, GroupOutcome>;
        loop {
            outcomes = BTreeMap::new();
            let mut pinned = false;
            for group in topology.group_ids() {
                match remesh_group(mesh, topology, group, &keep, triangulator) {
                    Some(triangles) => {
                        outcomes.insert(group, GroupOutcome::Remeshed(triangles));
                    }
                    None => {
                        for loops in topology.boundary_loops(mesh, group).into_iter().flatten() {
                            for v in loops {
                                pinned |= keep.insert(v);
                            }
                        }
                        outcomes.insert(group, GroupOutcome::Preserved);
                    }
                }
            }
            if !pinned {
                break;
            }
        }

        let stats = assemble(mesh, topology, &outcomes);
        debug!(
            groups = topology.group_count(),
            remeshed = stats.groups_remeshed,
            preserved = stats.groups_preserved,
            triangles = mesh.triangle_count(),
            "Polygroup remeshing finished"
        );
        Ok(stats)
    }
}

/// Group-boundary vertices that survive: branch and end points, plus
/// vertices where the boundary turns by more than the tolerance
fn kept_boundary_vertices(mesh: &TriangleMesh, topology: &GroupTopology, cosine: f64) -> BTreeSet<usize> {
    let mut keep: BTreeSet<usize> = topology.corners().collect();
    for (&v, &valence) in &topology.valence {
        if valence != 2 {
            continue;
        }
        let neighbors = topology.boundary_neighbors(v);
        let [a, b] = neighbors.as_slice() else {
            keep.insert(v);
            continue;
        };
        let p = mesh.vertices[v];
        let incoming = (p - mesh.vertices[*a]).try_normalize(f32::EPSILON);
        let outgoing = (mesh.vertices[*b] - p).try_normalize(f32::EPSILON);
        let straight = match (incoming, outgoing) {
            (Some(d0), Some(d1)) => d0.dot(&d1) as f64 >= cosine,
            _ => false,
        };
        if !straight {
            keep.insert(v);
        }
    }
    keep
}

/// Orthonormal in-plane axes for a group whose right-handed normal agrees
/// with the group's area-weighted normal
fn group_frame(mesh: &TriangleMesh, triangles: &[usize]) -> Option<(Point3f, Vector3f, Vector3f)> {
    let mut centroid = Vector3f::zeros();
    let mut count = 0.0f32;
    let mut area_normal = Vector3f::zeros();
    for &tri in triangles {
        let [a, b, c] = mesh.faces[tri].map(|v| mesh.vertices[v]);
        area_normal += face_normal_weighted(&a, &b, &c);
        centroid += a.coords + b.coords + c.coords;
        count += 3.0;
    }
    let centroid = Point3f::from(centroid / count);
    let normal = area_normal.try_normalize(f32::EPSILON)?;

    // principal in-plane direction from the covariance
    let mut covariance = Matrix3::zeros();
    for &tri in triangles {
        for &v in &mesh.faces[tri] {
            let diff = mesh.vertices[v] - centroid;
            covariance += diff * diff.transpose();
        }
    }
    let eigen = covariance.symmetric_eigen();
    let largest = eigen.eigenvalues.iamax();
    let principal: Vector3f = eigen.eigenvectors.column(largest).clone_owned();
    let u = (principal - normal * principal.dot(&normal))
        .try_normalize(f32::EPSILON)
        .or_else(|| normal.cross(&Vector3f::x()).try_normalize(f32::EPSILON))
        .or_else(|| normal.cross(&Vector3f::y()).try_normalize(f32::EPSILON))?;
    let v = normal.cross(&u);
    Some((centroid, u, v))
}

/// New triangles (mesh vertex indices) for one group, or `None` if the
/// group must keep its original triangles
fn remesh_group(
    mesh: &TriangleMesh,
    topology: &GroupTopology,
    group: i32,
    keep: &BTreeSet<usize>,
    triangulator: &dyn PlanarTriangulator,
) -> Option<Vec<[usize; 3]>> {
    let triangles = topology.group_triangles(group);
    let loops = topology.boundary_loops(mesh, group)?;
    if loops.is_empty() {
        return None;
    }
    let (origin, u, v) = group_frame(mesh, triangles)?;
    let project = |p: &Point3f| {
        let d = p - origin;
        [d.dot(&u) as f64, d.dot(&v) as f64]
    };

    // the projection must not fold any original triangle
    for &tri in triangles {
        let [a, b, c] = mesh.faces[tri].map(|x| project(&mesh.vertices[x]));
        if signed_area(&a, &b, &c) <= 0.0 {
            return None;
        }
    }

    let mut vertex_ids: Vec<usize> = Vec::new();
    let mut local: Vec<Vec<usize>> = Vec::with_capacity(loops.len());
    for ring in &loops {
        let kept: Vec<usize> = ring.iter().copied().filter(|x| keep.contains(x)).collect();
        if kept.len() < 3 {
            return None;
        }
        let mut indices = Vec::with_capacity(kept.len());
        for x in kept {
            indices.push(vertex_ids.len());
            vertex_ids.push(x);
        }
        local.push(indices);
    }
    let points: Vec<[f64; 2]> = vertex_ids.iter().map(|&x| project(&mesh.vertices[x])).collect();

    match triangulator.triangulate(&points, &local) {
        Ok(tris) => Some(tris.into_iter().map(|t| t.map(|i| vertex_ids[i])).collect()),
        Err(e) => {
            debug!(group, error = %e, "Keeping polygroup unchanged");
            None
        }
    }
}

/// Element of `overlay` used by `group` at each of its vertices
fn group_elements<T: Clone>(
    overlay: &Overlay<T>,
    faces: &[[usize; 3]],
    triangles: &[usize],
) -> HashMap<usize, usize> {
    let mut out = HashMap::new();
    for &tri in triangles {
        if let Some(elements) = overlay.triangle(tri) {
            for (corner, &e) in elements.iter().enumerate() {
                out.entry(faces[tri][corner]).or_insert(e);
            }
        }
    }
    out
}

fn assemble(mesh: &mut TriangleMesh, topology: &GroupTopology, outcomes: &BTreeMap<i32, GroupOutcome>) -> RemeshStats {
    let mut stats = RemeshStats::default();
    let mut faces = Vec::new();
    let mut groups = Vec::new();
    let mut materials = Vec::new();
    let mut uv_triangles = Vec::new();
    let mut normal_triangles = Vec::new();

    for (&group, outcome) in outcomes {
        let triangles = topology.group_triangles(group);
        match outcome {
            GroupOutcome::Preserved => {
                stats.groups_preserved += 1;
                for &tri in triangles {
                    faces.push(mesh.faces[tri]);
                    groups.push(group);
                    materials.push(mesh.material_ids.as_ref().map_or(0, |ids| ids[tri]));
                    if let Some(attributes) = &mesh.attributes {
                        uv_triangles.push(attributes.uv.triangle(tri));
                        normal_triangles.push(attributes.normals.triangle(tri));
                    }
                }
            }
            GroupOutcome::Remeshed(new_triangles) => {
                stats.groups_remeshed += 1;
                let material = match (&mesh.material_ids, triangles.first()) {
                    (Some(ids), Some(&first)) => ids[first],
                    _ => 0,
                };
                let element_maps = mesh.attributes.as_ref().map(|attributes| {
                    (
                        group_elements(&attributes.uv, &mesh.faces, triangles),
                        group_elements(&attributes.normals, &mesh.faces, triangles),
                    )
                });
                for tri in new_triangles {
                    faces.push(*tri);
                    groups.push(group);
                    materials.push(material);
                    if let Some((uv_map, normal_map)) = &element_maps {
                        let lookup = |map: &HashMap<usize, usize>| -> Option<[usize; 3]> {
                            Some([*map.get(&tri[0])?, *map.get(&tri[1])?, *map.get(&tri[2])?])
                        };
                        uv_triangles.push(lookup(uv_map));
                        normal_triangles.push(lookup(normal_map));
                    }
                }
            }
        }
    }

    mesh.faces = faces;
    if mesh.polygroups.is_some() {
        mesh.polygroups = Some(groups);
    }
    if mesh.material_ids.is_some() {
        mesh.material_ids = Some(materials);
    }
    if let Some(attributes) = mesh.attributes.as_mut() {
        replace_triangles(&mut attributes.uv, uv_triangles);
        replace_triangles(&mut attributes.normals, normal_triangles);
    }
    mesh.compact();
    stats
}

fn replace_triangles<T: Clone>(overlay: &mut Overlay<T>, triangles: Vec<Option<[usize; 3]>>) {
    overlay.resize_triangles(0);
    for tri in triangles {
        overlay.push_triangle(tri);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use meshsimp_core::Uv;

    fn grid(size: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        for y in 0..size {
            for x in 0..size {
                vertices.push(Point3f::new(x as f32, y as f32, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..(size - 1) {
            for x in 0..(size - 1) {
                let tl = y * size + x;
                let tr = tl + 1;
                let bl = (y + 1) * size + x;
                let br = bl + 1;
                faces.push([tl, tr, bl]);
                faces.push([tr, br, bl]);
            }
        }
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    /// An open box: a unit cube without its top, one polygroup per side
    fn open_box(subdivisions: usize) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        let mut groups = Vec::new();
        let n = subdivisions;
        let sides: [(Point3f, Vector3f, Vector3f); 5] = [
            // bottom, seen from below
            (Point3f::new(0.0, 0.0, 0.0), Vector3f::y(), Vector3f::x()),
            (Point3f::new(0.0, 0.0, 0.0), Vector3f::x(), Vector3f::z()),
            (Point3f::new(1.0, 0.0, 0.0), Vector3f::y(), Vector3f::z()),
            (Point3f::new(1.0, 1.0, 0.0), -Vector3f::x(), Vector3f::z()),
            (Point3f::new(0.0, 1.0, 0.0), -Vector3f::y(), Vector3f::z()),
        ];
        let mut index: HashMap<(i64, i64, i64), usize> = HashMap::new();
        for (group, (origin, du, dv)) in sides.iter().enumerate() {
            let mut ids = vec![vec![0usize; n + 1]; n + 1];
            for (i, row) in ids.iter_mut().enumerate() {
                for (j, id) in row.iter_mut().enumerate() {
                    let p = *origin + *du * (i as f32 / n as f32) + *dv * (j as f32 / n as f32);
                    let key = ((p.x * 1000.0).round() as i64, (p.y * 1000.0).round() as i64, (p.z * 1000.0).round() as i64);
                    *id = *index.entry(key).or_insert_with(|| mesh.add_vertex(p));
                }
            }
            for i in 0..n {
                for j in 0..n {
                    mesh.add_face([ids[i][j], ids[i + 1][j], ids[i + 1][j + 1]]);
                    mesh.add_face([ids[i][j], ids[i + 1][j + 1], ids[i][j + 1]]);
                    groups.push(group as i32);
                    groups.push(group as i32);
                }
            }
        }
        mesh.set_polygroups(groups);
        mesh
    }

    fn total_area(mesh: &TriangleMesh) -> f32 {
        mesh.faces
            .iter()
            .map(|f| {
                let [a, b, c] = f.map(|v| mesh.vertices[v]);
                face_normal_weighted(&a, &b, &c).norm() * 0.5
            })
            .sum()
    }

    #[test]
    fn test_group_topology_of_grid() {
        let mesh = grid(4);
        let topology = GroupTopology::new(&mesh);
        assert_eq!(topology.group_count(), 1);
        assert_eq!(topology.group_triangles(0).len(), 18);
        assert_eq!(topology.boundary_edge_count(), 12);
        assert_eq!(topology.corners().count(), 0);
        assert_eq!(topology.boundary_valence(5), 0);
        assert_eq!(topology.boundary_valence(1), 2);

        let loops = topology.boundary_loops(&mesh, 0).unwrap();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 12);
    }

    #[test]
    fn test_group_topology_of_split_grid() {
        let mut mesh = grid(3);
        // left column of cells in group 1
        mesh.set_polygroups(vec![1, 1, 2, 2, 1, 1, 2, 2]);
        let topology = GroupTopology::new(&mesh);
        assert_eq!(topology.group_count(), 2);
        assert!(topology.is_group_boundary_edge(1, 4));
        assert!(topology.is_group_boundary_edge(4, 7));
        assert!(!topology.is_group_boundary_edge(3, 4));
        // T-junctions where the divider meets the outline
        let corners: Vec<usize> = topology.corners().collect();
        assert_eq!(corners, vec![1, 7]);
    }

    #[test]
    fn test_spade_triangulates_square_with_hole() {
        let points = [
            [0.0, 0.0],
            [4.0, 0.0],
            [4.0, 4.0],
            [0.0, 4.0],
            [1.0, 1.0],
            [1.0, 3.0],
            [3.0, 3.0],
            [3.0, 1.0],
        ];
        let loops = vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]];
        let triangles = SpadeTriangulator::new().triangulate(&points, &loops).unwrap();
        // V + 2H - 2C = 8 + 2 - 2
        assert_eq!(triangles.len(), 8);
        let area: f64 = triangles
            .iter()
            .map(|t| signed_area(&points[t[0]], &points[t[1]], &points[t[2]]))
            .sum();
        assert_relative_eq!(area, 12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_loop_depth_with_shared_vertex() {
        let points = [
            [0.0, 0.0],
            [4.0, 0.0],
            [4.0, 4.0],
            [0.0, 4.0],
            [1.0, 2.0],
            [2.0, 1.0],
            [-1.0, -2.0],
            [-2.0, -1.0],
        ];
        let outer = vec![0, 1, 2, 3];
        // touches the outer square at its corner, from inside
        let hole = vec![0, 5, 4];
        // touches the same corner from outside
        let outside = vec![0, 6, 7];
        let loops = vec![outer.clone(), hole.clone(), outside.clone()];

        assert_eq!(loop_depth(&outer, &points, &loops), 0);
        assert_eq!(loop_depth(&hole, &points, &loops), 1);
        assert_eq!(loop_depth(&outside, &points, &loops), 0);
    }

    #[test]
    fn test_spade_rejects_crossing_loops() {
        let points = [[0.0, 0.0], [2.0, 2.0], [2.0, 0.0], [0.0, 2.0]];
        // bow-tie polygon
        let loops = vec![vec![0, 1, 2, 3]];
        assert!(SpadeTriangulator::new().triangulate(&points, &loops).is_err());
    }

    #[test]
    fn test_spade_rejects_duplicate_points() {
        let points = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 0.0]];
        let loops = vec![vec![0, 1, 2], vec![3, 1, 2]];
        assert!(SpadeTriangulator::new().triangulate(&points, &loops).is_err());
    }

    #[test]
    fn test_flat_grid_collapses_to_two_triangles() {
        let mut mesh = grid(5);
        let topology = GroupTopology::new(&mesh);
        let stats = ConstrainedPolygroupRemesher::new()
            .compute(&mut mesh, &topology, 0.1, &SpadeTriangulator::new())
            .unwrap();

        assert_eq!(stats.groups_remeshed, 1);
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
        assert_relative_eq!(total_area(&mesh), 16.0, epsilon = 1e-4);
        // winding matches the input (+Z)
        let normals = mesh.calculate_face_normals();
        assert!(normals.iter().all(|n| n.z > 0.99));
    }

    #[test]
    fn test_open_box_keeps_one_patch_per_side() {
        let mut mesh = open_box(3);
        let area_before = total_area(&mesh);
        let topology = GroupTopology::new(&mesh);
        let stats = ConstrainedPolygroupRemesher::new()
            .compute(&mut mesh, &topology, 0.1, &SpadeTriangulator::new())
            .unwrap();

        assert_eq!(stats.groups_remeshed, 5);
        assert_eq!(stats.groups_preserved, 0);
        // 8 box corners, 2 triangles per side
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.face_count(), 10);
        assert_relative_eq!(total_area(&mesh), area_before, epsilon = 1e-4);
        let groups = mesh.polygroups.as_ref().unwrap();
        for g in 0..5 {
            assert_eq!(groups.iter().filter(|&&x| x == g).count(), 2);
        }
        // watertight except for the open top
        let topology = EdgeTopology::new(&mesh.faces);
        assert_eq!(topology.boundary_edges().len(), 4);
    }

    #[test]
    fn test_closed_group_is_preserved() {
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(0.5, 0.5, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        );
        let before = mesh.clone();
        let topology = GroupTopology::new(&mesh);
        let stats = ConstrainedPolygroupRemesher::new()
            .compute(&mut mesh, &topology, 0.1, &SpadeTriangulator::new())
            .unwrap();
        assert_eq!(stats.groups_preserved, 1);
        assert_eq!(mesh.faces, before.faces);
    }

    #[test]
    fn test_overlay_elements_carried() {
        let mut mesh = grid(4);
        let uvs: Vec<Uv> = mesh.vertices.iter().map(|p| [p.x / 3.0, p.y / 3.0]).collect();
        mesh.enable_attributes();
        if let Some(attributes) = mesh.attributes.as_mut() {
            attributes.uv.copy_from_vertex_data(&mesh.faces, &uvs);
        }
        let topology = GroupTopology::new(&mesh);
        ConstrainedPolygroupRemesher::new()
            .compute(&mut mesh, &topology, 0.1, &SpadeTriangulator::new())
            .unwrap();

        let attributes = mesh.attributes.as_ref().unwrap();
        assert_eq!(attributes.uv.triangle_count(), mesh.face_count());
        assert!(attributes.uv.is_complete());
        for (tri, face) in mesh.faces.iter().enumerate() {
            let elements = attributes.uv.triangle(tri).unwrap();
            for corner in 0..3 {
                let p = mesh.vertices[face[corner]];
                let uv = attributes.uv.element(elements[corner]);
                assert_relative_eq!(uv[0], p.x / 3.0, epsilon = 1e-6);
                assert_relative_eq!(uv[1], p.y / 3.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_failing_triangulator_leaves_mesh_unchanged() {
        struct Refuse;
        impl PlanarTriangulator for Refuse {
            fn triangulate(&self, _: &[[f64; 2]], _: &[Vec<usize>]) -> Result<Vec<[usize; 3]>> {
                Err(Error::Algorithm("refused".to_string()))
            }
        }

        let mut mesh = grid(4);
        let before = mesh.clone();
        let topology = GroupTopology::new(&mesh);
        let stats = ConstrainedPolygroupRemesher::new()
            .compute(&mut mesh, &topology, 0.1, &Refuse)
            .unwrap();
        assert_eq!(stats.groups_preserved, 1);
        assert_eq!(mesh.faces, before.faces);
        assert_eq!(mesh.vertices, before.vertices);
    }
}
