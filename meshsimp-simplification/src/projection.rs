//! Projection targets: reference surfaces simplified vertices are snapped
//! back onto.

use meshsimp_core::{Point3f, TriangleMesh, Vector3f};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// Nearest-point queries against a fixed reference surface
pub trait ProjectionTarget: Send + Sync {
    /// Closest point on the surface to `point`
    fn project(&self, point: &Point3f) -> Point3f;

    /// Distance from `point` to the surface
    fn distance(&self, point: &Point3f) -> f32 {
        (self.project(point) - point).norm()
    }
}

/// A triangle of the reference mesh stored in the R*-tree
#[derive(Debug, Clone, PartialEq)]
struct IndexedTriangle {
    corners: [Point3f; 3],
    index: usize,
}

impl RTreeObject for IndexedTriangle {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        let [a, b, c] = &self.corners;
        AABB::from_corners(
            [a.x.min(b.x).min(c.x), a.y.min(b.y).min(c.y), a.z.min(b.z).min(c.z)],
            [a.x.max(b.x).max(c.x), a.y.max(b.y).max(c.y), a.z.max(b.z).max(c.z)],
        )
    }
}

impl PointDistance for IndexedTriangle {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        let p = Point3f::new(point[0], point[1], point[2]);
        (closest_point_on_triangle(&p, &self.corners) - p).norm_squared()
    }
}

/// Closest point to `p` on triangle `tri` (Ericson, Real-Time Collision
/// Detection, 5.1.5)
pub fn closest_point_on_triangle(p: &Point3f, tri: &[Point3f; 3]) -> Point3f {
    let [a, b, c] = tri;
    let ab: Vector3f = b - a;
    let ac: Vector3f = c - a;
    let ap: Vector3f = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    if !denom.is_finite() {
        // degenerate triangle
        return *a;
    }
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// R*-tree spatial index over the triangles of a mesh
pub struct MeshProjectionIndex {
    tree: RTree<IndexedTriangle>,
}

impl MeshProjectionIndex {
    /// Build the index from `mesh`. The index owns a copy of the triangle
    /// geometry and is read-only afterwards.
    pub fn build(mesh: &TriangleMesh) -> Self {
        let triangles: Vec<IndexedTriangle> = mesh
            .faces
            .iter()
            .enumerate()
            .map(|(index, f)| IndexedTriangle {
                corners: [mesh.vertices[f[0]], mesh.vertices[f[1]], mesh.vertices[f[2]]],
                index,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(triangles),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.tree.size()
    }

    /// Nearest triangle index and the closest point on it
    pub fn nearest(&self, point: &Point3f) -> Option<(usize, Point3f)> {
        let query = [point.x, point.y, point.z];
        self.tree
            .nearest_neighbor(&query)
            .map(|t| (t.index, closest_point_on_triangle(point, &t.corners)))
    }
}

impl ProjectionTarget for MeshProjectionIndex {
    fn project(&self, point: &Point3f) -> Point3f {
        self.nearest(point).map_or(*point, |(_, p)| p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_triangle() -> [Point3f; 3] {
        [
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_closest_point_interior() {
        let p = closest_point_on_triangle(&Point3f::new(0.25, 0.25, 3.0), &unit_triangle());
        assert_relative_eq!(p, Point3f::new(0.25, 0.25, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_closest_point_regions() {
        let tri = unit_triangle();
        // vertex region
        let p = closest_point_on_triangle(&Point3f::new(-1.0, -1.0, 0.0), &tri);
        assert_relative_eq!(p, tri[0], epsilon = 1e-6);
        // edge region
        let p = closest_point_on_triangle(&Point3f::new(0.5, -2.0, 1.0), &tri);
        assert_relative_eq!(p, Point3f::new(0.5, 0.0, 0.0), epsilon = 1e-6);
        // hypotenuse
        let p = closest_point_on_triangle(&Point3f::new(1.0, 1.0, 0.0), &tri);
        assert_relative_eq!(p, Point3f::new(0.5, 0.5, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_index_projects_onto_surface() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        let index = MeshProjectionIndex::build(&mesh);
        assert_eq!(index.triangle_count(), 2);

        let p = index.project(&Point3f::new(0.2, 0.7, 0.5));
        assert_relative_eq!(p, Point3f::new(0.2, 0.7, 0.0), epsilon = 1e-6);
        assert_relative_eq!(index.distance(&Point3f::new(0.2, 0.7, 0.5)), 0.5, epsilon = 1e-6);

        let (tri, _) = index.nearest(&Point3f::new(0.9, 0.1, 0.0)).unwrap();
        assert_eq!(tri, 0);
    }

    #[test]
    fn test_empty_index_returns_query() {
        let index = MeshProjectionIndex::build(&TriangleMesh::new());
        let q = Point3f::new(1.0, 2.0, 3.0);
        assert_eq!(index.project(&q), q);
    }
}
