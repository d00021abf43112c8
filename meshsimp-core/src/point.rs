//! Point and vector types

use nalgebra::{Point3, Vector2, Vector3};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A 2D texture coordinate
pub type Uv = [f32; 2];

/// Linear interpolation between two texture coordinates
#[inline]
pub fn lerp_uv(a: Uv, b: Uv, t: f32) -> Uv {
    [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]
}

/// Squared distance between two texture coordinates
#[inline]
pub fn uv_distance_squared(a: Uv, b: Uv) -> f32 {
    Vector2::new(a[0] - b[0], a[1] - b[1]).norm_squared()
}
