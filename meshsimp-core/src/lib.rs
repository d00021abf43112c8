//! Core data structures for meshsimp
//!
//! This crate provides the triangle mesh model shared by the simplification
//! pipeline: per-vertex data, per-triangle material and polygroup ids,
//! attribute overlays with seams, edge topology queries and normal
//! computation.

pub mod point;
pub mod attributes;
pub mod mesh;
pub mod topology;
pub mod normals;
pub mod primitive;
pub mod error;

pub use point::*;
pub use attributes::*;
pub use mesh::*;
pub use topology::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3, Matrix4};
