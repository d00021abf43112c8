//! Option-driven mesh simplification
//!
//! One run copies the input mesh, picks a strategy from the requested
//! [`AlgorithmVariant`], configures a reduction engine (or the polygroup
//! remesher) against fixed boundary and seam constraints, and repairs the
//! attribute layer of the result:
//! - Quadric error, attribute-aware and existing-vertex edge collapse
//! - Shape-preserving minimal collapse
//! - Polygroup-preserving retriangulation
//!
//! The engine, projection index and remesher sit behind traits so the
//! pipeline can run against other implementations via [`SimplifyBackend`].

pub mod options;
pub mod target;
pub mod constraints;
pub mod engine;
pub mod projection;
pub mod edge_collapse;
pub mod polygroup;
pub mod dispatch;
pub mod repair;
pub mod simplify;

pub use options::*;
pub use target::*;
pub use constraints::*;
pub use engine::*;
pub use projection::*;
pub use edge_collapse::*;
pub use polygroup::*;
pub use dispatch::*;
pub use repair::*;
pub use simplify::*;
