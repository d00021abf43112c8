//! The reduction engine interface consumed by the dispatcher

use crate::constraints::MeshConstraints;
use crate::projection::ProjectionTarget;
use crate::target::StopCondition;
use meshsimp_core::{Result, TriangleMesh};
use std::sync::Arc;

/// Which reducer implementation to instantiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReducerKind {
    /// Position quadrics only
    Quadric,
    /// Position quadrics plus attribute (normal/UV) differences
    AttributeAware,
}

/// Where a collapsed edge's surviving vertex is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollapseMode {
    /// Position minimizing the summed quadric error
    MinimalQuadricPositionError,
    /// Whichever endpoint has the lower quadric error
    MinimalExistingVertexError,
    /// Midpoint of the edge
    AverageVertexPosition,
}

/// When vertices are snapped onto the projection target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProjectionMode {
    #[default]
    NoProjection,
    /// After the reduction pass completes
    AfterRefinement,
}

/// Configuration passed in `configure`
#[derive(Debug, Clone)]
pub struct ReducerSetup {
    pub constraints: MeshConstraints,
    pub collapse_mode: CollapseMode,
    pub retain_quadric_memory: bool,
    /// Minimum allowed dot product between a triangle's normal before and
    /// after a collapse; `None` uses the engine default of 0
    pub edge_flip_tolerance: Option<f64>,
    pub projection_mode: ProjectionMode,
}

impl ReducerSetup {
    /// Quadric placement with memory, no flip tolerance override and no
    /// projection
    pub fn new(constraints: MeshConstraints) -> Self {
        Self {
            constraints,
            collapse_mode: CollapseMode::MinimalQuadricPositionError,
            retain_quadric_memory: true,
            edge_flip_tolerance: None,
            projection_mode: ProjectionMode::NoProjection,
        }
    }
}

/// Outcome of one reduction call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReductionStats {
    pub collapses_performed: usize,
    pub collapses_rejected: usize,
}

/// An iterative edge-collapse reducer.
///
/// The caller configures the engine, optionally attaches a projection
/// target and a geometric error criterion, then lends it exclusive access
/// to the mesh for a single `reduce` call. The engine stops once the stop
/// condition holds or no qualifying collapse remains, and returns its best
/// achievable result without error in the latter case.
pub trait ReductionEngine {
    fn configure(&mut self, setup: ReducerSetup);

    fn set_projection_target(&mut self, target: Arc<dyn ProjectionTarget>);

    /// Reject collapses whose new vertex would lie farther than
    /// `tolerance` from the projection target
    fn set_geometric_error_criterion(&mut self, tolerance: f64);

    fn reduce(&mut self, mesh: &mut TriangleMesh, stop: StopCondition) -> Result<ReductionStats>;

    fn reduce_to_triangle_count(&mut self, mesh: &mut TriangleMesh, count: usize) -> Result<ReductionStats> {
        self.reduce(mesh, StopCondition::TriangleCount(count))
    }

    fn reduce_to_vertex_count(&mut self, mesh: &mut TriangleMesh, count: usize) -> Result<ReductionStats> {
        self.reduce(mesh, StopCondition::VertexCount(count))
    }

    fn reduce_to_edge_length(&mut self, mesh: &mut TriangleMesh, length: f64) -> Result<ReductionStats> {
        self.reduce(mesh, StopCondition::EdgeLength(length))
    }

    fn reduce_to_minimal_shape_preserving(
        &mut self,
        mesh: &mut TriangleMesh,
        angle_tolerance_degrees: f64,
    ) -> Result<ReductionStats> {
        self.reduce(
            mesh,
            StopCondition::MinimalShapePreserving {
                angle_tolerance_degrees,
            },
        )
    }
}
