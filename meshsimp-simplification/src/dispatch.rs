//! Variant dispatch: turns one `AlgorithmVariant` into a configured
//! reduction engine run, or into a polygroup remesh.
//!
//! Every reduce-type variant shares the same configuration steps
//! (constraints, stop condition, projection target, geometric error
//! criterion); the variants only differ in the [`ReductionStrategy`] the
//! table below hands out.

use crate::constraints::{build_constraints, ConstraintPolicy};
use crate::edge_collapse::EdgeCollapseReducer;
use crate::engine::{
    CollapseMode, ProjectionMode, ReducerKind, ReducerSetup, ReductionEngine, ReductionStats,
};
use crate::options::{AlgorithmVariant, SimplifyOptions};
use crate::polygroup::{
    ConstrainedPolygroupRemesher, GroupTopology, PlanarTriangulator, PolygroupRemesher,
    RemeshStats, SpadeTriangulator,
};
use crate::projection::{MeshProjectionIndex, ProjectionTarget};
use crate::target::{StopCondition, TargetResolver, TargetSpec};
use meshsimp_core::normals::quick_compute_vertex_normals;
use meshsimp_core::{Result, TriangleMesh};
use std::sync::Arc;
use tracing::debug;

/// Edge flip tolerance handed to the reducer whenever seams may collapse
pub const SEAM_COLLAPSE_EDGE_FLIP_TOLERANCE: f64 = 1e-5;

/// Angle tolerance of the polygroup remesher when the caller did not pass a
/// `TargetSpec::Minimal`
pub const DEFAULT_POLYGROUP_ANGLE_TOLERANCE_DEGREES: f64 = 0.1;

/// How a reduce-type variant configures the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionStrategy {
    pub reducer: ReducerKind,
    pub collapse_mode: CollapseMode,
    pub retain_quadric_memory: bool,
    /// Give a mesh with neither overlays nor vertex normals some normals
    /// before reducing
    pub compute_normals_first: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Reduce(ReductionStrategy),
    RemeshPolygroups,
}

impl AlgorithmVariant {
    /// The dispatch table
    pub fn strategy(self) -> Strategy {
        match self {
            AlgorithmVariant::QuadricError => Strategy::Reduce(ReductionStrategy {
                reducer: ReducerKind::Quadric,
                collapse_mode: CollapseMode::MinimalQuadricPositionError,
                retain_quadric_memory: true,
                compute_normals_first: false,
            }),
            AlgorithmVariant::AttributeAware => Strategy::Reduce(ReductionStrategy {
                reducer: ReducerKind::AttributeAware,
                collapse_mode: CollapseMode::MinimalQuadricPositionError,
                retain_quadric_memory: false,
                compute_normals_first: true,
            }),
            AlgorithmVariant::ExistingVertexOnly => Strategy::Reduce(ReductionStrategy {
                reducer: ReducerKind::Quadric,
                collapse_mode: CollapseMode::MinimalExistingVertexError,
                retain_quadric_memory: true,
                compute_normals_first: false,
            }),
            AlgorithmVariant::ShapePreserving => Strategy::Reduce(ReductionStrategy {
                reducer: ReducerKind::Quadric,
                collapse_mode: CollapseMode::AverageVertexPosition,
                retain_quadric_memory: false,
                compute_normals_first: true,
            }),
            AlgorithmVariant::PolygroupPreserving => Strategy::RemeshPolygroups,
        }
    }
}

/// Factories for the collaborators a run needs
pub trait SimplifyBackend {
    fn reducer(&self, kind: ReducerKind) -> Box<dyn ReductionEngine>;

    fn remesher(&self) -> Box<dyn PolygroupRemesher>;

    fn triangulator(&self) -> Box<dyn PlanarTriangulator>;

    /// Spatial index over `mesh` used as projection target
    fn build_projection_index(&self, mesh: &TriangleMesh) -> Arc<dyn ProjectionTarget>;
}

/// Edge collapse reducer, R*-tree projection index, constrained polygroup
/// remesher and `spade` triangulation
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackend;

impl SimplifyBackend for DefaultBackend {
    fn reducer(&self, kind: ReducerKind) -> Box<dyn ReductionEngine> {
        Box::new(EdgeCollapseReducer::new(kind))
    }

    fn remesher(&self) -> Box<dyn PolygroupRemesher> {
        Box::new(ConstrainedPolygroupRemesher::new())
    }

    fn triangulator(&self) -> Box<dyn PlanarTriangulator> {
        Box::new(SpadeTriangulator::new())
    }

    fn build_projection_index(&self, mesh: &TriangleMesh) -> Arc<dyn ProjectionTarget> {
        Arc::new(MeshProjectionIndex::build(mesh))
    }
}

/// What a dispatch did to the working mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Reduced(ReductionStats),
    Remeshed(RemeshStats),
}

/// Runs the engine selected by the options against a working mesh
pub struct ReductionDispatcher<'a, B: SimplifyBackend + ?Sized> {
    backend: &'a B,
    policy: ConstraintPolicy,
}

impl<'a, B: SimplifyBackend + ?Sized> ReductionDispatcher<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            policy: ConstraintPolicy::DEFAULT,
        }
    }

    pub fn policy(&self) -> &ConstraintPolicy {
        &self.policy
    }

    /// Simplify `working` in place. `original` is the untouched input: it
    /// fixes the triangle count percentage targets are resolved against and
    /// backs the projection target.
    pub fn dispatch(
        &self,
        working: &mut TriangleMesh,
        original: &TriangleMesh,
        options: &SimplifyOptions,
        target: TargetSpec,
    ) -> Result<DispatchOutcome> {
        match options.algorithm.strategy() {
            Strategy::Reduce(strategy) => self
                .reduce(working, original, options, target, strategy)
                .map(DispatchOutcome::Reduced),
            Strategy::RemeshPolygroups => self
                .remesh_polygroups(working, target)
                .map(DispatchOutcome::Remeshed),
        }
    }

    fn reduce(
        &self,
        working: &mut TriangleMesh,
        original: &TriangleMesh,
        options: &SimplifyOptions,
        target: TargetSpec,
        strategy: ReductionStrategy,
    ) -> Result<ReductionStats> {
        let stop = TargetResolver::new(original.triangle_count()).resolve(target, options.algorithm);

        if strategy.compute_normals_first && !working.has_attributes() && !working.has_vertex_normals() {
            quick_compute_vertex_normals(working);
            debug!("Computed vertex normals before reduction");
        }

        let mut collapse_mode = strategy.collapse_mode;
        let mut tolerance = options.effective_tolerance();
        if stop.is_minimal() {
            // the surface may not move off the input
            collapse_mode = CollapseMode::AverageVertexPosition;
            if tolerance > 0.0 {
                debug!(tolerance, "Geometric tolerance forced to zero for minimal target");
            }
            tolerance = 0.0;
        }

        let allow_seam_collapse = self.policy.allow_seam_collapse();
        if allow_seam_collapse {
            if let Some(attributes) = working.attributes.as_mut() {
                let split = attributes.split_all_bowties(&working.faces);
                debug!(split, "Split overlay bowties");
            }
        }

        let constraints = build_constraints(working, &self.policy);
        debug!(
            edges = constraints.edge_count(),
            vertices = constraints.vertex_count(),
            "Built constraints"
        );

        let setup = ReducerSetup {
            constraints,
            collapse_mode,
            retain_quadric_memory: strategy.retain_quadric_memory,
            edge_flip_tolerance: allow_seam_collapse.then_some(SEAM_COLLAPSE_EDGE_FLIP_TOLERANCE),
            projection_mode: if options.reproject {
                ProjectionMode::AfterRefinement
            } else {
                ProjectionMode::NoProjection
            },
        };

        let mut reducer = self.backend.reducer(strategy.reducer);
        reducer.configure(setup);

        if options.reproject || tolerance > 0.0 {
            reducer.set_projection_target(self.backend.build_projection_index(original));
            debug!(reproject = options.reproject, tolerance, "Attached projection target");
        }
        if tolerance > 0.0 {
            reducer.set_geometric_error_criterion(tolerance);
        }

        debug!(
            reducer = ?strategy.reducer,
            ?collapse_mode,
            ?stop,
            "Dispatching reduction"
        );
        match stop {
            StopCondition::TriangleCount(n) => reducer.reduce_to_triangle_count(working, n),
            StopCondition::VertexCount(n) => reducer.reduce_to_vertex_count(working, n),
            StopCondition::EdgeLength(len) => reducer.reduce_to_edge_length(working, len),
            StopCondition::MinimalShapePreserving {
                angle_tolerance_degrees,
            } => reducer.reduce_to_minimal_shape_preserving(working, angle_tolerance_degrees),
        }
    }

    fn remesh_polygroups(&self, working: &mut TriangleMesh, target: TargetSpec) -> Result<RemeshStats> {
        let angle = match target {
            TargetSpec::Minimal {
                angle_threshold_degrees,
            } => angle_threshold_degrees,
            _ => DEFAULT_POLYGROUP_ANGLE_TOLERANCE_DEGREES,
        };
        let topology = GroupTopology::new(working);
        debug!(groups = topology.group_count(), angle, "Dispatching polygroup remesh");

        let triangulator = self.backend.triangulator();
        self.backend
            .remesher()
            .compute(working, &topology, angle, triangulator.as_ref())
    }
}
