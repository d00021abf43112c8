//! The simplification pipeline: copy, dispatch, repair, commit.

use crate::dispatch::{DefaultBackend, DispatchOutcome, ReductionDispatcher, SimplifyBackend};
use crate::options::{AlgorithmVariant, SimplifyOptions};
use crate::repair::{repair_attributes, RepairReport};
use crate::target::TargetSpec;
use meshsimp_core::{Error, Result, TriangleMesh};
use tracing::info;

/// Result of one simplification run
#[derive(Debug, Clone)]
pub struct SimplificationResult {
    /// The simplified mesh
    pub mesh: TriangleMesh,
    pub variant: AlgorithmVariant,
    /// Triangles in the input mesh
    pub original_triangles: usize,
    /// Triangles in the simplified mesh
    pub final_triangles: usize,
    pub stats: DispatchOutcome,
    pub repair: RepairReport,
}

impl SimplificationResult {
    /// final / original
    pub fn reduction_ratio(&self) -> f64 {
        if self.original_triangles == 0 {
            1.0
        } else {
            self.final_triangles as f64 / self.original_triangles as f64
        }
    }

    /// Percentage of triangles removed
    pub fn reduction_percent(&self) -> f64 {
        (1.0 - self.reduction_ratio()) * 100.0
    }
}

impl std::fmt::Display for SimplificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}: {} -> {} triangles ({:.1}% reduction",
            self.variant,
            self.original_triangles,
            self.final_triangles,
            self.reduction_percent()
        )?;
        match self.stats {
            DispatchOutcome::Reduced(stats) => write!(f, ", {} collapses)", stats.collapses_performed),
            DispatchOutcome::Remeshed(stats) => write!(f, ", {} groups remeshed)", stats.groups_remeshed),
        }
    }
}

/// Runs simplifications against a set of collaborators.
///
/// Every run works on a private copy of the input; the input itself is
/// only read, so independent runs may share it.
#[derive(Debug, Clone, Default)]
pub struct SimplificationPipeline<B = DefaultBackend> {
    backend: B,
}

impl SimplificationPipeline {
    /// Pipeline over the default collaborators
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: SimplifyBackend> SimplificationPipeline<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn run(
        &self,
        mesh: &TriangleMesh,
        options: &SimplifyOptions,
        target: TargetSpec,
    ) -> Result<SimplificationResult> {
        let options = options.validated();
        let original_triangles = mesh.triangle_count();
        info!(
            variant = ?options.algorithm,
            ?target,
            triangles = original_triangles,
            vertices = mesh.vertex_count(),
            "Starting simplification"
        );
        mesh.validate()?;

        let mut working = TriangleMesh::new();
        working.copy_from(mesh, !options.discard_attributes);

        let stats = ReductionDispatcher::new(&self.backend).dispatch(&mut working, mesh, &options, target)?;
        let repair = repair_attributes(&mut working);

        let final_triangles = working.triangle_count();
        info!(
            variant = ?options.algorithm,
            original = original_triangles,
            result = final_triangles,
            "Simplification finished"
        );

        Ok(SimplificationResult {
            mesh: working,
            variant: options.algorithm,
            original_triangles,
            final_triangles,
            stats,
            repair,
        })
    }
}

/// Simplify `mesh` with the default collaborators and return the result.
///
/// Fails with [`Error::InvalidInput`] when no mesh is given.
pub fn simplify(mesh: Option<&TriangleMesh>, options: &SimplifyOptions, target: TargetSpec) -> Result<TriangleMesh> {
    let mesh = mesh.ok_or_else(|| Error::InvalidInput("simplify: mesh is missing".to_string()))?;
    SimplificationPipeline::new()
        .run(mesh, options, target)
        .map(|result| result.mesh)
}

/// Simplify `mesh` in place to `percentage` percent of its triangles.
///
/// On error the mesh is left untouched.
pub fn apply_simplify_to_target_percentage(
    mesh: Option<&mut TriangleMesh>,
    options: &SimplifyOptions,
    percentage: u32,
) -> Result<()> {
    let mesh = mesh.ok_or_else(|| {
        Error::InvalidInput("apply_simplify_to_target_percentage: mesh is missing".to_string())
    })?;
    let result = SimplificationPipeline::new().run(mesh, options, TargetSpec::Percentage(percentage as f32))?;
    *mesh = result.mesh;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ReductionStats;
    use crate::polygroup::RemeshStats;
    use meshsimp_core::Point3f;

    fn octahedron() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(-1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(0.0, -1.0, 0.0),
                Point3f::new(0.0, 0.0, 1.0),
                Point3f::new(0.0, 0.0, -1.0),
            ],
            vec![
                [0, 2, 4],
                [2, 1, 4],
                [1, 3, 4],
                [3, 0, 4],
                [2, 0, 5],
                [1, 2, 5],
                [3, 1, 5],
                [0, 3, 5],
            ],
        )
    }

    fn result(original: usize, fin: usize, stats: DispatchOutcome) -> SimplificationResult {
        SimplificationResult {
            mesh: TriangleMesh::new(),
            variant: AlgorithmVariant::QuadricError,
            original_triangles: original,
            final_triangles: fin,
            stats,
            repair: RepairReport::default(),
        }
    }

    #[test]
    fn test_reduction_ratio() {
        let r = result(1000, 500, DispatchOutcome::Reduced(ReductionStats::default()));
        assert!((r.reduction_ratio() - 0.5).abs() < 1e-9);
        assert!((r.reduction_percent() - 50.0).abs() < 1e-9);
        assert_eq!(result(0, 0, DispatchOutcome::Remeshed(RemeshStats::default())).reduction_ratio(), 1.0);
    }

    #[test]
    fn test_display() {
        let r = result(
            1000,
            500,
            DispatchOutcome::Reduced(ReductionStats {
                collapses_performed: 250,
                collapses_rejected: 3,
            }),
        );
        let text = format!("{r}");
        assert!(text.contains("QuadricError"));
        assert!(text.contains("1000 -> 500"));
        assert!(text.contains("50.0%"));
        assert!(text.contains("250 collapses"));
    }

    #[test]
    fn test_missing_mesh_is_invalid_input() {
        let err = simplify(None, &SimplifyOptions::default(), TargetSpec::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = apply_simplify_to_target_percentage(None, &SimplifyOptions::default(), 50).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_input_mesh_untouched() {
        let mesh = octahedron();
        let before = mesh.clone();
        let out = simplify(Some(&mesh), &SimplifyOptions::default(), TargetSpec::TriangleCount(4)).unwrap();
        assert_eq!(mesh.vertices, before.vertices);
        assert_eq!(mesh.faces, before.faces);
        assert!(mesh.normals.is_none());
        assert!(out.triangle_count() <= before.triangle_count());
        assert!(out.has_vertex_normals());
        assert!(out.has_attributes());
    }

    #[test]
    fn test_apply_in_place() {
        let mut mesh = octahedron();
        apply_simplify_to_target_percentage(Some(&mut mesh), &SimplifyOptions::default(), 100).unwrap();
        assert_eq!(mesh.triangle_count(), 8);
        assert!(mesh.has_vertex_normals());
    }

    #[test]
    fn test_empty_mesh() {
        let out = simplify(
            Some(&TriangleMesh::new()),
            &SimplifyOptions::default(),
            TargetSpec::Percentage(50.0),
        )
        .unwrap();
        assert_eq!(out.triangle_count(), 0);
    }
}
