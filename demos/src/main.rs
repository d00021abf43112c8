//! Simplify a procedural sphere with options picked on the command line
//!
//! ```text
//! RUST_LOG=debug simplify_sphere --algorithm attribute-aware --target percentage --value 25
//! simplify_sphere --all --slices 64 --stacks 32
//! ```

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use meshsimp_core::{Point3f, TriangleMesh};
use meshsimp_simplification::{
    AlgorithmVariant, SimplificationPipeline, SimplifyOptions, TargetSpec,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Algorithm to run
    #[clap(short, long, value_enum, default_value_t = Algorithm::Quadric)]
    algorithm: Algorithm,

    /// Run every algorithm in turn
    #[clap(long)]
    all: bool,

    /// Kind of size target
    #[clap(short, long, value_enum, default_value_t = Target::Percentage)]
    target: Target,

    /// Target value: percent, count, edge length or angle in degrees
    #[clap(short, long, default_value_t = 50.0)]
    value: f64,

    #[clap(flatten)]
    sphere: SphereSettings,

    /// Drop attribute overlays before simplifying
    #[clap(long)]
    discard_attributes: bool,

    /// Maximum deviation from the input surface
    #[clap(long)]
    geometric_tolerance: Option<f64>,

    /// Project the result back onto the input surface
    #[clap(long)]
    reproject: bool,
}

#[derive(Parser)]
struct SphereSettings {
    #[clap(long, default_value_t = 1.0)]
    radius: f32,

    #[clap(long, default_value_t = 32)]
    slices: usize,

    #[clap(long, default_value_t = 16)]
    stacks: usize,
}

#[derive(ValueEnum, Clone, Copy)]
enum Algorithm {
    Quadric,
    AttributeAware,
    ExistingVertex,
    ShapePreserving,
    Polygroup,
}

impl From<Algorithm> for AlgorithmVariant {
    fn from(a: Algorithm) -> Self {
        match a {
            Algorithm::Quadric => AlgorithmVariant::QuadricError,
            Algorithm::AttributeAware => AlgorithmVariant::AttributeAware,
            Algorithm::ExistingVertex => AlgorithmVariant::ExistingVertexOnly,
            Algorithm::ShapePreserving => AlgorithmVariant::ShapePreserving,
            Algorithm::Polygroup => AlgorithmVariant::PolygroupPreserving,
        }
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum Target {
    Percentage,
    Triangles,
    Vertices,
    EdgeLength,
    Minimal,
}

impl Args {
    fn target_spec(&self) -> Result<TargetSpec> {
        if !self.value.is_finite() || self.value < 0.0 {
            bail!("target value must be a non-negative number, got {}", self.value);
        }
        Ok(match self.target {
            Target::Percentage => TargetSpec::Percentage(self.value as f32),
            Target::Triangles => TargetSpec::TriangleCount(self.value as usize),
            Target::Vertices => TargetSpec::VertexCount(self.value as usize),
            Target::EdgeLength => TargetSpec::EdgeLength(self.value as f32),
            Target::Minimal => TargetSpec::Minimal {
                angle_threshold_degrees: self.value,
            },
        })
    }

    fn options(&self, algorithm: AlgorithmVariant) -> SimplifyOptions {
        let mut options = SimplifyOptions::new(algorithm)
            .with_discard_attributes(self.discard_attributes)
            .with_reproject(self.reproject);
        if let Some(tolerance) = self.geometric_tolerance {
            options = options.with_geometric_tolerance(tolerance);
        }
        options
    }
}

/// UV sphere with per-vertex UVs and one polygroup per octant
fn build_sphere(settings: &SphereSettings) -> Result<TriangleMesh> {
    let mut mesh = TriangleMesh::uv_sphere(settings.radius, settings.slices, settings.stacks)?;
    let groups = mesh
        .faces
        .iter()
        .map(|f| {
            let c = f.iter().fold(Point3f::origin().coords, |acc, &v| acc + mesh.vertices[v].coords);
            (c.x >= 0.0) as i32 | ((c.y >= 0.0) as i32) << 1 | ((c.z >= 0.0) as i32) << 2
        })
        .collect();
    mesh.set_polygroups(groups);
    Ok(mesh)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let sphere = build_sphere(&args.sphere)?;
    let target = args.target_spec()?;
    info!(
        vertices = sphere.vertex_count(),
        triangles = sphere.triangle_count(),
        "Built sphere"
    );

    let algorithms: Vec<AlgorithmVariant> = if args.all {
        AlgorithmVariant::ALL.to_vec()
    } else {
        vec![args.algorithm.into()]
    };

    let pipeline = SimplificationPipeline::new();
    for algorithm in algorithms {
        let result = pipeline.run(&sphere, &args.options(algorithm), target)?;
        println!("{result}");
        println!(
            "  {} vertices, normals: {}, overlays: {}",
            result.mesh.vertex_count(),
            result.mesh.has_vertex_normals(),
            result.mesh.has_attributes()
        );
    }
    Ok(())
}
