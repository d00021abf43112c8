//! User-facing simplification options

use serde::{Deserialize, Serialize};

/// Which simplification algorithm to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlgorithmVariant {
    /// Standard quadric error metric. Fastest.
    #[default]
    QuadricError,
    /// Quadric error weighted by attribute (normal/UV) differences.
    AttributeAware,
    /// Collapse only to existing vertex positions.
    ExistingVertexOnly,
    /// Collapse redundant edges without changing the shape.
    ShapePreserving,
    /// Retriangulate each polygroup, keeping only polygroup boundaries.
    PolygroupPreserving,
}

impl AlgorithmVariant {
    pub const ALL: [AlgorithmVariant; 5] = [
        AlgorithmVariant::QuadricError,
        AlgorithmVariant::AttributeAware,
        AlgorithmVariant::ExistingVertexOnly,
        AlgorithmVariant::ShapePreserving,
        AlgorithmVariant::PolygroupPreserving,
    ];
}

/// Options describing one simplification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifyOptions {
    pub algorithm: AlgorithmVariant,
    /// Drop attribute overlays from the working copy before reduction
    pub discard_attributes: bool,
    /// Bound deviation from the input surface by `geometric_tolerance`
    pub geometric_constraint: bool,
    /// Allowed deviation; only honored with `geometric_constraint`
    pub geometric_tolerance: f64,
    /// Project simplified vertices back onto the input surface
    pub reproject: bool,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmVariant::QuadricError,
            discard_attributes: false,
            geometric_constraint: false,
            geometric_tolerance: 0.0,
            reproject: false,
        }
    }
}

impl SimplifyOptions {
    pub fn new(algorithm: AlgorithmVariant) -> Self {
        Self {
            algorithm,
            ..Default::default()
        }
    }

    pub fn with_discard_attributes(mut self, discard: bool) -> Self {
        self.discard_attributes = discard;
        self
    }

    /// Enable the geometric constraint with the given tolerance
    pub fn with_geometric_tolerance(mut self, tolerance: f64) -> Self {
        self.geometric_constraint = true;
        self.geometric_tolerance = tolerance;
        self
    }

    pub fn with_reproject(mut self, reproject: bool) -> Self {
        self.reproject = reproject;
        self
    }

    /// Tolerance actually applied: zero unless the constraint is enabled.
    /// Negative and non-finite tolerances also normalize to zero.
    pub fn effective_tolerance(&self) -> f64 {
        if self.geometric_constraint && self.geometric_tolerance.is_finite() {
            self.geometric_tolerance.max(0.0)
        } else {
            0.0
        }
    }

    /// Normalized copy of these options
    pub fn validated(&self) -> SimplifyOptions {
        SimplifyOptions {
            geometric_tolerance: self.effective_tolerance(),
            ..self.clone()
        }
    }
}
