//! Conversion of user-facing targets into reducer stop conditions

use crate::options::AlgorithmVariant;
use serde::{Deserialize, Serialize};

/// Smallest triangle count a percentage target may resolve to
pub const MIN_PERCENTAGE_TRIANGLES: usize = 4;

/// Coplanarity/collinearity threshold in degrees used by shape-preserving
/// reduction
pub const MINIMAL_ANGLE_THRESHOLD_DEGREES: f64 = 0.01;

/// Size target requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TargetSpec {
    /// Percentage (0-100) of the input triangle count
    Percentage(f32),
    TriangleCount(usize),
    VertexCount(usize),
    /// Collapse edges shorter than this length
    EdgeLength(f32),
    /// Collapse every edge whose removal does not change the shape
    Minimal { angle_threshold_degrees: f64 },
}

impl Default for TargetSpec {
    fn default() -> Self {
        TargetSpec::Percentage(50.0)
    }
}

/// Stop condition consumed by a reduction engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopCondition {
    TriangleCount(usize),
    VertexCount(usize),
    EdgeLength(f64),
    MinimalShapePreserving { angle_tolerance_degrees: f64 },
}

impl StopCondition {
    pub fn is_minimal(&self) -> bool {
        matches!(self, StopCondition::MinimalShapePreserving { .. })
    }
}

/// Resolves targets against the triangle count of the original mesh
#[derive(Debug, Clone, Copy)]
pub struct TargetResolver {
    original_triangle_count: usize,
}

impl TargetResolver {
    /// `original_triangle_count` must be captured before any reduction
    pub fn new(original_triangle_count: usize) -> Self {
        Self {
            original_triangle_count,
        }
    }

    /// `max(4, floor(percentage / 100 * original))`
    pub fn percentage_to_triangles(&self, percentage: f32) -> usize {
        let ratio = percentage as f64 / 100.0;
        // float-to-int casts saturate, so negative ratios land on 0
        let count = (ratio * self.original_triangle_count as f64).floor() as usize;
        count.max(MIN_PERCENTAGE_TRIANGLES)
    }

    /// Map `target` to a stop condition. Shape-preserving runs always
    /// resolve to the minimal condition, whatever was requested.
    pub fn resolve(&self, target: TargetSpec, variant: AlgorithmVariant) -> StopCondition {
        if variant == AlgorithmVariant::ShapePreserving {
            return StopCondition::MinimalShapePreserving {
                angle_tolerance_degrees: MINIMAL_ANGLE_THRESHOLD_DEGREES,
            };
        }
        match target {
            TargetSpec::Percentage(p) => StopCondition::TriangleCount(self.percentage_to_triangles(p)),
            TargetSpec::TriangleCount(n) => StopCondition::TriangleCount(n),
            TargetSpec::VertexCount(n) => StopCondition::VertexCount(n),
            TargetSpec::EdgeLength(len) => StopCondition::EdgeLength(len as f64),
            TargetSpec::Minimal {
                angle_threshold_degrees,
            } => StopCondition::MinimalShapePreserving {
                angle_tolerance_degrees: angle_threshold_degrees,
            },
        }
    }
}
