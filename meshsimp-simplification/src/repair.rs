//! Restores the attribute guarantees of a simplified mesh: vertex normals
//! are always present, and an enabled overlay layer is populated from
//! per-vertex data wherever its channels came back empty.

use meshsimp_core::normals::quick_compute_vertex_normals;
use meshsimp_core::TriangleMesh;
use tracing::debug;

/// What [`repair_attributes`] changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepairReport {
    pub normals_recomputed: bool,
    pub attributes_enabled: bool,
    pub uv_overlay_filled: bool,
    pub normal_overlay_filled: bool,
}

impl RepairReport {
    pub fn is_noop(&self) -> bool {
        *self == RepairReport::default()
    }
}

/// Repair `mesh` in place.
///
/// A mesh without overlays, or without per-vertex normals, gets freshly
/// computed vertex normals. The overlay layer is enabled if it is missing,
/// and every empty overlay channel with matching per-vertex data is filled
/// from it, splitting elements where the copy leaves them as bowties.
pub fn repair_attributes(mesh: &mut TriangleMesh) -> RepairReport {
    let mut report = RepairReport::default();

    if !mesh.has_attributes() || !mesh.has_vertex_normals() {
        quick_compute_vertex_normals(mesh);
        report.normals_recomputed = true;
    }

    if !mesh.has_attributes() {
        mesh.enable_attributes();
        report.attributes_enabled = true;
    }

    if let Some(attributes) = mesh.attributes.as_mut() {
        if attributes.uv.is_empty() {
            if let Some(uvs) = &mesh.uvs {
                attributes.uv.copy_from_vertex_data(&mesh.faces, uvs);
                report.uv_overlay_filled = true;
            }
        }
        if attributes.normals.is_empty() {
            if let Some(normals) = &mesh.normals {
                attributes.normals.copy_from_vertex_data(&mesh.faces, normals);
                report.normal_overlay_filled = true;
            }
        }
    }

    if !report.is_noop() {
        debug!(?report, "Repaired attributes");
    }
    report
}
