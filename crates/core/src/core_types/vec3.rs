//! Vector type alias for cell-centred vectors.

use nalgebra::Vector3;

/// 3D vector type for mesh geometry and diagnostic vectors.
///
/// Geometry (cell positions, edge normals) is stored in global Cartesian
/// coordinates. Diagnostic vectors (vorticity, gradients) are stored in the
/// local east/north/up frame of the cell they belong to.
pub type Vec3 = Vector3<f64>;
