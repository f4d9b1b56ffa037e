//! Discrete operators on the Voronoi mesh
//!
//! All operators are linear in their field argument and read neighbour values
//! as stored; halo freshness is the caller's contract. Vectors returned at
//! cell centres are in the cell's local east/north/up frame.
//!
//! - [`MeshOperators::edge_normal_gradient`]: `(φ₂ − φ₁) / dc` on edges
//! - [`MeshOperators::gradient`]: 3D gradient with slope correction
//! - [`MeshOperators::d_dz`]: vertical derivative on the level stack
//! - [`MeshOperators::relative_vorticity`] / [`MeshOperators::absolute_vorticity`]:
//!   vorticity vectors of an edge-normal wind

mod gradient;
mod reconstruct;
mod vertical;
mod vorticity;

pub use reconstruct::VectorReconstructor;

use crate::error::PvError;
use crate::fields::VectorField;
use crate::mesh::Mesh;
use std::sync::Arc;
use tracing::debug;

/// Mesh-bound operator set with precomputed reconstruction weights
#[derive(Debug, Clone)]
pub struct MeshOperators {
    mesh: Arc<Mesh>,
    reconstructor: VectorReconstructor,
    /// Level-following slope `∇_s z` of every level surface
    slope: VectorField,
}

impl MeshOperators {
    /// Precompute reconstruction weights and level slopes for `mesh`.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::InvalidMesh`] if a cell's reconstruction is singular.
    pub fn new(mesh: Arc<Mesh>) -> Result<Self, PvError> {
        let reconstructor = VectorReconstructor::new(&mesh)?;
        let mut ops = Self {
            slope: VectorField::new(mesh.n_cells(), mesh.n_levels()),
            mesh,
            reconstructor,
        };
        ops.slope = ops.level_gradient(ops.mesh.z_mid())?;
        debug!(
            "Operators ready: max level slope {:.3e}",
            ops.slope
                .as_slice()
                .iter()
                .fold(0.0_f64, |m, s| m.max(s.norm()))
        );
        Ok(ops)
    }

    /// The mesh these operators were built for
    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    /// The shared vector reconstructor
    pub fn reconstructor(&self) -> &VectorReconstructor {
        &self.reconstructor
    }
}
