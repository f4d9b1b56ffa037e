//! Horizontal and 3D gradients of cell-centre scalars
//!
//! The edge-normal derivative `(φ[c1] − φ[c0]) / dc_e` is the flux-form
//! gradient of Ringler et al. (2010, Eq. 22). Reconstructing it with the wind
//! reconstructor gives the level-following gradient `∇_s φ`; the gradient on
//! constant-height surfaces follows from the chain rule
//! `∇_z φ = ∇_s φ − (∂φ/∂z) ∇_s z`.

use super::MeshOperators;
use crate::core_types::Vec3;
use crate::error::PvError;
use crate::fields::{Field, FieldLocation, VectorField};
use rayon::prelude::*;

impl MeshOperators {
    /// Edge-normal derivative of a cell field, positive along the edge normal.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `phi` is not a full cell field.
    pub fn edge_normal_gradient(&self, phi: &Field) -> Result<Field, PvError> {
        let mesh = &self.mesh;
        mesh.check_field("edge_normal_gradient input", phi, FieldLocation::Cell)?;

        let n_levels = mesh.n_levels();
        let mut out = Field::new(FieldLocation::Edge, mesh.n_edges(), n_levels);
        out.as_mut_slice()
            .par_chunks_mut(n_levels)
            .enumerate()
            .for_each(|(e, column)| {
                let [c0, c1] = mesh.cells_on_edge(e);
                let inv_dc = 1.0 / mesh.dc_edge(e);
                let (p0, p1) = (phi.column(c0), phi.column(c1));
                for k in 0..n_levels {
                    column[k] = (p1[k] - p0[k]) * inv_dc;
                }
            });
        Ok(out)
    }

    /// Horizontal gradient along the model levels, `∇_s φ`.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `phi` is not a full cell field.
    pub fn level_gradient(&self, phi: &Field) -> Result<VectorField, PvError> {
        let normal = self.edge_normal_gradient(phi)?;
        self.reconstructor.reconstruct(&normal)
    }

    /// Full 3D gradient at cell centres.
    ///
    /// The horizontal part is taken on constant-height surfaces; the vertical
    /// part is [`MeshOperators::d_dz`].
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `phi` is not a full cell field.
    pub fn gradient(&self, phi: &Field) -> Result<VectorField, PvError> {
        let mut grad = self.level_gradient(phi)?;
        let dphi_dz = self.d_dz(phi)?;
        let n_levels = self.mesh.n_levels();
        grad.as_mut_slice()
            .par_chunks_mut(n_levels)
            .zip(self.slope.as_slice().par_chunks(n_levels))
            .enumerate()
            .for_each(|(c, (column, slope))| {
                let dz = dphi_dz.column(c);
                for k in 0..n_levels {
                    let horizontal = column[k] - dz[k] * slope[k];
                    column[k] = Vec3::new(horizontal.x, horizontal.y, dz[k]);
                }
            });
        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use crate::core_types::Vec3;
    use crate::fields::{Field, FieldLocation};
    use crate::mesh::PeriodicHexMesh;
    use crate::operators::MeshOperators;
    use std::sync::Arc;

    #[test]
    fn test_edge_gradient_sign_follows_normal() {
        let mesh = Arc::new(PeriodicHexMesh::new(4, 4, 1000.0).build().unwrap());
        let ops = MeshOperators::new(mesh.clone()).unwrap();
        let mut phi = Field::new(FieldLocation::Cell, mesh.n_cells(), 1);
        let [c0, c1] = mesh.cells_on_edge(0);
        phi.set(c1, 0, 5.0);
        let g = ops.edge_normal_gradient(&phi).unwrap();
        assert!((g.get(0, 0) - 5.0e-3).abs() < 1e-15);
        assert_eq!(phi.get(c0, 0), 0.0);
    }

    #[test]
    fn test_linear_field_gradient_is_exact_at_interior_cells() {
        let builder = PeriodicHexMesh::new(8, 8, 2000.0).with_levels(vec![500.0, 1500.0, 3000.0]);
        let mesh = Arc::new(builder.build().unwrap());
        let ops = MeshOperators::new(mesh.clone()).unwrap();
        let a = Vec3::new(2.0e-3, -1.0e-3, 4.0e-3);
        let phi = Field::from_fn(FieldLocation::Cell, mesh.n_cells(), 3, |c, k| {
            let p = mesh.cell_position(c);
            a.x * p.x + a.y * p.y + a.z * mesh.z_mid().get(c, k)
        });
        let grad = ops.gradient(&phi).unwrap();
        for c in (0..mesh.n_cells()).filter(|&c| builder.is_interior(c)) {
            for k in 0..3 {
                assert!((grad.get(c, k) - a).norm() < 1e-12, "cell {c} level {k}");
            }
        }
    }

    #[test]
    fn test_slope_correction_on_tilted_levels() {
        // Levels tilt in x; φ = z only, so ∇_z φ must be purely vertical
        let builder = PeriodicHexMesh::new(8, 8, 1000.0);
        let mut arrays = builder.arrays().unwrap();
        arrays.n_levels = 3;
        let positions = arrays.cell_positions.clone();
        arrays.z_mid = positions
            .iter()
            .flat_map(|p| [0.0, 1000.0, 2000.0].map(|z| z + 1.0e-2 * p.x))
            .collect();
        let mesh = Arc::new(crate::mesh::Mesh::new(arrays).unwrap());
        let ops = MeshOperators::new(mesh.clone()).unwrap();

        let phi = mesh.z_mid().clone();
        let grad = ops.gradient(&phi).unwrap();
        for c in (0..mesh.n_cells()).filter(|&c| builder.is_interior(c)) {
            for k in 0..3 {
                let g = grad.get(c, k);
                assert!(g.x.abs() < 1e-12 && g.y.abs() < 1e-12, "cell {c}: {g:?}");
                assert!((g.z - 1.0).abs() < 1e-12);
            }
        }
    }
}
