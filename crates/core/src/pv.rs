//! Ertel potential vorticity
//!
//! `PV = (ω_a · ∇θ) / ρ`, reported in PV units (1 PVU = 10⁻⁶ K m² kg⁻¹ s⁻¹).
//! All three inputs live at cell centres in the local east/north/up frame.

use crate::error::PvError;
use crate::fields::{Field, FieldLocation, VectorField};
use crate::mesh::Mesh;
use crate::operators::MeshOperators;
use crate::time_levels::ModelState;
use rayon::prelude::*;

/// Factor converting SI potential vorticity to PVU
/// (inverse of [`crate::core_types::Pvu::SI_PER_PVU`])
pub const PVU_SCALE: f64 = 1.0e6;

/// Ertel PV (PVU) from absolute vorticity, θ gradient and density.
///
/// # Errors
///
/// Returns [`PvError::ShapeMismatch`] if the three inputs disagree in shape.
pub fn ertel_pv(
    abs_vorticity: &VectorField,
    theta_gradient: &VectorField,
    rho: &Field,
) -> Result<Field, PvError> {
    let (n_cells, n_levels) = (abs_vorticity.n_cells(), abs_vorticity.n_levels());
    theta_gradient.check_shape("theta_gradient", n_cells, n_levels)?;
    rho.check_shape("rho", FieldLocation::Cell, n_cells, n_levels)?;

    let mut pv = Field::new(FieldLocation::Cell, n_cells, n_levels);
    pv.as_mut_slice()
        .par_iter_mut()
        .zip(abs_vorticity.as_slice().par_iter())
        .zip(theta_gradient.as_slice().par_iter())
        .zip(rho.as_slice().par_iter())
        .for_each(|(((out, omega), grad), rho)| {
            *out = PVU_SCALE * omega.dot(grad) / rho;
        });
    Ok(pv)
}

/// `sign(f) · PV`; cells with `f = 0` count as northern hemisphere.
///
/// # Errors
///
/// Returns [`PvError::ShapeMismatch`] if `pv` is not a full cell field.
pub fn signed_pv(pv: &Field, mesh: &Mesh) -> Result<Field, PvError> {
    mesh.check_field("pv", pv, FieldLocation::Cell)?;
    let mut signed = pv.clone();
    let n_levels = mesh.n_levels();
    signed
        .as_mut_slice()
        .par_chunks_mut(n_levels)
        .enumerate()
        .for_each(|(c, column)| {
            if mesh.f_cell(c) < 0.0 {
                column.iter_mut().for_each(|v| *v = -*v);
            }
        });
    Ok(signed)
}

/// PV and the two vectors it was built from, for one time level
#[derive(Debug, Clone)]
pub struct PvFields {
    /// Absolute vorticity vector (s⁻¹)
    pub abs_vorticity: VectorField,
    /// Potential temperature gradient (K/m)
    pub theta_gradient: VectorField,
    /// Ertel PV (PVU)
    pub pv: Field,
}

impl PvFields {
    /// Derive vorticity, θ gradient and PV from a model state.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if the state does not fit the mesh.
    pub fn compute(ops: &MeshOperators, state: &ModelState) -> Result<Self, PvError> {
        state.validate(ops.mesh())?;
        let abs_vorticity = ops.absolute_vorticity(&state.u_edge)?;
        let theta_gradient = ops.gradient(&state.theta)?;
        let pv = ertel_pv(&abs_vorticity, &theta_gradient, &state.rho)?;
        Ok(Self {
            abs_vorticity,
            theta_gradient,
            pv,
        })
    }
}
