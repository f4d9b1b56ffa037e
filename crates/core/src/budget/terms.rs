//! The two kinds of PV tendency term
//!
//! Writing `PV = ω·g / ρ` with `g = ∇θ`, a momentum forcing `F` changes `ω`
//! by `curl F` and a heating `Q` changes `g` by `∇Q`:
//!
//! - momentum term: `(curl F) · ∇θ / ρ`
//! - heating term:  `ω · ∇Q / ρ`
//!
//! Which time level supplies `ω`, `∇θ` and `ρ` is the caller's choice; see
//! [`super::TendencyBudget::compute`].

use super::inputs::{EdgeTendency, HeatingTendency};
use crate::error::PvError;
use crate::fields::{Field, VectorField};
use crate::operators::MeshOperators;
use crate::pv::ertel_pv;

/// PV tendency (PVU s⁻¹) of a momentum forcing.
///
/// # Errors
///
/// Returns [`PvError::ShapeMismatch`] if any input does not fit the mesh.
pub fn momentum_term(
    ops: &MeshOperators,
    forcing: &EdgeTendency,
    theta_gradient: &VectorField,
    rho: &Field,
) -> Result<Field, PvError> {
    let curl = ops.relative_vorticity(forcing.field())?;
    ertel_pv(&curl, theta_gradient, rho)
}

/// PV tendency (PVU s⁻¹) of a heating.
///
/// # Errors
///
/// Returns [`PvError::ShapeMismatch`] if any input does not fit the mesh.
pub fn heating_term(
    ops: &MeshOperators,
    abs_vorticity: &VectorField,
    heating: &HeatingTendency,
    rho: &Field,
) -> Result<Field, PvError> {
    let heating_gradient = ops.gradient(heating.field())?;
    ertel_pv(abs_vorticity, &heating_gradient, rho)
}
