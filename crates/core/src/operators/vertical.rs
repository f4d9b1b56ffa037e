//! Vertical derivative on the level stack

use super::MeshOperators;
use crate::error::PvError;
use crate::fields::{Field, FieldLocation};
use rayon::prelude::*;

impl MeshOperators {
    /// `∂φ/∂z` at cell centres: centred between neighbouring levels, one-sided
    /// at the bottom and top. A single-level mesh has zero vertical derivative.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `phi` is not a full cell field.
    pub fn d_dz(&self, phi: &Field) -> Result<Field, PvError> {
        let mesh = &self.mesh;
        mesh.check_field("d_dz input", phi, FieldLocation::Cell)?;

        let n_levels = mesh.n_levels();
        let z = mesh.z_mid();
        let mut out = Field::new(FieldLocation::Cell, mesh.n_cells(), n_levels);
        if n_levels < 2 {
            return Ok(out);
        }
        out.as_mut_slice()
            .par_chunks_mut(n_levels)
            .enumerate()
            .for_each(|(c, column)| column_derivative(phi.column(c), z.column(c), column));
        Ok(out)
    }
}

/// Derivative of `values` with respect to `z` on one column (at least two levels).
pub(crate) fn column_derivative(values: &[f64], z: &[f64], out: &mut [f64]) {
    let top = values.len() - 1;
    for k in 0..=top {
        let (lo, hi) = (k.saturating_sub(1), (k + 1).min(top));
        out[k] = (values[hi] - values[lo]) / (z[hi] - z[lo]);
    }
}
