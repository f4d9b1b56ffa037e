//! Interpolation of 3D fields onto the dynamic tropopause and isobaric levels
//!
//! Both surfaces reduce to a per-column [`Bracket`]: two adjacent levels and a
//! weight. A column without a bracket yields [`FILL_VALUE`]; nothing is ever
//! extrapolated.
//!
//! Isobaric brackets are linear in `ln p`.

use crate::core_types::Pascals;
use crate::error::PvError;
use crate::fields::{Field, FieldLocation};
use crate::tropopause::DtSurface;
use rayon::prelude::*;

/// Value written where a surface does not intersect a column
pub const FILL_VALUE: f64 = -99999.0;

/// Two adjacent levels and the interpolation weight between them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    /// Lower level index (closer to the ground)
    pub lower: usize,
    /// Upper level index, `lower + 1`
    pub upper: usize,
    /// Weight of the upper level, in `[0, 1]`
    pub weight: f64,
}

impl Bracket {
    /// Bracket between `lower` and `lower + 1`
    pub fn new(lower: usize, weight: f64) -> Self {
        Self {
            lower,
            upper: lower + 1,
            weight,
        }
    }

    /// Interpolate one column: `f[lower] + w (f[upper] − f[lower])`
    pub fn interpolate(&self, column: &[f64]) -> f64 {
        let (lo, hi) = (column[self.lower], column[self.upper]);
        lo + self.weight * (hi - lo)
    }
}

/// Interpolate a column with an optional bracket, filling when absent
pub fn interpolate_column(column: &[f64], bracket: Option<&Bracket>) -> f64 {
    bracket.map_or(FILL_VALUE, |b| b.interpolate(column))
}

/// Sample a cell field on the dynamic tropopause.
///
/// `field` must describe the same time level the surface was located on.
/// Returns a single-level cell field; columns without a tropopause hold
/// [`FILL_VALUE`].
///
/// # Errors
///
/// Returns [`PvError::ShapeMismatch`] if `field` does not have one column per
/// surface column.
pub fn interpolate_to_dt(field: &Field, surface: &DtSurface) -> Result<Field, PvError> {
    let n_cells = surface.n_columns();
    if field.location() != FieldLocation::Cell || field.n_horizontal() != n_cells {
        return Err(PvError::shape(
            "dt interpolation input",
            (FieldLocation::Cell, n_cells, field.n_levels()),
            field.shape(),
        ));
    }
    let mut out = Field::new(FieldLocation::Cell, n_cells, 1);
    out.as_mut_slice()
        .par_iter_mut()
        .enumerate()
        .for_each(|(c, v)| *v = interpolate_column(field.column(c), surface.bracket(c)));
    Ok(out)
}

/// Bracket of `target` in a pressure column, linear in `ln p`.
///
/// Pressure is expected to decrease with level index. Returns `None` when the
/// target lies outside the column or the column holds non-positive pressure.
pub fn pressure_bracket(pressure: &[f64], target: f64) -> Option<Bracket> {
    if target <= 0.0 {
        return None;
    }
    let ln_target = target.ln();
    pressure.windows(2).enumerate().find_map(|(k, pair)| {
        let (p_lo, p_hi) = (pair[0], pair[1]);
        if p_lo <= 0.0 || p_hi <= 0.0 || p_lo == p_hi {
            return None;
        }
        if p_lo >= target && target >= p_hi {
            let weight = (ln_target - p_lo.ln()) / (p_hi.ln() - p_lo.ln());
            Some(Bracket::new(k, weight))
        } else {
            None
        }
    })
}

/// Per-column brackets of a set of isobaric levels
#[derive(Debug, Clone)]
pub struct IsobaricBrackets {
    levels: Vec<Pascals>,
    /// Column-contiguous: `cell * levels.len() + level`
    brackets: Vec<Option<Bracket>>,
    n_cells: usize,
}

impl IsobaricBrackets {
    /// Locate every isobaric level in every pressure column.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `pressure` is not a cell field.
    pub fn locate(pressure: &Field, levels: &[Pascals]) -> Result<Self, PvError> {
        if pressure.location() != FieldLocation::Cell {
            return Err(PvError::shape(
                "pressure",
                (FieldLocation::Cell, pressure.n_horizontal(), pressure.n_levels()),
                pressure.shape(),
            ));
        }
        let n_cells = pressure.n_horizontal();
        let n_iso = levels.len();
        let mut brackets = vec![None; n_cells * n_iso];
        if n_iso > 0 {
            brackets
                .par_chunks_mut(n_iso)
                .enumerate()
                .for_each(|(c, out)| {
                    let column = pressure.column(c);
                    for (slot, level) in out.iter_mut().zip(levels) {
                        *slot = pressure_bracket(column, **level);
                    }
                });
        }
        Ok(Self {
            levels: levels.to_vec(),
            brackets,
            n_cells,
        })
    }

    /// Target levels
    pub fn levels(&self) -> &[Pascals] {
        &self.levels
    }

    /// Bracket of level `level` in column `cell`
    pub fn bracket(&self, cell: usize, level: usize) -> Option<&Bracket> {
        self.brackets[cell * self.levels.len() + level].as_ref()
    }

    /// Number of (column, level) pairs outside the column's pressure range
    pub fn out_of_range_count(&self) -> usize {
        self.brackets.iter().filter(|b| b.is_none()).count()
    }

    /// Interpolate a cell field to every isobaric level.
    ///
    /// Returns a cell field with one "level" per isobaric target.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `field` has a different number of
    /// columns than the pressure field the brackets were located on.
    pub fn interpolate(&self, field: &Field) -> Result<Field, PvError> {
        if field.location() != FieldLocation::Cell || field.n_horizontal() != self.n_cells {
            return Err(PvError::shape(
                "isobaric interpolation input",
                (FieldLocation::Cell, self.n_cells, field.n_levels()),
                field.shape(),
            ));
        }
        let n_iso = self.levels.len();
        let mut out = Field::new(FieldLocation::Cell, self.n_cells, n_iso);
        if n_iso == 0 {
            return Ok(out);
        }
        out.as_mut_slice()
            .par_chunks_mut(n_iso)
            .zip(self.brackets.par_chunks(n_iso))
            .enumerate()
            .for_each(|(c, (values, brackets))| {
                let column = field.column(c);
                for (v, b) in values.iter_mut().zip(brackets) {
                    *v = interpolate_column(column, b.as_ref());
                }
            });
        Ok(out)
    }
}
