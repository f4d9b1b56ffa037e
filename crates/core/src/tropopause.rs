//! Dynamic tropopause location
//!
//! Columns are stored bottom first, so the scan walks level indices downward
//! from the top. The tropopause is the uppermost adjacent pair whose upper
//! level has signed PV at or above the threshold and whose lower level is
//! strictly below it:
//!
//! ```text
//!  level  signed PV   state after visiting it
//!    3       3.0      Candidate { upper: 3 }
//!    2       1.0      Accepted  (lower 2, upper 3)
//!    1       2.5      -         (never visited)
//!    0       1.5      -
//! ```
//!
//! A transition the other way (below the threshold above, at or above it
//! underneath) is not a tropopause; it is counted as a rejection and the scan
//! continues. Non-finite values (NaN and ±∞) are neither above nor below the
//! threshold and break any pending candidate.

use crate::core_types::Pvu;
use crate::error::PvError;
use crate::fields::{Field, FieldLocation};
use crate::interpolate::Bracket;
use rayon::prelude::*;
use tracing::{trace, warn};

/// State of a column scan after visiting a level
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanState {
    /// No level at or above the threshold directly above the current one
    Searching,
    /// The level just visited is at or above the threshold
    Candidate {
        /// Index of that level
        upper: usize,
    },
    /// A crossing was found; the scan is finished
    Accepted(Bracket),
}

/// Top-down scan of one signed-PV column
///
/// Iterating yields the state after each visited level and stops after
/// [`ScanState::Accepted`] or at the bottom of the column.
#[derive(Debug, Clone)]
pub struct ColumnScan<'a> {
    values: &'a [f64],
    threshold: f64,
    /// Next level to visit (counting down); `None` when finished
    next: Option<usize>,
    state: ScanState,
    /// Whether a valid below-threshold level sits directly above `next`
    below_above: bool,
    rejected: usize,
}

impl<'a> ColumnScan<'a> {
    /// Start a scan at the top of `values` (bottom-first column)
    pub fn new(values: &'a [f64], threshold: f64) -> Self {
        Self {
            values,
            threshold,
            next: values.len().checked_sub(1),
            state: ScanState::Searching,
            below_above: false,
            rejected: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Number of below→above transitions skipped so far
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Run to completion and return the accepted bracket, if any
    pub fn locate(&mut self) -> Option<Bracket> {
        self.find_map(|state| match state {
            ScanState::Accepted(bracket) => Some(bracket),
            _ => None,
        })
    }

    fn visit(&mut self, k: usize) -> ScanState {
        let v = self.values[k];
        let finite = v.is_finite();
        let above = finite && v >= self.threshold;
        let below = finite && v < self.threshold;

        self.state = match self.state {
            ScanState::Candidate { upper } if below => {
                let v_upper = self.values[upper];
                let weight = (self.threshold - v) / (v_upper - v);
                ScanState::Accepted(Bracket::new(k, weight))
            }
            _ if above => {
                if self.below_above {
                    self.rejected += 1;
                    trace!("Rejected below-to-above transition at level {}", k);
                }
                ScanState::Candidate { upper: k }
            }
            _ => ScanState::Searching,
        };
        self.below_above = below;
        self.state
    }
}

impl Iterator for ColumnScan<'_> {
    type Item = ScanState;

    fn next(&mut self) -> Option<ScanState> {
        if matches!(self.state, ScanState::Accepted(_)) {
            return None;
        }
        let k = self.next?;
        self.next = k.checked_sub(1);
        Some(self.visit(k))
    }
}

/// Locate the dynamic tropopause in one bottom-first signed-PV column
pub fn locate_dt(column: &[f64], threshold: Pvu) -> Option<Bracket> {
    ColumnScan::new(column, *threshold).locate()
}

/// Dynamic tropopause brackets of every column
#[derive(Debug, Clone)]
pub struct DtSurface {
    brackets: Vec<Option<Bracket>>,
    threshold: Pvu,
    rejected: usize,
}

impl DtSurface {
    /// Scan every column of a signed-PV field.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `signed_pv` is not a cell field.
    pub fn locate(signed_pv: &Field, threshold: Pvu) -> Result<Self, PvError> {
        if signed_pv.location() != FieldLocation::Cell {
            return Err(PvError::shape(
                "signed_pv",
                (FieldLocation::Cell, signed_pv.n_horizontal(), signed_pv.n_levels()),
                signed_pv.shape(),
            ));
        }

        let non_finite = signed_pv
            .as_slice()
            .par_iter()
            .filter(|v| !v.is_finite())
            .count();
        if non_finite > 0 {
            warn!(
                "Tropopause scan saw {} non-finite signed PV values; affected brackets are skipped",
                non_finite
            );
        }

        let results: Vec<(Option<Bracket>, usize)> = (0..signed_pv.n_horizontal())
            .into_par_iter()
            .map(|c| {
                let mut scan = ColumnScan::new(signed_pv.column(c), *threshold);
                let bracket = scan.locate();
                (bracket, scan.rejected())
            })
            .collect();

        let rejected = results.iter().map(|(_, r)| r).sum();
        let brackets = results.into_iter().map(|(b, _)| b).collect();
        Ok(Self {
            brackets,
            threshold,
            rejected,
        })
    }

    /// Number of columns
    pub fn n_columns(&self) -> usize {
        self.brackets.len()
    }

    /// Bracket of one column, `None` if the column has no tropopause
    pub fn bracket(&self, column: usize) -> Option<&Bracket> {
        self.brackets[column].as_ref()
    }

    /// Threshold the surface was located with
    pub fn threshold(&self) -> Pvu {
        self.threshold
    }

    /// Columns without a tropopause
    pub fn missing_count(&self) -> usize {
        self.brackets.iter().filter(|b| b.is_none()).count()
    }

    /// Total below→above transitions rejected across all columns
    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    /// Fractional tropopause level `lower + weight` as a single-level cell
    /// field, [`crate::FILL_VALUE`] where missing
    pub fn fractional_level(&self) -> Field {
        Field::from_fn(FieldLocation::Cell, self.brackets.len(), 1, |c, _| {
            self.brackets[c].map_or(crate::FILL_VALUE, |b| b.lower as f64 + b.weight)
        })
    }
}
