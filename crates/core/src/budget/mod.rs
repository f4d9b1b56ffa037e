//! PV tendency budget
//!
//! Each enabled [`TendencyCategory`] gets one per-cell, per-level tendency
//! field (PVU s⁻¹). The time level of every ingredient is fixed:
//!
//! | Category              | ω     | ∇θ   | ρ    | driving input                    |
//! |-----------------------|-------|------|------|----------------------------------|
//! | dynamics              | t+dt  | t+dt | t+dt | dynamics momentum and θ          |
//! | diabatic              | **t** | -    | t+dt | net physics θ                    |
//! | friction (3 kinds)    | -     | t+dt | t+dt | scheme momentum                  |
//! | mixing θ part         | t+dt  | -    | t+dt | diffusion θ (optional)           |
//! | microphysics (net, 5) | **t** | -    | t+dt | microphysics θ                   |
//!
//! With linear operators the exact PV change over a step splits as
//! `Δ(ω·g) = Δω·g(t+dt) + ω(t)·Δg`, which is why momentum forcings pair with
//! `∇θ(t+dt)` and heatings with `ω(t)`. The dynamics and mixing heating parts
//! use `ω(t+dt)` and therefore leave an `O(dt)` residual of
//! `dt · curl(ΣF) · ∇(Q_dyn + Q_mix) / ρ`; density changes over the step are
//! not attributed.
//!
//! Microphysics terms are a sub-breakdown of the diabatic term and never enter
//! [`TendencyBudget::closure_sum`].

mod accumulator;
mod category;
mod inputs;
mod terms;

pub use accumulator::{Accumulator, AccumulatorSet};
pub use category::TendencyCategory;
pub use inputs::{
    CoupledCellTendency, CoupledEdgeTendency, EdgeTendency, HeatingTendency, StepTendencies,
    TendencyInput, RV_OVER_RD,
};
pub use terms::{heating_term, momentum_term};

use crate::config::Capabilities;
use crate::core_types::Seconds;
use crate::error::PvError;
use crate::fields::Field;
use crate::operators::MeshOperators;
use crate::pv::PvFields;
use rustc_hash::FxHashMap;

/// Per-category PV tendencies of one step
#[derive(Debug, Clone, Default)]
pub struct TendencyBudget {
    terms: FxHashMap<TendencyCategory, Field>,
}

impl TendencyBudget {
    /// Compute every category enabled in `capabilities`.
    ///
    /// `old` and `new` are the PV ingredients at t and t+dt, `rho` the density
    /// at t+dt.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::MissingTendency`] if an enabled category's driving
    /// input is absent, or [`PvError::ShapeMismatch`] if an input does not fit
    /// the mesh.
    pub fn compute(
        ops: &MeshOperators,
        capabilities: &Capabilities,
        old: &PvFields,
        new: &PvFields,
        rho: &Field,
        tendencies: &StepTendencies,
    ) -> Result<Self, PvError> {
        let mut terms = FxHashMap::default();
        for &category in capabilities.categories() {
            let missing = || PvError::MissingTendency(category);
            let term = match category {
                TendencyCategory::Dynamics => {
                    let momentum = tendencies.dynamics_momentum.as_ref().ok_or_else(missing)?;
                    let heating = tendencies.dynamics_heating.as_ref().ok_or_else(missing)?;
                    let mut term = momentum_term(ops, momentum, &new.theta_gradient, rho)?;
                    term.add_scaled(&heating_term(ops, &new.abs_vorticity, heating, rho)?, 1.0)?;
                    term
                }
                TendencyCategory::Diabatic => {
                    let heating = tendencies.diabatic_heating.as_ref().ok_or_else(missing)?;
                    heating_term(ops, &old.abs_vorticity, heating, rho)?
                }
                TendencyCategory::FrictionMixing => {
                    let momentum = tendencies.mixing_momentum.as_ref().ok_or_else(missing)?;
                    let mut term = momentum_term(ops, momentum, &new.theta_gradient, rho)?;
                    if let Some(heating) = &tendencies.mixing_heating {
                        term.add_scaled(&heating_term(ops, &new.abs_vorticity, heating, rho)?, 1.0)?;
                    }
                    term
                }
                TendencyCategory::FrictionPblGwd => {
                    let momentum = tendencies.pbl_gwd_momentum.as_ref().ok_or_else(missing)?;
                    momentum_term(ops, momentum, &new.theta_gradient, rho)?
                }
                TendencyCategory::FrictionCumulus => {
                    let momentum = tendencies.cumulus_momentum.as_ref().ok_or_else(missing)?;
                    momentum_term(ops, momentum, &new.theta_gradient, rho)?
                }
                TendencyCategory::MicrophysicsNet => {
                    let heating = tendencies.microphysics_heating.as_ref().ok_or_else(missing)?;
                    heating_term(ops, &old.abs_vorticity, heating, rho)?
                }
                process => {
                    let heating = tendencies
                        .microphysics_processes
                        .get(&process)
                        .ok_or_else(missing)?;
                    heating_term(ops, &old.abs_vorticity, heating, rho)?
                }
            };
            terms.insert(category, term);
        }
        Ok(Self { terms })
    }

    /// Tendency of one category, if computed
    pub fn get(&self, category: TendencyCategory) -> Option<&Field> {
        self.terms.get(&category)
    }

    /// Computed categories in canonical order
    pub fn categories(&self) -> Vec<TendencyCategory> {
        let mut categories: Vec<_> = self.terms.keys().copied().collect();
        categories.sort_unstable();
        categories
    }

    /// `(category, tendency)` pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (TendencyCategory, &Field)> + '_ {
        self.categories()
            .into_iter()
            .filter_map(move |c| self.terms.get(&c).map(|f| (c, f)))
    }

    /// Whether no category was computed
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Sum of the computed closure categories; `None` if none were computed
    pub fn closure_sum(&self) -> Option<Field> {
        sum_of(TendencyCategory::CLOSURE.iter().filter_map(|c| self.terms.get(c)))
    }

    /// Sum of the five per-process microphysics terms; `None` unless all are present
    pub fn microphysics_process_sum(&self) -> Option<Field> {
        let parts: Vec<&Field> = TendencyCategory::MICROPHYSICS_PROCESSES
            .iter()
            .map(|c| self.terms.get(c))
            .collect::<Option<_>>()?;
        sum_of(parts.into_iter())
    }

    /// `closure_sum − (pv_new − pv_old) / dt`, per cell and level.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::InvalidTimeStep`] if `dt` is not positive,
    /// [`PvError::MissingTendency`] if no closure category was computed, or
    /// [`PvError::ShapeMismatch`] if the PV fields do not match the tendencies.
    pub fn residual(&self, pv_old: &Field, pv_new: &Field, dt: Seconds) -> Result<Field, PvError> {
        if !dt.is_positive_finite() {
            return Err(PvError::InvalidTimeStep(*dt));
        }
        let mut residual = self
            .closure_sum()
            .ok_or(PvError::MissingTendency(TendencyCategory::Dynamics))?;
        let (location, n_h, n_l) = residual.shape();
        pv_old.check_shape("pv_old", location, n_h, n_l)?;
        residual.add_scaled(pv_new, -1.0 / *dt)?;
        residual.add_scaled(pv_old, 1.0 / *dt)?;
        Ok(residual)
    }
}

fn sum_of<'a>(mut fields: impl Iterator<Item = &'a Field>) -> Option<Field> {
    let mut total = fields.next()?.clone();
    // All terms share the cell shape they were computed on
    for field in fields {
        for (a, b) in total.as_mut_slice().iter_mut().zip(field.as_slice()) {
            *a += b;
        }
    }
    Some(total)
}
