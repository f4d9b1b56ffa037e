//! Per-step PV diagnostics driver
//!
//! [`PvDiagnostics`] ties the pieces together in the order the budget needs:
//!
//! 1. `begin_step()` snapshots the state (t)
//! 2. the host advances `state_mut()` to t+dt
//! 3. `end_step(dt, tendencies)` computes PV at t and t+dt, the tendency
//!    budget, locates the tropopause on the beginning-of-step PV, interpolates,
//!    accumulates, and releases the snapshot
//!
//! The snapshot is released exactly once per step even when a computation
//! fails, so one bad step does not poison the next.

use crate::budget::{AccumulatorSet, TendencyBudget, TendencyCategory, StepTendencies};
use crate::config::{Capabilities, ValidatedConfig};
use crate::core_types::{Pascals, Seconds};
use crate::error::PvError;
use crate::fields::{Field, FieldLocation};
use crate::interpolate::{interpolate_to_dt, IsobaricBrackets};
use crate::mesh::Mesh;
use crate::operators::MeshOperators;
use crate::pv::{signed_pv, PvFields};
use crate::restart::RestartState;
use crate::scalar::PvScalar;
use crate::time_levels::{ModelState, TimeLevelManager};
use crate::tropopause::DtSurface;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Fields sampled on the beginning-of-step dynamic tropopause
///
/// Every field is a single-level cell field holding [`crate::FILL_VALUE`] in
/// columns without a tropopause.
#[derive(Debug, Clone)]
pub struct DtFields {
    /// Fractional level index of the tropopause
    pub level: Field,
    /// Potential temperature (K)
    pub theta: Field,
    /// Pressure (Pa)
    pub pressure: Field,
    /// Height (m)
    pub height: Field,
    /// Zonal wind (m/s)
    pub u_east: Field,
    /// Meridional wind (m/s)
    pub v_north: Field,
    /// Tendencies of this step (PVU s⁻¹)
    pub tendencies: FxHashMap<TendencyCategory, Field>,
    /// Accumulators after this step (PVU)
    pub accumulators: FxHashMap<TendencyCategory, Field>,
}

/// Fields interpolated to the configured isobaric levels
///
/// Each field is a cell field with one "level" per isobaric target.
#[derive(Debug, Clone)]
pub struct IsobaricOutputs {
    /// Target levels
    pub levels: Vec<Pascals>,
    /// PV at t+dt (PVU)
    pub pv: Field,
    /// Potential temperature at t+dt (K)
    pub theta: Field,
    /// Tendencies of this step (PVU s⁻¹)
    pub tendencies: FxHashMap<TendencyCategory, Field>,
    /// (column, level) pairs outside the column's pressure range
    pub out_of_range: usize,
}

/// Everything one step produced
#[derive(Debug, Clone)]
pub struct StepOutputs {
    /// Step index (0 for the first step of a fresh run)
    pub step: u64,
    /// Model time at the end of the step
    pub elapsed: Seconds,
    /// PV at t+dt (PVU)
    pub pv: Option<Field>,
    /// PV at t (PVU)
    pub pv_beginning: Option<Field>,
    /// Tendency budget
    pub budget: Option<TendencyBudget>,
    /// Beginning-of-step dynamic tropopause
    pub dt_surface: Option<DtSurface>,
    /// Fields on the dynamic tropopause
    pub dt_fields: Option<DtFields>,
    /// Fields on isobaric levels
    pub isobaric: Option<IsobaricOutputs>,
}

/// PV diagnostics for one mesh partition
#[derive(Debug)]
pub struct PvDiagnostics {
    config: ValidatedConfig,
    capabilities: Capabilities,
    ops: MeshOperators,
    time_levels: TimeLevelManager,
    accumulators: Option<AccumulatorSet>,
    isobaric_accumulators: Option<AccumulatorSet>,
    pv_scalar: Option<PvScalar>,
    elapsed: Seconds,
    outputs: Option<StepOutputs>,
}

impl PvDiagnostics {
    /// Set up diagnostics for `mesh` with a zeroed state.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::InvalidMesh`] if the reconstruction operators cannot
    /// be built on `mesh`.
    pub fn new(config: ValidatedConfig, mesh: Arc<Mesh>) -> Result<Self, PvError> {
        let capabilities = config.capabilities();
        let ops = MeshOperators::new(mesh)?;
        let mesh = ops.mesh();
        let (n_cells, n_levels) = (mesh.n_cells(), mesh.n_levels());

        let accumulators = config.pv_tend.then(|| {
            AccumulatorSet::new(
                capabilities.categories(),
                FieldLocation::Cell,
                n_cells,
                n_levels,
                config.accumulation_reset_interval,
            )
        });
        let isobaric_accumulators = config.pv_isobaric.then(|| {
            AccumulatorSet::new(
                capabilities.categories(),
                FieldLocation::Cell,
                n_cells,
                config.isobaric_levels.len(),
                config.accumulation_reset_interval,
            )
        });
        let pv_scalar = config.pv_scalar.then(PvScalar::new);

        info!(
            "PV diagnostics configured: {} cells x {} levels, DT threshold {}, {} tendency categories",
            n_cells,
            n_levels,
            config.dt_threshold,
            capabilities.categories().len()
        );
        if !capabilities.is_empty() {
            let names: Vec<&str> = capabilities.categories().iter().map(|c| c.name()).collect();
            info!("Enabled PV tendencies: {}", names.join(", "));
        }

        let time_levels = TimeLevelManager::new(ModelState::new(mesh));
        Ok(Self {
            config,
            capabilities,
            ops,
            time_levels,
            accumulators,
            isobaric_accumulators,
            pv_scalar,
            elapsed: Seconds::ZERO,
            outputs: None,
        })
    }

    /// Replace the live state, e.g. with the model's initial conditions, and
    /// initialize the PV scalar from it when enabled.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `state` does not fit the mesh, or
    /// [`PvError::SnapshotAlreadyHeld`] if called in the middle of a step.
    pub fn initialize(&mut self, state: ModelState) -> Result<(), PvError> {
        if self.time_levels.is_holding() {
            return Err(PvError::SnapshotAlreadyHeld);
        }
        state.validate(self.ops.mesh())?;
        *self.time_levels.current_mut() = state;
        if let Some(scalar) = &mut self.pv_scalar {
            let fields = PvFields::compute(&self.ops, self.time_levels.current())?;
            if scalar.initialize_from(&fields.pv) {
                info!("PV scalar initialized from PV");
            }
        }
        Ok(())
    }

    /// The validated configuration
    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    /// Tendency categories computed each step
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Mesh-bound operators
    pub fn operators(&self) -> &MeshOperators {
        &self.ops
    }

    /// Live model state
    pub fn state(&self) -> &ModelState {
        self.time_levels.current()
    }

    /// Live model state for the host to update in place
    pub fn state_mut(&mut self) -> &mut ModelState {
        self.time_levels.current_mut()
    }

    /// The time-level manager
    pub fn time_levels(&self) -> &TimeLevelManager {
        &self.time_levels
    }

    /// Snapshot the beginning-of-step state.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::SnapshotAlreadyHeld`] if the previous step never ended.
    pub fn begin_step(&mut self) -> Result<(), PvError> {
        self.time_levels.snapshot()
    }

    /// Run every enabled diagnostic for the step that just finished and
    /// release the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::SnapshotUnavailable`] if `begin_step` was not called,
    /// [`PvError::InvalidTimeStep`] for a non-positive `dt`,
    /// [`PvError::MissingTendency`] if an enabled category lacks its input, or
    /// [`PvError::ShapeMismatch`] if the state or a tendency does not fit the
    /// mesh. Accumulators are left untouched on error.
    pub fn end_step(
        &mut self,
        dt: Seconds,
        tendencies: &StepTendencies,
    ) -> Result<&StepOutputs, PvError> {
        let result = self.compute_step(dt, tendencies);
        let released = self.time_levels.release();
        let outputs = result?;
        released?;

        self.elapsed += dt;
        debug!(
            "PV step {} done at {}: DT missing in {} columns, {} isobaric points out of range",
            outputs.step,
            self.elapsed,
            outputs.dt_surface.as_ref().map_or(0, DtSurface::missing_count),
            outputs.isobaric.as_ref().map_or(0, |iso| iso.out_of_range)
        );
        Ok(self.outputs.insert(outputs))
    }

    fn compute_step(&mut self, dt: Seconds, tendencies: &StepTendencies) -> Result<StepOutputs, PvError> {
        if !dt.is_positive_finite() {
            return Err(PvError::InvalidTimeStep(*dt));
        }
        let (old_state, new_state) = self.time_levels.both()?;
        let step = self.time_levels.step();
        let mut outputs = StepOutputs {
            step,
            elapsed: self.elapsed + dt,
            pv: None,
            pv_beginning: None,
            budget: None,
            dt_surface: None,
            dt_fields: None,
            isobaric: None,
        };
        if !self.config.pv_diag {
            return Ok(outputs);
        }

        let ops = &self.ops;
        let mesh = ops.mesh();
        let old = PvFields::compute(ops, old_state)?;
        let new = PvFields::compute(ops, new_state)?;

        let budget = if self.config.pv_tend {
            Some(TendencyBudget::compute(
                ops,
                &self.capabilities,
                &old,
                &new,
                &new_state.rho,
                tendencies,
            )?)
        } else {
            None
        };

        // Tropopause as it was at the start of the step
        let surface = DtSurface::locate(&signed_pv(&old.pv, mesh)?, self.config.dt_threshold)?;
        let wind = ops.cell_wind(&old_state.u_edge)?;
        let mut dt_fields = DtFields {
            level: surface.fractional_level(),
            theta: interpolate_to_dt(&old_state.theta, &surface)?,
            pressure: interpolate_to_dt(&old_state.pressure, &surface)?,
            height: interpolate_to_dt(mesh.z_mid(), &surface)?,
            u_east: interpolate_to_dt(&wind.component(0), &surface)?,
            v_north: interpolate_to_dt(&wind.component(1), &surface)?,
            tendencies: FxHashMap::default(),
            accumulators: FxHashMap::default(),
        };

        let isobaric = if self.config.pv_isobaric {
            let brackets = IsobaricBrackets::locate(&new_state.pressure, &self.config.isobaric_levels)?;
            let mut iso = IsobaricOutputs {
                levels: brackets.levels().to_vec(),
                pv: brackets.interpolate(&new.pv)?,
                theta: brackets.interpolate(&new_state.theta)?,
                tendencies: FxHashMap::default(),
                out_of_range: brackets.out_of_range_count(),
            };
            if let Some(budget) = &budget {
                for (category, term) in budget.iter() {
                    iso.tendencies.insert(category, brackets.interpolate(term)?);
                }
            }
            Some(iso)
        } else {
            None
        };

        if let Some(budget) = &budget {
            for (category, term) in budget.iter() {
                dt_fields
                    .tendencies
                    .insert(category, interpolate_to_dt(term, &surface)?);
            }
        }

        // Everything fallible is done; only now touch persistent state
        if let (Some(acc), Some(budget)) = (&mut self.accumulators, &budget) {
            acc.accumulate(|c| budget.get(c), dt)?;
            for category in acc.categories() {
                if let Some(a) = acc.get(category) {
                    dt_fields
                        .accumulators
                        .insert(category, interpolate_to_dt(a.values(), &surface)?);
                }
            }
        }
        if let (Some(acc), Some(iso)) = (&mut self.isobaric_accumulators, &isobaric) {
            acc.accumulate(|c| iso.tendencies.get(&c), dt)?;
        }
        if let Some(scalar) = &mut self.pv_scalar {
            if scalar.initialize_from(&old.pv) {
                info!("PV scalar initialized from beginning-of-step PV");
            }
        }

        outputs.pv = Some(new.pv);
        outputs.pv_beginning = Some(old.pv);
        outputs.budget = budget;
        outputs.dt_surface = Some(surface);
        outputs.dt_fields = Some(dt_fields);
        outputs.isobaric = isobaric;
        Ok(outputs)
    }

    /// Outputs of the most recent successful step
    pub fn outputs(&self) -> Option<&StepOutputs> {
        self.outputs.as_ref()
    }

    /// Model-level accumulators
    pub fn accumulators(&self) -> Option<&AccumulatorSet> {
        self.accumulators.as_ref()
    }

    /// Isobaric accumulators
    pub fn isobaric_accumulators(&self) -> Option<&AccumulatorSet> {
        self.isobaric_accumulators.as_ref()
    }

    /// PV-scalar tracer
    pub fn pv_scalar(&self) -> Option<&PvScalar> {
        self.pv_scalar.as_ref()
    }

    /// Mutable PV-scalar tracer for the transport collaborator
    pub fn pv_scalar_mut(&mut self) -> Option<&mut PvScalar> {
        self.pv_scalar.as_mut()
    }

    /// Model time covered by completed steps
    pub fn elapsed(&self) -> Seconds {
        self.elapsed
    }

    /// Capture persistent state for a restart.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::Restart`] if called between `begin_step` and `end_step`.
    pub fn restart_state(&self) -> Result<RestartState, PvError> {
        if self.time_levels.is_holding() {
            return Err(PvError::Restart(
                "cannot checkpoint in the middle of a step".into(),
            ));
        }
        Ok(RestartState {
            step: self.time_levels.step(),
            elapsed: self.elapsed,
            accumulators: self.accumulators.clone(),
            isobaric_accumulators: self.isobaric_accumulators.clone(),
            pv_scalar: self
                .pv_scalar
                .as_ref()
                .and_then(|s| s.values().cloned()),
        })
    }

    /// Restore persistent state saved by [`PvDiagnostics::restart_state`].
    ///
    /// Values are taken as saved, never recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::Restart`] if the payload does not match the enabled
    /// features or a step is in progress, and [`PvError::ShapeMismatch`] if a
    /// saved field does not fit the mesh. Nothing is modified on error.
    pub fn restore(&mut self, saved: RestartState) -> Result<(), PvError> {
        if self.time_levels.is_holding() {
            return Err(PvError::Restart("cannot restore in the middle of a step".into()));
        }
        check_presence("accumulators", self.accumulators.is_some(), saved.accumulators.is_some())?;
        check_presence(
            "isobaric accumulators",
            self.isobaric_accumulators.is_some(),
            saved.isobaric_accumulators.is_some(),
        )?;
        if saved.pv_scalar.is_some() && self.pv_scalar.is_none() {
            return Err(PvError::Restart(
                "payload holds a PV scalar but pv_scalar is disabled".into(),
            ));
        }

        // Validate on copies so a failure leaves everything as it was
        let mut accumulators = self.accumulators.clone();
        if let (Some(own), Some(saved)) = (&mut accumulators, saved.accumulators) {
            own.restore(saved)?;
        }
        let mut isobaric = self.isobaric_accumulators.clone();
        if let (Some(own), Some(saved)) = (&mut isobaric, saved.isobaric_accumulators) {
            own.restore(saved)?;
        }
        let mut scalar = self.pv_scalar.clone();
        if let Some(own) = &mut scalar {
            own.restore(saved.pv_scalar, self.ops.mesh())?;
        }

        self.accumulators = accumulators;
        self.isobaric_accumulators = isobaric;
        self.pv_scalar = scalar;
        self.elapsed = saved.elapsed;
        self.time_levels.set_step(saved.step);
        self.outputs = None;
        info!(
            "PV diagnostics restored at step {} ({})",
            saved.step, saved.elapsed
        );
        Ok(())
    }
}

fn check_presence(what: &str, configured: bool, saved: bool) -> Result<(), PvError> {
    match (configured, saved) {
        (true, false) => Err(PvError::Restart(format!("payload lacks {what}"))),
        (false, true) => Err(PvError::Restart(format!(
            "payload holds {what} that this configuration does not compute"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PvConfig;
    use crate::mesh::PeriodicHexMesh;

    fn diagnostics(config: PvConfig) -> PvDiagnostics {
        let mesh = Arc::new(
            PeriodicHexMesh::new(4, 4, 10_000.0)
                .with_levels(vec![1000.0, 5000.0, 9000.0, 13_000.0])
                .with_coriolis(1.0e-4, 0.0)
                .build()
                .unwrap(),
        );
        let mut diag = PvDiagnostics::new(config.validate().unwrap(), mesh.clone()).unwrap();
        let mut state = ModelState::new(&mesh);
        // θ stratification strengthens with height: PV grows through 2 PVU
        state.theta = Field::from_fn(FieldLocation::Cell, mesh.n_cells(), 4, |c, k| {
            let z = mesh.z_mid().get(c, k);
            300.0 + 4.0e-3 * z + 1.0e-6 * z * z
        });
        state.rho = Field::from_fn(FieldLocation::Cell, mesh.n_cells(), 4, |c, k| {
            1.2 * (-mesh.z_mid().get(c, k) / 8000.0).exp()
        });
        state.pressure = Field::from_fn(FieldLocation::Cell, mesh.n_cells(), 4, |c, k| {
            100_000.0 * (-mesh.z_mid().get(c, k) / 8000.0).exp()
        });
        diag.initialize(state).unwrap();
        diag
    }

    #[test]
    fn test_end_step_without_begin_fails_loudly() {
        let mut diag = diagnostics(PvConfig::default());
        let err = diag
            .end_step(Seconds::new(60.0), &StepTendencies::default())
            .unwrap_err();
        assert_eq!(err, PvError::SnapshotUnavailable);
    }

    #[test]
    fn test_failed_step_still_releases_snapshot() {
        let mut diag = diagnostics(PvConfig::full_budget());
        diag.begin_step().unwrap();
        let err = diag
            .end_step(Seconds::new(60.0), &StepTendencies::default())
            .unwrap_err();
        assert!(matches!(err, PvError::MissingTendency(_)));
        assert!(!diag.time_levels().is_holding());
        // The next step can start normally
        diag.begin_step().unwrap();
    }

    #[test]
    fn test_pv_only_step_produces_tropopause() {
        let mut diag = diagnostics(PvConfig::default());
        diag.begin_step().unwrap();
        let outputs = diag
            .end_step(Seconds::new(60.0), &StepTendencies::default())
            .unwrap();
        assert!(outputs.budget.is_none());
        assert!(outputs.isobaric.is_none());
        let surface = outputs.dt_surface.as_ref().unwrap();
        assert_eq!(surface.missing_count(), 0);
        assert_eq!(outputs.step, 0);
        assert_eq!(diag.elapsed(), Seconds::new(60.0));
    }

    #[test]
    fn test_checkpoint_refused_mid_step() {
        let mut diag = diagnostics(PvConfig::default());
        diag.begin_step().unwrap();
        assert!(matches!(diag.restart_state(), Err(PvError::Restart(_))));
    }

    #[test]
    fn test_restore_rejects_mismatched_features() {
        let plain = diagnostics(PvConfig::default());
        let saved = plain.restart_state().unwrap();
        let mut budget = diagnostics(PvConfig::full_budget());
        assert!(matches!(budget.restore(saved), Err(PvError::Restart(_))));
    }
}
