//! Beginning-of-step and current model state
//!
//! The host advances its state arrays in place before the diagnostics run at
//! the end of a step, so anything needed "as of time t" must be copied before
//! the update. [`TimeLevelManager`] owns both buffers:
//!
//! ```text
//! snapshot() ──► host updates current() ──► diagnostics read both ──► release()
//!     t                  t → t+dt                 t and t+dt
//! ```
//!
//! Reading the beginning-of-step view without a held snapshot is a contract
//! violation and fails with [`PvError::SnapshotUnavailable`]; it never falls
//! back to the current state. The snapshot is step-local and is not part of
//! any restart payload.

use crate::error::PvError;
use crate::fields::{Field, FieldLocation};
use crate::mesh::Mesh;
use tracing::trace;

/// Prognostic and diagnostic fields the PV computation reads
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    /// Edge-normal wind (m/s)
    pub u_edge: Field,
    /// Potential temperature (K), cell centres
    pub theta: Field,
    /// Total air density (kg/m³), cell centres
    pub rho: Field,
    /// Pressure (Pa), cell centres
    pub pressure: Field,
}

impl ModelState {
    /// Zero-initialized state with the mesh's shapes
    pub fn new(mesh: &Mesh) -> Self {
        let (n_cells, n_edges, n_levels) = (mesh.n_cells(), mesh.n_edges(), mesh.n_levels());
        Self {
            u_edge: Field::new(FieldLocation::Edge, n_edges, n_levels),
            theta: Field::new(FieldLocation::Cell, n_cells, n_levels),
            rho: Field::new(FieldLocation::Cell, n_cells, n_levels),
            pressure: Field::new(FieldLocation::Cell, n_cells, n_levels),
        }
    }

    /// Check every field against the mesh.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] for the first field with a wrong shape.
    pub fn validate(&self, mesh: &Mesh) -> Result<(), PvError> {
        mesh.check_field("u_edge", &self.u_edge, FieldLocation::Edge)?;
        mesh.check_field("theta", &self.theta, FieldLocation::Cell)?;
        mesh.check_field("rho", &self.rho, FieldLocation::Cell)?;
        mesh.check_field("pressure", &self.pressure, FieldLocation::Cell)
    }
}

/// Copy of the model state taken at the start of a step
#[derive(Debug, Clone)]
pub struct Snapshot {
    state: ModelState,
    step: u64,
}

impl Snapshot {
    /// State as of the start of the step
    pub fn state(&self) -> &ModelState {
        &self.state
    }

    /// Step counter value when the snapshot was taken
    pub fn step(&self) -> u64 {
        self.step
    }
}

/// Double buffer of model state: live fields plus an optional snapshot
#[derive(Debug, Clone)]
pub struct TimeLevelManager {
    current: ModelState,
    snapshot: Option<Snapshot>,
    step: u64,
}

impl TimeLevelManager {
    /// Manage `initial` as the live state; no snapshot is held
    pub fn new(initial: ModelState) -> Self {
        Self {
            current: initial,
            snapshot: None,
            step: 0,
        }
    }

    /// Capture the live state as the beginning-of-step view.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::SnapshotAlreadyHeld`] if the previous snapshot was
    /// never released.
    pub fn snapshot(&mut self) -> Result<(), PvError> {
        if self.snapshot.is_some() {
            return Err(PvError::SnapshotAlreadyHeld);
        }
        trace!("Snapshot taken for step {}", self.step);
        self.snapshot = Some(Snapshot {
            state: self.current.clone(),
            step: self.step,
        });
        Ok(())
    }

    /// Drop the beginning-of-step view, returning it, and advance the step counter.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::SnapshotUnavailable`] if no snapshot is held.
    pub fn release(&mut self) -> Result<Snapshot, PvError> {
        let snapshot = self.snapshot.take().ok_or(PvError::SnapshotUnavailable)?;
        self.step += 1;
        trace!("Snapshot released for step {}", snapshot.step);
        Ok(snapshot)
    }

    /// State as of the start of the current step.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::SnapshotUnavailable`] if no snapshot is held.
    pub fn beginning_of_step(&self) -> Result<&ModelState, PvError> {
        self.snapshot
            .as_ref()
            .map(Snapshot::state)
            .ok_or(PvError::SnapshotUnavailable)
    }

    /// Live state (t+dt once the host has updated it)
    pub fn current(&self) -> &ModelState {
        &self.current
    }

    /// Mutable live state for the host to update in place
    pub fn current_mut(&mut self) -> &mut ModelState {
        &mut self.current
    }

    /// Both views at once: `(t, t+dt)`.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::SnapshotUnavailable`] if no snapshot is held.
    pub fn both(&self) -> Result<(&ModelState, &ModelState), PvError> {
        Ok((self.beginning_of_step()?, &self.current))
    }

    /// Whether a snapshot is held
    pub fn is_holding(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Number of completed snapshot/release cycles
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Reset the step counter (restart restoration)
    pub(crate) fn set_step(&mut self, step: u64) {
        self.step = step;
    }
}
