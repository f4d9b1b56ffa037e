//! Driving tendencies supplied by the host each step
//!
//! The host integrator works with mass-coupled tendencies (`ρ_d u`,
//! `ρ_d θ_m`). The budget formulas need tendencies of the bare quantities, so
//! coupled tendencies are a separate type that can only reach the budget
//! through [`CoupledEdgeTendency::decouple`] or
//! [`CoupledCellTendency::decouple`].

use super::TendencyCategory;
use crate::error::PvError;
use crate::fields::{Field, FieldLocation};
use crate::mesh::Mesh;
use rustc_hash::FxHashMap;

/// Ratio of the gas constants of water vapour and dry air, `R_v / R_d`
pub const RV_OVER_RD: f64 = 461.6 / 287.0;

/// Decoupled momentum tendency on edges (m s⁻²)
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeTendency(Field);

impl EdgeTendency {
    /// Wrap a tendency that is already decoupled
    pub fn new(field: Field) -> Self {
        Self(field)
    }

    /// The tendency values
    pub fn field(&self) -> &Field {
        &self.0
    }

    /// Unwrap the tendency values
    pub fn into_field(self) -> Field {
        self.0
    }
}

/// Decoupled potential temperature tendency at cell centres (K s⁻¹)
#[derive(Debug, Clone, PartialEq)]
pub struct HeatingTendency(Field);

impl HeatingTendency {
    /// Wrap a tendency that is already decoupled
    pub fn new(field: Field) -> Self {
        Self(field)
    }

    /// The tendency values
    pub fn field(&self) -> &Field {
        &self.0
    }

    /// Unwrap the tendency values
    pub fn into_field(self) -> Field {
        self.0
    }
}

/// Mass-coupled momentum tendency, `∂(ρ_d u)/∂t` on edges
#[derive(Debug, Clone, PartialEq)]
pub struct CoupledEdgeTendency(pub Field);

impl CoupledEdgeTendency {
    /// Divide by dry density averaged to each edge.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if either field does not fit the mesh.
    pub fn decouple(self, rho_dry: &Field, mesh: &Mesh) -> Result<EdgeTendency, PvError> {
        mesh.check_field("coupled momentum tendency", &self.0, FieldLocation::Edge)?;
        mesh.check_field("rho_dry", rho_dry, FieldLocation::Cell)?;

        let mut field = self.0;
        for e in 0..mesh.n_edges() {
            let [c0, c1] = mesh.cells_on_edge(e);
            let (r0, r1) = (rho_dry.column(c0), rho_dry.column(c1));
            for (k, v) in field.column_mut(e).iter_mut().enumerate() {
                *v /= 0.5 * (r0[k] + r1[k]);
            }
        }
        Ok(EdgeTendency(field))
    }
}

/// Mass- and moisture-coupled θ tendency, `∂(ρ_d θ_m)/∂t` at cell centres
#[derive(Debug, Clone, PartialEq)]
pub struct CoupledCellTendency(pub Field);

impl CoupledCellTendency {
    /// Divide by dry density and the moist factor `1 + (R_v/R_d) q_v`.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if any field does not fit the mesh.
    pub fn decouple(
        self,
        rho_dry: &Field,
        qv: &Field,
        mesh: &Mesh,
    ) -> Result<HeatingTendency, PvError> {
        mesh.check_field("coupled theta tendency", &self.0, FieldLocation::Cell)?;
        mesh.check_field("rho_dry", rho_dry, FieldLocation::Cell)?;
        mesh.check_field("qv", qv, FieldLocation::Cell)?;

        let mut field = self.0;
        for ((v, rho), q) in field
            .as_mut_slice()
            .iter_mut()
            .zip(rho_dry.as_slice())
            .zip(qv.as_slice())
        {
            *v /= rho * (1.0 + RV_OVER_RD * q);
        }
        Ok(HeatingTendency(field))
    }
}

/// Named slot of a driving tendency, used to fill [`StepTendencies`] one field at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TendencyInput {
    /// Momentum tendency from the dynamical core
    DynamicsMomentum,
    /// θ tendency from the dynamical core
    DynamicsHeating,
    /// Net physics θ tendency
    DiabaticHeating,
    /// Momentum tendency from explicit diffusion only
    MixingMomentum,
    /// θ tendency from explicit diffusion only
    MixingHeating,
    /// Momentum tendency from the PBL and gravity-wave-drag schemes
    PblGwdMomentum,
    /// Momentum tendency from the cumulus scheme
    CumulusMomentum,
    /// Net microphysics θ tendency
    MicrophysicsHeating,
    /// θ tendency of one microphysical process
    MicrophysicsProcess(TendencyCategory),
}

impl TendencyInput {
    /// Mesh location of this input's field
    pub fn location(self) -> FieldLocation {
        match self {
            TendencyInput::DynamicsMomentum
            | TendencyInput::MixingMomentum
            | TendencyInput::PblGwdMomentum
            | TendencyInput::CumulusMomentum => FieldLocation::Edge,
            _ => FieldLocation::Cell,
        }
    }
}

/// All driving tendencies of one step, already decoupled
///
/// Only the inputs of enabled categories need to be present; the mixing θ
/// tendency is always optional.
#[derive(Debug, Clone, Default)]
pub struct StepTendencies {
    /// Dynamics momentum tendency
    pub dynamics_momentum: Option<EdgeTendency>,
    /// Dynamics θ tendency
    pub dynamics_heating: Option<HeatingTendency>,
    /// Net diabatic θ tendency
    pub diabatic_heating: Option<HeatingTendency>,
    /// Diffusion-only momentum tendency
    pub mixing_momentum: Option<EdgeTendency>,
    /// Diffusion-only θ tendency
    pub mixing_heating: Option<HeatingTendency>,
    /// PBL + gravity-wave-drag momentum tendency
    pub pbl_gwd_momentum: Option<EdgeTendency>,
    /// Cumulus momentum tendency
    pub cumulus_momentum: Option<EdgeTendency>,
    /// Net microphysics θ tendency
    pub microphysics_heating: Option<HeatingTendency>,
    /// Per-process microphysics θ tendencies
    pub microphysics_processes: FxHashMap<TendencyCategory, HeatingTendency>,
}

impl StepTendencies {
    /// Store one decoupled input.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `field` does not fit the mesh at
    /// the input's location, or [`PvError::MissingTendency`] if a process slot
    /// names a category that is not a microphysical process.
    pub fn insert(&mut self, input: TendencyInput, field: Field, mesh: &Mesh) -> Result<(), PvError> {
        mesh.check_field("tendency input", &field, input.location())?;
        match input {
            TendencyInput::DynamicsMomentum => self.dynamics_momentum = Some(EdgeTendency(field)),
            TendencyInput::DynamicsHeating => self.dynamics_heating = Some(HeatingTendency(field)),
            TendencyInput::DiabaticHeating => self.diabatic_heating = Some(HeatingTendency(field)),
            TendencyInput::MixingMomentum => self.mixing_momentum = Some(EdgeTendency(field)),
            TendencyInput::MixingHeating => self.mixing_heating = Some(HeatingTendency(field)),
            TendencyInput::PblGwdMomentum => self.pbl_gwd_momentum = Some(EdgeTendency(field)),
            TendencyInput::CumulusMomentum => self.cumulus_momentum = Some(EdgeTendency(field)),
            TendencyInput::MicrophysicsHeating => {
                self.microphysics_heating = Some(HeatingTendency(field));
            }
            TendencyInput::MicrophysicsProcess(category) => {
                if !TendencyCategory::MICROPHYSICS_PROCESSES.contains(&category) {
                    return Err(PvError::MissingTendency(category));
                }
                self.microphysics_processes
                    .insert(category, HeatingTendency(field));
            }
        }
        Ok(())
    }

    /// Drop every stored input
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
