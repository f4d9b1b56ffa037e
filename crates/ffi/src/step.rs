use pv_budget_core::budget::{CoupledCellTendency, CoupledEdgeTendency};
use pv_budget_core::{Field, FieldLocation, Seconds, TendencyCategory, TendencyInput};
use std::mem;

use crate::error::{DefaultPvbError, PvbErrorCode};
use crate::helpers::{handle_ffi_result_error, instance_from_ptr, slice_from_ptr, with_diagnostics_mut};
use crate::instance::PvbInstance;

/// Prognostic field of the live model state.
///
/// Cell fields hold `n_cells * n_levels` values, edge fields
/// `n_edges * n_levels`, both column-contiguous (`point * n_levels + level`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvbStateField {
    /// Edge-normal wind (m/s), on edges.
    EdgeWind = 0,
    /// Potential temperature (K), at cell centres.
    Theta = 1,
    /// Total air density (kg/m³), at cell centres.
    Density = 2,
    /// Pressure (Pa), at cell centres.
    Pressure = 3,
}

impl PvbStateField {
    fn location(self) -> FieldLocation {
        match self {
            PvbStateField::EdgeWind => FieldLocation::Edge,
            _ => FieldLocation::Cell,
        }
    }
}

/// Driving tendency handed over by the model each step.
///
/// Momentum tendencies (m/s²) live on edges, θ tendencies (K/s) at cell centres.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvbTendency {
    /// Momentum tendency from the dynamical core.
    DynamicsMomentum = 0,
    /// θ tendency from the dynamical core.
    DynamicsHeating = 1,
    /// Net physics θ tendency.
    DiabaticHeating = 2,
    /// Momentum tendency from explicit diffusion.
    MixingMomentum = 3,
    /// θ tendency from explicit diffusion (optional).
    MixingHeating = 4,
    /// Momentum tendency from the PBL and gravity-wave-drag schemes.
    PblGwdMomentum = 5,
    /// Momentum tendency from the cumulus scheme.
    CumulusMomentum = 6,
    /// Net microphysics θ tendency.
    MicrophysicsHeating = 7,
    /// θ tendency from cloud condensation and evaporation.
    MicrophysicsCondensation = 8,
    /// θ tendency from rain evaporation.
    MicrophysicsEvaporationRain = 9,
    /// θ tendency from ice deposition and sublimation.
    MicrophysicsDepositionSublimation = 10,
    /// θ tendency from melting.
    MicrophysicsMelting = 11,
    /// θ tendency from freezing.
    MicrophysicsFreezing = 12,
}

impl From<PvbTendency> for TendencyInput {
    fn from(tendency: PvbTendency) -> Self {
        match tendency {
            PvbTendency::DynamicsMomentum => TendencyInput::DynamicsMomentum,
            PvbTendency::DynamicsHeating => TendencyInput::DynamicsHeating,
            PvbTendency::DiabaticHeating => TendencyInput::DiabaticHeating,
            PvbTendency::MixingMomentum => TendencyInput::MixingMomentum,
            PvbTendency::MixingHeating => TendencyInput::MixingHeating,
            PvbTendency::PblGwdMomentum => TendencyInput::PblGwdMomentum,
            PvbTendency::CumulusMomentum => TendencyInput::CumulusMomentum,
            PvbTendency::MicrophysicsHeating => TendencyInput::MicrophysicsHeating,
            PvbTendency::MicrophysicsCondensation => {
                TendencyInput::MicrophysicsProcess(TendencyCategory::MicrophysicsCondensation)
            }
            PvbTendency::MicrophysicsEvaporationRain => {
                TendencyInput::MicrophysicsProcess(TendencyCategory::MicrophysicsEvaporationRain)
            }
            PvbTendency::MicrophysicsDepositionSublimation => TendencyInput::MicrophysicsProcess(
                TendencyCategory::MicrophysicsDepositionSublimation,
            ),
            PvbTendency::MicrophysicsMelting => {
                TendencyInput::MicrophysicsProcess(TendencyCategory::MicrophysicsMelting)
            }
            PvbTendency::MicrophysicsFreezing => {
                TendencyInput::MicrophysicsProcess(TendencyCategory::MicrophysicsFreezing)
            }
        }
    }
}

/// Copy `data` into a new field after checking its length.
fn field_from(
    data: &[f64],
    location: FieldLocation,
    n_horizontal: usize,
    n_levels: usize,
    name: &str,
) -> Result<Field, DefaultPvbError> {
    let expected = n_horizontal * n_levels;
    if data.len() != expected {
        return Err(DefaultPvbError::buffer_length(name, expected, data.len()));
    }
    Ok(Field::from_vec(location, n_horizontal, n_levels, data.to_vec())?)
}

/// Snapshot the beginning-of-step state.
///
/// Call once per model step, before the model updates its state.
///
/// Returns
/// - `PvbErrorCode::Ok` on success
/// - `PvbErrorCode::NullPointer` if `ptr` is null
/// - `PvbErrorCode::SnapshotMisuse` if the previous step was never ended
///
/// # Safety
/// `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
#[no_mangle]
pub unsafe extern "C" fn pvb_begin_step(ptr: *const PvbInstance) -> PvbErrorCode {
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        with_diagnostics_mut(instance, |diag| Ok(diag.begin_step()?))
    })
}

/// Overwrite one field of the live model state.
///
/// Returns
/// - `PvbErrorCode::Ok` on success
/// - `PvbErrorCode::NullPointer` if `ptr` or `data` is null
/// - `PvbErrorCode::ShapeMismatch` if `len` does not match the field size
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
/// - `data` must be null or point to `len` readable `f64` values.
#[no_mangle]
pub unsafe extern "C" fn pvb_set_state_field(
    ptr: *const PvbInstance,
    field: PvbStateField,
    data: *const f64,
    len: usize,
) -> PvbErrorCode {
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        // SAFETY: `data` holds `len` values per the contract above.
        let values = unsafe { slice_from_ptr(data, len, "data")? };
        with_diagnostics_mut(instance, |diag| {
            let state = diag.state_mut();
            let target = match field {
                PvbStateField::EdgeWind => &mut state.u_edge,
                PvbStateField::Theta => &mut state.theta,
                PvbStateField::Density => &mut state.rho,
                PvbStateField::Pressure => &mut state.pressure,
            };
            debug_assert_eq!(target.location(), field.location());
            let target = target.as_mut_slice();
            if target.len() != values.len() {
                return Err(DefaultPvbError::buffer_length("data", target.len(), values.len()));
            }
            target.copy_from_slice(values);
            Ok(())
        })
    })
}

/// Adopt the live state as the initial condition.
///
/// Call once after the initial state has been set and before the first
/// step. Initializes the PV scalar from PV when it is enabled.
///
/// Returns
/// - `PvbErrorCode::Ok` on success
/// - `PvbErrorCode::NullPointer` if `ptr` is null
/// - `PvbErrorCode::SnapshotMisuse` if called between `pvb_begin_step` and `pvb_end_step`
///
/// # Safety
/// `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
#[no_mangle]
pub unsafe extern "C" fn pvb_initialize(ptr: *const PvbInstance) -> PvbErrorCode {
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        with_diagnostics_mut(instance, |diag| {
            let state = diag.state().clone();
            Ok(diag.initialize(state)?)
        })
    })
}

/// Stage an already decoupled driving tendency for the current step.
///
/// Returns
/// - `PvbErrorCode::Ok` on success
/// - `PvbErrorCode::NullPointer` if `ptr` or `data` is null
/// - `PvbErrorCode::ShapeMismatch` if `len` does not match the input's location
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
/// - `data` must be null or point to `len` readable `f64` values.
#[no_mangle]
pub unsafe extern "C" fn pvb_set_tendency(
    ptr: *const PvbInstance,
    tendency: PvbTendency,
    data: *const f64,
    len: usize,
) -> PvbErrorCode {
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        // SAFETY: `data` holds `len` values per the contract above.
        let values = unsafe { slice_from_ptr(data, len, "data")? };
        let input = TendencyInput::from(tendency);
        let mesh = instance
            .diagnostics
            .read()
            .map_err(|_| DefaultPvbError::lock_poisoned("RwLock"))?
            .operators()
            .mesh()
            .clone();
        let location = input.location();
        let field = field_from(values, location, mesh.n_points(location), mesh.n_levels(), "data")?;
        let mut staged = instance
            .tendencies
            .lock()
            .map_err(|_| DefaultPvbError::lock_poisoned("Mutex"))?;
        Ok(staged.insert(input, field, &mesh)?)
    })
}

/// Stage a mass-coupled driving tendency, decoupling it first.
///
/// Momentum tendencies `∂(ρ_d u)/∂t` are divided by dry density averaged to
/// the edge; θ tendencies `∂(ρ_d θ_m)/∂t` by `ρ_d (1 + R_v/R_d q_v)`.
/// `rho_dry` and `qv` hold `n_cells * n_levels` values; `qv` is only read
/// for θ tendencies and may be null otherwise.
///
/// Returns
/// - `PvbErrorCode::Ok` on success
/// - `PvbErrorCode::NullPointer` if a required pointer is null
/// - `PvbErrorCode::ShapeMismatch` if `len` does not match the input's location
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
/// - `data` must be null or point to `len` readable `f64` values.
/// - `rho_dry` and `qv` must be null or point to `n_cells * n_levels` readable values.
#[no_mangle]
pub unsafe extern "C" fn pvb_set_coupled_tendency(
    ptr: *const PvbInstance,
    tendency: PvbTendency,
    data: *const f64,
    len: usize,
    rho_dry: *const f64,
    qv: *const f64,
) -> PvbErrorCode {
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        // SAFETY: `data` holds `len` values per the contract above.
        let values = unsafe { slice_from_ptr(data, len, "data")? };
        let mesh = instance
            .diagnostics
            .read()
            .map_err(|_| DefaultPvbError::lock_poisoned("RwLock"))?
            .operators()
            .mesh()
            .clone();
        let (n_cells, n_levels) = (mesh.n_cells(), mesh.n_levels());
        // SAFETY: cell-sized per the contract above.
        let rho_values = unsafe { slice_from_ptr(rho_dry, n_cells * n_levels, "rho_dry")? };
        let rho_dry = field_from(rho_values, FieldLocation::Cell, n_cells, n_levels, "rho_dry")?;

        let input = TendencyInput::from(tendency);
        let location = input.location();
        let coupled = field_from(values, location, mesh.n_points(location), n_levels, "data")?;
        let field = match location {
            FieldLocation::Edge => CoupledEdgeTendency(coupled)
                .decouple(&rho_dry, &mesh)?
                .into_field(),
            _ => {
                // SAFETY: cell-sized per the contract above.
                let qv_values = unsafe { slice_from_ptr(qv, n_cells * n_levels, "qv")? };
                let qv = field_from(qv_values, FieldLocation::Cell, n_cells, n_levels, "qv")?;
                CoupledCellTendency(coupled)
                    .decouple(&rho_dry, &qv, &mesh)?
                    .into_field()
            }
        };

        let mut staged = instance
            .tendencies
            .lock()
            .map_err(|_| DefaultPvbError::lock_poisoned("Mutex"))?;
        Ok(staged.insert(input, field, &mesh)?)
    })
}

/// Finish the step: compute every enabled diagnostic from the snapshot, the
/// updated state and the staged tendencies, then release the snapshot.
///
/// Staged tendencies are dropped whether or not the step succeeds. A failed
/// step leaves the accumulators untouched.
///
/// Returns
/// - `PvbErrorCode::Ok` on success
/// - `PvbErrorCode::NullPointer` if `ptr` is null
/// - `PvbErrorCode::SnapshotMisuse` if `pvb_begin_step` was not called
/// - `PvbErrorCode::InvalidParameter` if `dt` is not finite and positive
/// - `PvbErrorCode::MissingTendency` if an enabled category lacks its tendency
/// - `PvbErrorCode::ShapeMismatch` if a field does not fit the mesh
///
/// # Safety
/// `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
#[no_mangle]
pub unsafe extern "C" fn pvb_end_step(ptr: *const PvbInstance, dt: f64) -> PvbErrorCode {
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        let tendencies = mem::take(
            &mut *instance
                .tendencies
                .lock()
                .map_err(|_| DefaultPvbError::lock_poisoned("Mutex"))?,
        );
        with_diagnostics_mut(instance, |diag| {
            diag.end_step(Seconds::new(dt), &tendencies)?;
            Ok(())
        })
    })
}
