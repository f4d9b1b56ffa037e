use pv_budget_core::budget::Accumulator;
use pv_budget_core::{Field, PvDiagnostics, PvScalar, TendencyCategory};

use crate::error::{DefaultPvbError, PvbErrorCode};
use crate::helpers::{
    handle_ffi_result_error, instance_from_ptr, slice_from_ptr, track_error, with_diagnostics,
    with_diagnostics_mut,
};
use crate::instance::PvbInstance;

/// Diagnostic output selectable through `pvb_get_field`.
///
/// 3D outputs hold `n_cells * n_levels` values, DT outputs `n_cells`,
/// isobaric outputs `n_cells * n_isobaric_levels`. Layout is
/// column-contiguous. Missing DT and out-of-range isobaric points carry the
/// fill value -99999.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvbOutput {
    /// Ertel PV at the end of the step (PVU).
    Pv = 0,
    /// Ertel PV at the start of the step (PVU).
    PvBeginning = 1,
    /// PV tendency of one category (PVU/s).
    Tendency = 2,
    /// Accumulated PV tendency of one category (PVU).
    Accumulated = 3,
    /// Fractional level index of the dynamic tropopause.
    DtLevel = 4,
    /// θ on the dynamic tropopause (K).
    DtTheta = 5,
    /// Pressure on the dynamic tropopause (Pa).
    DtPressure = 6,
    /// Height of the dynamic tropopause (m).
    DtHeight = 7,
    /// Eastward wind on the dynamic tropopause (m/s).
    DtUEast = 8,
    /// Northward wind on the dynamic tropopause (m/s).
    DtVNorth = 9,
    /// PV tendency of one category on the dynamic tropopause (PVU/s).
    DtTendency = 10,
    /// Accumulated PV tendency of one category on the dynamic tropopause (PVU).
    DtAccumulated = 11,
    /// PV on the isobaric levels (PVU).
    IsobaricPv = 12,
    /// θ on the isobaric levels (K).
    IsobaricTheta = 13,
    /// PV tendency of one category on the isobaric levels (PVU/s).
    IsobaricTendency = 14,
    /// Accumulated PV tendency of one category on the isobaric levels (PVU).
    IsobaricAccumulated = 15,
    /// The PV scalar (PVU).
    PvScalar = 16,
}

/// Tendency category for category-resolved outputs; ignored otherwise.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvbCategory {
    /// Resolved dynamics.
    Dynamics = 0,
    /// Net diabatic heating.
    Diabatic = 1,
    /// Explicit mixing.
    FrictionMixing = 2,
    /// PBL and gravity-wave drag.
    FrictionPblGwd = 3,
    /// Cumulus momentum transport.
    FrictionCumulus = 4,
    /// Net microphysics heating.
    MicrophysicsNet = 5,
    /// Condensation and evaporation of cloud water.
    MicrophysicsCondensation = 6,
    /// Evaporation of rain.
    MicrophysicsEvaporationRain = 7,
    /// Deposition and sublimation of ice.
    MicrophysicsDepositionSublimation = 8,
    /// Melting.
    MicrophysicsMelting = 9,
    /// Freezing.
    MicrophysicsFreezing = 10,
}

impl From<PvbCategory> for TendencyCategory {
    fn from(category: PvbCategory) -> Self {
        match category {
            PvbCategory::Dynamics => TendencyCategory::Dynamics,
            PvbCategory::Diabatic => TendencyCategory::Diabatic,
            PvbCategory::FrictionMixing => TendencyCategory::FrictionMixing,
            PvbCategory::FrictionPblGwd => TendencyCategory::FrictionPblGwd,
            PvbCategory::FrictionCumulus => TendencyCategory::FrictionCumulus,
            PvbCategory::MicrophysicsNet => TendencyCategory::MicrophysicsNet,
            PvbCategory::MicrophysicsCondensation => TendencyCategory::MicrophysicsCondensation,
            PvbCategory::MicrophysicsEvaporationRain => {
                TendencyCategory::MicrophysicsEvaporationRain
            }
            PvbCategory::MicrophysicsDepositionSublimation => {
                TendencyCategory::MicrophysicsDepositionSublimation
            }
            PvbCategory::MicrophysicsMelting => TendencyCategory::MicrophysicsMelting,
            PvbCategory::MicrophysicsFreezing => TendencyCategory::MicrophysicsFreezing,
        }
    }
}

/// Mesh and output dimensions.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PvbDimensions {
    /// Number of Voronoi cells.
    pub n_cells: usize,
    /// Number of edges.
    pub n_edges: usize,
    /// Number of vertical levels.
    pub n_levels: usize,
    /// Number of isobaric output levels (0 when isobaric output is off).
    pub n_isobaric_levels: usize,
    /// Steps completed so far.
    pub step: u64,
    /// Simulated time covered by completed steps (s).
    pub elapsed: f64,
}

/// Dynamic-tropopause search counters of the last completed step.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PvbDtCounts {
    /// Columns with no tropopause crossing.
    pub missing: usize,
    /// Below-to-above crossings passed over by the search.
    pub rejected: usize,
}

/// Find the requested output, or explain why it is absent.
fn select<'a>(
    diag: &'a PvDiagnostics,
    output: PvbOutput,
    category: PvbCategory,
) -> Result<&'a Field, DefaultPvbError> {
    let category = TendencyCategory::from(category);
    let missing = || DefaultPvbError::not_available(&format!("{output:?} ({category})"));
    if output == PvbOutput::PvScalar {
        return diag
            .pv_scalar()
            .and_then(PvScalar::values)
            .ok_or_else(missing);
    }
    if output == PvbOutput::Accumulated {
        return diag
            .accumulators()
            .and_then(|acc| acc.get(category))
            .map(Accumulator::values)
            .ok_or_else(missing);
    }
    if output == PvbOutput::IsobaricAccumulated {
        return diag
            .isobaric_accumulators()
            .and_then(|acc| acc.get(category))
            .map(Accumulator::values)
            .ok_or_else(missing);
    }

    let outputs = diag.outputs().ok_or_else(missing)?;
    let dt = outputs.dt_fields.as_ref();
    let iso = outputs.isobaric.as_ref();
    let field = match output {
        PvbOutput::Pv => outputs.pv.as_ref(),
        PvbOutput::PvBeginning => outputs.pv_beginning.as_ref(),
        PvbOutput::Tendency => outputs.budget.as_ref().and_then(|b| b.get(category)),
        PvbOutput::DtLevel => dt.map(|d| &d.level),
        PvbOutput::DtTheta => dt.map(|d| &d.theta),
        PvbOutput::DtPressure => dt.map(|d| &d.pressure),
        PvbOutput::DtHeight => dt.map(|d| &d.height),
        PvbOutput::DtUEast => dt.map(|d| &d.u_east),
        PvbOutput::DtVNorth => dt.map(|d| &d.v_north),
        PvbOutput::DtTendency => dt.and_then(|d| d.tendencies.get(&category)),
        PvbOutput::DtAccumulated => dt.and_then(|d| d.accumulators.get(&category)),
        PvbOutput::IsobaricPv => iso.map(|i| &i.pv),
        PvbOutput::IsobaricTheta => iso.map(|i| &i.theta),
        PvbOutput::IsobaricTendency => iso.and_then(|i| i.tendencies.get(&category)),
        PvbOutput::Accumulated | PvbOutput::IsobaricAccumulated | PvbOutput::PvScalar => None,
    };
    field.ok_or_else(missing)
}

/// Report mesh and output dimensions.
///
/// Returns
/// - `PvbErrorCode::Ok` on success with `*out_dims` filled in
/// - `PvbErrorCode::NullPointer` if `ptr` or `out_dims` is null
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
/// - `out_dims` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn pvb_get_dimensions(
    ptr: *const PvbInstance,
    out_dims: *mut PvbDimensions,
) -> PvbErrorCode {
    if out_dims.is_null() {
        return track_error(&DefaultPvbError::null_pointer("out_dims"));
    }
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        let dims = with_diagnostics(instance, |diag| {
            let mesh = diag.operators().mesh();
            Ok(PvbDimensions {
                n_cells: mesh.n_cells(),
                n_edges: mesh.n_edges(),
                n_levels: mesh.n_levels(),
                n_isobaric_levels: if diag.config().pv_isobaric {
                    diag.config().isobaric_levels.len()
                } else {
                    0
                },
                step: diag.time_levels().step(),
                elapsed: *diag.elapsed(),
            })
        })?;
        // SAFETY: checked non-null above.
        unsafe {
            *out_dims = dims;
        }
        Ok(())
    })
}

/// Copy one diagnostic output into a caller-owned buffer.
///
/// `out_len` receives the number of values the output holds, also when the
/// buffer is too small, so callers can query the size with `capacity = 0`.
///
/// Returns
/// - `PvbErrorCode::Ok` on success
/// - `PvbErrorCode::NullPointer` if `ptr` or `out_len` is null, or `out_values` is null with non-zero `capacity`
/// - `PvbErrorCode::NotAvailable` if the output is disabled or no step has completed
/// - `PvbErrorCode::ShapeMismatch` if `capacity` is smaller than the output
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
/// - `out_values` must be null or valid for `capacity` writes.
/// - `out_len` must be null or valid for writes.
///
/// # Example Usage (C)
/// ```c
/// size_t len = 0;
/// pvb_get_field(pv, DtPressure, Dynamics, NULL, 0, &len);
/// double* p_dt = malloc(len * sizeof(double));
/// pvb_get_field(pv, DtPressure, Dynamics, p_dt, len, &len);
/// ```
#[no_mangle]
pub unsafe extern "C" fn pvb_get_field(
    ptr: *const PvbInstance,
    output: PvbOutput,
    category: PvbCategory,
    out_values: *mut f64,
    capacity: usize,
    out_len: *mut usize,
) -> PvbErrorCode {
    if out_len.is_null() {
        return track_error(&DefaultPvbError::null_pointer("out_len"));
    }
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        with_diagnostics(instance, |diag| {
            let values = select(diag, output, category)?.as_slice();
            // SAFETY: checked non-null above.
            unsafe {
                *out_len = values.len();
            }
            if capacity == 0 {
                return Ok(());
            }
            if out_values.is_null() {
                return Err(DefaultPvbError::null_pointer("out_values"));
            }
            if capacity < values.len() {
                return Err(DefaultPvbError::buffer_length("out_values", values.len(), capacity));
            }
            // SAFETY: valid for `capacity >= values.len()` writes per the contract above.
            let target = unsafe { std::slice::from_raw_parts_mut(out_values, values.len()) };
            target.copy_from_slice(values);
            Ok(())
        })
    })
}

/// Report the tropopause search counters of the last completed step.
///
/// Returns
/// - `PvbErrorCode::Ok` on success
/// - `PvbErrorCode::NullPointer` if `ptr` or `out_counts` is null
/// - `PvbErrorCode::NotAvailable` if PV is off or no step has completed
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
/// - `out_counts` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn pvb_get_dt_counts(
    ptr: *const PvbInstance,
    out_counts: *mut PvbDtCounts,
) -> PvbErrorCode {
    if out_counts.is_null() {
        return track_error(&DefaultPvbError::null_pointer("out_counts"));
    }
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        let counts = with_diagnostics(instance, |diag| {
            let surface = diag
                .outputs()
                .and_then(|o| o.dt_surface.as_ref())
                .ok_or_else(|| DefaultPvbError::not_available("dynamic tropopause"))?;
            Ok(PvbDtCounts {
                missing: surface.missing_count(),
                rejected: surface.rejected_count(),
            })
        })?;
        // SAFETY: checked non-null above.
        unsafe {
            *out_counts = counts;
        }
        Ok(())
    })
}

/// Overwrite the PV scalar after the host has transported it.
///
/// Returns
/// - `PvbErrorCode::Ok` on success
/// - `PvbErrorCode::NullPointer` if `ptr` or `data` is null
/// - `PvbErrorCode::NotAvailable` if the scalar is disabled or not yet initialized
/// - `PvbErrorCode::ShapeMismatch` if `len` is not `n_cells * n_levels`
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
/// - `data` must be null or point to `len` readable `f64` values.
#[no_mangle]
pub unsafe extern "C" fn pvb_set_pv_scalar(
    ptr: *const PvbInstance,
    data: *const f64,
    len: usize,
) -> PvbErrorCode {
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        // SAFETY: `data` holds `len` values per the contract above.
        let values = unsafe { slice_from_ptr(data, len, "data")? };
        with_diagnostics_mut(instance, |diag| {
            let target = diag
                .pv_scalar_mut()
                .and_then(PvScalar::values_mut)
                .ok_or_else(|| DefaultPvbError::not_available("PV scalar"))?
                .as_mut_slice();
            if target.len() != values.len() {
                return Err(DefaultPvbError::buffer_length("data", target.len(), values.len()));
            }
            target.copy_from_slice(values);
            Ok(())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::pvb_destroy;
    use crate::instance::tests::new_hex;
    use crate::step::{pvb_begin_step, pvb_end_step, pvb_set_state_field, PvbStateField};
    use std::ptr;

    fn set_column_profiles(pv: *mut PvbInstance, dims: &PvbDimensions) {
        let n = dims.n_cells * dims.n_levels;
        let z = |k: usize| 500.0 + 1000.0 * k as f64;
        let theta: Vec<f64> = (0..n).map(|i| 300.0 + 4.0e-3 * z(i % dims.n_levels)).collect();
        let rho: Vec<f64> = (0..n).map(|i| 1.2 * (-z(i % dims.n_levels) / 8000.0).exp()).collect();
        let p: Vec<f64> = (0..n).map(|i| 1.0e5 * (-z(i % dims.n_levels) / 7500.0).exp()).collect();
        unsafe {
            assert_eq!(pvb_set_state_field(pv, PvbStateField::Theta, theta.as_ptr(), n), PvbErrorCode::Ok);
            assert_eq!(pvb_set_state_field(pv, PvbStateField::Density, rho.as_ptr(), n), PvbErrorCode::Ok);
            assert_eq!(pvb_set_state_field(pv, PvbStateField::Pressure, p.as_ptr(), n), PvbErrorCode::Ok);
        }
    }

    #[test]
    fn test_fields_become_available_after_a_step() {
        let pv = new_hex(None);
        let mut dims = PvbDimensions::default();
        let mut len = 0;
        unsafe {
            assert_eq!(pvb_get_dimensions(pv, &mut dims), PvbErrorCode::Ok);
            assert_eq!((dims.n_cells, dims.n_levels, dims.n_isobaric_levels), (36, 6, 0));
            assert_eq!(
                pvb_get_field(pv, PvbOutput::Pv, PvbCategory::Dynamics, ptr::null_mut(), 0, &mut len),
                PvbErrorCode::NotAvailable
            );

            set_column_profiles(pv, &dims);
            assert_eq!(pvb_begin_step(pv), PvbErrorCode::Ok);
            assert_eq!(pvb_end_step(pv, 30.0), PvbErrorCode::Ok);

            assert_eq!(
                pvb_get_field(pv, PvbOutput::Pv, PvbCategory::Dynamics, ptr::null_mut(), 0, &mut len),
                PvbErrorCode::Ok
            );
            assert_eq!(len, dims.n_cells * dims.n_levels);
            let mut small = vec![0.0; 3];
            assert_eq!(
                pvb_get_field(pv, PvbOutput::Pv, PvbCategory::Dynamics, small.as_mut_ptr(), 3, &mut len),
                PvbErrorCode::ShapeMismatch
            );
            let mut dt_level = vec![0.0; dims.n_cells];
            assert_eq!(
                pvb_get_field(
                    pv,
                    PvbOutput::DtLevel,
                    PvbCategory::Dynamics,
                    dt_level.as_mut_ptr(),
                    dt_level.len(),
                    &mut len
                ),
                PvbErrorCode::Ok
            );
            assert_eq!(len, dims.n_cells);

            // Budget is off by default
            assert_eq!(
                pvb_get_field(pv, PvbOutput::Tendency, PvbCategory::Diabatic, ptr::null_mut(), 0, &mut len),
                PvbErrorCode::NotAvailable
            );
            let mut counts = PvbDtCounts::default();
            assert_eq!(pvb_get_dt_counts(pv, &mut counts), PvbErrorCode::Ok);
            assert!(counts.missing <= dims.n_cells);

            assert_eq!(pvb_get_dimensions(pv, &mut dims), PvbErrorCode::Ok);
            assert_eq!(dims.step, 1);
            assert_eq!(dims.elapsed, 30.0);
            pvb_destroy(pv);
        }
    }

    #[test]
    fn test_pv_scalar_round_trip_through_buffers() {
        let pv = new_hex(Some(r#"{"pv_scalar": true}"#));
        let mut dims = PvbDimensions::default();
        let mut len = 0;
        unsafe {
            assert_eq!(pvb_get_dimensions(pv, &mut dims), PvbErrorCode::Ok);
            let n = dims.n_cells * dims.n_levels;
            let values = vec![1.5; n];
            assert_eq!(pvb_set_pv_scalar(pv, values.as_ptr(), n), PvbErrorCode::NotAvailable);

            set_column_profiles(pv, &dims);
            assert_eq!(crate::step::pvb_initialize(pv), PvbErrorCode::Ok);
            assert_eq!(pvb_set_pv_scalar(pv, values.as_ptr(), n), PvbErrorCode::Ok);
            let mut out = vec![0.0; n];
            assert_eq!(
                pvb_get_field(pv, PvbOutput::PvScalar, PvbCategory::Dynamics, out.as_mut_ptr(), n, &mut len),
                PvbErrorCode::Ok
            );
            assert_eq!(out, values);
            pvb_destroy(pv);
        }
    }
}
