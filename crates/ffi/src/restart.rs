use pv_budget_core::RestartState;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

use crate::error::{DefaultPvbError, PvbErrorCode};
use crate::helpers::{
    handle_ffi_result_error, instance_from_ptr, str_from_ptr, track_error, with_diagnostics,
    with_diagnostics_mut,
};
use crate::instance::PvbInstance;

/// Serialize the persistent diagnostic state (accumulators, PV scalar,
/// step counter and elapsed time) to a JSON string.
///
/// The returned string is owned by the caller and must be released with
/// `pvb_string_free`. The model state itself is not included; the host
/// checkpoints it alongside.
///
/// Returns
/// - `PvbErrorCode::Ok` on success, with the string in `*out_json`
/// - `PvbErrorCode::NullPointer` if `ptr` or `out_json` is null
/// - `PvbErrorCode::RestartFailed` if called in the middle of a step
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
/// - `out_json` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn pvb_restart_to_json(
    ptr: *const PvbInstance,
    out_json: *mut *mut c_char,
) -> PvbErrorCode {
    if out_json.is_null() {
        return track_error(&DefaultPvbError::null_pointer("out_json"));
    }
    // SAFETY: checked non-null above.
    unsafe {
        *out_json = ptr::null_mut();
    }
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        let json = with_diagnostics(instance, |diag| Ok(diag.restart_state()?.to_json()?))?;
        let cstring = CString::new(json)
            .map_err(|e| DefaultPvbError::invalid_parameter(format!("restart JSON contains NUL: {e}")))?;
        // SAFETY: checked non-null above.
        unsafe {
            *out_json = cstring.into_raw();
        }
        Ok(())
    })
}

/// Restore persistent diagnostic state from JSON produced by `pvb_restart_to_json`.
///
/// The restore is all-or-nothing: on error nothing changes. The payload must
/// come from a run with the same configuration and mesh.
///
/// Returns
/// - `PvbErrorCode::Ok` on success
/// - `PvbErrorCode::NullPointer` if `ptr` or `json` is null
/// - `PvbErrorCode::RestartFailed` if the payload is malformed or belongs to another configuration
/// - `PvbErrorCode::ShapeMismatch` if stored fields do not fit this mesh
///
/// # Safety
/// - `ptr` must be null or a valid pointer returned by one of the `pvb_new_*` functions.
/// - `json` must be null or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pvb_restart_from_json(
    ptr: *const PvbInstance,
    json: *const c_char,
) -> PvbErrorCode {
    handle_ffi_result_error(|| {
        // SAFETY: null or live per the contract above.
        let instance = unsafe { instance_from_ptr(ptr)? };
        // SAFETY: null or null-terminated per the contract above.
        let json = unsafe { str_from_ptr(json, "json")? }
            .ok_or_else(|| DefaultPvbError::null_pointer("json"))?;
        let saved = RestartState::from_json(json)?;
        with_diagnostics_mut(instance, |diag| Ok(diag.restore(saved)?))
    })
}

/// Free a string returned by `pvb_restart_to_json`.
///
/// Passing null is a no-op.
///
/// # Safety
/// - `text` must be null or a pointer returned by `pvb_restart_to_json` that has not been freed.
#[no_mangle]
pub unsafe extern "C" fn pvb_string_free(text: *mut c_char) {
    if text.is_null() {
        return;
    }
    // SAFETY: created by `CString::into_raw` in `pvb_restart_to_json`.
    unsafe {
        drop(CString::from_raw(text));
    }
}
