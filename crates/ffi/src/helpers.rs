use crate::error::{with_last_error_mut, DefaultPvbError, PvbError, PvbErrorCode};
use crate::instance::PvbInstance;
use pv_budget_core::PvDiagnostics;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Set the thread-local error message and code.
/// Internal helper for FFI functions to record failure details.
/// Accepts any type implementing `PvbError` trait.
pub(crate) fn set_last_error(error: &impl PvbError) {
    with_last_error_mut(|(cstring, code)| {
        *cstring = CString::new(error.msg()).ok();
        *code = error.code();
    });
}

/// Track an error by setting it in thread-local storage and returning its code.
/// More efficient than handling results for immediate errors.
#[inline]
pub(crate) fn track_error(error: &impl PvbError) -> PvbErrorCode {
    set_last_error(error);
    error.code()
}

/// Clear the thread-local error message and code.
/// Internal helper called on successful operations.
pub(crate) fn clear_last_error() {
    with_last_error_mut(|(cstring, code)| {
        *cstring = None;
        *code = PvbErrorCode::Ok;
    });
}

/// Record the error of a failed result and hand back its code; clear the
/// last error on success.
pub(crate) fn track_result<T>(result: Result<T, DefaultPvbError>) -> Result<T, PvbErrorCode> {
    match result {
        Ok(value) => {
            clear_last_error();
            Ok(value)
        }
        Err(error) => Err(track_error(&error)),
    }
}

/// Run an FFI body and turn its outcome into a C error code.
pub(crate) fn handle_ffi_result_error(
    body: impl FnOnce() -> Result<(), DefaultPvbError>,
) -> PvbErrorCode {
    match track_result(body()) {
        Ok(()) => PvbErrorCode::Ok,
        Err(code) => code,
    }
}

/// Borrow an instance from a raw pointer.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by one of the `pvb_new_*` functions.
pub(crate) unsafe fn instance_from_ptr<'a>(
    ptr: *const PvbInstance,
) -> Result<&'a PvbInstance, DefaultPvbError> {
    // SAFETY: the caller guarantees `ptr` is null or points to a live instance.
    unsafe { ptr.as_ref() }.ok_or_else(|| DefaultPvbError::null_pointer("ptr"))
}

/// Borrow `len` values from a C buffer.
///
/// # Safety
/// `data` must be null or valid for reads of `len` `f64` values.
pub(crate) unsafe fn slice_from_ptr<'a>(
    data: *const f64,
    len: usize,
    name: &str,
) -> Result<&'a [f64], DefaultPvbError> {
    if data.is_null() {
        return Err(DefaultPvbError::null_pointer(name));
    }
    // SAFETY: non-null and valid for `len` reads per the caller's contract.
    Ok(unsafe { std::slice::from_raw_parts(data, len) })
}

/// Read an optional UTF-8 C string; null yields `None`.
///
/// # Safety
/// `text` must be null or a valid null-terminated string.
pub(crate) unsafe fn str_from_ptr<'a>(
    text: *const c_char,
    name: &str,
) -> Result<Option<&'a str>, DefaultPvbError> {
    if text.is_null() {
        return Ok(None);
    }
    // SAFETY: non-null and null-terminated per the caller's contract.
    let cstr = unsafe { CStr::from_ptr(text) };
    cstr.to_str()
        .map(Some)
        .map_err(|e| DefaultPvbError::invalid_parameter(format!("'{name}' is not valid UTF-8: {e}")))
}

/// Run `f` with shared access to the diagnostics.
pub(crate) fn with_diagnostics<T>(
    instance: &PvbInstance,
    f: impl FnOnce(&PvDiagnostics) -> Result<T, DefaultPvbError>,
) -> Result<T, DefaultPvbError> {
    let diagnostics = instance
        .diagnostics
        .read()
        .map_err(|_| DefaultPvbError::lock_poisoned("RwLock"))?;
    f(&diagnostics)
}

/// Run `f` with exclusive access to the diagnostics.
pub(crate) fn with_diagnostics_mut<T>(
    instance: &PvbInstance,
    f: impl FnOnce(&mut PvDiagnostics) -> Result<T, DefaultPvbError>,
) -> Result<T, DefaultPvbError> {
    let mut diagnostics = instance
        .diagnostics
        .write()
        .map_err(|_| DefaultPvbError::lock_poisoned("RwLock"))?;
    f(&mut diagnostics)
}
