use pv_budget_core::{ConfigError, PvError};
use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

/// Common interface for FFI error types.
///
/// This trait provides a unified way to handle errors across the FFI boundary,
/// allowing both simple error codes and custom error messages.
///
/// # Design
/// - `code()` - Returns the error code to be passed across FFI boundary
/// - `msg()` - Returns the error message for diagnostic purposes
pub(crate) trait PvbError {
    /// Returns the error code to be returned across the FFI boundary.
    fn code(&self) -> PvbErrorCode;

    /// Returns the human-readable error message.
    fn msg(&self) -> &str;
}

/// Default implementation of `PvbError` for every FFI failure.
///
/// Wraps a `PvbErrorCode` and a message; core library errors convert into it
/// via `From<PvError>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DefaultPvbError {
    code: PvbErrorCode,
    msg: String,
}

impl DefaultPvbError {
    /// Create error for null pointer passed where non-null required.
    ///
    /// # Arguments
    /// * `param_name` - The name of the parameter that was null (e.g., `"out_instance"`, `"data"`)
    pub fn null_pointer(param_name: &str) -> Self {
        Self {
            code: PvbErrorCode::NullPointer,
            msg: format!("Parameter '{param_name}' cannot be null"),
        }
    }

    /// Create error for poisoned lock.
    ///
    /// # Arguments
    /// * `lock_name` - The name of the lock that was poisoned (e.g., `"RwLock"`, `"Mutex"`)
    pub fn lock_poisoned(lock_name: &str) -> Self {
        Self {
            code: PvbErrorCode::LockPoisoned,
            msg: format!("Lock '{lock_name}' was poisoned by a panic in another thread"),
        }
    }

    /// Create error for an invalid parameter.
    ///
    /// # Arguments
    /// * `message` - Description of the error
    pub fn invalid_parameter(message: String) -> Self {
        Self {
            code: PvbErrorCode::InvalidParameter,
            msg: message,
        }
    }

    /// Create error for a buffer whose length does not match the expected field size.
    ///
    /// # Arguments
    /// * `param_name` - The buffer parameter (e.g., `"data"`, `"out_values"`)
    /// * `expected` - Required number of values
    /// * `found` - Number of values supplied
    pub fn buffer_length(param_name: &str, expected: usize, found: usize) -> Self {
        Self {
            code: PvbErrorCode::ShapeMismatch,
            msg: format!("Buffer '{param_name}' holds {found} values, expected {expected}"),
        }
    }

    /// Create error for an output that the current configuration or step did not produce.
    ///
    /// # Arguments
    /// * `what` - Description of the requested output
    pub fn not_available(what: &str) -> Self {
        Self {
            code: PvbErrorCode::NotAvailable,
            msg: format!("Output '{what}' is not available"),
        }
    }
}

impl PvbError for DefaultPvbError {
    fn code(&self) -> PvbErrorCode {
        self.code
    }

    fn msg(&self) -> &str {
        &self.msg
    }
}

impl From<PvError> for DefaultPvbError {
    fn from(error: PvError) -> Self {
        let code = match &error {
            PvError::Config(_) => PvbErrorCode::InvalidConfig,
            PvError::SnapshotUnavailable | PvError::SnapshotAlreadyHeld => {
                PvbErrorCode::SnapshotMisuse
            }
            PvError::ShapeMismatch { .. } => PvbErrorCode::ShapeMismatch,
            PvError::InvalidMesh(_) => PvbErrorCode::InvalidMesh,
            PvError::MissingTendency(_) => PvbErrorCode::MissingTendency,
            PvError::InvalidTimeStep(_) => PvbErrorCode::InvalidParameter,
            PvError::Restart(_) => PvbErrorCode::RestartFailed,
        };
        Self {
            code,
            msg: error.to_string(),
        }
    }
}

impl From<ConfigError> for DefaultPvbError {
    fn from(error: ConfigError) -> Self {
        PvError::from(error).into()
    }
}

/// FFI error codes returned by PV budget functions.
/// Follows standard C convention: 0 = success, non-zero = error.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvbErrorCode {
    /// Operation completed successfully.
    Ok = 0,

    /// Invalid pointer: null pointer passed where non-null required.
    NullPointer = 1,

    /// Lock poisoned: internal synchronization primitive was poisoned by a panic.
    LockPoisoned = 2,

    /// Mesh arrays are inconsistent (lengths, indices, non-positive lengths or areas).
    InvalidMesh = 3,

    /// Invalid parameter passed to function (enum value, time step, JSON text).
    InvalidParameter = 4,

    /// Diagnostic configuration rejected (flag dependencies, threshold, levels).
    InvalidConfig = 5,

    /// `pvb_begin_step` / `pvb_end_step` called out of order.
    SnapshotMisuse = 6,

    /// A field or buffer does not have the size the mesh requires.
    ShapeMismatch = 7,

    /// An enabled tendency category was not given its driving tendency.
    MissingTendency = 8,

    /// Restart payload could not be produced or applied.
    RestartFailed = 9,

    /// Requested output is disabled or no step has completed yet.
    NotAvailable = 10,
}

impl From<DefaultPvbError> for PvbErrorCode {
    fn from(error: DefaultPvbError) -> Self {
        error.code
    }
}

thread_local! {
    /// Thread-local storage for the most recent FFI error (C string, error code).
    /// Allows callers to retrieve diagnostic information after a failed call.
    /// The CString is stored to prevent memory leaks when returning raw pointers via FFI.
    static LAST_ERROR: RefCell<(Option<CString>, PvbErrorCode)> = const { RefCell::new((None, PvbErrorCode::Ok)) };
}

/// Internal helper to read `LAST_ERROR` thread-local storage (cstring, code).
pub(crate) fn with_last_error<F, R>(f: F) -> R
where
    F: FnOnce(&(Option<CString>, PvbErrorCode)) -> R,
{
    LAST_ERROR.with_borrow(f)
}

/// Internal helper to mutate `LAST_ERROR` thread-local storage (cstring, code).
pub(crate) fn with_last_error_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut (Option<CString>, PvbErrorCode)) -> R,
{
    LAST_ERROR.with_borrow_mut(f)
}

/// Retrieve the most recent FFI error message as a null-terminated C string.
///
/// Returns:
/// - A borrowed pointer to the error message if an error occurred.
/// - `null` if no error has occurred or the error message cannot be converted to C string.
///
/// # Thread Safety
/// Error messages are stored per-thread (thread-local storage), so this is thread-safe.
/// Each thread has its own independent error state.
///
/// # Lifetime
/// The returned pointer is valid until:
/// - The next FFI call on this thread that sets or clears the error
/// - The thread terminates
///
/// **DO NOT FREE THIS POINTER** - it is managed internally.
///
/// Example:
/// ```c
/// PvbErrorCode err = pvb_end_step(pv, 60.0);
/// if (err != Ok) {
///     const char* error = pvb_get_last_error();
///     if (error) {
///         fprintf(stderr, "PV diagnostics failed: %s\n", error);
///     }
/// }
/// ```
#[no_mangle]
pub extern "C" fn pvb_get_last_error() -> *const c_char {
    with_last_error(|(cstring, _code)| cstring.as_ref().map_or(ptr::null(), |cs| cs.as_ptr()))
}

/// Retrieve the most recent FFI error code.
///
/// Returns:
/// - `PvbErrorCode::Ok` (0) if no error has occurred
/// - The specific error code from the last failed operation
///
/// # Thread Safety
/// Error codes are stored per-thread (thread-local storage), so this is thread-safe.
#[no_mangle]
pub extern "C" fn pvb_get_last_error_code() -> PvbErrorCode {
    with_last_error(|(_cstring, code)| *code)
}
