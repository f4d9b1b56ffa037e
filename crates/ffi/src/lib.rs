//! C ABI for the PV budget diagnostics
//!
//! A model driver creates one [`PvbInstance`] per mesh, then per step calls
//! `pvb_begin_step`, updates the state with `pvb_set_state_field`, stages
//! tendencies with `pvb_set_tendency`, and finishes with `pvb_end_step`.
//! Every fallible function returns a [`PvbErrorCode`]; details of the last
//! failure on the calling thread are available from `pvb_get_last_error`.

mod error;
mod helpers;
mod instance;
mod outputs;
mod restart;
mod step;

pub use error::{pvb_get_last_error, pvb_get_last_error_code, PvbErrorCode};
pub use instance::{pvb_destroy, pvb_new_from_mesh, pvb_new_periodic_hex, PvbInstance, PvbMeshDesc};
pub use outputs::{
    pvb_get_dimensions, pvb_get_dt_counts, pvb_get_field, pvb_set_pv_scalar, PvbCategory,
    PvbDimensions, PvbDtCounts, PvbOutput,
};
pub use restart::{pvb_restart_from_json, pvb_restart_to_json, pvb_string_free};
pub use step::{
    pvb_begin_step, pvb_end_step, pvb_initialize, pvb_set_coupled_tendency, pvb_set_state_field,
    pvb_set_tendency, PvbStateField, PvbTendency,
};
