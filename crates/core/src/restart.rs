//! Restart payload
//!
//! Everything that must survive a restart unchanged: accumulators, the
//! PV-scalar tracer and the step/time counters. The beginning-of-step
//! snapshot is not part of it; a resumed run has none until its first
//! `begin_step`.

use crate::budget::AccumulatorSet;
use crate::core_types::Seconds;
use crate::error::PvError;
use crate::fields::Field;
use serde::{Deserialize, Serialize};

/// Persistent diagnostic state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartState {
    /// Completed steps
    pub step: u64,
    /// Model time covered by completed steps
    pub elapsed: Seconds,
    /// Model-level accumulators (present when the budget is enabled)
    pub accumulators: Option<AccumulatorSet>,
    /// Isobaric accumulators (present when isobaric output is enabled)
    pub isobaric_accumulators: Option<AccumulatorSet>,
    /// PV-scalar tracer (present once initialized)
    pub pv_scalar: Option<Field>,
}

impl RestartState {
    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::Restart`] if serialization fails.
    pub fn to_json(&self) -> Result<String, PvError> {
        serde_json::to_string(self).map_err(|e| PvError::Restart(e.to_string()))
    }

    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::Restart`] if the payload is malformed.
    pub fn from_json(json: &str) -> Result<Self, PvError> {
        serde_json::from_str(json).map_err(|e| PvError::Restart(e.to_string()))
    }
}
