//! Error types for configuration and per-step contract violations
//!
//! Two classes of failure exist:
//! - [`ConfigError`]: an unsatisfiable computation request, reported once at
//!   setup before any step executes.
//! - [`PvError`]: everything else that can fail loudly, including misuse of the
//!   snapshot/release lifecycle and fields whose shape does not match the mesh.
//!
//! Numerical conditions inside a step (no tropopause crossing in a column, an
//! isobaric level outside a column's pressure range) are not errors; they yield
//! [`crate::FILL_VALUE`] for that column only.

use crate::budget::TendencyCategory;
use crate::config::MicrophysicsScheme;
use crate::fields::FieldLocation;
use std::fmt;

/// Invalid diagnostic configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A flag was set without the flag it depends on
    MissingPrerequisite {
        /// Flag that was set
        flag: &'static str,
        /// Flag that must also be set
        requires: &'static str,
    },
    /// Per-process microphysics terms requested from a scheme that does not expose them
    UnsupportedMicrophysicsScheme(MicrophysicsScheme),
    /// Tropopause threshold must be finite and strictly positive
    InvalidThreshold(f64),
    /// Isobaric interpolation enabled without any target level
    EmptyIsobaricLevels,
    /// Isobaric target level must be finite and strictly positive (Pa)
    InvalidIsobaricLevel(f64),
    /// Accumulation reset interval must be finite and strictly positive (s)
    InvalidResetInterval(f64),
    /// Configuration payload could not be parsed
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingPrerequisite { flag, requires } => {
                write!(f, "'{flag}' requires '{requires}' to be enabled")
            }
            ConfigError::UnsupportedMicrophysicsScheme(scheme) => write!(
                f,
                "'pv_microphys' requires a microphysics scheme exposing per-process tendencies, got '{scheme}'"
            ),
            ConfigError::InvalidThreshold(v) => {
                write!(f, "tropopause threshold must be finite and positive, got {v}")
            }
            ConfigError::EmptyIsobaricLevels => {
                write!(f, "'pv_isobaric' requires at least one isobaric level")
            }
            ConfigError::InvalidIsobaricLevel(v) => {
                write!(f, "isobaric level must be finite and positive, got {v} Pa")
            }
            ConfigError::InvalidResetInterval(v) => {
                write!(f, "accumulation reset interval must be finite and positive, got {v} s")
            }
            ConfigError::Parse(msg) => write!(f, "failed to parse configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors raised by mesh construction, the step lifecycle and restart handling
#[derive(Debug, Clone, PartialEq)]
pub enum PvError {
    /// Configuration rejected at setup
    Config(ConfigError),
    /// The beginning-of-step snapshot was requested but none is held
    SnapshotUnavailable,
    /// `snapshot()` called while the previous snapshot was never released
    SnapshotAlreadyHeld,
    /// A field does not have the shape the mesh requires
    ShapeMismatch {
        /// Which field was rejected
        field: String,
        /// Expected (location, horizontal points, levels)
        expected: (FieldLocation, usize, usize),
        /// Actual (location, horizontal points, levels)
        found: (FieldLocation, usize, usize),
    },
    /// Mesh arrays are inconsistent
    InvalidMesh(String),
    /// An enabled tendency category was not given its driving tendency
    MissingTendency(TendencyCategory),
    /// The step length is not finite and positive
    InvalidTimeStep(f64),
    /// Restart payload could not be produced or applied
    Restart(String),
}

impl PvError {
    /// Build a shape mismatch error for a named field.
    pub(crate) fn shape(
        field: impl Into<String>,
        expected: (FieldLocation, usize, usize),
        found: (FieldLocation, usize, usize),
    ) -> Self {
        PvError::ShapeMismatch {
            field: field.into(),
            expected,
            found,
        }
    }
}

impl fmt::Display for PvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvError::Config(e) => write!(f, "configuration error: {e}"),
            PvError::SnapshotUnavailable => write!(
                f,
                "beginning-of-step fields requested without a held snapshot (snapshot/release misuse)"
            ),
            PvError::SnapshotAlreadyHeld => write!(
                f,
                "snapshot requested while the previous step's snapshot was never released"
            ),
            PvError::ShapeMismatch {
                field,
                expected,
                found,
            } => write!(
                f,
                "field '{field}' has shape {}x{} at {}, expected {}x{} at {}",
                found.1, found.2, found.0, expected.1, expected.2, expected.0
            ),
            PvError::InvalidMesh(msg) => write!(f, "invalid mesh: {msg}"),
            PvError::MissingTendency(category) => write!(
                f,
                "tendency category '{category}' is enabled but its driving tendency was not supplied"
            ),
            PvError::InvalidTimeStep(dt) => {
                write!(f, "time step must be finite and positive, got {dt}")
            }
            PvError::Restart(msg) => write!(f, "restart failed: {msg}"),
        }
    }
}

impl std::error::Error for PvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PvError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for PvError {
    fn from(e: ConfigError) -> Self {
        PvError::Config(e)
    }
}
