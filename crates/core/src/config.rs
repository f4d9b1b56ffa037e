//! Diagnostic configuration and the capability set derived from it
//!
//! The host reads its namelist and hands the five PV flags over as a
//! [`PvConfig`]. Only a [`ValidatedConfig`] can build a
//! [`crate::PvDiagnostics`], so every invalid flag combination is rejected
//! before the first step.
//!
//! # Flag dependencies
//!
//! ```text
//! pv_diag ── pv_tend ──┬── pv_microphys  (scheme must expose process tendencies)
//!    │                 └── pv_isobaric   (at least one target level)
//!    └──── pv_scalar
//! ```

use crate::budget::TendencyCategory;
use crate::core_types::{Pascals, Pvu, Seconds};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Default dynamic tropopause threshold
pub const DEFAULT_DT_THRESHOLD: Pvu = Pvu::new(2.0);

/// Microphysics scheme active in the host model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicrophysicsScheme {
    /// No microphysics
    #[default]
    Off,
    /// Kessler warm-rain scheme
    Kessler,
    /// Thompson bulk scheme
    Thompson,
    /// WSM6 single-moment 6-class scheme (instrumented with per-process θ tendencies)
    Wsm6,
}

impl MicrophysicsScheme {
    /// Whether the scheme reports θ tendencies split by microphysical process
    #[must_use]
    pub const fn exposes_process_tendencies(self) -> bool {
        matches!(self, MicrophysicsScheme::Wsm6)
    }
}

impl fmt::Display for MicrophysicsScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MicrophysicsScheme::Off => "off",
            MicrophysicsScheme::Kessler => "kessler",
            MicrophysicsScheme::Thompson => "thompson",
            MicrophysicsScheme::Wsm6 => "wsm6",
        };
        write!(f, "{name}")
    }
}

/// PV diagnostic configuration as supplied by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvConfig {
    /// Compute 3D PV and the dynamic tropopause
    pub pv_diag: bool,
    /// Compute the PV tendency budget
    pub pv_tend: bool,
    /// Initialize and carry a passive PV-scalar tracer
    pub pv_scalar: bool,
    /// Split the microphysics contribution by process
    pub pv_microphys: bool,
    /// Interpolate PV and tendencies to isobaric levels and accumulate there
    pub pv_isobaric: bool,

    /// Microphysics scheme active in the host model
    pub microphysics_scheme: MicrophysicsScheme,

    /// Signed PV value defining the dynamic tropopause
    pub dt_threshold: Pvu,

    /// Target isobaric levels
    pub isobaric_levels: Vec<Pascals>,

    /// Model time after which accumulators restart from zero
    /// (typically the output interval). `None` accumulates for the whole run.
    pub accumulation_reset_interval: Option<Seconds>,
}

impl Default for PvConfig {
    fn default() -> Self {
        Self {
            pv_diag: true,
            pv_tend: false,
            pv_scalar: false,
            pv_microphys: false,
            pv_isobaric: false,
            microphysics_scheme: MicrophysicsScheme::Off,
            dt_threshold: DEFAULT_DT_THRESHOLD,
            isobaric_levels: vec![
                Pascals::from_hectopascals(500.0),
                Pascals::from_hectopascals(700.0),
                Pascals::from_hectopascals(850.0),
            ],
            accumulation_reset_interval: None,
        }
    }
}

impl PvConfig {
    /// Configuration with the full budget enabled (diag + tend + isobaric)
    #[must_use]
    pub fn full_budget() -> Self {
        Self {
            pv_diag: true,
            pv_tend: true,
            pv_isobaric: true,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration; missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the payload is not valid JSON for this struct.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check flag dependencies and numeric settings.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found; nothing is partially accepted.
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let require = |set: bool, flag: &'static str, dep: bool, requires: &'static str| {
            if set && !dep {
                Err(ConfigError::MissingPrerequisite { flag, requires })
            } else {
                Ok(())
            }
        };

        require(self.pv_tend, "pv_tend", self.pv_diag, "pv_diag")?;
        require(self.pv_scalar, "pv_scalar", self.pv_diag, "pv_diag")?;
        require(self.pv_microphys, "pv_microphys", self.pv_tend, "pv_tend")?;
        require(self.pv_isobaric, "pv_isobaric", self.pv_tend, "pv_tend")?;

        if self.pv_microphys && !self.microphysics_scheme.exposes_process_tendencies() {
            return Err(ConfigError::UnsupportedMicrophysicsScheme(
                self.microphysics_scheme,
            ));
        }

        if !self.dt_threshold.is_finite() || *self.dt_threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(*self.dt_threshold));
        }

        if self.pv_isobaric {
            if self.isobaric_levels.is_empty() {
                return Err(ConfigError::EmptyIsobaricLevels);
            }
            if let Some(bad) = self
                .isobaric_levels
                .iter()
                .find(|p| !p.is_finite() || ***p <= 0.0)
            {
                return Err(ConfigError::InvalidIsobaricLevel(**bad));
            }
        }

        if let Some(interval) = self.accumulation_reset_interval {
            if !interval.is_positive_finite() {
                return Err(ConfigError::InvalidResetInterval(*interval));
            }
        }

        Ok(ValidatedConfig(self))
    }
}

/// A configuration that passed [`PvConfig::validate`]
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig(PvConfig);

impl ValidatedConfig {
    /// Tendency categories this configuration computes
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::from_config(&self.0)
    }
}

impl Deref for ValidatedConfig {
    type Target = PvConfig;
    fn deref(&self) -> &PvConfig {
        &self.0
    }
}

/// The set of tendency categories enabled by a configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capabilities {
    enabled: Vec<TendencyCategory>,
}

impl Capabilities {
    fn from_config(config: &PvConfig) -> Self {
        let mut enabled = Vec::new();
        if config.pv_tend {
            enabled.extend_from_slice(TendencyCategory::CLOSURE);
        }
        if config.pv_microphys {
            enabled.push(TendencyCategory::MicrophysicsNet);
            enabled.extend_from_slice(TendencyCategory::MICROPHYSICS_PROCESSES);
        }
        Self { enabled }
    }

    /// Whether `category` is computed
    #[must_use]
    pub fn contains(&self, category: TendencyCategory) -> bool {
        self.enabled.contains(&category)
    }

    /// Enabled categories in canonical order
    #[must_use]
    pub fn categories(&self) -> &[TendencyCategory] {
        &self.enabled
    }

    /// True when no tendency is computed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = PvConfig::default().validate().unwrap();
        assert!(cfg.pv_diag);
        assert!(cfg.capabilities().is_empty());
    }

    #[test]
    fn test_isobaric_without_tend_rejected() {
        let cfg = PvConfig {
            pv_isobaric: true,
            ..PvConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::MissingPrerequisite {
                flag: "pv_isobaric",
                requires: "pv_tend"
            })
        );
    }

    #[test]
    fn test_microphys_without_tend_rejected() {
        let cfg = PvConfig {
            pv_microphys: true,
            microphysics_scheme: MicrophysicsScheme::Wsm6,
            ..PvConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingPrerequisite { flag: "pv_microphys", .. })
        ));
    }

    #[test]
    fn test_microphys_with_unsupported_scheme_rejected() {
        for scheme in [
            MicrophysicsScheme::Off,
            MicrophysicsScheme::Kessler,
            MicrophysicsScheme::Thompson,
        ] {
            let cfg = PvConfig {
                pv_tend: true,
                pv_microphys: true,
                microphysics_scheme: scheme,
                ..PvConfig::default()
            };
            assert_eq!(
                cfg.validate(),
                Err(ConfigError::UnsupportedMicrophysicsScheme(scheme))
            );
        }
    }

    #[test]
    fn test_tend_requires_diag() {
        let cfg = PvConfig {
            pv_diag: false,
            pv_tend: true,
            ..PvConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_invalid_numeric_settings() {
        let cfg = PvConfig {
            dt_threshold: Pvu::new(0.0),
            ..PvConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidThreshold(0.0)));

        let cfg = PvConfig {
            isobaric_levels: vec![Pascals::new(-5.0)],
            ..PvConfig::full_budget()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidIsobaricLevel(-5.0)));

        let cfg = PvConfig {
            isobaric_levels: Vec::new(),
            ..PvConfig::full_budget()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyIsobaricLevels));

        let cfg = PvConfig {
            accumulation_reset_interval: Some(Seconds::new(0.0)),
            ..PvConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidResetInterval(0.0)));
    }

    #[test]
    fn test_capabilities_follow_flags() {
        let caps = PvConfig::full_budget().validate().unwrap().capabilities();
        assert!(caps.contains(TendencyCategory::Dynamics));
        assert!(caps.contains(TendencyCategory::FrictionCumulus));
        assert!(!caps.contains(TendencyCategory::MicrophysicsMelting));

        let caps = PvConfig {
            pv_microphys: true,
            microphysics_scheme: MicrophysicsScheme::Wsm6,
            ..PvConfig::full_budget()
        }
        .validate()
        .unwrap()
        .capabilities();
        assert!(caps.contains(TendencyCategory::MicrophysicsNet));
        assert!(caps.contains(TendencyCategory::MicrophysicsFreezing));
        assert_eq!(caps.categories().len(), TendencyCategory::ALL.len());
    }

    #[test]
    fn test_from_json_uses_defaults_for_missing_keys() {
        let cfg = PvConfig::from_json(r#"{"pv_tend": true, "microphysics_scheme": "wsm6"}"#).unwrap();
        assert!(cfg.pv_diag);
        assert!(cfg.pv_tend);
        assert_eq!(cfg.microphysics_scheme, MicrophysicsScheme::Wsm6);
        assert_eq!(cfg.dt_threshold, DEFAULT_DT_THRESHOLD);

        assert!(matches!(
            PvConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
