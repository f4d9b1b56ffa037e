//! Tendency process categories

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical process a PV tendency is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TendencyCategory {
    /// Resolved dynamics (advection of wind and θ)
    Dynamics,
    /// Net diabatic heating from all physics
    Diabatic,
    /// Explicit horizontal/vertical mixing (diffusion only)
    FrictionMixing,
    /// Planetary boundary layer and gravity-wave drag
    FrictionPblGwd,
    /// Cumulus momentum transport
    FrictionCumulus,
    /// Net microphysics heating
    MicrophysicsNet,
    /// Condensation and evaporation of cloud water
    MicrophysicsCondensation,
    /// Evaporation of rain water
    MicrophysicsEvaporationRain,
    /// Deposition and sublimation of ice species
    MicrophysicsDepositionSublimation,
    /// Melting of ice species
    MicrophysicsMelting,
    /// Freezing of liquid species
    MicrophysicsFreezing,
}

impl TendencyCategory {
    /// Every category in canonical order
    pub const ALL: &'static [TendencyCategory] = &[
        TendencyCategory::Dynamics,
        TendencyCategory::Diabatic,
        TendencyCategory::FrictionMixing,
        TendencyCategory::FrictionPblGwd,
        TendencyCategory::FrictionCumulus,
        TendencyCategory::MicrophysicsNet,
        TendencyCategory::MicrophysicsCondensation,
        TendencyCategory::MicrophysicsEvaporationRain,
        TendencyCategory::MicrophysicsDepositionSublimation,
        TendencyCategory::MicrophysicsMelting,
        TendencyCategory::MicrophysicsFreezing,
    ];

    /// Categories whose sum closes the budget
    pub const CLOSURE: &'static [TendencyCategory] = &[
        TendencyCategory::Dynamics,
        TendencyCategory::Diabatic,
        TendencyCategory::FrictionMixing,
        TendencyCategory::FrictionPblGwd,
        TendencyCategory::FrictionCumulus,
    ];

    /// Per-process microphysics breakdown
    pub const MICROPHYSICS_PROCESSES: &'static [TendencyCategory] = &[
        TendencyCategory::MicrophysicsCondensation,
        TendencyCategory::MicrophysicsEvaporationRain,
        TendencyCategory::MicrophysicsDepositionSublimation,
        TendencyCategory::MicrophysicsMelting,
        TendencyCategory::MicrophysicsFreezing,
    ];

    /// Short name used in output field names
    pub const fn name(self) -> &'static str {
        match self {
            TendencyCategory::Dynamics => "dyn",
            TendencyCategory::Diabatic => "diab",
            TendencyCategory::FrictionMixing => "fric_mix",
            TendencyCategory::FrictionPblGwd => "fric_pbl",
            TendencyCategory::FrictionCumulus => "fric_cu",
            TendencyCategory::MicrophysicsNet => "mp",
            TendencyCategory::MicrophysicsCondensation => "mp_cond",
            TendencyCategory::MicrophysicsEvaporationRain => "mp_evap_rain",
            TendencyCategory::MicrophysicsDepositionSublimation => "mp_dep_sub",
            TendencyCategory::MicrophysicsMelting => "mp_melt",
            TendencyCategory::MicrophysicsFreezing => "mp_frz",
        }
    }

    /// Look a category up by its short name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl fmt::Display for TendencyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique_and_round_trip() {
        for &cat in TendencyCategory::ALL {
            assert_eq!(TendencyCategory::from_name(cat.name()), Some(cat));
        }
        let mut names: Vec<_> = TendencyCategory::ALL.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TendencyCategory::ALL.len());
    }

    #[test]
    fn test_closure_excludes_microphysics() {
        assert!(TendencyCategory::CLOSURE
            .iter()
            .all(|c| !TendencyCategory::MICROPHYSICS_PROCESSES.contains(c)));
        assert!(!TendencyCategory::CLOSURE.contains(&TendencyCategory::MicrophysicsNet));
    }
}
