//! PV Budget Core Library
//!
//! Ertel potential vorticity diagnostics for an atmospheric model running on an
//! unstructured Voronoi mesh. Each step the library computes 3D PV, attributes
//! its change to dynamics, diabatic heating, friction and microphysics,
//! locates the dynamic tropopause and samples fields on it and on isobaric
//! levels, and accumulates tendencies over time.
//!
//! ## Step lifecycle
//!
//! ```text
//! begin_step()  ──►  host advances state_mut()  ──►  end_step(dt, tendencies)
//!  snapshot t              t → t+dt                PV(t), PV(t+dt), budget,
//!                                                  tropopause, accumulators
//! ```
//!
//! ## Usage
//! ```
//! use std::sync::Arc;
//! use pv_budget_core::{PeriodicHexMesh, PvConfig, PvDiagnostics, Seconds, StepTendencies};
//!
//! let mesh = PeriodicHexMesh::new(6, 6, 20_000.0)
//!     .with_levels(vec![500.0, 1500.0, 2500.0])
//!     .with_coriolis(1.0e-4, 0.0)
//!     .build()
//!     .unwrap();
//! let config = PvConfig::default().validate().unwrap();
//! let mut diag = PvDiagnostics::new(config, Arc::new(mesh)).unwrap();
//!
//! diag.state_mut().theta.fill(300.0);
//! diag.state_mut().rho.fill(1.0);
//!
//! diag.begin_step().unwrap();
//! // ... the host model advances diag.state_mut() here ...
//! let outputs = diag.end_step(Seconds::new(60.0), &StepTendencies::default()).unwrap();
//! assert!(outputs.pv.is_some());
//! ```

// Shared value types
pub mod core_types;
pub mod error;
pub mod fields;

// Mesh and discrete operators
pub mod mesh;
pub mod operators;

// Diagnostics
pub mod budget;
pub mod interpolate;
pub mod pv;
pub mod tropopause;

// State handling
pub mod config;
pub mod diagnostics;
pub mod restart;
pub mod scalar;
pub mod time_levels;

// Re-export core types
pub use core_types::{Pascals, Pvu, Seconds, Vec3};
pub use error::{ConfigError, PvError};
pub use fields::{Field, FieldLocation, VectorField};

// Re-export mesh types
pub use mesh::{Mesh, MeshArrays, PeriodicHexMesh};
pub use operators::MeshOperators;

// Re-export diagnostic types
pub use budget::{AccumulatorSet, StepTendencies, TendencyBudget, TendencyCategory, TendencyInput};
pub use config::{Capabilities, MicrophysicsScheme, PvConfig, ValidatedConfig};
pub use diagnostics::{DtFields, IsobaricOutputs, PvDiagnostics, StepOutputs};
pub use interpolate::{Bracket, FILL_VALUE};
pub use pv::{PvFields, PVU_SCALE};
pub use restart::RestartState;
pub use scalar::PvScalar;
pub use time_levels::{ModelState, TimeLevelManager};
pub use tropopause::DtSurface;
