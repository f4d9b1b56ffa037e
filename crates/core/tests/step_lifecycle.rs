//! Snapshot/release lifecycle, configuration errors and failure isolation

mod common;

use common::{apply_tendencies, hex_mesh, perturbed_state, random_tendencies};
use pv_budget_core::{
    ConfigError, Field, FieldLocation, MicrophysicsScheme, ModelState, PvConfig, PvDiagnostics,
    PvError, Seconds, StepTendencies, TimeLevelManager,
};

#[test]
fn test_beginning_of_step_view_requires_snapshot() {
    let mesh = hex_mesh();
    let mut levels = TimeLevelManager::new(perturbed_state(&mesh, 1));
    assert_eq!(levels.beginning_of_step().unwrap_err(), PvError::SnapshotUnavailable);

    levels.snapshot().unwrap();
    levels.current_mut().theta.fill(250.0);
    let old = levels.beginning_of_step().unwrap();
    assert_ne!(old.theta.get(0, 0), 250.0);
    assert_eq!(levels.snapshot().unwrap_err(), PvError::SnapshotAlreadyHeld);

    let released = levels.release().unwrap();
    assert_eq!(released.step(), 0);
    assert_eq!(levels.step(), 1);
    assert_eq!(levels.beginning_of_step().unwrap_err(), PvError::SnapshotUnavailable);
    assert_eq!(levels.release().unwrap_err(), PvError::SnapshotUnavailable);
}

#[test]
fn test_diagnostics_compare_snapshot_with_updated_state() {
    let mesh = hex_mesh();
    let mut diag = PvDiagnostics::new(PvConfig::default().validate().unwrap(), mesh.clone()).unwrap();
    diag.initialize(perturbed_state(&mesh, 3)).unwrap();

    diag.begin_step().unwrap();
    assert_eq!(diag.begin_step().unwrap_err(), PvError::SnapshotAlreadyHeld);
    for v in diag.state_mut().theta.as_mut_slice() {
        *v += 5.0e-3 * *v;
    }
    let outputs = diag
        .end_step(Seconds::new(60.0), &StepTendencies::default())
        .unwrap();
    let (old, new) = (outputs.pv_beginning.as_ref().unwrap(), outputs.pv.as_ref().unwrap());
    assert!(old.as_slice().iter().zip(new.as_slice()).any(|(a, b)| a != b));
    assert_eq!(outputs.step, 0);

    diag.begin_step().unwrap();
    let outputs = diag
        .end_step(Seconds::new(60.0), &StepTendencies::default())
        .unwrap();
    assert_eq!(outputs.step, 1);
    assert_eq!(outputs.elapsed, Seconds::new(120.0));
}

#[test]
fn test_failed_step_leaves_accumulators_untouched() {
    let mesh = hex_mesh();
    let mut diag = PvDiagnostics::new(PvConfig::full_budget().validate().unwrap(), mesh.clone()).unwrap();
    diag.initialize(perturbed_state(&mesh, 4)).unwrap();

    let good = random_tendencies(&mesh, 5);
    diag.begin_step().unwrap();
    apply_tendencies(diag.state_mut(), &good, 60.0);
    diag.end_step(Seconds::new(60.0), &good).unwrap();
    let saved = diag.restart_state().unwrap();

    // Wrong shape sneaks in through the public field
    let mut bad = good.clone();
    bad.diabatic_heating = Some(pv_budget_core::budget::HeatingTendency::new(Field::new(
        FieldLocation::Cell,
        mesh.n_cells(),
        1,
    )));
    diag.begin_step().unwrap();
    let err = diag.end_step(Seconds::new(60.0), &bad).unwrap_err();
    assert!(matches!(err, PvError::ShapeMismatch { .. }));
    assert!(!diag.time_levels().is_holding());
    // The failed step still consumed its snapshot, so only the step counter moves
    let mut expected = saved;
    expected.step += 1;
    assert_eq!(diag.restart_state().unwrap(), expected);

    diag.begin_step().unwrap();
    assert_eq!(
        diag.end_step(Seconds::new(0.0), &good).unwrap_err(),
        PvError::InvalidTimeStep(0.0)
    );
    diag.begin_step().unwrap();
    assert!(diag.end_step(Seconds::new(60.0), &good).is_ok());
}

#[test]
fn test_pv_disabled_only_cycles_snapshots() {
    let mesh = hex_mesh();
    let config = PvConfig {
        pv_diag: false,
        ..PvConfig::default()
    };
    let mut diag = PvDiagnostics::new(config.validate().unwrap(), mesh.clone()).unwrap();
    diag.begin_step().unwrap();
    let outputs = diag
        .end_step(Seconds::new(10.0), &StepTendencies::default())
        .unwrap();
    assert!(outputs.pv.is_none());
    assert!(outputs.dt_surface.is_none());
    assert!(diag.accumulators().is_none());
    assert!(diag.pv_scalar().is_none());
}

#[test]
fn test_wrongly_shaped_state_is_rejected() {
    let mesh = hex_mesh();
    let mut diag = PvDiagnostics::new(PvConfig::default().validate().unwrap(), mesh.clone()).unwrap();
    let mut state = ModelState::new(&mesh);
    state.rho = Field::new(FieldLocation::Cell, mesh.n_cells() - 1, mesh.n_levels());
    assert!(matches!(
        diag.initialize(state),
        Err(PvError::ShapeMismatch { ref field, .. }) if field == "rho"
    ));
}

#[test]
fn test_invalid_configurations_fail_before_any_step() {
    let cases = [
        (
            PvConfig {
                pv_diag: false,
                pv_tend: true,
                ..PvConfig::default()
            },
            ConfigError::MissingPrerequisite {
                flag: "pv_tend",
                requires: "pv_diag",
            },
        ),
        (
            PvConfig {
                pv_isobaric: true,
                ..PvConfig::default()
            },
            ConfigError::MissingPrerequisite {
                flag: "pv_isobaric",
                requires: "pv_tend",
            },
        ),
        (
            PvConfig {
                pv_microphys: true,
                microphysics_scheme: MicrophysicsScheme::Thompson,
                ..PvConfig::full_budget()
            },
            ConfigError::UnsupportedMicrophysicsScheme(MicrophysicsScheme::Thompson),
        ),
    ];
    for (config, expected) in cases {
        let err = config.validate().unwrap_err();
        assert_eq!(err, expected);
        let wrapped: PvError = err.into();
        assert!(wrapped.to_string().starts_with("configuration error"));
    }
}
