//! Interpolation to isobaric levels and isobaric accumulation

mod common;

use common::{hex_mesh, pressure_profile, random_tendencies, resting_state, theta_profile};
use pv_budget_core::{Field, FieldLocation, Pascals, PvConfig, PvDiagnostics, Seconds, FILL_VALUE};

/// Height of pressure `p` in the exponential test atmosphere
fn height_of(p: f64) -> f64 {
    -7500.0 * (p / 100_000.0).ln()
}

#[test]
fn test_log_pressure_interpolation_is_exact_for_exponential_atmosphere() {
    let mesh = hex_mesh();
    let config = PvConfig {
        isobaric_levels: vec![
            Pascals::from_hectopascals(850.0),
            Pascals::from_hectopascals(700.0),
            Pascals::from_hectopascals(500.0),
            Pascals::from_hectopascals(250.0),
        ],
        ..PvConfig::full_budget()
    };
    let mut diag = PvDiagnostics::new(config.clone().validate().unwrap(), mesh.clone()).unwrap();
    diag.initialize(resting_state(&mesh)).unwrap();

    let tendencies = random_tendencies(&mesh, 4);
    diag.begin_step().unwrap();
    let outputs = diag.end_step(Seconds::new(60.0), &tendencies).unwrap();
    let iso = outputs.isobaric.as_ref().unwrap();
    assert_eq!(iso.out_of_range, 0);
    assert_eq!(iso.theta.n_levels(), 4);

    // ln p is linear in z, and below the 9 km stability jump so is θ
    for (l, level) in config.isobaric_levels.iter().enumerate().take(3) {
        let expected = theta_profile(height_of(**level));
        for c in 0..mesh.n_cells() {
            assert!(
                (iso.theta.get(c, l) - expected).abs() < 1e-9,
                "θ at {} in cell {}: {} vs {}",
                level,
                c,
                iso.theta.get(c, l),
                expected
            );
        }
    }
    for tendency in iso.tendencies.values() {
        assert!(tendency.as_slice().iter().all(|v| v.is_finite() && *v != FILL_VALUE));
    }
}

#[test]
fn test_levels_outside_column_are_filled_and_skipped_by_accumulators() {
    let mesh = hex_mesh();
    let top = pressure_profile(mesh.z_mid().get(0, mesh.n_levels() - 1));
    let config = PvConfig {
        // 100 hPa lies above the model top
        isobaric_levels: vec![Pascals::from_hectopascals(500.0), Pascals::new(10_000.0)],
        ..PvConfig::full_budget()
    };
    assert!(top > 10_000.0);
    let mut diag = PvDiagnostics::new(config.validate().unwrap(), mesh.clone()).unwrap();
    diag.initialize(resting_state(&mesh)).unwrap();

    let tendencies = random_tendencies(&mesh, 8);
    for _ in 0..3 {
        diag.begin_step().unwrap();
        let outputs = diag.end_step(Seconds::new(30.0), &tendencies).unwrap();
        let iso = outputs.isobaric.as_ref().unwrap();
        assert_eq!(iso.out_of_range, mesh.n_cells());
        for c in 0..mesh.n_cells() {
            assert_eq!(iso.pv.get(c, 1), FILL_VALUE);
            assert_ne!(iso.pv.get(c, 0), FILL_VALUE);
        }
    }

    let acc = diag.isobaric_accumulators().unwrap();
    assert_eq!(acc.window(), Seconds::new(90.0));
    for category in acc.categories() {
        let values: &Field = acc.get(category).unwrap().values();
        assert_eq!(values.location(), FieldLocation::Cell);
        for c in 0..mesh.n_cells() {
            // Never-valid points stay at zero instead of summing fill values
            assert_eq!(values.get(c, 1), 0.0);
        }
    }
}
