//! PV budget closure and time-level attribution
//!
//! When the host advances wind and θ by exactly `dt` times the supplied
//! tendencies and leaves density unchanged, the budget categories must add up
//! to the diagnosed PV change. The only allowed imbalance comes from the
//! dynamics and mixing heating parts, which are evaluated with end-of-step
//! vorticity.

mod common;

use common::{apply_tendencies, hex_mesh, perturbed_state, random_field, random_tendencies};
use pv_budget_core::budget::{EdgeTendency, HeatingTendency};
use pv_budget_core::config::MicrophysicsScheme;
use pv_budget_core::pv::ertel_pv;
use pv_budget_core::{
    Field, FieldLocation, MeshOperators, ModelState, PvConfig, PvDiagnostics, Seconds, StepTendencies,
    TendencyBudget, TendencyCategory,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

const DT: f64 = 60.0;

fn max_abs_diff(a: &Field, b: &Field) -> f64 {
    a.as_slice()
        .iter()
        .zip(b.as_slice())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Run one full-budget step from `initial` with the host applying `tendencies`
fn run_closure_step(tendencies: &StepTendencies) -> (TendencyBudget, Field, Field) {
    let mesh = hex_mesh();
    let config = PvConfig::full_budget().validate().unwrap();
    let mut diag = PvDiagnostics::new(config, mesh.clone()).unwrap();
    diag.initialize(perturbed_state(&mesh, 11)).unwrap();

    diag.begin_step().unwrap();
    apply_tendencies(diag.state_mut(), tendencies, DT);
    let outputs = diag.end_step(Seconds::new(DT), tendencies).unwrap();
    (
        outputs.budget.clone().unwrap(),
        outputs.pv_beginning.clone().unwrap(),
        outputs.pv.clone().unwrap(),
    )
}

#[test]
fn test_budget_closes_without_end_of_step_heatings() {
    let mesh = hex_mesh();
    let mut tendencies = random_tendencies(&mesh, 3);
    tendencies.dynamics_heating = Some(HeatingTendency::new(Field::new(
        FieldLocation::Cell,
        mesh.n_cells(),
        mesh.n_levels(),
    )));
    tendencies.mixing_heating = None;

    let (budget, pv_old, pv_new) = run_closure_step(&tendencies);
    let scale = budget.closure_sum().unwrap().max_abs();
    assert!(scale > 0.0);

    let residual = budget.residual(&pv_old, &pv_new, Seconds::new(DT)).unwrap();
    assert!(
        residual.max_abs() <= 1e-9 * scale,
        "residual {} exceeds tolerance for tendency scale {}",
        residual.max_abs(),
        scale
    );
}

#[test]
fn test_end_of_step_heating_residual_is_first_order_in_dt() {
    let mesh = hex_mesh();
    let ops = MeshOperators::new(mesh.clone()).unwrap();
    let tendencies = random_tendencies(&mesh, 5);
    let (budget, pv_old, pv_new) = run_closure_step(&tendencies);
    let residual = budget.residual(&pv_old, &pv_new, Seconds::new(DT)).unwrap();

    // Expected imbalance: dt · curl(ΣF) · ∇(Q_dyn + Q_mix) / ρ
    let mut total_forcing = Field::new(FieldLocation::Edge, mesh.n_edges(), mesh.n_levels());
    for forcing in [
        &tendencies.dynamics_momentum,
        &tendencies.mixing_momentum,
        &tendencies.pbl_gwd_momentum,
        &tendencies.cumulus_momentum,
    ]
    .into_iter()
    .flatten()
    {
        total_forcing.add_scaled(forcing.field(), 1.0).unwrap();
    }
    let curl = ops.relative_vorticity(&total_forcing).unwrap();
    let mut end_of_step_heating = tendencies.dynamics_heating.as_ref().unwrap().field().clone();
    end_of_step_heating
        .add_scaled(tendencies.mixing_heating.as_ref().unwrap().field(), 1.0)
        .unwrap();
    let heating_gradient = ops.gradient(&end_of_step_heating).unwrap();
    let rho = perturbed_state(&mesh, 11).rho;
    let mut expected = ertel_pv(&curl, &heating_gradient, &rho).unwrap();
    for v in expected.as_mut_slice() {
        *v *= DT;
    }

    let scale = expected.max_abs();
    assert!(scale > 0.0);
    let error = max_abs_diff(&residual, &expected);
    assert!(
        error <= 1e-6 * scale,
        "residual differs from dt·curl(F)·∇(Q_dyn + Q_mix)/ρ by {} (scale {})",
        error,
        scale
    );
}

#[test]
fn test_microphysics_processes_sum_to_net() {
    let mesh = hex_mesh();
    let config = PvConfig {
        pv_microphys: true,
        microphysics_scheme: MicrophysicsScheme::Wsm6,
        ..PvConfig::full_budget()
    }
    .validate()
    .unwrap();
    let mut diag = PvDiagnostics::new(config, mesh.clone()).unwrap();
    diag.initialize(perturbed_state(&mesh, 2)).unwrap();

    let mut tendencies = random_tendencies(&mesh, 9);
    let mut rng = StdRng::seed_from_u64(99);
    let mut net = Field::new(FieldLocation::Cell, mesh.n_cells(), mesh.n_levels());
    for &process in TendencyCategory::MICROPHYSICS_PROCESSES {
        let q = random_field(FieldLocation::Cell, mesh.n_cells(), mesh.n_levels(), 1.0e-4, &mut rng);
        net.add_scaled(&q, 1.0).unwrap();
        tendencies
            .microphysics_processes
            .insert(process, HeatingTendency::new(q));
    }
    tendencies.microphysics_heating = Some(HeatingTendency::new(net));

    diag.begin_step().unwrap();
    let outputs = diag.end_step(Seconds::new(DT), &tendencies).unwrap();
    let budget = outputs.budget.as_ref().unwrap();
    assert_eq!(budget.categories().len(), TendencyCategory::ALL.len());

    let net_term = budget.get(TendencyCategory::MicrophysicsNet).unwrap();
    let process_sum = budget.microphysics_process_sum().unwrap();
    assert!(max_abs_diff(net_term, &process_sum) <= 1e-10 * net_term.max_abs());
}

/// Full-budget tendencies of one step from `old` to `new`
fn budget_between(old: &ModelState, new: &ModelState, tendencies: &StepTendencies) -> TendencyBudget {
    let mesh = hex_mesh();
    let config = PvConfig::full_budget().validate().unwrap();
    let mut diag = PvDiagnostics::new(config, Arc::clone(&mesh)).unwrap();
    diag.initialize(old.clone()).unwrap();
    diag.begin_step().unwrap();
    *diag.state_mut() = new.clone();
    diag.end_step(Seconds::new(DT), tendencies)
        .unwrap()
        .budget
        .clone()
        .unwrap()
}

fn assert_same(a: &TendencyBudget, b: &TendencyBudget, category: TendencyCategory) {
    assert_eq!(
        a.get(category).unwrap().as_slice(),
        b.get(category).unwrap().as_slice(),
        "{category} should not depend on the perturbed input"
    );
}

fn assert_changed(a: &TendencyBudget, b: &TendencyBudget, category: TendencyCategory) {
    let diff = max_abs_diff(a.get(category).unwrap(), b.get(category).unwrap());
    assert!(diff > 0.0, "{category} should depend on the perturbed input");
}

#[test]
fn test_heating_terms_use_beginning_of_step_vorticity() {
    let mesh = hex_mesh();
    let old = perturbed_state(&mesh, 21);
    let new = perturbed_state(&mesh, 22);
    let tendencies = random_tendencies(&mesh, 23);
    let base = budget_between(&old, &new, &tendencies);

    let mut rng = StdRng::seed_from_u64(24);
    let mut old_perturbed = old.clone();
    old_perturbed
        .u_edge
        .add_scaled(
            &random_field(FieldLocation::Edge, mesh.n_edges(), mesh.n_levels(), 2.0, &mut rng),
            1.0,
        )
        .unwrap();
    let perturbed = budget_between(&old_perturbed, &new, &tendencies);

    assert_changed(&base, &perturbed, TendencyCategory::Diabatic);
    assert_same(&base, &perturbed, TendencyCategory::Dynamics);
    assert_same(&base, &perturbed, TendencyCategory::FrictionMixing);
    assert_same(&base, &perturbed, TendencyCategory::FrictionPblGwd);
    assert_same(&base, &perturbed, TendencyCategory::FrictionCumulus);
}

#[test]
fn test_momentum_terms_use_end_of_step_theta() {
    let mesh = hex_mesh();
    let old = perturbed_state(&mesh, 31);
    let new = perturbed_state(&mesh, 32);
    let tendencies = random_tendencies(&mesh, 33);
    let base = budget_between(&old, &new, &tendencies);

    let mut rng = StdRng::seed_from_u64(34);
    let mut new_perturbed = new.clone();
    new_perturbed
        .theta
        .add_scaled(
            &random_field(FieldLocation::Cell, mesh.n_cells(), mesh.n_levels(), 1.0, &mut rng),
            1.0,
        )
        .unwrap();
    let perturbed = budget_between(&old, &new_perturbed, &tendencies);

    assert_changed(&base, &perturbed, TendencyCategory::FrictionPblGwd);
    assert_changed(&base, &perturbed, TendencyCategory::FrictionCumulus);
    assert_same(&base, &perturbed, TendencyCategory::Diabatic);
}

#[test]
fn test_density_is_taken_at_end_of_step() {
    let mesh = hex_mesh();
    let old = perturbed_state(&mesh, 41);
    let new = perturbed_state(&mesh, 42);
    let tendencies = random_tendencies(&mesh, 43);
    let base = budget_between(&old, &new, &tendencies);

    let mut old_denser = old.clone();
    for v in old_denser.rho.as_mut_slice() {
        *v *= 1.1;
    }
    let unchanged = budget_between(&old_denser, &new, &tendencies);
    for category in base.categories() {
        assert_same(&base, &unchanged, category);
    }

    let mut new_denser = new.clone();
    for v in new_denser.rho.as_mut_slice() {
        *v *= 1.1;
    }
    let changed = budget_between(&old, &new_denser, &tendencies);
    for category in base.categories() {
        assert_changed(&base, &changed, category);
    }
}

#[test]
fn test_missing_enabled_tendency_is_reported() {
    let mesh = hex_mesh();
    let config = PvConfig::full_budget().validate().unwrap();
    let mut diag = PvDiagnostics::new(config, mesh.clone()).unwrap();
    diag.initialize(perturbed_state(&mesh, 1)).unwrap();

    let mut tendencies = random_tendencies(&mesh, 2);
    tendencies.cumulus_momentum = None;
    diag.begin_step().unwrap();
    let err = diag.end_step(Seconds::new(DT), &tendencies).unwrap_err();
    assert_eq!(
        err,
        pv_budget_core::PvError::MissingTendency(TendencyCategory::FrictionCumulus)
    );

    // Mixing heating is optional for the mixing category
    tendencies.cumulus_momentum = Some(EdgeTendency::new(Field::new(
        FieldLocation::Edge,
        mesh.n_edges(),
        mesh.n_levels(),
    )));
    tendencies.mixing_heating = None;
    diag.begin_step().unwrap();
    assert!(diag.end_step(Seconds::new(DT), &tendencies).is_ok());
}
