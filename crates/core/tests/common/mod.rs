//! Shared fixtures for the integration tests: a periodic hexagonal mesh, an
//! idealized troposphere/stratosphere state and random tendencies.

#![allow(dead_code)]

use pv_budget_core::budget::{EdgeTendency, HeatingTendency};
use pv_budget_core::{Field, FieldLocation, Mesh, ModelState, PeriodicHexMesh, StepTendencies};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

pub const F0: f64 = 1.0e-4;
pub const TROPOPAUSE_HEIGHT: f64 = 9000.0;

#[ctor::ctor]
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Level mid-points every kilometre from 500 m to 13.5 km
pub fn levels() -> Vec<f64> {
    (0..14_u32).map(|k| 500.0 + 1000.0 * f64::from(k)).collect()
}

pub fn hex_builder() -> PeriodicHexMesh {
    PeriodicHexMesh::new(8, 8, 50_000.0)
        .with_levels(levels())
        .with_coriolis(F0, 0.0)
}

pub fn hex_mesh() -> Arc<Mesh> {
    Arc::new(hex_builder().build().unwrap())
}

/// θ with tropospheric stability below [`TROPOPAUSE_HEIGHT`] and stratospheric
/// stability above
pub fn theta_profile(z: f64) -> f64 {
    let troposphere = 4.0e-3 * z.min(TROPOPAUSE_HEIGHT);
    let stratosphere = 2.0e-2 * (z - TROPOPAUSE_HEIGHT).max(0.0);
    290.0 + troposphere + stratosphere
}

pub fn density_profile(z: f64) -> f64 {
    1.2 * (-z / 8000.0).exp()
}

pub fn pressure_profile(z: f64) -> f64 {
    100_000.0 * (-z / 7500.0).exp()
}

/// Horizontally uniform, resting state
pub fn resting_state(mesh: &Mesh) -> ModelState {
    let n = mesh.n_cells();
    let nl = mesh.n_levels();
    let z = mesh.z_mid();
    let mut state = ModelState::new(mesh);
    state.theta = Field::from_fn(FieldLocation::Cell, n, nl, |c, k| theta_profile(z.get(c, k)));
    state.rho = Field::from_fn(FieldLocation::Cell, n, nl, |c, k| density_profile(z.get(c, k)));
    state.pressure = Field::from_fn(FieldLocation::Cell, n, nl, |c, k| pressure_profile(z.get(c, k)));
    state
}

/// Sheared westerly flow with small random perturbations in wind and θ
pub fn perturbed_state(mesh: &Mesh, seed: u64) -> ModelState {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = resting_state(mesh);
    let nl = mesh.n_levels();
    let z = mesh.z_mid();
    state.u_edge = Field::from_fn(FieldLocation::Edge, mesh.n_edges(), nl, |e, k| {
        let zk = z.get(mesh.cells_on_edge(e)[0], k);
        let westerly = 5.0 + 2.0e-3 * zk;
        westerly * mesh.edge_normal(e).x + rng.random_range(-1.0..1.0)
    });
    for v in state.theta.as_mut_slice() {
        *v += rng.random_range(-0.3..0.3);
    }
    state
}

pub fn random_field(location: FieldLocation, n: usize, nl: usize, scale: f64, rng: &mut StdRng) -> Field {
    Field::from_fn(location, n, nl, |_, _| scale * rng.random_range(-1.0..1.0))
}

/// Random inputs for every closure category
pub fn random_tendencies(mesh: &Mesh, seed: u64) -> StepTendencies {
    let mut rng = StdRng::seed_from_u64(seed);
    let (ne, nc, nl) = (mesh.n_edges(), mesh.n_cells(), mesh.n_levels());
    let edge = |rng: &mut StdRng| EdgeTendency::new(random_field(FieldLocation::Edge, ne, nl, 1.0e-3, rng));
    let dynamics_momentum = edge(&mut rng);
    let mixing_momentum = edge(&mut rng);
    let pbl_gwd_momentum = edge(&mut rng);
    let cumulus_momentum = edge(&mut rng);
    let heating = |rng: &mut StdRng| HeatingTendency::new(random_field(FieldLocation::Cell, nc, nl, 1.0e-4, rng));
    StepTendencies {
        dynamics_momentum: Some(dynamics_momentum),
        dynamics_heating: Some(heating(&mut rng)),
        diabatic_heating: Some(heating(&mut rng)),
        mixing_momentum: Some(mixing_momentum),
        mixing_heating: Some(heating(&mut rng)),
        pbl_gwd_momentum: Some(pbl_gwd_momentum),
        cumulus_momentum: Some(cumulus_momentum),
        ..StepTendencies::default()
    }
}

/// Advance `state` by `dt` with every momentum and heating input, as the host
/// model would
pub fn apply_tendencies(state: &mut ModelState, tendencies: &StepTendencies, dt: f64) {
    let momentum = [
        &tendencies.dynamics_momentum,
        &tendencies.mixing_momentum,
        &tendencies.pbl_gwd_momentum,
        &tendencies.cumulus_momentum,
    ];
    for forcing in momentum.into_iter().flatten() {
        state.u_edge.add_scaled(forcing.field(), dt).unwrap();
    }
    let heating = [
        &tendencies.dynamics_heating,
        &tendencies.diabatic_heating,
        &tendencies.mixing_heating,
    ];
    for q in heating.into_iter().flatten() {
        state.theta.add_scaled(q.field(), dt).unwrap();
    }
}
