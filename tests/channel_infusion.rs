//! Integration tests: 1D channel infusion on the 1 × 0.5 m rectangle.
//!
//! With an isotropic permeability k, inlet pressure p on the left edge and
//! a dry domain ahead of the front, the flow front obeys
//!
//! ```text
//! x_front(t) = sqrt(2 k p t / (μ φ))
//! ```
//!
//! so with k = 1e-10 m², p = 1e5 Pa, μ = 0.1 Pa·s, φ = 0.5 the front
//! passes x = 0.346 m at t = 300 s and the 1 m channel fills completely
//! at t = 2500 s.

use lizzy::{
    LizzyError, LizzyModel, MeshData, PressureMode, SimulationParameters, SolveError,
    SolverBackend,
};

const NX: usize = 80;
const NY: usize = 6;
const POROSITY: f64 = 0.5;
const THICKNESS: f64 = 1.0;
const HEIGHT: f64 = 0.5;

fn channel_model(wo_delta_time: f64) -> LizzyModel {
    let mut model = LizzyModel::new();
    model
        .load_mesh_data(MeshData::rectangle(1.0, HEIGHT, NX, NY))
        .unwrap();
    model
        .assign_simulation_parameters(SimulationParameters {
            mu: 0.1,
            wo_delta_time,
            fill_tolerance: 0.0,
            end_step_when_sensor_triggered: false,
        })
        .unwrap();
    model
        .create_material("glass_mat", (1e-10, 1e-10, 1e-10), POROSITY, THICKNESS)
        .unwrap();
    model.assign_material("glass_mat", "domain", None).unwrap();
    model.create_inlet(1e5, "inlet").unwrap();
    model.assign_inlet("inlet", "left_edge").unwrap();
    model
}

/// Front position from the filled pore volume: the channel cross-section
/// holds φ·h·height of pore volume per metre.
fn front_position(model: &LizzyModel) -> f64 {
    let driver = model.driver().unwrap();
    let volumes = &driver.cv_mesh().volumes;
    let filled: f64 = driver
        .fill_factors()
        .iter()
        .zip(volumes)
        .map(|(f, v)| f * v)
        .sum();
    filled / (POROSITY * THICKNESS * HEIGHT)
}

#[test]
fn channel_front_follows_square_root_law() {
    let mut model = channel_model(1000.0);
    model.initialise_solver(SolverBackend::DirectSparse).unwrap();

    model.solve_time_interval(300.0).unwrap();
    let x_front = front_position(&model);
    let expected = (2.0 * 1e-10 * 1e5 * 300.0 / (0.1 * POROSITY)).sqrt();
    assert!(
        (x_front - expected).abs() / expected < 0.05,
        "front at {x_front:.4} m, expected {expected:.4} m"
    );
}

#[test]
fn channel_fill_time_matches_analytic() {
    let mut model = channel_model(1000.0);
    model.initialise_solver(SolverBackend::DirectSparse).unwrap();

    let solution = model.solve().unwrap();
    let fill_time = solution.last_time().unwrap();
    assert!(
        (fill_time - 2500.0).abs() / 2500.0 < 0.02,
        "fill time {fill_time:.1} s"
    );
    assert_eq!(model.n_empty_cvs(), Some(0));
}

#[test]
fn dynamic_inlet_pressure_slows_front() {
    let mut model = channel_model(1000.0);
    model.initialise_solver(SolverBackend::DirectSparse).unwrap();

    model.solve_time_interval(300.0).unwrap();
    model
        .change_inlet_pressure("inlet", -6e4, PressureMode::Delta)
        .unwrap();
    model.solve_time_interval(800.0).unwrap();

    // Piecewise Darcy advance: x² grows at 2kp/(μφ) per unit time, with
    // p = 1e5 for 300 s and 4e4 afterwards.
    let x_front = front_position(&model);
    let expected = (4.0e-4 * 300.0 + 0.4 * 4.0e-4 * 800.0_f64).sqrt();
    assert!(
        (x_front - expected).abs() / expected < 0.05,
        "front at {x_front:.4} m, expected {expected:.4} m"
    );
}

#[test]
fn closed_inlet_holds_the_fill() {
    let mut model = channel_model(100.0);
    model.initialise_solver(SolverBackend::DirectSparse).unwrap();

    model.solve_time_interval(150.0).unwrap();
    let time_before = model.current_time();
    let fill_before = model.driver().unwrap().fill_factors().to_vec();
    let snapshots_before = model
        .driver()
        .unwrap()
        .step_log()
        .iter()
        .filter(|r| r.write_out)
        .count();

    model.close_inlet("inlet").unwrap();
    model.solve_time_interval(400.0).unwrap();

    assert!((model.current_time() - (time_before + 400.0)).abs() < 1e-9);
    assert_eq!(
        model.driver().unwrap().fill_factors(),
        fill_before.as_slice()
    );
    // The hold phase records exactly one snapshot, at the interval end.
    let snapshots_after = model
        .driver()
        .unwrap()
        .step_log()
        .iter()
        .filter(|r| r.write_out)
        .count();
    assert_eq!(snapshots_after, snapshots_before + 1);

    // Reopening resumes the fill at the held pressure.
    model.open_inlet("inlet").unwrap();
    model.solve_time_interval(100.0).unwrap();
    assert!(front_position(&model) > front_position_of(&fill_before, &model));
}

fn front_position_of(fill: &[f64], model: &LizzyModel) -> f64 {
    let volumes = &model.driver().unwrap().cv_mesh().volumes;
    let filled: f64 = fill.iter().zip(volumes).map(|(f, v)| f * v).sum();
    filled / (POROSITY * THICKNESS * HEIGHT)
}

#[test]
fn all_inlets_closed_refuses_to_solve() {
    let mut model = channel_model(-1.0);
    model.initialise_solver(SolverBackend::DirectSparse).unwrap();
    let fill_before = model.driver().unwrap().fill_factors().to_vec();

    model.close_inlet("inlet").unwrap();
    let err = model.solve().unwrap_err();
    assert!(matches!(
        err,
        LizzyError::Solve(SolveError::NoOpenInlet)
    ));
    assert_eq!(
        model.driver().unwrap().fill_factors(),
        fill_before.as_slice()
    );
}

#[test]
fn interval_splitting_is_idempotent() {
    let mut split = channel_model(1000.0);
    split.initialise_solver(SolverBackend::DirectSparse).unwrap();
    split.solve_time_interval(120.0).unwrap();
    split.solve_time_interval(180.0).unwrap();

    let mut whole = channel_model(1000.0);
    whole.initialise_solver(SolverBackend::DirectSparse).unwrap();
    whole.solve_time_interval(300.0).unwrap();

    let fill_split = split.driver().unwrap().fill_factors();
    let fill_whole = whole.driver().unwrap().fill_factors();
    for (a, b) in fill_split.iter().zip(fill_whole) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn backends_agree_on_the_pressure_field() {
    let backends = [
        SolverBackend::DirectDense,
        SolverBackend::DirectSparse,
        SolverBackend::IterativeCg,
    ];
    let mut fields = Vec::new();
    for backend in backends {
        let mut model = channel_model(-1.0);
        model.initialise_solver(backend).unwrap();
        // A short interval: a single clamped step on this mesh.
        let solution = model.solve_time_interval(0.1).unwrap();
        fields.push(solution.last().unwrap().pressure.clone());
    }
    let reference = &fields[0];
    for field in &fields[1..] {
        for (a, b) in reference.iter().zip(field) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }
}

#[test]
fn stiffness_matrix_is_symmetric() {
    let mut model = channel_model(-1.0);
    model.initialise_solver(SolverBackend::DirectSparse).unwrap();
    model.solve_time_interval(50.0).unwrap();
    let k = model.driver().unwrap().stiffness();
    assert!(k.max_asymmetry() <= 1e-12 * k.max_abs());
}

#[test]
fn wet_interior_cvs_are_stationary() {
    // Fully saturated CVs away from the inlet neither gain nor lose
    // resin: the FE flux balance at their free nodes is zero, so the CV
    // net rate vanishes to machine precision.
    let mut model = channel_model(1000.0);
    model.initialise_solver(SolverBackend::DirectSparse).unwrap();
    model.solve_time_interval(400.0).unwrap();

    let driver = model.driver().unwrap();
    let mesh = driver.mesh();
    let inlet_nodes = &mesh.boundaries["left_edge"];
    let fill = driver.fill_factors();
    let rates = driver.inflow_rates();
    let max_rate = rates.iter().fold(0.0f64, |m, r| m.max(r.abs()));
    assert!(max_rate > 0.0);

    for i in 0..fill.len() {
        if fill[i] < 1.0 || inlet_nodes.contains(&i) {
            continue;
        }
        let touches_inlet = mesh.node_neighbors[i]
            .iter()
            .any(|n| inlet_nodes.contains(n));
        if touches_inlet {
            continue;
        }
        // Wet interior CVs that still border the front carry the balance
        // of inflow and outflow; fully interior ones are exactly neutral.
        let interior = mesh.node_neighbors[i].iter().all(|&n| fill[n] >= 1.0);
        if interior {
            assert!(
                rates[i].abs() <= 1e-9 * max_rate,
                "wet interior CV {i} has net rate {:.3e}",
                rates[i]
            );
        }
    }
}

#[test]
fn mass_is_conserved_every_step() {
    let mut model = channel_model(1000.0);
    model.initialise_solver(SolverBackend::DirectSparse).unwrap();
    model.solve_time_interval(500.0).unwrap();

    for record in model.driver().unwrap().step_log().iter().skip(1) {
        let expected = record.dt * record.influx;
        assert!(
            (record.gained - expected).abs() <= 1e-9 * expected.max(1e-30),
            "step {}: gained {:.6e}, expected {:.6e}",
            record.index,
            record.gained,
            expected
        );
    }
}
