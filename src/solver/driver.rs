//! The filling driver: event-driven quasi-static time stepping.
//!
//! One step of the driver:
//! 1. drain queued inlet commands,
//! 2. assemble and solve the pressure system (Dirichlet: open inlets at
//!    their pressure, every unfilled CV at p = 0),
//! 3. recover Darcy element velocities,
//! 4. integrate upwind fluxes over the CV interfaces,
//! 5. pick the CFL time step (the fastest-filling CV reaches f = 1),
//!    clamped to the next write-out time and the interval end,
//! 6. advance fill factors, snap newly full CVs, advance the clock,
//! 7. sample sensors and record a snapshot.
//!
//! Runtime invariants are enforced every step: fill factors never
//! decrease, the time step is positive, and the pressure system stays
//! solvable. Violations latch the driver in a failed state; the recorded
//! snapshots stay accessible.

use std::collections::VecDeque;

use glam::DVec3;
use log::{debug, info, warn};
use thiserror::Error;

use crate::bcond::{BoundaryError, BoundaryStore, InletCommand};
use crate::materials::ElementProperties;
use crate::mesh::{CvError, CvMesh, SurfaceMesh};
use crate::params::{ParameterError, SimulationParameters};
use crate::sensors::SensorSet;
use crate::solution::{InletState, Solution, TimeStep};
use crate::solver::assembly::PressureAssembler;
use crate::solver::fill;
use crate::solver::pressure::{solve_pressure, PressureError, SolverBackend};
use crate::solver::sparse::CsrMatrix;
use crate::solver::velocity::VelocitySolver;

/// Tolerance on per-step fill-factor decrease before the monotonicity
/// guard trips.
const MONOTONICITY_TOL: f64 = 1e-12;

/// Error type for solver initialisation and stepping.
#[derive(Debug, Error)]
pub enum SolveError {
    /// Every inlet is closed; the fill cannot advance.
    #[error("no open inlet: cannot advance the fill")]
    NoOpenInlet,

    /// No inlet has been bound to a mesh boundary.
    #[error("no inlet has been assigned to a mesh boundary")]
    NoInletAssigned,

    /// A mesh region is not reachable from any inlet.
    #[error("mesh node {0} is not connected to any inlet")]
    InletlessRegion(usize),

    /// solve_time_interval needs a positive interval.
    #[error("time interval must be positive, got {0}")]
    InvalidInterval(f64),

    /// Open inlets supply no flux to the remaining dry region.
    #[error("flow front stalled: no resin flux reaches the remaining dry region")]
    StalledFront,

    /// The pressure system could not be solved.
    #[error("singular pressure system: {0}")]
    Singular(String),

    /// The iterative backend failed even after the direct-sparse retry.
    #[error("iterative solve failed after downgrade to direct sparse: {0}")]
    NonConvergence(String),

    /// The event-merged time step collapsed to zero or below.
    #[error("non-positive time step {0}")]
    NonPositiveDt(f64),

    /// A fill factor decreased beyond tolerance.
    #[error("fill factor of CV {cv} decreased by {amount:.3e}")]
    NonMonotoneFill { cv: usize, amount: f64 },

    /// The driver latched a fatal error on a previous call.
    #[error("driver has failed: {0}")]
    Failed(String),

    /// Invalid simulation parameters.
    #[error(transparent)]
    Parameters(#[from] ParameterError),

    /// Inlet command errors.
    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    /// Control-volume construction errors (topology).
    #[error(transparent)]
    Topology(#[from] CvError),
}

/// Slim per-step record kept for every step, independent of write-out.
#[derive(Clone, Copy, Debug)]
pub struct StepRecord {
    /// Step counter.
    pub index: usize,
    /// Time at the end of the step.
    pub time: f64,
    /// Step length.
    pub dt: f64,
    /// Volumetric rate delivered to the front [m³/s].
    pub influx: f64,
    /// Pore volume gained this step, Σ V_i Δf_i [m³].
    pub gained: f64,
    /// Whether a full snapshot was recorded.
    pub write_out: bool,
}

/// Outcome of one internal step.
enum StepOutcome {
    /// Normal step, simulation continues.
    Advanced,
    /// The step was clamped to the interval boundary.
    IntervalEnd,
    /// Every CV is full.
    Filled,
    /// No CV receives resin; nothing was mutated.
    Stalled,
}

/// The FE/CV filling driver.
///
/// Owns the mesh, the dual mesh, the material properties, the boundary
/// store, the sensors and all solution state. Constructed by
/// `initialise_solver` on the model façade.
pub struct FillDriver {
    mesh: SurfaceMesh,
    cv: CvMesh,
    boundary: BoundaryStore,
    sensors: SensorSet,
    params: SimulationParameters,
    backend: SolverBackend,
    assembler: PressureAssembler,
    vsolver: VelocitySolver,

    k: CsrMatrix,
    b: Vec<f64>,
    dirichlet: Vec<Option<f64>>,

    fill: Vec<f64>,
    time: f64,
    next_wo_time: f64,
    step_count: usize,

    /// Latest solved fields (current state).
    pressure: Vec<f64>,
    velocity: Vec<DVec3>,
    velocity_nodal: Vec<DVec3>,
    rates: Vec<f64>,

    /// Full snapshots of write-out steps.
    snapshots: Vec<TimeStep>,
    /// Slim records of every step.
    step_log: Vec<StepRecord>,

    commands: VecDeque<InletCommand>,
    failed: Option<String>,
}

impl FillDriver {
    /// Initialise the solver: build the dual mesh, verify inlet
    /// connectivity, compile the sparsity pattern and seed the initial
    /// state.
    pub fn new(
        mesh: SurfaceMesh,
        props: ElementProperties,
        boundary: BoundaryStore,
        sensors: SensorSet,
        params: SimulationParameters,
        backend: SolverBackend,
    ) -> Result<Self, SolveError> {
        params.validate()?;
        let cv = CvMesh::build(&mesh, &props)?;
        check_inlet_connectivity(&mesh, &boundary)?;

        let assembler = PressureAssembler::new(&mesh, &props, params.mu);
        let vsolver = VelocitySolver::new(&mesh, &props);
        let k = assembler.new_matrix(&mesh);
        let n = mesh.n_nodes();

        let mut sensors = sensors;
        sensors.locate(&mesh);

        info!(
            "solver initialised: {} nodes, {} elements, {} backend",
            n,
            mesh.n_elements(),
            backend
        );

        let mut driver = Self {
            b: vec![0.0; n],
            dirichlet: vec![None; n],
            fill: vec![0.0; n],
            time: 0.0,
            next_wo_time: params.wo_delta_time,
            step_count: 0,
            pressure: vec![0.0; n],
            velocity: vec![DVec3::ZERO; mesh.n_elements()],
            velocity_nodal: vec![DVec3::ZERO; n],
            rates: vec![0.0; n],
            snapshots: Vec::new(),
            step_log: Vec::new(),
            commands: VecDeque::new(),
            failed: None,
            mesh,
            cv,
            boundary,
            sensors,
            params,
            backend,
            assembler,
            vsolver,
            k,
        };
        driver.seed_initial_state();
        Ok(driver)
    }

    /// Reset to a fresh solution: t = 0, empty CVs, inlets restored to
    /// their initial pressures, sensors cleared. The mesh, materials and
    /// sparsity pattern are reused unchanged.
    pub fn reset(&mut self) {
        self.time = 0.0;
        self.next_wo_time = self.params.wo_delta_time;
        self.step_count = 0;
        self.fill.fill(0.0);
        self.pressure.fill(0.0);
        self.velocity.fill(DVec3::ZERO);
        self.velocity_nodal.fill(DVec3::ZERO);
        self.rates.fill(0.0);
        self.snapshots.clear();
        self.step_log.clear();
        self.commands.clear();
        self.failed = None;
        self.boundary.reset();
        self.sensors.reset();
        self.seed_initial_state();
    }

    /// Queue an inlet command; it is applied at the next step boundary.
    ///
    /// The inlet name is validated immediately so configuration mistakes
    /// surface at the offending call.
    pub fn queue_command(&mut self, command: InletCommand) -> Result<(), SolveError> {
        let name = match &command {
            InletCommand::ChangePressure { inlet, .. }
            | InletCommand::Open { inlet }
            | InletCommand::Close { inlet } => inlet,
        };
        if self.boundary.inlet(name).is_none() {
            return Err(BoundaryError::UnknownInlet(name.clone()).into());
        }
        self.commands.push_back(command);
        Ok(())
    }

    /// Run until the domain is fully wet.
    pub fn solve(&mut self) -> Result<Solution, SolveError> {
        self.ensure_not_failed()?;
        info!("solve started: {} elements", self.mesh.n_elements());
        loop {
            self.drain_commands()?;
            if self.n_empty_cvs() == 0 {
                break;
            }
            if !self.boundary.any_open() {
                return Err(SolveError::NoOpenInlet);
            }
            match self.step(f64::INFINITY)? {
                StepOutcome::Stalled => return Err(SolveError::StalledFront),
                StepOutcome::Filled => break,
                StepOutcome::Advanced | StepOutcome::IntervalEnd => {}
            }
        }
        info!(
            "solve completed: fill time {:.5} s in {} steps",
            self.time, self.step_count
        );
        Ok(self.pack_solution())
    }

    /// Advance the simulation by `delta` seconds (or until fully wet) and
    /// pack the write-out snapshots.
    ///
    /// At least one step is taken; the internal time step is clamped down
    /// to the interval boundary. With every inlet closed the interval is a
    /// hold phase: the clock advances, the fill stays frozen and a single
    /// snapshot is recorded at the boundary.
    pub fn solve_time_interval(&mut self, delta: f64) -> Result<Solution, SolveError> {
        self.advance_time_interval(delta)?;
        Ok(self.pack_solution())
    }

    /// [`solve_time_interval`](Self::solve_time_interval) without packing
    /// a solution (lightweight incremental solves).
    pub fn advance_time_interval(&mut self, delta: f64) -> Result<(), SolveError> {
        self.ensure_not_failed()?;
        if !(delta > 0.0 && delta.is_finite()) {
            return Err(SolveError::InvalidInterval(delta));
        }
        let step_end = self.time + delta;
        loop {
            self.drain_commands()?;
            if self.n_empty_cvs() == 0 {
                break;
            }
            if !self.boundary.any_open() {
                self.hold_step(step_end);
                break;
            }
            match self.step(step_end)? {
                StepOutcome::Advanced => {}
                StepOutcome::IntervalEnd | StepOutcome::Filled => break,
                StepOutcome::Stalled => {
                    self.hold_step(step_end);
                    break;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stepping internals
    // ------------------------------------------------------------------

    /// One filling step. Preconditions: commands drained, at least one
    /// open inlet, at least one empty CV.
    fn step(&mut self, step_end: f64) -> Result<StepOutcome, SolveError> {
        // Dirichlet rows: p = 0 on every unfilled CV, inlet pressure on
        // open inlet nodes.
        for (i, slot) in self.dirichlet.iter_mut().enumerate() {
            *slot = if self.fill[i] < 1.0 { Some(0.0) } else { None };
        }
        for (node, pressure) in self.boundary.open_dirichlet_nodes() {
            self.dirichlet[node] = Some(pressure);
        }

        self.assembler
            .assemble(&self.mesh, &self.dirichlet, &mut self.k, &mut self.b);
        self.pressure = self.solve_pressure_with_downgrade()?;

        self.vsolver.element_velocities(
            &self.mesh,
            &self.pressure,
            self.params.mu,
            &mut self.velocity,
        );
        self.vsolver
            .nodal_velocities(&self.mesh, &self.velocity, &mut self.velocity_nodal);

        self.cv
            .net_inflow_rates(&self.velocity, &self.fill, &mut self.rates);

        let Some(dt_cfl) = fill::min_fill_time(&self.fill, &self.cv.volumes, &self.rates) else {
            return Ok(StepOutcome::Stalled);
        };

        // Event merging: clamp to the earliest of the CFL step, the next
        // write-out time and the interval end.
        let mut dt = dt_cfl;
        let mut write_out = self.params.wo_delta_time <= 0.0;
        let mut interval_end = false;
        if step_end.is_finite() && self.time + dt >= step_end {
            dt = step_end - self.time;
            write_out = true;
            interval_end = true;
        }
        if self.params.wo_delta_time > 0.0 && self.time + dt > self.next_wo_time {
            dt = self.next_wo_time - self.time;
            write_out = true;
            interval_end = false;
        }
        if !(dt > 0.0) {
            return Err(self.fail(SolveError::NonPositiveDt(dt)));
        }

        let influx = fill::front_influx(&self.fill, &self.rates);
        let fill_before = self.fill.clone();
        let gained = fill::advance(
            &mut self.fill,
            &self.cv.volumes,
            &self.rates,
            dt,
            self.params.wet_threshold(),
        );
        for i in 0..self.fill.len() {
            let drop = fill_before[i] - self.fill[i];
            if drop > MONOTONICITY_TOL {
                return Err(self.fail(SolveError::NonMonotoneFill {
                    cv: i,
                    amount: drop,
                }));
            }
        }

        self.time += dt;
        while self.params.wo_delta_time > 0.0 && self.next_wo_time <= self.time {
            self.next_wo_time += self.params.wo_delta_time;
        }

        let triggered = self.sensors.sample(
            &self.mesh,
            self.time,
            &self.pressure,
            &self.velocity_nodal,
            &self.fill,
            self.params.wet_threshold(),
        );
        if triggered {
            debug!("sensor triggered at t = {:.5} s", self.time);
            if self.params.end_step_when_sensor_triggered {
                write_out = true;
                interval_end = true;
            }
        }

        self.step_count += 1;
        self.record_step(dt, influx, gained, write_out);

        if self.n_empty_cvs() == 0 {
            Ok(StepOutcome::Filled)
        } else if interval_end {
            Ok(StepOutcome::IntervalEnd)
        } else {
            Ok(StepOutcome::Advanced)
        }
    }

    /// Hold phase: no resin moves (all inlets closed, or the front is cut
    /// off). The clock jumps to the interval boundary and one snapshot is
    /// recorded with the fill frozen and a quiescent pressure field.
    fn hold_step(&mut self, step_end: f64) {
        let dt = step_end - self.time;
        if !(dt > 0.0) {
            return;
        }
        self.pressure.fill(0.0);
        self.velocity.fill(DVec3::ZERO);
        self.velocity_nodal.fill(DVec3::ZERO);
        self.time = step_end;
        while self.params.wo_delta_time > 0.0 && self.next_wo_time <= self.time {
            self.next_wo_time += self.params.wo_delta_time;
        }
        self.sensors.sample(
            &self.mesh,
            self.time,
            &self.pressure,
            &self.velocity_nodal,
            &self.fill,
            self.params.wet_threshold(),
        );
        self.step_count += 1;
        self.record_step(dt, 0.0, 0.0, true);
    }

    fn solve_pressure_with_downgrade(&mut self) -> Result<Vec<f64>, SolveError> {
        match solve_pressure(self.backend, &self.k, &self.b) {
            Ok(p) => Ok(p),
            Err(PressureError::NonConvergence {
                iterations,
                residual,
            }) if self.backend == SolverBackend::IterativeCg => {
                warn!(
                    "CG did not converge in {iterations} iterations (residual {residual:.3e}); \
                     downgrading to the sparse direct backend"
                );
                self.backend = SolverBackend::DirectSparse;
                match solve_pressure(self.backend, &self.k, &self.b) {
                    Ok(p) => Ok(p),
                    Err(err) => Err(self.fail(SolveError::NonConvergence(err.to_string()))),
                }
            }
            Err(PressureError::NonConvergence {
                iterations,
                residual,
            }) => Err(self.fail(SolveError::NonConvergence(format!(
                "{iterations} iterations, residual {residual:.3e}"
            )))),
            Err(PressureError::Singular(message)) => {
                Err(self.fail(SolveError::Singular(message)))
            }
        }
    }

    fn drain_commands(&mut self) -> Result<(), SolveError> {
        while let Some(command) = self.commands.pop_front() {
            self.boundary.apply(&command)?;
        }
        Ok(())
    }

    fn seed_initial_state(&mut self) {
        for (node, _) in self.boundary.open_dirichlet_nodes() {
            self.fill[node] = 1.0;
        }
        for (node, pressure) in self.boundary.open_dirichlet_nodes() {
            self.pressure[node] = pressure;
        }
        self.sensors.sample(
            &self.mesh,
            0.0,
            &self.pressure,
            &self.velocity_nodal,
            &self.fill,
            self.params.wet_threshold(),
        );
        self.record_step(0.0, 0.0, 0.0, true);
    }

    /// Record the slim step log entry and, when flagged, a full snapshot
    /// of the current state.
    fn record_step(&mut self, dt: f64, influx: f64, gained: f64, write_out: bool) {
        self.step_log.push(StepRecord {
            index: self.step_count,
            time: self.time,
            dt,
            influx,
            gained,
            write_out,
        });
        if write_out {
            let snapshot = self.current_snapshot(dt, influx);
            self.snapshots.push(snapshot);
        }
    }

    fn current_snapshot(&self, dt: f64, influx: f64) -> TimeStep {
        TimeStep {
            index: self.step_count,
            time: self.time,
            dt,
            pressure: self.pressure.clone(),
            velocity: self.velocity.clone(),
            velocity_nodal: self.velocity_nodal.clone(),
            fill_factor: self.fill.clone(),
            free_surface: fill::free_surface(&self.fill),
            inlets: self
                .boundary
                .inlets()
                .iter()
                .map(|i| InletState {
                    name: i.name.clone(),
                    pressure: i.pressure,
                    open: i.open,
                })
                .collect(),
            inlet_influx: influx,
            write_out: true,
        }
    }

    /// Pack all write-out snapshots. The final state is always included:
    /// when the last step was not flagged for write-out, a snapshot of the
    /// current state is appended first.
    pub fn pack_solution(&mut self) -> Solution {
        let pending = self
            .step_log
            .last()
            .filter(|record| !record.write_out)
            .map(|record| (record.dt, record.influx));
        if let Some((dt, influx)) = pending {
            let snapshot = self.current_snapshot(dt, influx);
            self.snapshots.push(snapshot);
            if let Some(record) = self.step_log.last_mut() {
                record.write_out = true;
            }
        }
        Solution {
            steps: self.snapshots.clone(),
        }
    }

    fn ensure_not_failed(&self) -> Result<(), SolveError> {
        match &self.failed {
            Some(message) => Err(SolveError::Failed(message.clone())),
            None => Ok(()),
        }
    }

    /// Latch the failed state and pass the error through.
    fn fail(&mut self, error: SolveError) -> SolveError {
        self.failed = Some(error.to_string());
        error
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current simulation time [s].
    pub fn current_time(&self) -> f64 {
        self.time
    }

    /// Number of CVs that are not yet full.
    pub fn n_empty_cvs(&self) -> usize {
        self.fill.iter().filter(|&&f| f < 1.0).count()
    }

    /// Current fill factors.
    pub fn fill_factors(&self) -> &[f64] {
        &self.fill
    }

    /// Net CV inflow rates computed in the latest step (diagnostics).
    pub fn inflow_rates(&self) -> &[f64] {
        &self.rates
    }

    /// The assembled stiffness matrix (state of the latest step).
    pub fn stiffness(&self) -> &CsrMatrix {
        &self.k
    }

    /// The active solver backend (reflects any downgrade).
    pub fn backend(&self) -> SolverBackend {
        self.backend
    }

    /// Whether the driver has latched a fatal error.
    pub fn has_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Slim per-step records.
    pub fn step_log(&self) -> &[StepRecord] {
        &self.step_log
    }

    /// The surface mesh.
    pub fn mesh(&self) -> &SurfaceMesh {
        &self.mesh
    }

    /// The control-volume mesh.
    pub fn cv_mesh(&self) -> &CvMesh {
        &self.cv
    }

    /// The boundary store (current inlet states).
    pub fn boundary(&self) -> &BoundaryStore {
        &self.boundary
    }

    /// The sensor set with cached locations and histories.
    pub fn sensors(&self) -> &SensorSet {
        &self.sensors
    }
}

/// Every node must be reachable from some assigned inlet through the mesh
/// adjacency, otherwise a region could never fill and the pressure system
/// would lose definiteness once the reachable part is wet.
fn check_inlet_connectivity(mesh: &SurfaceMesh, boundary: &BoundaryStore) -> Result<(), SolveError> {
    let n = mesh.n_nodes();
    let mut visited = vec![false; n];
    let mut queue: VecDeque<usize> = VecDeque::new();
    for node in boundary.all_inlet_nodes() {
        if !visited[node] {
            visited[node] = true;
            queue.push_back(node);
        }
    }
    if queue.is_empty() {
        return Err(SolveError::NoInletAssigned);
    }
    while let Some(node) = queue.pop_front() {
        for &next in &mesh.node_neighbors[node] {
            if !visited[next] {
                visited[next] = true;
                queue.push_back(next);
            }
        }
    }
    match visited.iter().position(|&v| !v) {
        Some(node) => Err(SolveError::InletlessRegion(node)),
        None => Ok(()),
    }
}
