//! The user-facing model façade.
//!
//! A [`LizzyModel`] maps the scripting surface onto the narrow components
//! of the engine. A session follows the order:
//!
//! 1. [`read_mesh`](LizzyModel::read_mesh)
//! 2. [`assign_simulation_parameters`](LizzyModel::assign_simulation_parameters)
//! 3. [`create_material`](LizzyModel::create_material) /
//!    [`assign_material`](LizzyModel::assign_material)
//! 4. [`create_inlet`](LizzyModel::create_inlet) /
//!    [`assign_inlet`](LizzyModel::assign_inlet)
//! 5. [`create_sensor`](LizzyModel::create_sensor)
//! 6. [`initialise_solver`](LizzyModel::initialise_solver)
//! 7. [`solve`](LizzyModel::solve) or
//!    [`solve_time_interval`](LizzyModel::solve_time_interval), with inlet
//!    mutations in between
//! 8. [`save_results`](LizzyModel::save_results)
//!
//! Configuration errors surface at the offending call. After
//! initialisation the stores move into the [`FillDriver`]; the only
//! permitted mutations are inlet commands (queued, applied at step
//! boundaries) and sensor queries.

use std::path::{Path, PathBuf};

use glam::DVec3;
use thiserror::Error;

use crate::bcond::{BoundaryError, BoundaryStore, InletCommand, PressureMode};
use crate::io::{ResultsWriter, VtkError};
use crate::materials::{MaterialError, MaterialStore, PorousMaterial, Rosette};
use crate::mesh::{read_msh_file, MeshData, MeshError, MshError, SurfaceMesh};
use crate::params::{ParameterError, SimulationParameters};
use crate::sensors::{Sensor, SensorSet};
use crate::solution::Solution;
use crate::solver::{FillDriver, SolveError, SolverBackend};

/// Top-level error type of the model façade.
#[derive(Debug, Error)]
pub enum LizzyError {
    /// An operation needed a mesh before one was read.
    #[error("no mesh has been read; call read_mesh first")]
    MeshNotLoaded,

    /// An operation needed an initialised solver.
    #[error("solver is not initialised; call initialise_solver first")]
    SolverNotInitialised,

    /// Pre-init configuration was attempted after initialisation.
    #[error("solver is already initialised; use initialise_new_solution to re-run")]
    AlreadyInitialised,

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    MeshFile(#[from] MshError),

    #[error(transparent)]
    Material(#[from] MaterialError),

    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error(transparent)]
    Parameters(#[from] ParameterError),

    #[error(transparent)]
    Solve(#[from] SolveError),

    #[error(transparent)]
    Output(#[from] VtkError),
}

/// A complete simulation model.
#[derive(Default)]
pub struct LizzyModel {
    mesh: Option<SurfaceMesh>,
    params: SimulationParameters,
    materials: MaterialStore,
    boundary: BoundaryStore,
    sensors: SensorSet,
    driver: Option<FillDriver>,
    /// Opaque flag: when set, incremental solves skip packing a solution.
    /// The driver itself never interprets it.
    pub lightweight: bool,
}

impl LizzyModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a Gmsh MSH 4.1 ASCII mesh file.
    pub fn read_mesh(&mut self, path: impl AsRef<Path>) -> Result<(), LizzyError> {
        let data = read_msh_file(path.as_ref())?;
        self.load_mesh_data(data)
    }

    /// Load raw mesh data directly (generated meshes, tests).
    pub fn load_mesh_data(&mut self, data: MeshData) -> Result<(), LizzyError> {
        if self.driver.is_some() {
            return Err(LizzyError::AlreadyInitialised);
        }
        self.mesh = Some(SurfaceMesh::from_data(data)?);
        Ok(())
    }

    /// Set the simulation parameters (validated immediately).
    pub fn assign_simulation_parameters(
        &mut self,
        params: SimulationParameters,
    ) -> Result<(), LizzyError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Create a named porous material.
    pub fn create_material(
        &mut self,
        name: &str,
        k_principal: (f64, f64, f64),
        porosity: f64,
        thickness: f64,
    ) -> Result<(), LizzyError> {
        self.materials
            .create_material(name, k_principal, porosity, thickness)?;
        Ok(())
    }

    /// Assign a material to a named mesh domain, with an optional rosette.
    pub fn assign_material(
        &mut self,
        material_name: &str,
        domain_name: &str,
        rosette: Option<Rosette>,
    ) -> Result<(), LizzyError> {
        if self.driver.is_some() {
            return Err(LizzyError::AlreadyInitialised);
        }
        self.materials
            .assign_material(material_name, domain_name, rosette)?;
        Ok(())
    }

    /// Create a named pressure inlet.
    pub fn create_inlet(&mut self, pressure: f64, name: &str) -> Result<(), LizzyError> {
        if self.driver.is_some() {
            return Err(LizzyError::AlreadyInitialised);
        }
        self.boundary.create_inlet(pressure, name)?;
        Ok(())
    }

    /// Bind an inlet to a named mesh boundary.
    pub fn assign_inlet(&mut self, inlet_name: &str, boundary_name: &str) -> Result<(), LizzyError> {
        if self.driver.is_some() {
            return Err(LizzyError::AlreadyInitialised);
        }
        let mesh = self.mesh.as_ref().ok_or(LizzyError::MeshNotLoaded)?;
        self.boundary.assign_inlet(inlet_name, boundary_name, mesh)?;
        Ok(())
    }

    /// Create a sensor at a position; returns its id.
    pub fn create_sensor(&mut self, x: f64, y: f64, z: f64) -> usize {
        self.sensors.add_sensor(DVec3::new(x, y, z))
    }

    /// Freeze the configuration and build the filling driver: resolves
    /// materials per element, builds the control volumes, compiles the
    /// sparsity pattern and seeds the initial state.
    pub fn initialise_solver(&mut self, backend: SolverBackend) -> Result<(), LizzyError> {
        if self.driver.is_some() {
            return Err(LizzyError::AlreadyInitialised);
        }
        let mesh = self.mesh.take().ok_or(LizzyError::MeshNotLoaded)?;
        let props = match self.materials.resolve(&mesh) {
            Ok(props) => props,
            Err(err) => {
                // Keep the mesh so configuration can be fixed and retried.
                self.mesh = Some(mesh);
                return Err(err.into());
            }
        };
        let boundary = std::mem::take(&mut self.boundary);
        let sensors = std::mem::take(&mut self.sensors);
        match FillDriver::new(mesh, props, boundary, sensors, self.params, backend) {
            Ok(driver) => {
                self.driver = Some(driver);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Run until the domain is fully wet.
    pub fn solve(&mut self) -> Result<Solution, LizzyError> {
        Ok(self.driver_mut()?.solve()?)
    }

    /// Advance the simulation by `delta` seconds. With the `lightweight`
    /// flag set, no solution is packed and an empty one is returned.
    pub fn solve_time_interval(&mut self, delta: f64) -> Result<Solution, LizzyError> {
        let lightweight = self.lightweight;
        let driver = self.driver_mut()?;
        if lightweight {
            driver.advance_time_interval(delta)?;
            Ok(Solution::default())
        } else {
            Ok(driver.solve_time_interval(delta)?)
        }
    }

    /// Alias of [`solve_time_interval`](Self::solve_time_interval), kept
    /// for parity with the scripted interface.
    pub fn solve_step(&mut self, delta: f64) -> Result<Solution, LizzyError> {
        self.solve_time_interval(delta)
    }

    /// Reset to a fresh solution at t = 0, reusing the initialised solver.
    pub fn initialise_new_solution(&mut self) -> Result<(), LizzyError> {
        self.driver_mut()?.reset();
        Ok(())
    }

    /// Change an inlet pressure; applied at the next step boundary.
    pub fn change_inlet_pressure(
        &mut self,
        inlet_name: &str,
        value: f64,
        mode: PressureMode,
    ) -> Result<(), LizzyError> {
        self.queue_inlet_command(InletCommand::ChangePressure {
            inlet: inlet_name.to_string(),
            value,
            mode,
        })
    }

    /// Re-open an inlet at its last assigned pressure.
    pub fn open_inlet(&mut self, inlet_name: &str) -> Result<(), LizzyError> {
        self.queue_inlet_command(InletCommand::Open {
            inlet: inlet_name.to_string(),
        })
    }

    /// Close an inlet; its nodes become walls.
    pub fn close_inlet(&mut self, inlet_name: &str) -> Result<(), LizzyError> {
        self.queue_inlet_command(InletCommand::Close {
            inlet: inlet_name.to_string(),
        })
    }

    /// Write a solution to `results/<case_name>/` as a VTU series.
    pub fn save_results(
        &self,
        solution: &Solution,
        case_name: &str,
    ) -> Result<PathBuf, LizzyError> {
        let mesh = self.mesh_ref()?;
        Ok(ResultsWriter::new(mesh).save_results(solution, case_name)?)
    }

    /// Write a solution under a caller-chosen root directory.
    pub fn save_results_in(
        &self,
        solution: &Solution,
        case_name: &str,
        root: impl AsRef<Path>,
    ) -> Result<PathBuf, LizzyError> {
        let mesh = self.mesh_ref()?;
        Ok(ResultsWriter::new(mesh).save_results_in(solution, case_name, root.as_ref())?)
    }

    /// Write the control-volume wireframe companion.
    pub fn save_cv_mesh(&self, path: impl AsRef<Path>) -> Result<(), LizzyError> {
        let driver = self.driver.as_ref().ok_or(LizzyError::SolverNotInitialised)?;
        Ok(ResultsWriter::new(driver.mesh()).write_cv_mesh(driver.cv_mesh(), path.as_ref())?)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current simulation time [s].
    pub fn current_time(&self) -> f64 {
        self.driver.as_ref().map_or(0.0, |d| d.current_time())
    }

    /// Number of CVs that are not yet full (the whole mesh before
    /// initialisation).
    pub fn n_empty_cvs(&self) -> Option<usize> {
        self.driver.as_ref().map(|d| d.n_empty_cvs())
    }

    /// The sensors with their histories and trigger times.
    pub fn sensor_readings(&self) -> &[Sensor] {
        match &self.driver {
            Some(driver) => driver.sensors().sensors(),
            None => self.sensors.sensors(),
        }
    }

    /// Look up a material by name.
    pub fn material(&self, name: &str) -> Option<&PorousMaterial> {
        self.materials.material(name)
    }

    /// The driver, if initialised (advanced inspection).
    pub fn driver(&self) -> Option<&FillDriver> {
        self.driver.as_ref()
    }

    fn driver_mut(&mut self) -> Result<&mut FillDriver, LizzyError> {
        self.driver.as_mut().ok_or(LizzyError::SolverNotInitialised)
    }

    fn mesh_ref(&self) -> Result<&SurfaceMesh, LizzyError> {
        if let Some(mesh) = &self.mesh {
            return Ok(mesh);
        }
        self.driver
            .as_ref()
            .map(|d| d.mesh())
            .ok_or(LizzyError::MeshNotLoaded)
    }

    fn queue_inlet_command(&mut self, command: InletCommand) -> Result<(), LizzyError> {
        match &mut self.driver {
            Some(driver) => Ok(driver.queue_command(command)?),
            // Pre-init mutations apply directly; the driver re-reads the
            // store at initialisation.
            None => Ok(self.boundary.apply(&command)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolverBackend;
    use tempfile::TempDir;

    fn configured_model() -> LizzyModel {
        let mut model = LizzyModel::new();
        model
            .load_mesh_data(MeshData::rectangle(1.0, 0.5, 6, 3))
            .unwrap();
        model
            .assign_simulation_parameters(SimulationParameters {
                mu: 0.1,
                wo_delta_time: 500.0,
                fill_tolerance: 0.0,
                end_step_when_sensor_triggered: false,
            })
            .unwrap();
        model
            .create_material("glass_mat", (1e-10, 1e-10, 1e-10), 0.5, 1.0)
            .unwrap();
        model.assign_material("glass_mat", "domain", None).unwrap();
        model.create_inlet(1e5, "inlet").unwrap();
        model.assign_inlet("inlet", "left_edge").unwrap();
        model
    }

    #[test]
    fn test_full_session() {
        let mut model = configured_model();
        model.create_sensor(0.5, 0.25, 0.0);
        model.initialise_solver(SolverBackend::DirectSparse).unwrap();

        let solution = model.solve().unwrap();
        assert_eq!(model.n_empty_cvs(), Some(0));
        assert!(solution.n_steps() > 1);
        assert!(model.sensor_readings()[0].trigger_time.is_some());

        let dir = TempDir::new().unwrap();
        let case_dir = model
            .save_results_in(&solution, "channel", dir.path())
            .unwrap();
        assert!(case_dir.join("channel_RES_0.vtu").is_file());
        model.save_cv_mesh(dir.path().join("cv.vtp")).unwrap();
    }

    #[test]
    fn test_call_order_is_enforced() {
        let mut model = LizzyModel::new();
        assert!(matches!(
            model.assign_inlet("inlet", "left_edge"),
            Err(LizzyError::MeshNotLoaded)
        ));
        assert!(matches!(
            model.solve(),
            Err(LizzyError::SolverNotInitialised)
        ));

        let mut model = configured_model();
        model.initialise_solver(SolverBackend::DirectSparse).unwrap();
        assert!(matches!(
            model.create_inlet(1e5, "late"),
            Err(LizzyError::AlreadyInitialised)
        ));
        assert!(matches!(
            model.initialise_solver(SolverBackend::DirectSparse),
            Err(LizzyError::AlreadyInitialised)
        ));
    }

    #[test]
    fn test_unassigned_material_fails_at_init() {
        let mut model = LizzyModel::new();
        model
            .load_mesh_data(MeshData::rectangle(1.0, 0.5, 2, 1))
            .unwrap();
        model.create_inlet(1e5, "inlet").unwrap();
        model.assign_inlet("inlet", "left_edge").unwrap();
        assert!(matches!(
            model.initialise_solver(SolverBackend::DirectSparse),
            Err(LizzyError::Material(MaterialError::UnassignedElement(_)))
        ));
        // The mesh is retained: fixing the configuration allows a retry.
        model
            .create_material("m", (1e-10, 1e-10, 1e-10), 0.5, 1.0)
            .unwrap();
        model.assign_material("m", "domain", None).unwrap();
        model.initialise_solver(SolverBackend::DirectSparse).unwrap();
    }

    #[test]
    fn test_lightweight_returns_empty_solution() {
        let mut model = configured_model();
        model.initialise_solver(SolverBackend::DirectSparse).unwrap();
        model.lightweight = true;
        let solution = model.solve_time_interval(50.0).unwrap();
        assert!(solution.is_empty());
        assert!(model.current_time() > 0.0);
    }

    #[test]
    fn test_reinitialised_runs_identically() {
        let mut model = configured_model();
        model.initialise_solver(SolverBackend::DirectSparse).unwrap();
        let first = model.solve().unwrap();

        model.initialise_new_solution().unwrap();
        let second = model.solve().unwrap();
        assert_eq!(first.last_time(), second.last_time());

        // An independent model with identical inputs produces the same
        // sparsity pattern.
        let mut other = configured_model();
        other.initialise_solver(SolverBackend::DirectSparse).unwrap();
        other.solve().unwrap();
        let (rp_a, ci_a) = model.driver().unwrap().stiffness().pattern();
        let (rp_b, ci_b) = other.driver().unwrap().stiffness().pattern();
        assert_eq!(rp_a, rp_b);
        assert_eq!(ci_a, ci_b);
    }

    #[test]
    fn test_inlet_commands_via_facade() {
        let mut model = configured_model();
        model.initialise_solver(SolverBackend::DirectSparse).unwrap();
        model.solve_time_interval(100.0).unwrap();

        model
            .change_inlet_pressure("inlet", -6e4, PressureMode::Delta)
            .unwrap();
        model.solve_time_interval(100.0).unwrap();
        let driver = model.driver().unwrap();
        assert_eq!(driver.boundary().inlet("inlet").unwrap().pressure, 4e4);

        assert!(matches!(
            model.close_inlet("ghost"),
            Err(LizzyError::Boundary(BoundaryError::UnknownInlet(_)))
        ));
    }
}
