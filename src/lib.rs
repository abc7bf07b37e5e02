//! # lizzy
//!
//! Isothermal resin-infusion filling simulation on 2D triangular surface
//! meshes embedded in 3D space, using the Finite-Element / Control-Volume
//! (FE/CV) method applied to Darcy's law.
//!
//! The crate provides the building blocks of the filling engine:
//! - Surface mesh geometry and Gmsh MSH (v4.1 ASCII) reading
//! - The median-dual control-volume tessellation
//! - Porous materials with anisotropic permeability and rosettes
//! - Pressure-inlet boundary conditions with a step-boundary command queue
//! - Sparse SPD assembly of the pressure Poisson system
//! - Direct (dense/sparse) and iterative pressure solvers
//! - Conservative upwind fill-factor advection with a CFL-bounded step
//! - The event-driven filling driver (write-out cadence, inlet events,
//!   sensor triggers)
//! - Point sensors and VTK results output
//!
//! Most users drive everything through the [`LizzyModel`] façade:
//!
//! ```
//! use lizzy::{LizzyModel, MeshData, SimulationParameters, SolverBackend};
//!
//! let mut model = LizzyModel::new();
//! model.load_mesh_data(MeshData::rectangle(1.0, 0.5, 8, 4)).unwrap();
//! model.assign_simulation_parameters(SimulationParameters::default()).unwrap();
//! model.create_material("fabric", (1e-10, 1e-10, 1e-10), 0.5, 1.0).unwrap();
//! model.assign_material("fabric", "domain", None).unwrap();
//! model.create_inlet(1e5, "inlet").unwrap();
//! model.assign_inlet("inlet", "left_edge").unwrap();
//! model.initialise_solver(SolverBackend::DirectSparse).unwrap();
//! let solution = model.solve().unwrap();
//! assert!(solution.last_time().unwrap() > 0.0);
//! ```

pub mod bcond;
pub mod io;
pub mod materials;
pub mod mesh;
pub mod model;
pub mod params;
pub mod sensors;
pub mod solution;
pub mod solver;

// Re-export the main types for convenience.
pub use bcond::{BoundaryError, BoundaryStore, Inlet, InletCommand, PressureMode};
pub use io::{ResultsWriter, VtkError};
pub use materials::{ElementProperties, MaterialError, MaterialStore, PorousMaterial, Rosette};
pub use mesh::{
    read_msh_file, CvError, CvMesh, MeshData, MeshError, MshError, SubFace, SurfaceMesh,
};
pub use model::{LizzyError, LizzyModel};
pub use params::{ParameterError, SimulationParameters};
pub use sensors::{Sensor, SensorSample, SensorSet};
pub use solution::{InletState, Solution, TimeStep};
pub use solver::{
    CsrMatrix, CvState, FillDriver, PressureAssembler, PressureError, SolveError, SolverBackend,
    StepRecord, VelocitySolver,
};
