//! The FE/CV filling engine: sparse assembly, pressure solvers, Darcy
//! velocity recovery, fill-factor advection and the time-stepping driver.

pub mod assembly;
pub mod driver;
pub mod fill;
pub mod pressure;
pub mod sparse;
pub mod velocity;

pub use assembly::PressureAssembler;
pub use driver::{FillDriver, SolveError, StepRecord};
pub use fill::CvState;
pub use pressure::{solve_pressure, PressureError, SolverBackend, CG_TOLERANCE};
pub use sparse::CsrMatrix;
pub use velocity::VelocitySolver;
