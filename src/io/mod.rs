//! Results output.

pub mod vtk;

pub use vtk::{ResultsWriter, VtkError};
