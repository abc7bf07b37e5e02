//! Mesh representation: triangular surface geometry, the median-dual
//! control-volume tessellation, and MSH file reading.

pub mod cv;
pub mod msh;
pub mod surface;

pub use cv::{CvError, CvMesh, SubFace};
pub use msh::{read_msh_file, MshError};
pub use surface::{MeshData, MeshError, SurfaceMesh, TriangleGeometry};
