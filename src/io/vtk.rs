//! VTK output for filling solutions.
//!
//! Writes VTU (XML UnstructuredGrid) snapshots for visualization in
//! ParaView and other VTK-compatible tools, one file per write-out step,
//! plus a PVD collection indexing them by simulation time.
//!
//! Field names are contractual:
//! - `Pressure`: per node [Pa]
//! - `FillFactor`: per node, dimensionless
//! - `FreeSurface`: per node, 1 on front CVs
//! - `Velocity`: per node (averaged) and per element [m/s]
//!
//! Data arrays are written one tuple per line (a scalar or a 3-vector per
//! row). The control-volume wireframe can be written as a VTP polydata
//! companion for inspecting the dual mesh.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::mesh::{CvMesh, SurfaceMesh};
use crate::solution::{Solution, TimeStep};

/// Error type for VTK operations.
#[derive(Debug, Error)]
pub enum VtkError {
    /// I/O error during file operations.
    #[error("VTK I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Solution fields do not match the mesh.
    #[error("invalid solution: {0}")]
    InvalidSolution(String),
}

/// Nesting depth of the data arrays inside a `<Piece>`.
const PIECE_DEPTH: usize = 3;

fn pad(depth: usize) -> String {
    "  ".repeat(depth)
}

/// `<DataArray>` of Float64 tuples, one tuple per row.
fn write_f64_array<W: Write>(
    out: &mut W,
    depth: usize,
    name: &str,
    components: usize,
    values: &[f64],
) -> std::io::Result<()> {
    let pad = pad(depth);
    if components > 1 {
        writeln!(
            out,
            "{pad}<DataArray type=\"Float64\" Name=\"{name}\" NumberOfComponents=\"{components}\" format=\"ascii\">"
        )?;
    } else {
        writeln!(
            out,
            "{pad}<DataArray type=\"Float64\" Name=\"{name}\" format=\"ascii\">"
        )?;
    }
    for row in values.chunks(components) {
        write!(out, "{pad}")?;
        for v in row {
            write!(out, " {v:.9e}")?;
        }
        writeln!(out)?;
    }
    writeln!(out, "{pad}</DataArray>")
}

/// `<DataArray>` of integer values on a single row (connectivity, offsets
/// and cell types have no tuple structure worth a line each).
fn write_index_array<W: Write>(
    out: &mut W,
    depth: usize,
    vtk_type: &str,
    name: &str,
    values: impl Iterator<Item = usize>,
) -> std::io::Result<()> {
    let pad = pad(depth);
    writeln!(
        out,
        "{pad}<DataArray type=\"{vtk_type}\" Name=\"{name}\" format=\"ascii\">"
    )?;
    write!(out, "{pad}")?;
    for v in values {
        write!(out, " {v}")?;
    }
    writeln!(out)?;
    writeln!(out, "{pad}</DataArray>")
}

/// Results writer bound to the simulation mesh.
pub struct ResultsWriter<'a> {
    mesh: &'a SurfaceMesh,
}

impl<'a> ResultsWriter<'a> {
    pub fn new(mesh: &'a SurfaceMesh) -> Self {
        Self { mesh }
    }

    /// Write a packed solution into `<root>/<case_name>/`: one numbered
    /// `.vtu` per snapshot plus a `.pvd` collection indexed by time.
    /// An existing case directory is replaced.
    ///
    /// Returns the case directory path.
    pub fn save_results_in(
        &self,
        solution: &Solution,
        case_name: &str,
        root: &Path,
    ) -> Result<PathBuf, VtkError> {
        let case_dir = root.join(case_name);
        if case_dir.is_dir() {
            fs::remove_dir_all(&case_dir)?;
        }
        fs::create_dir_all(&case_dir)?;

        for (i, step) in solution.steps.iter().enumerate() {
            let path = case_dir.join(format!("{case_name}_RES_{i}.vtu"));
            self.write_snapshot(step, &path)?;
        }

        let mut out = BufWriter::new(File::create(case_dir.join(format!("{case_name}_RES.pvd")))?);
        writeln!(out, "<?xml version=\"1.0\"?>")?;
        writeln!(
            out,
            "<VTKFile type=\"Collection\" version=\"0.1\" byte_order=\"LittleEndian\">"
        )?;
        writeln!(out, "  <Collection>")?;
        for (i, step) in solution.steps.iter().enumerate() {
            writeln!(
                out,
                "    <DataSet timestep=\"{}\" file=\"{case_name}_RES_{i}.vtu\"/>",
                step.time
            )?;
        }
        writeln!(out, "  </Collection>")?;
        writeln!(out, "</VTKFile>")?;
        out.flush()?;

        Ok(case_dir)
    }

    /// Write a packed solution into `results/<case_name>/`.
    pub fn save_results(
        &self,
        solution: &Solution,
        case_name: &str,
    ) -> Result<PathBuf, VtkError> {
        self.save_results_in(solution, case_name, Path::new("results"))
    }

    /// Write one snapshot as a VTU file.
    pub fn write_snapshot(&self, step: &TimeStep, path: &Path) -> Result<(), VtkError> {
        let n_nodes = self.mesh.n_nodes();
        let n_elements = self.mesh.n_elements();
        if step.pressure.len() != n_nodes
            || step.fill_factor.len() != n_nodes
            || step.velocity.len() != n_elements
        {
            return Err(VtkError::InvalidSolution(format!(
                "snapshot at t = {} does not match the mesh dimensions",
                step.time
            )));
        }

        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "<?xml version=\"1.0\"?>")?;
        writeln!(
            out,
            "<VTKFile type=\"UnstructuredGrid\" version=\"0.1\" byte_order=\"LittleEndian\">"
        )?;
        writeln!(out, "  <UnstructuredGrid>")?;
        writeln!(
            out,
            "    <Piece NumberOfPoints=\"{n_nodes}\" NumberOfCells=\"{n_elements}\">"
        )?;

        writeln!(out, "      <Points>")?;
        let coords: Vec<f64> = self
            .mesh
            .nodes
            .iter()
            .flat_map(|p| [p.x, p.y, p.z])
            .collect();
        write_f64_array(&mut out, PIECE_DEPTH + 1, "Points", 3, &coords)?;
        writeln!(out, "      </Points>")?;

        writeln!(out, "      <Cells>")?;
        write_index_array(
            &mut out,
            PIECE_DEPTH + 1,
            "Int64",
            "connectivity",
            self.mesh.triangles.iter().flat_map(|t| t.iter().copied()),
        )?;
        write_index_array(
            &mut out,
            PIECE_DEPTH + 1,
            "Int64",
            "offsets",
            (1..=n_elements).map(|i| 3 * i),
        )?;
        // VTK cell type 5 = triangle.
        write_index_array(
            &mut out,
            PIECE_DEPTH + 1,
            "UInt8",
            "types",
            std::iter::repeat(5).take(n_elements),
        )?;
        writeln!(out, "      </Cells>")?;

        writeln!(out, "      <PointData Scalars=\"FillFactor\">")?;
        write_f64_array(&mut out, PIECE_DEPTH + 1, "Pressure", 1, &step.pressure)?;
        write_f64_array(
            &mut out,
            PIECE_DEPTH + 1,
            "FillFactor",
            1,
            &step.fill_factor,
        )?;
        let free_surface: Vec<f64> = step.free_surface.iter().map(|&s| s as f64).collect();
        write_f64_array(&mut out, PIECE_DEPTH + 1, "FreeSurface", 1, &free_surface)?;
        let v_nodal: Vec<f64> = step
            .velocity_nodal
            .iter()
            .flat_map(|v| [v.x, v.y, v.z])
            .collect();
        write_f64_array(&mut out, PIECE_DEPTH + 1, "Velocity", 3, &v_nodal)?;
        writeln!(out, "      </PointData>")?;

        writeln!(out, "      <CellData>")?;
        let v_elem: Vec<f64> = step
            .velocity
            .iter()
            .flat_map(|v| [v.x, v.y, v.z])
            .collect();
        write_f64_array(&mut out, PIECE_DEPTH + 1, "Velocity", 3, &v_elem)?;
        writeln!(out, "      </CellData>")?;

        writeln!(out, "    </Piece>")?;
        writeln!(out, "  </UnstructuredGrid>")?;
        writeln!(out, "</VTKFile>")?;
        out.flush()?;
        Ok(())
    }

    /// Write the control-volume wireframe as a VTP polydata companion.
    pub fn write_cv_mesh(&self, cv: &CvMesh, path: &Path) -> Result<(), VtkError> {
        let n_segments = cv.wireframe.len();
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "<?xml version=\"1.0\"?>")?;
        writeln!(
            out,
            "<VTKFile type=\"PolyData\" version=\"0.1\" byte_order=\"LittleEndian\">"
        )?;
        writeln!(out, "  <PolyData>")?;
        writeln!(
            out,
            "    <Piece NumberOfPoints=\"{}\" NumberOfLines=\"{n_segments}\">",
            2 * n_segments
        )?;

        writeln!(out, "      <Points>")?;
        let coords: Vec<f64> = cv
            .wireframe
            .iter()
            .flat_map(|(a, b)| [a.x, a.y, a.z, b.x, b.y, b.z])
            .collect();
        write_f64_array(&mut out, PIECE_DEPTH + 1, "Points", 3, &coords)?;
        writeln!(out, "      </Points>")?;

        writeln!(out, "      <Lines>")?;
        write_index_array(
            &mut out,
            PIECE_DEPTH + 1,
            "Int64",
            "connectivity",
            0..2 * n_segments,
        )?;
        write_index_array(
            &mut out,
            PIECE_DEPTH + 1,
            "Int64",
            "offsets",
            (1..=n_segments).map(|i| 2 * i),
        )?;
        writeln!(out, "      </Lines>")?;

        writeln!(out, "    </Piece>")?;
        writeln!(out, "  </PolyData>")?;
        writeln!(out, "</VTKFile>")?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::ElementProperties;
    use crate::mesh::MeshData;
    use crate::solution::InletState;
    use glam::{DMat3, DVec3};
    use tempfile::TempDir;

    fn mesh() -> SurfaceMesh {
        SurfaceMesh::from_data(MeshData::rectangle(1.0, 0.5, 2, 1)).unwrap()
    }

    fn snapshot(mesh: &SurfaceMesh) -> TimeStep {
        TimeStep {
            index: 0,
            time: 1.5,
            dt: 0.5,
            pressure: vec![1e5; mesh.n_nodes()],
            velocity: vec![DVec3::new(1e-4, 0.0, 0.0); mesh.n_elements()],
            velocity_nodal: vec![DVec3::ZERO; mesh.n_nodes()],
            fill_factor: vec![0.5; mesh.n_nodes()],
            free_surface: vec![1; mesh.n_nodes()],
            inlets: vec![InletState {
                name: "inlet".to_string(),
                pressure: 1e5,
                open: true,
            }],
            inlet_influx: 0.0,
            write_out: true,
        }
    }

    #[test]
    fn test_snapshot_contains_contractual_fields() {
        let mesh = mesh();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("step.vtu");
        ResultsWriter::new(&mesh)
            .write_snapshot(&snapshot(&mesh), &path)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        for field in ["Pressure", "FillFactor", "FreeSurface", "Velocity"] {
            assert!(contents.contains(&format!("Name=\"{field}\"")), "{field}");
        }
        assert!(contents.contains("NumberOfCells=\"4\""));
    }

    #[test]
    fn test_one_tuple_per_row() {
        let mesh = mesh();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("step.vtu");
        ResultsWriter::new(&mesh)
            .write_snapshot(&snapshot(&mesh), &path)
            .unwrap();

        // The pressure array carries one value per node, each on its own
        // row.
        let contents = std::fs::read_to_string(&path).unwrap();
        let pressure_rows = contents
            .lines()
            .filter(|l| l.trim_start().starts_with("1.000000000e5"))
            .count();
        assert_eq!(pressure_rows, mesh.n_nodes());
    }

    #[test]
    fn test_save_results_layout() {
        let mesh = mesh();
        let solution = Solution {
            steps: vec![snapshot(&mesh), snapshot(&mesh)],
        };
        let dir = TempDir::new().unwrap();
        let case_dir = ResultsWriter::new(&mesh)
            .save_results_in(&solution, "case", dir.path())
            .unwrap();

        assert!(case_dir.join("case_RES_0.vtu").is_file());
        assert!(case_dir.join("case_RES_1.vtu").is_file());
        let pvd = std::fs::read_to_string(case_dir.join("case_RES.pvd")).unwrap();
        assert!(pvd.contains("case_RES_1.vtu"));
        assert!(pvd.contains("timestep=\"1.5\""));
    }

    #[test]
    fn test_mismatched_snapshot_rejected() {
        let mesh = mesh();
        let mut step = snapshot(&mesh);
        step.pressure.pop();
        let dir = TempDir::new().unwrap();
        let result = ResultsWriter::new(&mesh).write_snapshot(&step, &dir.path().join("x.vtu"));
        assert!(matches!(result, Err(VtkError::InvalidSolution(_))));
    }

    #[test]
    fn test_cv_wireframe() {
        let mesh = mesh();
        let props = ElementProperties {
            permeability: vec![DMat3::IDENTITY * 1e-10; mesh.n_elements()],
            thickness: vec![1.0; mesh.n_elements()],
            porosity: vec![0.5; mesh.n_elements()],
        };
        let cv = CvMesh::build(&mesh, &props).unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cv.vtp");
        ResultsWriter::new(&mesh).write_cv_mesh(&cv, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("PolyData"));
        assert!(contents.contains(&format!("NumberOfLines=\"{}\"", cv.wireframe.len())));
    }
}
