//! Median-dual control-volume mesh.
//!
//! One control volume (CV) per mesh node. Inside every triangle the three
//! medians split the element into three equal-area fragments, one per
//! corner node; the CV of a node is the union of its fragments over all
//! incident elements.
//!
//! Per element `[a, b, c]` the dual tessellation contributes three
//! interface segments running from the element centroid to the edge
//! midpoints. Each segment separates two CVs and carries a face vector
//!
//! ```text
//! a = h_e · n̂ × (m − c_e)
//! ```
//!
//! which is in-plane, perpendicular to the segment, of length ℓ·h_e, and
//! oriented from the first node of the edge to the second (in connectivity
//! order). The volumetric flux across the interface is `v_e · a`.
//!
//! The CV volume weights each incident element fragment by porosity and
//! thickness: `V_i = Σ_e A_e h_e φ_e / 3`.

use std::collections::HashMap;

use glam::DVec3;
use thiserror::Error;

use crate::materials::ElementProperties;
use crate::mesh::SurfaceMesh;

/// Error type for control-volume construction.
#[derive(Debug, Error)]
pub enum CvError {
    /// Two elements sharing an edge disagree on surface orientation.
    #[error("elements {0} and {1} share an edge but have opposing normals")]
    InconsistentNormals(usize, usize),

    /// An interior edge is shared by more than two elements.
    #[error("edge ({0}, {1}) is shared by more than two elements")]
    NonManifoldEdge(usize, usize),
}

/// One directed interface between two control volumes inside an element.
#[derive(Clone, Copy, Debug)]
pub struct SubFace {
    /// Element the interface lies in.
    pub element: usize,
    /// Node on the positive-flux side (flux `v · area > 0` leaves this CV).
    pub from: usize,
    /// Node on the receiving side.
    pub to: usize,
    /// Thickness-scaled in-plane face vector, oriented `from → to`.
    pub area: DVec3,
}

/// The dual control-volume tessellation of a surface mesh.
#[derive(Clone, Debug)]
pub struct CvMesh {
    /// Pore volume of each CV: Σ A_e h_e φ_e / 3 over incident elements.
    pub volumes: Vec<f64>,
    /// All directed CV interfaces, three per element.
    pub sub_faces: Vec<SubFace>,
    /// Wireframe segments (centroid → edge midpoint) for visualisation.
    pub wireframe: Vec<(DVec3, DVec3)>,
}

impl CvMesh {
    /// Build the dual mesh. Requires material properties to have been
    /// resolved per element (thickness and porosity scale volumes and face
    /// vectors).
    ///
    /// Also verifies that adjacent elements agree on surface orientation.
    pub fn build(mesh: &SurfaceMesh, props: &ElementProperties) -> Result<Self, CvError> {
        Self::check_orientation(mesh)?;

        let n_nodes = mesh.n_nodes();
        let mut volumes = vec![0.0; n_nodes];
        let mut sub_faces = Vec::with_capacity(3 * mesh.n_elements());
        let mut wireframe = Vec::with_capacity(3 * mesh.n_elements());

        for (e, tri) in mesh.triangles.iter().enumerate() {
            let geom = &mesh.geometry[e];
            let h = props.thickness[e];
            let phi = props.porosity[e];

            let fragment = geom.area * h * phi / 3.0;
            for &v in tri {
                volumes[v] += fragment;
            }

            // Directed interfaces (a→b), (b→c), (c→a) in connectivity order.
            for k in 0..3 {
                let from = tri[k];
                let to = tri[(k + 1) % 3];
                let midpoint = 0.5 * (mesh.nodes[from] + mesh.nodes[to]);
                let area = h * geom.normal.cross(midpoint - geom.centroid);
                sub_faces.push(SubFace {
                    element: e,
                    from,
                    to,
                    area,
                });
                wireframe.push((geom.centroid, midpoint));
            }
        }

        Ok(Self {
            volumes,
            sub_faces,
            wireframe,
        })
    }

    /// Aggregated face vector between a directed node pair:
    /// `A_ij = Σ_e a_ij^(e)` over the elements sharing edge (i, j).
    pub fn pair_area(&self, i: usize, j: usize) -> DVec3 {
        let mut total = DVec3::ZERO;
        for face in &self.sub_faces {
            if face.from == i && face.to == j {
                total += face.area;
            } else if face.from == j && face.to == i {
                total -= face.area;
            }
        }
        total
    }

    /// Total pore volume.
    pub fn total_volume(&self) -> f64 {
        self.volumes.iter().sum()
    }

    /// Net volumetric inflow rate per CV given element velocities, with the
    /// upwind donor gate: a sub-face flux contributes only when the donor
    /// CV holds resin.
    pub fn net_inflow_rates(&self, velocity: &[DVec3], fill: &[f64], rates: &mut [f64]) {
        rates.fill(0.0);
        for face in &self.sub_faces {
            let q = velocity[face.element].dot(face.area);
            let donor = if q >= 0.0 { face.from } else { face.to };
            if fill[donor] > 0.0 {
                rates[face.from] -= q;
                rates[face.to] += q;
            }
        }
    }

    fn check_orientation(mesh: &SurfaceMesh) -> Result<(), CvError> {
        let mut edge_elements: HashMap<(usize, usize), [usize; 2]> = HashMap::new();
        let mut edge_counts: HashMap<(usize, usize), usize> = HashMap::new();
        for (e, tri) in mesh.triangles.iter().enumerate() {
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                let key = (a.min(b), a.max(b));
                let count = edge_counts.entry(key).or_insert(0);
                *count += 1;
                if *count > 2 {
                    return Err(CvError::NonManifoldEdge(key.0, key.1));
                }
                let pair = edge_elements.entry(key).or_insert([e, e]);
                pair[*count - 1] = e;
            }
        }
        for (_, [e1, e2]) in edge_elements {
            if e1 != e2 {
                let dot = mesh.geometry[e1].normal.dot(mesh.geometry[e2].normal);
                if dot <= 0.0 {
                    return Err(CvError::InconsistentNormals(e1, e2));
                }
            }
        }
        Ok(())
    }
}
