//! Global assembly of the pressure Poisson system.
//!
//! Governing equation on the thickness-weighted manifold:
//!
//! ```text
//! ∇ · ( (h/μ) K_e ∇p ) = 0
//! ```
//!
//! With linear triangle shape functions the elemental stiffness is
//!
//! ```text
//! K_e[a,b] = (h_e A_e / μ) · ∇N_aᵀ K_e ∇N_b
//! ```
//!
//! assembled into a global CSR matrix over the mesh-edge sparsity pattern.
//! Dirichlet conditions (inlet pressures and p = 0 on unfilled CVs) are
//! applied by symmetric elimination: constrained rows become identity
//! rows, and the column contributions of constrained DOFs move to the
//! right-hand side of the free rows. The pattern is untouched, so the
//! matrix stays symmetric positive definite with no reallocation between
//! steps.

use crate::materials::ElementProperties;
use crate::mesh::SurfaceMesh;
use crate::solver::sparse::CsrMatrix;

/// Assembler with per-element stiffness precomputed at initialisation.
#[derive(Clone, Debug)]
pub struct PressureAssembler {
    /// Elemental stiffness matrices, `k_local[e][a][b]`.
    k_local: Vec<[[f64; 3]; 3]>,
}

impl PressureAssembler {
    /// Precompute elemental stiffness for every triangle.
    pub fn new(mesh: &SurfaceMesh, props: &ElementProperties, mu: f64) -> Self {
        let mut k_local = Vec::with_capacity(mesh.n_elements());
        for e in 0..mesh.n_elements() {
            let geom = &mesh.geometry[e];
            let scale = props.thickness[e] * geom.area / mu;
            let k = props.permeability[e];

            let mut local = [[0.0; 3]; 3];
            let k_grad = [k * geom.grad[0], k * geom.grad[1], k * geom.grad[2]];
            for a in 0..3 {
                for b in 0..3 {
                    local[a][b] = scale * geom.grad[a].dot(k_grad[b]);
                }
            }
            k_local.push(local);
        }
        Self { k_local }
    }

    /// Create the global matrix with the pattern fixed by node adjacency.
    pub fn new_matrix(&self, mesh: &SurfaceMesh) -> CsrMatrix {
        CsrMatrix::from_node_adjacency(&mesh.node_neighbors)
    }

    /// Assemble K and b, then apply Dirichlet values.
    ///
    /// `dirichlet[i] = Some(p)` constrains node `i` to pressure `p`.
    pub fn assemble(
        &self,
        mesh: &SurfaceMesh,
        dirichlet: &[Option<f64>],
        k: &mut CsrMatrix,
        b: &mut [f64],
    ) {
        k.set_zero();
        b.fill(0.0);

        for (e, tri) in mesh.triangles.iter().enumerate() {
            let local = &self.k_local[e];
            for a in 0..3 {
                for bb in 0..3 {
                    k.add(tri[a], tri[bb], local[a][bb]);
                }
            }
        }

        self.apply_dirichlet(dirichlet, k, b);
    }

    /// Symmetric Dirichlet elimination in place.
    fn apply_dirichlet(&self, dirichlet: &[Option<f64>], k: &mut CsrMatrix, b: &mut [f64]) {
        let n = k.n();
        for i in 0..n {
            match dirichlet[i] {
                Some(value) => {
                    let (cols, vals) = k.row_mut(i);
                    for (&j, v) in cols.iter().zip(vals.iter_mut()) {
                        *v = if j == i { 1.0 } else { 0.0 };
                    }
                    b[i] = value;
                }
                None => {
                    let (cols, vals) = k.row_mut(i);
                    for (&j, v) in cols.iter().zip(vals.iter_mut()) {
                        if let Some(value) = dirichlet[j] {
                            b[i] -= *v * value;
                            *v = 0.0;
                        }
                    }
                }
            }
        }
    }
}
