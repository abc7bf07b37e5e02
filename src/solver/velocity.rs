//! Darcy velocity recovery from the nodal pressure field.
//!
//! Per element the in-plane pressure gradient is constant,
//! `∇p = Σ_a p_a ∇N_a`, and Darcy's law gives
//!
//! ```text
//! v_e = −(1/μ) K_e ∇p
//! ```
//!
//! The products `K_e ∇N_a` are precomputed at initialisation. Nodal
//! velocities (for output and sensor sampling) average the velocities of
//! the incident elements that carry flow; elements with zero velocity
//! (fully dry or fully pressure-flat) are left out of the average so the
//! front velocity is not diluted by the empty region.

use glam::DVec3;

use crate::materials::ElementProperties;
use crate::mesh::SurfaceMesh;

/// Element velocity evaluator with precomputed `K_e ∇N_a` columns.
#[derive(Clone, Debug)]
pub struct VelocitySolver {
    /// `k_grad[e][a] = K_e ∇N_a`.
    k_grad: Vec<[DVec3; 3]>,
}

impl VelocitySolver {
    pub fn new(mesh: &SurfaceMesh, props: &ElementProperties) -> Self {
        let k_grad = (0..mesh.n_elements())
            .map(|e| {
                let k = props.permeability[e];
                let grad = &mesh.geometry[e].grad;
                [k * grad[0], k * grad[1], k * grad[2]]
            })
            .collect();
        Self { k_grad }
    }

    /// Element velocities v_e = −(1/μ) K_e ∇p.
    pub fn element_velocities(
        &self,
        mesh: &SurfaceMesh,
        pressure: &[f64],
        mu: f64,
        velocity: &mut Vec<DVec3>,
    ) {
        velocity.clear();
        velocity.reserve(mesh.n_elements());
        let inv_mu = 1.0 / mu;
        for (e, tri) in mesh.triangles.iter().enumerate() {
            let cols = &self.k_grad[e];
            let mut v = DVec3::ZERO;
            for a in 0..3 {
                v += pressure[tri[a]] * cols[a];
            }
            velocity.push(-inv_mu * v);
        }
    }

    /// Nodal velocities: mean of the non-zero incident element velocities.
    pub fn nodal_velocities(
        &self,
        mesh: &SurfaceMesh,
        element_velocity: &[DVec3],
        nodal: &mut Vec<DVec3>,
    ) {
        nodal.clear();
        nodal.reserve(mesh.n_nodes());
        for elements in &mesh.node_elements {
            let mut sum = DVec3::ZERO;
            let mut count = 0usize;
            for &e in elements {
                let v = element_velocity[e];
                if v.length_squared() > 0.0 {
                    sum += v;
                    count += 1;
                }
            }
            if count > 0 {
                nodal.push(sum / count as f64);
            } else {
                nodal.push(DVec3::ZERO);
            }
        }
    }
}
