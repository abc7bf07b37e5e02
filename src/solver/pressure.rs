//! Pressure solvers for the SPD system K p = b.
//!
//! Three backends behind one call:
//! - [`SolverBackend::DirectDense`]: faer full-pivot LU on a dense copy.
//!   The correctness baseline; only sensible for small meshes.
//! - [`SolverBackend::DirectSparse`]: faer sparse Cholesky (LLT). The
//!   default.
//! - [`SolverBackend::IterativeCg`]: Jacobi-preconditioned conjugate
//!   gradients on the assembled CSR matrix, relative tolerance 1e-10,
//!   at most 2·N iterations.
//!
//! All backends agree to solver tolerance on the same system; the driver
//! handles the CG → sparse-direct downgrade on non-convergence.

use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::sparse::{SparseColMat, Triplet};
use faer::{Mat, Side};
use thiserror::Error;

use crate::solver::sparse::CsrMatrix;

/// Relative residual tolerance of the conjugate-gradient backend.
pub const CG_TOLERANCE: f64 = 1e-10;

/// Residual guard for the direct backends; a direct solve that misses this
/// is treated as a singular system.
const DIRECT_RESIDUAL_GUARD: f64 = 1e-6;

/// Error type for pressure solves.
#[derive(Debug, Error)]
pub enum PressureError {
    /// The system is singular or not positive definite.
    #[error("singular pressure system: {0}")]
    Singular(String),

    /// The iterative backend ran out of iterations.
    #[error("conjugate gradient did not converge in {iterations} iterations (relative residual {residual:.3e})")]
    NonConvergence { iterations: usize, residual: f64 },
}

/// Linear solver backend selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverBackend {
    /// Dense LU factorisation (baseline).
    DirectDense,
    /// Sparse Cholesky factorisation (default).
    DirectSparse,
    /// Preconditioned conjugate gradients.
    IterativeCg,
}

impl Default for SolverBackend {
    fn default() -> Self {
        SolverBackend::DirectSparse
    }
}

impl std::fmt::Display for SolverBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverBackend::DirectDense => write!(f, "direct dense (LU)"),
            SolverBackend::DirectSparse => write!(f, "direct sparse (LLT)"),
            SolverBackend::IterativeCg => write!(f, "iterative (Jacobi-CG)"),
        }
    }
}

/// Solve K p = b with the selected backend.
pub fn solve_pressure(
    backend: SolverBackend,
    k: &CsrMatrix,
    b: &[f64],
) -> Result<Vec<f64>, PressureError> {
    match backend {
        SolverBackend::DirectDense => solve_direct_dense(k, b),
        SolverBackend::DirectSparse => solve_direct_sparse(k, b),
        SolverBackend::IterativeCg => solve_cg(k, b, CG_TOLERANCE, 2 * k.n()),
    }
}

fn solve_direct_dense(k: &CsrMatrix, b: &[f64]) -> Result<Vec<f64>, PressureError> {
    let n = k.n();
    let dense = k.to_dense();
    let mut rhs = Mat::zeros(n, 1);
    for (i, &bi) in b.iter().enumerate() {
        rhs[(i, 0)] = bi;
    }

    let lu = dense.as_ref().full_piv_lu();
    let solution = lu.solve(&rhs);
    let p: Vec<f64> = (0..n).map(|i| solution[(i, 0)]).collect();
    check_direct_solution(k, b, &p)?;
    Ok(p)
}

fn solve_direct_sparse(k: &CsrMatrix, b: &[f64]) -> Result<Vec<f64>, PressureError> {
    let n = k.n();
    let triplets: Vec<Triplet<usize, usize, f64>> = k
        .entries()
        .map(|(i, j, v)| Triplet::new(i, j, v))
        .collect();
    let sparse = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
        .map_err(|err| PressureError::Singular(format!("sparse construction failed: {err:?}")))?;

    let symbolic = SymbolicLlt::try_new(sparse.symbolic(), Side::Lower)
        .map_err(|err| PressureError::Singular(format!("symbolic factorisation failed: {err:?}")))?;
    let llt = Llt::try_new_with_symbolic(symbolic, sparse.as_ref(), Side::Lower)
        .map_err(|err| PressureError::Singular(format!("not positive definite: {err:?}")))?;

    let mut rhs = Mat::zeros(n, 1);
    for (i, &bi) in b.iter().enumerate() {
        rhs[(i, 0)] = bi;
    }
    let solution = llt.solve(&rhs);
    let p: Vec<f64> = (0..n).map(|i| solution[(i, 0)]).collect();
    check_direct_solution(k, b, &p)?;
    Ok(p)
}

/// Jacobi-preconditioned conjugate gradients.
fn solve_cg(
    k: &CsrMatrix,
    b: &[f64],
    tolerance: f64,
    max_iterations: usize,
) -> Result<Vec<f64>, PressureError> {
    let n = k.n();
    let b_norm = norm(b);
    if b_norm == 0.0 {
        return Ok(vec![0.0; n]);
    }

    let diag = k.diagonal();
    let precondition = |r: &[f64], z: &mut [f64]| {
        for i in 0..n {
            // Dirichlet rows carry a unit diagonal; free rows of an SPD
            // system have a positive diagonal.
            z[i] = r[i] / diag[i];
        }
    };

    let mut x = vec![0.0; n];
    let mut r = b.to_vec();
    let mut z = vec![0.0; n];
    precondition(&r, &mut z);
    let mut p = z.clone();
    let mut rz = dot(&r, &z);
    let mut q = vec![0.0; n];

    for iteration in 0..max_iterations {
        k.matvec(&p, &mut q);
        let pq = dot(&p, &q);
        if pq <= 0.0 {
            return Err(PressureError::Singular(format!(
                "indefinite direction encountered at CG iteration {iteration}"
            )));
        }
        let alpha = rz / pq;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * q[i];
        }
        if norm(&r) <= tolerance * b_norm {
            return Ok(x);
        }
        precondition(&r, &mut z);
        let rz_next = dot(&r, &z);
        let beta = rz_next / rz;
        rz = rz_next;
        for i in 0..n {
            p[i] = z[i] + beta * p[i];
        }
    }

    Err(PressureError::NonConvergence {
        iterations: max_iterations,
        residual: norm(&r) / b_norm,
    })
}

/// Reject non-finite or high-residual direct solutions: both indicate a
/// singular system that slipped through factorisation.
fn check_direct_solution(k: &CsrMatrix, b: &[f64], p: &[f64]) -> Result<(), PressureError> {
    if p.iter().any(|v| !v.is_finite()) {
        return Err(PressureError::Singular(
            "solution contains non-finite values".to_string(),
        ));
    }
    let mut residual = vec![0.0; k.n()];
    k.matvec(p, &mut residual);
    let mut max_res = 0.0f64;
    for (ri, bi) in residual.iter().zip(b) {
        max_res = max_res.max((ri - bi).abs());
    }
    let scale = norm_inf(b);
    if scale > 0.0 && max_res > DIRECT_RESIDUAL_GUARD * scale {
        return Err(PressureError::Singular(format!(
            "direct solve residual {max_res:.3e} exceeds guard"
        )));
    }
    Ok(())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

fn norm_inf(v: &[f64]) -> f64 {
    v.iter().fold(0.0f64, |m, x| m.max(x.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small SPD system: 1D Laplacian with unit Dirichlet rows at the ends.
    fn laplacian_system(n: usize) -> (CsrMatrix, Vec<f64>) {
        let neighbors: Vec<Vec<usize>> = (0..n)
            .map(|i| {
                let mut adj = Vec::new();
                if i > 0 {
                    adj.push(i - 1);
                }
                if i + 1 < n {
                    adj.push(i + 1);
                }
                adj
            })
            .collect();
        let mut k = CsrMatrix::from_node_adjacency(&neighbors);
        let mut b = vec![0.0; n];
        for i in 0..n {
            if i == 0 || i == n - 1 {
                k.add(i, i, 1.0);
            } else {
                k.add(i, i, 2.0);
                if i - 1 > 0 {
                    k.add(i, i - 1, -1.0);
                } else {
                    b[i] += 1.0; // eliminated Dirichlet column, p_0 = 1
                }
                if i + 1 < n - 1 {
                    k.add(i, i + 1, -1.0);
                }
            }
        }
        b[0] = 1.0;
        b[n - 1] = 0.0;
        (k, b)
    }

    fn assert_linear_profile(p: &[f64]) {
        let n = p.len();
        for (i, &pi) in p.iter().enumerate() {
            let exact = 1.0 - i as f64 / (n - 1) as f64;
            assert!(
                (pi - exact).abs() < 1e-8,
                "p[{i}] = {pi}, expected {exact}"
            );
        }
    }

    #[test]
    fn test_direct_dense() {
        let (k, b) = laplacian_system(11);
        let p = solve_pressure(SolverBackend::DirectDense, &k, &b).unwrap();
        assert_linear_profile(&p);
    }

    #[test]
    fn test_direct_sparse() {
        let (k, b) = laplacian_system(11);
        let p = solve_pressure(SolverBackend::DirectSparse, &k, &b).unwrap();
        assert_linear_profile(&p);
    }

    #[test]
    fn test_iterative_cg() {
        let (k, b) = laplacian_system(11);
        let p = solve_pressure(SolverBackend::IterativeCg, &k, &b).unwrap();
        assert_linear_profile(&p);
    }

    #[test]
    fn test_backends_agree() {
        let (k, b) = laplacian_system(25);
        let dense = solve_pressure(SolverBackend::DirectDense, &k, &b).unwrap();
        let sparse = solve_pressure(SolverBackend::DirectSparse, &k, &b).unwrap();
        let cg = solve_pressure(SolverBackend::IterativeCg, &k, &b).unwrap();
        for i in 0..k.n() {
            assert!((dense[i] - sparse[i]).abs() < 1e-10);
            assert!((dense[i] - cg[i]).abs() < 1e-8);
        }
    }

    #[test]
    fn test_zero_rhs_short_circuits() {
        let (k, _) = laplacian_system(5);
        let b = vec![0.0; 5];
        let p = solve_pressure(SolverBackend::IterativeCg, &k, &b).unwrap();
        assert!(p.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_singular_system_rejected() {
        // Pure Neumann Laplacian (no Dirichlet rows) is singular.
        let neighbors = vec![vec![1], vec![0, 2], vec![1]];
        let mut k = CsrMatrix::from_node_adjacency(&neighbors);
        k.add(0, 0, 1.0);
        k.add(0, 1, -1.0);
        k.add(1, 0, -1.0);
        k.add(1, 1, 2.0);
        k.add(1, 2, -1.0);
        k.add(2, 1, -1.0);
        k.add(2, 2, 1.0);
        // Inconsistent right-hand side: no exact solution exists.
        let b = vec![1.0, 0.0, 0.0];

        assert!(solve_pressure(SolverBackend::DirectDense, &k, &b).is_err());
    }
}
