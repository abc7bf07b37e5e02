//! Fill-factor advection on the control-volume mesh.
//!
//! The free surface moves by filling CVs from their net volumetric inflow
//! (see [`CvMesh::net_inflow_rates`](crate::mesh::CvMesh::net_inflow_rates)
//! for the upwind flux). The time step is CFL-bounded so that no CV
//! overshoots f = 1: the fastest-filling CV reaches exactly 1 in one
//! unclamped step.
//!
//! Fill factors never decrease. Lateral shear between front CVs can
//! produce a negative net rate; those CVs simply hold their value.

/// Classification of a control volume by fill factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CvState {
    /// No resin: f = 0.
    Dry,
    /// Partially filled: 0 < f < 1.
    Front,
    /// Full: f = 1.
    Wet,
}

/// Classify a fill factor. Values are snapped to exactly 1 when they cross
/// the wet threshold, so the comparison with 1 is exact.
#[inline]
pub fn cv_state(fill: f64) -> CvState {
    if fill >= 1.0 {
        CvState::Wet
    } else if fill > 0.0 {
        CvState::Front
    } else {
        CvState::Dry
    }
}

/// Free-surface indicator per CV: 1 for front CVs, 0 otherwise.
pub fn free_surface(fill: &[f64]) -> Vec<u8> {
    fill.iter()
        .map(|&f| u8::from(cv_state(f) == CvState::Front))
        .collect()
}

/// CFL time step: minimum time for any unfilled CV with positive inflow to
/// reach f = 1. `None` when no CV is receiving resin.
pub fn min_fill_time(fill: &[f64], volumes: &[f64], rates: &[f64]) -> Option<f64> {
    let mut dt: Option<f64> = None;
    for i in 0..fill.len() {
        if fill[i] < 1.0 && rates[i] > 0.0 {
            let t = (1.0 - fill[i]) * volumes[i] / rates[i];
            dt = Some(dt.map_or(t, |d: f64| d.min(t)));
        }
    }
    dt
}

/// Roundoff allowance on the snap threshold. The CFL step computes
/// (1 − f)·V/r and the advance computes f + r·dt/V; the two roundings can
/// leave the fastest CV a few ulps short of 1 even at ε_fill = 0, which
/// would otherwise cost a cascade of vanishing steps.
const SNAP_EPS: f64 = 1e-12;

/// Advance fill factors by `dt`, snapping values at or above
/// `wet_threshold` (= 1 − ε_fill) to exactly 1.
///
/// Returns the filled pore volume gained, Σ V_i Δf_i, before snapping.
pub fn advance(
    fill: &mut [f64],
    volumes: &[f64],
    rates: &[f64],
    dt: f64,
    wet_threshold: f64,
) -> f64 {
    let mut gained = 0.0;
    for i in 0..fill.len() {
        if fill[i] >= 1.0 {
            continue;
        }
        let rate = rates[i].max(0.0);
        if rate > 0.0 {
            let before = fill[i];
            fill[i] = (fill[i] + rate * dt / volumes[i]).min(1.0);
            gained += (fill[i] - before) * volumes[i];
        }
        if fill[i] >= wet_threshold - SNAP_EPS {
            fill[i] = 1.0;
        }
    }
    gained
}

/// Total volumetric rate entering unfilled CVs. By discrete conservation
/// this equals the volumetric rate leaving the open inlets.
pub fn front_influx(fill: &[f64], rates: &[f64]) -> f64 {
    fill.iter()
        .zip(rates)
        .filter(|(f, _)| **f < 1.0)
        .map(|(_, r)| r.max(0.0))
        .sum()
}
