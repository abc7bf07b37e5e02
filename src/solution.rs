//! Simulation snapshots and packed solutions.
//!
//! Every step of the driver records a [`TimeStep`]; snapshots flagged for
//! write-out are packed into a [`Solution`] handed back to the caller.
//! Solutions are deep copies: later steps never mutate an observed result.

use glam::DVec3;

/// Observed inlet state at the time of a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct InletState {
    /// Inlet name.
    pub name: String,
    /// Pressure at the step [Pa].
    pub pressure: f64,
    /// Whether the inlet was open.
    pub open: bool,
}

/// One simulation snapshot.
#[derive(Clone, Debug)]
pub struct TimeStep {
    /// Step counter (0 is the initial state).
    pub index: usize,
    /// Simulation time at the end of the step [s].
    pub time: f64,
    /// Step length [s].
    pub dt: f64,
    /// Nodal pressure [Pa].
    pub pressure: Vec<f64>,
    /// Element velocity [m/s].
    pub velocity: Vec<DVec3>,
    /// Node-averaged velocity [m/s].
    pub velocity_nodal: Vec<DVec3>,
    /// Nodal fill factor in [0, 1].
    pub fill_factor: Vec<f64>,
    /// Free-surface indicator: 1 on front CVs, 0 elsewhere.
    pub free_surface: Vec<u8>,
    /// Inlet states at the step.
    pub inlets: Vec<InletState>,
    /// Volumetric rate delivered by the open inlets [m³/s].
    pub inlet_influx: f64,
    /// Whether this snapshot is part of the packed solution.
    pub write_out: bool,
}

/// A packed sequence of write-out snapshots.
#[derive(Clone, Debug, Default)]
pub struct Solution {
    /// Snapshots in time order.
    pub steps: Vec<TimeStep>,
}

impl Solution {
    /// Number of snapshots.
    pub fn n_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Snapshot times.
    pub fn times(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.time).collect()
    }

    /// Time of the last snapshot, if any.
    pub fn last_time(&self) -> Option<f64> {
        self.steps.last().map(|s| s.time)
    }

    /// Last snapshot, if any.
    pub fn last(&self) -> Option<&TimeStep> {
        self.steps.last()
    }
}
