//! Point sensors.
//!
//! A sensor is a probe at a fixed position. At solver initialisation each
//! sensor is located inside a host element by a plane-projected
//! containment test; positions that fall outside the mesh snap to the
//! element with the nearest centroid and sample at that centroid.
//! Barycentric weights are cached and used every step to interpolate the
//! nodal pressure, velocity and fill-factor fields.
//!
//! The first step in which the interpolated fill factor reaches the wet
//! threshold latches the sensor's trigger time (the simulation time at the
//! end of that step).

use glam::DVec3;

use crate::mesh::SurfaceMesh;

/// Tolerance on barycentric weights for the containment test.
const CONTAINMENT_TOL: f64 = 1e-9;

/// One interpolated reading.
#[derive(Clone, Copy, Debug)]
pub struct SensorSample {
    /// Simulation time [s].
    pub time: f64,
    /// Interpolated pressure [Pa].
    pub pressure: f64,
    /// Interpolated velocity [m/s].
    pub velocity: DVec3,
    /// Interpolated fill factor.
    pub fill: f64,
}

/// A point probe resolved to a host element.
#[derive(Clone, Debug)]
pub struct Sensor {
    /// Sensor id (creation order).
    pub id: usize,
    /// Probe position.
    pub position: DVec3,
    /// Host element index.
    pub host_element: usize,
    /// Barycentric interpolation weights over the host element nodes.
    pub weights: [f64; 3],
    /// Whether the position fell outside the mesh and was snapped to the
    /// nearest element centroid.
    pub snapped: bool,
    /// First time the interpolated fill factor reached the wet threshold.
    pub trigger_time: Option<f64>,
    /// Reading history, one sample per step.
    pub history: Vec<SensorSample>,
}

impl Sensor {
    /// Latest reading, if any step has been sampled.
    pub fn last_sample(&self) -> Option<&SensorSample> {
        self.history.last()
    }
}

/// The set of sensors of a model.
#[derive(Clone, Debug, Default)]
pub struct SensorSet {
    sensors: Vec<Sensor>,
}

impl SensorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sensor at a position; returns its id. Resolution to a host
    /// element happens at [`locate`](Self::locate).
    pub fn add_sensor(&mut self, position: DVec3) -> usize {
        let id = self.sensors.len();
        self.sensors.push(Sensor {
            id,
            position,
            host_element: 0,
            weights: [1.0 / 3.0; 3],
            snapped: false,
            trigger_time: None,
            history: Vec::new(),
        });
        id
    }

    /// Resolve every sensor to a host element and cache its weights.
    pub fn locate(&mut self, mesh: &SurfaceMesh) {
        for sensor in &mut self.sensors {
            let mut host = None;
            let mut best_offset = f64::INFINITY;
            for e in 0..mesh.n_elements() {
                let (w, offset) = mesh.barycentric(e, sensor.position);
                let inside = w.iter().all(|&wi| wi >= -CONTAINMENT_TOL);
                if inside && offset < best_offset {
                    host = Some((e, w));
                    best_offset = offset;
                }
            }
            match host {
                Some((e, w)) => {
                    sensor.host_element = e;
                    sensor.weights = w;
                    sensor.snapped = false;
                }
                None => {
                    // Snap to the nearest centroid and sample there.
                    let e = (0..mesh.n_elements())
                        .min_by(|&a, &b| {
                            let da = (mesh.geometry[a].centroid - sensor.position).length();
                            let db = (mesh.geometry[b].centroid - sensor.position).length();
                            da.total_cmp(&db)
                        })
                        .expect("mesh has at least one element");
                    sensor.host_element = e;
                    sensor.weights = [1.0 / 3.0; 3];
                    sensor.snapped = true;
                }
            }
        }
    }

    /// Interpolate the nodal fields for every sensor and latch triggers.
    ///
    /// `wet_threshold` is 1 − ε_fill. Returns `true` when at least one
    /// sensor latched its trigger during this call.
    pub fn sample(
        &mut self,
        mesh: &SurfaceMesh,
        time: f64,
        pressure: &[f64],
        velocity_nodal: &[DVec3],
        fill: &[f64],
        wet_threshold: f64,
    ) -> bool {
        let mut any_triggered = false;
        for sensor in &mut self.sensors {
            let nodes = mesh.triangles[sensor.host_element];
            let mut p = 0.0;
            let mut v = DVec3::ZERO;
            let mut f = 0.0;
            for (a, &node) in nodes.iter().enumerate() {
                let w = sensor.weights[a];
                p += w * pressure[node];
                v += w * velocity_nodal[node];
                f += w * fill[node];
            }
            sensor.history.push(SensorSample {
                time,
                pressure: p,
                velocity: v,
                fill: f,
            });
            if sensor.trigger_time.is_none() && f >= wet_threshold {
                sensor.trigger_time = Some(time);
                any_triggered = true;
            }
        }
        any_triggered
    }

    /// Clear histories and trigger latches (solution reset).
    pub fn reset(&mut self) {
        for sensor in &mut self.sensors {
            sensor.trigger_time = None;
            sensor.history.clear();
        }
    }

    /// All sensors, in creation order.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}
