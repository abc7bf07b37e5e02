//! Pressure-inlet boundary conditions.
//!
//! Inlets are created by name with an initial pressure, then bound to a
//! named boundary (a physical line of the mesh) which resolves them to a
//! set of boundary nodes. After solver initialisation the only permitted
//! mutations are pressure changes and open/close toggles, and those are
//! routed through an [`InletCommand`] queue that the driver drains at step
//! boundaries.

use std::collections::HashMap;

use thiserror::Error;

use crate::mesh::SurfaceMesh;

/// Error type for boundary-condition configuration.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// An inlet with this name already exists.
    #[error("inlet '{0}' already exists")]
    DuplicateInlet(String),

    /// No inlet with this name has been created.
    #[error("inlet '{0}' not found; create it first with create_inlet")]
    UnknownInlet(String),

    /// The mesh has no boundary with this name.
    #[error("mesh contains no boundary named '{0}'")]
    UnknownBoundary(String),

    /// The boundary is already bound to an inlet.
    #[error("boundary '{0}' is already bound to inlet '{1}'")]
    BoundaryAlreadyBound(String, String),

    /// The inlet is already bound to a boundary.
    #[error("inlet '{0}' is already bound to boundary '{1}'")]
    InletAlreadyBound(String, String),
}

/// How a pressure change is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressureMode {
    /// Replace the inlet pressure.
    Set,
    /// Add to the inlet pressure.
    Delta,
}

/// Deferred inlet mutation, applied by the driver at the next step
/// boundary.
#[derive(Clone, Debug)]
pub enum InletCommand {
    /// Change the inlet pressure.
    ChangePressure {
        inlet: String,
        value: f64,
        mode: PressureMode,
    },
    /// Re-enable the inlet at its last assigned pressure.
    Open { inlet: String },
    /// Turn the inlet nodes into walls (natural no-flux boundary).
    Close { inlet: String },
}

/// A pressure inlet.
#[derive(Clone, Debug)]
pub struct Inlet {
    /// Inlet name.
    pub name: String,
    /// Initial pressure [Pa], restored on solution reset.
    pub p0: f64,
    /// Current pressure [Pa].
    pub pressure: f64,
    /// Whether the inlet is injecting. A closed inlet's nodes behave as
    /// walls and are excluded from the Dirichlet rows.
    pub open: bool,
    /// Boundary nodes the inlet drives (resolved at assignment).
    pub nodes: Vec<usize>,
    /// Name of the boundary the inlet is bound to.
    pub boundary: Option<String>,
}

/// Store of named inlets and their boundary bindings.
#[derive(Clone, Debug, Default)]
pub struct BoundaryStore {
    inlets: Vec<Inlet>,
    index: HashMap<String, usize>,
    /// Boundary name -> inlet name, to reject double bindings.
    bound: HashMap<String, String>,
}

impl BoundaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a named inlet with an initial pressure.
    pub fn create_inlet(&mut self, pressure: f64, name: &str) -> Result<(), BoundaryError> {
        if self.index.contains_key(name) {
            return Err(BoundaryError::DuplicateInlet(name.to_string()));
        }
        self.index.insert(name.to_string(), self.inlets.len());
        self.inlets.push(Inlet {
            name: name.to_string(),
            p0: pressure,
            pressure,
            open: true,
            nodes: Vec::new(),
            boundary: None,
        });
        Ok(())
    }

    /// Bind an inlet to a named mesh boundary, resolving its node set.
    pub fn assign_inlet(
        &mut self,
        inlet_name: &str,
        boundary_name: &str,
        mesh: &SurfaceMesh,
    ) -> Result<(), BoundaryError> {
        let idx = *self
            .index
            .get(inlet_name)
            .ok_or_else(|| BoundaryError::UnknownInlet(inlet_name.to_string()))?;
        if let Some(owner) = self.bound.get(boundary_name) {
            return Err(BoundaryError::BoundaryAlreadyBound(
                boundary_name.to_string(),
                owner.clone(),
            ));
        }
        if let Some(existing) = &self.inlets[idx].boundary {
            return Err(BoundaryError::InletAlreadyBound(
                inlet_name.to_string(),
                existing.clone(),
            ));
        }
        let nodes = mesh
            .boundaries
            .get(boundary_name)
            .ok_or_else(|| BoundaryError::UnknownBoundary(boundary_name.to_string()))?
            .clone();

        self.bound
            .insert(boundary_name.to_string(), inlet_name.to_string());
        let inlet = &mut self.inlets[idx];
        inlet.nodes = nodes;
        inlet.boundary = Some(boundary_name.to_string());
        Ok(())
    }

    /// Apply a queued command. Unknown inlet names fail.
    pub fn apply(&mut self, command: &InletCommand) -> Result<(), BoundaryError> {
        match command {
            InletCommand::ChangePressure { inlet, value, mode } => {
                let inlet = self.inlet_mut(inlet)?;
                match mode {
                    PressureMode::Set => inlet.pressure = *value,
                    PressureMode::Delta => inlet.pressure += *value,
                }
            }
            InletCommand::Open { inlet } => self.inlet_mut(inlet)?.open = true,
            InletCommand::Close { inlet } => self.inlet_mut(inlet)?.open = false,
        }
        Ok(())
    }

    /// Restore every inlet to its initial pressure and open state.
    pub fn reset(&mut self) {
        for inlet in &mut self.inlets {
            inlet.pressure = inlet.p0;
            inlet.open = true;
        }
    }

    /// All inlets, in creation order.
    pub fn inlets(&self) -> &[Inlet] {
        &self.inlets
    }

    /// Look up an inlet by name.
    pub fn inlet(&self, name: &str) -> Option<&Inlet> {
        self.index.get(name).map(|&i| &self.inlets[i])
    }

    /// Whether at least one bound inlet is open.
    pub fn any_open(&self) -> bool {
        self.inlets.iter().any(|i| i.open && !i.nodes.is_empty())
    }

    /// Dirichlet pairs (node, pressure) of all open inlets.
    pub fn open_dirichlet_nodes(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.inlets
            .iter()
            .filter(|i| i.open)
            .flat_map(|i| i.nodes.iter().map(move |&n| (n, i.pressure)))
    }

    /// Nodes of every bound inlet, open or closed.
    pub fn all_inlet_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.inlets.iter().flat_map(|i| i.nodes.iter().copied())
    }

    fn inlet_mut(&mut self, name: &str) -> Result<&mut Inlet, BoundaryError> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| BoundaryError::UnknownInlet(name.to_string()))?;
        Ok(&mut self.inlets[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshData;

    fn mesh() -> SurfaceMesh {
        SurfaceMesh::from_data(MeshData::rectangle(1.0, 0.5, 4, 2)).unwrap()
    }

    #[test]
    fn test_create_and_assign() {
        let mesh = mesh();
        let mut store = BoundaryStore::new();
        store.create_inlet(1e5, "inlet").unwrap();
        store.assign_inlet("inlet", "left_edge", &mesh).unwrap();

        let inlet = store.inlet("inlet").unwrap();
        assert_eq!(inlet.nodes, mesh.boundaries["left_edge"]);
        assert!(inlet.open);
        assert!(store.any_open());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mesh = mesh();
        let mut store = BoundaryStore::new();
        store.create_inlet(1e5, "inlet").unwrap();
        assert!(matches!(
            store.create_inlet(2e5, "inlet"),
            Err(BoundaryError::DuplicateInlet(_))
        ));
        store.assign_inlet("inlet", "left_edge", &mesh).unwrap();

        store.create_inlet(2e5, "other").unwrap();
        assert!(matches!(
            store.assign_inlet("other", "left_edge", &mesh),
            Err(BoundaryError::BoundaryAlreadyBound(_, _))
        ));
        assert!(matches!(
            store.assign_inlet("inlet", "right_edge", &mesh),
            Err(BoundaryError::InletAlreadyBound(_, _))
        ));
    }

    #[test]
    fn test_unknown_names_rejected() {
        let mesh = mesh();
        let mut store = BoundaryStore::new();
        assert!(matches!(
            store.assign_inlet("ghost", "left_edge", &mesh),
            Err(BoundaryError::UnknownInlet(_))
        ));
        store.create_inlet(1e5, "inlet").unwrap();
        assert!(matches!(
            store.assign_inlet("inlet", "ghost_edge", &mesh),
            Err(BoundaryError::UnknownBoundary(_))
        ));
    }

    #[test]
    fn test_pressure_commands() {
        let mesh = mesh();
        let mut store = BoundaryStore::new();
        store.create_inlet(1e5, "inlet").unwrap();
        store.assign_inlet("inlet", "left_edge", &mesh).unwrap();

        store
            .apply(&InletCommand::ChangePressure {
                inlet: "inlet".to_string(),
                value: -6e4,
                mode: PressureMode::Delta,
            })
            .unwrap();
        assert_eq!(store.inlet("inlet").unwrap().pressure, 4e4);

        store
            .apply(&InletCommand::ChangePressure {
                inlet: "inlet".to_string(),
                value: 2e5,
                mode: PressureMode::Set,
            })
            .unwrap();
        assert_eq!(store.inlet("inlet").unwrap().pressure, 2e5);

        store
            .apply(&InletCommand::Close {
                inlet: "inlet".to_string(),
            })
            .unwrap();
        assert!(!store.any_open());
        // Reopening keeps the last assigned pressure.
        store
            .apply(&InletCommand::Open {
                inlet: "inlet".to_string(),
            })
            .unwrap();
        assert_eq!(store.inlet("inlet").unwrap().pressure, 2e5);
        assert!(store.any_open());
    }

    #[test]
    fn test_reset_restores_initial_pressure() {
        let mesh = mesh();
        let mut store = BoundaryStore::new();
        store.create_inlet(1e5, "inlet").unwrap();
        store.assign_inlet("inlet", "left_edge", &mesh).unwrap();
        store
            .apply(&InletCommand::ChangePressure {
                inlet: "inlet".to_string(),
                value: 5e4,
                mode: PressureMode::Set,
            })
            .unwrap();
        store
            .apply(&InletCommand::Close {
                inlet: "inlet".to_string(),
            })
            .unwrap();

        store.reset();
        let inlet = store.inlet("inlet").unwrap();
        assert_eq!(inlet.pressure, 1e5);
        assert!(inlet.open);
    }

    #[test]
    fn test_open_dirichlet_nodes() {
        let mesh = mesh();
        let mut store = BoundaryStore::new();
        store.create_inlet(1e5, "left").unwrap();
        store.assign_inlet("left", "left_edge", &mesh).unwrap();
        store.create_inlet(3e4, "right").unwrap();
        store.assign_inlet("right", "right_edge", &mesh).unwrap();
        store
            .apply(&InletCommand::Close {
                inlet: "right".to_string(),
            })
            .unwrap();

        let pairs: Vec<(usize, f64)> = store.open_dirichlet_nodes().collect();
        assert_eq!(pairs.len(), mesh.boundaries["left_edge"].len());
        assert!(pairs.iter().all(|&(_, p)| p == 1e5));
    }
}
