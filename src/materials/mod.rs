//! Porous material definitions and per-element property resolution.
//!
//! Materials are created by name, then assigned to named mesh domains
//! together with an optional orientation [`Rosette`]. After all
//! assignments, [`MaterialStore::resolve`] rotates the principal
//! permeabilities into the global frame element by element:
//!
//! ```text
//! K_e = R diag(k₁, k₂, k₃) Rᵀ,   R = [ê₁ ê₂ ê₃]
//! ```

mod rosette;

pub use rosette::Rosette;

use std::collections::HashMap;

use glam::{DMat3, DVec3};
use thiserror::Error;

use crate::mesh::SurfaceMesh;

/// Error type for material configuration.
#[derive(Debug, Error)]
pub enum MaterialError {
    /// A material with this name already exists.
    #[error("material '{0}' already exists")]
    DuplicateMaterial(String),

    /// No material with this name has been created.
    #[error("material '{0}' not found; create it first with create_material")]
    UnknownMaterial(String),

    /// The mesh has no domain with this name.
    #[error("mesh contains no domain named '{0}'")]
    UnknownDomain(String),

    /// The domain already carries a material.
    #[error("domain '{0}' already has a material assigned")]
    DomainAlreadyAssigned(String),

    /// Porosity must lie strictly between 0 and 1.
    #[error("porosity must be in (0, 1), got {0}")]
    InvalidPorosity(f64),

    /// Thickness must be positive.
    #[error("thickness must be positive, got {0}")]
    InvalidThickness(f64),

    /// Principal permeabilities must be non-negative.
    #[error("negative principal permeability: {0}")]
    NegativePermeability(f64),

    /// Some element is not covered by any assignment.
    #[error("mesh contains unassigned material tag: element {0} has no material")]
    UnassignedElement(usize),

    /// The rosette direction has no in-plane component on some element.
    #[error("rosette direction is parallel to the normal of element {element} in domain '{domain}'")]
    RosetteParallelToNormal { domain: String, element: usize },
}

/// A porous material: principal permeabilities, porosity and thickness.
#[derive(Clone, Debug)]
pub struct PorousMaterial {
    /// Unique material name.
    pub name: String,
    /// Principal permeabilities (k₁, k₂, k₃) [m²].
    pub k_principal: [f64; 3],
    /// Volumetric porosity, in (0, 1).
    pub porosity: f64,
    /// Preform thickness [m].
    pub thickness: f64,
}

impl PorousMaterial {
    /// Whether all principal permeabilities coincide.
    pub fn is_isotropic(&self) -> bool {
        let [k1, k2, k3] = self.k_principal;
        k1 == k2 && k2 == k3
    }
}

/// Per-element material properties in the global frame, produced by
/// [`MaterialStore::resolve`].
#[derive(Clone, Debug)]
pub struct ElementProperties {
    /// Permeability tensor per element.
    pub permeability: Vec<DMat3>,
    /// Thickness per element.
    pub thickness: Vec<f64>,
    /// Porosity per element.
    pub porosity: Vec<f64>,
}

/// Store of named materials and their domain assignments.
#[derive(Clone, Debug, Default)]
pub struct MaterialStore {
    materials: HashMap<String, PorousMaterial>,
    /// Domain name -> (material name, rosette).
    assignments: HashMap<String, (String, Rosette)>,
}

impl MaterialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a material. The name must be unique; porosity must lie in
    /// (0, 1), thickness must be positive and permeabilities non-negative.
    pub fn create_material(
        &mut self,
        name: &str,
        k_principal: (f64, f64, f64),
        porosity: f64,
        thickness: f64,
    ) -> Result<(), MaterialError> {
        if self.materials.contains_key(name) {
            return Err(MaterialError::DuplicateMaterial(name.to_string()));
        }
        let (k1, k2, k3) = k_principal;
        for k in [k1, k2, k3] {
            if k < 0.0 {
                return Err(MaterialError::NegativePermeability(k));
            }
        }
        if !(porosity > 0.0 && porosity < 1.0) {
            return Err(MaterialError::InvalidPorosity(porosity));
        }
        if thickness <= 0.0 {
            return Err(MaterialError::InvalidThickness(thickness));
        }
        self.materials.insert(
            name.to_string(),
            PorousMaterial {
                name: name.to_string(),
                k_principal: [k1, k2, k3],
                porosity,
                thickness,
            },
        );
        Ok(())
    }

    /// Assign an existing material to a mesh domain.
    ///
    /// Without a rosette the first principal axis is aligned with global x.
    /// Fails if the material or domain is unknown, or the domain already
    /// carries an assignment. The domain name is validated against the
    /// mesh at [`resolve`](Self::resolve) time as well, so assignment order
    /// relative to mesh loading does not matter.
    pub fn assign_material(
        &mut self,
        material_name: &str,
        domain_name: &str,
        rosette: Option<Rosette>,
    ) -> Result<(), MaterialError> {
        if !self.materials.contains_key(material_name) {
            return Err(MaterialError::UnknownMaterial(material_name.to_string()));
        }
        if self.assignments.contains_key(domain_name) {
            return Err(MaterialError::DomainAlreadyAssigned(domain_name.to_string()));
        }
        self.assignments.insert(
            domain_name.to_string(),
            (material_name.to_string(), rosette.unwrap_or_default()),
        );
        Ok(())
    }

    /// Look up a material by name.
    pub fn material(&self, name: &str) -> Option<&PorousMaterial> {
        self.materials.get(name)
    }

    /// Rotate principal permeabilities into the global frame for every
    /// element of the mesh.
    ///
    /// Fails if an assignment names a domain the mesh does not have, if
    /// any element is left without a material, or if a rosette direction is
    /// parallel to an assigned element's normal.
    pub fn resolve(&self, mesh: &SurfaceMesh) -> Result<ElementProperties, MaterialError> {
        let n = mesh.n_elements();
        let mut permeability = vec![None; n];
        let mut thickness = vec![0.0; n];
        let mut porosity = vec![0.0; n];

        for (domain, (material_name, rosette)) in &self.assignments {
            let elements = mesh
                .domains
                .get(domain)
                .ok_or_else(|| MaterialError::UnknownDomain(domain.clone()))?;
            let material = &self.materials[material_name];
            let [k1, k2, k3] = material.k_principal;
            let k_diag = DMat3::from_diagonal(DVec3::new(k1, k2, k3));

            for &e in elements {
                let normal = mesh.geometry[e].normal;
                let k = if material.is_isotropic() {
                    // An isotropic tensor is invariant under rotation.
                    k_diag
                } else {
                    let (e1, e2, e3) = rosette.element_basis(normal).ok_or_else(|| {
                        MaterialError::RosetteParallelToNormal {
                            domain: domain.clone(),
                            element: e,
                        }
                    })?;
                    let r = DMat3::from_cols(e1, e2, e3);
                    r * k_diag * r.transpose()
                };
                permeability[e] = Some(k);
                thickness[e] = material.thickness;
                porosity[e] = material.porosity;
            }
        }

        let permeability = permeability
            .into_iter()
            .enumerate()
            .map(|(e, k)| k.ok_or(MaterialError::UnassignedElement(e)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ElementProperties {
            permeability,
            thickness,
            porosity,
        })
    }
}
