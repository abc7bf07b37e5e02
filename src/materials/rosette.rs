//! Material orientation rosettes.
//!
//! A rosette defines the direction of the first principal permeability
//! axis in the global frame. Per element the reference direction is
//! projected onto the element plane, yielding a local orthonormal basis
//! (ê₁, ê₂, ê₃) with ê₃ the element normal and ê₂ = ê₃ × ê₁.

use glam::DVec3;

/// Reference direction for the first principal permeability axis.
///
/// Can be given directly as a vector or as a pair of points whose
/// difference defines the direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rosette {
    /// Direction vector in the global frame.
    Direction(DVec3),
    /// Two points; the direction runs from the first to the second.
    TwoPoint(DVec3, DVec3),
}

impl Rosette {
    /// The (unnormalised) reference direction.
    pub fn direction(&self) -> DVec3 {
        match self {
            Rosette::Direction(u) => *u,
            Rosette::TwoPoint(p, q) => *q - *p,
        }
    }

    /// Local orthonormal basis for an element with the given unit normal.
    ///
    /// Returns `None` when the reference direction is (numerically)
    /// parallel to the normal, leaving no in-plane component to project.
    pub fn element_basis(&self, normal: DVec3) -> Option<(DVec3, DVec3, DVec3)> {
        let u = self.direction();
        let in_plane = u - u.dot(normal) * normal;
        if in_plane.length() <= 1e-9 * u.length() {
            return None;
        }
        let e1 = in_plane.normalize();
        let e2 = normal.cross(e1);
        Some((e1, e2, normal))
    }
}

impl Default for Rosette {
    /// First principal axis aligned with global x.
    fn default() -> Self {
        Rosette::Direction(DVec3::X)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_point_direction() {
        let rosette = Rosette::TwoPoint(DVec3::new(1.0, 1.0, 0.0), DVec3::new(3.0, 1.0, 0.0));
        assert_eq!(rosette.direction(), DVec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_basis_is_orthonormal() {
        let rosette = Rosette::Direction(DVec3::new(1.0, 1.0, 0.5));
        let normal = DVec3::new(0.0, 0.0, 1.0);
        let (e1, e2, e3) = rosette.element_basis(normal).unwrap();

        assert!((e1.length() - 1.0).abs() < 1e-14);
        assert!((e2.length() - 1.0).abs() < 1e-14);
        assert!(e1.dot(e2).abs() < 1e-14);
        assert!(e1.dot(e3).abs() < 1e-14);
        assert!(e2.dot(e3).abs() < 1e-14);
        // ê₁ is the in-plane projection of the reference direction.
        assert!(e1.dot(DVec3::new(1.0, 1.0, 0.0).normalize()) > 1.0 - 1e-12);
    }

    #[test]
    fn test_parallel_to_normal_rejected() {
        let rosette = Rosette::Direction(DVec3::Z);
        assert!(rosette.element_basis(DVec3::Z).is_none());
        // A tiny in-plane component below tolerance is also rejected.
        let nearly = Rosette::Direction(DVec3::new(1e-12, 0.0, 1.0));
        assert!(nearly.element_basis(DVec3::Z).is_none());
    }

    #[test]
    fn test_tilted_element() {
        let normal = DVec3::new(1.0, 0.0, 1.0).normalize();
        let rosette = Rosette::default();
        let (e1, _, _) = rosette.element_basis(normal).unwrap();
        // Projection of x̂ onto the tilted plane.
        assert!(e1.dot(normal).abs() < 1e-14);
        assert!((e1 - DVec3::new(0.5, 0.0, -0.5).normalize()).length() < 1e-12);
    }
}
