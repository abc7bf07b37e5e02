//! Triangular surface mesh representation.
//!
//! The mesh stores:
//! - Node coordinates in 3D (the surface may be curved or tilted)
//! - Triangle-node connectivity (counter-clockwise ordering)
//! - Per-element geometry: unit normal, area, centroid, shape-function
//!   gradients
//! - Named node sets ("physical lines") used to bind inlets
//! - Named element sets ("physical surfaces") used to assign materials
//!
//! Geometry is precomputed once at construction. For a triangle with nodes
//! (p0, p1, p2) the in-plane gradient of the linear shape function of node
//! `a` is
//!
//! ```text
//! ∇N_a = n̂ × e_a / (2A)
//! ```
//!
//! where `e_a` is the edge opposite node `a` (e_0 = p2 − p1, e_1 = p0 − p2,
//! e_2 = p1 − p0) and `n̂ = (p1 − p0) × (p2 − p0) / ‖·‖`.

use std::collections::HashMap;

use glam::DVec3;
use thiserror::Error;

/// Error type for mesh construction and validation.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Mesh contains no triangles.
    #[error("mesh contains no triangles")]
    Empty,

    /// A triangle references a node index outside the node table.
    #[error("element {element} references node {node}, but the mesh has {n_nodes} nodes")]
    NodeOutOfBounds {
        element: usize,
        node: usize,
        n_nodes: usize,
    },

    /// A triangle has (numerically) zero area.
    #[error("element {0} has zero area")]
    ZeroArea(usize),

    /// A named node set references a node outside the node table.
    #[error("boundary '{name}' references node {node}, but the mesh has {n_nodes} nodes")]
    BoundaryNodeOutOfBounds {
        name: String,
        node: usize,
        n_nodes: usize,
    },

    /// A named element set references an element outside the element table.
    #[error("domain '{name}' references element {element}, but the mesh has {n_elements} elements")]
    DomainElementOutOfBounds {
        name: String,
        element: usize,
        n_elements: usize,
    },
}

/// Raw mesh input, as produced by the mesh reader or a generator.
///
/// Node indices are 0-based. `boundaries` maps physical-line names to node
/// sets; `domains` maps physical-surface names to element sets.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    /// Node coordinates.
    pub nodes: Vec<DVec3>,
    /// Triangle connectivity, counter-clockwise.
    pub triangles: Vec<[usize; 3]>,
    /// Named node sets (physical lines).
    pub boundaries: HashMap<String, Vec<usize>>,
    /// Named element sets (physical surfaces).
    pub domains: HashMap<String, Vec<usize>>,
}

impl MeshData {
    /// Structured triangulation of the rectangle [0, width] × [0, height]
    /// in the z = 0 plane.
    ///
    /// Each grid quad is split along its (v0, v2) diagonal. Boundary node
    /// sets are named `left_edge`, `right_edge`, `bottom_edge`, `top_edge`;
    /// all elements belong to the `domain` element set.
    pub fn rectangle(width: f64, height: f64, nx: usize, ny: usize) -> Self {
        assert!(nx > 0 && ny > 0, "need at least one cell in each direction");
        assert!(width > 0.0 && height > 0.0, "invalid rectangle bounds");

        let dx = width / nx as f64;
        let dy = height / ny as f64;

        let mut nodes = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                nodes.push(DVec3::new(i as f64 * dx, j as f64 * dy, 0.0));
            }
        }

        let idx = |i: usize, j: usize| j * (nx + 1) + i;
        let mut triangles = Vec::with_capacity(2 * nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let v0 = idx(i, j);
                let v1 = idx(i + 1, j);
                let v2 = idx(i + 1, j + 1);
                let v3 = idx(i, j + 1);
                triangles.push([v0, v1, v2]);
                triangles.push([v0, v2, v3]);
            }
        }

        let mut boundaries = HashMap::new();
        boundaries.insert(
            "left_edge".to_string(),
            (0..=ny).map(|j| idx(0, j)).collect(),
        );
        boundaries.insert(
            "right_edge".to_string(),
            (0..=ny).map(|j| idx(nx, j)).collect(),
        );
        boundaries.insert(
            "bottom_edge".to_string(),
            (0..=nx).map(|i| idx(i, 0)).collect(),
        );
        boundaries.insert(
            "top_edge".to_string(),
            (0..=nx).map(|i| idx(i, ny)).collect(),
        );

        let mut domains = HashMap::new();
        domains.insert("domain".to_string(), (0..triangles.len()).collect());

        Self {
            nodes,
            triangles,
            boundaries,
            domains,
        }
    }

    /// Structured triangulation of an annulus centred on the origin in the
    /// z = 0 plane.
    ///
    /// `n_radial` cells between `r_inner` and `r_outer`, `n_ring` cells
    /// around the circumference. Boundary node sets are `inner_edge` and
    /// `outer_edge`; all elements belong to `domain`.
    pub fn annulus(r_inner: f64, r_outer: f64, n_radial: usize, n_ring: usize) -> Self {
        assert!(r_outer > r_inner && r_inner > 0.0, "invalid annulus radii");
        assert!(n_radial > 0 && n_ring >= 3, "annulus resolution too low");

        let dr = (r_outer - r_inner) / n_radial as f64;
        let dtheta = std::f64::consts::TAU / n_ring as f64;

        let mut nodes = Vec::with_capacity((n_radial + 1) * n_ring);
        for j in 0..=n_radial {
            let r = r_inner + j as f64 * dr;
            for i in 0..n_ring {
                let theta = i as f64 * dtheta;
                nodes.push(DVec3::new(r * theta.cos(), r * theta.sin(), 0.0));
            }
        }

        let idx = |i: usize, j: usize| j * n_ring + i % n_ring;
        let mut triangles = Vec::with_capacity(2 * n_radial * n_ring);
        for j in 0..n_radial {
            for i in 0..n_ring {
                let v0 = idx(i, j);
                let v1 = idx(i + 1, j);
                let v2 = idx(i + 1, j + 1);
                let v3 = idx(i, j + 1);
                triangles.push([v0, v1, v2]);
                triangles.push([v0, v2, v3]);
            }
        }

        let mut boundaries = HashMap::new();
        boundaries.insert("inner_edge".to_string(), (0..n_ring).collect());
        boundaries.insert(
            "outer_edge".to_string(),
            (0..n_ring).map(|i| idx(i, n_radial)).collect(),
        );

        let mut domains = HashMap::new();
        domains.insert("domain".to_string(), (0..triangles.len()).collect());

        Self {
            nodes,
            triangles,
            boundaries,
            domains,
        }
    }
}

/// Per-element precomputed geometry.
#[derive(Clone, Debug)]
pub struct TriangleGeometry {
    /// Outward unit normal.
    pub normal: DVec3,
    /// Element area.
    pub area: f64,
    /// Element centroid.
    pub centroid: DVec3,
    /// In-plane gradients of the three linear shape functions,
    /// `grad[a] = ∇N_a` for local node `a`.
    pub grad: [DVec3; 3],
}

/// Validated triangular surface mesh with precomputed element geometry.
#[derive(Clone, Debug)]
pub struct SurfaceMesh {
    /// Node coordinates.
    pub nodes: Vec<DVec3>,
    /// Triangle connectivity.
    pub triangles: Vec<[usize; 3]>,
    /// Per-element geometry, same order as `triangles`.
    pub geometry: Vec<TriangleGeometry>,
    /// Elements incident to each node.
    pub node_elements: Vec<Vec<usize>>,
    /// Nodes sharing an element with each node (sorted, excludes the node
    /// itself). This equals the mesh-edge adjacency and is used as the
    /// sparsity pattern of the pressure system.
    pub node_neighbors: Vec<Vec<usize>>,
    /// Named node sets (physical lines).
    pub boundaries: HashMap<String, Vec<usize>>,
    /// Named element sets (physical surfaces).
    pub domains: HashMap<String, Vec<usize>>,
}

impl SurfaceMesh {
    /// Build and validate a mesh from raw mesh data.
    pub fn from_data(data: MeshData) -> Result<Self, MeshError> {
        if data.triangles.is_empty() {
            return Err(MeshError::Empty);
        }
        let n_nodes = data.nodes.len();

        for (e, tri) in data.triangles.iter().enumerate() {
            for &v in tri {
                if v >= n_nodes {
                    return Err(MeshError::NodeOutOfBounds {
                        element: e,
                        node: v,
                        n_nodes,
                    });
                }
            }
        }
        for (name, set) in &data.boundaries {
            for &v in set {
                if v >= n_nodes {
                    return Err(MeshError::BoundaryNodeOutOfBounds {
                        name: name.clone(),
                        node: v,
                        n_nodes,
                    });
                }
            }
        }
        let n_elements = data.triangles.len();
        for (name, set) in &data.domains {
            for &e in set {
                if e >= n_elements {
                    return Err(MeshError::DomainElementOutOfBounds {
                        name: name.clone(),
                        element: e,
                        n_elements,
                    });
                }
            }
        }

        let mut geometry = Vec::with_capacity(n_elements);
        for (e, tri) in data.triangles.iter().enumerate() {
            let p0 = data.nodes[tri[0]];
            let p1 = data.nodes[tri[1]];
            let p2 = data.nodes[tri[2]];

            let cross = (p1 - p0).cross(p2 - p0);
            let twice_area = cross.length();
            if twice_area <= f64::EPSILON * (p1 - p0).length() * (p2 - p0).length() {
                return Err(MeshError::ZeroArea(e));
            }
            let normal = cross / twice_area;
            let area = 0.5 * twice_area;
            let centroid = (p0 + p1 + p2) / 3.0;

            // Opposite edges: e_a faces local node a.
            let edges = [p2 - p1, p0 - p2, p1 - p0];
            let grad = [
                normal.cross(edges[0]) / twice_area,
                normal.cross(edges[1]) / twice_area,
                normal.cross(edges[2]) / twice_area,
            ];

            geometry.push(TriangleGeometry {
                normal,
                area,
                centroid,
                grad,
            });
        }

        let mut node_elements = vec![Vec::new(); n_nodes];
        for (e, tri) in data.triangles.iter().enumerate() {
            for &v in tri {
                node_elements[v].push(e);
            }
        }

        let mut node_neighbors: Vec<Vec<usize>> = vec![Vec::new(); n_nodes];
        for tri in &data.triangles {
            for &v in tri {
                for &w in tri {
                    if v != w && !node_neighbors[v].contains(&w) {
                        node_neighbors[v].push(w);
                    }
                }
            }
        }
        for list in &mut node_neighbors {
            list.sort_unstable();
        }

        Ok(Self {
            nodes: data.nodes,
            triangles: data.triangles,
            geometry,
            node_elements,
            node_neighbors,
            boundaries: data.boundaries,
            domains: data.domains,
        })
    }

    /// Number of nodes.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn n_elements(&self) -> usize {
        self.triangles.len()
    }

    /// Node coordinates of an element.
    #[inline]
    pub fn element_nodes(&self, e: usize) -> [DVec3; 3] {
        let [a, b, c] = self.triangles[e];
        [self.nodes[a], self.nodes[b], self.nodes[c]]
    }

    /// Total surface area.
    pub fn total_area(&self) -> f64 {
        self.geometry.iter().map(|g| g.area).sum()
    }

    /// Barycentric coordinates of a point projected onto an element plane,
    /// together with the out-of-plane distance.
    ///
    /// The weights sum to one; the point lies inside the triangle when all
    /// three are non-negative (up to tolerance).
    pub fn barycentric(&self, e: usize, point: DVec3) -> ([f64; 3], f64) {
        let geom = &self.geometry[e];
        let p0 = self.nodes[self.triangles[e][0]];
        let offset = (point - p0).dot(geom.normal);
        let projected = point - offset * geom.normal;

        // N_a is affine with gradient grad[a] and value 1 at node a.
        let [a, b, c] = self.triangles[e];
        let w0 = 1.0 + geom.grad[0].dot(projected - self.nodes[a]);
        let w1 = 1.0 + geom.grad[1].dot(projected - self.nodes[b]);
        let w2 = 1.0 + geom.grad[2].dot(projected - self.nodes[c]);
        ([w0, w1, w2], offset.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_counts() {
        let data = MeshData::rectangle(1.0, 0.5, 4, 2);
        assert_eq!(data.nodes.len(), 15);
        assert_eq!(data.triangles.len(), 16);
        assert_eq!(data.boundaries["left_edge"].len(), 3);
        assert_eq!(data.boundaries["bottom_edge"].len(), 5);
        assert_eq!(data.domains["domain"].len(), 16);
    }

    #[test]
    fn test_rectangle_geometry() {
        let mesh = SurfaceMesh::from_data(MeshData::rectangle(1.0, 0.5, 4, 2)).unwrap();
        assert!((mesh.total_area() - 0.5).abs() < 1e-12);
        for geom in &mesh.geometry {
            // Flat mesh in the z = 0 plane: all normals point +z.
            assert!((geom.normal - DVec3::Z).length() < 1e-12);
        }
    }

    #[test]
    fn test_shape_function_gradients() {
        let mesh = SurfaceMesh::from_data(MeshData::rectangle(2.0, 1.0, 2, 1)).unwrap();
        for (e, tri) in mesh.triangles.iter().enumerate() {
            let geom = &mesh.geometry[e];
            for a in 0..3 {
                for b in 0..3 {
                    // ∇N_a · (p_b - p_c) must reproduce the Kronecker
                    // property of linear shape functions.
                    let expected = if a == b { 1.0 } else { 0.0 };
                    let pa = mesh.nodes[tri[a]];
                    let pb = mesh.nodes[tri[b]];
                    let value = 1.0 + geom.grad[a].dot(pb - pa);
                    assert!(
                        (value - expected).abs() < 1e-12,
                        "element {e}: N_{a}(p_{b}) = {value}, expected {expected}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_gradients_sum_to_zero() {
        let mesh = SurfaceMesh::from_data(MeshData::annulus(0.1, 0.5, 3, 12)).unwrap();
        for geom in &mesh.geometry {
            let sum = geom.grad[0] + geom.grad[1] + geom.grad[2];
            assert!(sum.length() < 1e-12);
        }
    }

    #[test]
    fn test_annulus_area() {
        let mesh = SurfaceMesh::from_data(MeshData::annulus(0.1, 0.5, 16, 128)).unwrap();
        let exact = std::f64::consts::PI * (0.5f64.powi(2) - 0.1f64.powi(2));
        // Polygonal approximation under-estimates the circles slightly.
        assert!((mesh.total_area() - exact).abs() / exact < 1e-2);
        assert_eq!(mesh.boundaries["inner_edge"].len(), 128);
        assert_eq!(mesh.boundaries["outer_edge"].len(), 128);
    }

    #[test]
    fn test_zero_area_rejected() {
        let data = MeshData {
            nodes: vec![DVec3::ZERO, DVec3::X, DVec3::new(2.0, 0.0, 0.0)],
            triangles: vec![[0, 1, 2]],
            boundaries: HashMap::new(),
            domains: HashMap::new(),
        };
        assert!(matches!(
            SurfaceMesh::from_data(data),
            Err(MeshError::ZeroArea(0))
        ));
    }

    #[test]
    fn test_bad_index_rejected() {
        let data = MeshData {
            nodes: vec![DVec3::ZERO, DVec3::X, DVec3::Y],
            triangles: vec![[0, 1, 7]],
            boundaries: HashMap::new(),
            domains: HashMap::new(),
        };
        assert!(matches!(
            SurfaceMesh::from_data(data),
            Err(MeshError::NodeOutOfBounds { node: 7, .. })
        ));
    }

    #[test]
    fn test_node_adjacency_symmetric() {
        let mesh = SurfaceMesh::from_data(MeshData::rectangle(1.0, 1.0, 3, 3)).unwrap();
        for (i, neighbors) in mesh.node_neighbors.iter().enumerate() {
            assert!(!neighbors.contains(&i));
            for &j in neighbors {
                assert!(mesh.node_neighbors[j].contains(&i));
            }
        }
    }

    #[test]
    fn test_barycentric_containment() {
        let mesh = SurfaceMesh::from_data(MeshData::rectangle(1.0, 1.0, 1, 1)).unwrap();
        // Centroid of element 0 is inside it.
        let c = mesh.geometry[0].centroid;
        let (w, dist) = mesh.barycentric(0, c);
        assert!(dist < 1e-12);
        assert!((w[0] + w[1] + w[2] - 1.0).abs() < 1e-12);
        assert!(w.iter().all(|&wi| wi > 0.0));
        // A corner of the other element is outside element 0.
        let (w, _) = mesh.barycentric(1, mesh.nodes[mesh.triangles[0][1]]);
        assert!((w[0] + w[1] + w[2] - 1.0).abs() < 1e-12);
    }
}
