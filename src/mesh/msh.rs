//! Gmsh MSH file reading.
//!
//! Supports the MSH format version 4.1 (ASCII). The reader produces a
//! [`MeshData`] with:
//! - node coordinates,
//! - triangle connectivity (0-based),
//! - named node sets from physical curves ("physical lines"),
//! - named element sets from physical surfaces.
//!
//! ## Supported element types
//! - 2 = Triangle (3-node)
//! - 1 = Line (2-node, collected into boundary node sets)
//! - 15 = Point (skipped)
//!
//! Any other element type is rejected: the engine only operates on 2D
//! triangular meshes.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use glam::DVec3;
use thiserror::Error;

use super::surface::MeshData;

/// Error type for MSH reading.
#[derive(Debug, Error)]
pub enum MshError {
    /// File could not be opened or read.
    #[error("I/O error reading mesh: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file contents.
    #[error("parse error: {0}")]
    Parse(String),

    /// Unsupported mesh format version (only 4.x ASCII is accepted).
    #[error("unsupported MSH version: {0}")]
    UnsupportedVersion(String),

    /// Element type the engine cannot consume.
    #[error("unsupported element type {0}: mesh must be 2D triangular")]
    UnsupportedElement(i32),

    /// A required section was absent.
    #[error("missing section: {0}")]
    MissingSection(String),
}

type Lines = std::io::Lines<BufReader<File>>;

/// Read a Gmsh MSH 4.1 ASCII file into raw mesh data.
pub fn read_msh_file(path: &Path) -> Result<MeshData, MshError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    // (dim, physical tag) -> name
    let mut physical_names: HashMap<(i32, i32), String> = HashMap::new();
    // curve entity tag -> physical tags; surface entity tag -> physical tags
    let mut curve_physicals: HashMap<i32, Vec<i32>> = HashMap::new();
    let mut surface_physicals: HashMap<i32, Vec<i32>> = HashMap::new();
    let mut nodes: Vec<DVec3> = Vec::new();
    let mut node_index: HashMap<u64, usize> = HashMap::new();
    let mut elements: Option<ElementData> = None;

    while let Some(line) = lines.next() {
        let line = line?;
        let line = line.trim();
        if line.starts_with("$MeshFormat") {
            parse_mesh_format(&mut lines)?;
        } else if line.starts_with("$PhysicalNames") {
            physical_names = parse_physical_names(&mut lines)?;
        } else if line.starts_with("$Entities") {
            let (curves, surfaces) = parse_entities(&mut lines)?;
            curve_physicals = curves;
            surface_physicals = surfaces;
        } else if line.starts_with("$Nodes") {
            (nodes, node_index) = parse_nodes(&mut lines)?;
        } else if line.starts_with("$Elements") {
            elements = Some(parse_elements(&mut lines, &node_index)?);
        } else if line.starts_with('$') && !line.starts_with("$End") {
            skip_section(&mut lines, line)?;
        }
    }

    if nodes.is_empty() {
        return Err(MshError::MissingSection("Nodes".to_string()));
    }
    let elements = elements.ok_or_else(|| MshError::MissingSection("Elements".to_string()))?;
    if elements.triangles.is_empty() {
        return Err(MshError::MissingSection("Elements (triangles)".to_string()));
    }

    // Resolve physical tags into named sets.
    let mut boundaries: HashMap<String, Vec<usize>> = HashMap::new();
    for (curve_tag, line_nodes) in &elements.curve_nodes {
        let Some(physicals) = curve_physicals.get(curve_tag) else {
            continue;
        };
        for phys in physicals {
            if let Some(name) = physical_names.get(&(1, *phys)) {
                boundaries
                    .entry(name.clone())
                    .or_default()
                    .extend(line_nodes.iter().copied());
            }
        }
    }
    for set in boundaries.values_mut() {
        set.sort_unstable();
        set.dedup();
    }

    let mut domains: HashMap<String, Vec<usize>> = HashMap::new();
    for (surface_tag, element_ids) in &elements.surface_elements {
        let Some(physicals) = surface_physicals.get(surface_tag) else {
            continue;
        };
        for phys in physicals {
            if let Some(name) = physical_names.get(&(2, *phys)) {
                domains
                    .entry(name.clone())
                    .or_default()
                    .extend(element_ids.iter().copied());
            }
        }
    }
    for set in domains.values_mut() {
        set.sort_unstable();
        set.dedup();
    }

    Ok(MeshData {
        nodes,
        triangles: elements.triangles,
        boundaries,
        domains,
    })
}

/// Triangles plus raw per-entity bookkeeping from `$Elements`.
struct ElementData {
    triangles: Vec<[usize; 3]>,
    /// Curve entity tag -> node indices of its line elements.
    curve_nodes: HashMap<i32, Vec<usize>>,
    /// Surface entity tag -> triangle indices.
    surface_elements: HashMap<i32, Vec<usize>>,
}

fn next_content_line(lines: &mut Lines) -> Result<String, MshError> {
    match lines.next() {
        Some(line) => Ok(line?.trim().to_string()),
        None => Err(MshError::Parse("unexpected end of file".to_string())),
    }
}

fn parse_mesh_format(lines: &mut Lines) -> Result<(), MshError> {
    let line = next_content_line(lines)?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(MshError::Parse(format!("invalid MeshFormat line: {line}")));
    }
    if !parts[0].starts_with("4.") && parts[0] != "4" {
        return Err(MshError::UnsupportedVersion(parts[0].to_string()));
    }
    if parts[1] != "0" {
        return Err(MshError::UnsupportedVersion(format!(
            "{} (binary)",
            parts[0]
        )));
    }
    skip_to_end(lines, "$EndMeshFormat")
}

fn parse_physical_names(lines: &mut Lines) -> Result<HashMap<(i32, i32), String>, MshError> {
    let count: usize = next_content_line(lines)?
        .parse()
        .map_err(|_| MshError::Parse("invalid physical name count".to_string()))?;

    let mut names = HashMap::with_capacity(count);
    for _ in 0..count {
        let line = next_content_line(lines)?;
        let parts: Vec<&str> = line.splitn(3, char::is_whitespace).collect();
        if parts.len() < 3 {
            return Err(MshError::Parse(format!("invalid physical name: {line}")));
        }
        let dim: i32 = parts[0]
            .parse()
            .map_err(|_| MshError::Parse(format!("invalid physical dimension: {}", parts[0])))?;
        let tag: i32 = parts[1]
            .parse()
            .map_err(|_| MshError::Parse(format!("invalid physical tag: {}", parts[1])))?;
        let name = parts[2].trim().trim_matches('"').to_string();
        names.insert((dim, tag), name);
    }
    skip_to_end(lines, "$EndPhysicalNames")?;
    Ok(names)
}

type EntityPhysicals = HashMap<i32, Vec<i32>>;

/// Parse `$Entities`, keeping the physical tags of curves and surfaces.
fn parse_entities(lines: &mut Lines) -> Result<(EntityPhysicals, EntityPhysicals), MshError> {
    let header = next_content_line(lines)?;
    let counts: Vec<usize> = header
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|_| MshError::Parse(format!("invalid Entities header: {header}")))?;
    if counts.len() != 4 {
        return Err(MshError::Parse(format!("invalid Entities header: {header}")));
    }
    let (n_points, n_curves, n_surfaces, n_volumes) =
        (counts[0], counts[1], counts[2], counts[3]);

    // Point entities: tag x y z numPhysical [tags...]
    for _ in 0..n_points {
        next_content_line(lines)?;
    }

    let mut curves = HashMap::with_capacity(n_curves);
    for _ in 0..n_curves {
        let (tag, physicals) = parse_bounded_entity(&next_content_line(lines)?)?;
        curves.insert(tag, physicals);
    }

    let mut surfaces = HashMap::with_capacity(n_surfaces);
    for _ in 0..n_surfaces {
        let (tag, physicals) = parse_bounded_entity(&next_content_line(lines)?)?;
        surfaces.insert(tag, physicals);
    }

    for _ in 0..n_volumes {
        next_content_line(lines)?;
    }

    skip_to_end(lines, "$EndEntities")?;
    Ok((curves, surfaces))
}

/// Parse a curve/surface/volume entity line:
/// `tag minX minY minZ maxX maxY maxZ numPhysical [tags...] numBounding [tags...]`
fn parse_bounded_entity(line: &str) -> Result<(i32, Vec<i32>), MshError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 8 {
        return Err(MshError::Parse(format!("invalid entity line: {line}")));
    }
    let tag: i32 = parts[0]
        .parse()
        .map_err(|_| MshError::Parse(format!("invalid entity tag: {}", parts[0])))?;
    let n_physical: usize = parts[7]
        .parse()
        .map_err(|_| MshError::Parse(format!("invalid physical count: {}", parts[7])))?;
    if parts.len() < 8 + n_physical {
        return Err(MshError::Parse(format!("truncated entity line: {line}")));
    }
    let physicals = parts[8..8 + n_physical]
        .iter()
        .map(|t| {
            t.parse::<i32>()
                .map_err(|_| MshError::Parse(format!("invalid physical tag: {t}")))
        })
        .collect::<Result<_, _>>()?;
    Ok((tag, physicals))
}

#[allow(clippy::type_complexity)]
fn parse_nodes(lines: &mut Lines) -> Result<(Vec<DVec3>, HashMap<u64, usize>), MshError> {
    let header = next_content_line(lines)?;
    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() != 4 {
        return Err(MshError::Parse(format!("invalid Nodes header: {header}")));
    }
    let n_blocks: usize = parts[0]
        .parse()
        .map_err(|_| MshError::Parse("invalid node block count".to_string()))?;
    let n_nodes: usize = parts[1]
        .parse()
        .map_err(|_| MshError::Parse("invalid node count".to_string()))?;

    let mut nodes = Vec::with_capacity(n_nodes);
    let mut node_index = HashMap::with_capacity(n_nodes);

    for _ in 0..n_blocks {
        let block = next_content_line(lines)?;
        let parts: Vec<&str> = block.split_whitespace().collect();
        if parts.len() != 4 {
            return Err(MshError::Parse(format!("invalid node block: {block}")));
        }
        let block_size: usize = parts[3]
            .parse()
            .map_err(|_| MshError::Parse(format!("invalid node block size: {}", parts[3])))?;

        // Tags first, then one coordinate line per tag.
        let mut tags = Vec::with_capacity(block_size);
        for _ in 0..block_size {
            let tag: u64 = next_content_line(lines)?
                .parse()
                .map_err(|_| MshError::Parse("invalid node tag".to_string()))?;
            tags.push(tag);
        }
        for tag in tags {
            let coords = next_content_line(lines)?;
            let xyz: Vec<f64> = coords
                .split_whitespace()
                .take(3)
                .map(|t| t.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| MshError::Parse(format!("invalid node coordinates: {coords}")))?;
            if xyz.len() != 3 {
                return Err(MshError::Parse(format!("invalid node coordinates: {coords}")));
            }
            node_index.insert(tag, nodes.len());
            nodes.push(DVec3::new(xyz[0], xyz[1], xyz[2]));
        }
    }

    skip_to_end(lines, "$EndNodes")?;
    Ok((nodes, node_index))
}

fn parse_elements(
    lines: &mut Lines,
    node_index: &HashMap<u64, usize>,
) -> Result<ElementData, MshError> {
    let header = next_content_line(lines)?;
    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() != 4 {
        return Err(MshError::Parse(format!("invalid Elements header: {header}")));
    }
    let n_blocks: usize = parts[0]
        .parse()
        .map_err(|_| MshError::Parse("invalid element block count".to_string()))?;

    let mut data = ElementData {
        triangles: Vec::new(),
        curve_nodes: HashMap::new(),
        surface_elements: HashMap::new(),
    };

    for _ in 0..n_blocks {
        let block = next_content_line(lines)?;
        let parts: Vec<&str> = block.split_whitespace().collect();
        if parts.len() != 4 {
            return Err(MshError::Parse(format!("invalid element block: {block}")));
        }
        let _entity_dim: i32 = parts[0]
            .parse()
            .map_err(|_| MshError::Parse(format!("invalid entity dimension: {}", parts[0])))?;
        let entity_tag: i32 = parts[1]
            .parse()
            .map_err(|_| MshError::Parse(format!("invalid entity tag: {}", parts[1])))?;
        let element_type: i32 = parts[2]
            .parse()
            .map_err(|_| MshError::Parse(format!("invalid element type: {}", parts[2])))?;
        let block_size: usize = parts[3]
            .parse()
            .map_err(|_| MshError::Parse(format!("invalid element block size: {}", parts[3])))?;

        match element_type {
            // 2-node line: contributes to boundary node sets.
            1 => {
                for _ in 0..block_size {
                    let tags = parse_element_nodes(&next_content_line(lines)?, 2, node_index)?;
                    data.curve_nodes
                        .entry(entity_tag)
                        .or_default()
                        .extend(tags);
                }
            }
            // 3-node triangle.
            2 => {
                for _ in 0..block_size {
                    let tags = parse_element_nodes(&next_content_line(lines)?, 3, node_index)?;
                    data.surface_elements
                        .entry(entity_tag)
                        .or_default()
                        .push(data.triangles.len());
                    data.triangles.push([tags[0], tags[1], tags[2]]);
                }
            }
            // Isolated points carry no field data.
            15 => {
                for _ in 0..block_size {
                    next_content_line(lines)?;
                }
            }
            other => return Err(MshError::UnsupportedElement(other)),
        }
    }

    skip_to_end(lines, "$EndElements")?;
    Ok(data)
}

/// Parse `elementTag node...` and map node tags to 0-based indices.
fn parse_element_nodes(
    line: &str,
    n: usize,
    node_index: &HashMap<u64, usize>,
) -> Result<Vec<usize>, MshError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 1 + n {
        return Err(MshError::Parse(format!("invalid element line: {line}")));
    }
    parts[1..1 + n]
        .iter()
        .map(|t| {
            let tag: u64 = t
                .parse()
                .map_err(|_| MshError::Parse(format!("invalid node tag: {t}")))?;
            node_index
                .get(&tag)
                .copied()
                .ok_or_else(|| MshError::Parse(format!("element references unknown node {tag}")))
        })
        .collect()
}

fn skip_to_end(lines: &mut Lines, terminator: &str) -> Result<(), MshError> {
    for line in lines.by_ref() {
        if line?.trim().starts_with(terminator) {
            return Ok(());
        }
    }
    Err(MshError::Parse(format!("missing {terminator}")))
}

/// Skip an unrecognised `$Section` up to its `$EndSection`.
fn skip_section(lines: &mut Lines, header: &str) -> Result<(), MshError> {
    let name = header.trim_start_matches('$');
    skip_to_end(lines, &format!("$End{name}"))
}
