//! Unstructured Voronoi mesh: connectivity and geometry
//!
//! The host model owns the mesh; the diagnostics keep a shared read-only
//! handle (`Arc<Mesh>`). Conventions follow the C-grid staggering of
//! Voronoi-based dynamical cores:
//!
//! - Normal velocity lives on edges; the positive normal of edge `e` points
//!   from `cells_on_edge[e][0]` to `cells_on_edge[e][1]`.
//! - Each dual vertex (triangle) is bounded by three edges; the circulation
//!   sign of each edge makes the line integral counter-clockwise.
//! - Kite areas split each triangle among its three cells and are the
//!   weights for averaging vertex quantities to cells.
//! - `z_mid` holds the height of each level mid-point per cell; level 0 is
//!   the lowest.
//!
//! Halo values are the host's responsibility: every operator here reads
//! neighbour values as given and performs no communication.

mod hex;

pub use hex::PeriodicHexMesh;

use crate::core_types::Vec3;
use crate::error::PvError;
use crate::fields::{Field, FieldLocation};
use tracing::debug;

/// Surface on which the mesh lives
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    /// Flat plane; east is +x, north is +y everywhere
    Planar,
    /// Sphere of the given radius centred at the origin
    Spherical {
        /// Sphere radius (m)
        radius: f64,
    },
}

/// Raw connectivity and geometry arrays as handed over by the host
///
/// All indices are 0-based. `z_mid` is column-contiguous
/// (`cell * n_levels + level`).
#[derive(Debug, Clone)]
pub struct MeshArrays {
    /// Surface geometry
    pub geometry: Geometry,
    /// Number of vertical levels
    pub n_levels: usize,
    /// Cell centre positions (Cartesian, m)
    pub cell_positions: Vec<Vec3>,
    /// Edge midpoint positions (Cartesian, m)
    pub edge_positions: Vec<Vec3>,
    /// Unit normal of each edge, pointing from cell 0 to cell 1
    pub edge_normals: Vec<Vec3>,
    /// The two cells sharing each edge
    pub cells_on_edge: Vec<[usize; 2]>,
    /// Edges bounding each cell
    pub edges_on_cell: Vec<Vec<usize>>,
    /// Edges bounding each dual triangle
    pub edges_on_vertex: Vec<[usize; 3]>,
    /// Circulation sign (+1/-1) of each edge around its vertex
    pub edge_signs_on_vertex: Vec<[f64; 3]>,
    /// Cells at the corners of each dual triangle
    pub cells_on_vertex: Vec<[usize; 3]>,
    /// Area of the intersection of each triangle with each of its cells (m²)
    pub kite_areas_on_vertex: Vec<[f64; 3]>,
    /// Distance between the two cell centres of each edge (m)
    pub dc_edge: Vec<f64>,
    /// Voronoi cell areas (m²)
    pub area_cell: Vec<f64>,
    /// Dual triangle areas (m²)
    pub area_triangle: Vec<f64>,
    /// Coriolis parameter at cell centres (s⁻¹)
    pub f_cell: Vec<f64>,
    /// Level mid-point heights (m), column-contiguous
    pub z_mid: Vec<f64>,
}

/// Validated, immutable mesh
#[derive(Debug, Clone)]
pub struct Mesh {
    geometry: Geometry,
    n_levels: usize,
    cell_positions: Vec<Vec3>,
    edge_positions: Vec<Vec3>,
    edge_normals: Vec<Vec3>,
    cells_on_edge: Vec<[usize; 2]>,
    edges_on_cell: Vec<Vec<usize>>,
    edges_on_vertex: Vec<[usize; 3]>,
    edge_signs_on_vertex: Vec<[f64; 3]>,
    cells_on_vertex: Vec<[usize; 3]>,
    kite_areas_on_vertex: Vec<[f64; 3]>,
    dc_edge: Vec<f64>,
    area_cell: Vec<f64>,
    area_triangle: Vec<f64>,
    f_cell: Vec<f64>,
    z_mid: Field,

    // Derived
    east: Vec<Vec3>,
    north: Vec<Vec3>,
    kites_on_cell: Vec<Vec<(usize, f64)>>,
}

impl Mesh {
    /// Validate host arrays and derive per-cell tangent frames.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::InvalidMesh`] if array lengths disagree, an index is
    /// out of range, a length or area is not positive, or `n_levels` is zero.
    pub fn new(arrays: MeshArrays) -> Result<Self, PvError> {
        let n_cells = arrays.cell_positions.len();
        let n_edges = arrays.cells_on_edge.len();
        let n_vertices = arrays.edges_on_vertex.len();
        let n_levels = arrays.n_levels;

        if n_cells == 0 || n_edges == 0 || n_vertices == 0 {
            return Err(PvError::InvalidMesh(
                "mesh must have cells, edges and vertices".into(),
            ));
        }
        if n_levels == 0 {
            return Err(PvError::InvalidMesh("n_levels must be positive".into()));
        }

        check_len("edge_positions", arrays.edge_positions.len(), n_edges)?;
        check_len("edge_normals", arrays.edge_normals.len(), n_edges)?;
        check_len("dc_edge", arrays.dc_edge.len(), n_edges)?;
        check_len("edges_on_cell", arrays.edges_on_cell.len(), n_cells)?;
        check_len("area_cell", arrays.area_cell.len(), n_cells)?;
        check_len("f_cell", arrays.f_cell.len(), n_cells)?;
        check_len("edge_signs_on_vertex", arrays.edge_signs_on_vertex.len(), n_vertices)?;
        check_len("cells_on_vertex", arrays.cells_on_vertex.len(), n_vertices)?;
        check_len("kite_areas_on_vertex", arrays.kite_areas_on_vertex.len(), n_vertices)?;
        check_len("area_triangle", arrays.area_triangle.len(), n_vertices)?;
        check_len("z_mid", arrays.z_mid.len(), n_cells * n_levels)?;

        check_indices("cells_on_edge", arrays.cells_on_edge.iter().flatten(), n_cells)?;
        check_indices("edges_on_cell", arrays.edges_on_cell.iter().flatten(), n_edges)?;
        check_indices("edges_on_vertex", arrays.edges_on_vertex.iter().flatten(), n_edges)?;
        check_indices("cells_on_vertex", arrays.cells_on_vertex.iter().flatten(), n_cells)?;

        check_positive("dc_edge", &arrays.dc_edge)?;
        check_positive("area_cell", &arrays.area_cell)?;
        check_positive("area_triangle", &arrays.area_triangle)?;

        if let Some(c) = arrays.edges_on_cell.iter().position(|e| e.len() < 3) {
            return Err(PvError::InvalidMesh(format!(
                "cell {c} has fewer than 3 edges"
            )));
        }
        if let Some(e) = arrays
            .edge_normals
            .iter()
            .position(|n| (n.norm() - 1.0).abs() > 1e-6)
        {
            return Err(PvError::InvalidMesh(format!(
                "edge {e} normal is not a unit vector"
            )));
        }

        let (east, north): (Vec<Vec3>, Vec<Vec3>) = arrays
            .cell_positions
            .iter()
            .map(|p| tangent_frame(arrays.geometry, p))
            .unzip();

        let mut kites_on_cell: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_cells];
        for (v, (cells, kites)) in arrays
            .cells_on_vertex
            .iter()
            .zip(&arrays.kite_areas_on_vertex)
            .enumerate()
        {
            for (&c, &kite) in cells.iter().zip(kites) {
                kites_on_cell[c].push((v, kite));
            }
        }

        let z_mid = Field::from_vec(FieldLocation::Cell, n_cells, n_levels, arrays.z_mid)?;

        debug!(
            "Mesh validated: {} cells, {} edges, {} vertices, {} levels",
            n_cells, n_edges, n_vertices, n_levels
        );

        Ok(Self {
            geometry: arrays.geometry,
            n_levels,
            cell_positions: arrays.cell_positions,
            edge_positions: arrays.edge_positions,
            edge_normals: arrays.edge_normals,
            cells_on_edge: arrays.cells_on_edge,
            edges_on_cell: arrays.edges_on_cell,
            edges_on_vertex: arrays.edges_on_vertex,
            edge_signs_on_vertex: arrays.edge_signs_on_vertex,
            cells_on_vertex: arrays.cells_on_vertex,
            kite_areas_on_vertex: arrays.kite_areas_on_vertex,
            dc_edge: arrays.dc_edge,
            area_cell: arrays.area_cell,
            area_triangle: arrays.area_triangle,
            f_cell: arrays.f_cell,
            z_mid,
            east,
            north,
            kites_on_cell,
        })
    }

    /// Surface geometry
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Number of cells
    pub fn n_cells(&self) -> usize {
        self.cell_positions.len()
    }

    /// Number of edges
    pub fn n_edges(&self) -> usize {
        self.cells_on_edge.len()
    }

    /// Number of dual vertices
    pub fn n_vertices(&self) -> usize {
        self.edges_on_vertex.len()
    }

    /// Number of vertical levels
    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    /// Number of horizontal points for a field location
    pub fn n_points(&self, location: FieldLocation) -> usize {
        match location {
            FieldLocation::Cell => self.n_cells(),
            FieldLocation::Edge => self.n_edges(),
            FieldLocation::Vertex => self.n_vertices(),
        }
    }

    /// Check that `field` is a full 3D field at `location` on this mesh.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] naming `name` if it is not.
    pub fn check_field(&self, name: &str, field: &Field, location: FieldLocation) -> Result<(), PvError> {
        field.check_shape(name, location, self.n_points(location), self.n_levels)
    }

    /// Cell centre position
    pub fn cell_position(&self, cell: usize) -> Vec3 {
        self.cell_positions[cell]
    }

    /// Edge midpoint position
    pub fn edge_position(&self, edge: usize) -> Vec3 {
        self.edge_positions[edge]
    }

    /// Unit normal of an edge (cell 0 → cell 1)
    pub fn edge_normal(&self, edge: usize) -> Vec3 {
        self.edge_normals[edge]
    }

    /// The two cells sharing an edge
    pub fn cells_on_edge(&self, edge: usize) -> [usize; 2] {
        self.cells_on_edge[edge]
    }

    /// Edges bounding a cell
    pub fn edges_on_cell(&self, cell: usize) -> &[usize] {
        &self.edges_on_cell[cell]
    }

    /// Edges bounding a dual triangle
    pub fn edges_on_vertex(&self, vertex: usize) -> [usize; 3] {
        self.edges_on_vertex[vertex]
    }

    /// Circulation signs of the edges bounding a dual triangle
    pub fn edge_signs_on_vertex(&self, vertex: usize) -> [f64; 3] {
        self.edge_signs_on_vertex[vertex]
    }

    /// Cells at the corners of a dual triangle
    pub fn cells_on_vertex(&self, vertex: usize) -> [usize; 3] {
        self.cells_on_vertex[vertex]
    }

    /// Kite areas of a dual triangle, ordered as [`Mesh::cells_on_vertex`]
    pub fn kite_areas_on_vertex(&self, vertex: usize) -> [f64; 3] {
        self.kite_areas_on_vertex[vertex]
    }

    /// `(vertex, kite area)` pairs touching a cell
    pub fn kites_on_cell(&self, cell: usize) -> &[(usize, f64)] {
        &self.kites_on_cell[cell]
    }

    /// Cell-centre distance across an edge
    pub fn dc_edge(&self, edge: usize) -> f64 {
        self.dc_edge[edge]
    }

    /// Voronoi cell area
    pub fn area_cell(&self, cell: usize) -> f64 {
        self.area_cell[cell]
    }

    /// Dual triangle area
    pub fn area_triangle(&self, vertex: usize) -> f64 {
        self.area_triangle[vertex]
    }

    /// Coriolis parameter at a cell
    pub fn f_cell(&self, cell: usize) -> f64 {
        self.f_cell[cell]
    }

    /// Level mid-point heights
    pub fn z_mid(&self) -> &Field {
        &self.z_mid
    }

    /// Local unit east vector at a cell (Cartesian)
    pub fn east(&self, cell: usize) -> Vec3 {
        self.east[cell]
    }

    /// Local unit north vector at a cell (Cartesian)
    pub fn north(&self, cell: usize) -> Vec3 {
        self.north[cell]
    }
}

fn check_len(name: &str, len: usize, expected: usize) -> Result<(), PvError> {
    if len == expected {
        Ok(())
    } else {
        Err(PvError::InvalidMesh(format!(
            "{name} has {len} entries, expected {expected}"
        )))
    }
}

fn check_indices<'a>(
    name: &str,
    mut indices: impl Iterator<Item = &'a usize>,
    bound: usize,
) -> Result<(), PvError> {
    match indices.find(|&&i| i >= bound) {
        Some(i) => Err(PvError::InvalidMesh(format!(
            "{name} references index {i}, but only {bound} exist"
        ))),
        None => Ok(()),
    }
}

fn check_positive(name: &str, values: &[f64]) -> Result<(), PvError> {
    match values.iter().position(|v| !v.is_finite() || *v <= 0.0) {
        Some(i) => Err(PvError::InvalidMesh(format!(
            "{name}[{i}] = {} is not positive",
            values[i]
        ))),
        None => Ok(()),
    }
}

/// Local (east, north) unit vectors at a point.
fn tangent_frame(geometry: Geometry, position: &Vec3) -> (Vec3, Vec3) {
    match geometry {
        Geometry::Planar => (Vec3::x(), Vec3::y()),
        Geometry::Spherical { .. } => {
            let up = position.normalize();
            let east = Vec3::z().cross(&up);
            // Poles: any horizontal direction will do
            let east = if east.norm() < 1e-12 {
                Vec3::x()
            } else {
                east.normalize()
            };
            let north = up.cross(&east);
            (east, north)
        }
    }
}
