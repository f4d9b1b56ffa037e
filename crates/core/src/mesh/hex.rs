//! Doubly periodic planar hexagonal mesh
//!
//! The Voronoi diagram of a triangular lattice is a regular hexagonal mesh.
//! Cells sit on an odd-row-shifted lattice:
//!
//! ```text
//! row j odd :   o   o   o   o        x = dc (i + 1/2)
//! row j even: o   o   o   o          x = dc i
//!                                    y = dc (√3/2) j
//! ```
//!
//! Wrapping in both directions gives every cell six neighbours and every dual
//! vertex three cells, so the mesh has no boundary. Displacements across the
//! seam use the minimum-image convention. Fields with a linear analytic form
//! are only meaningful away from the seam; tests check interior cells.

use super::{Geometry, Mesh, MeshArrays};
use crate::core_types::Vec3;
use crate::error::PvError;
use rustc_hash::FxHashMap;

const SQRT3: f64 = 1.732_050_807_568_877_2;

/// Builder for a doubly periodic hexagonal test mesh
#[derive(Debug, Clone)]
pub struct PeriodicHexMesh {
    nx: usize,
    ny: usize,
    dc: f64,
    z_levels: Vec<f64>,
    f0: f64,
    beta: f64,
}

impl PeriodicHexMesh {
    /// `nx` x `ny` cells with centre spacing `dc` (m); one level at z = 0, f = 0
    #[must_use]
    pub fn new(nx: usize, ny: usize, dc: f64) -> Self {
        Self {
            nx,
            ny,
            dc,
            z_levels: vec![0.0],
            f0: 0.0,
            beta: 0.0,
        }
    }

    /// Level mid-point heights (m), bottom first, identical in every column
    #[must_use]
    pub fn with_levels(mut self, z_levels: Vec<f64>) -> Self {
        self.z_levels = z_levels;
        self
    }

    /// Beta-plane Coriolis parameter `f = f0 + beta * y`
    #[must_use]
    pub fn with_coriolis(mut self, f0: f64, beta: f64) -> Self {
        self.f0 = f0;
        self.beta = beta;
        self
    }

    /// Domain length in x (m)
    pub fn length_x(&self) -> f64 {
        self.dc * self.nx as f64
    }

    /// Domain length in y (m)
    pub fn length_y(&self) -> f64 {
        self.dc * SQRT3 / 2.0 * self.ny as f64
    }

    /// Cell index of lattice position `(i, j)`, wrapped
    pub fn cell_index(&self, i: isize, j: isize) -> usize {
        let nx = self.nx as isize;
        let ny = self.ny as isize;
        (j.rem_euclid(ny) * nx + i.rem_euclid(nx)) as usize
    }

    /// Assemble the raw mesh arrays.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::InvalidMesh`] if `nx < 3`, `ny < 4`, `ny` is odd,
    /// `dc` is not positive, or no levels were given.
    pub fn arrays(&self) -> Result<MeshArrays, PvError> {
        if self.nx < 3 || self.ny < 4 || self.ny % 2 != 0 {
            return Err(PvError::InvalidMesh(format!(
                "periodic hex mesh needs nx >= 3 and even ny >= 4, got {}x{}",
                self.nx, self.ny
            )));
        }
        if !(self.dc.is_finite() && self.dc > 0.0) {
            return Err(PvError::InvalidMesh(format!(
                "cell spacing must be positive, got {}",
                self.dc
            )));
        }
        if self.z_levels.is_empty() {
            return Err(PvError::InvalidMesh("at least one level is required".into()));
        }

        let n_cells = self.nx * self.ny;
        let n_levels = self.z_levels.len();
        let dc = self.dc;

        let cell_positions: Vec<Vec3> = (0..n_cells)
            .map(|c| {
                let (i, j) = (c % self.nx, c / self.nx);
                let x = dc * (i as f64 + 0.5 * (j % 2) as f64);
                let y = dc * SQRT3 / 2.0 * j as f64;
                Vec3::new(x, y, 0.0)
            })
            .collect();

        // Edges: each cell owns its E, NE and NW connections
        let mut edge_of_pair: FxHashMap<(usize, usize), usize> = FxHashMap::default();
        let mut cells_on_edge = Vec::with_capacity(3 * n_cells);
        let mut edges_on_cell: Vec<Vec<usize>> = vec![Vec::with_capacity(6); n_cells];
        for c in 0..n_cells {
            let [e, ne, nw, ..] = self.neighbours(c);
            for other in [e, ne, nw] {
                let edge = cells_on_edge.len();
                cells_on_edge.push([c, other]);
                edge_of_pair.insert(pair_key(c, other), edge);
            }
        }
        for c in 0..n_cells {
            for other in self.neighbours(c) {
                edges_on_cell[c].push(edge_of_pair[&pair_key(c, other)]);
            }
        }

        let mut edge_positions = Vec::with_capacity(cells_on_edge.len());
        let mut edge_normals = Vec::with_capacity(cells_on_edge.len());
        for &[c0, c1] in &cells_on_edge {
            let d = self.min_image(cell_positions[c1] - cell_positions[c0]);
            edge_positions.push(cell_positions[c0] + 0.5 * d);
            edge_normals.push(d.normalize());
        }
        let dc_edge = vec![dc; cells_on_edge.len()];

        // Dual triangles: one pointing up and one pointing down per cell
        let area_triangle_value = SQRT3 / 4.0 * dc * dc;
        let mut edges_on_vertex = Vec::with_capacity(2 * n_cells);
        let mut edge_signs_on_vertex = Vec::with_capacity(2 * n_cells);
        let mut cells_on_vertex = Vec::with_capacity(2 * n_cells);
        for c in 0..n_cells {
            let [e, ne, _, _, _, se] = self.neighbours(c);
            for tri in [[c, e, ne], [c, se, e]] {
                let p0 = cell_positions[tri[0]];
                let r1 = self.min_image(cell_positions[tri[1]] - p0);
                let r2 = self.min_image(cell_positions[tri[2]] - p0);
                // Relative corner positions, triangle centroid at the origin
                let centroid = (r1 + r2) / 3.0;
                let corners = [-centroid, r1 - centroid, r2 - centroid];

                let mut edges = [0; 3];
                let mut signs = [0.0; 3];
                for (slot, (a, b)) in [(0, 1), (1, 2), (2, 0)].into_iter().enumerate() {
                    let edge = edge_of_pair[&pair_key(tri[a], tri[b])];
                    let [from, _] = cells_on_edge[edge];
                    // Oriented corners of the edge in its own normal direction
                    let (ra, rb) = if from == tri[a] {
                        (corners[a], corners[b])
                    } else {
                        (corners[b], corners[a])
                    };
                    let ccw = ra.x * rb.y - ra.y * rb.x > 0.0;
                    edges[slot] = edge;
                    signs[slot] = if ccw { 1.0 } else { -1.0 };
                }
                edges_on_vertex.push(edges);
                edge_signs_on_vertex.push(signs);
                cells_on_vertex.push(tri);
            }
        }
        let n_vertices = edges_on_vertex.len();
        let kite = area_triangle_value / 3.0;

        let f_cell = cell_positions
            .iter()
            .map(|p| self.f0 + self.beta * p.y)
            .collect();

        let z_mid = (0..n_cells)
            .flat_map(|_| self.z_levels.iter().copied())
            .collect();

        Ok(MeshArrays {
            geometry: Geometry::Planar,
            n_levels,
            cell_positions,
            edge_positions,
            edge_normals,
            cells_on_edge,
            edges_on_cell,
            edges_on_vertex,
            edge_signs_on_vertex,
            cells_on_vertex,
            kite_areas_on_vertex: vec![[kite; 3]; n_vertices],
            dc_edge,
            area_cell: vec![SQRT3 / 2.0 * dc * dc; n_cells],
            area_triangle: vec![area_triangle_value; n_vertices],
            f_cell,
            z_mid,
        })
    }

    /// Build and validate the mesh.
    ///
    /// # Errors
    ///
    /// See [`PeriodicHexMesh::arrays`] and [`Mesh::new`].
    pub fn build(&self) -> Result<Mesh, PvError> {
        Mesh::new(self.arrays()?)
    }

    /// True if neither the cell nor any neighbour crosses the periodic seam
    pub fn is_interior(&self, cell: usize) -> bool {
        let (i, j) = (cell % self.nx, cell / self.nx);
        i >= 1 && i + 2 <= self.nx && j >= 1 && j + 2 <= self.ny
    }

    /// Neighbours of a cell in the order E, NE, NW, W, SW, SE
    fn neighbours(&self, cell: usize) -> [usize; 6] {
        let i = (cell % self.nx) as isize;
        let j = (cell / self.nx) as isize;
        // Odd rows are shifted half a cell east
        let shift = j.rem_euclid(2);
        [
            self.cell_index(i + 1, j),
            self.cell_index(i + shift, j + 1),
            self.cell_index(i - 1 + shift, j + 1),
            self.cell_index(i - 1, j),
            self.cell_index(i - 1 + shift, j - 1),
            self.cell_index(i + shift, j - 1),
        ]
    }

    fn min_image(&self, mut d: Vec3) -> Vec3 {
        let lx = self.length_x();
        let ly = self.length_y();
        d.x -= lx * (d.x / lx).round();
        d.y -= ly * (d.y / ly).round();
        d
    }
}

fn pair_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}
