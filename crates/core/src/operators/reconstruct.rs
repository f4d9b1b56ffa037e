//! Least-squares reconstruction of cell-centre vectors from edge-normal components
//!
//! For every cell the horizontal vector `G` minimising
//! `Σ_e w_e (G · n_e − g_e)²` over its edges is a fixed linear combination of
//! the edge values `g_e`. The coefficients are solved once per mesh from the
//! 2x2 normal equations in the cell's local east/north frame, with
//! inverse-distance weights `w_e = 1 / dc_e`.
//!
//! The same coefficients reconstruct the wind from normal velocities and the
//! gradient from edge-normal derivatives, so the two never disagree about what
//! a "vector at a cell" means.

use crate::core_types::Vec3;
use crate::error::PvError;
use crate::fields::{Field, FieldLocation, VectorField};
use crate::mesh::Mesh;
use nalgebra::{Matrix2, Vector2};
use rayon::prelude::*;

/// Determinant, relative to the squared trace, below which a cell's normal
/// equations are treated as singular
const DET_MIN: f64 = 1e-12;

/// Precomputed reconstruction weights for every cell
#[derive(Debug, Clone)]
pub struct VectorReconstructor {
    /// Per cell: `(edge, east/north coefficient)` pairs
    coefficients: Vec<Vec<(usize, Vector2<f64>)>>,
    n_edges: usize,
    n_levels: usize,
}

impl VectorReconstructor {
    /// Solve the normal equations of every cell.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::InvalidMesh`] if the edge normals of a cell do not
    /// span the horizontal plane.
    pub fn new(mesh: &Mesh) -> Result<Self, PvError> {
        let coefficients = (0..mesh.n_cells())
            .into_par_iter()
            .map(|c| cell_coefficients(mesh, c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            coefficients,
            n_edges: mesh.n_edges(),
            n_levels: mesh.n_levels(),
        })
    }

    /// Coefficients of one cell
    pub fn cell(&self, cell: usize) -> &[(usize, Vector2<f64>)] {
        &self.coefficients[cell]
    }

    /// Reconstruct horizontal vectors (east, north, 0) at cell centres from an
    /// edge-normal field.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `edge_values` is not an edge field
    /// with the mesh's edge count and level count.
    pub fn reconstruct(&self, edge_values: &Field) -> Result<VectorField, PvError> {
        edge_values.check_shape(
            "reconstruct input",
            FieldLocation::Edge,
            self.n_edges,
            self.n_levels,
        )?;

        let n_levels = self.n_levels;
        let mut out = VectorField::new(self.coefficients.len(), n_levels);
        out.as_mut_slice()
            .par_chunks_mut(n_levels)
            .zip(self.coefficients.par_iter())
            .for_each(|(column, coeffs)| {
                for (k, v) in column.iter_mut().enumerate() {
                    let g = coeffs
                        .iter()
                        .fold(Vector2::zeros(), |acc, (e, w)| acc + w * edge_values.get(*e, k));
                    *v = Vec3::new(g.x, g.y, 0.0);
                }
            });
        Ok(out)
    }
}

fn cell_coefficients(mesh: &Mesh, cell: usize) -> Result<Vec<(usize, Vector2<f64>)>, PvError> {
    let east = mesh.east(cell);
    let north = mesh.north(cell);

    let mut normal_matrix = Matrix2::zeros();
    let projected: Vec<(usize, Vector2<f64>, f64)> = mesh
        .edges_on_cell(cell)
        .iter()
        .map(|&e| {
            let n = mesh.edge_normal(e);
            let local = Vector2::new(n.dot(&east), n.dot(&north));
            let w = 1.0 / mesh.dc_edge(e);
            (e, local, w)
        })
        .collect();
    for (_, n, w) in &projected {
        normal_matrix += *w * n * n.transpose();
    }

    let trace = normal_matrix.trace();
    if normal_matrix.determinant().abs() < DET_MIN * trace * trace {
        return Err(PvError::InvalidMesh(format!(
            "edge normals of cell {cell} do not span the horizontal plane"
        )));
    }
    let inverse = normal_matrix.try_inverse().ok_or_else(|| {
        PvError::InvalidMesh(format!("reconstruction matrix of cell {cell} is singular"))
    })?;

    Ok(projected
        .into_iter()
        .map(|(e, n, w)| (e, inverse * n * w))
        .collect())
}
