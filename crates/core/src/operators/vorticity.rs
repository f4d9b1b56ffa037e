//! Vorticity of an edge-normal wind
//!
//! The vertical component is the circulation around each dual triangle
//! divided by its area, averaged to cells with kite-area weights. The
//! horizontal components come from the vertical shear of the reconstructed
//! cell wind, `(−∂v/∂z, ∂u/∂z)`; vertical velocity is not used (hydrostatic
//! approximation).
//!
//! Applied to an edge momentum tendency instead of a wind, the same operator
//! (without Coriolis) gives the curl of the tendency.

use super::MeshOperators;
use crate::core_types::Vec3;
use crate::error::PvError;
use crate::fields::{Field, FieldLocation, VectorField};
use rayon::prelude::*;

impl MeshOperators {
    /// Relative vorticity `ζ` at dual vertices.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `u_edge` is not a full edge field.
    pub fn vertex_vorticity(&self, u_edge: &Field) -> Result<Field, PvError> {
        let mesh = &self.mesh;
        mesh.check_field("vertex_vorticity input", u_edge, FieldLocation::Edge)?;

        let n_levels = mesh.n_levels();
        let mut out = Field::new(FieldLocation::Vertex, mesh.n_vertices(), n_levels);
        out.as_mut_slice()
            .par_chunks_mut(n_levels)
            .enumerate()
            .for_each(|(v, column)| {
                let inv_area = 1.0 / mesh.area_triangle(v);
                let edges = mesh.edges_on_vertex(v);
                let signs = mesh.edge_signs_on_vertex(v);
                for (k, zeta) in column.iter_mut().enumerate() {
                    let circulation: f64 = edges
                        .iter()
                        .zip(signs)
                        .map(|(&e, s)| s * u_edge.get(e, k) * mesh.dc_edge(e))
                        .sum();
                    *zeta = circulation * inv_area;
                }
            });
        Ok(out)
    }

    /// Relative vorticity `ζ` at cell centres (kite-weighted vertex average).
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `u_edge` is not a full edge field.
    pub fn cell_vorticity(&self, u_edge: &Field) -> Result<Field, PvError> {
        let vertex = self.vertex_vorticity(u_edge)?;
        let mesh = &self.mesh;
        let n_levels = mesh.n_levels();
        let mut out = Field::new(FieldLocation::Cell, mesh.n_cells(), n_levels);
        out.as_mut_slice()
            .par_chunks_mut(n_levels)
            .enumerate()
            .for_each(|(c, column)| {
                let inv_area = 1.0 / mesh.area_cell(c);
                for &(v, kite) in mesh.kites_on_cell(c) {
                    for (zeta, zv) in column.iter_mut().zip(vertex.column(v)) {
                        *zeta += kite * zv * inv_area;
                    }
                }
            });
        Ok(out)
    }

    /// Cell-centre wind `(u, v, 0)` reconstructed from normal velocities.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `u_edge` is not a full edge field.
    pub fn cell_wind(&self, u_edge: &Field) -> Result<VectorField, PvError> {
        self.mesh
            .check_field("cell_wind input", u_edge, FieldLocation::Edge)?;
        self.reconstructor.reconstruct(u_edge)
    }

    /// Relative vorticity vector `(−∂v/∂z, ∂u/∂z, ζ)`.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `u_edge` is not a full edge field.
    pub fn relative_vorticity(&self, u_edge: &Field) -> Result<VectorField, PvError> {
        let wind = self.cell_wind(u_edge)?;
        let du_dz = self.d_dz(&wind.component(0))?;
        let dv_dz = self.d_dz(&wind.component(1))?;
        let zeta = self.cell_vorticity(u_edge)?;
        let mesh = &self.mesh;
        Ok(VectorField::from_fn(
            mesh.n_cells(),
            mesh.n_levels(),
            |c, k| Vec3::new(-dv_dz.get(c, k), du_dz.get(c, k), zeta.get(c, k)),
        ))
    }

    /// Absolute vorticity vector `(−∂v/∂z, ∂u/∂z, ζ + f)`.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `u_edge` is not a full edge field.
    pub fn absolute_vorticity(&self, u_edge: &Field) -> Result<VectorField, PvError> {
        let mut omega = self.relative_vorticity(u_edge)?;
        let n_levels = self.mesh.n_levels();
        omega
            .as_mut_slice()
            .par_chunks_mut(n_levels)
            .enumerate()
            .for_each(|(c, column)| {
                let f = self.mesh.f_cell(c);
                for w in column {
                    w.z += f;
                }
            });
        Ok(omega)
    }
}
