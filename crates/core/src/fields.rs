//! Field containers for mesh-located data
//!
//! Every field is stored column-contiguous: the `n_levels` values of one
//! horizontal point (cell, edge or vertex) are adjacent in memory, so
//! `index = point * n_levels + level`. Level 0 is the lowest model level.
//! Column-contiguous storage lets per-column work (vertical derivatives,
//! tropopause scans, interpolation) run over `chunks(n_levels)` in parallel.

use crate::core_types::Vec3;
use crate::error::PvError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where on the mesh a field's horizontal points live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldLocation {
    /// Voronoi cell centres
    Cell,
    /// Edge midpoints (normal components)
    Edge,
    /// Dual-mesh vertices (triangle circumcentres)
    Vertex,
}

impl fmt::Display for FieldLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldLocation::Cell => write!(f, "cell"),
            FieldLocation::Edge => write!(f, "edge"),
            FieldLocation::Vertex => write!(f, "vertex"),
        }
    }
}

/// Scalar field on one set of mesh points, all levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    data: Vec<f64>,
    location: FieldLocation,
    n_horizontal: usize,
    n_levels: usize,
}

impl Field {
    /// Create a new field initialized to zero
    #[must_use]
    pub fn new(location: FieldLocation, n_horizontal: usize, n_levels: usize) -> Self {
        Self::with_value(location, n_horizontal, n_levels, 0.0)
    }

    /// Create a new field with every entry set to `value`
    #[must_use]
    pub fn with_value(
        location: FieldLocation,
        n_horizontal: usize,
        n_levels: usize,
        value: f64,
    ) -> Self {
        Self {
            data: vec![value; n_horizontal * n_levels],
            location,
            n_horizontal,
            n_levels,
        }
    }

    /// Wrap existing column-contiguous data
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `data.len() != n_horizontal * n_levels`.
    pub fn from_vec(
        location: FieldLocation,
        n_horizontal: usize,
        n_levels: usize,
        data: Vec<f64>,
    ) -> Result<Self, PvError> {
        if data.len() != n_horizontal * n_levels {
            return Err(PvError::shape(
                "from_vec",
                (location, n_horizontal, n_levels),
                (location, data.len(), 1),
            ));
        }
        Ok(Self {
            data,
            location,
            n_horizontal,
            n_levels,
        })
    }

    /// Build a field by evaluating `f(point, level)` everywhere
    #[must_use]
    pub fn from_fn(
        location: FieldLocation,
        n_horizontal: usize,
        n_levels: usize,
        mut f: impl FnMut(usize, usize) -> f64,
    ) -> Self {
        let mut data = Vec::with_capacity(n_horizontal * n_levels);
        for h in 0..n_horizontal {
            for k in 0..n_levels {
                data.push(f(h, k));
            }
        }
        Self {
            data,
            location,
            n_horizontal,
            n_levels,
        }
    }

    /// Mesh location of the horizontal points
    #[must_use]
    pub fn location(&self) -> FieldLocation {
        self.location
    }

    /// Number of horizontal points
    #[must_use]
    pub fn n_horizontal(&self) -> usize {
        self.n_horizontal
    }

    /// Number of vertical levels
    #[must_use]
    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    /// `(location, n_horizontal, n_levels)`
    #[must_use]
    pub fn shape(&self) -> (FieldLocation, usize, usize) {
        (self.location, self.n_horizontal, self.n_levels)
    }

    /// Check this field against an expected shape.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] naming `name` on any difference.
    pub fn check_shape(
        &self,
        name: &str,
        location: FieldLocation,
        n_horizontal: usize,
        n_levels: usize,
    ) -> Result<(), PvError> {
        let expected = (location, n_horizontal, n_levels);
        if self.shape() == expected {
            Ok(())
        } else {
            Err(PvError::shape(name, expected, self.shape()))
        }
    }

    /// Get reference to field data
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Get mutable reference to field data
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Consume the field, returning its data
    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Get value at (point, level)
    ///
    /// # Panics
    ///
    /// Panics if the indices are out of bounds
    #[must_use]
    pub fn get(&self, point: usize, level: usize) -> f64 {
        assert!(
            point < self.n_horizontal && level < self.n_levels,
            "Field index out of bounds"
        );
        self.data[point * self.n_levels + level]
    }

    /// Set value at (point, level)
    ///
    /// # Panics
    ///
    /// Panics if the indices are out of bounds
    pub fn set(&mut self, point: usize, level: usize, value: f64) {
        assert!(
            point < self.n_horizontal && level < self.n_levels,
            "Field index out of bounds"
        );
        self.data[point * self.n_levels + level] = value;
    }

    /// The vertical column of one horizontal point, bottom level first
    #[must_use]
    pub fn column(&self, point: usize) -> &[f64] {
        let start = point * self.n_levels;
        &self.data[start..start + self.n_levels]
    }

    /// Mutable vertical column of one horizontal point
    pub fn column_mut(&mut self, point: usize) -> &mut [f64] {
        let start = point * self.n_levels;
        &mut self.data[start..start + self.n_levels]
    }

    /// Fill entire field with a value
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Add `scale * other` into this field, entry by entry.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if shapes differ.
    pub fn add_scaled(&mut self, other: &Field, scale: f64) -> Result<(), PvError> {
        other.check_shape("add_scaled", self.location, self.n_horizontal, self.n_levels)?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += scale * b;
        }
        Ok(())
    }

    /// Largest absolute value (0 for an empty field)
    #[must_use]
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
    }
}

/// Vector field at cell centres, one [`Vec3`] per (cell, level)
///
/// Components are in the cell's local east/north/up frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField {
    data: Vec<Vec3>,
    n_cells: usize,
    n_levels: usize,
}

impl VectorField {
    /// Create a zero vector field
    #[must_use]
    pub fn new(n_cells: usize, n_levels: usize) -> Self {
        Self {
            data: vec![Vec3::zeros(); n_cells * n_levels],
            n_cells,
            n_levels,
        }
    }

    /// Build from per-(cell, level) evaluation
    #[must_use]
    pub fn from_fn(n_cells: usize, n_levels: usize, mut f: impl FnMut(usize, usize) -> Vec3) -> Self {
        let mut data = Vec::with_capacity(n_cells * n_levels);
        for c in 0..n_cells {
            for k in 0..n_levels {
                data.push(f(c, k));
            }
        }
        Self {
            data,
            n_cells,
            n_levels,
        }
    }

    /// Number of cells
    #[must_use]
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// Number of levels
    #[must_use]
    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    /// Vector at (cell, level)
    #[must_use]
    pub fn get(&self, cell: usize, level: usize) -> Vec3 {
        self.data[cell * self.n_levels + level]
    }

    /// Overwrite the vector at (cell, level)
    pub fn set(&mut self, cell: usize, level: usize, value: Vec3) {
        self.data[cell * self.n_levels + level] = value;
    }

    /// All vectors, column-contiguous
    #[must_use]
    pub fn as_slice(&self) -> &[Vec3] {
        &self.data
    }

    /// All vectors, mutable
    pub fn as_mut_slice(&mut self) -> &mut [Vec3] {
        &mut self.data
    }

    /// Extract one component (0 = east, 1 = north, 2 = up) as a cell field
    #[must_use]
    pub fn component(&self, index: usize) -> Field {
        Field {
            data: self.data.iter().map(|v| v[index]).collect(),
            location: FieldLocation::Cell,
            n_horizontal: self.n_cells,
            n_levels: self.n_levels,
        }
    }

    /// Check the vector field covers `n_cells` x `n_levels`.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] on any difference.
    pub fn check_shape(&self, name: &str, n_cells: usize, n_levels: usize) -> Result<(), PvError> {
        if self.n_cells == n_cells && self.n_levels == n_levels {
            Ok(())
        } else {
            Err(PvError::shape(
                name,
                (FieldLocation::Cell, n_cells, n_levels),
                (FieldLocation::Cell, self.n_cells, self.n_levels),
            ))
        }
    }
}
