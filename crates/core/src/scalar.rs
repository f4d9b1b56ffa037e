//! Passive PV-scalar tracer
//!
//! The tracer starts as a copy of PV and is afterwards advanced only by the
//! host's scalar transport. Comparing it with the diagnosed PV shows how much
//! non-conservative processes changed PV along trajectories.

use crate::error::PvError;
use crate::fields::{Field, FieldLocation};
use crate::mesh::Mesh;
use serde::{Deserialize, Serialize};

/// PV-scalar tracer values, absent until first initialized
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PvScalar {
    values: Option<Field>,
}

impl PvScalar {
    /// An uninitialized tracer
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `pv` into the tracer unless it already holds values.
    ///
    /// Returns `true` if the tracer was initialized by this call.
    pub fn initialize_from(&mut self, pv: &Field) -> bool {
        if self.values.is_some() {
            return false;
        }
        self.values = Some(pv.clone());
        true
    }

    /// Whether the tracer holds values
    pub fn is_initialized(&self) -> bool {
        self.values.is_some()
    }

    /// Tracer values (PVU)
    pub fn values(&self) -> Option<&Field> {
        self.values.as_ref()
    }

    /// Mutable tracer values for the transport collaborator
    pub fn values_mut(&mut self) -> Option<&mut Field> {
        self.values.as_mut()
    }

    /// Replace the tracer with restart values.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::ShapeMismatch`] if `values` is not a full cell field.
    pub fn restore(&mut self, values: Option<Field>, mesh: &Mesh) -> Result<(), PvError> {
        if let Some(field) = &values {
            mesh.check_field("pv_scalar", field, FieldLocation::Cell)?;
        }
        self.values = values;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::PeriodicHexMesh;

    #[test]
    fn test_initialized_once() {
        let mut scalar = PvScalar::new();
        assert!(!scalar.is_initialized());
        let pv = Field::with_value(FieldLocation::Cell, 4, 2, 1.5);
        assert!(scalar.initialize_from(&pv));

        // Transport changes the tracer; a second initialization must not undo it
        scalar.values_mut().unwrap().fill(0.5);
        assert!(!scalar.initialize_from(&pv));
        assert!(scalar.values().unwrap().as_slice().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn test_restore_checks_shape() {
        let mesh = PeriodicHexMesh::new(4, 4, 1000.0).build().unwrap();
        let mut scalar = PvScalar::new();
        let wrong = Field::new(FieldLocation::Cell, 3, 1);
        assert!(scalar.restore(Some(wrong), &mesh).is_err());
        let right = Field::with_value(FieldLocation::Cell, mesh.n_cells(), 1, 2.0);
        scalar.restore(Some(right.clone()), &mesh).unwrap();
        assert_eq!(scalar.values(), Some(&right));
    }
}
