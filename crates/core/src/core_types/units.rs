//! Semantic unit types for the quantities that cross the diagnostic API
//!
//! Field arrays stay as raw `f64` for throughput; the scalars that configure or
//! drive a step (time step length, pressure levels, PV thresholds) are wrapped
//! so that seconds are never passed where pascals are expected.
//!
//! # Usage
//! ```
//! use pv_budget_core::core_types::units::{Pascals, Pvu, Seconds};
//!
//! let dt = Seconds::new(60.0);
//! let level = Pascals::from_hectopascals(500.0);
//! assert_eq!(*level, 50_000.0);
//!
//! let threshold = Pvu::new(2.0);
//! assert!((threshold.to_si() - 2.0e-6).abs() < 1e-18);
//! assert_eq!(*dt, 60.0);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Deref, Sub};

// ============================================================================
// TIME
// ============================================================================

/// Model time in seconds (step lengths, elapsed time, reset intervals)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Seconds(f64);

impl Seconds {
    /// Zero elapsed time
    pub const ZERO: Seconds = Seconds(0.0);

    /// Create a new duration in seconds
    #[inline]
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Seconds(value)
    }

    /// Get the raw f64 value
    #[inline]
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// True for finite, strictly positive durations
    #[inline]
    #[must_use]
    pub fn is_positive_finite(self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }
}

impl Deref for Seconds {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &f64 {
        &self.0
    }
}

impl PartialOrd for Seconds {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.0.total_cmp(&other.0))
    }
}

impl Add for Seconds {
    type Output = Seconds;
    fn add(self, rhs: Self) -> Seconds {
        Seconds(self.0 + rhs.0)
    }
}

impl AddAssign for Seconds {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Seconds {
    type Output = Seconds;
    fn sub(self, rhs: Self) -> Seconds {
        Seconds(self.0 - rhs.0)
    }
}

impl From<f64> for Seconds {
    fn from(v: f64) -> Self {
        Seconds(v)
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} s", self.0)
    }
}

// ============================================================================
// PRESSURE
// ============================================================================

/// Pressure in pascals
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Pascals(f64);

impl Pascals {
    /// Create a new pressure in Pa
    #[inline]
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Pascals(value)
    }

    /// Create from hectopascals (hPa, numerically equal to mb)
    #[inline]
    #[must_use]
    pub fn from_hectopascals(hpa: f64) -> Self {
        Pascals(hpa * 100.0)
    }

    /// Convert to hectopascals
    #[inline]
    #[must_use]
    pub fn to_hectopascals(self) -> f64 {
        self.0 / 100.0
    }

    /// Get the raw f64 value
    #[inline]
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Deref for Pascals {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &f64 {
        &self.0
    }
}

impl PartialOrd for Pascals {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.0.total_cmp(&other.0))
    }
}

impl From<f64> for Pascals {
    fn from(v: f64) -> Self {
        Pascals(v)
    }
}

impl fmt::Display for Pascals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} hPa", self.to_hectopascals())
    }
}

// ============================================================================
// POTENTIAL VORTICITY
// ============================================================================

/// Potential vorticity units (1 PVU = 1e-6 K m² kg⁻¹ s⁻¹)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Pvu(f64);

impl Pvu {
    /// SI value of one PVU (K m² kg⁻¹ s⁻¹)
    pub const SI_PER_PVU: f64 = 1.0e-6;

    /// Create a PV value in PVU
    #[inline]
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Pvu(value)
    }

    /// Convert an SI PV value (K m² kg⁻¹ s⁻¹) into PVU
    #[inline]
    #[must_use]
    pub fn from_si(si: f64) -> Self {
        Pvu(si / Self::SI_PER_PVU)
    }

    /// Convert to SI (K m² kg⁻¹ s⁻¹)
    #[inline]
    #[must_use]
    pub fn to_si(self) -> f64 {
        self.0 * Self::SI_PER_PVU
    }

    /// Get the raw f64 value
    #[inline]
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Deref for Pvu {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &f64 {
        &self.0
    }
}

impl PartialOrd for Pvu {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.0.total_cmp(&other.0))
    }
}

impl From<f64> for Pvu {
    fn from(v: f64) -> Self {
        Pvu(v)
    }
}

impl fmt::Display for Pvu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} PVU", self.0)
    }
}
