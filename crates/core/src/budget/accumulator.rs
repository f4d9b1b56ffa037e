//! Time-integrated PV tendencies
//!
//! An accumulator holds `Σ tendency · dt` since its last reset. It changes only
//! through [`AccumulatorSet::accumulate`] (add, or reset-then-add at a
//! configured boundary) and [`AccumulatorSet::restore`].

use super::TendencyCategory;
use crate::core_types::Seconds;
use crate::error::PvError;
use crate::fields::{Field, FieldLocation};
use crate::interpolate::FILL_VALUE;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Running time integral of one tendency category (PVU)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    category: TendencyCategory,
    values: Field,
}

impl Accumulator {
    /// Zeroed accumulator
    pub fn new(category: TendencyCategory, location: FieldLocation, n_horizontal: usize, n_levels: usize) -> Self {
        Self {
            category,
            values: Field::new(location, n_horizontal, n_levels),
        }
    }

    /// Category accumulated
    pub fn category(&self) -> TendencyCategory {
        self.category
    }

    /// Accumulated values
    pub fn values(&self) -> &Field {
        &self.values
    }

    /// Add `dt * tendency`; entries equal to [`FILL_VALUE`] contribute nothing.
    fn add(&mut self, tendency: &Field, dt: Seconds) -> Result<(), PvError> {
        let (location, n_h, n_l) = self.values.shape();
        tendency.check_shape(self.category.name(), location, n_h, n_l)?;
        for (acc, &t) in self.values.as_mut_slice().iter_mut().zip(tendency.as_slice()) {
            if t != FILL_VALUE {
                *acc += t * *dt;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.values.fill(0.0);
    }
}

/// The accumulators of every enabled category, sharing one reset window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorSet {
    accumulators: FxHashMap<TendencyCategory, Accumulator>,
    /// Model time accumulated since the last reset
    window: Seconds,
    #[serde(skip)]
    reset_interval: Option<Seconds>,
}

impl AccumulatorSet {
    /// Zeroed accumulators for `categories`
    pub fn new(
        categories: &[TendencyCategory],
        location: FieldLocation,
        n_horizontal: usize,
        n_levels: usize,
        reset_interval: Option<Seconds>,
    ) -> Self {
        Self {
            accumulators: categories
                .iter()
                .map(|&c| (c, Accumulator::new(c, location, n_horizontal, n_levels)))
                .collect(),
            window: Seconds::ZERO,
            reset_interval,
        }
    }

    /// Add one step of tendencies.
    ///
    /// If the window has reached the reset interval, every accumulator is
    /// zeroed first. `tendencies` must provide every accumulated category.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::MissingTendency`] if a category is not provided or
    /// [`PvError::ShapeMismatch`] if a tendency does not match its accumulator.
    /// Nothing is modified on error.
    pub fn accumulate<'a>(
        &mut self,
        tendencies: impl Fn(TendencyCategory) -> Option<&'a Field>,
        dt: Seconds,
    ) -> Result<(), PvError> {
        let mut updates = Vec::with_capacity(self.accumulators.len());
        for (&category, acc) in &self.accumulators {
            let tendency = tendencies(category).ok_or(PvError::MissingTendency(category))?;
            let (location, n_h, n_l) = acc.values.shape();
            tendency.check_shape(category.name(), location, n_h, n_l)?;
            updates.push((category, tendency));
        }

        self.reset_if_due(dt);
        for (category, tendency) in updates {
            if let Some(acc) = self.accumulators.get_mut(&category) {
                acc.add(tendency, dt)?;
            }
        }
        self.window += dt;
        Ok(())
    }

    /// Start a new window once the summed step lengths reach the interval.
    ///
    /// The window is a float sum of `dt`, so it is compared to the interval
    /// with half a step of slack.
    fn reset_if_due(&mut self, dt: Seconds) {
        let Some(interval) = self.reset_interval else {
            return;
        };
        if self.window.value() >= interval.value() - 0.5 * dt.value() {
            info!(
                "Resetting {} PV accumulators after {}",
                self.accumulators.len(),
                self.window
            );
            self.accumulators.values_mut().for_each(Accumulator::reset);
            self.window = Seconds::ZERO;
        }
    }

    /// Accumulator of one category
    pub fn get(&self, category: TendencyCategory) -> Option<&Accumulator> {
        self.accumulators.get(&category)
    }

    /// Accumulated categories in canonical order
    pub fn categories(&self) -> Vec<TendencyCategory> {
        let mut categories: Vec<_> = self.accumulators.keys().copied().collect();
        categories.sort_unstable();
        categories
    }

    /// Model time accumulated since the last reset
    pub fn window(&self) -> Seconds {
        self.window
    }

    /// Configured reset interval
    pub fn reset_interval(&self) -> Option<Seconds> {
        self.reset_interval
    }

    /// Replace values and window with those of a saved set.
    ///
    /// The reset interval stays as configured for this run.
    ///
    /// # Errors
    ///
    /// Returns [`PvError::Restart`] if the saved set covers different
    /// categories, or [`PvError::ShapeMismatch`] if a saved field has a
    /// different shape.
    pub fn restore(&mut self, saved: AccumulatorSet) -> Result<(), PvError> {
        if saved.categories() != self.categories() {
            return Err(PvError::Restart(format!(
                "accumulator categories {:?} do not match configured {:?}",
                saved.categories(),
                self.categories()
            )));
        }
        for (category, acc) in &saved.accumulators {
            if let Some(own) = self.accumulators.get(category) {
                let (location, n_h, n_l) = own.values.shape();
                acc.values
                    .check_shape(category.name(), location, n_h, n_l)?;
            }
        }
        self.accumulators = saved.accumulators;
        self.window = saved.window;
        Ok(())
    }
}
