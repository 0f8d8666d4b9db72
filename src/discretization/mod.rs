//! # Phase-Space Discretization
//!
//! Per-dimension binning of observed values.
//!
//! ## Discretization families
//!
//! ```text
//! Continuous        boundaries b0 ≤ b1 ≤ … ≤ bn      n bins, [b_i, b_{i+1}), last bin closed
//!                   b_i == b_{i+1}                   a "line" (delta) bin at that value
//! Ordered-discrete  categories c0 < c1 < … < c{n-1}  n bins, v goes to first c_j ≥ v
//! Unordered         sets S0, S1, … S{n-1}            n bins, v goes to every S_j ∋ v
//! ```
//!
//! All comparisons are plain IEEE comparisons; no tolerance is applied at the
//! boundaries. A discretization is immutable once constructed, so it can be
//! shared between worker threads without synchronisation.

pub mod phase_space;

pub use phase_space::PhaseSpaceBinning;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::particle::ParticleState;

// ============================================================================
// DIMENSIONS
// ============================================================================

/// Observable phase-space dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseSpaceDimension {
    Energy,
    Time,
    CollisionNumber,
    Cosine,
    SourceEnergy,
    SourceTime,
    SourceId,
}

impl PhaseSpaceDimension {
    pub const ALL: [PhaseSpaceDimension; 7] = [
        PhaseSpaceDimension::Energy,
        PhaseSpaceDimension::Time,
        PhaseSpaceDimension::CollisionNumber,
        PhaseSpaceDimension::Cosine,
        PhaseSpaceDimension::SourceEnergy,
        PhaseSpaceDimension::SourceTime,
        PhaseSpaceDimension::SourceId,
    ];

    /// Human-readable dimension name
    pub fn name(&self) -> &'static str {
        match self {
            PhaseSpaceDimension::Energy => "energy",
            PhaseSpaceDimension::Time => "time",
            PhaseSpaceDimension::CollisionNumber => "collision number",
            PhaseSpaceDimension::Cosine => "cosine",
            PhaseSpaceDimension::SourceEnergy => "source energy",
            PhaseSpaceDimension::SourceTime => "source time",
            PhaseSpaceDimension::SourceId => "source id",
        }
    }

    /// Key used in the `Bins` block of the run configuration
    pub fn config_key(&self) -> &'static str {
        match self {
            PhaseSpaceDimension::Energy => "Energy Bins",
            PhaseSpaceDimension::Time => "Time Bins",
            PhaseSpaceDimension::CollisionNumber => "Collision Number Bins",
            PhaseSpaceDimension::Cosine => "Cosine Bins",
            PhaseSpaceDimension::SourceEnergy => "Source Energy Bins",
            PhaseSpaceDimension::SourceTime => "Source Time Bins",
            PhaseSpaceDimension::SourceId => "Source Id Bins",
        }
    }
}

impl fmt::Display for PhaseSpaceDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of one dimension extracted from an observed point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DimensionValue {
    Continuous(f64),
    Discrete(u32),
}

/// Phase-space coordinates of an observation
///
/// Built from the particle state, then adjusted by the estimator when the
/// binned quantity is not the particle's own (crossing cosine, deposited
/// energy).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSpacePoint {
    pub energy: f64,
    pub time: f64,
    pub collision_number: u32,
    pub cosine: f64,
    pub source_energy: f64,
    pub source_time: f64,
    pub source_id: u32,
}

impl PhaseSpacePoint {
    pub fn from_state(state: &ParticleState) -> Self {
        Self {
            energy: state.energy,
            time: state.time,
            collision_number: state.collision_number,
            cosine: 1.0,
            source_energy: state.source_energy,
            source_time: state.source_time,
            source_id: state.source_id,
        }
    }

    /// Point carrying only an energy, as binned by pulse-height estimators
    pub fn from_energy(energy: f64) -> Self {
        Self {
            energy,
            time: 0.0,
            collision_number: 0,
            cosine: 1.0,
            source_energy: 0.0,
            source_time: 0.0,
            source_id: 0,
        }
    }

    pub fn with_cosine(mut self, cosine: f64) -> Self {
        self.cosine = cosine;
        self
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = energy;
        self
    }

    pub fn value(&self, dimension: PhaseSpaceDimension) -> DimensionValue {
        match dimension {
            PhaseSpaceDimension::Energy => DimensionValue::Continuous(self.energy),
            PhaseSpaceDimension::Time => DimensionValue::Continuous(self.time),
            PhaseSpaceDimension::CollisionNumber => DimensionValue::Discrete(self.collision_number),
            PhaseSpaceDimension::Cosine => DimensionValue::Continuous(self.cosine),
            PhaseSpaceDimension::SourceEnergy => DimensionValue::Continuous(self.source_energy),
            PhaseSpaceDimension::SourceTime => DimensionValue::Continuous(self.source_time),
            PhaseSpaceDimension::SourceId => DimensionValue::Discrete(self.source_id),
        }
    }
}

// ============================================================================
// CONTINUOUS
// ============================================================================

/// Boundary-based binning of a real-valued dimension
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousDiscretization {
    boundaries: Vec<f64>,
}

impl ContinuousDiscretization {
    /// Boundaries must be non-decreasing with at least two entries
    pub fn new(boundaries: Vec<f64>) -> Result<Self, DiscretizationError> {
        if boundaries.len() < 2 {
            return Err(DiscretizationError::TooFewEntries {
                required: 2,
                found: boundaries.len(),
            });
        }
        if boundaries.iter().any(|b| b.is_nan()) || !boundaries.windows(2).all(|w| w[0] <= w[1]) {
            return Err(DiscretizationError::Unsorted);
        }
        Ok(Self { boundaries })
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn number_of_bins(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn lower_bound(&self) -> f64 {
        self.boundaries[0]
    }

    pub fn upper_bound(&self) -> f64 {
        self.boundaries[self.boundaries.len() - 1]
    }

    pub fn is_line_bin(&self, bin: usize) -> bool {
        self.boundaries[bin] == self.boundaries[bin + 1]
    }

    pub fn is_value_in_discretization(&self, value: f64) -> bool {
        value >= self.lower_bound() && value <= self.upper_bound()
    }

    /// Bins containing `value`, appended to `bins`
    pub fn calculate_bin_indices(&self, value: f64, bins: &mut Vec<usize>) {
        if !self.is_value_in_discretization(value) {
            return;
        }

        let before = bins.len();
        bins.extend(
            self.boundaries
                .windows(2)
                .enumerate()
                .filter(|(_, w)| w[0] == value && w[1] == value)
                .map(|(i, _)| i),
        );
        if bins.len() > before {
            return;
        }

        let upper = self.boundaries.partition_point(|&b| b <= value);
        bins.push(upper.saturating_sub(1).min(self.number_of_bins() - 1));
    }
}

// ============================================================================
// ORDERED DISCRETE
// ============================================================================

/// Ordered categories of an integer-valued dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedDiscreteDiscretization<T> {
    categories: Vec<T>,
}

impl<T: Ord + Copy> OrderedDiscreteDiscretization<T> {
    /// Categories must be strictly increasing
    pub fn new(categories: Vec<T>) -> Result<Self, DiscretizationError> {
        if categories.is_empty() {
            return Err(DiscretizationError::TooFewEntries { required: 1, found: 0 });
        }
        if !categories.windows(2).all(|w| w[0] < w[1]) {
            return Err(DiscretizationError::Unsorted);
        }
        Ok(Self { categories })
    }

    pub fn categories(&self) -> &[T] {
        &self.categories
    }

    pub fn number_of_bins(&self) -> usize {
        self.categories.len()
    }

    pub fn is_value_in_discretization(&self, value: T) -> bool {
        match (self.categories.first(), self.categories.last()) {
            (Some(&lo), Some(&hi)) => value >= lo && value <= hi,
            _ => false,
        }
    }

    /// Bin of `value`; anything above the last category lands in the last bin
    pub fn calculate_bin_index(&self, value: T) -> usize {
        self.categories
            .partition_point(|&c| c < value)
            .min(self.categories.len() - 1)
    }

    pub fn calculate_bin_indices(&self, value: T, bins: &mut Vec<usize>) {
        bins.push(self.calculate_bin_index(value));
    }
}

// ============================================================================
// UNORDERED
// ============================================================================

/// Possibly overlapping category sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnorderedDiscretization<T> {
    sets: Vec<BTreeSet<T>>,
}

impl<T: Ord + Copy> UnorderedDiscretization<T> {
    pub fn new(sets: Vec<BTreeSet<T>>) -> Result<Self, DiscretizationError> {
        if sets.is_empty() {
            return Err(DiscretizationError::TooFewEntries { required: 1, found: 0 });
        }
        if sets.iter().any(BTreeSet::is_empty) {
            return Err(DiscretizationError::EmptyCategory);
        }
        Ok(Self { sets })
    }

    pub fn sets(&self) -> &[BTreeSet<T>] {
        &self.sets
    }

    pub fn number_of_bins(&self) -> usize {
        self.sets.len()
    }

    pub fn is_value_in_discretization(&self, value: T) -> bool {
        self.sets.iter().any(|s| s.contains(&value))
    }

    pub fn calculate_bin_indices(&self, value: T, bins: &mut Vec<usize>) {
        bins.extend(
            self.sets
                .iter()
                .enumerate()
                .filter(|(_, s)| s.contains(&value))
                .map(|(i, _)| i),
        );
    }
}

/// Construction failures; the caller attaches the estimator context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscretizationError {
    Unsorted,
    TooFewEntries { required: usize, found: usize },
    EmptyCategory,
}

// ============================================================================
// DIMENSION DISCRETIZATION
// ============================================================================

/// Discretization bound to a phase-space dimension
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionDiscretization {
    Continuous {
        dimension: PhaseSpaceDimension,
        bins: ContinuousDiscretization,
    },
    OrderedDiscrete {
        dimension: PhaseSpaceDimension,
        bins: OrderedDiscreteDiscretization<u32>,
    },
    Unordered {
        dimension: PhaseSpaceDimension,
        bins: UnorderedDiscretization<u32>,
    },
}

impl DimensionDiscretization {
    pub fn dimension(&self) -> PhaseSpaceDimension {
        match self {
            DimensionDiscretization::Continuous { dimension, .. }
            | DimensionDiscretization::OrderedDiscrete { dimension, .. }
            | DimensionDiscretization::Unordered { dimension, .. } => *dimension,
        }
    }

    pub fn number_of_bins(&self) -> usize {
        match self {
            DimensionDiscretization::Continuous { bins, .. } => bins.number_of_bins(),
            DimensionDiscretization::OrderedDiscrete { bins, .. } => bins.number_of_bins(),
            DimensionDiscretization::Unordered { bins, .. } => bins.number_of_bins(),
        }
    }

    /// A value of the wrong kind is never in the discretization
    pub fn is_value_in_discretization(&self, value: DimensionValue) -> bool {
        match (self, value) {
            (DimensionDiscretization::Continuous { bins, .. }, DimensionValue::Continuous(v)) => {
                bins.is_value_in_discretization(v)
            }
            (DimensionDiscretization::OrderedDiscrete { bins, .. }, DimensionValue::Discrete(v)) => {
                bins.is_value_in_discretization(v)
            }
            (DimensionDiscretization::Unordered { bins, .. }, DimensionValue::Discrete(v)) => {
                bins.is_value_in_discretization(v)
            }
            _ => false,
        }
    }

    pub fn calculate_bin_indices(&self, value: DimensionValue, out: &mut Vec<usize>) {
        match (self, value) {
            (DimensionDiscretization::Continuous { bins, .. }, DimensionValue::Continuous(v)) => {
                bins.calculate_bin_indices(v, out)
            }
            (DimensionDiscretization::OrderedDiscrete { bins, .. }, DimensionValue::Discrete(v)) => {
                bins.calculate_bin_indices(v, out)
            }
            (DimensionDiscretization::Unordered { bins, .. }, DimensionValue::Discrete(v)) => {
                bins.calculate_bin_indices(v, out)
            }
            _ => {}
        }
    }

    /// Same as `is_value_in_discretization`, reading the value from a point
    pub fn is_point_in_discretization(&self, point: &PhaseSpacePoint) -> bool {
        self.is_value_in_discretization(point.value(self.dimension()))
    }

    pub fn calculate_bin_indices_for_point(&self, point: &PhaseSpacePoint) -> Vec<usize> {
        let mut bins = Vec::new();
        self.calculate_bin_indices(point.value(self.dimension()), &mut bins);
        bins
    }

    /// Same as `calculate_bin_indices_for_point`, reading the point from a particle
    pub fn calculate_bin_indices_for_state(&self, state: &ParticleState) -> Vec<usize> {
        self.calculate_bin_indices_for_point(&PhaseSpacePoint::from_state(state))
    }
}
