//! Multi-dimensional binning: the cartesian product of per-dimension
//! discretizations, flattened with the first dimension varying fastest.

use super::{DimensionDiscretization, PhaseSpaceDimension, PhaseSpacePoint};

/// Product binning over the dimensions an estimator discretizes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseSpaceBinning {
    dimensions: Vec<DimensionDiscretization>,
    strides: Vec<usize>,
}

impl PhaseSpaceBinning {
    /// Dimensions are kept sorted so the flat layout does not depend on
    /// declaration order
    pub fn new(mut dimensions: Vec<DimensionDiscretization>) -> Self {
        dimensions.sort_by_key(|d| d.dimension());
        dimensions.dedup_by_key(|d| d.dimension());

        let mut strides = Vec::with_capacity(dimensions.len());
        let mut stride = 1;
        for d in &dimensions {
            strides.push(stride);
            stride *= d.number_of_bins();
        }
        Self { dimensions, strides }
    }

    pub fn dimensions(&self) -> &[DimensionDiscretization] {
        &self.dimensions
    }

    pub fn has_dimension(&self, dimension: PhaseSpaceDimension) -> bool {
        self.dimensions.iter().any(|d| d.dimension() == dimension)
    }

    pub fn get(&self, dimension: PhaseSpaceDimension) -> Option<&DimensionDiscretization> {
        self.dimensions.iter().find(|d| d.dimension() == dimension)
    }

    /// Total number of phase-space bins (1 when nothing is discretized)
    pub fn number_of_bins(&self) -> usize {
        self.dimensions.iter().map(|d| d.number_of_bins()).product()
    }

    pub fn is_point_in_phase_space(&self, point: &PhaseSpacePoint) -> bool {
        self.dimensions.iter().all(|d| d.is_point_in_discretization(point))
    }

    /// Flat bin indices of a point; empty when the point is outside
    pub fn calculate_bin_indices(&self, point: &PhaseSpacePoint) -> Vec<usize> {
        if !self.is_point_in_phase_space(point) {
            return Vec::new();
        }

        let mut combined = vec![0usize];
        let mut local = Vec::new();
        for (d, &stride) in self.dimensions.iter().zip(&self.strides) {
            local.clear();
            d.calculate_bin_indices(point.value(d.dimension()), &mut local);
            if local.is_empty() {
                return Vec::new();
            }
            combined = combined
                .iter()
                .flat_map(|&base| local.iter().map(move |&i| base + i * stride))
                .collect();
        }
        combined
    }

    /// Per-dimension bin indices of a flat index, in dimension order
    pub fn unflatten(&self, mut bin: usize) -> Vec<(PhaseSpaceDimension, usize)> {
        self.dimensions
            .iter()
            .map(|d| {
                let n = d.number_of_bins();
                let local = bin % n;
                bin /= n;
                (d.dimension(), local)
            })
            .collect()
    }
}
