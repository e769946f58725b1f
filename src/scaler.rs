use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::model::feature::{FeatureVector, FEATURE_COUNT, TARGET_INDEX};

/// Per-feature min-max bounds fit over one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    min: FeatureVector,
    max: FeatureVector,
}

impl Scaler {
    pub fn fit(dataset: &[FeatureVector]) -> PipelineResult<Self> {
        if dataset.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let mut min = [f64::INFINITY; FEATURE_COUNT];
        let mut max = [f64::NEG_INFINITY; FEATURE_COUNT];
        for (row_idx, row) in dataset.iter().enumerate() {
            for (f, v) in row.iter().enumerate() {
                if !v.is_finite() {
                    return Err(PipelineError::NonFiniteInput {
                        row: row_idx,
                        feature: f,
                    });
                }
                min[f] = min[f].min(*v);
                max[f] = max[f].max(*v);
            }
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> &FeatureVector {
        &self.min
    }

    pub fn max(&self) -> &FeatureVector {
        &self.max
    }

    /// Divisor for feature `f`; a constant feature scales by 1.
    fn span(&self, f: usize) -> f64 {
        let span = self.max[f] - self.min[f];
        if span > 0.0 {
            span
        } else {
            1.0
        }
    }

    pub fn transform_row(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for (f, cell) in out.iter_mut().enumerate() {
            *cell = (row[f] - self.min[f]) / self.span(f);
        }
        out
    }

    pub fn transform(&self, dataset: &[FeatureVector]) -> Vec<FeatureVector> {
        dataset.iter().map(|row| self.transform_row(row)).collect()
    }

    pub fn inverse_row(&self, scaled: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for (f, cell) in out.iter_mut().enumerate() {
            *cell = scaled[f] * self.span(f) + self.min[f];
        }
        out
    }

    pub fn inverse(&self, scaled: &[FeatureVector]) -> Vec<FeatureVector> {
        scaled.iter().map(|row| self.inverse_row(row)).collect()
    }

    pub fn inverse_target(&self, scaled: f64) -> f64 {
        scaled * self.span(TARGET_INDEX) + self.min[TARGET_INDEX]
    }
}
