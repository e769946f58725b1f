use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::model::feature::{with_target, FeatureVector, TARGET_INDEX};
use crate::scaler::Scaler;

/// Which rows supply the non-target columns when unscaling a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionContext {
    /// The trailing `L` rows of the pre-forecast series, reused positionally
    /// (step `k` takes row `k % L`).
    SeriesTail,
    /// The row the forecaster itself carried forward at each step.
    #[default]
    CarriedForward,
}

/// Unscale a forecast by rebuilding full rows around each predicted target.
///
/// Step `k` borrows the non-target columns of `context[k % context.len()]`,
/// so a context as long as the forecast aligns one row per step.
pub fn reconstruct(
    scaler: &Scaler,
    scaled_forecast: &[f64],
    context: &[FeatureVector],
) -> PipelineResult<Vec<f64>> {
    if scaled_forecast.is_empty() {
        return Ok(Vec::new());
    }
    if context.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    Ok(scaled_forecast
        .iter()
        .enumerate()
        .map(|(k, p)| reconstruct_one(scaler, &context[k % context.len()], *p))
        .collect())
}

/// Unscaled target for `scaled_target` placed into `context_row`.
pub fn reconstruct_one(scaler: &Scaler, context_row: &FeatureVector, scaled_target: f64) -> f64 {
    scaler.inverse_row(&with_target(context_row, scaled_target))[TARGET_INDEX]
}
