use std::collections::VecDeque;

use crate::error::{PipelineError, PipelineResult};
use crate::model::feature::{with_target, FeatureVector};
use crate::predictor::Predictor;

/// Output of one autoregressive run, in scaled space.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRun {
    /// One predicted target per step.
    pub scaled: Vec<f64>,
    /// Row appended to the rolling window after each step: the previous last
    /// row with only the target replaced by that step's prediction.
    pub carried_rows: Vec<FeatureVector>,
}

/// Multi-step forecast that feeds each prediction back as the next input.
pub fn forecast<P: Predictor + ?Sized>(
    predictor: &P,
    seed_window: &[FeatureVector],
    steps: usize,
) -> PipelineResult<Vec<f64>> {
    forecast_with_context(predictor, seed_window, steps).map(|run| run.scaled)
}

pub fn forecast_with_context<P: Predictor + ?Sized>(
    predictor: &P,
    seed_window: &[FeatureVector],
    steps: usize,
) -> PipelineResult<ForecastRun> {
    let mut run = ForecastRun {
        scaled: Vec::with_capacity(steps),
        carried_rows: Vec::with_capacity(steps),
    };
    if steps == 0 {
        return Ok(run);
    }
    if seed_window.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let mut state: VecDeque<FeatureVector> = seed_window.iter().copied().collect();
    let mut input: Vec<FeatureVector> = Vec::with_capacity(state.len());
    for step in 0..steps {
        input.clear();
        input.extend(state.iter().copied());
        let p = predictor
            .predict(&input)
            .map_err(|e| PipelineError::PredictorFailure(format!("step {}: {:#}", step + 1, e)))?;
        if !p.is_finite() {
            return Err(PipelineError::PredictorFailure(format!(
                "step {}: non-finite prediction {}",
                step + 1,
                p
            )));
        }
        run.scaled.push(p);

        let Some(last) = state.back() else {
            return Err(PipelineError::EmptyInput);
        };
        let next = with_target(last, p);
        run.carried_rows.push(next);
        let _ = state.pop_front();
        state.push_back(next);
    }
    Ok(run)
}
