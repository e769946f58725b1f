use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};
use crate::predictor::Predictor;
use crate::reconstruct::reconstruct_one;
use crate::scaler::Scaler;
use crate::window::WindowSample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccuracyMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub samples: usize,
}

/// Accumulates (actual, predicted) pairs in price units.
#[derive(Debug, Clone, Default)]
pub struct ErrorAccumulator {
    pairs: Vec<(f64, f64)>,
}

impl ErrorAccumulator {
    pub fn observe(&mut self, y_real: f64, y_pred: f64) {
        if !y_real.is_finite() || !y_pred.is_finite() {
            return;
        }
        self.pairs.push((y_real, y_pred));
    }

    pub fn sample_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn mae(&self) -> Option<f64> {
        let n = self.pairs.len();
        if n == 0 {
            return None;
        }
        let sum_abs = self
            .pairs
            .iter()
            .map(|(y, yhat)| (y - yhat).abs())
            .sum::<f64>();
        Some(sum_abs / n as f64)
    }

    pub fn rmse(&self) -> Option<f64> {
        let n = self.pairs.len();
        if n == 0 {
            return None;
        }
        let sse = self
            .pairs
            .iter()
            .map(|(y, yhat)| (y - yhat) * (y - yhat))
            .sum::<f64>();
        Some((sse / n as f64).sqrt())
    }

    pub fn finish(&self) -> Option<AccuracyMetrics> {
        Some(AccuracyMetrics {
            rmse: self.rmse()?,
            mae: self.mae()?,
            samples: self.sample_count(),
        })
    }
}

/// RMSE / MAE of one-step predictions over `test` windows, in price units.
///
/// Actual and predicted targets are both unscaled against the last row of
/// their window. Returns `Ok(None)` when there are no test windows.
pub fn evaluate<P: Predictor + ?Sized>(
    predictor: &P,
    scaler: &Scaler,
    test: &[WindowSample],
) -> PipelineResult<Option<AccuracyMetrics>> {
    let mut acc = ErrorAccumulator::default();
    for sample in test {
        let Some(last) = sample.window.last() else {
            continue;
        };
        let pred = predictor
            .predict(&sample.window)
            .map_err(|e| PipelineError::PredictorFailure(format!("{:#}", e)))?;
        if !pred.is_finite() {
            return Err(PipelineError::PredictorFailure(format!(
                "non-finite prediction {} on test window",
                pred
            )));
        }
        acc.observe(
            reconstruct_one(scaler, last, sample.target),
            reconstruct_one(scaler, last, pred),
        );
    }
    Ok(acc.finish())
}
