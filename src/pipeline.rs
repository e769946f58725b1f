use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::forecast::forecast_with_context;
use crate::metrics::{evaluate, AccuracyMetrics};
use crate::model::bar::TimeSeries;
use crate::predictor::Predictor;
use crate::reconstruct::{reconstruct, ReconstructionContext};
use crate::scaler::Scaler;
use crate::window::{build_windows, last_window, min_rows_for_windows};

/// Which rows the per-entity scaler is fit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerFitPolicy {
    /// Fit on the whole series before splitting. Test-partition bounds leak
    /// into the scaling of the train partition.
    #[default]
    FullSeries,
    /// Fit on the train partition only and apply unchanged everywhere else.
    TrainOnly,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub window_length: usize,
    pub horizon_days: usize,
    pub train_split: f64,
    pub scaler_fit: ScalerFitPolicy,
    pub reconstruction: ReconstructionContext,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window_length: 100,
            horizon_days: 90,
            train_split: 0.65,
            scaler_fit: ScalerFitPolicy::FullSeries,
            reconstruction: ReconstructionContext::CarriedForward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub day_offset: usize,
    pub predicted_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityForecast {
    pub ticker: String,
    pub points: Vec<ForecastPoint>,
    /// Arithmetic mean of the forecast prices; `None` for an empty horizon.
    pub mean_price: Option<f64>,
    /// `None` when the test partition is too short to yield a window.
    pub accuracy: Option<AccuracyMetrics>,
    pub last_close: f64,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_windows: usize,
    pub test_windows: usize,
}

impl EntityForecast {
    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.predicted_price).collect()
    }
}

/// Number of leading rows assigned to the train partition.
pub fn split_index(len: usize, train_split: f64) -> usize {
    ((len as f64) * train_split).floor() as usize
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Scale, window, train, evaluate, forecast and unscale one entity.
pub fn run_entity<P: Predictor + ?Sized>(
    series: &TimeSeries,
    predictor: &mut P,
    settings: &PipelineSettings,
) -> PipelineResult<EntityForecast> {
    let rows = series.features();
    if rows.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let window_len = settings.window_length;
    let needed = min_rows_for_windows(window_len);
    if rows.len() < needed {
        return Err(PipelineError::InsufficientData {
            needed,
            got: rows.len(),
        });
    }

    let train_size = split_index(rows.len(), settings.train_split).min(rows.len());
    let scaler = match settings.scaler_fit {
        ScalerFitPolicy::FullSeries => Scaler::fit(&rows)?,
        ScalerFitPolicy::TrainOnly => Scaler::fit(&rows[..train_size])?,
    };
    let scaled = scaler.transform(&rows);
    let (train, test) = scaled.split_at(train_size);

    let train_windows = build_windows(train, window_len);
    let test_windows = build_windows(test, window_len);
    if train_windows.is_empty() {
        let needed = ((needed as f64) / settings.train_split).ceil() as usize;
        return Err(PipelineError::InsufficientData {
            needed,
            got: rows.len(),
        });
    }
    if test_windows.is_empty() {
        tracing::warn!(
            ticker = %series.ticker,
            test_rows = test.len(),
            needed,
            "test partition too short, accuracy metrics unavailable"
        );
    }

    predictor
        .train(&train_windows, &test_windows)
        .map_err(|e| PipelineError::PredictorFailure(format!("training failed: {:#}", e)))?;
    let accuracy = evaluate(&*predictor, &scaler, &test_windows)?;

    let Some(seed) = last_window(&scaled, window_len) else {
        return Err(PipelineError::InsufficientData {
            needed: window_len,
            got: scaled.len(),
        });
    };
    let run = forecast_with_context(&*predictor, &seed, settings.horizon_days)?;
    let context = match settings.reconstruction {
        ReconstructionContext::SeriesTail => &seed,
        ReconstructionContext::CarriedForward => &run.carried_rows,
    };
    let prices = reconstruct(&scaler, &run.scaled, context)?;

    let points: Vec<ForecastPoint> = prices
        .iter()
        .enumerate()
        .map(|(k, price)| ForecastPoint {
            day_offset: k + 1,
            predicted_price: *price,
        })
        .collect();
    let mean_price = mean(&prices);
    let last_close = series.bars.last().map(|b| b.close).unwrap_or_default();

    tracing::info!(
        ticker = %series.ticker,
        rows = rows.len(),
        train_windows = train_windows.len(),
        test_windows = test_windows.len(),
        horizon = settings.horizon_days,
        mean_price = mean_price.unwrap_or(f64::NAN),
        rmse = accuracy.map(|m| m.rmse).unwrap_or(f64::NAN),
        "entity forecast complete"
    );

    Ok(EntityForecast {
        ticker: series.ticker.clone(),
        points,
        mean_price,
        accuracy,
        last_close,
        train_rows: train.len(),
        test_rows: test.len(),
        train_windows: train_windows.len(),
        test_windows: test_windows.len(),
    })
}
