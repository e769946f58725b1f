use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{PipelineError, PipelineResult};
use crate::market_data::MarketDataSource;
use crate::model::bar::TimeSeries;
use crate::pipeline::{run_entity, EntityForecast, PipelineSettings};
use crate::predictor::Predictor;
use crate::ranking::{rank, RankedResult};

pub const NO_PREDICTIONS_MESSAGE: &str = "no predictions available";

#[derive(Debug, Clone, PartialEq)]
pub struct CohortSettings {
    pub pipeline: PipelineSettings,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub price_weight: f64,
    pub workers: usize,
    pub predictor_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySkip {
    pub ticker: String,
    pub kind: String,
    pub reason: String,
}

impl EntitySkip {
    fn from_error(ticker: &str, err: &PipelineError) -> Self {
        Self {
            ticker: ticker.to_string(),
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Ranking {
    Ranked { results: Vec<RankedResult> },
    NoPredictions { message: String },
}

impl Ranking {
    pub fn results(&self) -> Option<&[RankedResult]> {
        match self {
            Self::Ranked { results } => Some(results),
            Self::NoPredictions { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CohortReport {
    pub run_id: String,
    pub forecasts: Vec<EntityForecast>,
    pub skipped: Vec<EntitySkip>,
    pub ranking: Ranking,
}

type EntityOutcome = (usize, String, PipelineResult<EntityForecast>);

/// Forecast every ticker on a bounded worker pool, then rank the survivors.
///
/// Per-entity failures (empty data, short series, predictor errors, panics,
/// timeouts) are recorded in `skipped` and never abort the run. Ranking
/// starts only after every entity has finished or been skipped. Forecasts
/// and skips both follow input order.
pub async fn run_cohort<M, F, P>(
    tickers: &[String],
    source: &M,
    quality: &HashMap<String, f64>,
    make_predictor: F,
    settings: &CohortSettings,
) -> PipelineResult<CohortReport>
where
    M: MarketDataSource,
    F: Fn(&str) -> P + Send + Sync + 'static,
    P: Predictor + 'static,
{
    let w = settings.price_weight;
    if !w.is_finite() || !(0.0..=1.0).contains(&w) {
        return Err(PipelineError::InvalidWeight(w));
    }
    let run_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        run_id = %run_id,
        entities = tickers.len(),
        workers = settings.workers,
        horizon = settings.pipeline.horizon_days,
        "cohort run started"
    );

    let mut entries: Vec<(usize, Result<EntityForecast, EntitySkip>)> =
        Vec::with_capacity(tickers.len());
    let mut fetched: Vec<(usize, TimeSeries)> = Vec::with_capacity(tickers.len());
    for (idx, ticker) in tickers.iter().enumerate() {
        match source.fetch(ticker, settings.start, settings.end).await {
            Ok(series) if series.is_empty() => {
                tracing::warn!(run_id = %run_id, ticker = %ticker, "no market data, skipping");
                entries.push((
                    idx,
                    Err(EntitySkip {
                        ticker: ticker.clone(),
                        kind: "no_data".to_string(),
                        reason: "no market data returned".to_string(),
                    }),
                ));
            }
            Ok(series) => fetched.push((idx, series)),
            Err(e) => {
                let err = PipelineError::MarketData(format!("{:#}", e));
                tracing::warn!(run_id = %run_id, ticker = %ticker, error = %err, "fetch failed, skipping");
                entries.push((idx, Err(EntitySkip::from_error(ticker, &err))));
            }
        }
    }

    for (idx, ticker, outcome) in forecast_all(fetched, make_predictor, settings).await {
        match outcome {
            Ok(forecast) => entries.push((idx, Ok(forecast))),
            Err(err) => {
                tracing::warn!(
                    run_id = %run_id,
                    ticker = %ticker,
                    kind = err.kind(),
                    error = %err,
                    "entity skipped"
                );
                entries.push((idx, Err(EntitySkip::from_error(&ticker, &err))));
            }
        }
    }
    entries.sort_by_key(|(idx, _)| *idx);

    let mut forecasts = Vec::new();
    let mut skipped = Vec::new();
    for (_, entry) in entries {
        match entry {
            Ok(forecast) => forecasts.push(forecast),
            Err(skip) => skipped.push(skip),
        }
    }

    let ranked_ids: Vec<String> = forecasts
        .iter()
        .filter(|f| f.mean_price.is_some())
        .map(|f| f.ticker.clone())
        .collect();
    let ranking = if ranked_ids.is_empty() {
        tracing::warn!(run_id = %run_id, skipped = skipped.len(), "{}", NO_PREDICTIONS_MESSAGE);
        Ranking::NoPredictions {
            message: NO_PREDICTIONS_MESSAGE.to_string(),
        }
    } else {
        let predicted: HashMap<String, f64> = forecasts
            .iter()
            .filter_map(|f| f.mean_price.map(|m| (f.ticker.clone(), m)))
            .collect();
        Ranking::Ranked {
            results: rank(&ranked_ids, &predicted, quality, w)?,
        }
    };

    tracing::info!(
        run_id = %run_id,
        forecasted = forecasts.len(),
        skipped = skipped.len(),
        "cohort run finished"
    );
    Ok(CohortReport {
        run_id,
        forecasts,
        skipped,
        ranking,
    })
}

/// Run every entity pipeline, at most `workers` at a time.
///
/// The worker permit moves into the blocking job and is released only when
/// that job returns, so a timed-out entity keeps its slot until its work
/// actually stops. The timeout itself is reported as soon as it fires.
async fn forecast_all<F, P>(
    series: Vec<(usize, TimeSeries)>,
    make_predictor: F,
    settings: &CohortSettings,
) -> Vec<EntityOutcome>
where
    F: Fn(&str) -> P + Send + Sync + 'static,
    P: Predictor + 'static,
{
    let semaphore = Arc::new(Semaphore::new(settings.workers.max(1)));
    let make_predictor = Arc::new(make_predictor);
    let timeout = settings.predictor_timeout;
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    let inputs: Vec<(usize, String)> = series
        .iter()
        .map(|(idx, s)| (*idx, s.ticker.clone()))
        .collect();

    let mut tasks = JoinSet::new();
    for (slot, (idx, s)) in series.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let make_predictor = make_predictor.clone();
        let pipeline = settings.pipeline;
        tasks.spawn(async move {
            let ticker = s.ticker.clone();
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let err = PipelineError::PredictorFailure(format!("worker pool closed: {}", e));
                    return (slot, (idx, ticker, Err(err)));
                }
            };
            let job = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let mut predictor = make_predictor(&s.ticker);
                run_entity(&s, &mut predictor, &pipeline)
            });
            let outcome = match tokio::time::timeout(timeout, job).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(PipelineError::PredictorFailure(format!(
                    "entity task aborted: {}",
                    join_err
                ))),
                Err(_) => Err(PipelineError::PredictorTimeout { timeout_ms }),
            };
            (slot, (idx, ticker, outcome))
        });
    }

    let mut slots: Vec<Option<EntityOutcome>> = (0..inputs.len()).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((slot, outcome)) => slots[slot] = Some(outcome),
            Err(e) => tracing::error!(error = %e, "entity task failed to join"),
        }
    }

    slots
        .into_iter()
        .zip(inputs)
        .map(|(slot, (idx, ticker))| {
            slot.unwrap_or_else(|| {
                (
                    idx,
                    ticker,
                    Err(PipelineError::PredictorFailure(
                        "entity task aborted".to_string(),
                    )),
                )
            })
        })
        .collect()
}
