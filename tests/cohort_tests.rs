use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use sandbox_forecast::cohort::{run_cohort, CohortSettings, Ranking, NO_PREDICTIONS_MESSAGE};
use sandbox_forecast::error::PipelineError;
use sandbox_forecast::market_data::{InMemoryMarketData, MarketDataSource};
use sandbox_forecast::model::bar::{DailyBar, TimeSeries};
use sandbox_forecast::model::feature::{FeatureVector, TARGET_INDEX};
use sandbox_forecast::pipeline::PipelineSettings;
use sandbox_forecast::predictor::Predictor;
use sandbox_forecast::window::WindowSample;

/// Persistence behaviour with scripted failures and delays.
struct Scripted {
    fail: bool,
    delay: Duration,
}

impl Predictor for Scripted {
    fn train(&mut self, _train: &[WindowSample], _validation: &[WindowSample]) -> Result<()> {
        std::thread::sleep(self.delay);
        if self.fail {
            bail!("scripted training failure");
        }
        Ok(())
    }

    fn predict(&self, window: &[FeatureVector]) -> Result<f64> {
        match window.last() {
            Some(row) => Ok(row[TARGET_INDEX]),
            None => bail!("empty window"),
        }
    }
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()
}

fn series(ticker: &str, n: usize, level: f64) -> TimeSeries {
    let bars = (0..n)
        .map(|i| {
            let t = i as f64;
            let close = level + (t / 5.0).sin();
            DailyBar {
                date: start() + chrono::Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0 + t,
            }
        })
        .collect();
    TimeSeries::new(ticker, bars)
}

fn settings(weight: f64, timeout: Duration) -> CohortSettings {
    CohortSettings {
        pipeline: PipelineSettings {
            window_length: 10,
            horizon_days: 15,
            ..PipelineSettings::default()
        },
        start: start(),
        end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        price_weight: weight,
        workers: 2,
        predictor_timeout: timeout,
    }
}

fn tickers(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn source() -> InMemoryMarketData {
    InMemoryMarketData::new()
        .with_series(series("AAA", 60, 50.0))
        .with_series(series("BBB", 60, 200.0))
        .with_series(series("CCC", 60, 120.0))
        .with_series(series("SHORT", 8, 10.0))
}

fn persistence(_: &str) -> Scripted {
    Scripted {
        fail: false,
        delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn ranks_all_forecasted_entities_by_price() {
    let quality = HashMap::new();
    let report = run_cohort(
        &tickers(&["AAA", "BBB", "CCC"]),
        &source(),
        &quality,
        persistence,
        &settings(1.0, Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert!(report.skipped.is_empty());
    assert!(!report.run_id.is_empty());
    let order: Vec<&str> = report.forecasts.iter().map(|f| f.ticker.as_str()).collect();
    assert_eq!(order, vec!["AAA", "BBB", "CCC"]);
    assert!(report.forecasts.iter().all(|f| f.points.len() == 15));

    let ranked: Vec<&str> = report
        .ranking
        .results()
        .unwrap()
        .iter()
        .map(|r| r.ticker.as_str())
        .collect();
    assert_eq!(ranked, vec!["BBB", "CCC", "AAA"]);
}

#[tokio::test]
async fn failures_are_isolated_per_entity() {
    let quality: HashMap<String, f64> = [("AAA".to_string(), 90.0), ("CCC".to_string(), 10.0)]
        .into_iter()
        .collect();
    let report = run_cohort(
        &tickers(&["AAA", "BBB", "SHORT", "MISSING", "CCC"]),
        &source(),
        &quality,
        |ticker: &str| Scripted {
            fail: ticker == "BBB",
            delay: Duration::ZERO,
        },
        &settings(0.0, Duration::from_secs(10)),
    )
    .await
    .unwrap();

    let forecasted: Vec<&str> = report.forecasts.iter().map(|f| f.ticker.as_str()).collect();
    assert_eq!(forecasted, vec!["AAA", "CCC"]);

    let skipped: HashMap<&str, &str> = report
        .skipped
        .iter()
        .map(|s| (s.ticker.as_str(), s.kind.as_str()))
        .collect();
    assert_eq!(skipped.get("BBB"), Some(&"predictor_failure"));
    assert_eq!(skipped.get("SHORT"), Some(&"insufficient_data"));
    assert_eq!(skipped.get("MISSING"), Some(&"no_data"));
    let skip_order: Vec<&str> = report.skipped.iter().map(|s| s.ticker.as_str()).collect();
    assert_eq!(skip_order, vec!["BBB", "SHORT", "MISSING"]);

    let ranked = report.ranking.results().unwrap();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].ticker, "AAA");
    assert_eq!(ranked[0].rank, 1);
}

#[tokio::test]
async fn slow_predictor_times_out_without_blocking_others() {
    let report = run_cohort(
        &tickers(&["AAA", "BBB"]),
        &source(),
        &HashMap::new(),
        |ticker: &str| Scripted {
            fail: false,
            delay: if ticker == "AAA" {
                Duration::from_millis(1500)
            } else {
                Duration::ZERO
            },
        },
        &settings(0.5, Duration::from_millis(200)),
    )
    .await
    .unwrap();

    assert_eq!(report.forecasts.len(), 1);
    assert_eq!(report.forecasts[0].ticker, "BBB");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].ticker, "AAA");
    assert_eq!(report.skipped[0].kind, "predictor_timeout");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn completion_order_does_not_change_output_order() {
    let report = run_cohort(
        &tickers(&["AAA", "BBB", "CCC"]),
        &source(),
        &HashMap::new(),
        |ticker: &str| Scripted {
            fail: false,
            delay: match ticker {
                "AAA" => Duration::from_millis(150),
                "BBB" => Duration::from_millis(75),
                _ => Duration::ZERO,
            },
        },
        &CohortSettings {
            workers: 3,
            ..settings(0.5, Duration::from_secs(10))
        },
    )
    .await
    .unwrap();
    let order: Vec<&str> = report.forecasts.iter().map(|f| f.ticker.as_str()).collect();
    assert_eq!(order, vec!["AAA", "BBB", "CCC"]);
}

#[tokio::test]
async fn no_survivors_reports_no_predictions() {
    let report = run_cohort(
        &tickers(&["SHORT", "MISSING"]),
        &source(),
        &HashMap::new(),
        persistence,
        &settings(0.5, Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert!(report.forecasts.is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert!(report.ranking.results().is_none());
    assert_eq!(
        report.ranking,
        Ranking::NoPredictions {
            message: NO_PREDICTIONS_MESSAGE.to_string()
        }
    );

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["ranking"]["status"], "no_predictions");
}

#[tokio::test]
async fn zero_horizon_entities_are_not_ranked() {
    let mut cfg = settings(0.5, Duration::from_secs(10));
    cfg.pipeline.horizon_days = 0;
    let report = run_cohort(&tickers(&["AAA"]), &source(), &HashMap::new(), persistence, &cfg)
        .await
        .unwrap();
    assert_eq!(report.forecasts.len(), 1);
    assert!(report.forecasts[0].mean_price.is_none());
    assert!(matches!(report.ranking, Ranking::NoPredictions { .. }));
}

#[tokio::test]
async fn invalid_weight_fails_before_fetching() {
    let err = run_cohort(
        &tickers(&["AAA"]),
        &source(),
        &HashMap::new(),
        persistence,
        &settings(1.5, Duration::from_secs(10)),
    )
    .await
    .unwrap_err();
    assert_eq!(err, PipelineError::InvalidWeight(1.5));
}

struct Unreachable;

impl MarketDataSource for Unreachable {
    async fn fetch(&self, ticker: &str, _start: NaiveDate, _end: NaiveDate) -> Result<TimeSeries> {
        bail!("connection refused for {}", ticker)
    }
}

#[tokio::test]
async fn fetch_errors_become_market_data_skips() {
    let report = run_cohort(
        &tickers(&["AAA"]),
        &Unreachable,
        &HashMap::new(),
        persistence,
        &settings(0.5, Duration::from_secs(10)),
    )
    .await
    .unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].kind, "market_data");
    assert!(report.skipped[0].reason.contains("connection refused"));
}

/// Tracks how many `train` calls are in flight at once.
struct Gauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

impl Predictor for Gauge {
    fn train(&mut self, _train: &[WindowSample], _validation: &[WindowSample]) -> Result<()> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn predict(&self, window: &[FeatureVector]) -> Result<f64> {
        match window.last() {
            Some(row) => Ok(row[TARGET_INDEX]),
            None => bail!("empty window"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timed_out_jobs_keep_their_worker_slot() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut source = InMemoryMarketData::new();
    let names: Vec<String> = (0..4).map(|i| format!("T{i}")).collect();
    for (i, name) in names.iter().enumerate() {
        source.insert(series(name, 60, 10.0 * (i + 1) as f64));
    }

    let (c, p) = (current.clone(), peak.clone());
    let report = run_cohort(
        &names,
        &source,
        &HashMap::new(),
        move |_: &str| Gauge {
            current: c.clone(),
            peak: p.clone(),
            delay: Duration::from_millis(250),
        },
        &CohortSettings {
            workers: 1,
            ..settings(0.5, Duration::from_millis(40))
        },
    )
    .await
    .unwrap();

    assert_eq!(report.skipped.len(), 4);
    assert!(report
        .skipped
        .iter()
        .all(|s| s.kind == "predictor_timeout"));
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}
