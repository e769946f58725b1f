use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::{PipelineSettings, ScalerFitPolicy};
use crate::predictor::PredictorConfig;
use crate::reconstruct::ReconstructionContext;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub market_data: MarketDataConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    pub ranking: RankingConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    pub data_base_url: String,
    #[serde(default = "default_feed")]
    pub feed: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(skip)]
    pub api_key: String,
    #[serde(skip)]
    pub api_secret: String,
}

fn default_feed() -> String {
    "iex".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_window_length")]
    pub window_length: usize,
    #[serde(default = "default_horizon")]
    pub horizon: String,
    #[serde(default = "default_train_split")]
    pub train_split: f64,
    #[serde(default)]
    pub scaler_fit: ScalerFitPolicy,
    #[serde(default)]
    pub reconstruction: ReconstructionContext,
}

fn default_window_length() -> usize {
    100
}

fn default_horizon() -> String {
    "3m".to_string()
}

fn default_train_split() -> f64 {
    0.65
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_price_weight")]
    pub price_weight: f64,
    #[serde(default = "default_quality_scores_path")]
    pub quality_scores_path: PathBuf,
}

fn default_price_weight() -> f64 {
    0.5
}

fn default_quality_scores_path() -> PathBuf {
    PathBuf::from("esg_data.csv")
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub workers: usize,
    pub predictor_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            predictor_timeout_ms: 120_000,
        }
    }
}

impl RuntimeConfig {
    pub fn predictor_timeout(&self) -> Duration {
        Duration::from_millis(self.predictor_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Parse a forecast horizon ("90d", "12w", "3m", "6m", "1y") into trading days.
///
/// Months count as 30 days and years as 365.
pub fn parse_horizon_days(s: &str) -> Result<usize> {
    let s = s.trim();
    let Some((split, _)) = s.char_indices().next_back() else {
        bail!("invalid horizon '{}': expected format like '3m'", s);
    };
    if split == 0 {
        bail!("invalid horizon '{}': expected format like '3m'", s);
    }

    let (num_str, suffix) = s.split_at(split);
    let n: usize = num_str.parse().with_context(|| {
        format!(
            "invalid horizon '{}': quantity must be a positive integer",
            s
        )
    })?;
    if n == 0 {
        bail!("invalid horizon '{}': quantity must be > 0", s);
    }

    let unit_days = match suffix {
        "d" => 1,
        "w" => 7,
        "m" => 30,
        "y" => 365,
        _ => bail!(
            "invalid horizon '{}': unsupported suffix '{}', expected one of d/w/m/y",
            s,
            suffix
        ),
    };

    n.checked_mul(unit_days)
        .with_context(|| format!("invalid horizon '{}': value is too large", s))
}

impl MarketDataConfig {
    pub fn cohort_tickers(&self) -> Vec<String> {
        normalize_tickers(&self.tickers)
    }
}

/// Trim, upper-case and de-duplicate tickers, keeping first occurrence order.
pub fn normalize_tickers(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for t in raw {
        let s = t.trim().to_ascii_uppercase();
        if !s.is_empty() && !out.iter().any(|v| v == &s) {
            out.push(s);
        }
    }
    out
}

impl PipelineConfig {
    pub fn settings(&self) -> Result<PipelineSettings> {
        if self.window_length == 0 {
            bail!("pipeline.window_length must be > 0");
        }
        if !(self.train_split > 0.0 && self.train_split < 1.0) {
            bail!(
                "pipeline.train_split must be in (0, 1), got {}",
                self.train_split
            );
        }
        let horizon_days =
            parse_horizon_days(&self.horizon).context("pipeline.horizon is invalid")?;
        Ok(PipelineSettings {
            window_length: self.window_length,
            horizon_days,
            train_split: self.train_split,
            scaler_fit: self.scaler_fit,
            reconstruction: self.reconstruction,
        })
    }
}

fn config_path() -> PathBuf {
    std::env::var("SF_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/default.toml"))
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from_path(&config_path())
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        config.market_data.api_key = std::env::var("ALPACA_API_KEY")
            .context("ALPACA_API_KEY not set in .env or environment")?;
        config.market_data.api_secret = std::env::var("ALPACA_API_SECRET")
            .context("ALPACA_API_SECRET not set in .env or environment")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.market_data.data_base_url)
            .context("market_data.data_base_url is not a valid URL")?;
        if self.market_data.start_date >= self.market_data.end_date {
            bail!(
                "market_data.start_date ({}) must be before end_date ({})",
                self.market_data.start_date,
                self.market_data.end_date
            );
        }
        self.pipeline.settings()?;
        let w = self.ranking.price_weight;
        if !(0.0..=1.0).contains(&w) {
            bail!("ranking.price_weight must be in [0, 1], got {}", w);
        }
        if self.runtime.workers == 0 {
            bail!("runtime.workers must be > 0");
        }
        if self.runtime.predictor_timeout_ms == 0 {
            bail!("runtime.predictor_timeout_ms must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_horizon_valid() {
        assert_eq!(parse_horizon_days("3m").unwrap(), 90);
        assert_eq!(parse_horizon_days("6m").unwrap(), 180);
        assert_eq!(parse_horizon_days("1y").unwrap(), 365);
        assert_eq!(parse_horizon_days(" 45d ").unwrap(), 45);
        assert_eq!(parse_horizon_days("2w").unwrap(), 14);
    }

    #[test]
    fn parse_horizon_rejects_invalid_inputs() {
        assert!(parse_horizon_days("").is_err());
        assert!(parse_horizon_days("m").is_err());
        assert!(parse_horizon_days("0d").is_err());
        assert!(parse_horizon_days("3h").is_err());
        assert!(parse_horizon_days("-1d").is_err());
    }

    #[test]
    fn parse_horizon_rejects_multibyte_suffix() {
        assert!(parse_horizon_days("3月").is_err());
        assert!(parse_horizon_days("月").is_err());
        assert!(parse_horizon_days("3é").is_err());
    }

    #[test]
    fn tickers_dedup_and_normalize() {
        let raw = vec![
            "aapl".to_string(),
            " MSFT ".to_string(),
            "AAPL".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(
            normalize_tickers(&raw),
            vec!["AAPL".to_string(), "MSFT".to_string()]
        );
    }
}
