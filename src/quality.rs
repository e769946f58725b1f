use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Supplier of per-entity quality scores (e.g. ESG totals).
pub trait QualityScoreSource {
    fn load(&self) -> Result<HashMap<String, f64>>;
}

/// Table used when no score file is available.
pub fn default_quality_table() -> HashMap<String, f64> {
    [
        ("AAPL", 80.0),
        ("MSFT", 85.0),
        ("AMZN", 75.0),
        ("GOOGL", 90.0),
        ("META", 70.0),
    ]
    .into_iter()
    .map(|(t, s)| (t.to_string(), s))
    .collect()
}

#[derive(Debug, Clone, Default)]
pub struct StaticQualityScores {
    scores: HashMap<String, f64>,
}

impl StaticQualityScores {
    pub fn new(scores: HashMap<String, f64>) -> Self {
        Self { scores }
    }
}

impl QualityScoreSource for StaticQualityScores {
    fn load(&self) -> Result<HashMap<String, f64>> {
        Ok(self.scores.clone())
    }
}

#[derive(Debug, Deserialize)]
struct QualityRow {
    ticker: String,
    total_score: String,
}

/// `ticker,total_score` CSV file; falls back to [`default_quality_table`]
/// when the file is missing or unreadable.
#[derive(Debug, Clone)]
pub struct CsvQualityScores {
    path: PathBuf,
}

impl CsvQualityScores {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file without any fallback.
    pub fn read(&self) -> Result<HashMap<String, f64>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let mut out = HashMap::new();
        for (line, record) in reader.deserialize::<QualityRow>().enumerate() {
            let row =
                record.with_context(|| format!("malformed row {} in {}", line + 2, self.path.display()))?;
            let ticker = row.ticker.trim().to_ascii_uppercase();
            match row.total_score.trim().parse::<f64>() {
                Ok(score) if score.is_finite() && !ticker.is_empty() => {
                    out.insert(ticker, score);
                }
                _ => {
                    tracing::warn!(
                        path = %self.path.display(),
                        row = line + 2,
                        ticker = %ticker,
                        value = %row.total_score,
                        "skipping unparsable quality score"
                    );
                }
            }
        }
        Ok(out)
    }
}

impl QualityScoreSource for CsvQualityScores {
    fn load(&self) -> Result<HashMap<String, f64>> {
        if !self.path.exists() {
            tracing::warn!(
                path = %self.path.display(),
                "quality score file not found, using default table"
            );
            return Ok(default_quality_table());
        }
        match self.read() {
            Ok(scores) => {
                tracing::info!(
                    path = %self.path.display(),
                    count = scores.len(),
                    "loaded quality scores"
                );
                Ok(scores)
            }
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %format!("{:#}", e),
                    "failed to read quality scores, using default table"
                );
                Ok(default_quality_table())
            }
        }
    }
}
