use std::collections::HashMap;
use std::future::Future;

use anyhow::Result;
use chrono::NaiveDate;

use crate::model::bar::TimeSeries;

pub mod alpaca;

pub use alpaca::AlpacaDailyBars;

/// Historical daily bars provider. An empty series means "nothing to forecast",
/// not an error.
pub trait MarketDataSource: Send + Sync {
    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<TimeSeries>> + Send;
}

/// Preloaded series keyed by upper-case ticker, filtered by date on fetch.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    series: HashMap<String, TimeSeries>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: TimeSeries) {
        self.series.insert(series.ticker.clone(), series);
    }

    pub fn with_series(mut self, series: TimeSeries) -> Self {
        self.insert(series);
        self
    }
}

impl MarketDataSource for InMemoryMarketData {
    async fn fetch(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<TimeSeries> {
        let key = ticker.trim().to_ascii_uppercase();
        let bars = self
            .series
            .get(&key)
            .map(|s| {
                s.bars
                    .iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(TimeSeries::new(&key, bars))
    }
}
