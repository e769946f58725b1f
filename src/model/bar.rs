use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::feature::FeatureVector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl DailyBar {
    pub fn features(&self) -> FeatureVector {
        [self.open, self.high, self.low, self.close, self.volume]
    }
}

/// Chronologically ordered daily bars for one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub ticker: String,
    pub bars: Vec<DailyBar>,
}

impl TimeSeries {
    pub fn new(ticker: &str, mut bars: Vec<DailyBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        Self {
            ticker: ticker.trim().to_ascii_uppercase(),
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn features(&self) -> Vec<FeatureVector> {
        self.bars.iter().map(DailyBar::features).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }
}
