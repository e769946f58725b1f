use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::collections::HashMap;

use crate::market_data::MarketDataSource;
use crate::model::bar::{DailyBar, TimeSeries};

const BARS_PAGE_LIMIT: usize = 10_000;
const MAX_PAGES: usize = 64;

/// Daily stock bars from the Alpaca v2 market data REST API.
pub struct AlpacaDailyBars {
    http: reqwest::Client,
    data_base_url: String,
    feed: String,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Option<HashMap<String, Vec<AlpacaBar>>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    t: String,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

impl AlpacaDailyBars {
    pub fn new(data_base_url: &str, api_key: &str, api_secret: &str, feed: &str) -> Result<Self> {
        if api_key.trim().is_empty() || api_secret.trim().is_empty() {
            bail!("alpaca credentials are empty");
        }
        let mut headers = HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", HeaderValue::from_str(api_key)?);
        headers.insert("APCA-API-SECRET-KEY", HeaderValue::from_str(api_secret)?);
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build Alpaca HTTP client")?;
        Ok(Self {
            http,
            data_base_url: data_base_url.trim_end_matches('/').to_string(),
            feed: feed.to_string(),
        })
    }

    fn compact_error_body(body: &str) -> String {
        let normalized = body.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.chars().count() > 180 {
            let head: String = normalized.chars().take(180).collect();
            format!("{}...", head)
        } else {
            normalized
        }
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        page_token: Option<&str>,
    ) -> Result<BarsResponse> {
        let endpoint = format!("{}/v2/stocks/bars", self.data_base_url);
        let start_s = start.format("%Y-%m-%d").to_string();
        let end_s = end.format("%Y-%m-%d").to_string();
        let limit_s = BARS_PAGE_LIMIT.to_string();
        let mut request = self.http.get(&endpoint).query(&[
            ("symbols", symbol),
            ("timeframe", "1Day"),
            ("start", start_s.as_str()),
            ("end", end_s.as_str()),
            ("limit", limit_s.as_str()),
            ("adjustment", "all"),
            ("sort", "asc"),
            ("feed", self.feed.as_str()),
        ]);
        if let Some(token) = page_token {
            request = request.query(&[("page_token", token)]);
        }

        let response = request
            .send()
            .await
            .context("alpaca get bars HTTP failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "alpaca get bars returned {}: {}",
                status,
                Self::compact_error_body(&body)
            );
        }
        response
            .json::<BarsResponse>()
            .await
            .context("alpaca get bars JSON parse failed")
    }
}

impl MarketDataSource for AlpacaDailyBars {
    async fn fetch(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<TimeSeries> {
        let symbol = ticker.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            bail!("ticker is empty");
        }

        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;
        for page in 0..MAX_PAGES {
            let resp = self
                .fetch_page(&symbol, start, end, page_token.as_deref())
                .await?;
            let page_bars = resp
                .bars
                .and_then(|mut by_symbol| by_symbol.remove(&symbol))
                .unwrap_or_default();
            tracing::debug!(ticker = %symbol, page, count = page_bars.len(), "fetched bars page");
            for bar in page_bars {
                bars.push(to_daily_bar(&bar)?);
            }
            match resp.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::info!(ticker = %symbol, count = bars.len(), %start, %end, "fetched daily bars");
        Ok(TimeSeries::new(&symbol, bars))
    }
}

fn to_daily_bar(bar: &AlpacaBar) -> Result<DailyBar> {
    let date = DateTime::parse_from_rfc3339(&bar.t)
        .with_context(|| format!("invalid bar timestamp '{}'", bar.t))?
        .date_naive();
    Ok(DailyBar {
        date,
        open: bar.o,
        high: bar.h,
        low: bar.l,
        close: bar.c,
        volume: bar.v,
    })
}
