use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("empty input: no rows to scale or window")]
    EmptyInput,

    #[error("insufficient data: need at least {needed} rows, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("non-finite value in feature {feature} at row {row}")]
    NonFiniteInput { row: usize, feature: usize },

    #[error("predictor failure: {0}")]
    PredictorFailure(String),

    #[error("predictor timed out after {timeout_ms} ms")]
    PredictorTimeout { timeout_ms: u64 },

    #[error("invalid ranking weight {0}: expected a value in [0, 1]")]
    InvalidWeight(f64),

    #[error("market data error: {0}")]
    MarketData(String),
}

impl PipelineError {
    /// Short stable label used in skip records and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::NonFiniteInput { .. } => "non_finite_input",
            Self::PredictorFailure(_) => "predictor_failure",
            Self::PredictorTimeout { .. } => "predictor_timeout",
            Self::InvalidWeight(_) => "invalid_weight",
            Self::MarketData(_) => "market_data",
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
