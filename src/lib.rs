pub mod cohort;
pub mod config;
pub mod error;
pub mod forecast;
pub mod logging;
pub mod market_data;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod predictor;
pub mod quality;
pub mod ranking;
pub mod reconstruct;
pub mod scaler;
pub mod window;
