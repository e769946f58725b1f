use anyhow::Result;
use serde::Deserialize;

use crate::model::feature::FeatureVector;
use crate::window::WindowSample;

pub mod persistence;
pub mod rls;

pub use persistence::PersistencePredictor;
pub use rls::{RlsWindowPredictor, RlsWindowPredictorConfig};

/// A trainable one-step regressor over scaled windows.
///
/// The pipeline only ever calls `train` once and then `predict` repeatedly;
/// implementations own whatever state they need in between.
pub trait Predictor: Send {
    fn train(&mut self, train: &[WindowSample], validation: &[WindowSample]) -> Result<()>;
    fn predict(&self, window: &[FeatureVector]) -> Result<f64>;
}

impl<P: Predictor + ?Sized> Predictor for Box<P> {
    fn train(&mut self, train: &[WindowSample], validation: &[WindowSample]) -> Result<()> {
        (**self).train(train, validation)
    }

    fn predict(&self, window: &[FeatureVector]) -> Result<f64> {
        (**self).predict(window)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorKind {
    Rls,
    Persistence,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PredictorConfig {
    pub kind: PredictorKind,
    #[serde(default = "default_lags")]
    pub lags: usize,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_patience")]
    pub patience: usize,
    #[serde(default = "default_forgetting")]
    pub forgetting: f64,
    #[serde(default = "default_ridge")]
    pub ridge: f64,
}

fn default_lags() -> usize {
    10
}

fn default_epochs() -> usize {
    50
}

fn default_patience() -> usize {
    10
}

fn default_forgetting() -> f64 {
    0.999
}

fn default_ridge() -> f64 {
    1e-2
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            kind: PredictorKind::Rls,
            lags: default_lags(),
            epochs: default_epochs(),
            patience: default_patience(),
            forgetting: default_forgetting(),
            ridge: default_ridge(),
        }
    }
}

#[derive(Debug)]
pub enum PredictorModel {
    Rls(RlsWindowPredictor),
    Persistence(PersistencePredictor),
}

impl Predictor for PredictorModel {
    fn train(&mut self, train: &[WindowSample], validation: &[WindowSample]) -> Result<()> {
        match self {
            Self::Rls(m) => m.train(train, validation),
            Self::Persistence(m) => m.train(train, validation),
        }
    }

    fn predict(&self, window: &[FeatureVector]) -> Result<f64> {
        match self {
            Self::Rls(m) => m.predict(window),
            Self::Persistence(m) => m.predict(window),
        }
    }
}

/// Fresh, untrained model for one entity.
pub fn build_predictor(cfg: &PredictorConfig) -> PredictorModel {
    match cfg.kind {
        PredictorKind::Rls => PredictorModel::Rls(RlsWindowPredictor::new(RlsWindowPredictorConfig {
            lags: cfg.lags,
            epochs: cfg.epochs,
            patience: cfg.patience,
            forgetting: cfg.forgetting,
            ridge: cfg.ridge,
        })),
        PredictorKind::Persistence => PredictorModel::Persistence(PersistencePredictor::default()),
    }
}
