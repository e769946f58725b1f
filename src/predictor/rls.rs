use anyhow::{bail, Result};

use crate::model::feature::{FeatureVector, FEATURE_COUNT, TARGET_INDEX};
use crate::predictor::Predictor;
use crate::window::WindowSample;

#[derive(Debug, Clone, Copy)]
pub struct RlsWindowPredictorConfig {
    pub lags: usize,
    pub epochs: usize,
    pub patience: usize,
    pub forgetting: f64,
    pub ridge: f64,
}

impl Default for RlsWindowPredictorConfig {
    fn default() -> Self {
        Self {
            lags: 10,
            epochs: 50,
            patience: 10,
            forgetting: 0.999,
            ridge: 1e-2,
        }
    }
}

/// Linear one-step model over window features, fit by recursive least squares.
///
/// Features are an intercept, the last `lags` target values of the window
/// (most recent first) and the non-target columns of the last row. Training
/// makes repeated passes over the train windows and keeps the coefficients
/// with the lowest validation error, stopping after `patience` passes
/// without improvement.
#[derive(Debug, Default)]
pub struct RlsWindowPredictor {
    cfg: RlsWindowPredictorConfig,
    beta: Option<Vec<f64>>,
    best_monitor_mse: Option<f64>,
    epochs_run: usize,
}

impl RlsWindowPredictor {
    pub fn new(cfg: RlsWindowPredictorConfig) -> Self {
        Self {
            cfg,
            beta: None,
            best_monitor_mse: None,
            epochs_run: 0,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.beta.is_some()
    }

    /// Lowest validation MSE seen during training (train MSE when no
    /// validation windows were supplied).
    pub fn best_monitor_mse(&self) -> Option<f64> {
        self.best_monitor_mse
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs_run
    }

    fn lags(&self) -> usize {
        self.cfg.lags.max(1)
    }
}

impl Predictor for RlsWindowPredictor {
    fn train(&mut self, train: &[WindowSample], validation: &[WindowSample]) -> Result<()> {
        if train.is_empty() {
            bail!("no training windows");
        }
        let lags = self.lags();
        let dim = feature_dim(lags);
        let train_xy = design_rows(train, lags)?;
        let val_xy = design_rows(validation, lags)?;

        let mut beta = vec![0.0; dim];
        let mut p = init_covariance(dim, self.cfg.ridge);
        let mut best_mse = f64::INFINITY;
        let mut best_beta = beta.clone();
        let mut stale = 0usize;
        let mut epochs_run = 0usize;

        for epoch in 0..self.cfg.epochs.max(1) {
            for (x, y) in &train_xy {
                rls_update(&mut beta, &mut p, x, *y, self.cfg.forgetting, self.cfg.ridge);
            }
            epochs_run = epoch + 1;
            let train_mse = mse(&beta, &train_xy);
            let monitor = if val_xy.is_empty() {
                train_mse
            } else {
                mse(&beta, &val_xy)
            };
            if !monitor.is_finite() {
                bail!("training diverged at epoch {}", epoch + 1);
            }
            tracing::debug!(epoch = epoch + 1, train_mse, monitor_mse = monitor, "rls epoch");
            if monitor < best_mse - 1e-12 {
                best_mse = monitor;
                best_beta.clone_from(&beta);
                stale = 0;
            } else {
                stale += 1;
                if stale >= self.cfg.patience.max(1) {
                    break;
                }
            }
        }

        self.beta = Some(best_beta);
        self.best_monitor_mse = Some(best_mse);
        self.epochs_run = epochs_run;
        Ok(())
    }

    fn predict(&self, window: &[FeatureVector]) -> Result<f64> {
        let Some(beta) = self.beta.as_ref() else {
            bail!("rls predictor used before training");
        };
        if window.is_empty() {
            bail!("cannot predict from an empty window");
        }
        let x = window_features(window, self.lags());
        let y = dot(beta, &x);
        if !y.is_finite() {
            bail!("rls predictor produced a non-finite value");
        }
        Ok(y)
    }
}

fn feature_dim(lags: usize) -> usize {
    1 + lags + (FEATURE_COUNT - 1)
}

fn window_features(window: &[FeatureVector], lags: usize) -> Vec<f64> {
    let mut x = Vec::with_capacity(feature_dim(lags));
    x.push(1.0);
    let n = window.len();
    for k in 0..lags {
        // Windows shorter than `lags` repeat their oldest target.
        let idx = n.saturating_sub(1 + k);
        x.push(window[idx][TARGET_INDEX]);
    }
    let last = &window[n - 1];
    for (f, v) in last.iter().enumerate() {
        if f != TARGET_INDEX {
            x.push(*v);
        }
    }
    x
}

fn design_rows(samples: &[WindowSample], lags: usize) -> Result<Vec<(Vec<f64>, f64)>> {
    let mut out = Vec::with_capacity(samples.len());
    for s in samples {
        if s.window.is_empty() {
            bail!("training window is empty");
        }
        out.push((window_features(&s.window, lags), s.target));
    }
    Ok(out)
}

fn mse(beta: &[f64], rows: &[(Vec<f64>, f64)]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let sum = rows
        .iter()
        .map(|(x, y)| {
            let err = y - dot(beta, x);
            err * err
        })
        .sum::<f64>();
    sum / rows.len() as f64
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn init_covariance(dim: usize, ridge: f64) -> Vec<Vec<f64>> {
    let v = 1.0 / ridge.max(1e-9);
    (0..dim)
        .map(|i| (0..dim).map(|j| if i == j { v } else { 0.0 }).collect())
        .collect()
}

fn rls_update(
    beta: &mut [f64],
    p: &mut Vec<Vec<f64>>,
    x: &[f64],
    y: f64,
    forgetting: f64,
    ridge: f64,
) {
    let dim = beta.len();
    let lambda = forgetting.clamp(0.90, 1.0);
    if p[0][0].abs() <= f64::EPSILON {
        *p = init_covariance(dim, ridge);
    }
    let px: Vec<f64> = p.iter().map(|row| dot(row, x)).collect();
    let denom = lambda + dot(x, &px);
    if !denom.is_finite() || denom.abs() <= 1e-12 {
        return;
    }
    let k: Vec<f64> = px.iter().map(|v| v / denom).collect();
    let err = y - dot(beta, x);
    for (b, k_i) in beta.iter_mut().zip(&k) {
        *b += k_i * err;
    }

    let mut x_t_p = vec![0.0; dim];
    for (j, xtpj) in x_t_p.iter_mut().enumerate() {
        *xtpj = x.iter().zip(p.iter()).map(|(x_i, row)| x_i * row[j]).sum();
    }
    for (i, row) in p.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (*cell - k[i] * x_t_p[j]) / lambda;
        }
    }
}
