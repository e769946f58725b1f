use anyhow::{bail, Result};

use crate::model::feature::{FeatureVector, TARGET_INDEX};
use crate::predictor::Predictor;
use crate::window::WindowSample;

/// Predicts that the next target equals the last observed one.
#[derive(Debug, Default, Clone)]
pub struct PersistencePredictor {
    trained: bool,
}

impl Predictor for PersistencePredictor {
    fn train(&mut self, _train: &[WindowSample], _validation: &[WindowSample]) -> Result<()> {
        self.trained = true;
        Ok(())
    }

    fn predict(&self, window: &[FeatureVector]) -> Result<f64> {
        if !self.trained {
            bail!("persistence predictor used before training");
        }
        match window.last() {
            Some(row) => Ok(row[TARGET_INDEX]),
            None => bail!("cannot predict from an empty window"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_last_target() {
        let mut p = PersistencePredictor::default();
        assert!(p.predict(&[[0.0; 5]]).is_err());
        p.train(&[], &[]).unwrap();
        let window = [[0.1, 0.2, 0.3, 0.4, 0.5], [0.5, 0.6, 0.7, 0.8, 0.9]];
        assert!((p.predict(&window).unwrap() - 0.8).abs() < f64::EPSILON);
        assert!(p.predict(&[]).is_err());
    }
}
