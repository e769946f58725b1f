use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub ticker: String,
    pub score: f64,
    pub rank: usize,
}

/// Rank `entities` by `w * norm(predicted) + (1 - w) * norm(quality)`.
///
/// Both signals are min-max normalized across the entity set; a signal with
/// one entity or no spread normalizes to 0 everywhere. Missing values count
/// as 0. Ties keep input order. Duplicate ids keep their first position.
pub fn rank(
    entities: &[String],
    predicted_mean: &HashMap<String, f64>,
    quality_score: &HashMap<String, f64>,
    weight: f64,
) -> PipelineResult<Vec<RankedResult>> {
    if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
        return Err(PipelineError::InvalidWeight(weight));
    }
    let mut seen = HashSet::new();
    let ids: Vec<&String> = entities.iter().filter(|id| seen.insert(*id)).collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let predicted: Vec<f64> = ids
        .iter()
        .map(|id| predicted_mean.get(*id).copied().unwrap_or(0.0))
        .collect();
    let quality: Vec<f64> = ids
        .iter()
        .map(|id| quality_score.get(*id).copied().unwrap_or(0.0))
        .collect();
    let norm_predicted = min_max_normalize(&predicted);
    let norm_quality = min_max_normalize(&quality);

    let mut scored: Vec<(&String, f64)> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, norm_predicted[i] * weight + norm_quality[i] * (1.0 - weight)))
        .collect();
    // `sort_by` is stable, so equal scores stay in input order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    Ok(scored
        .into_iter()
        .enumerate()
        .map(|(i, (id, score))| RankedResult {
            ticker: id.clone(),
            score,
            rank: i + 1,
        })
        .collect())
}

/// Rescale to `[0, 1]`; degenerate inputs map to all zeros.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    if values.len() <= 1 {
        return vec![0.0; values.len()];
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if !span.is_finite() || span <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / span).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn map(v: &[(&str, f64)]) -> HashMap<String, f64> {
        v.iter().map(|(k, s)| (k.to_string(), *s)).collect()
    }

    #[test]
    fn normalize_degenerate_inputs() {
        assert_eq!(min_max_normalize(&[]), Vec::<f64>::new());
        assert_eq!(min_max_normalize(&[5.0]), vec![0.0]);
        assert_eq!(min_max_normalize(&[3.0, 3.0, 3.0]), vec![0.0; 3]);
        assert_eq!(min_max_normalize(&[1.0, 3.0, 2.0]), vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn combines_signals_with_weight() {
        let entities = ids(&["A", "B", "C"]);
        let pred = map(&[("A", 10.0), ("B", 20.0), ("C", 30.0)]);
        let quality = map(&[("A", 90.0), ("B", 70.0), ("C", 80.0)]);
        let out = rank(&entities, &pred, &quality, 0.5).unwrap();
        let order: Vec<&str> = out.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
        assert!((out[0].score - 0.75).abs() < 1e-12);
        assert!((out[1].score - 0.5).abs() < 1e-12);
        assert!((out[2].score - 0.25).abs() < 1e-12);
        assert_eq!(out.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn missing_quality_defaults_to_zero() {
        let entities = ids(&["A", "B"]);
        let pred = map(&[("A", 1.0), ("B", 1.0)]);
        let quality = map(&[("B", 50.0)]);
        let out = rank(&entities, &pred, &quality, 0.0).unwrap();
        assert_eq!(out[0].ticker, "B");
        assert!((out[0].score - 1.0).abs() < 1e-12);
        assert_eq!(out[1].score, 0.0);
    }

    #[test]
    fn ties_keep_input_order_and_duplicates_collapse() {
        let entities = ids(&["X", "Y", "X", "Z"]);
        let out = rank(&entities, &HashMap::new(), &HashMap::new(), 0.3).unwrap();
        let order: Vec<&str> = out.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn rejects_out_of_range_weight() {
        let entities = ids(&["A"]);
        assert_eq!(
            rank(&entities, &HashMap::new(), &HashMap::new(), 1.5),
            Err(PipelineError::InvalidWeight(1.5))
        );
        assert!(rank(&entities, &HashMap::new(), &HashMap::new(), f64::NAN).is_err());
    }

    #[test]
    fn empty_cohort_is_empty() {
        assert!(rank(&[], &HashMap::new(), &HashMap::new(), 0.5)
            .unwrap()
            .is_empty());
    }
}
