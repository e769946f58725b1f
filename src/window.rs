use crate::model::feature::{FeatureVector, TARGET_INDEX};

/// `L` consecutive rows fed to the predictor as one input.
pub type Window = Vec<FeatureVector>;

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSample {
    pub window: Window,
    pub target: f64,
}

/// Smallest dataset that yields at least one window/target pair.
pub fn min_rows_for_windows(window_len: usize) -> usize {
    window_len + 2
}

/// Slice `scaled` into `(window, next target)` pairs.
///
/// Windows start at `0..=len - L - 2`, so the last row is never used as the
/// end of a window. A dataset of `n >= L + 2` rows yields `n - L - 1` pairs.
pub fn build_windows(scaled: &[FeatureVector], window_len: usize) -> Vec<WindowSample> {
    if window_len == 0 || scaled.len() < min_rows_for_windows(window_len) {
        return Vec::new();
    }
    let count = scaled.len() - window_len - 1;
    (0..count)
        .map(|i| WindowSample {
            window: scaled[i..i + window_len].to_vec(),
            target: scaled[i + window_len][TARGET_INDEX],
        })
        .collect()
}

/// The trailing `window_len` rows, or `None` if the dataset is shorter.
pub fn last_window(scaled: &[FeatureVector], window_len: usize) -> Option<Window> {
    if window_len == 0 || scaled.len() < window_len {
        return None;
    }
    Some(scaled[scaled.len() - window_len..].to_vec())
}
