/// Number of per-row features in the pipeline schema.
pub const FEATURE_COUNT: usize = 5;

/// Column forecast by the model. Every other column is carried forward.
pub const TARGET_INDEX: usize = Feature::Close as usize;

/// One scaled or unscaled OHLCV row, ordered as [`Feature::ALL`].
pub type FeatureVector = [f64; FEATURE_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Open = 0,
    High = 1,
    Low = 2,
    Close = 3,
    Volume = 4,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Open,
        Feature::High,
        Feature::Low,
        Feature::Close,
        Feature::Volume,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::Volume => "volume",
        }
    }
}

/// Copy `row` with only the target column replaced.
pub fn with_target(row: &FeatureVector, target: f64) -> FeatureVector {
    let mut out = *row;
    out[TARGET_INDEX] = target;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_close_column() {
        assert_eq!(TARGET_INDEX, 3);
        assert_eq!(Feature::ALL[TARGET_INDEX], Feature::Close);
        for (i, f) in Feature::ALL.iter().enumerate() {
            assert_eq!(f.index(), i);
        }
    }

    #[test]
    fn with_target_touches_only_close() {
        let row = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = with_target(&row, 9.5);
        assert_eq!(out, [1.0, 2.0, 3.0, 9.5, 5.0]);
    }
}
