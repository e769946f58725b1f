pub mod bar;
pub mod feature;

pub use bar::{DailyBar, TimeSeries};
pub use feature::{with_target, Feature, FeatureVector, FEATURE_COUNT, TARGET_INDEX};
