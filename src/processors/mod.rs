//! Pipeline stages, in execution order.

pub mod ambiguity;
pub mod grouping;
pub mod race_labels;
pub mod repeat_stops;
pub mod standardize;

// Re-export key types for convenience
pub use ambiguity::{AmbiguityExtractor, ExtractError, ExtractOutcome};
pub use grouping::{group_by_key, DriverGroup, GroupedStops, GroupingError, IdentityGrouper};
pub use race_labels::{aggregate_race, LabelError, RaceLabelMap, RaceLabeler};
pub use repeat_stops::{FilterError, FilterOutcome, GroupPredicate, RepeatStopFilter, StopPredicate};
pub use standardize::{standardizer_for, StandardizeError, Standardizer};
