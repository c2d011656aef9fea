// Core algorithm exports
pub mod classify;
pub mod distance;
pub mod filters;
pub mod matcher;
pub mod scoring;

pub use classify::{classify, qualifies_mutual};
pub use distance::{calculate_bounding_box, distance_between, haversine_distance, is_within_bounding_box};
pub use filters::{is_eligible_candidate, passes_category_filter, recently_dismissed, within_max_distance};
pub use matcher::{
    filter_suggestions, group_matches, sort_matches, stats_for, EligibleSet, MatchContext, Matcher,
};
pub use scoring::{compute_score, ScoreBreakdown};
