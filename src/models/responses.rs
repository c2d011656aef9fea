use serde::{Deserialize, Serialize};

use crate::models::domain::ScoredMatch;

/// Matches grouped by classification. `all` is the full set; `mutual` may
/// overlap with `hot` and `good`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupedMatches {
    pub hot: Vec<ScoredMatch>,
    pub good: Vec<ScoredMatch>,
    pub mutual: Vec<ScoredMatch>,
    pub all: Vec<ScoredMatch>,
    /// Set when a compute deadline expired and only a subset was scored.
    #[serde(default)]
    pub partial: bool,
}

/// Aggregate counters over the current (refreshed) match set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchStats {
    pub total_matches: u64,
    pub hot_matches: u64,
    pub mutual_matches: u64,
    pub avg_score: f64,
}

/// Per-action interaction counters for a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionStats {
    pub total: i64,
    pub viewed: i64,
    pub saved: i64,
    pub contacted: i64,
    pub dismissed: i64,
    pub last_interaction_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Outcome of a cache warm-up sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarmupReport {
    pub processed: u64,
    pub cached: u64,
}
