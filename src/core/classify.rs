use crate::models::{Tier, TierThresholds};

/// Map a score onto a tier. The bands are contiguous and total: every score
/// lands in exactly one of hot/good/low.
#[inline]
pub fn classify(score: f64, thresholds: &TierThresholds) -> Tier {
    if score >= thresholds.hot {
        Tier::Hot
    } else if score >= thresholds.good {
        Tier::Good
    } else {
        Tier::Low
    }
}

/// Mutual-exchange test: both directions must independently clear the floor.
///
/// `forward` is the querying user's score toward the candidate listing;
/// `reverse` is the candidate owner's best score toward one of the user's
/// own listings on the other side of the exchange. No reverse listing means
/// no mutual match.
#[inline]
pub fn qualifies_mutual(forward: f64, reverse: Option<f64>, thresholds: &TierThresholds) -> bool {
    match reverse {
        Some(r) => forward >= thresholds.mutual_floor && r >= thresholds.mutual_floor,
        None => false,
    }
}
