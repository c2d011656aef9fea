use chrono::{DateTime, Duration, Utc};

use crate::core::distance::distance_between;
use crate::models::{InteractionKind, InteractionSignal, Listing, ScoreParams, ScoringWeights, User};

/// Full result of one score computation, including the per-factor values
/// that feed the serialized match breakdown.
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub score: f64,
    pub distance_km: Option<f64>,
    pub distance_factor: Option<f64>,
    pub category_factor: Option<f64>,
    pub behavior_factor: Option<f64>,
    /// The user dismissed this exact listing within the history window.
    pub dismissed: bool,
    pub reasons: Vec<String>,
}

/// Compute a 0-100 compatibility score for a (user, listing) pair.
///
/// Weighted sum of three factors, each normalized to 0-100 before weighting:
/// distance (linear decay to zero at the horizon), category/interest overlap,
/// and behavioral feedback from the user's recent interaction history. A
/// factor that cannot be computed is omitted and its weight redistributed
/// proportionally across the remaining factors; with no usable factor at all
/// the score falls back to a low-but-nonzero baseline.
///
/// Deterministic: `now` is an explicit input and nothing here does I/O.
pub fn compute_score(
    user: &User,
    listing: &Listing,
    owner: &User,
    history: &[InteractionSignal],
    weights: &ScoringWeights,
    params: &ScoreParams,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let mut reasons = Vec::new();

    let distance_km = distance_between(
        (user.latitude, user.longitude),
        listing.coords_or_owner(owner),
    );
    let distance_factor = distance_km.map(|d| distance_score(d, params.horizon_km));

    if let Some(d) = distance_km {
        if d <= 5.0 {
            reasons.push(format!("Very close: {:.1} km away", d));
        } else if d <= 15.0 {
            reasons.push(format!("Nearby: {:.1} km away", d));
        }
    }

    let category_factor = category_score(user, listing);
    if matches!(category_factor, Some(f) if f >= 80.0) {
        reasons.push("Matches a top interest".to_string());
    }

    let (behavior_factor, dismissed) = behavior_score(listing, history, params, now);
    if matches!(behavior_factor, Some(f) if f >= 65.0) {
        reasons.push("You often engage with listings like this".to_string());
    }

    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for (factor, weight) in [
        (distance_factor, weights.distance),
        (category_factor, weights.category),
        (behavior_factor, weights.behavior),
    ] {
        if let Some(value) = factor {
            weighted += value * weight;
            weight_sum += weight;
        }
    }

    let mut score = if weight_sum > 0.0 {
        weighted / weight_sum
    } else {
        params.baseline_score
    };

    if dismissed {
        score = score.min(params.dismissed_cap);
        reasons.clear();
    }

    ScoreBreakdown {
        score: score.clamp(0.0, 100.0),
        distance_km,
        distance_factor,
        category_factor,
        behavior_factor,
        dismissed,
        reasons,
    }
}

/// Distance factor: 100 at zero distance, linear decay to 0 at the horizon.
#[inline]
fn distance_score(distance_km: f64, horizon_km: f64) -> f64 {
    if horizon_km <= 0.0 || distance_km >= horizon_km {
        return 0.0;
    }
    (1.0 - distance_km / horizon_km) * 100.0
}

/// Category factor: 100 when the listing's category is the user's top
/// interest, scaled down by interest rank, 0 when the user has declared
/// interests but none match. Users with no declared interests get no
/// category factor at all (missing, not zero).
#[inline]
fn category_score(user: &User, listing: &Listing) -> Option<f64> {
    if user.interests.is_empty() {
        return None;
    }
    let n = user.interests.len() as f64;
    match user.interests.iter().position(|&c| c == listing.category_id) {
        Some(rank) => Some(((n - rank as f64) / n) * 100.0),
        None => Some(0.0),
    }
}

/// Behavioral factor from the user's recent interactions.
///
/// Signals count when they touch the same category or the same owner as the
/// candidate listing. A dismissal of this exact listing wins over everything
/// else: the factor drops to zero and the caller caps the final score.
fn behavior_score(
    listing: &Listing,
    history: &[InteractionSignal],
    params: &ScoreParams,
    now: DateTime<Utc>,
) -> (Option<f64>, bool) {
    let cutoff = now - Duration::days(params.history_window_days);

    let dismissed_exact = history.iter().any(|s| {
        s.listing_id == listing.id
            && s.action == InteractionKind::Dismissed
            && s.created_at >= cutoff
    });
    if dismissed_exact {
        return (Some(0.0), true);
    }

    let mut value: f64 = 50.0;
    let mut relevant = false;

    for signal in history {
        if signal.created_at < cutoff {
            continue;
        }
        let same_category = signal.category_id == Some(listing.category_id);
        let same_owner = signal.owner_id == Some(listing.owner_id);
        if !same_category && !same_owner {
            continue;
        }
        relevant = true;
        value += match signal.action {
            InteractionKind::Contacted => 15.0,
            InteractionKind::Saved => 10.0,
            InteractionKind::Viewed => 2.0,
            InteractionKind::Dismissed => -10.0,
        };
    }

    if relevant {
        (Some(value.clamp(0.0, 100.0)), false)
    } else {
        (None, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingKind, ListingStatus};
    use chrono::TimeZone;

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn make_user(id: i64, lat: Option<f64>, lon: Option<f64>, interests: Vec<i64>) -> User {
        User {
            id,
            tenant_id: 1,
            latitude: lat,
            longitude: lon,
            interests,
        }
    }

    fn make_listing(id: i64, owner_id: i64, category_id: i64, lat: f64, lon: f64) -> Listing {
        Listing {
            id,
            tenant_id: 1,
            owner_id,
            category_id,
            kind: ListingKind::Offer,
            status: ListingStatus::Active,
            latitude: Some(lat),
            longitude: Some(lon),
            created_at: test_now(),
        }
    }

    fn signal(listing_id: i64, category_id: i64, owner_id: i64, action: InteractionKind) -> InteractionSignal {
        InteractionSignal {
            listing_id,
            category_id: Some(category_id),
            owner_id: Some(owner_id),
            action,
            created_at: test_now() - Duration::days(1),
        }
    }

    #[test]
    fn test_same_place_top_interest_is_hot() {
        let user = make_user(1, Some(51.50), Some(-0.12), vec![7]);
        let owner = make_user(2, Some(51.50), Some(-0.12), vec![]);
        let listing = make_listing(10, 2, 7, 51.50, -0.12);

        let result = compute_score(
            &user,
            &listing,
            &owner,
            &[],
            &ScoringWeights::default(),
            &ScoreParams::default(),
            test_now(),
        );

        assert!(result.score >= 80.0, "expected hot, got {}", result.score);
    }

    #[test]
    fn test_determinism() {
        let user = make_user(1, Some(51.50), Some(-0.12), vec![7, 8]);
        let owner = make_user(2, Some(51.52), Some(-0.10), vec![]);
        let listing = make_listing(10, 2, 8, 51.52, -0.10);
        let history = vec![signal(99, 8, 3, InteractionKind::Saved)];

        let a = compute_score(
            &user,
            &listing,
            &owner,
            &history,
            &ScoringWeights::default(),
            &ScoreParams::default(),
            test_now(),
        );
        let b = compute_score(
            &user,
            &listing,
            &owner,
            &history,
            &ScoringWeights::default(),
            &ScoreParams::default(),
            test_now(),
        );

        assert_eq!(a.score, b.score);
    }

    #[test]
    fn test_score_range_extremes() {
        let params = ScoreParams::default();
        let weights = ScoringWeights::default();

        // Best case: zero distance, top interest, strong positive history.
        let user = make_user(1, Some(51.50), Some(-0.12), vec![7]);
        let owner = make_user(2, Some(51.50), Some(-0.12), vec![]);
        let listing = make_listing(10, 2, 7, 51.50, -0.12);
        let history: Vec<_> = (0..10)
            .map(|_| signal(99, 7, 3, InteractionKind::Contacted))
            .collect();
        let best = compute_score(&user, &listing, &owner, &history, &weights, &params, test_now());
        assert!(best.score <= 100.0);

        // Worst case: far away, declared interests with no overlap, dismissals.
        let user = make_user(1, Some(51.50), Some(-0.12), vec![3]);
        let listing = make_listing(11, 2, 7, 40.0, 20.0);
        let history: Vec<_> = (0..20)
            .map(|_| signal(99, 7, 2, InteractionKind::Dismissed))
            .collect();
        let worst = compute_score(&user, &listing, &owner, &history, &weights, &params, test_now());
        assert!(worst.score >= 0.0);
    }

    #[test]
    fn test_closer_listing_scores_higher() {
        let user = make_user(1, Some(51.50), Some(-0.12), vec![7]);
        let owner = make_user(2, Some(0.0), Some(0.0), vec![]);
        let near = make_listing(10, 2, 7, 51.52, -0.10);
        let far = make_listing(11, 2, 7, 52.00, 0.50);

        let weights = ScoringWeights::default();
        let params = ScoreParams::default();
        let near_score = compute_score(&user, &near, &owner, &[], &weights, &params, test_now());
        let far_score = compute_score(&user, &far, &owner, &[], &weights, &params, test_now());

        assert!(near_score.score >= far_score.score);
    }

    #[test]
    fn test_beyond_horizon_still_below_same_coords() {
        // Same category, 500 km away: overlap carries it but it must score
        // strictly below the same-coordinates listing.
        let user = make_user(1, Some(51.50), Some(-0.12), vec![7]);
        let owner = make_user(2, Some(0.0), Some(0.0), vec![]);
        let here = make_listing(10, 2, 7, 51.50, -0.12);
        let remote = make_listing(11, 2, 7, 47.0, 2.0);

        let weights = ScoringWeights::default();
        let params = ScoreParams::default();
        let here_score = compute_score(&user, &here, &owner, &[], &weights, &params, test_now());
        let remote_score = compute_score(&user, &remote, &owner, &[], &weights, &params, test_now());

        assert!(remote_score.score < here_score.score);
        assert_eq!(remote_score.distance_factor, Some(0.0));
    }

    #[test]
    fn test_unknown_distance_redistributes_weight() {
        // Top interest and no coordinates anywhere: the category factor alone
        // should carry the full weight, not be dragged down by a phantom
        // zero-distance term.
        let user = make_user(1, None, None, vec![7]);
        let owner = make_user(2, None, None, vec![]);
        let mut listing = make_listing(10, 2, 7, 0.0, 0.0);
        listing.latitude = None;
        listing.longitude = None;

        let result = compute_score(
            &user,
            &listing,
            &owner,
            &[],
            &ScoringWeights::default(),
            &ScoreParams::default(),
            test_now(),
        );

        assert_eq!(result.distance_km, None);
        assert_eq!(result.distance_factor, None);
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn test_no_factors_scores_baseline() {
        let user = make_user(1, None, None, vec![]);
        let owner = make_user(2, None, None, vec![]);
        let mut listing = make_listing(10, 2, 7, 0.0, 0.0);
        listing.latitude = None;
        listing.longitude = None;

        let params = ScoreParams::default();
        let result = compute_score(
            &user,
            &listing,
            &owner,
            &[],
            &ScoringWeights::default(),
            &params,
            test_now(),
        );

        assert_eq!(result.score, params.baseline_score);
        assert!(result.score > 0.0);
    }

    #[test]
    fn test_interest_rank_scales_category_factor() {
        let owner = make_user(2, Some(51.50), Some(-0.12), vec![]);
        let listing = make_listing(10, 2, 7, 51.50, -0.12);

        let top = make_user(1, Some(51.50), Some(-0.12), vec![7, 8]);
        let second = make_user(1, Some(51.50), Some(-0.12), vec![8, 7]);
        let none = make_user(1, Some(51.50), Some(-0.12), vec![8, 9]);

        let weights = ScoringWeights::default();
        let params = ScoreParams::default();

        let top_score = compute_score(&top, &listing, &owner, &[], &weights, &params, test_now());
        let second_score =
            compute_score(&second, &listing, &owner, &[], &weights, &params, test_now());
        let none_score = compute_score(&none, &listing, &owner, &[], &weights, &params, test_now());

        assert_eq!(top_score.category_factor, Some(100.0));
        assert_eq!(second_score.category_factor, Some(50.0));
        assert_eq!(none_score.category_factor, Some(0.0));
        assert!(top_score.score > second_score.score);
        assert!(second_score.score > none_score.score);
    }

    #[test]
    fn test_dismissed_listing_is_capped() {
        let user = make_user(1, Some(51.50), Some(-0.12), vec![7]);
        let owner = make_user(2, Some(51.50), Some(-0.12), vec![]);
        let listing = make_listing(10, 2, 7, 51.50, -0.12);
        let history = vec![signal(10, 7, 2, InteractionKind::Dismissed)];

        let params = ScoreParams::default();
        let result = compute_score(
            &user,
            &listing,
            &owner,
            &history,
            &ScoringWeights::default(),
            &params,
            test_now(),
        );

        assert!(result.dismissed);
        assert!(result.score <= params.dismissed_cap);
    }

    #[test]
    fn test_positive_history_raises_score() {
        let user = make_user(1, Some(51.50), Some(-0.12), vec![7]);
        let owner = make_user(2, Some(51.55), Some(-0.10), vec![]);
        let listing = make_listing(10, 2, 7, 51.55, -0.10);
        let history = vec![
            signal(20, 7, 9, InteractionKind::Contacted),
            signal(21, 7, 9, InteractionKind::Saved),
        ];

        let weights = ScoringWeights::default();
        let params = ScoreParams::default();
        let with = compute_score(&user, &listing, &owner, &history, &weights, &params, test_now());
        let without = compute_score(&user, &listing, &owner, &[], &weights, &params, test_now());

        assert!(with.behavior_factor.unwrap() > 50.0);
        assert!(with.score > without.score);
    }

    #[test]
    fn test_old_history_outside_window_ignored() {
        let user = make_user(1, Some(51.50), Some(-0.12), vec![7]);
        let owner = make_user(2, Some(51.55), Some(-0.10), vec![]);
        let listing = make_listing(10, 2, 7, 51.55, -0.10);
        let mut old = signal(10, 7, 2, InteractionKind::Dismissed);
        old.created_at = test_now() - Duration::days(365);

        let result = compute_score(
            &user,
            &listing,
            &owner,
            &[old],
            &ScoringWeights::default(),
            &ScoreParams::default(),
            test_now(),
        );

        assert!(!result.dismissed);
        assert_eq!(result.behavior_factor, None);
    }
}
