use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::core::classify::{classify, qualifies_mutual};
use crate::core::filters::{
    candidate_bounding_box, is_eligible_candidate, passes_bounding_box, passes_category_filter,
    recently_dismissed, within_max_distance,
};
use crate::core::scoring::{compute_score, ScoreBreakdown};
use crate::models::{
    GroupedMatches, InteractionSignal, Listing, ListingKind, MatchPreferences, MatchStats,
    ScoreParams, ScoredMatch, ScoringWeights, TenantContext, TierThresholds, User,
};

/// Everything one matching query needs, loaded up front so the pipeline
/// itself is pure and runs against a single `now` snapshot.
#[derive(Debug, Clone)]
pub struct MatchContext {
    pub ctx: TenantContext,
    pub user: User,
    /// The querying user's own active listings (reverse side of mutual
    /// detection).
    pub user_listings: Vec<Listing>,
    /// All active listings of other users in the tenant. Deliberately not
    /// category-filtered: mutual detection needs the owners' full sets.
    pub candidates: Vec<Listing>,
    pub owners: HashMap<i64, User>,
    pub user_signals: Vec<InteractionSignal>,
    pub owner_signals: HashMap<i64, Vec<InteractionSignal>>,
    pub preferences: MatchPreferences,
    pub now: DateTime<Utc>,
}

/// Output of the eligibility stage: surviving candidate listings plus, for
/// every eligible owner, whether they have an active offer / need.
pub struct EligibleSet<'a> {
    pub listings: Vec<&'a Listing>,
    pub owner_kinds: HashMap<i64, (bool, bool)>,
}

/// The scoring pipeline: eligibility filtering, forward scoring, the mutual
/// reverse pass, classification and ranking.
///
/// # Pipeline stages
/// 1. Eligibility + preference filters (tenant, active, category, bbox)
/// 2. Forward scoring of the user against each candidate listing
/// 3. Reverse scoring of each qualifying candidate's owner against the
///    user's own listings (mutual detection)
/// 4. Classification, distance gating and ranking
#[derive(Debug, Clone)]
pub struct Matcher {
    weights: ScoringWeights,
    thresholds: TierThresholds,
    params: ScoreParams,
}

impl Matcher {
    pub fn new(weights: ScoringWeights, thresholds: TierThresholds, params: ScoreParams) -> Self {
        Self {
            weights,
            thresholds,
            params,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            ScoringWeights::default(),
            TierThresholds::default(),
            ScoreParams::default(),
        )
    }

    pub fn thresholds(&self) -> &TierThresholds {
        &self.thresholds
    }

    pub fn params(&self) -> &ScoreParams {
        &self.params
    }

    /// Score one (user, listing) pair. Pure; used directly by the engine's
    /// concurrent recompute path.
    pub fn score_pair(
        &self,
        user: &User,
        listing: &Listing,
        owner: &User,
        signals: &[InteractionSignal],
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        compute_score(user, listing, owner, signals, &self.weights, &self.params, now)
    }

    /// Best score of `owner` toward the user's own active listings of the
    /// given kind — the reverse direction of mutual detection. `None` when
    /// the user has no such listing.
    pub fn reverse_score(
        &self,
        owner: &User,
        owner_signals: &[InteractionSignal],
        user: &User,
        user_listings: &[Listing],
        kind: ListingKind,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        user_listings
            .iter()
            .filter(|l| l.status.is_active() && l.kind == kind)
            .map(|l| self.score_pair(owner, l, user, owner_signals, now).score)
            .fold(None, |best, s| match best {
                Some(b) if b >= s => Some(b),
                _ => Some(s),
            })
    }

    /// Decide the mutual flag for a forward-scored candidate listing.
    ///
    /// For a candidate of kind K owned by B, the exchange pairs are
    /// (user's complement-of-K, B's K) and (B's complement-of-K, user's K):
    /// both sides must own the structural counterpart, and both directions
    /// must clear the mutual floor.
    pub fn mutual_flag(
        &self,
        forward: &ScoreBreakdown,
        listing: &Listing,
        owner: &User,
        owner_signals: &[InteractionSignal],
        user: &User,
        user_listings: &[Listing],
        owner_has_complement: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if forward.score < self.thresholds.mutual_floor {
            return false;
        }
        let complement = listing.kind.complement();
        let user_has_complement = user_listings
            .iter()
            .any(|l| l.status.is_active() && l.kind == complement);
        if !user_has_complement || !owner_has_complement {
            return false;
        }
        let reverse = self.reverse_score(owner, owner_signals, user, user_listings, listing.kind, now);
        qualifies_mutual(forward.score, reverse, &self.thresholds)
    }

    /// Stage 1: eligibility and preference filters, plus a per-owner summary
    /// of which listing kinds they have (the structural side of mutual
    /// detection, computed before any category filtering).
    pub fn eligible_candidates<'a>(&self, cx: &'a MatchContext) -> EligibleSet<'a> {
        let eligible: Vec<&Listing> = cx
            .candidates
            .iter()
            .filter(|l| is_eligible_candidate(l, &cx.ctx))
            .collect();

        // Which owners could give something back, per listing kind.
        let mut owner_kinds: HashMap<i64, (bool, bool)> = HashMap::new();
        for listing in &eligible {
            let entry = owner_kinds.entry(listing.owner_id).or_default();
            match listing.kind {
                ListingKind::Offer => entry.0 = true,
                ListingKind::Need => entry.1 = true,
            }
        }

        let bbox = candidate_bounding_box(&cx.user, &cx.preferences);
        let listings = eligible
            .into_iter()
            .filter(|l| passes_category_filter(l, &cx.preferences.categories))
            .filter(|l| match cx.owners.get(&l.owner_id) {
                Some(owner) => passes_bounding_box(l, owner, &bbox),
                // Owner vanished between candidate selection and scoring;
                // skip this listing rather than failing the query.
                None => {
                    tracing::debug!(listing_id = l.id, "candidate owner missing, skipping");
                    false
                }
            })
            .collect();

        EligibleSet {
            listings,
            owner_kinds,
        }
    }

    /// Whether an owner has an active listing of the complementary kind,
    /// per the stage-1 summary.
    pub fn owner_has_complement(
        &self,
        owner_kinds: &HashMap<i64, (bool, bool)>,
        listing: &Listing,
    ) -> bool {
        owner_kinds
            .get(&listing.owner_id)
            .map(|&(offer, need)| match listing.kind.complement() {
                ListingKind::Offer => offer,
                ListingKind::Need => need,
            })
            .unwrap_or(false)
    }

    /// Run the full pipeline over a loaded context.
    pub fn evaluate(&self, cx: &MatchContext) -> Vec<ScoredMatch> {
        let EligibleSet {
            listings,
            owner_kinds,
        } = self.eligible_candidates(cx);

        let empty_signals: Vec<InteractionSignal> = Vec::new();
        let mut matches = Vec::new();

        for listing in listings {
            // Owner presence was checked during stage 1.
            let Some(owner) = cx.owners.get(&listing.owner_id) else {
                continue;
            };

            let breakdown = self.score_pair(&cx.user, listing, owner, &cx.user_signals, cx.now);
            if !within_max_distance(breakdown.distance_km, cx.preferences.max_distance_km) {
                continue;
            }

            let owner_has_complement = self.owner_has_complement(&owner_kinds, listing);
            let owner_signals = cx
                .owner_signals
                .get(&listing.owner_id)
                .unwrap_or(&empty_signals);
            let mutual = self.mutual_flag(
                &breakdown,
                listing,
                owner,
                owner_signals,
                &cx.user,
                &cx.user_listings,
                owner_has_complement,
                cx.now,
            );

            matches.push(self.assemble(listing, breakdown, mutual));
        }

        sort_matches(&mut matches);
        matches
    }

    /// Turn a breakdown into a classified, serializable match.
    pub fn assemble(&self, listing: &Listing, breakdown: ScoreBreakdown, mutual: bool) -> ScoredMatch {
        let tier = classify(breakdown.score, &self.thresholds);
        let mut reasons = breakdown.reasons;
        if mutual {
            reasons.push("Mutual exchange possible".to_string());
        }
        ScoredMatch {
            listing_id: listing.id,
            owner_id: listing.owner_id,
            category_id: listing.category_id,
            kind: listing.kind,
            score: breakdown.score,
            distance_km: breakdown.distance_km,
            tier,
            mutual,
            reasons,
            listing_created_at: listing.created_at,
        }
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Sort by score (descending), ties broken by most-recent listing creation.
pub fn sort_matches(matches: &mut [ScoredMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.listing_created_at.cmp(&a.listing_created_at))
    });
}

/// Group a ranked match list into the four response buckets.
pub fn group_matches(all: Vec<ScoredMatch>, partial: bool) -> GroupedMatches {
    let hot = all
        .iter()
        .filter(|m| m.tier == crate::models::Tier::Hot)
        .cloned()
        .collect();
    let good = all
        .iter()
        .filter(|m| m.tier == crate::models::Tier::Good)
        .cloned()
        .collect();
    let mutual = all.iter().filter(|m| m.mutual).cloned().collect();

    GroupedMatches {
        hot,
        good,
        mutual,
        all,
        partial,
    }
}

/// Aggregate counters over a grouped snapshot.
pub fn stats_for(grouped: &GroupedMatches) -> MatchStats {
    let total = grouped.all.len() as u64;
    let avg_score = if total > 0 {
        grouped.all.iter().map(|m| m.score).sum::<f64>() / total as f64
    } else {
        0.0
    };
    MatchStats {
        total_matches: total,
        hot_matches: grouped.hot.len() as u64,
        mutual_matches: grouped.mutual.len() as u64,
        avg_score,
    }
}

/// Hard suggestion filters: minimum score, known distance within the limit,
/// and no recent dismissal of the listing. Input must already be ranked.
pub fn filter_suggestions(
    all: &[ScoredMatch],
    user_signals: &[InteractionSignal],
    min_score: f64,
    max_distance_km: f64,
    history_window_days: i64,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<ScoredMatch> {
    all.iter()
        .filter(|m| m.score >= min_score)
        .filter(|m| within_max_distance(m.distance_km, max_distance_km))
        .filter(|m| !recently_dismissed(user_signals, m.listing_id, history_window_days, now))
        .take(limit)
        .cloned()
        .collect()
}
