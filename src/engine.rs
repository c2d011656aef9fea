use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::Settings;
use crate::core::matcher::EligibleSet;
use crate::core::scoring::ScoreBreakdown;
use crate::core::{
    filter_suggestions, group_matches, sort_matches, stats_for, within_max_distance, MatchContext,
    Matcher,
};
use crate::error::EngineError;
use crate::models::{
    GroupedMatches, Interaction, InteractionKind, InteractionSignal, InteractionStats, Listing,
    MatchPreferences, MatchScore, MatchStats, PreferencesPatch, ScoredMatch, SuggestionOptions,
    TenantContext, WarmupReport,
};
use crate::services::{is_stale, CacheKey, CacheManager, Directory, MatchStore};

/// The match engine facade: the single entry point callers use to query,
/// record and configure matches.
///
/// Stateless between calls apart from the persisted stores and the
/// in-memory cache tier; every query is an independent unit of work.
pub struct MatchEngine {
    directory: Arc<Directory>,
    store: Arc<MatchStore>,
    cache: Arc<CacheManager>,
    matcher: Matcher,
    candidate_limit: i64,
    max_concurrency: usize,
    compute_deadline: Option<Duration>,
    score_ttl: chrono::Duration,
}

impl MatchEngine {
    pub fn new(
        directory: Arc<Directory>,
        store: Arc<MatchStore>,
        cache: Arc<CacheManager>,
        settings: &Settings,
    ) -> Self {
        Self {
            directory,
            store,
            cache,
            matcher: settings.matcher(),
            candidate_limit: settings.matching.candidate_limit,
            max_concurrency: settings.matching.max_concurrency.max(1),
            compute_deadline: settings.matching.compute_deadline_ms.map(Duration::from_millis),
            score_ttl: chrono::Duration::hours(settings.cache.score_ttl_hours as i64),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Matches for a user grouped into hot/good/mutual/all buckets. Stale
    /// and missing scores are recomputed first; the groups reflect one
    /// consistent snapshot.
    pub async fn get_matches_by_type(
        &self,
        ctx: TenantContext,
    ) -> Result<GroupedMatches, EngineError> {
        let Some(snapshot) = self.refresh(ctx, None).await? else {
            return Ok(GroupedMatches::default());
        };
        Ok(group_matches(snapshot.matches, snapshot.partial))
    }

    /// Top hot matches, score-descending.
    pub async fn get_hot_matches(
        &self,
        ctx: TenantContext,
        limit: usize,
    ) -> Result<Vec<ScoredMatch>, EngineError> {
        let Some(snapshot) = self.refresh(ctx, None).await? else {
            return Ok(Vec::new());
        };
        Ok(snapshot
            .matches
            .into_iter()
            .filter(|m| m.tier == crate::models::Tier::Hot)
            .take(limit)
            .collect())
    }

    /// Top mutual matches, score-descending.
    pub async fn get_mutual_matches(
        &self,
        ctx: TenantContext,
        limit: usize,
    ) -> Result<Vec<ScoredMatch>, EngineError> {
        let Some(snapshot) = self.refresh(ctx, None).await? else {
            return Ok(Vec::new());
        };
        Ok(snapshot
            .matches
            .into_iter()
            .filter(|m| m.mutual)
            .take(limit)
            .collect())
    }

    /// Ranked suggestions under hard preference filters: minimum score,
    /// known distance within the limit, and no recently dismissed listings.
    /// Options override the stored preferences per call.
    pub async fn get_suggestions(
        &self,
        ctx: TenantContext,
        limit: usize,
        options: SuggestionOptions,
    ) -> Result<Vec<ScoredMatch>, EngineError> {
        let Some(snapshot) = self.refresh(ctx, Some(options)).await? else {
            return Ok(Vec::new());
        };

        let min_score = options
            .min_score
            .unwrap_or(snapshot.preferences.min_match_score);
        let max_distance = options
            .max_distance_km
            .unwrap_or(snapshot.preferences.max_distance_km);

        Ok(filter_suggestions(
            &snapshot.matches,
            &snapshot.user_signals,
            min_score,
            max_distance,
            self.matcher.params().history_window_days,
            snapshot.now,
            limit,
        ))
    }

    /// Aggregate statistics over the refreshed match set. Shares the
    /// refresh path with `get_matches_by_type`, so the counters always agree
    /// with the grouped view.
    pub async fn get_stats(&self, ctx: TenantContext) -> Result<MatchStats, EngineError> {
        let Some(snapshot) = self.refresh(ctx, None).await? else {
            return Ok(MatchStats::default());
        };
        let grouped = group_matches(snapshot.matches, snapshot.partial);
        Ok(stats_for(&grouped))
    }

    // =========================================================================
    // Preferences
    // =========================================================================

    /// A user's preferences, defaults when no row exists. Never errors:
    /// storage trouble degrades to the default policy.
    pub async fn get_preferences(&self, ctx: TenantContext) -> MatchPreferences {
        let key = CacheKey::preferences(ctx.tenant_id, ctx.user_id);
        if let Ok(prefs) = self.cache.get::<MatchPreferences>(&key).await {
            return prefs;
        }

        let prefs = match self.store.preferences(ctx.tenant_id, ctx.user_id).await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => MatchPreferences::default_for(ctx.tenant_id, ctx.user_id),
            Err(e) => {
                warn!(user_id = ctx.user_id, error = %e, "preference read failed, using defaults");
                MatchPreferences::default_for(ctx.tenant_id, ctx.user_id)
            }
        };

        if let Err(e) = self.cache.set(&key, &prefs).await {
            warn!(error = %e, "failed to cache preferences");
        }
        prefs
    }

    /// Merge a partial update over the stored preferences and persist the
    /// result. Validation and storage failures propagate; nothing is
    /// silently clamped.
    pub async fn save_preferences(
        &self,
        ctx: TenantContext,
        patch: PreferencesPatch,
    ) -> Result<MatchPreferences, EngineError> {
        patch.validate()?;

        let mut prefs = match self.store.preferences(ctx.tenant_id, ctx.user_id).await? {
            Some(prefs) => prefs,
            None => MatchPreferences::default_for(ctx.tenant_id, ctx.user_id),
        };
        prefs.apply(&patch);

        self.store.upsert_preferences(&prefs).await?;

        let key = CacheKey::preferences(ctx.tenant_id, ctx.user_id);
        self.cache.delete(&key).await;
        self.cache.delete(&CacheKey::scores(ctx.tenant_id, ctx.user_id)).await;

        info!(user_id = ctx.user_id, "saved match preferences");
        Ok(prefs)
    }

    // =========================================================================
    // Interactions
    // =========================================================================

    /// Append one interaction to the history ledger. Dismissals and
    /// contacts additionally invalidate the cached score for the pair so
    /// the next query reflects them immediately, not after the TTL.
    pub async fn record_interaction(
        &self,
        ctx: TenantContext,
        listing_id: i64,
        action: InteractionKind,
        score_at_time: Option<f64>,
        distance_km: Option<f64>,
    ) -> Result<(), EngineError> {
        if listing_id <= 0 || ctx.user_id <= 0 {
            return Err(EngineError::Validation(
                "user and listing ids must be positive".to_string(),
            ));
        }

        let interaction = Interaction {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            user_id: ctx.user_id,
            listing_id,
            action,
            score_at_time,
            distance_km,
            created_at: Utc::now(),
        };

        self.store.append_interaction(&interaction).await?;

        if matches!(action, InteractionKind::Dismissed | InteractionKind::Contacted) {
            // Best effort: even if this delete fails, the history row just
            // written makes the cached score stale on the next read.
            if let Err(e) = self
                .store
                .invalidate_pair(ctx.tenant_id, ctx.user_id, listing_id)
                .await
            {
                warn!(listing_id, error = %e, "cache invalidation after interaction failed");
            }
            self.cache
                .delete(&CacheKey::scores(ctx.tenant_id, ctx.user_id))
                .await;
        }

        Ok(())
    }

    /// Per-action counters for a user's history. Degrades to zeroes when
    /// the store is unavailable.
    pub async fn interaction_stats(&self, ctx: TenantContext) -> InteractionStats {
        match self.store.interaction_stats(ctx.tenant_id, ctx.user_id).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(user_id = ctx.user_id, error = %e, "interaction stats read failed");
                InteractionStats::default()
            }
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Pre-compute and persist scores for recently active users missing
    /// fresh cache rows. An optimization only; correctness never depends on
    /// warmed rows.
    pub async fn warm_cache(&self, tenant_id: i64, limit: i64) -> WarmupReport {
        let mut report = WarmupReport::default();

        let users = match self.directory.recently_active_users(tenant_id, limit).await {
            Ok(users) => users,
            Err(e) => {
                warn!(tenant_id, error = %e, "warm-up user lookup failed");
                return report;
            }
        };

        for user_id in users {
            let ctx = TenantContext { tenant_id, user_id };
            match self.refresh(ctx, None).await {
                Ok(Some(snapshot)) => {
                    report.processed += 1;
                    report.cached += snapshot.matches.len() as u64;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(user_id, error = %e, "warm-up refresh failed");
                }
            }
        }

        info!(
            tenant_id,
            processed = report.processed,
            cached = report.cached,
            "cache warm-up complete"
        );
        report
    }

    /// Drop persisted scores past their TTL. Run from a periodic job.
    pub async fn clear_expired(&self) -> Result<u64, EngineError> {
        let cutoff = Utc::now() - self.score_ttl;
        let removed = self.store.delete_scores_older_than(cutoff).await?;
        info!(removed, "cleared expired match scores");
        Ok(removed)
    }

    /// Drop all cached scores for a user. Call when their listings,
    /// interests or location change; mutual matches involving them are
    /// re-evaluated on the next query.
    pub async fn invalidate_user(&self, ctx: TenantContext) -> Result<u64, EngineError> {
        let removed = self.store.invalidate_user(ctx.tenant_id, ctx.user_id).await?;
        self.cache
            .delete(&CacheKey::scores(ctx.tenant_id, ctx.user_id))
            .await;
        Ok(removed)
    }

    /// Bulk cache clear for a whole tenant (admin operation).
    pub async fn clear_tenant_cache(&self, tenant_id: i64) -> Result<u64, EngineError> {
        let removed = self.store.clear_tenant(tenant_id).await?;
        self.cache.clear();
        Ok(removed)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Load everything a query needs. `Ok(None)` means the user is unknown
    /// (or belongs to another tenant) and the caller should return empty
    /// results.
    async fn load_context(
        &self,
        ctx: TenantContext,
        overrides: Option<SuggestionOptions>,
    ) -> Result<Option<MatchContext>, EngineError> {
        let Some(user) = self.directory.user(ctx.tenant_id, ctx.user_id).await? else {
            debug!(user_id = ctx.user_id, "unknown user, returning empty results");
            return Ok(None);
        };

        let mut preferences = self.get_preferences(ctx).await;
        if let Some(options) = overrides {
            if let Some(max) = options.max_distance_km {
                preferences.max_distance_km = max;
            }
            if let Some(min) = options.min_score {
                preferences.min_match_score = min;
            }
        }

        let user_listings = self
            .directory
            .active_listings_of(ctx.tenant_id, ctx.user_id)
            .await?;
        let candidates = self
            .directory
            .candidate_listings(ctx.tenant_id, ctx.user_id, self.candidate_limit)
            .await?;

        let mut owner_ids: Vec<i64> = candidates.iter().map(|l| l.owner_id).collect();
        owner_ids.sort_unstable();
        owner_ids.dedup();
        let owners = self.directory.users_by_ids(ctx.tenant_id, &owner_ids).await?;

        let now = Utc::now();
        let since = now - chrono::Duration::days(self.matcher.params().history_window_days);

        // History reads degrade: without them scores lose the behavioral
        // factor but the query still answers.
        let user_signals = match self
            .store
            .signals_for_user(ctx.tenant_id, ctx.user_id, since)
            .await
        {
            Ok(signals) => signals,
            Err(e) => {
                warn!(user_id = ctx.user_id, error = %e, "history read failed, scoring without it");
                Vec::new()
            }
        };
        let owner_signals = match self
            .store
            .signals_for_users(ctx.tenant_id, &owner_ids, since)
            .await
        {
            Ok(signals) => signals,
            Err(e) => {
                warn!(error = %e, "owner history read failed, scoring without it");
                HashMap::new()
            }
        };

        Ok(Some(MatchContext {
            ctx,
            user,
            user_listings,
            candidates,
            owners,
            user_signals,
            owner_signals,
            preferences,
            now,
        }))
    }

    /// Refresh the score set for a user: serve fresh cached rows, recompute
    /// stale and missing pairs on a bounded worker pool, run the mutual
    /// reverse pass, persist what was recomputed, and return one ranked,
    /// consistent snapshot.
    async fn refresh(
        &self,
        ctx: TenantContext,
        overrides: Option<SuggestionOptions>,
    ) -> Result<Option<Snapshot>, EngineError> {
        let Some(cx) = self.load_context(ctx, overrides).await? else {
            return Ok(None);
        };

        let cached = self.cached_scores(ctx).await;
        let EligibleSet {
            listings,
            owner_kinds,
        } = self.matcher.eligible_candidates(&cx);

        // One staleness test, one `now`, applied uniformly: a query never
        // mixes a stale cached value for one listing with a fresh value for
        // another.
        let mut matches = Vec::new();
        let mut to_compute: Vec<Listing> = Vec::new();
        for listing in listings {
            match cached.get(&listing.id) {
                Some(row) if !is_stale(row, cx.now, self.score_ttl, &cx.user_signals) => {
                    if within_max_distance(row.distance_km, cx.preferences.max_distance_km) {
                        matches.push(self.from_cached(listing, row));
                    }
                }
                _ => to_compute.push(listing.clone()),
            }
        }

        let (computed, partial) = self.compute_scores(&cx, to_compute).await;

        let mut fresh_rows: Vec<MatchScore> = Vec::new();
        for (listing, breakdown) in computed {
            if !within_max_distance(breakdown.distance_km, cx.preferences.max_distance_km) {
                continue;
            }

            let Some(owner) = cx.owners.get(&listing.owner_id) else {
                continue;
            };
            let empty: Vec<InteractionSignal> = Vec::new();
            let owner_signals = cx.owner_signals.get(&listing.owner_id).unwrap_or(&empty);
            let owner_has_complement = self.matcher.owner_has_complement(&owner_kinds, &listing);
            let mutual = self.matcher.mutual_flag(
                &breakdown,
                &listing,
                owner,
                owner_signals,
                &cx.user,
                &cx.user_listings,
                owner_has_complement,
                cx.now,
            );

            let scored = self.matcher.assemble(&listing, breakdown, mutual);
            fresh_rows.push(MatchScore {
                tenant_id: ctx.tenant_id,
                user_id: ctx.user_id,
                listing_id: scored.listing_id,
                score: scored.score,
                distance_km: scored.distance_km,
                tier: scored.tier,
                mutual: scored.mutual,
                reasons: scored.reasons.clone(),
                computed_at: cx.now,
            });
            matches.push(scored);
        }

        // Persist best effort: the cache is an optimization, a failed write
        // only costs recompute time on the next query.
        for row in &fresh_rows {
            if let Err(e) = self.store.upsert_score(row).await {
                warn!(listing_id = row.listing_id, error = %e, "score upsert failed");
            }
        }
        if !partial {
            let key = CacheKey::scores(ctx.tenant_id, ctx.user_id);
            let mut all_rows: Vec<MatchScore> = cached.into_values().collect();
            all_rows.retain(|r| !fresh_rows.iter().any(|f| f.listing_id == r.listing_id));
            all_rows.extend(fresh_rows);
            if let Err(e) = self.cache.set(&key, &all_rows).await {
                warn!(error = %e, "failed to cache score set");
            }
        }

        sort_matches(&mut matches);
        debug!(
            user_id = ctx.user_id,
            matches = matches.len(),
            partial,
            "refreshed match snapshot"
        );

        Ok(Some(Snapshot {
            matches,
            partial,
            preferences: cx.preferences,
            user_signals: cx.user_signals,
            now: cx.now,
        }))
    }

    /// Cached score rows for the user, keyed by listing id. L1 first, then
    /// the durable store; on storage trouble degrade to recomputing all.
    async fn cached_scores(&self, ctx: TenantContext) -> HashMap<i64, MatchScore> {
        let key = CacheKey::scores(ctx.tenant_id, ctx.user_id);
        let rows = match self.cache.get::<Vec<MatchScore>>(&key).await {
            Ok(rows) => rows,
            Err(_) => match self.store.scores_for_user(ctx.tenant_id, ctx.user_id).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(user_id = ctx.user_id, error = %e, "score read failed, recomputing all");
                    Vec::new()
                }
            },
        };

        rows.into_iter().map(|r| (r.listing_id, r)).collect()
    }

    /// Fan stale pairs out over the worker pool. Returns the computed pairs
    /// and whether the deadline cut the batch short.
    async fn compute_scores(
        &self,
        cx: &MatchContext,
        to_compute: Vec<Listing>,
    ) -> (Vec<(Listing, ScoreBreakdown)>, bool) {
        if to_compute.is_empty() {
            return (Vec::new(), false);
        }

        let user = Arc::new(cx.user.clone());
        let signals = Arc::new(cx.user_signals.clone());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set = JoinSet::new();

        for listing in to_compute {
            let Some(owner) = cx.owners.get(&listing.owner_id).cloned() else {
                continue;
            };
            let matcher = self.matcher.clone();
            let user = user.clone();
            let signals = signals.clone();
            let semaphore = semaphore.clone();
            let now = cx.now;

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                let breakdown = matcher.score_pair(&user, &listing, &owner, &signals, now);
                Some((listing, breakdown))
            });
        }

        let start = Instant::now();
        let mut computed = Vec::new();
        let mut partial = false;

        loop {
            let joined = match self.compute_deadline {
                Some(deadline) => {
                    let Some(remaining) = deadline.checked_sub(start.elapsed()) else {
                        partial = true;
                        join_set.abort_all();
                        break;
                    };
                    match tokio::time::timeout(remaining, join_set.join_next()).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            partial = true;
                            join_set.abort_all();
                            break;
                        }
                    }
                }
                None => join_set.join_next().await,
            };

            let Some(joined) = joined else { break };
            match joined {
                Ok(Some(pair)) => computed.push(pair),
                Ok(None) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(error = %e, "score task failed"),
            }
        }

        if partial {
            warn!(
                computed = computed.len(),
                "compute deadline expired, returning partial results"
            );
        }

        (computed, partial)
    }

    /// Rebuild a serving match from a fresh cached row, re-classifying the
    /// score so threshold changes apply without waiting out the TTL.
    fn from_cached(&self, listing: &Listing, row: &MatchScore) -> ScoredMatch {
        let tier = crate::core::classify(row.score, self.matcher.thresholds());
        ScoredMatch {
            listing_id: row.listing_id,
            owner_id: listing.owner_id,
            category_id: listing.category_id,
            kind: listing.kind,
            score: row.score,
            distance_km: row.distance_km,
            tier,
            mutual: row.mutual,
            reasons: row.reasons.clone(),
            listing_created_at: listing.created_at,
        }
    }
}

/// One refreshed, consistently-scored view of a user's matches.
struct Snapshot {
    matches: Vec<ScoredMatch>,
    partial: bool,
    preferences: MatchPreferences,
    user_signals: Vec<InteractionSignal>,
    now: DateTime<Utc>,
}
