use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;

use crate::models::{
    Interaction, InteractionKind, InteractionSignal, InteractionStats, MatchPreferences,
    MatchScore, NotificationFrequency, Tier,
};

/// Errors from the engine's own persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
}

/// Persistence for the three tables the engine owns: match_scores (the
/// durable score cache), match_history (append-only interaction ledger) and
/// match_preferences.
///
/// Score rows are a derived optimization: losing them costs recompute time,
/// never correctness. History rows are a ledger and are never updated or
/// deleted by the engine.
pub struct MatchStore {
    pool: PgPool,
}

impl MatchStore {
    /// Connect and run migrations.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (no migration run).
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    // match_scores
    // =========================================================================

    /// All cached scores for a user. Staleness is the caller's concern; rows
    /// here may be past their TTL.
    pub async fn scores_for_user(
        &self,
        tenant_id: i64,
        user_id: i64,
    ) -> Result<Vec<MatchScore>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, user_id, listing_id, score, distance_km, match_type, mutual, reasons, computed_at
            FROM match_scores
            WHERE tenant_id = $1 AND user_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(score_from_row).collect())
    }

    pub async fn get_score(
        &self,
        tenant_id: i64,
        user_id: i64,
        listing_id: i64,
    ) -> Result<Option<MatchScore>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, user_id, listing_id, score, distance_km, match_type, mutual, reasons, computed_at
            FROM match_scores
            WHERE tenant_id = $1 AND user_id = $2 AND listing_id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(score_from_row))
    }

    /// Insert or fully replace the score for one pair. Concurrent writers
    /// race with last-write-wins; either side's row is a complete, valid
    /// computation.
    pub async fn upsert_score(&self, score: &MatchScore) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO match_scores
                (tenant_id, user_id, listing_id, score, distance_km, match_type, mutual, reasons, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tenant_id, user_id, listing_id)
            DO UPDATE SET
                score = EXCLUDED.score,
                distance_km = EXCLUDED.distance_km,
                match_type = EXCLUDED.match_type,
                mutual = EXCLUDED.mutual,
                reasons = EXCLUDED.reasons,
                computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(score.tenant_id)
        .bind(score.user_id)
        .bind(score.listing_id)
        .bind(score.score)
        .bind(score.distance_km)
        .bind(score.tier.as_str())
        .bind(score.mutual)
        .bind(Json(&score.reasons))
        .bind(score.computed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Drop the cached score for one pair (e.g. after a dismissal).
    pub async fn invalidate_pair(
        &self,
        tenant_id: i64,
        user_id: i64,
        listing_id: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM match_scores
            WHERE tenant_id = $1 AND user_id = $2 AND listing_id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(listing_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop all cached scores for a user. Called when their listings,
    /// interests or location change.
    pub async fn invalidate_user(&self, tenant_id: i64, user_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM match_scores
            WHERE tenant_id = $1 AND user_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            tenant_id,
            user_id,
            rows = result.rows_affected(),
            "invalidated cached scores for user"
        );

        Ok(result.rows_affected())
    }

    /// Bulk cache clear for a tenant (admin operation).
    pub async fn clear_tenant(&self, tenant_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM match_scores WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Drop rows computed before the cutoff. Run periodically from a cron.
    pub async fn delete_scores_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM match_scores WHERE computed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // match_history
    // =========================================================================

    /// Append one interaction row. Plain INSERT: the ledger never upserts.
    pub async fn append_interaction(&self, interaction: &Interaction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO match_history
                (id, tenant_id, user_id, listing_id, action, score_at_time, distance_km, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(interaction.id)
        .bind(interaction.tenant_id)
        .bind(interaction.user_id)
        .bind(interaction.listing_id)
        .bind(interaction.action.as_str())
        .bind(interaction.score_at_time)
        .bind(interaction.distance_km)
        .bind(interaction.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            user_id = interaction.user_id,
            listing_id = interaction.listing_id,
            action = interaction.action.as_str(),
            "recorded interaction"
        );

        Ok(())
    }

    /// Recent interactions for one user, joined with the referenced
    /// listing's category and owner for the behavioral factor. Listings
    /// deleted since the interaction come back with null category/owner.
    pub async fn signals_for_user(
        &self,
        tenant_id: i64,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<InteractionSignal>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT h.listing_id, h.action, h.created_at, l.category_id, l.user_id AS owner_id
            FROM match_history h
            LEFT JOIN listings l ON l.id = h.listing_id AND l.tenant_id = h.tenant_id
            WHERE h.tenant_id = $1 AND h.user_id = $2 AND h.created_at >= $3
            ORDER BY h.created_at DESC
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(signal_from_row).collect())
    }

    /// Recent interactions for a batch of users (the reverse side of mutual
    /// detection), grouped by user.
    pub async fn signals_for_users(
        &self,
        tenant_id: i64,
        user_ids: &[i64],
        since: DateTime<Utc>,
    ) -> Result<HashMap<i64, Vec<InteractionSignal>>, StoreError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT h.user_id, h.listing_id, h.action, h.created_at, l.category_id, l.user_id AS owner_id
            FROM match_history h
            LEFT JOIN listings l ON l.id = h.listing_id AND l.tenant_id = h.tenant_id
            WHERE h.tenant_id = $1 AND h.user_id = ANY($2) AND h.created_at >= $3
            ORDER BY h.created_at DESC
            "#,
        )
        .bind(tenant_id)
        .bind(user_ids.to_vec())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, Vec<InteractionSignal>> = HashMap::new();
        for row in &rows {
            if let Some(signal) = signal_from_row(row) {
                grouped
                    .entry(row.get("user_id"))
                    .or_default()
                    .push(signal);
            }
        }
        Ok(grouped)
    }

    /// Per-action counters for a user's interaction history.
    pub async fn interaction_stats(
        &self,
        tenant_id: i64,
        user_id: i64,
    ) -> Result<InteractionStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE action = 'viewed') AS viewed,
                COUNT(*) FILTER (WHERE action = 'saved') AS saved,
                COUNT(*) FILTER (WHERE action = 'contacted') AS contacted,
                COUNT(*) FILTER (WHERE action = 'dismissed') AS dismissed,
                MAX(created_at) AS last_interaction_at
            FROM match_history
            WHERE tenant_id = $1 AND user_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(InteractionStats {
            total: row.get("total"),
            viewed: row.get("viewed"),
            saved: row.get("saved"),
            contacted: row.get("contacted"),
            dismissed: row.get("dismissed"),
            last_interaction_at: row.get("last_interaction_at"),
        })
    }

    // =========================================================================
    // match_preferences
    // =========================================================================

    /// Stored preferences for a user, if any. Default handling lives with
    /// the caller so the default policy stays explicit.
    pub async fn preferences(
        &self,
        tenant_id: i64,
        user_id: i64,
    ) -> Result<Option<MatchPreferences>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, user_id, max_distance_km, min_match_score, notification_frequency,
                   notify_hot_matches, notify_mutual_matches, categories
            FROM match_preferences
            WHERE tenant_id = $1 AND user_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(|row| {
            let frequency_raw: String = row.get("notification_frequency");
            let Json(categories): Json<Vec<i64>> = row.get("categories");
            MatchPreferences {
                tenant_id: row.get("tenant_id"),
                user_id: row.get("user_id"),
                max_distance_km: row.get("max_distance_km"),
                min_match_score: row.get("min_match_score"),
                notification_frequency: NotificationFrequency::parse(&frequency_raw)
                    .unwrap_or(NotificationFrequency::Daily),
                notify_hot_matches: row.get("notify_hot_matches"),
                notify_mutual_matches: row.get("notify_mutual_matches"),
                categories,
            }
        }))
    }

    /// Write the full preference row. Rows are overwritten, never deleted.
    pub async fn upsert_preferences(&self, prefs: &MatchPreferences) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO match_preferences
                (tenant_id, user_id, max_distance_km, min_match_score, notification_frequency,
                 notify_hot_matches, notify_mutual_matches, categories, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (tenant_id, user_id)
            DO UPDATE SET
                max_distance_km = EXCLUDED.max_distance_km,
                min_match_score = EXCLUDED.min_match_score,
                notification_frequency = EXCLUDED.notification_frequency,
                notify_hot_matches = EXCLUDED.notify_hot_matches,
                notify_mutual_matches = EXCLUDED.notify_mutual_matches,
                categories = EXCLUDED.categories,
                updated_at = NOW()
            "#,
        )
        .bind(prefs.tenant_id)
        .bind(prefs.user_id)
        .bind(prefs.max_distance_km)
        .bind(prefs.min_match_score)
        .bind(prefs.notification_frequency.as_str())
        .bind(prefs.notify_hot_matches)
        .bind(prefs.notify_mutual_matches)
        .bind(Json(&prefs.categories))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

fn score_from_row(row: &sqlx::postgres::PgRow) -> MatchScore {
    let tier_raw: String = row.get("match_type");
    let Json(reasons): Json<Vec<String>> = row.get("reasons");
    MatchScore {
        tenant_id: row.get("tenant_id"),
        user_id: row.get("user_id"),
        listing_id: row.get("listing_id"),
        score: row.get("score"),
        distance_km: row.get("distance_km"),
        tier: Tier::parse(&tier_raw).unwrap_or(Tier::Low),
        mutual: row.get("mutual"),
        reasons,
        computed_at: row.get("computed_at"),
    }
}

fn signal_from_row(row: &sqlx::postgres::PgRow) -> Option<InteractionSignal> {
    let action_raw: String = row.get("action");
    let Some(action) = InteractionKind::parse(&action_raw) else {
        tracing::warn!(action = %action_raw, "skipping history row with unknown action");
        return None;
    };

    Some(InteractionSignal {
        listing_id: row.get("listing_id"),
        category_id: row.get("category_id"),
        owner_id: row.get("owner_id"),
        action,
        created_at: row.get("created_at"),
    })
}
