use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{InteractionKind, InteractionSignal, MatchScore};

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache miss: {0}")]
    CacheMiss(String),
}

/// In-memory cache tier in front of the persisted match store.
///
/// The durable cache is the match_scores table itself; this layer only
/// saves round trips within a process. Entries expire with the same TTL as
/// the persisted rows and are invalidated alongside them.
pub struct CacheManager {
    l1_cache: moka::future::Cache<String, Vec<u8>>,
}

impl CacheManager {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let l1_cache = moka::future::CacheBuilder::new(max_entries)
            .time_to_live(ttl)
            .build();

        Self { l1_cache }
    }

    /// Get a value from cache
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: for<'de> Deserialize<'de>,
    {
        if let Some(bytes) = self.l1_cache.get(key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(serde_json::from_slice(&bytes)?);
        }

        tracing::trace!("Cache miss: {}", key);
        Err(CacheError::CacheMiss(key.to_string()))
    }

    /// Set a value in cache
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec(value)?;
        self.l1_cache.insert(key.to_string(), bytes).await;
        tracing::trace!("Cache set: {}", key);
        Ok(())
    }

    /// Delete a value from cache
    pub async fn delete(&self, key: &str) {
        self.l1_cache.invalidate(key).await;
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.l1_cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.l1_cache.entry_count()
    }
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Key for a user's full cached score set.
    pub fn scores(tenant_id: i64, user_id: i64) -> String {
        format!("scores:{}:{}", tenant_id, user_id)
    }

    /// Key for a user's preferences.
    pub fn preferences(tenant_id: i64, user_id: i64) -> String {
        format!("prefs:{}:{}", tenant_id, user_id)
    }
}

/// Staleness policy for a persisted score row.
///
/// A row is stale once its age exceeds the TTL, or once a dismissed or
/// contacted interaction for the same pair lands after it was computed.
/// Stale rows are never served; the caller recomputes first.
pub fn is_stale(
    score: &MatchScore,
    now: DateTime<Utc>,
    ttl: chrono::Duration,
    signals: &[InteractionSignal],
) -> bool {
    if now - score.computed_at > ttl {
        return true;
    }

    signals.iter().any(|s| {
        s.listing_id == score.listing_id
            && s.created_at > score.computed_at
            && matches!(
                s.action,
                InteractionKind::Dismissed | InteractionKind::Contacted
            )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tier;
    use chrono::TimeZone;

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn score_row(computed_at: DateTime<Utc>) -> MatchScore {
        MatchScore {
            tenant_id: 1,
            user_id: 5,
            listing_id: 10,
            score: 72.0,
            distance_km: Some(3.2),
            tier: Tier::Good,
            mutual: false,
            reasons: vec![],
            computed_at,
        }
    }

    fn signal_at(action: InteractionKind, created_at: DateTime<Utc>) -> InteractionSignal {
        InteractionSignal {
            listing_id: 10,
            category_id: Some(7),
            owner_id: Some(2),
            action,
            created_at,
        }
    }

    #[test]
    fn test_fresh_row_is_not_stale() {
        let row = score_row(test_now() - chrono::Duration::hours(1));
        assert!(!is_stale(&row, test_now(), chrono::Duration::hours(24), &[]));
    }

    #[test]
    fn test_expired_row_is_stale() {
        let row = score_row(test_now() - chrono::Duration::hours(25));
        assert!(is_stale(&row, test_now(), chrono::Duration::hours(24), &[]));
    }

    #[test]
    fn test_dismissal_after_compute_makes_stale() {
        let row = score_row(test_now() - chrono::Duration::hours(1));
        let signals = vec![signal_at(
            InteractionKind::Dismissed,
            test_now() - chrono::Duration::minutes(5),
        )];
        assert!(is_stale(&row, test_now(), chrono::Duration::hours(24), &signals));
    }

    #[test]
    fn test_view_after_compute_does_not_invalidate() {
        let row = score_row(test_now() - chrono::Duration::hours(1));
        let signals = vec![signal_at(
            InteractionKind::Viewed,
            test_now() - chrono::Duration::minutes(5),
        )];
        assert!(!is_stale(&row, test_now(), chrono::Duration::hours(24), &signals));
    }

    #[test]
    fn test_dismissal_before_compute_does_not_invalidate() {
        let row = score_row(test_now() - chrono::Duration::hours(1));
        let signals = vec![signal_at(
            InteractionKind::Dismissed,
            test_now() - chrono::Duration::hours(2),
        )];
        assert!(!is_stale(&row, test_now(), chrono::Duration::hours(24), &signals));
    }

    #[tokio::test]
    async fn test_cache_set_get_delete() {
        let cache = CacheManager::new(100, Duration::from_secs(60));

        cache.set("test_key", &"test_value").await.unwrap();
        let result: String = cache.get("test_key").await.unwrap();
        assert_eq!(result, "test_value");

        cache.delete("test_key").await;
        assert!(cache.get::<String>("test_key").await.is_err());
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::scores(1, 42), "scores:1:42");
        assert_eq!(CacheKey::preferences(1, 42), "prefs:1:42");
    }
}
