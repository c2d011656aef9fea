use std::collections::HashMap;

use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::models::{Listing, ListingKind, ListingStatus, User};

/// Errors from the read-only platform directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Read-only lookup of users and listings.
///
/// These tables belong to the platform's user-management and listing
/// subsystems; the engine only ever reads them. Every query is scoped by
/// tenant id — cross-tenant rows must never leak through this boundary.
pub struct Directory {
    pool: PgPool,
}

impl Directory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a user's coordinates and declared interests.
    ///
    /// Returns `Ok(None)` for unknown or foreign-tenant users; callers
    /// degrade to empty results rather than erroring.
    pub async fn user(&self, tenant_id: i64, user_id: i64) -> Result<Option<User>, DirectoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, latitude, longitude
            FROM users
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let interests = self.interests_for(&[user_id]).await?;

        Ok(Some(User {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            interests: interests.get(&user_id).cloned().unwrap_or_default(),
        }))
    }

    /// Batch lookup of candidate owners.
    pub async fn users_by_ids(
        &self,
        tenant_id: i64,
        user_ids: &[i64],
    ) -> Result<HashMap<i64, User>, DirectoryError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, latitude, longitude
            FROM users
            WHERE tenant_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(tenant_id)
        .bind(user_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let mut interests = self.interests_for(user_ids).await?;

        let users = rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let user = User {
                    id,
                    tenant_id: row.get("tenant_id"),
                    latitude: row.get("latitude"),
                    longitude: row.get("longitude"),
                    interests: interests.remove(&id).unwrap_or_default(),
                };
                (id, user)
            })
            .collect();

        Ok(users)
    }

    /// Declared interests in priority order, grouped by user.
    async fn interests_for(
        &self,
        user_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<i64>>, DirectoryError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT user_id, category_id
            FROM user_interests
            WHERE user_id = ANY($1)
            ORDER BY user_id, position
            "#,
        )
        .bind(user_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, Vec<i64>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.get("user_id"))
                .or_default()
                .push(row.get("category_id"));
        }
        Ok(grouped)
    }

    /// A user's own active listings, newest first.
    pub async fn active_listings_of(
        &self,
        tenant_id: i64,
        user_id: i64,
    ) -> Result<Vec<Listing>, DirectoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, user_id, category_id, type, status, latitude, longitude, created_at
            FROM listings
            WHERE tenant_id = $1 AND user_id = $2 AND status = 'active'
            ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(listing_from_row).collect())
    }

    /// Active listings of other users in the tenant: the raw candidate pool.
    ///
    /// Not filtered by category on purpose — mutual detection needs each
    /// owner's full set; preference filters run in the scoring pipeline.
    pub async fn candidate_listings(
        &self,
        tenant_id: i64,
        exclude_user_id: i64,
        limit: i64,
    ) -> Result<Vec<Listing>, DirectoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, user_id, category_id, type, status, latitude, longitude, created_at
            FROM listings
            WHERE tenant_id = $1 AND user_id != $2 AND status = 'active'
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(exclude_user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(listing_from_row).collect())
    }

    /// Users with active listings, most recently seen first. Feeds the
    /// cache warm-up sweep.
    pub async fn recently_active_users(
        &self,
        tenant_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>, DirectoryError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT u.id, u.last_login_at
            FROM users u
            JOIN listings l ON l.user_id = u.id AND l.tenant_id = u.tenant_id
            WHERE u.tenant_id = $1 AND u.status = 'active' AND l.status = 'active'
            ORDER BY u.last_login_at DESC NULLS LAST
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}

/// Map a listings row, skipping rows whose type column holds something the
/// engine does not recognize.
fn listing_from_row(row: &sqlx::postgres::PgRow) -> Option<Listing> {
    let kind_raw: String = row.get("type");
    let Some(kind) = ListingKind::parse(&kind_raw) else {
        tracing::warn!(listing_type = %kind_raw, "skipping listing with unknown type");
        return None;
    };
    let status_raw: String = row.get("status");

    Some(Listing {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        owner_id: row.get("user_id"),
        category_id: row.get("category_id"),
        kind,
        status: ListingStatus::parse(&status_raw),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        created_at: row.get("created_at"),
    })
}
