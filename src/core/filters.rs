use chrono::{DateTime, Duration, Utc};

use crate::core::distance::{calculate_bounding_box, is_within_bounding_box};
use crate::models::{
    BoundingBox, InteractionKind, InteractionSignal, Listing, MatchPreferences, TenantContext, User,
};

/// Hard eligibility: only active listings owned by other users inside the
/// caller's tenant can ever be candidates. The tenant check is repeated here
/// even though the directory queries are tenant-scoped; cross-tenant rows
/// must not survive any boundary.
#[inline]
pub fn is_eligible_candidate(listing: &Listing, ctx: &TenantContext) -> bool {
    listing.tenant_id == ctx.tenant_id
        && listing.owner_id != ctx.user_id
        && listing.status.is_active()
}

/// Preference category restriction; an empty set means no restriction.
#[inline]
pub fn passes_category_filter(listing: &Listing, categories: &[i64]) -> bool {
    categories.is_empty() || categories.contains(&listing.category_id)
}

/// Distance gate for preference and suggestion filtering. Unknown distance
/// passes: only a known distance beyond the limit excludes a candidate.
#[inline]
pub fn within_max_distance(distance_km: Option<f64>, max_km: f64) -> bool {
    match distance_km {
        Some(d) => d <= max_km,
        None => true,
    }
}

/// Bounding box around the user for cheap pre-filtering before the exact
/// Haversine pass. `None` when the user has no usable coordinates.
pub fn candidate_bounding_box(user: &User, prefs: &MatchPreferences) -> Option<BoundingBox> {
    match (user.latitude, user.longitude) {
        (Some(lat), Some(lon)) => Some(calculate_bounding_box(lat, lon, prefs.max_distance_km)),
        _ => None,
    }
}

/// Pre-filter a listing against the bounding box. Listings without
/// coordinates (their own or their owner's) pass through to exact scoring.
#[inline]
pub fn passes_bounding_box(listing: &Listing, owner: &User, bbox: &Option<BoundingBox>) -> bool {
    let Some(bbox) = bbox else { return true };
    match listing.coords_or_owner(owner) {
        (Some(lat), Some(lon)) => is_within_bounding_box(lat, lon, bbox),
        _ => true,
    }
}

/// Whether the user dismissed this listing within the suppression window.
/// Dismissed listings never come back as suggestions until the history ages
/// out or is reset.
pub fn recently_dismissed(
    signals: &[InteractionSignal],
    listing_id: i64,
    window_days: i64,
    now: DateTime<Utc>,
) -> bool {
    let cutoff = now - Duration::days(window_days);
    signals.iter().any(|s| {
        s.listing_id == listing_id
            && s.action == InteractionKind::Dismissed
            && s.created_at >= cutoff
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingKind, ListingStatus};
    use chrono::TimeZone;

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn make_listing(tenant_id: i64, owner_id: i64, status: ListingStatus) -> Listing {
        Listing {
            id: 10,
            tenant_id,
            owner_id,
            category_id: 7,
            kind: ListingKind::Offer,
            status,
            latitude: Some(51.50),
            longitude: Some(-0.12),
            created_at: test_now(),
        }
    }

    #[test]
    fn test_cross_tenant_listing_rejected() {
        let ctx = TenantContext {
            tenant_id: 1,
            user_id: 5,
        };
        let listing = make_listing(2, 9, ListingStatus::Active);
        assert!(!is_eligible_candidate(&listing, &ctx));
    }

    #[test]
    fn test_own_listing_rejected() {
        let ctx = TenantContext {
            tenant_id: 1,
            user_id: 5,
        };
        let listing = make_listing(1, 5, ListingStatus::Active);
        assert!(!is_eligible_candidate(&listing, &ctx));
    }

    #[test]
    fn test_inactive_listing_rejected() {
        let ctx = TenantContext {
            tenant_id: 1,
            user_id: 5,
        };
        assert!(!is_eligible_candidate(
            &make_listing(1, 9, ListingStatus::Inactive),
            &ctx
        ));
        assert!(is_eligible_candidate(
            &make_listing(1, 9, ListingStatus::Active),
            &ctx
        ));
    }

    #[test]
    fn test_category_filter() {
        let listing = make_listing(1, 9, ListingStatus::Active);
        assert!(passes_category_filter(&listing, &[]));
        assert!(passes_category_filter(&listing, &[7, 8]));
        assert!(!passes_category_filter(&listing, &[8, 9]));
    }

    #[test]
    fn test_max_distance_gate() {
        assert!(within_max_distance(Some(9.0), 10.0));
        assert!(!within_max_distance(Some(10.5), 10.0));
        // Unknown distance is a missing factor, not an exclusion.
        assert!(within_max_distance(None, 10.0));
    }

    #[test]
    fn test_recently_dismissed_window() {
        let fresh = InteractionSignal {
            listing_id: 10,
            category_id: Some(7),
            owner_id: Some(9),
            action: InteractionKind::Dismissed,
            created_at: test_now() - Duration::days(3),
        };
        let stale = InteractionSignal {
            created_at: test_now() - Duration::days(120),
            ..fresh.clone()
        };

        assert!(recently_dismissed(&[fresh], 10, 90, test_now()));
        assert!(!recently_dismissed(&[stale], 10, 90, test_now()));
    }

    #[test]
    fn test_bounding_box_prefilter_passes_unknown_coords() {
        let user = User {
            id: 5,
            tenant_id: 1,
            latitude: Some(51.50),
            longitude: Some(-0.12),
            interests: vec![],
        };
        let owner = User {
            id: 9,
            tenant_id: 1,
            latitude: None,
            longitude: None,
            interests: vec![],
        };
        let prefs = MatchPreferences::default_for(1, 5);
        let bbox = candidate_bounding_box(&user, &prefs);
        assert!(bbox.is_some());

        let mut listing = make_listing(1, 9, ListingStatus::Active);
        listing.latitude = None;
        listing.longitude = None;
        assert!(passes_bounding_box(&listing, &owner, &bbox));

        listing.latitude = Some(40.0);
        listing.longitude = Some(20.0);
        assert!(!passes_bounding_box(&listing, &owner, &bbox));
    }
}
