use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant-scoped caller identity, supplied by the authentication boundary.
///
/// Every engine operation is scoped to exactly one tenant; the engine never
/// resolves identity itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: i64,
    pub user_id: i64,
}

/// Platform user as seen by the engine: coordinates and declared interests.
///
/// Owned by the user-management subsystem; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub tenant_id: i64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Category ids in declared priority order (first = strongest interest).
    #[serde(default)]
    pub interests: Vec<i64>,
}

/// Whether a listing offers something or asks for something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Offer,
    Need,
}

impl ListingKind {
    pub fn complement(self) -> Self {
        match self {
            ListingKind::Offer => ListingKind::Need,
            ListingKind::Need => ListingKind::Offer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ListingKind::Offer => "offer",
            ListingKind::Need => "need",
        }
    }

    /// Parse the platform's listing type column. Older rows use "request"
    /// for what the engine calls a need.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "offer" => Some(ListingKind::Offer),
            "need" | "request" => Some(ListingKind::Need),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Inactive,
    #[serde(other)]
    Other,
}

impl ListingStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => ListingStatus::Active,
            "inactive" => ListingStatus::Inactive,
            _ => ListingStatus::Other,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, ListingStatus::Active)
    }
}

/// An offer or need posted by a user. Owned by the listing subsystem;
/// the engine treats listings as read-only candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub tenant_id: i64,
    pub owner_id: i64,
    pub category_id: i64,
    pub kind: ListingKind,
    pub status: ListingStatus,
    /// Listings may carry their own coordinates; when absent the owner's
    /// home coordinates apply.
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    /// Coordinates of the listing, falling back to the owner's home location.
    pub fn coords_or_owner(&self, owner: &User) -> (Option<f64>, Option<f64>) {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
            _ => (owner.latitude, owner.longitude),
        }
    }
}

/// User actions recorded against a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Viewed,
    Saved,
    Contacted,
    Dismissed,
}

impl InteractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionKind::Viewed => "viewed",
            InteractionKind::Saved => "saved",
            InteractionKind::Contacted => "contacted",
            InteractionKind::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewed" => Some(InteractionKind::Viewed),
            "saved" => Some(InteractionKind::Saved),
            "contacted" => Some(InteractionKind::Contacted),
            "dismissed" => Some(InteractionKind::Dismissed),
            _ => None,
        }
    }
}

/// One row of the append-only match history ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    pub tenant_id: i64,
    pub user_id: i64,
    pub listing_id: i64,
    pub action: InteractionKind,
    pub score_at_time: Option<f64>,
    pub distance_km: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// History row joined with the referenced listing's category and owner,
/// which is what the behavioral scoring factor actually consumes. The
/// listing fields are `None` when the listing has since been deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionSignal {
    pub listing_id: i64,
    pub category_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub action: InteractionKind,
    pub created_at: DateTime<Utc>,
}

/// Match tier assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Good,
    Low,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Good => "good",
            Tier::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hot" => Some(Tier::Hot),
            "good" => Some(Tier::Good),
            "low" => Some(Tier::Low),
            _ => None,
        }
    }
}

/// A persisted compatibility score for one (tenant, user, listing) pair.
///
/// Rows are fully replaced on recomputation, never adjusted incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchScore {
    pub tenant_id: i64,
    pub user_id: i64,
    pub listing_id: i64,
    pub score: f64,
    pub distance_km: Option<f64>,
    pub tier: Tier,
    /// Mutual-exchange flag, layered over the tier rather than replacing it.
    pub mutual: bool,
    pub reasons: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFrequency {
    Instant,
    Daily,
    Weekly,
    Never,
}

impl NotificationFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationFrequency::Instant => "instant",
            NotificationFrequency::Daily => "daily",
            NotificationFrequency::Weekly => "weekly",
            NotificationFrequency::Never => "never",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "instant" => Some(NotificationFrequency::Instant),
            "daily" => Some(NotificationFrequency::Daily),
            "weekly" => Some(NotificationFrequency::Weekly),
            "never" => Some(NotificationFrequency::Never),
            _ => None,
        }
    }
}

pub const DEFAULT_MAX_DISTANCE_KM: f64 = 25.0;
pub const DEFAULT_MIN_MATCH_SCORE: f64 = 50.0;

/// Per-user matching preferences. Created lazily with these defaults on
/// first read; an empty category set means no category restriction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPreferences {
    pub tenant_id: i64,
    pub user_id: i64,
    pub max_distance_km: f64,
    pub min_match_score: f64,
    pub notification_frequency: NotificationFrequency,
    pub notify_hot_matches: bool,
    pub notify_mutual_matches: bool,
    pub categories: Vec<i64>,
}

impl MatchPreferences {
    /// The explicit default policy, merged at read time when no row exists.
    pub fn default_for(tenant_id: i64, user_id: i64) -> Self {
        Self {
            tenant_id,
            user_id,
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            min_match_score: DEFAULT_MIN_MATCH_SCORE,
            notification_frequency: NotificationFrequency::Daily,
            notify_hot_matches: true,
            notify_mutual_matches: true,
            categories: Vec::new(),
        }
    }

    /// Merge a partial update over the current values. Fields absent from
    /// the patch are left untouched.
    pub fn apply(&mut self, patch: &crate::models::PreferencesPatch) {
        if let Some(v) = patch.max_distance_km {
            self.max_distance_km = v;
        }
        if let Some(v) = patch.min_match_score {
            self.min_match_score = v;
        }
        if let Some(v) = patch.notification_frequency {
            self.notification_frequency = v;
        }
        if let Some(v) = patch.notify_hot_matches {
            self.notify_hot_matches = v;
        }
        if let Some(v) = patch.notify_mutual_matches {
            self.notify_mutual_matches = v;
        }
        if let Some(v) = &patch.categories {
            self.categories = v.clone();
        }
    }
}

/// Weights for the three scoring factors. Must sum to 1.0 for the composite
/// score to stay on the 0-100 scale when all factors are present.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub distance: f64,
    pub category: f64,
    pub behavior: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            distance: 0.40,
            category: 0.35,
            behavior: 0.25,
        }
    }
}

/// Tier boundaries and the mutual-match floor. Configuration, not business
/// law; these are the platform defaults.
#[derive(Debug, Clone, Copy)]
pub struct TierThresholds {
    pub hot: f64,
    pub good: f64,
    pub mutual_floor: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            hot: 80.0,
            good: 50.0,
            mutual_floor: 50.0,
        }
    }
}

/// Tunable scoring parameters.
#[derive(Debug, Clone, Copy)]
pub struct ScoreParams {
    /// Distance at which the distance factor decays to zero.
    pub horizon_km: f64,
    /// Score assigned when no factor is usable at all.
    pub baseline_score: f64,
    /// Hard cap applied to a listing the user has dismissed.
    pub dismissed_cap: f64,
    /// How far back interactions feed the behavioral factor.
    pub history_window_days: i64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            horizon_km: 50.0,
            baseline_score: 25.0,
            dismissed_cap: 10.0,
            history_window_days: 90,
        }
    }
}

/// Geospatial bounding box used as a cheap distance pre-filter.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// A classified, ready-to-serve match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMatch {
    #[serde(rename = "listingId")]
    pub listing_id: i64,
    #[serde(rename = "ownerId")]
    pub owner_id: i64,
    #[serde(rename = "categoryId")]
    pub category_id: i64,
    pub kind: ListingKind,
    pub score: f64,
    #[serde(rename = "distanceKm")]
    pub distance_km: Option<f64>,
    pub tier: Tier,
    pub mutual: bool,
    pub reasons: Vec<String>,
    #[serde(rename = "listingCreatedAt")]
    pub listing_created_at: DateTime<Utc>,
}
