// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    BoundingBox, Interaction, InteractionKind, InteractionSignal, Listing, ListingKind,
    ListingStatus, MatchPreferences, MatchScore, NotificationFrequency, ScoreParams, ScoredMatch,
    ScoringWeights, TenantContext, Tier, TierThresholds, User,
};
pub use requests::{PreferencesPatch, SuggestionOptions};
pub use responses::{GroupedMatches, InteractionStats, MatchStats, WarmupReport};
