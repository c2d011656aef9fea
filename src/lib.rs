//! Nexus Match - match scoring and recommendation engine
//!
//! Computes, caches, classifies and serves compatibility scores between a
//! user and candidate listings (offers/needs posted by other users) inside
//! a single tenant. Library-style service: callers hold a [`MatchEngine`]
//! and invoke it in-process.

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::Settings;
pub use core::{haversine_distance, MatchContext, Matcher};
pub use engine::MatchEngine;
pub use error::EngineError;
pub use models::{
    GroupedMatches, InteractionKind, Listing, ListingKind, MatchPreferences, MatchScore,
    MatchStats, PreferencesPatch, ScoredMatch, SuggestionOptions, TenantContext, Tier, User,
};
