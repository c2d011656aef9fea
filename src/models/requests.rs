use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::domain::NotificationFrequency;

/// Partial update for a user's match preferences.
///
/// Absent fields leave the stored value untouched. Out-of-range values are
/// rejected, never clamped; the frequency field is a closed enum so unknown
/// values fail at deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PreferencesPatch {
    #[validate(range(min = 1.0, max = 500.0))]
    #[serde(rename = "maxDistanceKm", default)]
    pub max_distance_km: Option<f64>,
    #[validate(range(min = 1.0, max = 100.0))]
    #[serde(rename = "minMatchScore", default)]
    pub min_match_score: Option<f64>,
    #[serde(rename = "notificationFrequency", default)]
    pub notification_frequency: Option<NotificationFrequency>,
    #[serde(rename = "notifyHotMatches", default)]
    pub notify_hot_matches: Option<bool>,
    #[serde(rename = "notifyMutualMatches", default)]
    pub notify_mutual_matches: Option<bool>,
    #[serde(default)]
    pub categories: Option<Vec<i64>>,
}

/// Per-call overrides for suggestion queries. Fields left `None` fall back
/// to the user's stored preferences.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SuggestionOptions {
    #[serde(rename = "maxDistanceKm", default)]
    pub max_distance_km: Option<f64>,
    #[serde(rename = "minScore", default)]
    pub min_score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_patch_passes() {
        let patch = PreferencesPatch {
            max_distance_km: Some(10.0),
            min_match_score: Some(60.0),
            ..Default::default()
        };
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_distance_rejected() {
        let patch = PreferencesPatch {
            max_distance_km: Some(900.0),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_zero_score_rejected() {
        let patch = PreferencesPatch {
            min_match_score: Some(0.0),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_unknown_frequency_fails_deserialization() {
        let result: Result<PreferencesPatch, _> =
            serde_json::from_str(r#"{"notificationFrequency": "hourly"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_patch_is_valid() {
        assert!(PreferencesPatch::default().validate().is_ok());
    }
}
