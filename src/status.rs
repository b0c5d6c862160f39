use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// ServiceStatus
///
/// Freshness tier for a client, derived from the age of its most recent
/// visit. Serialized lowercase for the map UI's marker colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ServiceStatus {
    Never,
    Green,
    Orange,
    Red,
}

/// ServiceThresholds
///
/// Day thresholds separating the green/orange/red tiers. Stored as the
/// `service_status_thresholds` setting; a missing or corrupt value falls back
/// to the defaults (7, 14).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServiceThresholds {
    pub green_days: i64,
    pub orange_days: i64,
}

impl Default for ServiceThresholds {
    fn default() -> Self {
        Self {
            green_days: 7,
            orange_days: 14,
        }
    }
}

impl ServiceThresholds {
    /// Parses thresholds from a stored JSON setting value, tolerating any
    /// kind of corruption by returning the defaults.
    pub fn from_setting(value: Option<&str>) -> Self {
        value
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// Computes the freshness tier for a client given its most recent visit.
///
/// Age is measured in whole days between `now` and the visit: exactly
/// `green_days` days ago is still green, one day past each threshold tips
/// into the next tier. No visit at all is `Never`.
pub fn compute_service_status(
    last_visit: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    thresholds: ServiceThresholds,
) -> ServiceStatus {
    let Some(visited) = last_visit else {
        return ServiceStatus::Never;
    };
    let age_days = (now - visited).num_days();
    if age_days <= thresholds.green_days {
        ServiceStatus::Green
    } else if age_days <= thresholds.orange_days {
        ServiceStatus::Orange
    } else {
        ServiceStatus::Red
    }
}
