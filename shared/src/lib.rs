use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of field work recorded against a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Fertilizer,
    Pruning,
    Harvesting,
    Other,
}

impl ActivityType {
    /// Wire/storage name of the activity type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Fertilizer => "fertilizer",
            ActivityType::Pruning => "pruning",
            ActivityType::Harvesting => "harvesting",
            ActivityType::Other => "other",
        }
    }

    /// Human-readable name, used when no custom label applies.
    pub fn display_name(&self) -> &'static str {
        match self {
            ActivityType::Fertilizer => "Fertilizer Application",
            ActivityType::Pruning => "Pruning",
            ActivityType::Harvesting => "Harvesting",
            ActivityType::Other => "Other",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fertilizer" => Ok(ActivityType::Fertilizer),
            "pruning" => Ok(ActivityType::Pruning),
            "harvesting" => Ok(ActivityType::Harvesting),
            "other" => Ok(ActivityType::Other),
            other => Err(format!("unknown activity type: {}", other)),
        }
    }
}

/// One offline-captured activity waiting to be synced.
///
/// `tree_id` carries the QR-scanned external code (e.g. "TREE-001"), not a
/// database identifier. The date stays a string here; the server parses it
/// strictly as YYYY-MM-DD so a bad value fails that item alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingActivity {
    pub tree_id: String,
    pub activity_type: ActivityType,
    pub date: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    /// Custom label, meaningful only when `activity_type` is `other`.
    #[serde(default)]
    pub custom_type: Option<String>,
}

/// Body of POST /api/sync/.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub activities: Vec<PendingActivity>,
}

/// Result of a sync batch. `success` refers to the batch as a whole;
/// individual item failures are reported in `errors` and callers must
/// inspect them even when `success` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    pub synced_count: u32,
    pub errors: Vec<String>,
}

/// Tree resolved to its farm, as returned by the lookup endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeInfo {
    pub tree_id: String,
    pub farm_name: String,
    pub farm_id: i64,
}

/// Body of GET /api/trees/.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeListResponse {
    pub trees: Vec<TreeInfo>,
}

/// A synced activity flattened with its tree and farm, as returned by
/// GET /api/synced-activities/. Dates serialize as "YYYY-MM-DD" and
/// `created_at` as an ISO-8601 timestamp (or null).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub tree_id: String,
    pub farm_name: String,
    pub activity_type: ActivityType,
    pub custom_type: String,
    pub date: NaiveDate,
    pub quantity: String,
    pub notes: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl ActivityRecord {
    /// Label shown in listings: the custom label for an `other` activity
    /// when one was captured, the type's display name otherwise.
    pub fn display_label(&self) -> &str {
        if self.activity_type == ActivityType::Other && !self.custom_type.is_empty() {
            &self.custom_type
        } else {
            self.activity_type.display_name()
        }
    }
}

/// Body of GET /api/synced-activities/.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityListResponse {
    pub activities: Vec<ActivityRecord>,
}

/// Error body shared by the API endpoints (sync failures, unknown trees).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
