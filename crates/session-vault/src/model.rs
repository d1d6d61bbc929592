use chrono::{DateTime, Utc};
use crmlens_core_types::IdentityId;
use serde::{Deserialize, Serialize};

/// The per-tab session record: who the admin is currently acting as.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub target_id: IdentityId,
    pub target_display_name: String,
    pub started_at: DateTime<Utc>,
}

/// One row of the cross-tab recency list.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub target_id: IdentityId,
    pub target_display_name: String,
    pub last_used_at: DateTime<Utc>,
}
