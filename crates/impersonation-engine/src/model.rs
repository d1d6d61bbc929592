use chrono::{DateTime, Utc};
use crmlens_core_types::IdentityId;
use serde::{Deserialize, Serialize};
use session_vault::StoredSession;

/// The active impersonation target, as held in memory by the engine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ImpersonationSession {
    pub target_id: IdentityId,
    pub target_display_name: String,
    pub started_at: DateTime<Utc>,
}

impl From<StoredSession> for ImpersonationSession {
    fn from(stored: StoredSession) -> Self {
        Self {
            target_id: stored.target_id,
            target_display_name: stored.target_display_name,
            started_at: stored.started_at,
        }
    }
}

/// Lifecycle state of the engine.
#[derive(Clone, Debug)]
pub enum EngineState {
    Inactive,
    Active(ImpersonationSession),
}

impl EngineState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    pub fn session(&self) -> Option<&ImpersonationSession> {
        match self {
            Self::Active(session) => Some(session),
            Self::Inactive => None,
        }
    }
}
