//! Persisted impersonation state.
//!
//! Two records live behind this crate: the per-tab session ("who the admin is
//! currently acting as") and the cross-tab recency history. Both are stored as
//! JSON strings under fixed namespaced keys through a pluggable key-value
//! backend. Storage failures never propagate: a vault with a broken backend
//! still serves the current page lifetime, it just won't survive a reload.

pub mod backend;
pub mod model;

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crmlens_core_types::IdentityId;

pub use crate::backend::{FileBackend, KvBackend, MemoryBackend, VaultError};
pub use crate::model::{HistoryEntry, StoredSession};

/// Namespaced key of the per-tab session record.
pub const SESSION_KEY: &str = "crmlens.impersonation.session";
/// Namespaced key of the cross-tab history list.
pub const HISTORY_KEY: &str = "crmlens.impersonation.history";
/// Maximum number of history entries retained.
pub const HISTORY_CAP: usize = 10;

/// Durable store for the session record and the bounded history list.
pub struct SessionVault {
    tab: Arc<dyn KvBackend>,
    shared: Arc<dyn KvBackend>,
}

impl SessionVault {
    /// `tab` holds the per-tab session record; `shared` holds the cross-tab
    /// history list. Tests and single-tab tools may pass the same backend
    /// twice.
    pub fn new(tab: Arc<dyn KvBackend>, shared: Arc<dyn KvBackend>) -> Self {
        Self { tab, shared }
    }

    /// The persisted session, or `None` when missing or malformed.
    pub fn session(&self) -> Option<StoredSession> {
        let raw = match self.tab.read(SESSION_KEY) {
            Ok(value) => value?,
            Err(err) => {
                debug!(target: "session-vault", %err, "session read failed; treating as absent");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                debug!(target: "session-vault", %err, "session record malformed; treating as absent");
                None
            }
        }
    }

    /// Writes a fresh session record, replacing any prior one, and returns
    /// the record as written. The returned record is valid even when
    /// persistence failed.
    pub fn set_session(&self, target_id: &IdentityId, display_name: &str) -> StoredSession {
        let session = StoredSession {
            target_id: target_id.clone(),
            target_display_name: display_name.to_string(),
            started_at: Utc::now(),
        };
        match serde_json::to_string(&session) {
            Ok(raw) => {
                if let Err(err) = self.tab.write(SESSION_KEY, &raw) {
                    debug!(target: "session-vault", %err, "session write failed; continuing without persistence");
                }
            }
            Err(err) => {
                debug!(target: "session-vault", %err, "session serialization failed");
            }
        }
        session
    }

    /// Removes the session record; tolerates absence and backend failures.
    pub fn clear_session(&self) {
        if let Err(err) = self.tab.remove(SESSION_KEY) {
            debug!(target: "session-vault", %err, "session clear failed; ignoring");
        }
    }

    /// The persisted history, most-recently-used first; empty when missing
    /// or malformed.
    pub fn history(&self) -> Vec<HistoryEntry> {
        let raw = match self.shared.read(HISTORY_KEY) {
            Ok(Some(value)) => value,
            Ok(None) => return Vec::new(),
            Err(err) => {
                debug!(target: "session-vault", %err, "history read failed; treating as empty");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(target: "session-vault", %err, "history record malformed; treating as empty");
                Vec::new()
            }
        }
    }

    /// Upserts one target into the history: unique by id, moved to the
    /// front, list truncated to [`HISTORY_CAP`]. Read-modify-write without
    /// locking; last writer wins across tabs.
    pub fn record_history(&self, target_id: &IdentityId, display_name: &str) {
        let mut entries = self.history();
        entries.retain(|entry| &entry.target_id != target_id);
        entries.insert(
            0,
            HistoryEntry {
                target_id: target_id.clone(),
                target_display_name: display_name.to_string(),
                last_used_at: Utc::now(),
            },
        );
        entries.truncate(HISTORY_CAP);
        match serde_json::to_string(&entries) {
            Ok(raw) => {
                if let Err(err) = self.shared.write(HISTORY_KEY, &raw) {
                    debug!(target: "session-vault", %err, "history write failed; ignoring");
                }
            }
            Err(err) => {
                debug!(target: "session-vault", %err, "history serialization failed");
            }
        }
    }
}
