//! Identity selection dialog.
//!
//! Thin front-end over the directory service and the impersonation handle:
//! lists candidate identities (never the current actor), filters them
//! incrementally, shows one candidate's organizational detail, and starts
//! impersonation exactly once per confirmed selection. The elevated-role
//! gate lives here, before the engine is ever invoked.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use crmlens_core_types::{IdentityId, LensError, Severity};
use host_bridge::{
    BridgeError, DirectoryService, DocumentPort, IdentityContext, IdentityProfile, IdentityRecord,
    NodeId, Notifier, OverlayNode,
};
use impersonation_engine::ImpersonationHandle;

/// Ceiling on any directory or capability fetch; a dialog must never hang
/// behind a promise that never resolves.
pub const LOAD_CEILING: Duration = Duration::from_secs(20);

const GATE_NOTIFICATION_DURATION_MS: u64 = 6_000;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("the host did not respond within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("impersonation could not be started: {0}")]
    Engine(LensError),
}

pub struct SelectionPanel {
    directory: Arc<dyn DirectoryService>,
    identity: Arc<dyn IdentityContext>,
    notifier: Arc<dyn Notifier>,
    document: Arc<dyn DocumentPort>,
    engine: Arc<dyn ImpersonationHandle>,
    dialog: Mutex<Option<NodeId>>,
}

impl SelectionPanel {
    pub fn new(
        directory: Arc<dyn DirectoryService>,
        identity: Arc<dyn IdentityContext>,
        notifier: Arc<dyn Notifier>,
        document: Arc<dyn DocumentPort>,
        engine: Arc<dyn ImpersonationHandle>,
    ) -> Self {
        Self {
            directory,
            identity,
            notifier,
            document,
            engine,
            dialog: Mutex::new(None),
        }
    }

    /// Opens the dialog (movable by its header) and returns the unfiltered
    /// candidate list.
    pub async fn open(&self) -> Result<Vec<IdentityRecord>, PanelError> {
        {
            let mut dialog = self.dialog.lock();
            if dialog.is_none() {
                let node = self
                    .document
                    .append_overlay(OverlayNode::dialog("Impersonate user"));
                self.document.make_movable(&node);
                *dialog = Some(node);
            }
        }
        self.candidates("").await
    }

    pub fn is_open(&self) -> bool {
        self.dialog.lock().is_some()
    }

    pub fn close(&self) {
        if let Some(node) = self.dialog.lock().take() {
            self.document.remove_node(&node);
        }
    }

    /// Active identities matching `filter`, excluding the current actor.
    /// Filtering is case-insensitive on the display name.
    pub async fn candidates(&self, filter: &str) -> Result<Vec<IdentityRecord>, PanelError> {
        let actor = self.identity.current_actor();
        let identities = bounded(self.directory.active_identities()).await?;
        let needle = filter.to_lowercase();
        Ok(identities
            .into_iter()
            .filter(|record| record.id != actor)
            .filter(|record| needle.is_empty() || record.display_name.to_lowercase().contains(&needle))
            .collect())
    }

    /// Organizational unit and role set for one candidate.
    pub async fn profile(&self, id: &IdentityId) -> Result<IdentityProfile, PanelError> {
        bounded(self.directory.identity_profile(id)).await
    }

    /// Confirms a selection. Gated on the elevated-role capability: without
    /// it the user is notified and the engine is never invoked. On success
    /// the engine is started exactly once and the dialog closes.
    pub async fn confirm(
        &self,
        target: IdentityId,
        display_name: &str,
    ) -> Result<bool, PanelError> {
        let elevated = bounded(self.identity.has_elevated_role()).await?;
        if !elevated {
            debug!(target: "selection-panel", "capability check failed; start withheld");
            self.notifier.notify(
                Severity::Warning,
                "Impersonation requires the System Administrator role",
                Some(GATE_NOTIFICATION_DURATION_MS),
            );
            return Ok(false);
        }

        self.engine
            .start(target, display_name)
            .await
            .map_err(PanelError::Engine)?;
        self.close();
        Ok(true)
    }
}

async fn bounded<T>(
    fut: impl std::future::Future<Output = Result<T, BridgeError>>,
) -> Result<T, PanelError> {
    match timeout(LOAD_CEILING, fut).await {
        Ok(result) => result.map_err(PanelError::from),
        Err(_) => Err(PanelError::Timeout(LOAD_CEILING)),
    }
}
