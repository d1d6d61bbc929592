use async_trait::async_trait;
use crmlens_core_types::{IdentityId, LensError};
use session_vault::HistoryEntry;

use crate::engine::ImpersonationEngine;
use crate::model::ImpersonationSession;

/// The process-wide impersonation handle.
///
/// The selection panel and every other tool integrate through this trait
/// only; nothing reaches the interceptor or the vault directly.
#[async_trait]
pub trait ImpersonationHandle: Send + Sync {
    async fn is_active(&self) -> bool;
    async fn session(&self) -> Option<ImpersonationSession>;
    async fn history(&self) -> Vec<HistoryEntry>;
    async fn start(&self, target: IdentityId, display_name: &str) -> Result<(), LensError>;
    async fn stop(&self, silent: bool) -> Result<(), LensError>;
    async fn restore_on_load(&self) -> Result<bool, LensError>;
    async fn refresh_page(&self);
}

#[async_trait]
impl ImpersonationHandle for ImpersonationEngine {
    async fn is_active(&self) -> bool {
        ImpersonationEngine::is_active(self).await
    }

    async fn session(&self) -> Option<ImpersonationSession> {
        ImpersonationEngine::session(self).await
    }

    async fn history(&self) -> Vec<HistoryEntry> {
        ImpersonationEngine::history(self)
    }

    async fn start(&self, target: IdentityId, display_name: &str) -> Result<(), LensError> {
        ImpersonationEngine::start(self, target, display_name).await
    }

    async fn stop(&self, silent: bool) -> Result<(), LensError> {
        ImpersonationEngine::stop(self, silent).await
    }

    async fn restore_on_load(&self) -> Result<bool, LensError> {
        ImpersonationEngine::restore_on_load(self).await
    }

    async fn refresh_page(&self) {
        ImpersonationEngine::refresh_page(self).await
    }
}
