use std::sync::{Arc, Weak};

use crmlens_core_types::{IdentityId, LensError, RecordRef, Severity};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use host_bridge::{HostNavigator, Notifier, StopRequest};
use presence_guardian::PresenceGuardian;
use request_interceptor::RequestInterceptor;
use session_vault::SessionVault;

use crate::metrics;
use crate::model::{EngineState, ImpersonationSession};

const STOP_NOTIFICATION_DURATION_MS: u64 = 4_000;

/// One engine exists per page context; constructed once and shared as the
/// process-wide handle.
pub struct ImpersonationEngine {
    vault: Arc<SessionVault>,
    interceptor: Arc<RequestInterceptor>,
    guardian: Arc<PresenceGuardian>,
    navigator: Arc<dyn HostNavigator>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<EngineState>,
    stop_tx: mpsc::UnboundedSender<StopRequest>,
    listener: SyncMutex<Option<JoinHandle<()>>>,
}

impl ImpersonationEngine {
    pub fn new(
        vault: Arc<SessionVault>,
        interceptor: Arc<RequestInterceptor>,
        guardian: Arc<PresenceGuardian>,
        navigator: Arc<dyn HostNavigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            vault,
            interceptor,
            guardian,
            navigator,
            notifier,
            state: Mutex::new(EngineState::Inactive),
            stop_tx,
            listener: SyncMutex::new(None),
        });
        let listener = tokio::spawn(listen(Arc::downgrade(&engine), stop_rx));
        *engine.listener.lock() = Some(listener);
        engine
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.is_active()
    }

    pub async fn session(&self) -> Option<ImpersonationSession> {
        self.state.lock().await.session().cloned()
    }

    pub fn history(&self) -> Vec<session_vault::HistoryEntry> {
        self.vault.history()
    }

    /// Begins impersonating `target`.
    ///
    /// An active session is fully stopped first (silently); identity changes
    /// never mutate an installed interceptor in place. The caller has already
    /// passed the elevated-capability gate.
    pub async fn start(&self, target: IdentityId, display_name: &str) -> Result<(), LensError> {
        let mut state = self.state.lock().await;
        if state.is_active() {
            self.stop_locked(&mut state, true).await;
        }

        self.interceptor.install(&target);
        let stored = self.vault.set_session(&target, display_name);
        self.vault.record_history(&target, display_name);
        self.guardian.show(display_name, self.stop_tx.clone());
        *state = EngineState::Active(stored.into());
        metrics::record_start();
        info!(target: "impersonation-engine", target_id = %target, %display_name, "impersonation started");
        drop(state);

        self.refresh_page().await;
        Ok(())
    }

    /// Ends the active session; a no-op when inactive.
    ///
    /// Silent stops skip the refresh and the notification; they are used when
    /// switching targets.
    pub async fn stop(&self, silent: bool) -> Result<(), LensError> {
        let mut state = self.state.lock().await;
        if !state.is_active() {
            return Ok(());
        }
        let ended = self.stop_locked(&mut state, silent).await;
        drop(state);

        if !silent {
            self.refresh_page().await;
            if let Some(session) = ended {
                self.notifier.notify(
                    Severity::Info,
                    &format!(
                        "Stopped impersonating {}",
                        session.target_display_name
                    ),
                    Some(STOP_NOTIFICATION_DURATION_MS),
                );
            }
        }
        Ok(())
    }

    /// Page-load-only transition: re-arms interceptor and banner from the
    /// persisted session, then refreshes so the first paint already reflects
    /// the impersonated identity. Returns whether a session was restored.
    pub async fn restore_on_load(&self) -> Result<bool, LensError> {
        let mut state = self.state.lock().await;
        if state.is_active() {
            return Ok(false);
        }
        let Some(stored) = self.vault.session() else {
            return Ok(false);
        };

        self.interceptor.install(&stored.target_id);
        self.guardian
            .show(&stored.target_display_name, self.stop_tx.clone());
        info!(
            target: "impersonation-engine",
            target_id = %stored.target_id,
            "impersonation restored from persisted session"
        );
        *state = EngineState::Active(stored.into());
        metrics::record_restore();
        drop(state);

        self.refresh_page().await;
        Ok(true)
    }

    /// Best-effort re-render of the host page under the current identity.
    ///
    /// Tries the record addressed by the URL, then host page state, then a
    /// generic data refresh. Failures are swallowed: refreshing is a
    /// convenience, not part of the impersonation guarantee.
    pub async fn refresh_page(&self) {
        let record = self
            .navigator
            .current_url()
            .and_then(|current| record_from_url(&current))
            .or_else(|| self.navigator.current_record());

        if let Some(record) = record {
            match self.navigator.open_record(&record).await {
                Ok(()) => return,
                Err(err) => {
                    debug!(target: "impersonation-engine", %err, record = %record, "record refresh failed; falling back");
                }
            }
        }
        metrics::record_refresh_fallback();
        if let Err(err) = self.navigator.refresh_data().await {
            debug!(target: "impersonation-engine", %err, "generic refresh failed; ignoring");
        }
    }

    /// Teardown half of a transition. Caller holds the state lock. Returns
    /// the session that was ended, if any.
    async fn stop_locked(
        &self,
        state: &mut EngineState,
        silent: bool,
    ) -> Option<ImpersonationSession> {
        let ended = state.session().cloned()?;
        self.interceptor.uninstall();
        self.vault.clear_session();
        self.guardian.hide().await;
        *state = EngineState::Inactive;
        metrics::record_stop();
        info!(
            target: "impersonation-engine",
            target_id = %ended.target_id,
            silent,
            "impersonation stopped"
        );
        Some(ended)
    }
}

impl Drop for ImpersonationEngine {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }
}

/// Consumes banner stop requests for as long as the engine is alive.
async fn listen(engine: Weak<ImpersonationEngine>, mut rx: mpsc::UnboundedReceiver<StopRequest>) {
    while rx.recv().await.is_some() {
        let Some(engine) = engine.upgrade() else {
            break;
        };
        if let Err(err) = engine.stop(false).await {
            debug!(target: "impersonation-engine", %err, "banner-initiated stop failed");
        }
    }
}

/// Extracts the open record from a host client URL of the form
/// `...main.aspx?etn=<entity>&id=<record-id>`.
fn record_from_url(current: &str) -> Option<RecordRef> {
    let parsed = Url::parse(current).ok()?;
    let mut entity = None;
    let mut id = None;
    for (name, value) in parsed.query_pairs() {
        match name.as_ref() {
            "etn" => entity = Some(value.into_owned()),
            "id" => id = Some(value.trim_matches(|c| c == '{' || c == '}').to_string()),
            _ => {}
        }
    }
    match (entity, id) {
        (Some(entity), Some(id)) if !entity.is_empty() && !id.is_empty() => {
            Some(RecordRef::new(entity, id))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use host_bridge::sim::NavigationEvent;
    use host_bridge::{HttpRequest, SimulatedPage};
    use request_interceptor::InterceptorConfig;
    use session_vault::{MemoryBackend, SessionVault};
    use std::time::Duration;
    use tokio::time::sleep;

    const API_URL: &str = "https://host.example/api/data/v9.2/accounts";
    const PLAIN_URL: &str = "https://host.example/WebResources/help.html";

    fn build_engine(page: &Arc<SimulatedPage>) -> Arc<ImpersonationEngine> {
        let backend = Arc::new(MemoryBackend::new());
        build_engine_with_vault(page, Arc::new(SessionVault::new(backend.clone(), backend)))
    }

    fn build_engine_with_vault(
        page: &Arc<SimulatedPage>,
        vault: Arc<SessionVault>,
    ) -> Arc<ImpersonationEngine> {
        let interceptor = Arc::new(RequestInterceptor::new(
            page.globals(),
            InterceptorConfig::default(),
        ));
        let guardian = Arc::new(PresenceGuardian::new(
            Arc::clone(page) as Arc<dyn host_bridge::DocumentPort>
        ));
        ImpersonationEngine::new(
            vault,
            interceptor,
            guardian,
            Arc::clone(page) as Arc<dyn HostNavigator>,
            Arc::clone(page) as Arc<dyn Notifier>,
        )
    }

    #[tokio::test]
    async fn start_persists_session_and_injects_header() {
        let page = SimulatedPage::new();
        let engine = build_engine(&page);

        engine
            .start(IdentityId::from("user-42"), "Jane Doe")
            .await
            .expect("start");

        let session = engine.session().await.expect("session");
        assert_eq!(session.target_id, IdentityId::from("user-42"));
        assert_eq!(session.target_display_name, "Jane Doe");
        let age = Utc::now() - session.started_at;
        assert!(age < chrono::Duration::seconds(5));

        page.fetch(HttpRequest::get(API_URL)).await.expect("fetch");
        page.fetch(HttpRequest::get(PLAIN_URL)).await.expect("fetch");
        let recorded = page.fetch_requests();
        assert_eq!(recorded[0].headers.get("MSCRMCallerID"), Some("user-42"));
        assert!(recorded[1].headers.get("MSCRMCallerID").is_none());

        assert!(engine.is_active().await);
        assert_eq!(page.banner_nodes().len(), 1);
    }

    #[tokio::test]
    async fn switching_targets_replaces_injection() {
        let page = SimulatedPage::new();
        let engine = build_engine(&page);

        engine
            .start(IdentityId::from("A"), "Alice")
            .await
            .expect("start A");
        engine
            .start(IdentityId::from("B"), "Bob")
            .await
            .expect("start B");

        let session = engine.session().await.expect("session");
        assert_eq!(session.target_id, IdentityId::from("B"));

        page.fetch(HttpRequest::get(API_URL)).await.expect("fetch");
        let recorded = page.fetch_requests();
        assert_eq!(recorded[0].headers.get("MSCRMCallerID"), Some("B"));

        // Exactly one banner, naming the new target; no stop notification
        // for the silent half of the switch.
        let banners = page.banner_nodes();
        assert_eq!(banners.len(), 1);
        assert_eq!(
            page.overlay_text(&banners[0]).expect("banner"),
            "Impersonating Bob"
        );
        assert!(page.notifications().is_empty());

        // History holds both targets, most recent first.
        let history = engine.history();
        assert_eq!(history[0].target_id, IdentityId::from("B"));
        assert_eq!(history[1].target_id, IdentityId::from("A"));
    }

    #[tokio::test]
    async fn stop_clears_session_banner_and_header() {
        let page = SimulatedPage::new();
        let engine = build_engine(&page);

        engine
            .start(IdentityId::from("user-1"), "One")
            .await
            .expect("start");
        engine.stop(false).await.expect("stop");

        assert!(!engine.is_active().await);
        assert!(engine.session().await.is_none());
        assert!(page.banner_nodes().is_empty());

        page.fetch(HttpRequest::get(API_URL)).await.expect("fetch");
        assert!(page.fetch_requests()[0]
            .headers
            .get("MSCRMCallerID")
            .is_none());

        let notifications = page.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].severity, Severity::Info);
        assert!(notifications[0].message.contains("One"));

        // Stopping again is a tolerated no-op.
        engine.stop(false).await.expect("stop again");
        assert_eq!(page.notifications().len(), 1);
    }

    #[tokio::test]
    async fn restore_on_load_rearms_from_persisted_session() {
        let page = SimulatedPage::new();
        let backend = Arc::new(MemoryBackend::new());
        let vault = Arc::new(SessionVault::new(backend.clone(), backend.clone()));
        vault.set_session(&IdentityId::from("user-7"), "Seven");

        let engine =
            build_engine_with_vault(&page, Arc::new(SessionVault::new(backend.clone(), backend)));
        let restored = engine.restore_on_load().await.expect("restore");
        assert!(restored);

        // The very first API-path call after restore carries the header.
        page.fetch(HttpRequest::get(API_URL)).await.expect("fetch");
        assert_eq!(
            page.fetch_requests()[0].headers.get("MSCRMCallerID"),
            Some("user-7")
        );
        assert_eq!(page.banner_nodes().len(), 1);
    }

    #[tokio::test]
    async fn restore_without_persisted_session_is_inert() {
        let page = SimulatedPage::new();
        let engine = build_engine(&page);
        let restored = engine.restore_on_load().await.expect("restore");
        assert!(!restored);
        assert!(!engine.is_active().await);
        assert!(page.banner_nodes().is_empty());
        assert!(page.navigations().is_empty());
    }

    #[tokio::test]
    async fn refresh_prefers_record_from_url() {
        let page = SimulatedPage::new();
        page.set_current_url(
            "https://host.example/main.aspx?etn=account&id=%7B11111111-2222%7D&pagetype=entityrecord",
        );
        let engine = build_engine(&page);
        engine
            .start(IdentityId::from("user-1"), "One")
            .await
            .expect("start");

        let navigations = page.navigations();
        assert_eq!(
            navigations,
            vec![NavigationEvent::OpenedRecord(RecordRef::new(
                "account",
                "11111111-2222"
            ))]
        );
    }

    #[tokio::test]
    async fn refresh_falls_back_to_generic_refresh() {
        let page = SimulatedPage::new();
        page.set_current_url("https://host.example/main.aspx?pagetype=dashboard");
        let engine = build_engine(&page);
        engine
            .start(IdentityId::from("user-1"), "One")
            .await
            .expect("start");

        assert_eq!(page.navigations(), vec![NavigationEvent::RefreshedData]);
    }

    #[tokio::test]
    async fn refresh_failure_never_surfaces() {
        let page = SimulatedPage::new();
        page.set_navigation_available(false);
        let engine = build_engine(&page);
        engine
            .start(IdentityId::from("user-1"), "One")
            .await
            .expect("start despite refresh failure");
        assert!(engine.is_active().await);
    }

    #[tokio::test]
    async fn banner_stop_affordance_drives_full_stop() {
        let page = SimulatedPage::new();
        let engine = build_engine(&page);
        engine
            .start(IdentityId::from("user-1"), "One")
            .await
            .expect("start");

        let banners = page.banner_nodes();
        assert!(page.click_stop(&banners[0]));
        sleep(Duration::from_millis(50)).await;

        assert!(!engine.is_active().await);
        assert!(page.banner_nodes().is_empty());
        assert_eq!(page.notifications().len(), 1);
    }
}
