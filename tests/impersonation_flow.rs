//! End-to-end impersonation scenarios over the simulated host page.

use std::path::Path;
use std::sync::Arc;

use crmlens_core_types::{IdentityId, TabId};
use host_bridge::{DocumentPort, HostNavigator, HttpRequest, Notifier, SimulatedPage};
use impersonation_engine::ImpersonationEngine;
use presence_guardian::PresenceGuardian;
use request_interceptor::RequestInterceptor;
use session_vault::{FileBackend, SessionVault};

use crmlens_cli::config::ToolkitConfig;

const API_URL: &str = "https://host.example/api/data/v9.2/accounts";

fn file_vault(storage: &Path, tab: &TabId) -> Arc<SessionVault> {
    Arc::new(SessionVault::new(
        Arc::new(FileBackend::for_tab(storage, tab)),
        Arc::new(FileBackend::shared(storage)),
    ))
}

fn build_engine(page: &Arc<SimulatedPage>, vault: Arc<SessionVault>) -> Arc<ImpersonationEngine> {
    let config = ToolkitConfig::default();
    let interceptor = Arc::new(RequestInterceptor::new(
        page.globals(),
        config.interceptor(),
    ));
    let guardian = Arc::new(PresenceGuardian::new(
        Arc::clone(page) as Arc<dyn DocumentPort>
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
async fn session_survives_page_reload() {
    let storage = tempfile::tempdir().expect("tempdir");
    let tab = TabId::new();

    // First page load: the admin starts impersonating and the tab goes away.
    {
        let page = SimulatedPage::new();
        let engine = build_engine(&page, file_vault(storage.path(), &tab));
        engine
            .start(IdentityId::from("user-7"), "Seven")
            .await
            .expect("start");
    }

    // Reload of the same tab: restore re-arms everything before any user
    // action, so the very first API-path call is already impersonated.
    let page = SimulatedPage::new();
    let engine = build_engine(&page, file_vault(storage.path(), &tab));
    let restored = engine.restore_on_load().await.expect("restore");
    assert!(restored);

    page.fetch(HttpRequest::get(API_URL)).await.expect("fetch");
    let recorded = page.fetch_requests();
    assert_eq!(recorded[0].headers.get("MSCRMCallerID"), Some("user-7"));
    assert_eq!(page.banner_nodes().len(), 1);

    // Stopping ends the session durably: a further reload restores nothing.
    engine.stop(false).await.expect("stop");
    let page = SimulatedPage::new();
    let engine = build_engine(&page, file_vault(storage.path(), &tab));
    assert!(!engine.restore_on_load().await.expect("restore"));
}

#[tokio::test]
async fn other_tabs_share_history_but_not_the_session() {
    let storage = tempfile::tempdir().expect("tempdir");
    let tab_a = TabId::new();
    let tab_b = TabId::new();

    {
        let page = SimulatedPage::new();
        let engine = build_engine(&page, file_vault(storage.path(), &tab_a));
        engine
            .start(IdentityId::from("user-1"), "One")
            .await
            .expect("start");
    }

    let page = SimulatedPage::new();
    let engine = build_engine(&page, file_vault(storage.path(), &tab_b));

    // The other tab sees the recency history...
    let history = engine.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].target_id, IdentityId::from("user-1"));

    // ...but no session bleeds across tabs.
    assert!(!engine.restore_on_load().await.expect("restore"));
    assert!(!engine.is_active().await);
}

#[tokio::test]
async fn legacy_channel_is_impersonated_after_restore() {
    let storage = tempfile::tempdir().expect("tempdir");
    let tab = TabId::new();

    {
        let page = SimulatedPage::new();
        let engine = build_engine(&page, file_vault(storage.path(), &tab));
        engine
            .start(IdentityId::from("user-9"), "Nine")
            .await
            .expect("start");
    }

    let page = SimulatedPage::new();
    let engine = build_engine(&page, file_vault(storage.path(), &tab));
    engine.restore_on_load().await.expect("restore");

    let mut request = page.open_request();
    request.open("GET", API_URL);
    request.send(None);

    let sent = page.sent_requests();
    assert_eq!(sent.len(), 1);
    assert!(sent[0]
        .headers
        .iter()
        .any(|(name, value)| name == "MSCRMCallerID" && value == "user-9"));
}
