//! Scripted impersonation walkthrough against the simulated host page.
//!
//! Wires the real engine stack (vault, interceptor, guardian, panel) to the
//! in-memory host and drives one full session: restore check, selection,
//! start, header verification, banner self-heal, stop.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crmlens_core_types::TabId;
use host_bridge::{
    DirectoryService, DocumentPort, HostNavigator, HttpRequest, IdentityContext, IdentityProfile,
    IdentityRecord, Notifier, SimulatedPage,
};
use impersonation_engine::{metrics, ImpersonationEngine, ImpersonationHandle};
use presence_guardian::PresenceGuardian;
use request_interceptor::RequestInterceptor;
use selection_panel::SelectionPanel;
use session_vault::{FileBackend, SessionVault};
use tokio::time::sleep;

use crate::config::ToolkitConfig;
use crate::errors::{CrmLensError, CrmLensResult};

const SETTLE: Duration = Duration::from_millis(50);

pub async fn run(config: &ToolkitConfig, storage_dir: Option<&Path>) -> CrmLensResult<()> {
    let storage_dir = storage_dir.unwrap_or(&config.storage_dir);
    let page = SimulatedPage::new();
    seed_host(&page);

    let tab = TabId::new();
    let vault = Arc::new(SessionVault::new(
        Arc::new(FileBackend::for_tab(storage_dir, &tab)),
        Arc::new(FileBackend::shared(storage_dir)),
    ));
    let interceptor = Arc::new(RequestInterceptor::new(
        page.globals(),
        config.interceptor(),
    ));
    let guardian = Arc::new(PresenceGuardian::new(
        Arc::clone(&page) as Arc<dyn DocumentPort>
    ));
    let engine = ImpersonationEngine::new(
        vault,
        interceptor,
        guardian,
        Arc::clone(&page) as Arc<dyn HostNavigator>,
        Arc::clone(&page) as Arc<dyn Notifier>,
    );

    let registry = prometheus::Registry::new();
    metrics::register_metrics(&registry);

    println!("== CrmLens demo (tab {tab}) ==");
    if engine
        .restore_on_load()
        .await
        .map_err(CrmLensError::Engine)?
    {
        println!("restored a persisted impersonation session");
    }

    let panel = SelectionPanel::new(
        Arc::clone(&page) as Arc<dyn DirectoryService>,
        Arc::clone(&page) as Arc<dyn IdentityContext>,
        Arc::clone(&page) as Arc<dyn Notifier>,
        Arc::clone(&page) as Arc<dyn DocumentPort>,
        Arc::clone(&engine) as Arc<dyn ImpersonationHandle>,
    );

    let candidates = panel.open().await?;
    println!("candidates ({}):", candidates.len());
    for record in &candidates {
        println!("  {} [{}]", record.display_name, record.id);
    }

    let target = candidates
        .first()
        .cloned()
        .ok_or_else(|| CrmLensError::Config("directory returned no candidates".into()))?;
    let profile = panel.profile(&target.id).await?;
    println!(
        "selected {} ({}; roles: {})",
        target.display_name,
        profile.business_unit,
        profile.roles.join(", ")
    );

    panel.confirm(target.id.clone(), &target.display_name).await?;
    println!("impersonation started");

    page.fetch(HttpRequest::get(
        "https://host.example/api/data/v9.2/accounts?$top=3",
    ))
    .await
    .map_err(|err| CrmLensError::Config(err.to_string()))?;
    page.fetch(HttpRequest::get("https://host.example/WebResources/help.html"))
        .await
        .map_err(|err| CrmLensError::Config(err.to_string()))?;
    for request in page.fetch_requests() {
        let injected = request
            .headers
            .get(&config.header_name)
            .map(|value| format!("{}: {value}", config.header_name))
            .unwrap_or_else(|| "no impersonation header".to_string());
        println!("  {} -> {injected}", request.url);
    }

    // A host re-render wipes the page body; the banner must come back.
    page.clear_body();
    sleep(SETTLE).await;
    println!(
        "banner after host re-render: {}",
        if page.banner_nodes().is_empty() {
            "missing"
        } else {
            "present"
        }
    );

    if let Some(banner) = page.banner_nodes().first() {
        page.click_stop(banner);
        sleep(SETTLE).await;
    }
    println!("impersonation active: {}", engine.is_active().await);
    for notification in page.notifications() {
        println!("  [{}] {}", notification.severity, notification.message);
    }

    let history = engine.history();
    println!("history ({} entries):", history.len());
    for entry in &history {
        println!(
            "  {} last used {}",
            entry.target_display_name,
            entry.last_used_at.to_rfc3339()
        );
    }

    let gathered = prometheus::TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap_or_default();
    println!("-- metrics --\n{gathered}");

    Ok(())
}

fn seed_host(page: &Arc<SimulatedPage>) {
    page.set_actor(crmlens_core_types::IdentityId::from("admin-0"));
    page.set_current_url(
        "https://host.example/main.aspx?etn=account&id=%7B8d3f1c9a-0002%7D&pagetype=entityrecord",
    );
    for (id, name, unit, roles, disabled) in [
        (
            "user-jd",
            "Jane Doe",
            "Sales",
            vec!["Salesperson", "Knowledge Manager"],
            false,
        ),
        ("user-jr", "John Roe", "Service", vec!["CSR"], false),
        ("user-ex", "Former Employee", "Sales", vec![], true),
        ("admin-0", "Admin Zero", "Head Office", vec!["System Administrator"], false),
    ] {
        page.seed_identity(
            IdentityRecord::new(crmlens_core_types::IdentityId::from(id), name),
            IdentityProfile {
                business_unit: unit.to_string(),
                roles: roles.into_iter().map(str::to_string).collect(),
            },
            disabled,
        );
    }
}
