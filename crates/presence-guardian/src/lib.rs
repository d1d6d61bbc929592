//! Self-healing impersonation status banner.
//!
//! While a session is active, a fixed-position banner naming the impersonated
//! identity must exist in the document. The host application re-renders
//! aggressively and can wipe injected nodes, so the guardian pairs the banner
//! with a reconciler task subscribed to structural mutations: whenever the
//! banner is found missing, it is recreated with the same display name. The
//! banner's stop affordance only sends on a channel; session and interceptor
//! state are out of the guardian's reach.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use host_bridge::{DocumentPort, DomMutation, NodeId, OverlayNode, StopRequest};

struct ActiveBanner {
    node: Arc<Mutex<NodeId>>,
    display_name: String,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Renders the banner and re-asserts its presence against document churn.
pub struct PresenceGuardian {
    document: Arc<dyn DocumentPort>,
    active: Mutex<Option<ActiveBanner>>,
}

impl PresenceGuardian {
    pub fn new(document: Arc<dyn DocumentPort>) -> Self {
        Self {
            document,
            active: Mutex::new(None),
        }
    }

    /// Shows the banner for `display_name` and starts the watcher.
    ///
    /// Any prior banner and watcher are torn down first, so repeated calls
    /// leave exactly one of each.
    pub fn show(&self, display_name: &str, stop_tx: mpsc::UnboundedSender<StopRequest>) {
        let mut active = self.active.lock();
        if let Some(prior) = active.take() {
            Self::teardown(&self.document, prior);
        }

        // Subscribe before appending so a removal racing the append is
        // still observed.
        let rx = self.document.subscribe_mutations();
        let node = self
            .document
            .append_overlay(banner(display_name, stop_tx.clone()));
        let node = Arc::new(Mutex::new(node));

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(watch(
            Arc::clone(&self.document),
            Arc::clone(&node),
            display_name.to_string(),
            stop_tx,
            rx,
            shutdown.clone(),
        ));

        *active = Some(ActiveBanner {
            node,
            display_name: display_name.to_string(),
            shutdown,
            task,
        });
    }

    /// Disconnects the watcher and removes the banner; safe to call when
    /// neither exists.
    pub async fn hide(&self) {
        let banner = self.active.lock().take();
        let Some(banner) = banner else {
            return;
        };
        banner.shutdown.cancel();
        if let Err(err) = banner.task.await {
            if !err.is_cancelled() {
                warn!(target: "presence-guardian", %err, "banner watcher join failed");
            }
        }
        let node = *banner.node.lock();
        self.document.remove_node(&node);
        debug!(target: "presence-guardian", display_name = %banner.display_name, "banner hidden");
    }

    /// Whether a banner is currently shown and present in the document.
    pub fn is_visible(&self) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(banner) => self.document.contains(&banner.node.lock()),
            None => false,
        }
    }

    fn teardown(document: &Arc<dyn DocumentPort>, banner: ActiveBanner) {
        banner.shutdown.cancel();
        banner.task.abort();
        let node = *banner.node.lock();
        document.remove_node(&node);
    }
}

impl Drop for PresenceGuardian {
    fn drop(&mut self) {
        if let Some(banner) = self.active.lock().take() {
            banner.shutdown.cancel();
            banner.task.abort();
        }
    }
}

fn banner(display_name: &str, stop_tx: mpsc::UnboundedSender<StopRequest>) -> OverlayNode {
    OverlayNode::banner(format!("Impersonating {display_name}"), stop_tx)
}

async fn watch(
    document: Arc<dyn DocumentPort>,
    node: Arc<Mutex<NodeId>>,
    display_name: String,
    stop_tx: mpsc::UnboundedSender<StopRequest>,
    mut rx: broadcast::Receiver<DomMutation>,
    shutdown: CancellationToken,
) {
    debug!(target: "presence-guardian", %display_name, "banner watcher started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                break;
            }
            mutation = rx.recv() => {
                match mutation {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        reassert(&document, &node, &display_name, &stop_tx);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!(target: "presence-guardian", "mutation channel closed");
                        break;
                    }
                }
            }
        }
    }
    debug!(target: "presence-guardian", %display_name, "banner watcher exited");
}

/// Level-triggered reconciliation: the invariant is "banner present", checked
/// on every structural change rather than on the specific removal event.
fn reassert(
    document: &Arc<dyn DocumentPort>,
    node: &Arc<Mutex<NodeId>>,
    display_name: &str,
    stop_tx: &mpsc::UnboundedSender<StopRequest>,
) {
    let mut current = node.lock();
    if document.contains(&current) {
        return;
    }
    let fresh = document.append_overlay(banner(display_name, stop_tx.clone()));
    *current = fresh;
    debug!(target: "presence-guardian", %display_name, "banner reasserted after external removal");
}

#[cfg(test)]
mod tests {
    use super::*;
    use host_bridge::SimulatedPage;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    fn document(page: &Arc<SimulatedPage>) -> Arc<dyn DocumentPort> {
        Arc::clone(page) as Arc<dyn DocumentPort>
    }

    #[tokio::test]
    async fn banner_reappears_after_external_removal() {
        let page = SimulatedPage::new();
        let guardian = PresenceGuardian::new(document(&page));
        let (stop_tx, _stop_rx) = mpsc::unbounded_channel();

        guardian.show("Jane Doe", stop_tx);
        let original = page.banner_nodes();
        assert_eq!(original.len(), 1);

        page.remove_node(&original[0]);
        sleep(Duration::from_millis(50)).await;

        let recreated = page.banner_nodes();
        assert_eq!(recreated.len(), 1);
        assert_ne!(recreated[0], original[0]);
        assert_eq!(
            page.overlay_text(&recreated[0]).expect("banner text"),
            "Impersonating Jane Doe"
        );
        assert!(guardian.is_visible());

        guardian.hide().await;
    }

    #[tokio::test]
    async fn banner_survives_full_body_wipe() {
        let page = SimulatedPage::new();
        let guardian = PresenceGuardian::new(document(&page));
        let (stop_tx, _stop_rx) = mpsc::unbounded_channel();

        guardian.show("Jane Doe", stop_tx);
        page.clear_body();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(page.banner_nodes().len(), 1);
        guardian.hide().await;
    }

    #[tokio::test]
    async fn hide_removes_banner_and_stops_recreation() {
        let page = SimulatedPage::new();
        let guardian = PresenceGuardian::new(document(&page));
        let (stop_tx, _stop_rx) = mpsc::unbounded_channel();

        guardian.show("Jane Doe", stop_tx);
        guardian.hide().await;
        assert!(page.banner_nodes().is_empty());
        assert!(!guardian.is_visible());

        // Churn after hide must not resurrect the banner.
        let node = page.append_overlay(OverlayNode::dialog("unrelated"));
        page.remove_node(&node);
        sleep(Duration::from_millis(50)).await;
        assert!(page.banner_nodes().is_empty());

        // Hiding again is a no-op.
        guardian.hide().await;
    }

    #[tokio::test]
    async fn show_replaces_prior_banner() {
        let page = SimulatedPage::new();
        let guardian = PresenceGuardian::new(document(&page));
        let (stop_tx, _stop_rx) = mpsc::unbounded_channel();

        guardian.show("Jane Doe", stop_tx.clone());
        guardian.show("John Roe", stop_tx);
        sleep(Duration::from_millis(50)).await;

        let banners = page.banner_nodes();
        assert_eq!(banners.len(), 1);
        assert_eq!(
            page.overlay_text(&banners[0]).expect("banner text"),
            "Impersonating John Roe"
        );
        guardian.hide().await;
    }

    #[tokio::test]
    async fn stop_affordance_sends_on_channel() {
        let page = SimulatedPage::new();
        let guardian = PresenceGuardian::new(document(&page));
        let (stop_tx, mut stop_rx) = mpsc::unbounded_channel();

        guardian.show("Jane Doe", stop_tx);
        let banners = page.banner_nodes();
        assert!(page.click_stop(&banners[0]));
        assert!(stop_rx.recv().await.is_some());

        guardian.hide().await;
    }
}
