//! In-memory stand-in for the hosted CRM page.
//!
//! Implements every port in this crate so the engine crates and the CLI demo
//! can run without a browser. Network primitives record what was delegated to
//! them; the document keeps overlay nodes in a map and publishes structural
//! mutations on a broadcast channel.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use crmlens_core_types::{IdentityId, RecordRef, Severity};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

use crate::errors::BridgeError;
use crate::globals::PageGlobals;
use crate::model::{
    DomMutation, HttpRequest, HttpResponse, IdentityProfile, IdentityRecord, NodeId, Notification,
    OverlayNode,
};
use crate::ports::{
    DirectoryService, DocumentPort, HostNavigator, HostRequest, HttpTransport, IdentityContext,
    Notifier, RequestChannel,
};

const MUTATION_BUS_CAPACITY: usize = 64;

/// Shared log of requests that reached the underlying promise-style primitive.
#[derive(Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<HttpRequest>>>);

impl RequestLog {
    pub fn snapshot(&self) -> Vec<HttpRequest> {
        self.0.lock().clone()
    }

    fn push(&self, request: HttpRequest) {
        self.0.lock().push(request);
    }
}

/// One request completed through the legacy open/send primitive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SentRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

#[derive(Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<SentRequest>>>);

impl SentLog {
    pub fn snapshot(&self) -> Vec<SentRequest> {
        self.0.lock().clone()
    }

    fn push(&self, request: SentRequest) {
        self.0.lock().push(request);
    }
}

/// Promise-style primitive that records every delegated request.
pub struct RecordingTransport {
    log: RequestLog,
}

impl RecordingTransport {
    pub fn new(log: RequestLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BridgeError> {
        self.log.push(request);
        Ok(HttpResponse::ok("{}"))
    }
}

/// Legacy request-object factory that records completed sends.
pub struct RecordingChannel {
    log: SentLog,
}

impl RecordingChannel {
    pub fn new(log: SentLog) -> Self {
        Self { log }
    }
}

impl RequestChannel for RecordingChannel {
    fn open_request(&self) -> Box<dyn HostRequest> {
        Box::new(RecordingRequest {
            log: self.log.clone(),
            method: String::new(),
            url: String::new(),
            headers: Vec::new(),
        })
    }
}

struct RecordingRequest {
    log: SentLog,
    method: String,
    url: String,
    headers: Vec<(String, String)>,
}

impl HostRequest for RecordingRequest {
    fn open(&mut self, method: &str, url: &str) {
        self.method = method.to_string();
        self.url = url.to_string();
    }

    fn set_request_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn send(&mut self, body: Option<String>) {
        self.log.push(SentRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
        });
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NavigationEvent {
    OpenedRecord(RecordRef),
    RefreshedData,
}

struct DirectoryEntry {
    record: IdentityRecord,
    profile: IdentityProfile,
    disabled: bool,
}

/// Simulated host page implementing all bridge ports.
pub struct SimulatedPage {
    globals: Arc<PageGlobals>,
    fetch_log: RequestLog,
    sent_log: SentLog,
    nodes: DashMap<NodeId, OverlayNode>,
    movable: Mutex<HashSet<NodeId>>,
    mutations: broadcast::Sender<DomMutation>,
    url: RwLock<Option<String>>,
    record: RwLock<Option<RecordRef>>,
    navigations: Mutex<Vec<NavigationEvent>>,
    notifications: Mutex<Vec<Notification>>,
    actor: RwLock<IdentityId>,
    elevated: RwLock<bool>,
    directory: RwLock<Vec<DirectoryEntry>>,
    navigation_available: RwLock<bool>,
}

impl SimulatedPage {
    pub fn new() -> Arc<Self> {
        let fetch_log = RequestLog::default();
        let sent_log = SentLog::default();
        let globals = PageGlobals::new(
            Arc::new(RecordingTransport::new(fetch_log.clone())),
            Arc::new(RecordingChannel::new(sent_log.clone())),
        );
        let (mutations, _) = broadcast::channel(MUTATION_BUS_CAPACITY);
        Arc::new(Self {
            globals,
            fetch_log,
            sent_log,
            nodes: DashMap::new(),
            movable: Mutex::new(HashSet::new()),
            mutations,
            url: RwLock::new(None),
            record: RwLock::new(None),
            navigations: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            actor: RwLock::new(IdentityId::new()),
            elevated: RwLock::new(true),
            directory: RwLock::new(Vec::new()),
            navigation_available: RwLock::new(true),
        })
    }

    pub fn globals(&self) -> Arc<PageGlobals> {
        Arc::clone(&self.globals)
    }

    /// Issues a request the way page code would: resolving the current
    /// promise-style primitive at call time.
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, BridgeError> {
        let transport = self.globals.transport();
        transport.execute(request).await
    }

    /// Creates a legacy request object from the current factory.
    pub fn open_request(&self) -> Box<dyn HostRequest> {
        self.globals.channel().open_request()
    }

    /// Activates an overlay's stop affordance, if it has one.
    pub fn click_stop(&self, node: &NodeId) -> bool {
        let Some(entry) = self.nodes.get(node) else {
            return false;
        };
        match &entry.stop {
            Some(tx) => tx.send(crate::model::StopRequest).is_ok(),
            None => false,
        }
    }

    /// Wipes every injected node, as a host re-render would.
    pub fn clear_body(&self) {
        self.nodes.clear();
        self.movable.lock().clear();
        let _ = self.mutations.send(DomMutation::BodyCleared);
    }

    pub fn overlay_text(&self, node: &NodeId) -> Option<String> {
        self.nodes.get(node).map(|entry| entry.text.clone())
    }

    pub fn banner_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|entry| matches!(entry.kind, crate::model::OverlayKind::Banner))
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn is_movable(&self, node: &NodeId) -> bool {
        self.movable.lock().contains(node)
    }

    pub fn movable_nodes(&self) -> Vec<NodeId> {
        self.movable.lock().iter().copied().collect()
    }

    pub fn set_current_url(&self, url: impl Into<String>) {
        *self.url.write() = Some(url.into());
    }

    pub fn set_current_record(&self, record: Option<RecordRef>) {
        *self.record.write() = record;
    }

    pub fn set_actor(&self, actor: IdentityId) {
        *self.actor.write() = actor;
    }

    pub fn set_elevated(&self, elevated: bool) {
        *self.elevated.write() = elevated;
    }

    /// Disables the navigation primitive so refresh attempts fail.
    pub fn set_navigation_available(&self, available: bool) {
        *self.navigation_available.write() = available;
    }

    pub fn seed_identity(
        &self,
        record: IdentityRecord,
        profile: IdentityProfile,
        disabled: bool,
    ) {
        self.directory.write().push(DirectoryEntry {
            record,
            profile,
            disabled,
        });
    }

    pub fn fetch_requests(&self) -> Vec<HttpRequest> {
        self.fetch_log.snapshot()
    }

    pub fn sent_requests(&self) -> Vec<SentRequest> {
        self.sent_log.snapshot()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn navigations(&self) -> Vec<NavigationEvent> {
        self.navigations.lock().clone()
    }
}

impl DocumentPort for SimulatedPage {
    fn append_overlay(&self, overlay: OverlayNode) -> NodeId {
        let id = NodeId::new();
        self.nodes.insert(id, overlay);
        let _ = self.mutations.send(DomMutation::NodeAppended(id));
        id
    }

    fn remove_node(&self, node: &NodeId) -> bool {
        let removed = self.nodes.remove(node).is_some();
        if removed {
            self.movable.lock().remove(node);
            let _ = self.mutations.send(DomMutation::NodeRemoved(*node));
        }
        removed
    }

    fn contains(&self, node: &NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    fn make_movable(&self, node: &NodeId) {
        if self.nodes.contains_key(node) {
            self.movable.lock().insert(*node);
        }
    }

    fn subscribe_mutations(&self) -> broadcast::Receiver<DomMutation> {
        self.mutations.subscribe()
    }
}

#[async_trait]
impl HostNavigator for SimulatedPage {
    fn current_url(&self) -> Option<String> {
        self.url.read().clone()
    }

    fn current_record(&self) -> Option<RecordRef> {
        self.record.read().clone()
    }

    async fn open_record(&self, record: &RecordRef) -> Result<(), BridgeError> {
        if !*self.navigation_available.read() {
            return Err(BridgeError::Navigation("navigation unavailable".into()));
        }
        debug!(target: "host-sim", record = %record, "opening record");
        self.navigations
            .lock()
            .push(NavigationEvent::OpenedRecord(record.clone()));
        Ok(())
    }

    async fn refresh_data(&self) -> Result<(), BridgeError> {
        if !*self.navigation_available.read() {
            return Err(BridgeError::Navigation("navigation unavailable".into()));
        }
        self.navigations.lock().push(NavigationEvent::RefreshedData);
        Ok(())
    }
}

impl Notifier for SimulatedPage {
    fn notify(&self, severity: Severity, message: &str, duration_ms: Option<u64>) {
        self.notifications.lock().push(Notification {
            severity,
            message: message.to_string(),
            duration_ms,
        });
    }
}

#[async_trait]
impl IdentityContext for SimulatedPage {
    fn current_actor(&self) -> IdentityId {
        self.actor.read().clone()
    }

    async fn has_elevated_role(&self) -> Result<bool, BridgeError> {
        Ok(*self.elevated.read())
    }
}

#[async_trait]
impl DirectoryService for SimulatedPage {
    async fn active_identities(&self) -> Result<Vec<IdentityRecord>, BridgeError> {
        Ok(self
            .directory
            .read()
            .iter()
            .filter(|entry| !entry.disabled)
            .map(|entry| entry.record.clone())
            .collect())
    }

    async fn identity_profile(&self, id: &IdentityId) -> Result<IdentityProfile, BridgeError> {
        self.directory
            .read()
            .iter()
            .find(|entry| &entry.record.id == id)
            .map(|entry| entry.profile.clone())
            .ok_or_else(|| BridgeError::Directory(format!("identity {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HeaderBag;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn fetch_reaches_recording_transport() {
        let page = SimulatedPage::new();
        let request = HttpRequest::get("https://host.example/api/data/v9.2/accounts")
            .with_headers(HeaderBag::from_pairs(&[("Accept", "application/json")]));
        let response = page.fetch(request.clone()).await.expect("fetch");
        assert_eq!(response.status, 200);
        assert_eq!(page.fetch_requests(), vec![request]);
    }

    #[tokio::test]
    async fn overlay_lifecycle_publishes_mutations() {
        let page = SimulatedPage::new();
        let mut rx = page.subscribe_mutations();
        let (stop_tx, _stop_rx) = mpsc::unbounded_channel();

        let node = page.append_overlay(OverlayNode::banner("acting as Jane", stop_tx));
        assert!(page.contains(&node));
        assert!(matches!(
            rx.recv().await.expect("mutation"),
            DomMutation::NodeAppended(_)
        ));

        assert!(page.remove_node(&node));
        assert!(!page.contains(&node));
        assert!(matches!(
            rx.recv().await.expect("mutation"),
            DomMutation::NodeRemoved(_)
        ));
    }

    #[tokio::test]
    async fn directory_excludes_disabled_identities() {
        let page = SimulatedPage::new();
        page.seed_identity(
            IdentityRecord::new(IdentityId::from("user-1"), "Jane Doe"),
            IdentityProfile {
                business_unit: "Sales".into(),
                roles: vec!["Salesperson".into()],
            },
            false,
        );
        page.seed_identity(
            IdentityRecord::new(IdentityId::from("user-2"), "Gone User"),
            IdentityProfile {
                business_unit: "Sales".into(),
                roles: vec![],
            },
            true,
        );

        let active = page.active_identities().await.expect("directory");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].display_name, "Jane Doe");
    }

    #[test]
    fn legacy_request_records_headers_between_open_and_send() {
        let page = SimulatedPage::new();
        let mut request = page.open_request();
        request.open("POST", "https://host.example/api/data/v9.2/contacts");
        request.set_request_header("Content-Type", "application/json");
        request.send(Some("{}".to_string()));

        let sent = page.sent_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, "POST");
        assert_eq!(
            sent[0].headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );
    }
}
