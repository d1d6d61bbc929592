use async_trait::async_trait;
use crmlens_core_types::{IdentityId, RecordRef, Severity};
use tokio::sync::broadcast;

use crate::errors::BridgeError;
use crate::model::{
    DomMutation, HttpRequest, HttpResponse, IdentityProfile, IdentityRecord, NodeId, OverlayNode,
};

/// The promise-style network primitive (the page's `fetch`).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BridgeError>;
}

/// One in-flight request through the legacy open/send primitive.
///
/// Headers may only be set between `open` and `send`; callers drive the three
/// calls in that order, mirroring the request-object API of the host page.
pub trait HostRequest: Send {
    fn open(&mut self, method: &str, url: &str);
    fn set_request_header(&mut self, name: &str, value: &str);
    fn send(&mut self, body: Option<String>);
}

/// Factory for legacy request objects (the page's request-object constructor).
pub trait RequestChannel: Send + Sync {
    fn open_request(&self) -> Box<dyn HostRequest>;
}

/// The document surface the toolkit injects overlays into.
pub trait DocumentPort: Send + Sync {
    fn append_overlay(&self, overlay: OverlayNode) -> NodeId;
    fn remove_node(&self, node: &NodeId) -> bool;
    fn contains(&self, node: &NodeId) -> bool;
    /// Makes a popup container draggable by its header. Banners position
    /// themselves statically and never use this.
    fn make_movable(&self, node: &NodeId);
    fn subscribe_mutations(&self) -> broadcast::Receiver<DomMutation>;
}

/// Host navigation and data-refresh primitive.
#[async_trait]
pub trait HostNavigator: Send + Sync {
    fn current_url(&self) -> Option<String>;
    /// Record currently open according to host page state, when the URL
    /// does not carry one.
    fn current_record(&self) -> Option<RecordRef>;
    async fn open_record(&self, record: &RecordRef) -> Result<(), BridgeError>;
    async fn refresh_data(&self) -> Result<(), BridgeError>;
}

/// Transient user-visible message sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, message: &str, duration_ms: Option<u64>);
}

/// Current actor and capability check.
#[async_trait]
pub trait IdentityContext: Send + Sync {
    fn current_actor(&self) -> IdentityId;
    /// Whether the acting user holds the elevated role required to
    /// impersonate.
    async fn has_elevated_role(&self) -> Result<bool, BridgeError>;
}

/// Organizational directory queries.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Active identities, disabled ones already excluded.
    async fn active_identities(&self) -> Result<Vec<IdentityRecord>, BridgeError>;
    async fn identity_profile(&self, id: &IdentityId) -> Result<IdentityProfile, BridgeError>;
}
