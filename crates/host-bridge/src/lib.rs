//! Ports onto the host CRM page.
//!
//! Everything the toolkit consumes from the hosted application crosses one of
//! the traits in this crate: the two network-call primitives, the document
//! overlay surface with structural-mutation notifications, navigation/refresh,
//! notifications, and the identity/directory services. [`sim::SimulatedPage`]
//! implements the full set in memory for unit tests and the CLI demo.

pub mod errors;
pub mod globals;
pub mod model;
pub mod ports;
pub mod sim;

pub use errors::BridgeError;
pub use globals::PageGlobals;
pub use model::{
    DomMutation, HeaderBag, HttpRequest, HttpResponse, IdentityProfile, IdentityRecord, NodeId,
    Notification, OverlayKind, OverlayNode, StopRequest,
};
pub use ports::{
    DirectoryService, DocumentPort, HostNavigator, HostRequest, HttpTransport, IdentityContext,
    Notifier, RequestChannel,
};
pub use sim::SimulatedPage;
