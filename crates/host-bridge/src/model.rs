use std::collections::BTreeMap;
use std::fmt;

use crmlens_core_types::Severity;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Headers attached to an outgoing request.
///
/// The host page hands headers over in two shapes: a plain name/value map, or
/// an enumerable list of entries (the `Headers`-object form). Both shapes must
/// survive augmentation with all other entries untouched, so the bag keeps
/// whichever shape it was given.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum HeaderBag {
    Map(BTreeMap<String, String>),
    Entries(Vec<(String, String)>),
}

impl HeaderBag {
    pub fn empty() -> Self {
        Self::Map(BTreeMap::new())
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self::Entries(
            pairs
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        )
    }

    /// Case-insensitive header lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        match self {
            Self::Map(map) => map
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str()),
            Self::Entries(entries) => entries
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str()),
        }
    }

    /// Sets `name` to `value`, replacing an existing entry of the same name
    /// (case-insensitive) and leaving every other entry alone.
    pub fn set(&mut self, name: &str, value: &str) {
        match self {
            Self::Map(map) => {
                let existing = map
                    .keys()
                    .find(|key| key.eq_ignore_ascii_case(name))
                    .cloned();
                let key = existing.unwrap_or_else(|| name.to_string());
                map.insert(key, value.to_string());
            }
            Self::Entries(entries) => {
                if let Some(entry) = entries
                    .iter_mut()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                {
                    entry.1 = value.to_string();
                } else {
                    entries.push((name.to_string(), value.to_string()));
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Map(map) => map.len(),
            Self::Entries(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HeaderBag {
    fn default() -> Self {
        Self::empty()
    }
}

/// One outgoing request through the promise-style primitive.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: HeaderBag,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: HeaderBag::empty(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderBag) -> Self {
        self.headers = headers;
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Identifier of one overlay node appended to the document.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OverlayKind {
    Banner,
    Dialog,
}

/// Request sent when a user activates an overlay's stop affordance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StopRequest;

/// An injected node: fixed-position banner or popup dialog.
///
/// The optional `stop` sender is the overlay's only behavior; activating the
/// affordance sends on the channel and nothing else.
#[derive(Clone)]
pub struct OverlayNode {
    pub kind: OverlayKind,
    pub text: String,
    pub stop: Option<mpsc::UnboundedSender<StopRequest>>,
}

impl OverlayNode {
    pub fn banner(text: impl Into<String>, stop: mpsc::UnboundedSender<StopRequest>) -> Self {
        Self {
            kind: OverlayKind::Banner,
            text: text.into(),
            stop: Some(stop),
        }
    }

    pub fn dialog(text: impl Into<String>) -> Self {
        Self {
            kind: OverlayKind::Dialog,
            text: text.into(),
            stop: None,
        }
    }
}

impl fmt::Debug for OverlayNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayNode")
            .field("kind", &self.kind)
            .field("text", &self.text)
            .field("stop", &self.stop.is_some())
            .finish()
    }
}

/// Structural document change published to mutation subscribers.
#[derive(Clone, Debug)]
pub enum DomMutation {
    NodeAppended(NodeId),
    NodeRemoved(NodeId),
    BodyCleared,
}

/// Transient user-visible message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    pub duration_ms: Option<u64>,
}

/// Identity row as listed by the directory service.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: crmlens_core_types::IdentityId,
    pub display_name: String,
}

impl IdentityRecord {
    pub fn new(id: crmlens_core_types::IdentityId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// Organizational detail for one identity.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub business_unit: String,
    pub roles: Vec<String>,
}
