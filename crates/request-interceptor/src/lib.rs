//! Identity-header interception over the page's network primitives.
//!
//! `install` captures the two page-global primitives and substitutes wrappers
//! that stamp the impersonation header onto calls bound for the host API
//! path; everything else passes through untouched. `uninstall` puts the
//! captured originals back exactly. Both directions are idempotent: the
//! installed-state mutex is the only mutation guard the page globals get.

pub mod config;

use std::sync::Arc;

use async_trait::async_trait;
use crmlens_core_types::IdentityId;
use parking_lot::Mutex;
use tracing::debug;

use host_bridge::{
    HostRequest, HttpRequest, HttpResponse, HttpTransport, PageGlobals, RequestChannel,
};

pub use crate::config::InterceptorConfig;

struct Captured {
    transport: Arc<dyn HttpTransport>,
    channel: Arc<dyn RequestChannel>,
    caller: IdentityId,
}

/// Installs and removes the identity-header wrappers on one page context.
pub struct RequestInterceptor {
    config: InterceptorConfig,
    globals: Arc<PageGlobals>,
    installed: Mutex<Option<Captured>>,
}

impl RequestInterceptor {
    pub fn new(globals: Arc<PageGlobals>, config: InterceptorConfig) -> Self {
        Self {
            config,
            globals,
            installed: Mutex::new(None),
        }
    }

    /// Wraps both primitives with header-injecting delegates for `caller`.
    ///
    /// Re-entrant calls while installed reuse the existing installation; the
    /// wrappers never stack.
    pub fn install(&self, caller: &IdentityId) {
        let mut slot = self.installed.lock();
        if slot.is_some() {
            debug!(target: "request-interceptor", "already installed; reusing existing wrappers");
            return;
        }
        let original_transport = self.globals.transport();
        let original_channel = self.globals.channel();

        self.globals
            .swap_transport(Arc::new(ImpersonatingTransport {
                inner: Arc::clone(&original_transport),
                config: self.config.clone(),
                caller: caller.clone(),
            }));
        self.globals.swap_channel(Arc::new(ImpersonatingChannel {
            inner: Arc::clone(&original_channel),
            config: self.config.clone(),
            caller: caller.clone(),
        }));

        *slot = Some(Captured {
            transport: original_transport,
            channel: original_channel,
            caller: caller.clone(),
        });
        debug!(target: "request-interceptor", caller = %caller, "wrappers installed");
    }

    /// Restores the captured originals; no-op when not installed.
    pub fn uninstall(&self) {
        let mut slot = self.installed.lock();
        let Some(captured) = slot.take() else {
            return;
        };
        self.globals.swap_transport(captured.transport);
        self.globals.swap_channel(captured.channel);
        debug!(target: "request-interceptor", caller = %captured.caller, "wrappers removed");
    }

    pub fn is_installed(&self) -> bool {
        self.installed.lock().is_some()
    }

    /// The identity currently being injected, when installed.
    pub fn caller(&self) -> Option<IdentityId> {
        self.installed
            .lock()
            .as_ref()
            .map(|captured| captured.caller.clone())
    }
}

fn targets_host_api(url: &str, config: &InterceptorConfig) -> bool {
    url.contains(&config.api_path_segment)
}

/// Promise-style wrapper: rewrites arguments synchronously, then delegates.
struct ImpersonatingTransport {
    inner: Arc<dyn HttpTransport>,
    config: InterceptorConfig,
    caller: IdentityId,
}

#[async_trait]
impl HttpTransport for ImpersonatingTransport {
    async fn execute(&self, mut request: HttpRequest) -> Result<HttpResponse, host_bridge::BridgeError> {
        if targets_host_api(&request.url, &self.config) {
            request.headers.set(&self.config.header_name, &self.caller.0);
        }
        self.inner.execute(request).await
    }
}

/// Legacy-factory wrapper: every request object it opens carries its own
/// captured URL.
struct ImpersonatingChannel {
    inner: Arc<dyn RequestChannel>,
    config: InterceptorConfig,
    caller: IdentityId,
}

impl RequestChannel for ImpersonatingChannel {
    fn open_request(&self) -> Box<dyn HostRequest> {
        Box::new(ImpersonatingRequest {
            inner: self.inner.open_request(),
            config: self.config.clone(),
            caller: self.caller.clone(),
            url: None,
        })
    }
}

/// Legacy request wrapper. The URL is captured at open time in this object,
/// so interleaved in-flight requests cannot corrupt each other; the header is
/// set on the inner object after open, immediately before send.
struct ImpersonatingRequest {
    inner: Box<dyn HostRequest>,
    config: InterceptorConfig,
    caller: IdentityId,
    url: Option<String>,
}

impl HostRequest for ImpersonatingRequest {
    fn open(&mut self, method: &str, url: &str) {
        self.url = Some(url.to_string());
        self.inner.open(method, url);
    }

    fn set_request_header(&mut self, name: &str, value: &str) {
        self.inner.set_request_header(name, value);
    }

    fn send(&mut self, body: Option<String>) {
        let inject = self
            .url
            .as_deref()
            .map(|url| targets_host_api(url, &self.config))
            .unwrap_or(false);
        if inject {
            self.inner
                .set_request_header(&self.config.header_name, &self.caller.0);
        }
        self.inner.send(body);
    }
}
