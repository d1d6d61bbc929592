use std::sync::Arc;

use parking_lot::RwLock;

use crate::ports::{HttpTransport, RequestChannel};

/// The page-global network primitives.
///
/// One instance exists per page context. The slots are swappable so a single
/// module (the request interceptor) can substitute wrapping primitives and
/// later restore the captured originals; everything else only reads.
pub struct PageGlobals {
    transport: RwLock<Arc<dyn HttpTransport>>,
    channel: RwLock<Arc<dyn RequestChannel>>,
}

impl PageGlobals {
    pub fn new(transport: Arc<dyn HttpTransport>, channel: Arc<dyn RequestChannel>) -> Arc<Self> {
        Arc::new(Self {
            transport: RwLock::new(transport),
            channel: RwLock::new(channel),
        })
    }

    /// The current promise-style primitive, as page code would resolve it.
    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport.read())
    }

    /// The current legacy request-object factory.
    pub fn channel(&self) -> Arc<dyn RequestChannel> {
        Arc::clone(&self.channel.read())
    }

    /// Replaces the promise-style primitive, returning the previous one.
    pub fn swap_transport(&self, next: Arc<dyn HttpTransport>) -> Arc<dyn HttpTransport> {
        std::mem::replace(&mut *self.transport.write(), next)
    }

    /// Replaces the legacy factory, returning the previous one.
    pub fn swap_channel(&self, next: Arc<dyn RequestChannel>) -> Arc<dyn RequestChannel> {
        std::mem::replace(&mut *self.channel.write(), next)
    }
}
