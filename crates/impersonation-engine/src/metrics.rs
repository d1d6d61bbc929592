use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounter, Registry};
use tracing::error;

lazy_static! {
    static ref IMPERSONATION_STARTS: IntCounter = IntCounter::new(
        "crmlens_impersonation_starts_total",
        "Impersonation sessions started",
    )
    .unwrap();
    static ref IMPERSONATION_STOPS: IntCounter = IntCounter::new(
        "crmlens_impersonation_stops_total",
        "Impersonation sessions stopped",
    )
    .unwrap();
    static ref IMPERSONATION_RESTORES: IntCounter = IntCounter::new(
        "crmlens_impersonation_restores_total",
        "Impersonation sessions restored at page load",
    )
    .unwrap();
    static ref REFRESH_FALLBACKS: IntCounter = IntCounter::new(
        "crmlens_refresh_fallbacks_total",
        "Page refreshes that fell back to a generic data refresh",
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register engine metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, IMPERSONATION_STARTS.clone());
    register(registry, IMPERSONATION_STOPS.clone());
    register(registry, IMPERSONATION_RESTORES.clone());
    register(registry, REFRESH_FALLBACKS.clone());
}

pub fn record_start() {
    IMPERSONATION_STARTS.inc();
}

pub fn record_stop() {
    IMPERSONATION_STOPS.inc();
}

pub fn record_restore() {
    IMPERSONATION_RESTORES.inc();
}

pub fn record_refresh_fallback() {
    REFRESH_FALLBACKS.inc();
}
