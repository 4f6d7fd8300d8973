use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static CACHE_LOOKUP_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("cache_lookup_total", "Cache lookups by result");
    let vec = IntCounterVec::new(opts, &["result"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_lookup_total");
    vec
});

static CACHE_STORE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter =
        IntCounter::new("cache_store_total", "Cache store calls").expect("create counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_store_total");
    counter
});

static CACHE_STORE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter =
        IntCounter::new("cache_store_errors_total", "Cache store errors").expect("create counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_store_errors_total");
    counter
});

static CACHE_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "cache_rejections_total",
        "Backpressure rejections by reason",
    );
    let vec = IntCounterVec::new(opts, &["reason"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_rejections_total");
    vec
});

static HANDLER_INVOCATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "handler_invocations_total",
        "Downstream handler invocations",
    )
    .expect("create counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register handler_invocations_total");
    counter
});

static POPULATIONS_INFLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("populations_inflight", "Populations currently owned")
        .expect("create gauge");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("register populations_inflight");
    gauge
});

static LOCK_POOL_FREE: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("lock_pool_free", "Free slots in the lock pool")
        .expect("create gauge");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("register lock_pool_free");
    gauge
});

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    CACHE_LOOKUP_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_cache_store() {
    CACHE_STORE_TOTAL.inc();
}

pub fn record_cache_store_error() {
    CACHE_STORE_ERRORS_TOTAL.inc();
}

pub fn record_rejection(reason: &str) {
    CACHE_REJECTIONS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_handler_invocation() {
    HANDLER_INVOCATIONS_TOTAL.inc();
}

pub fn inc_populations_inflight() {
    POPULATIONS_INFLIGHT.inc();
}

pub fn dec_populations_inflight() {
    POPULATIONS_INFLIGHT.dec();
}

pub fn set_lock_pool_free(free: usize) {
    LOCK_POOL_FREE.set(free as i64);
}

/// Render the registry in the text exposition format for whatever endpoint
/// the host wires up.
pub fn gather() -> Result<String> {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&metric_families, &mut buffer)
        .context("encoding metrics")?;
    String::from_utf8(buffer).context("metrics output was not utf-8")
}
