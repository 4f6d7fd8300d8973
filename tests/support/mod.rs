#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use cachegate::{
    CacheCoordinator, CacheRequest, Handler, MemoryStore, Response, Settings,
};
use http::{HeaderMap, StatusCode};

/// Configurable downstream handler that counts its invocations.
pub struct MockHandler {
    calls: AtomicUsize,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    delay: Option<Duration>,
    fail: bool,
}

impl MockHandler {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            "text/plain".parse().expect("header value"),
        );
        Self {
            calls: AtomicUsize::new(0),
            status: StatusCode::OK,
            headers,
            body: body.into(),
            delay: None,
            fail: false,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = http::header::HeaderName::try_from(name).expect("header name");
        self.headers.insert(name, value.parse().expect("header value"));
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for MockHandler {
    async fn call(&self, _request: &CacheRequest) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("mock handler failure");
        }
        Ok(Response::new(
            self.status,
            self.headers.clone(),
            self.body.clone(),
        ))
    }
}

/// Installs a compact tracing subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cachegate=debug")),
        )
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init();
}

pub fn build_coordinator(capacity: usize, timeout_ms: u64) -> Arc<CacheCoordinator> {
    init_tracing();
    let settings = Settings {
        lock_pool_capacity: capacity,
        request_lock_timeout_ms: timeout_ms,
        ..Settings::default()
    };
    let store = Arc::new(
        MemoryStore::new(settings.store_max_entries, settings.store_entry_ttl())
            .expect("build store"),
    );
    Arc::new(CacheCoordinator::new(store, &settings).expect("build coordinator"))
}
