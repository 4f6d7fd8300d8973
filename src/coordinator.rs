use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use http::{StatusCode, header};
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::compress::{self, Compressor, GZIP};
use crate::entry::CachedEntry;
use crate::error::Rejection;
use crate::key;
use crate::metrics;
use crate::pool::{LockPool, Slot};
use crate::request::CacheRequest;
use crate::response::Response;
use crate::settings::Settings;
use crate::store::CacheStore;

/// The downstream request handler being cached.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, request: &CacheRequest) -> Result<Response>;
}

/// Orchestrates the per-request flow: key derivation, cache read, and on a
/// miss the owner/waiter arbitration that guarantees at most one concurrent
/// population per key while the lock pool bounds populations system-wide.
///
/// The lock pool and the ownership table are the only shared mutable state
/// and are touched exclusively through the acquire/register/release
/// sequence below.
pub struct CacheCoordinator {
    store: Arc<dyn CacheStore>,
    compressor: Compressor,
    pool: LockPool,
    inflight: Mutex<HashMap<String, Arc<Slot>>>,
    request_lock_timeout: Duration,
}

enum Admission<'a> {
    Owner(OwnerLease<'a>),
    Waiter(WaiterLease<'a>),
    Rejected(Rejection),
}

enum WaitOutcome {
    Released,
    TimedOut,
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, settings: &Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            store,
            compressor: Compressor::new(settings.compress_min_length),
            pool: LockPool::new(settings.lock_pool_capacity),
            inflight: Mutex::new(HashMap::new()),
            request_lock_timeout: settings.request_lock_timeout(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn free_slots(&self) -> usize {
        self.pool.free_slots()
    }

    pub fn inflight_keys(&self) -> usize {
        self.inflight.lock().len()
    }

    pub async fn handle(&self, request: &CacheRequest, handler: &dyn Handler) -> Result<Response> {
        let Some(key) = key::derive(request) else {
            // Non-cacheable request; the cache stays out of the way.
            metrics::record_handler_invocation();
            return handler.call(request).await;
        };

        loop {
            if let Some(entry) = self.read_entry(&key).await {
                match self.serve_hit(entry, request) {
                    Ok(response) => {
                        metrics::record_cache_lookup(true);
                        return Ok(response);
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to serve cached entry; repopulating");
                    }
                }
            }
            metrics::record_cache_lookup(false);

            match self.admit(&key).await? {
                Admission::Owner(lease) => {
                    return self.populate(request, handler, lease).await;
                }
                Admission::Waiter(waiter) => {
                    match waiter.wait(self.request_lock_timeout).await {
                        // The owner finished; the cache is very likely
                        // populated now. A waiter released into a
                        // non-cacheable population misses again and becomes
                        // a fresh owner attempt.
                        WaitOutcome::Released => continue,
                        WaitOutcome::TimedOut => {
                            return Ok(self.reject(Rejection::WaiterTimeout, &key));
                        }
                    }
                }
                Admission::Rejected(rejection) => {
                    return Ok(self.reject(rejection, &key));
                }
            }
        }
    }

    /// Arbitrate a miss: join an in-flight population as a waiter, or check
    /// a slot out of the pool and register as the owner for `key`.
    async fn admit(&self, key: &str) -> Result<Admission<'_>> {
        if let Some(waiter) = self.join_as_waiter(key) {
            return Ok(Admission::Waiter(waiter));
        }

        let Some(slot) = self.pool.acquire(self.request_lock_timeout).await else {
            return Ok(Admission::Rejected(Rejection::PoolExhausted));
        };

        let mut inflight = self.inflight.lock();
        if let Some(existing) = inflight.get(key) {
            // Another owner registered this key while we waited on the
            // pool; hand the slot straight back and join them.
            existing.add_holder();
            let waiter = WaiterLease {
                coordinator: self,
                slot: existing.clone(),
            };
            drop(inflight);
            if slot.drop_holder() {
                self.pool.release(slot);
            }
            return Ok(Admission::Waiter(waiter));
        }

        let guard = match slot.lock_handle().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                drop(inflight);
                if slot.drop_holder() {
                    self.pool.release(slot);
                }
                bail!("freshly pooled slot was already locked");
            }
        };
        inflight.insert(key.to_string(), slot.clone());
        drop(inflight);

        metrics::inc_populations_inflight();
        trace!(key, "became population owner");
        Ok(Admission::Owner(OwnerLease {
            coordinator: self,
            key: key.to_string(),
            slot,
            guard: Some(guard),
        }))
    }

    fn join_as_waiter(&self, key: &str) -> Option<WaiterLease<'_>> {
        let inflight = self.inflight.lock();
        let slot = inflight.get(key)?;
        // Registered under the table lock, so the holder count can never be
        // resurrected after the last holder returned the slot.
        slot.add_holder();
        Some(WaiterLease {
            coordinator: self,
            slot: slot.clone(),
        })
    }

    /// Owner path: invoke the downstream handler, cache a 200, pass every
    /// other status (and any handler error) through uncached. The lease
    /// releases the key and the slot on every exit path.
    async fn populate(
        &self,
        request: &CacheRequest,
        handler: &dyn Handler,
        lease: OwnerLease<'_>,
    ) -> Result<Response> {
        metrics::record_handler_invocation();
        let response = handler.call(request).await?;

        if response.status == StatusCode::OK {
            match self
                .compressor
                .for_storage(&response.headers, response.body.clone())
            {
                Ok(entry) => {
                    if let Err(err) = self.store.put(&lease.key, entry).await {
                        metrics::record_cache_store_error();
                        warn!(error = %err, "cache write failed; serving uncached response");
                    } else {
                        metrics::record_cache_store();
                    }
                }
                Err(err) => {
                    metrics::record_cache_store_error();
                    warn!(error = %err, "failed to prepare cache entry; serving uncached response");
                }
            }
        } else {
            trace!(status = %response.status, "non-cacheable status; passing through");
        }

        Ok(response)
    }

    async fn read_entry(&self, key: &str) -> Option<CachedEntry> {
        match self.store.get(key).await {
            Ok(entry) => entry,
            Err(err) => {
                // The cache backend being unavailable must never fail the
                // request itself.
                warn!(error = %err, "cache read failed; treating as miss");
                None
            }
        }
    }

    /// Write a hit out, undoing the cache's own gzip when the requester
    /// does not accept it. An encoding the downstream chose passes through
    /// as-is.
    fn serve_hit(&self, entry: CachedEntry, request: &CacheRequest) -> Result<Response> {
        let mut headers = entry.headers;
        let (body, encoding) = match entry.content_encoding.as_deref() {
            Some(GZIP) if !request.accepts_encoding(GZIP) => (compress::gunzip(&entry.body)?, None),
            other => (entry.body.clone(), other.map(str::to_string)),
        };
        if let Some(encoding) = &encoding {
            headers.insert(
                header::CONTENT_ENCODING,
                http::HeaderValue::from_str(encoding)?,
            );
        }
        headers.insert(
            header::CONTENT_LENGTH,
            http::HeaderValue::from(body.len() as u64),
        );
        Ok(Response::ok(headers, body))
    }

    fn reject(&self, rejection: Rejection, key: &str) -> Response {
        metrics::record_rejection(rejection.as_label());
        debug!(key, reason = rejection.as_label(), "rejecting under backpressure");
        Response::too_many_requests()
    }
}

/// Owner-side release guard. Dropping it (success, handler error, or the
/// owner's task unwinding) removes the ownership-table entry, wakes the
/// waiters, and returns the slot to the pool once the last holder is gone.
struct OwnerLease<'a> {
    coordinator: &'a CacheCoordinator,
    key: String,
    slot: Arc<Slot>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for OwnerLease<'_> {
    fn drop(&mut self) {
        self.coordinator.inflight.lock().remove(&self.key);
        // Unlock after the table entry is gone so woken waiters re-read the
        // cache instead of finding a stale registration.
        self.guard.take();
        if self.slot.drop_holder() {
            self.coordinator.pool.release(self.slot.clone());
        }
        metrics::dec_populations_inflight();
    }
}

/// Waiter-side release guard; keeps the slot out of the pool for as long as
/// this task might still be queued on its mutex.
struct WaiterLease<'a> {
    coordinator: &'a CacheCoordinator,
    slot: Arc<Slot>,
}

impl WaiterLease<'_> {
    async fn wait(&self, wait: Duration) -> WaitOutcome {
        match timeout(wait, self.slot.lock_handle().lock_owned()).await {
            Ok(_guard) => WaitOutcome::Released,
            Err(_) => WaitOutcome::TimedOut,
        }
    }
}

impl Drop for WaiterLease<'_> {
    fn drop(&mut self) {
        if self.slot.drop_holder() {
            self.coordinator.pool.release(self.slot.clone());
        }
    }
}
