mod derive;
mod disk;
mod entry;
mod key;
mod memory;
mod store;
mod validator;

pub use disk::DiskStore;
pub use entry::CacheEntry;
pub use key::Key;
pub use memory::MemoryStore;
pub use store::{EntryStore, StoreStats};
pub use validator::Validator;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info};

use self::derive::Derivations;
use crate::config::{CacheConfig, CachePolicy};
use crate::error::{Error, Result};
use crate::render::{FormatParams, Rendered, Renderer};

type RenderFuture = Shared<BoxFuture<'static, Result<Bytes>>>;

/// A render some request is currently waiting on
struct InFlight {
    /// Distinguishes this render from a later one for the same key
    id: u64,
    render: RenderFuture,
}

/// Snapshot of cache state
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    #[serde(flatten)]
    pub store: StoreStats,
    /// Renders currently in flight
    pub in_flight: usize,
    /// Public derivations queued or running
    pub pending_derivations: usize,
    /// Renders performed since start
    pub renders: u64,
}

struct Inner {
    store: EntryStore,
    policy: CachePolicy,
    render_timeout: Option<Duration>,
    in_flight: Mutex<HashMap<Key, InFlight>>,
    next_id: AtomicU64,
    renders: AtomicU64,
    derivations: Option<Derivations>,
}

/// Cache of formatter output.
///
/// At most one render runs per key at any time: concurrent requests for a key
/// that is missing or stale join the render already in flight. Renders run on
/// their own task and store their result even if every requester goes away.
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct FormatterCache {
    inner: Arc<Inner>,
}

impl FormatterCache {
    /// Create a new cache from configuration
    pub fn new(config: &CacheConfig) -> Result<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::CacheInit(
                "formatter cache must be created inside a tokio runtime".to_string(),
            ));
        }

        let store = EntryStore::new(config)?;
        let render_timeout =
            (config.render_timeout_secs > 0).then(|| Duration::from_secs(config.render_timeout_secs));

        let inner = Arc::new_cyclic(|weak| Inner {
            store,
            policy: config.policy.clone(),
            render_timeout,
            in_flight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            renders: AtomicU64::new(0),
            derivations: config.derive_public.then(|| {
                Derivations::start(
                    weak.clone(),
                    config.derive_queue_size,
                    config.derive_concurrency,
                )
            }),
        });

        Ok(Self { inner })
    }

    /// Get the output for `key`, rendering it if storage has nothing the
    /// validator accepts.
    pub async fn get(
        &self,
        key: Key,
        validator: Validator,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Bytes> {
        self.inner.get(key, validator, renderer).await
    }

    /// Render with non-standard parameters. Storage is neither read nor
    /// written and no public variant is derived.
    pub async fn render_direct(
        &self,
        key: &Key,
        renderer: &dyn Renderer,
        params: &FormatParams,
    ) -> Result<Bytes> {
        debug!("Rendering {} outside the cache", key);
        let rendered = self.inner.render(key, renderer, params).await?;
        Ok(rendered.bytes)
    }

    /// Stored public variant of `key`, if it was rendered from a published
    /// record. Never renders.
    pub async fn get_published(&self, key: &Key) -> Option<Bytes> {
        self.inner
            .store
            .get(&key.public_variant())
            .await
            .filter(|entry| entry.published)
            .map(|entry| entry.bytes)
    }

    /// Whether the caching policy lets `key` be stored
    pub fn allows_caching(&self, key: &Key) -> bool {
        self.inner.policy.allow_caching(key)
    }

    /// Empty every storage tier and forget in-flight renders
    pub fn clear(&self) {
        self.inner.store.clear();
        self.inner.lock_in_flight().clear();
        info!("Formatter cache cleared");
    }

    /// Remove every stored variant of a record
    pub fn remove_record(&self, record_id: u64) {
        self.inner.store.remove_record(record_id);
        debug!("Removed cached output of record {}", record_id);
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            store: self.inner.store.stats().await,
            in_flight: self.inner.lock_in_flight().len(),
            pending_derivations: self
                .inner
                .derivations
                .as_ref()
                .map_or(0, Derivations::pending),
            renders: self.inner.renders.load(Ordering::Relaxed),
        }
    }

    /// Resolve once no public derivation is queued or running
    pub async fn wait_for_derivations(&self) {
        if let Some(ref derivations) = self.inner.derivations {
            derivations.wait_idle().await;
        }
    }
}

impl Inner {
    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<Key, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn get(
        self: &Arc<Self>,
        key: Key,
        validator: Validator,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Bytes> {
        if let Some(entry) = self.store.get(&key).await
            && validator.accepts(&entry)
        {
            debug!("Cache hit for {}", key);
            return Ok(entry.bytes);
        }

        self.join_or_start(key, validator, renderer).await
    }

    /// Join the render in flight for `key`, or start one
    fn join_or_start(
        self: &Arc<Self>,
        key: Key,
        validator: Validator,
        renderer: Arc<dyn Renderer>,
    ) -> RenderFuture {
        let mut in_flight = self.lock_in_flight();

        if let Some(existing) = in_flight.get(&key) {
            debug!("Joining in-flight render of {}", key);
            return existing.render.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let label = key.to_string();
        let task = tokio::spawn(Arc::clone(self).compute(id, key.clone(), validator, renderer));

        let render = async move {
            task.await.unwrap_or_else(|e| {
                Err(Error::RenderFailure {
                    key: label,
                    reason: format!("render task failed: {e}"),
                })
            })
        }
        .boxed()
        .shared();

        in_flight.insert(
            key,
            InFlight {
                id,
                render: render.clone(),
            },
        );
        render
    }

    /// Body of an in-flight render. Storage is written before the registry
    /// slot is released, so a request arriving in between finds the entry.
    /// A panicking renderer fails this attempt only; the slot is released
    /// either way.
    async fn compute(
        self: Arc<Self>,
        id: u64,
        key: Key,
        validator: Validator,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Bytes> {
        let result = AssertUnwindSafe(self.render_and_store(&key, validator, renderer))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let reason = panic_message(panic.as_ref());
                error!("Render of {} panicked: {}", key, reason);
                Err(Error::RenderFailure {
                    key: key.to_string(),
                    reason: format!("renderer panicked: {reason}"),
                })
            });

        {
            let mut in_flight = self.lock_in_flight();
            if in_flight.get(&key).is_some_and(|slot| slot.id == id) {
                in_flight.remove(&key);
            }
        }

        result
    }

    async fn render_and_store(
        &self,
        key: &Key,
        validator: Validator,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Bytes> {
        // A render that finished after our caller's miss may already be stored
        if let Some(entry) = self.store.get(key).await
            && validator.accepts(&entry)
        {
            debug!("Entry for {} stored while waiting", key);
            return Ok(entry.bytes);
        }

        let rendered = self
            .render(key, renderer.as_ref(), &FormatParams::default())
            .await?;

        if !self.policy.allow_caching(key) {
            debug!("Caching disabled for {}", key);
            return Ok(rendered.bytes);
        }

        self.store
            .insert(
                key,
                CacheEntry::new(rendered.bytes.clone(), rendered.change_date, rendered.published),
            )
            .await;

        if !key.hide_withheld {
            if rendered.published {
                if let Some(ref derivations) = self.derivations {
                    derivations.submit(key.public_variant(), rendered.change_date, renderer);
                }
            } else {
                // Anonymous readers must stop seeing a record that is no longer public
                self.store.remove(&key.public_variant()).await;
            }
        }

        Ok(rendered.bytes)
    }

    /// Run the renderer once, bounded by the render timeout
    async fn render(
        &self,
        key: &Key,
        renderer: &dyn Renderer,
        params: &FormatParams,
    ) -> Result<Rendered> {
        info!("Rendering {} with {}", key, renderer.name());
        self.renders.fetch_add(1, Ordering::Relaxed);

        let render = renderer.render(key, params);
        let result = match self.render_timeout {
            Some(limit) => tokio::time::timeout(limit, render)
                .await
                .unwrap_or_else(|_| {
                    Err(Error::RenderTimeout {
                        key: key.to_string(),
                        seconds: limit.as_secs(),
                    })
                }),
            None => render.await,
        };

        if let Err(ref e) = result {
            error!(
                record_id = key.record_id,
                language = %key.language,
                format_type = %key.format_type,
                formatter = key.formatter_id.as_deref().unwrap_or("default"),
                hide_withheld = key.hide_withheld,
                "Render failed: {}",
                e
            );
        }

        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
