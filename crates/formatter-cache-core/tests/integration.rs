//! Integration tests for formatter-cache-core
//!
//! These tests drive the cache and the request layer end to end:
//! - Render coalescing and freshness validation
//! - Public variant derivation and the public fast read
//! - Failure propagation and the non-standard-parameter bypass
//! - Access checks, conditional requests and popularity counting

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use formatter_cache_core::{
    Access, CacheConfig, CacheStats, Caller, Catalog, ChangeSignal, Error, FormatParams, FormatRequest,
    FormatResponse, FormatService, FormatType, FormatterCache, Key, Operation, PublicRequest,
    Rendered, Renderer, RendererInfo, Result, ServiceConfig, Validator,
};

// =============================================================================
// Mock Renderer
// =============================================================================

/// Renderer that counts its invocations and returns output identifying the
/// key and the render number.
struct MockRenderer {
    renders: AtomicUsize,
    change_date: Mutex<DateTime<Utc>>,
    published: AtomicBool,
    fail: AtomicBool,
    panic_once: AtomicBool,
    delay: Duration,
    calls: Mutex<Vec<(Key, FormatParams)>>,
}

impl MockRenderer {
    fn new() -> Self {
        Self {
            renders: AtomicUsize::new(0),
            change_date: Mutex::new(at(100)),
            published: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            panic_once: AtomicBool::new(false),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn published(self) -> Self {
        self.published.store(true, Ordering::SeqCst);
        self
    }

    fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    fn set_change_date(&self, ts: DateTime<Utc>) {
        *self.change_date.lock().unwrap() = ts;
    }

    fn calls(&self) -> Vec<(Key, FormatParams)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    fn info(&self) -> RendererInfo {
        RendererInfo {
            name: "mock",
            remote: false,
        }
    }

    async fn render(&self, key: &Key, params: &FormatParams) -> Result<Rendered> {
        let n = self.renders.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.lock().unwrap().push((key.clone(), params.clone()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        assert!(
            !self.panic_once.swap(false, Ordering::SeqCst),
            "mock renderer crashed"
        );

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::RenderFailure {
                key: key.to_string(),
                reason: "mock failure".to_string(),
            });
        }

        let change_date = *self.change_date.lock().unwrap();
        Ok(Rendered {
            bytes: Bytes::from(format!(
                "record={} hide_withheld={} render={}",
                key.record_id, key.hide_withheld, n
            )),
            change_date,
            published: self.published.load(Ordering::SeqCst),
        })
    }
}

// =============================================================================
// Mock Catalog
// =============================================================================

const MISSING_RECORD: u64 = 404;
const EDITOR: &str = "Bearer editor";

struct MockCatalog {
    change: Mutex<Result<ChangeSignal>>,
    viewable: bool,
    popularity: AtomicUsize,
    popularity_fails: bool,
}

impl MockCatalog {
    fn changed_at(ts: DateTime<Utc>) -> Self {
        Self {
            change: Mutex::new(Ok(ChangeSignal::Changed(ts))),
            viewable: true,
            popularity: AtomicUsize::new(0),
            popularity_fails: false,
        }
    }

    fn views(&self) -> usize {
        self.popularity.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn resolve_uuid(&self, uuid: &str) -> Result<u64> {
        if uuid == "da165110-88fd-11da-a88f-000d939bc5d8" {
            Ok(7)
        } else {
            Err(Error::RecordNotFound(format!("uuid={uuid}")))
        }
    }

    async fn change_signal(&self, record_id: u64) -> Result<ChangeSignal> {
        if record_id == MISSING_RECORD {
            return Err(Error::RecordNotFound(format!("id = {record_id}")));
        }
        self.change.lock().unwrap().clone()
    }

    async fn check_access(
        &self,
        _record_id: u64,
        operation: Operation,
        caller: &Caller,
    ) -> Result<Access> {
        Ok(match operation {
            Operation::View => self.viewable.into(),
            Operation::Editing => (caller.authorization.as_deref() == Some(EDITOR)).into(),
        })
    }

    async fn increase_popularity(&self, _record_id: u64) -> Result<()> {
        if self.popularity_fails {
            return Err(Error::UpstreamRequest("popularity unavailable".to_string()));
        }
        self.popularity.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn private_key(record_id: u64) -> Key {
    Key::new(record_id, "eng", FormatType::Html, None, false)
}

fn test_cache() -> FormatterCache {
    FormatterCache::new(&CacheConfig::memory_only()).expect("Should create cache")
}

fn test_service(
    renderer: &Arc<MockRenderer>,
    catalog: &Arc<MockCatalog>,
) -> FormatService {
    FormatService::with_parts(
        test_cache(),
        Arc::clone(renderer) as Arc<dyn Renderer>,
        Arc::clone(catalog) as Arc<dyn Catalog>,
        &ServiceConfig::default(),
    )
}

fn stored_entries(stats: &CacheStats) -> u64 {
    stats.store.memory_entries + stats.store.disk_entries
}

fn rendered_bytes(response: FormatResponse) -> Bytes {
    match response {
        FormatResponse::Rendered { bytes, .. } => bytes,
        FormatResponse::NotModified { .. } => panic!("expected rendered output"),
    }
}

// =============================================================================
// Coalescing and Validation Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gets_render_once() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::slow(Duration::from_millis(100)));

    let requests = (0..16).map(|_| {
        let cache = cache.clone();
        let renderer = Arc::clone(&renderer) as Arc<dyn Renderer>;
        tokio::spawn(async move {
            cache
                .get(private_key(1), Validator::NoCache, renderer)
                .await
        })
    });

    let results = futures::future::join_all(requests).await;

    assert_eq!(renderer.renders(), 1, "Concurrent requests should share one render");
    let first = results[0].as_ref().unwrap().as_ref().unwrap().clone();
    for result in results {
        assert_eq!(result.unwrap().unwrap(), first, "Every waiter gets the same bytes");
    }
}

#[tokio::test]
async fn test_validator_gates_stored_entries() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::new());
    let dyn_renderer = Arc::clone(&renderer) as Arc<dyn Renderer>;

    let first = cache
        .get(private_key(1), Validator::ChangeDate(at(100)), Arc::clone(&dyn_renderer))
        .await
        .unwrap();
    assert_eq!(renderer.renders(), 1);

    // Entry at least as new as the reference is served
    let second = cache
        .get(private_key(1), Validator::ChangeDate(at(100)), Arc::clone(&dyn_renderer))
        .await
        .unwrap();
    assert_eq!(renderer.renders(), 1);
    assert_eq!(first, second);

    // A newer reference rejects it
    renderer.set_change_date(at(101));
    let third = cache
        .get(private_key(1), Validator::ChangeDate(at(101)), Arc::clone(&dyn_renderer))
        .await
        .unwrap();
    assert_eq!(renderer.renders(), 2);
    assert_ne!(second, third);

    // NoCache always renders
    cache
        .get(private_key(1), Validator::NoCache, dyn_renderer)
        .await
        .unwrap();
    assert_eq!(renderer.renders(), 3);
}

#[tokio::test]
async fn test_distinct_keys_render_separately() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::new()) as Arc<dyn Renderer>;

    let eng = private_key(1);
    let fre = Key::new(1, "fre", FormatType::Html, None, false);
    let xml = Key::new(1, "eng", FormatType::Xml, Some("full_view".to_string()), false);

    for key in [eng, fre, xml] {
        cache
            .get(key, Validator::ChangeDate(at(100)), Arc::clone(&renderer))
            .await
            .unwrap();
    }

    assert_eq!(cache.stats().await.renders, 3);
}

// =============================================================================
// Public Derivation Tests
// =============================================================================

#[tokio::test]
async fn test_published_record_derives_public_variant() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::new().published());

    cache
        .get(
            private_key(3),
            Validator::ChangeDate(at(100)),
            Arc::clone(&renderer) as Arc<dyn Renderer>,
        )
        .await
        .unwrap();
    cache.wait_for_derivations().await;

    assert_eq!(renderer.renders(), 2, "Public variant should be rendered once");
    let public = cache
        .get_published(&private_key(3))
        .await
        .expect("Public variant should be stored");
    assert!(String::from_utf8_lossy(&public).contains("hide_withheld=true"));

    let derived_key = &renderer.calls()[1].0;
    assert_eq!(derived_key, &private_key(3).public_variant());
}

#[tokio::test]
async fn test_unpublished_record_is_not_derived() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::new());

    cache
        .get(
            private_key(3),
            Validator::ChangeDate(at(100)),
            Arc::clone(&renderer) as Arc<dyn Renderer>,
        )
        .await
        .unwrap();
    cache.wait_for_derivations().await;

    assert_eq!(renderer.renders(), 1);
    assert!(cache.get_published(&private_key(3)).await.is_none());
}

#[tokio::test]
async fn test_unpublishing_evicts_public_variant() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::new().published());

    cache
        .get(
            private_key(3),
            Validator::ChangeDate(at(100)),
            Arc::clone(&renderer) as Arc<dyn Renderer>,
        )
        .await
        .unwrap();
    cache.wait_for_derivations().await;
    assert!(cache.get_published(&private_key(3)).await.is_some());

    // Public view privilege revoked, record edited
    renderer.published.store(false, Ordering::SeqCst);
    renderer.set_change_date(at(200));
    cache
        .get(
            private_key(3),
            Validator::ChangeDate(at(200)),
            Arc::clone(&renderer) as Arc<dyn Renderer>,
        )
        .await
        .unwrap();
    cache.wait_for_derivations().await;

    assert_eq!(renderer.renders(), 3, "No public variant derived for a private record");
    assert!(cache.get_published(&private_key(3)).await.is_none());
}

#[tokio::test]
async fn test_public_render_is_not_derived_again() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::new().published());

    cache
        .get(
            private_key(3).public_variant(),
            Validator::ChangeDate(at(100)),
            Arc::clone(&renderer) as Arc<dyn Renderer>,
        )
        .await
        .unwrap();
    cache.wait_for_derivations().await;

    assert_eq!(renderer.renders(), 1);
    assert!(cache.get_published(&private_key(3)).await.is_some());
}

#[tokio::test]
async fn test_derivation_disabled_by_config() {
    let config = CacheConfig {
        derive_public: false,
        ..CacheConfig::memory_only()
    };
    let cache = FormatterCache::new(&config).unwrap();
    let renderer = Arc::new(MockRenderer::new().published());

    cache
        .get(
            private_key(3),
            Validator::ChangeDate(at(100)),
            Arc::clone(&renderer) as Arc<dyn Renderer>,
        )
        .await
        .unwrap();
    cache.wait_for_derivations().await;

    assert_eq!(renderer.renders(), 1);
    assert!(cache.get_published(&private_key(3)).await.is_none());
}

#[tokio::test]
async fn test_get_published_never_renders() {
    let cache = test_cache();

    assert!(cache.get_published(&private_key(9)).await.is_none());

    let stats = cache.stats().await;
    assert_eq!(stats.renders, 0);
    assert_eq!(stored_entries(&stats), 0);
}

// =============================================================================
// Bypass and Failure Tests
// =============================================================================

#[tokio::test]
async fn test_render_direct_bypasses_storage() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::new().published());
    let params = FormatParams::new(vec![("view".to_string(), "advanced".to_string())]);

    cache
        .render_direct(&private_key(5), renderer.as_ref(), &params)
        .await
        .unwrap();
    cache
        .render_direct(&private_key(5), renderer.as_ref(), &params)
        .await
        .unwrap();
    cache.wait_for_derivations().await;

    assert_eq!(renderer.renders(), 2, "Bypass renders are never served from storage");
    assert_eq!(stored_entries(&cache.stats().await), 0);
    assert!(cache.get_published(&private_key(5)).await.is_none());
    assert_eq!(renderer.calls()[0].1, params);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_reaches_every_waiter_and_is_not_stored() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::slow(Duration::from_millis(100)));
    renderer.fail.store(true, Ordering::SeqCst);

    let requests = (0..8).map(|_| {
        let cache = cache.clone();
        let renderer = Arc::clone(&renderer) as Arc<dyn Renderer>;
        tokio::spawn(async move {
            cache
                .get(private_key(1), Validator::ChangeDate(at(100)), renderer)
                .await
        })
    });

    for result in futures::future::join_all(requests).await {
        assert!(matches!(result.unwrap(), Err(Error::RenderFailure { .. })));
    }
    assert_eq!(renderer.renders(), 1);

    // The failure was not cached
    renderer.fail.store(false, Ordering::SeqCst);
    cache
        .get(
            private_key(1),
            Validator::ChangeDate(at(100)),
            Arc::clone(&renderer) as Arc<dyn Renderer>,
        )
        .await
        .unwrap();
    assert_eq!(renderer.renders(), 2);
}

#[tokio::test]
async fn test_panicking_render_does_not_poison_key() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::new());
    renderer.panic_once.store(true, Ordering::SeqCst);

    let first = cache
        .get(
            private_key(1),
            Validator::ChangeDate(at(100)),
            Arc::clone(&renderer) as Arc<dyn Renderer>,
        )
        .await;
    assert!(matches!(first, Err(Error::RenderFailure { .. })));
    assert_eq!(cache.stats().await.in_flight, 0);

    let second = cache
        .get(
            private_key(1),
            Validator::ChangeDate(at(100)),
            Arc::clone(&renderer) as Arc<dyn Renderer>,
        )
        .await;
    assert!(second.is_ok(), "Next get should render afresh: {second:?}");
    assert_eq!(renderer.renders(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_render_timeout() {
    let config = CacheConfig {
        render_timeout_secs: 1,
        ..CacheConfig::memory_only()
    };
    let cache = FormatterCache::new(&config).unwrap();
    let renderer = Arc::new(MockRenderer::slow(Duration::from_secs(30))) as Arc<dyn Renderer>;

    let result = cache
        .get(private_key(1), Validator::ChangeDate(at(100)), renderer)
        .await;

    assert!(
        matches!(result, Err(Error::RenderTimeout { seconds: 1, .. })),
        "Expected timeout, got {result:?}"
    );
    assert_eq!(cache.stats().await.in_flight, 0);
}

// =============================================================================
// Storage Management Tests
// =============================================================================

#[tokio::test]
async fn test_policy_denied_keys_are_never_stored() {
    let mut config = CacheConfig::memory_only();
    config.policy.deny_format_types = vec![FormatType::Pdf];
    let cache = FormatterCache::new(&config).unwrap();
    let renderer = Arc::new(MockRenderer::new().published());
    let key = Key::new(1, "eng", FormatType::Pdf, None, false);

    for _ in 0..2 {
        cache
            .get(
                key.clone(),
                Validator::ChangeDate(at(100)),
                Arc::clone(&renderer) as Arc<dyn Renderer>,
            )
            .await
            .unwrap();
    }
    cache.wait_for_derivations().await;

    assert_eq!(renderer.renders(), 2);
    assert!(!cache.allows_caching(&key));
    assert!(cache.get_published(&key).await.is_none());
}

#[tokio::test]
async fn test_remove_record_drops_only_that_record() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::new());
    let dyn_renderer = Arc::clone(&renderer) as Arc<dyn Renderer>;
    let validator = Validator::ChangeDate(at(100));

    for id in [1, 2] {
        cache
            .get(private_key(id), validator, Arc::clone(&dyn_renderer))
            .await
            .unwrap();
    }
    cache.remove_record(1);

    cache.get(private_key(2), validator, Arc::clone(&dyn_renderer)).await.unwrap();
    assert_eq!(renderer.renders(), 2, "Record 2 should still be cached");

    cache.get(private_key(1), validator, dyn_renderer).await.unwrap();
    assert_eq!(renderer.renders(), 3, "Record 1 should render again");
}

#[tokio::test]
async fn test_clear_empties_storage() {
    let cache = test_cache();
    let renderer = Arc::new(MockRenderer::new());
    let dyn_renderer = Arc::clone(&renderer) as Arc<dyn Renderer>;
    let validator = Validator::ChangeDate(at(100));

    cache.get(private_key(1), validator, Arc::clone(&dyn_renderer)).await.unwrap();
    cache.clear();
    cache.get(private_key(1), validator, dyn_renderer).await.unwrap();

    assert_eq!(renderer.renders(), 2);
}

#[tokio::test]
async fn test_disk_only_tier_serves_entries() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
        memory_enabled: false,
        disk_path: Some(dir.path().join("formatter-cache")),
        derive_public: false,
        ..CacheConfig::default()
    };
    let cache = FormatterCache::new(&config).unwrap();
    let renderer = Arc::new(MockRenderer::new());
    let dyn_renderer = Arc::clone(&renderer) as Arc<dyn Renderer>;
    let validator = Validator::ChangeDate(at(100));

    let first = cache.get(private_key(1), validator, Arc::clone(&dyn_renderer)).await.unwrap();
    let second = cache.get(private_key(1), validator, dyn_renderer).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(renderer.renders(), 1);
    let stats = cache.stats().await;
    assert_eq!(stats.store.disk_entries, 1);
    assert_eq!(stats.store.memory_entries, 0);
}

// =============================================================================
// Request Layer Tests
// =============================================================================

#[tokio::test]
async fn test_service_serves_second_request_from_cache() {
    let renderer = Arc::new(MockRenderer::new());
    let catalog = Arc::new(MockCatalog::changed_at(at(100)));
    let service = test_service(&renderer, &catalog);

    let request = FormatRequest::new("eng", FormatType::Html).param("id", "1");
    let first = rendered_bytes(service.format(request.clone()).await.unwrap());
    let second = rendered_bytes(service.format(request).await.unwrap());

    assert_eq!(first, second);
    assert_eq!(renderer.renders(), 1);
    assert_eq!(catalog.views(), 2);
}

#[tokio::test]
async fn test_service_not_modified() {
    let renderer = Arc::new(MockRenderer::new());
    let change = Utc.timestamp_millis_opt(1_000_750).unwrap();
    let catalog = Arc::new(MockCatalog::changed_at(change));
    let service = test_service(&renderer, &catalog);

    // Sub-second part of the change date is ignored
    let request = FormatRequest::new("eng", FormatType::Html)
        .param("id", "1")
        .if_modified_since(at(1_000));
    let response = service.format(request).await.unwrap();

    assert_eq!(
        response,
        FormatResponse::NotModified {
            last_modified: at(1_000)
        }
    );
    assert_eq!(renderer.renders(), 0);
    assert_eq!(catalog.views(), 1);

    let stale = FormatRequest::new("eng", FormatType::Html)
        .param("id", "1")
        .if_modified_since(at(999));
    match service.format(stale).await.unwrap() {
        FormatResponse::Rendered {
            last_modified,
            format_type,
            ..
        } => {
            assert_eq!(last_modified, Some(at(1_000)));
            assert_eq!(format_type, FormatType::Html);
        }
        FormatResponse::NotModified { .. } => panic!("stale client copy must be re-sent"),
    }
}

#[tokio::test]
async fn test_service_not_modified_requires_cacheable_request() {
    let renderer = Arc::new(MockRenderer::new());
    let catalog = Arc::new(MockCatalog::changed_at(at(100)));
    let service = test_service(&renderer, &catalog);

    let request = FormatRequest::new("eng", FormatType::Html)
        .param("id", "1")
        .param("view", "advanced")
        .if_modified_since(at(200));
    let response = service.format(request).await.unwrap();

    assert!(matches!(response, FormatResponse::Rendered { .. }));
    let (_, params) = &renderer.calls()[0];
    assert_eq!(params.iter().collect::<Vec<_>>(), vec![("view", "advanced")]);
}

#[tokio::test]
async fn test_service_hide_withheld_decision() {
    let renderer = Arc::new(MockRenderer::new());
    let catalog = Arc::new(MockCatalog::changed_at(at(100)));
    let service = test_service(&renderer, &catalog);

    let anonymous = FormatRequest::new("eng", FormatType::Html).param("id", "1");
    let editor = anonymous.clone().caller(Caller::with_authorization(EDITOR));
    let editor_hiding = editor.clone().param("hide_withheld", "true");

    for request in [anonymous, editor, editor_hiding] {
        service.format(request).await.unwrap();
    }

    let hidden: Vec<bool> = renderer
        .calls()
        .iter()
        .map(|(key, _)| key.hide_withheld)
        .collect();
    // The editor's hiding request is a hit on the anonymous variant
    assert_eq!(hidden, vec![true, false]);
}

#[tokio::test]
async fn test_service_popularity_skipping() {
    let renderer = Arc::new(MockRenderer::new());
    let catalog = Arc::new(MockCatalog::changed_at(at(100)));
    let service = test_service(&renderer, &catalog);

    let request = FormatRequest::new("eng", FormatType::Html)
        .param("id", "1")
        .param("skipPopularity", "y");
    service.format(request).await.unwrap();

    assert_eq!(catalog.views(), 0);
    assert_eq!(renderer.renders(), 1, "skipPopularity is an allowed parameter");
}

#[tokio::test]
async fn test_service_popularity_failure_is_not_fatal() {
    let renderer = Arc::new(MockRenderer::new());
    let catalog = Arc::new(MockCatalog {
        popularity_fails: true,
        ..MockCatalog::changed_at(at(100))
    });
    let service = test_service(&renderer, &catalog);

    let request = FormatRequest::new("eng", FormatType::Html).param("id", "1");
    assert!(service.format(request).await.is_ok());
}

#[tokio::test]
async fn test_service_access_denied() {
    let renderer = Arc::new(MockRenderer::new());
    let catalog = Arc::new(MockCatalog {
        viewable: false,
        ..MockCatalog::changed_at(at(100))
    });
    let service = test_service(&renderer, &catalog);

    let request = FormatRequest::new("eng", FormatType::Html).param("id", "1");
    let result = service.format(request).await;

    assert!(matches!(result, Err(Error::AccessDenied { record_id: 1 })));
    assert_eq!(renderer.renders(), 0);
}

#[tokio::test]
async fn test_service_record_resolution() {
    let renderer = Arc::new(MockRenderer::new());
    let catalog = Arc::new(MockCatalog::changed_at(at(100)));
    let service = test_service(&renderer, &catalog);

    let by_uuid = FormatRequest::new("eng", FormatType::Xml)
        .param("uuid", "da165110-88fd-11da-a88f-000d939bc5d8");
    service.format(by_uuid).await.unwrap();
    assert_eq!(renderer.calls()[0].0.record_id, 7);

    let missing = FormatRequest::new("eng", FormatType::Xml);
    assert!(matches!(
        service.format(missing).await,
        Err(Error::MissingParameter(_))
    ));

    let malformed = FormatRequest::new("eng", FormatType::Xml).param("id", "seven");
    assert!(matches!(
        service.format(malformed).await,
        Err(Error::InvalidParameter { .. })
    ));

    let unknown = FormatRequest::new("eng", FormatType::Xml).param("uuid", "nope");
    assert!(matches!(
        service.format(unknown).await,
        Err(Error::RecordNotFound(_))
    ));

    let absent = FormatRequest::new("eng", FormatType::Xml)
        .param("id", MISSING_RECORD.to_string());
    assert!(matches!(
        service.format(absent).await,
        Err(Error::RecordNotFound(_))
    ));
}

#[tokio::test]
async fn test_service_unknown_change_date_disables_caching() {
    let renderer = Arc::new(MockRenderer::new());
    let catalog = Arc::new(MockCatalog::changed_at(at(100)));
    *catalog.change.lock().unwrap() = Ok(ChangeSignal::Unknown);
    let service = test_service(&renderer, &catalog);

    let request = FormatRequest::new("eng", FormatType::Html)
        .param("id", "1")
        .if_modified_since(at(10_000));
    for _ in 0..2 {
        let response = service.format(request.clone()).await.unwrap();
        assert!(matches!(
            response,
            FormatResponse::Rendered {
                last_modified: None,
                ..
            }
        ));
    }
    assert_eq!(renderer.renders(), 2);

    // A failed lookup degrades the same way
    *catalog.change.lock().unwrap() = Err(Error::UpstreamTimeout);
    service.format(request).await.unwrap();
    assert_eq!(renderer.renders(), 3);
}

#[tokio::test]
async fn test_service_public_read_after_editor_render() {
    let renderer = Arc::new(MockRenderer::new().published());
    let catalog = Arc::new(MockCatalog::changed_at(at(100)));
    let service = test_service(&renderer, &catalog);

    let public = PublicRequest::new("eng", FormatType::Html).param("id", "4");
    assert!(service.format_public(public.clone()).await.unwrap().is_none());

    let request = FormatRequest::new("eng", FormatType::Html)
        .param("id", "4")
        .caller(Caller::with_authorization(EDITOR));
    service.format(request).await.unwrap();
    service.cache().wait_for_derivations().await;

    let bytes = service.format_public(public).await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("hide_withheld=true"));
    assert_eq!(catalog.views(), 1, "Public reads are not counted");
}
