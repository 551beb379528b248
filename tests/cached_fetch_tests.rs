//! Integration Tests for Cached Fetch
//!
//! Drives the public `CacheService` API: memoization, expiry, failure
//! handling, invalidation and concurrent misses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tagcache::cache::{shared, CacheBackend, ManualClock, TagStore};
use tagcache::{CacheError, CachePreset, CacheService, Config, ParamValue};
use tokio_test::{assert_err, assert_ok};

// == Helper Types ==

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ByUser {
    user_id: u64,
}

/// Call counter shared between a test and the function it wraps.
#[derive(Clone, Default)]
struct Counter(Arc<AtomicUsize>);

impl Counter {
    fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

fn manual_service() -> (CacheService, ManualClock) {
    let clock = ManualClock::new(1_700_000_000_000);
    let service = CacheService::with_clock(&Config::default(), Arc::new(clock.clone()));
    (service, clock)
}

/// Backend whose every operation fails, standing in for an unreachable store.
struct UnreachableBackend;

#[async_trait]
impl CacheBackend for UnreachableBackend {
    async fn get(&self, _key: &str) -> tagcache::Result<Option<Value>> {
        Err(CacheError::Store("connection refused".to_string()))
    }

    async fn set(
        &self,
        _key: &str,
        _value: Value,
        _ttl: Option<Duration>,
        _tags: &[String],
    ) -> tagcache::Result<()> {
        Err(CacheError::Store("connection refused".to_string()))
    }

    async fn invalidate_keys(&self, _keys: &[String]) -> tagcache::Result<usize> {
        Err(CacheError::Store("connection refused".to_string()))
    }

    async fn invalidate_tags(&self, _tags: &[String]) -> tagcache::Result<usize> {
        Err(CacheError::Store("connection refused".to_string()))
    }
}

/// Backend that reads fine but refuses writes.
struct ReadOnlyBackend;

#[async_trait]
impl CacheBackend for ReadOnlyBackend {
    async fn get(&self, _key: &str) -> tagcache::Result<Option<Value>> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: Value,
        _ttl: Option<Duration>,
        _tags: &[String],
    ) -> tagcache::Result<()> {
        Err(CacheError::Store("read-only replica".to_string()))
    }

    async fn invalidate_keys(&self, _keys: &[String]) -> tagcache::Result<usize> {
        Ok(0)
    }

    async fn invalidate_tags(&self, _tags: &[String]) -> tagcache::Result<usize> {
        Ok(0)
    }
}

/// Application error type: wrapped functions keep their own errors.
#[derive(Debug, PartialEq)]
enum AppError {
    Db(String),
    Cache(String),
}

impl From<CacheError> for AppError {
    fn from(e: CacheError) -> Self {
        AppError::Cache(e.to_string())
    }
}

// == Memoization ==

#[tokio::test]
async fn test_constant_function_computed_once() {
    let (service, _clock) = manual_service();
    let calls = Counter::default();
    let counter = calls.clone();

    let answer = service.cached("answer", CachePreset::Short, move |_: ()| {
        counter.bump();
        async { Ok::<_, CacheError>(42) }
    });

    assert_eq!(assert_ok!(answer.call(()).await), 42);
    assert_eq!(assert_ok!(answer.call(()).await), 42);
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn test_same_args_hit_different_args_miss() {
    let (service, _clock) = manual_service();
    let calls = Counter::default();
    let counter = calls.clone();

    let get_user = service.cached("getUser", CachePreset::User, move |args: ByUser| {
        counter.bump();
        async move {
            Ok::<_, CacheError>(User {
                id: args.user_id,
                name: format!("user-{}", args.user_id),
            })
        }
    });

    let first = get_user.call(ByUser { user_id: 1 }).await.unwrap();
    let again = get_user.call(ByUser { user_id: 1 }).await.unwrap();
    let other = get_user.call(ByUser { user_id: 2 }).await.unwrap();

    assert_eq!(first, again);
    assert_eq!(other.id, 2);
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn test_functions_with_different_names_do_not_share_entries() {
    let (service, _clock) = manual_service();

    let a = service.cached("a", CachePreset::Short, |_: ()| async { Ok::<_, CacheError>(1) });
    let b = service.cached("b", CachePreset::Short, |_: ()| async { Ok::<_, CacheError>(2) });

    assert_eq!(a.call(()).await.unwrap(), 1);
    assert_eq!(b.call(()).await.unwrap(), 2);
}

// == Expiry ==

#[tokio::test]
async fn test_recomputes_after_revalidation_window() {
    let (service, clock) = manual_service();
    let calls = Counter::default();
    let counter = calls.clone();

    let settings = service.cached("settings", CachePreset::Static, move |_: ()| {
        let version = counter.bump();
        async move { Ok::<_, CacheError>(version) }
    });

    assert_eq!(settings.call(()).await.unwrap(), 0);

    clock.advance(CachePreset::Static.revalidate() - Duration::from_millis(1));
    assert_eq!(settings.call(()).await.unwrap(), 0);

    clock.advance(Duration::from_millis(1));
    assert_eq!(settings.call(()).await.unwrap(), 1, "stale value served past its window");
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn test_large_parameter_list_is_memoized() {
    let (service, _clock) = manual_service();
    let calls = Counter::default();
    let counter = calls.clone();

    let bulk = service.cached("bulkLookup", CachePreset::Medium, move |ids: Vec<u64>| {
        counter.bump();
        async move { Ok::<_, CacheError>(ids.len()) }
    });

    let ids: Vec<u64> = (1_000_000..1_000_600).collect();
    assert!(bulk.key_for(&ids).unwrap().len() > tagcache::cache::MAX_KEY_LENGTH);

    assert_eq!(assert_ok!(bulk.call(ids.clone()).await), 600);
    assert_eq!(assert_ok!(bulk.call(ids).await), 600);
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn test_many_static_tags_are_stored_and_invalidate() {
    let (service, _clock) = manual_service();
    let calls = Counter::default();
    let counter = calls.clone();

    let tags: Vec<String> = (0..tagcache::cache::MAX_TAGS_PER_ENTRY * 2)
        .map(|i| format!("region:{i}"))
        .collect();
    let report = service
        .cached("report", CachePreset::Long, move |_: ()| {
            counter.bump();
            async { Ok::<_, CacheError>("report".to_string()) }
        })
        .with_tags(tags);

    assert_ok!(report.call(()).await);
    assert_ok!(report.call(()).await);
    assert_eq!(calls.get(), 1);

    service.invalidate_by_tag(&["region:100"]).await.unwrap();
    assert_ok!(report.call(()).await);
    assert_eq!(calls.get(), 2);
}

// == Failures ==

#[tokio::test]
async fn test_failure_is_not_memoized() {
    let (service, _clock) = manual_service();
    let calls = Counter::default();
    let counter = calls.clone();

    let flaky = service.cached("flaky", CachePreset::Medium, move |_: ()| {
        let attempt = counter.bump();
        async move {
            if attempt == 0 {
                Err(AppError::Db("deadlock detected".to_string()))
            } else {
                Ok("recovered".to_string())
            }
        }
    });

    let err = assert_err!(flaky.call(()).await);
    assert_eq!(err, AppError::Db("deadlock detected".to_string()));

    assert_eq!(assert_ok!(flaky.call(()).await), "recovered");
    assert_eq!(assert_ok!(flaky.call(()).await), "recovered");
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn test_store_read_error_propagates_without_computing() {
    let service = CacheService::new(Arc::new(UnreachableBackend));
    let calls = Counter::default();
    let counter = calls.clone();

    let lookup = service.cached("lookup", CachePreset::Short, move |_: ()| {
        counter.bump();
        async { Ok::<_, AppError>(1) }
    });

    let err = assert_err!(lookup.call(()).await);
    assert!(matches!(err, AppError::Cache(msg) if msg.contains("connection refused")));
    assert_eq!(calls.get(), 0);
}

#[tokio::test]
async fn test_store_write_error_propagates() {
    let service = CacheService::new(Arc::new(ReadOnlyBackend));

    let lookup = service.cached("lookup", CachePreset::Short, |_: ()| async {
        Ok::<_, CacheError>(1)
    });

    let err = assert_err!(lookup.call(()).await);
    assert!(matches!(err, CacheError::Store(_)));
}

#[tokio::test]
async fn test_invalidation_store_error_propagates() {
    let service = CacheService::new(Arc::new(UnreachableBackend));

    assert!(matches!(
        service.invalidate_by_tag(&["user:1"]).await,
        Err(CacheError::Store(_))
    ));
    assert!(matches!(
        service.invalidate_by_key(&["k"]).await,
        Err(CacheError::Store(_))
    ));
    // Empty input never reaches the store
    let none: [&str; 0] = [];
    assert_ok!(service.invalidate_by_tag(&none).await);
}

// == Invalidation ==

#[tokio::test]
async fn test_invalidate_by_key_only_named_key() {
    let (service, _clock) = manual_service();
    let calls = Counter::default();
    let counter = calls.clone();

    let get_user = service.cached("getUser", CachePreset::Long, move |args: ByUser| {
        counter.bump();
        async move { Ok::<_, CacheError>(args.user_id) }
    });

    get_user.call(ByUser { user_id: 1 }).await.unwrap();
    get_user.call(ByUser { user_id: 2 }).await.unwrap();
    assert_eq!(calls.get(), 2);

    let key_one = get_user.key_for(&ByUser { user_id: 1 }).unwrap();
    service.invalidate_by_key(&[key_one]).await.unwrap();

    get_user.call(ByUser { user_id: 2 }).await.unwrap();
    assert_eq!(calls.get(), 2, "untouched key should still hit");

    get_user.call(ByUser { user_id: 1 }).await.unwrap();
    assert_eq!(calls.get(), 3, "invalidated key should recompute");
}

#[tokio::test]
async fn test_invalidate_by_tag_all_and_only() {
    let (service, _clock) = manual_service();
    let calls = Counter::default();
    let counter = calls.clone();

    let profile = service.cached("getProfile", CachePreset::User, move |args: ByUser| {
        counter.bump();
        async move { Ok::<_, CacheError>(format!("profile-{}", args.user_id)) }
    });

    profile.call(ByUser { user_id: 1 }).await.unwrap();
    profile.call(ByUser { user_id: 2 }).await.unwrap();
    assert_eq!(calls.get(), 2);

    service.invalidate_by_tag(&["user:1"]).await.unwrap();

    profile.call(ByUser { user_id: 2 }).await.unwrap();
    assert_eq!(calls.get(), 2);
    profile.call(ByUser { user_id: 1 }).await.unwrap();
    assert_eq!(calls.get(), 3);
}

#[tokio::test]
async fn test_tag_spans_functions() {
    let (service, _clock) = manual_service();
    let calls = Counter::default();

    let counter = calls.clone();
    let profile = service.cached("getProfile", CachePreset::User, move |_: ByUser| {
        counter.bump();
        async { Ok::<_, CacheError>("profile".to_string()) }
    });
    let counter = calls.clone();
    let policies = service.cached("listPolicies", CachePreset::Medium, move |_: ByUser| {
        counter.bump();
        async { Ok::<_, CacheError>(vec!["p1".to_string(), "p2".to_string()]) }
    });

    profile.call(ByUser { user_id: 7 }).await.unwrap();
    policies.call(ByUser { user_id: 7 }).await.unwrap();
    assert_eq!(calls.get(), 2);

    // Both presets tag per-user entries as user:{id}
    service
        .revalidate_preset(CachePreset::User, Some(&ParamValue::map().with("userId", 7)))
        .await
        .unwrap();

    profile.call(ByUser { user_id: 7 }).await.unwrap();
    policies.call(ByUser { user_id: 7 }).await.unwrap();
    assert_eq!(calls.get(), 4);
}

#[tokio::test]
async fn test_static_tags_invalidate_whole_function() {
    let (service, _clock) = manual_service();
    let calls = Counter::default();
    let counter = calls.clone();

    let quote = service
        .cached("quote", CachePreset::Long, move |args: ByUser| {
            counter.bump();
            async move { Ok::<_, CacheError>(args.user_id * 100) }
        })
        .with_tags(["quotes"]);

    quote.call(ByUser { user_id: 1 }).await.unwrap();
    quote.call(ByUser { user_id: 2 }).await.unwrap();

    service.invalidate_by_tag(&["quotes"]).await.unwrap();

    quote.call(ByUser { user_id: 1 }).await.unwrap();
    quote.call(ByUser { user_id: 2 }).await.unwrap();
    assert_eq!(calls.get(), 4);
}

#[tokio::test]
async fn test_invalidating_unknown_tags_and_keys_is_noop() {
    let (service, _clock) = manual_service();

    assert_ok!(service.invalidate_by_tag(&["nobody"]).await);
    assert_ok!(service.invalidate_by_key(&["nothing"]).await);
}

// == Concurrency ==

#[tokio::test]
async fn test_concurrent_misses_stampede_by_default() {
    let service = CacheService::in_memory(&Config::default());
    assert!(!service.single_flight());
    let calls = Counter::default();
    let counter = calls.clone();

    let slow = service.cached("slow", CachePreset::Short, move |_: ()| {
        counter.bump();
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, CacheError>("done".to_string())
        }
    });

    let (a, b) = tokio::join!(slow.call(()), slow.call(()));
    assert_eq!(a.unwrap(), "done");
    assert_eq!(b.unwrap(), "done");
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn test_single_flight_coalesces_concurrent_misses() {
    let config = Config {
        single_flight: true,
        ..Config::default()
    };
    let service = CacheService::in_memory(&config);
    assert!(service.single_flight());
    let calls = Counter::default();
    let counter = calls.clone();

    let slow = service.cached("slow", CachePreset::Short, move |_: ()| {
        counter.bump();
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, CacheError>("done".to_string())
        }
    });

    let (a, b, c) = tokio::join!(slow.call(()), slow.call(()), slow.call(()));
    assert_eq!(a.unwrap(), "done");
    assert_eq!(b.unwrap(), "done");
    assert_eq!(c.unwrap(), "done");
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn test_single_flight_failure_lets_waiter_retry() {
    let service = CacheService::new(shared(TagStore::new(100))).with_single_flight(true);
    let calls = Counter::default();
    let counter = calls.clone();

    let flaky = service.cached("flaky", CachePreset::Short, move |_: ()| {
        let attempt = counter.bump();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if attempt == 0 {
                Err(CacheError::Internal("first attempt fails".to_string()))
            } else {
                Ok(attempt)
            }
        }
    });

    let (a, b) = tokio::join!(flaky.call(()), flaky.call(()));
    assert!(a.is_err());
    assert_eq!(b.unwrap(), 1);
    assert_eq!(calls.get(), 2);
}
