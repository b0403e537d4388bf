//! Test stores and operations shared by the memoizer tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use obcache::{DeleteStatus, Store, StoreError};
use obcache_backend::StoreResult;
use obcache_core::{CacheKey, Raw};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub warmed: bool,
}

impl User {
    pub fn new(id: u64) -> Self {
        Self { id, warmed: false }
    }
}

/// Per-operation counters of a [`TestStore`].
#[derive(Debug, Default)]
pub struct StoreCounters {
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub expires: AtomicUsize,
    pub resets: AtomicUsize,
}

impl StoreCounters {
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

/// In-memory store answering every operation immediately.
///
/// Clones share entries and counters.
#[derive(Clone, Default)]
pub struct TestStore {
    entries: Arc<DashMap<CacheKey, Raw>>,
    pub counters: Arc<StoreCounters>,
}

impl TestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn raw(&self, key: &CacheKey) -> Option<Raw> {
        self.entries.get(key).map(|v| v.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl Store for TestStore {
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Raw>> {
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &CacheKey, value: Raw) -> StoreResult<()> {
        self.counters.sets.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(key.clone(), value);
        Ok(())
    }

    async fn expire(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        self.counters.expires.fetch_add(1, Ordering::SeqCst);
        Ok(match self.entries.remove(key) {
            Some(_) => DeleteStatus::Deleted(1),
            None => DeleteStatus::Missing,
        })
    }

    async fn reset(&self) -> StoreResult<()> {
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn key_count(&self) -> Option<u64> {
        Some(self.entries.len() as u64)
    }

    fn name(&self) -> &str {
        "test"
    }
}

/// Store whose every operation fails, like a disconnected remote store.
#[derive(Clone, Copy, Default)]
pub struct ErrorStore;

fn unreachable_error() -> StoreError {
    StoreError::Connection(Box::new(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "store unreachable",
    )))
}

#[async_trait]
impl Store for ErrorStore {
    async fn get(&self, _key: &CacheKey) -> StoreResult<Option<Raw>> {
        Err(unreachable_error())
    }

    async fn set(&self, _key: &CacheKey, _value: Raw) -> StoreResult<()> {
        Err(unreachable_error())
    }

    async fn expire(&self, _key: &CacheKey) -> StoreResult<DeleteStatus> {
        Err(unreachable_error())
    }

    async fn reset(&self) -> StoreResult<()> {
        Err(StoreError::Unsupported {
            operation: "reset",
            reason: "store unreachable",
        })
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "error"
    }
}

/// Delegates to a [`TestStore`] but takes `delay` to acknowledge every write.
#[derive(Clone)]
pub struct SlowWrites {
    pub inner: TestStore,
    delay: Duration,
}

impl SlowWrites {
    pub fn new(inner: TestStore, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl Store for SlowWrites {
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Raw>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Raw) -> StoreResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value).await
    }

    async fn expire(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        self.inner.expire(key).await
    }

    async fn reset(&self) -> StoreResult<()> {
        self.inner.reset().await
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "slow-writes"
    }
}

pub type LoadUser = BoxFuture<'static, Result<User, String>>;

/// Loads `User { id }` after `delay`, counting invocations.
pub fn load_user(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
) -> impl Fn((u64,)) -> LoadUser + Send + Sync + 'static {
    let calls = calls.clone();
    move |(id,)| {
        let calls = calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(User::new(id))
        })
    }
}

/// Fails with `"boom {id}"` after `delay`, counting invocations.
pub fn fail_user(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
) -> impl Fn((u64,)) -> LoadUser + Send + Sync + 'static {
    let calls = calls.clone();
    move |(id,)| {
        let calls = calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Err(format!("boom {id}"))
        })
    }
}

/// Lets the posted store write of a finished call land.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn count(calls: &Arc<AtomicUsize>) -> usize {
    calls.load(Ordering::SeqCst)
}
