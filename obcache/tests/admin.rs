//! Warmup, invalidation and the handles they validate.

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use obcache::{CacheError, DeleteStatus, Memoizer, StoreError, WrapOptions};
use pretty_assertions::assert_eq;

use common::{ErrorStore, TestStore, User, count, load_user};

#[tokio::test]
async fn test_warmup_serves_value_without_invoking() {
    let memoizer = Memoizer::new(TestStore::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let load = memoizer.wrap(load_user(&calls, Duration::ZERO));

    let warmed = User { id: 1, warmed: true };
    memoizer.warmup(&load, &(1,), &warmed).await.unwrap();

    assert_eq!(load.call((1,)).await.unwrap(), warmed);
    assert_eq!(count(&calls), 0);
    assert_eq!(memoizer.stats().miss, 0);
    assert_eq!(memoizer.stats().hit, 1);
}

#[tokio::test]
async fn test_warmup_respects_skip_positions() {
    let memoizer = Memoizer::new(TestStore::new());
    let load = memoizer.wrap_with(
        |(id, _trace): (u64, String)| async move { Ok::<_, String>(User::new(id)) },
        WrapOptions::new().skip([1]),
    );

    let warmed = User { id: 4, warmed: true };
    memoizer
        .warmup(&load, &(4, "warmup".to_string()), &warmed)
        .await
        .unwrap();

    assert_eq!(load.call((4, "request".to_string())).await.unwrap(), warmed);
}

#[tokio::test]
async fn test_invalidate_forces_recomputation() {
    let memoizer = Memoizer::new(TestStore::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let load = memoizer.wrap(load_user(&calls, Duration::ZERO));

    load.call((1,)).await.unwrap();
    assert_eq!(
        memoizer.invalidate(&load, &(1,)).await.unwrap(),
        DeleteStatus::Deleted(1)
    );
    load.call((1,)).await.unwrap();

    assert_eq!(count(&calls), 2);
    assert_eq!(memoizer.stats().miss, 2);
    assert_eq!(
        memoizer.invalidate(&load, &(2,)).await.unwrap(),
        DeleteStatus::Missing
    );
}

#[tokio::test]
async fn test_operations_from_another_memoizer_are_rejected() {
    let memoizer = Memoizer::new(TestStore::new());
    let other = Memoizer::new(TestStore::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let foreign = other.wrap(load_user(&calls, Duration::ZERO));

    let err = memoizer
        .warmup(&foreign, &(1,), &User::new(1))
        .await
        .unwrap_err();
    assert!(matches!(&err, CacheError::InvalidOperation { id } if id == foreign.id()));

    let err = memoizer.invalidate(&foreign, &(1,)).await.unwrap_err();
    assert!(matches!(err, CacheError::InvalidOperation { .. }));
    assert_eq!(
        err.to_string(),
        format!("operation `{}` was not created by this memoizer", foreign.id())
    );
}

#[tokio::test]
async fn test_clones_share_state() {
    let memoizer = Memoizer::new(TestStore::new());
    let handle = memoizer.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let load = handle.wrap(load_user(&calls, Duration::ZERO));

    memoizer
        .warmup(&load, &(1,), &User::new(1))
        .await
        .unwrap();
    load.call((1,)).await.unwrap();
    assert_eq!(memoizer.stats().hit, 1);
}

#[tokio::test]
async fn test_admin_operations_surface_store_errors() {
    let memoizer = Memoizer::new(ErrorStore);
    let calls = Arc::new(AtomicUsize::new(0));
    let load = memoizer.wrap(load_user(&calls, Duration::ZERO));

    let err = memoizer
        .warmup(&load, &(1,), &User::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Store(StoreError::Connection(_))));

    let err = memoizer.invalidate(&load, &(1,)).await.unwrap_err();
    assert!(matches!(err, CacheError::Store(_)));
}

#[tokio::test]
async fn test_ready_and_store_handle() {
    let memoizer = Memoizer::new(TestStore::new());
    assert!(memoizer.is_ready());
    assert_eq!(memoizer.store().name(), "test");
    assert!(memoizer.queue_enabled());
    assert_eq!(memoizer.next_reset(), None);
}
