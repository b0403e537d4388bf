//! Store clearing driven by call traffic.

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use obcache::{Memoizer, ResetSchedule, Stats};
use pretty_assertions::assert_eq;

use common::{ErrorStore, TestStore, User, count, load_user};

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_elapsed_boundary_clears_store_exactly_once() {
    let store = TestStore::new();
    let first_reset = Utc::now() + chrono::Duration::milliseconds(100);
    let memoizer = Memoizer::builder(store.clone())
        .reset(ResetSchedule::every(HOUR).starting_at(first_reset))
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let load = memoizer.wrap(load_user(&calls, Duration::ZERO));

    load.call((1,)).await.unwrap();
    load.call((1,)).await.unwrap();
    assert_eq!(store.counters.resets(), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;

    load.call((1,)).await.unwrap();
    load.call((1,)).await.unwrap();

    assert_eq!(store.counters.resets(), 1);
    assert_eq!(count(&calls), 2);
    assert_eq!(
        memoizer.stats(),
        Stats {
            hit: 2,
            miss: 2,
            reset: 1,
            pending: 0,
        }
    );
}

#[tokio::test]
async fn test_parallel_calls_trigger_a_single_reset() {
    let store = TestStore::new();
    let elapsed = Utc::now() - chrono::Duration::seconds(1);
    let memoizer = Memoizer::builder(store.clone())
        .reset(ResetSchedule::every(HOUR).starting_at(elapsed))
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let load = memoizer.wrap(load_user(&calls, Duration::from_millis(20)));

    let results = join_all((0..8).map(|id| load.call((id % 2,)))).await;

    assert!(results.into_iter().all(|r| r.is_ok()));
    assert_eq!(store.counters.resets(), 1);
    assert_eq!(memoizer.stats().reset, 1);
}

#[tokio::test]
async fn test_next_reset_advances_by_one_interval() {
    let first = Utc::now() - chrono::Duration::seconds(1);
    let memoizer = Memoizer::builder(TestStore::new())
        .reset(ResetSchedule::every(HOUR).starting_at(first))
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let load = memoizer.wrap(load_user(&calls, Duration::ZERO));

    assert_eq!(
        memoizer.next_reset().map(|t| t.timestamp_millis()),
        Some(first.timestamp_millis())
    );
    load.call((1,)).await.unwrap();
    assert_eq!(
        memoizer.next_reset().map(|t| t.timestamp_millis()),
        Some((first + chrono::Duration::hours(1)).timestamp_millis())
    );
}

#[tokio::test]
async fn test_failed_reset_does_not_fail_the_call() {
    let elapsed = Utc::now() - chrono::Duration::seconds(1);
    let memoizer = Memoizer::builder(ErrorStore)
        .reset(ResetSchedule::every(HOUR).starting_at(elapsed))
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let load = memoizer.wrap(load_user(&calls, Duration::ZERO));

    assert_eq!(load.call((1,)).await.unwrap(), User::new(1));
    assert_eq!(memoizer.stats().reset, 1);
}
