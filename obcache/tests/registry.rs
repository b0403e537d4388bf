//! Reporting on named memoizers.

mod common;

use obcache::Memoizer;
use obcache::registry::{self, CacheReport, Registry};
use pretty_assertions::assert_eq;
use serial_test::serial;

use common::{ErrorStore, TestStore, User, settle};

#[tokio::test]
async fn test_report_lists_registered_memoizers_by_name() {
    let registry = Registry::new();
    let users = registry.register("users", &Memoizer::new(TestStore::new()));
    registry.register("accounts", &Memoizer::new(ErrorStore));

    let load = users.wrap(|(id,): (u64,)| async move { Ok::<_, String>(User::new(id)) });
    load.call((1,)).await.unwrap();
    load.call((1,)).await.unwrap();
    settle().await;

    let reports = registry.report();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].name, "accounts");
    assert!(!reports[0].ready);
    assert_eq!(reports[0].key_count, None);

    let CacheReport {
        name,
        store,
        ready,
        key_count,
        stats,
    } = &reports[1];
    assert_eq!(name, "users");
    assert_eq!(store, "test");
    assert!(*ready);
    assert_eq!(*key_count, Some(1));
    assert_eq!((stats.hit, stats.miss), (1, 1));

    let json = serde_json::to_value(&reports[1]).unwrap();
    assert_eq!(json["stats"]["hit"], 1);

    registry.log();
    assert!(registry.unregister("users").is_some());
    assert!(registry.get("users").is_none());
    assert_eq!(registry.len(), 1);
}

#[test]
#[serial]
fn test_global_registry_is_shared() {
    let memoizer = Memoizer::new(TestStore::new());
    registry::global().register("global-test", &memoizer);
    assert!(registry::global().get("global-test").is_some());
    registry::global().unregister("global-test");
    assert!(registry::global().get("global-test").is_none());
}
