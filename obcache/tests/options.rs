//! Declarative configuration and the stores it builds.

mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use obcache::{CacheOptions, ConfigError, Memoizer, RedisOptions, ResetSchedule};
use pretty_assertions::assert_eq;

use common::User;

#[test]
fn test_options_deserialize_from_yaml() {
    let yaml = r#"
id: 7
max: 500
max_age: 5m
queue_enabled: false
reset:
  interval: 1h
  first_reset: "2030-01-01T00:00:00Z"
redis:
  host: cache.internal
  port: 6380
  twemproxy: true
  connect_timeout: 2s
"#;

    let options: CacheOptions = serde_saphyr::from_str(yaml).expect("failed to deserialize");

    assert_eq!(options.id, Some(7));
    assert_eq!(options.max, Some(500));
    assert_eq!(options.max_size, None);
    assert_eq!(options.max_age, Some(Duration::from_secs(300)));
    assert!(!options.queue_enabled);
    assert_eq!(
        options.reset,
        Some(ResetSchedule {
            interval: Duration::from_secs(3600),
            first_reset: Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
        })
    );
    assert_eq!(
        options.redis,
        Some(RedisOptions {
            url: None,
            host: Some("cache.internal".to_string()),
            port: Some(6380),
            database: None,
            twemproxy: true,
            connect_timeout: Some(Duration::from_secs(2)),
        })
    );
}

#[test]
fn test_options_defaults() {
    let options: CacheOptions = serde_saphyr::from_str("max_size: 1048576\n").unwrap();

    assert_eq!(options.max_size, Some(1_048_576));
    assert!(options.queue_enabled);
    assert_eq!(options.max_age, None);
    assert_eq!(options.reset, None);
    assert_eq!(options.redis, None);

    let default = CacheOptions::default();
    assert!(default.queue_enabled);
    assert_eq!(default.max, None);
}

#[test]
fn test_camel_case_aliases() {
    let options: CacheOptions = serde_json::from_str(
        r#"{
            "maxAge": "10s",
            "queueEnabled": false,
            "reset": {"interval": "1h", "firstReset": "2030-01-01T00:00:00Z"},
            "redis": {"connectTimeout": "1s"}
        }"#,
    )
    .unwrap();

    assert_eq!(
        options.reset.as_ref().and_then(|reset| reset.first_reset),
        Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
    );

    assert_eq!(options.max_age, Some(Duration::from_secs(10)));
    assert!(!options.queue_enabled);
    assert_eq!(
        options.redis.and_then(|redis| redis.connect_timeout),
        Some(Duration::from_secs(1))
    );
}

#[test]
fn test_conflicting_capacity_is_rejected() {
    let mut options = CacheOptions::default();
    options.max = Some(10);
    options.max_size = Some(1024);

    assert!(matches!(
        options.into_store(),
        Err(ConfigError::ConflictingCapacity)
    ));
}

#[cfg(not(feature = "redis"))]
#[test]
fn test_redis_without_feature_is_unavailable() {
    let mut options = CacheOptions::default();
    options.id = Some(1);
    options.redis = Some(RedisOptions::default());

    assert!(matches!(
        options.into_store(),
        Err(ConfigError::StoreNotAvailable(_))
    ));
}

#[cfg(feature = "redis")]
#[test]
fn test_redis_requires_an_id() {
    let mut options = CacheOptions::default();
    options.redis = Some(RedisOptions::default());

    assert!(matches!(options.into_store(), Err(ConfigError::MissingId)));
}

#[cfg(feature = "moka")]
#[tokio::test]
async fn test_memoizer_from_options() {
    let mut options = CacheOptions::default();
    options.max = Some(100);
    options.queue_enabled = false;
    options.label = Some("users".to_string());
    options.reset = Some(ResetSchedule::every(Duration::from_secs(3600)));

    let memoizer = Memoizer::from_options(options).unwrap();
    assert!(!memoizer.queue_enabled());
    assert!(memoizer.is_ready());
    assert_eq!(memoizer.store().name(), "users");
    assert!(memoizer.next_reset().is_some());

    let load = memoizer.wrap(|(id,): (u64,)| async move { Ok::<_, String>(User::new(id)) });
    load.call((1,)).await.unwrap();
    load.call((1,)).await.unwrap();
    assert_eq!(memoizer.stats().hit, 1);
}
