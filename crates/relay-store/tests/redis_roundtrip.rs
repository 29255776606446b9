//! Rule store against a live Redis server.
//!
//! Set `REDIS_URL` (for example `redis://127.0.0.1:6379`) to run these.
//! Without it they return early. Every run writes under its own key prefix
//! and deletes its keys afterwards.

use bb8_redis::redis;
use chanrelay_core::{Rule, RuleStore, StoreError};
use chanrelay_store::{RedisRuleStore, RedisStoreConfig};
use std::time::{SystemTime, UNIX_EPOCH};

fn redis_url() -> Option<String> {
    std::env::var("REDIS_URL")
        .ok()
        .filter(|url| !url.is_empty())
}

/// Key prefix unique to one test run.
fn namespace(tag: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("chanrelay-test:{}:{}:{}", std::process::id(), nanos, tag)
}

async fn raw_connection(url: &str) -> redis::aio::MultiplexedConnection {
    let client = redis::Client::open(url).unwrap();
    client.get_multiplexed_async_connection().await.unwrap()
}

async fn exercise_store(atomic: bool) {
    let Some(url) = redis_url() else {
        eprintln!("REDIS_URL not set, skipping");
        return;
    };

    let ns = namespace(if atomic { "atomic" } else { "pipelined" });
    let set_key = format!("{}:channels", ns);
    let source = format!("{}:C1", ns);
    let other = format!("{}:C2", ns);
    let unknown = format!("{}:C404", ns);

    let store = RedisRuleStore::connect(RedisStoreConfig {
        url: url.clone(),
        routable_set_key: set_key.clone(),
        atomic_registration: atomic,
        ..Default::default()
    })
    .await
    .unwrap();
    store.ping().await.unwrap();

    assert!(!store.is_routable(&source).await.unwrap());
    assert!(store.rules_for(&unknown).await.unwrap().is_empty());

    // The third registration overwrites the first.
    let registrations = [("urgent", "D1"), ("deploy failed", "D2"), ("urgent", "D3")];
    for (pattern, destination) in registrations {
        let rule = Rule::new(source.as_str(), pattern, destination);
        store.register(&rule).await.unwrap();
    }

    assert!(store.is_routable(&source).await.unwrap());
    assert!(!store.is_routable(&other).await.unwrap());

    let rules = store.rules_for(&source).await.unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules["urgent"], "D3");
    assert_eq!(rules["deploy failed"], "D2");
    assert!(store.rules_for(&unknown).await.unwrap().is_empty());

    // Layout seen by other clients: pattern -> destination in the source
    // hash, source id in the set.
    let mut conn = raw_connection(&url).await;
    let destination: String = redis::cmd("HGET")
        .arg(&source)
        .arg("urgent")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(destination, "D3");

    let member: bool = redis::cmd("SISMEMBER")
        .arg(&set_key)
        .arg(&source)
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(member);

    let _: () = redis::cmd("DEL")
        .arg(&set_key)
        .arg(&source)
        .query_async(&mut conn)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pipelined_registration() {
    exercise_store(false).await;
}

#[tokio::test]
async fn test_atomic_registration() {
    exercise_store(true).await;
}

#[tokio::test]
async fn test_wrong_key_type_is_command_error() {
    let Some(url) = redis_url() else {
        eprintln!("REDIS_URL not set, skipping");
        return;
    };

    let ns = namespace("wrongtype");
    let set_key = format!("{}:channels", ns);
    let source = format!("{}:C1", ns);

    let mut conn = raw_connection(&url).await;
    let _: () = redis::cmd("SET")
        .arg(&source)
        .arg("not a hash")
        .query_async(&mut conn)
        .await
        .unwrap();

    let store = RedisRuleStore::connect(RedisStoreConfig {
        url,
        routable_set_key: set_key,
        ..Default::default()
    })
    .await
    .unwrap();

    assert!(matches!(
        store.rules_for(&source).await,
        Err(StoreError::Command(_))
    ));

    let _: () = redis::cmd("DEL")
        .arg(&source)
        .query_async(&mut conn)
        .await
        .unwrap();
}
