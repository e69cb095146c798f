use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use super::*;
use crate::envelope::EnvelopeKind;

fn chat(scope: Scope, body: &str, timestamp: i64) -> Envelope {
    let mut env = Envelope::new(EnvelopeKind::Chat, scope, "client-a", "node-1", json!(body));
    env.timestamp = timestamp;
    env
}

fn now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[tokio::test]
async fn test_noop_store_has_no_history() {
    let store = NoopStore;
    store.save(&chat(Scope::Global, "x", now())).await.unwrap();
    assert!(store.fetch_history(&Scope::Global, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sled_history_is_ordered_and_limited() {
    let tmp = tempdir().unwrap();
    let store = SledStore::open(tmp.path().to_str().unwrap(), None, None).unwrap();
    let base = now();
    for i in 0..5 {
        store.save(&chat(Scope::Global, &format!("m{i}"), base + i)).await.unwrap();
    }

    let history = store.fetch_history(&Scope::Global, 3).await.unwrap();
    let bodies: Vec<_> = history.iter().map(|e| e.body.clone()).collect();
    assert_eq!(bodies, vec![json!("m2"), json!("m3"), json!("m4")]);
}

#[tokio::test]
async fn test_sled_same_millisecond_does_not_overwrite() {
    let tmp = tempdir().unwrap();
    let store = SledStore::open(tmp.path().to_str().unwrap(), None, None).unwrap();
    let ts = now();
    store.save(&chat(Scope::Global, "first", ts)).await.unwrap();
    store.save(&chat(Scope::Global, "second", ts)).await.unwrap();
    assert_eq!(store.fetch_history(&Scope::Global, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sled_scopes_are_separate() {
    let tmp = tempdir().unwrap();
    let store = SledStore::open(tmp.path().to_str().unwrap(), None, None).unwrap();
    store.save(&chat(Scope::Group("room".into()), "g", now())).await.unwrap();
    store.save(&chat(Scope::Direct("bob".into()), "d", now())).await.unwrap();

    let group = store.fetch_history(&Scope::Group("room".into()), 10).await.unwrap();
    assert_eq!(group.len(), 1);
    assert_eq!(group[0].body, json!("g"));
    assert!(store.fetch_history(&Scope::Global, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sled_caps_messages_per_scope() {
    let tmp = tempdir().unwrap();
    let store = SledStore::open(tmp.path().to_str().unwrap(), None, Some(2)).unwrap();
    let base = now();
    for i in 0..4 {
        store.save(&chat(Scope::Global, &format!("m{i}"), base + i)).await.unwrap();
    }
    let bodies: Vec<_> = store
        .fetch_history(&Scope::Global, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.body)
        .collect();
    assert_eq!(bodies, vec![json!("m2"), json!("m3")]);
}

#[tokio::test]
async fn test_sled_expires_old_messages() {
    let tmp = tempdir().unwrap();
    let store = SledStore::open(tmp.path().to_str().unwrap(), Some(60), None).unwrap();
    let two_hours_ago = now() - 2 * 3600 * 1000;
    let old = chat(Scope::Global, "old", now());
    store.insert_at(&old, two_hours_ago).unwrap();
    store.save(&chat(Scope::Global, "fresh", now())).await.unwrap();

    let history = store.fetch_history(&Scope::Global, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].body, json!("fresh"));
}

#[tokio::test]
async fn test_persister_writes_in_background() {
    let tmp = tempdir().unwrap();
    let store = Arc::new(SledStore::open(tmp.path().to_str().unwrap(), None, None).unwrap());
    let tx = spawn_persister(store.clone(), 8);
    tx.send(Arc::new(chat(Scope::Global, "bg", now()))).await.unwrap();

    let mut stored = Vec::new();
    for _ in 0..50 {
        stored = store.fetch_history(&Scope::Global, 10).await.unwrap();
        if !stored.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_sled_orders_by_arrival_not_client_timestamp() {
    let tmp = tempdir().unwrap();
    let store = SledStore::open(tmp.path().to_str().unwrap(), None, Some(2)).unwrap();
    store.save(&chat(Scope::Global, "pinned", -1)).await.unwrap();
    store.save(&chat(Scope::Global, "m1", now())).await.unwrap();
    store.save(&chat(Scope::Global, "m2", i64::MAX)).await.unwrap();

    let history = store.fetch_history(&Scope::Global, 10).await.unwrap();
    let bodies: Vec<_> = history.iter().map(|e| e.body.clone()).collect();
    assert_eq!(bodies, vec![json!("m1"), json!("m2")]);
    assert_eq!(history[1].timestamp, i64::MAX, "client timestamp kept in the envelope");
}

#[tokio::test]
async fn test_sled_ttl_ignores_client_timestamp() {
    let tmp = tempdir().unwrap();
    let store = SledStore::open(tmp.path().to_str().unwrap(), Some(60), None).unwrap();
    store.save(&chat(Scope::Global, "backdated", -1)).await.unwrap();
    store.save(&chat(Scope::Global, "future", i64::MAX)).await.unwrap();

    let history = store.fetch_history(&Scope::Global, 10).await.unwrap();
    assert_eq!(history.len(), 2);
}
