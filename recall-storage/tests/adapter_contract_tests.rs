//! Contract tests run against every local backend.
//!
//! Each check is written once against `StorageAdapter` and exercised on the
//! memory and LMDB backends.

use std::sync::Arc;

use recall_core::{ManualClock, StaleTime};
use recall_storage::{LmdbAdapter, MemoryAdapter, StorageAdapter};
use serde_json::{json, Value};
use tempfile::TempDir;

const T0: i64 = 1_700_000_000_000;

fn memory(clock: &ManualClock) -> MemoryAdapter {
    MemoryAdapter::new("contract", StaleTime::from_secs(300)).with_clock(Arc::new(clock.clone()))
}

fn lmdb(clock: &ManualClock) -> (LmdbAdapter, TempDir) {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let adapter = LmdbAdapter::open(temp_dir.path(), 10, "contract", StaleTime::from_secs(300))
        .expect("adapter creation should succeed")
        .with_clock(Arc::new(clock.clone()));
    (adapter, temp_dir)
}

async fn never_stale_is_permanent<A: StorageAdapter>(adapter: &A, clock: &ManualClock) {
    adapter
        .set_item("permanent", &json!({"id": 1}), Some(StaleTime::Never))
        .await
        .unwrap();
    assert_eq!(
        adapter.get_item::<Value>("permanent").await.unwrap(),
        Some(json!({"id": 1}))
    );

    clock.advance(100 * 365 * 24 * 60 * 60 * 1000);
    assert_eq!(
        adapter.get_item::<Value>("permanent").await.unwrap(),
        Some(json!({"id": 1}))
    );
}

async fn staleness_boundary<A: StorageAdapter>(adapter: &A, clock: &ManualClock) {
    clock.set(T0);
    adapter
        .set_item("bounded", &"value", Some(StaleTime::from_millis(5_000)))
        .await
        .unwrap();

    clock.set(T0 + 5_000);
    assert_eq!(
        adapter.get_item::<String>("bounded").await.unwrap().as_deref(),
        Some("value")
    );

    clock.set(T0 + 5_001);
    assert_eq!(adapter.get_item::<String>("bounded").await.unwrap(), None);

    // Gone from the backend: rewinding the clock does not bring it back.
    clock.set(T0);
    assert_eq!(adapter.get_item::<String>("bounded").await.unwrap(), None);
}

async fn round_trip<A: StorageAdapter>(adapter: &A) {
    let payload = json!({"userId": 1, "id": 1, "title": "delectus aut autem", "completed": false});
    assert!(adapter.set_item("/todos/1", &payload, None).await.unwrap());
    assert_eq!(adapter.get_item::<Value>("/todos/1").await.unwrap(), Some(payload));
}

async fn remove_is_idempotent<A: StorageAdapter>(adapter: &A) {
    adapter.set_item("to-remove", &1, None).await.unwrap();
    assert!(adapter.remove_item("to-remove").await.unwrap());
    assert!(adapter.remove_item("to-remove").await.unwrap());
    assert!(adapter.remove_item("never-existed").await.unwrap());
}

async fn clear_empties_everything<A: StorageAdapter>(adapter: &A) {
    let keys = ["/a", "/b", "/c?page=2"];
    for (i, key) in keys.iter().enumerate() {
        adapter.set_item(key, &i, None).await.unwrap();
    }

    assert!(adapter.clear().await.unwrap());
    for key in keys {
        assert_eq!(adapter.get_item::<usize>(key).await.unwrap(), None);
    }
}

async fn null_payload_is_present<A: StorageAdapter>(adapter: &A) {
    adapter.set_item("null", &Value::Null, None).await.unwrap();
    assert_eq!(adapter.get_item::<Value>("null").await.unwrap(), Some(Value::Null));
}

#[tokio::test]
async fn memory_adapter_satisfies_contract() {
    let clock = ManualClock::new(T0);
    let adapter = memory(&clock);

    never_stale_is_permanent(&adapter, &clock).await;
    staleness_boundary(&adapter, &clock).await;
    round_trip(&adapter).await;
    remove_is_idempotent(&adapter).await;
    null_payload_is_present(&adapter).await;
    clear_empties_everything(&adapter).await;
}

#[tokio::test]
async fn lmdb_adapter_satisfies_contract() {
    let clock = ManualClock::new(T0);
    let (adapter, _temp_dir) = lmdb(&clock);

    never_stale_is_permanent(&adapter, &clock).await;
    staleness_boundary(&adapter, &clock).await;
    round_trip(&adapter).await;
    remove_is_idempotent(&adapter).await;
    null_payload_is_present(&adapter).await;
    clear_empties_everything(&adapter).await;
}
