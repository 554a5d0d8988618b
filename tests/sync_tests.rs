//! Cross-context synchronization tests.
//!
//! Two execution contexts over the same shared medium: writes in one must
//! reach persisted cells in the other through the change bridge, and
//! nothing may loop back to the writer.

use crux::reactive::{ReactiveCell, ReactiveStore, StoreConfig, Subscription, storage_cell};
use crux::storage::{Platform, StorageKind, StorageOptions};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(2);

/// Forwards every change of `cell` into a channel.
fn watch<T>(cell: &ReactiveCell<T>) -> (mpsc::UnboundedReceiver<T>, Subscription)
where
    T: Clone + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = cell.subscribe(move |value: &T| {
        let _ = tx.send(value.clone());
    });
    (rx, sub)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_in_one_context_reaches_the_other() {
    let tab_a = Platform::in_memory();
    let tab_b = tab_a.new_context();

    let theme_a = storage_cell("theme", "light".to_string(), &tab_a.local_storage());
    let theme_b = storage_cell("theme", "light".to_string(), &tab_b.local_storage());
    assert!(theme_b.is_bridged());

    let (mut changes, _sub) = watch(&theme_b);
    theme_a.set("dark".to_string());

    let delivered = timeout(WAIT, changes.recv()).await.unwrap().unwrap();
    assert_eq!(delivered, "dark");
    assert_eq!(theme_b.get(), "dark");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writer_does_not_hear_its_own_write() {
    let tab_a = Platform::in_memory();
    let tab_b = tab_a.new_context();

    let count_a = storage_cell("count", 0, &tab_a.session_storage());
    let count_b = storage_cell("count", 0, &tab_b.session_storage());

    let (mut changes_a, _sub_a) = watch(&count_a);
    let (mut changes_b, _sub_b) = watch(&count_b);

    count_a.set(1);

    assert_eq!(changes_a.recv().await, Some(1));
    assert_eq!(timeout(WAIT, changes_b.recv()).await.unwrap(), Some(1));

    sleep(Duration::from_millis(100)).await;
    assert!(changes_a.try_recv().is_err());
    assert_eq!(count_a.version(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bridged_value_is_not_written_back() {
    let tab_a = Platform::in_memory();
    let tab_b = tab_a.new_context();
    let cache_b = tab_b.local_storage();
    let mut feed_a = tab_a.local_storage().changes().unwrap();

    let _cell_a = storage_cell("k", 0, &tab_a.local_storage());
    let cell_b = storage_cell("k", 0, &cache_b);
    let (mut changes, _sub) = watch(&cell_b);

    tab_a.local_storage().write("k", &5, None);
    assert_eq!(timeout(WAIT, changes.recv()).await.unwrap(), Some(5));

    // tab_a never sees an echo from tab_b
    sleep(Duration::from_millis(100)).await;
    assert!(feed_a.try_next().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_payload_is_dropped() {
    let tab_a = Platform::in_memory();
    let tab_b = tab_a.new_context();

    let cell_b = storage_cell("count", 7, &tab_b.local_storage());
    let (mut changes, _sub) = watch(&cell_b);

    let raw_a = tab_a.local_storage();
    raw_a.backend().set_raw("crux:count", "{definitely not json".into()).unwrap();
    raw_a.write("count", &"not a number", None);
    raw_a.write("count", &8, None);

    // only the well-formed update arrives
    assert_eq!(timeout(WAIT, changes.recv()).await.unwrap(), Some(8));
    assert_eq!(cell_b.get(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removal_and_other_keys_are_ignored() {
    let tab_a = Platform::in_memory();
    let tab_b = tab_a.new_context();

    let cell_b = storage_cell("watched", 1, &tab_b.local_storage());
    let (mut changes, _sub) = watch(&cell_b);

    let cache_a = tab_a.local_storage();
    cache_a.write("other", &99, None);
    cache_a.write("watched", &2, None);
    assert_eq!(timeout(WAIT, changes.recv()).await.unwrap(), Some(2));

    cache_a.remove("watched");
    sleep(Duration::from_millis(100)).await;
    assert!(changes.try_recv().is_err());
    assert_eq!(cell_b.get(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_prefixes_do_not_cross() {
    let tab_a = Platform::in_memory();
    let tab_b = tab_a.new_context();

    let app1 = StorageOptions::new(StorageKind::Local).prefix("app1:");
    let app2 = StorageOptions::new(StorageKind::Local).prefix("app2:");

    let cell_b = storage_cell("k", 0, &tab_b.storage(app2));
    let (mut changes, _sub) = watch(&cell_b);

    tab_a.storage(app1).write("k", &1, None);
    sleep(Duration::from_millis(100)).await;

    assert!(changes.try_recv().is_err());
    assert_eq!(cell_b.get(), 0);
}

#[tokio::test]
async fn test_memory_storage_never_bridges() {
    let platform = Platform::in_memory();
    let cell = storage_cell("k", 0, &platform.memory_storage());
    assert!(!cell.is_bridged());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_cell_stops_bridge() {
    let tab_a = Platform::in_memory();
    let tab_b = tab_a.new_context();

    let cell_b = storage_cell("k", 0, &tab_b.local_storage());
    assert!(cell_b.is_bridged());
    drop(cell_b);

    // writes after the drop must not panic or resurrect anything
    tab_a.local_storage().write("k", &1, None);
    sleep(Duration::from_millis(50)).await;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Settings {
    volume: u8,
    muted: bool,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_store_fields_follow_other_context() {
    let tab_a = Platform::in_memory();
    let tab_b = tab_a.new_context();
    let initial = Settings {
        volume: 5,
        muted: false,
    };

    let store_a = ReactiveStore::new(
        StoreConfig::new(initial.clone()).persist(tab_a.local_storage()),
    )
    .unwrap();
    let store_b =
        ReactiveStore::new(StoreConfig::new(initial).persist(tab_b.local_storage())).unwrap();

    let (mut volume_changes, _sub) = watch(store_b.cell("volume").unwrap());
    store_a.set_state(json!({ "volume": 9 })).unwrap();

    let delivered: Value = timeout(WAIT, volume_changes.recv()).await.unwrap().unwrap();
    assert_eq!(delivered, json!(9));
    assert_eq!(store_b.get_snapshot().unwrap().volume, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_store_drops_foreign_value_of_wrong_type() {
    let tab_a = Platform::in_memory();
    let tab_b = tab_a.new_context();
    let initial = Settings {
        volume: 5,
        muted: false,
    };

    let store_b =
        ReactiveStore::new(StoreConfig::new(initial).persist(tab_b.local_storage())).unwrap();
    let (mut volume_changes, _sub) = watch(store_b.cell("volume").unwrap());

    let cache_a = tab_a.local_storage();
    cache_a.write("store:volume", "loud", None);
    cache_a.write("store:volume", &300, None);
    cache_a.write("store:volume", &7, None);

    // only the value that fits a u8 arrives
    let delivered: Value = timeout(WAIT, volume_changes.recv()).await.unwrap().unwrap();
    assert_eq!(delivered, json!(7));
    assert!(volume_changes.try_recv().is_err());

    assert_eq!(
        store_b.get_snapshot().unwrap(),
        Settings {
            volume: 7,
            muted: false,
        }
    );
    store_b.set_state(json!({ "muted": true })).unwrap();
    assert!(store_b.get_snapshot().unwrap().muted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_store_keeps_last_value_after_rejected_change() {
    let tab_a = Platform::in_memory();
    let tab_b = tab_a.new_context();
    let initial = Settings {
        volume: 5,
        muted: false,
    };

    let store_b =
        ReactiveStore::new(StoreConfig::new(initial).persist(tab_b.local_storage())).unwrap();
    let (mut muted_changes, _sub) = watch(store_b.cell("muted").unwrap());

    let cache_a = tab_a.local_storage();
    cache_a.write("store:volume", "loud", None);
    cache_a.write("store:muted", &true, None);

    // the volume change never lands, whenever its bridge handles it
    let delivered: Value = timeout(WAIT, muted_changes.recv()).await.unwrap().unwrap();
    assert_eq!(delivered, json!(true));
    assert_eq!(store_b.cell("volume").unwrap().get(), json!(5));
    assert_eq!(store_b.get_snapshot().unwrap().volume, 5);
}
