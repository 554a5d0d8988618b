//! # Storage Tour
//!
//! Walks through the crux storage and reactive layers end to end.
//!
//! ## What This Example Shows
//!
//! - Opening a platform over a durable local medium
//! - Typed cache reads and writes with TTL expiry
//! - Key namespacing with prefixes
//! - Persisted reactive cells and cross-context updates
//! - A reactive store with batched updates and subscribers
//! - Async indexed storage
//!
//! ## Running This Example
//!
//! ```bash
//! cargo run --example storage_tour
//! ```
//!
//! This example creates a temporary directory that is cleaned up on exit.

use anyhow::Result;
use crux::reactive::{ReactiveStore, StoreConfig, storage_cell};
use crux::storage::{IndexedStorage, Platform, StorageKind, StorageOptions};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Preferences {
    theme: String,
    font_size: u8,
    recent: Vec<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            font_size: 14,
            recent: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== crux Storage Tour ===\n");

    // =========================================================================
    // Part 1: Typed cache with TTL
    // =========================================================================

    println!("--- Part 1: Typed cache with TTL ---\n");

    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("local.redb");
    let platform = Platform::open(&db_path)?;
    println!("Local medium at: {}", db_path.display());

    let cache = platform.local_storage();
    cache.write("greeting", "hello", None);
    cache.write("otp", &123_456, Some(Duration::from_millis(100)));

    println!("greeting = {:?}", cache.read::<String>("greeting"));
    println!("otp      = {:?}", cache.read::<u32>("otp"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    println!("otp after 150ms = {:?}\n", cache.read::<u32>("otp"));

    // =========================================================================
    // Part 2: Namespacing
    // =========================================================================

    println!("--- Part 2: Namespacing ---\n");

    let app1 = platform.storage(StorageOptions::new(StorageKind::Local).prefix("app1:"));
    let app2 = platform.storage(StorageOptions::new(StorageKind::Local).prefix("app2:"));
    app1.write("user", "alice", None);
    app2.write("user", "bob", None);
    println!("app1 keys: {:?}", app1.keys());
    println!("app2 user: {:?}\n", app2.read::<String>("user"));

    // =========================================================================
    // Part 3: Cells across contexts
    // =========================================================================
    //
    // A second context over the same media sees writes from the first one
    // without polling.

    println!("--- Part 3: Cells across contexts ---\n");

    let other_tab = platform.new_context();
    let theme_here = storage_cell("theme", "light".to_string(), &platform.local_storage());
    let theme_there = storage_cell("theme", "light".to_string(), &other_tab.local_storage());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = theme_there.subscribe(move |theme: &String| {
        let _ = tx.send(theme.clone());
    });

    theme_here.set("dark".to_string());
    let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await?;
    println!("other context received: {received:?}\n");

    // =========================================================================
    // Part 4: Reactive store
    // =========================================================================

    println!("--- Part 4: Reactive store ---\n");

    let store = ReactiveStore::new(
        StoreConfig::new(Preferences::default())
            .persist(platform.local_storage())
            .storage_key("prefs"),
    )?;
    let token = store.subscribe(|| println!("  (store changed)"));

    store.set_state(json!({ "theme": "dark", "font_size": 16 }))?;
    println!("snapshot: {:?}", store.get_snapshot()?);

    store.reset()?;
    println!("after reset: {:?}", store.get_snapshot()?);
    token.unsubscribe();
    store.clear_persisted();
    println!();

    // =========================================================================
    // Part 5: Indexed storage
    // =========================================================================

    println!("--- Part 5: Indexed storage ---\n");

    let idb = IndexedStorage::open(temp_dir.path(), "tour-db", "documents").await?;
    idb.set("doc-1", &json!({ "title": "Notes", "pages": 3 })).await?;
    println!("doc-1 = {:?}", idb.get::<serde_json::Value>("doc-1").await?);
    println!("keys  = {:?}", idb.keys().await?);
    idb.clear().await?;

    println!("\n=== Done ===");
    Ok(())
}
