//! Integration tests for building stores from configuration.
//!
//! These tests exercise the public API only:
//! - Loading `stowage.toml` and building the configured stack
//! - Persistence of the file backend across handles
//! - Read-through population of a cached file store
//! - Concurrent writers sharing one handle
//!
//! Run with:
//! ```bash
//! cargo test -p stowage --test store_integration
//! ```

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use stowage::store::{CacheStore, FileStore, KvStore, ListOptions, ReadOptions, Store};
use stowage::{BackendKind, StoreConfig};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write_config(dir: &TempDir, body: &str) -> StoreConfig {
    let path = dir.path().join("stowage.toml");
    fs::write(&path, body).unwrap();
    let config = StoreConfig::load_from(&path).unwrap();
    config.validate().unwrap();
    config
}

#[tokio::test]
async fn test_file_config_persists_across_handles() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");
    let config = write_config(
        &tmp,
        &format!(
            "backend = \"file\"\ndirectory = {:?}\ndatabase = \"app\"\ntable = \"sessions\"\n",
            data_dir.display().to_string()
        ),
    );
    assert_eq!(config.backend, BackendKind::File);

    let store = KvStore::from_config(&config).await.unwrap();
    assert_eq!(store.name(), "file");
    store.set("session:1", b"alice", None).await.unwrap();
    store.close().await.unwrap();

    assert!(data_dir.join("app").join("sessions.redb").exists());

    let reopened = KvStore::from_config(&config).await.unwrap();
    let record = reopened.get("session:1").await.unwrap().unwrap();
    assert_eq!(record.value, b"alice");
    reopened.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cached_config_reads_through() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");

    // Seed the back store directly.
    let seed = FileStore::new(&data_dir);
    let cancel = CancellationToken::new();
    seed.write(
        &cancel,
        stowage::Record::new("user:1", "alice"),
        Default::default(),
    )
    .await
    .unwrap();
    seed.close().await.unwrap();

    let config = write_config(
        &tmp,
        &format!(
            "backend = \"file\"\ndirectory = {:?}\ncache = true\nsweep_interval_secs = 0\n",
            data_dir.display().to_string()
        ),
    );
    let store = KvStore::from_config(&config).await.unwrap();
    assert_eq!(store.name(), "cache");

    let keys = store.list_keys(Some("user:")).await.unwrap();
    assert_eq!(keys, vec!["user:1"]);
    let record = store.get("user:1").await.unwrap().unwrap();
    assert_eq!(record.value, b"alice");
}

#[tokio::test]
async fn test_cache_front_serves_after_population() {
    let tmp = TempDir::new().unwrap();
    let back = Arc::new(FileStore::new(tmp.path()));
    let cache = Arc::new(CacheStore::new(back.clone()));
    let store = KvStore::from_arc(cache.clone());

    store
        .set("greeting", b"hello", Some(Duration::from_secs(60)))
        .await
        .unwrap();

    // Drop the record from the back only; the front still serves it.
    back.delete(&CancellationToken::new(), "greeting", Default::default())
        .await
        .unwrap();
    let records = store
        .read("greet", ReadOptions::default().prefix())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].expiry <= Duration::from_secs(60));

    let front_keys = cache
        .front()
        .list(&CancellationToken::new(), ListOptions::default())
        .await
        .unwrap();
    assert_eq!(front_keys, vec!["greeting"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers() {
    let tmp = TempDir::new().unwrap();
    let store = KvStore::file(tmp.path()).cached();

    let mut handles = Vec::new();
    for worker in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let key = format!("w{worker}:{i:02}");
                store.set(&key, key.as_bytes(), None).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let keys = store.list_keys(None).await.unwrap();
    assert_eq!(keys.len(), 200);
    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));

    let w3 = store.list_keys(Some("w3:")).await.unwrap();
    assert_eq!(w3.len(), 25);
}

#[tokio::test]
async fn test_memory_config_defaults() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp, "");

    let store = KvStore::from_config(&config).await.unwrap();
    assert_eq!(store.name(), "memory");
    assert_eq!(store.options().database, "micro");
    assert_eq!(store.options().table, "micro");

    store
        .set("ephemeral", b"v", Some(Duration::from_millis(30)))
        .await
        .unwrap();
    assert!(store.exists("ephemeral").await.unwrap());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!store.exists("ephemeral").await.unwrap());
}

#[tokio::test]
async fn test_invalid_namespace_fails_to_build() {
    let tmp = TempDir::new().unwrap();
    let config = StoreConfig {
        backend: BackendKind::File,
        directory: Some(tmp.path().to_path_buf()),
        table: "../escape".to_string(),
        ..StoreConfig::default()
    };
    assert!(config.validate().is_err());

    let err = KvStore::from_config(&config).await.err().unwrap();
    assert!(err.to_string().contains("Failed to initialize file store"));
}
