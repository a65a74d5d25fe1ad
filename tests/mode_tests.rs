//! Tests for combined and split storage modes
//!
//! These tests verify:
//! - Both modes behave identically through the engine API
//! - Files are validated against the mode they are opened in
//! - The raw log scan sees every record in append order

use std::collections::HashMap;

use mapkv::{Engine, KvError, Options};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn options() -> Options {
    Options::builder().tables(4).buckets(2).build()
}

/// Apply the same workload to an engine and return the expected contents
fn workload(engine: &mut Engine) -> HashMap<Vec<u8>, Vec<u8>> {
    let mut expected = HashMap::new();
    for i in 0..64u32 {
        let key = format!("user:{}", i).into_bytes();
        let value = vec![i as u8; (i % 13 + 1) as usize];
        engine.put(&key, &value).unwrap();
        expected.insert(key, value);
    }
    for i in (0..64u32).step_by(5) {
        let key = format!("user:{}", i).into_bytes();
        engine.del(&key).unwrap();
        expected.remove(&key);
    }
    expected
}

fn contents(engine: &Engine) -> HashMap<Vec<u8>, Vec<u8>> {
    engine
        .entries()
        .collect::<mapkv::Result<HashMap<_, _>>>()
        .unwrap()
}

// =============================================================================
// Equivalence Tests
// =============================================================================

#[test]
fn test_combined_and_split_agree() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    let mut combined = Engine::open(&dir.join("combined.db"), None, &options()).unwrap();
    let idx = dir.join("split.idx");
    let mut split = Engine::open(&dir.join("split.db"), Some(idx.as_path()), &options()).unwrap();

    assert!(combined.is_combined());
    assert!(!split.is_combined());

    let expected = workload(&mut combined);
    assert_eq!(workload(&mut split), expected);

    assert_eq!(contents(&combined), expected);
    assert_eq!(contents(&split), expected);

    for i in 0..64u32 {
        let key = format!("user:{}", i).into_bytes();
        assert_eq!(combined.get(&key).unwrap(), split.get(&key).unwrap());
    }

    let (a, b) = (combined.stat().unwrap(), split.stat().unwrap());
    assert_eq!(a.table_total, b.table_total);
    assert_eq!(a.bucket_total, b.bucket_total);
    assert_eq!(a.data_size, b.data_size);
}

#[test]
fn test_split_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data.db");
    let index = temp_dir.path().join("index.db");

    let expected = {
        let mut engine = Engine::open(&data, Some(index.as_path()), &options()).unwrap();
        let expected = workload(&mut engine);
        engine.close().unwrap();
        expected
    };

    assert!(data.exists());
    assert!(index.exists());

    let engine = Engine::open(&data, Some(index.as_path()), &Options::read_only()).unwrap();
    assert_eq!(contents(&engine), expected);
}

#[test]
fn test_same_index_and_data_path_is_combined() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.db");

    let mut engine = Engine::open(&path, Some(path.as_path()), &options()).unwrap();
    assert!(engine.is_combined());
    engine.put(b"k", b"v").unwrap();
    engine.close().unwrap();

    let engine = Engine::open(&path, None, &options()).unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_combined_file_rejected_as_split_index() {
    let temp_dir = TempDir::new().unwrap();
    let combined = temp_dir.path().join("combined.db");
    Engine::open(&combined, None, &options())
        .unwrap()
        .close()
        .unwrap();

    let data = temp_dir.path().join("data.db");
    let result = Engine::open(&data, Some(combined.as_path()), &options());
    assert!(matches!(result, Err(KvError::Format(_))));
}

#[test]
fn test_split_data_rejected_as_combined() {
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data.db");
    let index = temp_dir.path().join("index.db");
    Engine::open(&data, Some(index.as_path()), &options())
        .unwrap()
        .close()
        .unwrap();

    assert!(matches!(
        Engine::open(&data, None, &options()),
        Err(KvError::Format(_))
    ));
    assert!(matches!(
        Engine::open(&index, None, &options()),
        Err(KvError::Format(_))
    ));
}

// =============================================================================
// Log Scan Tests
// =============================================================================

fn check_scan(engine: &mut Engine) {
    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.put(b"a", b"3").unwrap();
    engine.del(b"b").unwrap();
    // Force resizes so combined files carry extra bucket arrays
    for i in 0..20u32 {
        engine.put(format!("fill{}", i).as_bytes(), b"x").unwrap();
    }

    let entries: Vec<_> = engine
        .scan_log()
        .unwrap()
        .collect::<mapkv::Result<_>>()
        .unwrap();

    // Tombstones are skipped, superseded versions are not
    assert_eq!(entries.len(), 3 + 20);
    assert_eq!(entries[0].key, b"a");
    assert_eq!(entries[0].value, b"1");
    assert_eq!(entries[1].key, b"b");
    assert_eq!(entries[2].key, b"a");
    assert_eq!(entries[2].value, b"3");
    assert!(entries.windows(2).all(|w| w[0].offset < w[1].offset));
}

#[test]
fn test_scan_log_combined() {
    let temp_dir = TempDir::new().unwrap();
    let mut engine = Engine::open(&temp_dir.path().join("s.db"), None, &options()).unwrap();
    check_scan(&mut engine);
}

#[test]
fn test_scan_log_split() {
    let temp_dir = TempDir::new().unwrap();
    let index = temp_dir.path().join("s.idx");
    let mut engine = Engine::open(&temp_dir.path().join("s.db"), Some(index.as_path()), &options()).unwrap();
    check_scan(&mut engine);
}
