use std::fs;

use serde_json::json;
use sweep_engine::{ensure_dir, AtomicFileWriter, FileStore, KeyValueStore, StoreError};
use tempfile::TempDir;

#[test]
fn creates_missing_data_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("data");
    assert!(!new_dir.exists());
    ensure_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing_value() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("status.json", "{}").unwrap();
    assert_eq!(first.file_name().unwrap(), "status.json");
    assert_eq!(fs::read_to_string(&first).unwrap(), "{}");

    let second = writer.write("status.json", "[]").unwrap();
    assert_eq!(first, second);
    assert_eq!(writer.read("status.json").unwrap().as_deref(), Some("[]"));
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write("status.json", "data");
    assert!(result.is_err());
    assert!(!file_path.with_file_name("status.json").exists());
}

#[test]
fn reading_or_removing_missing_file_is_not_an_error() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    assert_eq!(writer.read("absent.json").unwrap(), None);
    writer.remove("absent.json").unwrap();
}

#[test]
fn file_store_round_trips_whole_values() {
    let temp = TempDir::new().unwrap();
    let mut store = FileStore::new(temp.path());

    store
        .set(vec![("a", json!({"total": 3})), ("b", json!([1, 2]))])
        .unwrap();
    assert_eq!(store.get("a").unwrap(), Some(json!({"total": 3})));
    assert_eq!(store.get("b").unwrap(), Some(json!([1, 2])));

    store.remove(&["a"]).unwrap();
    assert_eq!(store.get("a").unwrap(), None);
    assert!(temp.path().join("b.json").is_file());
}

#[test]
fn file_store_reports_malformed_values() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("broken.json"), "{not json").unwrap();
    let store = FileStore::new(temp.path());

    let err = store.get("broken").unwrap_err();
    assert!(matches!(err, StoreError::Malformed { ref key, .. } if key == "broken"));
}
