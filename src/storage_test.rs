use super::*;

// =============================================================
// Key layout
// =============================================================

#[test]
fn keys_are_scoped_per_plan() {
    assert_eq!(annotations_key("p1"), "annotations:p1");
    assert_eq!(metadata_options_key("p1"), "metadataOptions:p1");
    assert_eq!(legacy_annotations_key("p1"), "lineGroups:p1");
}

#[test]
fn key_encoding_is_filesystem_safe() {
    assert_eq!(encode_key("annotations:p-1"), "annotations%3Ap-1");
    assert_eq!(encode_key("a/b c"), "a%2Fb%20c");
    assert_eq!(encode_key("plain_key.v2"), "plain_key.v2");
}

// =============================================================
// MemoryStore
// =============================================================

#[test]
fn memory_store_set_replaces() {
    let mut store = MemoryStore::new();
    assert_eq!(store.get("k").unwrap(), None);
    store.set("k", "v1").unwrap();
    store.set("k", "v2").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
    assert_eq!(store.get("other").unwrap(), None);
}

// =============================================================
// FileStore
// =============================================================

#[test]
fn file_store_missing_key_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("nested"));
    assert_eq!(store.get("annotations:p1").unwrap(), None);
}

#[test]
fn file_store_roundtrip_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::new(dir.path().join("nested"));
    store.set("annotations:p1", r#"{"a":1}"#).unwrap();
    assert!(dir.path().join("nested").join("annotations%3Ap1.json").exists());
    assert_eq!(store.get("annotations:p1").unwrap().as_deref(), Some(r#"{"a":1}"#));

    // A second handle on the same directory sees the write.
    let other = FileStore::new(store.root().to_path_buf());
    assert_eq!(other.get("annotations:p1").unwrap().as_deref(), Some(r#"{"a":1}"#));
}

#[test]
fn file_store_overwrite_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::new(dir.path());
    store.set("k", "one").unwrap();
    store.set("k", "two").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["k.json".to_string()]);
}

#[test]
fn file_store_rejects_blank_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::new(dir.path());
    let err = store.set("  ", "v").unwrap_err();
    assert!(matches!(err, StorageError::InvalidKey(_)));
    assert_eq!(err.error_code(), "E_STORAGE_KEY");
    assert!(!err.retryable());
}

#[test]
fn file_store_unwritable_root_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "file, not a directory").unwrap();
    let mut store = FileStore::new(&blocker);
    let err = store.set("k", "v").unwrap_err();
    assert!(matches!(err, StorageError::Io { .. }));
    assert_eq!(err.error_code(), "E_STORAGE");
    assert!(err.retryable());
}
