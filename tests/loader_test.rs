//! Version Loader Integration Tests
//!
//! Runs the bundled `version-ingester` through the external ingester
//! binding against the fixtures in `tests/resources`.

use std::path::{Path, PathBuf};
use versioned_adapter::loader::{ExternalIngester, FileDropLoader, VersionLoader};
use versioned_adapter::store::{list_snapshots, snapshot_path};
use versioned_adapter::AdapterError;

fn resources() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("resources")
}

fn ingester(store: &Path) -> ExternalIngester {
    ExternalIngester::new(vec![env!("CARGO_BIN_EXE_version-ingester").to_string()], store)
}

#[test]
fn test_ingest_v0_then_v1() {
    let tmp = tempfile::tempdir().unwrap();
    let store = tmp.path().join("store");
    let loader = ingester(&store);

    let v0 = loader.load_version(0, &resources().join("v0")).unwrap();
    assert_eq!(v0.record_count, 6);

    let v1 = loader.load_version(1, &resources().join("v1")).unwrap();
    assert_eq!(v1.record_count, 7);

    let versions: Vec<u32> = list_snapshots(&store).unwrap().into_iter().map(|(v, _)| v).collect();
    assert_eq!(versions, vec![0, 1]);

    // v1 keeps a/a/b and a/a/c, deletes three and adds four.
    let v1_snapshot = std::fs::read_to_string(snapshot_path(&store, 1)).unwrap();
    assert_eq!(v1_snapshot.lines().count(), 7);
}

#[test]
fn test_missing_source_directory_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let loader = ingester(&tmp.path().join("store"));
    let err = loader.load_version(0, &tmp.path().join("nowhere")).unwrap_err();
    assert!(matches!(err, AdapterError::LoadFailure { version: 0, .. }));
}

#[test]
fn test_file_drop_counts_fixture_triples() {
    let tmp = tempfile::tempdir().unwrap();
    let loader = FileDropLoader::new(tmp.path());
    assert_eq!(loader.load_version(1, &resources().join("v1")).unwrap().record_count, 7);
    assert!(loader.version_dir(1).join("added.nt").exists());
    assert!(loader.version_dir(1).join("deleted.nt").exists());
}
