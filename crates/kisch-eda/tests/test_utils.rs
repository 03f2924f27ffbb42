#![allow(dead_code)]

use kisch_eda::{LibraryConfig, SymbolLibraryCache};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A cache that only searches a temporary copy of `tests/resources/symbols`.
pub fn setup_cache() -> (TempDir, SymbolLibraryCache) {
    let temp_dir = setup_test_env();
    let config = LibraryConfig::with_paths([temp_dir.path().join("symbols")]);
    (temp_dir, SymbolLibraryCache::new(config))
}

pub fn resource(name: &str) -> String {
    let path = resources_dir().join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {path:?}: {e}"))
}

pub fn resources_dir() -> PathBuf {
    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        PathBuf::from(manifest_dir).join("tests/resources")
    } else {
        PathBuf::from("tests/resources")
    }
}

pub fn setup_test_env() -> TempDir {
    let _ = env_logger::builder().is_test(true).try_init();

    let resources_dir = resources_dir();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    copy_dir_all(&resources_dir, temp_dir.path())
        .unwrap_or_else(|e| panic!("Failed to copy test resources from {resources_dir:?}: {e}"));

    temp_dir
}

pub fn copy_dir_all(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> std::io::Result<()> {
    fs::create_dir_all(&dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let destination = dst.as_ref().join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(entry.path(), &destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}
