//! Atomic file replacement
//!
//! Content is written to a hidden temp file next to the target and renamed
//! over it only after a successful flush, so readers never observe a
//! partially written file.

use crate::error::{IoResultExt, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Suffix of in-flight temp files
pub const TEMP_SUFFIX: &str = ".tmp";

/// Temp path used while writing `path`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}{}", name, TEMP_SUFFIX))
}

/// Whether a file name belongs to an in-flight or abandoned temp file
pub fn is_temp_file_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

/// Write `bytes` to `path` via temp file + rename
///
/// On failure the temp file is removed and any previous content of `path`
/// stays in place.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }
    }

    let temp_path = temp_path_for(path);
    let written = write_and_sync(&temp_path, bytes)
        .and_then(|_| std::fs::rename(&temp_path, path).with_path(path));

    if written.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    written
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> Result<()> {
    let file = File::create(path).with_path(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes).with_path(path)?;
    let file = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .with_path(path)?;
    file.sync_all().with_path(path)?;
    Ok(())
}

/// Remove a file; a missing file is not an error
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_path(path),
    }
}

/// Remove a directory tree; a missing directory is not an error
pub fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_path(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("shard.arrow");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shard.arrow");
        atomic_write(&path, b"valid").unwrap();

        // A directory squatting on the temp path makes File::create fail
        std::fs::create_dir(temp_path_for(&path)).unwrap();
        assert!(atomic_write(&path, b"broken").is_err());

        assert_eq!(std::fs::read(&path).unwrap(), b"valid");
    }

    #[test]
    fn test_temp_names() {
        let temp = temp_path_for(Path::new("/d/train-00000-of-00001.arrow"));
        let name = temp.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name, ".train-00000-of-00001.arrow.tmp");
        assert!(is_temp_file_name(&name));
        assert!(!is_temp_file_name("train-00000-of-00001.arrow"));
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        assert!(!remove_file_if_exists(&dir.path().join("nope")).unwrap());
        assert!(!remove_dir_if_exists(&dir.path().join("nope")).unwrap());
    }
}
