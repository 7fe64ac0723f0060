//! Content snapshots of dataset directories
//!
//! A snapshot maps every file under a root to its size and XXHash3-128
//! digest. Diffing two snapshots shows exactly which files a save touched.

use crate::error::{DatasetError, IoResultExt, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use xxhash_rust::xxh3::Xxh3;

/// Size and digest of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDigest {
    pub size: u64,
    pub hash: u128,
}

impl std::fmt::Display for FileDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.hash)
    }
}

/// Hash a file with XXHash3-128
pub fn digest_file(path: &Path) -> Result<FileDigest> {
    let file = File::open(path).with_path(path)?;
    let size = file.metadata().with_path(path)?.len();
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Xxh3::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let bytes_read = reader.read(&mut buffer).with_path(path)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(FileDigest {
        size,
        hash: hasher.digest128(),
    })
}

/// Digests of all files under a directory, keyed by `/`-separated
/// relative path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    pub files: BTreeMap<String, FileDigest>,
}

impl DirectorySnapshot {
    /// Walk `root` and hash every regular file
    pub fn take(root: &Path) -> Result<Self> {
        let mut paths: Vec<(String, PathBuf)> = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| DatasetError::io(root, e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            paths.push((relative, entry.into_path()));
        }

        let digests: Vec<Result<(String, FileDigest)>> = paths
            .into_par_iter()
            .map(|(relative, path)| Ok((relative, digest_file(&path)?)))
            .collect();

        let mut files = BTreeMap::new();
        for digest in digests {
            let (relative, digest) = digest?;
            files.insert(relative, digest);
        }
        Ok(Self { files })
    }

    /// Total size of all files
    pub fn total_size(&self) -> u64 {
        self.files.values().map(|d| d.size).sum()
    }

    /// Compare with a later snapshot of the same directory
    pub fn diff(&self, later: &DirectorySnapshot) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();

        for (path, digest) in &later.files {
            match self.files.get(path) {
                None => diff.added.push(path.clone()),
                Some(before) if before != digest => diff.modified.push(path.clone()),
                Some(_) => diff.unchanged.push(path.clone()),
            }
        }
        diff.deleted = self
            .files
            .keys()
            .filter(|p| !later.files.contains_key(*p))
            .cloned()
            .collect();

        diff
    }
}

/// Difference between two directory snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// New files
    pub added: Vec<String>,
    /// Files whose content changed
    pub modified: Vec<String>,
    /// Files that disappeared
    pub deleted: Vec<String>,
    /// Identical files
    pub unchanged: Vec<String>,
}

impl SnapshotDiff {
    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.deleted.is_empty()
    }

    /// Get total number of changes
    pub fn change_count(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// Print summary
    pub fn print_summary(&self) {
        println!("=== Directory Diff ===");
        println!("Added:     {}", self.added.len());
        println!("Modified:  {}", self.modified.len());
        println!("Deleted:   {}", self.deleted.len());
        println!("Unchanged: {}", self.unchanged.len());
    }
}
