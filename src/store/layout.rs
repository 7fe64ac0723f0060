//! On-disk layout of an exported dataset
//!
//! ```text
//! <root>/<subset>-<NNNNN>-of-<MMMMM>.arrow   shard files, one group per subset
//! <root>/media/<subset>/<id><ext>            out-of-line media (optional)
//! <root>/media/<subset>/<id>/.extra_images/   point cloud extra images
//! ```
//!
//! Ids are percent-escaped in media paths.

use crate::error::{DatasetError, IoResultExt, Result};
use crate::fs::is_temp_file_name;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Extension of shard files
pub const SHARD_EXTENSION: &str = "arrow";

/// Directory holding out-of-line media
pub const MEDIA_DIR: &str = "media";

fn shard_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.+)-(\d{5,})-of-(\d{5,})\.arrow$").expect("valid shard name pattern")
    })
}

/// One shard file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFile {
    /// Absolute path
    pub path: PathBuf,
    /// Subset parsed from the file name
    pub subset: String,
    /// Shard index (0-based)
    pub index: usize,
    /// Declared total shard count of the subset
    pub count: usize,
}

/// File name of shard `index` out of `count` for a subset
pub fn shard_file_name(subset: &str, index: usize, count: usize) -> String {
    format!("{}-{:05}-of-{:05}.{}", subset, index, count, SHARD_EXTENSION)
}

/// Parse `(subset, index, count)` out of a shard file name
pub fn parse_shard_file_name(name: &str) -> Option<(String, usize, usize)> {
    let caps = shard_name_pattern().captures(name)?;
    let index = caps[2].parse().ok()?;
    let count = caps[3].parse().ok()?;
    Some((caps[1].to_string(), index, count))
}

/// List shard files under `root`, grouped by subset and ordered by index
///
/// Temp files of interrupted writes are ignored.
pub fn list_shards(root: &Path) -> Result<BTreeMap<String, Vec<ShardFile>>> {
    let mut shards: BTreeMap<String, Vec<ShardFile>> = BTreeMap::new();

    if !root.is_dir() {
        return Ok(shards);
    }

    for entry in std::fs::read_dir(root).with_path(root)? {
        let entry = entry.with_path(root)?;
        let name = entry.file_name().to_string_lossy().to_string();
        if is_temp_file_name(&name) {
            continue;
        }
        let Some((subset, index, count)) = parse_shard_file_name(&name) else {
            continue;
        };
        match entry.file_type() {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            // Renamed away by a concurrent writer since read_dir saw it
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(DatasetError::io(entry.path(), e)),
        }
        shards.entry(subset.clone()).or_default().push(ShardFile {
            path: entry.path(),
            subset,
            index,
            count,
        });
    }

    for files in shards.values_mut() {
        files.sort_by_key(|f| (f.index, f.count));
    }

    Ok(shards)
}

/// Subset names become file name prefixes, so they must be plain names
pub fn validate_subset_name(subset: &str) -> Result<()> {
    if subset.is_empty()
        || subset.starts_with('.')
        || subset.contains(['/', '\\'])
        || subset.contains('\0')
    {
        return Err(DatasetError::config(format!(
            "invalid subset name '{}': must be non-empty, not start with '.', \
             and contain no path separators",
            subset
        )));
    }
    Ok(())
}

/// Directory of out-of-line media of a subset
pub fn media_dir(root: &Path, subset: &str) -> PathBuf {
    root.join(MEDIA_DIR).join(subset)
}

/// Directory inside an item's media directory that holds point cloud
/// extra images. Escaped id components never start with a dot.
const EXTRA_IMAGES_DIR: &str = ".extra_images";

/// Percent-escape `text` so it is a dot-free, portable file name part
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        let reserved = matches!(c, '.' | '%' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|');
        if reserved || c.is_control() {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Escape one `/`-separated id component; a bare `%` stands for an empty one
fn escape_component(component: &str) -> String {
    if component.is_empty() {
        "%".to_string()
    } else {
        escape(component)
    }
}

fn id_components(subset: &str, id: &str) -> Vec<String> {
    let mut parts = vec![MEDIA_DIR.to_string(), subset.to_string()];
    parts.extend(id.split('/').map(escape_component));
    parts
}

fn with_ext(name: &str, ext: &str) -> String {
    format!("{}.{}", name, escape(ext.strip_prefix('.').unwrap_or(ext)))
}

/// Relative (`/`-separated) path of an item's out-of-line media file
///
/// `/` in item ids maps to nested directories. Every component is escaped,
/// so distinct ids never share a file, and directory names never contain
/// a dot while file names always do.
pub fn media_relative_path(subset: &str, id: &str, ext: &str) -> String {
    let mut parts = id_components(subset, id);
    if let Some(last) = parts.pop() {
        parts.push(with_ext(&last, ext));
    }
    parts.join("/")
}

/// Relative path of the `index`-th extra image of a point cloud item
pub fn extra_image_relative_path(subset: &str, id: &str, index: usize, ext: &str) -> String {
    let mut parts = id_components(subset, id);
    parts.push(EXTRA_IMAGES_DIR.to_string());
    parts.push(with_ext(&index.to_string(), ext));
    parts.join("/")
}

/// Resolve a `/`-separated relative path under `root`
pub fn resolve(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .fold(root.to_path_buf(), |path, part| path.join(part))
}
