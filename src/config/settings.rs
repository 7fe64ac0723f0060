//! Configuration settings for dsarrow
//!
//! Defines the CLI arguments, export options and their defaults,
//! plus parsing helpers for human-readable values.

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default number of items per Arrow record batch
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1000;

/// dsarrow - Sharded Arrow dataset store
#[derive(Parser, Debug, Clone)]
#[command(name = "dsarrow")]
#[command(author = "dsarrow Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect, verify and reshard Arrow-format datasets")]
#[command(long_about = r#"
dsarrow manages datasets stored as sharded Arrow IPC files, one set of
shards per subset. Unchanged subsets are never rewritten on save.

Examples:
  dsarrow detect ./dataset                       # Is this an Arrow dataset?
  dsarrow info ./dataset                         # Subsets, shards, digests
  dsarrow verify ./dataset --require-media       # Full decode of every shard
  dsarrow reshard ./src ./dst --num-shards 4     # Re-export with new chunking
"#)]
pub struct CliArgs {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Check whether a directory holds a dataset in a known format
    #[command(name = "detect")]
    Detect {
        /// Dataset directory
        path: PathBuf,
    },

    /// Show subsets, shard files and their digests
    #[command(name = "info")]
    Info {
        /// Dataset directory
        path: PathBuf,
    },

    /// Decode every shard and report item counts
    #[command(name = "verify")]
    Verify {
        /// Dataset directory
        path: PathBuf,
        /// Fail when out-of-line media files are missing
        #[arg(long)]
        require_media: bool,
    },

    /// Import a dataset and export it again with new parameters
    #[command(name = "reshard")]
    Reshard(ReshardArgs),
}

/// Arguments of the `reshard` subcommand
#[derive(Args, Debug, Clone)]
pub struct ReshardArgs {
    /// Source dataset directory
    pub source: PathBuf,

    /// Destination directory
    pub destination: PathBuf,

    /// Do not write media payloads, keep only media paths
    #[arg(long)]
    pub no_media: bool,

    /// Image re-encoding scheme (PNG, TIFF, JPEG/<1-100>)
    #[arg(long, value_name = "SCHEME")]
    pub image_ext: Option<String>,

    /// Maximum items per record batch
    #[arg(long, default_value_t = DEFAULT_MAX_CHUNK_SIZE, value_name = "NUM")]
    pub max_chunk_size: usize,

    /// Exact number of shard files per subset
    #[arg(long, value_name = "NUM", conflicts_with = "max_shard_size")]
    pub num_shards: Option<usize>,

    /// Maximum shard file size (e.g., 64M, 1G)
    #[arg(long, value_name = "SIZE")]
    pub max_shard_size: Option<String>,

    /// Store media files next to the shards instead of inside them
    #[arg(long)]
    pub out_of_line_media: bool,
}

/// Image re-encoding scheme applied on export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImageExt {
    /// Lossless PNG
    Png,
    /// Lossless TIFF
    Tiff,
    /// Lossy JPEG with quality in 1..=100
    Jpeg { quality: u8 },
}

impl ImageExt {
    /// Default JPEG quality when none is given
    pub const DEFAULT_JPEG_QUALITY: u8 = 75;

    /// File extension (with leading dot) for encoded images
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => ".png",
            Self::Tiff => ".tiff",
            Self::Jpeg { .. } => ".jpg",
        }
    }

    /// Whether decoding gives back the exact pixels
    pub fn is_lossless(&self) -> bool {
        !matches!(self, Self::Jpeg { .. })
    }
}

impl FromStr for ImageExt {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let (scheme, quality) = match upper.split_once('/') {
            Some((scheme, quality)) => (scheme, Some(quality)),
            None => (upper.as_str(), None),
        };

        match (scheme, quality) {
            ("PNG", None) => Ok(Self::Png),
            ("TIFF", None) => Ok(Self::Tiff),
            ("JPEG", None) => Ok(Self::Jpeg {
                quality: Self::DEFAULT_JPEG_QUALITY,
            }),
            ("JPEG", Some(q)) => {
                let quality: u8 = q
                    .parse()
                    .map_err(|_| format!("Invalid JPEG quality: {}", q))?;
                if !(1..=100).contains(&quality) {
                    return Err(format!("JPEG quality must be in 1..=100, got {}", quality));
                }
                Ok(Self::Jpeg { quality })
            }
            _ => Err(format!(
                "Unsupported image scheme '{}', expected PNG, TIFF or JPEG/<quality>",
                s
            )),
        }
    }
}

impl fmt::Display for ImageExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Png => write!(f, "PNG"),
            Self::Tiff => write!(f, "TIFF"),
            Self::Jpeg { quality } => write!(f, "JPEG/{}", quality),
        }
    }
}

impl TryFrom<String> for ImageExt {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageExt> for String {
    fn from(value: ImageExt) -> Self {
        value.to_string()
    }
}

/// How a subset's items are spread over shard files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharding {
    /// One shard per subset
    Single,
    /// Exactly this many shards per subset, contiguous blocks
    Count(usize),
    /// As many shards as needed to keep each below this many bytes
    MaxBytes(u64),
}

/// Options for exporting a dataset
///
/// Recorded in every shard so that a later `save()` (or a save after
/// import) reuses the same layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Write media payloads (otherwise only media paths are kept)
    pub save_media: bool,
    /// Re-encode images with this scheme (None keeps the original encoding)
    pub image_ext: Option<ImageExt>,
    /// Maximum items per record batch
    pub max_chunk_size: usize,
    /// Exact number of shards per subset
    pub num_shards: Option<usize>,
    /// Maximum shard size in bytes
    pub max_shard_size: Option<u64>,
    /// Store media inside the shards (false puts them under `media/`)
    pub embed_media: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            save_media: true,
            image_ext: None,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            num_shards: None,
            max_shard_size: None,
            embed_media: true,
        }
    }
}

impl ExportOptions {
    /// Set whether media payloads are written
    pub fn save_media(mut self, enable: bool) -> Self {
        self.save_media = enable;
        self
    }

    /// Set the image re-encoding scheme
    pub fn image_ext(mut self, ext: ImageExt) -> Self {
        self.image_ext = Some(ext);
        self
    }

    /// Set the record batch size
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    /// Request an exact number of shards per subset
    pub fn num_shards(mut self, count: usize) -> Self {
        self.num_shards = Some(count);
        self
    }

    /// Bound shard files to this many bytes
    pub fn max_shard_size(mut self, bytes: u64) -> Self {
        self.max_shard_size = Some(bytes);
        self
    }

    /// Store media next to the shards instead of inside them
    pub fn embed_media(mut self, enable: bool) -> Self {
        self.embed_media = enable;
        self
    }

    /// Check the options and resolve the sharding strategy
    pub fn sharding(&self) -> Result<Sharding, String> {
        if self.max_chunk_size == 0 {
            return Err("max_chunk_size must be positive".to_string());
        }

        match (self.num_shards, self.max_shard_size) {
            (Some(_), Some(_)) => Err(
                "num_shards and max_shard_size are mutually exclusive".to_string(),
            ),
            (Some(0), None) => Err("num_shards must be positive".to_string()),
            (None, Some(0)) => Err("max_shard_size must be positive".to_string()),
            (Some(count), None) => Ok(Sharding::Count(count)),
            (None, Some(bytes)) => Ok(Sharding::MaxBytes(bytes)),
            (None, None) => Ok(Sharding::Single),
        }
    }

    /// Create options from CLI arguments
    pub fn from_cli(args: &ReshardArgs) -> Result<Self, String> {
        let mut options = Self {
            save_media: !args.no_media,
            max_chunk_size: args.max_chunk_size,
            num_shards: args.num_shards,
            embed_media: !args.out_of_line_media,
            ..Default::default()
        };

        options.image_ext = args
            .image_ext
            .as_deref()
            .map(ImageExt::from_str)
            .transpose()
            .map_err(|e| format!("Invalid image scheme: {}", e))?;
        options.max_shard_size = args
            .max_shard_size
            .as_ref()
            .map(|s| parse_size(s))
            .transpose()
            .map_err(|e| format!("Invalid max shard size: {}", e))?;

        options.sharding()?;
        Ok(options)
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        (size.trim_end_matches(['T', 'B']), 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("1.5G").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
    }

    #[test]
    fn test_image_ext_parsing() {
        assert_eq!("PNG".parse::<ImageExt>().unwrap(), ImageExt::Png);
        assert_eq!("tiff".parse::<ImageExt>().unwrap(), ImageExt::Tiff);
        assert_eq!(
            "JPEG/95".parse::<ImageExt>().unwrap(),
            ImageExt::Jpeg { quality: 95 }
        );
        assert_eq!(
            "JPEG".parse::<ImageExt>().unwrap(),
            ImageExt::Jpeg { quality: ImageExt::DEFAULT_JPEG_QUALITY }
        );
        assert!("JPEG/0".parse::<ImageExt>().is_err());
        assert!("JPEG/101".parse::<ImageExt>().is_err());
        assert!("GIF".parse::<ImageExt>().is_err());
        assert_eq!(ImageExt::Jpeg { quality: 75 }.to_string(), "JPEG/75");
    }

    #[test]
    fn test_image_ext_serde() {
        let json = serde_json::to_string(&ImageExt::Jpeg { quality: 80 }).unwrap();
        assert_eq!(json, "\"JPEG/80\"");
        let back: ImageExt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ImageExt::Jpeg { quality: 80 });
    }

    #[test]
    fn test_sharding_resolution() {
        assert_eq!(ExportOptions::default().sharding().unwrap(), Sharding::Single);
        assert_eq!(
            ExportOptions::default().num_shards(5).sharding().unwrap(),
            Sharding::Count(5)
        );
        assert_eq!(
            ExportOptions::default().max_shard_size(1024).sharding().unwrap(),
            Sharding::MaxBytes(1024)
        );
        assert!(ExportOptions::default()
            .num_shards(5)
            .max_shard_size(1024)
            .sharding()
            .is_err());
        assert!(ExportOptions::default().max_chunk_size(0).sharding().is_err());
        assert!(ExportOptions::default().num_shards(0).sharding().is_err());
    }

    #[test]
    fn test_options_from_cli() {
        let args = CliArgs::parse_from([
            "dsarrow",
            "reshard",
            "src",
            "dst",
            "--max-shard-size",
            "1M",
            "--image-ext",
            "JPEG/95",
        ]);
        let Commands::Reshard(reshard) = args.command else {
            panic!("expected reshard");
        };
        let options = ExportOptions::from_cli(&reshard).unwrap();
        assert_eq!(options.max_shard_size, Some(1024 * 1024));
        assert_eq!(options.image_ext, Some(ImageExt::Jpeg { quality: 95 }));
        assert!(options.save_media);
        assert!(options.embed_media);
    }
}
