//! Conversion between dataset items and flat shard rows
//!
//! One [`ItemRecord`] is one row of a shard batch. Annotations and
//! attributes travel as bincode blobs; media goes either into
//! `media_bytes` or, with out-of-line media, into a file under `media/`
//! whose relative path is kept in [`MediaInfo::file`].

use crate::config::ExportOptions;
use crate::error::{DatasetError, Result};
use crate::model::{DatasetItem, Image, MediaElement, MediaType, PointCloud};
use crate::store::layout::{extra_image_relative_path, media_relative_path, resolve};
use crate::store::schema::{ExtraImage, MediaInfo};
use std::path::Path;

/// Flat row of a shard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemRecord {
    pub id: String,
    pub media_type: Option<u8>,
    pub media_path: Option<String>,
    pub media_bytes: Option<Vec<u8>>,
    pub media_info: Option<Vec<u8>>,
    pub annotations: Vec<u8>,
    pub attributes: Vec<u8>,
}

/// Fixed per-row allowance for offsets, validity bits and padding
const ROW_OVERHEAD: u64 = 64;

impl ItemRecord {
    /// Upper estimate of the bytes this row adds to an IPC file
    pub fn estimated_size(&self) -> u64 {
        let variable = self.id.len()
            + self.media_path.as_ref().map_or(0, String::len)
            + self.media_bytes.as_ref().map_or(0, Vec::len)
            + self.media_info.as_ref().map_or(0, Vec::len)
            + self.annotations.len()
            + self.attributes.len();
        // IPC pads every buffer to 8 bytes
        (variable as u64).div_ceil(8) * 8 + ROW_OVERHEAD
    }
}

/// Media payload to be stored out of line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// `/`-separated path relative to the dataset root
    pub relative_path: String,
    /// File content
    pub bytes: Vec<u8>,
}

/// Result of encoding one item
#[derive(Debug, Clone, Default)]
pub struct EncodedItem {
    /// Shard row
    pub record: ItemRecord,
    /// Out-of-line files that must be (re)written
    pub media_files: Vec<MediaFile>,
    /// Every out-of-line file the row refers to
    pub media_refs: Vec<String>,
}

/// Turns items of one subset into shard rows
pub struct RecordEncoder<'a> {
    root: &'a Path,
    subset: &'a str,
    options: &'a ExportOptions,
}

impl<'a> RecordEncoder<'a> {
    pub fn new(root: &'a Path, subset: &'a str, options: &'a ExportOptions) -> Self {
        Self {
            root,
            subset,
            options,
        }
    }

    /// Encode `item`
    ///
    /// With out-of-line media, `rewrite_media = false` reuses a media file
    /// that already exists on disk instead of producing it again.
    pub fn encode(&self, item: &DatasetItem, rewrite_media: bool) -> Result<EncodedItem> {
        let mut encoded = EncodedItem {
            record: ItemRecord {
                id: item.id.clone(),
                annotations: bincode::serialize(&item.annotations)?,
                attributes: bincode::serialize(&item.attributes)?,
                ..Default::default()
            },
            ..Default::default()
        };

        let Some(media) = &item.media else {
            return Ok(encoded);
        };

        encoded.record.media_type = Some(media.media_type().code());
        encoded.record.media_path = media.path().map(str::to_string);

        let info = match media {
            MediaElement::Image(image) => {
                self.encode_image(image, &item.id, rewrite_media, &mut encoded)?
            }
            MediaElement::PointCloud(pcd) => {
                self.encode_point_cloud(pcd, &item.id, rewrite_media, &mut encoded)?
            }
        };

        if info != MediaInfo::default() {
            encoded.record.media_info = Some(bincode::serialize(&info)?);
        }
        Ok(encoded)
    }

    fn encode_image(
        &self,
        image: &Image,
        id: &str,
        rewrite_media: bool,
        encoded: &mut EncodedItem,
    ) -> Result<MediaInfo> {
        let mut info = MediaInfo::default();

        if !self.options.save_media || !image.has_data() {
            // Size is best effort here: the source may be unreadable
            info.size = image.size().ok().flatten();
            return Ok(info);
        }

        if self.options.embed_media {
            encoded.record.media_bytes = image
                .encode(self.options.image_ext)?
                .map(|image| image.bytes);
        } else {
            let ext = image.encoded_ext(self.options.image_ext);
            let relative = media_relative_path(self.subset, id, &ext);
            self.place_out_of_line(&relative, rewrite_media, encoded, || {
                Ok(image.encode(self.options.image_ext)?.map(|image| image.bytes))
            })?;
            info.file = Some(relative);
        }

        Ok(info)
    }

    fn encode_point_cloud(
        &self,
        pcd: &PointCloud,
        id: &str,
        rewrite_media: bool,
        encoded: &mut EncodedItem,
    ) -> Result<MediaInfo> {
        let mut info = MediaInfo::default();

        for (index, image) in pcd.extra_images.iter().enumerate() {
            let mut extra = ExtraImage {
                path: image.path().map(str::to_string),
                ..Default::default()
            };

            if !self.options.save_media || !image.has_data() {
                extra.size = image.size().ok().flatten();
            } else if self.options.embed_media {
                extra.bytes = image.encode(self.options.image_ext)?.map(|image| image.bytes);
            } else {
                let ext = image.encoded_ext(self.options.image_ext);
                let relative = extra_image_relative_path(self.subset, id, index, &ext);
                self.place_out_of_line(&relative, rewrite_media, encoded, || {
                    Ok(image.encode(self.options.image_ext)?.map(|image| image.bytes))
                })?;
                extra.file = Some(relative);
            }

            info.extra_images.push(extra);
        }

        if !self.options.save_media || !pcd.has_data() {
            return Ok(info);
        }

        if self.options.embed_media {
            encoded.record.media_bytes = pcd.bytes()?;
        } else {
            let relative = media_relative_path(self.subset, id, &pcd.ext());
            self.place_out_of_line(&relative, rewrite_media, encoded, || pcd.bytes())?;
            info.file = Some(relative);
        }

        Ok(info)
    }

    fn place_out_of_line(
        &self,
        relative: &str,
        rewrite_media: bool,
        encoded: &mut EncodedItem,
        content: impl FnOnce() -> Result<Option<Vec<u8>>>,
    ) -> Result<()> {
        encoded.media_refs.push(relative.to_string());

        if !rewrite_media && resolve(self.root, relative).is_file() {
            return Ok(());
        }
        if let Some(bytes) = content()? {
            encoded.media_files.push(MediaFile {
                relative_path: relative.to_string(),
                bytes,
            });
        }
        Ok(())
    }
}

/// Turns shard rows back into items of one subset
pub struct RecordDecoder<'a> {
    root: &'a Path,
    subset: &'a str,
    require_media: bool,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(root: &'a Path, subset: &'a str) -> Self {
        Self {
            root,
            subset,
            require_media: false,
        }
    }

    /// Fail on rows referring to missing out-of-line media
    pub fn require_media(mut self, require: bool) -> Self {
        self.require_media = require;
        self
    }

    pub fn decode(&self, record: ItemRecord) -> Result<DatasetItem> {
        let mut item = DatasetItem::new(&record.id).with_subset(self.subset);
        item.annotations = bincode::deserialize(&record.annotations)?;
        item.attributes = bincode::deserialize(&record.attributes)?;

        let Some(code) = record.media_type else {
            return Ok(item);
        };
        let media_type = MediaType::from_code(code).ok_or_else(|| {
            DatasetError::Encoding(format!("item '{}': unknown media type {}", record.id, code))
        })?;

        let info: MediaInfo = match &record.media_info {
            Some(blob) => bincode::deserialize(blob)?,
            None => MediaInfo::default(),
        };

        let media = match media_type {
            MediaType::Image => {
                let mut image =
                    self.decode_image(record.media_bytes, info.file.as_deref(), info.size)?;
                image.set_path(record.media_path);
                MediaElement::Image(image)
            }
            MediaType::PointCloud => {
                let mut pcd = match (record.media_bytes, info.file.as_deref()) {
                    (Some(bytes), _) => PointCloud::from_bytes(bytes),
                    (None, Some(file)) => match self.existing_file(file)? {
                        Some(path) => PointCloud::from_file(path),
                        None => PointCloud::placeholder(),
                    },
                    (None, None) => PointCloud::placeholder(),
                };
                pcd.set_path(record.media_path);

                let mut extra_images = Vec::with_capacity(info.extra_images.len());
                for extra in info.extra_images {
                    let mut image =
                        self.decode_image(extra.bytes, extra.file.as_deref(), extra.size)?;
                    image.set_path(extra.path);
                    extra_images.push(image);
                }
                MediaElement::PointCloud(pcd.with_extra_images(extra_images))
            }
        };

        Ok(item.with_media(media))
    }

    fn decode_image(
        &self,
        bytes: Option<Vec<u8>>,
        file: Option<&str>,
        size: Option<(u32, u32)>,
    ) -> Result<Image> {
        if let Some(bytes) = bytes {
            return Ok(Image::from_bytes(bytes));
        }
        if let Some(file) = file {
            if let Some(path) = self.existing_file(file)? {
                return Ok(Image::from_file(path));
            }
        }
        Ok(Image::placeholder(size))
    }

    fn existing_file(&self, relative: &str) -> Result<Option<std::path::PathBuf>> {
        let path = resolve(self.root, relative);
        if path.is_file() {
            Ok(Some(path))
        } else if self.require_media {
            Err(DatasetError::import(
                path,
                format!("media of subset '{}' is missing", self.subset),
            ))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageExt;
    use crate::model::{Annotation, Pixels};
    use tempfile::TempDir;

    fn sample_item() -> DatasetItem {
        DatasetItem::new("7")
            .with_subset("train")
            .with_media(Image::from_pixels(Pixels::filled(4, 3, 3, 10)).with_path("кадр 1.png"))
            .with_annotations(vec![
                Annotation::label(2),
                Annotation::bbox(1.0, 2.0, 3.0, 4.0, Some(1)),
            ])
            .with_attribute("occluded", true)
    }

    #[test]
    fn test_embedded_item_roundtrip() {
        let dir = TempDir::new().unwrap();
        let options = ExportOptions::default();
        let item = sample_item();

        let encoded = RecordEncoder::new(dir.path(), "train", &options)
            .encode(&item, true)
            .unwrap();
        assert!(encoded.media_files.is_empty());
        assert!(encoded.record.media_bytes.is_some());
        assert_eq!(encoded.record.media_info, None);

        let decoded = RecordDecoder::new(dir.path(), "train")
            .decode(encoded.record)
            .unwrap();
        assert!(decoded.same_content(&item).unwrap());
    }

    #[test]
    fn test_without_media_keeps_path_and_size() {
        let dir = TempDir::new().unwrap();
        let options = ExportOptions::default().save_media(false);

        let encoded = RecordEncoder::new(dir.path(), "train", &options)
            .encode(&sample_item(), true)
            .unwrap();
        assert_eq!(encoded.record.media_bytes, None);

        let decoded = RecordDecoder::new(dir.path(), "train")
            .decode(encoded.record)
            .unwrap();
        match decoded.media {
            Some(MediaElement::Image(image)) => {
                assert!(!image.has_data());
                assert_eq!(image.path(), Some("кадр 1.png"));
                assert_eq!(image.size().unwrap(), Some((4, 3)));
            }
            other => panic!("unexpected media {:?}", other),
        }
    }

    #[test]
    fn test_out_of_line_media_reuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let options = ExportOptions::default()
            .embed_media(false)
            .image_ext(ImageExt::Png);
        let encoder = RecordEncoder::new(dir.path(), "train", &options);

        let encoded = encoder.encode(&sample_item(), false).unwrap();
        assert_eq!(encoded.media_refs, vec!["media/train/7.png".to_string()]);
        assert_eq!(encoded.media_files.len(), 1);

        let file = &encoded.media_files[0];
        let path = resolve(dir.path(), &file.relative_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, &file.bytes).unwrap();

        let again = encoder.encode(&sample_item(), false).unwrap();
        assert!(again.media_files.is_empty());
        assert_eq!(again.media_refs, encoded.media_refs);
        assert_eq!(encoder.encode(&sample_item(), true).unwrap().media_files.len(), 1);

        let decoded = RecordDecoder::new(dir.path(), "train")
            .require_media(true)
            .decode(again.record)
            .unwrap();
        assert!(decoded.same_content(&sample_item()).unwrap());
    }

    #[test]
    fn test_missing_out_of_line_media() {
        let dir = TempDir::new().unwrap();
        let options = ExportOptions::default().embed_media(false);
        let encoded = RecordEncoder::new(dir.path(), "train", &options)
            .encode(&sample_item(), true)
            .unwrap();

        let lenient = RecordDecoder::new(dir.path(), "train")
            .decode(encoded.record.clone())
            .unwrap();
        assert!(!lenient.media.unwrap().has_data());

        let err = RecordDecoder::new(dir.path(), "train")
            .require_media(true)
            .decode(encoded.record)
            .unwrap_err();
        assert!(err.is_import_error());
    }

    #[test]
    fn test_point_cloud_with_extra_images() {
        let dir = TempDir::new().unwrap();
        let options = ExportOptions::default();
        let pcd = PointCloud::from_bytes(b"# .PCD v0.7\nPOINTS 0\n".to_vec())
            .with_path("scan.pcd")
            .with_extra_images(vec![
                Image::from_pixels(Pixels::filled(2, 2, 3, 1)).with_path("front.png"),
                Image::from_pixels(Pixels::filled(2, 2, 3, 2)),
            ]);
        let item = DatasetItem::new("p").with_media(pcd);

        let encoded = RecordEncoder::new(dir.path(), "default", &options)
            .encode(&item, true)
            .unwrap();
        let decoded = RecordDecoder::new(dir.path(), "default")
            .decode(encoded.record)
            .unwrap();
        assert!(decoded.same_content(&item).unwrap());
    }

    #[test]
    fn test_estimated_size_covers_payload() {
        let record = ItemRecord {
            id: "x".to_string(),
            media_bytes: Some(vec![0; 1000]),
            ..Default::default()
        };
        assert!(record.estimated_size() >= 1001);
        assert_eq!(record.estimated_size() % 8, 0);
    }
}
