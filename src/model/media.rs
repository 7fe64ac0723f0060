//! Media payloads: raster images and point clouds
//!
//! An image can hold raw pixels, already-encoded bytes or a reference to
//! a file; export re-encodes it according to the requested [`ImageExt`].

use crate::config::ImageExt;
use crate::error::{DatasetError, IoResultExt, Result};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Kind of media held by a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// Raster images
    Image,
    /// Point clouds with optional related images
    PointCloud,
}

impl MediaType {
    /// Column code used in shard files
    pub fn code(&self) -> u8 {
        match self {
            Self::Image => 1,
            Self::PointCloud => 2,
        }
    }

    /// Inverse of [`MediaType::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Image),
            2 => Some(Self::PointCloud),
            _ => None,
        }
    }
}

/// Decoded 8-bit pixels in HWC layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixels {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Channels per pixel (1, 3 or 4)
    pub channels: u8,
    /// Row-major pixel data
    pub data: Vec<u8>,
}

impl Pixels {
    /// Image of the given shape with every sample set to `value`
    pub fn filled(height: u32, width: u32, channels: u8, value: u8) -> Self {
        let len = height as usize * width as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            data: vec![value; len],
        }
    }

    fn to_dynamic(&self) -> Result<DynamicImage> {
        let invalid = || {
            DatasetError::Encoding(format!(
                "pixel buffer of {} bytes does not match {}x{}x{}",
                self.data.len(),
                self.height,
                self.width,
                self.channels
            ))
        };
        let data = self.data.clone();
        match self.channels {
            1 => GrayImage::from_raw(self.width, self.height, data)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(invalid),
            3 => RgbImage::from_raw(self.width, self.height, data)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(invalid),
            4 => RgbaImage::from_raw(self.width, self.height, data)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(invalid),
            other => Err(DatasetError::Encoding(format!(
                "unsupported channel count {}",
                other
            ))),
        }
    }

    fn from_dynamic(image: &DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        match image.color().channel_count() {
            1 => Self {
                width,
                height,
                channels: 1,
                data: image.to_luma8().into_raw(),
            },
            3 => Self {
                width,
                height,
                channels: 3,
                data: image.to_rgb8().into_raw(),
            },
            _ => Self {
                width,
                height,
                channels: 4,
                data: image.to_rgba8().into_raw(),
            },
        }
    }
}

/// Where the image content comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    /// Raw pixels kept in memory
    Pixels(Pixels),
    /// Encoded bytes (PNG, JPEG, ...)
    Encoded(Vec<u8>),
    /// Encoded file on disk, read on demand
    File(PathBuf),
}

/// Image bytes ready to be written, with a file extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Encoded bytes
    pub bytes: Vec<u8>,
    /// Extension with leading dot
    pub ext: String,
}

/// A raster image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: Option<ImageData>,
    path: Option<String>,
    size: Option<(u32, u32)>,
}

impl Image {
    /// Image backed by raw pixels
    pub fn from_pixels(pixels: Pixels) -> Self {
        let size = Some((pixels.height, pixels.width));
        Self {
            data: Some(ImageData::Pixels(pixels)),
            path: None,
            size,
        }
    }

    /// Image backed by encoded bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Some(ImageData::Encoded(bytes)),
            path: None,
            size: None,
        }
    }

    /// Image backed by an encoded file; the file name becomes the image path
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().map(|n| n.to_string_lossy().to_string());
        Self {
            data: Some(ImageData::File(path)),
            path: name,
            size: None,
        }
    }

    /// Image known only by its path (media was not saved)
    pub fn path_only(path: impl Into<String>, size: Option<(u32, u32)>) -> Self {
        Self {
            data: None,
            path: Some(path.into()),
            size,
        }
    }

    /// Image with neither content nor path
    pub fn placeholder(size: Option<(u32, u32)>) -> Self {
        Self {
            data: None,
            path: None,
            size,
        }
    }

    /// Set the relative path (file name) of the image
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Replace or clear the relative path
    pub fn set_path(&mut self, path: Option<String>) {
        self.path = path;
    }

    /// Relative path of the image, if known
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Image content source
    pub fn data(&self) -> Option<&ImageData> {
        self.data.as_ref()
    }

    /// Whether the image has content (not just a path)
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Extension of the image path, with leading dot
    pub fn ext(&self) -> Option<String> {
        self.path
            .as_deref()
            .and_then(|p| Path::new(p).extension())
            .map(|e| format!(".{}", e.to_string_lossy()))
    }

    /// Extension the image gets when encoded with `scheme`
    pub fn encoded_ext(&self, scheme: Option<ImageExt>) -> String {
        if let Some(scheme) = scheme {
            return scheme.extension().to_string();
        }
        match &self.data {
            Some(ImageData::Pixels(_)) => ImageExt::Png.extension().to_string(),
            Some(ImageData::Encoded(bytes)) => self.ext().unwrap_or_else(|| guess_ext(bytes)),
            Some(ImageData::File(path)) => self
                .ext()
                .or_else(|| path.extension().map(|e| format!(".{}", e.to_string_lossy())))
                .unwrap_or_else(|| ".bin".to_string()),
            None => self.ext().unwrap_or_else(|| ".bin".to_string()),
        }
    }

    /// `(height, width)`, reading only the header of encoded data
    pub fn size(&self) -> Result<Option<(u32, u32)>> {
        if let Some(size) = self.size {
            return Ok(Some(size));
        }
        let bytes = match &self.data {
            None => return Ok(None),
            Some(ImageData::Pixels(p)) => return Ok(Some((p.height, p.width))),
            Some(ImageData::Encoded(bytes)) => bytes.clone(),
            Some(ImageData::File(path)) => std::fs::read(path).with_path(path)?,
        };
        let (width, height) = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()?;
        Ok(Some((height, width)))
    }

    /// Decode the image content
    pub fn pixels(&self) -> Result<Option<Pixels>> {
        match &self.data {
            None => Ok(None),
            Some(ImageData::Pixels(p)) => Ok(Some(p.clone())),
            Some(ImageData::Encoded(bytes)) => {
                Ok(Some(Pixels::from_dynamic(&image::load_from_memory(bytes)?)))
            }
            Some(ImageData::File(path)) => {
                let bytes = std::fs::read(path).with_path(path)?;
                Ok(Some(Pixels::from_dynamic(&image::load_from_memory(&bytes)?)))
            }
        }
    }

    /// Encode for export
    ///
    /// Without a scheme, encoded content is passed through untouched and raw
    /// pixels become PNG. Content already in the scheme's format is kept
    /// as is, so repeated saves never re-compress a JPEG.
    pub fn encode(&self, scheme: Option<ImageExt>) -> Result<Option<EncodedImage>> {
        let Some(data) = &self.data else {
            return Ok(None);
        };

        let encoded = match (scheme, data) {
            (None, ImageData::Encoded(bytes)) => EncodedImage {
                ext: self.encoded_ext(None),
                bytes: bytes.clone(),
            },
            (None, ImageData::File(path)) => EncodedImage {
                ext: self.encoded_ext(None),
                bytes: std::fs::read(path).with_path(path)?,
            },
            (None, ImageData::Pixels(pixels)) => EncodedImage {
                bytes: encode_pixels(pixels, ImageExt::Png)?,
                ext: ImageExt::Png.extension().to_string(),
            },
            (Some(scheme), ImageData::Pixels(pixels)) => EncodedImage {
                bytes: encode_pixels(pixels, scheme)?,
                ext: scheme.extension().to_string(),
            },
            (Some(scheme), ImageData::Encoded(bytes)) => reencode(bytes.clone(), scheme)?,
            (Some(scheme), ImageData::File(path)) => {
                reencode(std::fs::read(path).with_path(path)?, scheme)?
            }
        };

        Ok(Some(encoded))
    }

    /// Compare decoded content and path
    pub fn same_content(&self, other: &Image) -> Result<bool> {
        if self.path != other.path {
            return Ok(false);
        }
        Ok(self.pixels()? == other.pixels()?)
    }
}

fn guess_ext(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| ".bin".to_string())
}

fn scheme_format(scheme: ImageExt) -> ImageFormat {
    match scheme {
        ImageExt::Png => ImageFormat::Png,
        ImageExt::Tiff => ImageFormat::Tiff,
        ImageExt::Jpeg { .. } => ImageFormat::Jpeg,
    }
}

fn reencode(bytes: Vec<u8>, scheme: ImageExt) -> Result<EncodedImage> {
    let bytes = if image::guess_format(&bytes).ok() == Some(scheme_format(scheme)) {
        bytes
    } else {
        let pixels = Pixels::from_dynamic(&image::load_from_memory(&bytes)?);
        encode_pixels(&pixels, scheme)?
    };
    Ok(EncodedImage {
        bytes,
        ext: scheme.extension().to_string(),
    })
}

fn encode_pixels(pixels: &Pixels, scheme: ImageExt) -> Result<Vec<u8>> {
    let image = pixels.to_dynamic()?;
    let mut buf = Cursor::new(Vec::new());

    match scheme {
        ImageExt::Png | ImageExt::Tiff => image.write_to(&mut buf, scheme_format(scheme))?,
        ImageExt::Jpeg { quality } => {
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
            if pixels.channels == 1 {
                encoder.encode_image(&image.to_luma8())?;
            } else {
                // JPEG has no alpha channel
                encoder.encode_image(&image.to_rgb8())?;
            }
        }
    }

    Ok(buf.into_inner())
}

/// Point cloud content source
#[derive(Debug, Clone, PartialEq)]
pub enum PointCloudData {
    /// Serialized point cloud bytes (e.g. PCD)
    Bytes(Vec<u8>),
    /// Point cloud file on disk
    File(PathBuf),
}

/// A point cloud with optional related images
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    data: Option<PointCloudData>,
    path: Option<String>,
    /// Images captured alongside the point cloud
    pub extra_images: Vec<Image>,
}

impl PointCloud {
    /// Point cloud backed by bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Some(PointCloudData::Bytes(bytes)),
            path: None,
            extra_images: Vec::new(),
        }
    }

    /// Point cloud backed by a file
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().map(|n| n.to_string_lossy().to_string());
        Self {
            data: Some(PointCloudData::File(path)),
            path: name,
            extra_images: Vec::new(),
        }
    }

    /// Point cloud known only by its path
    pub fn path_only(path: impl Into<String>) -> Self {
        Self {
            data: None,
            path: Some(path.into()),
            extra_images: Vec::new(),
        }
    }

    /// Point cloud with neither content nor path
    pub fn placeholder() -> Self {
        Self {
            data: None,
            path: None,
            extra_images: Vec::new(),
        }
    }

    /// Set the relative path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Replace or clear the relative path
    pub fn set_path(&mut self, path: Option<String>) {
        self.path = path;
    }

    /// Attach related images
    pub fn with_extra_images(mut self, images: Vec<Image>) -> Self {
        self.extra_images = images;
        self
    }

    /// Relative path, if known
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Whether the point cloud has content
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Extension of the path, defaulting to `.pcd`
    pub fn ext(&self) -> String {
        self.path
            .as_deref()
            .and_then(|p| Path::new(p).extension())
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| ".pcd".to_string())
    }

    /// Load the raw bytes
    pub fn bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.data {
            None => Ok(None),
            Some(PointCloudData::Bytes(bytes)) => Ok(Some(bytes.clone())),
            Some(PointCloudData::File(path)) => Ok(Some(std::fs::read(path).with_path(path)?)),
        }
    }

    /// Compare bytes, path and related images
    pub fn same_content(&self, other: &PointCloud) -> Result<bool> {
        if self.path != other.path || self.extra_images.len() != other.extra_images.len() {
            return Ok(false);
        }
        if self.bytes()? != other.bytes()? {
            return Ok(false);
        }
        for (a, b) in self.extra_images.iter().zip(&other.extra_images) {
            if !a.same_content(b)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Media attached to a dataset item
#[derive(Debug, Clone, PartialEq)]
pub enum MediaElement {
    /// Raster image
    Image(Image),
    /// Point cloud
    PointCloud(PointCloud),
}

impl MediaElement {
    /// Kind of this media
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Image(_) => MediaType::Image,
            Self::PointCloud(_) => MediaType::PointCloud,
        }
    }

    /// Relative path, if known
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Image(image) => image.path(),
            Self::PointCloud(pcd) => pcd.path(),
        }
    }

    /// Whether the media has content
    pub fn has_data(&self) -> bool {
        match self {
            Self::Image(image) => image.has_data(),
            Self::PointCloud(pcd) => pcd.has_data(),
        }
    }

    /// Compare decoded content
    pub fn same_content(&self, other: &MediaElement) -> Result<bool> {
        match (self, other) {
            (Self::Image(a), Self::Image(b)) => a.same_content(b),
            (Self::PointCloud(a), Self::PointCloud(b)) => a.same_content(b),
            _ => Ok(false),
        }
    }
}

impl From<Image> for MediaElement {
    fn from(image: Image) -> Self {
        Self::Image(image)
    }
}

impl From<PointCloud> for MediaElement {
    fn from(pcd: PointCloud) -> Self {
        Self::PointCloud(pcd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_passthrough_is_lossless() {
        let image = Image::from_pixels(Pixels::filled(3, 2, 3, 1));
        let encoded = image.encode(None).unwrap().unwrap();
        assert_eq!(encoded.ext, ".png");

        let decoded = Image::from_bytes(encoded.bytes);
        assert_eq!(decoded.pixels().unwrap(), image.pixels().unwrap());
        assert_eq!(decoded.size().unwrap(), Some((3, 2)));
    }

    #[test]
    fn test_tiff_scheme_is_lossless() {
        let image = Image::from_pixels(Pixels::filled(4, 5, 3, 200));
        let encoded = image.encode(Some(ImageExt::Tiff)).unwrap().unwrap();
        assert_eq!(encoded.ext, ".tiff");
        assert_eq!(
            Image::from_bytes(encoded.bytes).pixels().unwrap(),
            image.pixels().unwrap()
        );
    }

    #[test]
    fn test_jpeg_scheme_keeps_shape() {
        let image = Image::from_pixels(Pixels::filled(8, 8, 3, 128));
        let encoded = image
            .encode(Some(ImageExt::Jpeg { quality: 75 }))
            .unwrap()
            .unwrap();
        assert_eq!(encoded.ext, ".jpg");
        let pixels = Image::from_bytes(encoded.bytes).pixels().unwrap().unwrap();
        assert_eq!((pixels.height, pixels.width, pixels.channels), (8, 8, 3));
    }

    #[test]
    fn test_bytes_in_target_format_are_not_reencoded() {
        let jpeg = Image::from_pixels(Pixels::filled(8, 8, 3, 90))
            .encode(Some(ImageExt::Jpeg { quality: 90 }))
            .unwrap()
            .unwrap();
        let again = Image::from_bytes(jpeg.bytes.clone())
            .encode(Some(ImageExt::Jpeg { quality: 50 }))
            .unwrap()
            .unwrap();
        assert_eq!(again.bytes, jpeg.bytes);

        // Other formats are converted
        let tiff = Image::from_bytes(jpeg.bytes.clone())
            .encode(Some(ImageExt::Tiff))
            .unwrap()
            .unwrap();
        assert_eq!(tiff.ext, ".tiff");
        assert_eq!(image::guess_format(&tiff.bytes).unwrap(), ImageFormat::Tiff);
    }

    #[test]
    fn test_encoded_bytes_pass_through_unchanged() {
        let png = Image::from_pixels(Pixels::filled(2, 2, 1, 7))
            .encode(None)
            .unwrap()
            .unwrap();
        let image = Image::from_bytes(png.bytes.clone()).with_path("photo.qwe");
        let again = image.encode(None).unwrap().unwrap();
        assert_eq!(again.bytes, png.bytes);
        assert_eq!(again.ext, ".qwe");
    }

    #[test]
    fn test_invalid_pixel_buffer() {
        let pixels = Pixels {
            width: 2,
            height: 2,
            channels: 3,
            data: vec![0; 5],
        };
        assert!(Image::from_pixels(pixels).encode(None).is_err());
    }

    #[test]
    fn test_path_only_image() {
        let image = Image::path_only("a/b.jpg", Some((10, 20)));
        assert!(!image.has_data());
        assert_eq!(image.ext().as_deref(), Some(".jpg"));
        assert_eq!(image.size().unwrap(), Some((10, 20)));
        assert!(image.encode(None).unwrap().is_none());
    }
}
