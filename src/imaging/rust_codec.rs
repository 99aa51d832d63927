//! Pure Rust codec built on the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Format mapping
//!
//! | Name | Aliases | `image` format |
//! |---|---|---|
//! | `bmp` | | `ImageFormat::Bmp` |
//! | `gif` | | `ImageFormat::Gif` (first frame only) |
//! | `jpeg` | `jpg` | `ImageFormat::Jpeg` (quality from [`Quality`]) |
//! | `png` | | `ImageFormat::Png` |
//! | `tiff` | `tif` | `ImageFormat::Tiff` |
//! | `webp` | | `ImageFormat::WebP` (lossless) |
//!
//! Formats are recognised from file content, never from the extension: a
//! `.png` that is really a JPEG decodes as `jpeg`.

use super::codec::{CodecError, DecodedImage, ImageCodec};
use super::params::Quality;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Format names and the `image` format they select. The first name listed
/// for a format is its canonical name.
const FORMATS: &[(&str, ImageFormat)] = &[
    ("bmp", ImageFormat::Bmp),
    ("gif", ImageFormat::Gif),
    ("jpeg", ImageFormat::Jpeg),
    ("jpg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tiff", ImageFormat::Tiff),
    ("tif", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

/// Canonical name for a format, if it is one we support.
fn format_name(format: ImageFormat) -> Option<&'static str> {
    FORMATS
        .iter()
        .find(|(_, f)| *f == format)
        .map(|(name, _)| *name)
}

/// Look up a format by (case-insensitive) name or alias.
fn format_from_name(name: &str) -> Option<ImageFormat> {
    FORMATS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, f)| *f)
}

/// Open `path` and guess its format from the leading bytes.
fn open_guessed(path: &Path) -> Result<ImageReader<BufReader<File>>, CodecError> {
    let file = File::open(path)?;
    Ok(ImageReader::new(BufReader::new(file)).with_guessed_format()?)
}

/// Convert to a pixel layout the target encoder accepts.
fn prepare_for(format: ImageFormat, image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match (format, image) {
        (ImageFormat::Jpeg, DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_)) => {
            Cow::Borrowed(image)
        }
        (ImageFormat::Jpeg, _) => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        (ImageFormat::WebP | ImageFormat::Gif, DynamicImage::ImageRgba8(_)) => Cow::Borrowed(image),
        (ImageFormat::WebP | ImageFormat::Gif, _) => {
            Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8()))
        }
        _ => Cow::Borrowed(image),
    }
}

/// Codec backed by the `image` crate's pure Rust decoders and encoders.
///
/// See the [module docs](self) for the supported formats.
pub struct RustCodec {
    quality: Quality,
}

impl RustCodec {
    pub fn new() -> Self {
        Self {
            quality: Quality::default(),
        }
    }

    pub fn with_quality(quality: Quality) -> Self {
        Self { quality }
    }
}

impl Default for RustCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCodec for RustCodec {
    fn decode(&self, path: &Path) -> Result<Option<DecodedImage>, CodecError> {
        let reader = open_guessed(path)?;
        let Some(format) = reader.format().and_then(format_name) else {
            return Ok(None);
        };
        let image = reader.decode().map_err(|e| {
            CodecError::Decode(format!("Failed to decode {}: {}", path.display(), e))
        })?;
        Ok(Some(DecodedImage {
            image,
            format: format.to_string(),
        }))
    }

    fn probe_format(&self, path: &Path) -> Result<Option<String>, CodecError> {
        let reader = open_guessed(path)?;
        Ok(reader.format().and_then(format_name).map(str::to_string))
    }

    fn encode(&self, image: &DynamicImage, format: &str, path: &Path) -> Result<(), CodecError> {
        let target = format_from_name(format)
            .filter(|f| f.writing_enabled())
            .ok_or_else(|| CodecError::NoSuitableWriter(format.to_string()))?;
        let prepared = prepare_for(target, image);

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let encoded = match target {
            ImageFormat::Jpeg => prepared.write_with_encoder(JpegEncoder::new_with_quality(
                &mut writer,
                self.quality.value() as u8,
            )),
            other => prepared.write_to(&mut writer, other),
        };
        encoded.map_err(|e| {
            CodecError::Encode(format!("Failed to encode {} as {}: {}", path.display(), format, e))
        })?;
        writer.flush()?;
        Ok(())
    }

    fn supported_formats(&self) -> BTreeSet<String> {
        FORMATS
            .iter()
            .filter(|(_, f)| f.reading_enabled() && f.writing_enabled())
            .map(|(name, _)| name.to_string())
            .collect()
    }
}
