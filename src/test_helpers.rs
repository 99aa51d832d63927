//! Shared test utilities.
//!
//! Fixture images are generated on the fly with the `image` crate, so tests
//! never depend on binary files in the repository.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! write_png(&tmp.path().join("in/a.png"), 16, 8);
//! set_mtime(&tmp.path().join("in/a.png"), SystemTime::UNIX_EPOCH);
//! ```

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

// =========================================================================
// Fixture images
// =========================================================================

fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
}

/// Write a `width`×`height` RGBA PNG with a gradient, creating parents.
pub fn write_png(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128, 255])
    });
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

/// Write a `width`×`height` RGB JPEG with a gradient, creating parents.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, 64, (y * 255 / height.max(1)) as u8])
    });
    img.save_with_format(path, image::ImageFormat::Jpeg).unwrap();
}

/// Write a plain text file, creating parents.
pub fn write_text(path: &Path, content: &str) {
    ensure_parent(path);
    fs::write(path, content).unwrap();
}

// =========================================================================
// Timestamps
// =========================================================================

/// Set a file's modification time.
pub fn set_mtime(path: &Path, time: SystemTime) {
    let file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}
