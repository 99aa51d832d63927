//! Decode/encode collaborator trait and shared types.
//!
//! The [`ImageCodec`] trait is the only way the pipeline touches image bytes.
//! It decodes one source file into an in-memory [`DynamicImage`] together with
//! the name of the format it recognised, and encodes an image under a format
//! name. Format names are lowercase (`"png"`, `"jpeg"`, ...).
//!
//! The production implementation is
//! [`RustCodec`](super::rust_codec::RustCodec), built on the `image` crate.

use image::DynamicImage;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decoding failed: {0}")]
    Decode(String),
    #[error("Encoding failed: {0}")]
    Encode(String),
    #[error("No writer available for format '{0}'")]
    NoSuitableWriter(String),
}

/// One decoded frame plus the format its decoder identified.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: String,
}

/// Trait for decode/encode collaborators.
///
/// Implementations must be `Sync`: the batch runner shares one codec across
/// its worker threads.
pub trait ImageCodec: Sync {
    /// Decode the first frame of `path`.
    ///
    /// Returns `Ok(None)` when no decoder recognises the content; that is a
    /// skip, not an error.
    fn decode(&self, path: &Path) -> Result<Option<DecodedImage>, CodecError>;

    /// Identify the format of `path` without decoding pixels.
    fn probe_format(&self, path: &Path) -> Result<Option<String>, CodecError>;

    /// Encode `image` as `format` into `path`.
    ///
    /// Must return [`CodecError::NoSuitableWriter`] *before* creating `path`
    /// when it has no writer for `format`.
    fn encode(&self, image: &DynamicImage, format: &str, path: &Path) -> Result<(), CodecError>;

    /// Every format name accepted by `encode` and reported by `decode`.
    fn supported_formats(&self) -> BTreeSet<String>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// In-memory codec that records operations.
    ///
    /// Sources are registered with [`MockCodec::add_source`]; any other path
    /// decodes to `None`. Encoding writes a small text marker so tests can see
    /// which format reached the destination. Uses Mutex (not RefCell) so it is
    /// Sync and works with rayon's thread pool.
    #[derive(Default)]
    pub struct MockCodec {
        pub sources: Mutex<HashMap<PathBuf, DecodedImage>>,
        pub refuse_writes: Mutex<bool>,
        /// Write a truncated file, then report an encoding error.
        pub break_writes: Mutex<bool>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Decode(String),
        Probe(String),
        Encode {
            output: String,
            format: String,
            width: u32,
            height: u32,
        },
    }

    impl MockCodec {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_source(&self, path: &Path, format: &str, width: u32, height: u32) {
            self.sources.lock().unwrap().insert(
                path.to_path_buf(),
                DecodedImage {
                    image: DynamicImage::new_rgba8(width, height),
                    format: format.to_string(),
                },
            );
        }

        pub fn refusing_writes() -> Self {
            let codec = Self::new();
            *codec.refuse_writes.lock().unwrap() = true;
            codec
        }

        pub fn breaking_writes() -> Self {
            let codec = Self::new();
            *codec.break_writes.lock().unwrap() = true;
            codec
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ImageCodec for MockCodec {
        fn decode(&self, path: &Path) -> Result<Option<DecodedImage>, CodecError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Decode(path.to_string_lossy().to_string()));
            Ok(self.sources.lock().unwrap().get(path).cloned())
        }

        fn probe_format(&self, path: &Path) -> Result<Option<String>, CodecError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Probe(path.to_string_lossy().to_string()));
            Ok(self
                .sources
                .lock()
                .unwrap()
                .get(path)
                .map(|d| d.format.clone()))
        }

        fn encode(&self, image: &DynamicImage, format: &str, path: &Path) -> Result<(), CodecError> {
            if *self.refuse_writes.lock().unwrap() {
                return Err(CodecError::NoSuitableWriter(format.to_string()));
            }
            if *self.break_writes.lock().unwrap() {
                std::fs::write(path, "partial")?;
                return Err(CodecError::Encode(format!("{} truncated", path.display())));
            }
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                output: path.to_string_lossy().to_string(),
                format: format.to_string(),
                width: image.width(),
                height: image.height(),
            });
            std::fs::write(path, format!("{format} {}x{}", image.width(), image.height()))?;
            Ok(())
        }

        fn supported_formats(&self) -> BTreeSet<String> {
            ["gif", "jpeg", "png"].iter().map(|s| s.to_string()).collect()
        }
    }

    #[test]
    fn mock_decodes_registered_sources_only() {
        let codec = MockCodec::new();
        codec.add_source(Path::new("/src/a.png"), "png", 8, 4);

        let decoded = codec.decode(Path::new("/src/a.png")).unwrap().unwrap();
        assert_eq!(decoded.format, "png");
        assert_eq!((decoded.image.width(), decoded.image.height()), (8, 4));

        assert!(codec.decode(Path::new("/src/other.png")).unwrap().is_none());
        assert_eq!(codec.get_operations().len(), 2);
    }

    #[test]
    fn mock_refusing_writes_creates_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("out.png");
        let codec = MockCodec::refusing_writes();

        let result = codec.encode(&DynamicImage::new_rgba8(2, 2), "png", &out);
        assert!(matches!(result, Err(CodecError::NoSuitableWriter(f)) if f == "png"));
        assert!(!out.exists());
    }
}
