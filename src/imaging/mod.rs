//! Image collaborators, pure Rust and statically linked.
//!
//! | Concern | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` with content sniffing, first frame only |
//! | **Encode** | `DynamicImage::write_to`, JPEG via `JpegEncoder` with quality |
//! | **Rotate** | `rotate90/180/270`, nearest-neighbour for other angles |
//! | **Scale** | `resize_exact` with Lanczos3 |
//! | **Draw** | shape tiles composited with `imageops::overlay` |
//!
//! The module is split into:
//! - **Codec**: [`ImageCodec`] trait + [`RustCodec`]
//! - **Operations**: [`Transform`] trait, [`Operation`] variant, [`OperationChain`]
//! - **Transforms**: the concrete rotate / scale / draw operations
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Value types the job file deserializes into

mod calculations;
pub mod codec;
pub mod operations;
pub mod params;
pub mod rust_codec;
pub mod transforms;

pub use codec::{CodecError, DecodedImage, ImageCodec};
pub use operations::{Operation, OperationChain, OperationSpec, Transform, TransformError};
pub use params::{Color, Dimension, Proportions, Quality};
pub use rust_codec::RustCodec;
pub use transforms::{Draw, Rotate, Scale, Shape, ShapeParams};
