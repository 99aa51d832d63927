//! The operation chain.
//!
//! An [`OperationChain`] is an ordered list of [`Operation`]s, configured once
//! before a run and shared read-only by every unit. Applying it is a strict
//! left fold: `image = op(image)` for each operation in configuration order.
//!
//! Operations come in two kinds, modelled as a tagged variant rather than a
//! runtime type check:
//!
//! - [`Operation::Transform`] consumes an image and produces the next one.
//! - [`Operation::ConfigOnly`] is a nested drawing node that only a `draw`
//!   transform knows how to use. At top level it is skipped with a warning
//!   and the fold continues with the unchanged image.

use super::transforms::{Draw, Rotate, Scale, Shape, ShapeParams};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
#[error("{operation} failed: {message}")]
pub struct TransformError {
    pub operation: String,
    pub message: String,
}

impl TransformError {
    pub fn new(operation: &str, message: impl Into<String>) -> Self {
        Self {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// An operation that can consume and produce an image.
///
/// Implementations must not keep state between calls: several units may run
/// the same chain concurrently.
pub trait Transform: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError>;
}

/// One node of the chain.
#[derive(Debug)]
pub enum Operation {
    Transform(Box<dyn Transform>),
    ConfigOnly(Shape),
}

impl Operation {
    pub fn name(&self) -> String {
        match self {
            Operation::Transform(t) => t.name().to_string(),
            Operation::ConfigOnly(shape) => shape.to_string(),
        }
    }
}

/// Job-file form of an operation, tagged by `type`.
///
/// ```toml
/// [[operations]]
/// type = "scale"
/// width = "50%"
/// proportions = "width"
///
/// [[operations]]
/// type = "draw"
/// xloc = 10
/// yloc = 10
/// shapes = [{ type = "rectangle", width = 40, height = 20, fill = "#ff000080" }]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OperationSpec {
    Rotate(Rotate),
    Scale(Scale),
    Draw(Draw),
    Rectangle(ShapeParams),
    Ellipse(ShapeParams),
}

impl OperationSpec {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            OperationSpec::Rotate(r) if !r.angle.is_finite() => {
                Err("rotate.angle must be a finite number".into())
            }
            OperationSpec::Draw(d) => d.shapes.iter().try_for_each(|s| s.params().validate()),
            OperationSpec::Rectangle(p) | OperationSpec::Ellipse(p) => p.validate(),
            _ => Ok(()),
        }
    }

    pub fn build(&self) -> Operation {
        match self {
            OperationSpec::Rotate(r) => Operation::Transform(Box::new(*r)),
            OperationSpec::Scale(s) => Operation::Transform(Box::new(*s)),
            OperationSpec::Draw(d) => Operation::Transform(Box::new(d.clone())),
            OperationSpec::Rectangle(p) => Operation::ConfigOnly(Shape::Rectangle(*p)),
            OperationSpec::Ellipse(p) => Operation::ConfigOnly(Shape::Ellipse(*p)),
        }
    }
}

/// Ordered, immutable list of operations applied to every unit.
#[derive(Debug, Default)]
pub struct OperationChain {
    operations: Vec<Operation>,
}

impl OperationChain {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn from_specs(specs: &[OperationSpec]) -> Self {
        Self::new(specs.iter().map(OperationSpec::build).collect())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.operations.iter().map(Operation::name).collect()
    }

    /// Fold every operation over `image`, in order.
    ///
    /// Stops at the first failing transform.
    pub fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        self.operations
            .iter()
            .try_fold(image, |image, operation| match operation {
                Operation::Transform(transform) => transform.apply(image),
                Operation::ConfigOnly(shape) => {
                    warn!(node = %shape, "Not a transform operation, skipping");
                    Ok(image)
                }
            })
    }
}
