//! Per-file processing.
//!
//! [`process_unit`] takes one [`ProcessingUnit`] (a source file and the
//! destination it maps to) through the whole pipeline:
//!
//! ```text
//! decode ─→ resolve format ─→ operation chain ─→ create parent dir
//!        ─→ remove old destination (overwrite) ─→ encode
//! ```
//!
//! ## Outcomes
//!
//! | Situation | Result |
//! |---|---|
//! | Destination written | `Ok(UnitOutcome::Written)` |
//! | No decoder recognises the source | `Ok(UnitOutcome::Skipped(NoDecoder))` |
//! | No writer for the resolved format | `Ok(UnitOutcome::Failed)`, never aborts a run |
//! | Anything else | `Err(ProcessError)`; the caller applies `fail_on_error` |
//!
//! When an error happens after the destination directory was prepared, the
//! partially written destination is removed before the error is returned.
//! The source file itself is never removed: a unit whose destination is the
//! source is written through a temporary sibling and renamed into place.
//!
//! ## Events
//!
//! Progress is reported as [`ProcessEvent`]s. Each event carries a
//! [`Severity`]; the CLI prints verbose events only when asked to.

use crate::freshness;
use crate::imaging::{CodecError, DecodedImage, ImageCodec, OperationChain, TransformError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image codec failed: {0}")]
    Codec(#[from] CodecError),
    #[error("Operation chain failed: {0}")]
    Transform(#[from] TransformError),
    #[error("Failed to create parent directory {path}: {source}")]
    DestinationSetup {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One resolved (source, destination) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingUnit {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl ProcessingUnit {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Per-unit settings, fixed for the whole run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions<'a> {
    pub overwrite: bool,
    /// Output format. `None` keeps the format the decoder detected.
    pub format: Option<&'a str>,
}

/// Why a source or unit was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The mapper does not handle the source name.
    Unmapped,
    /// The destination is newer than the source.
    UpToDate,
    /// No decoder recognises the source content.
    NoDecoder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Written { format: String },
    Skipped(SkipReason),
    /// The unit did not produce output but the run continues regardless of
    /// the failure policy.
    Failed(String),
}

/// How loudly an event should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Verbose,
}

/// Progress events sent from the batch runner to the CLI printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessEvent {
    Started {
        source: PathBuf,
        destination: PathBuf,
    },
    Written {
        destination: PathBuf,
        format: String,
    },
    Skipped {
        source: PathBuf,
        destination: Option<PathBuf>,
        reason: SkipReason,
    },
    Failed {
        source: PathBuf,
        destination: PathBuf,
        message: String,
    },
    Summary {
        written: usize,
    },
}

impl ProcessEvent {
    pub fn severity(&self) -> Severity {
        match self {
            ProcessEvent::Skipped {
                reason: SkipReason::Unmapped | SkipReason::UpToDate,
                ..
            }
            | ProcessEvent::Written { .. } => Severity::Verbose,
            _ => Severity::Info,
        }
    }
}

/// Process one unit.
///
/// The caller has already decided the unit should proceed (see
/// [`freshness::check`]).
pub fn process_unit(
    codec: &impl ImageCodec,
    unit: &ProcessingUnit,
    chain: &OperationChain,
    options: &ProcessOptions<'_>,
) -> Result<UnitOutcome, ProcessError> {
    let mut touched = false;
    let result = run_steps(codec, unit, chain, options, &mut touched);
    if result.is_err() && touched {
        // best effort; the original error is what gets reported
        if let Err(e) = freshness::prepare_destination(&unit.source, &unit.destination) {
            debug!(path = %unit.destination.display(), error = %e, "Cleanup failed");
        }
    }
    result
}

fn run_steps(
    codec: &impl ImageCodec,
    unit: &ProcessingUnit,
    chain: &OperationChain,
    options: &ProcessOptions<'_>,
    touched: &mut bool,
) -> Result<UnitOutcome, ProcessError> {
    let Some(DecodedImage { image, format: detected }) = codec.decode(&unit.source)? else {
        return Ok(UnitOutcome::Skipped(SkipReason::NoDecoder));
    };
    let format = options.format.map(str::to_string).unwrap_or(detected);

    let image = chain.apply(image)?;

    if let Some(parent) = unit.destination.parent() {
        fs::create_dir_all(parent).map_err(|source| ProcessError::DestinationSetup {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    *touched = true;

    if options.overwrite {
        freshness::prepare_destination(&unit.source, &unit.destination)?;
    }

    let written = if freshness::same_file(&unit.source, &unit.destination) {
        encode_in_place(codec, &image, &format, &unit.destination)
    } else {
        codec.encode(&image, &format, &unit.destination)
    };

    match written {
        Ok(()) => Ok(UnitOutcome::Written { format }),
        Err(CodecError::NoSuitableWriter(f)) => {
            Ok(UnitOutcome::Failed(format!("No writer available for format '{f}'")))
        }
        Err(e) => Err(e.into()),
    }
}

/// Encode next to `path` and rename over it, so a failed write never
/// destroys the file being replaced.
fn encode_in_place(
    codec: &impl ImageCodec,
    image: &image::DynamicImage,
    format: &str,
    path: &Path,
) -> Result<(), CodecError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.imgbatch-tmp"));

    let result = codec
        .encode(image, format, &temp)
        .and_then(|()| fs::rename(&temp, path).map_err(CodecError::from));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}
