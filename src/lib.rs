//! # imgbatch
//!
//! Batch image transformation. Every source image found under one or more
//! directories is mapped to one or more destination names, run through an
//! ordered chain of operations (rotate, scale, draw), and written out. A
//! destination that is already newer than its source is left alone.
//!
//! # Pipeline
//!
//! ```text
//! scan      src_dir + filesets  →  SourceRoot (sorted relative names)
//! map       a/b.jpg             →  [a/b.png, thumbs/a/b.png]   (0, 1 or many)
//! freshness source vs dest mtime →  skip | proceed
//! process   decode → chain → encode, with cleanup on failure
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Source discovery with include/exclude globs |
//! | [`mapper`] | Source-to-destination name mapping rules |
//! | [`freshness`] | Skip/proceed decision and destination preparation |
//! | [`imaging`] | Codec collaborator, operation chain, concrete operations |
//! | [`process`] | One unit end to end: decode, transform, encode, clean up |
//! | [`batch`] | Validation, scheduling, failure policy, run totals |
//! | [`config`] | Job file loading, merging, validation, CLI overrides |
//! | [`output`] | CLI output formatting |
//! | [`logging`] | `tracing` subscriber setup |
//!
//! # Design Decisions
//!
//! ## Failures Are Scoped to a Unit
//!
//! A unit that fails never leaves a half-written destination behind. Whether
//! it also ends the run is decided by `fail_on_error` alone, with one
//! exception: a format nobody can write is reported and the run goes on.
//!
//! ## Parallel, but Deterministic
//!
//! Units run on a rayon pool. Anything that depends on order, like which file
//! decides the run's default output format or which of two sources mapped to
//! the same destination wins, is fixed by discovery order rather than by
//! thread timing.

pub mod batch;
pub mod config;
pub mod freshness;
pub mod imaging;
pub mod logging;
pub mod mapper;
pub mod output;
pub mod process;
pub mod scan;

#[cfg(test)]
pub(crate) mod test_helpers;
