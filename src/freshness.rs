//! Freshness policy: decide whether a destination needs rebuilding.
//!
//! The decision itself is a pure function of modification times and the
//! overwrite flag ([`decide`]). Everything that touches the filesystem goes
//! through two helpers:
//!
//! - [`check`] reads live metadata and applies [`decide`].
//! - [`prepare_destination`] removes a stale destination before it is
//!   rewritten. It is idempotent and is the only place destinations are
//!   deleted, whether before processing, before an overwrite, or while
//!   cleaning up after a failure.
//!
//! A destination that resolves to the source file itself is never deleted.

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Destination is up to date; leave it alone.
    Skip,
    /// Destination is missing, stale, or overwrite was requested.
    Proceed,
}

/// Pure freshness decision.
///
/// `dest_mtime` is `None` when the destination does not exist. Equal
/// timestamps count as up to date.
pub fn decide(source_mtime: SystemTime, dest_mtime: Option<SystemTime>, overwrite: bool) -> Freshness {
    match dest_mtime {
        None => Freshness::Proceed,
        Some(_) if overwrite => Freshness::Proceed,
        Some(dest) if source_mtime <= dest => Freshness::Skip,
        Some(_) => Freshness::Proceed,
    }
}

/// Apply [`decide`] to the files on disk.
pub fn check(source: &Path, dest: &Path, overwrite: bool) -> io::Result<Freshness> {
    let source_mtime = fs::metadata(source)?.modified()?;
    let dest_mtime = match fs::metadata(dest) {
        Ok(meta) => Some(meta.modified()?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };
    let decision = decide(source_mtime, dest_mtime, overwrite);
    debug!(
        source = %source.display(),
        dest = %dest.display(),
        dest_exists = dest_mtime.is_some(),
        overwrite,
        ?decision,
        "Freshness decision"
    );
    Ok(decision)
}

/// Whether two paths name the same file.
///
/// Both paths are canonicalized when they exist. A path that cannot be
/// canonicalized (typically because it does not exist yet) is compared by
/// its absolute form instead.
pub fn same_file(a: &Path, b: &Path) -> bool {
    let resolve = |p: &Path| {
        fs::canonicalize(p)
            .or_else(|_| std::path::absolute(p))
            .unwrap_or_else(|_| p.to_path_buf())
    };
    resolve(a) == resolve(b)
}

/// Remove `dest` so it can be rewritten from `source`.
///
/// Returns `Ok(true)` if a file was deleted and `Ok(false)` if there was
/// nothing to do: the destination is missing or is the source itself.
/// Calling it twice in a row is harmless.
pub fn prepare_destination(source: &Path, dest: &Path) -> io::Result<bool> {
    if same_file(source, dest) {
        debug!(path = %dest.display(), "Destination is the source, not deleting");
        return Ok(false);
    }
    match fs::remove_file(dest) {
        Ok(()) => {
            debug!(path = %dest.display(), "Removed stale destination");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
