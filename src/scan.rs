//! Source discovery.
//!
//! Walks each configured directory and produces a [`SourceRoot`]: the
//! directory plus the relative names of the files selected by its
//! include/exclude patterns.
//!
//! ## Patterns
//!
//! Patterns are globs matched against the `/`-separated relative name.
//! `*` stays within one directory level, `**` crosses levels:
//!
//! | Pattern | Matches |
//! |---|---|
//! | `*.png` | `a.png`, not `sub/a.png` |
//! | `**/*.png` | `a.png` and `sub/deeper/a.png` |
//! | `raw/**` | everything under `raw/` |
//!
//! An empty include list selects every file. Excludes always win over
//! includes. Unless disabled, [`DEFAULT_EXCLUDES`] are added to each set's
//! excludes.
//!
//! ## Ordering
//!
//! Names within a root are sorted, so discovery order (and everything that
//! depends on it, such as the first-file default format) is reproducible.

use crate::config::ConfigError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Source directory does not exist: {0}")]
    MissingDirectory(PathBuf),
    #[error("Source path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Version-control metadata and editor droppings.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/.svn/**",
    "**/.hg/**",
    "**/CVS/**",
    "**/.DS_Store",
    "**/Thumbs.db",
    "**/*~",
    "**/#*#",
    "**/.#*",
];

/// A directory plus the relative names of the files selected in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRoot {
    pub dir: PathBuf,
    pub files: Vec<String>,
}

/// Compiled include/exclude patterns.
#[derive(Debug, Default)]
pub struct PatternRules {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl PatternRules {
    pub fn new(
        include: &[String],
        exclude: &[String],
        default_excludes: bool,
    ) -> Result<Self, ConfigError> {
        let mut excludes: Vec<String> = exclude.to_vec();
        if default_excludes {
            excludes.extend(DEFAULT_EXCLUDES.iter().map(|p| p.to_string()));
        }
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(&excludes)?,
        })
    }

    /// Whether `name` (relative, `/`-separated) is selected.
    pub fn matches(&self, name: &str) -> bool {
        if self.exclude.as_ref().is_some_and(|set| set.is_match(name)) {
            return false;
        }
        self.include.as_ref().is_none_or(|set| set.is_match(name))
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, ConfigError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|source| ConfigError::InvalidPattern {
        pattern: patterns.join(", "),
        source,
    })?;
    Ok(Some(set))
}

/// A directory to scan and the rules selecting files in it.
#[derive(Debug)]
pub struct FileSet {
    pub dir: PathBuf,
    pub rules: PatternRules,
}

impl FileSet {
    pub fn new(dir: impl Into<PathBuf>, rules: PatternRules) -> Self {
        Self {
            dir: dir.into(),
            rules,
        }
    }
}

/// Scan every file set, in order.
pub fn scan(sets: &[FileSet]) -> Result<Vec<SourceRoot>, ScanError> {
    sets.iter().map(scan_fileset).collect()
}

/// Scan one file set.
pub fn scan_fileset(set: &FileSet) -> Result<SourceRoot, ScanError> {
    let dir = &set.dir;
    if !dir.exists() {
        return Err(ScanError::MissingDirectory(dir.clone()));
    }
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.clone()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = relative_name(dir, entry.path()) else {
            continue;
        };
        if set.rules.matches(&name) {
            files.push(name);
        }
    }
    files.sort();

    Ok(SourceRoot {
        dir: dir.clone(),
        files,
    })
}

/// `/`-separated path of `path` below `root`.
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}
