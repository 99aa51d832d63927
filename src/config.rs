//! Job configuration.
//!
//! A run is described by a TOML job file (`imgbatch.toml` in the working
//! directory, or the file given with `--config`). Stock defaults are the
//! base layer, the job file is merged on top, and command-line flags
//! override the result.
//!
//! ## Job File
//!
//! ```toml
//! # Everything is optional; defaults shown.
//!
//! src_dir = "photos"        # Source directory (also the destination if dest_dir is unset)
//! dest_dir = "web"          # Destination root
//! overwrite = false         # Rebuild even when the destination is newer
//! fail_on_error = true      # Abort the run on the first failing image
//! # format = "png"          # Output format for every image
//! default_format = "first-file"  # or "per-file"
//! gc = false                # Process one image at a time
//!
//! [scan]
//! include = ["**/*.jpg"]
//! exclude = ["drafts/**"]
//! default_excludes = true
//!
//! [[filesets]]              # More source directories
//! dir = "scans"
//! include = ["**/*.tif"]
//!
//! [mapper]
//! type = "glob"
//! from = "*.jpg"
//! to = "*.png"
//!
//! [[operations]]
//! type = "scale"
//! width = "50%"
//! proportions = "width"
//!
//! [encoding]
//! quality = 90              # JPEG quality (1-100)
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Relative paths in a job file are resolved against the job file's
//! directory. Unknown keys are rejected to catch typos early.

use crate::imaging::OperationSpec;
use crate::mapper::MapperSpec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Job file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "imgbatch.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("No source configured: set src_dir or add a [[filesets]] entry")]
    MissingSource,
    #[error("No destination configured: set dest_dir, or src_dir to write in place")]
    MissingDestination,
    #[error("Only one mapper may be configured per run")]
    DuplicateMapper,
    #[error("Unsupported format '{format}'. Supported formats: {supported}")]
    UnknownFormat { format: String, supported: String },
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: globset::Error,
    },
    #[error("Invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// How the output format is chosen when `format` is not set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultFormat {
    /// The first image that gets processed decides the format for the
    /// whole run.
    #[default]
    FirstFile,
    /// Every image keeps the format it was decoded from.
    PerFile,
}

/// Job configuration loaded from `imgbatch.toml`.
///
/// All fields have defaults. Job files need only specify the values they
/// want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Source directory scanned with the `[scan]` patterns.
    pub src_dir: Option<PathBuf>,
    /// Destination root. Falls back to `src_dir`.
    pub dest_dir: Option<PathBuf>,
    /// Rebuild destinations even when they are newer than their source.
    pub overwrite: bool,
    /// Abort the run on the first failing image.
    pub fail_on_error: bool,
    /// Output format for every image.
    pub format: Option<String>,
    /// Output format choice when `format` is unset.
    pub default_format: DefaultFormat,
    /// Process one image at a time.
    pub gc: bool,
    /// Include/exclude patterns for `src_dir`.
    pub scan: ScanConfig,
    /// Additional source directories, scanned after `src_dir`.
    pub filesets: Vec<FileSetConfig>,
    /// Source-to-destination name mapping. Identity when absent.
    pub mapper: Option<MapperSpec>,
    /// Operation chain, applied in order.
    pub operations: Vec<OperationSpec>,
    /// Encoder settings.
    pub encoding: EncodingConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            src_dir: None,
            dest_dir: None,
            overwrite: false,
            fail_on_error: true,
            format: None,
            default_format: DefaultFormat::default(),
            gc: false,
            scan: ScanConfig::default(),
            filesets: Vec::new(),
            mapper: None,
            operations: Vec::new(),
            encoding: EncodingConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.encoding.quality) {
            return Err(ConfigError::Validation(
                "encoding.quality must be 1-100".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if self.format.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err(ConfigError::Validation("format must not be empty".into()));
        }
        for (i, op) in self.operations.iter().enumerate() {
            op.validate()
                .map_err(|msg| ConfigError::Validation(format!("operations[{i}]: {msg}")))?;
        }
        Ok(())
    }

    /// Resolve relative directories against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(dir) = self.src_dir.as_mut() {
            resolve(dir);
        }
        if let Some(dir) = self.dest_dir.as_mut() {
            resolve(dir);
        }
        for set in &mut self.filesets {
            resolve(&mut set.dir);
        }
    }
}

fn default_true() -> bool {
    true
}

/// Include/exclude patterns for `src_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Globs selecting files. Empty selects everything.
    pub include: Vec<String>,
    /// Globs removing files. Excludes win over includes.
    pub exclude: Vec<String>,
    /// Also exclude version-control and editor files.
    pub default_excludes: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            default_excludes: true,
        }
    }
}

/// One extra source directory with its own patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSetConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_true")]
    pub default_excludes: bool,
}

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    /// Quality for lossy encoders (1-100).
    pub quality: u32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Values given on the command line. `None`/`false` leaves the job file
/// value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub src_dir: Option<PathBuf>,
    pub dest_dir: Option<PathBuf>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub overwrite: bool,
    pub no_fail_on_error: bool,
    pub format: Option<String>,
    pub gc: bool,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut BatchConfig) {
        if let Some(dir) = self.src_dir {
            config.src_dir = Some(dir);
        }
        if let Some(dir) = self.dest_dir {
            config.dest_dir = Some(dir);
        }
        if !self.include.is_empty() {
            config.scan.include = self.include;
        }
        if !self.exclude.is_empty() {
            config.scan.exclude = self.exclude;
        }
        if self.overwrite {
            config.overwrite = true;
        }
        if self.no_fail_on_error {
            config.fail_on_error = false;
        }
        if let Some(format) = self.format {
            config.format = Some(format);
        }
        if self.gc {
            config.gc = true;
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(BatchConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a job file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BatchConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BatchConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the job configuration.
///
/// With `Some(path)` the file must exist. With `None`, [`DEFAULT_CONFIG_FILE`]
/// in the working directory is used if present, stock defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<BatchConfig, ConfigError> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };
    let overlay = path.as_deref().map(load_raw_config).transpose()?;
    let mut config = resolve_config(stock_defaults_value()?, overlay)?;

    if let Some(base) = path.as_deref().and_then(Path::parent) {
        config.resolve_paths(base);
    }
    Ok(config)
}

/// Returns a fully-commented stock `imgbatch.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgbatch job file
# =================
# All settings are optional. Values shown below are the defaults.
# Command-line flags override anything set here.
# Relative paths are resolved against this file's directory.
# Unknown keys will cause an error.

# Source directory, scanned with the [scan] patterns.
# src_dir = "photos"

# Destination root. When unset, images are written back into src_dir.
# dest_dir = "web"

# Rebuild destinations even when they are newer than their source.
overwrite = false

# Abort the whole run on the first failing image.
# With false, failures are reported and the run continues.
fail_on_error = true

# Output format for every image (see `imgbatch formats`).
# format = "png"

# When format is unset:
#   "first-file" - the first processed image decides the format for the run
#   "per-file"   - every image keeps the format it was decoded from
default_format = "first-file"

# Process one image at a time to keep memory use low.
gc = false

# ---------------------------------------------------------------------------
# Source discovery
# ---------------------------------------------------------------------------
[scan]
# Globs matched against paths relative to src_dir.
# `*` stays inside one directory, `**` crosses directories.
# An empty include list selects every file.
include = []
exclude = []

# Skip version-control and editor files (.git, .DS_Store, *~, ...).
default_excludes = true

# Additional source directories, processed after src_dir.
# [[filesets]]
# dir = "scans"
# include = ["**/*.tif"]
# exclude = []

# ---------------------------------------------------------------------------
# Name mapping (one mapper per run; identity when unset)
# ---------------------------------------------------------------------------
# [mapper]
# type = "glob"            # identity | flatten | merge | glob | regex | composite | chained
# from = "*.jpg"
# to = "*.png"
# case_sensitive = true

# ---------------------------------------------------------------------------
# Operations, applied in order
# ---------------------------------------------------------------------------
# [[operations]]
# type = "rotate"
# angle = 90               # degrees clockwise
#
# [[operations]]
# type = "scale"
# width = "50%"            # pixels ("200") or percent ("50%")
# height = "100%"
# proportions = "width"    # ignore | width | height | fit | cover
#
# [[operations]]
# type = "draw"
# xloc = 10
# yloc = 10
# shapes = [
#     { type = "rectangle", width = 40, height = 20, fill = "#ff000080" },
#     { type = "ellipse", width = 30, height = 30, stroke = "white", stroke_width = 2 },
# ]

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
[encoding]
# Quality for lossy encoders such as JPEG (1 = worst, 100 = best).
quality = 90

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::{Dimension, Proportions};
    use crate::imaging::transforms::Scale;
    use tempfile::TempDir;

    fn parse(toml_str: &str) -> Result<BatchConfig, ConfigError> {
        let overlay: toml::Value = toml::from_str(toml_str)?;
        resolve_config(stock_defaults_value()?, Some(overlay))
    }

    // =========================================================================
    // Defaults
    // =========================================================================

    #[test]
    fn default_config_values() {
        let config = BatchConfig::default();
        assert!(config.src_dir.is_none());
        assert!(!config.overwrite);
        assert!(config.fail_on_error);
        assert_eq!(config.default_format, DefaultFormat::FirstFile);
        assert!(config.scan.default_excludes);
        assert_eq!(config.encoding.quality, 90);
        assert!(config.mapper.is_none());
        assert!(config.operations.is_empty());
    }

    #[test]
    fn stock_defaults_round_trip() {
        let config = resolve_config(stock_defaults_value().unwrap(), None).unwrap();
        assert_eq!(config, BatchConfig::default());
    }

    #[test]
    fn stock_config_toml_parses_to_defaults() {
        let config = parse(stock_config_toml()).unwrap();
        assert_eq!(config, BatchConfig::default());
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn parse_full_job_file() {
        let config = parse(
            r##"
src_dir = "photos"
dest_dir = "web"
overwrite = true
fail_on_error = false
format = "png"
default_format = "per-file"
gc = true

[scan]
include = ["**/*.jpg"]

[[filesets]]
dir = "scans"
include = ["*.tif"]

[mapper]
type = "glob"
from = "*.jpg"
to = "*.png"

[[operations]]
type = "scale"
width = "50%"
proportions = "width"

[[operations]]
type = "rotate"
angle = 90

[encoding]
quality = 75

[processing]
max_processes = 2
"##,
        )
        .unwrap();

        assert_eq!(config.src_dir, Some(PathBuf::from("photos")));
        assert!(config.overwrite);
        assert!(!config.fail_on_error);
        assert_eq!(config.format.as_deref(), Some("png"));
        assert_eq!(config.default_format, DefaultFormat::PerFile);
        assert!(config.gc);
        assert_eq!(config.scan.include, vec!["**/*.jpg"]);
        assert!(config.scan.default_excludes);
        assert_eq!(config.filesets.len(), 1);
        assert!(config.filesets[0].default_excludes);
        assert!(matches!(config.mapper, Some(MapperSpec::Glob { .. })));
        assert_eq!(config.operations.len(), 2);
        assert_eq!(
            config.operations[0],
            OperationSpec::Scale(Scale {
                width: Dimension::Percent(50.0),
                height: Dimension::Percent(100.0),
                proportions: Proportions::Width,
            })
        );
        assert_eq!(config.encoding.quality, 75);
        assert_eq!(config.processing.max_processes, Some(2));
    }

    #[test]
    fn partial_scan_table_keeps_defaults() {
        let config = parse("[scan]\nexclude = [\"tmp/**\"]").unwrap();
        assert_eq!(config.scan.exclude, vec!["tmp/**"]);
        assert!(config.scan.default_excludes);
        assert!(config.scan.include.is_empty());
    }

    // =========================================================================
    // Unknown key rejection
    // =========================================================================

    #[test]
    fn unknown_top_level_key_rejected() {
        assert!(matches!(
            parse("overwrit = true"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn unknown_nested_key_rejected() {
        assert!(parse("[encoding]\nqualty = 50").is_err());
        assert!(parse("[[operations]]\ntype = \"rotate\"\nangel = 90").is_err());
        assert!(parse("[[operations]]\ntype = \"blur\"").is_err());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn quality_out_of_range() {
        assert!(matches!(
            parse("[encoding]\nquality = 0"),
            Err(ConfigError::Validation(_))
        ));
        assert!(parse("[encoding]\nquality = 101").is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(
            parse("[processing]\nmax_processes = 0"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn invalid_operation_reports_index() {
        let err = parse(
            r#"
[[operations]]
type = "rotate"
angle = 90

[[operations]]
type = "rectangle"
width = 0
height = 5
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("operations[1]"), "{err}");
    }

    #[test]
    fn empty_format_rejected() {
        assert!(parse("format = \"\"").is_err());
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_job_value_wins() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str("overwrite = true").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("overwrite").and_then(|v| v.as_bool()), Some(true));
        // untouched defaults survive
        assert_eq!(merged.get("fail_on_error").and_then(|v| v.as_bool()), Some(true));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[scan]
include = ["*.png"]
default_excludes = true
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[scan]
default_excludes = false
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let scan = merged.get("scan").unwrap();
        assert_eq!(scan.get("default_excludes").unwrap().as_bool(), Some(false));
        // include preserved from base
        assert_eq!(scan.get("include").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn merge_toml_operation_lists_replace() {
        let base: toml::Value =
            toml::from_str("[[operations]]\ntype = \"rotate\"\nangle = 90\n").unwrap();
        let overlay: toml::Value = toml::from_str("operations = []").unwrap();
        let merged = merge_toml(base, overlay);
        assert!(merged["operations"].as_array().unwrap().is_empty());
    }

    // =========================================================================
    // Loading from disk
    // =========================================================================

    #[test]
    fn load_config_resolves_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("job.toml");
        fs::write(
            &path,
            "src_dir = \"in\"\ndest_dir = \"/abs/out\"\n[[filesets]]\ndir = \"more\"\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.src_dir, Some(tmp.path().join("in")));
        assert_eq!(config.dest_dir, Some(PathBuf::from("/abs/out")));
        assert_eq!(config.filesets[0].dir, tmp.path().join("more"));
    }

    #[test]
    fn load_config_explicit_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(Some(&tmp.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("job.toml");
        fs::write(&path, "this is not toml = = =").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::Toml(_))
        ));
    }

    // =========================================================================
    // CLI overrides
    // =========================================================================

    #[test]
    fn overrides_replace_only_given_values() {
        let mut config = parse("src_dir = \"a\"\nformat = \"jpeg\"\n[scan]\ninclude = [\"*.png\"]").unwrap();
        ConfigOverrides {
            dest_dir: Some("out".into()),
            no_fail_on_error: true,
            format: Some("png".into()),
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.src_dir, Some(PathBuf::from("a")));
        assert_eq!(config.dest_dir, Some(PathBuf::from("out")));
        assert!(!config.fail_on_error);
        assert_eq!(config.format.as_deref(), Some("png"));
        assert_eq!(config.scan.include, vec!["*.png"]);
        assert!(!config.overwrite);
    }

    // =========================================================================
    // effective_threads
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }
}
