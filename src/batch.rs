//! The batch runner.
//!
//! Turns a validated job into processing units and runs them:
//!
//! ```text
//! scan ─→ map names ─→ resolve default format ─→ group by destination
//!      ─→ (parallel) freshness check ─→ prepare destination ─→ process
//! ```
//!
//! ## Validation
//!
//! [`BatchJob::from_config`] checks everything that can be checked without
//! touching the filesystem: a source is configured, a destination root can be
//! resolved, at most one mapper is configured, and an explicit format is one
//! the codec supports. Any violation is a [`ConfigError`] raised before the
//! first file is read.
//!
//! ## Scheduling
//!
//! Units are grouped by destination path. Groups run in parallel on a rayon
//! pool; the units of one group run one after another in discovery order,
//! each with a fresh freshness check, so two sources mapped onto the same
//! destination never interleave and the last one processed wins.
//!
//! When `fail_on_error` is set, the first failing unit raises an abort flag.
//! Units already running finish, nothing new starts, and the first failure
//! is returned. Destinations written before the abort stay in place.
//!
//! ## Default format
//!
//! Without an explicit `format`, [`DefaultFormat::FirstFile`] picks the
//! format of the first unit (in discovery order) that would be processed and
//! that a decoder recognises, once, before any unit runs.

use crate::config::{self, BatchConfig, ConfigError, DefaultFormat};
use crate::freshness::{self, Freshness};
use crate::imaging::{ImageCodec, OperationChain};
use crate::mapper::{MapperSlot, MapperSpec, NameMapper};
use crate::process::{
    self, ProcessError, ProcessEvent, ProcessOptions, ProcessingUnit, SkipReason, UnitOutcome,
};
use crate::scan::{self, FileSet, PatternRules, ScanError, SourceRoot};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to process {} -> {}: {error}", .file.display(), .destination.display())]
    Aborted {
        file: PathBuf,
        destination: PathBuf,
        #[source]
        error: ProcessError,
    },
}

/// Run-wide settings, immutable once the run starts.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub overwrite: bool,
    pub fail_on_error: bool,
    pub format: Option<String>,
    pub default_format: DefaultFormat,
    pub gc: bool,
    pub threads: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            overwrite: false,
            fail_on_error: true,
            format: None,
            default_format: DefaultFormat::FirstFile,
            gc: false,
            threads: 1,
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            overwrite: config.overwrite,
            fail_on_error: config.fail_on_error,
            format: config.format.as_ref().map(|f| f.to_lowercase()),
            default_format: config.default_format,
            gc: config.gc,
            threads: config::effective_threads(&config.processing),
        }
    }

    /// Worker count actually used. `gc` keeps a single image in memory.
    pub fn worker_count(&self) -> usize {
        if self.gc { 1 } else { self.threads.max(1) }
    }
}

/// Shared, thread-safe counters for one run.
#[derive(Debug, Default)]
pub struct RunCounters {
    written: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl RunCounters {
    pub fn written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            written: self.written.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Totals for a finished run. `skipped` counts up-to-date destinations and
/// undecodable sources; unmapped sources are not units and are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} written, {} skipped", self.written, self.skipped)?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

/// Units produced by mapping every discovered source.
#[derive(Debug, Default)]
pub struct UnitPlan {
    pub units: Vec<ProcessingUnit>,
    /// Sources the mapper did not handle.
    pub unmapped: Vec<PathBuf>,
}

/// Map every source of every root to its destinations under `dest_root`.
///
/// Order is discovery order: roots in order, names in order, mapper results
/// in order.
pub fn plan_units(roots: &[SourceRoot], dest_root: &Path, mapper: &dyn NameMapper) -> UnitPlan {
    let mut plan = UnitPlan::default();
    for root in roots {
        for name in &root.files {
            let source = absolute(&root.dir.join(name));
            match mapper.map(name) {
                Some(dest_names) => plan.units.extend(
                    dest_names
                        .iter()
                        .map(|d| ProcessingUnit::new(source.clone(), absolute(&dest_root.join(d)))),
                ),
                None => plan.unmapped.push(source),
            }
        }
    }
    plan
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Group units that share a destination, keeping discovery order both
/// between groups (by first appearance) and inside each group.
pub fn group_by_destination(units: Vec<ProcessingUnit>) -> Vec<Vec<ProcessingUnit>> {
    let mut index: HashMap<PathBuf, usize> = HashMap::new();
    let mut groups: Vec<Vec<ProcessingUnit>> = Vec::new();
    for unit in units {
        match index.get(&unit.destination) {
            Some(&i) => groups[i].push(unit),
            None => {
                index.insert(unit.destination.clone(), groups.len());
                groups.push(vec![unit]);
            }
        }
    }
    groups
}

/// Fix the output format for the whole run.
///
/// Returns `None` when every unit keeps its own detected format.
pub fn resolve_default_format(
    units: &[ProcessingUnit],
    codec: &impl ImageCodec,
    settings: &RunSettings,
) -> Option<String> {
    if let Some(format) = &settings.format {
        return Some(format.clone());
    }
    if settings.default_format == DefaultFormat::PerFile {
        return None;
    }
    for unit in units {
        match freshness::check(&unit.source, &unit.destination, settings.overwrite) {
            Ok(Freshness::Proceed) => {}
            Ok(Freshness::Skip) => continue,
            Err(e) => {
                debug!(source = %unit.source.display(), error = %e, "Not probing");
                continue;
            }
        }
        match codec.probe_format(&unit.source) {
            Ok(Some(format)) => {
                debug!(source = %unit.source.display(), %format, "Default format set by first file");
                return Some(format);
            }
            Ok(None) => {}
            Err(e) => debug!(source = %unit.source.display(), error = %e, "Probe failed"),
        }
    }
    None
}

fn send(events: Option<&Sender<ProcessEvent>>, event: ProcessEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

/// Everything a worker needs to run one unit.
struct UnitContext<'a, C: ImageCodec> {
    codec: &'a C,
    chain: &'a OperationChain,
    settings: &'a RunSettings,
    options: ProcessOptions<'a>,
    counters: &'a RunCounters,
    events: Option<&'a Sender<ProcessEvent>>,
}

impl<C: ImageCodec> UnitContext<'_, C> {
    fn run(&self, unit: &ProcessingUnit) -> Result<(), BatchError> {
        let decision = match freshness::check(&unit.source, &unit.destination, self.settings.overwrite)
        {
            Ok(d) => d,
            Err(e) => return self.fail(unit, ProcessError::Io(e)),
        };
        if decision == Freshness::Skip {
            self.counters.skipped();
            send(
                self.events,
                ProcessEvent::Skipped {
                    source: unit.source.clone(),
                    destination: Some(unit.destination.clone()),
                    reason: SkipReason::UpToDate,
                },
            );
            return Ok(());
        }

        if let Err(e) = freshness::prepare_destination(&unit.source, &unit.destination) {
            return self.fail(unit, ProcessError::Io(e));
        }

        send(
            self.events,
            ProcessEvent::Started {
                source: unit.source.clone(),
                destination: unit.destination.clone(),
            },
        );

        match process::process_unit(self.codec, unit, self.chain, &self.options) {
            Ok(UnitOutcome::Written { format }) => {
                self.counters.written();
                send(
                    self.events,
                    ProcessEvent::Written {
                        destination: unit.destination.clone(),
                        format,
                    },
                );
                Ok(())
            }
            Ok(UnitOutcome::Skipped(reason)) => {
                self.counters.skipped();
                send(
                    self.events,
                    ProcessEvent::Skipped {
                        source: unit.source.clone(),
                        destination: Some(unit.destination.clone()),
                        reason,
                    },
                );
                Ok(())
            }
            Ok(UnitOutcome::Failed(message)) => {
                warn!(source = %unit.source.display(), %message, "Failed to save the transformed file");
                self.counters.failed();
                send(
                    self.events,
                    ProcessEvent::Failed {
                        source: unit.source.clone(),
                        destination: unit.destination.clone(),
                        message,
                    },
                );
                Ok(())
            }
            Err(e) => self.fail(unit, e),
        }
    }

    /// Apply the failure policy to a unit error.
    fn fail(&self, unit: &ProcessingUnit, err: ProcessError) -> Result<(), BatchError> {
        if self.settings.fail_on_error {
            error!(source = %unit.source.display(), error = %err, "Aborting run");
            return Err(BatchError::Aborted {
                file: unit.source.clone(),
                destination: unit.destination.clone(),
                error: err,
            });
        }
        warn!(source = %unit.source.display(), error = %err, "Error processing file");
        self.counters.failed();
        send(
            self.events,
            ProcessEvent::Failed {
                source: unit.source.clone(),
                destination: unit.destination.clone(),
                message: err.to_string(),
            },
        );
        Ok(())
    }
}

/// Map, schedule, and process every discovered source.
///
/// Returns the run totals, or the first failure when `fail_on_error` is set.
/// A [`ProcessEvent::Summary`] is sent at the end of a run that was not
/// aborted.
pub fn run_batch(
    roots: &[SourceRoot],
    dest_root: &Path,
    mapper: &dyn NameMapper,
    chain: &OperationChain,
    codec: &impl ImageCodec,
    settings: &RunSettings,
    events: Option<Sender<ProcessEvent>>,
) -> Result<RunSummary, BatchError> {
    let events = events.as_ref();
    let plan = plan_units(roots, dest_root, mapper);
    for source in plan.unmapped {
        debug!(source = %source.display(), "Skipped, no mapping");
        send(
            events,
            ProcessEvent::Skipped {
                source,
                destination: None,
                reason: SkipReason::Unmapped,
            },
        );
    }

    let format = resolve_default_format(&plan.units, codec, settings);
    let groups = group_by_destination(plan.units);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.worker_count())
        .build()?;

    let counters = RunCounters::default();
    let abort = AtomicBool::new(false);
    let first_error: Mutex<Option<BatchError>> = Mutex::new(None);
    let context = UnitContext {
        codec,
        chain,
        settings,
        options: ProcessOptions {
            overwrite: settings.overwrite,
            format: format.as_deref(),
        },
        counters: &counters,
        events,
    };

    pool.install(|| {
        groups.par_iter().for_each(|group| {
            for unit in group {
                if abort.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(e) = context.run(unit) {
                    abort.store(true, Ordering::SeqCst);
                    let mut slot = first_error.lock().unwrap_or_else(|p| p.into_inner());
                    slot.get_or_insert(e);
                    return;
                }
            }
        });
    });

    if let Some(e) = first_error.into_inner().unwrap_or_else(|p| p.into_inner()) {
        return Err(e);
    }

    let summary = counters.snapshot();
    send(
        events,
        ProcessEvent::Summary {
            written: summary.written,
        },
    );
    Ok(summary)
}

/// What a run would do with one source, without doing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    Process,
    UpToDate,
    Unmapped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub action: PlannedAction,
}

/// A validated, ready-to-run job.
pub struct BatchJob {
    pub filesets: Vec<FileSet>,
    pub dest_root: PathBuf,
    pub mapper: Box<dyn NameMapper>,
    pub chain: OperationChain,
    pub settings: RunSettings,
}

impl BatchJob {
    /// Validate `config` and build the job.
    ///
    /// `extra_mapper` is a mapper configured outside the job file (the
    /// `--map` flag); combined with a `[mapper]` table it is a
    /// [`ConfigError::DuplicateMapper`].
    pub fn from_config(
        config: &BatchConfig,
        extra_mapper: Option<MapperSpec>,
        codec: &impl ImageCodec,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut filesets = Vec::new();
        if let Some(dir) = &config.src_dir {
            let rules = PatternRules::new(
                &config.scan.include,
                &config.scan.exclude,
                config.scan.default_excludes,
            )?;
            filesets.push(FileSet::new(dir, rules));
        }
        for set in &config.filesets {
            let rules = PatternRules::new(&set.include, &set.exclude, set.default_excludes)?;
            filesets.push(FileSet::new(&set.dir, rules));
        }
        if filesets.is_empty() {
            return Err(ConfigError::MissingSource);
        }

        let dest_root = config
            .dest_dir
            .clone()
            .or_else(|| config.src_dir.clone())
            .ok_or(ConfigError::MissingDestination)?;

        let mut slot = MapperSlot::default();
        if let Some(spec) = &config.mapper {
            slot.configure(spec.clone())?;
        }
        if let Some(spec) = extra_mapper {
            slot.configure(spec)?;
        }
        let mapper = slot.build()?;

        let settings = RunSettings::from_config(config);
        if let Some(format) = &settings.format {
            let supported = codec.supported_formats();
            if !supported.contains(format) {
                return Err(ConfigError::UnknownFormat {
                    format: format.clone(),
                    supported: supported.into_iter().collect::<Vec<_>>().join(", "),
                });
            }
        }

        Ok(Self {
            filesets,
            dest_root,
            mapper,
            chain: OperationChain::from_specs(&config.operations),
            settings,
        })
    }

    /// Scan and process everything.
    pub fn run(
        &self,
        codec: &impl ImageCodec,
        events: Option<Sender<ProcessEvent>>,
    ) -> Result<RunSummary, BatchError> {
        let roots = scan::scan(&self.filesets)?;
        run_batch(
            &roots,
            &self.dest_root,
            self.mapper.as_ref(),
            &self.chain,
            codec,
            &self.settings,
            events,
        )
    }

    /// Scan and map, then report what a run would do. Touches no files.
    pub fn plan(&self) -> Result<Vec<PlanEntry>, BatchError> {
        let roots = scan::scan(&self.filesets)?;
        let plan = plan_units(&roots, &self.dest_root, self.mapper.as_ref());

        let mut entries: Vec<PlanEntry> = plan
            .unmapped
            .into_iter()
            .map(|source| PlanEntry {
                source,
                destination: None,
                action: PlannedAction::Unmapped,
            })
            .collect();
        for unit in plan.units {
            let action = match freshness::check(&unit.source, &unit.destination, self.settings.overwrite) {
                Ok(Freshness::Skip) => PlannedAction::UpToDate,
                _ => PlannedAction::Process,
            };
            entries.push(PlanEntry {
                source: unit.source,
                destination: Some(unit.destination),
                action,
            });
        }
        Ok(entries)
    }
}
