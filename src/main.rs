use clap::{Parser, Subcommand};
use imgbatch::batch::BatchJob;
use imgbatch::config::{self, BatchConfig, ConfigOverrides};
use imgbatch::imaging::{ImageCodec, Quality, RustCodec};
use imgbatch::mapper::MapperSpec;
use imgbatch::{logging, output};
use std::path::PathBuf;

fn version_string() -> &'static str {
    let on_tag = env!("IMGBATCH_ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("IMGBATCH_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup; called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "imgbatch")]
#[command(about = "Batch-transform images through an ordered operation chain")]
#[command(long_about = "\
Batch-transform images through an ordered operation chain

Every image found in the source directories is mapped to one or more
destination names, decoded, passed through the configured operations in
order, and encoded again. Destinations newer than their source are skipped
unless --overwrite is given.

Job file (imgbatch.toml, or --config PATH):

  src_dir = \"photos\"
  dest_dir = \"web\"

  [mapper]
  type = \"glob\"
  from = \"*.jpg\"
  to = \"*.png\"

  [[operations]]
  type = \"scale\"
  width = \"50%\"
  proportions = \"width\"

Command-line flags override the job file.
Run 'imgbatch gen-config' to print a documented job file.")]
#[command(version = version_string())]
struct Cli {
    /// Job file (default: ./imgbatch.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Source directory
    #[arg(long, global = true)]
    src_dir: Option<PathBuf>,

    /// Destination root (default: the source directory)
    #[arg(long, global = true)]
    dest_dir: Option<PathBuf>,

    /// Glob selecting source files, relative to the source directory (repeatable)
    #[arg(long, global = true)]
    include: Vec<String>,

    /// Glob removing source files (repeatable)
    #[arg(long, global = true)]
    exclude: Vec<String>,

    /// Rebuild destinations even when they are up to date
    #[arg(long, global = true)]
    overwrite: bool,

    /// Report failing images and keep going instead of aborting
    #[arg(long, global = true)]
    no_fail_on_error: bool,

    /// Output format for every image (see 'imgbatch formats')
    #[arg(long, global = true)]
    format: Option<String>,

    /// Process one image at a time to keep memory use low
    #[arg(long, global = true)]
    gc: bool,

    /// Rename with a glob mapping, e.g. '*.jpg=*.png'
    #[arg(long, value_name = "FROM=TO", global = true)]
    map: Option<String>,

    /// Show skipped files and debug diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write diagnostics to stderr as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every source image
    Run,
    /// Validate the job and list what a run would do, without writing anything
    Check {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the supported format names
    Formats,
    /// Print a stock imgbatch.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs);

    match &cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Formats => {
            let formats = RustCodec::new().supported_formats();
            for name in output::format_formats(&formats) {
                println!("{}", name);
            }
        }
        Command::Check { json } => {
            let (config, extra_mapper) = load_config(&cli)?;
            let codec = codec_for(&config);
            let job = BatchJob::from_config(&config, extra_mapper, &codec)?;
            let entries = job.plan()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                output::print_plan(&entries);
                println!("==> Job is valid");
            }
        }
        Command::Run => {
            let (config, extra_mapper) = load_config(&cli)?;
            let codec = codec_for(&config);
            let job = BatchJob::from_config(&config, extra_mapper, &codec)?;

            let verbose = cli.verbose;
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_process_event(&event, verbose) {
                        println!("{}", line);
                    }
                }
            });
            let result = job.run(&codec, Some(tx));
            printer.join().map_err(|_| "output thread panicked")?;

            let summary = result?;
            if verbose {
                println!("Totals: {}", summary);
            }
        }
    }

    Ok(())
}

/// Load the job file and apply command-line overrides.
///
/// The `--map` flag is returned separately: it is a mapper configuration of
/// its own, and the job builder rejects it next to a `[mapper]` table.
fn load_config(cli: &Cli) -> Result<(BatchConfig, Option<MapperSpec>), config::ConfigError> {
    let mut config = config::load_config(cli.config.as_deref())?;
    ConfigOverrides {
        src_dir: cli.src_dir.clone(),
        dest_dir: cli.dest_dir.clone(),
        include: cli.include.clone(),
        exclude: cli.exclude.clone(),
        overwrite: cli.overwrite,
        no_fail_on_error: cli.no_fail_on_error,
        format: cli.format.clone(),
        gc: cli.gc,
    }
    .apply(&mut config);
    config.validate()?;

    let extra_mapper = cli
        .map
        .as_deref()
        .map(MapperSpec::parse_glob_shorthand)
        .transpose()?;
    Ok((config, extra_mapper))
}

fn codec_for(config: &BatchConfig) -> RustCodec {
    RustCodec::with_quality(Quality::new(config.encoding.quality))
}
