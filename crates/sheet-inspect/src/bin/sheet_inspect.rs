//! sheet-inspect CLI: inspect a captured sheet against its template.

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use sheet_inspect::detect::{inspect_files, InspectionPaths};
use sheet_inspect::{ConfigWarning, FusionMode, InspectionMode, InspectionParams};
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing_log::LogTracer;
#[cfg(feature = "tracing")]
use tracing_subscriber::EnvFilter;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "sheet-inspect")]
#[command(about = "Detect print defects by comparing a captured sheet with its reference template")]
#[command(version)]
struct Cli {
    /// Debug-level logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect one captured image.
    Inspect(InspectArgs),

    /// Write a configuration file with every parameter spelled out.
    Config {
        /// Destination JSON file.
        #[arg(long)]
        out: PathBuf,

        /// Existing configuration to normalize (flat or nested layout);
        /// defaults when omitted.
        #[arg(long)]
        from: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Full,
    Simple,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FusionArg {
    Union,
    Weighted,
    Classic,
}

#[derive(Debug, Clone, Args)]
struct InspectArgs {
    /// Reference template image.
    #[arg(long)]
    template: PathBuf,

    /// ROI mask image, same size as the template (non-zero = inspect).
    #[arg(long)]
    mask: PathBuf,

    /// Captured image to inspect.
    #[arg(long)]
    image: PathBuf,

    /// Inspection parameters (JSON, flat or nested layout).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to write the inspection report (JSON).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Path to write the final defect mask (PNG).
    #[arg(long)]
    mask_out: Option<PathBuf>,

    /// Override the inspection mode.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Override the fusion strategy of the full mode.
    #[arg(long, value_enum)]
    fusion: Option<FusionArg>,

    /// Skip registration and assume the capture is already aligned.
    #[arg(long)]
    no_align: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    #[cfg(feature = "tracing")]
    {
        let _ = LogTracer::init_with_filter(level);
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(sheet_inspect::core::default_directives(level)));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = sheet_inspect::core::init_with_level(level);
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Inspect(args) => run_inspect(&args),
        Commands::Config { out, from } => run_config(&out, from.as_deref()),
    }
}

fn load_params(path: Option<&Path>) -> CliResult<(InspectionParams, Vec<ConfigWarning>)> {
    let Some(path) = path else {
        return Ok((InspectionParams::default(), Vec::new()));
    };
    log::info!("loading configuration: {}", path.display());
    InspectionParams::load_json(path).map_err(|e| -> CliError {
        format!("failed to load config {}: {e}", path.display()).into()
    })
}

fn run_inspect(args: &InspectArgs) -> CliResult<()> {
    let (mut params, warnings) = load_params(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        params.mode = match mode {
            ModeArg::Full => InspectionMode::Full,
            ModeArg::Simple => InspectionMode::Simple,
        };
    }
    if let Some(fusion) = args.fusion {
        params.fusion = match fusion {
            FusionArg::Union => FusionMode::Union,
            FusionArg::Weighted => FusionMode::Weighted,
            FusionArg::Classic => FusionMode::Classic,
        };
    }
    if args.no_align {
        params.align.enabled = false;
    }

    let paths = InspectionPaths {
        template: args.template.clone(),
        roi_mask: args.mask.clone(),
        image: args.image.clone(),
        report: args.out.clone(),
        mask_out: args.mask_out.clone(),
    };
    let run = inspect_files(&paths, params, warnings)?;

    let report = &run.report;
    println!(
        "{}: {} defect(s), {} ({:.1} ms)",
        args.image.display(),
        report.defect_count,
        if run.result.is_registered() {
            "registered"
        } else {
            "unregistered"
        },
        report.elapsed_ms
    );
    for (i, d) in report.defects.iter().enumerate() {
        let cue = d
            .cue
            .map(|c| format!("{c:?}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  #{i}: center=({:.1}, {:.1}) r={:.1} area={} circ={:.2} cue={cue}",
            d.center.x, d.center.y, d.radius, d.area, d.circularity
        );
    }
    Ok(())
}

fn run_config(out: &Path, from: Option<&Path>) -> CliResult<()> {
    let (params, warnings) = load_params(from)?;
    for w in &warnings {
        println!("warning: {w}");
    }
    params.write_json(out)?;
    println!("configuration written to {}", out.display());
    Ok(())
}
