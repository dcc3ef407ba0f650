//! Command implementations for the SET processor CLI
//!
//! Sets up logging, layers configuration (defaults, config file, CLI
//! overrides), resolves the input tables and drives the library pipeline.
//! Library errors are wrapped with `anyhow` context here.

use crate::app::pipeline::{RunInputs, prepare_run, run_analysis, write_reports};
use crate::app::services::report::ReportWriter;
use crate::app::services::report::console::{print_eligibility, print_run_summary};
use crate::cli::args::{Args, CheckArgs, Commands, InputArgs, RunArgs};
use crate::cli::input::discover_inputs;
use crate::config::Config;
use anyhow::{Context, Result};
use colored::*;
use tracing::{debug, info};

/// Main command runner
pub async fn run(args: Args) -> Result<()> {
    match args.command {
        Some(Commands::Run(run_args)) => run_command(run_args).await,
        Some(Commands::Check(check_args)) => check_command(check_args).await,
        None => Ok(()),
    }
}

/// Fit every eligible site and write the report tables
async fn run_command(args: RunArgs) -> Result<()> {
    setup_logging(&args.input);
    info!("Starting SET processor run");
    debug!("Command line arguments: {:?}", args);

    let mut config = load_configuration(&args.input)?;
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;
    debug!("Effective configuration: {:?}", config);

    let inputs = load_inputs(&config)?;
    let output = run_analysis(inputs, &config, args.input.show_progress())
        .await
        .context("Analysis failed")?;

    let writer = ReportWriter::new(&config.output);
    let written = write_reports(&output, &writer).with_context(|| {
        format!(
            "Failed to write reports to {}",
            writer.directory().display()
        )
    })?;

    if !args.input.quiet {
        print_run_summary(&output, &written);
    }
    Ok(())
}

/// Load inputs and print eligibility only
async fn check_command(args: CheckArgs) -> Result<()> {
    setup_logging(&args.input);
    info!("Checking SET inputs");

    let mut config = load_configuration(&args.input)?;
    args.input.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;

    let inputs = load_inputs(&config)?;
    let prepared = prepare_run(inputs, &config).context("Input check failed")?;

    print_eligibility(&prepared.eligibility);
    println!(
        "  {} {} loaded, {} excluded by QA/QC",
        "Readings:".bright_cyan(),
        prepared.n_measurements,
        prepared.exclusions.len()
    );
    for warning in &prepared.warnings {
        println!("  {} {}", "Warning:".bright_yellow(), warning);
    }
    Ok(())
}

/// Resolve and parse every input table
fn load_inputs(config: &Config) -> Result<RunInputs> {
    let (paths, mut warnings) =
        discover_inputs(&config.input).context("Failed to locate input tables")?;
    let mut inputs = RunInputs::load(&paths).with_context(|| {
        format!("Failed to load input tables from {}", paths.data.display())
    })?;
    warnings.append(&mut inputs.warnings);
    inputs.warnings = warnings;
    Ok(inputs)
}

/// Set up structured logging based on CLI arguments
fn setup_logging(args: &InputArgs) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("set_processor={}", log_level)));

    let result = if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if result.is_ok() {
        debug!("Logging initialized at level: {}", log_level);
    }
}

/// Defaults, then the config file when given
fn load_configuration(args: &InputArgs) -> Result<Config> {
    match &args.config_file {
        Some(path) => {
            info!("Using config file: {}", path.display());
            Config::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))
        }
        None => {
            debug!("No config file given, using defaults");
            Ok(Config::default())
        }
    }
}
