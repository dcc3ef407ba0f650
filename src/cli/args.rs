//! Command-line argument definitions for the SET processor
//!
//! This module defines the CLI interface using the clap derive API. Both
//! subcommands share the same input-table arguments; `run` adds the model,
//! worker and output options.

use crate::config::{CiMethod, Config};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the SET processor
///
/// Estimates per-site rates of wetland surface-elevation change from
/// Surface Elevation Table pin readings and compares them against local
/// sea-level rise.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "set-processor",
    version,
    about = "Estimate SET elevation-change rates and compare them with local sea-level rise",
    long_about = "Reads Surface Elevation Table pin readings, excludes QA/QC-flagged readings, \
                  selects sites with a long enough sampling record, fits a linear mixed model \
                  with nested arm/pin random effects to each site, and classifies the resulting \
                  rate against zero and against the reserve's sea-level-rise rate."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Fit every eligible site and write the report tables
    Run(RunArgs),
    /// Load inputs and report site eligibility without fitting
    Check(CheckArgs),
}

/// Input table selection shared by every subcommand
#[derive(Debug, Clone, Default, ClapArgs)]
pub struct InputArgs {
    /// Directory searched for the input tables by file-name pattern
    #[arg(
        short = 'i',
        long = "input",
        value_name = "DIR",
        help = "Directory containing the data, metadata and SLR tables"
    )]
    pub input_dir: Option<PathBuf>,

    /// Explicit measurement table; overrides discovery
    #[arg(
        short = 'd',
        long = "data",
        value_name = "FILE",
        help = "SET measurement table (CSV)"
    )]
    pub data_file: Option<PathBuf>,

    #[arg(long = "metadata", value_name = "FILE", help = "Site metadata table (CSV)")]
    pub metadata_file: Option<PathBuf>,

    #[arg(
        long = "slr",
        value_name = "FILE",
        help = "Sea-level-rise reference table (CSV)"
    )]
    pub slr_file: Option<PathBuf>,

    /// QA/QC codes whose readings are excluded
    ///
    /// May be repeated. Codes are matched exactly against both the pin and
    /// the arm QA/QC columns and add to any codes in the config file.
    #[arg(
        short = 'x',
        long = "exclude-code",
        value_name = "CODE",
        help = "QA/QC code to exclude (repeatable)"
    )]
    pub exclude_codes: Vec<String>,

    /// TOML configuration file for thresholds and model settings
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    pub config_file: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

/// Arguments for the run command
#[derive(Debug, Clone, Default, Parser)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output directory for the report tables
    ///
    /// Created if it doesn't exist. Defaults to ./output
    #[arg(
        short = 'o',
        long = "output",
        value_name = "DIR",
        help = "Output directory for report tables"
    )]
    pub output_dir: Option<PathBuf>,

    /// Number of sites fitted concurrently
    #[arg(
        short = 'j',
        long = "workers",
        value_name = "COUNT",
        help = "Number of concurrent model fits"
    )]
    pub workers: Option<usize>,

    #[arg(long = "parquet", help = "Also write the rates table as Parquet")]
    pub parquet: bool,

    #[arg(
        long = "random-slopes",
        help = "Add a random slope on elapsed time for each pin"
    )]
    pub random_slopes: bool,

    #[arg(
        long = "ci-method",
        value_enum,
        value_name = "METHOD",
        help = "Confidence interval method for the rate"
    )]
    pub ci_method: Option<CiMethodArg>,

    #[arg(
        long = "no-overwrite",
        help = "Fail instead of replacing existing report files"
    )]
    pub no_overwrite: bool,
}

/// Arguments for the check command
#[derive(Debug, Clone, Default, Parser)]
pub struct CheckArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

/// Interval method as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CiMethodArg {
    /// Student t quantile on within-group degrees of freedom
    T,
    /// Standard normal quantile
    Normal,
}

impl From<CiMethodArg> for CiMethod {
    fn from(arg: CiMethodArg) -> Self {
        match arg {
            CiMethodArg::T => CiMethod::WaldT,
            CiMethodArg::Normal => CiMethod::WaldNormal,
        }
    }
}

impl InputArgs {
    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Check if we should show progress bars (not in quiet mode)
    pub fn show_progress(&self) -> bool {
        !self.quiet
    }

    /// Apply input and QA/QC overrides
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(dir) = &self.input_dir {
            config.input.directory = Some(dir.clone());
        }
        if let Some(file) = &self.data_file {
            config.input.data_file = Some(file.clone());
        }
        if let Some(file) = &self.metadata_file {
            config.input.metadata_file = Some(file.clone());
        }
        if let Some(file) = &self.slr_file {
            config.input.slr_file = Some(file.clone());
        }
        config
            .qaqc
            .excluded_codes
            .extend(self.exclude_codes.iter().map(|c| c.trim().to_string()));
    }
}

impl RunArgs {
    /// Apply every CLI override on top of file/default configuration
    pub fn apply_to(&self, config: &mut Config) {
        self.input.apply_to(config);
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.performance.workers = workers;
        }
        if self.parquet {
            config.output.write_parquet = true;
        }
        if self.no_overwrite {
            config.output.overwrite = false;
        }
        if self.random_slopes {
            config.model.random_slopes = true;
        }
        if let Some(method) = self.ci_method {
            config.model.ci_method = method.into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("set-processor").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_run_arguments() {
        let args = parse(&[
            "run",
            "--input",
            "data",
            "--output",
            "out",
            "-x",
            "D1",
            "--exclude-code",
            "SV",
            "--workers",
            "3",
            "--parquet",
            "--ci-method",
            "normal",
        ]);

        let Some(Commands::Run(run)) = args.command else {
            panic!("expected run command");
        };
        assert_eq!(run.input.input_dir, Some(PathBuf::from("data")));
        assert_eq!(run.input.exclude_codes, vec!["D1", "SV"]);
        assert_eq!(run.workers, Some(3));
        assert!(run.parquet);
        assert_eq!(run.ci_method, Some(CiMethodArg::Normal));
    }

    #[test]
    fn test_check_arguments() {
        let args = parse(&["check", "--data", "set_data.csv", "--slr", "slr.csv"]);
        let Some(Commands::Check(check)) = args.command else {
            panic!("expected check command");
        };
        assert_eq!(check.input.data_file, Some(PathBuf::from("set_data.csv")));
        assert_eq!(check.input.slr_file, Some(PathBuf::from("slr.csv")));
        assert!(check.input.metadata_file.is_none());
    }

    #[test]
    fn test_no_subcommand() {
        assert!(parse(&[]).command.is_none());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Args::try_parse_from(["set-processor", "check", "-q", "-v"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = InputArgs::default();
        assert_eq!(args.get_log_level(), "warn");

        args.verbose = 1;
        assert_eq!(args.get_log_level(), "info");

        args.verbose = 2;
        assert_eq!(args.get_log_level(), "debug");

        args.verbose = 3;
        assert_eq!(args.get_log_level(), "trace");

        args.quiet = true;
        assert_eq!(args.get_log_level(), "error");
        assert!(!args.show_progress());
    }

    #[test]
    fn test_overrides_layer_on_config() {
        let mut config = Config::default().with_excluded_codes(["D1"]);
        let run = RunArgs {
            input: InputArgs {
                data_file: Some(PathBuf::from("set_data.csv")),
                exclude_codes: vec![" SV ".to_string()],
                ..InputArgs::default()
            },
            output_dir: Some(PathBuf::from("reports")),
            workers: Some(2),
            parquet: true,
            random_slopes: true,
            ci_method: Some(CiMethodArg::Normal),
            no_overwrite: true,
        };

        run.apply_to(&mut config);

        assert_eq!(config.input.data_file, Some(PathBuf::from("set_data.csv")));
        assert!(config.qaqc.excluded_codes.contains("D1"));
        assert!(config.qaqc.excluded_codes.contains("SV"));
        assert_eq!(config.output.directory, PathBuf::from("reports"));
        assert_eq!(config.performance.workers, 2);
        assert!(config.output.write_parquet);
        assert!(!config.output.overwrite);
        assert!(config.model.random_slopes);
        assert_eq!(config.model.ci_method, CiMethod::WaldNormal);
    }

    #[test]
    fn test_defaults_leave_config_untouched() {
        let mut config = Config::default();
        RunArgs::default().apply_to(&mut config);
        assert_eq!(config, Config::default());
    }
}
