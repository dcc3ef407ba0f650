use clap::{CommandFactory, Parser};
use set_processor::cli::{args::Args, commands};
use std::process;

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        tokio::select! {
            result = commands::run(args) => result,
            _ = shutdown_signal() => {
                eprintln!("\nReceived CTRL+C, shutting down...");
                Err(anyhow::Error::from(set_processor::Error::interrupted(
                    "Processing interrupted by user",
                )))
            }
        }
    });

    // Blocking fits still running after an interrupt are abandoned
    runtime.shutdown_background();

    match result {
        Ok(()) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Resolves on CTRL+C; never resolves if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("SET Processor - Wetland Surface Elevation Change Rates");
    println!("======================================================");
    println!();
    println!("Estimate per-site rates of surface-elevation change from Surface");
    println!("Elevation Table pin readings and compare them with local sea-level rise.");
    println!();
    println!("EXAMPLES:");
    println!("    # Discover tables in a directory and write reports:");
    println!("    set-processor run --input ./data --output ./output");
    println!();
    println!("    # Explicit tables, excluding two QA/QC codes:");
    println!("    set-processor run --data set_data.csv --metadata set_metadata.csv \\");
    println!("                      --slr slr_rates.csv -x D1 -x SV");
    println!();
    println!("    # Check which sites have a long enough record:");
    println!("    set-processor check --input ./data");
    println!();
    if Args::command().print_help().is_ok() {
        println!();
    }
}
