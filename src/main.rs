//! dune-cluster: wallet clustering over Dune execution exports
//!
//! This is the main entrypoint that orchestrates loading, clustering,
//! reporting and the spreadsheet export.

use anyhow::{Context, Result};
use clap::Parser;
use dune_cluster::{
    export, load_and_process_data, print_cluster_statistics, select_large_clusters, Args,
    PipelineConfig,
};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.to_config();

    if args.verbose {
        println!("dune-cluster - wallet clustering for Dune exports");
        println!("=================================================\n");
    }

    run_pipeline(&config, args.summary_only, args.verbose)
}

/// `RUST_LOG` wins over the verbose flag when set
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Run the load, filter and export steps
fn run_pipeline(config: &PipelineConfig, summary_only: bool, verbose: bool) -> Result<()> {
    println!("=== Wallet Clustering Pipeline ===\n");

    let start_time = Instant::now();

    // Step 1: Load and cluster records
    if verbose {
        println!("Step 1: Loading and clustering records");
        println!("  Input file: {}", config.input_path.display());
    }

    let load_start = Instant::now();
    let table = load_and_process_data(&config.input_path).with_context(|| {
        format!(
            "failed to load records from {}",
            config.input_path.display()
        )
    })?;

    println!(
        "✓ Data loaded: {} records in {} clusters",
        table.len(),
        table.cluster_count()
    );
    if verbose {
        println!(
            "  Processing time: {:.2}s",
            load_start.elapsed().as_secs_f64()
        );
    }

    // Step 2: Keep the large clusters
    if verbose {
        println!("\nStep 2: Filtering clusters");
        println!("  Threshold: more than {} wallets", config.threshold);
    }

    let blocks = select_large_clusters(&table, config.threshold)
        .context("failed to count wallets per cluster")?;
    println!("✓ {} clusters above threshold", blocks.len());

    print_cluster_statistics(&table, &blocks, config.threshold)
        .context("failed to print cluster statistics")?;

    // Step 3: Write the workbook
    if summary_only {
        println!("\nSummary only, no workbook written");
    } else {
        if verbose {
            println!("\nStep 3: Writing workbook");
            println!("  Output file: {}", config.output_path.display());
        }

        let summary = export::export_blocks(&blocks, config).with_context(|| {
            format!(
                "failed to export clusters to {}",
                config.output_path.display()
            )
        })?;

        println!(
            "\n✓ Exported {} wallets in {} clusters",
            summary.wallet_rows, summary.clusters
        );
        println!("Workbook saved to: {}", summary.path.display());
    }

    let total_time = start_time.elapsed();
    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());

    Ok(())
}
