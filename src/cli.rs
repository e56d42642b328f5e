//! Command-line interface definitions and argument parsing

use clap::Parser;
use std::path::PathBuf;

use crate::config::{
    PipelineConfig, DEFAULT_INPUT, DEFAULT_OUTPUT, DEFAULT_SHEET_NAME, DEFAULT_THRESHOLD,
};

/// Group wallets from a Dune execution export into behavioural clusters
/// and export the large ones to a spreadsheet
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the Dune execution JSON
    #[arg(short, long, default_value = DEFAULT_INPUT)]
    pub input: String,

    /// Path of the .xlsx workbook to write
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: String,

    /// Export clusters with strictly more unique wallets than this
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: usize,

    /// Name of the worksheet holding the clusters
    #[arg(long, default_value = DEFAULT_SHEET_NAME)]
    pub sheet_name: String,

    /// Print cluster statistics without writing the workbook
    #[arg(long)]
    pub summary_only: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Pipeline parameters described by these arguments
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            input_path: PathBuf::from(&self.input),
            output_path: PathBuf::from(&self.output),
            threshold: self.threshold,
            sheet_name: self.sheet_name.clone(),
        }
    }
}
