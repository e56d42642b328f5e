//! Pipeline parameters

use std::path::PathBuf;

pub const DEFAULT_INPUT: &str = "./json_new/luckyboi123_stargate_arbitrum.json";
pub const DEFAULT_OUTPUT: &str = "./clusters_new/luckyboi123_stargate_arbitrum.xlsx";
/// Clusters need strictly more unique wallets than this to be exported
pub const DEFAULT_THRESHOLD: usize = 20;
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// Everything a run needs to know, with the defaults the CLI falls back to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub threshold: usize,
    pub sheet_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(DEFAULT_INPUT),
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            threshold: DEFAULT_THRESHOLD,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
        }
    }
}
