//! dune-cluster: groups wallets from Dune execution exports into behavioural clusters
//!
//! Wallets sharing the same transaction count, first active day, source chains
//! mask and last active month form a cluster. Clusters with more unique wallets
//! than a threshold are written to a spreadsheet, one block per cluster.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod model;
pub mod report;

// Re-export public items for easier access
pub use cli::Args;
pub use config::PipelineConfig;
pub use data::{load_and_process_data, load_from_str, ChainMask, TransactionRecord};
pub use error::Error;
pub use export::{filter_and_export_clusters, ExportRow, ExportSummary, OUTPUT_COLUMNS};
pub use model::{
    dedup_by_wallet, select_large_clusters, ClusterBlock, ClusterId, ClusterKey, ClusteredRow,
    ClusteredTable,
};
pub use report::{cluster_summary_frame, print_cluster_statistics};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;
