//! Console reporting of cluster statistics using Polars

use polars::prelude::*;

use crate::model::{ClusterBlock, ClusteredTable};

/// Build a one-row-per-cluster summary of the selected clusters
///
/// Columns: `cluster`, `wallets`, `tc`, `first_day`, `source_chains_mask`,
/// `last_year`, `last_month`.
pub fn cluster_summary_frame(blocks: &[ClusterBlock]) -> crate::Result<DataFrame> {
    let cluster: Vec<u32> = blocks.iter().map(|b| b.id as u32).collect();
    let wallets: Vec<u32> = blocks.iter().map(|b| b.wallet_count as u32).collect();
    let tc: Vec<i64> = blocks.iter().map(|b| b.key.tc).collect();
    let first_day: Vec<String> = blocks.iter().map(|b| b.key.first_day.to_string()).collect();
    let mask: Vec<String> = blocks
        .iter()
        .map(|b| b.key.source_chains_mask.to_string())
        .collect();
    let last_year: Vec<i32> = blocks.iter().map(|b| b.key.last_year).collect();
    let last_month: Vec<u32> = blocks.iter().map(|b| b.key.last_month).collect();

    let frame = df!(
        "cluster" => cluster,
        "wallets" => wallets,
        "tc" => tc,
        "first_day" => first_day,
        "source_chains_mask" => mask,
        "last_year" => last_year,
        "last_month" => last_month
    )?;

    Ok(frame)
}

/// Print run totals and the summary frame to stdout
pub fn print_cluster_statistics(
    table: &ClusteredTable,
    blocks: &[ClusterBlock],
    threshold: usize,
) -> crate::Result<()> {
    let distinct_wallets = table.distinct_wallets()?;
    let clustered_wallets: usize = blocks.iter().map(|b| b.wallet_count).sum();

    println!("\n=== Cluster Statistics ===");
    println!("Records: {}", table.len());
    println!("Distinct wallets: {}", distinct_wallets);
    println!("Distinct clusters: {}", table.cluster_count());
    println!(
        "Clusters with more than {} wallets: {}",
        threshold,
        blocks.len()
    );

    if distinct_wallets > 0 {
        let percentage = (clustered_wallets as f64 / distinct_wallets as f64) * 100.0;
        println!(
            "Wallets in large clusters: {} ({:.1}%)",
            clustered_wallets, percentage
        );
    }

    if !blocks.is_empty() {
        println!("\n{}", cluster_summary_frame(blocks)?);
    }

    Ok(())
}
