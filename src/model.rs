//! Equality-based wallet clustering and large-cluster selection using Polars

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::data::{ChainMask, TransactionRecord};

/// Cluster identifier, the rank of the cluster key among all distinct keys
pub type ClusterId = usize;

/// Frame columns forming the cluster key, in sort order
///
/// The mask is split into kind/int/text so integer masks order before text
/// masks, matching [`ClusterKey`]'s `Ord`.
const KEY_COLUMNS: [&str; 7] = [
    "tc",
    "first_day",
    "mask_kind",
    "mask_int",
    "mask_text",
    "last_year",
    "last_month",
];

/// Grouping key: wallets sharing all five fields form one cluster
///
/// Field order defines the sort order used to number clusters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterKey {
    pub tc: i64,
    pub first_day: NaiveDate,
    pub source_chains_mask: ChainMask,
    pub last_year: i32,
    pub last_month: u32,
}

impl ClusterKey {
    pub fn of(record: &TransactionRecord) -> Self {
        Self {
            tc: record.tc,
            first_day: record.first_day,
            source_chains_mask: record.source_chains_mask.clone(),
            last_year: record.last_year(),
            last_month: record.last_month(),
        }
    }
}

/// A transaction record tagged with its cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteredRow {
    pub record: TransactionRecord,
    pub precise_cluster: ClusterId,
}

/// All input rows, in input order, each assigned to a cluster
#[derive(Debug, Clone)]
pub struct ClusteredTable {
    rows: Vec<ClusteredRow>,
    /// `keys[id]` is the key of cluster `id`; sorted ascending
    keys: Vec<ClusterKey>,
    /// `row`, `user_address`, key columns, `rows` (cluster size in rows) and
    /// `precise_cluster`, in row order
    frame: DataFrame,
}

impl ClusteredTable {
    /// Group records by [`ClusterKey`], numbering groups in key order
    pub fn from_records(records: Vec<TransactionRecord>) -> crate::Result<Self> {
        let base = records_frame(&records)?;
        let key_exprs = key_exprs();

        let ids = base
            .clone()
            .lazy()
            .group_by(key_exprs.clone())
            .agg([len().alias("rows")])
            .sort_by_exprs(key_exprs.clone(), SortMultipleOptions::default())
            .with_row_index("precise_cluster", None)
            .collect()?;
        let cluster_count = ids.height();

        let frame = base
            .lazy()
            .join(
                ids.lazy(),
                key_exprs.clone(),
                key_exprs,
                JoinArgs::new(JoinType::Left),
            )
            .sort_by_exprs([col("row")], SortMultipleOptions::default())
            .collect()?;

        let assigned = u64_column(&frame, "precise_cluster")?;
        let rows = records
            .into_iter()
            .zip(assigned)
            .map(|(record, id)| ClusteredRow {
                record,
                precise_cluster: id as ClusterId,
            })
            .collect::<Vec<_>>();

        let mut keys: Vec<Option<ClusterKey>> = vec![None; cluster_count];
        for row in &rows {
            if let Some(slot) = keys.get_mut(row.precise_cluster) {
                slot.get_or_insert_with(|| ClusterKey::of(&row.record));
            }
        }
        let keys = keys.into_iter().flatten().collect::<Vec<_>>();

        debug!(rows = rows.len(), clusters = keys.len(), "assigned clusters");
        Ok(Self { rows, keys, frame })
    }

    pub fn rows(&self) -> &[ClusteredRow] {
        &self.rows
    }

    /// The enriched table as a frame, one row per record
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of distinct cluster keys
    pub fn cluster_count(&self) -> usize {
        self.keys.len()
    }

    pub fn key(&self, id: ClusterId) -> Option<&ClusterKey> {
        self.keys.get(id)
    }

    /// Rows of one cluster, in table order, duplicates included
    pub fn cluster_rows(&self, id: ClusterId) -> impl Iterator<Item = &ClusteredRow> + '_ {
        self.rows.iter().filter(move |row| row.precise_cluster == id)
    }

    pub fn distinct_wallets(&self) -> crate::Result<usize> {
        Ok(dedup_by_wallet(&self.frame)?.height())
    }
}

fn key_exprs() -> Vec<Expr> {
    KEY_COLUMNS.iter().map(|name| col(*name)).collect()
}

fn records_frame(records: &[TransactionRecord]) -> crate::Result<DataFrame> {
    let row: Vec<u64> = (0..records.len() as u64).collect();
    let user_address: Vec<&str> = records.iter().map(|r| r.user_address.as_str()).collect();
    let tc: Vec<i64> = records.iter().map(|r| r.tc).collect();
    let first_day: Vec<i32> = records.iter().map(|r| r.first_day.num_days_from_ce()).collect();
    let mut mask_kind: Vec<i32> = Vec::with_capacity(records.len());
    let mut mask_int: Vec<i64> = Vec::with_capacity(records.len());
    let mut mask_text: Vec<&str> = Vec::with_capacity(records.len());
    for record in records {
        match &record.source_chains_mask {
            ChainMask::Int(mask) => {
                mask_kind.push(0);
                mask_int.push(*mask);
                mask_text.push("");
            }
            ChainMask::Text(mask) => {
                mask_kind.push(1);
                mask_int.push(0);
                mask_text.push(mask.as_str());
            }
        }
    }
    let last_year: Vec<i32> = records.iter().map(|r| r.last_year()).collect();
    let last_month: Vec<u32> = records.iter().map(|r| r.last_month()).collect();

    let frame = df!(
        "row" => row,
        "user_address" => user_address,
        "tc" => tc,
        "first_day" => first_day,
        "mask_kind" => mask_kind,
        "mask_int" => mask_int,
        "mask_text" => mask_text,
        "last_year" => last_year,
        "last_month" => last_month
    )?;
    Ok(frame)
}

/// Read an unsigned integer column regardless of its width
fn u64_column(frame: &DataFrame, name: &str) -> crate::Result<Vec<u64>> {
    let column = frame.column(name)?.cast(&DataType::UInt64)?;
    let values = column
        .as_materialized_series()
        .u64()?
        .into_no_null_iter()
        .collect();
    Ok(values)
}

/// First row of each wallet, in table order
///
/// Rows keep their relative order inside a group, so `first` is the
/// earliest occurrence.
fn first_rows(frame: &DataFrame) -> LazyFrame {
    frame
        .clone()
        .lazy()
        .group_by([col("user_address")])
        .agg([col("row").first(), col("precise_cluster").first()])
        .sort_by_exprs([col("row")], SortMultipleOptions::default())
}

/// Keep the first row seen for each wallet address, preserving order
///
/// Takes and returns frames with `row`, `user_address` and
/// `precise_cluster` columns.
pub fn dedup_by_wallet(frame: &DataFrame) -> crate::Result<DataFrame> {
    Ok(first_rows(frame).collect()?)
}

fn cluster_sizes(table: &ClusteredTable) -> LazyFrame {
    first_rows(table.frame())
        .group_by([col("precise_cluster")])
        .agg([len().alias("wallets")])
}

/// Unique-wallet count per cluster, counting each wallet at its first row only
pub fn wallet_counts(table: &ClusteredTable) -> crate::Result<BTreeMap<ClusterId, usize>> {
    let sizes = cluster_sizes(table).collect()?;
    let ids = u64_column(&sizes, "precise_cluster")?;
    let wallets = u64_column(&sizes, "wallets")?;

    Ok(ids
        .into_iter()
        .zip(wallets)
        .map(|(id, count)| (id as ClusterId, count as usize))
        .collect())
}

/// A cluster that passed the size filter, ready for export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterBlock {
    pub id: ClusterId,
    pub key: ClusterKey,
    /// Wallets counted for this cluster after table-wide deduplication
    pub wallet_count: usize,
    /// The cluster's rows deduplicated by wallet, in table order
    pub records: Vec<TransactionRecord>,
}

/// Select clusters with strictly more than `threshold` unique wallets
///
/// Clusters are returned largest first; equal sizes keep ascending id order.
pub fn select_large_clusters(
    table: &ClusteredTable,
    threshold: usize,
) -> crate::Result<Vec<ClusterBlock>> {
    warn_on_shared_wallets(table)?;

    let limit = u32::try_from(threshold).unwrap_or(u32::MAX);
    let large = cluster_sizes(table)
        .filter(col("wallets").gt(lit(limit)))
        .sort_by_exprs(
            [col("wallets"), col("precise_cluster")],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .collect()?;
    let ids = u64_column(&large, "precise_cluster")?;
    let counts = u64_column(&large, "wallets")?;

    // each cluster's own rows, one per wallet, in table order
    let members = table
        .frame()
        .clone()
        .lazy()
        .group_by([col("precise_cluster"), col("user_address")])
        .agg([col("row").first()])
        .sort_by_exprs([col("row")], SortMultipleOptions::default())
        .collect()?;

    let mut records: HashMap<ClusterId, Vec<TransactionRecord>> = ids
        .iter()
        .map(|&id| (id as ClusterId, Vec::new()))
        .collect();
    let member_clusters = u64_column(&members, "precise_cluster")?;
    let member_rows = u64_column(&members, "row")?;
    for (id, row) in member_clusters.into_iter().zip(member_rows) {
        if let (Some(block), Some(source)) = (
            records.get_mut(&(id as ClusterId)),
            table.rows().get(row as usize),
        ) {
            block.push(source.record.clone());
        }
    }

    let blocks = ids
        .into_iter()
        .zip(counts)
        .filter_map(|(id, wallet_count)| {
            let id = id as ClusterId;
            Some(ClusterBlock {
                id,
                key: table.key(id)?.clone(),
                wallet_count: wallet_count as usize,
                records: records.remove(&id)?,
            })
        })
        .collect::<Vec<_>>();

    debug!(
        threshold,
        kept = blocks.len(),
        total = table.cluster_count(),
        "filtered clusters by size"
    );
    Ok(blocks)
}

/// Wallets whose rows land in more than one cluster are only counted once,
/// in the cluster of their first row.
fn warn_on_shared_wallets(table: &ClusteredTable) -> crate::Result<()> {
    let shared = table
        .frame()
        .clone()
        .lazy()
        .group_by([col("user_address")])
        .agg([col("precise_cluster").n_unique().alias("clusters")])
        .filter(col("clusters").gt(lit(1u32)))
        .collect()?
        .height();

    if shared > 0 {
        warn!(
            wallets = shared,
            "wallets span several clusters; each is counted in the cluster of its first row"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record(address: &str, tc: i64, first: &str, last: &str, mask: i64) -> TransactionRecord {
        TransactionRecord {
            user_address: address.to_string(),
            tc,
            first_day: day(first),
            last_day: day(last),
            days: 3,
            source_chains_mask: ChainMask::Int(mask),
            input_tx_hash: format!("0xhash{}", address),
        }
    }

    fn group(prefix: &str, size: usize, tc: i64) -> Vec<TransactionRecord> {
        (0..size)
            .map(|i| record(&format!("{prefix}{i}"), tc, "2023-01-01", "2023-02-15", 3))
            .collect()
    }

    fn cluster(records: Vec<TransactionRecord>) -> ClusteredTable {
        ClusteredTable::from_records(records).unwrap()
    }

    #[test]
    fn test_ids_follow_key_order() {
        let table = cluster(vec![
            record("a", 20, "2023-01-01", "2023-02-15", 3),
            record("b", 10, "2023-03-01", "2023-04-15", 3),
            record("c", 10, "2023-01-01", "2023-02-15", 3),
        ]);

        let ids: Vec<_> = table.rows().iter().map(|r| r.precise_cluster).collect();
        assert_eq!(ids, vec![2, 1, 0]);
        assert_eq!(table.cluster_count(), 3);
        assert_eq!(table.key(0).unwrap().tc, 10);
        assert_eq!(table.key(0).unwrap().first_day, day("2023-01-01"));
        assert_eq!(table.frame().height(), 3);
        assert_eq!(
            u64_column(table.frame(), "precise_cluster").unwrap(),
            vec![2, 1, 0]
        );
    }

    #[test]
    fn test_same_month_shares_cluster() {
        let table = cluster(vec![
            record("a", 10, "2023-01-01", "2023-02-01", 3),
            record("b", 10, "2023-01-01", "2023-02-28", 3),
            record("c", 10, "2023-01-01", "2023-03-01", 3),
            record("d", 10, "2023-01-01", "2024-02-01", 3),
        ]);

        let ids: Vec<_> = table.rows().iter().map(|r| r.precise_cluster).collect();
        assert_eq!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_ne!(ids[0], ids[3]);
        assert_eq!(table.cluster_count(), 3);
    }

    #[test]
    fn test_mask_is_part_of_key() {
        let mut text_mask = record("b", 10, "2023-01-01", "2023-02-15", 3);
        text_mask.source_chains_mask = ChainMask::Text("3".to_string());
        let table = cluster(vec![
            record("a", 10, "2023-01-01", "2023-02-15", 3),
            text_mask,
            record("c", 10, "2023-01-01", "2023-02-15", 5),
        ]);

        assert_eq!(table.cluster_count(), 3);
        // integer masks sort before text masks
        assert_eq!(table.rows()[1].precise_cluster, 2);
        assert_eq!(
            table.key(2).unwrap().source_chains_mask,
            ChainMask::Text("3".to_string())
        );
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut records = group("w", 3, 10);
        let mut again = records[1].clone();
        again.input_tx_hash = "0xsecond".to_string();
        records.push(again);
        let table = cluster(records);

        let unique = dedup_by_wallet(table.frame()).unwrap();
        assert_eq!(unique.height(), 3);
        assert_eq!(u64_column(&unique, "row").unwrap(), vec![0, 1, 2]);
        assert_eq!(table.distinct_wallets().unwrap(), 3);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut records = group("big", 21, 10);
        records.extend(group("edge", 20, 11));
        let table = cluster(records);

        let blocks = select_large_clusters(&table, 20).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].key.tc, 10);
        assert_eq!(blocks[0].wallet_count, 21);
        assert_eq!(blocks[0].records.len(), 21);
        assert_eq!(blocks[0].records[0].user_address, "big0");
        assert_eq!(blocks[0].records[20].user_address, "big20");
    }

    #[test]
    fn test_blocks_sorted_by_size_then_id() {
        let mut records = group("a", 3, 30);
        records.extend(group("b", 5, 20));
        records.extend(group("c", 3, 10));
        let table = cluster(records);

        let order: Vec<_> = select_large_clusters(&table, 1)
            .unwrap()
            .iter()
            .map(|b| (b.key.tc, b.wallet_count))
            .collect();
        assert_eq!(order, vec![(20, 5), (10, 3), (30, 3)]);
    }

    #[test]
    fn test_counts_use_first_row_per_wallet() {
        // w0 appears first in the tc=10 cluster, then again in tc=11
        let mut records = group("w", 2, 10);
        records.push(record("w0", 11, "2023-01-01", "2023-02-15", 3));
        records.push(record("x", 11, "2023-01-01", "2023-02-15", 3));
        let table = cluster(records);

        let counts = wallet_counts(&table).unwrap();
        assert_eq!(counts.get(&0), Some(&2));
        assert_eq!(counts.get(&1), Some(&1));

        // the block itself still lists every wallet of the cluster
        let blocks = select_large_clusters(&table, 0).unwrap();
        let tc11 = blocks.iter().find(|b| b.key.tc == 11).unwrap();
        assert_eq!(tc11.wallet_count, 1);
        assert_eq!(tc11.records.len(), 2);
        assert_eq!(tc11.records[0].user_address, "w0");
    }

    #[test]
    fn test_empty_table() {
        let table = cluster(Vec::new());
        assert!(table.is_empty());
        assert_eq!(table.cluster_count(), 0);
        assert!(select_large_clusters(&table, 0).unwrap().is_empty());
    }
}
