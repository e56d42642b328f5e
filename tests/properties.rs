//! Property tests for cluster assignment and wallet deduplication

use chrono::{Duration, NaiveDate};
use dune_cluster::{
    dedup_by_wallet, select_large_clusters, ChainMask, ClusterKey, ClusteredTable,
    TransactionRecord,
};
use polars::prelude::DataFrame;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

fn base_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
}

/// Records drawn from small domains so that keys and wallets collide often
fn arb_record() -> impl Strategy<Value = TransactionRecord> {
    (0u8..12, 1i64..4, 0i64..3, 0i64..120, 0i64..3, any::<bool>()).prop_map(
        |(wallet, tc, first_offset, last_offset, mask, text_mask)| {
            let first_day = base_day() + Duration::days(first_offset);
            TransactionRecord {
                user_address: format!("0x{wallet:02x}"),
                tc,
                first_day,
                last_day: first_day + Duration::days(last_offset),
                days: 1 + last_offset / 7,
                source_chains_mask: if text_mask {
                    ChainMask::Text(format!("m{mask}"))
                } else {
                    ChainMask::Int(mask)
                },
                input_tx_hash: format!("0x{wallet:02x}{tc}{last_offset}"),
            }
        },
    )
}

fn row_indices(frame: &DataFrame) -> Vec<u64> {
    frame
        .column("row")
        .unwrap()
        .as_materialized_series()
        .u64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

proptest! {
    #[test]
    fn cluster_ids_follow_keys(records in prop::collection::vec(arb_record(), 0..60)) {
        let table = ClusteredTable::from_records(records.clone()).unwrap();
        prop_assert_eq!(table.len(), records.len());

        let rows = table.rows();
        for a in rows {
            prop_assert!(a.precise_cluster < table.cluster_count());
            let ka = ClusterKey::of(&a.record);
            prop_assert_eq!(table.key(a.precise_cluster), Some(&ka));
            for b in rows {
                let kb = ClusterKey::of(&b.record);
                prop_assert_eq!(ka == kb, a.precise_cluster == b.precise_cluster);
                prop_assert_eq!(ka < kb, a.precise_cluster < b.precise_cluster);
            }
        }
    }

    #[test]
    fn dedup_is_idempotent(records in prop::collection::vec(arb_record(), 0..60)) {
        let table = ClusteredTable::from_records(records).unwrap();
        let once = dedup_by_wallet(table.frame()).unwrap();
        let twice = dedup_by_wallet(&once).unwrap();

        prop_assert_eq!(row_indices(&once), row_indices(&twice));

        // the kept row is the first occurrence of each wallet
        let mut seen = HashSet::new();
        let expected: Vec<u64> = table
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| seen.insert(row.record.user_address.as_str()))
            .map(|(i, _)| i as u64)
            .collect();
        prop_assert_eq!(row_indices(&once), expected);
    }

    #[test]
    fn selected_wallets_match_qualifying_clusters(
        records in prop::collection::vec(arb_record(), 0..80),
        threshold in 0usize..4,
    ) {
        let table = ClusteredTable::from_records(records).unwrap();

        // first row of each wallet decides which cluster it is counted in
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        let mut seen = HashSet::new();
        for row in table.rows() {
            if seen.insert(row.record.user_address.clone()) {
                *counts.entry(row.precise_cluster).or_insert(0) += 1;
            }
        }
        let qualifying: HashSet<usize> = counts
            .iter()
            .filter(|(_, &count)| count > threshold)
            .map(|(&id, _)| id)
            .collect();
        let expected: HashSet<String> = table
            .rows()
            .iter()
            .filter(|row| qualifying.contains(&row.precise_cluster))
            .map(|row| row.record.user_address.clone())
            .collect();

        let blocks = select_large_clusters(&table, threshold).unwrap();
        let exported: HashSet<String> = blocks
            .iter()
            .flat_map(|block| block.records.iter().map(|r| r.user_address.clone()))
            .collect();

        prop_assert_eq!(blocks.len(), qualifying.len());
        prop_assert_eq!(exported, expected);
        for pair in blocks.windows(2) {
            prop_assert!(
                (pair[0].wallet_count, std::cmp::Reverse(pair[0].id))
                    > (pair[1].wallet_count, std::cmp::Reverse(pair[1].id))
            );
        }
        for block in &blocks {
            prop_assert!(block.wallet_count > threshold);
            let unique: HashSet<&str> =
                block.records.iter().map(|r| r.user_address.as_str()).collect();
            prop_assert_eq!(unique.len(), block.records.len());
        }
    }
}
