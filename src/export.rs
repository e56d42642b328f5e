//! Spreadsheet export of the large clusters

use chrono::{Datelike, NaiveDate};
use rust_xlsxwriter::{ExcelDateTime, Format, FormatAlign, FormatBorder, Workbook, XlsxError};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::{ChainMask, TransactionRecord};
use crate::error::Error;
use crate::model::{select_large_clusters, ClusterBlock, ClusterId, ClusteredTable};

/// Output header, in column order
pub const OUTPUT_COLUMNS: [&str; 7] = [
    "Wallet Address",
    "Transaction Count",
    "First Active Day",
    "Last Active Day",
    "Active Days",
    "Source Chains Mask",
    "Input tx hash",
];

/// One wallet line of the output sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletRow {
    pub wallet_address: String,
    pub transaction_count: i64,
    pub first_active_day: NaiveDate,
    pub last_active_day: NaiveDate,
    pub active_days: i64,
    pub source_chains_mask: ChainMask,
    pub input_tx_hash: String,
}

impl From<&TransactionRecord> for WalletRow {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            wallet_address: record.user_address.clone(),
            transaction_count: record.tc,
            first_active_day: record.first_day,
            last_active_day: record.last_day,
            active_days: record.days,
            source_chains_mask: record.source_chains_mask.clone(),
            input_tx_hash: record.input_tx_hash.clone(),
        }
    }
}

/// A line of the output sheet below the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportRow {
    /// `Cluster <id>` heading in the first column, other cells blank
    Separator(ClusterId),
    Wallet(WalletRow),
}

impl ExportRow {
    pub fn wallet(&self) -> Option<&WalletRow> {
        match self {
            ExportRow::Wallet(row) => Some(row),
            ExportRow::Separator(_) => None,
        }
    }
}

/// What was written by [`filter_and_export_clusters`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub clusters: usize,
    pub wallet_rows: usize,
    /// Wallet rows plus one separator per cluster, header excluded
    pub total_rows: usize,
}

pub fn separator_label(id: ClusterId) -> String {
    format!("Cluster {}", id)
}

/// Flatten cluster blocks into sheet rows, a separator before each block
pub fn build_rows(blocks: &[ClusterBlock]) -> Vec<ExportRow> {
    blocks
        .iter()
        .flat_map(|block| {
            std::iter::once(ExportRow::Separator(block.id)).chain(
                block
                    .records
                    .iter()
                    .map(|record| ExportRow::Wallet(WalletRow::from(record))),
            )
        })
        .collect()
}

/// Write rows to the first worksheet of a new workbook at `path`
///
/// The header row is always present; the workbook is replaced if it exists.
pub fn write_workbook(rows: &[ExportRow], path: &Path, sheet_name: &str) -> crate::Result<()> {
    write_sheet(rows, path, sheet_name).map_err(|source| Error::OutputWrite {
        path: path.to_path_buf(),
        source,
    })
}

fn write_sheet(rows: &[ExportRow], path: &Path, sheet_name: &str) -> Result<(), XlsxError> {
    let header_format = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center);
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (col, title) in OUTPUT_COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header_format)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let line = index as u32 + 1;
        match row {
            ExportRow::Separator(id) => {
                worksheet.write_string(line, 0, separator_label(*id))?;
            }
            ExportRow::Wallet(wallet) => {
                worksheet.write_string(line, 0, wallet.wallet_address.as_str())?;
                worksheet.write_number(line, 1, wallet.transaction_count as f64)?;
                worksheet.write_datetime_with_format(
                    line,
                    2,
                    &excel_date(wallet.first_active_day)?,
                    &date_format,
                )?;
                worksheet.write_datetime_with_format(
                    line,
                    3,
                    &excel_date(wallet.last_active_day)?,
                    &date_format,
                )?;
                worksheet.write_number(line, 4, wallet.active_days as f64)?;
                match &wallet.source_chains_mask {
                    ChainMask::Int(mask) => worksheet.write_number(line, 5, *mask as f64)?,
                    ChainMask::Text(mask) => worksheet.write_string(line, 5, mask.as_str())?,
                };
                worksheet.write_string(line, 6, wallet.input_tx_hash.as_str())?;
            }
        }
    }

    worksheet.autofit();
    workbook.save(path)?;
    Ok(())
}

fn excel_date(date: NaiveDate) -> Result<ExcelDateTime, XlsxError> {
    let year = u16::try_from(date.year())
        .map_err(|_| XlsxError::DateTimeRangeError(format!("year out of range: {date}")))?;
    ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8)
}

/// Keep clusters above the configured threshold and write them to the
/// configured workbook
///
/// # Returns
/// * `ExportSummary` describing what was written
/// * `Error::EmptyResult` when no cluster qualifies, in which case nothing is written
pub fn filter_and_export_clusters(
    table: &ClusteredTable,
    config: &PipelineConfig,
) -> crate::Result<ExportSummary> {
    let blocks = select_large_clusters(table, config.threshold)?;
    export_blocks(&blocks, config)
}

/// Write already selected cluster blocks
pub fn export_blocks(
    blocks: &[ClusterBlock],
    config: &PipelineConfig,
) -> crate::Result<ExportSummary> {
    if blocks.is_empty() {
        return Err(Error::EmptyResult {
            threshold: config.threshold,
        });
    }

    let rows = build_rows(blocks);
    write_workbook(&rows, &config.output_path, &config.sheet_name)?;

    let summary = ExportSummary {
        path: config.output_path.clone(),
        clusters: blocks.len(),
        wallet_rows: rows.len() - blocks.len(),
        total_rows: rows.len(),
    };
    info!(
        path = %summary.path.display(),
        clusters = summary.clusters,
        wallets = summary.wallet_rows,
        "wrote cluster workbook"
    );
    Ok(summary)
}
