//! Core domain model for the Campo program-sheet sync.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod catalog;

pub use catalog::Catalog;

pub const CRATE_NAME: &str = "campo-core";

pub const DEFAULT_SHEET_NAME: &str = "Programa";
pub const DEFAULT_START_ROW: u32 = 2;
pub const DEFAULT_METHOD: &str = "FOLIAR";
/// Status assigned to every freshly synced application.
pub const STATUS_PROGRAMMED: &str = "programada";

/// Number of positional columns (A..J) the program sheet carries.
pub const RAW_ROW_WIDTH: usize = 10;

/// One spreadsheet row as fetched, addressed by fixed column offset.
///
/// Columns 5..=7 (total, inventory, need) are derived in the sheet and never read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    cells: Vec<String>,
}

impl RawRow {
    pub const WEEK: usize = 0;
    pub const DATE: usize = 1;
    pub const VARIETY: usize = 2;
    pub const PRODUCT: usize = 3;
    pub const DOSE: usize = 4;
    pub const METHOD: usize = 8;
    pub const DRUMS: usize = 9;

    pub fn new(mut cells: Vec<String>) -> Self {
        cells.truncate(RAW_ROW_WIDTH);
        Self { cells }
    }

    /// Cell text at `index`, or `""` when the sheet returned a short row.
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn week(&self) -> &str {
        self.cell(Self::WEEK)
    }

    pub fn date(&self) -> &str {
        self.cell(Self::DATE)
    }

    pub fn variety(&self) -> &str {
        self.cell(Self::VARIETY)
    }

    pub fn product(&self) -> &str {
        self.cell(Self::PRODUCT)
    }

    pub fn dose(&self) -> &str {
        self.cell(Self::DOSE)
    }

    pub fn method(&self) -> &str {
        self.cell(Self::METHOD)
    }

    pub fn drums(&self) -> &str {
        self.cell(Self::DRUMS)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }
}

impl From<Vec<String>> for RawRow {
    fn from(cells: Vec<String>) -> Self {
        Self::new(cells)
    }
}

impl<const N: usize> From<[&str; N]> for RawRow {
    fn from(cells: [&str; N]) -> Self {
        Self::new(cells.iter().map(|c| c.to_string()).collect())
    }
}

/// Canonical programmed application, the unit persisted by the sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub partition_id: String,
    pub week: u32,
    pub date: NaiveDate,
    pub variety: String,
    pub derived_sectors: Vec<String>,
    pub product_name: String,
    pub dose_per_200l: f64,
    pub drum_count: u32,
    pub method: String,
    pub objective: Option<String>,
    pub status: String,
    pub sync_key: String,
    pub source_range: String,
    pub synced_at: DateTime<Utc>,
}

/// Non-fatal reason a row was excluded from the import.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowRejection {
    #[error("row {row}: missing product")]
    MissingProduct { row: u32 },
    #[error("row {row}: invalid date \"{raw}\"")]
    InvalidDate { row: u32, raw: String },
}

/// Inbound trigger for one sync run.
///
/// Identifier fields default to empty so that a request missing them reaches
/// the orchestrator and fails as a configuration error instead of a decode error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default, alias = "almacen_id")]
    pub partition_id: String,
    /// Bare id or full spreadsheet URL.
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default = "default_start_row")]
    pub start_row: u32,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub filter_week: Option<u32>,
}

fn default_sheet_name() -> String {
    DEFAULT_SHEET_NAME.to_string()
}

fn default_start_row() -> u32 {
    DEFAULT_START_ROW
}

impl SyncRequest {
    pub fn new(partition_id: impl Into<String>, spreadsheet_id: impl Into<String>) -> Self {
        Self {
            partition_id: partition_id.into(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: default_sheet_name(),
            start_row: DEFAULT_START_ROW,
            dry_run: false,
            filter_week: None,
        }
    }

    pub fn with_sheet_name(mut self, sheet_name: impl Into<String>) -> Self {
        self.sheet_name = sheet_name.into();
        self
    }

    pub fn with_start_row(mut self, start_row: u32) -> Self {
        self.start_row = start_row;
        self
    }

    pub fn with_filter_week(mut self, week: Option<u32>) -> Self {
        self.filter_week = week;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Spreadsheet id with any surrounding URL stripped, `None` when blank.
    pub fn resolved_spreadsheet_id(&self) -> Option<String> {
        extract_spreadsheet_id(&self.spreadsheet_id)
    }
}

/// Accepts a bare spreadsheet id or a URL containing `/spreadsheets/d/{id}/`.
pub fn extract_spreadsheet_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let id = match trimmed.split_once("/spreadsheets/d/") {
        Some((_, rest)) => rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default(),
        None => trimmed,
    };
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Outbound summary of one run.
///
/// `updated` and `unchanged` stay at zero for real syncs: the store only reports
/// per-batch success, so every written row is counted under `created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: Vec<String>,
    pub synced_at: DateTime<Utc>,
    pub total_rows_read: usize,
    pub dry_run: bool,
}

impl SyncResult {
    pub fn empty(synced_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            created: 0,
            updated: 0,
            unchanged: 0,
            errors: Vec::new(),
            synced_at,
            total_rows_read: 0,
            dry_run,
        }
    }

    /// Minimal result for a run aborted by a fatal error.
    pub fn failed(message: impl Into<String>, synced_at: DateTime<Utc>, dry_run: bool) -> Self {
        let mut result = Self::empty(synced_at, dry_run);
        result.errors.push(message.into());
        result
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Last-sync bookkeeping kept per partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub partition_id: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_synced_rows: u64,
}
