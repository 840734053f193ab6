//! Registry of partitions whose program sheets are synced on schedule.

use std::path::Path;

use anyhow::{Context, Result};
use campo_core::{SyncRequest, DEFAULT_SHEET_NAME, DEFAULT_START_ROW};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    pub partition_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Spreadsheet id or full URL.
    pub spreadsheet: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default = "default_start_row")]
    pub start_row: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_sheet_name() -> String {
    DEFAULT_SHEET_NAME.to_string()
}

fn default_start_row() -> u32 {
    DEFAULT_START_ROW
}

fn default_enabled() -> bool {
    true
}

impl SyncTarget {
    pub fn to_request(&self, dry_run: bool, filter_week: Option<u32>) -> SyncRequest {
        SyncRequest::new(&self.partition_id, &self.spreadsheet)
            .with_sheet_name(&self.sheet_name)
            .with_start_row(self.start_row)
            .with_filter_week(filter_week)
            .dry_run(dry_run)
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.partition_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetRegistry {
    #[serde(default)]
    pub targets: Vec<SyncTarget>,
}

impl TargetRegistry {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing sync target registry")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn enabled(&self) -> Vec<SyncTarget> {
        self.targets.iter().filter(|t| t.enabled).cloned().collect()
    }
}
