//! Spreadsheet adapter: range fetch, token exchange and row parsing for the program sheet.

use anyhow::Context;
use async_trait::async_trait;
use campo_core::RawRow;
use campo_storage::{HttpClient, HttpError, Url};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

pub mod auth;
pub mod parse;

pub use auth::{
    AccessToken, AuthError, ServiceAccountTokenProvider, ServiceCredential, StaticTokenProvider,
    TokenProvider,
};
pub use parse::{parse_date, parse_row, parse_rows, ParseContext, ParsedRows};

pub const CRATE_NAME: &str = "campo-sheets";

pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
/// Fixed upper bound on rows requested per read; trailing blank rows are expected.
pub const DEFAULT_MAX_ROWS: u32 = 1000;
pub const FIRST_COLUMN: &str = "A";
pub const LAST_COLUMN: &str = "J";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid sheets endpoint {0}")]
    Endpoint(String),
    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Source of raw program-sheet rows for one A1 range.
#[async_trait]
pub trait RangeSource: Send + Sync {
    async fn fetch_range(
        &self,
        token: &AccessToken,
        spreadsheet_id: &str,
        a1_range: &str,
    ) -> Result<Vec<RawRow>, FetchError>;
}

/// Sheet name as it must appear in an A1 reference.
pub fn quote_sheet_name(sheet_name: &str) -> String {
    let plain = !sheet_name.is_empty()
        && sheet_name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_');
    if plain {
        sheet_name.to_string()
    } else {
        format!("'{}'", sheet_name.replace('\'', "''"))
    }
}

/// `Sheet!A{start}:J{start + max_rows - 1}`.
pub fn a1_range(sheet_name: &str, start_row: u32, max_rows: u32) -> String {
    let end_row = start_row.saturating_add(max_rows.max(1) - 1);
    format!(
        "{}!{FIRST_COLUMN}{start_row}:{LAST_COLUMN}{end_row}",
        quote_sheet_name(sheet_name)
    )
}

/// A1 reference of a single sheet row, used as record provenance.
pub fn row_reference(sheet_name: &str, row: u32) -> String {
    format!(
        "{}!{FIRST_COLUMN}{row}:{LAST_COLUMN}{row}",
        quote_sheet_name(sheet_name)
    )
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

/// Google Sheets `values.get` reader.
#[derive(Debug, Clone)]
pub struct SheetsRangeReader {
    http: HttpClient,
    api_base: Url,
}

impl SheetsRangeReader {
    pub fn new(http: HttpClient, api_base: &str) -> anyhow::Result<Self> {
        let api_base = Url::parse(api_base)
            .with_context(|| format!("parsing sheets api base {api_base}"))?;
        Ok(Self { http, api_base })
    }

    pub fn values_url(&self, spreadsheet_id: &str, a1_range: &str) -> Result<Url, FetchError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Endpoint(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet_id, "values", a1_range]);
        Ok(url)
    }
}

#[async_trait]
impl RangeSource for SheetsRangeReader {
    async fn fetch_range(
        &self,
        token: &AccessToken,
        spreadsheet_id: &str,
        a1_range: &str,
    ) -> Result<Vec<RawRow>, FetchError> {
        let url = self.values_url(spreadsheet_id, a1_range)?;
        let body: ValueRange = self.http.get_json(url, Some(token.secret())).await?;
        debug!(spreadsheet_id, a1_range, rows = body.values.len(), "fetched sheet range");
        Ok(body
            .values
            .into_iter()
            .map(|cells| RawRow::new(cells.into_iter().map(cell_text).collect()))
            .collect())
    }
}

/// Cells normally arrive as formatted strings; other JSON scalars are rendered as text.
fn cell_text(value: JsonValue) -> String {
    match value {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campo_storage::HttpClientConfig;

    #[test]
    fn plain_sheet_names_are_not_quoted() {
        assert_eq!(a1_range("Programa", 2, 1000), "Programa!A2:J1001");
        assert_eq!(row_reference("Programa", 5), "Programa!A5:J5");
    }

    #[test]
    fn sheet_names_with_spaces_or_quotes_are_quoted() {
        assert_eq!(a1_range("Programa 2026", 3, 10), "'Programa 2026'!A3:J12");
        assert_eq!(quote_sheet_name("Don't"), "'Don''t'");
        assert_eq!(quote_sheet_name(""), "''");
    }

    #[test]
    fn zero_max_rows_still_requests_one_row() {
        assert_eq!(a1_range("Programa", 2, 0), "Programa!A2:J2");
    }

    #[test]
    fn values_url_escapes_the_range_segment() {
        let reader = SheetsRangeReader::new(
            HttpClient::new(HttpClientConfig::default()).unwrap(),
            "https://sheets.example.test/",
        )
        .unwrap();
        let url = reader
            .values_url("ABC123", "'Programa 2026'!A2:J1001")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.example.test/v4/spreadsheets/ABC123/values/'Programa%202026'!A2:J1001"
        );
    }

    #[test]
    fn non_string_cells_render_as_text() {
        assert_eq!(cell_text(JsonValue::from(8)), "8");
        assert_eq!(cell_text(JsonValue::from(0.5)), "0.5");
        assert_eq!(cell_text(JsonValue::Null), "");
        assert_eq!(cell_text(JsonValue::from("Azufre")), "Azufre");
    }
}
