//! Program-sheet row parsing: one raw row in, a normalized record, a skip, or a rejection out.

use std::ops::RangeInclusive;

use campo_core::{Catalog, NormalizedRecord, RawRow, RowRejection, STATUS_PROGRAMMED};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::row_reference;

/// Run-wide inputs shared by every row of one parse pass.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub partition_id: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    /// Sheet row number of position 0.
    pub start_row: u32,
    pub filter_week: Option<u32>,
    pub synced_at: DateTime<Utc>,
}

impl ParseContext {
    pub fn sheet_row(&self, position: usize) -> u32 {
        let offset = u32::try_from(position).unwrap_or(u32::MAX);
        self.start_row.saturating_add(offset)
    }

    pub fn sync_key(&self, position: usize) -> String {
        format!("{}_{}", self.spreadsheet_id, position)
    }
}

/// Parses the row at `position` (0-based within the fetched range).
///
/// `Ok(None)` means the row is skipped silently: blank rows, separator rows with
/// neither variety nor product, and rows outside the requested week. The week
/// filter runs before validation so a targeted re-sync reports nothing about
/// rows it was not asked to import.
pub fn parse_row(
    raw: &RawRow,
    position: usize,
    ctx: &ParseContext,
    catalog: &Catalog,
) -> Result<Option<NormalizedRecord>, RowRejection> {
    if raw.is_blank() {
        return Ok(None);
    }

    let variety_text = raw.variety().trim();
    let product = raw.product().trim();
    if variety_text.is_empty() && product.is_empty() {
        return Ok(None);
    }

    let week = parse_count(raw.week());
    if ctx.filter_week.is_some_and(|wanted| wanted != week) {
        return Ok(None);
    }

    let row = ctx.sheet_row(position);
    if product.is_empty() {
        return Err(RowRejection::MissingProduct { row });
    }

    let date = parse_date(raw.date()).ok_or_else(|| RowRejection::InvalidDate {
        row,
        raw: raw.date().trim().to_string(),
    })?;

    let variety = catalog.normalize_variety(variety_text);
    let derived_sectors = catalog.derive_sectors(&variety);
    if derived_sectors.is_empty() {
        debug!(row, %variety, "variety has no sector mapping");
    }

    Ok(Some(NormalizedRecord {
        partition_id: ctx.partition_id.clone(),
        week,
        date,
        variety,
        derived_sectors,
        product_name: product.to_string(),
        dose_per_200l: parse_decimal(raw.dose()).max(0.0),
        drum_count: parse_count(raw.drums()),
        method: catalog.normalize_method(raw.method()),
        objective: None,
        status: STATUS_PROGRAMMED.to_string(),
        sync_key: ctx.sync_key(position),
        source_range: row_reference(&ctx.sheet_name, row),
        synced_at: ctx.synced_at,
    }))
}

/// Outcome of parsing a whole range, in fetch order.
#[derive(Debug, Clone, Default)]
pub struct ParsedRows {
    pub records: Vec<NormalizedRecord>,
    pub rejections: Vec<RowRejection>,
    pub skipped: usize,
}

pub fn parse_rows(rows: &[RawRow], ctx: &ParseContext, catalog: &Catalog) -> ParsedRows {
    let mut parsed = ParsedRows::default();
    for (position, raw) in rows.iter().enumerate() {
        match parse_row(raw, position, ctx, catalog) {
            Ok(Some(record)) => parsed.records.push(record),
            Ok(None) => parsed.skipped += 1,
            Err(rejection) => parsed.rejections.push(rejection),
        }
    }
    parsed
}

/// Accepts `DD/MM/YYYY` (day and month may drop the leading zero) or `YYYY-MM-DD`.
/// Shapes that match but name no real day (`31/02/2026`) are rejected.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();

    let slash: Vec<&str> = text.split('/').collect();
    if let [day, month, year] = slash.as_slice() {
        if is_digits(day, 1..=2) && is_digits(month, 1..=2) && is_digits(year, 4..=4) {
            return NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?);
        }
        return None;
    }

    let dash: Vec<&str> = text.split('-').collect();
    if let [year, month, day] = dash.as_slice() {
        if is_digits(year, 4..=4) && is_digits(month, 2..=2) && is_digits(day, 2..=2) {
            return NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?);
        }
    }
    None
}

fn is_digits(part: &str, widths: RangeInclusive<usize>) -> bool {
    widths.contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
}

/// Lenient decimal: blank or unparseable text is 0, a decimal comma is accepted.
fn parse_decimal(raw: &str) -> f64 {
    let text = raw.trim().replace(',', ".");
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Lenient non-negative integer; fractional input truncates, negatives clamp to 0.
fn parse_count(raw: &str) -> u32 {
    let text = raw.trim();
    match text.parse::<u32>() {
        Ok(v) => v,
        Err(_) => parse_decimal(text).max(0.0) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    fn ctx() -> ParseContext {
        ParseContext {
            partition_id: "alm-1".into(),
            spreadsheet_id: "ABC123".into(),
            sheet_name: "Programa".into(),
            start_row: 2,
            filter_week: None,
            synced_at: Utc.with_ymd_and_hms(2026, 2, 20, 7, 30, 0).single().unwrap(),
        }
    }

    fn row(week: &str, date: &str, variety: &str, product: &str) -> RawRow {
        RawRow::from([week, date, variety, product, "1", "", "", "", "FOLIAR", "2"])
    }

    #[test]
    fn scenario_row_produces_the_expected_record() {
        let raw = RawRow::from(["8", "24/02/2026", "biloxi", "Azufre", "0.5", "", "", "", "FOLIAR", "5"]);
        let record = parse_row(&raw, 3, &ctx(), Catalog::standard())
            .unwrap()
            .unwrap();

        assert_eq!(record.week, 8);
        assert_eq!(record.date.to_string(), "2026-02-24");
        assert_eq!(record.variety, "BILOXI");
        assert_eq!(
            record.derived_sectors,
            vec!["1A", "1B", "1C", "1D", "1E", "2A", "2B", "2C", "2D", "2E"]
        );
        assert_eq!(record.product_name, "Azufre");
        assert_eq!(record.dose_per_200l, 0.5);
        assert_eq!(record.drum_count, 5);
        assert_eq!(record.method, "FOLIAR");
        assert_eq!(record.objective, None);
        assert_eq!(record.status, "programada");
        assert_eq!(record.sync_key, "ABC123_3");
        assert_eq!(record.source_range, "Programa!A5:J5");
        assert_eq!(record.partition_id, "alm-1");
        assert_eq!(record.synced_at, ctx().synced_at);
    }

    #[test]
    fn blank_and_separator_rows_are_skipped_silently() {
        let catalog = Catalog::standard();
        assert_eq!(parse_row(&RawRow::default(), 0, &ctx(), catalog), Ok(None));
        assert_eq!(parse_row(&RawRow::from(["", " ", "  "]), 0, &ctx(), catalog), Ok(None));
        let title = RawRow::from(["SEMANA 9", "", "", "", "", "", "", "", "", ""]);
        assert_eq!(parse_row(&title, 0, &ctx(), catalog), Ok(None));
    }

    #[test]
    fn missing_product_with_variety_is_rejected() {
        let err = parse_row(&row("8", "24/02/2026", "biloxi", " "), 4, &ctx(), Catalog::standard())
            .unwrap_err();
        assert_eq!(err.to_string(), "row 6: missing product");
    }

    #[test]
    fn malformed_or_impossible_dates_are_rejected_with_the_raw_text() {
        let catalog = Catalog::standard();
        for bad in ["2026/02/24", "24-02-2026", "31/02/2026", "24/02/26", "mañana", ""] {
            let err = parse_row(&row("8", bad, "biloxi", "Azufre"), 0, &ctx(), catalog).unwrap_err();
            assert_eq!(err, RowRejection::InvalidDate { row: 2, raw: bad.to_string() });
        }
    }

    #[test]
    fn canonical_iso_dates_are_accepted() {
        assert_eq!(parse_date("2026-02-24"), NaiveDate::from_ymd_opt(2026, 2, 24));
        assert_eq!(parse_date(" 4/3/2026 "), NaiveDate::from_ymd_opt(2026, 3, 4));
        assert_eq!(parse_date("2026-2-24"), None);
    }

    #[test]
    fn day_month_year_dates_round_trip() {
        let mut day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        while day <= end {
            let text = format!("{:02}/{:02}/{:04}", day.day(), day.month(), day.year());
            let parsed = parse_date(&text).unwrap();
            assert_eq!(parsed.format("%Y-%m-%d").to_string(), day.format("%Y-%m-%d").to_string());
            assert_eq!(
                (parsed.day(), parsed.month(), parsed.year()),
                (day.day(), day.month(), day.year())
            );
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn numeric_fields_coerce_instead_of_rejecting() {
        let raw = RawRow::from(["sem", "24/02/2026", "biloxi", "Cobre", "abc", "", "", "", "", "-3"]);
        let record = parse_row(&raw, 0, &ctx(), Catalog::standard()).unwrap().unwrap();
        assert_eq!(record.week, 0);
        assert_eq!(record.dose_per_200l, 0.0);
        assert_eq!(record.drum_count, 0);
        assert_eq!(record.method, "FOLIAR");

        let raw = RawRow::from(["8", "24/02/2026", "biloxi", "Cobre", "0,75", "", "", "", "riego", "4.0"]);
        let record = parse_row(&raw, 0, &ctx(), Catalog::standard()).unwrap().unwrap();
        assert_eq!(record.dose_per_200l, 0.75);
        assert_eq!(record.drum_count, 4);
        assert_eq!(record.method, "APORTE ESPECIAL (RIEGO)");
    }

    #[test]
    fn unknown_variety_is_kept_with_no_sectors() {
        let record = parse_row(&row("8", "24/02/2026", "duke", "Azufre"), 0, &ctx(), Catalog::standard())
            .unwrap()
            .unwrap();
        assert_eq!(record.variety, "DUKE");
        assert!(record.derived_sectors.is_empty());
    }

    #[test]
    fn week_filter_keeps_only_matching_rows() {
        let mut ctx = ctx();
        ctx.filter_week = Some(5);
        let rows = vec![
            row("5", "02/02/2026", "biloxi", "Azufre"),
            row("6", "09/02/2026", "biloxi", "Cobre"),
            row("5", "03/02/2026", "ventura", "Calcio"),
            row("7", "16/02/2026", "biloxi", "Boro"),
        ];
        let parsed = parse_rows(&rows, &ctx, Catalog::standard());
        assert!(parsed.rejections.is_empty());
        assert_eq!(parsed.skipped, 2);
        let keys: Vec<_> = parsed.records.iter().map(|r| r.sync_key.as_str()).collect();
        assert_eq!(keys, vec!["ABC123_0", "ABC123_2"]);
        assert!(parsed.records.iter().all(|r| r.week == 5));
    }

    #[test]
    fn filtered_out_rows_are_not_validated() {
        let mut ctx = ctx();
        ctx.filter_week = Some(5);
        let parsed = parse_rows(&[row("6", "bad", "biloxi", "")], &ctx, Catalog::standard());
        assert!(parsed.rejections.is_empty());
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn rejections_do_not_stop_the_pass() {
        let mut rows: Vec<RawRow> = (1..=10)
            .map(|i| row("8", &format!("{i:02}/03/2026"), "biloxi", &format!("Producto {i}")))
            .collect();
        rows[3] = row("8", "04/03/2026", "biloxi", "");
        rows[6] = row("8", "07-03-2026", "biloxi", "Producto 7");

        let parsed = parse_rows(&rows, &ctx(), Catalog::standard());
        assert_eq!(parsed.records.len(), 8);
        assert_eq!(
            parsed
                .rejections
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec![
                "row 5: missing product".to_string(),
                "row 8: invalid date \"07-03-2026\"".to_string(),
            ]
        );
        assert_eq!(parsed.records.last().unwrap().product_name, "Producto 10");
        assert_eq!(parsed.records.last().unwrap().sync_key, "ABC123_9");
    }
}
