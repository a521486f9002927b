//! Purpose: Render audit results as aligned text or JSON envelopes.
//! Exports: `render_weeks`, `render_type_stats`, `render_record_types`, `*_json`.
//! Exports: `format_size`, `format_rate`.
//! Role: Presentation only; the engines in `core` own every count.
//! Invariants: Rates always print with two decimals.
//! Invariants: Text output is stable line-by-line; JSON field names are additive-only.
use serde::Serialize;
use serde_json::{Value, json};

use crate::core::aggregate::{AggregateReport, TypeStat};
use crate::core::reconcile::{ReconcileReport, WeekBucket};
use crate::core::schema::RecordPrefix;

const UNKNOWN_NAME: &str = "-";

#[derive(Debug, Serialize)]
struct WeekRow {
    week_start: String,
    week_end: String,
    unprocessed: u64,
    total: u64,
    unprocessed_rate: String,
}

#[derive(Debug, Serialize)]
struct TypeStatRow {
    prefix: u16,
    name: Option<&'static str>,
    count: u64,
    total_key_bytes: u64,
    total_value_bytes: u64,
}

impl From<&WeekBucket> for WeekRow {
    fn from(bucket: &WeekBucket) -> Self {
        Self {
            week_start: bucket.week_start.to_string(),
            week_end: bucket.week_end.to_string(),
            unprocessed: bucket.unprocessed,
            total: bucket.total,
            unprocessed_rate: format_rate(bucket.unprocessed, bucket.total),
        }
    }
}

impl From<&TypeStat> for TypeStatRow {
    fn from(stat: &TypeStat) -> Self {
        Self {
            prefix: stat.prefix.value(),
            name: stat.name,
            count: stat.count,
            total_key_bytes: stat.total_key_bytes,
            total_value_bytes: stat.total_value_bytes,
        }
    }
}

/// `unprocessed / total * 100` with two decimals; `0.00` for an empty total.
pub fn format_rate(unprocessed: u64, total: u64) -> String {
    if total == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", unprocessed as f64 / total as f64 * 100.0)
}

/// Binary-unit size: `512 B`, `1.5 KB`, `2.0 MB`.
pub fn format_size(value: u64) -> String {
    const UNITS: [&str; 6] = ["KB", "MB", "GB", "TB", "PB", "EB"];
    if value < 1024 {
        return format!("{value} B");
    }
    let mut scaled = value as f64 / 1024.0;
    let mut unit = 0;
    while scaled >= 1024.0 && unit < UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }
    format!("{scaled:.1} {}", UNITS[unit])
}

pub fn render_weeks(report: &ReconcileReport) -> String {
    let mut out = String::new();
    for bucket in &report.weeks {
        out.push_str(&format!("{} - {}\n", bucket.week_start, bucket.week_end));
        out.push_str(&format!("\tUnprocessed transactions: {}\n", bucket.unprocessed));
        out.push_str(&format!("\tTotal transactions: {}\n", bucket.total));
        out.push_str(&format!(
            "\tUnprocessed rate: {}%\n",
            format_rate(bucket.unprocessed, bucket.total)
        ));
    }
    out
}

pub fn weeks_json(report: &ReconcileReport) -> Value {
    let weeks = report.weeks.iter().map(WeekRow::from).collect::<Vec<_>>();
    json!({
        "weeks": weeks,
        "skipped": {
            "malformed_key": report.skipped.malformed_key,
            "undecodable_id": report.skipped.undecodable_id,
            "short_value": report.skipped.short_value,
            "bad_timestamp": report.skipped.bad_timestamp,
        },
    })
}

#[derive(Clone, Copy, PartialEq)]
enum Align {
    Left,
    Right,
}

pub fn render_type_stats(report: &AggregateReport) -> String {
    let headers = ["PREFIX", "NAME", "COUNT", "KEYS", "VALUES"];
    let aligns = [Align::Right, Align::Left, Align::Right, Align::Right, Align::Right];
    let rows = report
        .stats
        .values()
        .map(|stat| {
            vec![
                stat.prefix.to_string(),
                stat.name.unwrap_or(UNKNOWN_NAME).to_string(),
                stat.count.to_string(),
                format_size(stat.total_key_bytes),
                format_size(stat.total_value_bytes),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers, &aligns, &rows)
}

pub fn type_stats_json(report: &AggregateReport) -> Value {
    let stats = report.stats.values().map(TypeStatRow::from).collect::<Vec<_>>();
    json!({
        "stats": stats,
        "short_keys": report.short_keys,
    })
}

pub fn render_record_types() -> String {
    let rows = RecordPrefix::known()
        .map(|prefix| {
            vec![
                prefix.to_string(),
                prefix.name().unwrap_or(UNKNOWN_NAME).to_string(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&["PREFIX", "NAME"], &[Align::Right, Align::Left], &rows)
}

pub fn record_types_json() -> Value {
    let types = RecordPrefix::known()
        .map(|prefix| json!({ "prefix": prefix.value(), "name": prefix.name() }))
        .collect::<Vec<_>>();
    json!({ "record_types": types })
}

fn render_table(headers: &[&str], aligns: &[Align], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(idx) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let header_cells = headers.iter().map(|header| header.to_string()).collect::<Vec<_>>();
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format_table_line(&header_cells, &widths, aligns));
    for row in rows {
        lines.push(format_table_line(row, &widths, aligns));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn format_table_line(cells: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("    ");
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        let pad = width.saturating_sub(cell.chars().count());
        let align = aligns.get(idx).copied().unwrap_or(Align::Left);
        if align == Align::Right {
            line.push_str(&" ".repeat(pad));
            line.push_str(cell);
        } else {
            line.push_str(cell);
            if idx + 1 < widths.len() {
                line.push_str(&" ".repeat(pad));
            }
        }
    }
    line
}
