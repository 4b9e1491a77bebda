//! CSV and spreadsheet extraction.
//!
//! A table is rendered as an overview (dimensions, headers, sample rows and
//! per-column statistics) followed by every data row. When that does not fit
//! the budget it is split by sheet and row range; rows are never dropped.

use calamine::{open_workbook_auto_from_rs, Reader};
use itertools::Itertools;
use std::collections::HashSet;
use std::io::Cursor;
use std::ops::Range;

use super::FormatExtractor;
use crate::tokens::estimate_text_tokens;

pub const SAMPLE_ROWS: usize = 5;

/// One sheet: a header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub sheet: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build from raw records, treating the first non-empty record as headers.
    pub fn from_records(sheet: Option<String>, records: Vec<Vec<String>>) -> Self {
        let mut records = records
            .into_iter()
            .filter(|r| r.iter().any(|c| !c.trim().is_empty()));

        let headers = records.next().unwrap_or_default();
        Self {
            sheet,
            headers,
            rows: records.collect(),
        }
    }

    fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
    }

    fn column_name(&self, index: usize) -> String {
        self.headers
            .get(index)
            .filter(|h| !h.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| format!("column {}", index + 1))
    }

    fn column_stats(&self) -> Vec<ColumnStats> {
        (0..self.column_count())
            .map(|index| {
                let values: Vec<&str> = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(index))
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .collect();
                ColumnStats::compute(self.column_name(index), &values)
            })
            .collect()
    }

    fn label(&self) -> String {
        match &self.sheet {
            Some(sheet) => format!("Sheet \"{sheet}\""),
            None => "Table".to_string(),
        }
    }

    fn render_overview(&self) -> String {
        let mut out = format!(
            "{}\nRows: {}\nColumns: {}\nHeaders: {}\n",
            self.label(),
            self.rows.len(),
            self.column_count(),
            (0..self.column_count()).map(|i| self.column_name(i)).join(", ")
        );

        if !self.rows.is_empty() {
            out.push_str(&format!("Sample rows (first {}):\n", SAMPLE_ROWS.min(self.rows.len())));
            out.push_str(&self.render_rows(0..SAMPLE_ROWS.min(self.rows.len())));
        }

        out.push_str("Column statistics:\n");
        for stats in self.column_stats() {
            out.push_str(&format!("- {stats}\n"));
        }
        out
    }

    fn render_row(&self, index: usize) -> String {
        let cells = self.rows[index]
            .iter()
            .enumerate()
            .map(|(col, value)| format!("{}: {}", self.column_name(col), value.trim()))
            .join(" | ");
        format!("Row {}: {cells}\n", index + 1)
    }

    fn render_rows(&self, range: Range<usize>) -> String {
        range.map(|i| self.render_row(i)).collect()
    }

    fn render_full(&self) -> String {
        if self.rows.is_empty() {
            return format!("{}(no data rows)\n", self.render_overview());
        }
        format!(
            "{}All rows:\n{}",
            self.render_overview(),
            self.render_rows(0..self.rows.len())
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ColumnStats {
    Numeric {
        name: String,
        count: usize,
        min: f64,
        max: f64,
        mean: f64,
    },
    Text {
        name: String,
        count: usize,
        distinct: usize,
    },
}

impl ColumnStats {
    fn compute(name: String, values: &[&str]) -> Self {
        let numbers: Option<Vec<f64>> = values.iter().map(|v| parse_number(v)).collect();
        match numbers {
            Some(numbers) if !numbers.is_empty() => {
                let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
                let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
                ColumnStats::Numeric {
                    name,
                    count: numbers.len(),
                    min,
                    max,
                    mean,
                }
            }
            _ => ColumnStats::Text {
                name,
                count: values.len(),
                distinct: values.iter().collect::<HashSet<_>>().len(),
            },
        }
    }
}

impl std::fmt::Display for ColumnStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnStats::Numeric {
                name,
                count,
                min,
                max,
                mean,
            } => write!(
                f,
                "{name}: numeric, {count} values, min {min}, max {max}, mean {:.2}",
                mean
            ),
            ColumnStats::Text {
                name,
                count,
                distinct,
            } => write!(f, "{name}: text, {count} values, {distinct} distinct"),
        }
    }
}

fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    value.parse::<f64>().ok().or_else(|| {
        // Decimal comma, as in "1234,56".
        if value.contains(',') && !value.contains('.') {
            value.replace(',', ".").parse().ok()
        } else {
            None
        }
    })
}

/// Render tables as budget-bounded segments.
pub fn summarize_tables(file_name: &str, tables: &[Table], max_tokens_per_chunk: usize) -> Vec<String> {
    if tables.iter().all(|t| t.rows.is_empty() && t.headers.is_empty()) {
        return vec![format!("[Spreadsheet {file_name} contains no data]")];
    }

    let full = format!(
        "Spreadsheet: {file_name}\n\n{}",
        tables.iter().map(Table::render_full).join("\n")
    );
    if estimate_text_tokens(&full) <= max_tokens_per_chunk {
        return vec![full];
    }

    let mut segments = Vec::new();
    for table in tables {
        segments.extend(chunk_table(file_name, table, max_tokens_per_chunk));
    }

    let total = segments.len();
    segments
        .into_iter()
        .enumerate()
        .map(|(i, segment)| format!("Spreadsheet: {file_name} (part {}/{total})\n\n{segment}", i + 1))
        .collect()
}

/// Overview first, then greedy row ranges. A single row larger than the
/// budget still gets its own segment.
fn chunk_table(file_name: &str, table: &Table, max_tokens: usize) -> Vec<String> {
    let header_budget = estimate_text_tokens(file_name) + 16;
    let budget = max_tokens.saturating_sub(header_budget).max(1);
    let mut segments = vec![table.render_overview()];

    let mut start = 0;
    while start < table.rows.len() {
        let mut body = String::new();
        let mut end = start;
        while end < table.rows.len() {
            let row = table.render_row(end);
            if end > start && estimate_text_tokens(&body) + estimate_text_tokens(&row) > budget {
                break;
            }
            body.push_str(&row);
            end += 1;
        }
        segments.push(format!(
            "{} rows {}-{} of {}:\n{body}",
            table.label(),
            start + 1,
            end,
            table.rows.len()
        ));
        start = end;
    }
    segments
}

/// Comma or semicolon delimited text.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvExtractor;

impl FormatExtractor for CsvExtractor {
    fn extract(&self, bytes: &[u8], file_name: &str, max_tokens_per_chunk: usize) -> Vec<String> {
        match read_csv(bytes) {
            Ok(table) => summarize_tables(file_name, &[table], max_tokens_per_chunk),
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "CSV parsing failed");
                vec![format!("[Could not parse CSV file {file_name}: {e}]")]
            }
        }
    }
}

fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

pub fn read_csv(bytes: &[u8]) -> Result<Table, csv::Error> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(bytes))
        .from_reader(bytes);

    let mut records = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        records.push(
            record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect(),
        );
    }
    Ok(Table::from_records(None, records))
}

/// Excel and OpenDocument workbooks, every sheet.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcelExtractor;

impl FormatExtractor for ExcelExtractor {
    fn extract(&self, bytes: &[u8], file_name: &str, max_tokens_per_chunk: usize) -> Vec<String> {
        match read_workbook(bytes) {
            Ok(tables) => summarize_tables(file_name, &tables, max_tokens_per_chunk),
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "spreadsheet parsing failed");
                vec![format!("[Could not read spreadsheet {file_name}: {e}]")]
            }
        }
    }
}

pub fn read_workbook(bytes: &[u8]) -> Result<Vec<Table>, calamine::Error> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let mut tables = Vec::new();

    for name in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                tracing::debug!(sheet = %name, error = %e, "skipping unreadable sheet");
                continue;
            }
        };
        let records = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        tables.push(Table::from_records(Some(name), records));
    }
    Ok(tables)
}
