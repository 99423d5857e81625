//! CSV files as data sources
//!
//! Every `*.csv` file in the data directory is a source named after its file
//! stem. The first record is the header.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tally_core::{DataCatalog, DataDetail, DataSourceInfo};

use crate::utils::truncate_chars;

/// Distinct values tracked per text column before giving up
const DISTINCT_CAP: usize = 1000;
const VALUE_PREVIEW_CHARS: usize = 40;

/// Data catalog over a directory of CSV files
pub struct CsvCatalog {
    dir: PathBuf,
}

impl CsvCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", name))
    }

    fn load(&self, name: &str) -> Option<Table> {
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return None;
        }
        let path = self.path_for(name);
        match fs::read_to_string(&path) {
            Ok(text) => Some(Table::parse(&text)),
            Err(e) => {
                tracing::debug!("Cannot read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn csv_files(&self) -> Vec<PathBuf> {
        let pattern = format!(
            "{}/*.csv",
            glob::Pattern::escape(&self.dir.to_string_lossy())
        );

        match glob::glob(&pattern) {
            Ok(paths) => paths
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        tracing::debug!("Glob entry error: {}", e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Invalid data directory pattern {}: {}", pattern, e);
                Vec::new()
            }
        }
    }
}

fn stem(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

impl DataCatalog for CsvCatalog {
    fn enumerate(&self) -> Vec<DataSourceInfo> {
        let mut sources: Vec<DataSourceInfo> = self
            .csv_files()
            .iter()
            .filter_map(|path| {
                let name = stem(path)?;
                let table = self.load(&name)?;
                Some(DataSourceInfo {
                    name,
                    row_count: table.rows.len(),
                    col_count: table.header.len(),
                })
            })
            .collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        sources
    }

    fn describe(&self, name: &str, detail: DataDetail) -> Option<String> {
        let table = self.load(name)?;
        Some(match detail {
            DataDetail::Shape => table.describe_shape(),
            DataDetail::Full => table.describe_full(),
        })
    }
}

/// A parsed CSV file
#[derive(Debug, Clone, PartialEq)]
struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn parse(text: &str) -> Self {
        let mut records = parse_records(text).into_iter();
        let header = records.next().unwrap_or_default();
        let rows = records
            .filter(|r| !(r.len() == 1 && r[0].is_empty()))
            .collect();
        Self { header, rows }
    }

    fn column(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |r| r.get(index).map(|v| v.trim()).unwrap_or(""))
    }

    fn describe_shape(&self) -> String {
        format!(
            "Rows: {}, Columns: {}\nColumns: {}",
            self.rows.len(),
            self.header.len(),
            self.header.join(", ")
        )
    }

    fn describe_full(&self) -> String {
        let mut out = format!("Rows: {}, Columns: {}\n", self.rows.len(), self.header.len());
        for (i, name) in self.header.iter().enumerate() {
            let summary = ColumnSummary::of(self.column(i));
            out.push_str(&format!("\n- {} ({}): {}", name, summary.kind, summary.describe()));
        }
        out
    }
}

/// Split CSV text into records. Quoted fields may contain separators,
/// newlines and doubled quotes.
fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
    Empty,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Text => "text",
            ColumnKind::Empty => "empty",
        })
    }
}

struct ColumnSummary {
    kind: ColumnKind,
    missing: usize,
    numbers: Vec<f64>,
    counts: BTreeMap<String, usize>,
    capped: bool,
}

impl ColumnSummary {
    fn of<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let values: Vec<&str> = values.collect();
        let present: Vec<&str> = values.iter().copied().filter(|v| !v.is_empty()).collect();
        let missing = values.len() - present.len();

        let kind = if present.is_empty() {
            ColumnKind::Empty
        } else if present.iter().all(|v| v.parse::<i64>().is_ok()) {
            ColumnKind::Integer
        } else if present.iter().all(|v| v.parse::<f64>().is_ok()) {
            ColumnKind::Float
        } else if present
            .iter()
            .all(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "false"))
        {
            ColumnKind::Boolean
        } else {
            ColumnKind::Text
        };

        let numbers = match kind {
            ColumnKind::Integer | ColumnKind::Float => {
                present.iter().filter_map(|v| v.parse().ok()).collect()
            }
            _ => Vec::new(),
        };

        let mut counts = BTreeMap::new();
        let mut capped = false;
        if matches!(kind, ColumnKind::Text | ColumnKind::Boolean) {
            for v in &present {
                if counts.len() >= DISTINCT_CAP && !counts.contains_key(*v) {
                    capped = true;
                    continue;
                }
                *counts.entry(v.to_string()).or_insert(0) += 1;
            }
        }

        Self {
            kind,
            missing,
            numbers,
            counts,
            capped,
        }
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.numbers.is_empty() {
            let min = self.numbers.iter().copied().fold(f64::INFINITY, f64::min);
            let max = self.numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = self.numbers.iter().sum::<f64>() / self.numbers.len() as f64;
            parts.push(format!(
                "min {}, max {}, mean {}",
                format_stat(min),
                format_stat(max),
                format_stat(mean)
            ));
        }
        if !self.counts.is_empty() {
            let distinct = if self.capped {
                format!("{}+ distinct", DISTINCT_CAP)
            } else {
                format!("{} distinct", self.counts.len())
            };
            parts.push(distinct);
            // Most frequent value; ties go to the first in sort order
            let mut top: Option<(&String, usize)> = None;
            for (value, &count) in &self.counts {
                if top.is_none_or(|(_, best)| count > best) {
                    top = Some((value, count));
                }
            }
            if let Some((value, count)) = top {
                parts.push(format!(
                    "top \"{}\" ({})",
                    truncate_chars(value, VALUE_PREVIEW_CHARS),
                    count
                ));
            }
        }
        if self.missing > 0 {
            parts.push(format!("{} missing", self.missing));
        }
        if parts.is_empty() {
            parts.push("no values".to_string());
        }
        parts.join(", ")
    }
}

fn format_stat(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{:.2}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLE: &str = "name,age,score,active\n\
Ada,36,9.5,true\n\
\"Lovelace, Jr\",,7.25,false\n\
Ada,40,8,TRUE\n";

    fn catalog() -> (tempfile::TempDir, CsvCatalog) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("people.csv"), PEOPLE).unwrap();
        fs::write(dir.path().join("empty.csv"), "a,b\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not data").unwrap();
        let catalog = CsvCatalog::new(dir.path());
        (dir, catalog)
    }

    #[test]
    fn test_parse_records_handles_quotes() {
        let records = parse_records("a,b\r\n\"x, y\",\"say \"\"hi\"\"\"\n\"multi\nline\",2");
        assert_eq!(
            records,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["x, y".to_string(), "say \"hi\"".to_string()],
                vec!["multi\nline".to_string(), "2".to_string()],
            ]
        );
    }

    #[test]
    fn test_enumerate_lists_csv_files() {
        let (_dir, catalog) = catalog();
        let sources = catalog.enumerate();
        assert_eq!(
            sources,
            vec![
                DataSourceInfo {
                    name: "empty".to_string(),
                    row_count: 0,
                    col_count: 2,
                },
                DataSourceInfo {
                    name: "people".to_string(),
                    row_count: 3,
                    col_count: 4,
                },
            ]
        );
    }

    #[test]
    fn test_describe_shape() {
        let (_dir, catalog) = catalog();
        let text = catalog.describe("people", DataDetail::Shape).unwrap();
        assert_eq!(text, "Rows: 3, Columns: 4\nColumns: name, age, score, active");
    }

    #[test]
    fn test_describe_full_summarizes_columns() {
        let (_dir, catalog) = catalog();
        let text = catalog.describe("people", DataDetail::Full).unwrap();
        assert!(text.starts_with("Rows: 3, Columns: 4"));
        assert!(text.contains("- name (text): 2 distinct, top \"Ada\" (2)"));
        assert!(text.contains("- age (integer): min 36, max 40, mean 38, 1 missing"));
        assert!(text.contains("- score (float): min 7.25, max 9.50, mean 8.25"));
        assert!(text.contains("- active (boolean)"));
    }

    #[test]
    fn test_unknown_or_unsafe_names() {
        let (_dir, catalog) = catalog();
        assert!(catalog.describe("missing", DataDetail::Full).is_none());
        assert!(catalog.describe("../people", DataDetail::Full).is_none());
    }
}
