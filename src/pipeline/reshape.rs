//! Reshaping: one wide table per report → a single tidy dataset.
//!
//! ```text
//! wide ──melt──▶ (category, "Unadj_idx.Dec2022", value)
//!      ──split─▶ (category, "Unadj_idx", "Dec2022", value)
//!      ──pivot─▶ (report_date, category, "Dec2022") → {Unadj_idx: 296.1, …}
//! ```
//!
//! Reports are pivoted one at a time and then concatenated; the variable
//! columns of the result are the union over all reports.

use crate::error::BookworksError;
use crate::pipeline::grid::CellGrid;
use crate::pipeline::header::HeaderLabel;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use tracing::debug;

static TRAILING_LEADERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ .]+$").unwrap());

/// A report's table with reconstructed column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub report_date: NaiveDate,
    pub labels: Vec<HeaderLabel>,
    /// Body cells, one entry per label.
    pub rows: Vec<Vec<String>>,
}

impl WideTable {
    /// Attach labels to a body grid. The first [`HeaderLabel::Category`]
    /// column identifies rows; exactly one must exist.
    pub fn new(
        report_date: NaiveDate,
        labels: Vec<HeaderLabel>,
        body: &CellGrid,
    ) -> Result<Self, BookworksError> {
        if body.n_cols() != labels.len() {
            return Err(BookworksError::ShapeMismatch {
                context: format!("body of report {report_date}"),
                expected: labels.len(),
                found: body.n_cols(),
            });
        }
        match labels.iter().filter(|l| l.is_category()).count() {
            1 => {}
            n => {
                return Err(BookworksError::MalformedHeader(format!(
                    "expected one category column, found {n}"
                )))
            }
        }
        Ok(Self {
            report_date,
            labels,
            rows: body.rows().to_vec(),
        })
    }

    fn category_index(&self) -> usize {
        self.labels
            .iter()
            .position(HeaderLabel::is_category)
            .unwrap_or(0)
    }
}

/// One cell of a wide table in long form.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
    pub report_date: NaiveDate,
    pub category: String,
    /// Compound `variable.value_date` label.
    pub variable: String,
    pub value: String,
}

/// A long record whose compound label has been split.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRecord {
    pub report_date: NaiveDate,
    pub category: String,
    pub variable: String,
    pub value_date: String,
    pub value: Option<f64>,
}

/// Wide → long: one record per (row, value column). Rows with an empty
/// category cell are skipped.
pub fn melt(table: &WideTable) -> Vec<LongRecord> {
    let cat = table.category_index();
    let mut out = Vec::new();
    for row in &table.rows {
        let category = row.get(cat).map(|c| c.trim()).unwrap_or("");
        if category.is_empty() {
            continue;
        }
        for (col, label) in table.labels.iter().enumerate() {
            if label.is_category() {
                continue;
            }
            out.push(LongRecord {
                report_date: table.report_date,
                category: category.to_string(),
                variable: label.to_string(),
                value: row.get(col).cloned().unwrap_or_default(),
            });
        }
    }
    out
}

/// Split `variable.value_date` on its period; anything other than exactly
/// two tokens is an error.
pub fn split_compound(label: &str) -> Result<(String, String), BookworksError> {
    let tokens: Vec<&str> = label.split('.').collect();
    match tokens.as_slice() {
        [variable, value_date] if !variable.is_empty() && !value_date.is_empty() => {
            Ok((variable.to_string(), value_date.to_string()))
        }
        _ => Err(BookworksError::MalformedVariable {
            label: label.to_string(),
            tokens: tokens.len(),
        }),
    }
}

/// Split every record's compound label and parse its value.
pub fn split_records(records: Vec<LongRecord>) -> Result<Vec<SplitRecord>, BookworksError> {
    records
        .into_iter()
        .map(|r| {
            let (variable, value_date) = split_compound(&r.variable)?;
            Ok(SplitRecord {
                report_date: r.report_date,
                category: r.category,
                variable,
                value_date,
                value: parse_value(&r.value),
            })
        })
        .collect()
}

/// Parse a numeric cell. Thousands separators are ignored; footnote
/// markers, dashes and blanks give None.
pub fn parse_value(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// One tidy row: a (report date, category, value date) key and its values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TidyRow {
    pub report_date: NaiveDate,
    pub category: String,
    pub value_date: String,
    pub values: BTreeMap<String, Option<f64>>,
}

impl TidyRow {
    pub fn get(&self, variable: &str) -> Option<f64> {
        self.values.get(variable).copied().flatten()
    }
}

/// The normalised dataset: one row per key, one column per variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TidyDataset {
    /// Variable columns in first-seen order.
    pub variables: Vec<String>,
    pub rows: Vec<TidyRow>,
}

/// Long → wide on `variable`, keyed by (report_date, category, value_date).
pub fn pivot(records: Vec<SplitRecord>) -> Result<TidyDataset, BookworksError> {
    let mut dataset = TidyDataset::default();
    let mut index: HashMap<(NaiveDate, String, String), usize> = HashMap::new();

    for r in records {
        if !dataset.variables.contains(&r.variable) {
            dataset.variables.push(r.variable.clone());
        }
        let key = (r.report_date, r.category.clone(), r.value_date.clone());
        let row_idx = *index.entry(key).or_insert_with(|| {
            dataset.rows.push(TidyRow {
                report_date: r.report_date,
                category: r.category.clone(),
                value_date: r.value_date.clone(),
                values: BTreeMap::new(),
            });
            dataset.rows.len() - 1
        });
        let row = &mut dataset.rows[row_idx];
        if row.values.contains_key(&r.variable) {
            return Err(BookworksError::DuplicateKey {
                report_date: r.report_date.to_string(),
                category: r.category,
                value_date: r.value_date,
                variable: r.variable,
            });
        }
        row.values.insert(r.variable, r.value);
    }
    Ok(dataset)
}

/// Melt, split and pivot one report.
pub fn normalize_table(table: &WideTable) -> Result<TidyDataset, BookworksError> {
    let long = melt(table);
    let n_long = long.len();
    let dataset = pivot(split_records(long)?)?;
    debug!(
        "Report {}: {} cells → {} tidy rows",
        table.report_date,
        n_long,
        dataset.rows.len()
    );
    Ok(dataset)
}

impl TidyDataset {
    /// Append `other`; variables missing on either side read as empty.
    pub fn extend(&mut self, other: TidyDataset) {
        for v in other.variables {
            if !self.variables.contains(&v) {
                self.variables.push(v);
            }
        }
        self.rows.extend(other.rows);
    }

    pub fn concat(parts: impl IntoIterator<Item = TidyDataset>) -> Self {
        let mut all = TidyDataset::default();
        for p in parts {
            all.extend(p);
        }
        all
    }

    /// Strip trailing dot leaders and spaces from category names.
    pub fn clean_categories(&mut self) {
        for row in &mut self.rows {
            let cleaned = TRAILING_LEADERS.replace(&row.category, "").into_owned();
            row.category = cleaned;
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write as CSV: key columns, then one column per variable.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut w = csv::Writer::from_writer(writer);
        let mut header = vec!["report_date", "category", "value_date"];
        header.extend(self.variables.iter().map(String::as_str));
        w.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![
                row.report_date.format("%Y-%m-%d").to_string(),
                row.category.clone(),
                row.value_date.clone(),
            ];
            record.extend(
                self.variables
                    .iter()
                    .map(|v| row.get(v).map(|x| x.to_string()).unwrap_or_default()),
            );
            w.write_record(&record)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn write_csv_file(&self, path: &Path) -> Result<(), BookworksError> {
        let file = std::fs::File::create(path).map_err(|e| BookworksError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.write_csv(std::io::BufWriter::new(file))
            .map_err(|e| BookworksError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: std::io::Error::other(e),
            })
    }
}
