//! Header reconstruction: collapse a multi-row column header into one label
//! per column.
//!
//! CPI Table 1 prints its header over four lines, with group captions
//! ("Unadjusted indexes", "Seasonally adjusted percent change") spanning
//! several columns and the period of each column stacked underneath. The
//! captions are replaced by fixed group prefixes and only the period text
//! is read from the grid, so each value column ends up as
//! `variable.value_date`, e.g. `Unadj_idx.Dec2022`.

use crate::error::BookworksError;
use crate::pipeline::grid::CellGrid;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;

static WHITESPACE_OR_HYPHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-]").unwrap());
static NOT_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());

/// Semantic group a Table 1 column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnGroup {
    Category,
    RelativeImportance,
    UnadjustedIndex,
    UnadjustedPercentChange,
    SeasonallyAdjustedPercentChange,
}

impl ColumnGroup {
    /// Variable name used as the label prefix; None for the category column.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            ColumnGroup::Category => None,
            ColumnGroup::RelativeImportance => Some("Rel_imp"),
            ColumnGroup::UnadjustedIndex => Some("Unadj_idx"),
            ColumnGroup::UnadjustedPercentChange => Some("Unadj_pct_chg"),
            ColumnGroup::SeasonallyAdjustedPercentChange => Some("Seas_adj_pct_chg"),
        }
    }
}

/// One reconstructed column label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HeaderLabel {
    /// Row-identifying column, e.g. `Expenditure_category`.
    Category(String),
    /// Value column: `variable.value_date`.
    Measure { variable: String, value_date: String },
}

impl HeaderLabel {
    pub fn is_category(&self) -> bool {
        matches!(self, HeaderLabel::Category(_))
    }
}

impl fmt::Display for HeaderLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderLabel::Category(name) => f.write_str(name),
            HeaderLabel::Measure {
                variable,
                value_date,
            } => write!(f, "{variable}.{value_date}"),
        }
    }
}

/// Turns a header-region grid into column labels.
pub trait HeaderReconstructor: Send + Sync {
    fn name(&self) -> &str;

    /// Number of columns the body grid must have.
    fn expected_columns(&self) -> usize;

    fn reconstruct(&self, header: &CellGrid) -> Result<Vec<HeaderLabel>, BookworksError>;
}

/// Layout of the BLS CPI "Table 1" header.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpiTable1Header;

impl CpiTable1Header {
    /// Group and source rows for each of the ten columns.
    const LAYOUT: [(ColumnGroup, RangeInclusive<usize>); 10] = [
        (ColumnGroup::Category, 0..=0),
        (ColumnGroup::RelativeImportance, 1..=2),
        (ColumnGroup::UnadjustedIndex, 1..=2),
        (ColumnGroup::UnadjustedIndex, 1..=2),
        (ColumnGroup::UnadjustedIndex, 1..=2),
        (ColumnGroup::UnadjustedPercentChange, 0..=3),
        (ColumnGroup::UnadjustedPercentChange, 0..=3),
        (ColumnGroup::SeasonallyAdjustedPercentChange, 0..=3),
        (ColumnGroup::SeasonallyAdjustedPercentChange, 0..=3),
        (ColumnGroup::SeasonallyAdjustedPercentChange, 0..=3),
    ];
}

impl HeaderReconstructor for CpiTable1Header {
    fn name(&self) -> &str {
        "cpi-table-1"
    }

    fn expected_columns(&self) -> usize {
        Self::LAYOUT.len()
    }

    fn reconstruct(&self, header: &CellGrid) -> Result<Vec<HeaderLabel>, BookworksError> {
        if header.n_cols() != Self::LAYOUT.len() {
            return Err(BookworksError::ShapeMismatch {
                context: "table header".into(),
                expected: Self::LAYOUT.len(),
                found: header.n_cols(),
            });
        }

        Self::LAYOUT
            .iter()
            .enumerate()
            .map(|(col, (group, rows))| {
                // stacked cell fragments concatenate without a separator
                let raw: String = rows.clone().map(|r| header.cell(r, col).trim()).collect();
                let text = sanitize_label(&raw).map_err(|_| {
                    BookworksError::MalformedHeader(format!(
                        "column {col} ({group:?}) has no usable text in rows {}..={}",
                        rows.start(),
                        rows.end()
                    ))
                })?;
                Ok(match group.tag() {
                    None => HeaderLabel::Category(text),
                    Some(tag) => HeaderLabel::Measure {
                        variable: tag.to_string(),
                        value_date: text,
                    },
                })
            })
            .collect()
    }
}

/// Reduce raw header text to an identifier matching `[A-Za-z0-9_]+`.
///
/// Periods are removed, whitespace and hyphens become underscores, and any
/// other character is dropped.
pub fn sanitize_label(raw: &str) -> Result<String, BookworksError> {
    let no_periods = raw.trim().replace('.', "");
    let underscored = WHITESPACE_OR_HYPHEN.replace_all(&no_periods, "_");
    let clean = NOT_IDENT.replace_all(&underscored, "").into_owned();
    if clean.is_empty() {
        return Err(BookworksError::MalformedHeader(format!(
            "'{raw}' has no identifier characters"
        )));
    }
    Ok(clean)
}
