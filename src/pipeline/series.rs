//! Series selection: tidy dataset → points ready to plot.
//!
//! Only monthly value dates (`Dec2022`) are kept; period columns such as
//! `Dec2021_Dec2022` are percent changes over an interval and have no
//! single date. Dates become fractional years so the x axis is numeric.

use crate::config::CpiConfig;
use crate::pipeline::reshape::TidyDataset;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

/// One plotted observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// Fractional year, e.g. 2022.915 for 1 Dec 2022.
    pub date: f64,
    pub value: f64,
    pub category: String,
}

/// Which rows and which variable make up the chart.
#[derive(Debug, Clone)]
pub struct SeriesFilter {
    pub categories: Vec<String>,
    pub renames: Vec<(String, String)>,
    pub variable: String,
}

impl SeriesFilter {
    pub fn from_config(config: &CpiConfig) -> Self {
        Self {
            categories: config.categories.clone(),
            renames: config.category_renames.clone(),
            variable: config.plot_variable.clone(),
        }
    }

    fn display_name(&self, category: &str) -> String {
        self.renames
            .iter()
            .find(|(from, _)| from == category)
            .map(|(_, to)| to.clone())
            .unwrap_or_else(|| category.to_string())
    }

    /// Filter, rename, convert dates, drop missing values and duplicates.
    ///
    /// Points come back sorted by category, then date.
    pub fn apply(&self, dataset: &TidyDataset) -> Vec<SeriesPoint> {
        let mut points: Vec<SeriesPoint> = dataset
            .rows
            .iter()
            .filter(|r| self.categories.iter().any(|c| c == &r.category))
            .filter_map(|r| {
                let date = parse_value_date(&r.value_date)?;
                let value = r.get(&self.variable)?;
                Some(SeriesPoint {
                    date: fractional_year(date),
                    value,
                    category: self.display_name(&r.category),
                })
            })
            .collect();

        points.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then(a.date.partial_cmp(&b.date).unwrap_or(Ordering::Equal))
                .then(a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal))
        });
        points.dedup();
        debug!(
            "Series: {} points across {} categories",
            points.len(),
            self.categories.len()
        );
        points
    }
}

/// Parse a monthly value date such as `Dec2022` (first of the month).
///
/// Anything containing an underscore is an interval and yields None.
pub fn parse_value_date(value_date: &str) -> Option<NaiveDate> {
    if value_date.contains('_') {
        return None;
    }
    NaiveDate::parse_from_str(&format!("01{value_date}"), "%d%b%Y").ok()
}

/// `year + days since 1 Jan / days in year`.
pub fn fractional_year(date: NaiveDate) -> f64 {
    let year = date.year();
    let start = NaiveDate::from_ymd_opt(year, 1, 1);
    let next = NaiveDate::from_ymd_opt(year + 1, 1, 1);
    match (start, next) {
        (Some(start), Some(next)) => {
            let elapsed = (date - start).num_days() as f64;
            let length = (next - start).num_days() as f64;
            year as f64 + elapsed / length
        }
        _ => year as f64,
    }
}
