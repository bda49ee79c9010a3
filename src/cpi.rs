//! CPI entry points: report PDFs in, tidy dataset and plot series out.
//!
//! ```text
//! cpi_MMDDYYYY.pdf ──▶ find "Table 1" ──▶ words ──▶ body grid ─┐
//!                                                 └─▶ header grid ─▶ labels
//!                  ──▶ wide table ──▶ melt/split/pivot ──▶ concat ──▶ series
//! ```
//!
//! Reports are processed one at a time in file-name order; the first one
//! that fails aborts the run.

use crate::config::{CpiConfig, TablePage};
use crate::error::BookworksError;
use crate::output::{CpiOutput, ReportSummary};
use crate::pipeline::grid::{build_grid, GridOptions};
use crate::pipeline::pdf::{report_date_from_path, TableReader};
use crate::pipeline::reshape::{normalize_table, TidyDataset, WideTable};
use crate::pipeline::series::SeriesFilter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Normalise every report named by `inputs` (files or directories).
pub async fn normalize_reports<P: AsRef<Path>>(
    inputs: &[P],
    config: &CpiConfig,
) -> Result<CpiOutput, BookworksError> {
    let start = Instant::now();
    let paths = discover_reports(inputs)?;
    info!("Normalising {} CPI reports", paths.len());

    let reader = config.reader();
    let mut reports = Vec::with_capacity(paths.len());
    let mut parts = Vec::with_capacity(paths.len());
    for path in &paths {
        let (table, page) = read_report(path, config, &reader).await?;
        let tidy = normalize_table(&table)?;
        reports.push(ReportSummary {
            path: path.clone(),
            report_date: table.report_date,
            page,
            labels: table.labels.iter().map(ToString::to_string).collect(),
            body_rows: table.rows.len(),
            tidy_rows: tidy.len(),
        });
        parts.push(tidy);
    }

    let mut dataset = TidyDataset::concat(parts);
    dataset.clean_categories();
    let series = SeriesFilter::from_config(config).apply(&dataset);

    info!(
        "CPI complete: {} reports, {} tidy rows, {} plot points in {}ms",
        reports.len(),
        dataset.len(),
        series.len(),
        start.elapsed().as_millis()
    );
    Ok(CpiOutput {
        reports,
        dataset,
        series,
    })
}

/// Read one report's table with reconstructed labels.
///
/// Returns the table and the 1-indexed page it came from.
pub async fn read_report(
    path: &Path,
    config: &CpiConfig,
    reader: &Arc<dyn TableReader>,
) -> Result<(WideTable, usize), BookworksError> {
    let report_date = report_date_from_path(path, &config.file_prefix, &config.date_format)?;

    let page = match config.page {
        TablePage::Fixed(p) => p,
        TablePage::Auto => {
            let reader = Arc::clone(reader);
            let owned = path.to_path_buf();
            let marker = config.table_marker.clone();
            blocking(move || reader.find_page(&owned, &marker)).await?
        }
    };

    let spans = {
        let reader = Arc::clone(reader);
        let owned = path.to_path_buf();
        blocking(move || reader.read_spans(&owned, page)).await?
    };

    let options = GridOptions::default();
    let (body, columns) = build_grid(&spans, &config.body_area, None, &options);
    let body = body.without_blank_rows();
    let (header, _) = build_grid(&spans, &config.header_area, Some(&columns), &options);

    let expected = config.header.expected_columns();
    if body.n_cols() != expected {
        return Err(BookworksError::ShapeMismatch {
            context: format!("table body of {}", path.display()),
            expected,
            found: body.n_cols(),
        });
    }
    let labels = config.header.reconstruct(&header)?;
    debug!(
        "{}: page {}, {} body rows, labels {:?}",
        path.display(),
        page,
        body.n_rows(),
        labels.iter().map(ToString::to_string).collect::<Vec<_>>()
    );

    Ok((WideTable::new(report_date, labels, &body)?, page))
}

/// Expand directories to their `*.pdf` files; files pass through.
///
/// The result is sorted and contains no duplicates.
pub fn discover_reports<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<PathBuf>, BookworksError> {
    let mut out = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        if input.is_dir() {
            // the directory part must match literally, even with `[`, `*` or `?`
            let dir = glob::Pattern::escape(&input.to_string_lossy());
            let pattern = Path::new(&dir).join("*.pdf");
            let pattern = pattern.to_string_lossy();
            let entries = glob::glob(&pattern).map_err(|e| BookworksError::InvalidInput {
                input: format!("{}: {}", input.display(), e),
            })?;
            out.extend(entries.filter_map(Result::ok));
        } else if input.exists() {
            out.push(input.to_path_buf());
        } else {
            return Err(BookworksError::FileNotFound {
                path: input.to_path_buf(),
            });
        }
    }
    out.sort();
    out.dedup();
    if out.is_empty() {
        return Err(BookworksError::InvalidInput {
            input: "no PDF reports found".into(),
        });
    }
    Ok(out)
}

/// Run blocking pdf work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, BookworksError>
where
    F: FnOnce() -> Result<T, BookworksError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BookworksError::Internal(format!("PDF task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_expands_directories_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["cpi_02142023.pdf", "cpi_01122023.pdf", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"%PDF").unwrap();
        }
        let extra = dir.path().join("cpi_01122023.pdf");
        let found = discover_reports(&[dir.path().to_path_buf(), extra]).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["cpi_01122023.pdf", "cpi_02142023.pdf"]);
    }

    #[test]
    fn discover_treats_directory_name_literally() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("reports[2023]");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("cpi_01122023.pdf"), b"%PDF").unwrap();
        // would match `reports[2023]` read as a character class
        let decoy = root.path().join("reports2");
        std::fs::create_dir(&decoy).unwrap();
        std::fs::write(decoy.join("cpi_02142023.pdf"), b"%PDF").unwrap();

        let found = discover_reports(&[&dir]).unwrap();
        assert_eq!(found, vec![dir.join("cpi_01122023.pdf")]);
    }

    #[test]
    fn discover_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_reports(&[dir.path()]).unwrap_err(),
            BookworksError::InvalidInput { .. }
        ));
        assert!(matches!(
            discover_reports(&[dir.path().join("nope.pdf")]).unwrap_err(),
            BookworksError::FileNotFound { .. }
        ));
    }
}
