//! Grid building: positioned text spans → a 2-D grid of cell strings.
//!
//! Rows are found by clustering spans on their vertical centre, with a
//! tolerance proportional to span height. Columns are the union of the
//! horizontal extents of every span: overlapping extents merge into one
//! band, and gaps between bands are the column gutters. This is the
//! "stream" approach for tables without ruling lines.
//!
//! Coordinates are page points with a top-left origin, matching the
//! `[top, left, bottom, right]` area convention used throughout.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// A run of text with its bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            text: text.into(),
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn center_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    pub fn center_x(&self) -> f32 {
        (self.left + self.right) / 2.0
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }
}

/// A rectangular page region in points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageArea {
    pub top: f32,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
}

impl PageArea {
    pub const fn new(top: f32, left: f32, bottom: f32, right: f32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.top < self.bottom && self.left < self.right
    }

    /// Whether the span's centre point lies inside the area.
    pub fn contains(&self, span: &TextSpan) -> bool {
        let (x, y) = (span.center_x(), span.center_y());
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// Horizontal extent of one detected column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnBand {
    pub left: f32,
    pub right: f32,
}

impl ColumnBand {
    fn overlap(&self, span: &TextSpan) -> f32 {
        (self.right.min(span.right) - self.left.max(span.left)).max(0.0)
    }

    fn distance(&self, x: f32) -> f32 {
        if x < self.left {
            self.left - x
        } else if x > self.right {
            x - self.right
        } else {
            0.0
        }
    }
}

/// Tuning for [`build_grid`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridOptions {
    /// Row tolerance as a fraction of span height.
    pub y_tolerance_factor: f32,
    /// Extents closer than this (points) merge into one column.
    pub min_column_gap: f32,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            y_tolerance_factor: 0.4,
            min_column_gap: 2.0,
        }
    }
}

/// Rectangular table of cell strings; every row has `n_cols` cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CellGrid {
    rows: Vec<Vec<String>>,
    n_cols: usize,
}

impl CellGrid {
    /// Build from ragged rows, padding short rows with empty cells.
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|r| r.into_iter().map(Into::into).collect())
            .collect();
        let n_cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        for r in &mut rows {
            r.resize(n_cols, String::new());
        }
        Self { rows, n_cols }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Cell text, or `""` outside the grid.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Drop rows whose cells are all empty.
    pub fn without_blank_rows(mut self) -> Self {
        self.rows.retain(|r| r.iter().any(|c| !c.trim().is_empty()));
        self
    }
}

/// Cluster spans into rows, top to bottom, each row sorted left to right.
pub fn group_into_rows(spans: &[TextSpan], options: &GridOptions) -> Vec<Vec<TextSpan>> {
    let mut sorted = spans.to_vec();
    sorted.sort_by(|a, b| {
        a.center_y()
            .partial_cmp(&b.center_y())
            .unwrap_or(Ordering::Equal)
            .then(a.left.partial_cmp(&b.left).unwrap_or(Ordering::Equal))
    });

    let mut rows: Vec<Vec<TextSpan>> = Vec::new();
    let mut current_y: Option<f32> = None;
    for span in sorted {
        let tolerance = (span.height() * options.y_tolerance_factor).max(1.0);
        let same_row = current_y.is_some_and(|y| (span.center_y() - y).abs() <= tolerance);
        match rows.last_mut() {
            Some(row) if same_row => {
                row.push(span);
                current_y = Some(row.iter().map(TextSpan::center_y).sum::<f32>() / row.len() as f32);
            }
            _ => {
                current_y = Some(span.center_y());
                rows.push(vec![span]);
            }
        }
    }

    for row in &mut rows {
        row.sort_by(|a, b| a.left.partial_cmp(&b.left).unwrap_or(Ordering::Equal));
    }
    rows
}

/// Merge the horizontal extents of all spans into column bands.
pub fn detect_columns(spans: &[TextSpan], options: &GridOptions) -> Vec<ColumnBand> {
    let mut extents: Vec<(f32, f32)> = spans
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| (s.left, s.right))
        .collect();
    extents.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let mut bands: Vec<ColumnBand> = Vec::new();
    for (left, right) in extents {
        match bands.last_mut() {
            Some(last) if left - last.right < options.min_column_gap => {
                last.right = last.right.max(right);
            }
            _ => bands.push(ColumnBand { left, right }),
        }
    }
    debug!("Detected {} column bands", bands.len());
    bands
}

/// Index of the band a span belongs to: largest overlap, else nearest centre.
fn column_for(span: &TextSpan, columns: &[ColumnBand]) -> usize {
    let best_overlap = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.overlap(span)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    match best_overlap {
        Some((i, overlap)) if overlap > 0.0 => i,
        _ => columns
            .iter()
            .enumerate()
            .min_by(|a, b| {
                a.1.distance(span.center_x())
                    .partial_cmp(&b.1.distance(span.center_x()))
                    .unwrap_or(Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0),
    }
}

/// Build a grid from the spans inside `area`.
///
/// Pass `columns` to reuse bands detected elsewhere (the header region is
/// laid out against the body's columns); otherwise they are detected from
/// the spans themselves. Spans landing in the same cell are joined with a
/// space in left-to-right order.
pub fn build_grid(
    spans: &[TextSpan],
    area: &PageArea,
    columns: Option<&[ColumnBand]>,
    options: &GridOptions,
) -> (CellGrid, Vec<ColumnBand>) {
    let inside: Vec<TextSpan> = spans
        .iter()
        .filter(|s| area.contains(s) && !s.text.trim().is_empty())
        .cloned()
        .collect();
    let columns = match columns {
        Some(c) => c.to_vec(),
        None => detect_columns(&inside, options),
    };
    if columns.is_empty() {
        return (CellGrid::default(), columns);
    }

    let rows = group_into_rows(&inside, options);
    let grid_rows = rows.iter().map(|row| {
        let mut cells = vec![String::new(); columns.len()];
        for span in row {
            let cell = &mut cells[column_for(span, &columns)];
            if !cell.is_empty() {
                cell.push(' ');
            }
            cell.push_str(span.text.trim());
        }
        cells
    });
    let grid = CellGrid::from_rows(grid_rows);
    debug!(
        "Built {}x{} grid from {} spans",
        grid.n_rows(),
        grid.n_cols(),
        inside.len()
    );
    (grid, columns)
}
