//! PDF access for the table pipeline: find the table page and pull
//! positioned words off it.
//!
//! The pipeline only sees [`TableReader`]. [`PdfiumTableReader`] is the
//! shipped implementation; its methods block on the pdfium C library, so
//! callers run them inside `tokio::task::spawn_blocking`.

use crate::error::BookworksError;
use crate::pipeline::grid::TextSpan;
use chrono::NaiveDate;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of positioned text for a report page.
///
/// Pages are 1-indexed. Coordinates are page points, top-left origin.
pub trait TableReader: Send + Sync {
    /// First page whose text contains `marker`.
    fn find_page(&self, path: &Path, marker: &str) -> Result<usize, BookworksError>;

    /// Every word on `page` with its bounding box.
    fn read_spans(&self, path: &Path, page: usize) -> Result<Vec<TextSpan>, BookworksError>;
}

/// [`TableReader`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTableReader {
    /// Explicit libpdfium path; the system library is used when None.
    pub library_path: Option<PathBuf>,
}

impl PdfiumTableReader {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    fn bind(&self) -> Result<Pdfium, BookworksError> {
        let bindings = match self.library_path {
            Some(ref path) => Pdfium::bind_to_library(path).map_err(|e| {
                BookworksError::PdfiumBindingFailed(format!("{}: {}", path.display(), e))
            })?,
            None => Pdfium::bind_to_system_library()
                .map_err(|e| BookworksError::PdfiumBindingFailed(e.to_string()))?,
        };
        Ok(Pdfium::new(bindings))
    }
}

impl TableReader for PdfiumTableReader {
    fn find_page(&self, path: &Path, marker: &str) -> Result<usize, BookworksError> {
        check_pdf_magic(path)?;
        let pdfium = self.bind()?;
        let document = load(&pdfium, path)?;

        for (idx, page) in document.pages().iter().enumerate() {
            let text = page.text().map_err(|e| corrupt(path, e))?;
            if text.all().contains(marker) {
                debug!("{}: '{}' on page {}", path.display(), marker, idx + 1);
                return Ok(idx + 1);
            }
        }
        Err(BookworksError::TableNotFound {
            path: path.to_path_buf(),
            marker: marker.to_string(),
        })
    }

    fn read_spans(&self, path: &Path, page: usize) -> Result<Vec<TextSpan>, BookworksError> {
        check_pdf_magic(path)?;
        let pdfium = self.bind()?;
        let document = load(&pdfium, path)?;
        let pages = document.pages();
        let total = pages.len() as usize;
        if page == 0 || page > total {
            return Err(BookworksError::PageOutOfRange { page, total });
        }

        let pdf_page = pages
            .get((page - 1) as u16)
            .map_err(|e| corrupt(path, e))?;
        let height = pdf_page.height().value;
        let text = pdf_page.text().map_err(|e| corrupt(path, e))?;

        let mut words = WordBuilder::default();
        for ch in text.chars().iter() {
            let Some(c) = ch.unicode_char() else {
                continue;
            };
            let Ok(rect) = ch.tight_bounds() else {
                continue;
            };
            // pdfium reports bottom-left origin
            let span = TextSpan::new(
                c.to_string(),
                rect.left().value,
                height - rect.top().value,
                rect.right().value,
                height - rect.bottom().value,
            );
            words.push(c, span);
        }
        let spans = words.finish();
        debug!(
            "{} page {}: {} words",
            path.display(),
            page,
            spans.len()
        );
        Ok(spans)
    }
}

/// Joins characters into words, breaking on whitespace, line changes and
/// horizontal gaps wider than a fraction of the glyph height.
#[derive(Default)]
struct WordBuilder {
    current: Option<TextSpan>,
    words: Vec<TextSpan>,
}

impl WordBuilder {
    const GAP_FACTOR: f32 = 0.3;

    fn push(&mut self, c: char, glyph: TextSpan) {
        if c.is_whitespace() {
            self.flush();
            return;
        }
        if let Some(ref mut word) = self.current {
            let line_height = word.height().max(glyph.height()).max(1.0);
            let same_line = (glyph.center_y() - word.center_y()).abs() <= line_height / 2.0;
            let gap = glyph.left - word.right;
            if same_line && gap <= line_height * Self::GAP_FACTOR && gap > -line_height {
                word.text.push(c);
                word.right = word.right.max(glyph.right);
                word.top = word.top.min(glyph.top);
                word.bottom = word.bottom.max(glyph.bottom);
                return;
            }
        }
        self.flush();
        self.current = Some(glyph);
    }

    fn flush(&mut self) {
        if let Some(word) = self.current.take() {
            self.words.push(word);
        }
    }

    fn finish(mut self) -> Vec<TextSpan> {
        self.flush();
        self.words
    }
}

fn load<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, BookworksError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| corrupt(path, e))
}

fn corrupt(path: &Path, e: PdfiumError) -> BookworksError {
    BookworksError::CorruptPdf {
        path: path.to_path_buf(),
        detail: format!("{:?}", e),
    }
}

/// Fail early with a readable error instead of a pdfium load failure.
pub fn check_pdf_magic(path: &Path) -> Result<(), BookworksError> {
    let mut file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => BookworksError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => BookworksError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(BookworksError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// Report date encoded in a file name such as `cpi_12132022.pdf`.
pub fn report_date_from_path(
    path: &Path,
    prefix: &str,
    date_format: &str,
) -> Result<NaiveDate, BookworksError> {
    let invalid = |reason: String| BookworksError::InvalidReportName {
        path: path.to_path_buf(),
        reason,
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid("file name is not valid UTF-8".into()))?;
    let date_part = stem
        .strip_prefix(prefix)
        .ok_or_else(|| invalid(format!("expected prefix '{prefix}'")))?;
    NaiveDate::parse_from_str(date_part, date_format)
        .map_err(|e| invalid(format!("'{date_part}' does not match {date_format}: {e}")))
}
