//! Configuration for the two pipelines.
//!
//! [`NarrationConfig`] drives HTML → chunks → audio; [`CpiConfig`] drives
//! PDF reports → tidy dataset → chart. Both are plain structs with
//! documented defaults and a builder whose `build()` validates ranges, so a
//! caller sets only what differs from the book's usual layout.
//!
//! Credentials are a field like any other. The library never reads the
//! process environment for them; the CLI does that once at startup.

use crate::error::BookworksError;
use crate::pipeline::grid::PageArea;
use crate::pipeline::header::{CpiTable1Header, HeaderReconstructor};
use crate::pipeline::pdf::{PdfiumTableReader, TableReader};
use crate::pipeline::segment::{SegmentOptions, DEFAULT_MAX_CHUNK_CHARS};
use crate::pipeline::speech::{SpeechSynthesizer, DEFAULT_API_BASE_URL};
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Id of the element that holds the chapter body in Quarto output.
pub const DEFAULT_CONTAINER_ID: &str = "quarto-document-content";

// ── Narration ────────────────────────────────────────────────────────────

/// Configuration for narrating a rendered chapter.
///
/// # Example
/// ```rust
/// use bookworks::NarrationConfig;
///
/// let config = NarrationConfig::builder()
///     .voice("alloy")
///     .output_dir("audio/part-tools")
///     .api_key("sk-...")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_chunk_chars, 4096);
/// ```
#[derive(Clone)]
pub struct NarrationConfig {
    /// Id of the element holding the chapter body. Default: `quarto-document-content`.
    pub container_id: String,

    /// Target maximum chunk length in characters. Default: 4096.
    ///
    /// OpenAI's speech endpoint rejects longer inputs. An element with
    /// nothing left to split on may still exceed it.
    pub max_chunk_chars: usize,

    /// Narrate headings and paragraphs that sit beside `<section>` elements.
    /// Default: true. When false a container without sections is silent.
    pub keep_loose_text: bool,

    /// Directory audio files are written to. Default: `audio`.
    pub output_dir: PathBuf,

    /// File name prefix; `<prefix>-NN.<format>`. If None, the input file stem.
    pub file_prefix: Option<String>,

    /// Speech model. Default: `tts-1`.
    pub model: String,

    /// Voice name. Default: `shimmer`.
    pub voice: String,

    /// Audio encoding requested from the API, also used as file extension.
    /// Default: `mp3`.
    pub response_format: String,

    /// API key for the speech provider. Required unless `synthesizer` is set.
    pub api_key: Option<String>,

    /// API root. Default: `https://api.openai.com/v1`.
    pub api_base_url: String,

    /// Pre-constructed synthesizer. Takes precedence over `api_key`.
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,

    /// Retries per chunk on a transient API failure. Default: 0.
    ///
    /// With the default the first failure aborts the run. Authentication
    /// errors are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Upper bound on any single retry delay, including one requested by a
    /// `Retry-After` header. Default: 60000.
    pub max_backoff_ms: u64,

    /// Per-request timeout for the speech API in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-chunk progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            keep_loose_text: true,
            output_dir: PathBuf::from("audio"),
            file_prefix: None,
            model: "tts-1".to_string(),
            voice: "shimmer".to_string(),
            response_format: "mp3".to_string(),
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            synthesizer: None,
            max_retries: 0,
            retry_backoff_ms: 500,
            max_backoff_ms: 60_000,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for NarrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrationConfig")
            .field("container_id", &self.container_id)
            .field("max_chunk_chars", &self.max_chunk_chars)
            .field("keep_loose_text", &self.keep_loose_text)
            .field("output_dir", &self.output_dir)
            .field("file_prefix", &self.file_prefix)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("response_format", &self.response_format)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field(
                "synthesizer",
                &self.synthesizer.as_ref().map(|s| s.name().to_string()),
            )
            .field("max_retries", &self.max_retries)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl NarrationConfig {
    pub fn builder() -> NarrationConfigBuilder {
        NarrationConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn segment_options(&self) -> SegmentOptions {
        SegmentOptions {
            max_chars: self.max_chunk_chars,
            keep_loose_text: self.keep_loose_text,
        }
    }
}

/// Builder for [`NarrationConfig`].
#[derive(Debug)]
pub struct NarrationConfigBuilder {
    config: NarrationConfig,
}

impl NarrationConfigBuilder {
    pub fn container_id(mut self, id: impl Into<String>) -> Self {
        self.config.container_id = id.into();
        self
    }

    pub fn max_chunk_chars(mut self, n: usize) -> Self {
        self.config.max_chunk_chars = n;
        self
    }

    pub fn keep_loose_text(mut self, v: bool) -> Self {
        self.config.keep_loose_text = v;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = Some(prefix.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.config.voice = voice.into();
        self
    }

    pub fn response_format(mut self, format: impl Into<String>) -> Self {
        self.config.response_format = format.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.config.synthesizer = Some(synthesizer);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// A missing API key is *not* an error here: `segment` never needs
    /// one, and `narrate` reports it before the first request.
    pub fn build(self) -> Result<NarrationConfig, BookworksError> {
        let c = &self.config;
        if c.max_chunk_chars == 0 {
            return Err(BookworksError::InvalidConfig(
                "max_chunk_chars must be ≥ 1".into(),
            ));
        }
        if c.container_id.trim().is_empty() {
            return Err(BookworksError::InvalidConfig(
                "container_id must not be empty".into(),
            ));
        }
        if c.response_format.is_empty()
            || !c.response_format.chars().all(|ch| ch.is_ascii_alphanumeric())
        {
            return Err(BookworksError::InvalidConfig(format!(
                "response_format must be a plain extension like 'mp3', got '{}'",
                c.response_format
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(BookworksError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── CPI tables ───────────────────────────────────────────────────────────

/// Categories plotted by default, as printed in the report.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Energy",
    "Food",
    "Shelter",
    "Medical care services",
    "commodities",
    "Transportation services",
];

/// Short legend names for the default categories.
pub const DEFAULT_CATEGORY_RENAMES: &[(&str, &str)] = &[
    ("Medical care services", "Medical"),
    ("commodities", "Goods"),
    ("Transportation services", "Transit"),
];

/// Which page of a report holds the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TablePage {
    /// First page whose text contains `table_marker` (default).
    #[default]
    Auto,
    /// A fixed page, 1-indexed, for every report.
    Fixed(usize),
}

/// Configuration for normalising CPI reports.
#[derive(Clone)]
pub struct CpiConfig {
    /// Text identifying the table page when [`TablePage::Auto`]. Default: `Table 1`.
    pub table_marker: String,

    /// Page selection. Default: auto-detect.
    pub page: TablePage,

    /// Region holding the multi-row column header. Default: `[89, 35, 128, 575]`.
    pub header_area: PageArea,

    /// Region holding the table body. Default: `[128, 35, 586, 575]`.
    pub body_area: PageArea,

    /// File-name prefix before the `MMDDYYYY` report date. Default: `cpi_`.
    pub file_prefix: String,

    /// chrono format of the date part of the file name. Default: `%m%d%Y`.
    pub date_format: String,

    /// Categories kept for the chart.
    pub categories: Vec<String>,

    /// Legend renames applied after filtering.
    pub category_renames: Vec<(String, String)>,

    /// Variable plotted on the y axis. Default: `Unadj_idx`.
    pub plot_variable: String,

    /// Explicit path to libpdfium; falls back to the system library.
    pub pdfium_library: Option<PathBuf>,

    /// Pre-constructed reader. Takes precedence over `pdfium_library`.
    pub table_reader: Option<Arc<dyn TableReader>>,

    /// Header layout. Default: [`CpiTable1Header`].
    pub header: Arc<dyn HeaderReconstructor>,
}

impl Default for CpiConfig {
    fn default() -> Self {
        Self {
            table_marker: "Table 1".to_string(),
            page: TablePage::Auto,
            header_area: PageArea::new(89.0, 35.0, 128.0, 575.0),
            body_area: PageArea::new(128.0, 35.0, 586.0, 575.0),
            file_prefix: "cpi_".to_string(),
            date_format: "%m%d%Y".to_string(),
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            category_renames: DEFAULT_CATEGORY_RENAMES
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            plot_variable: "Unadj_idx".to_string(),
            pdfium_library: None,
            table_reader: None,
            header: Arc::new(CpiTable1Header),
        }
    }
}

impl fmt::Debug for CpiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpiConfig")
            .field("table_marker", &self.table_marker)
            .field("page", &self.page)
            .field("header_area", &self.header_area)
            .field("body_area", &self.body_area)
            .field("file_prefix", &self.file_prefix)
            .field("date_format", &self.date_format)
            .field("categories", &self.categories)
            .field("plot_variable", &self.plot_variable)
            .field("pdfium_library", &self.pdfium_library)
            .field(
                "table_reader",
                &self.table_reader.as_ref().map(|_| "<dyn TableReader>"),
            )
            .field("header", &self.header.name())
            .finish()
    }
}

impl CpiConfig {
    pub fn builder() -> CpiConfigBuilder {
        CpiConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured reader, or a pdfium-backed one.
    pub fn reader(&self) -> Arc<dyn TableReader> {
        match self.table_reader {
            Some(ref r) => Arc::clone(r),
            None => Arc::new(PdfiumTableReader::new(self.pdfium_library.clone())),
        }
    }
}

/// Builder for [`CpiConfig`].
#[derive(Debug)]
pub struct CpiConfigBuilder {
    config: CpiConfig,
}

impl CpiConfigBuilder {
    pub fn table_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.table_marker = marker.into();
        self
    }

    pub fn page(mut self, page: TablePage) -> Self {
        self.config.page = page;
        self
    }

    pub fn header_area(mut self, area: PageArea) -> Self {
        self.config.header_area = area;
        self
    }

    pub fn body_area(mut self, area: PageArea) -> Self {
        self.config.body_area = area;
        self
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.config.date_format = format.into();
        self
    }

    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn rename_category(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.config.category_renames.push((from.into(), to.into()));
        self
    }

    pub fn plot_variable(mut self, variable: impl Into<String>) -> Self {
        self.config.plot_variable = variable.into();
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn table_reader(mut self, reader: Arc<dyn TableReader>) -> Self {
        self.config.table_reader = Some(reader);
        self
    }

    pub fn header(mut self, header: Arc<dyn HeaderReconstructor>) -> Self {
        self.config.header = header;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CpiConfig, BookworksError> {
        let c = &self.config;
        if let TablePage::Fixed(0) = c.page {
            return Err(BookworksError::InvalidConfig(
                "pages are 1-indexed, minimum is 1".into(),
            ));
        }
        for (name, area) in [("header", &c.header_area), ("body", &c.body_area)] {
            if !area.is_valid() {
                return Err(BookworksError::InvalidConfig(format!(
                    "{name} area must have top < bottom and left < right, got {area:?}"
                )));
            }
        }
        if c.table_marker.is_empty() && c.page == TablePage::Auto {
            return Err(BookworksError::InvalidConfig(
                "table_marker must not be empty when the page is auto-detected".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narration_defaults() {
        let c = NarrationConfig::default();
        assert_eq!(c.container_id, "quarto-document-content");
        assert_eq!(c.max_chunk_chars, 4096);
        assert_eq!(c.model, "tts-1");
        assert_eq!(c.voice, "shimmer");
        assert_eq!(c.response_format, "mp3");
        assert_eq!(c.max_retries, 0);
        assert!(c.api_key.is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = NarrationConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn narration_builder_validates() {
        assert!(NarrationConfig::builder().max_chunk_chars(0).build().is_err());
        assert!(NarrationConfig::builder().container_id(" ").build().is_err());
        assert!(NarrationConfig::builder()
            .response_format("../mp3")
            .build()
            .is_err());
        assert!(NarrationConfig::builder()
            .response_format("opus")
            .build()
            .is_ok());
    }

    #[test]
    fn cpi_defaults_match_report_layout() {
        let c = CpiConfig::default();
        assert_eq!(c.header_area, PageArea::new(89.0, 35.0, 128.0, 575.0));
        assert_eq!(c.body_area, PageArea::new(128.0, 35.0, 586.0, 575.0));
        assert_eq!(c.categories.len(), 6);
        assert_eq!(c.page, TablePage::Auto);
    }

    #[test]
    fn cpi_builder_validates() {
        assert!(CpiConfig::builder().page(TablePage::Fixed(0)).build().is_err());
        assert!(CpiConfig::builder()
            .body_area(PageArea::new(500.0, 35.0, 100.0, 575.0))
            .build()
            .is_err());
        let c = CpiConfig::builder()
            .page(TablePage::Fixed(9))
            .categories(["Food"])
            .build()
            .unwrap();
        assert_eq!(c.categories, vec!["Food".to_string()]);
    }
}
