//! Error type for the bookworks library.
//!
//! Both pipelines are strictly sequential and stop at the first failure, so
//! a single fatal error type is enough: every public entry point returns
//! `Result<_, BookworksError>`. The variants are grouped by the stage that
//! raises them and carry enough context (paths, chunk numbers, labels) for
//! the message to say what to fix.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the bookworks library.
#[derive(Debug, Error)]
pub enum BookworksError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── HTML errors ───────────────────────────────────────────────────────
    /// The markup could not be parsed into a document tree.
    #[error("Failed to parse HTML from '{source_name}': {detail}")]
    HtmlParse { source_name: String, detail: String },

    /// The element holding the chapter body is missing.
    #[error("No element with id '{id}' in the document\nIs this a rendered book chapter? Override with --container-id.")]
    ContainerNotFound { id: String },

    // ── Speech errors ─────────────────────────────────────────────────────
    /// No API key was configured for the speech provider.
    #[error("Missing credential: set {variable} or pass --api-key")]
    MissingCredential { variable: String },

    /// The speech API rejected the credentials (401/403); retrying will not help.
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// Speech API returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// A speech request took longer than the configured timeout.
    #[error("Speech API call timed out after {elapsed_ms}ms on chunk {chunk}")]
    ApiTimeout { chunk: usize, elapsed_ms: u64 },

    /// Speech API returned a non-success status other than 401/403/429.
    #[error("Speech API error (HTTP {status}): {message}")]
    SpeechApiError { status: u16, message: String },

    /// A chunk could not be synthesised; the remaining chunks were not attempted.
    #[error("Chunk {chunk} failed after {retries} retries: {detail}")]
    ChunkFailed {
        chunk: usize,
        retries: u32,
        detail: String,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// pdfium could not open the document.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium for your platform, or point PDFIUM_LIB_PATH at an existing\n\
libpdfium (e.g. PDFIUM_LIB_PATH=/opt/pdfium/lib/libpdfium.so).\n"
    )]
    PdfiumBindingFailed(String),

    /// No page of the report contains the table marker text.
    #[error("No page of '{path}' contains '{marker}'\nPass --page to select the table page explicitly.")]
    TableNotFound { path: PathBuf, marker: String },

    /// The requested page does not exist.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// A report file name does not encode its release date.
    #[error("Cannot read a report date from '{path}': {reason}")]
    InvalidReportName { path: PathBuf, reason: String },

    // ── Table shape errors ────────────────────────────────────────────────
    /// The header region does not have the layout the reconstructor expects.
    #[error("Malformed table header: {0}")]
    MalformedHeader(String),

    /// Two parts of a table disagree on their dimensions.
    #[error("Shape mismatch in {context}: expected {expected} columns, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// A compound `variable.value_date` label did not split into two tokens.
    #[error("Malformed compound variable '{label}': expected 'variable.value_date', got {tokens} token(s)")]
    MalformedVariable { label: String, tokens: usize },

    /// Two cells map to the same (report, category, value date, variable) key.
    #[error("Duplicate entry for ({report_date}, '{category}', '{value_date}', '{variable}'); cannot pivot")]
    DuplicateKey {
        report_date: String,
        category: String,
        value_date: String,
        variable: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookworksError {
    /// Whether a failed speech request is worth retrying.
    ///
    /// Rate limits, timeouts and 5xx responses are transient. Credential
    /// problems and 4xx responses fail the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            BookworksError::RateLimitExceeded { .. } | BookworksError::ApiTimeout { .. } => true,
            // status 0: the request never got a response
            BookworksError::SpeechApiError { status, .. } => *status == 0 || *status >= 500,
            BookworksError::DownloadFailed { .. } => true,
            _ => false,
        }
    }
}
