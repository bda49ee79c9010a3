//! CLI binary for bookworks.
//!
//! A thin shim over the library crate that maps subcommand flags to
//! `NarrationConfig` / `CpiConfig` and prints results.

use anyhow::{Context, Result};
use bookworks::pipeline::chart::{write_svg, ChartOptions};
use bookworks::pipeline::grid::PageArea;
use bookworks::{
    narrate, normalize_reports, segment_file, CpiConfig, NarrationConfig,
    NarrationProgressCallback, ProgressCallback, TablePage,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per written file.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading chapter…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl NarrationProgressCallback for CliProgressCallback {
    fn on_narration_start(&self, total_chunks: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total_chunks as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Narrating");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Synthesising {total_chunks} chunks…"))
        ));
    }

    fn on_chunk_start(&self, index: usize, _total: usize, chars: usize) {
        self.bar.set_message(format!("chunk {index:02} ({chars} chars)"));
    }

    fn on_chunk_complete(&self, index: usize, total: usize, audio_bytes: usize) {
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{:>8} bytes", audio_bytes)),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, index: usize, total: usize, error: &str) {
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}",
            red("✗"),
            index + 1,
            total,
            red(error),
        ));
        self.bar.abandon();
    }

    fn on_narration_complete(&self, total_chunks: usize, audio_bytes: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} chunks, {} bytes of audio",
            green("✔"),
            total_chunks,
            audio_bytes
        );
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = "\
Examples:
  bookworks segment _book/part-tools/04-scripts-notebooks.html
  OPENAI_API_KEY=sk-... bookworks narrate _book/part-tools/04-scripts-notebooks.html -o audio/part-tools
  bookworks cpi data/bls-pdfs --csv cpi.csv --chart cpi.svg

Environment:
  OPENAI_API_KEY          API key for the speech endpoint (narrate only)
  PDFIUM_LIB_PATH         Path to libpdfium (cpi only); system library otherwise
  RUST_LOG                Overrides the log filter, e.g. bookworks=debug
";

#[derive(Parser, Debug)]
#[command(
    name = "bookworks",
    version,
    about = "Narrate rendered book chapters and normalise CPI report tables",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BOOKWORKS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BOOKWORKS_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synthesise one audio file per chunk of a rendered chapter.
    Narrate(NarrateArgs),
    /// Print the chunks a chapter would be narrated in (no API calls).
    Segment(SegmentArgs),
    /// Extract, reshape and chart Table 1 from CPI report PDFs.
    Cpi(CpiArgs),
}

#[derive(Args, Debug)]
struct ChunkingArgs {
    /// Id of the element holding the chapter body.
    #[arg(long, env = "BOOKWORKS_CONTAINER_ID", default_value = "quarto-document-content")]
    container_id: String,

    /// Target maximum chunk length in characters.
    #[arg(long, env = "BOOKWORKS_MAX_CHARS", default_value_t = 4096)]
    max_chars: usize,

    /// Narrate only <section> content, dropping headings and text beside it.
    #[arg(long, env = "BOOKWORKS_SECTIONS_ONLY")]
    sections_only: bool,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "BOOKWORKS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct NarrateArgs {
    /// Rendered chapter: local HTML file or HTTP/HTTPS URL.
    input: String,

    /// Directory audio files are written to.
    #[arg(short = 'o', long, env = "BOOKWORKS_OUT_DIR", default_value = "audio")]
    out_dir: PathBuf,

    /// File name prefix; defaults to the input file stem.
    #[arg(long, env = "BOOKWORKS_PREFIX")]
    prefix: Option<String>,

    /// Speech model.
    #[arg(long, env = "BOOKWORKS_TTS_MODEL", default_value = "tts-1")]
    model: String,

    /// Voice name.
    #[arg(long, env = "BOOKWORKS_VOICE", default_value = "shimmer")]
    voice: String,

    /// Audio format, also used as file extension (mp3, opus, aac, flac, wav).
    #[arg(long, env = "BOOKWORKS_FORMAT", default_value = "mp3")]
    format: String,

    /// API key for the speech endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Root of an OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    api_base_url: String,

    /// Retries per chunk on rate limits, timeouts and 5xx responses.
    #[arg(long, env = "BOOKWORKS_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-request speech API timeout in seconds.
    #[arg(long, env = "BOOKWORKS_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    #[command(flatten)]
    chunking: ChunkingArgs,

    /// Print the run summary as JSON.
    #[arg(long, env = "BOOKWORKS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "BOOKWORKS_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct SegmentArgs {
    /// Rendered chapter: local HTML file or HTTP/HTTPS URL.
    input: String,

    #[command(flatten)]
    chunking: ChunkingArgs,

    /// Print chunks as a JSON array.
    #[arg(long, env = "BOOKWORKS_JSON")]
    json: bool,
}

#[derive(Args, Debug)]
struct CpiArgs {
    /// Report PDFs named cpi_MMDDYYYY.pdf, or directories containing them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write the tidy dataset as CSV.
    #[arg(long, env = "BOOKWORKS_CPI_CSV")]
    csv: Option<PathBuf>,

    /// Write the line chart as SVG.
    #[arg(long, env = "BOOKWORKS_CPI_CHART")]
    chart: Option<PathBuf>,

    /// Table page: `auto` (first page containing the marker) or a 1-indexed number.
    #[arg(long, env = "BOOKWORKS_CPI_PAGE", default_value = "auto")]
    page: String,

    /// Text that identifies the table page.
    #[arg(long, env = "BOOKWORKS_CPI_MARKER", default_value = "Table 1")]
    marker: String,

    /// Header region as top,left,bottom,right in points.
    #[arg(long, env = "BOOKWORKS_CPI_HEADER_AREA", default_value = "89,35,128,575")]
    header_area: String,

    /// Body region as top,left,bottom,right in points.
    #[arg(long, env = "BOOKWORKS_CPI_BODY_AREA", default_value = "128,35,586,575")]
    body_area: String,

    /// Path to libpdfium.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Print the full output (reports, dataset, series) as JSON.
    #[arg(long, env = "BOOKWORKS_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs are silenced while the progress bar is drawn.
    let show_progress = match cli.command {
        Command::Narrate(ref a) => !cli.quiet && !a.no_progress && !a.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Narrate(args) => run_narrate(args, cli.quiet, show_progress).await,
        Command::Segment(args) => run_segment(args, cli.quiet).await,
        Command::Cpi(args) => run_cpi(args, cli.quiet).await,
    }
}

async fn run_narrate(args: NarrateArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn NarrationProgressCallback>)
    } else {
        None
    };

    let mut builder = chunking_builder(&args.chunking)
        .output_dir(&args.out_dir)
        .model(&args.model)
        .voice(&args.voice)
        .response_format(&args.format)
        .api_base_url(&args.api_base_url)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout);
    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref prefix) = args.prefix {
        builder = builder.file_prefix(prefix);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    let output = narrate(&args.input, &config)
        .await
        .context("Narration failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !quiet {
        for chunk in &output.chunks {
            println!("{}", chunk.path.display());
        }
        if !show_progress {
            eprintln!(
                "Narrated {} chunks ({} chars) in {}ms",
                output.stats.total_chunks,
                output.stats.total_chars,
                output.stats.total_duration_ms
            );
        }
        if output.stats.oversized_chunks > 0 {
            eprintln!(
                "{} {} chunk(s) exceed {} characters and may be rejected",
                cyan("⚠"),
                output.stats.oversized_chunks,
                config.max_chunk_chars
            );
        }
    }
    Ok(())
}

async fn run_segment(args: SegmentArgs, quiet: bool) -> Result<()> {
    let config = chunking_builder(&args.chunking)
        .build()
        .context("Invalid configuration")?;
    let output = segment_file(&args.input, &config)
        .await
        .context("Segmentation failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output.chunks).context("Failed to serialise chunks")?
        );
        return Ok(());
    }
    for (i, chunk) in output.chunks.iter().enumerate() {
        let n = chunk.chars().count();
        let len = if n > output.max_chars {
            red(&format!("{n} chars"))
        } else {
            dim(&format!("{n} chars"))
        };
        println!("{} {}", bold(&format!("[{i:02}]")), len);
        println!("{chunk}\n");
    }
    if !quiet {
        eprintln!(
            "{} chunks, {} subtrees replaced, {} oversized",
            output.chunks.len(),
            output.replaced_subtrees,
            output.oversized()
        );
    }
    Ok(())
}

async fn run_cpi(args: CpiArgs, quiet: bool) -> Result<()> {
    let mut builder = CpiConfig::builder()
        .page(parse_page(&args.page)?)
        .table_marker(&args.marker)
        .header_area(parse_area(&args.header_area).context("Invalid --header-area")?)
        .body_area(parse_area(&args.body_area).context("Invalid --body-area")?);
    if let Some(ref lib) = args.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    let config = builder.build().context("Invalid configuration")?;

    let output = normalize_reports(&args.inputs, &config)
        .await
        .context("CPI normalisation failed")?;

    if let Some(ref path) = args.csv {
        output
            .dataset
            .write_csv_file(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(ref path) = args.chart {
        write_svg(&output.series, &ChartOptions::default(), path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !quiet {
        for r in &output.reports {
            eprintln!(
                "  {} {}  {}  page {}  {} rows",
                green("✓"),
                r.path.display(),
                r.report_date,
                r.page,
                r.body_rows
            );
        }
        eprintln!(
            "{} {} reports → {} tidy rows, {} plot points",
            green("✔"),
            output.reports.len(),
            output.dataset.len(),
            output.series.len()
        );
    }
    Ok(())
}

fn chunking_builder(args: &ChunkingArgs) -> bookworks::NarrationConfigBuilder {
    NarrationConfig::builder()
        .container_id(&args.container_id)
        .max_chunk_chars(args.max_chars)
        .keep_loose_text(!args.sections_only)
        .download_timeout_secs(args.download_timeout)
}

/// Parse `--page`: `auto` or a 1-indexed page number.
fn parse_page(s: &str) -> Result<TablePage> {
    let s = s.trim().to_lowercase();
    if s == "auto" {
        return Ok(TablePage::Auto);
    }
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(TablePage::Fixed(page))
}

/// Parse `top,left,bottom,right`.
fn parse_area(s: &str) -> Result<PageArea> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<f32>()
                .with_context(|| format!("Invalid coordinate: '{}'", p.trim()))
        })
        .collect::<Result<Vec<_>>>()?;
    match parts.as_slice() {
        [top, left, bottom, right] => Ok(PageArea::new(*top, *left, *bottom, *right)),
        _ => anyhow::bail!("Expected 4 comma-separated values, got {}", parts.len()),
    }
}
