//! Integration tests for both pipelines.
//!
//! Narration runs against a wiremock speech endpoint; the CPI pipeline runs
//! against an in-memory `TableReader` that lays out a Table 1 page the way
//! pdfium reports it. Neither needs network access or libpdfium.
//!
//! `cpi_real_reports` reads actual BLS PDFs from `./test_cases/cpi/` and is
//! gated behind `E2E_ENABLED`:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=./libpdfium.so cargo test --test pipeline -- --nocapture

use bookworks::pipeline::chart::{render_svg, ChartOptions};
use bookworks::pipeline::grid::TextSpan;
use bookworks::pipeline::pdf::TableReader;
use bookworks::{
    narrate, normalize_reports, segment_file, BookworksError, CpiConfig, NarrationConfig,
    TablePage,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Narration ────────────────────────────────────────────────────────────────

const CHAPTER: &str = r#"<!DOCTYPE html>
<html>
<head><title>Scripts and notebooks</title></head>
<body>
<nav id="quarto-sidebar"><a href="index.html">Home</a></nav>
<main id="quarto-document-content">
<header><h1>Scripts and notebooks</h1></header>
<section id="scripts"><h2>Scripts</h2>
<p>A script runs from top to bottom.</p>
<div class="callout callout-note"><pre><code>python analysis.py</code></pre></div>
</section>
<section id="notebooks"><h2>Notebooks</h2>
<p>Notebooks mix prose &amp; code.</p>
</section>
<div id="refs"><p>Knuth, D. (1984). Literate programming.</p></div>
</main>
</body>
</html>
"#;

fn write_chapter(dir: &Path) -> PathBuf {
    let p = dir.join("04-scripts-notebooks.html");
    std::fs::write(&p, CHAPTER).unwrap();
    p
}

#[tokio::test]
async fn segment_needs_no_key() {
    let dir = tempfile::tempdir().unwrap();
    let chapter = write_chapter(dir.path());
    let config = NarrationConfig::builder().build().unwrap();

    let out = segment_file(chapter.to_string_lossy(), &config).await.unwrap();
    assert_eq!(out.chunks.len(), 4);
    assert_eq!(out.chunks[0], "Scripts and notebooks");
    assert!(out.chunks[1].starts_with("Scripts A script runs from top to bottom."));
    assert!(out.chunks[1].contains("Please see the online version of the book for code examples."));
    assert!(!out.chunks[1].contains("analysis.py"));
    assert_eq!(out.chunks[2], "Notebooks Notebooks mix prose & code.");
    assert_eq!(
        out.chunks[3],
        "Please see the online version of the book for the reference list."
    );
    assert_eq!(out.replaced_subtrees, 2);
    assert_eq!(out.oversized(), 0);
    assert!(out.chunks.iter().all(|c| !c.contains("Home")));
}

#[tokio::test]
async fn narrate_against_mock_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "tts-1",
            "voice": "shimmer",
            "response_format": "mp3",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3fake-audio".to_vec()))
        .expect(4)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let chapter = write_chapter(dir.path());
    let out_dir = dir.path().join("audio/part-tools");
    let config = NarrationConfig::builder()
        .api_key("sk-test")
        .api_base_url(format!("{}/v1", server.uri()))
        .output_dir(&out_dir)
        .build()
        .unwrap();

    let output = narrate(chapter.to_string_lossy(), &config).await.unwrap();
    assert_eq!(output.stats.total_chunks, 4);
    assert_eq!(output.stats.total_audio_bytes, 4 * 13);
    assert_eq!(output.stats.replaced_subtrees, 2);

    let names: Vec<String> = output
        .chunks
        .iter()
        .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "04-scripts-notebooks-00.mp3",
            "04-scripts-notebooks-01.mp3",
            "04-scripts-notebooks-02.mp3",
            "04-scripts-notebooks-03.mp3",
        ]
    );
    for chunk in &output.chunks {
        assert_eq!(std::fs::read(&chunk.path).unwrap(), b"ID3fake-audio");
        assert_eq!(chunk.retries, 0);
    }
    assert!(!out_dir.join("04-scripts-notebooks-00.mp3.tmp").exists());

    // Requests arrive in chunk order with the segmented text as input.
    let requests = server.received_requests().await.unwrap();
    let inputs: Vec<String> = requests
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["input"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(inputs[0], "Scripts and notebooks");
    assert_eq!(
        inputs[3],
        "Please see the online version of the book for the reference list."
    );
}

#[tokio::test]
async fn narrate_stops_at_first_failed_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"{"error":{"message":"input too long"}}"#),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let chapter = write_chapter(dir.path());
    let config = NarrationConfig::builder()
        .api_key("sk-test")
        .api_base_url(format!("{}/v1", server.uri()))
        .output_dir(dir.path().join("audio"))
        .max_retries(3)
        .build()
        .unwrap();

    let err = narrate(chapter.to_string_lossy(), &config)
        .await
        .unwrap_err();
    match err {
        BookworksError::SpeechApiError { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "input too long");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(dir.path().join("audio/04-scripts-notebooks-00.mp3").exists());
    assert!(!dir.path().join("audio/04-scripts-notebooks-01.mp3").exists());
    // 4xx other than 429 is permanent: one request for the failing chunk.
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn narrate_without_key_sends_nothing() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let chapter = write_chapter(dir.path());
    let config = NarrationConfig::builder()
        .api_base_url(format!("{}/v1", server.uri()))
        .output_dir(dir.path().join("audio"))
        .build()
        .unwrap();

    let err = narrate(chapter.to_string_lossy(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, BookworksError::MissingCredential { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(!dir.path().join("audio").exists());
}

// ── CPI ──────────────────────────────────────────────────────────────────────

/// Serves a fixed Table 1 page for every report, shifting the numbers by
/// report so concatenation is observable.
struct FakeTable1 {
    page: usize,
    find_calls: AtomicUsize,
}

const COL0_LEFT: f32 = 40.0;
const COL_LEFT: f32 = 160.0;
const COL_STEP: f32 = 42.0;
const COL_WIDTH: f32 = 28.0;

fn cell(text: &str, col: usize, top: f32) -> TextSpan {
    if col == 0 {
        TextSpan::new(text, COL0_LEFT, top, COL0_LEFT + 100.0, top + 8.0)
    } else {
        let left = COL_LEFT + (col - 1) as f32 * COL_STEP;
        TextSpan::new(text, left, top, left + COL_WIDTH, top + 8.0)
    }
}

fn header_spans() -> Vec<TextSpan> {
    let rows: [[&str; 10]; 4] = [
        ["Expenditure category", "", "", "", "", "Dec.", "Nov.", "Sep.", "Oct.", "Nov."],
        ["", "Nov.", "Dec.", "Nov.", "Dec.", "2021-", "2022-", "2022-", "2022-", "2022-"],
        ["", "2022", "2021", "2022", "2022", "Dec.", "Dec.", "Oct.", "Nov.", "Dec."],
        ["", "", "", "", "", "2022", "2022", "2022", "2022", "2022"],
    ];
    let mut spans = Vec::new();
    for (r, row) in rows.iter().enumerate() {
        let top = 92.0 + r as f32 * 9.0;
        for (c, text) in row.iter().enumerate() {
            if !text.is_empty() {
                spans.push(cell(text, c, top));
            }
        }
    }
    spans
}

fn body_spans(shift: f64) -> Vec<TextSpan> {
    let rows: [(&str, [f64; 9]); 3] = [
        ("All items ........", [100.0, 292.3, 296.8, 296.9, 6.5, -0.1, 0.4, 0.4, 0.1]),
        ("Food .........", [13.5, 284.6, 302.3, 304.2, 10.4, 0.6, 0.7, 0.6, 0.5]),
        ("Energy ......", [7.3, 255.7, 291.7, 283.7, 7.3, -4.5, -2.1, 1.8, -1.6]),
    ];
    let mut spans = Vec::new();
    for (r, (category, values)) in rows.iter().enumerate() {
        let top = 140.0 + r as f32 * 12.0;
        spans.push(cell(category, 0, top));
        for (c, v) in values.iter().enumerate() {
            spans.push(cell(&format!("{:.3}", v + shift), c + 1, top));
        }
    }
    // Footnote below the table body.
    spans.push(TextSpan::new("See footnotes at end of table.", 40.0, 600.0, 200.0, 608.0));
    spans
}

impl TableReader for FakeTable1 {
    fn find_page(&self, _path: &Path, marker: &str) -> Result<usize, BookworksError> {
        assert_eq!(marker, "Table 1");
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.page)
    }

    fn read_spans(&self, path: &Path, page: usize) -> Result<Vec<TextSpan>, BookworksError> {
        assert_eq!(page, self.page);
        let shift = if path.to_string_lossy().contains("cpi_02") {
            1.0
        } else {
            0.0
        };
        let mut spans = header_spans();
        spans.extend(body_spans(shift));
        Ok(spans)
    }
}

fn report_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in ["cpi_02142023.pdf", "cpi_01122023.pdf"] {
        std::fs::write(dir.path().join(name), b"%PDF-1.7").unwrap();
    }
    dir
}

#[tokio::test]
async fn cpi_pipeline_with_fake_reader() {
    let dir = report_dir();
    let reader = Arc::new(FakeTable1 {
        page: 3,
        find_calls: AtomicUsize::new(0),
    });
    let config = CpiConfig::builder()
        .table_reader(reader.clone())
        .build()
        .unwrap();

    let output = normalize_reports(&[dir.path()], &config).await.unwrap();
    assert_eq!(reader.find_calls.load(Ordering::SeqCst), 2);

    // Reports in file-name order, each with the reconstructed header.
    assert_eq!(output.reports.len(), 2);
    assert_eq!(output.reports[0].report_date.to_string(), "2023-01-12");
    assert_eq!(output.reports[1].report_date.to_string(), "2023-02-14");
    assert_eq!(output.reports[0].page, 3);
    assert_eq!(output.reports[0].body_rows, 3);
    assert_eq!(output.reports[0].labels[0], "Expenditure_category");
    assert_eq!(output.reports[0].labels[4], "Unadj_idx.Dec2022");
    assert_eq!(output.reports[0].labels[9], "Seas_adj_pct_chg.Nov2022_Dec2022");

    // 3 categories × 7 value dates per report.
    let ds = &output.dataset;
    assert_eq!(output.reports[0].tidy_rows, 21);
    assert_eq!(ds.len(), 42);
    assert_eq!(
        ds.variables,
        vec!["Rel_imp", "Unadj_idx", "Unadj_pct_chg", "Seas_adj_pct_chg"]
    );
    let food_dec = ds
        .rows
        .iter()
        .find(|r| {
            r.report_date.to_string() == "2023-01-12"
                && r.category == "Food"
                && r.value_date == "Dec2022"
        })
        .expect("Food / Dec2022 row");
    assert_eq!(food_dec.get("Unadj_idx"), Some(304.2));
    assert_eq!(food_dec.get("Rel_imp"), None);
    assert!(ds.rows.iter().all(|r| !r.category.ends_with('.')));

    // Energy and Food only (All items is not a plotted category); three
    // monthly index values per report, interval dates dropped.
    let categories: Vec<&str> = output
        .series
        .iter()
        .map(|p| p.category.as_str())
        .collect();
    assert_eq!(categories.iter().filter(|c| **c == "Energy").count(), 6);
    assert_eq!(categories.iter().filter(|c| **c == "Food").count(), 6);
    assert_eq!(output.series.len(), 12);
    assert!(output.series.windows(2).all(|w| {
        w[0].category < w[1].category || (w[0].category == w[1].category && w[0].date <= w[1].date)
    }));

    let svg = render_svg(&output.series, &ChartOptions::default());
    assert_eq!(svg.matches(r#"class="series""#).count(), 2);

    let mut csv = Vec::new();
    ds.write_csv(&mut csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert!(csv.starts_with(
        "report_date,category,value_date,Rel_imp,Unadj_idx,Unadj_pct_chg,Seas_adj_pct_chg\n"
    ));
    assert_eq!(csv.lines().count(), 43);
}

#[tokio::test]
async fn cpi_fixed_page_skips_search() {
    let dir = report_dir();
    let reader = Arc::new(FakeTable1 {
        page: 2,
        find_calls: AtomicUsize::new(0),
    });
    let config = CpiConfig::builder()
        .page(TablePage::Fixed(2))
        .table_reader(reader.clone())
        .build()
        .unwrap();

    let output = normalize_reports(&[dir.path().join("cpi_01122023.pdf")], &config)
        .await
        .unwrap();
    assert_eq!(reader.find_calls.load(Ordering::SeqCst), 0);
    assert_eq!(output.reports.len(), 1);
    assert_eq!(output.dataset.len(), 21);
}

#[tokio::test]
async fn cpi_rejects_badly_named_report() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("cpi_latest.pdf");
    std::fs::write(&bad, b"%PDF-1.7").unwrap();
    let config = CpiConfig::builder()
        .table_reader(Arc::new(FakeTable1 {
            page: 1,
            find_calls: AtomicUsize::new(0),
        }))
        .build()
        .unwrap();

    let err = normalize_reports(&[bad], &config).await.unwrap_err();
    assert!(matches!(err, BookworksError::InvalidReportName { .. }));
}

// ── Real reports (opt-in) ────────────────────────────────────────────────────

#[tokio::test]
async fn cpi_real_reports() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/cpi");
    if !dir.exists() {
        println!("SKIP — no reports in {}", dir.display());
        return;
    }

    let mut builder = CpiConfig::builder();
    if let Ok(lib) = std::env::var("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_library(lib);
    }
    let output = normalize_reports(&[dir], &builder.build().unwrap())
        .await
        .unwrap();
    for r in &output.reports {
        println!("{} page {} rows {}", r.path.display(), r.page, r.body_rows);
        assert_eq!(r.labels.len(), 10);
        assert!(r.body_rows > 0);
    }
    assert!(!output.series.is_empty());
}
