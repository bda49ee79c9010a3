//! Line chart rendering: series points → standalone SVG.
//!
//! One polyline per category, a legend, tick labels on both axes and the
//! axis titles. Output is plain SVG 1.1 text; nothing is rasterised.

use crate::error::BookworksError;
use crate::pipeline::series::SeriesPoint;
use std::fmt::Write as _;
use std::path::Path;

/// Line colours, cycled per category.
const PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
];

/// Size and text of the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOptions {
    pub width: f64,
    pub height: f64,
    pub title: Option<String>,
    pub x_label: String,
    pub y_label: String,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 500.0,
            title: None,
            x_label: "Date".to_string(),
            y_label: "Unadjusted Index".to_string(),
        }
    }
}

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 140.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 55.0;

/// Maps data coordinates into the plot rectangle.
struct Scale {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
}

impl Scale {
    fn x(&self, v: f64) -> f64 {
        self.left + (v - self.x_min) / (self.x_max - self.x_min) * (self.right - self.left)
    }

    fn y(&self, v: f64) -> f64 {
        self.bottom - (v - self.y_min) / (self.y_max - self.y_min) * (self.bottom - self.top)
    }
}

/// Expand a degenerate range so the scale never divides by zero.
fn padded(min: f64, max: f64) -> (f64, f64) {
    if (max - min).abs() < f64::EPSILON {
        (min - 1.0, max + 1.0)
    } else {
        (min, max)
    }
}

/// Roughly `count` round tick values covering `[min, max]`.
fn ticks(min: f64, max: f64, count: usize) -> Vec<f64> {
    let raw = (max - min) / count.max(1) as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 2.5, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw)
        .unwrap_or(raw);
    let mut out = Vec::new();
    let mut t = (min / step).ceil() * step;
    while t <= max + step * 1e-9 {
        out.push(t);
        t += step;
    }
    out
}

fn tick_label(v: f64, step: f64) -> String {
    if step >= 1.0 {
        format!("{v:.0}")
    } else if step >= 0.1 {
        format!("{v:.1}")
    } else {
        format!("{v:.2}")
    }
}

fn escape(s: &str) -> String {
    html_escape::encode_text(s).into_owned()
}

fn escape_attr(s: &str) -> String {
    html_escape::encode_double_quoted_attribute(s).into_owned()
}

/// Render the chart. Categories appear in the legend in first-seen order.
pub fn render_svg(points: &[SeriesPoint], options: &ChartOptions) -> String {
    let mut categories: Vec<&str> = Vec::new();
    for p in points {
        if !categories.contains(&p.category.as_str()) {
            categories.push(&p.category);
        }
    }

    let (x_min, x_max) = padded(
        points.iter().map(|p| p.date).fold(f64::INFINITY, f64::min),
        points.iter().map(|p| p.date).fold(f64::NEG_INFINITY, f64::max),
    );
    let (y_min, y_max) = padded(
        points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min),
        points.iter().map(|p| p.value).fold(f64::NEG_INFINITY, f64::max),
    );
    let scale = Scale {
        x_min,
        x_max,
        y_min,
        y_max,
        left: MARGIN_LEFT,
        right: options.width - MARGIN_RIGHT,
        top: MARGIN_TOP,
        bottom: options.height - MARGIN_BOTTOM,
    };

    let mut svg = String::new();
    let _ = writeln!(svg, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" version="1.1" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="12">"#,
        w = options.width,
        h = options.height
    );
    let _ = writeln!(
        svg,
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        options.width, options.height
    );

    if let Some(ref title) = options.title {
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="22" text-anchor="middle" font-size="15">{}</text>"#,
            options.width / 2.0,
            escape(title)
        );
    }

    if points.is_empty() {
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">No data</text>"#,
            options.width / 2.0,
            options.height / 2.0
        );
        svg.push_str("</svg>\n");
        return svg;
    }

    // axes
    let _ = writeln!(
        svg,
        r#"<path d="M{l} {t} L{l} {b} L{r} {b}" fill="none" stroke="black"/>"#,
        l = scale.left,
        t = scale.top,
        b = scale.bottom,
        r = scale.right
    );

    let x_ticks = ticks(x_min, x_max, 6);
    let x_step = x_ticks.get(1).zip(x_ticks.first()).map(|(b, a)| b - a).unwrap_or(1.0);
    for t in &x_ticks {
        let x = scale.x(*t);
        let _ = writeln!(
            svg,
            r#"<line x1="{x:.2}" y1="{b}" x2="{x:.2}" y2="{b5}" stroke="black"/><text x="{x:.2}" y="{ty}" text-anchor="middle">{label}</text>"#,
            b = scale.bottom,
            b5 = scale.bottom + 5.0,
            ty = scale.bottom + 18.0,
            label = tick_label(*t, x_step)
        );
    }
    let y_ticks = ticks(y_min, y_max, 6);
    let y_step = y_ticks.get(1).zip(y_ticks.first()).map(|(b, a)| b - a).unwrap_or(1.0);
    for t in &y_ticks {
        let y = scale.y(*t);
        let _ = writeln!(
            svg,
            r##"<line x1="{l5}" y1="{y:.2}" x2="{r}" y2="{y:.2}" stroke="#dddddd"/><text x="{tx}" y="{ty:.2}" text-anchor="end">{label}</text>"##,
            l5 = scale.left - 5.0,
            r = scale.right,
            tx = scale.left - 8.0,
            ty = y + 4.0,
            label = tick_label(*t, y_step)
        );
    }

    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle">{}</text>"#,
        (scale.left + scale.right) / 2.0,
        options.height - 12.0,
        escape(&options.x_label)
    );
    let _ = writeln!(
        svg,
        r#"<text x="18" y="{y}" text-anchor="middle" transform="rotate(-90 18 {y})">{}</text>"#,
        escape(&options.y_label),
        y = (scale.top + scale.bottom) / 2.0
    );

    for (i, category) in categories.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let d: Vec<String> = points
            .iter()
            .filter(|p| p.category == *category)
            .enumerate()
            .map(|(j, p)| {
                let op = if j == 0 { 'M' } else { 'L' };
                format!("{op}{:.2} {:.2}", scale.x(p.date), scale.y(p.value))
            })
            .collect();
        let _ = writeln!(
            svg,
            r#"<path class="series" data-category="{name}" d="{d}" fill="none" stroke="{color}" stroke-width="2"/>"#,
            name = escape_attr(category),
            d = d.join(" ")
        );

        let ly = scale.top + 10.0 + i as f64 * 18.0;
        let _ = writeln!(
            svg,
            r#"<line x1="{x1}" y1="{ly}" x2="{x2}" y2="{ly}" stroke="{color}" stroke-width="2"/><text x="{tx}" y="{ty}">{name}</text>"#,
            x1 = scale.right + 15.0,
            x2 = scale.right + 35.0,
            tx = scale.right + 40.0,
            ty = ly + 4.0,
            name = escape(category)
        );
    }

    svg.push_str("</svg>\n");
    svg
}

/// Render and write to `path`.
pub fn write_svg(
    points: &[SeriesPoint],
    options: &ChartOptions,
    path: &Path,
) -> Result<(), BookworksError> {
    std::fs::write(path, render_svg(points, options)).map_err(|e| {
        BookworksError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })
}
