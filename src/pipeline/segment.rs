//! Segmentation: turn the cleaned chapter into speech-sized chunks.
//!
//! The speech API rejects inputs above a fixed size (4096 characters for
//! OpenAI `tts-1`), so the chapter has to be cut. Document structure gives
//! the natural cut points:
//!
//! 1. An element with `<section>` children is split along those sections.
//! 2. An element without sections becomes one chunk of its normalised text.
//! 3. If that chunk is too long, the element is split along *all* of its
//!    direct children instead, recursively.
//!
//! An element that is still too long and has nothing left to split on is
//! kept whole; the limit is a target, never a reason to truncate narration.
//!
//! Recursion yields a [`Segment`] tree which [`Segment::flatten`] turns into
//! the final ordered chunk list, one audio file per entry.

use crate::error::BookworksError;
use crate::pipeline::document::{normalize_text, DocElement, DocNode, Document, NodeKind};
use tracing::{debug, warn};

/// Default maximum chunk length in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 4096;

/// Result of segmenting one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Leaf(String),
    Group(Vec<Segment>),
}

impl Segment {
    /// Depth-first flattening into chunks, dropping empty leaves.
    pub fn flatten(self) -> Vec<String> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<String>) {
        match self {
            Segment::Leaf(text) if text.is_empty() => {}
            Segment::Leaf(text) => out.push(text),
            Segment::Group(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

/// Knobs for [`segment_element`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOptions {
    /// Target upper bound on chunk length, in characters.
    pub max_chars: usize,
    /// Narrate headings, intro paragraphs and bare text that sit next to
    /// `<section>` elements. When false only the sections themselves (and,
    /// when splitting, only child elements) are narrated; a container
    /// without sections then yields no chunks.
    pub keep_loose_text: bool,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHUNK_CHARS,
            keep_loose_text: true,
        }
    }
}

/// Locate the chapter body in `doc` and cut it into chunks.
pub fn segment_document(
    doc: &Document,
    container_id: &str,
    options: &SegmentOptions,
) -> Result<Vec<String>, BookworksError> {
    let container = doc
        .find_by_id(container_id)
        .ok_or_else(|| BookworksError::ContainerNotFound {
            id: container_id.to_string(),
        })?;
    if !options.keep_loose_text && !container.has_section_children() {
        debug!("'#{}' has no <section> children; nothing to narrate", container_id);
        return Ok(Vec::new());
    }
    let chunks = segment_element(container, options).flatten();
    debug!(
        "Segmented '#{}' into {} chunks (max {} chars)",
        container_id,
        chunks.len(),
        options.max_chars
    );
    Ok(chunks)
}

/// Segment one element following the section-first rule.
pub fn segment_element(el: &DocElement, options: &SegmentOptions) -> Segment {
    if el.has_section_children() {
        return segment_sections(el, options);
    }

    let text = el.normalized_text();
    if char_len(&text) <= options.max_chars {
        return Segment::Leaf(text);
    }

    if el.child_elements().next().is_none() {
        warn!(
            "<{}> has {} characters and nothing to split on; keeping it whole",
            el.tag,
            char_len(&text)
        );
        return Segment::Leaf(text);
    }

    Segment::Group(
        el.children
            .iter()
            .filter_map(|child| match child {
                DocNode::Element(e) => Some(segment_element(e, options)),
                DocNode::Text(t) if options.keep_loose_text => {
                    Some(Segment::Leaf(normalize_text([t.as_str()])))
                }
                DocNode::Text(_) => None,
            })
            .collect(),
    )
}

/// Split along `<section>` children, keeping the content between them in
/// document order when `keep_loose_text` is set.
fn segment_sections(el: &DocElement, options: &SegmentOptions) -> Segment {
    if !options.keep_loose_text {
        return Segment::Group(
            el.section_children()
                .map(|s| segment_element(s, options))
                .collect(),
        );
    }

    let mut out = Vec::new();
    let mut loose: Vec<&DocNode> = Vec::new();
    for child in &el.children {
        match child {
            DocNode::Element(e) if e.kind() == NodeKind::Section => {
                out.extend(segment_loose(&loose, options));
                loose.clear();
                out.push(segment_element(e, options));
            }
            other => loose.push(other),
        }
    }
    out.extend(segment_loose(&loose, options));
    Segment::Group(out)
}

/// A run of non-section siblings becomes one chunk when it fits, otherwise
/// each node is segmented on its own.
fn segment_loose(run: &[&DocNode], options: &SegmentOptions) -> Option<Segment> {
    let mut parts = Vec::new();
    for node in run {
        node.collect_text(&mut parts);
    }
    let text = normalize_text(parts);
    if text.is_empty() {
        return None;
    }
    if char_len(&text) <= options.max_chars {
        return Some(Segment::Leaf(text));
    }
    Some(Segment::Group(
        run.iter()
            .map(|node| match node {
                DocNode::Element(e) => segment_element(e, options),
                DocNode::Text(t) => Segment::Leaf(normalize_text([t.as_str()])),
            })
            .collect(),
    ))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> DocElement {
        DocElement::new("p").with_text(text)
    }

    fn opts(max_chars: usize) -> SegmentOptions {
        SegmentOptions {
            max_chars,
            keep_loose_text: true,
        }
    }

    #[test]
    fn exactly_max_is_not_split() {
        let div = DocElement::new("div")
            .with_child(p(&"a".repeat(2047)))
            .with_child(p(&"b".repeat(2048)));
        let chunks = segment_element(&div, &SegmentOptions::default()).flatten();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chars().count(), 4096);
    }

    #[test]
    fn one_over_max_splits_one_level() {
        let div = DocElement::new("div")
            .with_child(p(&"a".repeat(2047)))
            .with_child(p(&"b".repeat(2049)));
        let seg = segment_element(&div, &SegmentOptions::default());
        assert_eq!(
            seg,
            Segment::Group(vec![
                Segment::Leaf("a".repeat(2047)),
                Segment::Leaf("b".repeat(2049)),
            ])
        );
    }

    #[test]
    fn oversized_leaf_is_kept_whole() {
        let long = "word ".repeat(1200);
        let el = p(&long);
        let chunks = segment_element(&el, &SegmentOptions::default()).flatten();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].chars().count() > DEFAULT_MAX_CHUNK_CHARS);
    }

    #[test]
    fn sections_drive_the_split_even_when_short() {
        let root = DocElement::new("main")
            .with_child(DocElement::new("section").with_child(p("one")))
            .with_child(DocElement::new("section").with_child(p("two")));
        let chunks = segment_element(&root, &opts(100)).flatten();
        assert_eq!(chunks, vec!["one", "two"]);
    }

    #[test]
    fn nested_sections_flatten_in_document_order() {
        let root = DocElement::new("main").with_child(
            DocElement::new("section")
                .with_child(DocElement::new("h2").with_text("Title"))
                .with_child(DocElement::new("section").with_child(p("a")))
                .with_child(p("between"))
                .with_child(DocElement::new("section").with_child(p("b"))),
        );
        let chunks = segment_element(&root, &opts(100)).flatten();
        assert_eq!(chunks, vec!["Title", "a", "between", "b"]);
    }

    #[test]
    fn sections_only_drops_loose_content() {
        let root = DocElement::new("section")
            .with_child(DocElement::new("h2").with_text("Title"))
            .with_child(DocElement::new("section").with_child(p("a")));
        let options = SegmentOptions {
            max_chars: 100,
            keep_loose_text: false,
        };
        assert_eq!(segment_element(&root, &options).flatten(), vec!["a"]);
    }

    #[test]
    fn chunks_reassemble_to_full_text_and_respect_limit() {
        let mut body = DocElement::new("main").with_id("content");
        for s in 0..4 {
            let mut section = DocElement::new("section")
                .with_child(DocElement::new("h2").with_text(format!("Section {s}")));
            for i in 0..12 {
                section = section.with_child(p(&format!("Paragraph {s}.{i} {}", "lorem ipsum ".repeat(4))));
            }
            body = body.with_child(section);
        }
        let max = 200;
        let chunks = segment_element(&body, &opts(max)).flatten();
        assert!(chunks.len() > 4);
        assert_eq!(chunks.join(" "), body.normalized_text());
        for c in &chunks {
            assert!(c.chars().count() <= max, "chunk too long: {}", c.len());
        }
    }

    #[test]
    fn empty_sections_produce_no_chunks() {
        let root = DocElement::new("main")
            .with_child(DocElement::new("section"))
            .with_child(DocElement::new("section").with_child(p("x")));
        assert_eq!(segment_element(&root, &opts(10)).flatten(), vec!["x"]);
    }

    #[test]
    fn missing_container_is_an_error() {
        let doc = Document::from_elements(vec![DocElement::new("div").with_id("other")]);
        let err = segment_document(&doc, "quarto-document-content", &SegmentOptions::default())
            .unwrap_err();
        assert!(matches!(err, BookworksError::ContainerNotFound { .. }));
    }

    #[test]
    fn sections_only_container_without_sections_is_silent() {
        let doc = Document::from_elements(vec![DocElement::new("main")
            .with_id("quarto-document-content")
            .with_child(DocElement::new("h1").with_text("Title"))
            .with_child(p("Intro only."))]);
        let options = SegmentOptions {
            max_chars: 100,
            keep_loose_text: false,
        };
        let chunks = segment_document(&doc, "quarto-document-content", &options).unwrap();
        assert!(chunks.is_empty());

        let chunks =
            segment_document(&doc, "quarto-document-content", &SegmentOptions::default()).unwrap();
        assert_eq!(chunks, vec!["Title Intro only."]);
    }
}
