//! Document tree: the parsed chapter HTML in a shape the cleaner and
//! segmenter can walk and rewrite.
//!
//! `html_parser` does the actual parsing; its tree is converted once into
//! [`DocNode`] so the later stages own their data, can replace subtrees in
//! place, and never see comments or undecoded entities (`&nbsp;` is turned
//! into U+00A0 here and folded into a plain space by [`normalize_text`]).
//!
//! `html_parser` expects every element to be closed. Markup that relies on
//! HTML's optional end tags (`<li>one<li>two`, `<p>a<p>b`, `<td>a<td>b`)
//! is first rewritten by [`close_implied_tags`]; text that still looks like
//! a tag after parsing is reported as [`BookworksError::HtmlParse`] rather
//! than narrated.

use crate::error::BookworksError;
use html_parser::{Dom, Node};
use once_cell::sync::Lazy;
use regex::Regex;

/// Elements whose text content is never narrated.
const SILENT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that never have content or an end tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is copied through untouched.
const RAW_TEXT_TAGS: &[&str] = &["script", "style", "textarea", "title"];

/// Block elements whose start tag ends an open `<p>`.
const P_CLOSERS: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "main", "nav", "ol", "p", "pre", "section", "table", "ul",
];

/// A comment, or a start/end tag with its (possibly quoted) attributes.
static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<!--.*?-->|<(/?)([A-Za-z][A-Za-z0-9-]*)(?:"[^"]*"|'[^']*'|[^'">])*>"#)
        .unwrap()
});

/// Tag-shaped text left behind by a failed parse.
static TAG_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9-]*[\s/>]").unwrap());

/// One node of the document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DocNode {
    Element(DocElement),
    Text(String),
}

/// Structural role of an element as far as segmentation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Section,
    Div,
    Other,
}

/// An element with its tag, id, classes and children in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocElement {
    /// Lower-cased tag name.
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub children: Vec<DocNode>,
}

impl DocElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_child(mut self, child: DocElement) -> Self {
        self.children.push(DocNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(DocNode::Text(text.into()));
        self
    }

    pub fn kind(&self) -> NodeKind {
        match self.tag.as_str() {
            "section" => NodeKind::Section,
            "div" => NodeKind::Div,
            _ => NodeKind::Other,
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Direct child elements, skipping text nodes.
    pub fn child_elements(&self) -> impl Iterator<Item = &DocElement> {
        self.children.iter().filter_map(|n| match n {
            DocNode::Element(e) => Some(e),
            DocNode::Text(_) => None,
        })
    }

    /// Direct children of kind [`NodeKind::Section`].
    pub fn section_children(&self) -> impl Iterator<Item = &DocElement> {
        self.child_elements()
            .filter(|e| e.kind() == NodeKind::Section)
    }

    pub fn has_section_children(&self) -> bool {
        self.section_children().next().is_some()
    }

    /// Whether this element's text is narrated at all.
    pub fn is_silent(&self) -> bool {
        SILENT_TAGS.contains(&self.tag.as_str())
    }

    /// Push every descendant text node, in document order, onto `out`.
    pub fn collect_text<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.is_silent() {
            return;
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// All descendant text, whitespace-normalised into single spaces.
    pub fn normalized_text(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        normalize_text(parts)
    }

    /// Depth-first search for the first element carrying `id`.
    pub fn find_by_id(&self, id: &str) -> Option<&DocElement> {
        if self.id.as_deref() == Some(id) {
            return Some(self);
        }
        self.child_elements().find_map(|e| e.find_by_id(id))
    }

    /// Visit this element and every descendant element, pre-order.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a DocElement)) {
        visit(self);
        for child in self.child_elements() {
            child.walk(visit);
        }
    }
}

impl DocNode {
    pub fn collect_text<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            DocNode::Element(e) => e.collect_text(out),
            DocNode::Text(t) => out.push(t),
        }
    }

    pub fn as_element(&self) -> Option<&DocElement> {
        match self {
            DocNode::Element(e) => Some(e),
            DocNode::Text(_) => None,
        }
    }
}

/// A whole parsed document: the top-level nodes under the implicit root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub children: Vec<DocNode>,
}

impl Document {
    /// Parse HTML markup into a document tree.
    ///
    /// `source_name` only appears in the error message.
    pub fn parse(html: &str, source_name: &str) -> Result<Self, BookworksError> {
        let balanced = close_implied_tags(html);
        let dom = Dom::parse(&balanced).map_err(|e| BookworksError::HtmlParse {
            source_name: source_name.to_string(),
            detail: e.to_string(),
        })?;
        if let Some(snippet) = find_unparsed_markup(&dom.children) {
            return Err(BookworksError::HtmlParse {
                source_name: source_name.to_string(),
                detail: format!("unparsed markup near '{snippet}'"),
            });
        }
        Ok(Self {
            children: dom.children.into_iter().filter_map(convert_node).collect(),
        })
    }

    pub fn from_elements(elements: Vec<DocElement>) -> Self {
        Self {
            children: elements.into_iter().map(DocNode::Element).collect(),
        }
    }

    pub fn find_by_id(&self, id: &str) -> Option<&DocElement> {
        self.children
            .iter()
            .filter_map(DocNode::as_element)
            .find_map(|e| e.find_by_id(id))
    }

    /// Visit every element in the document, pre-order.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a DocElement)) {
        for e in self.children.iter().filter_map(DocNode::as_element) {
            e.walk(visit);
        }
    }
}

/// Which open elements a start tag of `tag` ends, innermost first.
fn implicitly_closed_by(tag: &str) -> &'static [&'static str] {
    match tag {
        "li" => &["li", "p"],
        "dt" | "dd" => &["dt", "dd", "p"],
        "td" | "th" => &["td", "th", "p"],
        "tr" => &["tr", "td", "th", "p"],
        "thead" | "tbody" | "tfoot" => &["thead", "tbody", "tfoot", "tr", "td", "th", "p"],
        "option" => &["option"],
        t if P_CLOSERS.contains(&t) => &["p"],
        _ => &[],
    }
}

fn push_end_tag(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Write out the end tags HTML lets authors omit.
///
/// A start tag closes the open elements it implicitly ends (a new `<li>`
/// ends the previous one, a block element ends an open `<p>`); an end tag
/// closes everything opened inside its element; stray end tags are dropped
/// and whatever is still open at the end of input is closed. Comments and
/// the content of `script`, `style`, `textarea` and `title` pass through.
pub fn close_implied_tags(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len() + 64);
    let mut stack: Vec<String> = Vec::new();
    let mut pos = 0;

    while let Some(caps) = TAG.captures_at(html, pos) {
        let Some(whole) = caps.get(0) else {
            break;
        };
        out.push_str(&html[pos..whole.start()]);
        pos = whole.end();

        let Some(name) = caps.get(2) else {
            // comment
            out.push_str(whole.as_str());
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let is_end = caps.get(1).is_some_and(|m| !m.as_str().is_empty());

        if is_end {
            if let Some(idx) = stack.iter().rposition(|open| *open == name) {
                for open in stack.drain(idx + 1..).rev() {
                    push_end_tag(&mut out, &open);
                }
                stack.pop();
                out.push_str(whole.as_str());
            }
            continue;
        }

        let closes = implicitly_closed_by(&name);
        while let Some(top) = stack.last() {
            if !closes.contains(&top.as_str()) {
                break;
            }
            push_end_tag(&mut out, top);
            stack.pop();
        }
        out.push_str(whole.as_str());

        if VOID_TAGS.contains(&name.as_str()) || whole.as_str().ends_with("/>") {
            continue;
        }
        if RAW_TEXT_TAGS.contains(&name.as_str()) {
            let end = lower[pos..]
                .find(&format!("</{name}"))
                .map_or(html.len(), |i| pos + i);
            out.push_str(&html[pos..end]);
            pos = end;
        }
        stack.push(name);
    }

    out.push_str(&html[pos..]);
    for open in stack.iter().rev() {
        push_end_tag(&mut out, open);
    }
    out
}

/// First text node outside silent elements that still contains a tag.
fn find_unparsed_markup(nodes: &[Node]) -> Option<String> {
    for node in nodes {
        match node {
            Node::Text(text) => {
                if let Some(m) = TAG_TEXT.find(text) {
                    return Some(text[m.start()..].chars().take(40).collect());
                }
            }
            Node::Element(el) => {
                if SILENT_TAGS.contains(&el.name.to_ascii_lowercase().as_str()) {
                    continue;
                }
                if let Some(snippet) = find_unparsed_markup(&el.children) {
                    return Some(snippet);
                }
            }
            Node::Comment(_) => {}
        }
    }
    None
}

fn convert_node(node: Node) -> Option<DocNode> {
    match node {
        Node::Text(text) => Some(DocNode::Text(
            html_escape::decode_html_entities(&text).into_owned(),
        )),
        Node::Element(el) => Some(DocNode::Element(DocElement {
            tag: el.name.to_ascii_lowercase(),
            id: el.id,
            classes: el.classes,
            children: el.children.into_iter().filter_map(convert_node).collect(),
        })),
        Node::Comment(_) => None,
    }
}

/// Join text fragments with single spaces, collapsing every whitespace run
/// (including non-breaking spaces) and dropping empty fragments.
pub fn normalize_text<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for word in parts.into_iter().flat_map(str::split_whitespace) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_ids_classes_and_order() {
        let doc = Document::parse(
            r#"<main id="quarto-document-content"><section id="a" class="level2"><h2>One</h2><p>first</p></section><section id="b"><p>second</p></section></main>"#,
            "inline",
        )
        .expect("parse");
        let main = doc.find_by_id("quarto-document-content").expect("container");
        let ids: Vec<_> = main
            .section_children()
            .map(|s| s.id.clone().unwrap_or_default())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(main.child_elements().next().unwrap().has_class("level2"));
        assert_eq!(main.normalized_text(), "One first second");
    }

    #[test]
    fn implied_end_tags_are_closed() {
        assert_eq!(
            close_implied_tags("<ul><li>one<li>two</ul>"),
            "<ul><li>one</li><li>two</li></ul>"
        );
        assert_eq!(
            close_implied_tags("<p>a<p>b<div>c</div>"),
            "<p>a</p><p>b</p><div>c</div>"
        );
        assert_eq!(
            close_implied_tags("<table><tr><td>a<td>b</table>"),
            "<table><tr><td>a</td><td>b</td></tr></table>"
        );
        assert_eq!(
            close_implied_tags("<section><p>x</span></section>"),
            "<section><p>x</p></section>"
        );
    }

    #[test]
    fn comments_and_script_pass_through() {
        let html = r#"<!-- <p>not a tag --><script>if (a<b) { x = "<li>"; }</script><p title="a>b">x<br/>y"#;
        assert_eq!(
            close_implied_tags(html),
            r#"<!-- <p>not a tag --><script>if (a<b) { x = "<li>"; }</script><p title="a>b">x<br/>y</p>"#
        );
    }

    #[test]
    fn implicitly_closed_markup_parses_to_text() {
        let doc = Document::parse(
            r#"<main id="quarto-document-content"><section><ul><li>one<li>two</ul><p>para one<p>para two</section></main>"#,
            "inline",
        )
        .expect("parse");
        let main = doc.find_by_id("quarto-document-content").expect("container");
        let text = main.normalized_text();
        assert_eq!(text, "one two para one para two");

        let section = main.section_children().next().expect("section");
        let tags: Vec<_> = section.child_elements().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["ul", "p", "p"]);
        let items = section.child_elements().next().expect("ul").child_elements().count();
        assert_eq!(items, 2);

        let doc = Document::parse("<table><tr><td>a<td>b</table>", "inline").expect("parse");
        let mut all = Vec::new();
        for node in &doc.children {
            node.collect_text(&mut all);
        }
        assert_eq!(normalize_text(all), "a b");
    }

    #[test]
    fn leftover_tag_text_is_detected() {
        let nodes = vec![Node::Text("<li>one<li>two".to_string())];
        assert_eq!(
            find_unparsed_markup(&nodes).as_deref(),
            Some("<li>one<li>two")
        );
        let plain = vec![Node::Text("a < b and 3<4".to_string())];
        assert!(find_unparsed_markup(&plain).is_none());
    }

    #[test]
    fn entities_and_nbsp_are_normalised() {
        let doc = Document::parse("<p>R&nbsp;and&nbsp;Python &amp; SQL</p>", "inline").unwrap();
        let p = doc.children[0].as_element().unwrap();
        assert_eq!(p.normalized_text(), "R and Python & SQL");
    }

    #[test]
    fn script_text_is_not_narrated() {
        let el = DocElement::new("div")
            .with_text("visible")
            .with_child(DocElement::new("script").with_text("var x = 1;"));
        assert_eq!(el.normalized_text(), "visible");
    }

    #[test]
    fn normalize_text_collapses_whitespace() {
        assert_eq!(
            normalize_text(["  a\n b ", "", "\u{a0}c\t"]),
            "a b c"
        );
        assert_eq!(normalize_text(Vec::<&str>::new()), "");
    }

    #[test]
    fn kinds() {
        assert_eq!(DocElement::new("SECTION").kind(), NodeKind::Section);
        assert_eq!(DocElement::new("div").kind(), NodeKind::Div);
        assert_eq!(DocElement::new("p").kind(), NodeKind::Other);
    }
}
