//! Cleaning: replace content that cannot be read aloud.
//!
//! Code callouts, tab sets and the reference list make no sense as audio.
//! Each matching subtree is swapped in place for a single `<p>` pointing the
//! listener at the online edition. Rules are checked outer-first, so a
//! callout nested inside a tab set disappears together with its parent and
//! only one placeholder is emitted.

use crate::pipeline::document::{DocElement, DocNode, Document};
use tracing::debug;

/// Placeholder read in place of code callouts and tab sets.
pub const CODE_PLACEHOLDER: &str = "Please see the online version of the book for code examples.";

/// Placeholder read in place of the reference list.
pub const REFERENCES_PLACEHOLDER: &str =
    "Please see the online version of the book for the reference list.";

/// Which elements a rule removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Element whose class list contains this class.
    Class(&'static str),
    /// Element with exactly this id.
    Id(&'static str),
}

impl Matcher {
    pub fn matches(&self, el: &DocElement) -> bool {
        match self {
            Matcher::Class(c) => el.has_class(c),
            Matcher::Id(id) => el.id.as_deref() == Some(*id),
        }
    }
}

/// A removal rule: what to match and what to say instead.
#[derive(Debug, Clone)]
pub struct CleanRule {
    pub matcher: Matcher,
    pub placeholder: &'static str,
}

/// The three rules applied to rendered chapters, in priority order.
pub const DEFAULT_RULES: [CleanRule; 3] = [
    CleanRule {
        matcher: Matcher::Class("callout"),
        placeholder: CODE_PLACEHOLDER,
    },
    CleanRule {
        matcher: Matcher::Class("panel-tabset"),
        placeholder: CODE_PLACEHOLDER,
    },
    CleanRule {
        matcher: Matcher::Id("refs"),
        placeholder: REFERENCES_PLACEHOLDER,
    },
];

/// How many subtrees each rule replaced, indexed like the rule slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub replaced: Vec<usize>,
}

impl CleanReport {
    pub fn total(&self) -> usize {
        self.replaced.iter().sum()
    }
}

/// Apply [`DEFAULT_RULES`] to the whole document.
pub fn clean_document(doc: &mut Document) -> CleanReport {
    clean_with_rules(doc, &DEFAULT_RULES)
}

/// Apply `rules` to the whole document, mutating it in place.
///
/// Zero matches leaves the tree untouched.
pub fn clean_with_rules(doc: &mut Document, rules: &[CleanRule]) -> CleanReport {
    let mut report = CleanReport {
        replaced: vec![0; rules.len()],
    };
    clean_children(&mut doc.children, rules, &mut report);
    debug!(
        "Cleaned document: {} subtrees replaced ({:?})",
        report.total(),
        report.replaced
    );
    report
}

fn clean_children(children: &mut [DocNode], rules: &[CleanRule], report: &mut CleanReport) {
    for node in children.iter_mut() {
        let DocNode::Element(el) = node else {
            continue;
        };
        match rules.iter().position(|r| r.matcher.matches(el)) {
            Some(i) => {
                report.replaced[i] += 1;
                *node = DocNode::Element(placeholder_paragraph(rules[i].placeholder));
            }
            None => clean_children(&mut el.children, rules, report),
        }
    }
}

fn placeholder_paragraph(text: &str) -> DocElement {
    DocElement::new("p").with_text(text)
}
