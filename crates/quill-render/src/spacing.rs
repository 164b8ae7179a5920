//! Block/inline spacing normalizer.
//!
//! CommonMark decides whether HTML starts a block, and whether the text
//! inside it is parsed as Markdown, from the blank lines around it. This
//! pass rewrites the whitespace around and inside HTML-like elements so the
//! engine's decision matches what each element is:
//!
//! - an element that cannot hold paragraphs, or an inline use of an element
//!   that prefers inline placement, has its inner whitespace trimmed;
//! - any other element gets blank lines inside, and around itself when it
//!   shares a line with text;
//! - a void or self-closing element that cannot sit in a paragraph gets
//!   blank lines around it.
//!
//! Raw-text elements (`pre`, `script`, `style`, `textarea`) and comments are
//! skipped entirely.

use std::collections::{BTreeMap, HashMap};

/// Phrasing elements that may appear inside a paragraph.
const CAN_BE_IN_PARAGRAPH: &[&str] = &[
    "a", "abbr", "audio", "b", "bdi", "bdo", "br", "button", "canvas", "cite", "code", "data",
    "del", "dfn", "em", "i", "iframe", "img", "input", "ins", "kbd", "label", "mark", "math",
    "meter", "object", "output", "picture", "progress", "q", "ruby", "s", "samp", "select",
    "small", "span", "strong", "sub", "sup", "svg", "time", "u", "var", "video", "wbr",
];

/// Known block elements that hold neither paragraphs nor sit in one.
const BLOCK_ONLY: &[&str] = &[
    "dl", "dt", "figcaption", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "ol", "p", "summary",
    "table", "tbody", "tfoot", "thead", "tr", "ul",
];

const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT: &[&str] = &["pre", "script", "style", "textarea"];

/// A user component and its placement preference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Tag name, case-sensitive.
    pub name: String,
    /// Keep the component inside paragraphs when used inline.
    pub prefers_inline: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Class {
    can_contain_paragraph: bool,
    can_be_in_paragraph: bool,
    prefers_inline: bool,
}

/// Element classification used by [`adjust_spacing`].
#[derive(Clone, Debug, Default)]
pub struct SpacingRules {
    components: HashMap<String, bool>,
}

impl SpacingRules {
    /// Rules for the built-in HTML tables plus `components`.
    #[must_use]
    pub fn new(components: &[ComponentInfo]) -> Self {
        Self {
            components: components
                .iter()
                .map(|c| (c.name.clone(), c.prefers_inline))
                .collect(),
        }
    }

    fn classify(&self, name: &str) -> Class {
        if let Some(&prefers_inline) = self.components.get(name) {
            return Class {
                can_contain_paragraph: true,
                can_be_in_paragraph: prefers_inline,
                prefers_inline,
            };
        }
        let lower = name.to_ascii_lowercase();
        let name = lower.as_str();
        if CAN_BE_IN_PARAGRAPH.contains(&name) {
            Class {
                can_contain_paragraph: false,
                can_be_in_paragraph: true,
                prefers_inline: true,
            }
        } else if BLOCK_ONLY.contains(&name) {
            Class {
                can_contain_paragraph: false,
                can_be_in_paragraph: false,
                prefers_inline: false,
            }
        } else {
            // Flow containers (`div`, `li`, `td`, ...) and unknown tags.
            Class {
                can_contain_paragraph: true,
                can_be_in_paragraph: false,
                prefers_inline: false,
            }
        }
    }
}

fn is_void(name: &str) -> bool {
    VOID.contains(&name.to_ascii_lowercase().as_str())
}

fn is_raw_text(name: &str) -> bool {
    RAW_TEXT.contains(&name.to_ascii_lowercase().as_str())
}

#[derive(Debug)]
enum Tag<'a> {
    Open {
        name: &'a str,
        start: usize,
        end: usize,
        self_closing: bool,
    },
    Close {
        name: &'a str,
        start: usize,
        end: usize,
    },
}

/// An element found in the document.
#[derive(Debug)]
struct Element<'a> {
    name: &'a str,
    open_start: usize,
    open_end: usize,
    /// `None` for void and self-closing elements.
    close: Option<(usize, usize)>,
}

fn name_end(bytes: &[u8], from: usize) -> Option<usize> {
    if !bytes.get(from).is_some_and(u8::is_ascii_alphabetic) {
        return None;
    }
    let mut end = from + 1;
    while end < bytes.len()
        && (bytes[end].is_ascii_alphanumeric() || matches!(bytes[end], b'-' | b'_' | b'.'))
    {
        end += 1;
    }
    Some(end)
}

/// Parse the tag starting at the `<` at `start`.
fn parse_tag(doc: &str, start: usize) -> Option<Tag<'_>> {
    let bytes = doc.as_bytes();
    if bytes.get(start + 1) == Some(&b'/') {
        let end = name_end(bytes, start + 2)?;
        let gt = end + doc[end..].find('>')?;
        return doc[end..gt]
            .trim()
            .is_empty()
            .then_some(Tag::Close {
                name: &doc[start + 2..end],
                start,
                end: gt + 1,
            });
    }

    let end = name_end(bytes, start + 1)?;
    match bytes.get(end) {
        Some(&b) if b.is_ascii_whitespace() || matches!(b, b'>' | b'/') => {}
        _ => return None,
    }
    let mut quote: Option<u8> = None;
    let mut last = 0u8;
    for (i, &b) in bytes.iter().enumerate().skip(end) {
        if let Some(q) = quote {
            if b == q {
                quote = None;
                last = b;
            }
        } else if matches!(b, b'"' | b'\'') && last == b'=' {
            quote = Some(b);
        } else if b == b'>' {
            return Some(Tag::Open {
                name: &doc[start + 1..end],
                start,
                end: i + 1,
                self_closing: last == b'/',
            });
        } else if !b.is_ascii_whitespace() {
            last = b;
        }
    }
    None
}

/// Position past the closing tag of raw-text element `name`.
fn skip_raw_text(doc: &str, from: usize, name: &str) -> usize {
    let lower = doc[from..].to_ascii_lowercase();
    let needle = format!("</{}", name.to_ascii_lowercase());
    lower
        .find(&needle)
        .and_then(|p| doc[from + p..].find('>').map(|gt| from + p + gt + 1))
        .unwrap_or(doc.len())
}

/// Build the element list; unmatched open and close tags are ignored.
fn elements(doc: &str) -> Vec<Element<'_>> {
    let mut found = Vec::new();
    let mut stack: Vec<(&str, usize, usize)> = Vec::new();
    let mut i = 0;

    while let Some(offset) = doc[i..].find('<') {
        let start = i + offset;
        if doc[start..].starts_with("<!--") {
            i = doc[start + 4..]
                .find("-->")
                .map_or(doc.len(), |p| start + 4 + p + 3);
            continue;
        }
        match parse_tag(doc, start) {
            None => i = start + 1,
            Some(Tag::Open {
                name,
                start,
                end,
                self_closing,
            }) => {
                if self_closing || is_void(name) {
                    found.push(Element {
                        name,
                        open_start: start,
                        open_end: end,
                        close: None,
                    });
                    i = end;
                } else if is_raw_text(name) {
                    i = skip_raw_text(doc, end, name);
                } else {
                    stack.push((name, start, end));
                    i = end;
                }
            }
            Some(Tag::Close { name, start, end }) => {
                if let Some(index) = stack.iter().rposition(|(open, _, _)| *open == name) {
                    let (name, open_start, open_end) = stack[index];
                    stack.truncate(index);
                    found.push(Element {
                        name,
                        open_start,
                        open_end,
                        close: Some((start, end)),
                    });
                }
                i = end;
            }
        }
    }

    found
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Edit {
    Trim,
    Pad,
}

/// Maximal whitespace run ending at `pos`.
fn space_before(doc: &str, pos: usize) -> (usize, usize) {
    let start = doc[..pos].trim_end().len();
    (start, pos)
}

/// Maximal whitespace run starting at `pos`.
fn space_after(doc: &str, pos: usize) -> (usize, usize) {
    let rest = &doc[pos..];
    (pos, pos + rest.len() - rest.trim_start().len())
}

/// Whether `range` shares a line with non-whitespace text.
fn shares_line(doc: &str, start: usize, end: usize) -> bool {
    let line_start = doc[..start].rfind('\n').map_or(0, |p| p + 1);
    let line_end = doc[end..].find('\n').map_or(doc.len(), |p| end + p);
    !doc[line_start..start].trim().is_empty() || !doc[end..line_end].trim().is_empty()
}

struct Edits<'a> {
    doc: &'a str,
    runs: BTreeMap<usize, (usize, Edit)>,
}

impl<'a> Edits<'a> {
    fn request(&mut self, (start, end): (usize, usize), edit: Edit) {
        let entry = self.runs.entry(start).or_insert((end, edit));
        if edit == Edit::Pad {
            entry.1 = Edit::Pad;
        }
    }

    fn trim_inner(&mut self, open_end: usize, close_start: usize) {
        self.request(space_after(self.doc, open_end), Edit::Trim);
        self.request(space_before(self.doc, close_start), Edit::Trim);
    }

    fn pad_inner(&mut self, open_end: usize, close_start: usize) {
        self.request(space_after(self.doc, open_end), Edit::Pad);
        self.request(space_before(self.doc, close_start), Edit::Pad);
    }

    fn pad_around(&mut self, start: usize, end: usize) {
        let before = space_before(self.doc, start);
        if before.0 > 0 {
            self.request(before, Edit::Pad);
        }
        let after = space_after(self.doc, end);
        if after.1 < self.doc.len() {
            self.request(after, Edit::Pad);
        }
    }

    fn apply(self) -> String {
        let mut out = String::with_capacity(self.doc.len() + self.runs.len() * 2);
        let mut copied = 0;
        for (start, (end, edit)) in self.runs {
            if start < copied {
                continue;
            }
            out.push_str(&self.doc[copied..start]);
            let run = &self.doc[start..end];
            match edit {
                Edit::Trim => {}
                Edit::Pad if run.matches('\n').count() >= 2 => out.push_str(run),
                Edit::Pad => {
                    out.push_str("\n\n");
                    if let Some(p) = run.rfind('\n') {
                        out.push_str(&run[p + 1..]);
                    }
                }
            }
            copied = end;
        }
        out.push_str(&self.doc[copied..]);
        out
    }
}

/// Rewrite blank-line padding around and inside HTML-like elements.
#[must_use]
pub fn adjust_spacing(document: &str, rules: &SpacingRules) -> String {
    let mut edits = Edits {
        doc: document,
        runs: BTreeMap::new(),
    };

    for element in elements(document) {
        let class = rules.classify(element.name);
        let Some((close_start, close_end)) = element.close else {
            if !class.can_be_in_paragraph {
                edits.pad_around(element.open_start, element.open_end);
            }
            continue;
        };

        let inline = shares_line(document, element.open_start, close_end);
        let inner = &document[element.open_end..close_start];
        let leading_newlines = inner[..inner.len() - inner.trim_start().len()]
            .matches('\n')
            .count();

        if !class.can_contain_paragraph
            || (inline && leading_newlines <= 1 && class.prefers_inline)
        {
            edits.trim_inner(element.open_end, close_start);
        } else {
            edits.pad_inner(element.open_end, close_start);
            if inline {
                edits.pad_around(element.open_start, close_end);
            }
        }
    }

    edits.apply()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rules() -> SpacingRules {
        SpacingRules::new(&[
            ComponentInfo {
                name: "Badge".to_owned(),
                prefers_inline: true,
            },
            ComponentInfo {
                name: "Chart".to_owned(),
                prefers_inline: false,
            },
        ])
    }

    fn adjust(doc: &str) -> String {
        adjust_spacing(doc, &rules())
    }

    #[test]
    fn test_block_container_gets_blank_lines_inside() {
        assert_eq!(
            adjust("<div>\n**bold**\n</div>\n"),
            "<div>\n\n**bold**\n\n</div>\n"
        );
    }

    #[test]
    fn test_inline_block_is_pulled_out_of_paragraph() {
        assert_eq!(
            adjust("text <Chart>x</Chart> more"),
            "text\n\n<Chart>\n\nx\n\n</Chart>\n\nmore"
        );
    }

    #[test]
    fn test_inline_component_trimmed() {
        assert_eq!(adjust("a <Badge> new </Badge> b"), "a <Badge>new</Badge> b");
    }

    #[test]
    fn test_inline_component_on_own_lines_is_padded() {
        assert_eq!(
            adjust("<Badge>\nnew\n</Badge>"),
            "<Badge>\n\nnew\n\n</Badge>"
        );
    }

    #[test]
    fn test_paragraph_element_trimmed() {
        assert_eq!(adjust("<p>\n  hi  \n</p>"), "<p>hi</p>");
    }

    #[test]
    fn test_pre_untouched() {
        let doc = "<pre>\n  <div> x </div>\n</pre>";
        assert_eq!(adjust(doc), doc);
    }

    #[test]
    fn test_script_untouched() {
        let doc = "<script>if (a < b) { x(\"<div>\") }</script>";
        assert_eq!(adjust(doc), doc);
    }

    #[test]
    fn test_void_block_gets_padding() {
        assert_eq!(adjust("a\n<hr>\nb"), "a\n\n<hr>\n\nb");
        assert_eq!(adjust("a <br> b"), "a <br> b");
    }

    #[test]
    fn test_self_closing_block_component() {
        assert_eq!(adjust("x <Chart /> y"), "x\n\n<Chart />\n\ny");
        assert_eq!(adjust("x <Badge /> y"), "x <Badge /> y");
    }

    #[test]
    fn test_nested_elements_share_runs() {
        assert_eq!(
            adjust("<div>\n<div>\ninner\n</div>\n</div>"),
            "<div>\n\n<div>\n\ninner\n\n</div>\n\n</div>"
        );
    }

    #[test]
    fn test_indentation_kept_when_padding() {
        assert_eq!(
            adjust("<div>\n  text\n</div>"),
            "<div>\n\n  text\n\n</div>"
        );
    }

    #[test]
    fn test_unmatched_tags_ignored() {
        let doc = "a < b and <div> never closed, </span> stray";
        assert_eq!(adjust(doc), doc);
    }

    #[test]
    fn test_comments_skipped() {
        let doc = "<!-- <div>x</div> -->";
        assert_eq!(adjust(doc), doc);
    }

    #[test]
    fn test_quoted_gt_in_attribute() {
        assert_eq!(
            adjust("<div title=\"a > b\">\nx\n</div>"),
            "<div title=\"a > b\">\n\nx\n\n</div>"
        );
    }

    #[test]
    fn test_adjust_is_stable() {
        let once = adjust("text <Chart>x</Chart> more\n<div>\ny\n</div>");
        assert_eq!(adjust(&once), once);
    }
}
