//! Placeholder escaping.
//!
//! Raw regions are replaced by opaque tokens before the Markdown pass so the
//! engine cannot touch their content. Categories are matched in a fixed
//! order, each pass running on the output of the previous one:
//!
//! 1. verbatim tags of registered environments (outermost match, depth
//!    tracked across every name of the same environment);
//! 2. fenced code blocks;
//! 3. inline code, `$$` display math and `$` inline math, in one
//!    left-to-right scan.
//!
//! Content captured by an earlier pass is a token by the time later passes
//! run, so math and code are only recognized outside verbatim tags. A later
//! region that swallows an earlier token (a tag shown inside a fenced code
//! example) absorbs it: the earlier match is dropped and the later one keeps
//! the original text.
//!
//! Regions that occupy whole lines are padded with blank lines so the
//! Markdown engine sees the token as a paragraph of its own.

mod fence;
mod inline;
mod tags;

use std::collections::HashMap;
use std::ops::Range;

use crate::attrs::{Attributes, parse_attributes};
use crate::diagnostics::DiagnosticSink;
use crate::registry::Registry;
use crate::token::{find_tokens, new_token};

/// A verbatim tag occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerbatimTag {
    /// Tag name as written.
    pub tag: String,
    /// Parsed attributes.
    pub attributes: Attributes,
    /// Text between the opening and closing tag.
    pub inner: String,
    /// Whether the tag was written `<Tag ... />`.
    pub self_closing: bool,
    /// Whether the self-closing slash had whitespace before it.
    pub space_before_slash: bool,
}

/// What an escaped region is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// `$$...$$`
    DisplayMath {
        /// Math source without delimiters.
        content: String,
    },
    /// `$...$`
    InlineMath {
        /// Math source without delimiters.
        content: String,
    },
    /// Fenced code block.
    FencedCode {
        /// Info string after the opening fence.
        info: String,
        /// Code lines, opening-fence indentation removed.
        content: String,
    },
    /// Backtick code span.
    InlineCode {
        /// Code without delimiters.
        content: String,
    },
    /// Tag of a registered verbatim environment.
    Verbatim(VerbatimTag),
}

/// One escaped region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedMatch {
    /// Placeholder standing in for the region.
    pub token: String,
    /// Region text exactly as in the input document.
    pub original: String,
    /// Region category and parsed parts.
    pub kind: MatchKind,
    /// Byte range in the input document.
    pub range: Range<usize>,
    /// Whether the region occupied whole lines.
    pub block: bool,
}

/// Insertion-ordered token table of one escape/unescape cycle.
#[derive(Debug, Default)]
pub struct SavedMatches {
    order: Vec<String>,
    by_token: HashMap<String, SavedMatch>,
}

impl SavedMatches {
    /// Match saved for `token`.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<&SavedMatch> {
        self.by_token.get(token)
    }

    /// Matches in document order of discovery.
    pub fn iter(&self) -> impl Iterator<Item = &SavedMatch> {
        self.order.iter().filter_map(|token| self.by_token.get(token))
    }

    /// Number of matches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing was escaped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, saved: SavedMatch) {
        self.order.push(saved.token.clone());
        self.by_token.insert(saved.token.clone(), saved);
    }

    /// Drop every match whose token occurs in `text`.
    fn absorb(&mut self, text: &str) {
        let mut absorbed = false;
        for (_, token) in find_tokens(text) {
            absorbed |= self.by_token.remove(token).is_some();
        }
        if absorbed {
            self.order.retain(|token| self.by_token.contains_key(token));
        }
    }
}

/// Result of [`escape`].
#[derive(Debug)]
pub struct Escaped {
    /// Document with every raw region replaced by its token.
    pub document: String,
    /// Token table.
    pub matches: SavedMatches,
}

/// Maps positions of a rewritten string back to the input document.
///
/// Exact at the boundaries of copied and replaced segments and anywhere
/// inside copied text, which covers every region boundary a pass produces.
/// Each pass composes its anchors with the previous pass's map.
#[derive(Clone, Debug)]
struct OffsetMap {
    /// `(position in current text, position in input)`, sorted.
    anchors: Vec<(usize, usize)>,
}

impl OffsetMap {
    fn identity() -> Self {
        Self {
            anchors: vec![(0, 0)],
        }
    }

    fn original(&self, pos: usize) -> usize {
        let index = self
            .anchors
            .partition_point(|(current, _)| *current <= pos)
            .saturating_sub(1);
        let (current, original) = self.anchors[index];
        original + pos.saturating_sub(current)
    }

    fn original_range(&self, range: &Range<usize>) -> Range<usize> {
        self.original(range.start)..self.original(range.end)
    }
}

/// Builds the next pass's text from the current one.
struct Rewriter<'a> {
    current: &'a str,
    map: &'a OffsetMap,
    out: String,
    anchors: Vec<(usize, usize)>,
    copied: usize,
}

impl<'a> Rewriter<'a> {
    fn new(current: &'a str, map: &'a OffsetMap) -> Self {
        Self {
            current,
            map,
            out: String::with_capacity(current.len()),
            anchors: Vec::new(),
            copied: 0,
        }
    }

    /// Copy `current[copied..end]` unchanged.
    ///
    /// Anchors of earlier passes inside the copied span are carried over, so
    /// the composed map stays exact across regions those passes replaced.
    fn copy_to(&mut self, end: usize) {
        if end > self.copied {
            let base = self.out.len();
            self.anchors.push((base, self.map.original(self.copied)));
            let from = self
                .map
                .anchors
                .partition_point(|(current, _)| *current <= self.copied);
            for &(current, original) in &self.map.anchors[from..] {
                if current >= end {
                    break;
                }
                self.anchors.push((base + current - self.copied, original));
            }
            self.out.push_str(&self.current[self.copied..end]);
            self.copied = end;
        }
    }

    /// Replace `range` with `token` inline.
    fn inline(&mut self, range: &Range<usize>, token: &str) {
        self.copy_to(range.start);
        self.anchors
            .push((self.out.len(), self.map.original(range.start)));
        self.out.push_str(token);
        self.copied = range.end;
    }

    /// Replace the whole lines `lines` with `indent` + `token`, surrounded by
    /// blank lines.
    fn block(&mut self, lines: &Range<usize>, indent: &str, token: &str) {
        self.copy_to(lines.start);
        self.anchors
            .push((self.out.len(), self.map.original(lines.start)));
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out
                .push_str(if self.out.ends_with('\n') { "\n" } else { "\n\n" });
        }
        self.out.push_str(indent);
        self.out.push_str(token);
        self.out
            .push_str(if lines.end >= self.current.len() { "\n" } else { "\n\n" });
        self.copied = lines.end;
    }

    fn finish(mut self) -> (String, OffsetMap) {
        self.copy_to(self.current.len());
        self.anchors
            .push((self.out.len(), self.map.original(self.current.len())));
        (
            self.out,
            OffsetMap {
                anchors: self.anchors,
            },
        )
    }
}

/// Start of the line containing `pos`.
fn line_start(text: &str, pos: usize) -> usize {
    text[..pos].rfind('\n').map_or(0, |p| p + 1)
}

/// End of the line containing `pos`, past its newline.
fn line_end(text: &str, pos: usize) -> usize {
    text[pos..].find('\n').map_or(text.len(), |p| pos + p + 1)
}

/// Whole-line span of `range`, if nothing but whitespace shares its lines.
fn standalone_lines(text: &str, range: &Range<usize>) -> Option<Range<usize>> {
    let start = line_start(text, range.start);
    let end = line_end(text, range.end);
    (text[start..range.start].trim().is_empty() && text[range.end..end].trim().is_empty())
        .then_some(start..end)
}

/// Escape every raw region of `document`.
///
/// Malformed verbatim tags are reported to `sink` and left as text.
pub fn escape(document: &str, registry: &Registry, sink: &dyn DiagnosticSink) -> Escaped {
    let mut matches = SavedMatches::default();
    let identity = OffsetMap::identity();

    // Pass 1: verbatim tags, on the input itself.
    let mut rewriter = Rewriter::new(document, &identity);
    for found in tags::scan(document, registry, sink) {
        let token = new_token();
        let block = standalone_lines(document, &found.range);
        match &block {
            Some(lines) => rewriter.block(lines, &document[lines.start..found.range.start], &token),
            None => rewriter.inline(&found.range, &token),
        }
        let attributes = parse_attributes(&document[found.attributes.clone()]);
        matches.insert(SavedMatch {
            token,
            original: document[found.range.clone()].to_owned(),
            kind: MatchKind::Verbatim(VerbatimTag {
                tag: document[found.name.clone()].to_owned(),
                attributes,
                inner: document[found.inner.clone()].to_owned(),
                self_closing: found.self_closing,
                space_before_slash: found.space_before_slash,
            }),
            range: found.range,
            block: block.is_some(),
        });
    }
    let (tagged, map) = rewriter.finish();

    // Pass 2: fenced code blocks.
    let mut rewriter = Rewriter::new(&tagged, &map);
    for found in fence::scan(&tagged) {
        let region = &tagged[found.range.clone()];
        matches.absorb(region);

        let range = map.original_range(&found.range);
        let opener = &document[map.original_range(&found.opener)];
        let body = &document[map.original_range(&found.body)];
        let token = new_token();
        rewriter.block(&found.range, &tagged[found.range.start..found.range.start + found.indent], &token);
        matches.insert(SavedMatch {
            token,
            original: document[range.clone()].to_owned(),
            kind: MatchKind::FencedCode {
                info: fence::info_string(opener),
                content: fence::strip_indent(body, found.indent),
            },
            range,
            block: true,
        });
    }
    let (fenced, map) = rewriter.finish();

    // Pass 3: inline code and math.
    let mut rewriter = Rewriter::new(&fenced, &map);
    for found in inline::scan(&fenced) {
        matches.absorb(&fenced[found.range.clone()]);

        let range = map.original_range(&found.range);
        let original = &document[range.clone()];
        let token = new_token();
        let block = match found.kind {
            inline::InlineKind::DisplayMath => standalone_lines(&fenced, &found.range),
            inline::InlineKind::InlineMath | inline::InlineKind::Code { .. } => None,
        };
        match &block {
            Some(lines) => rewriter.block(lines, &fenced[lines.start..found.range.start], &token),
            None => rewriter.inline(&found.range, &token),
        }
        matches.insert(SavedMatch {
            token,
            original: original.to_owned(),
            kind: found.kind.into_match_kind(original),
            range,
            block: block.is_some(),
        });
    }
    let (document, _) = rewriter.finish();

    tracing::debug!(regions = matches.len(), "escaped document");
    Escaped { document, matches }
}
