//! Verbatim tag scanner.
//!
//! Only tags resolving to a registered environment are matched. Tag names
//! are case-sensitive and a closing tag may use any name of the same
//! environment. Nested tags of one environment are depth-counted so the
//! outermost pair wins.

use std::ops::Range;
use std::sync::Arc;

use crate::diagnostics::{DiagnosticSink, Problem, ProblemKind};
use crate::registry::{EnvironmentDescriptor, Registry};

/// A matched verbatim tag.
#[derive(Debug)]
pub(super) struct TagMatch {
    /// Opening `<` through closing `>`.
    pub range: Range<usize>,
    pub name: Range<usize>,
    /// Between the name and `>` or `/>`.
    pub attributes: Range<usize>,
    pub inner: Range<usize>,
    pub self_closing: bool,
    pub space_before_slash: bool,
}

#[derive(Debug)]
struct OpenTag {
    name: Range<usize>,
    attributes: Range<usize>,
    /// Past the `>`.
    end: usize,
    self_closing: bool,
    space_before_slash: bool,
}

enum Opening {
    NotATag,
    /// Name parsed but no `>` before end of input.
    Unclosed(Range<usize>),
    Tag(OpenTag),
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.')
}

/// Parse the name following `<` or `</` at `from`.
fn parse_name(bytes: &[u8], from: usize) -> Option<Range<usize>> {
    if !bytes.get(from).copied().is_some_and(is_name_start) {
        return None;
    }
    let mut end = from + 1;
    while end < bytes.len() && is_name_char(bytes[end]) {
        end += 1;
    }
    Some(from..end)
}

/// Parse an opening tag starting at the `<` at `start`.
fn parse_open(text: &str, start: usize) -> Opening {
    let bytes = text.as_bytes();
    let Some(name) = parse_name(bytes, start + 1) else {
        return Opening::NotATag;
    };
    match bytes.get(name.end) {
        Some(&b) if b.is_ascii_whitespace() || matches!(b, b'>' | b'/') => {}
        _ => return Opening::NotATag,
    }

    // Quotes only count in value position, so a stray apostrophe in
    // prose-like attributes does not swallow the rest of the document.
    let mut quote: Option<u8> = None;
    let mut last_significant = 0u8;
    let mut i = name.end;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
                last_significant = b;
            }
        } else if matches!(b, b'"' | b'\'') && last_significant == b'=' {
            quote = Some(b);
        } else if b == b'>' {
            let self_closing = last_significant == b'/';
            let (attributes_end, space_before_slash) = if self_closing {
                let slash = text[..i].trim_end().len() - 1;
                let space = slash > name.end && bytes[slash - 1].is_ascii_whitespace();
                (slash, space)
            } else {
                (i, false)
            };
            return Opening::Tag(OpenTag {
                attributes: name.end..attributes_end,
                name,
                end: i + 1,
                self_closing,
                space_before_slash,
            });
        } else if !b.is_ascii_whitespace() {
            last_significant = b;
        }
        i += 1;
    }
    Opening::Unclosed(name)
}

/// Parse `</name>` at `start`; returns the name and the position past `>`.
fn parse_close(text: &str, start: usize) -> Option<(Range<usize>, usize)> {
    let bytes = text.as_bytes();
    let name = parse_name(bytes, start + 2)?;
    let mut i = name.end;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    (bytes.get(i) == Some(&b'>')).then_some((name, i + 1))
}

/// Find the closing tag of `env` opened before `from`.
///
/// Returns the start of the closing tag and the position past it.
fn find_close(
    text: &str,
    from: usize,
    env: &Arc<EnvironmentDescriptor>,
    registry: &Registry,
) -> Option<(usize, usize)> {
    let same_env = |name: &str| registry.resolve(name).is_some_and(|e| Arc::ptr_eq(e, env));
    let mut depth = 1usize;
    let mut i = from;

    while let Some(offset) = text[i..].find('<') {
        let start = i + offset;
        if text[start + 1..].starts_with('/') {
            if let Some((name, end)) = parse_close(text, start)
                && same_env(&text[name])
            {
                depth -= 1;
                if depth == 0 {
                    return Some((start, end));
                }
                i = end;
                continue;
            }
        } else if let Opening::Tag(open) = parse_open(text, start)
            && same_env(&text[open.name.clone()])
        {
            if !open.self_closing {
                depth += 1;
            }
            i = open.end;
            continue;
        }
        i = start + 1;
    }
    None
}

fn line_of(text: &str, pos: usize) -> usize {
    text[..pos].matches('\n').count() + 1
}

/// Scan `text` for outermost verbatim tags, in document order.
pub(super) fn scan(text: &str, registry: &Registry, sink: &dyn DiagnosticSink) -> Vec<TagMatch> {
    let mut found = Vec::new();
    if registry.is_empty() {
        return found;
    }

    let mut i = 0;
    while let Some(offset) = text[i..].find('<') {
        let start = i + offset;
        i = start + 1;

        let open = match parse_open(text, start) {
            Opening::NotATag => continue,
            Opening::Unclosed(name) => {
                let name = &text[name];
                if registry.resolve(name).is_some() {
                    sink.report(Problem::warning(
                        ProblemKind::Escape,
                        format!(
                            "opening tag <{name} on line {} is never closed with `>`; left as text",
                            line_of(text, start)
                        ),
                    ));
                }
                continue;
            }
            Opening::Tag(open) => open,
        };
        let Some(env) = registry.resolve(&text[open.name.clone()]) else {
            continue;
        };

        if open.self_closing {
            found.push(TagMatch {
                range: start..open.end,
                name: open.name,
                attributes: open.attributes,
                inner: open.end..open.end,
                self_closing: true,
                space_before_slash: open.space_before_slash,
            });
            i = open.end;
            continue;
        }

        match find_close(text, open.end, env, registry) {
            Some((close_start, close_end)) => {
                found.push(TagMatch {
                    range: start..close_end,
                    name: open.name,
                    attributes: open.attributes,
                    inner: open.end..close_start,
                    self_closing: false,
                    space_before_slash: false,
                });
                i = close_end;
            }
            None => {
                sink.report(Problem::warning(
                    ProblemKind::Escape,
                    format!(
                        "<{}> on line {} has no closing tag; left as text",
                        &text[open.name.clone()],
                        line_of(text, start)
                    ),
                ));
                i = open.end;
            }
        }
    }

    found
}
