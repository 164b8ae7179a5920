//! Inline code and math lexer.
//!
//! One left-to-right scan so that whichever construct opens first wins:
//! a `$` inside a code span is code, a backtick inside math is math. No
//! construct crosses a blank line.
//!
//! Inline math follows the usual TeX-in-Markdown convention: the opening `$`
//! must be followed by a non-space character, the closing `$` must follow a
//! non-space character and must not be followed by a digit, so prices like
//! `$5 and $10` stay text.

use std::ops::Range;

use super::MatchKind;

/// Category of an inline region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum InlineKind {
    /// Backtick code span delimited by `ticks` backticks.
    Code { ticks: usize },
    DisplayMath,
    InlineMath,
}

impl InlineKind {
    /// Build the saved match kind from the region's original text.
    pub(super) fn into_match_kind(self, original: &str) -> MatchKind {
        match self {
            Self::Code { ticks } => MatchKind::InlineCode {
                content: code_content(&original[ticks..original.len() - ticks]),
            },
            Self::DisplayMath => MatchKind::DisplayMath {
                content: original[2..original.len() - 2].to_owned(),
            },
            Self::InlineMath => MatchKind::InlineMath {
                content: original[1..original.len() - 1].to_owned(),
            },
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(super) struct InlineMatch {
    pub range: Range<usize>,
    pub kind: InlineKind,
}

/// Code span content: line endings become spaces and one surrounding space
/// is stripped when both ends have one and the content is not all spaces.
fn code_content(raw: &str) -> String {
    let content = raw.replace("\r\n", " ").replace('\n', " ");
    if content.len() >= 2
        && content.starts_with(' ')
        && content.ends_with(' ')
        && !content.bytes().all(|b| b == b' ')
    {
        content[1..content.len() - 1].to_owned()
    } else {
        content
    }
}

/// Whether a blank line starts at the newline at `i`.
fn blank_line_at(bytes: &[u8], i: usize) -> bool {
    if bytes[i] != b'\n' {
        return false;
    }
    let mut j = i + 1;
    while j < bytes.len() && matches!(bytes[j], b' ' | b'\t' | b'\r') {
        j += 1;
    }
    j < bytes.len() && bytes[j] == b'\n'
}

fn run_len(bytes: &[u8], from: usize, byte: u8) -> usize {
    bytes[from..].iter().take_while(|b| **b == byte).count()
}

/// Start of a backtick run of exactly `ticks`.
fn find_code_close(bytes: &[u8], from: usize, ticks: usize) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() {
        if blank_line_at(bytes, j) {
            return None;
        }
        if bytes[j] == b'`' {
            let run = run_len(bytes, j, b'`');
            if run == ticks {
                return Some(j);
            }
            j += run;
        } else {
            j += 1;
        }
    }
    None
}

/// Start of the closing `$$`; empty display math is not math.
fn find_display_close(bytes: &[u8], from: usize) -> Option<usize> {
    let mut j = from;
    while j + 1 < bytes.len() {
        if blank_line_at(bytes, j) {
            return None;
        }
        match bytes[j] {
            b'\\' => j += 2,
            b'$' if bytes[j + 1] == b'$' => return (j > from).then_some(j),
            _ => j += 1,
        }
    }
    None
}

fn opens_inline_math(bytes: &[u8], i: usize) -> bool {
    bytes
        .get(i + 1)
        .is_some_and(|b| !b.is_ascii_whitespace() && *b != b'$')
}

/// Position of the closing `$`.
fn find_inline_close(bytes: &[u8], from: usize) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() {
        if blank_line_at(bytes, j) {
            return None;
        }
        match bytes[j] {
            b'\\' => j += 2,
            b'$' if bytes.get(j + 1) == Some(&b'$') => j += 2,
            b'$' => {
                let after_space = bytes[j - 1].is_ascii_whitespace();
                let before_digit = bytes.get(j + 1).is_some_and(u8::is_ascii_digit);
                if !after_space && !before_digit {
                    return Some(j);
                }
                j += 1;
            }
            _ => j += 1,
        }
    }
    None
}

/// Find inline code and math regions in `text`, in order.
pub(super) fn scan(text: &str) -> Vec<InlineMatch> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let escapes = bytes
                    .get(i + 1)
                    .is_some_and(|&b| matches!(b, b'`' | b'$' | b'\\'));
                i += if escapes { 2 } else { 1 };
            }
            b'`' => {
                let ticks = run_len(bytes, i, b'`');
                if let Some(close) = find_code_close(bytes, i + ticks, ticks) {
                    found.push(InlineMatch {
                        range: i..close + ticks,
                        kind: InlineKind::Code { ticks },
                    });
                    i = close + ticks;
                } else {
                    i += ticks;
                }
            }
            b'$' if bytes.get(i + 1) == Some(&b'$') => {
                if let Some(close) = find_display_close(bytes, i + 2) {
                    found.push(InlineMatch {
                        range: i..close + 2,
                        kind: InlineKind::DisplayMath,
                    });
                    i = close + 2;
                } else {
                    i += 2;
                }
            }
            b'$' => {
                if opens_inline_math(bytes, i)
                    && let Some(close) = find_inline_close(bytes, i + 1)
                {
                    found.push(InlineMatch {
                        range: i..close + 1,
                        kind: InlineKind::InlineMath,
                    });
                    i = close + 1;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    found
}
