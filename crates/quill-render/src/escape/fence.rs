//! Fenced code block detection.
//!
//! Fences use backticks or tildes (three or more). The closing fence must
//! use the same character and be at least as long as the opening fence. A
//! fence that is never closed runs to the end of the document.

use std::ops::Range;

/// Tracks code fence state during line-by-line processing.
#[derive(Debug, Default)]
struct FenceTracker {
    /// Character used for the current fence (backtick or tilde).
    fence_char: Option<char>,
    /// Length of the opening fence (minimum length for closing).
    fence_len: usize,
}

impl FenceTracker {
    fn in_fence(&self) -> bool {
        self.fence_char.is_some()
    }

    /// Update fence state based on a line.
    ///
    /// Returns `true` if the line is a fence marker (opening or closing).
    fn update(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();

        if let Some(fence_char) = self.fence_char {
            if is_fence_line(trimmed, fence_char, self.fence_len) {
                self.fence_char = None;
                self.fence_len = 0;
                return true;
            }
            false
        } else {
            if let Some((ch, len)) = detect_fence(trimmed) {
                self.fence_char = Some(ch);
                self.fence_len = len;
                return true;
            }
            false
        }
    }
}

/// Detect if a line starts a code fence.
///
/// Returns the fence character and length if found.
fn detect_fence(trimmed: &str) -> Option<(char, usize)> {
    let first = trimmed.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }

    let count = trimmed.chars().take_while(|&c| c == first).count();
    // A backtick info string cannot contain backticks: "```a```" is a code span.
    if count < 3 || (first == '`' && trimmed[count..].contains('`')) {
        return None;
    }
    Some((first, count))
}

/// Check if a line is a valid closing fence.
///
/// The closing fence must:
/// - Use the same character as opening
/// - Be at least as long as opening
/// - Contain only fence characters (optionally followed by whitespace)
fn is_fence_line(trimmed: &str, expected_char: char, min_len: usize) -> bool {
    let first = match trimmed.chars().next() {
        Some(c) if c == expected_char => c,
        _ => return false,
    };

    let count = trimmed.chars().take_while(|&c| c == first).count();
    if count < min_len {
        return false;
    }

    trimmed[count..].chars().all(char::is_whitespace)
}

/// A fenced block found in the text being scanned.
#[derive(Debug, PartialEq, Eq)]
pub(super) struct FenceMatch {
    /// Opening line start through the closing line's newline.
    pub range: Range<usize>,
    /// The opening line without its newline.
    pub opener: Range<usize>,
    /// Lines between the fences.
    pub body: Range<usize>,
    /// Leading whitespace width of the opening line.
    pub indent: usize,
}

/// Find every fenced block in `text`.
pub(super) fn scan(text: &str) -> Vec<FenceMatch> {
    let mut found = Vec::new();
    let mut tracker = FenceTracker::default();
    let mut open: Option<(usize, usize, usize)> = None;
    let mut pos = 0;

    for line in text.split_inclusive('\n') {
        let start = pos;
        pos += line.len();

        if !tracker.update(line) {
            continue;
        }
        if tracker.in_fence() {
            let content = line.trim_end_matches(['\n', '\r']);
            let indent = line.len() - line.trim_start().len();
            open = Some((start, start + content.len(), indent));
        } else if let Some((open_start, opener_end, indent)) = open.take() {
            found.push(FenceMatch {
                range: open_start..pos,
                opener: open_start..opener_end,
                body: body_start(text, opener_end)..start,
                indent,
            });
        }
    }

    if let Some((open_start, opener_end, indent)) = open {
        found.push(FenceMatch {
            range: open_start..text.len(),
            opener: open_start..opener_end,
            body: body_start(text, opener_end)..text.len(),
            indent,
        });
    }

    found
}

/// Position after the newline ending the opening line.
fn body_start(text: &str, opener_end: usize) -> usize {
    text[opener_end..]
        .find('\n')
        .map_or(text.len(), |p| opener_end + p + 1)
}

/// Info string of an opening fence line.
pub(super) fn info_string(opener: &str) -> String {
    let trimmed = opener.trim_start();
    trimmed
        .trim_start_matches(['`', '~'])
        .trim()
        .to_owned()
}

/// Remove up to `indent` leading spaces from every line of `body`.
pub(super) fn strip_indent(body: &str, indent: usize) -> String {
    if indent == 0 {
        return body.to_owned();
    }
    body.split_inclusive('\n')
        .map(|line| {
            let spaces = line
                .bytes()
                .take(indent)
                .take_while(|b| *b == b' ' || *b == b'\t')
                .count();
            &line[spaces..]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_backtick_fence() {
        let mut tracker = FenceTracker::default();

        assert!(tracker.update("```rust"));
        assert!(tracker.in_fence());

        assert!(!tracker.update("fn main() {}"));
        assert!(tracker.in_fence());

        assert!(tracker.update("```"));
        assert!(!tracker.in_fence());
    }

    #[test]
    fn test_shorter_fence_not_closing() {
        let mut tracker = FenceTracker::default();

        assert!(tracker.update("````"));
        assert!(!tracker.update("```"));
        assert!(tracker.in_fence());
        assert!(tracker.update("`````"));
        assert!(!tracker.in_fence());
    }

    #[test]
    fn test_mixed_fence_chars() {
        let mut tracker = FenceTracker::default();

        assert!(tracker.update("```"));
        assert!(!tracker.update("~~~"));
        assert!(tracker.in_fence());
    }

    #[test]
    fn test_closing_fence_with_info_is_content() {
        let mut tracker = FenceTracker::default();

        assert!(tracker.update("```"));
        assert!(!tracker.update("```rust"));
        assert!(tracker.in_fence());
    }

    #[test]
    fn test_one_line_code_span_not_fence() {
        assert_eq!(detect_fence("```inline```"), None);
        assert_eq!(detect_fence("``inline``"), None);
        assert_eq!(detect_fence("~~~ a`b"), Some(('~', 3)));
    }

    #[test]
    fn test_scan_ranges() {
        let text = "a\n```py\nprint(1)\n```\nb\n";
        let found = scan(text);

        assert_eq!(found.len(), 1);
        let fence = &found[0];
        assert_eq!(&text[fence.range.clone()], "```py\nprint(1)\n```\n");
        assert_eq!(&text[fence.opener.clone()], "```py");
        assert_eq!(&text[fence.body.clone()], "print(1)\n");
        assert_eq!(fence.indent, 0);
    }

    #[test]
    fn test_scan_unterminated() {
        let text = "~~~\nrest";
        let found = scan(text);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].range, 0..text.len());
        assert_eq!(&text[found[0].body.clone()], "rest");
    }

    #[test]
    fn test_scan_empty_body_at_end() {
        let text = "```";
        let found = scan(text);

        assert_eq!(found[0].body, 3..3);
    }

    #[test]
    fn test_info_string() {
        assert_eq!(info_string("  ```  rust title=x "), "rust title=x");
        assert_eq!(info_string("~~~~"), "");
    }

    #[test]
    fn test_strip_indent() {
        assert_eq!(strip_indent("    a\n  b\nc\n", 2), "  a\nb\nc\n");
    }
}
