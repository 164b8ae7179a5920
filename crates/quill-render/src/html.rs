//! HTML text helpers shared by the dispatcher and default collaborators.

/// Escape special HTML characters.
///
/// # Example
///
/// ```
/// use quill_render::escape_html;
///
/// assert_eq!(escape_html("<a href=\"x\">"), "&lt;a href=&quot;x&quot;&gt;");
/// ```
#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

/// Replace curly braces with their named entities.
///
/// Run after [`escape_html`]: the entities introduced here contain `&`,
/// which must not be escaped again.
///
/// # Example
///
/// ```
/// use quill_render::{escape_braces, escape_html};
///
/// assert_eq!(escape_braces(&escape_html("{a & b}")), "&lbrace;a &amp; b&rbrace;");
/// ```
#[must_use]
pub fn escape_braces(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '{' => result.push_str("&lbrace;"),
            '}' => result.push_str("&rbrace;"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape an attribute value for a double-quoted attribute.
///
/// Values are kept as written in the source, so existing entities are not
/// re-escaped; only the quote that would end the value is.
pub(crate) fn escape_attr(s: &str) -> String {
    s.replace('"', "&quot;")
}
