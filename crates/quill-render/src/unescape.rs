//! Token reassembly.

use std::collections::{HashMap, HashSet};

use crate::collab::ProcessedFragment;
use crate::error::RenderError;
use crate::token::{TOKEN_LEN, find_tokens};

const P_OPEN: &str = "<p>";
const P_CLOSE: &str = "</p>";

/// Replace every token in `html` with its fragment.
///
/// Substitution is a single pass over the input, so fragment text is never
/// rescanned. A `<p>` wrapping nothing but a token is dropped when the
/// fragment asks for it.
///
/// # Errors
///
/// Any disagreement between `html` and `fragments` is an internal
/// consistency failure: a token with no fragment
/// ([`RenderError::UnknownToken`]), a token appearing twice
/// ([`RenderError::DuplicateToken`]), or a fragment whose token is gone
/// ([`RenderError::MissingToken`]).
pub fn unescape(
    html: &str,
    fragments: &HashMap<String, ProcessedFragment>,
) -> Result<String, RenderError> {
    let mut out = String::with_capacity(html.len());
    let mut seen: HashSet<&str> = HashSet::with_capacity(fragments.len());
    let mut copied = 0;

    for (pos, token) in find_tokens(html) {
        let fragment = fragments
            .get(token)
            .ok_or_else(|| RenderError::UnknownToken(token.to_owned()))?;
        if !seen.insert(token) {
            return Err(RenderError::DuplicateToken(token.to_owned()));
        }

        let mut start = pos;
        let mut end = pos + TOKEN_LEN;
        if fragment.hints.remove_paragraph
            && html[copied..start].ends_with(P_OPEN)
            && html[end..].starts_with(P_CLOSE)
        {
            start -= P_OPEN.len();
            end += P_CLOSE.len();
        }

        out.push_str(&html[copied..start]);
        out.push_str(&fragment.html);
        copied = end;
    }
    out.push_str(&html[copied..]);

    if seen.len() != fragments.len() {
        let mut missing: Vec<&String> = fragments
            .keys()
            .filter(|token| !seen.contains(token.as_str()))
            .collect();
        missing.sort();
        if let Some(token) = missing.first() {
            return Err(RenderError::MissingToken((*token).clone()));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::new_token;
    use pretty_assertions::assert_eq;

    fn table(entries: &[(&str, ProcessedFragment)]) -> HashMap<String, ProcessedFragment> {
        entries
            .iter()
            .map(|(token, fragment)| ((*token).to_owned(), fragment.clone()))
            .collect()
    }

    #[test]
    fn test_replaces_tokens() {
        let a = new_token();
        let b = new_token();
        let html = format!("<p>x {a} y {b}</p>\n");
        let fragments = table(&[
            (a.as_str(), ProcessedFragment::new("<code>1</code>")),
            (b.as_str(), ProcessedFragment::new("<em>2</em>")),
        ]);

        assert_eq!(
            unescape(&html, &fragments).unwrap(),
            "<p>x <code>1</code> y <em>2</em></p>\n"
        );
    }

    #[test]
    fn test_removes_sole_paragraph_only_when_asked() {
        let a = new_token();
        let b = new_token();
        let html = format!("<p>{a}</p>\n<p>{b}</p>\n");
        let fragments = table(&[
            (a.as_str(), ProcessedFragment::new("<pre>a</pre>").remove_paragraph(true)),
            (b.as_str(), ProcessedFragment::new("<span>b</span>")),
        ]);

        assert_eq!(
            unescape(&html, &fragments).unwrap(),
            "<pre>a</pre>\n<p><span>b</span></p>\n"
        );
    }

    #[test]
    fn test_paragraph_with_text_is_kept() {
        let a = new_token();
        let html = format!("<p>see {a}</p>");
        let fragments = table(&[(a.as_str(), ProcessedFragment::new("<div/>").remove_paragraph(true))]);

        assert_eq!(unescape(&html, &fragments).unwrap(), "<p>see <div/></p>");
    }

    #[test]
    fn test_fragment_text_is_not_rescanned() {
        let a = new_token();
        let b = new_token();
        let html = a.clone();
        // The fragment happens to contain another token-shaped string.
        let fragments = table(&[(a.as_str(), ProcessedFragment::new(b.clone()))]);

        assert_eq!(unescape(&html, &fragments).unwrap(), b);
    }

    #[test]
    fn test_unknown_token_is_fatal() {
        let html = format!("<p>{}</p>", new_token());
        let err = unescape(&html, &HashMap::new()).unwrap_err();
        assert!(matches!(err, RenderError::UnknownToken(_)));
    }

    #[test]
    fn test_duplicate_token_is_fatal() {
        let a = new_token();
        let html = format!("{a} {a}");
        let fragments = table(&[(a.as_str(), ProcessedFragment::new("x"))]);

        let err = unescape(&html, &fragments).unwrap_err();
        assert!(matches!(err, RenderError::DuplicateToken(t) if t == a));
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let a = new_token();
        let fragments = table(&[(a.as_str(), ProcessedFragment::new("x"))]);

        let err = unescape("<p>lost</p>", &fragments).unwrap_err();
        assert!(matches!(err, RenderError::MissingToken(t) if t == a));
    }

    #[test]
    fn test_no_tokens_is_identity() {
        assert_eq!(unescape("<p>plain</p>", &HashMap::new()).unwrap(), "<p>plain</p>");
    }
}
