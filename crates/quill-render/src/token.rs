//! Placeholder tokens.
//!
//! A token is `QUILL` followed by 32 lowercase hex digits. Tokens are plain
//! alphanumeric words, so a Markdown engine passes them through as text, and
//! their fixed length means no token is a prefix or suffix of another.

use uuid::Uuid;

/// Fixed prefix of every token.
pub const TOKEN_PREFIX: &str = "QUILL";

/// Number of hex digits after the prefix.
const TOKEN_HEX_LEN: usize = 32;

/// Total token length in bytes.
pub const TOKEN_LEN: usize = TOKEN_PREFIX.len() + TOKEN_HEX_LEN;

/// Generate a fresh random token.
pub(crate) fn new_token() -> String {
    format!("{TOKEN_PREFIX}{}", Uuid::new_v4().simple())
}

/// Whether `text` starts with something shaped like a token.
pub(crate) fn token_at(text: &str) -> Option<&str> {
    let candidate = text.get(..TOKEN_LEN)?;
    let hex = candidate.strip_prefix(TOKEN_PREFIX)?;
    hex.bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        .then_some(candidate)
}

/// Iterate over `(offset, token)` for every token-shaped string in `text`.
pub(crate) fn find_tokens(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        while let Some(found) = text[pos..].find(TOKEN_PREFIX) {
            let start = pos + found;
            if let Some(token) = token_at(&text[start..]) {
                pos = start + TOKEN_LEN;
                return Some((start, token));
            }
            pos = start + 1;
        }
        pos = text.len();
        None
    })
}
