//! Markdown engine seam.

use pulldown_cmark::{Options, Parser, html};

/// Converts escaped Markdown to HTML.
///
/// Placeholder tokens are plain words to the engine and must come out
/// unchanged.
pub trait MarkdownEngine: Send + Sync {
    /// Render `markdown` to HTML.
    fn render(&self, markdown: &str) -> String;
}

/// [`MarkdownEngine`] backed by `pulldown-cmark`.
#[derive(Clone, Copy, Debug)]
pub struct PulldownEngine {
    gfm: bool,
}

impl Default for PulldownEngine {
    fn default() -> Self {
        Self { gfm: true }
    }
}

impl PulldownEngine {
    /// Create an engine with GitHub Flavored Markdown enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable GitHub Flavored Markdown features.
    ///
    /// GFM is enabled by default. When enabled, the parser supports:
    /// - Tables
    /// - Strikethrough (`~~text~~`)
    /// - Task lists (`- [ ] item`)
    /// - Footnotes
    #[must_use]
    pub fn with_gfm(mut self, enabled: bool) -> Self {
        self.gfm = enabled;
        self
    }

    /// Get parser options based on GFM configuration.
    #[must_use]
    pub fn parser_options(&self) -> Options {
        if self.gfm {
            Options::ENABLE_TABLES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS
                | Options::ENABLE_FOOTNOTES
        } else {
            Options::empty()
        }
    }
}

impl MarkdownEngine for PulldownEngine {
    fn render(&self, markdown: &str) -> String {
        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, Parser::new_ext(markdown, self.parser_options()));
        out
    }
}
