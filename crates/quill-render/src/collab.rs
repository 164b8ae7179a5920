//! Collaborator capabilities used by the dispatcher.
//!
//! Code highlighting, math rendering and external compilation are pluggable.
//! The pipeline ships simple defaults; hosts swap in their own through the
//! [`Pipeline`](crate::Pipeline) builders.

use crate::attrs::Attributes;
use crate::html::escape_html;

/// Reassembly hints attached to a processed fragment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnescapeHints {
    /// Strip a `<p>` that wraps nothing but the token.
    pub remove_paragraph: bool,
}

/// Final HTML for one token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessedFragment {
    /// Replacement text.
    pub html: String,
    /// Reassembly hints.
    pub hints: UnescapeHints,
}

impl ProcessedFragment {
    /// Fragment without hints.
    #[must_use]
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            hints: UnescapeHints::default(),
        }
    }

    /// Set the remove-paragraph hint.
    #[must_use]
    pub fn remove_paragraph(mut self, remove: bool) -> Self {
        self.hints.remove_paragraph = remove;
        self
    }
}

/// Options passed to a [`CodeProcessor`].
#[derive(Clone, Copy, Debug)]
pub struct CodeOptions<'a> {
    /// Language identifier, if known.
    pub lang: Option<&'a str>,
    /// Render as an inline code span.
    pub inline: bool,
    /// Merged attributes of the call site.
    pub attributes: &'a Attributes,
}

/// Renders source code.
pub trait CodeProcessor: Send + Sync {
    /// Render `content`.
    fn process(&self, content: &str, options: &CodeOptions<'_>) -> ProcessedFragment;
}

/// Options passed to a [`MathProcessor`].
#[derive(Clone, Copy, Debug)]
pub struct MathOptions<'a> {
    /// Display style (`$$`, or `display` attribute).
    pub display: bool,
    /// The math occupied whole lines in the source.
    pub block: bool,
    /// Merged attributes of the call site.
    pub attributes: &'a Attributes,
}

/// Renders TeX math.
pub trait MathProcessor: Send + Sync {
    /// Render `content`.
    fn process(&self, content: &str, options: &MathOptions<'_>) -> ProcessedFragment;
}

/// Compilation settings resolved from the environment and call site.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Engine override.
    pub engine: Option<String>,
    /// Extra preamble.
    pub preamble: Option<String>,
    /// Document class override.
    pub document_class: Option<String>,
}

/// One unit of work for a [`Compiler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileJob {
    /// Stable identifier: `{tag}-{ref}` or `{tag}-{content hash prefix}`.
    pub component_id: String,
    /// Environment name.
    pub tag: String,
    /// Source after pre-transformers.
    pub source: String,
    /// Compilation settings.
    pub options: CompileOptions,
    /// Merged attributes of the call site.
    pub attributes: Attributes,
}

/// Successful compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledOutput {
    /// Markup embedding the artifact.
    pub html: String,
    /// Artifact key in the compilation cache, if one was stored.
    pub artifact: Option<String>,
}

/// Failed compilation of one job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileFailure {
    /// Job that failed.
    pub component_id: String,
    /// Diagnostic text, usually the tool's stderr.
    pub message: String,
}

/// Runs compile jobs.
///
/// Results are returned in job order. Implementations may compile jobs
/// concurrently; a failing job must not affect the others.
pub trait Compiler: Send + Sync {
    /// Compile every job.
    fn compile_all(&self, jobs: &[CompileJob]) -> Vec<Result<CompiledOutput, CompileFailure>>;
}

/// Default [`CodeProcessor`]: escaped `<pre><code>` markup.
#[derive(Clone, Copy, Debug, Default)]
pub struct HtmlCodeProcessor;

impl CodeProcessor for HtmlCodeProcessor {
    fn process(&self, content: &str, options: &CodeOptions<'_>) -> ProcessedFragment {
        let escaped = escape_html(content);
        if options.inline {
            return ProcessedFragment::new(format!("<code>{escaped}</code>"));
        }
        let html = match options.lang.filter(|lang| !lang.is_empty()) {
            Some(lang) => format!(
                r#"<pre><code class="language-{}">{escaped}</code></pre>"#,
                escape_html(lang)
            ),
            None => format!("<pre><code>{escaped}</code></pre>"),
        };
        ProcessedFragment::new(html).remove_paragraph(true)
    }
}

/// Default [`MathProcessor`]: escaped TeX in `\(..\)` / `\[..\]` delimiters
/// for a client-side renderer.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainMathProcessor;

impl MathProcessor for PlainMathProcessor {
    fn process(&self, content: &str, options: &MathOptions<'_>) -> ProcessedFragment {
        let escaped = escape_html(content.trim());
        match (options.display, options.block) {
            (true, true) => ProcessedFragment::new(format!(
                r#"<div class="math math-display">\[{escaped}\]</div>"#
            ))
            .remove_paragraph(true),
            (true, false) => ProcessedFragment::new(format!(
                r#"<span class="math math-display">\[{escaped}\]</span>"#
            )),
            (false, _) => ProcessedFragment::new(format!(
                r#"<span class="math math-inline">\({escaped}\)</span>"#
            )),
        }
    }
}

/// [`Compiler`] used when no toolchain is configured: every job fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCompiler;

impl Compiler for NullCompiler {
    fn compile_all(&self, jobs: &[CompileJob]) -> Vec<Result<CompiledOutput, CompileFailure>> {
        jobs.iter()
            .map(|job| {
                Err(CompileFailure {
                    component_id: job.component_id.clone(),
                    message: "no compiler configured".to_owned(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_code_block_with_lang() {
        let attrs = Attributes::new();
        let fragment = HtmlCodeProcessor.process(
            "a < b",
            &CodeOptions {
                lang: Some("rust"),
                inline: false,
                attributes: &attrs,
            },
        );

        assert_eq!(
            fragment.html,
            r#"<pre><code class="language-rust">a &lt; b</code></pre>"#
        );
        assert!(fragment.hints.remove_paragraph);
    }

    #[test]
    fn test_code_inline() {
        let attrs = Attributes::new();
        let fragment = HtmlCodeProcessor.process(
            "x & y",
            &CodeOptions {
                lang: Some("rust"),
                inline: true,
                attributes: &attrs,
            },
        );

        assert_eq!(fragment.html, "<code>x &amp; y</code>");
        assert!(!fragment.hints.remove_paragraph);
    }

    #[test]
    fn test_code_block_without_lang() {
        let attrs = Attributes::new();
        let fragment = HtmlCodeProcessor.process(
            "plain\n",
            &CodeOptions {
                lang: Some(""),
                inline: false,
                attributes: &attrs,
            },
        );

        assert_eq!(fragment.html, "<pre><code>plain\n</code></pre>");
    }

    #[test]
    fn test_math_variants() {
        let attrs = Attributes::new();
        let render = |display, block| {
            PlainMathProcessor
                .process(
                    "a<b",
                    &MathOptions {
                        display,
                        block,
                        attributes: &attrs,
                    },
                )
                .html
        };

        assert_eq!(
            render(false, false),
            r#"<span class="math math-inline">\(a&lt;b\)</span>"#
        );
        assert_eq!(
            render(true, false),
            r#"<span class="math math-display">\[a&lt;b\]</span>"#
        );
        assert_eq!(
            render(true, true),
            r#"<div class="math math-display">\[a&lt;b\]</div>"#
        );
    }

    #[test]
    fn test_null_compiler_fails_every_job() {
        let job = CompileJob {
            component_id: "tikz-1".to_owned(),
            tag: "tikz".to_owned(),
            source: "x".to_owned(),
            options: CompileOptions::default(),
            attributes: Attributes::new(),
        };

        let results = NullCompiler.compile_all(&[job.clone(), job]);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Result::is_err));
    }
}
