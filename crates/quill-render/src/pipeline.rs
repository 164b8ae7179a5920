//! Render pipeline.
//!
//! Wires the stages together: escape, dispatch every saved region (compile
//! jobs as one batch), normalize spacing, run the Markdown engine, and put
//! the processed fragments back.
//!
//! # Example
//!
//! ```
//! use quill_render::{CollectingSink, EnvironmentDescriptor, Pipeline, Registry};
//!
//! let registry = Registry::from_descriptors(
//!     vec![EnvironmentDescriptor::escape("Verbatim")],
//!     &CollectingSink::new(),
//! );
//! let output = Pipeline::new(registry)
//!     .render("Say <Verbatim>{hi}</Verbatim> and $x$.")
//!     .unwrap();
//!
//! assert_eq!(
//!     output.html,
//!     "<p>Say <Verbatim>&lbrace;hi&rbrace;</Verbatim> and <span class=\"math math-inline\">\\(x\\)</span>.</p>\n"
//! );
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::attrs::{Attributes, parse_fence_info};
use crate::collab::{
    CodeOptions, CodeProcessor, Compiler, HtmlCodeProcessor, MathOptions, MathProcessor,
    NullCompiler, PlainMathProcessor, ProcessedFragment,
};
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::dispatch::{CompiledComponent, Dispatched, Dispatcher, Region};
use crate::error::RenderError;
use crate::escape::{MatchKind, SavedMatch, escape};
use crate::markdown::{MarkdownEngine, PulldownEngine};
use crate::registry::Registry;
use crate::spacing::{SpacingRules, adjust_spacing};
use crate::unescape::unescape;

/// Result of rendering one document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderOutput {
    /// Final HTML.
    pub html: String,
    /// Artifacts the document's compile-kind regions reference.
    pub compiled: Vec<CompiledComponent>,
}

/// Composition root of the render stages.
pub struct Pipeline {
    registry: Registry,
    code: Arc<dyn CodeProcessor>,
    math: Arc<dyn MathProcessor>,
    compiler: Arc<dyn Compiler>,
    markdown: Arc<dyn MarkdownEngine>,
    spacing: SpacingRules,
    sink: Arc<dyn DiagnosticSink>,
}

/// How a saved region becomes a fragment.
enum Route<'a> {
    /// Through a verbatim environment.
    Dispatch(Region<'a>),
    /// Rendered directly by a collaborator.
    Direct(ProcessedFragment),
}

impl Pipeline {
    /// Create a pipeline with the default collaborators.
    ///
    /// Compile-kind regions fail until a compiler is set with
    /// [`with_compiler`](Self::with_compiler).
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            code: Arc::new(HtmlCodeProcessor),
            math: Arc::new(PlainMathProcessor),
            compiler: Arc::new(NullCompiler),
            markdown: Arc::new(PulldownEngine::new()),
            spacing: SpacingRules::default(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Set the code collaborator.
    #[must_use]
    pub fn with_code_processor(mut self, code: Arc<dyn CodeProcessor>) -> Self {
        self.code = code;
        self
    }

    /// Set the math collaborator.
    #[must_use]
    pub fn with_math_processor(mut self, math: Arc<dyn MathProcessor>) -> Self {
        self.math = math;
        self
    }

    /// Set the compiler for compile-kind environments.
    #[must_use]
    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Set the Markdown engine.
    #[must_use]
    pub fn with_markdown(mut self, markdown: Arc<dyn MarkdownEngine>) -> Self {
        self.markdown = markdown;
        self
    }

    /// Set the spacing rules (user components).
    #[must_use]
    pub fn with_spacing(mut self, spacing: SpacingRules) -> Self {
        self.spacing = spacing;
        self
    }

    /// Set the sink receiving recoverable problems.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The registry regions are dispatched through.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render `document` to HTML.
    ///
    /// Recoverable problems (unterminated tags, failed compilations) go to
    /// the sink and the document still renders.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] only when a pipeline invariant breaks, for
    /// example when the Markdown engine drops a placeholder.
    pub fn render(&self, document: &str) -> Result<RenderOutput, RenderError> {
        let escaped = escape(document, &self.registry, self.sink.as_ref());

        // `None` marks a fragment the dispatcher will produce, in order.
        let mut regions = Vec::new();
        let mut direct: Vec<(&str, Option<ProcessedFragment>)> =
            Vec::with_capacity(escaped.matches.len());
        for saved in escaped.matches.iter() {
            let fragment = match self.route(saved) {
                Route::Dispatch(region) => {
                    regions.push(region);
                    None
                }
                Route::Direct(fragment) => Some(fragment),
            };
            direct.push((saved.token.as_str(), fragment));
        }

        let dispatcher = Dispatcher::new(
            &self.registry,
            self.code.as_ref(),
            self.math.as_ref(),
            self.compiler.as_ref(),
            self.sink.as_ref(),
        );
        let Dispatched {
            fragments: dispatched,
            compiled,
        } = dispatcher.process_all(&regions)?;

        let mut dispatched = dispatched.into_iter();
        let fragments: HashMap<String, ProcessedFragment> = direct
            .into_iter()
            .map(|(token, fragment)| {
                let fragment = fragment.unwrap_or_else(|| dispatched.next().unwrap_or_default());
                (token.to_owned(), fragment)
            })
            .collect();

        let spaced = adjust_spacing(&escaped.document, &self.spacing);
        let html = self.markdown.render(&spaced);
        let html = unescape(&html, &fragments)?;

        tracing::debug!(
            regions = fragments.len(),
            compiled = compiled.len(),
            "rendered document"
        );
        Ok(RenderOutput { html, compiled })
    }

    /// Route a saved region: a [`Region`] for the dispatcher, or the
    /// finished fragment when no environment is involved.
    fn route<'a>(&self, saved: &'a SavedMatch) -> Route<'a> {
        let no_attributes = Attributes::new();
        match &saved.kind {
            MatchKind::Verbatim(tag) => Route::Dispatch(Region {
                tag: &tag.tag,
                attributes: tag.attributes.clone(),
                inner: &tag.inner,
                self_closing: tag.self_closing,
                space_before_slash: tag.space_before_slash,
                outer: &saved.original,
                block: saved.block,
            }),
            MatchKind::FencedCode { info, content } => {
                let (lang, attributes) = parse_fence_info(info);
                if !lang.is_empty() && self.registry.resolve(lang).is_some() {
                    return Route::Dispatch(Region {
                        tag: lang,
                        attributes,
                        inner: content,
                        self_closing: false,
                        space_before_slash: false,
                        outer: &saved.original,
                        block: true,
                    });
                }
                Route::Direct(self.code.process(
                    content,
                    &CodeOptions {
                        lang: Some(lang).filter(|lang| !lang.is_empty()),
                        inline: false,
                        attributes: &attributes,
                    },
                ))
            }
            MatchKind::InlineCode { content } => Route::Direct(self.code.process(
                content,
                &CodeOptions {
                    lang: None,
                    inline: true,
                    attributes: &no_attributes,
                },
            )),
            MatchKind::DisplayMath { content } => Route::Direct(self.math.process(
                content,
                &MathOptions {
                    display: true,
                    block: saved.block,
                    attributes: &no_attributes,
                },
            )),
            MatchKind::InlineMath { content } => Route::Direct(self.math.process(
                content,
                &MathOptions {
                    display: false,
                    block: false,
                    attributes: &no_attributes,
                },
            )),
        }
    }
}
