//! Markdown rendering with verbatim environments.
//!
//! Some regions of a Markdown document must never be seen by the Markdown
//! engine: code, math, and user-defined verbatim tags such as
//! `<Verbatim>...</Verbatim>`. This crate renders such documents in three
//! steps:
//!
//! 1. [`escape`] cuts every protected region out and leaves an opaque
//!    placeholder token in its place.
//! 2. Each region is processed on its own. Verbatim tags go through the
//!    [`Dispatcher`] according to their [`EnvironmentDescriptor`]; code and
//!    math go to the [`CodeProcessor`] and [`MathProcessor`] collaborators.
//! 3. After the [`MarkdownEngine`] has run, [`unescape`] swaps every token
//!    for its processed fragment.
//!
//! [`Pipeline`] wires the stages together and is the usual entry point.
//!
//! # Example
//!
//! ```
//! use quill_render::{CollectingSink, EnvironmentDescriptor, Pipeline, Registry};
//!
//! let sink = CollectingSink::new();
//! let registry = Registry::from_descriptors(vec![EnvironmentDescriptor::escape("Verbatim")], &sink);
//! let output = Pipeline::new(registry).render("**bold** `code`").unwrap();
//!
//! assert_eq!(output.html, "<p><strong>bold</strong> <code>code</code></p>\n");
//! ```

mod attrs;
mod collab;
mod diagnostics;
mod dispatch;
mod error;
mod escape;
mod html;
mod markdown;
mod pipeline;
mod registry;
mod spacing;
mod token;
mod unescape;

pub use attrs::{AttrValue, AttributeAllowlist, Attributes};
pub use collab::{
    CodeOptions, CodeProcessor, CompileFailure, CompileJob, CompileOptions, CompiledOutput,
    Compiler, HtmlCodeProcessor, MathOptions, MathProcessor, NullCompiler, PlainMathProcessor,
    ProcessedFragment, UnescapeHints,
};
pub use diagnostics::{CollectingSink, DiagnosticSink, Problem, ProblemKind, Severity, TracingSink};
pub use dispatch::{CompiledComponent, Dispatched, Dispatcher, Region};
pub use error::RenderError;
pub use escape::{Escaped, MatchKind, SavedMatch, SavedMatches, VerbatimTag, escape};
pub use html::{escape_braces, escape_html};
pub use markdown::{MarkdownEngine, PulldownEngine};
pub use pipeline::{Pipeline, RenderOutput};
pub use registry::{
    Component, EnvironmentDescriptor, EnvironmentKind, Registry, SelfCloseStyle, Transformer,
    Transformers,
};
pub use spacing::{ComponentInfo, SpacingRules, adjust_spacing};
pub use token::{TOKEN_LEN, TOKEN_PREFIX};
pub use unescape::unescape;
