//! Verbatim environment dispatcher.
//!
//! Turns one verbatim region into its final HTML: merge attributes, run the
//! pre-transformers, process by kind, run the post-transformers and wrap.
//! Compile-kind regions are split in two so a whole document's compile jobs
//! can go to the [`Compiler`] as one batch.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::attrs::Attributes;
use crate::collab::{
    CodeOptions, CodeProcessor, CompileFailure, CompileJob, CompileOptions, CompiledOutput,
    Compiler, MathOptions, MathProcessor, ProcessedFragment,
};
use crate::diagnostics::{DiagnosticSink, Problem, ProblemKind};
use crate::error::RenderError;
use crate::html::{escape_braces, escape_html};
use crate::registry::{
    Component, EnvironmentDescriptor, EnvironmentKind, Registry, SelfCloseStyle, apply_all,
};

/// Hex digits of the content hash used in generated component ids.
const COMPONENT_HASH_LEN: usize = 12;

/// A region routed to a verbatim environment.
#[derive(Clone, Debug)]
pub struct Region<'a> {
    /// Tag name or alias as written.
    pub tag: &'a str,
    /// Call-site attributes.
    pub attributes: Attributes,
    /// Content between the tags.
    pub inner: &'a str,
    /// `<Tag ... />` form.
    pub self_closing: bool,
    /// Whitespace before the self-closing slash.
    pub space_before_slash: bool,
    /// The whole region as written.
    pub outer: &'a str,
    /// The region occupied whole lines.
    pub block: bool,
}

/// Artifact produced by a compile-kind region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledComponent {
    /// Component id of the region.
    pub id: String,
    /// Artifact key in the compilation cache.
    pub artifact: String,
}

/// Output of [`Dispatcher::process_all`].
#[derive(Debug, Default)]
pub struct Dispatched {
    /// One fragment per region, in input order.
    pub fragments: Vec<ProcessedFragment>,
    /// Artifacts referenced by the compiled regions.
    pub compiled: Vec<CompiledComponent>,
}

/// Compile-kind region waiting for its compile result.
struct Pending {
    env: Arc<EnvironmentDescriptor>,
    tag: String,
    attributes: Attributes,
    self_closing: bool,
    space_before_slash: bool,
    job: CompileJob,
}

enum Step {
    Done(ProcessedFragment),
    Deferred(Box<Pending>),
}

/// Routes verbatim regions to their environment's processing.
pub struct Dispatcher<'a> {
    registry: &'a Registry,
    code: &'a dyn CodeProcessor,
    math: &'a dyn MathProcessor,
    compiler: &'a dyn Compiler,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher over `registry` and the collaborators.
    pub fn new(
        registry: &'a Registry,
        code: &'a dyn CodeProcessor,
        math: &'a dyn MathProcessor,
        compiler: &'a dyn Compiler,
        sink: &'a dyn DiagnosticSink,
    ) -> Self {
        Self {
            registry,
            code,
            math,
            compiler,
            sink,
        }
    }

    /// Process a single region.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownEnvironment`] if the tag is not
    /// registered.
    pub fn process(&self, region: &Region<'_>) -> Result<ProcessedFragment, RenderError> {
        let mut dispatched = self.process_all(std::slice::from_ref(region))?;
        Ok(dispatched.fragments.pop().unwrap_or_default())
    }

    /// Process `regions`, compiling every compile-kind region in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownEnvironment`] if any tag is not
    /// registered.
    pub fn process_all(&self, regions: &[Region<'_>]) -> Result<Dispatched, RenderError> {
        let mut steps = Vec::with_capacity(regions.len());
        for region in regions {
            steps.push(self.begin(region)?);
        }

        let jobs: Vec<CompileJob> = steps
            .iter()
            .filter_map(|step| match step {
                Step::Deferred(pending) => Some(pending.job.clone()),
                Step::Done(_) => None,
            })
            .collect();
        let mut results = if jobs.is_empty() {
            Vec::new()
        } else {
            tracing::debug!(jobs = jobs.len(), "compiling batch");
            self.compiler.compile_all(&jobs)
        }
        .into_iter();

        let mut dispatched = Dispatched::default();
        for step in steps {
            let fragment = match step {
                Step::Done(fragment) => fragment,
                Step::Deferred(pending) => {
                    let result = results.next().unwrap_or_else(|| {
                        Err(CompileFailure {
                            component_id: pending.job.component_id.clone(),
                            message: "compiler returned no result".to_owned(),
                        })
                    });
                    if let Ok(CompiledOutput {
                        artifact: Some(artifact),
                        ..
                    }) = &result
                    {
                        dispatched.compiled.push(CompiledComponent {
                            id: pending.job.component_id.clone(),
                            artifact: artifact.clone(),
                        });
                    }
                    self.finish(*pending, result)
                }
            };
            dispatched.fragments.push(fragment);
        }
        Ok(dispatched)
    }

    fn begin(&self, region: &Region<'_>) -> Result<Step, RenderError> {
        let env = self
            .registry
            .resolve(region.tag)
            .ok_or_else(|| RenderError::UnknownEnvironment(region.tag.to_owned()))?;

        let attributes = region.attributes.over(&env.default_attributes);
        let content = apply_all(&env.transformers.pre, region.inner.to_owned(), &attributes);

        let fragment = match &env.kind {
            EnvironmentKind::Noop => {
                return Ok(Step::Done(
                    ProcessedFragment::new(region.outer).remove_paragraph(env.remove_paragraph),
                ));
            }
            EnvironmentKind::Escape { html, braces } => {
                let mut content = content;
                if *html {
                    content = escape_html(&content);
                }
                if *braces {
                    content = escape_braces(&content);
                }
                ProcessedFragment::new(content).remove_paragraph(env.remove_paragraph)
            }
            EnvironmentKind::Code { lang, inline } => {
                let lang = attributes
                    .text("lang")
                    .or_else(|| attributes.text("language"))
                    .or(lang.as_deref());
                let inline = attributes
                    .flag("inline")
                    .or(*inline)
                    .unwrap_or(!region.block);
                self.code.process(
                    &content,
                    &CodeOptions {
                        lang,
                        inline,
                        attributes: &attributes,
                    },
                )
            }
            EnvironmentKind::Math { display } => {
                let display = attributes
                    .flag("display")
                    .or(*display)
                    .unwrap_or(region.block);
                self.math.process(
                    &content,
                    &MathOptions {
                        display,
                        block: region.block,
                        attributes: &attributes,
                    },
                )
            }
            EnvironmentKind::Compile {
                engine,
                preamble,
                document_class,
            } => {
                let option = |name: &str, fallback: &Option<String>| {
                    attributes
                        .text(name)
                        .map(str::to_owned)
                        .or_else(|| fallback.clone())
                };
                let job = CompileJob {
                    component_id: component_id(&env.name, attributes.text("ref"), &content),
                    tag: env.name.clone(),
                    options: CompileOptions {
                        engine: option("engine", engine),
                        preamble: option("preamble", preamble),
                        document_class: option("documentClass", document_class),
                    },
                    source: content,
                    attributes: attributes.clone(),
                };
                return Ok(Step::Deferred(Box::new(Pending {
                    env: Arc::clone(env),
                    tag: region.tag.to_owned(),
                    attributes,
                    self_closing: region.self_closing,
                    space_before_slash: region.space_before_slash,
                    job,
                })));
            }
        };

        Ok(Step::Done(self.complete(
            env,
            region.tag,
            &attributes,
            fragment,
            region.self_closing,
            region.space_before_slash,
        )))
    }

    fn finish(
        &self,
        pending: Pending,
        result: Result<CompiledOutput, CompileFailure>,
    ) -> ProcessedFragment {
        match result {
            Ok(output) => self.complete(
                &pending.env,
                &pending.tag,
                &pending.attributes,
                ProcessedFragment::new(output.html).remove_paragraph(pending.env.remove_paragraph),
                pending.self_closing,
                pending.space_before_slash,
            ),
            Err(failure) => {
                self.sink.report(
                    Problem::error(ProblemKind::Compile, failure.message.clone())
                        .at(failure.component_id),
                );
                ProcessedFragment::new(format!(
                    r#"<figure class="compile-error"><pre>Compilation failed: {}</pre></figure>"#,
                    escape_html(failure.message.trim())
                ))
                .remove_paragraph(true)
            }
        }
    }

    /// Post-transform and wrap a processed fragment.
    fn complete(
        &self,
        env: &EnvironmentDescriptor,
        tag: &str,
        attributes: &Attributes,
        fragment: ProcessedFragment,
        self_closing: bool,
        space_before_slash: bool,
    ) -> ProcessedFragment {
        let content = apply_all(&env.transformers.post, fragment.html, attributes);
        let name = match &env.component {
            Component::None => {
                return ProcessedFragment {
                    html: content,
                    hints: fragment.hints,
                };
            }
            Component::SelfTag => tag,
            Component::Tag(name) => name.as_str(),
        };
        let forwarded = attributes.forwarded(&env.allowlist, &env.blocklist).to_html();

        let html = if self_closing && env.respect_self_closing {
            let close = match env.self_close_style {
                SelfCloseStyle::Auto if space_before_slash => " />",
                SelfCloseStyle::Auto | SelfCloseStyle::Slash => "/>",
                SelfCloseStyle::SpaceSlash => " />",
            };
            format!("<{name}{forwarded}{close}")
        } else {
            format!("<{name}{forwarded}>{content}</{name}>")
        };
        ProcessedFragment {
            html,
            hints: fragment.hints,
        }
    }
}

/// Stable component id: `{env}-{ref}` or `{env}-{content hash prefix}`.
fn component_id(env: &str, reference: Option<&str>, content: &str) -> String {
    let suffix = match reference.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reference) => reference
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
            .collect(),
        None => {
            let digest = hex::encode(Sha256::digest(content.as_bytes()));
            digest[..COMPONENT_HASH_LEN].to_owned()
        }
    };
    format!("{env}-{suffix}")
}
