//! External compilation for compile-kind verbatim environments.
//!
//! This crate provides [`TexCompiler`], the [`quill_render::Compiler`] used
//! for environments such as `<tikz>`: each region becomes a standalone TeX
//! document that is typeset and converted to SVG by external tools.
//!
//! Compilation is slow, so every artifact goes through the
//! [`CompilationCache`], which is keyed by a fingerprint of the document and
//! of every setting that affects the output ([`CompileKey`]). An unchanged
//! component is compiled at most once, also across runs, and a component
//! whose id changed but whose source did not is relocated instead of
//! recompiled.
//!
//! # Architecture
//!
//! - [`CompilationCache`]: fingerprint lookup, relocation, deferred deletion
//! - [`CommandRunner`]: seam for running tools ([`ProcessRunner`] in production)
//! - [`Embedding`]: inline SVG or `<img>` reference

mod cache;
mod compiler;
mod consts;
mod error;
mod key;
mod output;
mod runner;

pub use cache::{CachedArtifact, CompilationCache, Origin};
pub use compiler::TexCompiler;
pub use error::CompileError;
pub use key::CompileKey;
pub use output::{Embedding, strip_prolog};
pub use runner::{CliInstruction, CommandOutput, CommandRunner, ProcessRunner};
