//! TeX toolchain backend.
//!
//! [`TexCompiler`] turns each compile job into a standalone LaTeX document,
//! runs the engine and then the converter in a scratch directory, and stores
//! the resulting SVG through the [`CompilationCache`]:
//!
//! ```text
//! {work_dir}/{fingerprint[..16]}/
//! +-- component.tex    # written by us
//! +-- component.pdf    # engine output (`compile.intermediate`)
//! +-- component.svg    # converter output, copied into the cache
//! ```
//!
//! The scratch directory is removed after each job. Jobs of a batch run on
//! the global rayon thread pool.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quill_config::CompileConfig;
use quill_render::{CompileFailure, CompileJob, CompiledOutput, Compiler};
use rayon::prelude::*;

use crate::cache::CompilationCache;
use crate::consts::{ARTIFACT_EXTENSION, DEFAULT_DOCUMENT_CLASS, JOB_STEM, WORK_DIR_PREFIX_LEN};
use crate::error::CompileError;
use crate::key::CompileKey;
use crate::output::Embedding;
use crate::runner::{CliInstruction, CommandRunner, ProcessRunner};

/// Values substituted into tool arguments.
struct Placeholders<'a> {
    input: &'a Path,
    output: &'a Path,
    workdir: &'a Path,
}

impl Placeholders<'_> {
    /// Replace `{input}`, `{output}` and `{workdir}` in `arg`.
    fn substitute(&self, arg: &str) -> String {
        arg.replace("{input}", &self.input.to_string_lossy())
            .replace("{output}", &self.output.to_string_lossy())
            .replace("{workdir}", &self.workdir.to_string_lossy())
    }
}

/// [`Compiler`] running an external TeX engine and SVG converter.
pub struct TexCompiler {
    cache: Arc<CompilationCache>,
    runner: Arc<dyn CommandRunner>,
    settings: CompileConfig,
    work_dir: PathBuf,
    embedding: Embedding,
}

impl TexCompiler {
    /// Create a compiler using `settings`, with scratch space under `work_dir`.
    ///
    /// Artifacts are embedded as configured by `settings.output`.
    #[must_use]
    pub fn new(cache: Arc<CompilationCache>, settings: CompileConfig, work_dir: PathBuf) -> Self {
        let embedding = Embedding::from_config(&settings);
        Self {
            cache,
            runner: Arc::new(ProcessRunner),
            settings,
            work_dir,
            embedding,
        }
    }

    /// Use `runner` to invoke the external tools.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Override how artifacts are embedded.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = embedding;
        self
    }

    fn compile_one(&self, job: &CompileJob) -> Result<CompiledOutput, CompileError> {
        let document = build_document(job);
        let engine = job.options.engine.as_deref().unwrap_or(&self.settings.engine);
        let fingerprint = CompileKey {
            document: &document,
            engine,
            engine_args: &self.settings.engine_args,
            intermediate: &self.settings.intermediate,
            converter: &self.settings.converter,
            converter_args: &self.settings.converter_args,
        }
        .fingerprint();

        let artifact = self.cache.get_or_compile(&job.component_id, &fingerprint, || {
            self.run_toolchain(&fingerprint, &document, engine)
        })?;
        let html = self.embedding.embed(&artifact, &job.component_id)?;

        Ok(CompiledOutput {
            html,
            artifact: Some(artifact.key),
        })
    }

    fn run_toolchain(&self, fingerprint: &str, document: &str, engine: &str) -> Result<Vec<u8>, CompileError> {
        let workdir = self
            .work_dir
            .join(&fingerprint[..WORK_DIR_PREFIX_LEN.min(fingerprint.len())]);
        fs::create_dir_all(&workdir)?;

        let result = self.run_in(&workdir, document, engine);

        if let Err(e) = fs::remove_dir_all(&workdir) {
            tracing::debug!("failed to remove {}: {e}", workdir.display());
        }
        result
    }

    fn run_in(&self, workdir: &Path, document: &str, engine: &str) -> Result<Vec<u8>, CompileError> {
        let source = workdir.join(format!("{JOB_STEM}.tex"));
        let intermediate = workdir.join(format!("{JOB_STEM}.{}", self.settings.intermediate));
        let output = workdir.join(format!("{JOB_STEM}.{ARTIFACT_EXTENSION}"));
        fs::write(&source, document)?;

        self.run_step(
            engine,
            &self.settings.engine_args,
            &Placeholders {
                input: &source,
                output: &intermediate,
                workdir,
            },
        )?;
        if !intermediate.exists() {
            return Err(CompileError::MissingOutput(intermediate));
        }

        self.run_step(
            &self.settings.converter,
            &self.settings.converter_args,
            &Placeholders {
                input: &intermediate,
                output: &output,
                workdir,
            },
        )?;

        fs::read(&output).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CompileError::MissingOutput(output.clone()),
            _ => CompileError::Io(e),
        })
    }

    fn run_step(&self, command: &str, args: &[String], placeholders: &Placeholders<'_>) -> Result<(), CompileError> {
        let instruction = CliInstruction {
            command: command.to_owned(),
            args: args.iter().map(|arg| placeholders.substitute(arg)).collect(),
            cwd: placeholders.workdir.to_path_buf(),
            env: Vec::new(),
        };
        self.runner
            .run(&instruction, self.settings.timeout)?
            .into_result(command)?;
        Ok(())
    }
}

impl Compiler for TexCompiler {
    fn compile_all(&self, jobs: &[CompileJob]) -> Vec<Result<CompiledOutput, CompileFailure>> {
        if !jobs.is_empty() {
            tracing::debug!(jobs = jobs.len(), "compiling batch");
        }
        jobs.par_iter()
            .map(|job| {
                self.compile_one(job).map_err(|e| CompileFailure {
                    component_id: job.component_id.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

/// Standalone LaTeX document for `job`.
fn build_document(job: &CompileJob) -> String {
    let class = job
        .options
        .document_class
        .as_deref()
        .unwrap_or(DEFAULT_DOCUMENT_CLASS);
    let mut document = format!("\\documentclass{{{class}}}\n");
    if let Some(preamble) = job.options.preamble.as_deref().filter(|p| !p.trim().is_empty()) {
        document.push_str(preamble.trim_end());
        document.push('\n');
    }
    document.push_str("\\begin{document}\n");
    document.push_str(job.source.trim_matches('\n'));
    document.push_str("\n\\end{document}\n");
    document
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::runner::CommandOutput;
    use pretty_assertions::assert_eq;
    use quill_cache::{FileStore, NullStore};
    use quill_render::{
        Attributes, CollectingSink, CompileOptions, EnvironmentDescriptor, EnvironmentKind,
        Pipeline, Registry,
    };
    use tempfile::TempDir;

    const SVG: &str = "<?xml version='1.0' encoding='UTF-8'?>\n<svg>fig</svg>\n";

    /// Pretends to be the toolchain: the engine copies its input to the
    /// intermediate file, the converter writes [`SVG`].
    #[derive(Default)]
    struct FakeRunner {
        calls: Mutex<Vec<CliInstruction>>,
        fail_engine: Option<String>,
        skip_intermediate: bool,
    }

    impl FakeRunner {
        fn calls(&self) -> Vec<CliInstruction> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, instruction: &CliInstruction, _timeout: std::time::Duration) -> Result<CommandOutput, CompileError> {
            self.calls.lock().unwrap().push(instruction.clone());
            let (input, output) = (&instruction.args[0], &instruction.args[1]);

            if instruction.command == "fake-tex" {
                if let Some(log) = &self.fail_engine {
                    return Ok(CommandOutput {
                        success: false,
                        code: Some(1),
                        stdout: log.clone(),
                        stderr: String::new(),
                    });
                }
                if !self.skip_intermediate {
                    fs::copy(input, output)?;
                }
            } else {
                fs::write(output, SVG)?;
            }
            Ok(CommandOutput {
                success: true,
                code: Some(0),
                ..CommandOutput::default()
            })
        }
    }

    fn settings() -> CompileConfig {
        CompileConfig {
            engine: "fake-tex".to_owned(),
            engine_args: vec!["{input}".to_owned(), "{output}".to_owned()],
            converter: "fake-svg".to_owned(),
            converter_args: vec!["{input}".to_owned(), "{output}".to_owned()],
            ..CompileConfig::default()
        }
    }

    struct Fixture {
        tmp: TempDir,
        runner: Arc<FakeRunner>,
        compiler: TexCompiler,
    }

    fn fixture_with(runner: FakeRunner) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let cache = Arc::new(CompilationCache::open(
            Box::new(FileStore::new(tmp.path().join("cache"))),
            tmp.path().join("compiled"),
        ));
        let runner = Arc::new(runner);
        let compiler = TexCompiler::new(cache, settings(), tmp.path().join("work"))
            .with_runner(Arc::clone(&runner) as Arc<dyn CommandRunner>);
        Fixture {
            tmp,
            runner,
            compiler,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeRunner::default())
    }

    fn job(id: &str, source: &str) -> CompileJob {
        CompileJob {
            component_id: id.to_owned(),
            tag: "tikz".to_owned(),
            source: source.to_owned(),
            options: CompileOptions {
                engine: None,
                preamble: Some("\\usepackage{tikz}".to_owned()),
                document_class: None,
            },
            attributes: Attributes::new(),
        }
    }

    #[test]
    fn test_build_document() {
        assert_eq!(
            build_document(&job("tikz-a", "\n\\draw (0,0);\n")),
            "\\documentclass{standalone}\n\\usepackage{tikz}\n\\begin{document}\n\\draw (0,0);\n\\end{document}\n"
        );
    }

    #[test]
    fn test_build_document_class_override() {
        let mut job = job("tikz-a", "x");
        job.options.document_class = Some("article".to_owned());
        job.options.preamble = None;

        assert_eq!(
            build_document(&job),
            "\\documentclass{article}\n\\begin{document}\nx\n\\end{document}\n"
        );
    }

    #[test]
    fn test_compiles_and_inlines_svg() {
        let fixture = fixture();
        let results = fixture.compiler.compile_all(&[job("tikz-a", "\\draw (0,0);")]);

        assert_eq!(
            results,
            vec![Ok(CompiledOutput {
                html: "<svg>fig</svg>".to_owned(),
                artifact: Some("tikz-a.svg".to_owned()),
            })]
        );
        let calls = fixture.runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].command, "fake-tex");
        assert!(calls[0].args[0].ends_with("component.tex"));
        assert!(calls[0].args[1].ends_with("component.pdf"));
        assert_eq!(calls[1].command, "fake-svg");
        assert!(calls[1].args[1].ends_with("component.svg"));
        assert!(fixture.tmp.path().join("compiled/tikz-a.svg").exists());
    }

    #[test]
    fn test_work_dir_is_removed() {
        let fixture = fixture();
        fixture.compiler.compile_all(&[job("tikz-a", "x")]);

        let work = fixture.tmp.path().join("work");
        let leftovers = fs::read_dir(&work).map(Iterator::count).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_unchanged_source_is_not_recompiled() {
        let fixture = fixture();
        fixture.compiler.compile_all(&[job("tikz-a", "\\draw (0,0);")]);
        let again = fixture.compiler.compile_all(&[job("tikz-a", "\\draw (0,0);")]);

        assert_eq!(fixture.runner.calls().len(), 2);
        assert!(again[0].is_ok());
    }

    #[test]
    fn test_one_character_change_recompiles() {
        let fixture = fixture();
        fixture.compiler.compile_all(&[job("tikz-a", "\\draw (0,0);")]);
        fixture.compiler.compile_all(&[job("tikz-a", "\\draw (0,1);")]);

        assert_eq!(fixture.runner.calls().len(), 4);
    }

    #[test]
    fn test_engine_override_changes_fingerprint() {
        let fixture = fixture();
        fixture.compiler.compile_all(&[job("tikz-a", "x")]);
        let mut other = job("tikz-a", "x");
        other.options.engine = Some("fake-tex-2".to_owned());
        fixture.compiler.compile_all(&[other]);

        let calls = fixture.runner.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[2].command, "fake-tex-2");
    }

    #[test]
    fn test_engine_failure_reports_log() {
        let fixture = fixture_with(FakeRunner {
            fail_engine: Some("! Undefined control sequence.\nl.4 \\drawx".to_owned()),
            ..FakeRunner::default()
        });

        let results = fixture.compiler.compile_all(&[job("tikz-a", "\\drawx")]);
        let failure = results[0].clone().unwrap_err();

        assert_eq!(failure.component_id, "tikz-a");
        assert!(failure.message.contains("Undefined control sequence"));
        assert!(!fixture.tmp.path().join("compiled/tikz-a.svg").exists());
    }

    #[test]
    fn test_missing_intermediate_is_error() {
        let fixture = fixture_with(FakeRunner {
            skip_intermediate: true,
            ..FakeRunner::default()
        });

        let results = fixture.compiler.compile_all(&[job("tikz-a", "x")]);
        let failure = results[0].clone().unwrap_err();

        assert!(failure.message.contains("component.pdf"));
        assert_eq!(fixture.runner.calls().len(), 1);
    }

    #[test]
    fn test_batch_keeps_job_order() {
        let fixture = fixture();
        let jobs: Vec<CompileJob> = (0..6).map(|i| job(&format!("tikz-{i}"), &format!("\\node {{{i}}};"))).collect();

        let results = fixture.compiler.compile_all(&jobs);

        let artifacts: Vec<_> = results
            .into_iter()
            .map(|r| r.unwrap().artifact.unwrap())
            .collect();
        let expected: Vec<_> = (0..6).map(|i| format!("tikz-{i}.svg")).collect();
        assert_eq!(artifacts, expected);
    }

    #[test]
    fn test_files_embedding() {
        let fixture = fixture();
        let compiler = fixture.compiler.with_embedding(Embedding::Files {
            url_prefix: "/compiled/".to_owned(),
        });

        let results = compiler.compile_all(&[job("tikz-a", "x")]);
        assert_eq!(
            results[0].as_ref().unwrap().html,
            r#"<img src="/compiled/tikz-a.svg" alt="tikz-a">"#
        );
    }

    #[test]
    fn test_pipeline_compiles_once_across_renders() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let cache = Arc::new(CompilationCache::open(Box::new(NullStore), tmp.path().join("compiled")));
        let compiler = TexCompiler::new(Arc::clone(&cache), settings(), tmp.path().join("work"))
            .with_runner(Arc::clone(&runner) as Arc<dyn CommandRunner>);
        let registry = Registry::from_descriptors(
            vec![EnvironmentDescriptor::new(
                "tikz",
                EnvironmentKind::Compile {
                    engine: None,
                    preamble: Some("\\usepackage{tikz}".to_owned()),
                    document_class: None,
                },
            )],
            &CollectingSink::new(),
        );
        let pipeline = Pipeline::new(registry)
            .with_compiler(Arc::new(compiler))
            .with_sink(Arc::new(CollectingSink::new()));
        let document = "Intro\n\n<tikz ref=\"fig\">\\draw (0,0);</tikz>\n";

        let first = pipeline.render(document).unwrap();
        let second = pipeline.render(document).unwrap();

        assert_eq!(first.html, "<p>Intro</p>\n<figure><svg>fig</svg></figure>\n");
        assert_eq!(first, second);
        assert_eq!(first.compiled.len(), 1);
        assert_eq!(first.compiled[0].artifact, "tikz-fig.svg");
        assert_eq!(runner.calls().len(), 2);

        cache.retain_document("doc.md", first.compiled.iter().map(|c| c.artifact.clone()));
        assert!(cache.pending().is_empty());
    }
}
