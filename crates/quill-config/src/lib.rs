//! Configuration management for quill.
//!
//! Parses `quill.toml` with serde and provides auto-discovery of the config
//! file in parent directories. CLI settings can be applied during load via
//! [`CliSettings`].
//!
//! Verbatim environments are deliberately kept as raw TOML tables
//! ([`Config::environments`]): typing and diagnosing them is the job of the
//! environment registry, which reports every bad field instead of rejecting
//! the whole file.
//!
//! ## Environment Variable Expansion
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `cache.dir`
//! - `compile.engine`, `compile.engine_args`
//! - `compile.converter`, `compile.converter_args`
//! - `compile.output_dir`

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Override the directory compiled artifacts are written to.
    pub output_dir: Option<PathBuf>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "quill.toml";

/// Default external typesetting engine.
pub const DEFAULT_ENGINE: &str = "lualatex";
/// Default conversion tool (intermediate artifact to SVG).
pub const DEFAULT_CONVERTER: &str = "dvisvgm";
/// Default intermediate artifact extension produced by the engine.
pub const DEFAULT_INTERMEDIATE: &str = "pdf";
/// Default timeout for a single external tool invocation, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default engine arguments; `{workdir}` and `{input}` are substituted per job.
#[must_use]
pub fn default_engine_args() -> Vec<String> {
    [
        "-interaction=nonstopmode",
        "-halt-on-error",
        "-output-directory={workdir}",
        "{input}",
    ]
    .map(str::to_owned)
    .to_vec()
}

/// Default converter arguments; `{input}` and `{output}` are substituted per job.
#[must_use]
pub fn default_converter_args() -> Vec<String> {
    [
        "--pdf",
        "--no-fonts",
        "--exact-bbox",
        "--output={output}",
        "{input}",
    ]
    .map(str::to_owned)
    .to_vec()
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache configuration (paths are relative strings from TOML).
    cache: CacheConfigRaw,
    /// Compilation configuration (paths are relative strings from TOML).
    compile: CompileConfigRaw,
    /// Components with a declared inline/block preference.
    pub components: Vec<ComponentConfig>,
    /// Verbatim environments, in declaration order, as raw tables.
    pub environments: Vec<toml::Table>,

    /// Resolved cache configuration (set after loading).
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// Resolved compile configuration (set after loading).
    #[serde(skip)]
    pub compile_resolved: CompileConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw cache configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    enabled: Option<bool>,
    dir: Option<String>,
}

/// Resolved cache configuration with absolute paths.
#[derive(Debug, Default)]
pub struct CacheConfig {
    /// Whether the compilation cache persists across runs.
    pub enabled: bool,
    /// Directory holding the cache record and compile work directories.
    pub dir: PathBuf,
}

impl CacheConfig {
    /// Scratch directory for external tool invocations.
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.dir.join("work")
    }
}

/// How compiled artifacts are embedded in the output document.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Inline the SVG markup.
    #[default]
    Inline,
    /// Reference the artifact file with an `<img>` tag.
    Files,
}

/// Raw compile configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CompileConfigRaw {
    engine: Option<String>,
    engine_args: Option<Vec<String>>,
    intermediate: Option<String>,
    converter: Option<String>,
    converter_args: Option<Vec<String>>,
    timeout_secs: Option<u64>,
    output_dir: Option<String>,
    output: Option<OutputMode>,
    url_prefix: Option<String>,
}

/// Resolved external compilation configuration.
#[derive(Debug)]
pub struct CompileConfig {
    /// Typesetting engine command.
    pub engine: String,
    /// Engine arguments (`{workdir}`, `{input}` placeholders).
    pub engine_args: Vec<String>,
    /// Extension of the file the engine produces (e.g. `pdf`, `dvi`).
    pub intermediate: String,
    /// Conversion tool command.
    pub converter: String,
    /// Converter arguments (`{input}`, `{output}` placeholders).
    pub converter_args: Vec<String>,
    /// Upper bound for each tool invocation.
    pub timeout: Duration,
    /// Directory compiled artifacts are written to.
    pub output_dir: PathBuf,
    /// Embedding mode.
    pub output: OutputMode,
    /// URL prefix for `OutputMode::Files`.
    pub url_prefix: Option<String>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_owned(),
            engine_args: default_engine_args(),
            intermediate: DEFAULT_INTERMEDIATE.to_owned(),
            converter: DEFAULT_CONVERTER.to_owned(),
            converter_args: default_converter_args(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            output_dir: PathBuf::from(".quill/compiled"),
            output: OutputMode::default(),
            url_prefix: None,
        }
    }
}

/// A component with a declared inline/block preference.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ComponentConfig {
    /// Tag name as written in documents (case-sensitive).
    pub name: String,
    /// Whether the component's content should stay inline.
    #[serde(default)]
    pub prefers_inline: bool,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`compile.engine`").
        field: String,
        /// Error message (e.g., "${`TEXBIN`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `quill.toml` in current directory and parents.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or validation fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string, resolving paths against `base`.
    ///
    /// # Errors
    ///
    /// Returns error if parsing, expansion, or validation fails.
    pub fn from_toml_str(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env_vars()?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(cache_enabled) = settings.cache_enabled {
            self.cache_resolved.enabled = cache_enabled;
        }
        if let Some(output_dir) = &settings.output_dir {
            self.compile_resolved.output_dir.clone_from(output_dir);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            cache: CacheConfigRaw::default(),
            compile: CompileConfigRaw::default(),
            components: Vec::new(),
            environments: Vec::new(),
            cache_resolved: CacheConfig {
                enabled: true,
                dir: base.join(".quill/cache"),
            },
            compile_resolved: CompileConfig {
                output_dir: base.join(".quill/compiled"),
                ..CompileConfig::default()
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        let mut config = Self::from_toml_str(&content, config_dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let compile = &self.compile_resolved;
        require_non_empty(&compile.engine, "compile.engine")?;
        require_non_empty(&compile.converter, "compile.converter")?;
        require_non_empty(&compile.intermediate, "compile.intermediate")?;

        if compile.timeout.is_zero() {
            return Err(ConfigError::Validation(
                "compile.timeout_secs must be greater than 0".to_owned(),
            ));
        }

        if compile.output == OutputMode::Files && compile.url_prefix.is_none() {
            return Err(ConfigError::Validation(
                "compile.output = \"files\" requires compile.url_prefix to be set".to_owned(),
            ));
        }

        for (index, component) in self.components.iter().enumerate() {
            require_non_empty(&component.name, &format!("components[{index}].name"))?;
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(dir) = &self.cache.dir {
            self.cache.dir = Some(expand::expand_env(dir, "cache.dir")?);
        }

        let compile = &mut self.compile;
        if let Some(engine) = &compile.engine {
            compile.engine = Some(expand::expand_env(engine, "compile.engine")?);
        }
        if let Some(converter) = &compile.converter {
            compile.converter = Some(expand::expand_env(converter, "compile.converter")?);
        }
        if let Some(output_dir) = &compile.output_dir {
            compile.output_dir = Some(expand::expand_env(output_dir, "compile.output_dir")?);
        }
        if let Some(args) = compile.engine_args.as_mut() {
            expand::expand_env_list(args, "compile.engine_args")?;
        }
        if let Some(args) = compile.converter_args.as_mut() {
            expand::expand_env_list(args, "compile.converter_args")?;
        }

        Ok(())
    }

    /// Resolve relative paths and fill defaults based on the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.cache_resolved = CacheConfig {
            enabled: self.cache.enabled.unwrap_or(true),
            dir: resolve(self.cache.dir.as_deref(), ".quill/cache"),
        };

        let compile = &self.compile;
        let defaults = CompileConfig::default();
        self.compile_resolved = CompileConfig {
            engine: compile.engine.clone().unwrap_or(defaults.engine),
            engine_args: compile.engine_args.clone().unwrap_or(defaults.engine_args),
            intermediate: compile
                .intermediate
                .clone()
                .unwrap_or(defaults.intermediate),
            converter: compile.converter.clone().unwrap_or(defaults.converter),
            converter_args: compile
                .converter_args
                .clone()
                .unwrap_or(defaults.converter_args),
            timeout: compile
                .timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
            output_dir: resolve(compile.output_dir.as_deref(), ".quill/compiled"),
            output: compile.output.unwrap_or_default(),
            url_prefix: compile.url_prefix.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert!(config.cache_resolved.enabled);
        assert_eq!(config.cache_resolved.dir, PathBuf::from("/test/.quill/cache"));
        assert_eq!(
            config.cache_resolved.work_dir(),
            PathBuf::from("/test/.quill/cache/work")
        );
        assert_eq!(
            config.compile_resolved.output_dir,
            PathBuf::from("/test/.quill/compiled")
        );
        assert_eq!(config.compile_resolved.engine, "lualatex");
        assert_eq!(config.compile_resolved.converter, "dvisvgm");
        assert_eq!(config.compile_resolved.timeout, Duration::from_secs(60));
        assert!(config.environments.is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::from_toml_str("", Path::new("/project")).unwrap();
        assert_eq!(config.compile_resolved.output, OutputMode::Inline);
        assert_eq!(config.compile_resolved.engine_args, default_engine_args());
    }

    #[test]
    fn test_parse_compile_config() {
        let toml = r#"
[compile]
engine = "pdflatex"
engine_args = ["{input}"]
intermediate = "dvi"
converter = "dvisvgm"
converter_args = ["{input}", "-o", "{output}"]
timeout_secs = 5
output_dir = "static/compiled"
output = "files"
url_prefix = "/compiled/"
"#;
        let config = Config::from_toml_str(toml, Path::new("/project")).unwrap();
        let compile = &config.compile_resolved;

        assert_eq!(compile.engine, "pdflatex");
        assert_eq!(compile.engine_args, vec!["{input}".to_owned()]);
        assert_eq!(compile.intermediate, "dvi");
        assert_eq!(compile.timeout, Duration::from_secs(5));
        assert_eq!(compile.output_dir, PathBuf::from("/project/static/compiled"));
        assert_eq!(compile.output, OutputMode::Files);
        assert_eq!(compile.url_prefix.as_deref(), Some("/compiled/"));
    }

    #[test]
    fn test_parse_cache_config() {
        let toml = r#"
[cache]
enabled = false
dir = "build/cache"
"#;
        let config = Config::from_toml_str(toml, Path::new("/project")).unwrap();
        assert!(!config.cache_resolved.enabled);
        assert_eq!(config.cache_resolved.dir, PathBuf::from("/project/build/cache"));
    }

    #[test]
    fn test_environments_keep_declaration_order() {
        let toml = r#"
[[environments]]
name = "Zeta"
type = "noop"

[[environments]]
name = "Alpha"
type = "escape"
aliases = ["A"]
"#;
        let config = Config::from_toml_str(toml, Path::new("/project")).unwrap();
        let names: Vec<_> = config
            .environments
            .iter()
            .map(|env| env["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn test_environments_with_bad_fields_still_load() {
        let toml = r#"
[[environments]]
name = "Broken"
type = 42
"#;
        let config = Config::from_toml_str(toml, Path::new("/project")).unwrap();
        assert_eq!(config.environments.len(), 1);
    }

    #[test]
    fn test_parse_components() {
        let toml = r#"
[[components]]
name = "Chart"

[[components]]
name = "Badge"
prefers_inline = true
"#;
        let config = Config::from_toml_str(toml, Path::new("/project")).unwrap();
        assert_eq!(
            config.components,
            vec![
                ComponentConfig {
                    name: "Chart".to_owned(),
                    prefers_inline: false,
                },
                ComponentConfig {
                    name: "Badge".to_owned(),
                    prefers_inline: true,
                },
            ]
        );
    }

    #[test]
    fn test_files_output_requires_url_prefix() {
        let toml = r#"
[compile]
output = "files"
"#;
        let err = Config::from_toml_str(toml, Path::new("/project")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("url_prefix"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let toml = r"
[compile]
timeout_secs = 0
";
        let err = Config::from_toml_str(toml, Path::new("/project")).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_empty_engine_rejected() {
        let toml = r#"
[compile]
engine = " "
"#;
        let err = Config::from_toml_str(toml, Path::new("/project")).unwrap_err();
        assert!(err.to_string().contains("compile.engine"));
    }

    #[test]
    fn test_unknown_output_mode_is_parse_error() {
        let toml = r#"
[compile]
output = "pdf"
"#;
        let err = Config::from_toml_str(toml, Path::new("/project")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_expands_engine_from_env() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("QUILL_CONFIG_TEST_ENGINE", "xelatex");
        }
        let toml = r#"
[compile]
engine = "${QUILL_CONFIG_TEST_ENGINE}"
"#;
        let config = Config::from_toml_str(toml, Path::new("/project")).unwrap();
        assert_eq!(config.compile_resolved.engine, "xelatex");
        unsafe {
            std::env::remove_var("QUILL_CONFIG_TEST_ENGINE");
        }
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            cache_enabled: Some(false),
            output_dir: Some(PathBuf::from("/out")),
        };

        config.apply_cli_settings(&overrides);

        assert!(!config.cache_resolved.enabled);
        assert_eq!(config.compile_resolved.output_dir, PathBuf::from("/out"));
    }

    #[test]
    fn test_apply_empty_cli_settings_changes_nothing() {
        let mut config = Config::default_with_base(Path::new("/test"));

        config.apply_cli_settings(&CliSettings::default());

        assert!(config.cache_resolved.enabled);
        assert_eq!(
            config.compile_resolved.output_dir,
            PathBuf::from("/test/.quill/compiled")
        );
    }

    #[test]
    fn test_load_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/definitely/not/here/quill.toml")), None);
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_from_file_records_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("quill.toml");
        std::fs::write(&path, "[cache]\nenabled = false\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.config_path, Some(path));
        assert!(!config.cache_resolved.enabled);
        assert_eq!(config.cache_resolved.dir, tmp.path().join(".quill/cache"));
    }
}
