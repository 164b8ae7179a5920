//! Embedding compiled artifacts in the rendered document.
//!
//! [`Embedding`] controls how an artifact is referenced:
//! - [`Inline`](Embedding::Inline): the SVG markup itself (default)
//! - [`Files`](Embedding::Files): an `<img>` tag pointing at the stored file

use std::sync::LazyLock;

use quill_config::{CompileConfig, OutputMode};
use quill_render::escape_html;
use regex::Regex;

use crate::cache::CachedArtifact;
use crate::error::CompileError;

/// XML declaration, doctype and leading comments an SVG file may start with.
static SVG_PROLOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?:\s*<\?xml[^>]*\?>|\s*<!DOCTYPE[^>]*>|\s*<!--.*?-->)*\s*").unwrap()
});

/// How compiled artifacts appear in the output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Embedding {
    /// Inline SVG markup with the XML prolog stripped.
    #[default]
    Inline,
    /// `<img src="{url_prefix}{key}">`.
    Files {
        /// Prefix prepended to the artifact key (e.g. `/compiled/`).
        url_prefix: String,
    },
}

impl Embedding {
    /// Embedding configured by `[compile]`.
    #[must_use]
    pub fn from_config(config: &CompileConfig) -> Self {
        match config.output {
            OutputMode::Inline => Self::Inline,
            OutputMode::Files => Self::Files {
                url_prefix: config.url_prefix.clone().unwrap_or_default(),
            },
        }
    }

    /// Markup referencing `artifact` for the component `component_id`.
    ///
    /// # Errors
    ///
    /// Inline embedding fails when the artifact is not UTF-8.
    pub fn embed(&self, artifact: &CachedArtifact, component_id: &str) -> Result<String, CompileError> {
        match self {
            Self::Inline => {
                let svg = std::str::from_utf8(&artifact.content)
                    .map_err(|_| CompileError::InvalidArtifact(artifact.key.clone()))?;
                Ok(strip_prolog(svg).trim_end().to_owned())
            }
            Self::Files { url_prefix } => Ok(format!(
                r#"<img src="{}{}" alt="{}">"#,
                escape_html(url_prefix),
                escape_html(&artifact.key),
                escape_html(component_id)
            )),
        }
    }
}

/// `svg` without its XML declaration, doctype or leading comments.
#[must_use]
pub fn strip_prolog(svg: &str) -> &str {
    match SVG_PROLOG_RE.find(svg) {
        Some(m) => &svg[m.end()..],
        None => svg,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cache::Origin;
    use pretty_assertions::assert_eq;

    fn artifact(content: &[u8]) -> CachedArtifact {
        CachedArtifact {
            key: "tikz-fig.svg".to_owned(),
            path: PathBuf::from("/out/tikz-fig.svg"),
            content: content.to_vec(),
            origin: Origin::Compiled,
        }
    }

    #[test]
    fn test_strip_prolog() {
        let svg = "<?xml version='1.0' encoding='UTF-8'?>\n<!-- Generated by dvisvgm -->\n<svg width='1'/>";
        assert_eq!(strip_prolog(svg), "<svg width='1'/>");
    }

    #[test]
    fn test_strip_prolog_with_doctype() {
        let svg = "<?xml version=\"1.0\"?>\n<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\">\n<svg/>";
        assert_eq!(strip_prolog(svg), "<svg/>");
    }

    #[test]
    fn test_strip_prolog_without_prolog() {
        assert_eq!(strip_prolog("<svg/>"), "<svg/>");
    }

    #[test]
    fn test_inline_embedding() {
        let html = Embedding::Inline
            .embed(&artifact(b"<?xml version='1.0'?>\n<svg/>\n"), "tikz-fig")
            .unwrap();
        assert_eq!(html, "<svg/>");
    }

    #[test]
    fn test_inline_rejects_binary() {
        let err = Embedding::Inline
            .embed(&artifact(&[0xff, 0xfe]), "tikz-fig")
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidArtifact(key) if key == "tikz-fig.svg"));
    }

    #[test]
    fn test_files_embedding() {
        let embedding = Embedding::Files {
            url_prefix: "/compiled/".to_owned(),
        };
        let html = embedding.embed(&artifact(b"<svg/>"), "tikz-fig").unwrap();
        assert_eq!(html, r#"<img src="/compiled/tikz-fig.svg" alt="tikz-fig">"#);
    }

    #[test]
    fn test_from_config() {
        let mut config = CompileConfig::default();
        assert_eq!(Embedding::from_config(&config), Embedding::Inline);

        config.output = OutputMode::Files;
        config.url_prefix = Some("/c/".to_owned());
        assert_eq!(
            Embedding::from_config(&config),
            Embedding::Files {
                url_prefix: "/c/".to_owned()
            }
        );
    }
}
