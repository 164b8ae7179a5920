//! Verbatim environment descriptors.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::attrs::{AttributeAllowlist, Attributes};

/// Kind-specific behavior of an environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvironmentKind {
    /// Entity-escape the content.
    Escape {
        /// Escape `&`, `<`, `>`, and quotes.
        html: bool,
        /// Escape `{` and `}` (after HTML escaping).
        braces: bool,
    },
    /// Hand the content to the code collaborator.
    Code {
        /// Language used when the tag has no `lang` attribute.
        lang: Option<String>,
        /// Force inline or block rendering; placement decides when unset.
        inline: Option<bool>,
    },
    /// Hand the content to the math collaborator.
    Math {
        /// Force display or inline math; placement decides when unset.
        display: Option<bool>,
    },
    /// Compile the content with the external toolchain.
    Compile {
        /// Engine override.
        engine: Option<String>,
        /// Extra preamble lines.
        preamble: Option<String>,
        /// Document class override.
        document_class: Option<String>,
    },
    /// Emit the original text untouched.
    Noop,
}

impl EnvironmentKind {
    /// Configuration name of the kind.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Escape { .. } => "escape",
            Self::Code { .. } => "code",
            Self::Math { .. } => "math",
            Self::Compile { .. } => "compile",
            Self::Noop => "noop",
        }
    }
}

/// Which tag wraps the processed content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Component {
    /// No wrapper.
    None,
    /// Reuse the tag name as written in the document.
    SelfTag,
    /// A fixed tag name.
    Tag(String),
}

/// Closing bracket used for self-closing output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelfCloseStyle {
    /// Copy the spacing of the source tag.
    #[default]
    Auto,
    /// `/>`
    Slash,
    /// ` />`
    SpaceSlash,
}

/// Content transformation applied before or after kind processing.
#[derive(Clone)]
pub enum Transformer {
    /// Replace every occurrence of a literal string.
    Replace {
        /// Text to find.
        find: String,
        /// Replacement.
        replace: String,
    },
    /// Replace every regex match; `$1`-style group references are expanded.
    Regex {
        /// Compiled pattern.
        pattern: Regex,
        /// Replacement template.
        replace: String,
    },
    /// Arbitrary function of the content and the merged attributes.
    Func(Arc<dyn Fn(&str, &Attributes) -> String + Send + Sync>),
}

impl Transformer {
    /// Apply the transformation.
    #[must_use]
    pub fn apply(&self, content: &str, attributes: &Attributes) -> String {
        match self {
            Self::Replace { find, replace } => content.replace(find.as_str(), replace),
            Self::Regex { pattern, replace } => {
                pattern.replace_all(content, replace.as_str()).into_owned()
            }
            Self::Func(func) => func(content, attributes),
        }
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace { find, replace } => f
                .debug_struct("Replace")
                .field("find", find)
                .field("replace", replace)
                .finish(),
            Self::Regex { pattern, replace } => f
                .debug_struct("Regex")
                .field("pattern", &pattern.as_str())
                .field("replace", replace)
                .finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Ordered transformer lists.
#[derive(Clone, Debug, Default)]
pub struct Transformers {
    /// Applied to the inner content before kind processing.
    pub pre: Vec<Transformer>,
    /// Applied to the processed content before wrapping.
    pub post: Vec<Transformer>,
}

/// Fold `content` through `transformers` in order.
pub(crate) fn apply_all(transformers: &[Transformer], content: String, attributes: &Attributes) -> String {
    transformers
        .iter()
        .fold(content, |acc, t| t.apply(&acc, attributes))
}

/// Fully resolved verbatim environment.
#[derive(Clone, Debug)]
pub struct EnvironmentDescriptor {
    /// Main tag name.
    pub name: String,
    /// Alternative tag names.
    pub aliases: Vec<String>,
    /// Kind and kind options.
    pub kind: EnvironmentKind,
    /// Attributes merged under the call-site attributes.
    pub default_attributes: Attributes,
    /// Attributes eligible for forwarding to the output tag.
    pub allowlist: AttributeAllowlist,
    /// Attributes never forwarded; wins over the allowlist.
    pub blocklist: BTreeSet<String>,
    /// Output wrapper.
    pub component: Component,
    /// Emit a self-closing wrapper when the source tag was self-closing.
    pub respect_self_closing: bool,
    /// Bracket style for self-closing output.
    pub self_close_style: SelfCloseStyle,
    /// Strip a `<p>` the Markdown engine puts around the fragment.
    pub remove_paragraph: bool,
    /// Content transformers.
    pub transformers: Transformers,
}

impl EnvironmentDescriptor {
    /// Create a descriptor with the defaults of `kind`.
    ///
    /// | kind    | component | respect self-closing | blocklist                          |
    /// |---------|-----------|----------------------|------------------------------------|
    /// | escape  | self      | yes                  |                                    |
    /// | code    | none      | no                   |                                    |
    /// | math    | none      | no                   |                                    |
    /// | compile | `figure`  | no                   | ref, engine, preamble, documentClass |
    /// | noop    | none      | no                   |                                    |
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EnvironmentKind) -> Self {
        let (component, respect_self_closing, blocklist): (_, _, &[&str]) = match &kind {
            EnvironmentKind::Escape { .. } => (Component::SelfTag, true, &[]),
            EnvironmentKind::Compile { .. } => (
                Component::Tag("figure".to_owned()),
                false,
                &["ref", "engine", "preamble", "documentClass"],
            ),
            EnvironmentKind::Code { .. } | EnvironmentKind::Math { .. } | EnvironmentKind::Noop => {
                (Component::None, false, &[])
            }
        };

        Self {
            name: name.into(),
            aliases: Vec::new(),
            kind,
            default_attributes: Attributes::new(),
            allowlist: AttributeAllowlist::All,
            blocklist: blocklist.iter().map(|s| (*s).to_owned()).collect(),
            component,
            respect_self_closing,
            self_close_style: SelfCloseStyle::Auto,
            remove_paragraph: true,
            transformers: Transformers::default(),
        }
    }

    /// Default escape kind: HTML and braces.
    #[must_use]
    pub fn escape(name: impl Into<String>) -> Self {
        Self::new(
            name,
            EnvironmentKind::Escape {
                html: true,
                braces: true,
            },
        )
    }

    /// Add aliases.
    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Append a pre-transformer.
    #[must_use]
    pub fn with_pre(mut self, transformer: Transformer) -> Self {
        self.transformers.pre.push(transformer);
        self
    }

    /// Append a post-transformer.
    #[must_use]
    pub fn with_post(mut self, transformer: Transformer) -> Self {
        self.transformers.post.push(transformer);
        self
    }

    /// Every name this environment answers to, main name first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_defaults() {
        let env = EnvironmentDescriptor::escape("Verbatim");
        assert_eq!(env.component, Component::SelfTag);
        assert!(env.respect_self_closing);
        assert!(env.remove_paragraph);
        assert!(env.blocklist.is_empty());
    }

    #[test]
    fn test_compile_defaults() {
        let env = EnvironmentDescriptor::new(
            "tikz",
            EnvironmentKind::Compile {
                engine: None,
                preamble: None,
                document_class: None,
            },
        );
        assert_eq!(env.component, Component::Tag("figure".to_owned()));
        assert!(env.blocklist.contains("ref"));
        assert!(env.blocklist.contains("documentClass"));
    }

    #[test]
    fn test_code_defaults() {
        let env = EnvironmentDescriptor::new(
            "Code",
            EnvironmentKind::Code {
                lang: None,
                inline: None,
            },
        );
        assert_eq!(env.component, Component::None);
        assert!(!env.respect_self_closing);
    }

    #[test]
    fn test_names() {
        let env = EnvironmentDescriptor::escape("Verbatim").with_aliases(["Verb", "V"]);
        let names: Vec<_> = env.names().collect();
        assert_eq!(names, vec!["Verbatim", "Verb", "V"]);
    }

    #[test]
    fn test_transformers_apply_in_order() {
        let transformers = vec![
            Transformer::Replace {
                find: "a".to_owned(),
                replace: "b".to_owned(),
            },
            Transformer::Regex {
                pattern: Regex::new("b+").unwrap(),
                replace: "[$0]".to_owned(),
            },
            Transformer::Func(Arc::new(|s: &str, attrs: &Attributes| {
                format!("{s}:{}", attrs.text("x").unwrap_or("-"))
            })),
        ];

        let out = apply_all(&transformers, "aab".to_owned(), &Attributes::new());

        assert_eq!(out, "[bbb]:-");
    }

    #[test]
    fn test_transformer_debug_hides_closure() {
        let t = Transformer::Func(Arc::new(|s: &str, _: &Attributes| s.to_owned()));
        assert_eq!(format!("{t:?}"), "Func(..)");
    }
}
