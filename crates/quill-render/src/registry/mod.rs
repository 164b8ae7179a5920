//! Verbatim environment registry.
//!
//! Maps every tag name and alias to a shared [`EnvironmentDescriptor`].
//! Built once per configuration; rebuilding is the only way to change it.
//!
//! # Example
//!
//! ```
//! use quill_render::{CollectingSink, EnvironmentDescriptor, Registry};
//!
//! let sink = CollectingSink::new();
//! let registry = Registry::from_descriptors(
//!     vec![EnvironmentDescriptor::escape("Verbatim").with_aliases(["Verb"])],
//!     &sink,
//! );
//!
//! let main = registry.resolve("Verbatim").unwrap();
//! let alias = registry.resolve("Verb").unwrap();
//! assert!(std::sync::Arc::ptr_eq(main, alias));
//! assert!(registry.resolve("verbatim").is_none()); // case-sensitive
//! ```

mod descriptor;
mod diagnose;

use std::collections::HashMap;
use std::sync::Arc;

pub use descriptor::{
    Component, EnvironmentDescriptor, EnvironmentKind, SelfCloseStyle, Transformer, Transformers,
};
pub(crate) use descriptor::apply_all;

use crate::diagnostics::{DiagnosticSink, Problem, ProblemKind};

/// Lookup table from tag name or alias to environment.
#[derive(Debug, Default)]
pub struct Registry {
    environments: Vec<Arc<EnvironmentDescriptor>>,
    lookup: HashMap<String, Arc<EnvironmentDescriptor>>,
}

impl Registry {
    /// Build from raw `[[environments]]` tables.
    ///
    /// Invalid environments are dropped; every problem goes to `sink`.
    pub fn build(tables: &[toml::Table], sink: &dyn DiagnosticSink) -> Self {
        let mut descriptors = Vec::with_capacity(tables.len());
        for (index, table) in tables.iter().enumerate() {
            let (descriptor, problems) = diagnose::diagnose_environment(table, index);
            for problem in problems {
                sink.report(problem);
            }
            descriptors.extend(descriptor);
        }
        Self::from_descriptors(descriptors, sink)
    }

    /// Build from already typed descriptors.
    ///
    /// Name and alias collisions are reported and resolved last-write-wins.
    pub fn from_descriptors(descriptors: Vec<EnvironmentDescriptor>, sink: &dyn DiagnosticSink) -> Self {
        let mut registry = Self::default();

        for descriptor in descriptors {
            let descriptor = Arc::new(descriptor);
            let mut claimed: Vec<&str> = Vec::new();

            for name in descriptor.names() {
                if claimed.contains(&name) {
                    continue;
                }
                claimed.push(name);

                if let Some(previous) = registry
                    .lookup
                    .insert(name.to_owned(), Arc::clone(&descriptor))
                {
                    sink.report(
                        Problem::warning(
                            ProblemKind::Config,
                            format!(
                                "`{name}` is already registered by `{}`; `{}` takes over",
                                previous.name, descriptor.name
                            ),
                        )
                        .at(format!("environments.{}", descriptor.name)),
                    );
                }
            }

            registry.environments.push(descriptor);
        }

        registry
    }

    /// Environment registered under `tag` (case-sensitive).
    #[must_use]
    pub fn resolve(&self, tag: &str) -> Option<&Arc<EnvironmentDescriptor>> {
        self.lookup.get(tag)
    }

    /// Every environment that survived validation, in declaration order.
    pub fn environments(&self) -> impl Iterator<Item = &Arc<EnvironmentDescriptor>> {
        self.environments.iter()
    }

    /// Whether no tag is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use pretty_assertions::assert_eq;

    fn tables(source: &str) -> Vec<toml::Table> {
        let root: toml::Table = toml::from_str(source).unwrap();
        root["environments"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_table().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_alias_resolution_symmetry() {
        let sink = CollectingSink::new();
        let registry = Registry::from_descriptors(
            vec![EnvironmentDescriptor::escape("n").with_aliases(["a1", "a2"])],
            &sink,
        );

        let n = registry.resolve("n").unwrap();
        let a1 = registry.resolve("a1").unwrap();
        let a2 = registry.resolve("a2").unwrap();

        assert!(Arc::ptr_eq(n, a1));
        assert!(Arc::ptr_eq(a1, a2));
        assert!(sink.problems().is_empty());
    }

    #[test]
    fn test_duplicate_alias_reported_once_last_wins() {
        let sink = CollectingSink::new();
        let registry = Registry::from_descriptors(
            vec![
                EnvironmentDescriptor::escape("First").with_aliases(["Foo"]),
                EnvironmentDescriptor::escape("Second").with_aliases(["Foo"]),
            ],
            &sink,
        );

        assert_eq!(registry.resolve("Foo").unwrap().name, "Second");
        assert_eq!(sink.problems().len(), 1);
        assert!(sink.problems()[0].message.contains("`Foo`"));
    }

    #[test]
    fn test_alias_equal_to_own_name_is_ignored() {
        let sink = CollectingSink::new();
        let registry = Registry::from_descriptors(
            vec![EnvironmentDescriptor::escape("Same").with_aliases(["Same", "S", "S"])],
            &sink,
        );

        assert!(registry.resolve("S").is_some());
        assert!(sink.problems().is_empty());
    }

    #[test]
    fn test_build_drops_invalid_and_keeps_valid() {
        let sink = CollectingSink::new();
        let registry = Registry::build(
            &tables(
                r#"
[[environments]]
name = "Good"
type = "escape"

[[environments]]
name = "Bad"
type = "escape"
aliases = "not-a-list"
"#,
            ),
            &sink,
        );

        assert!(registry.resolve("Good").is_some());
        assert!(registry.resolve("Bad").is_none());
        assert_eq!(registry.environments().count(), 1);
        assert!(sink.has_errors());
    }

    #[test]
    fn test_build_duplicate_alias_from_config() {
        let sink = CollectingSink::new();
        let registry = Registry::build(
            &tables(
                r#"
[[environments]]
name = "A"
type = "escape"
aliases = ["Foo"]

[[environments]]
name = "B"
type = "noop"
aliases = ["Foo"]
"#,
            ),
            &sink,
        );

        assert_eq!(registry.resolve("Foo").unwrap().name, "B");
        assert_eq!(sink.problems().len(), 1);
    }

    #[test]
    fn test_empty_registry() {
        let registry = Registry::build(&[], &CollectingSink::new());
        assert!(registry.is_empty());
    }
}
