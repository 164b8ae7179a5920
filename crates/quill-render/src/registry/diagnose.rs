//! Typed reading of raw environment tables.
//!
//! Every field is checked and every mismatch is collected with its property
//! path, so one run reports all mistakes instead of stopping at the first.
//! An environment with any error-severity problem is dropped.

use std::collections::BTreeSet;

use regex::Regex;
use toml::{Table, Value};

use super::descriptor::{
    Component, EnvironmentDescriptor, EnvironmentKind, SelfCloseStyle, Transformer,
};
use crate::attrs::{AttrValue, AttributeAllowlist, Attributes};
use crate::diagnostics::{Problem, ProblemKind};

/// Fields valid on every environment.
const COMMON_FIELDS: &[&str] = &[
    "name",
    "type",
    "aliases",
    "defaultAttributes",
    "attributeForwardingAllowlist",
    "attributeForwardingBlocklist",
    "component",
    "respectSelfClosing",
    "selfCloseOutputWith",
    "removeParagraphTag",
    "transformers",
];

/// Collects typed values and problems for one table.
struct Diagnoser<'a> {
    table: &'a Table,
    path: String,
    problems: Vec<Problem>,
}

impl<'a> Diagnoser<'a> {
    fn new(table: &'a Table, path: String) -> Self {
        Self {
            table,
            path,
            problems: Vec::new(),
        }
    }

    fn field_path(&self, key: &str) -> String {
        format!("{}.{key}", self.path)
    }

    fn mismatch(&mut self, path: String, expected: &str, found: &Value) {
        self.problems.push(
            Problem::error(
                ProblemKind::Config,
                format!("expected {expected}, found {}", found.type_str()),
            )
            .at(path),
        );
    }

    fn invalid(&mut self, path: String, message: String) {
        self.problems
            .push(Problem::error(ProblemKind::Config, message).at(path));
    }

    fn string(&mut self, key: &str) -> Option<String> {
        match self.table.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => {
                self.mismatch(self.field_path(key), "a string", other);
                None
            }
        }
    }

    fn bool(&mut self, key: &str) -> Option<bool> {
        match self.table.get(key)? {
            Value::Boolean(b) => Some(*b),
            other => {
                self.mismatch(self.field_path(key), "a boolean", other);
                None
            }
        }
    }

    fn string_list(&mut self, key: &str) -> Option<Vec<String>> {
        let path = self.field_path(key);
        match self.table.get(key)? {
            Value::Array(items) => Some(self.strings_in(items, &path)),
            other => {
                self.mismatch(path, "an array of strings", other);
                None
            }
        }
    }

    fn strings_in(&mut self, items: &[Value], path: &str) -> Vec<String> {
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match item {
                Value::String(s) => out.push(s.clone()),
                other => self.mismatch(format!("{path}[{index}]"), "a string", other),
            }
        }
        out
    }

    fn one_of<T: Copy>(&mut self, key: &str, choices: &[(&str, T)]) -> Option<T> {
        let value = self.string(key)?;
        if let Some((_, choice)) = choices.iter().find(|(name, _)| *name == value) {
            return Some(*choice);
        }
        let expected: Vec<_> = choices.iter().map(|(name, _)| format!("\"{name}\"")).collect();
        self.invalid(
            self.field_path(key),
            format!("unknown value \"{value}\" (expected one of {})", expected.join(", ")),
        );
        None
    }

    fn attributes(&mut self, key: &str) -> Option<Attributes> {
        let path = self.field_path(key);
        let table = match self.table.get(key)? {
            Value::Table(table) => table,
            other => {
                self.mismatch(path, "a table", other);
                return None;
            }
        };

        let mut attrs = Attributes::new();
        for (name, value) in table {
            let value = match value {
                Value::String(s) => AttrValue::Text(s.clone()),
                Value::Boolean(b) => AttrValue::Bool(*b),
                Value::Integer(n) => AttrValue::Text(n.to_string()),
                Value::Float(n) => AttrValue::Text(n.to_string()),
                other => {
                    self.mismatch(format!("{path}.{name}"), "a string, boolean or number", other);
                    continue;
                }
            };
            attrs.set(name.clone(), value);
        }
        Some(attrs)
    }

    fn allowlist(&mut self, key: &str) -> Option<AttributeAllowlist> {
        let path = self.field_path(key);
        match self.table.get(key)? {
            Value::String(s) if s == "all" => Some(AttributeAllowlist::All),
            Value::Array(items) => {
                let names = self.strings_in(items, &path);
                Some(AttributeAllowlist::Only(names.into_iter().collect()))
            }
            other => {
                self.mismatch(path, "\"all\" or an array of strings", other);
                None
            }
        }
    }

    fn transformers(&mut self, key: &str) -> Option<(Vec<Transformer>, Vec<Transformer>)> {
        let path = self.field_path(key);
        let table = match self.table.get(key)? {
            Value::Table(table) => table,
            other => {
                self.mismatch(path, "a table", other);
                return None;
            }
        };

        let mut read = |stage: &str| -> Vec<Transformer> {
            let stage_path = format!("{path}.{stage}");
            match table.get(stage) {
                None => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .enumerate()
                    .filter_map(|(index, item)| self.transformer(item, &format!("{stage_path}[{index}]")))
                    .collect(),
                Some(other) => {
                    self.mismatch(stage_path, "an array of transformers", other);
                    Vec::new()
                }
            }
        };
        let pre = read("pre");
        let post = read("post");

        for unknown in table.keys().filter(|k| !matches!(k.as_str(), "pre" | "post")) {
            self.problems.push(
                Problem::warning(ProblemKind::Config, "unknown field ignored")
                    .at(format!("{path}.{unknown}")),
            );
        }

        Some((pre, post))
    }

    fn transformer(&mut self, value: &Value, path: &str) -> Option<Transformer> {
        match value {
            Value::Array(pair) => match pair.as_slice() {
                [Value::String(find), Value::String(replace)] => Some(Transformer::Replace {
                    find: find.clone(),
                    replace: replace.clone(),
                }),
                _ => {
                    self.invalid(
                        path.to_owned(),
                        "expected a [\"find\", \"replace\"] pair of strings".to_owned(),
                    );
                    None
                }
            },
            Value::Table(table) => {
                let pattern = table.get("pattern").and_then(Value::as_str);
                let replace = table.get("replace").and_then(Value::as_str);
                let (Some(pattern), Some(replace)) = (pattern, replace) else {
                    self.invalid(
                        path.to_owned(),
                        "expected string fields `pattern` and `replace`".to_owned(),
                    );
                    return None;
                };
                match Regex::new(pattern) {
                    Ok(pattern) => Some(Transformer::Regex {
                        pattern,
                        replace: replace.to_owned(),
                    }),
                    Err(e) => {
                        self.invalid(format!("{path}.pattern"), format!("invalid regex: {e}"));
                        None
                    }
                }
            }
            other => {
                self.mismatch(path.to_owned(), "a pair or a { pattern, replace } table", other);
                None
            }
        }
    }

    fn warn_unknown_fields(&mut self, kind_fields: &[&str]) {
        for key in self.table.keys() {
            if !COMMON_FIELDS.contains(&key.as_str()) && !kind_fields.contains(&key.as_str()) {
                self.problems.push(
                    Problem::warning(ProblemKind::Config, "unknown field ignored")
                        .at(self.field_path(key)),
                );
            }
        }
    }

    fn has_errors(&self) -> bool {
        self.problems
            .iter()
            .any(|p| p.severity == crate::diagnostics::Severity::Error)
    }
}

#[derive(Clone, Copy)]
enum KindName {
    Escape,
    Code,
    Math,
    Compile,
    Noop,
}

const KIND_NAMES: &[(&str, KindName)] = &[
    ("escape", KindName::Escape),
    ("code", KindName::Code),
    ("math", KindName::Math),
    ("compile", KindName::Compile),
    ("noop", KindName::Noop),
];

const SELF_CLOSE_STYLES: &[(&str, SelfCloseStyle)] = &[
    ("auto", SelfCloseStyle::Auto),
    ("/>", SelfCloseStyle::Slash),
    (" />", SelfCloseStyle::SpaceSlash),
];

/// Read the kind and its options.
fn read_kind(d: &mut Diagnoser<'_>, kind: KindName) -> EnvironmentKind {
    match kind {
        KindName::Escape => {
            d.warn_unknown_fields(&["escape"]);
            let mut html = true;
            let mut braces = true;
            match d.table.get("escape") {
                None => {}
                Some(Value::Table(options)) => {
                    let mut nested = Diagnoser::new(options, d.field_path("escape"));
                    html = nested.bool("html").unwrap_or(html);
                    braces = nested.bool("braces").unwrap_or(braces);
                    d.problems.append(&mut nested.problems);
                }
                Some(other) => d.mismatch(d.field_path("escape"), "a table", other),
            }
            EnvironmentKind::Escape { html, braces }
        }
        KindName::Code => {
            d.warn_unknown_fields(&["lang", "inline"]);
            EnvironmentKind::Code {
                lang: d.string("lang"),
                inline: d.bool("inline"),
            }
        }
        KindName::Math => {
            d.warn_unknown_fields(&["display"]);
            EnvironmentKind::Math {
                display: d.bool("display"),
            }
        }
        KindName::Compile => {
            d.warn_unknown_fields(&["engine", "preamble", "documentClass"]);
            EnvironmentKind::Compile {
                engine: d.string("engine"),
                preamble: d.string("preamble"),
                document_class: d.string("documentClass"),
            }
        }
        KindName::Noop => {
            d.warn_unknown_fields(&[]);
            EnvironmentKind::Noop
        }
    }
}

/// Convert one raw `[[environments]]` table into a descriptor.
///
/// Returns the descriptor (or `None` when the environment must be dropped)
/// together with every problem found.
pub(crate) fn diagnose_environment(
    table: &Table,
    index: usize,
) -> (Option<EnvironmentDescriptor>, Vec<Problem>) {
    let mut d = Diagnoser::new(table, format!("environments[{index}]"));

    let name = match table.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => Some(name.clone()),
        Some(Value::String(_)) => {
            d.invalid(d.field_path("name"), "name cannot be empty".to_owned());
            None
        }
        Some(other) => {
            d.mismatch(d.field_path("name"), "a string", other);
            None
        }
        None => {
            d.invalid(d.field_path("name"), "missing required field".to_owned());
            None
        }
    };
    if let Some(name) = &name {
        d.path = format!("environments.{name}");
    }

    let kind = if table.contains_key("type") {
        d.one_of("type", KIND_NAMES)
    } else {
        d.invalid(d.field_path("type"), "missing required field".to_owned());
        None
    };
    let kind = kind.map(|k| read_kind(&mut d, k));

    let aliases = d.string_list("aliases");
    let default_attributes = d.attributes("defaultAttributes");
    let allowlist = d.allowlist("attributeForwardingAllowlist");
    let blocklist = d.string_list("attributeForwardingBlocklist");
    let component = d.string("component");
    let respect_self_closing = d.bool("respectSelfClosing");
    let self_close_style = d.one_of("selfCloseOutputWith", SELF_CLOSE_STYLES);
    let remove_paragraph = d.bool("removeParagraphTag");
    let transformers = d.transformers("transformers");

    if let Some(component) = &component
        && component.trim().is_empty()
    {
        d.invalid(d.field_path("component"), "component cannot be empty".to_owned());
    }

    let (Some(name), Some(kind)) = (name, kind) else {
        return (None, d.problems);
    };
    if d.has_errors() {
        let path = d.path.clone();
        d.problems.push(
            Problem::error(ProblemKind::Config, format!("environment `{name}` dropped")).at(path),
        );
        return (None, d.problems);
    }

    let mut env = EnvironmentDescriptor::new(name, kind);
    if let Some(aliases) = aliases {
        env.aliases = aliases;
    }
    if let Some(attrs) = default_attributes {
        env.default_attributes = attrs;
    }
    if let Some(allowlist) = allowlist {
        env.allowlist = allowlist;
    }
    if let Some(blocklist) = blocklist {
        env.blocklist = blocklist.into_iter().collect::<BTreeSet<_>>();
    }
    if let Some(component) = component {
        env.component = match component.as_str() {
            "none" => Component::None,
            "self" => Component::SelfTag,
            _ => Component::Tag(component),
        };
    }
    if let Some(respect) = respect_self_closing {
        env.respect_self_closing = respect;
    }
    if let Some(style) = self_close_style {
        env.self_close_style = style;
    }
    if let Some(remove) = remove_paragraph {
        env.remove_paragraph = remove;
    }
    if let Some((pre, post)) = transformers {
        env.transformers.pre = pre;
        env.transformers.post = post;
    }

    (Some(env), d.problems)
}
