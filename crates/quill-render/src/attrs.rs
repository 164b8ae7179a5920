//! Tag attributes.
//!
//! Attributes keep their source order so forwarded output matches what the
//! author wrote. Valueless attributes (`<Tag flag>`) are boolean `true`.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::html::escape_attr;

/// A single attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrValue {
    /// Quoted or unquoted text, kept as written.
    Text(String),
    /// Flag attribute. `false` is only reachable through default attributes.
    Bool(bool),
}

impl AttrValue {
    /// Text value, if this is a text attribute.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Bool(_) => None,
        }
    }

    /// Interpret the value as a flag.
    ///
    /// `"true"` and `"false"` text values are accepted so that
    /// `display="false"` behaves like the author expects.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Text(text) => match text.as_str() {
                "true" | "" => Some(true),
                "false" => Some(false),
                _ => None,
            },
        }
    }
}

/// Ordered attribute list with unique names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    items: Vec<(String, AttrValue)>,
}

impl Attributes {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing an existing value in place.
    pub fn set(&mut self, name: impl Into<String>, value: AttrValue) {
        let name = name.into();
        if let Some(slot) = self.items.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.items.push((name, value));
        }
    }

    /// Value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.items.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Text value of `name`.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttrValue::as_text)
    }

    /// Flag value of `name`.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(AttrValue::as_bool)
    }

    /// Iterate in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.items.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Shallow merge: `defaults` first, then `self` on top.
    #[must_use]
    pub fn over(&self, defaults: &Attributes) -> Attributes {
        let mut merged = defaults.clone();
        for (name, value) in &self.items {
            merged.set(name.clone(), value.clone());
        }
        merged
    }

    /// Keep the attributes allowed by `allow` and not named in `block`.
    #[must_use]
    pub fn forwarded(&self, allow: &AttributeAllowlist, block: &BTreeSet<String>) -> Attributes {
        Attributes {
            items: self
                .items
                .iter()
                .filter(|(name, _)| allow.allows(name) && !block.contains(name))
                .cloned()
                .collect(),
        }
    }

    /// Render as ` name="value" flag` for an opening tag.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.items {
            match value {
                AttrValue::Text(text) => {
                    let _ = write!(out, r#" {name}="{}""#, escape_attr(text));
                }
                AttrValue::Bool(true) => {
                    out.push(' ');
                    out.push_str(name);
                }
                AttrValue::Bool(false) => {}
            }
        }
        out
    }
}

impl<N: Into<String>> FromIterator<(N, AttrValue)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (N, AttrValue)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (name, value) in iter {
            attrs.set(name, value);
        }
        attrs
    }
}

/// Which attributes may be forwarded to an output tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeAllowlist {
    /// Every attribute.
    All,
    /// Only the named attributes.
    Only(BTreeSet<String>),
}

impl AttributeAllowlist {
    fn allows(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.contains(name),
        }
    }
}

/// Parse the attribute section of an opening tag.
///
/// `source` is everything between the tag name and the closing `>` (or
/// `/>`). Values may be double-quoted, single-quoted or bare.
pub(crate) fn parse_attributes(source: &str) -> Attributes {
    let mut attrs = Attributes::new();
    let bytes = source.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'/' | b'"' | b'\'')
        {
            i += 1;
        }
        if name_start == i {
            // Stray quote: skip it so parsing always advances.
            i += 1;
            continue;
        }
        let name = &source[name_start..i];

        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'=' {
            attrs.set(name, AttrValue::Bool(true));
            continue;
        }
        j += 1;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }

        let value = match bytes.get(j) {
            Some(&quote @ (b'"' | b'\'')) => {
                let value_start = j + 1;
                let value_end = source[value_start..]
                    .find(char::from(quote))
                    .map_or(source.len(), |p| value_start + p);
                i = (value_end + 1).min(source.len());
                &source[value_start..value_end]
            }
            Some(_) => {
                let value_start = j;
                while j < bytes.len() && !bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                i = j;
                &source[value_start..j]
            }
            None => {
                i = j;
                ""
            }
        };
        attrs.set(name, AttrValue::Text(value.to_owned()));
    }

    attrs
}

/// Split a fence info string into the language and its attributes.
///
/// `tikz ref=fig1 engine="pdflatex"` yields `tikz` and two attributes.
pub(crate) fn parse_fence_info(info: &str) -> (&str, Attributes) {
    let info = info.trim();
    let split = info.find(char::is_whitespace).unwrap_or(info.len());
    (&info[..split], parse_attributes(&info[split..]))
}
