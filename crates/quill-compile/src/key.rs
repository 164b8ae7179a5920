//! Compilation fingerprints.
//!
//! Provides [`CompileKey`] for computing content-based hashes used as cache
//! fingerprints.

use quill_cache::content_hash;

/// Everything that affects a compiled artifact.
///
/// Two jobs with equal keys produce the same artifact, so the cache may hand
/// out the stored one instead of running the toolchain.
#[derive(Debug)]
pub struct CompileKey<'a> {
    /// Full document passed to the engine (class, preamble and source).
    pub document: &'a str,
    /// Engine command.
    pub engine: &'a str,
    /// Engine arguments before substitution.
    pub engine_args: &'a [String],
    /// Extension of the engine's output.
    pub intermediate: &'a str,
    /// Converter command.
    pub converter: &'a str,
    /// Converter arguments before substitution.
    pub converter_args: &'a [String],
}

impl CompileKey<'_> {
    /// Compute the fingerprint for this key.
    ///
    /// # Hash Format
    ///
    /// SHA-256 of `"{engine} {engine_args}:{intermediate}:{converter} {converter_args}:{document}"`,
    /// with arguments joined by a single space.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let content = format!(
            "{} {}:{}:{} {}:{}",
            self.engine,
            self.engine_args.join(" "),
            self.intermediate,
            self.converter,
            self.converter_args.join(" "),
            self.document
        );
        content_hash(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    fn make_key<'a>(document: &'a str, engine: &'a str, engine_args: &'a [String]) -> CompileKey<'a> {
        CompileKey {
            document,
            engine,
            engine_args,
            intermediate: "pdf",
            converter: "dvisvgm",
            converter_args: &[],
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let engine_args = args(&["{input}"]);
        let key1 = make_key("\\draw (0,0);", "lualatex", &engine_args);
        let key2 = make_key("\\draw (0,0);", "lualatex", &engine_args);

        assert_eq!(key1.fingerprint(), key2.fingerprint());
        assert_eq!(key1.fingerprint().len(), 64);
    }

    #[test]
    fn test_one_character_change_matters() {
        let engine_args = args(&["{input}"]);
        let key1 = make_key("\\draw (0,0);", "lualatex", &engine_args);
        let key2 = make_key("\\draw (0,1);", "lualatex", &engine_args);

        assert_ne!(key1.fingerprint(), key2.fingerprint());
    }

    #[test]
    fn test_toolchain_matters() {
        let engine_args = args(&["{input}"]);
        let other_args = args(&["-shell-escape", "{input}"]);
        let base = make_key("x", "lualatex", &engine_args);
        let engine = make_key("x", "pdflatex", &engine_args);
        let flags = make_key("x", "lualatex", &other_args);
        let converter = CompileKey {
            converter: "pdf2svg",
            ..make_key("x", "lualatex", &engine_args)
        };

        assert_ne!(base.fingerprint(), engine.fingerprint());
        assert_ne!(base.fingerprint(), flags.fingerprint());
        assert_ne!(base.fingerprint(), converter.fingerprint());
    }
}
