//! Environment variable expansion for configuration strings.
//!
//! Only the braced forms are recognized:
//! - `${VAR}` - value of VAR, error if unset
//! - `${VAR:-default}` - value of VAR, or `default` when unset
//!
//! Bare `$VAR` is left alone so TeX snippets and shell-like arguments that
//! contain dollar signs survive untouched.

use crate::ConfigError;

/// Expand `${...}` references in `value`.
///
/// `field` is the dotted config path reported when a variable is missing.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, MissingVar> {
        std::env::var(var)
            .map(Some)
            .map_err(|_| MissingVar(var.to_owned()))
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.0),
    })
}

/// Expand every entry of a list in place, reporting `field[index]` on error.
pub(crate) fn expand_env_list(values: &mut [String], field: &str) -> Result<(), ConfigError> {
    for (index, value) in values.iter_mut().enumerate() {
        *value = expand_env(value, &format!("{field}[{index}]"))?;
    }
    Ok(())
}

/// Name of a variable that had no value and no default.
struct MissingVar(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_set_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("QUILL_TEST_ENGINE", "xelatex");
        }
        let result = expand_env("${QUILL_TEST_ENGINE}", "compile.engine").unwrap();
        assert_eq!(result, "xelatex");
        unsafe {
            std::env::remove_var("QUILL_TEST_ENGINE");
        }
    }

    #[test]
    fn test_expand_default_when_unset() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("QUILL_TEST_UNSET");
        }
        let result = expand_env("${QUILL_TEST_UNSET:-lualatex}", "compile.engine").unwrap();
        assert_eq!(result, "lualatex");
    }

    #[test]
    fn test_expand_missing_var_names_field() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("QUILL_TEST_MISSING");
        }
        let err = expand_env("${QUILL_TEST_MISSING}", "cache.dir").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("QUILL_TEST_MISSING"));
        assert!(err.to_string().contains("cache.dir"));
    }

    #[test]
    fn test_expand_embedded_in_path() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("QUILL_TEST_HOME", "/opt/tex");
        }
        let result = expand_env("${QUILL_TEST_HOME}/bin/lualatex", "compile.engine").unwrap();
        assert_eq!(result, "/opt/tex/bin/lualatex");
        unsafe {
            std::env::remove_var("QUILL_TEST_HOME");
        }
    }

    #[test]
    fn test_bare_dollar_untouched() {
        let result = expand_env("$x^2$", "compile.engine_args").unwrap();
        assert_eq!(result, "$x^2$");
    }

    #[test]
    fn test_expand_list_reports_index() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("QUILL_TEST_LIST_MISSING");
        }
        let mut values = vec!["--pdf".to_owned(), "${QUILL_TEST_LIST_MISSING}".to_owned()];
        let err = expand_env_list(&mut values, "compile.converter_args").unwrap_err();
        assert!(err.to_string().contains("compile.converter_args[1]"));
    }
}
