//! Fatal render errors.
//!
//! These signal a broken pipeline invariant, never bad user input: user
//! mistakes are reported as [`Problem`](crate::Problem)s and rendering goes on.

/// Internal-consistency failure while rendering a document.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The dispatcher was handed a tag the registry does not know.
    #[error("no verbatim environment registered for <{0}>")]
    UnknownEnvironment(String),
    /// A token in the rendered output has no saved fragment.
    #[error("placeholder {0} has no saved fragment")]
    UnknownToken(String),
    /// A saved token did not survive the Markdown pass.
    #[error("placeholder {0} was lost by the markdown engine")]
    MissingToken(String),
    /// A saved token appears more than once in the rendered output.
    #[error("placeholder {0} appears more than once in the rendered output")]
    DuplicateToken(String),
}
