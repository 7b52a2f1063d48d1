//! Subject line templating.
//!
//! Only two placeholders exist: `{{ level }}` and `{{ message }}`. Anything
//! richer belongs in the upstream formatter that produces the display text.

use regex::{Captures, Regex};
use std::fmt;
use std::sync::LazyLock;

/// Matches `{{ level }}` / `{{ message }}` with any inner whitespace, any case
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\{\{\s*(level|message)\s*\}\}").unwrap());

/// Subject used when none is configured
pub const DEFAULT_SUBJECT: &str = "Log Message";

/// An immutable subject template.
///
/// Rendering always produces a new string; the template source is never
/// touched, so one template can serve any number of concurrent dispatches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectTemplate {
    source: String,
}

impl SubjectTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// The unrendered template text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Substitute every placeholder in a single pass.
    ///
    /// Values are inserted literally: a `$` or a `{{ level }}` inside the
    /// message is not expanded again.
    pub fn render(&self, level: &str, message_line: &str) -> String {
        PLACEHOLDER
            .replace_all(&self.source, |caps: &Captures<'_>| {
                if caps[1].eq_ignore_ascii_case("level") {
                    level.to_string()
                } else {
                    message_line.to_string()
                }
            })
            .into_owned()
    }
}

impl Default for SubjectTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_SUBJECT)
    }
}

impl fmt::Display for SubjectTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
