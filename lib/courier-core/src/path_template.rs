//! Relative URL templates such as `users/{id}/repos?sort=desc`.

use std::fmt;

/// A relative URL template with `{name}` placeholders.
///
/// Only names matching `[a-zA-Z][a-zA-Z0-9_-]*` count as placeholders;
/// any other braces are kept as literal text.
///
/// ```
/// use courier_core::PathTemplate;
///
/// let template = PathTemplate::new("repos/{owner}/{repo}/contributors?per_page=100");
/// assert_eq!(template.placeholders(), ["owner", "repo"]);
/// assert_eq!(template.query(), Some("per_page=100"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathTemplate(String);

impl PathTemplate {
    /// Create a template.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Get the template string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Query part of the template, after the first `?`.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.0.split_once('?').map(|(_, query)| query)
    }

    /// Distinct placeholder names, in order of first appearance.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for name in scan(&self.0) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Whether `{name}` appears in the template.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        scan(&self.0).any(|found| found == name)
    }

    /// Placeholders found in the query part.
    #[must_use]
    pub fn query_placeholders(&self) -> Vec<&str> {
        self.query().map(|query| scan(query).collect()).unwrap_or_default()
    }

    /// Whether `name` is a valid placeholder name.
    #[must_use]
    pub fn is_valid_name(name: &str) -> bool {
        let mut chars = name.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

/// Iterate over the valid `{name}` placeholders of `text`.
fn scan(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        loop {
            let open = rest.find('{')?;
            let candidate = rest.get(open + 1..)?;
            let Some(close) = candidate.find('}') else {
                rest = "";
                return None;
            };
            let name = candidate.get(..close)?;
            if PathTemplate::is_valid_name(name) {
                rest = candidate.get(close + 1..).unwrap_or_default();
                return Some(name);
            }
            rest = candidate;
        }
    })
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PathTemplate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
