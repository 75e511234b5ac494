//! File-name wildcard matching for directory enumeration.

use regex::Regex;

use crate::error::{VfsError, VfsResult};

/// A case-insensitive `*`/`?` wildcard pattern matched against file names.
///
/// `*.*` and `*` match every name, including names without an extension.
///
/// # Examples
///
/// ```
/// use s3vfs_core::pattern::SearchPattern;
///
/// let pattern = SearchPattern::new("*.JPG").unwrap();
/// assert!(pattern.is_match("photo.jpg"));
/// assert!(!pattern.is_match("photo.png"));
/// ```
#[derive(Debug, Clone)]
pub struct SearchPattern {
    source: String,
    regex: Option<Regex>,
}

impl SearchPattern {
    /// Compile a wildcard pattern.
    pub fn new(pattern: &str) -> VfsResult<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() || trimmed == "*" || trimmed == "*.*" {
            return Ok(Self::all());
        }

        let mut expr = String::with_capacity(trimmed.len() + 8);
        expr.push_str("(?i)^");
        for c in trimmed.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                c => expr.push_str(&regex::escape(&c.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| {
            VfsError::invalid_operation(format!("invalid search pattern {pattern:?}: {e}"))
        })?;
        Ok(Self {
            source: trimmed.to_owned(),
            regex: Some(regex),
        })
    }

    /// A pattern that matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self {
            source: "*".to_owned(),
            regex: None,
        }
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `name` (a single path segment) matches.
    #[must_use]
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.as_ref().is_none_or(|r| r.is_match(name))
    }
}

impl Default for SearchPattern {
    fn default() -> Self {
        Self::all()
    }
}
