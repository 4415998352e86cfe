//! File eligibility rules for a watched directory.

use glob::Pattern;

use super::error::ReaderError;

/// Pure predicate deciding whether a file name takes part in discovery.
///
/// A file is eligible when it is not hidden (if hidden files are ignored),
/// does not end with any ignored suffix, and matches the valid-file glob.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    ignore_hidden: bool,
    suffixes: Vec<String>,
    pattern: Pattern,
}

impl IgnoreFilter {
    /// Build a filter from its configuration strings.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::InvalidPattern` if `valid_pattern` is not a valid glob.
    pub fn new(
        ignore_hidden: bool,
        suffixes: Vec<String>,
        valid_pattern: &str,
    ) -> Result<Self, ReaderError> {
        let pattern = Pattern::new(valid_pattern).map_err(|e| ReaderError::InvalidPattern {
            pattern: valid_pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            ignore_hidden,
            suffixes: suffixes.into_iter().filter(|s| !s.is_empty()).collect(),
            pattern,
        })
    }

    /// Check whether a bare file name is eligible.
    #[must_use]
    pub fn is_eligible(&self, name: &str) -> bool {
        if self.ignore_hidden && name.starts_with('.') {
            return false;
        }
        if self.suffixes.iter().any(|s| name.ends_with(s.as_str())) {
            return false;
        }
        self.pattern.matches(name)
    }
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        Self {
            ignore_hidden: true,
            suffixes: Vec::new(),
            pattern: Pattern::new("*").unwrap_or_default(),
        }
    }
}
