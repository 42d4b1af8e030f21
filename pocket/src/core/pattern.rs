//! Directory pattern matching for scope include/exclude rules.
//!
//! Patterns are regular expressions anchored at the start of a `/`-separated
//! relative directory. A pattern matches a directory exactly or any directory
//! beneath it: `services` matches `services` and `services/api`, never
//! `services-old`.

use regex::Regex;

/// A compiled include/exclude pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    prefix: Regex,
    exact: Regex,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let source = normalize(pattern);
        // "." is the repository root, not the regex wildcard.
        let body = if source == "." {
            regex::escape(".")
        } else {
            source.clone()
        };
        let prefix = Regex::new(&format!("^(?:{body})(?:/|$)"))?;
        let exact = Regex::new(&format!("^(?:{body})$"))?;
        Ok(Self {
            source,
            prefix,
            exact,
        })
    }

    /// The normalized pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True if `dir` equals the pattern or lies beneath it.
    pub fn matches(&self, dir: &str) -> bool {
        self.prefix.is_match(dir)
    }

    /// True if `dir` matches the whole pattern, without the sub-path extension.
    pub fn matches_exactly(&self, dir: &str) -> bool {
        self.exact.is_match(dir)
    }

    /// True if the pattern contains no regex syntax and therefore names one directory.
    pub fn is_literal(&self) -> bool {
        self.source == "." || regex::escape(&self.source) == self.source
    }
}

/// Strip `./` prefixes and trailing slashes so `./pkg/` and `pkg` compare equal.
pub fn normalize(pattern: &str) -> String {
    let mut trimmed = pattern.trim();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Compile every pattern, failing on the first invalid one.
pub fn compile_all<'a, I>(patterns: I) -> Result<Vec<PathPattern>, (String, regex::Error)>
where
    I: IntoIterator<Item = &'a String>,
{
    patterns
        .into_iter()
        .map(|raw| PathPattern::new(raw).map_err(|err| (raw.clone(), err)))
        .collect()
}
