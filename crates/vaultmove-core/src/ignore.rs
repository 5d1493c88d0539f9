//! Ignore rules shared by size analysis and transfer.
//!
//! Rules follow the transfer tool's filter-file conventions:
//!
//! - one glob per line, blank lines and `#` comments skipped
//! - matching is case-sensitive against the `/`-separated relative path
//! - `*` and `?` never cross a `/`; a `**` segment matches any depth
//! - a rule without a leading `/` may match at any depth (`*.tmp` ignores
//!   `a.tmp` and `x/b.tmp`); a leading `/` anchors it to the folder root
//! - a trailing `/` ignores everything below a directory of that name

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use thiserror::Error;

/// Errors that can occur while loading ignore rules.
#[derive(Debug, Error)]
pub enum IgnoreError {
    /// The ignore file could not be read.
    #[error("Failed to read ignore file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A rule is not a valid glob.
    #[error("Invalid ignore pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Ordered, immutable set of ignore rules.
#[derive(Debug, Clone)]
pub struct IgnoreRuleSet {
    patterns: Vec<String>,
    set: GlobSet,
}

impl IgnoreRuleSet {
    /// A rule set that ignores nothing.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    /// Build a rule set from patterns, skipping blanks and comments.
    pub fn new<I, S>(patterns: I) -> Result<Self, IgnoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept = Vec::new();
        let mut builder = GlobSetBuilder::new();

        for raw in patterns {
            let pattern = raw.as_ref().trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }

            let glob = GlobBuilder::new(&normalize(pattern))
                .literal_separator(true)
                .build()
                .map_err(|source| IgnoreError::Pattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }

        let set = builder.build().map_err(|source| IgnoreError::Pattern {
            pattern: kept.join(", "),
            source,
        })?;

        Ok(Self {
            patterns: kept,
            set,
        })
    }

    /// Parse the contents of an ignore file.
    pub fn parse(text: &str) -> Result<Self, IgnoreError> {
        Self::new(text.lines())
    }

    /// Load an ignore file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IgnoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| IgnoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = Self::parse(&text)?;
        tracing::debug!(path = %path.display(), rules = rules.len(), "loaded ignore rules");
        Ok(rules)
    }

    /// Load an ignore file, treating a missing file as an empty rule set.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Result<Self, IgnoreError> {
        match Self::load(path) {
            Err(IgnoreError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(Self::empty())
            }
            other => other,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// The rules in the order they were given.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a path relative to the folder root is ignored.
    pub fn is_ignored(&self, relative: impl AsRef<Path>) -> bool {
        !self.is_empty() && self.set.is_match(to_rule_path(relative.as_ref()))
    }

    /// The first rule matching a relative path.
    pub fn first_match(&self, relative: impl AsRef<Path>) -> Option<&str> {
        if self.is_empty() {
            return None;
        }
        self.set
            .matches(to_rule_path(relative.as_ref()))
            .into_iter()
            .min()
            .map(|index| self.patterns[index].as_str())
    }

    /// Render the rules as a filter file for the transfer tool.
    pub fn to_filter_file(&self) -> String {
        let mut out = String::new();
        for pattern in &self.patterns {
            out.push_str(pattern);
            out.push('\n');
        }
        out
    }
}

impl Default for IgnoreRuleSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Translate a rule into the glob actually matched.
fn normalize(pattern: &str) -> String {
    let pattern = pattern.replace('\\', "/");
    let (anchored, body) = match pattern.strip_prefix('/') {
        Some(rest) => (true, rest.to_string()),
        None => (false, pattern),
    };

    let body = if body.ends_with('/') {
        format!("{body}**")
    } else {
        body
    };

    if anchored || body.starts_with("**") {
        body
    } else {
        format!("**/{body}")
    }
}

fn to_rule_path(relative: &Path) -> String {
    relative.to_string_lossy().replace('\\', "/")
}
