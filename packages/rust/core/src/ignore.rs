//! Ignore rules for directory traversal.
//!
//! A rule is either a glob-like pattern or a predicate over
//! `(relative path, stats)`. An entry is excluded when any rule matches;
//! excluded directories are pruned before the walker descends into them.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;

use filesmith_shared::{FileStats, FilesmithError, Result};

/// Predicate signature for function-based ignore rules.
pub type IgnorePredicate = dyn Fn(&Path, &FileStats) -> bool + Send + Sync;

/// One configured ignore rule.
#[derive(Clone)]
pub enum IgnoreRule {
    /// Glob-like pattern matched against the normalized relative path.
    Pattern(String),
    /// Arbitrary predicate over the relative path and its stats.
    Predicate(Arc<IgnorePredicate>),
}

impl IgnoreRule {
    /// Wrap a closure as a predicate rule.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Path, &FileStats) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// The pattern text, if this is a pattern rule.
    pub fn as_pattern(&self) -> Option<&str> {
        match self {
            Self::Pattern(p) => Some(p),
            Self::Predicate(_) => None,
        }
    }
}

impl fmt::Debug for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(p) => f.debug_tuple("Pattern").field(p).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for IgnoreRule {
    fn from(pattern: &str) -> Self {
        Self::Pattern(pattern.to_string())
    }
}

impl From<String> for IgnoreRule {
    fn from(pattern: String) -> Self {
        Self::Pattern(pattern)
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

enum CompiledRule {
    Glob {
        regex: Regex,
        /// Pattern has no `/`: test the base name instead of the full path.
        match_base: bool,
        /// Pattern ended with `/`: only directories match.
        dir_only: bool,
    },
    Predicate(Arc<IgnorePredicate>),
}

/// Compiled form of an ignore-rule list, shared with the walker thread.
pub struct IgnoreMatcher {
    rules: Vec<CompiledRule>,
}

impl IgnoreMatcher {
    /// Compile `rules`, preserving their order.
    pub fn new(rules: &[IgnoreRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| match rule {
                IgnoreRule::Pattern(pattern) => compile_pattern(pattern),
                IgnoreRule::Predicate(f) => Ok(CompiledRule::Predicate(Arc::clone(f))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether the entry at `rel_path` (relative to the read root) is excluded.
    /// Rules are evaluated in order; the first match wins.
    pub fn is_ignored(&self, rel_path: &Path, stats: &FileStats) -> bool {
        let normalized = normalize(rel_path);
        let base = normalized.rsplit('/').next().unwrap_or(&normalized);

        self.rules.iter().any(|rule| match rule {
            CompiledRule::Glob {
                regex,
                match_base,
                dir_only,
            } => {
                if *dir_only && !stats.is_dir {
                    return false;
                }
                if *match_base {
                    regex.is_match(base)
                } else {
                    regex.is_match(&normalized)
                }
            }
            CompiledRule::Predicate(f) => f(rel_path, stats),
        })
    }
}

/// Join path components with `/`, whatever the platform separator.
pub(crate) fn normalize(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn compile_pattern(pattern: &str) -> Result<CompiledRule> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(FilesmithError::config("ignore pattern must not be empty"));
    }

    let dir_only = trimmed.ends_with('/') && trimmed.len() > 1;
    let body = trimmed.trim_end_matches('/');
    let (body, anchored) = match body.strip_prefix('/') {
        Some(rest) => (rest, true),
        None => (body, false),
    };
    let match_base = !anchored && !body.contains('/');

    let regex = glob_to_regex(body)
        .ok_or_else(|| FilesmithError::config(format!("invalid ignore pattern: {pattern}")))?;

    Ok(CompiledRule::Glob {
        regex,
        match_base,
        dir_only,
    })
}

/// Convert a glob-like pattern to an anchored regex.
///
/// `**/` matches zero or more leading directories, `**` anything, `*` and
/// `?` anything but a separator.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*/", "(?:.*/)?")
        .replace(r"\*\*", ".*")
        .replace(r"\*", "[^/]*")
        .replace(r"\?", "[^/]");
    Regex::new(&format!("^{escaped}$")).ok()
}
