//! Path pattern matching.
//!
//! # Responsibilities
//! - Compile a `Path` predicate pattern once, at route construction
//! - Evaluate the compiled pattern against a request path
//!
//! # Pattern Forms
//! - `/api/**` → prefix match on `/api` (plain `starts_with`, no slash normalization)
//! - `/api/*/detail` → anchored glob, every `*` matches any run of characters,
//!   including `/`
//! - `/api/users` → exact match
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Regex is only compiled for the glob form; exact and prefix stay string compares

use regex::Regex;

/// Trait for matching a request path against a condition.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the path satisfies this condition.
    fn matches(&self, path: &str) -> bool;
}

/// A compiled `Path` predicate pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Exact,
    Prefix(String),
    Glob(Regex),
}

impl PathPattern {
    /// Compile a pattern.
    pub fn new(pattern: impl Into<String>) -> Result<Self, regex::Error> {
        let raw = pattern.into();
        let kind = if let Some(prefix) = raw.strip_suffix("/**") {
            PatternKind::Prefix(prefix.to_string())
        } else if raw.contains('*') {
            PatternKind::Glob(compile_glob(&raw)?)
        } else {
            PatternKind::Exact
        };
        Ok(Self { raw, kind })
    }

    /// The pattern as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Matcher for PathPattern {
    fn matches(&self, path: &str) -> bool {
        match &self.kind {
            PatternKind::Exact => path == self.raw,
            PatternKind::Prefix(prefix) => path.starts_with(prefix.as_str()),
            PatternKind::Glob(re) => re.is_match(path),
        }
    }
}

/// Escape every literal segment and join them with `.*`, anchored at both ends.
fn compile_glob(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body))
}
