//! Route predicates.
//!
//! Configuration carries predicates as loosely typed `{name, args}` pairs.
//! They are compiled once into [`Predicate`] through a [`PredicateRegistry`]
//! that maps a predicate name to its parser.
//!
//! # Design Decisions
//! - Only `Path` is evaluated today
//! - Names without a parser compile to `Unsupported`, which never matches but
//!   keeps the original payload so it round-trips back into configuration
//! - A malformed `Path` predicate is a configuration error, not a silent skip

use std::collections::HashMap;

use serde_json::{json, Value};
use thiserror::Error;

use crate::config::PredicateDefinition;
use crate::routing::matcher::{Matcher, PathPattern};

/// Name of the path predicate in configuration.
pub const PATH: &str = "Path";

/// Errors raised while compiling a predicate definition.
#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("predicate `{name}` requires a string `pattern` argument")]
    MissingPattern { name: String },

    #[error("invalid path pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled route predicate.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Matches the request path against a pattern.
    Path(PathPattern),
    /// A predicate kind with no registered evaluator (header, query, weight...).
    Unsupported { name: String, args: Value },
}

impl Predicate {
    /// Build a `Path` predicate directly from a pattern.
    pub fn path(pattern: &str) -> Result<Self, PredicateError> {
        PathPattern::new(pattern)
            .map(Predicate::Path)
            .map_err(|source| PredicateError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// The configuration name of this predicate.
    pub fn name(&self) -> &str {
        match self {
            Predicate::Path(_) => PATH,
            Predicate::Unsupported { name, .. } => name.as_str(),
        }
    }

    /// Convert back to the configuration shape.
    pub fn to_definition(&self) -> PredicateDefinition {
        match self {
            Predicate::Path(pattern) => PredicateDefinition {
                name: PATH.to_string(),
                args: json!({ "pattern": pattern.as_str() }),
            },
            Predicate::Unsupported { name, args } => PredicateDefinition {
                name: name.clone(),
                args: args.clone(),
            },
        }
    }
}

impl Matcher for Predicate {
    fn matches(&self, path: &str) -> bool {
        match self {
            Predicate::Path(pattern) => pattern.matches(path),
            Predicate::Unsupported { .. } => false,
        }
    }
}

/// Parses the `args` payload of one predicate kind.
pub type PredicateParser = fn(&Value) -> Result<Predicate, PredicateError>;

/// Maps predicate names to their parsers.
#[derive(Debug, Clone)]
pub struct PredicateRegistry {
    parsers: HashMap<String, PredicateParser>,
}

impl PredicateRegistry {
    /// A registry with no parsers; every predicate compiles to `Unsupported`.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// A registry with the built-in `Path` parser.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(PATH, parse_path);
        registry
    }

    /// Register (or replace) the parser for a predicate name.
    pub fn register(&mut self, name: impl Into<String>, parser: PredicateParser) {
        self.parsers.insert(name.into(), parser);
    }

    /// Returns true if a parser exists for the name.
    pub fn supports(&self, name: &str) -> bool {
        self.parsers.contains_key(name)
    }

    /// Compile a definition into a predicate.
    pub fn compile(&self, definition: &PredicateDefinition) -> Result<Predicate, PredicateError> {
        match self.parsers.get(&definition.name) {
            Some(parser) => parser(&definition.args),
            None => {
                tracing::warn!(
                    predicate = %definition.name,
                    "No evaluator registered for predicate; it will never match"
                );
                Ok(Predicate::Unsupported {
                    name: definition.name.clone(),
                    args: definition.args.clone(),
                })
            }
        }
    }
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn parse_path(args: &Value) -> Result<Predicate, PredicateError> {
    let pattern = args
        .get("pattern")
        .and_then(Value::as_str)
        .ok_or_else(|| PredicateError::MissingPattern {
            name: PATH.to_string(),
        })?;
    Predicate::path(pattern)
}
