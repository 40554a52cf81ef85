//! Error types for grammar compilation and declaration callbacks

use std::fmt;

/// Errors raised while compiling a grammar declaration into matchers.
///
/// These are configuration errors: they surface once, when the grammar is
/// first compiled, and are never produced per document.
#[derive(Debug)]
pub enum CompileError {
    /// A closing bracket in a template had no matching opening bracket
    UnopenedBracket { pattern: String },
    /// A template ended inside an unclosed bracket
    UnclosedBracket { pattern: String },
    /// A template contained no fragments at all
    EmptyTemplate { pattern: String },
    /// A pattern declaration listed no template alternatives
    EmptyAlternatives { pattern: String },
    /// A single-alternative pattern resolved back to itself
    LoopedDefinition { pattern: String },
    /// A `{name}` reference named a scope that no repository defines
    UnresolvedScope { pattern: String, scope: String },
    /// A scope declaration has no end delimiters (or no begin delimiters
    /// while the grammar uses explicit block boundaries)
    EmptyScopeDelimiter { scope: String },
    /// A scope with implicit boundaries directly lists itself as an
    /// interior pattern
    NestedImplicitScope { scope: String },
    /// A raw `/re/` fragment or exclusion expression failed to compile
    BadRegex {
        pattern: String,
        source: regex::Error,
    },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnopenedBracket { pattern } => {
                write!(f, "closing bracket without an opening one in pattern '{}'", pattern)
            }
            CompileError::UnclosedBracket { pattern } => {
                write!(f, "unclosed bracket in pattern '{}'", pattern)
            }
            CompileError::EmptyTemplate { pattern } => {
                write!(f, "empty template in pattern '{}'", pattern)
            }
            CompileError::EmptyAlternatives { pattern } => {
                write!(f, "pattern '{}' declares no template alternatives", pattern)
            }
            CompileError::LoopedDefinition { pattern } => {
                write!(f, "looped definition: pattern '{}' resolves to itself", pattern)
            }
            CompileError::UnresolvedScope { pattern, scope } => {
                write!(f, "pattern '{}' references undefined scope '{}'", pattern, scope)
            }
            CompileError::EmptyScopeDelimiter { scope } => {
                write!(f, "scope '{}' declares no delimiter alternatives", scope)
            }
            CompileError::NestedImplicitScope { scope } => {
                write!(
                    f,
                    "scope '{}' nests itself directly inside an implicit block boundary",
                    scope
                )
            }
            CompileError::BadRegex { pattern, source } => {
                write!(f, "invalid regular expression in pattern '{}': {}", pattern, source)
            }
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::BadRegex { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Error type surfaced by declaration callbacks.
///
/// A failing callback is logged at the node it ran on and never aborts the
/// surrounding walk.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;
