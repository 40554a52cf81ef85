//! # basil
//!
//! A language-intelligence backend for a small BASIC-like scripting
//! dialect: grammar declarations (pattern templates, scopes, callbacks)
//! compile into an executable matcher, documents are matched into a
//! recovering match tree, and position-based queries — completion, hover,
//! diagnostics — are answered against that tree while tolerating
//! malformed input.
//!
//! The engine stays independent of any one semantic model: declarations
//! carry callback slots, callbacks write opaque per-node state, and the
//! query walks thread their results explicitly. A symbol table, a
//! documentation provider or an editor transport all live outside this
//! crate and talk to it through [`declare`] and the query modules.
//!
//! Pipeline: [`declare`] → [`compile`] → matcher graph (shared,
//! read-only) → one match per document → [`tree::MatchTree`] → semantic
//! pass → [`completion`]/[`hover`]/[`diagnostics`].
//!
//! Template mini-language: `<name>` named reference/capture, `[x]`
//! optional, `[x...]` optional and repeatable, `{name}` embedded scope,
//! `/re/` raw regular expression, `\c` escape, bare words literal text,
//! spaces separate words.

pub mod compile;
pub mod completion;
pub mod declare;
pub mod diagnostics;
mod engine;
pub mod error;
pub mod hover;
mod matcher;
pub mod position;
mod semantics;
pub mod session;
pub mod snapshot;
mod template;
pub mod tree;

pub use compile::{compile, CompiledGrammar};
pub use completion::{request_completion, BuiltinRegistry, CompletionCandidate, CompletionOutcome};
pub use declare::{GrammarDeclare, PatternDeclare, ScopeDeclare, SkipMode};
pub use diagnostics::Diagnostic;
pub use error::{CallbackError, CompileError};
pub use hover::{request_hover, HoverContent};
pub use session::DocumentSession;
pub use tree::{MatchKind, MatchTree, NodeId, TokenKind};

/// Compile a grammar and match one document in a single call.
pub fn parse(
    grammar: std::sync::Arc<GrammarDeclare>,
    text: &str,
) -> Result<tree::MatchTree, CompileError> {
    Ok(compile::compile(grammar)?.match_document(text))
}
