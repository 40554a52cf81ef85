//! Per-document parse lifecycle
//!
//! A [`DocumentSession`] owns the current match tree for one document.
//! Every edit replaces the tree wholesale — no partial mutation is ever
//! visible across requests, and semantic state attached to the previous
//! tree is dropped with it. The `&mut` receiver on [`DocumentSession::update`]
//! is the "one parse in flight per document" rule stated in the type
//! system; the session is `Send` so a per-document worker can own it, and
//! intentionally not `Sync`.

use std::sync::Arc;

use lsp_types::Position;

use crate::compile::CompiledGrammar;
use crate::completion::{self, BuiltinRegistry, CompletionCandidate};
use crate::diagnostics::{self, Diagnostic};
use crate::hover::{self, HoverContent};
use crate::tree::MatchTree;

pub struct DocumentSession {
    grammar: Arc<CompiledGrammar>,
    builtins: BuiltinRegistry,
    tree: MatchTree,
}

impl DocumentSession {
    /// Open a document: parse it once against the shared compiled grammar.
    pub fn open(grammar: Arc<CompiledGrammar>, builtins: BuiltinRegistry, text: &str) -> Self {
        let tree = grammar.match_document(text);
        Self {
            grammar,
            builtins,
            tree,
        }
    }

    /// Replace the document text and re-match it, discarding the previous
    /// tree and everything attached to it.
    pub fn update(&mut self, text: &str) {
        self.tree = self.grammar.match_document(text);
    }

    pub fn tree(&self) -> &MatchTree {
        &self.tree
    }

    pub fn completion(&self, position: Position) -> Vec<CompletionCandidate> {
        completion::request_completion(&self.tree, position, &self.builtins)
    }

    pub fn hover(&self, position: Position) -> Option<HoverContent> {
        hover::request_hover(&self.tree, position)
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        diagnostics::collect(&self.tree)
    }
}
