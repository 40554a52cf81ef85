//! Diagnostics collection
//!
//! Parse failures are never fatal; they accumulate in the tree as
//! unmatched nodes. This walk turns them into diagnostics: an unmatched
//! pattern consults its declaration's `on_diagnostic` callback when one is
//! attached, everything else gets a default message. An unterminated
//! block (a scope that hit end-of-document without its end delimiter) is
//! reported at its opening.

use lsp_types::DiagnosticSeverity;
use std::ops::Range;

use crate::tree::{MatchKind, MatchTree, NodeId};

/// One reported problem, spanning byte offsets of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub span: Range<usize>,
    pub message: String,
    pub severity: DiagnosticSeverity,
}

impl Diagnostic {
    pub fn error(span: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            severity: DiagnosticSeverity::ERROR,
        }
    }

    pub fn warning(span: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            severity: DiagnosticSeverity::WARNING,
        }
    }
}

/// Collect diagnostics for every unmatched region of the tree.
///
/// Unrecognized text is reported where recovery skipped it. Failed
/// attempts are only mined for unterminated blocks — their text is
/// already covered by the unmatched node that retains them.
pub fn collect(tree: &MatchTree) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let mut stack = vec![(tree.root(), false)];
    while let Some((id, in_attempt)) = stack.pop() {
        let node = tree.node(id);
        match node.kind() {
            MatchKind::UnmatchedPattern(decl) if !in_attempt => {
                if let Some(callback) = decl.on_diagnostic.as_ref() {
                    out.extend(callback(tree, id));
                } else {
                    out.push(default_diagnostic(tree, id));
                }
            }
            MatchKind::UnmatchedText if !in_attempt => {
                out.push(default_diagnostic(tree, id));
            }
            MatchKind::Scope { decl, .. } if !node.matched() => {
                out.push(Diagnostic::error(
                    node.span(),
                    format!("'{}' block is never closed", decl.name),
                ));
            }
            _ => {}
        }
        stack.extend(node.attempts().iter().rev().map(|&a| (a, true)));
        stack.extend(
            node.children()
                .iter()
                .rev()
                .map(|&c| (c, in_attempt)),
        );
    }
    out.dedup();
    out
}

fn default_diagnostic(tree: &MatchTree, id: NodeId) -> Diagnostic {
    let text = tree.matched_text(id);
    let shown = text.lines().next().unwrap_or("").trim_end();
    Diagnostic::error(
        tree.node(id).span(),
        format!("statement not recognized: '{}'", shown),
    )
}
