//! Post-match semantic pass
//!
//! Runs exactly once per parse, after the document loop: a breadth-first
//! walk over a growable worklist that links every node to its nearest
//! enclosing scope match and pattern match, and invokes `on_matched`
//! callbacks — the grammar's root callback first, then each matched
//! pattern/scope node before its descendants. This is the only place
//! external callbacks are expected to write node state slots.
//!
//! A failing callback is logged at its node and the walk continues;
//! siblings are never left unprocessed.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::tree::{MatchKind, MatchTree, NodeId};

pub(crate) fn run(tree: &mut MatchTree) {
    let mut worklist = VecDeque::new();
    worklist.push_back((tree.root(), None, None));

    while let Some((id, scope, pattern)) = worklist.pop_front() {
        {
            let node = tree.node_mut(id);
            node.matched_scope = scope;
            node.matched_pattern = pattern;
        }

        invoke_matched(tree, id);

        let node = tree.node(id);
        let next_scope = match node.kind() {
            MatchKind::Scope { .. } | MatchKind::Grammar => Some(id),
            _ => scope,
        };
        let next_pattern = match node.kind() {
            MatchKind::Pattern(_) => Some(id),
            _ => pattern,
        };
        let descendants: Vec<NodeId> = node
            .children()
            .iter()
            .chain(node.attempts().iter())
            .copied()
            .collect();
        for child in descendants {
            worklist.push_back((child, next_scope, next_pattern));
        }
    }
}

fn invoke_matched(tree: &mut MatchTree, id: NodeId) {
    enum Hook {
        Grammar,
        Pattern(Arc<crate::declare::PatternDeclare>),
        Scope(Arc<crate::declare::ScopeDeclare>),
    }

    let node = tree.node(id);
    let hook = match node.kind() {
        MatchKind::Grammar => Some(Hook::Grammar),
        MatchKind::Pattern(decl) if node.matched() => Some(Hook::Pattern(Arc::clone(decl))),
        MatchKind::Scope { decl, .. } if node.matched() => Some(Hook::Scope(Arc::clone(decl))),
        _ => None,
    };

    let result = match hook {
        Some(Hook::Grammar) => {
            let grammar = Arc::clone(tree.grammar());
            grammar
                .on_matched
                .as_ref()
                .map(|callback| callback(tree, id))
        }
        Some(Hook::Pattern(decl)) => decl.on_matched.as_ref().map(|callback| callback(tree, id)),
        Some(Hook::Scope(decl)) => decl.on_matched.as_ref().map(|callback| callback(tree, id)),
        None => None,
    };

    if let Some(Err(error)) = result {
        tracing::warn!(node = %id, %error, "on_matched callback failed");
    }
}
