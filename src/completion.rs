//! Completion queries
//!
//! A completion request locates the node under the cursor and walks
//! outward: failed alternatives first when the cursor sits in unmatched
//! text, then the chain of enclosing pattern/scope declarations up to the
//! grammar. Each callback answers with an explicit [`CompletionOutcome`];
//! the first `stop` halts the walk and suppresses the built-in
//! keyword/type suggestions for the request. No shared flags are involved
//! — the outcome value is threaded by the walker.
//!
//! Each declaration is consulted at most once per request, with the
//! deepest node that reached it as context; the final list is
//! deduplicated by label, first occurrence winning.

use std::collections::HashSet;
use std::sync::Arc;

use lsp_types::{CompletionItemKind, Position};

use crate::declare::{CompletionCallback, PatternDeclare, ScopeDeclare};
use crate::tree::{MatchKind, MatchTree, NodeId};

/// A completion suggestion, translatable into protocol items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCandidate {
    pub label: String,
    pub kind: CompletionItemKind,
    pub detail: Option<String>,
    pub insert_text: Option<String>,
    pub sort_text: Option<String>,
}

impl CompletionCandidate {
    pub fn new(label: impl Into<String>, kind: CompletionItemKind) -> Self {
        Self {
            label: label.into(),
            kind,
            detail: None,
            insert_text: None,
            sort_text: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_insert_text(mut self, text: impl Into<String>) -> Self {
        self.insert_text = Some(text.into());
        self
    }

    pub fn with_sort_text(mut self, text: impl Into<String>) -> Self {
        self.sort_text = Some(text.into());
        self
    }
}

/// What one completion callback contributes, and whether the walk should
/// consult further ancestors.
#[derive(Debug, Default)]
pub struct CompletionOutcome {
    pub items: Vec<CompletionCandidate>,
    pub stop: bool,
}

impl CompletionOutcome {
    pub fn items(items: Vec<CompletionCandidate>) -> Self {
        Self { items, stop: false }
    }

    /// Contribute items and suppress every remaining source, built-ins
    /// included.
    pub fn stop(items: Vec<CompletionCandidate>) -> Self {
        Self { items, stop: true }
    }
}

/// The built-in keyword/type suggestions appended to every request that
/// no callback suppressed. Built once by an explicit initialization step
/// and passed into the query engine; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRegistry {
    keywords: Vec<CompletionCandidate>,
    types: Vec<CompletionCandidate>,
}

impl BuiltinRegistry {
    pub fn new(keywords: Vec<CompletionCandidate>, types: Vec<CompletionCandidate>) -> Self {
        Self { keywords, types }
    }

    pub fn keywords(&self) -> &[CompletionCandidate] {
        &self.keywords
    }

    pub fn types(&self) -> &[CompletionCandidate] {
        &self.types
    }
}

/// Resolve completions at a position: ordered, deduplicated by label.
pub fn request_completion(
    tree: &MatchTree,
    position: Position,
    builtins: &BuiltinRegistry,
) -> Vec<CompletionCandidate> {
    let offset = tree.source_map().offset_at(position);
    let located = tree.locate(offset);

    let mut walk = Walk {
        tree,
        items: Vec::new(),
        stopped: false,
        consulted: HashSet::new(),
    };
    if tree.node(located).is_unmatched() {
        walk.collect_unmatched(located, offset);
    }
    walk.collect_ancestors(located);

    let mut items = walk.items;
    if !walk.stopped {
        items.extend(builtins.types.iter().cloned());
        items.extend(builtins.keywords.iter().cloned());
    }
    dedup_by_label(items)
}

enum Hook {
    Pattern(Arc<PatternDeclare>),
    Scope(Arc<ScopeDeclare>),
    Grammar,
}

struct Walk<'t> {
    tree: &'t MatchTree,
    items: Vec<CompletionCandidate>,
    stopped: bool,
    /// Declarations already consulted this request, by identity
    consulted: HashSet<usize>,
}

impl Walk<'_> {
    /// Walk structural parents from a node to the root, consulting the
    /// declarations the chain passes through.
    fn collect_ancestors(&mut self, from: NodeId) {
        let mut cur = Some(from);
        while let Some(id) = cur {
            if self.stopped {
                return;
            }
            cur = self.consult_node(id);
        }
    }

    /// Completions for a cursor inside unmatched text: the unmatched
    /// pattern's own declaration, then each failed alternative, recursing
    /// into nested unmatched regions.
    fn collect_unmatched(&mut self, id: NodeId, offset: usize) {
        if let MatchKind::UnmatchedPattern(decl) = self.tree.node(id).kind() {
            let decl = Arc::clone(decl);
            self.consult(Hook::Pattern(decl), id);
        }
        let attempts = self.tree.node(id).attempts().to_vec();
        for attempt in attempts {
            if self.stopped {
                return;
            }
            let deepest = self.tree.locate_from(attempt, offset);
            let mut cur = Some(deepest);
            while let Some(n) = cur {
                if n == id || self.stopped {
                    break;
                }
                if self.tree.node(n).is_unmatched() {
                    self.collect_unmatched(n, offset);
                    cur = self.tree.node(n).parent();
                } else {
                    cur = self.consult_node(n);
                }
            }
        }
    }

    /// Consult the declarations visible from one walk node; returns the
    /// parent to continue with.
    fn consult_node(&mut self, id: NodeId) -> Option<NodeId> {
        let node = self.tree.node(id);
        let parent = node.parent();
        let named = node.name().is_some();
        let matched_pattern = node.matched_pattern();
        let matched_scope = node.matched_scope();

        let mut hooks = Vec::new();
        match node.kind() {
            MatchKind::Pattern(decl) => hooks.push((Hook::Pattern(Arc::clone(decl)), id)),
            MatchKind::Scope { decl, .. } => hooks.push((Hook::Scope(Arc::clone(decl)), id)),
            MatchKind::Grammar => hooks.push((Hook::Grammar, id)),
            _ => {}
        }
        if named {
            // A named capture consults its enclosing declarations with
            // itself as context, so callbacks can dispatch on the capture
            // name under the cursor.
            if let Some(pattern_id) = matched_pattern {
                if let MatchKind::Pattern(decl) = self.tree.node(pattern_id).kind() {
                    hooks.push((Hook::Pattern(Arc::clone(decl)), id));
                }
            }
            if let Some(scope_id) = matched_scope {
                if let MatchKind::Scope { decl, .. } = self.tree.node(scope_id).kind() {
                    hooks.push((Hook::Scope(Arc::clone(decl)), id));
                }
            }
        }

        for (hook, context) in hooks {
            if self.stopped {
                return None;
            }
            self.consult(hook, context);
        }
        parent
    }

    fn consult(&mut self, hook: Hook, context: NodeId) {
        let callback: Option<&CompletionCallback> = match &hook {
            Hook::Pattern(decl) => {
                if !self.consulted.insert(Arc::as_ptr(decl) as usize) {
                    return;
                }
                decl.on_completion.as_ref()
            }
            Hook::Scope(decl) => {
                if !self.consulted.insert(Arc::as_ptr(decl) as usize) {
                    return;
                }
                decl.on_completion.as_ref()
            }
            Hook::Grammar => {
                let grammar = self.tree.grammar();
                if !self.consulted.insert(Arc::as_ptr(grammar) as usize) {
                    return;
                }
                grammar.on_completion.as_ref()
            }
        };
        let Some(callback) = callback else {
            return;
        };
        match callback(self.tree, context) {
            Ok(outcome) => {
                self.items.extend(outcome.items);
                if outcome.stop {
                    self.stopped = true;
                }
            }
            Err(error) => {
                tracing::warn!(node = %context, %error, "completion callback failed");
            }
        }
    }
}

fn dedup_by_label(items: Vec<CompletionCandidate>) -> Vec<CompletionCandidate> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.label.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_the_first_occurrence() {
        let items = vec![
            CompletionCandidate::new("Dim", CompletionItemKind::KEYWORD).with_detail("first"),
            CompletionCandidate::new("counter", CompletionItemKind::VARIABLE),
            CompletionCandidate::new("Dim", CompletionItemKind::KEYWORD).with_detail("second"),
        ];
        let deduped = dedup_by_label(items);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].detail.as_deref(), Some("first"));
    }

    #[test]
    fn outcome_builders_set_the_stop_flag() {
        let open = CompletionOutcome::items(vec![]);
        assert!(!open.stop);
        let closed = CompletionOutcome::stop(vec![]);
        assert!(closed.stop);
    }
}
