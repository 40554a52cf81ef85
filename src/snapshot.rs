//! Serializable structural summaries of a match tree
//!
//! Used by tooling and tests to compare tree shapes without poking at
//! arena indices: spans, kinds, capture names and the matched flag, with
//! leaf text inlined.

use serde::Serialize;

use crate::tree::{MatchKind, MatchTree, NodeId, TokenKind};

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub span: (usize, usize),
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
    #[serde(skip_serializing_if = "is_zero")]
    pub attempts: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Snapshot a whole tree from its root.
pub fn snapshot(tree: &MatchTree) -> NodeSnapshot {
    snapshot_node(tree, tree.root())
}

/// Snapshot as a JSON value, for assertions and dumps.
pub fn to_json(tree: &MatchTree) -> serde_json::Value {
    serde_json::to_value(snapshot(tree)).unwrap_or(serde_json::Value::Null)
}

fn snapshot_node(tree: &MatchTree, id: NodeId) -> NodeSnapshot {
    let node = tree.node(id);
    let kind = match node.kind() {
        MatchKind::Token(TokenKind::Literal) => "literal".to_string(),
        MatchKind::Token(TokenKind::Regex) => "regex".to_string(),
        MatchKind::Token(TokenKind::Space) => "space".to_string(),
        MatchKind::Token(TokenKind::Wildcard) => "wildcard".to_string(),
        MatchKind::Sequence => "sequence".to_string(),
        MatchKind::Pattern(decl) => format!("pattern:{}", decl.name),
        MatchKind::Scope { decl, .. } => format!("scope:{}", decl.name),
        MatchKind::Grammar => "grammar".to_string(),
        MatchKind::UnmatchedText => "unmatched-text".to_string(),
        MatchKind::UnmatchedPattern(decl) => format!("unmatched-pattern:{}", decl.name),
    };
    let span = node.span();
    let is_leaf = node.children().is_empty();
    NodeSnapshot {
        kind,
        name: node.name().map(String::from),
        span: (span.start, span.end),
        matched: node.matched(),
        text: is_leaf.then(|| tree.text_of(id).to_string()),
        children: node
            .children()
            .iter()
            .map(|&child| snapshot_node(tree, child))
            .collect(),
        attempts: node.attempts().len(),
    }
}
