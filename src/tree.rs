//! The per-document match tree
//!
//! One parse produces one [`MatchTree`]: an arena of nodes addressed by
//! [`NodeId`], with parent and child links stored as indices so the whole
//! tree drops in a single deallocation. The tree doubles as the
//! diagnostic record — failed alternatives hang off unmatched nodes in a
//! separate `attempts` list — and as the query index via [`MatchTree::locate`]
//! and the lazily cached named-captures view.
//!
//! A tree is exclusively owned by its document session: it is `Send` so a
//! per-document worker can hold it, and deliberately not `Sync`. Re-parsing
//! replaces the tree wholesale; semantic state attached to the old tree is
//! discarded with it.

use once_cell::unsync::OnceCell;
use std::any::Any;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use lsp_types::Position;

use crate::declare::{GrammarDeclare, PatternDeclare, ScopeDeclare};
use crate::position::SourceMap;

/// Index of a node inside its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which primitive produced a leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Literal,
    Regex,
    Space,
    Wildcard,
}

/// The closed set of match node kinds.
#[derive(Debug)]
pub enum MatchKind {
    /// A primitive leaf
    Token(TokenKind),
    /// A structural sequence of template items
    Sequence,
    /// A pattern declaration's match, wrapping the winning alternative
    Pattern(Arc<PatternDeclare>),
    /// A scope match; `begin`/`end` also appear among the children for
    /// explicit-boundary grammars, while an implicit scope keeps its end
    /// match out of both its span and its children
    Scope {
        decl: Arc<ScopeDeclare>,
        begin: Option<NodeId>,
        end: Option<NodeId>,
    },
    /// The document root
    Grammar,
    /// Text no interior pattern accepted; recovery skipped past it
    UnmatchedText,
    /// A pattern whose every alternative failed
    UnmatchedPattern(Arc<PatternDeclare>),
}

/// One node of the match tree.
pub struct MatchNode {
    pub(crate) kind: MatchKind,
    pub(crate) span: Range<usize>,
    pub(crate) matched: bool,
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Failed alternatives retained for diagnostics and completion; kept
    /// out of `children` so structural invariants range over real matches
    pub(crate) attempts: Vec<NodeId>,
    pub(crate) matched_scope: Option<NodeId>,
    pub(crate) matched_pattern: Option<NodeId>,
    /// Opaque semantic payload written by declaration callbacks; the
    /// engine never reads it
    pub(crate) state: Option<Box<dyn Any + Send>>,
    pub(crate) captures: OnceCell<Vec<NodeId>>,
}

impl MatchNode {
    fn new(kind: MatchKind, offset: usize) -> Self {
        Self {
            kind,
            span: offset..offset,
            matched: false,
            name: None,
            parent: None,
            children: Vec::new(),
            attempts: Vec::new(),
            matched_scope: None,
            matched_pattern: None,
            state: None,
            captures: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> &MatchKind {
        &self.kind
    }

    /// Source span, half-open byte offsets. A successful match includes
    /// its leading trivia; a failure is zero-width at its entry offset.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    /// Capture name assigned by the nearest `<name>` wrapper.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn attempts(&self) -> &[NodeId] {
        &self.attempts
    }

    /// Nearest enclosing scope match, linked by the semantic pass.
    pub fn matched_scope(&self) -> Option<NodeId> {
        self.matched_scope
    }

    /// Nearest enclosing pattern match, linked by the semantic pass.
    pub fn matched_pattern(&self) -> Option<NodeId> {
        self.matched_pattern
    }

    /// The pattern declaration behind this node, if it has one.
    pub fn pattern_decl(&self) -> Option<&Arc<PatternDeclare>> {
        match &self.kind {
            MatchKind::Pattern(decl) | MatchKind::UnmatchedPattern(decl) => Some(decl),
            _ => None,
        }
    }

    pub fn is_unmatched(&self) -> bool {
        matches!(
            self.kind,
            MatchKind::UnmatchedText | MatchKind::UnmatchedPattern(_)
        )
    }
}

impl fmt::Debug for MatchNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchNode")
            .field("kind", &self.kind)
            .field("span", &self.span)
            .field("matched", &self.matched)
            .field("name", &self.name)
            .field("children", &self.children.len())
            .field("attempts", &self.attempts.len())
            .finish_non_exhaustive()
    }
}

/// The match tree for one document.
pub struct MatchTree {
    text: Arc<str>,
    grammar: Arc<GrammarDeclare>,
    source_map: SourceMap,
    nodes: Vec<MatchNode>,
    root: NodeId,
}

impl MatchTree {
    pub(crate) fn new(text: &str, grammar: Arc<GrammarDeclare>) -> Self {
        let text: Arc<str> = Arc::from(text);
        let source_map = SourceMap::new(Arc::clone(&text));
        Self {
            text,
            grammar,
            source_map,
            nodes: Vec::new(),
            root: NodeId(0),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn text_arc(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    pub fn grammar(&self) -> &Arc<GrammarDeclare> {
        &self.grammar
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &MatchNode {
        &self.nodes[id.index()]
    }

    /// The source text a node's span covers, leading trivia included.
    pub fn text_of(&self, id: NodeId) -> &str {
        &self.text[self.node(id).span()]
    }

    /// The consumed text of a node with its leading trivia stripped —
    /// what a capture "is", e.g. `Integer` rather than `  Integer`.
    pub fn matched_text(&self, id: NodeId) -> &str {
        let raw = self.text_of(id);
        &raw[crate::matcher::skip_trivia(raw, 0, true)..]
    }

    // ---- construction (engine + semantic pass) ----

    pub(crate) fn alloc(&mut self, kind: MatchKind, offset: usize) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(MatchNode::new(kind, offset));
        id
    }

    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    pub(crate) fn attach_attempt(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].attempts.push(child);
    }

    pub(crate) fn finish(&mut self, id: NodeId, end: usize, matched: bool) {
        let node = &mut self.nodes[id.index()];
        node.span.end = end;
        node.matched = matched;
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut MatchNode {
        &mut self.nodes[id.index()]
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    // ---- position index ----

    /// Deepest node whose span contains the offset — O(depth).
    ///
    /// Containment is closed at both ends so a cursor sitting on a
    /// boundary resolves to the earlier (first-declared) node. Failed
    /// attempts are not descended into; the unmatched node itself answers.
    pub fn locate(&self, offset: usize) -> NodeId {
        self.locate_from(self.root, offset)
    }

    /// [`MatchTree::locate`] with an editor-protocol position.
    pub fn locate_position(&self, position: Position) -> NodeId {
        self.locate(self.source_map.offset_at(position))
    }

    pub(crate) fn locate_from(&self, start: NodeId, offset: usize) -> NodeId {
        let mut cur = start;
        loop {
            let node = &self.nodes[cur.index()];
            let next = node.children.iter().copied().find(|&child| {
                let span = &self.nodes[child.index()].span;
                span.start <= offset && offset <= span.end
            });
            match next {
                Some(child) => cur = child,
                None => return cur,
            }
        }
    }

    // ---- named captures ----

    /// The directly addressable sub-captures of a node: its subtree
    /// flattened through structural wrappers, stopping at any named or
    /// typed node. Computed lazily, cached per node.
    pub fn captures(&self, id: NodeId) -> &[NodeId] {
        self.nodes[id.index()]
            .captures
            .get_or_init(|| self.collect_captures(id))
    }

    /// All captures with the given name, in document order.
    pub fn captures_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.captures(id)
            .iter()
            .copied()
            .filter(|&c| self.nodes[c.index()].name.as_deref() == Some(name))
            .collect()
    }

    /// Text of the first capture with the given name.
    pub fn capture_text(&self, id: NodeId, name: &str) -> Option<&str> {
        self.captures_named(id, name)
            .first()
            .map(|&c| self.matched_text(c))
    }

    fn collect_captures(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id.index()]
            .children
            .iter()
            .rev()
            .copied()
            .collect();
        while let Some(cur) = stack.pop() {
            let node = &self.nodes[cur.index()];
            let addressable = node.name.is_some()
                || matches!(
                    node.kind,
                    MatchKind::Pattern(_)
                        | MatchKind::Scope { .. }
                        | MatchKind::UnmatchedText
                        | MatchKind::UnmatchedPattern(_)
                );
            if addressable {
                out.push(cur);
            } else {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    // ---- semantic state slot ----

    /// Store an opaque semantic payload on a node. Written by `on_matched`
    /// callbacks; the engine never interprets it.
    pub fn set_state<T: Any + Send>(&mut self, id: NodeId, value: T) {
        self.nodes[id.index()].state = Some(Box::new(value));
    }

    pub fn state<T: Any>(&self, id: NodeId) -> Option<&T> {
        self.nodes[id.index()]
            .state
            .as_deref()
            .and_then(|state| state.downcast_ref())
    }

    pub fn state_mut<T: Any>(&mut self, id: NodeId) -> Option<&mut T> {
        self.nodes[id.index()]
            .state
            .as_deref_mut()
            .and_then(|state| state.downcast_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::GrammarDeclare;

    fn empty_grammar() -> Arc<GrammarDeclare> {
        Arc::new(GrammarDeclare::new("test"))
    }

    fn leaf(tree: &mut MatchTree, parent: NodeId, span: Range<usize>, name: Option<&str>) -> NodeId {
        let id = tree.alloc(MatchKind::Token(TokenKind::Literal), span.start);
        tree.finish(id, span.end, true);
        tree.node_mut(id).name = name.map(String::from);
        tree.attach(parent, id);
        id
    }

    /// root [0,16) -> seq [0,16) -> leaves Dim [0,3), name "x" [3,5), As [5,8), type [8,16)
    fn sample_tree() -> (MatchTree, NodeId, NodeId) {
        let mut tree = MatchTree::new("Dim x As Integer", empty_grammar());
        let root = tree.alloc(MatchKind::Grammar, 0);
        tree.set_root(root);
        let seq = tree.alloc(MatchKind::Sequence, 0);
        tree.attach(root, seq);
        leaf(&mut tree, seq, 0..3, None);
        let name = leaf(&mut tree, seq, 3..5, Some("name"));
        leaf(&mut tree, seq, 5..8, None);
        leaf(&mut tree, seq, 8..16, Some("type"));
        tree.finish(seq, 16, true);
        tree.finish(root, 16, true);
        (tree, root, name)
    }

    #[test]
    fn locate_returns_the_deepest_node() {
        let (tree, _, name) = sample_tree();
        assert_eq!(tree.locate(4), name);
        let at_boundary = tree.locate(5);
        // Closed containment: the earlier sibling wins on a shared boundary.
        assert_eq!(at_boundary, name);
    }

    #[test]
    fn locate_outside_any_child_answers_with_the_parent() {
        let (tree, root, _) = sample_tree();
        assert_eq!(tree.locate(999), root);
    }

    #[test]
    fn captures_flatten_through_structural_nodes() {
        let (tree, root, name) = sample_tree();
        let names: Vec<_> = tree
            .captures(root)
            .iter()
            .filter_map(|&id| tree.node(id).name())
            .collect();
        assert_eq!(names, vec!["name", "type"]);
        assert_eq!(tree.captures_named(root, "name"), vec![name]);
        assert_eq!(tree.capture_text(root, "type"), Some("Integer"));
        assert_eq!(tree.capture_text(root, "missing"), None);
    }

    #[test]
    fn state_slots_round_trip_through_any() {
        struct ScopeState {
            depth: usize,
        }
        let (mut tree, root, _) = sample_tree();
        tree.set_state(root, ScopeState { depth: 2 });
        assert_eq!(tree.state::<ScopeState>(root).map(|s| s.depth), Some(2));
        tree.state_mut::<ScopeState>(root).unwrap().depth = 3;
        assert_eq!(tree.state::<ScopeState>(root).map(|s| s.depth), Some(3));
        assert!(tree.state::<String>(root).is_none());
    }
}
