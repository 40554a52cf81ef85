//! Hover queries

use std::sync::Arc;

use lsp_types::Position;

use crate::tree::{MatchKind, MatchTree, NodeId};

/// Rich-text hover content (markdown).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverContent {
    pub value: String,
    /// The span the content describes, when narrower than the request
    pub span: Option<std::ops::Range<usize>>,
}

impl HoverContent {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: std::ops::Range<usize>) -> Self {
        self.span = Some(span);
        self
    }
}

/// Resolve hover at a position: locate the node, walk ancestors, and let
/// the first declaration carrying an `on_hover` callback answer for the
/// located node.
pub fn request_hover(tree: &MatchTree, position: Position) -> Option<HoverContent> {
    let located = tree.locate_position(position);
    if !tree.node(located).matched() {
        return None;
    }

    let mut cur = Some(located);
    while let Some(id) = cur {
        let node = tree.node(id);
        if let MatchKind::Pattern(decl) = node.kind() {
            if decl.on_hover.is_some() {
                let decl = Arc::clone(decl);
                return invoke(&decl, tree, located);
            }
        }
        cur = node.parent();
    }
    None
}

fn invoke(
    decl: &crate::declare::PatternDeclare,
    tree: &MatchTree,
    located: NodeId,
) -> Option<HoverContent> {
    let callback = decl.on_hover.as_ref()?;
    match callback(tree, located) {
        Ok(content) => content,
        Err(error) => {
            tracing::warn!(node = %located, %error, "hover callback failed");
            None
        }
    }
}
