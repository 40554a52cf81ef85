//! The backtracking-with-recovery matcher
//!
//! Matching walks the compiled matcher arena against the document text and
//! builds the match tree. The combinators keep the committed-path
//! semantics of the grammar model:
//!
//! - a sequence never backtracks into an already-matched sibling when a
//!   later sibling fails — the failure is recorded and the sequence fails;
//! - an alternation commits to the first alternative that succeeds, in
//!   declaration order;
//! - a scope never fails outright: interior mismatches become unmatched
//!   nodes and matching resynchronizes by line or by furthest failed
//!   offset until the end delimiter or the end of the document.
//!
//! Trivia between statements is attached as explicit space leaves, so the
//! children of the root and of every scope tile their spans contiguously
//! and concatenating leaf text reconstructs the document.

use std::sync::Arc;

use crate::compile::CompiledGrammar;
use crate::declare::{PatternDeclare, ScopeDeclare, SkipMode};
use crate::matcher::{self, Matcher, MatcherId, SeqItem};
use crate::semantics;
use crate::tree::{MatchKind, MatchTree, NodeId, TokenKind};

/// Match a whole document and run the semantic pass over the result.
pub(crate) fn match_document(grammar: &CompiledGrammar, text: &str) -> MatchTree {
    let mut tree = MatchTree::new(text, Arc::clone(grammar.grammar()));
    let text = tree.text_arc();
    let text = &*text;
    let len = text.len();

    let root = tree.alloc(MatchKind::Grammar, 0);
    tree.set_root(root);

    let mut cur = 0;
    while cur < len {
        if let Some(next) = attach_space_run(&mut tree, text, root, cur) {
            cur = next;
            continue;
        }
        let mut failed = Vec::new();
        let mut advanced = false;
        for &pattern in grammar.top_patterns() {
            let sub = match_at(grammar, &mut tree, text, pattern, cur);
            let node = tree.node(sub);
            if node.matched() && node.span().end > cur {
                let end = node.span().end;
                tree.attach(root, sub);
                cur = end;
                advanced = true;
                break;
            }
            failed.push(sub);
        }
        if advanced {
            continue;
        }
        // Nothing fits this line; account for it and restart on the next.
        let next = next_line_start(text, cur);
        let unmatched = tree.alloc(MatchKind::UnmatchedText, cur);
        for attempt in failed {
            tree.attach_attempt(unmatched, attempt);
        }
        tree.finish(unmatched, next, false);
        tree.attach(root, unmatched);
        cur = next;
    }
    tree.finish(root, len, true);

    semantics::run(&mut tree);
    tree
}

/// Trivia at a statement boundary becomes an explicit space leaf so the
/// surrounding children keep tiling the text.
fn attach_space_run(
    tree: &mut MatchTree,
    text: &str,
    parent: NodeId,
    offset: usize,
) -> Option<usize> {
    let skipped = matcher::skip_trivia(text, offset, true);
    if skipped > offset {
        let space = tree.alloc(MatchKind::Token(TokenKind::Space), offset);
        tree.finish(space, skipped, true);
        tree.attach(parent, space);
        Some(skipped)
    } else {
        None
    }
}

fn next_line_start(text: &str, offset: usize) -> usize {
    text[offset..]
        .find('\n')
        .map(|k| offset + k + 1)
        .unwrap_or(text.len())
}

pub(crate) fn match_at(
    grammar: &CompiledGrammar,
    tree: &mut MatchTree,
    text: &str,
    id: MatcherId,
    offset: usize,
) -> NodeId {
    match grammar.matcher(id) {
        Matcher::Ref(inner) => match_at(grammar, tree, text, *inner, offset),
        Matcher::Literal {
            regex,
            cross_line,
            exclude,
            ..
        } => match_token(
            tree,
            text,
            offset,
            regex,
            *cross_line,
            exclude.as_ref(),
            TokenKind::Literal,
        ),
        Matcher::Regex {
            regex,
            cross_line,
            exclude,
            ..
        } => match_token(
            tree,
            text,
            offset,
            regex,
            *cross_line,
            exclude.as_ref(),
            TokenKind::Regex,
        ),
        Matcher::Space { cross_line } => {
            let end = matcher::skip_trivia(text, offset, *cross_line);
            let node = tree.alloc(MatchKind::Token(TokenKind::Space), offset);
            tree.finish(node, end, end > offset);
            node
        }
        Matcher::Wildcard => {
            let node = tree.alloc(MatchKind::Token(TokenKind::Wildcard), offset);
            tree.finish(node, offset, true);
            node
        }
        Matcher::Named { name, inner } => {
            let name = name.clone();
            let sub = match_at(grammar, tree, text, *inner, offset);
            tree.node_mut(sub).name = Some(name);
            sub
        }
        Matcher::Sequence {
            items,
            strict,
            cross_line,
        } => match_sequence(grammar, tree, text, items, *strict, *cross_line, offset),
        Matcher::Alternation { alternatives, decl } => {
            match_alternation(grammar, tree, text, alternatives, decl.as_ref(), offset)
        }
        Matcher::Scope {
            begin,
            interior,
            end,
            decl,
        } => match_scope(grammar, tree, text, *begin, interior, *end, decl, offset),
    }
}

fn match_token(
    tree: &mut MatchTree,
    text: &str,
    offset: usize,
    regex: &regex::Regex,
    cross_line: bool,
    exclude: Option<&regex::Regex>,
    kind: TokenKind,
) -> NodeId {
    let node = tree.alloc(MatchKind::Token(kind), offset);
    let body = matcher::skip_trivia(text, offset, cross_line);
    let rest = &text[body..];
    if let Some(found) = regex.find(rest) {
        if found.start() == 0 {
            let vetoed = exclude
                .and_then(|ex| ex.find(rest))
                .map(|ex| ex.start() == 0 && ex.as_str() == found.as_str())
                .unwrap_or(false);
            if !vetoed {
                tree.finish(node, body + found.end(), true);
                return node;
            }
        }
    }
    tree.finish(node, offset, false);
    node
}

fn match_sequence(
    grammar: &CompiledGrammar,
    tree: &mut MatchTree,
    text: &str,
    items: &[SeqItem],
    strict: bool,
    cross_line: bool,
    offset: usize,
) -> NodeId {
    let node = tree.alloc(MatchKind::Sequence, offset);
    let mut cur = offset;
    let mut idx = 0;
    while idx < items.len() {
        let item = &items[idx];
        let sub = match_at(grammar, tree, text, item.matcher, cur);
        let sub_node = tree.node(sub);
        let (sub_matched, sub_end) = (sub_node.matched(), sub_node.span().end);
        if !sub_matched {
            let consumed = &text[tree.node(sub).span()];
            if strict && !matcher::is_trivia(consumed, cross_line) {
                // The failed child swallowed real text; surface it instead
                // of pretending nothing happened.
                tree.attach(node, sub);
                tree.finish(node, sub_end, false);
                return node;
            }
            if item.ignorable {
                idx += 1;
                continue;
            }
            tree.attach(node, sub);
            tree.finish(node, sub_end, false);
            return node;
        }
        tree.attach(node, sub);
        if item.repeatable && sub_end > cur {
            // Retry in place; a zero-width success ends the repetition.
            cur = sub_end;
            continue;
        }
        cur = sub_end;
        idx += 1;
    }
    if tree.node(node).children().is_empty() {
        tree.finish(node, offset, false);
    } else {
        // A consumed implicit-boundary scope ends at its end match, so the
        // next sibling re-matched the trailing keyword from there.
        tree.finish(node, cur, true);
    }
    node
}

fn match_alternation(
    grammar: &CompiledGrammar,
    tree: &mut MatchTree,
    text: &str,
    alternatives: &[MatcherId],
    decl: Option<&Arc<PatternDeclare>>,
    offset: usize,
) -> NodeId {
    let mut failed = Vec::new();
    for &alternative in alternatives {
        let sub = match_at(grammar, tree, text, alternative, offset);
        if tree.node(sub).matched() {
            // First success wins; later alternatives are never consulted.
            return match decl {
                Some(decl) => {
                    let end = tree.node(sub).span().end;
                    let node = tree.alloc(MatchKind::Pattern(Arc::clone(decl)), offset);
                    tree.attach(node, sub);
                    tree.finish(node, end, true);
                    node
                }
                None => sub,
            };
        }
        failed.push(sub);
    }
    let furthest = failed
        .iter()
        .map(|&f| tree.node(f).span().end)
        .max()
        .unwrap_or(offset);
    let kind = match decl {
        Some(decl) => MatchKind::UnmatchedPattern(Arc::clone(decl)),
        None => MatchKind::UnmatchedText,
    };
    let node = tree.alloc(kind, offset);
    for attempt in failed {
        tree.attach_attempt(node, attempt);
    }
    tree.finish(node, furthest, false);
    node
}

#[allow(clippy::too_many_arguments)]
fn match_scope(
    grammar: &CompiledGrammar,
    tree: &mut MatchTree,
    text: &str,
    begin: MatcherId,
    interior: &[MatcherId],
    end: MatcherId,
    decl: &Arc<ScopeDeclare>,
    offset: usize,
) -> NodeId {
    let implicit = grammar.grammar().implicit_boundaries;
    let node = tree.alloc(
        MatchKind::Scope {
            decl: Arc::clone(decl),
            begin: None,
            end: None,
        },
        offset,
    );

    let begin_match = match_at(grammar, tree, text, begin, offset);
    let begin_node = tree.node(begin_match);
    let (begin_matched, begin_end) = (begin_node.matched(), begin_node.span().end);
    tree.attach(node, begin_match);
    if let MatchKind::Scope { begin, .. } = &mut tree.node_mut(node).kind {
        *begin = Some(begin_match);
    }
    if !begin_matched {
        tree.finish(node, begin_end, false);
        return node;
    }

    let len = text.len();
    let mut cur = begin_end;
    let mut end_match = None;
    loop {
        if let Some(next) = attach_space_run(tree, text, node, cur) {
            cur = next;
        }
        if cur >= len {
            break;
        }
        let mut failed = Vec::new();
        let mut advanced = false;
        for &pattern in interior {
            let sub = match_at(grammar, tree, text, pattern, cur);
            let sub_node = tree.node(sub);
            if sub_node.matched() && sub_node.span().end > cur {
                let end = sub_node.span().end;
                tree.attach(node, sub);
                cur = end;
                advanced = true;
                break;
            }
            failed.push(sub);
        }
        if advanced {
            continue;
        }
        let candidate = match_at(grammar, tree, text, end, cur);
        if tree.node(candidate).matched() {
            end_match = Some(candidate);
            break;
        }
        failed.push(candidate);

        // Resynchronize: by line, or to the furthest failed offset.
        let furthest = failed
            .iter()
            .map(|&f| tree.node(f).span().end)
            .max()
            .unwrap_or(cur);
        let next = match decl.skip_mode {
            SkipMode::Line => next_line_start(text, cur),
            SkipMode::FurthestMatch => {
                if furthest > cur {
                    furthest
                } else {
                    next_line_start(text, cur)
                }
            }
        };
        let unmatched = tree.alloc(MatchKind::UnmatchedText, cur);
        for attempt in failed {
            tree.attach_attempt(unmatched, attempt);
        }
        tree.finish(unmatched, next, false);
        tree.attach(node, unmatched);
        cur = next;
    }

    match end_match {
        Some(end_id) => {
            let end_span = tree.node(end_id).span();
            if let MatchKind::Scope { end, .. } = &mut tree.node_mut(node).kind {
                *end = Some(end_id);
            }
            if implicit {
                // The block owns everything up to its terminating keyword;
                // the keyword itself is handed back to the enclosing
                // sequence to re-match.
                tree.node_mut(end_id).parent = Some(node);
                tree.finish(node, end_span.start, true);
            } else {
                tree.attach(node, end_id);
                tree.finish(node, end_span.end, true);
            }
        }
        None => {
            // End of document without an end delimiter: the scope fails but
            // its line-accounted contents stay in the tree.
            tree.finish(node, cur.min(len), false);
        }
    }
    node
}
