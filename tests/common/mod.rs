//! Shared fixture grammar: a miniature BASIC-like dialect
//!
//! Implicit block boundaries (blocks end at their terminating keyword),
//! `Dim` declarations, assignments/expressions, `If` and `For` structures.
//! Kept callback-free; tests that exercise callbacks build their own
//! declarations on top.

#![allow(dead_code)]

use std::sync::Arc;

use basil::{compile, CompiledGrammar, GrammarDeclare, PatternDeclare, ScopeDeclare, SkipMode};

/// Keywords an identifier capture must never swallow. Longer alternatives
/// first: the exclusion must match the whole keyword, not a prefix.
pub const KEYWORDS: &str =
    "(?i)(Dim|As|If|Then|ElseIf|Else|End|For|To|Step|Next|Do|Loop|While|Until)";

pub fn expression() -> Arc<PatternDeclare> {
    let var = Arc::new(PatternDeclare::single("Var", "<identifier>").exclude(KEYWORDS));
    let unit = Arc::new(
        PatternDeclare::new("Expression Unit", ["<number>", "<string>", "<var>"])
            .entry("var", var),
    );
    Arc::new(
        PatternDeclare::single("Expression", "<expr-unit> [<operator> <expr-unit> ...]")
            .id("expression")
            .strict()
            .entry("expr-unit", unit)
            .entry(
                "operator",
                Arc::new(PatternDeclare::single(
                    "Operator",
                    r"/(\+|-|\*|\/|<>|<=|>=|=|<|>|And|Or)/",
                )),
            ),
    )
}

pub fn var_declare() -> Arc<PatternDeclare> {
    Arc::new(
        PatternDeclare::single("Var Declare", "Dim <name> [, <name> ...] As <type>")
            .id("var-declare")
            .cross_line()
            .entry("name", PatternDeclare::identifier())
            .entry("type", PatternDeclare::identifier()),
    )
}

pub fn statement() -> Arc<PatternDeclare> {
    Arc::new(PatternDeclare::single("Statement", "<expression>").id("statement"))
}

pub fn if_structure() -> Arc<PatternDeclare> {
    Arc::new(PatternDeclare::single("If Structure", "If <expression> Then {block} End If").id("if"))
}

pub fn for_loop() -> Arc<PatternDeclare> {
    Arc::new(
        PatternDeclare::single(
            "For Loop",
            "For <name> = <expression> To <expression> {block} Next",
        )
        .id("for")
        .entry("name", PatternDeclare::identifier()),
    )
}

pub fn block(skip_mode: SkipMode) -> Arc<ScopeDeclare> {
    Arc::new(
        ScopeDeclare::new(
            "block",
            Vec::<String>::new(),
            ["End If", "ElseIf", "Else", "Next", "Loop"],
            [
                PatternDeclare::reference("var-declare"),
                PatternDeclare::reference("if"),
                PatternDeclare::reference("for"),
                PatternDeclare::reference("statement"),
            ],
        )
        .skip_mode(skip_mode),
    )
}

/// The full fixture dialect with line-skip recovery.
pub fn dialect() -> Arc<GrammarDeclare> {
    dialect_with_recovery(SkipMode::Line)
}

pub fn dialect_with_recovery(skip_mode: SkipMode) -> Arc<GrammarDeclare> {
    let var_declare = var_declare();
    let if_structure = if_structure();
    let for_loop = for_loop();
    let statement = statement();
    Arc::new(
        GrammarDeclare::new("mini-basic")
            .implicit_boundaries()
            .repository_pattern("expression", expression())
            .repository_pattern("var-declare", Arc::clone(&var_declare))
            .repository_pattern("if", Arc::clone(&if_structure))
            .repository_pattern("for", Arc::clone(&for_loop))
            .repository_pattern("statement", Arc::clone(&statement))
            .repository_scope("block", block(skip_mode))
            .pattern(var_declare)
            .pattern(if_structure)
            .pattern(for_loop)
            .pattern(statement),
    )
}

pub fn compiled() -> CompiledGrammar {
    compile(dialect()).expect("fixture grammar compiles")
}

/// Concatenate every leaf's source text in document order.
pub fn leaf_concat(tree: &basil::MatchTree) -> String {
    fn walk(tree: &basil::MatchTree, id: basil::NodeId, out: &mut String) {
        let node = tree.node(id);
        if node.children().is_empty() {
            out.push_str(tree.text_of(id));
        } else {
            for &child in node.children() {
                walk(tree, child, out);
            }
        }
    }
    let mut out = String::new();
    walk(tree, tree.root(), &mut out);
    out
}

/// Assert every child's span lies within its parent's span and inside the
/// document.
pub fn assert_span_containment(tree: &basil::MatchTree) {
    fn walk(tree: &basil::MatchTree, id: basil::NodeId) {
        let node = tree.node(id);
        let span = node.span();
        assert!(span.start <= span.end, "inverted span on {id}");
        assert!(span.end <= tree.text().len(), "span past the end on {id}");
        for &child in node.children() {
            let child_span = tree.node(child).span();
            assert!(
                span.start <= child_span.start && child_span.end <= span.end,
                "child {child} [{:?}] escapes parent {id} [{:?}]",
                child_span,
                span,
            );
            walk(tree, child);
        }
    }
    walk(tree, tree.root());
}
