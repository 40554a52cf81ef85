//! Grammar compilation
//!
//! Lowers a [`GrammarDeclare`] into a [`CompiledGrammar`]: a flat,
//! immutable arena of matchers plus the list of top-level pattern entries.
//!
//! Declarations stay read-only. All compilation state — the
//! declaration-to-matcher memo, reserved slots for in-progress
//! declarations — lives in the compiler context, keyed by declaration
//! identity (`Arc` pointer), so each declaration compiles exactly once and
//! recursive references resolve to the slot reserved before their bodies
//! are built. Grammar errors surface here, once, at startup; matching
//! never fails.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::declare::{GrammarDeclare, PatternDeclare, ScopeDeclare};
use crate::engine;
use crate::error::CompileError;
use crate::matcher::{literal_regex, raw_regex, Matcher, MatcherId, SeqItem, IDENTIFIER, NUMBER, STRING};
use crate::template::{self, Fragment, ScanError};
use crate::tree::MatchTree;

/// An executable matcher graph, built once and shared read-only.
pub struct CompiledGrammar {
    matchers: Vec<Matcher>,
    top: Vec<MatcherId>,
    grammar: Arc<GrammarDeclare>,
}

impl std::fmt::Debug for CompiledGrammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGrammar")
            .field("matchers", &self.matchers.len())
            .field("top", &self.top.len())
            .field("grammar", &self.grammar.name)
            .finish()
    }
}

impl CompiledGrammar {
    /// Match a whole document. Never fails: malformed input degrades to
    /// unmatched nodes and the returned tree always spans the full text.
    pub fn match_document(&self, text: &str) -> MatchTree {
        engine::match_document(self, text)
    }

    pub fn grammar(&self) -> &Arc<GrammarDeclare> {
        &self.grammar
    }

    pub(crate) fn matcher(&self, id: MatcherId) -> &Matcher {
        &self.matchers[id.index()]
    }

    pub(crate) fn top_patterns(&self) -> &[MatcherId] {
        &self.top
    }
}

/// Compile a grammar declaration. Fatal on configuration errors:
/// malformed template syntax, undefined scope references, empty or looped
/// declarations, invalid regular expressions.
pub fn compile(grammar: Arc<GrammarDeclare>) -> Result<CompiledGrammar, CompileError> {
    let mut compiler = Compiler {
        grammar: &grammar,
        matchers: Vec::new(),
        compiled_patterns: HashMap::new(),
        compiled_scopes: HashMap::new(),
    };
    let top = grammar
        .patterns
        .iter()
        .map(|decl| compiler.compile_pattern(decl))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CompiledGrammar {
        matchers: compiler.matchers,
        top,
        grammar: Arc::clone(&grammar),
    })
}

struct Compiler<'g> {
    grammar: &'g GrammarDeclare,
    matchers: Vec<Matcher>,
    compiled_patterns: HashMap<*const PatternDeclare, MatcherId>,
    compiled_scopes: HashMap<*const ScopeDeclare, MatcherId>,
}

impl Compiler<'_> {
    fn push(&mut self, matcher: Matcher) -> MatcherId {
        let id = MatcherId(self.matchers.len() as u32);
        self.matchers.push(matcher);
        id
    }

    /// Reserve a slot so in-progress declarations can be referenced
    /// recursively; the placeholder is overwritten when the body is done.
    fn reserve(&mut self) -> MatcherId {
        self.push(Matcher::Wildcard)
    }

    /// Follow named wrappers and aliases down to the matcher they decorate.
    fn resolve_alias(&self, mut id: MatcherId) -> MatcherId {
        loop {
            match &self.matchers[id.index()] {
                Matcher::Named { inner, .. } => id = *inner,
                Matcher::Ref(inner) => id = *inner,
                _ => return id,
            }
        }
    }

    fn compile_pattern(&mut self, decl: &Arc<PatternDeclare>) -> Result<MatcherId, CompileError> {
        let key = Arc::as_ptr(decl);
        if let Some(&id) = self.compiled_patterns.get(&key) {
            return Ok(id);
        }
        if decl.templates.is_empty() {
            return Err(CompileError::EmptyAlternatives {
                pattern: decl.name.clone(),
            });
        }
        let exclude = decl
            .exclude
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|source| CompileError::BadRegex {
                pattern: decl.name.clone(),
                source,
            })?;

        let slot = self.reserve();
        self.compiled_patterns.insert(key, slot);

        let alternatives = decl
            .templates
            .iter()
            .map(|template| self.compile_template(template, decl, &exclude))
            .collect::<Result<Vec<_>, _>>()?;

        if alternatives.len() == 1 {
            if self.resolve_alias(alternatives[0]) == slot {
                return Err(CompileError::LoopedDefinition {
                    pattern: decl.name.clone(),
                });
            }
            if !decl.has_identity() {
                // Transparent pass-through: no match node of its own.
                self.matchers[slot.index()] = Matcher::Ref(alternatives[0]);
                return Ok(slot);
            }
        }

        self.matchers[slot.index()] = Matcher::Alternation {
            alternatives,
            decl: Some(Arc::clone(decl)),
        };
        Ok(slot)
    }

    fn compile_template(
        &mut self,
        template: &str,
        decl: &Arc<PatternDeclare>,
        exclude: &Option<Regex>,
    ) -> Result<MatcherId, CompileError> {
        let fragments = template::scan(template).map_err(|err| match err {
            ScanError::Unopened => CompileError::UnopenedBracket {
                pattern: decl.name.clone(),
            },
            ScanError::Unclosed => CompileError::UnclosedBracket {
                pattern: decl.name.clone(),
            },
        })?;

        let mut items = Vec::new();
        for fragment in fragments {
            match fragment {
                Fragment::Word(word) => {
                    let regex = literal_regex(&word, decl.case_insensitive).map_err(|source| {
                        CompileError::BadRegex {
                            pattern: decl.name.clone(),
                            source,
                        }
                    })?;
                    let id = self.push(Matcher::Literal {
                        regex,
                        display: word,
                        cross_line: decl.cross_line,
                        exclude: exclude.clone(),
                    });
                    items.push(plain(id));
                }
                Fragment::Space => {
                    if decl.keep_space {
                        let id = self.push(Matcher::Space {
                            cross_line: decl.cross_line,
                        });
                        items.push(plain(id));
                    }
                }
                Fragment::Bracket(bracket) => {
                    items.push(self.compile_bracket(&bracket, decl, exclude)?);
                }
            }
        }

        if items.is_empty() {
            return Err(CompileError::EmptyTemplate {
                pattern: decl.name.clone(),
            });
        }
        if items.len() == 1 && !items[0].ignorable && !items[0].repeatable {
            return Ok(items[0].matcher);
        }
        Ok(self.push(Matcher::Sequence {
            items,
            strict: decl.strict,
            cross_line: decl.cross_line,
        }))
    }

    /// Bracket dispatch: `<name>` reference, `[x]`/`[x...]` optional,
    /// `{name}` embedded scope, `/re/` raw expression.
    fn compile_bracket(
        &mut self,
        bracket: &str,
        decl: &Arc<PatternDeclare>,
        exclude: &Option<Regex>,
    ) -> Result<SeqItem, CompileError> {
        let inner = &bracket[1..bracket.len() - 1];
        match bracket.as_bytes()[0] {
            b'<' => {
                let name = inner;
                let resolved = match name {
                    "identifier" => self.builtin(&IDENTIFIER, "identifier", decl, exclude),
                    "number" => self.builtin(&NUMBER, "number", decl, exclude),
                    "string" => self.builtin(&STRING, "string", decl, exclude),
                    _ => {
                        if let Some(local) = decl.dictionary.get(name).cloned() {
                            self.compile_pattern(&local)?
                        } else if let Some(global) =
                            self.grammar.pattern_repository.get(name).cloned()
                        {
                            self.compile_pattern(&global)?
                        } else {
                            // Unresolved references capture an identifier.
                            self.builtin(&IDENTIFIER, "identifier", decl, exclude)
                        }
                    }
                };
                let id = self.push(Matcher::Named {
                    name: name.to_string(),
                    inner: resolved,
                });
                Ok(plain(id))
            }
            b'[' => {
                let mut body = inner;
                let repeatable = body.trim_end().ends_with("...");
                if repeatable {
                    let trimmed = body.trim_end();
                    body = &trimmed[..trimmed.len() - 3];
                }
                let id = self.compile_template(body, decl, exclude)?;
                Ok(SeqItem {
                    matcher: id,
                    ignorable: true,
                    repeatable,
                })
            }
            b'{' => {
                let scope = decl
                    .scopes
                    .get(inner)
                    .or_else(|| self.grammar.scope_repository.get(inner))
                    .cloned()
                    .ok_or_else(|| CompileError::UnresolvedScope {
                        pattern: decl.name.clone(),
                        scope: inner.to_string(),
                    })?;
                let id = self.compile_scope(&scope)?;
                Ok(plain(id))
            }
            _ => {
                let regex =
                    raw_regex(inner, decl.case_insensitive).map_err(|source| {
                        CompileError::BadRegex {
                            pattern: decl.name.clone(),
                            source,
                        }
                    })?;
                let id = self.push(Matcher::Regex {
                    regex,
                    display: inner.to_string(),
                    cross_line: decl.cross_line,
                    exclude: exclude.clone(),
                });
                Ok(plain(id))
            }
        }
    }

    fn builtin(
        &mut self,
        regex: &Regex,
        display: &str,
        decl: &Arc<PatternDeclare>,
        exclude: &Option<Regex>,
    ) -> MatcherId {
        self.push(Matcher::Regex {
            regex: regex.clone(),
            display: display.to_string(),
            cross_line: decl.cross_line,
            exclude: exclude.clone(),
        })
    }

    fn compile_scope(&mut self, scope: &Arc<ScopeDeclare>) -> Result<MatcherId, CompileError> {
        let key = Arc::as_ptr(scope);
        if let Some(&id) = self.compiled_scopes.get(&key) {
            return Ok(id);
        }
        if scope.end.is_empty()
            || (!self.grammar.implicit_boundaries && scope.begin.is_empty())
        {
            return Err(CompileError::EmptyScopeDelimiter {
                scope: scope.name.clone(),
            });
        }

        let slot = self.reserve();
        self.compiled_scopes.insert(key, slot);

        let begin = if self.grammar.implicit_boundaries {
            self.push(Matcher::Wildcard)
        } else {
            self.delimiters(&scope.begin, &scope.name)?
        };
        let interior = scope
            .patterns
            .iter()
            .map(|pattern| self.compile_pattern(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        if self.grammar.implicit_boundaries {
            for &id in &interior {
                let resolved = self.resolve_alias(id);
                if resolved == slot
                    || matches!(self.matchers[resolved.index()], Matcher::Scope { .. })
                {
                    return Err(CompileError::NestedImplicitScope {
                        scope: scope.name.clone(),
                    });
                }
            }
        }
        let end = self.delimiters(&scope.end, &scope.name)?;

        self.matchers[slot.index()] = Matcher::Scope {
            begin,
            interior,
            end,
            decl: Arc::clone(scope),
        };
        Ok(slot)
    }

    /// A delimiter list compiles to a declaration-free alternation of
    /// case-insensitive literals.
    fn delimiters(&mut self, texts: &[String], scope: &str) -> Result<MatcherId, CompileError> {
        let mut alternatives = Vec::with_capacity(texts.len());
        for text in texts {
            let regex = literal_regex(text, true).map_err(|source| CompileError::BadRegex {
                pattern: scope.to_string(),
                source,
            })?;
            alternatives.push(self.push(Matcher::Literal {
                regex,
                display: text.clone(),
                cross_line: false,
                exclude: None,
            }));
        }
        if alternatives.len() == 1 {
            return Ok(alternatives[0]);
        }
        Ok(self.push(Matcher::Alternation {
            alternatives,
            decl: None,
        }))
    }
}

fn plain(matcher: MatcherId) -> SeqItem {
    SeqItem {
        matcher,
        ignorable: false,
        repeatable: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::SkipMode;

    fn compile_grammar(grammar: GrammarDeclare) -> Result<CompiledGrammar, CompileError> {
        compile(Arc::new(grammar))
    }

    #[test]
    fn memoizes_by_declaration_identity() {
        let identifier = PatternDeclare::identifier();
        let first = PatternDeclare::single("First", "Dim <name>")
            .id("first")
            .entry("name", Arc::clone(&identifier));
        let second = PatternDeclare::single("Second", "Set <name>")
            .id("second")
            .entry("name", Arc::clone(&identifier));
        let grammar = GrammarDeclare::new("g")
            .pattern(Arc::new(first))
            .pattern(Arc::new(second));
        let compiled = compile_grammar(grammar).unwrap();
        // Both <name> references resolve through the one shared declaration.
        let named_targets: Vec<_> = compiled
            .matchers
            .iter()
            .filter_map(|m| match m {
                Matcher::Named { name, inner } if name == "name" => Some(*inner),
                _ => None,
            })
            .collect();
        assert_eq!(named_targets.len(), 2);
        assert_eq!(named_targets[0], named_targets[1]);
    }

    #[test]
    fn identity_free_single_alternative_is_transparent() {
        let grammar = GrammarDeclare::new("g")
            .pattern(Arc::new(PatternDeclare::single("Stmt", "Stop").id("stmt")))
            .pattern(Arc::new(PatternDeclare::single("Plain", "Go")));
        let compiled = compile_grammar(grammar).unwrap();
        let stmt = compiled.matcher(compiled.top_patterns()[0]);
        let plain = compiled.matcher(compiled.top_patterns()[1]);
        assert!(matches!(stmt, Matcher::Alternation { decl: Some(_), .. }));
        assert!(matches!(plain, Matcher::Literal { .. }));
    }

    #[test]
    fn looped_definition_is_fatal() {
        // A pattern whose only alternative is a reference back to itself.
        let direct = Arc::new(PatternDeclare::single("Direct", "<direct>"));
        let grammar = GrammarDeclare::new("g")
            .repository_pattern("direct", Arc::clone(&direct))
            .pattern(direct);
        let err = compile_grammar(grammar).unwrap_err();
        assert!(matches!(err, CompileError::LoopedDefinition { .. }));
    }

    #[test]
    fn recursion_through_other_branches_is_legal() {
        // expression -> bracket -> expression is a legitimate cycle.
        let expression = Arc::new(
            PatternDeclare::new("Expression", ["<bracket>", "<number>"]).id("expression"),
        );
        let bracket = Arc::new(PatternDeclare::single("Bracket", "(<expression>)").id("bracket"));
        let grammar = GrammarDeclare::new("g")
            .repository_pattern("expression", Arc::clone(&expression))
            .repository_pattern("bracket", bracket)
            .pattern(expression);
        assert!(compile_grammar(grammar).is_ok());
    }

    #[test]
    fn undefined_scope_reference_is_fatal() {
        let grammar = GrammarDeclare::new("g").pattern(Arc::new(
            PatternDeclare::single("If", "If <cond> Then {body} End If").id("if"),
        ));
        let err = compile_grammar(grammar).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnresolvedScope { ref scope, .. } if scope == "body"
        ));
    }

    #[test]
    fn template_errors_are_fatal() {
        let unclosed = GrammarDeclare::new("g")
            .pattern(Arc::new(PatternDeclare::single("Bad", "If <cond Then")));
        assert!(matches!(
            compile_grammar(unclosed).unwrap_err(),
            CompileError::UnclosedBracket { .. }
        ));

        let empty = GrammarDeclare::new("g")
            .pattern(Arc::new(PatternDeclare::new("Bad", Vec::<String>::new())));
        assert!(matches!(
            compile_grammar(empty).unwrap_err(),
            CompileError::EmptyAlternatives { .. }
        ));

        let bad_regex = GrammarDeclare::new("g")
            .pattern(Arc::new(PatternDeclare::single("Bad", "/(/")));
        assert!(matches!(
            compile_grammar(bad_regex).unwrap_err(),
            CompileError::BadRegex { .. }
        ));
    }

    #[test]
    fn scope_without_end_delimiters_is_fatal() {
        let scope = Arc::new(ScopeDeclare::new(
            "block",
            ["{"],
            Vec::<String>::new(),
            [],
        ));
        let grammar = GrammarDeclare::new("g")
            .repository_scope("block", scope)
            .pattern(Arc::new(PatternDeclare::single("Blk", "{block}").id("blk")));
        assert!(matches!(
            compile_grammar(grammar).unwrap_err(),
            CompileError::EmptyScopeDelimiter { .. }
        ));
    }

    #[test]
    fn implicit_boundary_scope_gets_a_wildcard_begin() {
        let block = Arc::new(
            ScopeDeclare::new(
                "block",
                Vec::<String>::new(),
                ["End If"],
                [Arc::new(PatternDeclare::single("Stmt", "Stop").id("stmt"))],
            )
            .skip_mode(SkipMode::Line),
        );
        let grammar = GrammarDeclare::new("g")
            .implicit_boundaries()
            .repository_scope("block", block)
            .pattern(Arc::new(
                PatternDeclare::single("If", "If <cond> Then {block} End If").id("if"),
            ));
        let compiled = compile_grammar(grammar).unwrap();
        let scope = compiled
            .matchers
            .iter()
            .find_map(|m| match m {
                Matcher::Scope { begin, .. } => Some(*begin),
                _ => None,
            })
            .unwrap();
        assert!(matches!(compiled.matcher(scope), Matcher::Wildcard));
    }

    #[test]
    fn direct_scope_nesting_under_implicit_boundaries_is_fatal() {
        // The interior pattern compiles straight to the scope itself.
        let inner = Arc::new(PatternDeclare::single("Inner", "{block}"));
        let block = Arc::new(ScopeDeclare::new(
            "block",
            Vec::<String>::new(),
            ["Loop"],
            [inner],
        ));
        let grammar = GrammarDeclare::new("g")
            .implicit_boundaries()
            .repository_scope("block", block)
            .pattern(Arc::new(
                PatternDeclare::single("Do", "Do {block} Loop").id("do"),
            ));
        let err = compile_grammar(grammar).unwrap_err();
        assert!(matches!(err, CompileError::NestedImplicitScope { .. }));
    }
}
