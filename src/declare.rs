//! Grammar declaration data model
//!
//! Declarations are plain data authored once at process start: pattern
//! templates, scope delimiter lists, flags, and callback slots. They are
//! shared via [`Arc`] and never mutated — compilation state lives in a
//! separate context keyed by declaration identity (see [`crate::compile`]),
//! so the same declarations can be compiled and matched from any thread.
//!
//! Callback slots are how external collaborators (a symbol table, a
//! documentation provider) attach semantics without the engine knowing
//! their model: `on_matched` runs once per parse during the semantic pass,
//! the query callbacks run on demand, and all of them report failure as a
//! [`CallbackError`] that is logged at the node and contained there.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::completion::CompletionOutcome;
use crate::diagnostics::Diagnostic;
use crate::error::CallbackError;
use crate::hover::HoverContent;
use crate::tree::{MatchTree, NodeId};

/// Invoked during the post-match semantic pass; the sole place node state
/// slots are expected to be written.
pub type MatchedCallback =
    Box<dyn Fn(&mut MatchTree, NodeId) -> Result<(), CallbackError> + Send + Sync>;

/// Invoked during completion requests on the enclosing match node.
pub type CompletionCallback =
    Box<dyn Fn(&MatchTree, NodeId) -> Result<CompletionOutcome, CallbackError> + Send + Sync>;

/// Invoked during hover requests on the located node.
pub type HoverCallback =
    Box<dyn Fn(&MatchTree, NodeId) -> Result<Option<HoverContent>, CallbackError> + Send + Sync>;

/// Invoked while collecting diagnostics on an unmatched node.
pub type DiagnosticCallback = Box<dyn Fn(&MatchTree, NodeId) -> Vec<Diagnostic> + Send + Sync>;

/// Resynchronization policy after an interior scope mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipMode {
    /// Restart matching at the beginning of the next source line
    #[default]
    Line,
    /// Restart at the furthest offset reached by any failed attempt
    FurthestMatch,
}

/// A named, possibly-alternative set of template strings plus flags and
/// callbacks. Compiles once, lazily, into a matcher.
pub struct PatternDeclare {
    /// Display name, used in compile errors
    pub name: String,
    /// Stable identity; a pattern with an id always keeps its own match node
    pub id: Option<String>,
    /// Template alternatives, tried in declaration order
    pub templates: Vec<String>,
    /// Local name dictionary consulted before the global repository
    pub dictionary: HashMap<String, Arc<PatternDeclare>>,
    /// Local scope dictionary consulted before the global repository
    pub scopes: HashMap<String, Arc<ScopeDeclare>>,
    /// Escalate a failing child that consumed non-trivia text to a hard failure
    pub strict: bool,
    /// Let trivia skipping swallow newlines and line comments
    pub cross_line: bool,
    /// Case-insensitive literals and raw regex fragments
    pub case_insensitive: bool,
    /// Keep explicit space matchers between template words
    pub keep_space: bool,
    /// Exclusion expression: vetoes a primitive match equal to its match
    pub exclude: Option<String>,
    pub on_matched: Option<MatchedCallback>,
    pub on_completion: Option<CompletionCallback>,
    pub on_hover: Option<HoverCallback>,
    pub on_diagnostic: Option<DiagnosticCallback>,
}

impl PatternDeclare {
    pub fn new(
        name: impl Into<String>,
        templates: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            id: None,
            templates: templates.into_iter().map(Into::into).collect(),
            dictionary: HashMap::new(),
            scopes: HashMap::new(),
            strict: false,
            cross_line: false,
            case_insensitive: true,
            keep_space: false,
            exclude: None,
            on_matched: None,
            on_completion: None,
            on_hover: None,
            on_diagnostic: None,
        }
    }

    /// A pattern with a single template alternative.
    pub fn single(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(name, [template.into()])
    }

    /// A pattern that only references another declared pattern by name.
    pub fn reference(pattern_name: &str) -> Arc<Self> {
        Arc::new(Self::single(pattern_name, format!("<{}>", pattern_name)))
    }

    /// The builtin identifier pattern, for dictionary entries.
    pub fn identifier() -> Arc<Self> {
        Arc::new(Self::single("Identifier", "<identifier>"))
    }

    /// The builtin number pattern, for dictionary entries.
    pub fn number() -> Arc<Self> {
        Arc::new(Self::single("Number", "<number>"))
    }

    /// The builtin string pattern, for dictionary entries.
    pub fn string() -> Arc<Self> {
        Arc::new(Self::single("String", "<string>"))
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn cross_line(mut self) -> Self {
        self.cross_line = true;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_insensitive = false;
        self
    }

    pub fn keep_space(mut self) -> Self {
        self.keep_space = true;
        self
    }

    pub fn exclude(mut self, expression: impl Into<String>) -> Self {
        self.exclude = Some(expression.into());
        self
    }

    pub fn entry(mut self, name: impl Into<String>, pattern: Arc<PatternDeclare>) -> Self {
        self.dictionary.insert(name.into(), pattern);
        self
    }

    pub fn scope_entry(mut self, name: impl Into<String>, scope: Arc<ScopeDeclare>) -> Self {
        self.scopes.insert(name.into(), scope);
        self
    }

    pub fn on_matched(
        mut self,
        callback: impl Fn(&mut MatchTree, NodeId) -> Result<(), CallbackError> + Send + Sync + 'static,
    ) -> Self {
        self.on_matched = Some(Box::new(callback));
        self
    }

    pub fn on_completion(
        mut self,
        callback: impl Fn(&MatchTree, NodeId) -> Result<CompletionOutcome, CallbackError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_completion = Some(Box::new(callback));
        self
    }

    pub fn on_hover(
        mut self,
        callback: impl Fn(&MatchTree, NodeId) -> Result<Option<HoverContent>, CallbackError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_hover = Some(Box::new(callback));
        self
    }

    pub fn on_diagnostic(
        mut self,
        callback: impl Fn(&MatchTree, NodeId) -> Vec<Diagnostic> + Send + Sync + 'static,
    ) -> Self {
        self.on_diagnostic = Some(Box::new(callback));
        self
    }

    /// Whether matching must keep a dedicated node for this pattern.
    ///
    /// Identity-free single-alternative patterns compile transparently to
    /// their only child.
    pub(crate) fn has_identity(&self) -> bool {
        self.id.is_some()
            || self.on_matched.is_some()
            || self.on_completion.is_some()
            || self.on_hover.is_some()
            || self.on_diagnostic.is_some()
    }
}

impl fmt::Debug for PatternDeclare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternDeclare")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("templates", &self.templates)
            .field("strict", &self.strict)
            .field("cross_line", &self.cross_line)
            .finish_non_exhaustive()
    }
}

/// Delimiter alternatives plus an interior pattern list and a recovery
/// policy.
pub struct ScopeDeclare {
    pub name: String,
    /// Begin delimiter alternatives; unused when the grammar declares
    /// implicit block boundaries
    pub begin: Vec<String>,
    /// End delimiter alternatives
    pub end: Vec<String>,
    /// Interior pattern alternatives, tried in declaration order
    pub patterns: Vec<Arc<PatternDeclare>>,
    pub skip_mode: SkipMode,
    pub on_matched: Option<MatchedCallback>,
    pub on_completion: Option<CompletionCallback>,
}

impl ScopeDeclare {
    pub fn new(
        name: impl Into<String>,
        begin: impl IntoIterator<Item = impl Into<String>>,
        end: impl IntoIterator<Item = impl Into<String>>,
        patterns: impl IntoIterator<Item = Arc<PatternDeclare>>,
    ) -> Self {
        Self {
            name: name.into(),
            begin: begin.into_iter().map(Into::into).collect(),
            end: end.into_iter().map(Into::into).collect(),
            patterns: patterns.into_iter().collect(),
            skip_mode: SkipMode::default(),
            on_matched: None,
            on_completion: None,
        }
    }

    pub fn skip_mode(mut self, mode: SkipMode) -> Self {
        self.skip_mode = mode;
        self
    }

    pub fn on_matched(
        mut self,
        callback: impl Fn(&mut MatchTree, NodeId) -> Result<(), CallbackError> + Send + Sync + 'static,
    ) -> Self {
        self.on_matched = Some(Box::new(callback));
        self
    }

    pub fn on_completion(
        mut self,
        callback: impl Fn(&MatchTree, NodeId) -> Result<CompletionOutcome, CallbackError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_completion = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for ScopeDeclare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeDeclare")
            .field("name", &self.name)
            .field("begin", &self.begin)
            .field("end", &self.end)
            .field("skip_mode", &self.skip_mode)
            .finish_non_exhaustive()
    }
}

/// The root grammar declaration: top-level patterns, global repositories,
/// and the block-boundary convention of the dialect.
pub struct GrammarDeclare {
    pub name: String,
    /// Top-level pattern alternatives, tried in declaration order
    pub patterns: Vec<Arc<PatternDeclare>>,
    pub pattern_repository: HashMap<String, Arc<PatternDeclare>>,
    pub scope_repository: HashMap<String, Arc<ScopeDeclare>>,
    /// Blocks are delimited only by their terminating keyword: scope begin
    /// matchers become zero-width wildcards and a sequence resumes from a
    /// consumed scope's end match so the trailing keyword is re-matched
    pub implicit_boundaries: bool,
    /// Root init callback; runs on the grammar match before any other
    pub on_matched: Option<MatchedCallback>,
    pub on_completion: Option<CompletionCallback>,
}

impl GrammarDeclare {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            patterns: Vec::new(),
            pattern_repository: HashMap::new(),
            scope_repository: HashMap::new(),
            implicit_boundaries: false,
            on_matched: None,
            on_completion: None,
        }
    }

    pub fn pattern(mut self, pattern: Arc<PatternDeclare>) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn repository_pattern(
        mut self,
        name: impl Into<String>,
        pattern: Arc<PatternDeclare>,
    ) -> Self {
        self.pattern_repository.insert(name.into(), pattern);
        self
    }

    pub fn repository_scope(mut self, name: impl Into<String>, scope: Arc<ScopeDeclare>) -> Self {
        self.scope_repository.insert(name.into(), scope);
        self
    }

    pub fn implicit_boundaries(mut self) -> Self {
        self.implicit_boundaries = true;
        self
    }

    pub fn on_matched(
        mut self,
        callback: impl Fn(&mut MatchTree, NodeId) -> Result<(), CallbackError> + Send + Sync + 'static,
    ) -> Self {
        self.on_matched = Some(Box::new(callback));
        self
    }

    pub fn on_completion(
        mut self,
        callback: impl Fn(&MatchTree, NodeId) -> Result<CompletionOutcome, CallbackError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_completion = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for GrammarDeclare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrammarDeclare")
            .field("name", &self.name)
            .field("patterns", &self.patterns.len())
            .field("implicit_boundaries", &self.implicit_boundaries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_free_patterns_are_transparent_candidates() {
        let plain = PatternDeclare::single("Condition", "<expression>");
        assert!(!plain.has_identity());

        let with_id = PatternDeclare::single("Statement", "<expression>").id("statement");
        assert!(with_id.has_identity());

        let with_callback = PatternDeclare::single("Statement", "<expression>")
            .on_completion(|_, _| Ok(CompletionOutcome::default()));
        assert!(with_callback.has_identity());
    }

    #[test]
    fn builders_accumulate_dictionaries() {
        let decl = PatternDeclare::single("Var Declare", "Dim <name> As <type>")
            .entry("name", PatternDeclare::identifier())
            .entry("type", PatternDeclare::identifier());
        assert_eq!(decl.dictionary.len(), 2);
        assert!(decl.dictionary.contains_key("type"));
    }
}
