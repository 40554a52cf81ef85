//! Compiled matcher nodes and lexical primitives
//!
//! The compiler lowers declarations into a flat arena of [`Matcher`]
//! values addressed by [`MatcherId`]. The arena is immutable once built
//! and shared read-only across concurrent matches of different documents.
//!
//! Every primitive consumes leading trivia first — spaces, tabs and
//! `/* */` runs, plus newlines and `// …` runs when the declaration is
//! cross-line — then applies its rule at the resulting offset. A
//! successful leaf spans from its entry offset (trivia included) to the
//! end of the consumed text; a failed leaf stays zero-width at the entry
//! offset.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::declare::{PatternDeclare, ScopeDeclare};

/// Index of a compiled matcher inside its grammar's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct MatcherId(pub(crate) u32);

impl MatcherId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One item of a sequence, with the flags the template brackets assigned.
#[derive(Clone)]
pub(crate) struct SeqItem {
    pub(crate) matcher: MatcherId,
    /// `[x]`: a failure is skipped instead of failing the sequence
    pub(crate) ignorable: bool,
    /// `[x...]`: retried in place until its first failure
    pub(crate) repeatable: bool,
}

/// The closed set of compiled matcher kinds.
#[derive(Clone)]
pub(crate) enum Matcher {
    /// Exact text, case-configurable, built by escaping into a regex
    Literal {
        regex: Regex,
        display: String,
        cross_line: bool,
        exclude: Option<Regex>,
    },
    /// A fixed or raw regular expression applied at the current offset
    Regex {
        regex: Regex,
        display: String,
        cross_line: bool,
        exclude: Option<Regex>,
    },
    /// An explicit run of trivia (`keep_space` templates)
    Space { cross_line: bool },
    /// Zero-width, always succeeds; stands in for implicit scope begins
    Wildcard,
    /// Transparent alias: how an identity-free single-alternative pattern
    /// compiles to its only child while recursive references to its
    /// reserved slot stay valid
    Ref(MatcherId),
    /// Makes the inner matcher's text retrievable by name from ancestors
    Named { name: String, inner: MatcherId },
    /// All children in order at an advancing offset
    Sequence {
        items: Vec<SeqItem>,
        strict: bool,
        cross_line: bool,
    },
    /// Declared alternatives at one offset; first success wins.
    ///
    /// With a declaration attached, success wraps the winning child in a
    /// pattern node and total failure produces an unmatched-pattern node.
    /// Without one (scope delimiter lists), the winning child is returned
    /// bare.
    Alternation {
        alternatives: Vec<MatcherId>,
        decl: Option<Arc<PatternDeclare>>,
    },
    /// begin, interior*, end with recovery
    Scope {
        begin: MatcherId,
        interior: Vec<MatcherId>,
        end: MatcherId,
        decl: Arc<ScopeDeclare>,
    },
}

/// `[_a-zA-Z][_a-zA-Z0-9]*`
pub(crate) static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[_a-zA-Z][_a-zA-Z0-9]*").unwrap());

/// `[+-]?[0-9]+.?[0-9]*`
pub(crate) static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?[0-9]+\.?[0-9]*").unwrap());

/// Double-quoted, with backslash escapes
pub(crate) static STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"([^\\"]|\\\S|\\")*""#).unwrap());

/// Build the anchored expression for a literal word.
pub(crate) fn literal_regex(text: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let flags = if case_insensitive { "(?i)" } else { "" };
    Regex::new(&format!("^{}{}", flags, regex::escape(text)))
}

/// Build the anchored expression for a raw `/re/` fragment.
pub(crate) fn raw_regex(source: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    if case_insensitive {
        Regex::new(&format!("^(?i:{})", source))
    } else {
        Regex::new(&format!("^(?:{})", source))
    }
}

/// Advance past leading trivia, returning the new offset.
///
/// Block comments only count when they close on the same line, and a
/// `/*/` opener is never treated as a comment.
pub(crate) fn skip_trivia(text: &str, offset: usize, cross_line: bool) -> usize {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut i = offset.min(len);
    loop {
        let round = i;
        while i < len {
            match bytes[i] {
                b' ' | b'\t' => i += 1,
                b'\r' | b'\n' if cross_line => i += 1,
                _ => break,
            }
        }
        if i + 1 < len && bytes[i] == b'/' && bytes[i + 1] == b'*' {
            let not_slash_next = bytes.get(i + 2) != Some(&b'/');
            let line_end = text[i..].find('\n').map(|k| i + k).unwrap_or(len);
            let close = text[i + 2..line_end].find("*/");
            if not_slash_next {
                if let Some(k) = close {
                    i = i + 2 + k + 2;
                    continue;
                }
            }
        }
        if cross_line && i + 1 < len && bytes[i] == b'/' && bytes[i + 1] == b'/' {
            i = text[i..].find('\n').map(|k| i + k + 1).unwrap_or(len);
            continue;
        }
        if i == round {
            return i;
        }
    }
}

/// Whether the text consists of trivia only.
pub(crate) fn is_trivia(text: &str, cross_line: bool) -> bool {
    skip_trivia(text, 0, cross_line) == text.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_spaces_and_block_comments() {
        assert_eq!(skip_trivia("   x", 0, false), 3);
        assert_eq!(skip_trivia("\t/* note */ x", 0, false), 12);
        assert_eq!(skip_trivia("a  b", 1, false), 3);
    }

    #[test]
    fn newlines_need_cross_line() {
        assert_eq!(skip_trivia("  \n  x", 0, false), 2);
        assert_eq!(skip_trivia("  \n  x", 0, true), 5);
    }

    #[test]
    fn line_comments_need_cross_line() {
        assert_eq!(skip_trivia("// note\nx", 0, false), 0);
        assert_eq!(skip_trivia("// note\nx", 0, true), 8);
        assert_eq!(skip_trivia("// trailing", 0, true), 11);
    }

    #[test]
    fn unclosed_block_comment_is_not_trivia() {
        assert_eq!(skip_trivia("/* open\nx", 0, true), 0);
        assert!(!is_trivia("/* open", false));
        assert!(is_trivia(" \t/*ok*/ ", false));
        assert!(is_trivia("  \n// tail", true));
    }

    #[test]
    fn literal_expressions_match_prefixes_case_insensitively() {
        let re = literal_regex("End If", true).unwrap();
        assert_eq!(re.find("end if x").unwrap().end(), 6);
        let re = literal_regex("Dim", false).unwrap();
        assert!(re.find("dim").is_none());
        // Metacharacters in the word are escaped, not interpreted.
        let re = literal_regex("(", true).unwrap();
        assert_eq!(re.find("(a)").unwrap().end(), 1);
    }

    #[test]
    fn builtin_expressions_accept_dialect_tokens() {
        assert_eq!(IDENTIFIER.find("counter1 =").unwrap().as_str(), "counter1");
        assert!(IDENTIFIER.find("1abc").is_none());
        assert_eq!(NUMBER.find("-12.5e").unwrap().as_str(), "-12.5");
        assert_eq!(
            STRING.find(r#""a \"quoted\" one" rest"#).unwrap().as_str(),
            r#""a \"quoted\" one""#
        );
    }

    #[test]
    fn raw_expressions_anchor_and_scope_their_flags() {
        let re = raw_regex("(While|Until)", true).unwrap();
        assert_eq!(re.find("until done").unwrap().as_str(), "until");
        let re = raw_regex("(While|Until)", false).unwrap();
        assert!(re.find("until done").is_none());
    }
}
