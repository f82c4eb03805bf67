use std::fmt::{Display, Formatter};

use crate::script::ScriptError;

pub type CompileResult<T> = Result<T, CompileError>;

/// The possible ways that compiling a grammar can fail.  `rule` fields name the innermost named
/// rule being compiled when the error occurred.
#[derive(Debug)]
pub enum CompileError {
    /// The grammar's root isn't a map of named rules
    NotAGrammar,
    /// A rule has the wrong shape (e.g. a `$literal` applied to a list)
    Grammar { rule: String, reason: String },
    Regex {
        rule: String,
        pattern: String,
        inner: regex::Error,
    },
    /// A string refers to something which is neither a rule nor a built-in
    UnknownRule { rule: String, name: String },
    /// A single-entry map uses a `$` key which isn't a known combinator
    UnknownCombinator { rule: String, keyword: String },
    UnknownStartRule(String),
    Script {
        rule: String,
        source: String,
        inner: ScriptError,
    },
}

/// Coarse classification of [`CompileError`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The grammar is malformed
    Grammar,
    /// A name couldn't be resolved
    RuleResolution,
    /// A script failed to compile
    ScriptCompile,
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::NotAGrammar | CompileError::Grammar { .. } | CompileError::Regex { .. } => {
                ErrorKind::Grammar
            }
            CompileError::UnknownRule { .. }
            | CompileError::UnknownCombinator { .. }
            | CompileError::UnknownStartRule(_) => ErrorKind::RuleResolution,
            CompileError::Script { .. } => ErrorKind::ScriptCompile,
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CompileError::NotAGrammar => write!(f, "a grammar must be a map of named rules"),
            CompileError::Grammar { rule, reason } => {
                write!(f, "malformed rule in `{}`: {}", rule, reason)
            }
            CompileError::Regex {
                rule,
                pattern,
                inner,
            } => write!(f, "invalid regex {:?} in `{}`: {}", pattern, rule, inner),
            CompileError::UnknownRule { rule, name } => {
                write!(f, "`{}` refers to unknown rule `{}`", rule, name)
            }
            CompileError::UnknownCombinator { rule, keyword } => {
                write!(f, "`{}` uses unknown combinator `{}`", rule, keyword)
            }
            CompileError::UnknownStartRule(name) => write!(f, "no rule called `{}`", name),
            CompileError::Script {
                rule,
                source,
                inner,
            } => write!(f, "can't compile script {:?} in `{}`: {}", source, rule, inner),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Regex { inner, .. } => Some(inner),
            CompileError::Script { inner, .. } => Some(inner),
            _ => None,
        }
    }
}
