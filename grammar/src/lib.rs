//! Crate for compiling grammars into backtracking parsers.
//!
//! A grammar is a tree of [`Rule`]s (usually loaded from JSON or TOML, see [`Rule::load_file`]).
//! Its root maps rule names to definitions, built from a small set of combinators: sequences,
//! `$or`, `$repeat`, `$optional`, the lookaheads `$and` and `$not`, and the terminals `$literal`,
//! `$regex`, `$eof` and `$indent` (which tracks indentation-based blocks).  `$script` hands
//! control to a pluggable [`ScriptEngine`].
//!
//! Compiling goes through a [`Compiler`]:
//!
//! ```
//! use std::sync::Arc;
//! use parsejoy_grammar::{Compiler, NoScripts, Rule};
//!
//! let grammar = Rule::from_json(r#"{
//!     "start": {"$sequence": ["a", {"$literal": "b"}, "$eof"]},
//!     "a": {"$literal": "a"}
//! }"#).unwrap();
//! let program = Compiler::new(&grammar, Arc::new(NoScripts))
//!     .unwrap()
//!     .compile("start")
//!     .unwrap();
//! assert!(program.parse("ab").is_ok());
//! assert!(program.parse("ac").is_err());
//! ```
//!
//! Parsers backtrack: every combinator which fails leaves the cursor exactly where it found it.
//! There's no memoization of intermediate results, so pathological grammars can take exponential
//! time.  Left recursion isn't supported: any rule nested deeper than [`Config::max_depth`] fails.
//! Parses run on their own thread, with a stack sized to fit that many levels.

pub mod cache;
pub mod compiler;
pub mod config;
pub mod first_set;
pub mod parser;
pub mod rule;
pub mod script;
pub mod set;
pub mod state;
pub mod token;

pub use cache::ProgramCache;
pub use compiler::{CompileError, CompileResult, Compiler, ErrorKind};
pub use config::Config;
pub use parser::{ParseError, Parsed, Parser, Program, Report, RuleId};
pub use rule::{Fingerprint, Keyword, LoadError, Rule};
pub use script::{NativeScripts, NoScripts, ScriptEngine, ScriptError, ScriptHandle};
pub use state::{Checkpoint, State, StringState, TextState};
pub use token::{Match, NoMatch, Outcome, Token};
