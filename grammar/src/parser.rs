//! Compiled parsers and the interpreter which runs them.
//!
//! A compiled grammar is a [`Program`]: a table of named rules, each holding a tree of
//! [`Parser`] combinators.  References between named rules go through the table (see
//! [`Parser::Rule`]), which is how recursive grammars are represented without cycles of owned
//! data.
//!
//! Every combinator obeys the same contract: if it fails, the cursor (and the stack of open
//! indentation blocks) is exactly where it was when the combinator started.  `$and` and `$not`
//! restore the cursor even when they succeed.
//!
//! Nested rules are run by recursion, so every parse runs on its own thread with a stack big
//! enough for [`Config::max_depth`] levels of the program's most deeply nested rule.

use std::sync::Arc;

use index_vec::IndexVec;
use regex::Regex;
use regex_syntax::hir::{Anchor, Hir, HirKind};

use crate::{
    config::Config,
    rule::Fingerprint,
    script::{ScriptEngine, ScriptHandle},
    set::{BitGrammar, BitSet, Id, Set},
    state::{State, StringState, TextState},
    token::{Match, NoMatch, Outcome, Token},
};

index_vec::define_index_type! { pub struct RuleId = usize; }

/// The token kind given to everything matched by a `$regex`
pub const REGEX_TOKEN_KIND: &str = "regex";
/// The token kind of the part of a line's indentation which belongs to blocks that were already
/// open
pub const CURRENT_INDENT_TOKEN_KIND: &str = "current_indent";
/// The token kind of the extra indentation which opens a block
pub const INDENT_TOKEN_KIND: &str = "indent";
/// The token kind of the (empty) tokens which close blocks, one per block
pub const DEDENT_TOKEN_KIND: &str = "dedent";

/// Named rules starting with this never get their own token in parse trees
pub const HIDDEN_RULE_PREFIX: &str = "__";

/// Stack reserved for each level of rule nesting, plus [`COMBINATOR_FRAME_BYTES`] for each
/// combinator level of the most deeply nested rule body
const RULE_FRAME_BYTES: usize = 16 * 1024;
const COMBINATOR_FRAME_BYTES: usize = 16 * 1024;
/// Stack for everything other than nested rules
const BASE_STACK_BYTES: usize = 1024 * 1024;
const MAX_STACK_BYTES: usize = 256 * 1024 * 1024;

/// One node of a compiled parser.
#[derive(Debug, Clone)]
pub enum Parser {
    /// Matches exactly this (non-empty) text
    Literal(String),
    /// Matches the regex at the current position.  If `looks_behind` is set, the pattern has
    /// assertions about the input before the cursor (like `\b` or `^`), so `regex` is run over the
    /// whole input.  Otherwise, `regex` is anchored and run over the remaining input.
    Regex {
        pattern: String,
        regex: Regex,
        looks_behind: bool,
    },
    /// Matches (without consuming anything) only at the end of the input
    Eof,
    /// Matches the spaces and tabs at the cursor against the open indentation blocks, opening one
    /// block or closing any number of them
    Indent,
    Sequence(Vec<Parser>),
    /// One or more repetitions
    Repeat(Box<Parser>),
    /// Ordered choice: the first branch to match wins
    Or(Vec<Branch>),
    /// Positive lookahead
    And(Box<Parser>),
    /// Negative lookahead
    Not(Box<Parser>),
    Optional(Box<Parser>),
    Script { source: String, handle: ScriptHandle },
    /// Runs the named rule with this id
    Rule(RuleId),
}

impl Parser {
    pub fn literal(text: impl Into<String>) -> Self {
        Parser::Literal(text.into())
    }

    /// Builds a parser matching `pattern` at the current position.  `.` also matches newlines.
    pub fn regex(pattern: impl Into<String>) -> Result<Self, regex::Error> {
        let pattern = pattern.into();
        let looks_behind = regex_syntax::Parser::new()
            .parse(&dotall_pattern(&pattern))
            .map_or(false, |hir| depends_on_left_context(&hir));
        let regex = if looks_behind {
            Regex::new(&dotall_pattern(&pattern))?
        } else {
            Regex::new(&anchored_pattern(&pattern))?
        };
        Ok(Parser::Regex {
            pattern,
            regex,
            looks_behind,
        })
    }

    /// How many combinators deep this parser goes, not counting the rules it refers to
    pub fn nesting(&self) -> usize {
        1 + match self {
            Parser::Literal(_)
            | Parser::Regex { .. }
            | Parser::Eof
            | Parser::Indent
            | Parser::Script { .. }
            | Parser::Rule(_) => 0,
            Parser::Sequence(children) => children.iter().map(Parser::nesting).max().unwrap_or(0),
            Parser::Or(branches) => branches
                .iter()
                .map(|branch| branch.parser.nesting())
                .max()
                .unwrap_or(0),
            Parser::Repeat(sub) | Parser::And(sub) | Parser::Not(sub) | Parser::Optional(sub) => {
                sub.nesting()
            }
        }
    }
}

pub(crate) fn anchored_pattern(pattern: &str) -> String {
    format!("^{}", dotall_pattern(pattern))
}

fn dotall_pattern(pattern: &str) -> String {
    format!("(?s:{})", pattern)
}

/// Returns `true` if matching `hir` depends on what comes before the position it starts at
fn depends_on_left_context(hir: &Hir) -> bool {
    match hir.kind() {
        HirKind::Anchor(Anchor::StartText) | HirKind::Anchor(Anchor::StartLine) => true,
        HirKind::WordBoundary(_) => true,
        HirKind::Repetition(repetition) => depends_on_left_context(&repetition.hir),
        HirKind::Group(group) => depends_on_left_context(&group.hir),
        HirKind::Concat(hirs) | HirKind::Alternation(hirs) => {
            hirs.iter().any(depends_on_left_context)
        }
        HirKind::Empty | HirKind::Literal(_) | HirKind::Class(_) | HirKind::Anchor(_) => false,
    }
}

/// One alternative of a [`Parser::Or`]
#[derive(Debug, Clone)]
pub struct Branch {
    pub parser: Parser,
    /// Ids of every literal which a match of this branch could start with.  If present, the
    /// branch is skipped whenever none of them start the remaining input.
    pub first: Option<BitSet<String>>,
}

impl From<Parser> for Branch {
    fn from(parser: Parser) -> Self {
        Self {
            parser,
            first: None,
        }
    }
}

/// A named rule of a [`Program`]
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    pub body: Parser,
}

/// A compiled grammar, ready to run against any number of inputs.  Programs are immutable, so
/// can be shared between threads.
#[derive(Debug)]
pub struct Program {
    pub(crate) rules: IndexVec<RuleId, CompiledRule>,
    pub(crate) start: RuleId,
    /// The [`Parser::nesting`] of the most deeply nested rule body
    pub(crate) nesting: usize,
    /// Registry of the literals which `$or` branches are pruned by
    pub(crate) prefixes: Arc<BitGrammar<String>>,
    /// Every entry of `prefixes`, to avoid taking its lock during parsing
    pub(crate) prefix_list: Vec<(Id, String)>,
    pub(crate) scripts: Arc<dyn ScriptEngine>,
    pub(crate) config: Config,
    pub(crate) fingerprint: Fingerprint,
}

impl Program {
    /// Runs the start rule against `state`.  On failure, `state` is left where it started.
    pub fn run<S: TextState + Send>(&self, state: &mut S) -> Outcome {
        self.run_with_report(state).0
    }

    /// Like [`Program::run`], but also reports how far the parse got.
    pub fn run_with_report<S: TextState + Send>(&self, state: &mut S) -> (Outcome, Report) {
        self.run_rule(self.start, state)
    }

    /// Runs a specific named rule against `state`, on a thread with enough stack for
    /// [`Program::depth_limit`] levels of nesting.
    pub fn run_rule<S: TextState + Send>(&self, id: RuleId, state: &mut S) -> (Outcome, Report) {
        let stack_size = self.stack_size();
        let on_thread = std::thread::scope(|scope| {
            let spawned = std::thread::Builder::new()
                .name("parsejoy-parse".to_owned())
                .stack_size(stack_size)
                .spawn_scoped(scope, || self.run_rule_here(id, &mut *state));
            match spawned {
                Ok(handle) => Some(
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
                ),
                Err(e) => {
                    log::warn!(
                        "can't start a thread with {} bytes of stack ({}); parsing on this one",
                        stack_size,
                        e
                    );
                    None
                }
            }
        });
        on_thread.unwrap_or_else(|| self.run_rule_here(id, state))
    }

    fn run_rule_here<S: TextState>(&self, id: RuleId, state: &mut S) -> (Outcome, Report) {
        let mut runner = Runner::new(self, state);
        let outcome = runner.run_rule(id);
        (outcome, runner.report)
    }

    /// How deeply named rules can actually be nested.  This is [`Config::max_depth`], unless
    /// that many levels wouldn't fit in the largest stack parses are allowed.
    pub fn depth_limit(&self) -> usize {
        let fits = (MAX_STACK_BYTES - BASE_STACK_BYTES) / self.stack_per_level();
        self.config.max_depth.min(fits)
    }

    /// The stack size of the threads which parses run on
    pub fn stack_size(&self) -> usize {
        BASE_STACK_BYTES + self.depth_limit() * self.stack_per_level()
    }

    fn stack_per_level(&self) -> usize {
        RULE_FRAME_BYTES.saturating_add(self.nesting.saturating_mul(COMBINATOR_FRAME_BYTES))
    }

    /// Parses `input` from its start.  The match doesn't have to consume the whole input; use
    /// `$eof` in the grammar to require that.
    pub fn parse(&self, input: &str) -> Result<Parsed, ParseError> {
        let mut state = StringState::new(input);
        match self.run_with_report(&mut state) {
            (Ok(matched), report) => Ok(Parsed {
                matched,
                end: state.position(),
                report,
            }),
            (Err(NoMatch), report) => Err(ParseError {
                furthest: report.furthest,
                depth_limit_reached: report.depth_limit_reached,
            }),
        }
    }

    pub fn start(&self) -> RuleId {
        self.start
    }

    pub fn rule(&self, id: RuleId) -> &CompiledRule {
        &self.rules[id]
    }

    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.rules.position(|r| r.name == name)
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &CompiledRule)> + '_ {
        self.rules.iter_enumerated()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The [`Fingerprint`] of the grammar this was compiled from
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// The ids of every registered prefix which starts `remaining`
    fn prefixes_starting(&self, remaining: &str) -> BitSet<String> {
        let mut set = BitSet::new(&self.prefixes);
        for (id, prefix) in &self.prefix_list {
            if remaining.starts_with(prefix.as_str()) {
                set.add_id(*id);
            }
        }
        set
    }
}

/// Extra information about a parse, whether or not it succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Report {
    /// The furthest position at which any terminal was tried or finished matching
    pub furthest: usize,
    /// `true` if any rule invocation failed because rules were nested too deeply
    pub depth_limit_reached: bool,
}

/// A successful result of [`Program::parse`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    pub matched: Match,
    /// The position just after the match
    pub end: usize,
    pub report: Report,
}

/// The input didn't match the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseError {
    pub furthest: usize,
    pub depth_limit_reached: bool,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "input doesn't match (got as far as byte {})", self.furthest)?;
        if self.depth_limit_reached {
            write!(f, "; rules were nested too deeply (is the grammar left-recursive?)")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

////////////
// RUNNER //
////////////

/// The per-parse mutable state needed to interpret a [`Program`]
struct Runner<'p, 'a, S: TextState> {
    program: &'p Program,
    state: &'a mut S,
    depth: usize,
    depth_limit: usize,
    report: Report,
    /// The prefixes which start the input at some position, cached since many `$or`s are usually
    /// tried at the same position
    prefix_cache: Option<(usize, BitSet<String>)>,
}

impl<'p, 'a, S: TextState> Runner<'p, 'a, S> {
    fn new(program: &'p Program, state: &'a mut S) -> Self {
        Self {
            program,
            state,
            depth: 0,
            depth_limit: program.depth_limit(),
            report: Report::default(),
            prefix_cache: None,
        }
    }

    fn run(&mut self, parser: &'p Parser) -> Outcome {
        let checkpoint = self.state.checkpoint();
        let outcome = self.run_unchecked(parser);
        debug_assert!(
            outcome.is_ok() || self.state.checkpoint() == checkpoint,
            "failed match moved the cursor from {:?} to {:?}",
            checkpoint,
            self.state.checkpoint()
        );
        outcome
    }

    fn run_unchecked(&mut self, parser: &'p Parser) -> Outcome {
        let checkpoint = self.state.checkpoint();
        let start = checkpoint.position;
        match parser {
            Parser::Literal(text) => {
                self.reached(start);
                if !self.state.eat(text) {
                    return Err(NoMatch);
                }
                let end = self.state.position();
                self.reached(end);
                Ok(Match::Token(Token::new(text.as_str(), text.as_str(), start..end)))
            }
            Parser::Regex {
                regex,
                looks_behind,
                ..
            } => {
                self.reached(start);
                let found = if *looks_behind {
                    regex
                        .find_at(self.state.source(), start)
                        .filter(|m| m.start() == start)
                } else {
                    regex.find(self.state.remaining())
                };
                let found = found.map(|m| (m.end() - m.start(), m.as_str().to_owned()));
                let (len, value) = found.ok_or(NoMatch)?;
                let end = self.state.advance(len);
                self.reached(end);
                Ok(Match::Token(Token::new(REGEX_TOKEN_KIND, value, start..end)))
            }
            Parser::Eof => {
                self.reached(start);
                if self.state.is_done() {
                    Ok(Match::Empty)
                } else {
                    Err(NoMatch)
                }
            }
            Parser::Indent => {
                self.reached(start);
                let matched = self.run_indent()?;
                let end = self.state.position();
                self.reached(end);
                Ok(matched)
            }
            Parser::Sequence(children) => {
                let mut matches = Vec::with_capacity(children.len());
                for child in children {
                    match self.run(child) {
                        Ok(m) => matches.push(m),
                        Err(NoMatch) => {
                            self.state.restore(checkpoint);
                            return Err(NoMatch);
                        }
                    }
                }
                Ok(Match::concat(matches))
            }
            Parser::Repeat(sub) => {
                // If the first iteration fails, `sub` has already restored the cursor
                let mut matches = vec![self.run(sub)?];
                let mut last_end = start;
                // Stop as soon as an iteration doesn't consume anything, since it would succeed
                // forever
                while self.state.position() > last_end {
                    last_end = self.state.position();
                    match self.run(sub) {
                        Ok(m) => matches.push(m),
                        Err(NoMatch) => break,
                    }
                }
                Ok(Match::concat(matches))
            }
            Parser::Or(branches) => {
                for branch in branches {
                    if let Some(first) = &branch.first {
                        if !self.may_start(first) {
                            continue;
                        }
                    }
                    match self.run(&branch.parser) {
                        Ok(m) => return Ok(m),
                        Err(NoMatch) => self.state.restore(checkpoint),
                    }
                }
                Err(NoMatch)
            }
            Parser::And(sub) => {
                let outcome = self.run(sub);
                self.state.restore(checkpoint);
                outcome.map(|_| Match::Empty)
            }
            Parser::Not(sub) => {
                let outcome = self.run(sub);
                self.state.restore(checkpoint);
                match outcome {
                    Ok(_) => Err(NoMatch),
                    Err(NoMatch) => Ok(Match::Empty),
                }
            }
            Parser::Optional(sub) => match self.run(sub) {
                Ok(m) => Ok(m),
                Err(NoMatch) => {
                    self.state.restore(checkpoint);
                    Ok(Match::Empty)
                }
            },
            Parser::Script { source, handle } => {
                let state: &mut dyn TextState = &mut *self.state;
                match self.program.scripts.run(*handle, state) {
                    Ok(m) => {
                        let end = self.state.position();
                        self.reached(end);
                        Ok(m)
                    }
                    Err(e) => {
                        log::debug!("script {:?} didn't match at {}: {}", source, start, e);
                        self.state.restore(checkpoint);
                        Err(NoMatch)
                    }
                }
            }
            Parser::Rule(id) => self.run_rule(*id),
        }
    }

    fn run_rule(&mut self, id: RuleId) -> Outcome {
        let program = self.program;
        let rule = &program.rules[id];
        if self.depth >= self.depth_limit {
            if !self.report.depth_limit_reached {
                log::warn!(
                    "rule `{}` nested more than {} deep at position {}; treating it as a failure",
                    rule.name,
                    self.depth_limit,
                    self.state.position()
                );
            }
            self.report.depth_limit_reached = true;
            return Err(NoMatch);
        }

        let start = self.state.position();
        if program.config.trace {
            log::trace!("{:indent$}> {} @ {}", "", rule.name, start, indent = self.depth);
        }
        self.depth += 1;
        let outcome = self.run(&rule.body);
        self.depth -= 1;
        let emit_node = program.config.parse_tree && !rule.name.starts_with(HIDDEN_RULE_PREFIX);
        let outcome = match outcome {
            Ok(matched) if emit_node => {
                let end = self.state.position();
                let value = self.state.source().get(start..end).unwrap_or("");
                let node = Token::new(rule.name.as_str(), value, start..end);
                Ok(Match::Token(node.with_children(matched.into_token())))
            }
            outcome => outcome,
        };
        if program.config.trace {
            let verdict = if outcome.is_ok() { "matched" } else { "failed" };
            log::trace!(
                "{:indent$}< {} {} ({}..{})",
                "",
                rule.name,
                verdict,
                start,
                self.state.position(),
                indent = self.depth
            );
        }
        outcome
    }

    /// Matches the indentation at the cursor.  Indentation equal to the innermost block's matches
    /// as is; indentation which extends it opens a new block; indentation equal to an outer
    /// block's closes every block inside that one.  Anything else doesn't match.
    fn run_indent(&mut self) -> Outcome {
        let start = self.state.position();
        let remaining = self.state.remaining();
        let width = remaining.len() - remaining.trim_start_matches(&[' ', '\t'][..]).len();
        let indent = remaining[..width].to_owned();
        let end = start + width;
        let blocks: Vec<String> = self.state.indents().into_iter().map(str::to_owned).collect();
        let current = blocks.last().map_or("", String::as_str);

        let mut tokens = Vec::new();
        if indent == current {
            tokens.push(Token::new(CURRENT_INDENT_TOKEN_KIND, indent.as_str(), start..end));
        } else if indent.starts_with(current) {
            let split = start + current.len();
            tokens.push(Token::new(CURRENT_INDENT_TOKEN_KIND, current, start..split));
            tokens.push(Token::new(INDENT_TOKEN_KIND, &indent[current.len()..], split..end));
            self.state.push_indent(&indent);
        } else {
            let outer = match blocks.iter().rposition(|block| *block == indent) {
                Some(outer) => outer,
                None => {
                    log::debug!("indentation {:?} at {} matches no open block", indent, start);
                    return Err(NoMatch);
                }
            };
            let closed = blocks.len() - 1 - outer;
            tokens.extend((0..closed).map(|_| Token::new(DEDENT_TOKEN_KIND, "", start..start)));
            tokens.push(Token::new(CURRENT_INDENT_TOKEN_KIND, indent.as_str(), start..end));
            self.state.pop_indents(closed);
        }
        self.state.set_position(end);
        Ok(Match::from(Token::chain(tokens)))
    }

    /// Returns `true` if the remaining input starts with any of the prefixes in `first`
    fn may_start(&mut self, first: &BitSet<String>) -> bool {
        let position = self.state.position();
        if let Some((cached_at, starting)) = &self.prefix_cache {
            if *cached_at == position {
                return starting.intersects(first);
            }
        }
        let starting = self.program.prefixes_starting(self.state.remaining());
        let may_start = starting.intersects(first);
        self.prefix_cache = Some((position, starting));
        may_start
    }

    fn reached(&mut self, position: usize) {
        self.report.furthest = self.report.furthest.max(position);
    }
}
