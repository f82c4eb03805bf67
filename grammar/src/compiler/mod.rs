//! Compiling [`Rule`] trees into runnable [`Program`]s.
//!
//! Compilation starts at one named rule and pulls in every rule it refers to, transitively.
//! Named rules are memoized in a [`RuleCache`], which is also what makes recursive grammars
//! compile (see [`Session::compile_rule`]).

mod error;
mod rule_cache;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use itertools::Itertools;

use crate::{
    config::Config,
    first_set::{is_prunable, FirstSets, Prefix},
    parser::{Branch, Parser, Program, RuleId},
    rule::{is_reserved_key, Fingerprint, Keyword, Rule},
    script::ScriptEngine,
    set::{BitGrammar, BitSet, Set},
};

pub use error::{CompileError, CompileResult, ErrorKind};
pub use rule_cache::RuleCache;

/// Compiles rules of one grammar.  A `Compiler` can compile any number of [`Program`]s, each
/// starting from a different rule.
#[derive(Debug, Clone)]
pub struct Compiler<'g> {
    grammar: &'g BTreeMap<String, Rule>,
    fingerprint: Fingerprint,
    scripts: Arc<dyn ScriptEngine>,
    config: Config,
    /// Parsers which replace the definitions of (or give definitions to) these names
    overrides: HashMap<String, Parser>,
}

impl<'g> Compiler<'g> {
    /// Creates a compiler for `grammar`, which must be a map of named rules.
    pub fn new(grammar: &'g Rule, scripts: Arc<dyn ScriptEngine>) -> CompileResult<Self> {
        let rules = grammar.as_map().ok_or(CompileError::NotAGrammar)?;
        Ok(Self {
            grammar: rules,
            fingerprint: grammar.fingerprint(),
            scripts,
            config: Config::default(),
            overrides: HashMap::new(),
        })
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Makes every reference to `name` compile to `parser`, whether or not the grammar defines
    /// `name`.  `$or` branches inside `parser` must not carry first sets, since those are only
    /// meaningful within one compiled program.
    pub fn with_override(mut self, name: &str, parser: Parser) -> Self {
        self.overrides.insert(name.to_owned(), parser);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn has_overrides(&self) -> bool {
        !self.overrides.is_empty()
    }

    pub fn scripts(&self) -> &Arc<dyn ScriptEngine> {
        &self.scripts
    }

    /// Compiles the rule called `start`, and everything it refers to, into a [`Program`].
    pub fn compile(&self, start: &str) -> CompileResult<Program> {
        let rule = self
            .grammar
            .get(start)
            .ok_or_else(|| CompileError::UnknownStartRule(start.to_owned()))?;

        let mut session = Session::new(self);
        session.compile_rule(rule, start)?;
        let start_id = session
            .cache()
            .get(start)
            .ok_or_else(|| CompileError::UnknownStartRule(start.to_owned()))?;
        let Session { cache, prefixes, .. } = session;

        let rules = cache.into_rules()?;
        let prefix_list = prefixes.entries();
        let nesting = rules.iter().map(|r| r.body.nesting()).max().unwrap_or(0);
        log::debug!(
            "compiled `{}` ({}): {} rules nested up to {} combinators deep, {} pruning prefixes",
            start,
            self.fingerprint,
            rules.len(),
            nesting,
            prefix_list.len()
        );
        Ok(Program {
            rules,
            start: start_id,
            nesting,
            prefixes,
            prefix_list,
            scripts: self.scripts.clone(),
            config: self.config.clone(),
            fingerprint: self.fingerprint,
        })
    }
}

/// The state of one call to [`Compiler::compile`]
pub struct Session<'c, 'g> {
    compiler: &'c Compiler<'g>,
    cache: RuleCache,
    first_sets: FirstSets<'g>,
    prefixes: Arc<BitGrammar<String>>,
    /// Names of the named rules currently being compiled, innermost last
    context: Vec<String>,
}

impl<'c, 'g> Session<'c, 'g> {
    pub fn new(compiler: &'c Compiler<'g>) -> Self {
        let first_sets = FirstSets::new(compiler.grammar)
            .with_opaque(compiler.overrides.keys().cloned())
            .with_bare_literals(compiler.config.bare_literals);
        Self {
            compiler,
            cache: RuleCache::new(),
            first_sets,
            prefixes: Arc::new(BitGrammar::new()),
            context: Vec::new(),
        }
    }

    /// Compiles `rule`.  If `name` isn't empty, `rule` is the definition of the rule called
    /// `name`, and the result is memoized under that name.
    pub fn compile_rule(&mut self, rule: &'g Rule, name: &str) -> CompileResult<Parser> {
        if name.is_empty() {
            self.compile_body(rule)
        } else {
            self.compile_named(name, rule).map(Parser::Rule)
        }
    }

    /// The named rules compiled (or being compiled) so far
    pub fn cache(&self) -> &RuleCache {
        &self.cache
    }

    fn compile_named(&mut self, name: &str, rule: &'g Rule) -> CompileResult<RuleId> {
        if let Some(id) = self.cache.get(name) {
            return Ok(id);
        }
        // Reserve the name first, so that recursive references find it
        let id = self.cache.forward(name);
        self.context.push(name.to_owned());
        let body = self.compile_body(rule);
        self.context.pop();
        self.cache.define(id, body?);
        log::debug!("compiled rule `{}`", name);
        Ok(id)
    }

    fn compile_body(&mut self, rule: &'g Rule) -> CompileResult<Parser> {
        match rule {
            Rule::String(text) => self.compile_reference(text),
            Rule::Sequence(children) => self.compile_sequence(children),
            Rule::Map(map) => {
                let (key, value) = match rule.single_entry() {
                    Some(entry) => entry,
                    None => {
                        return Err(self.grammar_error(format!(
                            "expected a combinator, found a map with keys [{}]",
                            map.keys().join(", ")
                        )))
                    }
                };
                match Keyword::from_key(key) {
                    Some(keyword) => self.compile_keyword(keyword, value),
                    None if is_reserved_key(key) => Err(CompileError::UnknownCombinator {
                        rule: self.current_rule(),
                        keyword: key.to_owned(),
                    }),
                    None => Err(self.grammar_error(format!(
                        "expected a combinator, found a map with key `{}`",
                        key
                    ))),
                }
            }
        }
    }

    /// Resolves a string, in order, as an override, a named rule, a built-in or (if enabled) a
    /// literal.
    fn compile_reference(&mut self, text: &str) -> CompileResult<Parser> {
        let compiler = self.compiler;
        if let Some(parser) = compiler.overrides.get(text) {
            log::trace!("`{}`: `{}` is overridden", self.current_rule(), text);
            return Ok(parser.clone());
        }
        if let Some(rule) = compiler.grammar.get(text) {
            return self.compile_rule(rule, text);
        }
        if text == Keyword::Eof.key() {
            return Ok(Parser::Eof);
        }
        if text == Keyword::Indent.key() {
            return Ok(Parser::Indent);
        }
        if compiler.config.bare_literals {
            log::trace!("`{}`: treating `{}` as a literal", self.current_rule(), text);
            return self.literal(text);
        }
        Err(CompileError::UnknownRule {
            rule: self.current_rule(),
            name: text.to_owned(),
        })
    }

    fn compile_sequence(&mut self, children: &'g [Rule]) -> CompileResult<Parser> {
        children
            .iter()
            .map(|child| self.compile_body(child))
            .collect::<CompileResult<Vec<_>>>()
            .map(Parser::Sequence)
    }

    fn compile_keyword(&mut self, keyword: Keyword, value: &'g Rule) -> CompileResult<Parser> {
        log::trace!("`{}`: compiling {}", self.current_rule(), keyword.key());
        Ok(match keyword {
            Keyword::Sequence => match value {
                Rule::Sequence(children) => self.compile_sequence(children)?,
                _ => return Err(self.grammar_error("`$sequence` expects a list".to_owned())),
            },
            Keyword::Or => match value {
                Rule::Sequence(branches) if !branches.is_empty() => {
                    let branches = branches
                        .iter()
                        .map(|b| self.compile_branch(b))
                        .collect::<CompileResult<Vec<_>>>()?;
                    Parser::Or(branches)
                }
                _ => return Err(self.grammar_error("`$or` expects a non-empty list".to_owned())),
            },
            Keyword::Repeat => Parser::Repeat(Box::new(self.compile_body(value)?)),
            Keyword::And => Parser::And(Box::new(self.compile_body(value)?)),
            Keyword::Not => Parser::Not(Box::new(self.compile_body(value)?)),
            Keyword::Optional => Parser::Optional(Box::new(self.compile_body(value)?)),
            Keyword::Literal => match value {
                Rule::String(text) => self.literal(text)?,
                _ => return Err(self.grammar_error("`$literal` expects a string".to_owned())),
            },
            Keyword::Regex => {
                let pattern = value
                    .as_str()
                    .or_else(|| value.field("regex")?.as_str())
                    .ok_or_else(|| {
                        self.grammar_error(
                            "`$regex` expects a string or a map with a `regex` string".to_owned(),
                        )
                    })?;
                Parser::regex(pattern).map_err(|inner| CompileError::Regex {
                    rule: self.current_rule(),
                    pattern: pattern.to_owned(),
                    inner,
                })?
            }
            // Anything given to `$eof` or `$indent` is ignored
            Keyword::Eof => Parser::Eof,
            Keyword::Indent => Parser::Indent,
            Keyword::Script => {
                let source = value.as_str().ok_or_else(|| {
                    self.grammar_error("`$script` expects the script's source".to_owned())
                })?;
                let handle =
                    self.compiler
                        .scripts
                        .compile(source)
                        .map_err(|inner| CompileError::Script {
                            rule: self.current_rule(),
                            source: source.to_owned(),
                            inner,
                        })?;
                Parser::Script {
                    source: source.to_owned(),
                    handle,
                }
            }
            Keyword::AstNode => {
                self.check_fields(keyword, value, "type", &["properties"])?;
                if let Some(properties) = value.field("properties") {
                    if properties.as_map().is_none() {
                        return Err(self.grammar_error(
                            "`properties` of `$ast-node` must be a map".to_owned(),
                        ));
                    }
                }
                self.compile_ast_value(value)?
            }
            Keyword::AstProp => {
                self.check_fields(keyword, value, "name", &["as-list", "as-literal"])?;
                for flag in ["as-list", "as-literal"].iter() {
                    match value.field(flag).map(|f| f.as_str()) {
                        None | Some(Some("true")) | Some(Some("false")) => {}
                        Some(_) => {
                            return Err(self.grammar_error(format!(
                                "`{}` of `$ast-prop` must be `true` or `false`",
                                flag
                            )))
                        }
                    }
                }
                self.compile_ast_value(value)?
            }
        })
    }

    /// Compiles one alternative of an `$or`, attaching its first literals if it can be pruned
    fn compile_branch(&mut self, rule: &'g Rule) -> CompileResult<Branch> {
        let parser = self.compile_body(rule)?;
        let first = if self.compiler.config.prune_alternatives {
            self.branch_prefixes(rule)
        } else {
            None
        };
        Ok(Branch { parser, first })
    }

    fn branch_prefixes(&mut self, rule: &Rule) -> Option<BitSet<String>> {
        let first_set = self.first_sets.of(rule, true);
        if !is_prunable(&first_set) {
            return None;
        }
        let mut set = BitSet::new(&self.prefixes);
        for prefix in &first_set {
            if let Prefix::Literal(text) = prefix {
                set.add(text.clone());
            }
        }
        Some(set)
    }

    /// `$ast-node` and `$ast-prop` annotate their `value` without changing what it matches
    fn compile_ast_value(&mut self, value: &'g Rule) -> CompileResult<Parser> {
        match value.field("value") {
            Some(inner) => self.compile_body(inner),
            None => Err(self.grammar_error("AST annotations need a `value`".to_owned())),
        }
    }

    /// Checks that `value` is a map with a `value` field, a string field called `required`, and
    /// no fields other than those and `optional`.
    fn check_fields(
        &self,
        keyword: Keyword,
        value: &Rule,
        required: &str,
        optional: &[&str],
    ) -> CompileResult<()> {
        let map = value.as_map().ok_or_else(|| {
            self.grammar_error(format!("`{}` expects a map", keyword.key()))
        })?;
        if !map.contains_key("value") {
            return Err(self.grammar_error(format!("`{}` needs a `value`", keyword.key())));
        }
        if map.get(required).and_then(Rule::as_str).is_none() {
            return Err(self.grammar_error(format!(
                "`{}` needs a string `{}`",
                keyword.key(),
                required
            )));
        }
        if let Some(unknown) = map
            .keys()
            .find(|k| *k != "value" && *k != required && !optional.contains(&k.as_str()))
        {
            return Err(self.grammar_error(format!(
                "unknown field `{}` in `{}`",
                unknown,
                keyword.key()
            )));
        }
        Ok(())
    }

    fn literal(&self, text: &str) -> CompileResult<Parser> {
        if text.is_empty() {
            return Err(self.grammar_error("literals can't be empty".to_owned()));
        }
        Ok(Parser::literal(text))
    }

    fn current_rule(&self) -> String {
        self.context.last().cloned().unwrap_or_default()
    }

    fn grammar_error(&self, reason: String) -> CompileError {
        CompileError::Grammar {
            rule: self.current_rule(),
            reason,
        }
    }
}
