//! Computing the first sets of rules: the literals which any match of a rule could start with.
//!
//! The compiler uses these to let `$or` skip branches which can't possibly match the remaining
//! input.  A first set may also contain [`Prefix::Empty`] (the rule may match without consuming
//! anything, so whatever follows it matters too) and [`Prefix::Any`] (the rule may start with
//! something this analysis can't describe, e.g. a script).  Only sets made entirely of literals
//! are useful for pruning.

use std::collections::{BTreeMap, HashMap};

use regex_syntax::hir::literal::Literals;

use crate::{
    parser::anchored_pattern,
    rule::{Keyword, Rule},
    set::{HashSet, Set},
};

/// One element of a first set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Prefix {
    /// The rule may match the empty string here
    Empty,
    /// The rule may start with anything
    Any,
    Literal(String),
}

pub type FirstSet = HashSet<Prefix>;

/// Returns `true` if `set` is a non-empty set of literals, i.e. it can be used to decide that a
/// rule can't match.
pub fn is_prunable(set: &FirstSet) -> bool {
    !set.is_empty() && set.iter().all(|p| matches!(p, Prefix::Literal(_)))
}

/// Computes first sets of rules in one grammar, caching the results for named rules where it's
/// safe to do so.
#[derive(Debug, Clone)]
pub struct FirstSets<'g> {
    grammar: &'g BTreeMap<String, Rule>,
    /// Names which may start with anything, because they aren't compiled from their definitions
    opaque: std::collections::HashSet<String>,
    bare_literals: bool,

    /// Names of the named rules currently being expanded
    stack: Vec<String>,
    /// The shallowest index into `stack` which the current expansion has looped back to
    lowest_hit: usize,
    /// First sets of named rules which don't depend on what's on the stack, keyed by
    /// `(name, only_start)`
    cache: HashMap<(String, bool), FirstSet>,
}

impl<'g> FirstSets<'g> {
    pub fn new(grammar: &'g BTreeMap<String, Rule>) -> Self {
        Self {
            grammar,
            opaque: std::collections::HashSet::new(),
            bare_literals: false,
            stack: Vec::new(),
            lowest_hit: usize::MAX,
            cache: HashMap::new(),
        }
    }

    /// Treat references to these names as able to start with anything
    pub fn with_opaque(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.opaque.extend(names);
        self.cache.clear();
        self
    }

    /// Treat references to undefined names as literals
    pub fn with_bare_literals(mut self, bare_literals: bool) -> Self {
        self.bare_literals = bare_literals;
        self.cache.clear();
        self
    }

    /// The first set of the named rule `name`
    pub fn of_rule(&mut self, name: &str, only_start: bool) -> FirstSet {
        self.walk_name(name, only_start)
    }

    /// The first set of an arbitrary rule.
    ///
    /// If `only_start` is `true`, sequences stop at the first child which can't match the empty
    /// string (giving a true first set).  Otherwise, every child of a sequence contributes.
    pub fn of(&mut self, rule: &Rule, only_start: bool) -> FirstSet {
        self.walk(rule, only_start)
    }

    fn walk(&mut self, rule: &Rule, only_start: bool) -> FirstSet {
        match rule {
            Rule::String(name) => self.walk_name(name, only_start),
            Rule::Sequence(rules) => self.walk_sequence(rules, only_start),
            Rule::Map(_) => match rule.single_entry() {
                Some((key, value)) => match Keyword::from_key(key) {
                    Some(keyword) => self.walk_keyword(keyword, value, only_start),
                    None => single(Prefix::Any),
                },
                None => single(Prefix::Any),
            },
        }
    }

    fn walk_name(&mut self, name: &str, only_start: bool) -> FirstSet {
        if self.opaque.contains(name) {
            return single(Prefix::Any);
        }
        // A rule which refers back to one being expanded contributes nothing new
        if let Some(idx) = self.stack.iter().position(|n| n == name) {
            self.lowest_hit = self.lowest_hit.min(idx);
            return single(Prefix::Empty);
        }
        let grammar = self.grammar;
        let rule = match grammar.get(name) {
            Some(rule) => rule,
            None if name == Keyword::Eof.key() => return single(Prefix::Empty),
            None if name == Keyword::Indent.key() => return single(Prefix::Any),
            None if self.bare_literals => return single(Prefix::Literal(name.to_owned())),
            None => return single(Prefix::Any),
        };

        let key = (name.to_owned(), only_start);
        if let Some(set) = self.cache.get(&key) {
            return set.clone();
        }

        let depth = self.stack.len();
        let outer_lowest_hit = std::mem::replace(&mut self.lowest_hit, usize::MAX);
        self.stack.push(name.to_owned());
        let set = self.walk(rule, only_start);
        self.stack.pop();
        let inner_lowest_hit = self.lowest_hit;
        self.lowest_hit = outer_lowest_hit.min(inner_lowest_hit);

        // Results which looped back to a rule further up the stack depend on that rule being
        // there, so can't be reused elsewhere
        if inner_lowest_hit >= depth {
            self.cache.insert(key, set.clone());
        }
        set
    }

    fn walk_sequence(&mut self, rules: &[Rule], only_start: bool) -> FirstSet {
        let mut set = FirstSet::new();
        if rules.is_empty() {
            set.add(Prefix::Empty);
        }
        for rule in rules {
            // `Empty` only survives if the latest child can also match nothing
            set.remove(&Prefix::Empty);
            set.union_with(&self.walk(rule, only_start));
            if only_start && !set.contains(&Prefix::Empty) {
                break;
            }
        }
        set
    }

    fn walk_keyword(&mut self, keyword: Keyword, value: &Rule, only_start: bool) -> FirstSet {
        match keyword {
            Keyword::Sequence => match value.as_sequence() {
                Some(rules) => self.walk_sequence(rules, only_start),
                None => single(Prefix::Any),
            },
            Keyword::Or => match value.as_sequence() {
                Some(branches) if !branches.is_empty() => {
                    let mut set = FirstSet::new();
                    for branch in branches {
                        set.union_with(&self.walk(branch, only_start));
                    }
                    set
                }
                _ => single(Prefix::Any),
            },
            Keyword::Repeat | Keyword::And => self.walk(value, only_start),
            Keyword::Not | Keyword::Eof => single(Prefix::Empty),
            Keyword::Optional => {
                let mut set = self.walk(value, only_start);
                set.add(Prefix::Empty);
                set
            }
            Keyword::Literal => match value.as_str() {
                Some(text) if !text.is_empty() => single(Prefix::Literal(text.to_owned())),
                _ => single(Prefix::Any),
            },
            Keyword::Regex => {
                let pattern = value.as_str().or_else(|| value.field("regex")?.as_str());
                match pattern {
                    Some(pattern) => regex_prefixes(pattern),
                    None => single(Prefix::Any),
                }
            }
            Keyword::AstNode | Keyword::AstProp => match value.field("value") {
                Some(inner) => self.walk(inner, only_start),
                None => single(Prefix::Any),
            },
            Keyword::Script | Keyword::Indent => single(Prefix::Any),
        }
    }
}

/// The literal prefixes which every match of `pattern` starts with
fn regex_prefixes(pattern: &str) -> FirstSet {
    let hir = match regex_syntax::Parser::new().parse(&anchored_pattern(pattern)) {
        Ok(hir) => hir,
        Err(_) => return single(Prefix::Any),
    };
    let literals = Literals::prefixes(&hir);
    // Extraction gives up by returning nothing, or a set containing the empty string
    if literals.literals().is_empty() || literals.contains_empty() {
        return single(Prefix::Any);
    }
    let mut set = FirstSet::new();
    for literal in literals.literals() {
        match std::str::from_utf8(&literal[..]) {
            Ok(s) => set.add(Prefix::Literal(s.to_owned())),
            // Cut off in the middle of a `char`
            Err(_) => return single(Prefix::Any),
        };
    }
    set
}

fn single(prefix: Prefix) -> FirstSet {
    let mut set = FirstSet::new();
    set.add(prefix);
    set
}

#[cfg(test)]
mod tests {
    use crate::{set::Set, Rule};

    use super::{is_prunable, FirstSet, FirstSets, Prefix};

    fn lit(s: &str) -> Prefix {
        Prefix::Literal(s.to_owned())
    }

    fn set(prefixes: Vec<Prefix>) -> FirstSet {
        prefixes.into_iter().collect()
    }

    #[track_caller]
    fn check(grammar_json: &str, rule: &str, only_start: bool, expected: Vec<Prefix>) {
        let grammar = Rule::from_json(grammar_json).unwrap();
        let mut first_sets = FirstSets::new(grammar.as_map().unwrap());
        assert_eq!(first_sets.of_rule(rule, only_start), set(expected));
    }

    #[test]
    fn sequences() {
        let grammar = r#"{
            "start": [{"$optional": {"$literal": "a"}}, {"$literal": "b"}, {"$literal": "c"}],
            "all_optional": [{"$optional": {"$literal": "a"}}, {"$not": {"$literal": "x"}}],
            "empty": []
        }"#;
        check(grammar, "start", true, vec![lit("a"), lit("b")]);
        check(grammar, "start", false, vec![lit("a"), lit("b"), lit("c")]);
        check(grammar, "all_optional", true, vec![lit("a"), Prefix::Empty]);
        check(grammar, "empty", true, vec![Prefix::Empty]);
    }

    #[test]
    fn combinators() {
        let grammar = r#"{
            "or": {"$or": [{"$literal": "a"}, "rep"]},
            "rep": {"$repeat": {"$literal": "b"}},
            "look": [{"$and": {"$literal": "c"}}, "rep"],
            "not": {"$not": {"$literal": "d"}},
            "eof": "$eof",
            "script": {"$script": "digits"},
            "node": {"$ast-node": {"type": "N", "value": {"$literal": "e"}}},
            "line": ["$indent", {"$literal": "f"}],
            "block": {"$indent": ""}
        }"#;
        check(grammar, "or", true, vec![lit("a"), lit("b")]);
        check(grammar, "look", true, vec![lit("c")]);
        check(grammar, "not", true, vec![Prefix::Empty]);
        check(grammar, "eof", true, vec![Prefix::Empty]);
        check(grammar, "script", true, vec![Prefix::Any]);
        check(grammar, "node", true, vec![lit("e")]);
        // Indentation can be empty and then closes blocks, so a line can start with anything
        check(grammar, "line", true, vec![Prefix::Any]);
        check(grammar, "block", true, vec![Prefix::Any]);
    }

    #[test]
    fn regexes() {
        let grammar = r#"{
            "keyword": {"$regex": "if|else"},
            "field": {"$regex": {"regex": "x[0-9]+"}},
            "number": {"$regex": "[0-9]+"},
            "maybe": {"$regex": "a*"}
        }"#;
        check(grammar, "maybe", true, vec![Prefix::Any]);

        let grammar = Rule::from_json(grammar).unwrap();
        let mut first_sets = FirstSets::new(grammar.as_map().unwrap());
        // Every extracted literal must start every match it stands for
        #[track_caller]
        fn check_starts(set: &FirstSet, matches: &[&str]) {
            assert!(is_prunable(set), "{:?}", set);
            for p in set {
                match p {
                    Prefix::Literal(l) => assert!(matches.iter().any(|m| m.starts_with(l.as_str()))),
                    _ => unreachable!(),
                }
            }
        }
        check_starts(&first_sets.of_rule("keyword", true), &["if", "else"]);
        let field = first_sets.of_rule("field", true);
        check_starts(&field, &["x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9"]);
        let number = first_sets.of_rule("number", true);
        // Either one-digit literals, or give up; both are sound
        assert!(number == set(vec![Prefix::Any]) || number.len() == 10);
    }

    #[test]
    fn recursion() {
        let grammar = r#"{
            "list": {"$or": [["list", {"$literal": ","}, "item"], "item"]},
            "item": {"$literal": "i"},
            "a": [{"$optional": "b"}, {"$literal": "x"}],
            "b": [{"$optional": "a"}, {"$literal": "y"}]
        }"#;
        check(grammar, "list", true, vec![lit(","), lit("i")]);
        check(grammar, "a", true, vec![lit("x"), lit("y")]);
        check(grammar, "b", true, vec![lit("x"), lit("y")]);
    }

    #[test]
    fn unresolved_names() {
        let grammar = Rule::from_json(r#"{"start": ["kw", "other"], "other": "x"}"#).unwrap();
        let map = grammar.as_map().unwrap();
        assert_eq!(
            FirstSets::new(map).of_rule("start", true),
            set(vec![Prefix::Any])
        );
        assert_eq!(
            FirstSets::new(map)
                .with_bare_literals(true)
                .of_rule("start", true),
            set(vec![lit("kw")])
        );
        assert_eq!(
            FirstSets::new(map)
                .with_bare_literals(true)
                .with_opaque(vec!["kw".to_owned()])
                .of_rule("start", true),
            set(vec![Prefix::Any])
        );
    }

    #[test]
    fn prunable() {
        assert!(is_prunable(&set(vec![lit("a"), lit("b")])));
        assert!(!is_prunable(&set(vec![lit("a"), Prefix::Empty])));
        assert!(!is_prunable(&set(vec![lit("a"), Prefix::Any])));
        assert!(!is_prunable(&set(vec![])));
    }
}
