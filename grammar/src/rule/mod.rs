//! The data model of a loaded grammar.
//!
//! A grammar is a tree of [`Rule`]s, usually read from a JSON or TOML document (see the [`load`]
//! module).  The root is always a [`Rule::Map`] from rule names to rule definitions.  Inside a
//! definition:
//! - a [`Rule::String`] either refers to another named rule or to a built-in (`$eof` or
//!   `$indent`)
//! - a [`Rule::Sequence`] matches its children one after another
//! - a [`Rule::Map`] with exactly one `$`-prefixed key is a combinator applied to its value (see
//!   [`Keyword`])

mod fingerprint;
pub mod load;

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use serde::{
    de::{self, MapAccess, SeqAccess, Visitor},
    Deserialize, Deserializer,
};

pub use fingerprint::Fingerprint;
pub use load::LoadError;

/// One node of a grammar tree.  Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rule {
    String(String),
    Sequence(Vec<Rule>),
    /// Keys are unique, and iterate in sorted order
    Map(BTreeMap<String, Rule>),
}

impl Rule {
    /// Builds a single-entry [`Rule::Map`] which applies the combinator `key` to `value`
    pub fn combinator(key: &str, value: Rule) -> Self {
        let mut map = BTreeMap::new();
        map.insert(key.to_owned(), value);
        Rule::Map(map)
    }

    /// Builds a top-level grammar from `(name, definition)` pairs
    pub fn grammar<'a>(rules: impl IntoIterator<Item = (&'a str, Rule)>) -> Self {
        Rule::Map(
            rules
                .into_iter()
                .map(|(name, rule)| (name.to_owned(), rule))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Rule::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Rule]> {
        match self {
            Rule::Sequence(rules) => Some(rules),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Rule>> {
        match self {
            Rule::Map(map) => Some(map),
            _ => None,
        }
    }

    /// If `self` is a map with exactly one entry, returns that entry
    pub fn single_entry(&self) -> Option<(&str, &Rule)> {
        match self {
            Rule::Map(map) if map.len() == 1 => map.iter().next().map(|(k, v)| (k.as_str(), v)),
            _ => None,
        }
    }

    /// Looks up a field of a [`Rule::Map`]
    pub fn field(&self, name: &str) -> Option<&Rule> {
        self.as_map().and_then(|map| map.get(name))
    }

    /// Computes the structural [`Fingerprint`] of this rule tree
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

impl From<&str> for Rule {
    fn from(s: &str) -> Self {
        Rule::String(s.to_owned())
    }
}

impl From<Vec<Rule>> for Rule {
    fn from(rules: Vec<Rule>) -> Self {
        Rule::Sequence(rules)
    }
}

/// Renders rules in compact JSON syntax
impl Display for Rule {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Rule::String(s) => write_json_str(f, s),
            Rule::Sequence(rules) => {
                write!(f, "[")?;
                for (idx, rule) in rules.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", rule)?;
                }
                write!(f, "]")
            }
            Rule::Map(map) => {
                write!(f, "{{")?;
                for (idx, (key, rule)) in map.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write_json_str(f, key)?;
                    write!(f, ": {}", rule)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_json_str(f: &mut Formatter, s: &str) -> std::fmt::Result {
    let escaped = serde_json::to_string(s).map_err(|_| std::fmt::Error)?;
    f.write_str(&escaped)
}

//////////////
// KEYWORDS //
//////////////

/// The reserved keys which turn a single-entry map into a combinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Sequence,
    Repeat,
    Or,
    And,
    Not,
    Optional,
    Literal,
    Regex,
    Eof,
    /// Matches the indentation at the start of a line, opening and closing blocks
    Indent,
    Script,
    AstNode,
    AstProp,
}

impl Keyword {
    pub const ALL: [Keyword; 13] = [
        Keyword::Sequence,
        Keyword::Repeat,
        Keyword::Or,
        Keyword::And,
        Keyword::Not,
        Keyword::Optional,
        Keyword::Literal,
        Keyword::Regex,
        Keyword::Eof,
        Keyword::Indent,
        Keyword::Script,
        Keyword::AstNode,
        Keyword::AstProp,
    ];

    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "$sequence" => Keyword::Sequence,
            "$repeat" => Keyword::Repeat,
            "$or" => Keyword::Or,
            "$and" => Keyword::And,
            "$not" => Keyword::Not,
            "$optional" => Keyword::Optional,
            "$literal" => Keyword::Literal,
            "$regex" => Keyword::Regex,
            "$eof" => Keyword::Eof,
            "$indent" => Keyword::Indent,
            "$script" | "$lua" => Keyword::Script,
            "$ast-node" => Keyword::AstNode,
            "$ast-prop" => Keyword::AstProp,
            _ => return None,
        })
    }

    /// The canonical key for this keyword (`$lua` is accepted as an alias of `$script`)
    pub fn key(self) -> &'static str {
        match self {
            Keyword::Sequence => "$sequence",
            Keyword::Repeat => "$repeat",
            Keyword::Or => "$or",
            Keyword::And => "$and",
            Keyword::Not => "$not",
            Keyword::Optional => "$optional",
            Keyword::Literal => "$literal",
            Keyword::Regex => "$regex",
            Keyword::Eof => "$eof",
            Keyword::Indent => "$indent",
            Keyword::Script => "$script",
            Keyword::AstNode => "$ast-node",
            Keyword::AstProp => "$ast-prop",
        }
    }
}

/// Returns `true` if `key` has the shape of a combinator key, whether or not it's a known one
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with('$')
}

/////////////////////
// DESERIALIZATION //
/////////////////////

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RuleVisitor)
    }
}

/// Accepts any JSON-like tree.  Non-string scalars become [`Rule::String`]s of their textual form,
/// so `true` and `"true"` load identically.
struct RuleVisitor;

impl<'de> Visitor<'de> for RuleVisitor {
    type Value = Rule;

    fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str("a string, number, boolean, list or map")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Rule, E> {
        Ok(Rule::String(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Rule, E> {
        Ok(Rule::String(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Rule, E> {
        Ok(Rule::String(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Rule, E> {
        Ok(Rule::String(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Rule, E> {
        Ok(Rule::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Rule, E> {
        Ok(Rule::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Rule, A::Error> {
        let mut rules = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(rule) = seq.next_element()? {
            rules.push(rule);
        }
        Ok(Rule::Sequence(rules))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Rule, A::Error> {
        let mut rules = BTreeMap::new();
        while let Some((key, rule)) = map.next_entry::<String, Rule>()? {
            if rules.contains_key(&key) {
                return Err(de::Error::custom(format!("duplicate key `{}`", key)));
            }
            rules.insert(key, rule);
        }
        Ok(Rule::Map(rules))
    }
}

#[cfg(test)]
mod tests {
    use super::{Keyword, Rule};

    #[test]
    fn keywords_round_trip() {
        for &kw in Keyword::ALL.iter() {
            assert_eq!(Keyword::from_key(kw.key()), Some(kw));
        }
        assert_eq!(Keyword::from_key("$lua"), Some(Keyword::Script));
        assert_eq!(Keyword::from_key("$nope"), None);
        assert_eq!(Keyword::from_key("or"), None);
    }

    #[test]
    fn single_entry() {
        let rule = Rule::combinator("$not", "x".into());
        assert_eq!(rule.single_entry(), Some(("$not", &Rule::from("x"))));
        assert_eq!(Rule::from("x").single_entry(), None);
        let two = Rule::grammar(vec![("a", "x".into()), ("b", "y".into())]);
        assert_eq!(two.single_entry(), None);
        assert_eq!(two.field("b"), Some(&Rule::from("y")));
    }

    #[test]
    fn display() {
        let rule = Rule::grammar(vec![(
            "start",
            Rule::Sequence(vec!["a".into(), Rule::combinator("$literal", "b".into())]),
        )]);
        assert_eq!(rule.to_string(), r#"{"start": ["a", {"$literal": "b"}]}"#);

        let awkward = Rule::grammar(vec![("a\u{1}", "\"\n\\".into())]);
        assert_eq!(awkward.to_string(), r#"{"a\u0001": "\"\n\\"}"#);
        assert_eq!(Rule::from_json(&awkward.to_string()).unwrap(), awkward);
    }
}
