use std::collections::HashMap;

use index_vec::IndexVec;

use crate::parser::{CompiledRule, Parser, RuleId};

use super::{CompileError, CompileResult};

/// The named rules compiled so far in one compilation session.
///
/// A name gets its [`RuleId`] (its 'forwarding entry') *before* its definition is compiled, so
/// any reference to it from inside its own definition (directly or through other rules) compiles
/// to [`Parser::Rule`] of that id instead of recursing forever.  The body is filled in once it's
/// finished.
#[derive(Debug, Default)]
pub struct RuleCache {
    ids: HashMap<String, RuleId>,
    rules: IndexVec<RuleId, (String, Option<Parser>)>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<RuleId> {
        self.ids.get(name).copied()
    }

    /// Reserves an id for `name`.  Until [`define`](Self::define) is called, the rule has no body.
    pub fn forward(&mut self, name: &str) -> RuleId {
        if let Some(id) = self.get(name) {
            return id;
        }
        let id = self.rules.push((name.to_owned(), None));
        self.ids.insert(name.to_owned(), id);
        id
    }

    /// Stores the finished body of a rule
    pub fn define(&mut self, id: RuleId, body: Parser) {
        self.rules[id].1 = Some(body);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Converts the cache into the rule table of a program.  Every reserved rule must have been
    /// defined.
    pub fn into_rules(self) -> CompileResult<IndexVec<RuleId, CompiledRule>> {
        self.rules
            .into_iter()
            .map(|(name, body)| match body {
                Some(body) => Ok(CompiledRule { name, body }),
                None => Err(CompileError::Grammar {
                    reason: "rule was referenced but never finished compiling".to_owned(),
                    rule: name,
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::Parser;

    use super::RuleCache;

    #[test]
    fn forwarding_entries() {
        let mut cache = RuleCache::new();
        assert!(cache.is_empty());
        let a = cache.forward("a");
        assert_eq!(cache.get("a"), Some(a));
        assert_eq!(cache.forward("a"), a);
        assert_eq!(cache.len(), 1);

        let b = cache.forward("b");
        assert_ne!(a, b);
        cache.define(b, Parser::Rule(a));
        assert!(cache.into_rules().is_err());

        let mut cache = RuleCache::new();
        let a = cache.forward("a");
        cache.define(a, Parser::Rule(a));
        let rules = cache.into_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[a].name, "a");
    }
}
