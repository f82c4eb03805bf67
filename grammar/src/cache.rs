//! Reusing compiled programs across compilations of the same grammar.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    compiler::{CompileResult, Compiler},
    config::Config,
    parser::Program,
    rule::Fingerprint,
};

type Key = (Fingerprint, String, Config);

/// A thread-safe store of compiled [`Program`]s, keyed by the [`Fingerprint`] of their grammar,
/// their start rule and their [`Config`].
///
/// A cache assumes that every compiler it sees uses the same script engine.  Compilers with
/// overrides are never cached, since overrides can't be fingerprinted.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: Mutex<HashMap<Key, Arc<Program>>>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the program for `start`, compiling it with `compiler` if it isn't cached yet
    pub fn get_or_compile(&self, compiler: &Compiler, start: &str) -> CompileResult<Arc<Program>> {
        if compiler.has_overrides() {
            return compiler.compile(start).map(Arc::new);
        }
        let key = (
            compiler.fingerprint(),
            start.to_owned(),
            compiler.config().clone(),
        );
        if let Some(program) = self.lock().get(&key) {
            log::trace!("reusing compiled `{}` ({})", start, key.0);
            return Ok(program.clone());
        }
        // Compile without holding the lock; if two threads race, the first one to finish wins
        let program = Arc::new(compiler.compile(start)?);
        Ok(self.lock().entry(key).or_insert(program).clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear()
    }

    fn lock(&self) -> std::sync::MutexGuard<HashMap<Key, Arc<Program>>> {
        self.programs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{Compiler, Config, NoScripts, Parser, Rule};

    use super::ProgramCache;

    #[test]
    fn reuse() {
        let cache = ProgramCache::new();
        let grammar = Rule::from_json(r#"{"start": {"$literal": "a"}, "b": {"$literal": "b"}}"#)
            .unwrap();
        let same_grammar =
            Rule::from_json(r#"{"b": {"$literal": "b"}, "start": {"$literal": "a"}}"#).unwrap();
        let compiler = Compiler::new(&grammar, Arc::new(NoScripts)).unwrap();
        let same_compiler = Compiler::new(&same_grammar, Arc::new(NoScripts)).unwrap();

        let first = cache.get_or_compile(&compiler, "start").unwrap();
        let second = cache.get_or_compile(&same_compiler, "start").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let other_start = cache.get_or_compile(&compiler, "b").unwrap();
        assert!(!Arc::ptr_eq(&first, &other_start));
        let other_config = compiler.clone().with_config(Config {
            prune_alternatives: false,
            ..Config::default()
        });
        cache.get_or_compile(&other_config, "start").unwrap();
        assert_eq!(cache.len(), 3);

        let overridden = compiler.with_override("x", Parser::literal("x"));
        cache.get_or_compile(&overridden, "start").unwrap();
        assert_eq!(cache.len(), 3);

        assert!(cache.get_or_compile(&same_compiler, "missing").is_err());
        cache.clear();
        assert!(cache.is_empty());
    }
}
