//! The extension point for user-defined semantic actions (the `$script` combinator, also spelt
//! `$lua`).
//!
//! Scripts are compiled once, when the grammar is compiled, and are then run against the live
//! parse state.  This crate doesn't embed a scripting language: it defines the [`ScriptEngine`]
//! interface and ships two small engines, [`NoScripts`] and [`NativeScripts`].

use std::{
    collections::HashMap,
    fmt::{Debug, Display, Formatter},
};

use index_vec::IndexVec;

use crate::{state::TextState, token::Match};

index_vec::define_index_type! { pub struct ScriptHandle = usize; }

/// Named values made available to every script run by an engine
pub type Bindings = HashMap<String, serde_json::Value>;

/// A runtime which can compile and run the source of `$script` rules.
///
/// Engines are shared between every parse run by a compiled program, possibly on several threads
/// at once.  Engines which need exclusive access to their runtime must serialize internally.
pub trait ScriptEngine: Send + Sync + Debug {
    /// Compiles `source` ahead of time.  Failing here makes the whole grammar fail to compile.
    fn compile(&self, source: &str) -> Result<ScriptHandle, ScriptError>;

    /// Runs a previously compiled script against `state`.  The script may move the cursor.  If
    /// it returns an error then the match fails and the cursor is restored.
    fn run(&self, handle: ScriptHandle, state: &mut dyn TextState) -> Result<Match, ScriptError>;

    /// Makes a named value visible to scripts.  Bindings are set up before the engine is shared.
    fn bind(&mut self, name: &str, value: serde_json::Value);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The engine doesn't support scripts at all
    Unsupported,
    /// No script with this name has been registered
    UnknownScript(String),
    InvalidHandle(ScriptHandle),
    /// The script ran successfully but decided not to match
    Rejected,
    /// The script failed while running
    Failed(String),
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ScriptError::Unsupported => write!(f, "scripts aren't supported by this engine"),
            ScriptError::UnknownScript(name) => write!(f, "no script called {:?}", name),
            ScriptError::InvalidHandle(handle) => write!(f, "invalid script handle {:?}", handle),
            ScriptError::Rejected => write!(f, "script didn't match"),
            ScriptError::Failed(msg) => write!(f, "script failed: {}", msg),
        }
    }
}

impl std::error::Error for ScriptError {}

/// An engine which rejects every script.  Grammars containing `$script` rules will fail to
/// compile.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScripts;

impl ScriptEngine for NoScripts {
    fn compile(&self, _source: &str) -> Result<ScriptHandle, ScriptError> {
        Err(ScriptError::Unsupported)
    }

    fn run(&self, handle: ScriptHandle, _state: &mut dyn TextState) -> Result<Match, ScriptError> {
        Err(ScriptError::InvalidHandle(handle))
    }

    fn bind(&mut self, _name: &str, _value: serde_json::Value) {}
}

/// The signature of a script implemented in Rust
pub type NativeScript =
    Box<dyn Fn(&mut dyn TextState, &Bindings) -> Result<Match, ScriptError> + Send + Sync>;

/// An engine whose scripts are Rust closures.  The 'source' of a `$script` rule is the name
/// under which a closure was [`register`](NativeScripts::register)ed (surrounding whitespace is
/// ignored).
#[derive(Default)]
pub struct NativeScripts {
    scripts: IndexVec<ScriptHandle, (String, NativeScript)>,
    bindings: Bindings,
}

impl NativeScripts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure under `name`, replacing any closure previously registered with that
    /// name.
    pub fn register(
        &mut self,
        name: &str,
        script: impl Fn(&mut dyn TextState, &Bindings) -> Result<Match, ScriptError>
            + Send
            + Sync
            + 'static,
    ) -> ScriptHandle {
        let script: NativeScript = Box::new(script);
        match self.handle_of(name) {
            Some(handle) => {
                self.scripts[handle].1 = script;
                handle
            }
            None => self.scripts.push((name.to_owned(), script)),
        }
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn handle_of(&self, name: &str) -> Option<ScriptHandle> {
        self.scripts
            .iter_enumerated()
            .find(|(_, (n, _))| n == name)
            .map(|(handle, _)| handle)
    }
}

impl ScriptEngine for NativeScripts {
    fn compile(&self, source: &str) -> Result<ScriptHandle, ScriptError> {
        let name = source.trim();
        self.handle_of(name)
            .ok_or_else(|| ScriptError::UnknownScript(name.to_owned()))
    }

    fn run(&self, handle: ScriptHandle, state: &mut dyn TextState) -> Result<Match, ScriptError> {
        let (_name, script) = self
            .scripts
            .get(handle)
            .ok_or(ScriptError::InvalidHandle(handle))?;
        script(state, &self.bindings)
    }

    fn bind(&mut self, name: &str, value: serde_json::Value) {
        self.bindings.insert(name.to_owned(), value);
    }
}

impl Debug for NativeScripts {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("NativeScripts")
            .field(
                "scripts",
                &self.scripts.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("bindings", &self.bindings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        state::{State, StringState, TextState},
        token::{Match, Token},
    };

    use super::{NativeScripts, NoScripts, ScriptEngine, ScriptError};

    fn digits(state: &mut dyn TextState) -> Result<Match, ScriptError> {
        let start = state.position();
        let len = state
            .remaining()
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or_else(|| state.remaining().len());
        if len == 0 {
            return Err(ScriptError::Rejected);
        }
        let value = state.remaining()[..len].to_owned();
        state.advance(len);
        Ok(Match::Token(Token::new("digits", value, start..start + len)))
    }

    #[test]
    fn native() {
        let mut engine = NativeScripts::new();
        let handle = engine.register("digits", |state, _| digits(state));
        engine.bind("base", serde_json::json!(10));

        assert_eq!(engine.compile("  digits\n"), Ok(handle));
        assert_eq!(
            engine.compile("letters"),
            Err(ScriptError::UnknownScript("letters".to_owned()))
        );
        assert_eq!(engine.bindings()["base"], serde_json::json!(10));

        let mut state = StringState::new("123x");
        let matched = engine.run(handle, &mut state).unwrap();
        assert_eq!(matched.token().map(|t| t.value.as_str()), Some("123"));
        assert_eq!(state.position(), 3);
        assert_eq!(engine.run(handle, &mut state), Err(ScriptError::Rejected));
    }

    #[test]
    fn no_scripts() {
        assert_eq!(NoScripts.compile("anything"), Err(ScriptError::Unsupported));
    }
}
