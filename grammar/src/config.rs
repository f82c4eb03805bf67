//! User-configurable knobs for compiling and running parsers.

use std::path::Path;

use serde::Deserialize;

/// Options which change how grammars are compiled and how the resulting parsers run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    /// Skip `$or` branches whose possible first literals can't start the remaining input
    pub prune_alternatives: bool,
    /// Treat references to undefined rules as literals instead of failing to compile
    pub bare_literals: bool,
    /// How many named rules can be nested at run time before an invocation fails.  This is what
    /// stops left recursion.  Parses run on a thread whose stack is sized to fit this many
    /// levels (up to a hard cap, beyond which the limit is lowered to what fits).
    pub max_depth: usize,
    /// Log every named rule entered and left at `trace` level
    pub trace: bool,
    /// Wrap the tokens matched by each named rule in a token named after the rule.  Rules whose
    /// names start with `__` never get their own token.
    pub parse_tree: bool,
}

impl Config {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn load_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&source).map_err(ConfigError::Parse)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prune_alternatives: true,
            bare_literals: false,
            max_depth: 1000,
            trace: false,
            parse_tree: false,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "can't read config: {}", e),
            ConfigError::Parse(e) => write!(f, "invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn partial_toml() {
        let config =
            Config::from_toml("max-depth = 64\nbare-literals = true\nparse-tree = true").unwrap();
        assert_eq!(
            config,
            Config {
                max_depth: 64,
                bare_literals: true,
                parse_tree: true,
                ..Config::default()
            }
        );
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
        assert!(Config::from_toml("max_depth = 3").is_err());
    }
}
