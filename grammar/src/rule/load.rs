//! Reading grammars from JSON or TOML documents.

use std::{
    fmt::{Display, Formatter},
    path::{Path, PathBuf},
};

use super::Rule;

/// The ways that loading a grammar document can fail
#[derive(Debug)]
pub enum LoadError {
    Io(PathBuf, std::io::Error),
    Json(serde_json::Error),
    Toml(toml::de::Error),
    /// The file extension is neither `.json` nor `.toml`
    UnknownFormat(PathBuf),
    /// The document loaded, but its root isn't a map of named rules
    NotAGrammar,
}

impl Rule {
    /// Loads a grammar from a file, choosing the format from its extension.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let source =
            std::fs::read_to_string(path).map_err(|e| LoadError::Io(path.to_owned(), e))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&source),
            Some("toml") => Self::from_toml(&source),
            _ => Err(LoadError::UnknownFormat(path.to_owned())),
        }
    }

    pub fn from_json(s: &str) -> Result<Self, LoadError> {
        let rule: Rule = serde_json::from_str(s).map_err(LoadError::Json)?;
        check_root(rule)
    }

    pub fn from_toml(s: &str) -> Result<Self, LoadError> {
        let rule: Rule = toml::from_str(s).map_err(LoadError::Toml)?;
        check_root(rule)
    }
}

fn check_root(rule: Rule) -> Result<Rule, LoadError> {
    match rule {
        Rule::Map(_) => Ok(rule),
        _ => Err(LoadError::NotAGrammar),
    }
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            LoadError::Io(path, e) => write!(f, "can't read {}: {}", path.display(), e),
            LoadError::Json(e) => write!(f, "invalid JSON grammar: {}", e),
            LoadError::Toml(e) => write!(f, "invalid TOML grammar: {}", e),
            LoadError::UnknownFormat(path) => write!(
                f,
                "can't tell the format of {} (expected a .json or .toml file)",
                path.display()
            ),
            LoadError::NotAGrammar => write!(f, "a grammar must be a map of named rules"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(_, e) => Some(e),
            LoadError::Json(e) => Some(e),
            LoadError::Toml(e) => Some(e),
            LoadError::UnknownFormat(_) | LoadError::NotAGrammar => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Rule;

    use super::LoadError;

    #[test]
    fn json() {
        let rule = Rule::from_json(
            r#"{
                "start": {"$sequence": ["a", {"$literal": "b"}, "$eof"]},
                "a": {"$literal": "a"},
                "flag": true,
                "count": 3
            }"#,
        )
        .unwrap();
        assert_eq!(
            rule.field("start"),
            Some(&Rule::combinator(
                "$sequence",
                Rule::Sequence(vec![
                    "a".into(),
                    Rule::combinator("$literal", "b".into()),
                    "$eof".into()
                ])
            ))
        );
        // Scalars load as their textual form
        assert_eq!(rule.field("flag"), Some(&Rule::from("true")));
        assert_eq!(rule.field("count"), Some(&Rule::from("3")));
    }

    #[test]
    fn toml() {
        let rule = Rule::from_toml(
            r#"
            start = ["a", "$eof"]

            [a]
            "$literal" = "a"
            "#,
        )
        .unwrap();
        assert_eq!(
            rule,
            Rule::grammar(vec![
                ("start", Rule::Sequence(vec!["a".into(), "$eof".into()])),
                ("a", Rule::combinator("$literal", "a".into())),
            ])
        );
    }

    #[test]
    fn bad_documents() {
        assert!(matches!(
            Rule::from_json(r#"{"a": "x", "a": "y"}"#),
            Err(LoadError::Json(_))
        ));
        assert!(matches!(
            Rule::from_json(r#"{"a": null}"#),
            Err(LoadError::Json(_))
        ));
        assert!(matches!(
            Rule::from_json(r#"["a"]"#),
            Err(LoadError::NotAGrammar)
        ));
        assert!(matches!(
            Rule::load_file("grammar.yaml"),
            Err(LoadError::Io(..))
        ));
    }
}
