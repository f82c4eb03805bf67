use std::fmt::{Display, Formatter};

use sha2::{Digest, Sha256};

use super::Rule;

const TAG_STRING: u8 = b's';
const TAG_SEQUENCE: u8 = b'l';
const TAG_MAP: u8 = b'm';

/// A SHA-256 digest of the structure of a [`Rule`] tree.
///
/// Two trees have equal fingerprints exactly when they are structurally equal (up to hash
/// collisions).  Map entries are hashed in sorted key order, so the order in which keys were
/// written in the source document doesn't matter.  Fingerprints are stable across runs and
/// machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(rule: &Rule) -> Self {
        let mut hasher = Sha256::new();
        feed_rule(&mut hasher, rule);
        let mut bytes = [0; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn feed_rule(hasher: &mut Sha256, rule: &Rule) {
    match rule {
        Rule::String(s) => {
            hasher.update([TAG_STRING]);
            feed_str(hasher, s);
        }
        Rule::Sequence(rules) => {
            hasher.update([TAG_SEQUENCE]);
            feed_len(hasher, rules.len());
            for r in rules {
                feed_rule(hasher, r);
            }
        }
        Rule::Map(map) => {
            hasher.update([TAG_MAP]);
            feed_len(hasher, map.len());
            // `BTreeMap` iterates in key order
            for (key, value) in map {
                feed_str(hasher, key);
                hasher.update(Fingerprint::of(value).as_bytes());
            }
        }
    }
}

fn feed_str(hasher: &mut Sha256, s: &str) {
    feed_len(hasher, s.len());
    hasher.update(s.as_bytes());
}

fn feed_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

#[cfg(test)]
mod tests {
    use crate::Rule;

    #[track_caller]
    fn check_same(a: &Rule, b: &Rule) {
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[track_caller]
    fn check_different(a: &Rule, b: &Rule) {
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn stable() {
        let rule = Rule::from_json(r#"{"start": ["a", {"$or": ["b", "c"]}], "a": "b"}"#).unwrap();
        check_same(&rule, &rule.clone());
        // Key order in the source doesn't matter
        let reordered =
            Rule::from_json(r#"{"a": "b", "start": ["a", {"$or": ["b", "c"]}]}"#).unwrap();
        check_same(&rule, &reordered);
        assert_eq!(rule.fingerprint().to_hex().len(), 64);
        assert_eq!(rule.fingerprint().to_string(), rule.fingerprint().to_hex());
    }

    #[test]
    fn known_digest() {
        // Pinned so that accidental changes to the encoding get noticed
        assert_eq!(
            Rule::from("a").fingerprint().to_hex(),
            "8c55c670d897f80b03daf1a5d2bf5c940074a4ab091e1e511ea7c5bf205d0d29"
        );
    }

    #[test]
    fn sensitive() {
        check_different(&Rule::from("a"), &Rule::from("b"));
        check_different(
            &Rule::Sequence(vec!["a".into(), "b".into()]),
            &Rule::Sequence(vec!["b".into(), "a".into()]),
        );
        // Length prefixes keep differently-split strings apart
        check_different(
            &Rule::Sequence(vec!["ab".into(), "c".into()]),
            &Rule::Sequence(vec!["a".into(), "bc".into()]),
        );
        check_different(
            &Rule::from("a"),
            &Rule::Sequence(vec!["a".into()]),
        );
        check_different(
            &Rule::combinator("$optional", "x".into()),
            &Rule::combinator("$repeat", "x".into()),
        );
        check_different(
            &Rule::grammar(vec![("a", "x".into())]),
            &Rule::grammar(vec![("a", "y".into())]),
        );
        check_different(&Rule::Sequence(vec![]), &Rule::grammar(vec![]));
    }
}
