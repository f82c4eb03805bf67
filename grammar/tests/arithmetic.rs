//! Loading a real grammar from disk and parsing with it.

use std::{path::PathBuf, sync::Arc};

use parsejoy_grammar::{Compiler, Config, NoScripts, Program, ProgramCache, Rule};

fn load(file_name: &str) -> Rule {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("grammars")
        .join(file_name);
    Rule::load_file(&path).unwrap()
}

fn compile(config: Config) -> Program {
    Compiler::new(&load("arithmetic.toml"), Arc::new(NoScripts))
        .unwrap()
        .with_config(config)
        .compile("start")
        .unwrap()
}

const VALID: [&str; 6] = ["1", "1 + 2", "(1+2) * 3", " 12 / (3 - 4) ", "((7))", "1\n*\t2"];
const INVALID: [&str; 7] = ["", "1 +", "(1", "1 2", "+1", "()", "1 + (2 * 3"];

#[test]
fn formats_agree() {
    let json = load("arithmetic.json");
    let toml = load("arithmetic.toml");
    assert_eq!(json, toml);
    assert_eq!(json.fingerprint(), toml.fingerprint());
}

#[test]
fn arithmetic() {
    let program = compile(Config::default());
    for input in VALID.iter() {
        let parsed = program.parse(input).unwrap();
        assert_eq!(parsed.end, input.len(), "{:?}", input);
    }
    for input in INVALID.iter() {
        assert!(program.parse(input).is_err(), "{:?} shouldn't parse", input);
    }

    let parsed = program.parse("(1+2) * 3").unwrap();
    let values = parsed
        .matched
        .tokens()
        .filter(|t| !t.value.trim().is_empty())
        .map(|t| t.value.as_str())
        .collect::<Vec<_>>();
    assert_eq!(values, vec!["(", "1", "+", "2", ")", "*", "3"]);

    // The parse got as far as the missing operand
    assert_eq!(program.parse("1 +").unwrap_err().furthest, 3);
}

#[test]
fn pruning_agrees() {
    let pruned = compile(Config::default());
    let unpruned = compile(Config {
        prune_alternatives: false,
        ..Config::default()
    });
    for input in VALID.iter().chain(INVALID.iter()) {
        assert_eq!(pruned.parse(input), unpruned.parse(input), "{:?}", input);
    }
}

#[test]
fn cached() {
    let json = load("arithmetic.json");
    let toml = load("arithmetic.toml");
    let cache = ProgramCache::new();
    let from_json = cache
        .get_or_compile(&Compiler::new(&json, Arc::new(NoScripts)).unwrap(), "start")
        .unwrap();
    let from_toml = cache
        .get_or_compile(&Compiler::new(&toml, Arc::new(NoScripts)).unwrap(), "start")
        .unwrap();
    assert!(Arc::ptr_eq(&from_json, &from_toml));
    assert!(from_toml.parse("2 * (3 + 4)").is_ok());
}
