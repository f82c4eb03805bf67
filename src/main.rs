//! # Parsejoy
//!
//! Compiles a grammar file and parses an input file with it.
//!
//! ```text
//! parsejoy [-v...] [--start NAME] [--config FILE] [--trace] [--tree] <grammar.{json,toml}> <input>
//! ```
//!
//! Each matched token is printed on its own line.  With `--tree`, each named rule also gets a
//! line, and the tokens it matched are indented below it.

#![deny(missing_docs)]

use std::{error::Error, fmt::Write, path::PathBuf, process::exit, sync::Arc};

use parsejoy_grammar::{config::Config, Compiler, NoScripts, Rule, StringState, Token};

const USAGE: &str =
    "usage: parsejoy [-v...] [--start NAME] [--config FILE] [--trace] [--tree] <grammar> <input>";

/// The parsed command line
#[derive(Debug)]
struct Args {
    verbosity: usize,
    start: String,
    config: Option<PathBuf>,
    trace: bool,
    tree: bool,
    grammar: PathBuf,
    input: PathBuf,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut verbosity = 0;
        let mut start = "start".to_owned();
        let mut config = None;
        let mut trace = false;
        let mut tree = false;
        let mut paths = Vec::new();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--start" => start = args.next().ok_or("`--start` needs a rule name")?,
                "--config" => {
                    config = Some(PathBuf::from(
                        args.next().ok_or("`--config` needs a file")?,
                    ))
                }
                "--trace" => trace = true,
                "--tree" => tree = true,
                // `-v`, `-vv`, `-vvv`...
                a if a.len() > 1 && a.starts_with('-') && a[1..].chars().all(|c| c == 'v') => {
                    verbosity += a.len() - 1
                }
                a if a.starts_with('-') => return Err(format!("unknown flag `{}`", a)),
                _ => paths.push(PathBuf::from(&arg)),
            }
        }
        let mut paths = paths.into_iter();
        match (paths.next(), paths.next(), paths.next()) {
            (Some(grammar), Some(input), None) => Ok(Args {
                verbosity,
                start,
                config,
                trace,
                tree,
                grammar,
                input,
            }),
            _ => Err("expected a grammar file and an input file".to_owned()),
        }
    }

    fn log_level(&self) -> log::LevelFilter {
        match self.verbosity {
            // `--trace` is useless if trace logs aren't shown
            _ if self.trace => log::LevelFilter::Trace,
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// The entry point of Parsejoy.
fn main() {
    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}\n{}", msg, USAGE);
            exit(2);
        }
    };

    // Initialise the logging; `RUST_LOG` overrides the verbosity flags
    let mut logger = pretty_env_logger::formatted_builder();
    logger.filter_level(args.log_level());
    if let Ok(filters) = std::env::var("RUST_LOG") {
        logger.parse_filters(&filters);
    }
    logger.init();

    match run(&args) {
        Ok(true) => {}
        Ok(false) => exit(1),
        Err(e) => {
            log::error!("{}", e);
            exit(2);
        }
    }
}

/// Compiles the grammar and parses the input, returning whether the parse succeeded
fn run(args: &Args) -> Result<bool, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => Config::load_toml_file(path)?,
        None => Config::default(),
    };
    config.trace |= args.trace;
    config.parse_tree |= args.tree;

    log::info!("Loading grammar from {:?}", args.grammar);
    let grammar = Rule::load_file(&args.grammar)?;
    let compiler = Compiler::new(&grammar, Arc::new(NoScripts))?.with_config(config);
    log::debug!("Grammar fingerprint: {}", compiler.fingerprint());
    let program = compiler.compile(&args.start)?;
    log::info!("Compiled {} rules", program.rules().count());

    let input = std::fs::read_to_string(&args.input)?;
    let state = StringState::new(&input);
    match program.parse(&input) {
        Ok(parsed) => {
            print!("{}", format_tokens(parsed.matched.token(), &state));
            if parsed.end < input.len() {
                let (line, col) = state.line_col(parsed.end);
                log::warn!("Parse stopped before the end of the input, at {}:{}", line, col);
            }
            Ok(true)
        }
        Err(e) => {
            let (line, col) = state.line_col(e.furthest);
            eprintln!("{:?}:{}:{}: {}", args.input, line, col, e);
            Ok(false)
        }
    }
}

/// One line per token: its position, its kind (indented by its depth in the parse tree) and its
/// value.  Kinds are escaped, since literal tokens are named after their text.
fn format_tokens(tokens: Option<&Token>, state: &StringState) -> String {
    let mut out = String::new();
    for (depth, token) in tokens.into_iter().flat_map(Token::walk) {
        let (line, col) = state.line_col(token.span.start);
        // Writing to a `String` can't fail
        let _ = writeln!(
            out,
            "{}:{}\t{:indent$}{}\t{:?}",
            line,
            col,
            "",
            token.kind.escape_debug(),
            token.value,
            indent = depth * 2
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parsejoy_grammar::{Compiler, Config, NoScripts, Rule, StringState};

    use super::{format_tokens, Args};

    fn parse(args: &[&str]) -> Result<Args, String> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn args() {
        let args = parse(&["-vv", "g.json", "--start", "expr", "-v", "in.txt"]).unwrap();
        assert_eq!(args.verbosity, 3);
        assert_eq!(args.start, "expr");
        assert_eq!(args.grammar.to_str(), Some("g.json"));
        assert_eq!(args.input.to_str(), Some("in.txt"));
        assert!(!args.trace);
        assert!(!args.tree);
        assert_eq!(args.log_level(), log::LevelFilter::Trace);

        let args = parse(&["--config", "c.toml", "g.json", "--tree", "in.txt"]).unwrap();
        assert_eq!(args.start, "start");
        assert!(args.tree);
        assert_eq!(args.config.unwrap().to_str(), Some("c.toml"));

        assert!(parse(&["g.json"]).is_err());
        assert!(parse(&["g.json", "a", "b"]).is_err());
        assert!(parse(&["--start"]).is_err());
        assert!(parse(&["-x", "g.json", "in.txt"]).is_err());
    }

    #[test]
    fn printed_tree() {
        let grammar = Rule::from_json(
            r#"{
                "start": ["word", {"$repeat": ["__space", "word"]}, "__newline", "word"],
                "__newline": {"$literal": "\n"},
                "word": {"$regex": "[a-z]+"},
                "__space": {"$literal": " "}
            }"#,
        )
        .unwrap();
        let compile = |parse_tree: bool| {
            Compiler::new(&grammar, Arc::new(NoScripts))
                .unwrap()
                .with_config(Config {
                    parse_tree,
                    ..Config::default()
                })
                .compile("start")
                .unwrap()
        };
        let input = "ab cd\nef";
        let state = StringState::new(input);

        let parsed = compile(true).parse(input).unwrap();
        assert_eq!(
            format_tokens(parsed.matched.token(), &state),
            "1:1\tstart\t\"ab cd\\nef\"\n\
             1:1\t  word\t\"ab\"\n\
             1:1\t    regex\t\"ab\"\n\
             1:3\t   \t\" \"\n\
             1:4\t  word\t\"cd\"\n\
             1:4\t    regex\t\"cd\"\n\
             1:6\t  \\n\t\"\\n\"\n\
             2:1\t  word\t\"ef\"\n\
             2:1\t    regex\t\"ef\"\n"
        );

        let parsed = compile(false).parse(input).unwrap();
        assert_eq!(
            format_tokens(parsed.matched.token(), &state),
            "1:1\tregex\t\"ab\"\n1:3\t \t\" \"\n1:4\tregex\t\"cd\"\n\
             1:6\t\\n\t\"\\n\"\n2:1\tregex\t\"ef\"\n"
        );
    }
}
