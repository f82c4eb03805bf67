//! Fuzzing whole grammars.  Each sample is a random grammar together with some random inputs.
//! Checking a sample compiles the grammar twice (with and without `$or` pruning) and runs both
//! programs from every position of every input.

use std::{borrow::Cow, collections::BTreeMap, ops::Deref, sync::Arc};

use itertools::Itertools;
use parsejoy_grammar::{
    Compiler, Config as ParserConfig, NoMatch, NoScripts, Outcome, Program, Rule, State,
    StringState,
};
use rand::Rng;
use rand_distr::Geometric;

use crate::{utils, Arbitrary, Shrink};

/// The name given to every randomly generated rule (except `start`), followed by its index
const RULE_PREFIX: &str = "r";

#[derive(Debug, Clone)]
pub struct Config {
    /// The most named rules in one grammar, not including `start`
    pub max_rules: usize,
    /// How deeply combinators can be nested inside one rule
    pub max_rule_depth: usize,
    /// Passed on as [`ParserConfig::max_depth`].  Random grammars are often left-recursive, so
    /// keep this small to stop exponential backtracking.
    pub parse_depth: usize,
    pub inputs_per_grammar: usize,
    /// The average number of fragments concatenated into each input
    pub mean_fragments: f64,
    /// How many fragments are kept in each sample table
    pub table_size: usize,
    pub literals: Vec<String>,
    pub patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_rules: 4,
            max_rule_depth: 3,
            parse_depth: 6,
            inputs_per_grammar: 8,
            mean_fragments: 3.0,
            table_size: 200,
            literals: ["a", "b", "ab", "ba", "c", " "]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            patterns: ["a+", "b?", "[ab]*c", "(ab|ba)+", " *", "[a-c]"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticData {
    literals: Vec<String>,
    /// Each pattern along with a sampler which generates strings matching it
    patterns: Vec<(String, rand_regex::Regex)>,
    fragment_count: Geometric,
    parse_depth: usize,
}

/// Input fragments, made from the grammar's terminals
#[derive(Debug, Clone)]
pub struct SampleTable {
    fragments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarSample {
    grammar: Rule,
    inputs: Vec<String>,
}

impl Arbitrary for GrammarSample {
    type Config = Config;
    type StaticData = StaticData;
    type SampleTable = SampleTable;
    type Shrink = GrammarShrink;

    fn gen_static_data(config: &Config) -> StaticData {
        let patterns = config
            .patterns
            .iter()
            .filter_map(|pattern| match rand_regex::Regex::compile(pattern, 4) {
                Ok(sampler) => Some((pattern.clone(), sampler)),
                Err(e) => {
                    println!("Skipping pattern {:?}: {}", pattern, e);
                    None
                }
            })
            .collect_vec();
        // A geometric distribution with mean `m` has `p = 1 / (m + 1)`
        let p = 1.0 / (config.mean_fragments.max(0.0) + 1.0);
        StaticData {
            literals: config.literals.clone(),
            patterns,
            fragment_count: Geometric::new(p).expect("`p` is always in (0, 1]"),
            parse_depth: config.parse_depth,
        }
    }

    fn gen_table(data: &StaticData, rng: &mut impl Rng, config: &Config) -> SampleTable {
        let fragments = (0..config.table_size)
            .filter_map(|_| {
                let idx = rng.gen_range(0..data.literals.len() + data.patterns.len());
                match data.literals.get(idx) {
                    Some(literal) => Some(literal.clone()),
                    None => {
                        let (_, sampler) = data.patterns.get(idx - data.literals.len())?;
                        Some(rng.sample::<String, _>(sampler))
                    }
                }
            })
            .collect_vec();
        SampleTable { fragments }
    }

    fn gen(data: &StaticData, table: &SampleTable, config: &Config, rng: &mut impl Rng) -> Self {
        let num_rules = rng.gen_range(1..=config.max_rules.max(1));
        let mut rules = (0..num_rules)
            .map(|idx| {
                let rule = gen_rule(data, num_rules, config.max_rule_depth, rng);
                (format!("{}{}", RULE_PREFIX, idx), rule)
            })
            .collect::<BTreeMap<_, _>>();
        let start = gen_rule(data, num_rules, config.max_rule_depth, rng);
        rules.insert("start".to_owned(), start);

        let inputs = utils::gen_concatenations(
            config.inputs_per_grammar,
            &table.fragments,
            rng,
            &data.fragment_count,
        );
        GrammarSample {
            grammar: Rule::Map(rules),
            inputs,
        }
    }

    fn unparse(&self, _data: &StaticData, s: &mut String) {
        // Samples are written as JSON, using the grammar crate's own rendering
        let document = Rule::grammar(vec![
            ("grammar", self.grammar.clone()),
            (
                "inputs",
                Rule::Sequence(self.inputs.iter().map(|i| Rule::String(i.clone())).collect()),
            ),
        ]);
        s.push_str(&document.to_string());
    }

    fn parse(_data: &StaticData, s: &str) -> Option<Self> {
        let document = Rule::from_json(s).ok()?;
        let grammar = document.field("grammar")?.clone();
        let inputs = document
            .field("inputs")?
            .as_sequence()?
            .iter()
            .map(|input| input.as_str().map(str::to_owned))
            .collect::<Option<Vec<_>>>()?;
        Some(GrammarSample { grammar, inputs })
    }

    fn check(&self, data: &StaticData) -> Result<(), String> {
        let reloaded = Rule::from_json(&self.grammar.to_string()).map_err(|e| e.to_string())?;
        if reloaded.fingerprint() != self.grammar.fingerprint() {
            return Err("reloading the grammar changed its fingerprint".to_owned());
        }

        let config = ParserConfig {
            max_depth: data.parse_depth,
            ..ParserConfig::default()
        };
        let pruned = compile(&self.grammar, config.clone());
        let unpruned = compile(
            &self.grammar,
            ParserConfig {
                prune_alternatives: false,
                ..config
            },
        );
        let (pruned, unpruned) = match (pruned, unpruned) {
            (Ok(pruned), Ok(unpruned)) => (pruned, unpruned),
            // Every generated rule is defined, so only invalid regexes can be rejected, and they
            // must be rejected whether or not `$or`s are pruned
            (Err(a), Err(b)) if a.kind() == b.kind() => return Ok(()),
            (a, b) => {
                return Err(format!(
                    "pruning changed compilation: {:?} vs {:?}",
                    a.err(),
                    b.err()
                ))
            }
        };

        for input in &self.inputs {
            let starts = input
                .char_indices()
                .map(|(idx, _)| idx)
                .chain(std::iter::once(input.len()));
            for from in starts {
                let (outcome, end) = run(&pruned, input, from)?;
                if run(&pruned, input, from)? != (outcome.clone(), end) {
                    return Err(format!("parsing {:?} from {} isn't deterministic", input, from));
                }
                let (unpruned_outcome, unpruned_end) = run(&unpruned, input, from)?;
                if (&outcome, end) != (&unpruned_outcome, unpruned_end) {
                    return Err(format!(
                        "pruning changed the parse of {:?} from {}: {:?} (ending at {}) vs {:?} \
                         (ending at {})",
                        input, from, outcome, end, unpruned_outcome, unpruned_end
                    ));
                }
            }
        }
        Ok(())
    }

    fn input_len(&self) -> usize {
        // Every input is parsed three times from every position
        self.inputs.iter().map(|i| i.len() * (i.len() + 1) * 3).sum()
    }
}

fn compile(grammar: &Rule, config: ParserConfig) -> parsejoy_grammar::CompileResult<Program> {
    Compiler::new(grammar, Arc::new(NoScripts))?
        .with_config(config)
        .compile("start")
}

/// Runs `program` on `input` starting from `from`, returning the outcome and where the cursor
/// ended up.  Errors if a failed parse moved the cursor.
fn run(program: &Program, input: &str, from: usize) -> Result<(Outcome, usize), String> {
    let mut state = StringState::new(input);
    state.set_position(from);
    let outcome = program.run(&mut state);
    let end = state.position();
    if outcome == Err(NoMatch) && end != from {
        return Err(format!(
            "failing to parse {:?} moved the cursor from {} to {}",
            input, from, end
        ));
    }
    Ok((outcome, end))
}

/// Generates a random rule body which can refer to `num_rules` named rules
fn gen_rule(data: &StaticData, num_rules: usize, depth: usize, rng: &mut impl Rng) -> Rule {
    let kind = if depth == 0 {
        rng.gen_range(0..4)
    } else {
        rng.gen_range(0..12)
    };
    let child = |rng: &mut _| gen_rule(data, num_rules, depth.saturating_sub(1), rng);
    match kind {
        0 => match data.literals.get(rng.gen_range(0..data.literals.len().max(1))) {
            Some(literal) => Rule::combinator("$literal", literal.as_str().into()),
            None => "$eof".into(),
        },
        1 => match data.patterns.get(rng.gen_range(0..data.patterns.len().max(1))) {
            Some((pattern, _)) => Rule::combinator("$regex", pattern.as_str().into()),
            None => "$eof".into(),
        },
        2 => Rule::String(format!("{}{}", RULE_PREFIX, rng.gen_range(0..num_rules))),
        3 => "$eof".into(),
        4 | 5 => {
            let len = rng.gen_range(0..3);
            Rule::Sequence((0..len).map(|_| child(rng)).collect())
        }
        6 | 7 => {
            let len = rng.gen_range(1..3);
            Rule::combinator("$or", Rule::Sequence((0..len).map(|_| child(rng)).collect()))
        }
        8 => Rule::combinator("$repeat", child(rng)),
        9 => Rule::combinator("$and", child(rng)),
        10 => Rule::combinator("$not", child(rng)),
        _ => Rule::combinator("$optional", child(rng)),
    }
}

///////////////
// SHRINKING //
///////////////

/// Shrinks a [`GrammarSample`] by removing inputs, shortening inputs and simplifying rules
#[derive(Debug, Clone)]
pub struct GrammarShrink {
    sample: GrammarSample,
}

impl Shrink for GrammarShrink {
    fn smaller_cases<'s>(&'s self) -> Box<dyn Iterator<Item = Cow<'s, Self>> + 's> {
        let sample = &self.sample;
        let with_inputs = move |inputs: Vec<String>| GrammarSample {
            grammar: sample.grammar.clone(),
            inputs,
        };

        let mut cases = Vec::new();
        // Remove or shorten inputs
        for (idx, input) in sample.inputs.iter().enumerate() {
            let mut inputs = sample.inputs.clone();
            inputs.remove(idx);
            cases.push(with_inputs(inputs));
            if let Some((last_char_idx, _)) = input.char_indices().last() {
                let mut inputs = sample.inputs.clone();
                inputs[idx].truncate(last_char_idx);
                cases.push(with_inputs(inputs));
                let mut inputs = sample.inputs.clone();
                inputs[idx].remove(0);
                cases.push(with_inputs(inputs));
            }
        }
        // Simplify rules
        if let Some(rules) = sample.grammar.as_map() {
            for (name, rule) in rules {
                for smaller_rule in smaller_rules(rule) {
                    let mut rules = rules.clone();
                    rules.insert(name.clone(), smaller_rule);
                    cases.push(GrammarSample {
                        grammar: Rule::Map(rules),
                        inputs: sample.inputs.clone(),
                    });
                }
            }
        }

        Box::new(
            cases
                .into_iter()
                .map(|sample| Cow::Owned(GrammarShrink { sample })),
        )
    }
}

/// Rules which are 'simpler' than `rule`, because they replace some part of it with one of its
/// children.  Some of these may not compile, in which case they pass every check and won't be
/// picked as the next witness.
fn smaller_rules(rule: &Rule) -> Vec<Rule> {
    match rule {
        Rule::String(_) => vec![],
        Rule::Sequence(children) => {
            let mut smaller = children.clone();
            for idx in 0..children.len() {
                let mut removed = children.clone();
                removed.remove(idx);
                smaller.push(Rule::Sequence(removed));
            }
            for (idx, child) in children.iter().enumerate() {
                for smaller_child in smaller_rules(child) {
                    let mut replaced = children.clone();
                    replaced[idx] = smaller_child;
                    smaller.push(Rule::Sequence(replaced));
                }
            }
            smaller
        }
        Rule::Map(_) => match rule.single_entry() {
            Some(("$literal", _)) | Some(("$regex", _)) | None => vec![],
            Some((key, value)) => {
                let mut smaller = vec![value.clone()];
                smaller.extend(
                    smaller_rules(value)
                        .into_iter()
                        .map(|v| Rule::combinator(key, v)),
                );
                smaller
            }
        },
    }
}

impl From<GrammarSample> for GrammarShrink {
    fn from(sample: GrammarSample) -> Self {
        Self { sample }
    }
}

impl From<GrammarShrink> for GrammarSample {
    fn from(shrink: GrammarShrink) -> Self {
        shrink.sample
    }
}

impl Deref for GrammarShrink {
    type Target = GrammarSample;

    fn deref(&self) -> &GrammarSample {
        &self.sample
    }
}
