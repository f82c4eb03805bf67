//! Automated random testing of the grammar compiler and the parsers it produces.  Random grammars
//! are compiled with and without `$or` pruning, and both parsers are run over random inputs.
//!
//! TODO: Replace this with `quickcheck` or `proptest`?

mod grammar;
mod runner;
mod utils;

use std::{borrow::Cow, ops::Deref};

use rand::Rng;

fn main() {
    // Each grammar is checked against around 8 inputs, from every starting position
    runner::fuzz::<grammar::GrammarSample>(Some(10_000), grammar::Config::default());
}

pub trait Arbitrary: Sized + Eq {
    /// Configuration parameters passed into the [`fuzz`](runner::fuzz) function
    type Config: Default;
    /// Static data generated once before entering the fuzzing loop
    type StaticData;
    /// Sample tables generated every thousand fuzzing iterations.  This allows the program to
    /// cache commonly sampled values (e.g. input fragments) to speed up sample generation.
    type SampleTable;
    /// A shrunk instance of `Self`.  Extra state can be added to this to implement more complex
    /// shrinking strategies.
    type Shrink: Shrink + From<Self> + Into<Self> + Deref<Target = Self>;

    /* STATIC TABLE GENERATION */
    fn gen_static_data(config: &Self::Config) -> Self::StaticData;
    fn gen_table(
        data: &Self::StaticData,
        rng: &mut impl Rng,
        config: &Self::Config,
    ) -> Self::SampleTable;

    /* TESTING */
    /// Create a new sample to test
    fn gen(
        data: &Self::StaticData,
        table: &Self::SampleTable,
        config: &Self::Config,
        rng: &mut impl Rng,
    ) -> Self;
    /// Write this sample to a string
    fn unparse(&self, data: &Self::StaticData, s: &mut String);
    /// Parse a sample from a given string.  This is expected to be an inverse of `unparse`
    fn parse(data: &Self::StaticData, s: &str) -> Option<Self>;
    /// Checks the properties which should hold for this sample, describing the first one which
    /// doesn't
    fn check(&self, data: &Self::StaticData) -> Result<(), String>;
    /// The number of bytes of input which [`check`](Self::check) parses
    fn input_len(&self) -> usize;
}

pub trait Shrink: Clone {
    fn smaller_cases<'s>(&'s self) -> Box<dyn Iterator<Item = Cow<'s, Self>> + 's>;
}
