use itertools::Itertools;
use number_prefix::NumberPrefix;
use rand::{prelude::SliceRandom, Rng};
use rand_distr::Distribution;

/// Generates `n` strings, each made by concatenating a random number of `fragments`
pub fn gen_concatenations(
    n: usize,
    fragments: &[String],
    rng: &mut impl Rng,
    count_distr: &impl Distribution<u64>,
) -> Vec<String> {
    (0..n)
        .map(|_| {
            let count = rng.sample(count_distr) as usize;
            std::iter::repeat_with(|| fragments.choose(rng).map_or("", String::as_str))
                .take(count)
                .collect()
        })
        .collect_vec()
}

pub fn format_big_bytes(num: f32) -> String {
    match NumberPrefix::decimal(num) {
        NumberPrefix::Standalone(n) => format!("{} bytes", n),
        NumberPrefix::Prefixed(prefix, n) => format!("{:.1} {}B", n, prefix),
    }
}
