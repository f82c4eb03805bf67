use std::{
    fmt::Debug,
    time::{Duration, Instant},
};

use rand::prelude::ThreadRng;

use crate::{utils, Arbitrary, Shrink};

use self::immut::Immut;

/// Run the fuzzer on some kind of sample
pub fn fuzz<A: Arbitrary + Debug>(iteration_limit: Option<usize>, config: A::Config) {
    Runner::<A>::new(config).run(iteration_limit);
}

/// A thread-local `Runner` for fuzz tests
#[derive(Debug, Clone)]
struct Runner<A: Arbitrary> {
    rng: ThreadRng,
    static_data: Immut<A::StaticData>,
    table: A::SampleTable,
    config: A::Config,

    // Stat printing state
    fuzz_start_time: Immut<Instant>,
    elapsed_secs_for_last_print: u64,

    // Fuzzing loop state
    unparsed_string: String,
    iteration_count: usize,
    total_bytes_parsed: usize,
    total_time_checking: Duration,
}

impl<A: Arbitrary + Debug> Runner<A> {
    /// Create a `Runner` which hasn't run any fuzzing iterations.
    fn new(config: A::Config) -> Self {
        let static_data = Immut::new(A::gen_static_data(&config));
        let mut rng = rand::thread_rng();
        Self {
            table: A::gen_table(&static_data, &mut rng, &config),
            rng,
            static_data,
            config,

            fuzz_start_time: Instant::now().into(),
            elapsed_secs_for_last_print: 0,

            unparsed_string: String::new(),
            iteration_count: 0,
            total_bytes_parsed: 0,
            total_time_checking: Duration::ZERO,
        }
    }

    /// Run the mainloop of the fuzzer
    fn run(mut self, iteration_limit: Option<usize>) {
        loop {
            // Re-generate sample tables every thousand iterations.  This is a compromise to
            // increase the generation speed but not always sampling from the same finite set of
            // samples.
            self.table = A::gen_table(&self.static_data, &mut self.rng, &self.config);

            for _ in 0..1_000 {
                // Generate new sample
                let sample = A::gen(&self.static_data, &self.table, &self.config, &mut self.rng);

                if let Err(problem) = self.check(&sample) {
                    println!("{}", problem);
                    let shrunk_sample = self.shrink_sample(sample);
                    // Set `self.unparsed_string` so it can be printed
                    self.unparsed_string.clear();
                    shrunk_sample.unparse(&self.static_data, &mut self.unparsed_string);
                    let problem = self.check(&shrunk_sample).err();
                    dbg!(shrunk_sample, &self.unparsed_string, problem);
                    panic!("Found a failing sample!");
                }

                self.iteration_count += 1;
                let reached_iteration_limit =
                    iteration_limit.map_or(false, |limit| self.iteration_count >= limit);

                // Print stats roughly every second, or when the test ends
                let elapsed_secs = self.fuzz_start_time.elapsed().as_secs();
                if elapsed_secs > self.elapsed_secs_for_last_print || reached_iteration_limit {
                    self.elapsed_secs_for_last_print = elapsed_secs;
                    println!(
                        "{} iters.  {} in {:?} = {}/s",
                        self.iteration_count,
                        utils::format_big_bytes(self.total_bytes_parsed as f32),
                        self.total_time_checking,
                        utils::format_big_bytes(
                            self.total_bytes_parsed as f32
                                / self.total_time_checking.as_secs_f32()
                        )
                    );
                }
                // Exit loop if iteration limit is reached
                if reached_iteration_limit {
                    return;
                }
            }
        }
    }

    /// Shrink a witness sample until a minimal witness is found.  Shrinking works in the following
    /// way:
    /// 1. The sample is converted to an `A::Shrink` (which allows the shrinking strategy to add
    ///    extra state).
    /// 2. This generates an [`Iterator`] of slightly smaller samples
    /// 3. Each of these smaller samples are tested individually.  If any of these fail, then it
    ///    becomes a new witness, and we continue at step `2` with this as the new sample.
    /// 4. If all slightly smaller samples aren't witnesses (or there aren't any), then the current
    ///    sample is deemed minimal and returned.
    fn shrink_sample(&mut self, sample: A) -> A {
        println!("Shrinking...");
        let mut shrink: A::Shrink = sample.into();
        loop {
            // If a smaller case also fails, then make that the new minimal case and keep trying to
            // shrink
            let mut smaller_witness = None;
            for smaller_case in shrink.smaller_cases() {
                if self.check(&smaller_case).is_err() {
                    smaller_witness = Some(smaller_case.into_owned());
                    break;
                }
            }
            match smaller_witness {
                Some(smaller) => shrink = smaller,
                // If no smaller cases failed (or this can't be shrunk), then this is the smallest
                // witness
                None => return shrink.into(),
            }
        }
    }

    fn check(&mut self, sample: &A) -> Result<(), String> {
        // Unparse the sample, and check that parsing it gives back the same sample
        self.unparsed_string.clear();
        sample.unparse(&self.static_data, &mut self.unparsed_string);
        if A::parse(&self.static_data, &self.unparsed_string).as_ref() != Some(sample) {
            return Err(format!("{:?} doesn't round-trip", self.unparsed_string));
        }

        let start = Instant::now();
        let result = sample.check(&self.static_data);
        self.total_bytes_parsed += sample.input_len();
        self.total_time_checking += start.elapsed();
        result
    }
}

mod immut {
    /// Wrapper type which only permits immutable references to its contents.  This is equivalent
    /// to `let x: A` but can be used in a type definition.
    #[derive(Debug, Clone)]
    #[repr(transparent)]
    pub(super) struct Immut<T> {
        inner: T,
    }

    impl<T> Immut<T> {
        pub(super) fn new(inner: T) -> Self {
            Self { inner }
        }

        pub(super) fn inner(&self) -> &T {
            &self.inner
        }
    }

    impl<T> std::ops::Deref for Immut<T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            self.inner()
        }
    }

    impl<T> From<T> for Immut<T> {
        fn from(v: T) -> Self {
            Self::new(v)
        }
    }
}
