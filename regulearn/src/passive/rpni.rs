use rayon::prelude::*;
use regulearn_core::prelude::*;
use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::dfa::Dfa;
use crate::error::Result;
use crate::passive::pta::{BlueFringePta, ProcessingOrder, PtaColor, RedBlueMerge, Worklist};
use crate::passive::Sample;

/// The blue-fringe variant of RPNI.
///
/// Unlike most descriptions of RPNI in the literature, the blue-fringe
/// version does not consider all pairs of states for merging. It maintains a
/// monotonically growing set of red states whose immediate non-red
/// successors are blue. In each iteration an attempt is made to merge a blue
/// state into some red state; if no merge is valid, the blue state is
/// promoted, i.e. becomes red itself. The procedure terminates when all
/// states are red, the quotient of the folded prefix tree is the learned
/// model.
///
/// The scan evaluating the candidate merges of one blue state against all
/// red states is pure and may run in parallel; with `deterministic` set, the
/// candidate of the earliest-promoted red state wins, so identical samples
/// yield identical models regardless of scheduling.
pub struct BlueFringeRpni<A: Alphabet> {
    alphabet: A,
    order: ProcessingOrder,
    parallel: bool,
    deterministic: bool,
    decide_on_valid_merge: fn(&RedBlueMerge) -> bool,
    cancellation: CancellationToken,
}

impl<A: Alphabet> BlueFringeRpni<A> {
    pub fn new(alphabet: A) -> Self {
        Self {
            alphabet,
            order: ProcessingOrder::default(),
            parallel: true,
            deterministic: false,
            decide_on_valid_merge: |_| true,
            cancellation: CancellationToken::new(),
        }
    }

    /// Selects the order in which blue states are processed.
    pub fn with_processing_order(mut self, order: ProcessingOrder) -> Self {
        self.order = order;
        self
    }

    /// Sets whether merge candidates are evaluated in parallel. This does
    /// not inhibit deterministic runs, see [`Self::with_deterministic`].
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets whether subsequent runs on the same input are required to
    /// perform the same merges and return the same result.
    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Installs a predicate through which valid merges can be rejected. The
    /// default accepts every valid merge; the predicate must be pure, it may
    /// be evaluated concurrently.
    pub fn with_merge_decider(mut self, decide: fn(&RedBlueMerge) -> bool) -> Self {
        self.decide_on_valid_merge = decide;
        self
    }

    /// Installs a token through which the run can be cancelled cooperatively.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Builds the prefix tree acceptor from the sample and folds it. Returns
    /// the quotient automaton of the folded tree.
    pub fn compute_model(&self, sample: &Sample<A>) -> Result<Dfa<A>>
    where
        A: Sync,
    {
        let mut pta = BlueFringePta::new(self.alphabet.clone());
        for (word, label) in sample.entries() {
            pta.insert(word, label)?;
        }
        debug!(
            "built prefix tree with {} states from {} samples",
            pta.size(),
            sample.count_words()
        );

        let mut worklist = Worklist::new(self.order);
        pta.init(&mut worklist);

        while let Some((source, sym)) = worklist.pop() {
            self.cancellation.check()?;
            let blue = pta
                .child(source, sym)
                .expect("worklist transitions stay intact");
            debug_assert_eq!(pta.color(blue), PtaColor::Blue);

            match self.find_merge(&pta, blue) {
                Some(merge) => {
                    trace!(
                        "merging blue state {} into red state {}, folding {} states",
                        merge.blue(),
                        merge.red(),
                        merge.folded_states()
                    );
                    merge.apply(&mut pta, &mut worklist);
                }
                None => {
                    trace!("no valid merge, promoting {blue}");
                    pta.promote(blue, &mut worklist);
                }
            }
        }

        let model = pta.quotient();
        debug!("folded prefix tree into a model with {} states", model.size());
        Ok(model)
    }

    /// Evaluates the candidate merges of `blue` against all red states. The
    /// PTA is only read during the scan, which therefore may fan out over a
    /// thread pool.
    fn find_merge(&self, pta: &BlueFringePta<A>, blue: usize) -> Option<RedBlueMerge>
    where
        A: Sync,
    {
        let decide = self.decide_on_valid_merge;
        let reds = pta.red_states();
        if self.parallel {
            if self.deterministic {
                reds.par_iter()
                    .enumerate()
                    .filter_map(|(position, &red)| {
                        pta.try_merge(red, blue)
                            .filter(|merge| decide(merge))
                            .map(|merge| (position, merge))
                    })
                    .min_by_key(|(position, _)| *position)
                    .map(|(_, merge)| merge)
            } else {
                reds.par_iter()
                    .find_map_any(|&red| pta.try_merge(red, blue).filter(|merge| decide(merge)))
            }
        } else {
            reds.iter()
                .find_map(|&red| pta.try_merge(red, blue).filter(|merge| decide(merge)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BlueFringeRpni;
    use crate::dfa::DfaBuilder;
    use crate::error::LearnError;
    use crate::passive::{dfa_rpni, ProcessingOrder, Sample};
    use crate::random::generate_random_dfa;
    use crate::CancellationToken;
    use itertools::Itertools;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use regulearn_core::prelude::*;

    fn sample_from(words: &[(&str, bool)]) -> Sample<CharAlphabet> {
        Sample::new_finite(
            CharAlphabet::of_size(2),
            words.iter().map(|(w, c)| (w.chars(), *c)),
        )
    }

    fn assert_classifies_sample(model: &crate::dfa::Dfa<CharAlphabet>, sample: &Sample<CharAlphabet>) {
        for (word, label) in sample.entries() {
            assert_eq!(
                model.accepts(word),
                label,
                "model misclassifies {word:?}"
            );
        }
    }

    #[test_log::test]
    fn rpni_canonical_small_sample() {
        let sample = sample_from(&[
            ("", false),
            ("a", true),
            ("b", false),
            ("aa", true),
            ("ab", false),
            ("ba", false),
            ("bb", false),
        ]);
        let model = BlueFringeRpni::new(sample.alphabet.clone())
            .with_processing_order(ProcessingOrder::Canonical)
            .with_parallel(false)
            .compute_model(&sample)
            .unwrap();
        // "" and "a" must be distinct, and neither can absorb "b"
        assert_eq!(model.size(), 3);
        assert_classifies_sample(&model, &sample);
    }

    #[test]
    fn rpni_is_sound_on_generated_samples() {
        let mut rng = StdRng::seed_from_u64(0xb1ef);
        for case in 0..10 {
            let target = generate_random_dfa(2, 3 + case % 4, &mut rng);
            let alphabet = target.alphabet().clone();
            let words: Vec<(Vec<char>, bool)> = (0..60)
                .map(|_| {
                    let length = rng.gen_range(0..8);
                    let word: Vec<char> = (0..length)
                        .map(|_| alphabet.symbol(rng.gen_range(0..alphabet.size())))
                        .collect();
                    let label = target.accepts(&word.iter().copied().collect());
                    (word, label)
                })
                .collect();
            let sample = Sample::new_finite(alphabet, words);
            let model = dfa_rpni(&sample).unwrap();
            assert_classifies_sample(&model, &sample);
        }
    }

    #[test]
    fn rpni_characteristic_sample_recovers_target() {
        // target: words with an even number of 'a's
        let target = DfaBuilder::new(CharAlphabet::of_size(2))
            .with_states([true, false])
            .with_edges([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
            .into_dfa(0);
        let alphabet = target.alphabet().clone();
        let words = ["", "a", "b", "aa", "ab", "ba", "bb", "aab", "aba", "baa", "aaa"]
            .iter()
            .map(|w| (w.chars(), target.accepts(&Word::from(*w))))
            .collect_vec();
        let sample = Sample::new_finite(alphabet, words);
        let model = dfa_rpni(&sample).unwrap();
        assert_classifies_sample(&model, &sample);
        assert_eq!(model.size(), 2);
    }

    #[test]
    fn rpni_conflicting_sample_is_reported() {
        let mut sample = sample_from(&[("ab", true)]);
        sample.negative.insert(Word::from("ab"));
        assert!(matches!(
            dfa_rpni(&sample),
            Err(LearnError::ConflictingSample { .. })
        ));
    }

    #[test]
    fn rpni_parallel_deterministic_runs_agree() {
        let mut rng = StdRng::seed_from_u64(7);
        let target = generate_random_dfa(2, 5, &mut rng);
        let alphabet = target.alphabet().clone();
        let words: Vec<(Vec<char>, bool)> = (0..120)
            .map(|_| {
                let length = rng.gen_range(0..9);
                let word: Vec<char> = (0..length)
                    .map(|_| alphabet.symbol(rng.gen_range(0..alphabet.size())))
                    .collect();
                let label = target.accepts(&word.iter().copied().collect());
                (word, label)
            })
            .collect();
        let sample = Sample::new_finite(alphabet.clone(), words);

        let learner = BlueFringeRpni::new(alphabet)
            .with_parallel(true)
            .with_deterministic(true);
        let first = learner.compute_model(&sample).unwrap();
        let second = learner.compute_model(&sample).unwrap();
        assert_eq!(first, second);

        // and the parallel result agrees with the sequential deterministic one
        let sequential = BlueFringeRpni::new(sample.alphabet.clone())
            .with_parallel(false)
            .with_deterministic(true)
            .compute_model(&sample)
            .unwrap();
        assert_eq!(first, sequential);
    }

    #[test]
    fn rpni_processing_orders_stay_sound() {
        let sample = sample_from(&[
            ("", true),
            ("a", false),
            ("ab", true),
            ("abb", false),
            ("b", true),
            ("ba", false),
        ]);
        for order in [
            ProcessingOrder::Canonical,
            ProcessingOrder::Fifo,
            ProcessingOrder::LexMin,
        ] {
            let model = BlueFringeRpni::new(sample.alphabet.clone())
                .with_processing_order(order)
                .with_parallel(false)
                .compute_model(&sample)
                .unwrap();
            assert_classifies_sample(&model, &sample);
        }
    }

    #[test]
    fn rpni_merge_decider_can_reject_everything() {
        let sample = sample_from(&[("", false), ("a", true), ("aa", false)]);
        let model = BlueFringeRpni::new(sample.alphabet.clone())
            .with_parallel(false)
            .with_merge_decider(|_| false)
            .compute_model(&sample)
            .unwrap();
        // with every merge vetoed, the result is the completed prefix tree
        assert_classifies_sample(&model, &sample);
        assert_eq!(model.size(), 4);
    }

    #[test]
    fn rpni_honors_cancellation() {
        let sample = sample_from(&[("", false), ("a", true), ("b", false)]);
        let token = CancellationToken::new();
        token.cancel();
        let result = BlueFringeRpni::new(sample.alphabet.clone())
            .with_cancellation(token)
            .compute_model(&sample);
        assert_eq!(result, Err(LearnError::Cancelled));
    }
}
