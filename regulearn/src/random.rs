use rand::Rng;
use regulearn_core::prelude::*;

use crate::dfa::Dfa;

/// Generates a random complete DFA with `size` states over a [`CharAlphabet`]
/// with `symbols` letters. Transition targets and acceptance bits are drawn
/// uniformly; the result is not necessarily minimal and may contain
/// unreachable states.
pub fn generate_random_dfa<R: Rng>(symbols: usize, size: usize, rng: &mut R) -> Dfa<CharAlphabet> {
    assert!(size > 0, "a DFA needs at least one state");
    let alphabet = CharAlphabet::of_size(symbols);
    let states = (0..size)
        .map(|_| {
            (
                rng.gen_bool(0.5),
                (0..symbols).map(|_| rng.gen_range(0..size)).collect(),
            )
        })
        .collect();
    Dfa::from_parts(alphabet, 0, states)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_dfa_is_complete() {
        let mut rng = StdRng::seed_from_u64(29);
        for _ in 0..10 {
            let dfa = super::generate_random_dfa(3, 7, &mut rng);
            assert_eq!(dfa.size(), 7);
            for q in dfa.states() {
                for i in 0..3 {
                    assert!(dfa.successor(q, i) < dfa.size());
                }
            }
        }
    }
}
