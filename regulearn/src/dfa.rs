use std::collections::VecDeque;

use itertools::Itertools;
use regulearn_core::prelude::*;

/// A complete deterministic finite automaton over the alphabet `A`. States
/// are identified by indices in `0..size()`; every state carries an
/// acceptance bit and one successor per alphabet symbol.
///
/// This is the result type of both learners: the TTT learner emits its
/// hypothesis in this shape and blue-fringe RPNI emits the quotient of its
/// folded prefix tree.
#[derive(Clone)]
pub struct Dfa<A: Alphabet> {
    alphabet: A,
    initial: usize,
    states: Vec<DfaState>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct DfaState {
    accepting: bool,
    successors: Box<[usize]>,
}

impl<A: Alphabet> Dfa<A> {
    /// Assembles a DFA from its parts. The `successors` of every state must
    /// have exactly one entry per alphabet symbol.
    pub fn from_parts(
        alphabet: A,
        initial: usize,
        states: Vec<(bool, Vec<usize>)>,
    ) -> Self {
        assert!(initial < states.len(), "initial state must exist");
        let states = states
            .into_iter()
            .map(|(accepting, successors)| {
                assert_eq!(
                    successors.len(),
                    alphabet.size(),
                    "every state needs a successor per symbol"
                );
                DfaState {
                    accepting,
                    successors: successors.into_boxed_slice(),
                }
            })
            .collect();
        Self {
            alphabet,
            initial,
            states,
        }
    }

    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    /// Returns the number of states.
    pub fn size(&self) -> usize {
        self.states.len()
    }

    pub fn initial_state(&self) -> usize {
        self.initial
    }

    /// Iterates over all state indices.
    pub fn states(&self) -> impl Iterator<Item = usize> {
        0..self.states.len()
    }

    pub fn accepting(&self, state: usize) -> bool {
        self.states[state].accepting
    }

    /// The successor of `state` under the symbol with the given index.
    pub fn successor(&self, state: usize, symbol_index: usize) -> usize {
        self.states[state].successors[symbol_index]
    }

    /// The successor of `state` under `symbol`, failing if the symbol is not
    /// part of the alphabet.
    pub fn transition(
        &self,
        state: usize,
        symbol: A::Symbol,
    ) -> Result<usize, UnknownSymbolError> {
        Ok(self.successor(state, self.alphabet.index_of(symbol)?))
    }

    /// Runs `word` from the initial state and returns the reached state.
    pub fn run(&self, word: &Word<A::Symbol>) -> Result<usize, UnknownSymbolError> {
        let mut current = self.initial;
        for sym in word.symbols() {
            current = self.transition(current, sym)?;
        }
        Ok(current)
    }

    /// Returns whether the automaton accepts the given word. The word must be
    /// over the automaton's alphabet.
    pub fn accepts(&self, word: &Word<A::Symbol>) -> bool {
        let reached = self
            .run(word)
            .expect("word must be over the automaton's alphabet");
        self.accepting(reached)
    }

    /// Computes the Myhill-Nerode minimal automaton of the language of
    /// `self`: unreachable states are discarded and the remaining ones are
    /// folded with Moore's partition refinement.
    pub fn minimized(&self) -> Self {
        let reachable = self.reachable_states();
        // class 0 holds the rejecting, class 1 the accepting states
        let mut class: Vec<usize> = self
            .states
            .iter()
            .map(|s| usize::from(s.accepting))
            .collect();
        let mut count = 2;

        loop {
            let mut signatures: math::Map<(usize, Vec<usize>), usize> = math::Map::default();
            let mut next: Vec<usize> = vec![0; self.states.len()];
            for &q in &reachable {
                let signature = (
                    class[q],
                    self.states[q]
                        .successors
                        .iter()
                        .map(|&p| class[p])
                        .collect_vec(),
                );
                let fresh = signatures.len();
                next[q] = *signatures.entry(signature).or_insert(fresh);
            }
            if signatures.len() == count {
                break;
            }
            count = signatures.len();
            class = next;
        }

        let mut states = vec![(false, vec![0; self.alphabet.size()]); count];
        for &q in &reachable {
            let c = class[q];
            states[c].0 = self.states[q].accepting;
            for (i, &p) in self.states[q].successors.iter().enumerate() {
                states[c].1[i] = class[p];
            }
        }
        Self::from_parts(self.alphabet.clone(), class[self.initial], states)
    }

    fn reachable_states(&self) -> Vec<usize> {
        let mut seen = vec![false; self.states.len()];
        let mut queue = VecDeque::from_iter([self.initial]);
        seen[self.initial] = true;
        let mut order = vec![];
        while let Some(q) = queue.pop_front() {
            order.push(q);
            for &p in self.states[q].successors.iter() {
                if !seen[p] {
                    seen[p] = true;
                    queue.push_back(p);
                }
            }
        }
        order
    }
}

impl<A: Alphabet + PartialEq> PartialEq for Dfa<A> {
    fn eq(&self, other: &Self) -> bool {
        self.alphabet == other.alphabet
            && self.initial == other.initial
            && self.states == other.states
    }
}
impl<A: Alphabet + PartialEq> Eq for Dfa<A> {}

impl<A: Alphabet> std::fmt::Debug for Dfa<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "DFA over {:?} with initial state {}", self.alphabet, self.initial)?;
        for (q, state) in self.states.iter().enumerate() {
            writeln!(
                f,
                "  {}{} -> [{}]",
                if state.accepting { "+" } else { "-" },
                q,
                state.successors.iter().join(", ")
            )?;
        }
        Ok(())
    }
}

/// Builder for assembling small automata by listing edges, mainly used in
/// tests and examples.
///
/// # Example
/// ```
/// use regulearn::prelude::*;
///
/// // a DFA accepting all words consisting only of 'a's
/// let dfa = DfaBuilder::new(CharAlphabet::of_size(2))
///     .with_states([true, false])
///     .with_edges([(0, 'a', 0), (0, 'b', 1), (1, 'a', 1), (1, 'b', 1)])
///     .into_dfa(0);
/// assert!(dfa.accepts(&Word::from("aaa")));
/// assert!(!dfa.accepts(&Word::from("ab")));
/// ```
pub struct DfaBuilder<A: Alphabet> {
    alphabet: A,
    accepting: Vec<bool>,
    edges: Vec<(usize, A::Symbol, usize)>,
}

impl<A: Alphabet> DfaBuilder<A> {
    pub fn new(alphabet: A) -> Self {
        Self {
            alphabet,
            accepting: vec![],
            edges: vec![],
        }
    }

    pub fn with_states<I: IntoIterator<Item = bool>>(mut self, accepting: I) -> Self {
        self.accepting.extend(accepting);
        self
    }

    pub fn with_edges<I: IntoIterator<Item = (usize, A::Symbol, usize)>>(
        mut self,
        edges: I,
    ) -> Self {
        self.edges.extend(edges);
        self
    }

    /// Builds the automaton. Panics if a transition is missing or duplicated,
    /// the result must be a complete DFA.
    pub fn into_dfa(self, initial: usize) -> Dfa<A> {
        let size = self.accepting.len();
        let mut successors = vec![vec![usize::MAX; self.alphabet.size()]; size];
        for (source, sym, target) in self.edges {
            let i = self
                .alphabet
                .index_of(sym)
                .expect("edge symbol must be part of the alphabet");
            assert!(source < size && target < size, "edge endpoints must exist");
            assert_eq!(
                successors[source][i],
                usize::MAX,
                "duplicate transition from state {source}"
            );
            successors[source][i] = target;
        }
        let states = self
            .accepting
            .into_iter()
            .zip(successors)
            .inspect(|(_, succ)| {
                assert!(
                    succ.iter().all(|&t| t != usize::MAX),
                    "every state needs a transition for every symbol"
                )
            })
            .collect();
        Dfa::from_parts(self.alphabet, initial, states)
    }
}

#[cfg(test)]
mod tests {
    use super::DfaBuilder;
    use regulearn_core::prelude::*;

    fn contains_abb() -> super::Dfa<CharAlphabet> {
        DfaBuilder::new(CharAlphabet::of_size(2))
            .with_states([false, false, false, true])
            .with_edges([
                (0, 'a', 1),
                (0, 'b', 0),
                (1, 'a', 1),
                (1, 'b', 2),
                (2, 'a', 1),
                (2, 'b', 3),
                (3, 'a', 3),
                (3, 'b', 3),
            ])
            .into_dfa(0)
    }

    #[test]
    fn dfa_runs() {
        let dfa = contains_abb();
        assert!(dfa.accepts(&Word::from("abb")));
        assert!(dfa.accepts(&Word::from("babba")));
        assert!(!dfa.accepts(&Word::from("abab")));
        assert!(!dfa.accepts(&Word::epsilon()));
    }

    #[test]
    fn dfa_minimization_folds_equivalent_states() {
        // two redundant copies of the accepting sink
        let dfa = DfaBuilder::new(CharAlphabet::of_size(2))
            .with_states([true, true, true])
            .with_edges([
                (0, 'a', 1),
                (0, 'b', 2),
                (1, 'a', 1),
                (1, 'b', 2),
                (2, 'a', 1),
                (2, 'b', 2),
            ])
            .into_dfa(0);
        assert_eq!(dfa.minimized().size(), 1);
    }

    #[test]
    fn dfa_minimization_drops_unreachable_states() {
        let dfa = DfaBuilder::new(CharAlphabet::of_size(1))
            .with_states([true, false, true])
            .with_edges([(0, 'a', 0), (1, 'a', 2), (2, 'a', 1)])
            .into_dfa(0);
        assert_eq!(dfa.minimized().size(), 1);
    }

    #[test]
    fn dfa_minimization_is_stable_on_minimal_input() {
        let dfa = contains_abb();
        assert_eq!(dfa.minimized().size(), 4);
    }
}
