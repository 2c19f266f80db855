use std::collections::VecDeque;

use regulearn_core::prelude::*;

use crate::dfa::Dfa;

/// Convenience alias for the symbol type an oracle speaks.
pub type SymbolOf<O> = <<O as MembershipOracle>::Alphabet as Alphabet>::Symbol;

/// A counterexample as handed out by an [`EquivalenceOracle`]: the
/// concatenation `prefix · suffix` is classified as `expected` by the target
/// language, while the hypothesis disagrees.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CounterexampleQuery<S: Symbol> {
    pub prefix: Word<S>,
    pub suffix: Word<S>,
    pub expected: bool,
}

impl<S: Symbol> CounterexampleQuery<S> {
    /// A counterexample with an empty prefix part.
    pub fn from_word(word: Word<S>, expected: bool) -> Self {
        Self {
            prefix: Word::epsilon(),
            suffix: word,
            expected,
        }
    }
}

/// A minimally adequate teacher for active learning of regular languages. It
/// answers membership queries which are posed as a pair of prefix and suffix.
///
/// Implementations must be deterministic (the same word receives the same
/// answer throughout a learning run) and total over all words of the
/// alphabet. Answers are taken through `&self` so a shared oracle can be
/// consulted from concurrent scans without further ceremony.
pub trait MembershipOracle {
    type Alphabet: Alphabet;

    fn alphabet(&self) -> &Self::Alphabet;

    /// Classifies the concatenation of `prefix` and `suffix`.
    fn answer_query(&self, prefix: &Word<SymbolOf<Self>>, suffix: &Word<SymbolOf<Self>>) -> bool;

    /// Classifies a single word, equivalent to a query with empty suffix.
    fn answer_word(&self, word: &Word<SymbolOf<Self>>) -> bool {
        self.answer_query(word, &Word::epsilon())
    }
}

impl<O: MembershipOracle> MembershipOracle for &O {
    type Alphabet = O::Alphabet;
    fn alphabet(&self) -> &Self::Alphabet {
        O::alphabet(self)
    }
    fn answer_query(&self, prefix: &Word<SymbolOf<Self>>, suffix: &Word<SymbolOf<Self>>) -> bool {
        O::answer_query(self, prefix, suffix)
    }
}

/// The second half of a minimally adequate teacher: decides whether a
/// hypothesis is equivalent to the target language and provides a
/// counterexample if it is not.
pub trait EquivalenceOracle {
    type Alphabet: Alphabet;

    /// Returns a counterexample on which `hypothesis` and the target
    /// disagree, or `None` if the two are equivalent.
    fn find_counterexample(
        &self,
        hypothesis: &Dfa<Self::Alphabet>,
    ) -> Option<CounterexampleQuery<<Self::Alphabet as Alphabet>::Symbol>>;
}

/// An oracle backed by a target [`Dfa`]. Membership queries run the word
/// through the automaton; equivalence queries explore the product of target
/// and hypothesis breadth-first, so a returned counterexample is one of
/// minimal length.
#[derive(Debug, Clone)]
pub struct DfaOracle<A: Alphabet> {
    target: Dfa<A>,
}

impl<A: Alphabet> DfaOracle<A> {
    pub fn new(target: Dfa<A>) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &Dfa<A> {
        &self.target
    }
}

impl<A: Alphabet> MembershipOracle for DfaOracle<A> {
    type Alphabet = A;

    fn alphabet(&self) -> &A {
        self.target.alphabet()
    }

    fn answer_query(&self, prefix: &Word<A::Symbol>, suffix: &Word<A::Symbol>) -> bool {
        self.target.accepts(&prefix.concat(suffix))
    }
}

impl<A: Alphabet> EquivalenceOracle for DfaOracle<A> {
    type Alphabet = A;

    fn find_counterexample(
        &self,
        hypothesis: &Dfa<A>,
    ) -> Option<CounterexampleQuery<A::Symbol>> {
        let alphabet = self.target.alphabet();
        let mut seen = math::Set::default();
        let mut queue = VecDeque::new();

        let start = (self.target.initial_state(), hypothesis.initial_state());
        seen.insert(start);
        queue.push_back((start, Word::epsilon()));

        while let Some(((t, h), access)) = queue.pop_front() {
            if self.target.accepting(t) != hypothesis.accepting(h) {
                return Some(CounterexampleQuery::from_word(
                    access,
                    self.target.accepting(t),
                ));
            }
            for i in 0..alphabet.size() {
                let next = (self.target.successor(t, i), hypothesis.successor(h, i));
                if seen.insert(next) {
                    queue.push_back((next, access.append(alphabet.symbol(i))));
                }
            }
        }
        None
    }
}

/// A membership oracle defined by a plain classification function, handy for
/// specifying target languages directly.
#[derive(Debug, Clone)]
pub struct FnOracle<A: Alphabet, F> {
    alphabet: A,
    classify: F,
}

impl<A: Alphabet, F: Fn(&Word<A::Symbol>) -> bool> FnOracle<A, F> {
    pub fn new(alphabet: A, classify: F) -> Self {
        Self { alphabet, classify }
    }
}

impl<A: Alphabet, F: Fn(&Word<A::Symbol>) -> bool> MembershipOracle for FnOracle<A, F> {
    type Alphabet = A;

    fn alphabet(&self) -> &A {
        &self.alphabet
    }

    fn answer_query(&self, prefix: &Word<A::Symbol>, suffix: &Word<A::Symbol>) -> bool {
        (self.classify)(&prefix.concat(suffix))
    }
}

/// An equivalence oracle that compares the hypothesis against a membership
/// oracle on every word up to a fixed depth, in breadth-first order. Complete
/// only for targets whose shortest counterexamples fit into the depth bound,
/// which makes it a good fit for tests and small experiments.
#[derive(Debug, Clone)]
pub struct BoundedExhaustiveOracle<O> {
    oracle: O,
    depth: usize,
}

impl<O: MembershipOracle> BoundedExhaustiveOracle<O> {
    pub fn new(oracle: O, depth: usize) -> Self {
        Self { oracle, depth }
    }
}

impl<O: MembershipOracle> EquivalenceOracle for BoundedExhaustiveOracle<O> {
    type Alphabet = O::Alphabet;

    fn find_counterexample(
        &self,
        hypothesis: &Dfa<O::Alphabet>,
    ) -> Option<CounterexampleQuery<SymbolOf<O>>> {
        let alphabet = self.oracle.alphabet();
        let mut queue = VecDeque::from_iter([Word::epsilon()]);
        while let Some(word) = queue.pop_front() {
            let expected = self.oracle.answer_word(&word);
            if hypothesis.accepts(&word) != expected {
                return Some(CounterexampleQuery::from_word(word, expected));
            }
            if word.len() < self.depth {
                for sym in alphabet.universe() {
                    queue.push_back(word.append(sym));
                }
            }
        }
        None
    }
}
