use either::Either;
use itertools::Itertools;
use regulearn_core::prelude::*;

/// Represents a finite sample, which is a pair of positive and negative
/// instances.
#[derive(Clone, Eq, PartialEq)]
pub struct Sample<A: Alphabet> {
    pub alphabet: A,
    pub positive: math::Set<Word<A::Symbol>>,
    pub negative: math::Set<Word<A::Symbol>>,
}

impl<A: Alphabet> Sample<A> {
    /// Create a new empty sample for the given alphabet.
    pub fn new_for_alphabet(alphabet: A) -> Self {
        Self {
            alphabet,
            positive: math::Set::default(),
            negative: math::Set::default(),
        }
    }

    /// Create a new sample of finite words from the given alphabet and
    /// iterator over annotated words. The words are given as pairs of a
    /// symbol iterator and the classification of the word.
    pub fn new_finite<I: IntoIterator<Item = A::Symbol>, J: IntoIterator<Item = (I, bool)>>(
        alphabet: A,
        words: J,
    ) -> Self {
        let (positive, negative) = words.into_iter().partition_map(|(word, classified)| {
            if classified {
                Either::Left(word.into_iter().collect())
            } else {
                Either::Right(word.into_iter().collect())
            }
        });
        Self {
            alphabet,
            positive,
            negative,
        }
    }

    pub fn count_words(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    /// Gives an iterator over all positive words in the sample.
    pub fn positive_words(&self) -> impl Iterator<Item = &'_ Word<A::Symbol>> + '_ {
        self.positive.iter()
    }

    /// Gives an iterator over all negative words in the sample.
    pub fn negative_words(&self) -> impl Iterator<Item = &'_ Word<A::Symbol>> + '_ {
        self.negative.iter()
    }

    /// Iterates over all words of the sample together with their labels.
    pub fn entries(&self) -> impl Iterator<Item = (&'_ Word<A::Symbol>, bool)> + '_ {
        self.positive
            .iter()
            .map(|w| (w, true))
            .chain(self.negative.iter().map(|w| (w, false)))
    }

    /// The label the sample assigns to the given word, if any.
    pub fn classify(&self, word: &Word<A::Symbol>) -> Option<bool> {
        if self.positive.contains(word) {
            Some(true)
        } else if self.negative.contains(word) {
            Some(false)
        } else {
            None
        }
    }

    /// Returns the maximum length of any word in the sample. Gives back `0`
    /// if no word exists in the sample.
    pub fn max_word_len(&self) -> usize {
        self.entries().map(|(w, _)| w.len()).max().unwrap_or(0)
    }
}

impl<A: Alphabet> std::fmt::Debug for Sample<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sample with {} positive and {} negative words",
            self.positive.len(),
            self.negative.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Sample;
    use regulearn_core::prelude::*;

    #[test]
    fn sample_partitions_words() {
        let sample = Sample::new_finite(
            CharAlphabet::of_size(2),
            [("ab".chars(), true), ("b".chars(), false), ("".chars(), false)],
        );
        assert_eq!(sample.count_words(), 3);
        assert_eq!(sample.positive_words().count(), 1);
        assert_eq!(sample.classify(&Word::from("ab")), Some(true));
        assert_eq!(sample.classify(&Word::epsilon()), Some(false));
        assert_eq!(sample.classify(&Word::from("a")), None);
        assert_eq!(sample.max_word_len(), 2);
    }
}
