use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use regulearn_core::prelude::*;

use crate::dfa::Dfa;
use crate::error::{LearnError, Result};

/// Colors of the blue-fringe scheme: red states are confirmed states of the
/// result, blue states are the immediate non-red successors of red states
/// and candidates for merging, everything else is white.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PtaColor {
    White,
    Blue,
    Red,
}

/// The order in which blue transitions are taken off the worklist.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum ProcessingOrder {
    /// Shortest access sequence first, ties broken lexicographically.
    #[default]
    Canonical,
    /// First discovered, first processed.
    Fifo,
    /// Lexicographically smallest access sequence first.
    LexMin,
}

#[derive(Clone, Eq, PartialEq)]
struct OrderedEntry<S: Symbol> {
    length: usize,
    access: Word<S>,
    transition: (usize, usize),
}

impl<S: Symbol> PartialOrd for OrderedEntry<S> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: Symbol> Ord for OrderedEntry<S> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.length
            .cmp(&other.length)
            .then_with(|| self.access.cmp(&other.access))
            .then_with(|| self.transition.cmp(&other.transition))
    }
}

/// Worklist of blue transitions, parameterized by a [`ProcessingOrder`].
pub(crate) enum Worklist<S: Symbol> {
    Fifo(VecDeque<(usize, usize)>),
    Ordered {
        heap: BinaryHeap<Reverse<OrderedEntry<S>>>,
        by_length: bool,
    },
}

impl<S: Symbol> Worklist<S> {
    pub(crate) fn new(order: ProcessingOrder) -> Self {
        match order {
            ProcessingOrder::Fifo => Self::Fifo(VecDeque::new()),
            ProcessingOrder::Canonical => Self::Ordered {
                heap: BinaryHeap::new(),
                by_length: true,
            },
            ProcessingOrder::LexMin => Self::Ordered {
                heap: BinaryHeap::new(),
                by_length: false,
            },
        }
    }

    pub(crate) fn push(&mut self, transition: (usize, usize), access: Word<S>) {
        match self {
            Self::Fifo(queue) => queue.push_back(transition),
            Self::Ordered { heap, by_length } => heap.push(Reverse(OrderedEntry {
                length: if *by_length { access.len() } else { 0 },
                access,
                transition,
            })),
        }
    }

    pub(crate) fn pop(&mut self) -> Option<(usize, usize)> {
        match self {
            Self::Fifo(queue) => queue.pop_front(),
            Self::Ordered { heap, .. } => heap.pop().map(|Reverse(entry)| entry.transition),
        }
    }
}

#[derive(Clone, Debug)]
struct PtaState {
    label: Option<bool>,
    children: Box<[Option<usize>]>,
    parent: Option<(usize, usize)>,
    color: PtaColor,
}

/// A prefix tree acceptor with red/blue coloring, the working structure of
/// blue-fringe RPNI. States are indices into an arena; states folded away by
/// merges simply become unreachable, their representative absorbs them.
pub struct BlueFringePta<A: Alphabet> {
    alphabet: A,
    states: Vec<PtaState>,
    red: Vec<usize>,
}

impl<A: Alphabet> BlueFringePta<A> {
    pub fn new(alphabet: A) -> Self {
        let root = PtaState {
            label: None,
            children: vec![None; alphabet.size()].into_boxed_slice(),
            parent: None,
            color: PtaColor::White,
        };
        Self {
            alphabet,
            states: vec![root],
            red: Vec::new(),
        }
    }

    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    pub fn size(&self) -> usize {
        self.states.len()
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn color(&self, state: usize) -> PtaColor {
        self.states[state].color
    }

    pub fn label(&self, state: usize) -> Option<bool> {
        self.states[state].label
    }

    pub fn child(&self, state: usize, sym: usize) -> Option<usize> {
        self.states[state].children[sym]
    }

    /// The red states, in promotion order.
    pub fn red_states(&self) -> &[usize] {
        &self.red
    }

    fn new_state(&mut self, parent: usize, sym: usize) -> usize {
        let id = self.states.len();
        self.states.push(PtaState {
            label: None,
            children: vec![None; self.alphabet.size()].into_boxed_slice(),
            parent: Some((parent, sym)),
            color: PtaColor::White,
        });
        self.states[parent].children[sym] = Some(id);
        id
    }

    /// Inserts a labeled sample word, creating states for the missing
    /// prefixes. Fails when a previously inserted sample prescribes a
    /// different label for the same word.
    pub fn insert(&mut self, word: &Word<A::Symbol>, label: bool) -> Result<()> {
        let mut current = self.root();
        for sym in word.symbols() {
            let index = self.alphabet.index_of(sym)?;
            current = match self.states[current].children[index] {
                Some(next) => next,
                None => self.new_state(current, index),
            };
        }
        match self.states[current].label {
            Some(existing) if existing != label => Err(LearnError::ConflictingSample {
                word: word.show(),
                existing,
            }),
            _ => {
                self.states[current].label = Some(label);
                Ok(())
            }
        }
    }

    /// The access sequence of a state, read off the parent pointers.
    pub fn access_word(&self, state: usize) -> Word<A::Symbol> {
        let mut symbols = Vec::new();
        let mut current = state;
        while let Some((parent, sym)) = self.states[current].parent {
            symbols.push(self.alphabet.symbol(sym));
            current = parent;
        }
        symbols.reverse();
        symbols.into()
    }

    /// Colors the root red and its successors blue, seeding the worklist.
    pub(crate) fn init(&mut self, worklist: &mut Worklist<A::Symbol>) {
        debug_assert!(self.red.is_empty());
        let root = self.root();
        self.states[root].color = PtaColor::Red;
        self.red.push(root);
        self.extend_fringe(root, worklist);
    }

    /// Turns the blue state `state` red and pushes its immediate non-red
    /// successors onto the blue fringe.
    pub(crate) fn promote(&mut self, state: usize, worklist: &mut Worklist<A::Symbol>) {
        debug_assert_eq!(self.states[state].color, PtaColor::Blue);
        self.states[state].color = PtaColor::Red;
        self.red.push(state);
        self.extend_fringe(state, worklist);
    }

    fn extend_fringe(&mut self, red: usize, worklist: &mut Worklist<A::Symbol>) {
        let access = self.access_word(red);
        for sym in 0..self.alphabet.size() {
            if let Some(child) = self.states[red].children[sym] {
                if self.states[child].color != PtaColor::Red {
                    self.states[child].color = PtaColor::Blue;
                    worklist.push((red, sym), access.append(self.alphabet.symbol(sym)));
                }
            }
        }
    }

    /// Attempts to merge the blue state `blue` into the red state `red`,
    /// propagating the identification through shared transitions to keep the
    /// automaton deterministic. Nothing is mutated: the computed fold is
    /// staged in the returned [`RedBlueMerge`] and only hits the PTA when
    /// [`RedBlueMerge::apply`] commits it. Returns `None` when two
    /// identified states carry conflicting labels.
    pub fn try_merge(&self, red: usize, blue: usize) -> Option<RedBlueMerge> {
        debug_assert_eq!(self.states[red].color, PtaColor::Red);
        debug_assert_eq!(self.states[blue].color, PtaColor::Blue);

        let mut merge = RedBlueMerge {
            red,
            blue,
            merged: math::Map::default(),
            staged_transitions: math::Map::default(),
            staged_labels: math::Map::default(),
        };
        let mut stack = vec![(red, blue)];
        while let Some((into, tree)) = stack.pop() {
            merge.merged.insert(tree, into);
            if let Some(label) = self.states[tree].label {
                let current = merge
                    .staged_labels
                    .get(&into)
                    .copied()
                    .or(self.states[into].label);
                match current {
                    Some(existing) if existing != label => return None,
                    Some(_) => {}
                    None => {
                        merge.staged_labels.insert(into, label);
                    }
                }
            }
            for sym in 0..self.alphabet.size() {
                let Some(tree_child) = self.states[tree].children[sym] else {
                    continue;
                };
                let existing = merge
                    .staged_transitions
                    .get(&(into, sym))
                    .copied()
                    .or(self.states[into].children[sym]);
                match existing {
                    Some(target) => stack.push((target, tree_child)),
                    None => {
                        merge.staged_transitions.insert((into, sym), tree_child);
                    }
                }
            }
        }
        Some(merge)
    }

    /// Emits the quotient automaton: the part of the PTA reachable from the
    /// root, completed with a rejecting sink for the transitions the sample
    /// never exercised. Unlabeled states default to rejecting.
    pub fn quotient(&self) -> Dfa<A> {
        let mut index: math::Map<usize, usize> = math::Map::default();
        let mut order = Vec::new();
        let mut queue = VecDeque::from_iter([self.root()]);
        index.insert(self.root(), 0);
        order.push(self.root());
        while let Some(state) = queue.pop_front() {
            for sym in 0..self.alphabet.size() {
                if let Some(child) = self.states[state].children[sym] {
                    if !index.contains_key(&child) {
                        index.insert(child, order.len());
                        order.push(child);
                        queue.push_back(child);
                    }
                }
            }
        }

        let sink = order.len();
        let mut incomplete = false;
        let mut states: Vec<(bool, Vec<usize>)> = order
            .iter()
            .map(|&state| {
                let successors = (0..self.alphabet.size())
                    .map(|sym| match self.states[state].children[sym] {
                        Some(child) => index[&child],
                        None => {
                            incomplete = true;
                            sink
                        }
                    })
                    .collect();
                (self.states[state].label.unwrap_or(false), successors)
            })
            .collect();
        if incomplete {
            states.push((false, vec![sink; self.alphabet.size()]));
        }
        Dfa::from_parts(self.alphabet.clone(), 0, states)
    }
}

/// A staged fold of a blue state into a red state. Records which tree states
/// are identified with which representatives, the transitions that must be
/// retargeted and the labels that propagate, without touching the PTA.
pub struct RedBlueMerge {
    red: usize,
    blue: usize,
    merged: math::Map<usize, usize>,
    pub(crate) staged_transitions: math::Map<(usize, usize), usize>,
    staged_labels: math::Map<usize, bool>,
}

impl RedBlueMerge {
    pub fn red(&self) -> usize {
        self.red
    }

    pub fn blue(&self) -> usize {
        self.blue
    }

    /// How many states the fold removes from the automaton.
    pub fn folded_states(&self) -> usize {
        self.merged.len()
    }

    /// Commits the staged fold: the parent transition of the blue state is
    /// redirected to the red state, staged transitions and labels are
    /// written back, and tree states that thereby became successors of a red
    /// state join the blue fringe.
    pub(crate) fn apply<A: Alphabet>(
        self,
        pta: &mut BlueFringePta<A>,
        worklist: &mut Worklist<A::Symbol>,
    ) {
        let (parent, parent_sym) = pta.states[self.blue]
            .parent
            .expect("blue states hang below a red state");
        pta.states[parent].children[parent_sym] = Some(self.red);

        for (&(source, sym), &target) in &self.staged_transitions {
            pta.states[source].children[sym] = Some(target);
            pta.states[target].parent = Some((source, sym));
        }
        for (&state, &label) in &self.staged_labels {
            pta.states[state].label = Some(label);
        }

        for (&(source, sym), &target) in &self.staged_transitions {
            if pta.states[source].color == PtaColor::Red
                && pta.states[target].color != PtaColor::Red
            {
                pta.states[target].color = PtaColor::Blue;
                let access = pta.access_word(source).append(pta.alphabet.symbol(sym));
                worklist.push((source, sym), access);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BlueFringePta, ProcessingOrder, PtaColor, Worklist};
    use crate::error::LearnError;
    use regulearn_core::prelude::*;

    fn pta_from(samples: &[(&str, bool)]) -> BlueFringePta<CharAlphabet> {
        let mut pta = BlueFringePta::new(CharAlphabet::of_size(2));
        for (word, label) in samples {
            pta.insert(&Word::from(*word), *label).unwrap();
        }
        pta
    }

    #[test]
    fn pta_insert_and_conflicts() {
        let mut pta = pta_from(&[("", false), ("a", true), ("ab", false)]);
        assert_eq!(pta.size(), 3);
        assert_eq!(pta.label(pta.root()), Some(false));
        assert!(matches!(
            pta.insert(&Word::from("a"), false),
            Err(LearnError::ConflictingSample { .. })
        ));
        // re-inserting with the recorded label is fine
        assert!(pta.insert(&Word::from("a"), true).is_ok());
    }

    #[test]
    fn canonical_worklist_orders_by_length_then_lexicographically() {
        let mut worklist: Worklist<char> = Worklist::new(ProcessingOrder::Canonical);
        worklist.push((0, 1), Word::from("b"));
        worklist.push((1, 0), Word::from("ba"));
        worklist.push((0, 0), Word::from("a"));
        worklist.push((2, 0), Word::from("aa"));
        assert_eq!(worklist.pop(), Some((0, 0)));
        assert_eq!(worklist.pop(), Some((0, 1)));
        assert_eq!(worklist.pop(), Some((2, 0)));
        assert_eq!(worklist.pop(), Some((1, 0)));
        assert_eq!(worklist.pop(), None);
    }

    #[test]
    fn merge_fails_on_conflicting_labels() {
        let mut pta = pta_from(&[("", false), ("a", true)]);
        let mut worklist = Worklist::new(ProcessingOrder::Canonical);
        pta.init(&mut worklist);
        let blue = pta.child(pta.root(), 0).unwrap();
        assert_eq!(pta.color(blue), PtaColor::Blue);
        assert!(pta.try_merge(pta.root(), blue).is_none());
    }

    #[test]
    fn merge_stages_without_touching_red_transitions() {
        // root -a-> A(+), root -b-> B(-), B -a-> BA(+)
        let mut pta = pta_from(&[("a", true), ("b", false), ("ba", true), ("", false)]);
        let mut worklist = Worklist::new(ProcessingOrder::Canonical);
        pta.init(&mut worklist);

        let blue_b = pta.child(pta.root(), 1).unwrap();
        let merge = pta
            .try_merge(pta.root(), blue_b)
            .expect("identifying b with the root is consistent with the sample");
        // the fold of B into the root runs into root -a-> A and must fold
        // BA into A rather than staging anything over the red transition
        assert!(!merge.staged_transitions.contains_key(&(pta.root(), 0)));
        assert!(merge.folded_states() >= 2);

        // committing keeps the automaton deterministic and label-consistent
        merge.apply(&mut pta, &mut worklist);
        assert_eq!(pta.child(pta.root(), 1), Some(pta.root()));
    }

    #[test]
    fn quotient_completes_with_rejecting_sink() {
        let mut pta = pta_from(&[("a", true)]);
        let mut worklist = Worklist::new(ProcessingOrder::Canonical);
        pta.init(&mut worklist);
        let dfa = pta.quotient();
        // root, the 'a' state and the sink
        assert_eq!(dfa.size(), 3);
        assert!(dfa.accepts(&Word::from("a")));
        assert!(!dfa.accepts(&Word::from("ab")));
        assert!(!dfa.accepts(&Word::from("b")));
    }
}
