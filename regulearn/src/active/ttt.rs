use regulearn_core::prelude::*;
use tracing::{debug, trace};

use crate::acex::{AbstractCounterexample, AcexStrategy, CachedAcex};
use crate::active::dtree::{DiscriminationTree, DtNodeId, SplitData};
use crate::active::hypothesis::{
    list_collect, list_pop, list_push, list_remove, Hypothesis, StateId, TransitionId,
    TransitionTarget,
};
use crate::cancel::CancellationToken;
use crate::dfa::Dfa;
use crate::error::{LearnError, Result};
use crate::oracle::{CounterexampleQuery, EquivalenceOracle, MembershipOracle, SymbolOf};

/// A state `state` and suffix `suffix` for which the hypothesis output
/// differs from the output the oracle prescribes, namely `expected`.
#[derive(Clone, Debug)]
struct OutputInconsistency<S: Symbol> {
    state: StateId,
    suffix: Word<S>,
    expected: bool,
}

/// A candidate for finalizing the discriminator of a block: an input symbol
/// together with a final inner node separating the successors of the block's
/// states under that symbol. The encoded discriminator is the symbol followed
/// by the separator's discriminator; without a separator the states already
/// disagree on the transition property itself and the discriminator is the
/// bare symbol.
#[derive(Clone, Copy, Debug)]
struct Splitter {
    sym: usize,
    separator: Option<DtNodeId>,
}

/// The TTT learning algorithm for DFAs.
///
/// TTT maintains three structures: the hypothesis automaton whose tree
/// transitions form a spanning tree of access sequences, the discrimination
/// tree whose leaves are the hypothesis states, and the list of blocks, i.e.
/// subtrees rooted at temporary discriminators that still await
/// finalization. Counterexamples are digested through abstract counterexample
/// analysis ([`AcexStrategy`]), which decomposes them into a single state
/// split; finalization then restores the invariant that all discriminators
/// are built from an input symbol and an existing final discriminator.
///
/// ```
/// use regulearn::prelude::*;
///
/// // learn the DFA accepting every word made up only of 'a's
/// let target = DfaBuilder::new(CharAlphabet::of_size(2))
///     .with_states([true, false])
///     .with_edges([(0, 'a', 0), (0, 'b', 1), (1, 'a', 1), (1, 'b', 1)])
///     .into_dfa(0);
/// let oracle = DfaOracle::new(target);
/// let mut learner = TttLearner::new(oracle.alphabet().clone(), &oracle);
/// let learned = learner.run(&oracle).unwrap();
/// assert_eq!(learned.size(), 2);
/// ```
pub struct TttLearner<O: MembershipOracle> {
    alphabet: O::Alphabet,
    oracle: O,
    hypothesis: Hypothesis<O::Alphabet>,
    dtree: DiscriminationTree<SymbolOf<O>>,
    /// Open transitions, i.e. transitions that possibly point to an
    /// unresolved node in the discrimination tree.
    open: Option<TransitionId>,
    /// Head of the intrusive list of block roots.
    blocks: Option<DtNodeId>,
    acex_strategy: AcexStrategy,
    optimize_global_splitter: bool,
    cancellation: CancellationToken,
}

impl<O: MembershipOracle> TttLearner<O> {
    pub fn new(alphabet: O::Alphabet, oracle: O) -> Self {
        Self {
            hypothesis: Hypothesis::new(alphabet.clone()),
            dtree: DiscriminationTree::new(),
            open: None,
            blocks: None,
            acex_strategy: AcexStrategy::default(),
            optimize_global_splitter: true,
            cancellation: CancellationToken::new(),
            alphabet,
            oracle,
        }
    }

    /// Selects the strategy used to analyze counterexamples.
    pub fn with_acex_strategy(mut self, strategy: AcexStrategy) -> Self {
        self.acex_strategy = strategy;
        self
    }

    /// When disabled, discriminator finalization picks the first block that
    /// admits a splitter instead of scanning all blocks for the shortest
    /// discriminator.
    pub fn with_optimize_global_splitter(mut self, optimize: bool) -> Self {
        self.optimize_global_splitter = optimize;
        self
    }

    /// Installs a token through which the run can be cancelled cooperatively.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn alphabet(&self) -> &O::Alphabet {
        &self.alphabet
    }

    /// The discrimination tree driving the learner.
    pub fn discrimination_tree(&self) -> &DiscriminationTree<SymbolOf<O>> {
        &self.dtree
    }

    /// Initializes the hypothesis with the state reached by the empty word
    /// and resolves its outgoing transitions.
    pub fn start(&mut self) -> Result<()> {
        if self.hypothesis.is_initialized() {
            return Err(LearnError::IllegalState("start may only be called once"));
        }
        let sifted = self
            .dtree
            .sift(&self.oracle, self.dtree.root(), &Word::epsilon(), false);
        let accepting = sifted
            .root_outcome
            .expect("the root always inspects the empty suffix");
        let initial = self.hypothesis.add_initial_state(accepting);
        self.link(sifted.node, initial);
        self.initialize_state(initial);
        self.close_transitions();
        debug!(
            "started learning, initial hypothesis has {} states",
            self.hypothesis.num_states()
        );
        Ok(())
    }

    /// Refines the hypothesis with the given counterexample until it is
    /// consistent with it. Returns whether the hypothesis changed, i.e.
    /// whether the query actually was a counterexample.
    pub fn refine(&mut self, counterexample: &CounterexampleQuery<SymbolOf<O>>) -> Result<bool> {
        if !self.hypothesis.is_initialized() {
            return Err(LearnError::IllegalState("refine requires start to be called first"));
        }
        self.check_word(&counterexample.prefix)?;
        self.check_word(&counterexample.suffix)?;
        if !self.refine_single(counterexample)? {
            return Ok(false);
        }
        while self.refine_single(counterexample)? {}
        Ok(true)
    }

    /// Drives the learner to completion against the given equivalence
    /// oracle and returns the learned automaton.
    pub fn run<E>(&mut self, equivalence: &E) -> Result<Dfa<O::Alphabet>>
    where
        E: EquivalenceOracle<Alphabet = O::Alphabet>,
    {
        if !self.hypothesis.is_initialized() {
            self.start()?;
        }
        loop {
            let hypothesis = self.hypothesis_dfa();
            let Some(counterexample) = equivalence.find_counterexample(&hypothesis) else {
                debug!(
                    "hypothesis with {} states is equivalent to the target",
                    hypothesis.size()
                );
                return Ok(hypothesis);
            };
            trace!(
                "processing counterexample {} · {} with expected output {}",
                counterexample.prefix.show(),
                counterexample.suffix.show(),
                counterexample.expected.show()
            );
            if !self.refine(&counterexample)? {
                return Err(LearnError::OracleInconsistency(
                    "equivalence oracle returned a word that is not a counterexample".to_string(),
                ));
            }
        }
    }

    /// Emits the current hypothesis as a [`Dfa`]. State indices agree with
    /// the creation order of the hypothesis states, so the initial state is
    /// index 0.
    pub fn hypothesis_dfa(&self) -> Dfa<O::Alphabet> {
        let states = self
            .hypothesis
            .state_ids()
            .map(|q| {
                let successors = self
                    .hypothesis
                    .state(q)
                    .transitions
                    .iter()
                    .map(|&t| self.target_state(t).index())
                    .collect();
                (self.hypothesis.accepting(q), successors)
            })
            .collect();
        Dfa::from_parts(
            self.alphabet.clone(),
            self.hypothesis.initial().index(),
            states,
        )
    }

    /// Maps a word to the access sequence of the hypothesis state it reaches.
    pub fn transform_access_sequence(
        &mut self,
        word: &Word<SymbolOf<O>>,
    ) -> Result<Word<SymbolOf<O>>> {
        if !self.hypothesis.is_initialized() {
            return Err(LearnError::IllegalState("the learner was not started yet"));
        }
        self.check_word(word)?;
        let state = self.get_deterministic_state(self.hypothesis.initial(), word);
        Ok(self.hypothesis.access_sequence(state).clone())
    }

    fn check_word(&self, word: &Word<SymbolOf<O>>) -> Result<()> {
        for sym in word.symbols() {
            self.alphabet.index_of(sym)?;
        }
        Ok(())
    }

    fn refine_single(&mut self, ce: &CounterexampleQuery<SymbolOf<O>>) -> Result<bool> {
        self.cancellation.check()?;
        // an empty suffix part carries no room for analysis, fold the whole
        // counterexample into the suffix in that case
        let (source, suffix) = if ce.suffix.is_empty() {
            (self.hypothesis.initial(), ce.prefix.clone())
        } else {
            let reached = self.get_deterministic_state(self.hypothesis.initial(), &ce.prefix);
            (reached, ce.suffix.clone())
        };
        let output = self.compute_hypothesis_output(source, &suffix);
        if output == ce.expected {
            return Ok(false);
        }

        let mut inconsistency = OutputInconsistency {
            state: source,
            suffix,
            expected: ce.expected,
        };
        loop {
            self.split_state(&inconsistency)?;
            self.close_transitions();
            while self.finalize_any()? {
                self.close_transitions();
            }
            match self.find_output_inconsistency() {
                Some(next) => inconsistency = next,
                None => break,
            }
        }
        debug_assert!(self.dtree.all_final());
        Ok(true)
    }

    /*
     * Hypothesis maintenance.
     */

    /// Establishes the connection between a leaf of the discrimination tree
    /// and a state of the hypothesis.
    fn link(&mut self, node: DtNodeId, state: StateId) {
        self.dtree.set_state(node, state);
        self.hypothesis.state_mut(state).dt_leaf = Some(node);
    }

    /// Creates the outgoing transitions of a freshly created state, pointing
    /// at the root of the discrimination tree, and puts them on the open
    /// list.
    fn initialize_state(&mut self, state: StateId) {
        let root = self.dtree.root();
        let mut transitions = Vec::with_capacity(self.alphabet.size());
        for sym in 0..self.alphabet.size() {
            let t = self.hypothesis.add_transition(state, sym, root);
            list_push(&mut self.hypothesis.transitions, &mut self.open, t);
            transitions.push(t);
        }
        self.hypothesis.state_mut(state).transitions = transitions;
    }

    /// Promotes a non-tree transition into the spanning tree, creating the
    /// state for the leaf it points to.
    fn make_tree(&mut self, t: TransitionId) -> StateId {
        debug_assert!(!self.hypothesis.is_tree(t));
        let TransitionTarget::NonTree(node) = self.hypothesis.transition(t).target else {
            unreachable!("checked above");
        };
        debug_assert!(self.dtree.is_leaf(node));
        let accepting = self
            .dtree
            .subtree_label(self.dtree.root(), node)
            .expect("leaves always sit below the acceptance root");
        let state = self.hypothesis.create_state(t, accepting);
        list_remove(
            &mut self.hypothesis.transitions,
            self.dtree.incoming_head_mut(node),
            t,
        );
        self.hypothesis.transition_mut(t).target = TransitionTarget::Tree(state);
        self.link(node, state);
        self.initialize_state(state);
        trace!(
            "created state {:?} with access sequence {}",
            state,
            self.hypothesis.access_sequence(state).show()
        );
        state
    }

    /// The state a transition leads to. Must only be used while all
    /// transitions are closed.
    fn target_state(&self, t: TransitionId) -> StateId {
        match self.hypothesis.transition(t).target {
            TransitionTarget::Tree(state) => state,
            TransitionTarget::NonTree(node) => self
                .dtree
                .state_of(node)
                .expect("after closing, non-tree transitions point to state leaves"),
        }
    }

    /// The discrimination tree node a transition currently points to.
    fn dt_target(&self, t: TransitionId) -> DtNodeId {
        match self.hypothesis.transition(t).target {
            TransitionTarget::Tree(state) => self
                .hypothesis
                .state(state)
                .dt_leaf
                .expect("states are linked to leaves"),
            TransitionTarget::NonTree(node) => node,
        }
    }

    /// The transition's property, for a DFA the acceptance of the word it
    /// stands for. Usually this was observed when the transition first
    /// descended through the root; if not, a single membership query settles
    /// it.
    fn transition_property(&mut self, t: TransitionId) -> bool {
        match self.hypothesis.transition(t).target {
            TransitionTarget::Tree(state) => self.hypothesis.accepting(state),
            TransitionTarget::NonTree(_) => {
                if let Some(property) = self.hypothesis.transition(t).property {
                    return property;
                }
                let word = self.hypothesis.transition_word(t);
                let property = self.oracle.answer_word(&word);
                self.hypothesis.transition_mut(t).property = Some(property);
                property
            }
        }
    }

    /*
     * Closing transitions.
     */

    /// Drains the open list, sifting every transition to a resolved node.
    /// Leaves discovered without a linked state are promoted to states, the
    /// one with the shortest incoming access sequence first; this ordering is
    /// what makes state names coincide with shortest access sequences.
    fn close_transitions(&mut self) {
        let mut new_state_nodes: Vec<DtNodeId> = Vec::new();
        loop {
            while let Some(t) = list_pop(&mut self.hypothesis.transitions, &mut self.open) {
                if let Some(node) = self.close_transition(t) {
                    if !new_state_nodes.contains(&node) {
                        new_state_nodes.push(node);
                    }
                }
            }
            if new_state_nodes.is_empty() {
                break;
            }
            self.promote_shortest(&mut new_state_nodes);
        }
    }

    /// Ensures the transition points to a leaf or block root. Returns the
    /// target node if it is a fresh leaf whose only incoming transition is
    /// `t`, i.e. a candidate for a new state.
    fn close_transition(&mut self, t: TransitionId) -> Option<DtNodeId> {
        if self.hypothesis.is_tree(t) {
            return None;
        }
        let node = self.update_dt_target(t, false);
        let sole_incoming = self.hypothesis.transition(t).next.is_none();
        if self.dtree.is_leaf(node) && self.dtree.state_of(node).is_none() && sole_incoming {
            Some(node)
        } else {
            None
        }
    }

    fn promote_shortest(&mut self, candidates: &mut Vec<DtNodeId>) {
        let mut best: Option<(usize, usize, TransitionId)> = None;
        for (position, &node) in candidates.iter().enumerate() {
            debug_assert!(self.dtree.state_of(node).is_none());
            for t in list_collect(&self.hypothesis.transitions, self.dtree.node(node).incoming) {
                let source = self.hypothesis.transition(t).source;
                let length = self.hypothesis.access_sequence(source).len() + 1;
                if best.map_or(true, |(shortest, _, _)| length < shortest) {
                    best = Some((length, position, t));
                }
            }
        }
        let (_, position, transition) =
            best.expect("every candidate leaf has an incoming transition");
        candidates.swap_remove(position);
        self.make_tree(transition);
    }

    /// Re-sifts a non-tree transition from its current node. A hard update
    /// resolves all the way down to a leaf, a soft one may stop at a block
    /// root. Returns the new target node.
    fn update_dt_target(&mut self, t: TransitionId, hard: bool) -> DtNodeId {
        match self.hypothesis.transition(t).target {
            TransitionTarget::Tree(state) => self
                .hypothesis
                .state(state)
                .dt_leaf
                .expect("states are linked to leaves"),
            TransitionTarget::NonTree(node) => {
                if self.hypothesis.transition(t).in_list {
                    list_remove(
                        &mut self.hypothesis.transitions,
                        self.dtree.incoming_head_mut(node),
                        t,
                    );
                }
                let access = self.hypothesis.transition_word(t);
                let sifted = self.dtree.sift(&self.oracle, node, &access, hard);
                if let Some(out) = sifted.root_outcome {
                    let record = self.hypothesis.transition_mut(t);
                    if record.property.is_none() {
                        record.property = Some(out);
                    }
                }
                self.hypothesis.transition_mut(t).target = TransitionTarget::NonTree(sifted.node);
                list_push(
                    &mut self.hypothesis.transitions,
                    self.dtree.incoming_head_mut(sifted.node),
                    t,
                );
                sifted.node
            }
        }
    }

    /// Forces the transition to resolve to a state, sifting hard and
    /// materializing a new state if the reached leaf has none.
    fn require_successor(&mut self, t: TransitionId) -> StateId {
        if let TransitionTarget::Tree(state) = self.hypothesis.transition(t).target {
            return state;
        }
        let node = self.update_dt_target(t, true);
        match self.dtree.state_of(node) {
            Some(state) => state,
            None => {
                let state = self.make_tree(t);
                self.close_transitions();
                state
            }
        }
    }

    /*
     * Walking the (possibly nondeterministic) hypothesis.
     */

    /// The successors of a set of states under the symbol with index `sym`.
    /// A non-tree transition contributes every state in the subtree of the
    /// node it points to.
    fn nondet_successors(&self, states: &math::Set<StateId>, sym: usize) -> math::Set<StateId> {
        let mut next = math::Set::default();
        for &state in states {
            match self.hypothesis.transition(self.hypothesis.transition_of(state, sym)).target {
                TransitionTarget::Tree(target) => {
                    next.insert(target);
                }
                TransitionTarget::NonTree(node) => {
                    next.extend(self.dtree.subtree_states(node));
                }
            }
        }
        next
    }

    /// The state reached from `start` by `word`. As long as the set of
    /// possible states stays a singleton no transition is forced; once it
    /// grows, the remaining symbols are walked with [`Self::require_successor`],
    /// resolving transitions (and possibly materializing states) on demand.
    fn get_deterministic_state(&mut self, start: StateId, word: &Word<SymbolOf<O>>) -> StateId {
        let mut last_singleton = (start, 0);
        let mut current = math::Set::from_iter([start]);
        for (i, sym) in word.symbols().enumerate() {
            let index = self
                .alphabet
                .index_of(sym)
                .expect("words are validated at the boundary");
            current = self.nondet_successors(&current, index);
            if current.len() == 1 {
                last_singleton = (*current.first().expect("checked length"), i + 1);
            }
        }
        let (mut state, resolved_to) = last_singleton;
        if resolved_to == word.len() {
            return state;
        }
        for sym in word.suffix(resolved_to).symbols() {
            let index = self
                .alphabet
                .index_of(sym)
                .expect("words are validated at the boundary");
            let t = self.hypothesis.transition_of(state, index);
            state = self.require_successor(t);
        }
        state
    }

    /// The output of the hypothesis for `suffix` read from `state`,
    /// resolving transitions along the way.
    fn compute_hypothesis_output(&mut self, state: StateId, suffix: &Word<SymbolOf<O>>) -> bool {
        let mut current = state;
        for sym in suffix.symbols() {
            let index = self
                .alphabet
                .index_of(sym)
                .expect("words are validated at the boundary");
            let t = self.hypothesis.transition_of(current, index);
            current = self.require_successor(t);
        }
        self.hypothesis.accepting(current)
    }

    /*
     * Counterexample analysis.
     */

    /// Analyzes an output inconsistency and splits the state at the
    /// breakpoint, introducing a temporary discriminator.
    fn split_state(&mut self, inconsistency: &OutputInconsistency<SymbolOf<O>>) -> Result<()> {
        let source = inconsistency.state;
        let suffix = inconsistency.suffix.clone();
        let strategy = self.acex_strategy;

        let mut acex = CachedAcex::new(suffix.len(), |i| {
            let state = self.get_deterministic_state(source, &suffix.prefix(i));
            let access = self.hypothesis.access_sequence(state).clone();
            self.oracle.answer_query(&access, &suffix.suffix(i))
        })
        .with_seed(0, inconsistency.expected);
        let breakpoint = strategy.analyze(&mut acex)?;
        let old_out = acex.effect(breakpoint + 1);
        let new_out = acex.effect(breakpoint);
        debug_assert_ne!(old_out, new_out);

        let predecessor = self.get_deterministic_state(source, &suffix.prefix(breakpoint));
        let sym = suffix
            .nth(breakpoint)
            .expect("the breakpoint lies within the suffix");
        let index = self
            .alphabet
            .index_of(sym)
            .expect("words are validated at the boundary");
        let split_suffix = suffix.suffix(breakpoint + 1);
        let transition = self.hypothesis.transition_of(predecessor, index);
        trace!(
            "breakpoint {} splits {:?} under {} with suffix {}",
            breakpoint,
            predecessor,
            sym.show(),
            split_suffix.show()
        );
        self.split_transition(transition, split_suffix, old_out, new_out);
        Ok(())
    }

    /// Splits the state at the leaf a non-tree transition points to, using a
    /// temporary discriminator: the transition becomes a tree transition to a
    /// fresh state and the former leaf becomes a temporary inner node whose
    /// two children hold the old and the new state.
    fn split_transition(
        &mut self,
        t: TransitionId,
        discriminator: Word<SymbolOf<O>>,
        old_out: bool,
        new_out: bool,
    ) {
        debug_assert!(!self.hypothesis.is_tree(t));
        let TransitionTarget::NonTree(node) = self.hypothesis.transition(t).target else {
            unreachable!("checked above");
        };
        let old_state = self
            .dtree
            .state_of(node)
            .expect("split transitions point at state leaves");

        let new_state = self.make_tree(t);
        let (old_child, new_child) = self.dtree.split_leaf(node, discriminator, old_out, new_out);
        self.dtree.node_mut(node).temp = true;
        self.link(old_child, old_state);
        self.link(new_child, new_state);

        let parent = self
            .dtree
            .parent(node)
            .expect("the acceptance root is never split");
        if !self.dtree.is_temp(parent) {
            self.dtree.block_push(&mut self.blocks, node);
        }
    }

    /*
     * Discriminator finalization.
     */

    /// Searches all blocks for a splitter and finalizes the best one found.
    /// Returns whether any block was finalized.
    fn finalize_any(&mut self) -> Result<bool> {
        self.cancellation.check()?;
        let mut best: Option<(DtNodeId, Splitter, usize)> = None;
        for block in self.dtree.block_collect(self.blocks) {
            if let Some(splitter) = self.find_splitter(block) {
                let length = splitter
                    .separator
                    .map_or(0, |sep| self.dtree.discriminator(sep).len());
                if best.map_or(true, |(_, _, shortest)| length < shortest) {
                    best = Some((block, splitter, length));
                }
                if !self.optimize_global_splitter {
                    break;
                }
            }
        }
        match best {
            Some((block, splitter, _)) => {
                self.finalize_discriminator(block, splitter);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Determines a splitter for the given block. If two states of the block
    /// disagree on a transition property, that symbol alone discriminates
    /// their successors; otherwise a final inner node separating the
    /// successors is required. Heuristically the shortest resulting
    /// discriminator wins, ties fall to the smallest symbol index.
    fn find_splitter(&mut self, block: DtNodeId) -> Option<Splitter> {
        let size = self.alphabet.size();
        let states = self.dtree.subtree_states(block);
        let mut properties: Vec<Option<bool>> = vec![None; size];
        let mut lcas: Vec<Option<DtNodeId>> = vec![None; size];
        let mut first = true;
        for &state in &states {
            for sym in 0..size {
                let t = self.hypothesis.transition_of(state, sym);
                let property = self.transition_property(t);
                let target = self.dt_target(t);
                if first {
                    properties[sym] = Some(property);
                    lcas[sym] = Some(target);
                } else {
                    if properties[sym] != Some(property) {
                        return Some(Splitter {
                            sym,
                            separator: None,
                        });
                    }
                    let lca = lcas[sym].expect("recorded in the first round");
                    lcas[sym] = Some(self.dtree.least_common_ancestor(lca, target));
                }
            }
            first = false;
        }

        let mut best: Option<(usize, DtNodeId, usize)> = None;
        for (sym, lca) in lcas.into_iter().enumerate() {
            let Some(lca) = lca else { continue };
            if self.dtree.is_temp(lca) || self.dtree.is_leaf(lca) {
                continue;
            }
            let length = self.dtree.discriminator(lca).len();
            if best.map_or(true, |(_, _, shortest)| length < shortest) {
                best = Some((sym, lca, length));
            }
        }
        best.map(|(sym, separator, _)| Splitter {
            sym,
            separator: Some(separator),
        })
    }

    /// Replaces the temporary discriminator at the block root by the final
    /// one derived from the splitter and rebuilds the block's subtrees
    /// accordingly.
    fn finalize_discriminator(&mut self, block: DtNodeId, splitter: Splitter) {
        debug_assert!(self.dtree.is_temp(block));
        let symbol = self.alphabet.symbol(splitter.sym);
        let discriminator = match splitter.separator {
            Some(sep) => self.dtree.discriminator(sep).prepend(symbol),
            None => Word::singleton(symbol),
        };
        if *self.dtree.discriminator(block) != discriminator {
            trace!(
                "finalizing block {:?} with discriminator {}",
                block,
                discriminator.show()
            );
            self.prepare_split(block, splitter, &discriminator);
            let labels: Vec<bool> = [false, true]
                .into_iter()
                .filter(|&label| self.dtree.split_data(block).is_marked(label))
                .collect();
            debug_assert!(labels.len() > 1, "a splitter separates at least two states");
            let mut children = Vec::with_capacity(labels.len());
            for label in labels {
                children.push((label, self.extract_subtree(block, label)));
            }
            self.dtree.replace_children(block, children);
            self.dtree.set_discriminator(block, discriminator);
        }
        self.declare_final(block);
    }

    /// Marks all nodes of the block with the outcomes occurring in their
    /// subtrees under the new discriminator, and groups the incoming
    /// transitions of every node by their outcome.
    fn prepare_split(
        &mut self,
        block: DtNodeId,
        splitter: Splitter,
        discriminator: &Word<SymbolOf<O>>,
    ) {
        let mut stack = vec![block];
        while let Some(node) = stack.pop() {
            debug_assert!(self.dtree.node(node).split.is_none());
            self.dtree.node_mut(node).split = Some(SplitData::new());

            while let Some(t) = list_pop(
                &mut self.hypothesis.transitions,
                self.dtree.incoming_head_mut(node),
            ) {
                let word = self.hypothesis.transition_word(t);
                let outcome = self.oracle.answer_query(&word, discriminator);
                list_push(
                    &mut self.hypothesis.transitions,
                    self.dtree.split_incoming_head_mut(node, outcome),
                    t,
                );
                self.mark_and_propagate(node, outcome);
            }

            if self.dtree.is_inner(node) {
                stack.extend(self.dtree.children_of(node));
            } else {
                let state = self
                    .dtree
                    .state_of(node)
                    .expect("leaves in blocks carry a state");
                let t = self.hypothesis.transition_of(state, splitter.sym);
                let outcome = self.predict_succ_outcome(t, splitter.separator);
                self.dtree.split_data_mut(node).state_label = Some(outcome);
                self.mark_and_propagate(node, outcome);
            }
        }
    }

    /// The outcome the state behind `t` will show under the new
    /// discriminator, read off the discrimination tree without a query.
    fn predict_succ_outcome(&mut self, t: TransitionId, separator: Option<DtNodeId>) -> bool {
        match separator {
            None => self.transition_property(t),
            Some(sep) => self
                .dtree
                .subtree_label(sep, self.dt_target(t))
                .expect("the separator is an ancestor of every successor target"),
        }
    }

    /// Marks a node and propagates the label towards the block root.
    fn mark_and_propagate(&mut self, node: DtNodeId, label: bool) {
        let mut current = Some(node);
        loop {
            let Some(n) = current else { return };
            let newly_marked = match self.dtree.node_mut(n).split.as_mut() {
                Some(split) => split.mark(label),
                None => return,
            };
            if !newly_marked {
                return;
            }
            current = self.dtree.parent(n);
        }
    }

    /// Extracts the reduced subtree of all nodes of the block marked with
    /// `label` as a fresh tree: inner nodes with a single marked child are
    /// collapsed, and nodes whose mark stems only from incoming transitions
    /// receive a freshly created state.
    fn extract_subtree(&mut self, block: DtNodeId, label: bool) -> DtNodeId {
        debug_assert!(self.dtree.split_data(block).is_marked(label));
        let extracted_root = self.dtree.new_node(Some(block), Some(label));
        let mut stack = vec![(block, extracted_root)];
        while let Some((original, extracted)) = stack.pop() {
            self.move_incoming(original, label, extracted);
            if self.dtree.is_leaf(original) {
                if self.dtree.split_data(original).state_label == Some(label) {
                    let state = self
                        .dtree
                        .state_of(original)
                        .expect("leaves in blocks carry a state");
                    self.link(extracted, state);
                } else {
                    self.create_new_state(extracted);
                }
            } else {
                let marked: Vec<DtNodeId> = self
                    .dtree
                    .children_of(original)
                    .into_iter()
                    .filter(|&child| self.dtree.split_data(child).is_marked(label))
                    .collect();
                match marked.len() {
                    0 => self.create_new_state(extracted),
                    1 => stack.push((marked[0], extracted)),
                    _ => {
                        let discriminator = self.dtree.discriminator(original).clone();
                        let mut children = Vec::with_capacity(marked.len());
                        for child in marked {
                            let edge = self
                                .dtree
                                .parent_edge(child)
                                .expect("children carry edge labels");
                            let extracted_child = self.dtree.new_node(Some(extracted), Some(edge));
                            children.push((edge, extracted_child));
                            stack.push((child, extracted_child));
                        }
                        self.dtree.make_inner(extracted, discriminator, children);
                        self.dtree.node_mut(extracted).temp = true;
                    }
                }
            }
        }
        extracted_root
    }

    /// Moves the incoming transitions recorded for `label` at `original`
    /// over to the extracted node, retargeting them.
    fn move_incoming(&mut self, original: DtNodeId, label: bool, extracted: DtNodeId) {
        while let Some(t) = list_pop(
            &mut self.hypothesis.transitions,
            self.dtree.split_incoming_head_mut(original, label),
        ) {
            self.hypothesis.transition_mut(t).target = TransitionTarget::NonTree(extracted);
            list_push(
                &mut self.hypothesis.transitions,
                self.dtree.incoming_head_mut(extracted),
                t,
            );
        }
    }

    /// A node that has incoming transitions for a label but no leaf carrying
    /// that label in its subtree spawns a new state on the fly.
    fn create_new_state(&mut self, extracted: DtNodeId) {
        let transition = self
            .dtree
            .node(extracted)
            .incoming
            .expect("extracted nodes inherit at least one incoming transition");
        self.make_tree(transition);
    }

    /// Clears the temporary flag of a finalized block root, registers its
    /// non-trivial subtrees as new blocks and reopens its incoming
    /// transitions.
    fn declare_final(&mut self, block: DtNodeId) {
        self.dtree.node_mut(block).temp = false;
        self.dtree.node_mut(block).split = None;
        self.dtree.block_remove(&mut self.blocks, block);
        for child in self.dtree.children_of(block) {
            debug_assert!(self.dtree.node(child).split.is_none());
            if self.dtree.is_inner(child) {
                self.dtree.block_push(&mut self.blocks, child);
            }
        }
        while let Some(t) = list_pop(
            &mut self.hypothesis.transitions,
            self.dtree.incoming_head_mut(block),
        ) {
            list_push(&mut self.hypothesis.transitions, &mut self.open, t);
        }
    }

    /*
     * Output consistency.
     */

    /// Scans every state against the discriminators of its leaf's ancestors
    /// and returns the inconsistency with the shortest suffix, if any.
    fn find_output_inconsistency(&mut self) -> Option<OutputInconsistency<SymbolOf<O>>> {
        let mut best: Option<OutputInconsistency<SymbolOf<O>>> = None;
        let mut q = 0;
        while q < self.hypothesis.num_states() {
            let state = StateId(q as u32);
            let mut node = self
                .hypothesis
                .state(state)
                .dt_leaf
                .expect("states are linked to leaves");
            while let Some(parent) = self.dtree.parent(node) {
                let expected = self
                    .dtree
                    .parent_edge(node)
                    .expect("non-root nodes carry an edge label");
                node = parent;
                let suffix = self.dtree.discriminator(node).clone();
                if best
                    .as_ref()
                    .map_or(true, |b| suffix.len() < b.suffix.len())
                {
                    let output = self.compute_hypothesis_output(state, &suffix);
                    if output != expected {
                        best = Some(OutputInconsistency {
                            state,
                            suffix,
                            expected,
                        });
                    }
                }
            }
            q += 1;
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfa::DfaBuilder;
    use crate::oracle::{BoundedExhaustiveOracle, DfaOracle, FnOracle};
    use crate::random::generate_random_dfa;
    use itertools::Itertools;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::VecDeque;

    fn all_as() -> Dfa<CharAlphabet> {
        DfaBuilder::new(CharAlphabet::of_size(2))
            .with_states([true, false])
            .with_edges([(0, 'a', 0), (0, 'b', 1), (1, 'a', 1), (1, 'b', 1)])
            .into_dfa(0)
    }

    fn even_as() -> Dfa<CharAlphabet> {
        DfaBuilder::new(CharAlphabet::of_size(2))
            .with_states([true, false])
            .with_edges([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
            .into_dfa(0)
    }

    fn contains_abb() -> Dfa<CharAlphabet> {
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

    /// Checks the structural and semantic invariants that must hold at every
    /// counterexample boundary: states and leaves are linked bijectively,
    /// tree transitions form a spanning tree with matching access sequences,
    /// no temporary discriminators or open blocks remain, all transitions
    /// are closed, and the outputs recorded along every discrimination tree
    /// path agree with the oracle.
    fn assert_invariants<O: MembershipOracle>(learner: &TttLearner<O>) {
        let hyp = &learner.hypothesis;
        let dtree = &learner.dtree;

        assert!(dtree.all_final());
        assert!(learner.blocks.is_none());
        assert!(learner.open.is_none());

        for q in hyp.state_ids() {
            let leaf = hyp.state(q).dt_leaf.expect("state must be linked");
            assert!(dtree.is_leaf(leaf));
            assert_eq!(dtree.state_of(leaf), Some(q));

            // spanning tree: the parent chain reproduces the access sequence
            match hyp.state(q).parent {
                None => {
                    assert_eq!(q, hyp.initial());
                    assert!(hyp.access_sequence(q).is_empty());
                }
                Some(parent) => {
                    let record = hyp.transition(parent);
                    assert_eq!(record.target, TransitionTarget::Tree(q));
                    let source_access = hyp.access_sequence(record.source);
                    assert_eq!(
                        &source_access.append(learner.alphabet.symbol(record.sym)),
                        hyp.access_sequence(q)
                    );
                }
            }

            // the path from the root to the leaf encodes oracle outputs
            let access = hyp.access_sequence(q);
            let mut node = leaf;
            while let Some(parent) = dtree.parent(node) {
                let expected = dtree.parent_edge(node).unwrap();
                assert_eq!(
                    learner.oracle.answer_query(access, dtree.discriminator(parent)),
                    expected,
                    "discriminator path broken for {q:?}"
                );
                node = parent;
            }

            // all transitions closed and consistent with the oracle
            for sym in 0..learner.alphabet.size() {
                let t = hyp.transition_of(q, sym);
                if let TransitionTarget::NonTree(target) = hyp.transition(t).target {
                    assert!(dtree.is_leaf(target));
                    assert!(dtree.state_of(target).is_some());
                    let word = hyp.transition_word(t);
                    let mut node = target;
                    while let Some(parent) = dtree.parent(node) {
                        let expected = dtree.parent_edge(node).unwrap();
                        assert_eq!(
                            learner.oracle.answer_query(&word, dtree.discriminator(parent)),
                            expected,
                            "transition {t:?} points to an inconsistent node"
                        );
                        node = parent;
                    }
                }
            }
        }

        // every reachable leaf is linked to a state
        for node in dtree.subtree_nodes(dtree.root()) {
            assert!(!dtree.is_leaf(node) || dtree.state_of(node).is_some());
        }
    }

    fn learn_checked(
        target: &Dfa<CharAlphabet>,
        strategy: AcexStrategy,
    ) -> Dfa<CharAlphabet> {
        let oracle = DfaOracle::new(target.clone());
        let mut learner =
            TttLearner::new(oracle.alphabet().clone(), &oracle).with_acex_strategy(strategy);
        learner.start().unwrap();
        assert_invariants(&learner);

        let minimal = target.minimized();
        let mut rounds = 0;
        loop {
            let hypothesis = learner.hypothesis_dfa();
            let Some(ce) = oracle.find_counterexample(&hypothesis) else {
                break;
            };
            assert!(learner.refine(&ce).unwrap());
            assert_invariants(&learner);
            rounds += 1;
            assert!(
                rounds <= minimal.size(),
                "too many counterexample rounds for a {} state target",
                minimal.size()
            );
        }

        let learned = learner.hypothesis_dfa();
        assert_eq!(learned.size(), minimal.size(), "result must be minimal");
        learned
    }

    #[test]
    fn ttt_learns_all_as() {
        let learned = learn_checked(&all_as(), AcexStrategy::BinarySearch);
        assert_eq!(learned.size(), 2);
        assert!(learned.accepting(learned.initial_state()));
        let sink = learned.transition(learned.initial_state(), 'b').unwrap();
        assert!(!learned.accepting(sink));
        for sym in ['a', 'b'] {
            assert_eq!(learned.transition(sink, sym).unwrap(), sink);
        }
    }

    #[test]
    fn ttt_learns_all_as_with_bounded_oracle() {
        let membership = FnOracle::new(CharAlphabet::of_size(2), |w: &Word<char>| {
            w.symbols().all(|c| c == 'a')
        });
        let equivalence = BoundedExhaustiveOracle::new(&membership, 6);
        let mut learner = TttLearner::new(CharAlphabet::of_size(2), &membership);
        let learned = learner.run(&equivalence).unwrap();
        assert_eq!(learned.size(), 2);
        assert!(learned.accepting(learned.initial_state()));
    }

    #[test]
    fn ttt_learns_even_as_with_binary_search() {
        let target = even_as();
        let oracle = DfaOracle::new(target.clone());
        let mut learner = TttLearner::new(oracle.alphabet().clone(), &oracle)
            .with_acex_strategy(AcexStrategy::BinarySearch);
        learner.start().unwrap();

        let mut rounds = 0;
        let ce = CounterexampleQuery {
            prefix: Word::epsilon(),
            suffix: Word::from("a"),
            expected: false,
        };
        if learner.refine(&ce).unwrap() {
            rounds += 1;
        }
        while let Some(ce) = oracle.find_counterexample(&learner.hypothesis_dfa()) {
            assert!(learner.refine(&ce).unwrap());
            rounds += 1;
        }

        assert!(rounds <= 2);
        let learned = learner.hypothesis_dfa();
        assert_eq!(learned.size(), 2);
        assert!(oracle.find_counterexample(&learned).is_none());
    }

    #[test_log::test]
    fn ttt_learns_contains_abb() {
        let learned = learn_checked(&contains_abb(), AcexStrategy::BinarySearch);
        assert_eq!(learned.size(), 4);
    }

    #[test]
    fn ttt_final_discriminators_for_contains_abb() {
        let target = contains_abb();
        let oracle = DfaOracle::new(target.clone());
        let mut learner = TttLearner::new(oracle.alphabet().clone(), &oracle);
        let learned = learner.run(&oracle).unwrap();
        assert_eq!(learned.size(), 4);

        let dtree = learner.discrimination_tree();
        let discriminators = dtree.inner_discriminators();
        assert_eq!(discriminators.len(), 3);
        // the discriminators are suffixes of "abb", closed under taking
        // suffixes of each other, with the empty word at the root
        assert_eq!(dtree.discriminator(dtree.root()), &Word::epsilon());
        for d in &discriminators {
            let abb = Word::from("abb");
            assert_eq!(&abb.suffix(abb.len() - d.len()), d, "{d:?} is no suffix");
        }
    }

    #[test_log::test]
    fn ttt_learns_random_dfas() {
        let mut rng = StdRng::seed_from_u64(0xa11ce);
        let strategies = [
            AcexStrategy::LinearFwd,
            AcexStrategy::LinearBwd,
            AcexStrategy::BinarySearch,
        ];
        for case in 0..30 {
            let symbols = 2 + case % 3;
            let size = 2 + case % 11;
            let target = generate_random_dfa(symbols, size, &mut rng);
            learn_checked(&target, strategies[case % 3]);
        }
    }

    #[test]
    fn ttt_without_global_splitter_optimization() {
        let oracle = DfaOracle::new(contains_abb());
        let mut learner = TttLearner::new(oracle.alphabet().clone(), &oracle)
            .with_optimize_global_splitter(false);
        let learned = learner.run(&oracle).unwrap();
        assert_eq!(learned.size(), 4);
        assert!(oracle.find_counterexample(&learned).is_none());
    }

    #[test]
    fn ttt_access_sequences_are_shortest() {
        let target = contains_abb();
        let oracle = DfaOracle::new(target.clone());
        let mut learner = TttLearner::new(oracle.alphabet().clone(), &oracle);
        let learned = learner.run(&oracle).unwrap();

        // breadth-first distances in the learned automaton
        let mut distance = vec![usize::MAX; learned.size()];
        distance[learned.initial_state()] = 0;
        let mut queue = VecDeque::from_iter([learned.initial_state()]);
        while let Some(q) = queue.pop_front() {
            for sym in 0..learned.alphabet().size() {
                let p = learned.successor(q, sym);
                if distance[p] == usize::MAX {
                    distance[p] = distance[q] + 1;
                    queue.push_back(p);
                }
            }
        }

        for q in learner.hypothesis.state_ids() {
            assert_eq!(
                learner.hypothesis.access_sequence(q).len(),
                distance[q.index()],
                "access sequence of {q:?} is not shortest"
            );
        }
    }

    #[test]
    fn ttt_sift_is_idempotent() {
        let oracle = DfaOracle::new(contains_abb());
        let mut learner = TttLearner::new(oracle.alphabet().clone(), &oracle);
        learner.run(&oracle).unwrap();

        let shape = learner.dtree.size();
        for q in learner.hypothesis.state_ids().collect_vec() {
            let access = learner.hypothesis.access_sequence(q).clone();
            let root = learner.dtree.root();
            let first = learner.dtree.sift(&oracle, root, &access, true).node;
            let second = learner.dtree.sift(&oracle, root, &access, true).node;
            assert_eq!(first, second);
            assert_eq!(learner.hypothesis.state(q).dt_leaf, Some(first));
        }
        assert_eq!(learner.dtree.size(), shape, "sifting must not alter the tree");
    }

    #[test]
    fn ttt_transform_access_sequence() {
        let oracle = DfaOracle::new(contains_abb());
        let mut learner = TttLearner::new(oracle.alphabet().clone(), &oracle);
        learner.run(&oracle).unwrap();

        let access = learner
            .transform_access_sequence(&Word::from("babb"))
            .unwrap();
        assert_eq!(access, Word::from("abb"));
        assert_eq!(
            learner.transform_access_sequence(&Word::from("ba")).unwrap(),
            Word::from("a")
        );
    }

    #[test]
    fn ttt_rejects_illegal_states() {
        let oracle = DfaOracle::new(all_as());
        let mut learner = TttLearner::new(oracle.alphabet().clone(), &oracle);
        let ce = CounterexampleQuery::from_word(Word::from("b"), false);
        assert!(matches!(
            learner.refine(&ce),
            Err(LearnError::IllegalState(_))
        ));
        learner.start().unwrap();
        assert!(matches!(
            learner.start(),
            Err(LearnError::IllegalState(_))
        ));
    }

    #[test]
    fn ttt_rejects_foreign_symbols() {
        let oracle = DfaOracle::new(all_as());
        let mut learner = TttLearner::new(oracle.alphabet().clone(), &oracle);
        learner.start().unwrap();
        let ce = CounterexampleQuery::from_word(Word::from("xy"), false);
        assert!(matches!(
            learner.refine(&ce),
            Err(LearnError::UnknownSymbol(_))
        ));
    }

    #[test]
    fn ttt_honors_cancellation() {
        let oracle = DfaOracle::new(contains_abb());
        let token = CancellationToken::new();
        let mut learner = TttLearner::new(oracle.alphabet().clone(), &oracle)
            .with_cancellation(token.clone());
        learner.start().unwrap();
        token.cancel();
        assert_eq!(learner.run(&oracle), Err(LearnError::Cancelled));
    }
}
