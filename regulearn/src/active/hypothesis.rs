use regulearn_core::prelude::*;

use crate::active::dtree::DtNodeId;

/// Stable handle of a hypothesis state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) u32);

impl StateId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "q{}", self.0)
    }
}

impl Show for StateId {
    fn show(&self) -> String {
        format!("q{}", self.0)
    }
}

/// Stable handle of a hypothesis transition.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionId(pub(crate) u32);

impl TransitionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for TransitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Where a transition currently leads. Tree transitions point to a state and
/// together form a spanning tree of the hypothesis, rooted in the initial
/// state. A non-tree transition points to a node of the discrimination tree,
/// an ancestor of the leaf of its actual target state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TransitionTarget {
    Tree(StateId),
    NonTree(DtNodeId),
}

pub(crate) struct HypState<S: Symbol> {
    pub(crate) access: Word<S>,
    pub(crate) transitions: Vec<TransitionId>,
    pub(crate) dt_leaf: Option<DtNodeId>,
    pub(crate) accepting: bool,
    pub(crate) parent: Option<TransitionId>,
}

pub(crate) struct HypTransition {
    pub(crate) source: StateId,
    pub(crate) sym: usize,
    pub(crate) target: TransitionTarget,
    /// The acceptance of the word `access(source) · sym`, recorded the first
    /// time the transition descends through the root of the discrimination
    /// tree.
    pub(crate) property: Option<bool>,
    pub(crate) prev: Option<TransitionId>,
    pub(crate) next: Option<TransitionId>,
    pub(crate) in_list: bool,
}

/// The mutable automaton underlying the TTT learner. States and transitions
/// live in growable arenas and reference each other through [`StateId`] and
/// [`TransitionId`] handles; the intrusive list links threading the
/// transitions (incoming lists of discrimination tree nodes and the open
/// transitions queue) are stored inline in the transition records.
pub struct Hypothesis<A: Alphabet> {
    alphabet: A,
    pub(crate) states: Vec<HypState<A::Symbol>>,
    pub(crate) transitions: Vec<HypTransition>,
    initial: Option<StateId>,
}

impl<A: Alphabet> Hypothesis<A> {
    pub fn new(alphabet: A) -> Self {
        Self {
            alphabet,
            states: Vec::new(),
            transitions: Vec::new(),
            initial: None,
        }
    }

    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    pub fn is_initialized(&self) -> bool {
        self.initial.is_some()
    }

    /// The initial state. Panics when called before the hypothesis was
    /// initialized.
    pub fn initial(&self) -> StateId {
        self.initial.expect("hypothesis must be initialized")
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn state_ids(&self) -> impl Iterator<Item = StateId> {
        (0..self.states.len() as u32).map(StateId)
    }

    /// Creates the initial state, which has an empty access sequence and no
    /// incoming tree transition.
    pub(crate) fn add_initial_state(&mut self, accepting: bool) -> StateId {
        debug_assert!(self.initial.is_none());
        let id = self.push_state(Word::epsilon(), accepting, None);
        self.initial = Some(id);
        id
    }

    /// Creates a state below the source of `parent`, which will be installed
    /// as the tree transition leading to it. The access sequence is derived
    /// as `access(source) · sym`.
    pub(crate) fn create_state(&mut self, parent: TransitionId, accepting: bool) -> StateId {
        let record = &self.transitions[parent.index()];
        let access = self.states[record.source.index()]
            .access
            .append(self.alphabet.symbol(record.sym));
        self.push_state(access, accepting, Some(parent))
    }

    fn push_state(
        &mut self,
        access: Word<A::Symbol>,
        accepting: bool,
        parent: Option<TransitionId>,
    ) -> StateId {
        let id = StateId(self.states.len() as u32);
        self.states.push(HypState {
            access,
            transitions: Vec::new(),
            dt_leaf: None,
            accepting,
            parent,
        });
        id
    }

    /// Creates a fresh non-tree transition pointing at the given node of the
    /// discrimination tree. The transition is not put on any list.
    pub(crate) fn add_transition(
        &mut self,
        source: StateId,
        sym: usize,
        node: DtNodeId,
    ) -> TransitionId {
        let id = TransitionId(self.transitions.len() as u32);
        self.transitions.push(HypTransition {
            source,
            sym,
            target: TransitionTarget::NonTree(node),
            property: None,
            prev: None,
            next: None,
            in_list: false,
        });
        id
    }

    pub(crate) fn state(&self, id: StateId) -> &HypState<A::Symbol> {
        &self.states[id.index()]
    }

    pub(crate) fn state_mut(&mut self, id: StateId) -> &mut HypState<A::Symbol> {
        &mut self.states[id.index()]
    }

    pub(crate) fn transition(&self, id: TransitionId) -> &HypTransition {
        &self.transitions[id.index()]
    }

    pub(crate) fn transition_mut(&mut self, id: TransitionId) -> &mut HypTransition {
        &mut self.transitions[id.index()]
    }

    /// The outgoing transition of `state` for the symbol with index `sym`.
    pub fn transition_of(&self, state: StateId, sym: usize) -> TransitionId {
        self.states[state.index()].transitions[sym]
    }

    pub fn is_tree(&self, id: TransitionId) -> bool {
        matches!(self.transition(id).target, TransitionTarget::Tree(_))
    }

    /// The access sequence of the given state.
    pub fn access_sequence(&self, state: StateId) -> &Word<A::Symbol> {
        &self.states[state.index()].access
    }

    pub fn accepting(&self, state: StateId) -> bool {
        self.states[state.index()].accepting
    }

    /// The word a transition stands for, i.e. the access sequence of its
    /// source followed by its input symbol.
    pub(crate) fn transition_word(&self, id: TransitionId) -> Word<A::Symbol> {
        let record = self.transition(id);
        self.states[record.source.index()]
            .access
            .append(self.alphabet.symbol(record.sym))
    }
}

/// Pushes `t` to the front of the intrusive list starting at `head`. The
/// transition must not currently be on any list.
pub(crate) fn list_push(
    transitions: &mut [HypTransition],
    head: &mut Option<TransitionId>,
    t: TransitionId,
) {
    debug_assert!(!transitions[t.index()].in_list);
    let old = head.replace(t);
    if let Some(h) = old {
        transitions[h.index()].prev = Some(t);
    }
    let entry = &mut transitions[t.index()];
    entry.prev = None;
    entry.next = old;
    entry.in_list = true;
}

/// Takes the front element off the intrusive list starting at `head`.
pub(crate) fn list_pop(
    transitions: &mut [HypTransition],
    head: &mut Option<TransitionId>,
) -> Option<TransitionId> {
    let t = (*head)?;
    let next = transitions[t.index()].next;
    *head = next;
    if let Some(n) = next {
        transitions[n.index()].prev = None;
    }
    let entry = &mut transitions[t.index()];
    entry.prev = None;
    entry.next = None;
    entry.in_list = false;
    Some(t)
}

/// Unlinks `t` from the intrusive list starting at `head`.
pub(crate) fn list_remove(
    transitions: &mut [HypTransition],
    head: &mut Option<TransitionId>,
    t: TransitionId,
) {
    debug_assert!(transitions[t.index()].in_list);
    let (prev, next) = {
        let entry = &transitions[t.index()];
        (entry.prev, entry.next)
    };
    match prev {
        Some(p) => transitions[p.index()].next = next,
        None => {
            debug_assert_eq!(*head, Some(t));
            *head = next;
        }
    }
    if let Some(n) = next {
        transitions[n.index()].prev = prev;
    }
    let entry = &mut transitions[t.index()];
    entry.prev = None;
    entry.next = None;
    entry.in_list = false;
}

/// Collects the elements of the intrusive list starting at `head`, front to
/// back.
pub(crate) fn list_collect(
    transitions: &[HypTransition],
    head: Option<TransitionId>,
) -> Vec<TransitionId> {
    let mut out = Vec::new();
    let mut current = head;
    while let Some(t) = current {
        out.push(t);
        current = transitions[t.index()].next;
    }
    out
}
