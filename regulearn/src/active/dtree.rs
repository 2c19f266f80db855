use regulearn_core::prelude::*;

use crate::active::hypothesis::{StateId, TransitionId};
use crate::oracle::MembershipOracle;

/// Stable handle of a discrimination tree node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DtNodeId(pub(crate) u32);

impl DtNodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for DtNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

pub(crate) fn out_index(out: bool) -> usize {
    usize::from(out)
}

pub(crate) enum DtNodeKind<S: Symbol> {
    Inner {
        discriminator: Word<S>,
        children: [Option<DtNodeId>; 2],
    },
    Leaf {
        state: Option<StateId>,
    },
}

/// Scratch data attached to the nodes of a block while its root
/// discriminator is being finalized. Tracks which outcome labels occur in the
/// subtree, the incoming transitions grouped by their outcome and, for
/// leaves, the outcome predicted for the leaf's state.
pub(crate) struct SplitData {
    marks: [bool; 2],
    incoming: [Option<TransitionId>; 2],
    pub(crate) state_label: Option<bool>,
}

impl SplitData {
    pub(crate) fn new() -> Self {
        Self {
            marks: [false, false],
            incoming: [None, None],
            state_label: None,
        }
    }

    /// Marks the given label, returns whether it was not marked before.
    pub(crate) fn mark(&mut self, label: bool) -> bool {
        !std::mem::replace(&mut self.marks[out_index(label)], true)
    }

    pub(crate) fn is_marked(&self, label: bool) -> bool {
        self.marks[out_index(label)]
    }
}

pub(crate) struct DtNode<S: Symbol> {
    pub(crate) parent: Option<DtNodeId>,
    pub(crate) parent_edge: Option<bool>,
    pub(crate) depth: u32,
    pub(crate) temp: bool,
    pub(crate) kind: DtNodeKind<S>,
    /// Head of the intrusive list of non-tree transitions pointing here.
    pub(crate) incoming: Option<TransitionId>,
    pub(crate) split: Option<SplitData>,
    pub(crate) block_prev: Option<DtNodeId>,
    pub(crate) block_next: Option<DtNodeId>,
}

/// The result of sifting: the node the descent stopped at, together with the
/// outcome observed at the root in case the descent started there. For a DFA
/// the root discriminator is the empty word, so that outcome is the
/// acceptance of the sifted word.
pub(crate) struct Sifted {
    pub(crate) node: DtNodeId,
    pub(crate) root_outcome: Option<bool>,
}

/// The discrimination tree of the TTT learner. Inner nodes carry a suffix
/// word (their discriminator) and up to one child per outcome, leaves
/// correspond to states of the hypothesis. The tree for a DFA is created with
/// a permanent root discriminated by the empty word, its two subtrees hold
/// the accepting respectively rejecting states.
///
/// Nodes are kept in an arena and referenced by [`DtNodeId`]; nodes that are
/// abandoned when a subtree is rebuilt during finalization simply become
/// unreachable from the root.
pub struct DiscriminationTree<S: Symbol> {
    nodes: Vec<DtNode<S>>,
    root: DtNodeId,
}

impl<S: Symbol> Default for DiscriminationTree<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Symbol> DiscriminationTree<S> {
    pub fn new() -> Self {
        let root = DtNode {
            parent: None,
            parent_edge: None,
            depth: 0,
            temp: false,
            kind: DtNodeKind::Inner {
                discriminator: Word::epsilon(),
                children: [None, None],
            },
            incoming: None,
            split: None,
            block_prev: None,
            block_next: None,
        };
        Self {
            nodes: vec![root],
            root: DtNodeId(0),
        }
    }

    pub fn root(&self) -> DtNodeId {
        self.root
    }

    pub(crate) fn node(&self, id: DtNodeId) -> &DtNode<S> {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: DtNodeId) -> &mut DtNode<S> {
        &mut self.nodes[id.index()]
    }

    pub fn is_leaf(&self, id: DtNodeId) -> bool {
        matches!(self.node(id).kind, DtNodeKind::Leaf { .. })
    }

    pub fn is_inner(&self, id: DtNodeId) -> bool {
        !self.is_leaf(id)
    }

    pub fn is_temp(&self, id: DtNodeId) -> bool {
        self.node(id).temp
    }

    pub fn parent(&self, id: DtNodeId) -> Option<DtNodeId> {
        self.node(id).parent
    }

    pub fn parent_edge(&self, id: DtNodeId) -> Option<bool> {
        self.node(id).parent_edge
    }

    /// The discriminator of an inner node. Panics for leaves.
    pub fn discriminator(&self, id: DtNodeId) -> &Word<S> {
        match &self.node(id).kind {
            DtNodeKind::Inner { discriminator, .. } => discriminator,
            DtNodeKind::Leaf { .. } => panic!("leaves have no discriminator"),
        }
    }

    pub(crate) fn set_discriminator(&mut self, id: DtNodeId, word: Word<S>) {
        match &mut self.node_mut(id).kind {
            DtNodeKind::Inner { discriminator, .. } => *discriminator = word,
            DtNodeKind::Leaf { .. } => panic!("leaves have no discriminator"),
        }
    }

    /// The state linked to the given node, `None` for unlinked leaves and for
    /// inner nodes.
    pub fn state_of(&self, id: DtNodeId) -> Option<StateId> {
        match self.node(id).kind {
            DtNodeKind::Leaf { state } => state,
            DtNodeKind::Inner { .. } => None,
        }
    }

    pub(crate) fn set_state(&mut self, id: DtNodeId, linked: StateId) {
        match &mut self.node_mut(id).kind {
            DtNodeKind::Leaf { state } => *state = Some(linked),
            DtNodeKind::Inner { .. } => panic!("only leaves can be linked to a state"),
        }
    }

    pub fn child(&self, id: DtNodeId, out: bool) -> Option<DtNodeId> {
        match &self.node(id).kind {
            DtNodeKind::Inner { children, .. } => children[out_index(out)],
            DtNodeKind::Leaf { .. } => None,
        }
    }

    /// The existing children of a node, in outcome order.
    pub(crate) fn children_of(&self, id: DtNodeId) -> Vec<DtNodeId> {
        match &self.node(id).kind {
            DtNodeKind::Inner { children, .. } => children.iter().flatten().copied().collect(),
            DtNodeKind::Leaf { .. } => Vec::new(),
        }
    }

    /// Creates a fresh, unlinked leaf below `parent`.
    pub(crate) fn new_node(&mut self, parent: Option<DtNodeId>, edge: Option<bool>) -> DtNodeId {
        let depth = parent.map_or(0, |p| self.node(p).depth + 1);
        let id = DtNodeId(self.nodes.len() as u32);
        self.nodes.push(DtNode {
            parent,
            parent_edge: edge,
            depth,
            temp: false,
            kind: DtNodeKind::Leaf { state: None },
            incoming: None,
            split: None,
            block_prev: None,
            block_next: None,
        });
        id
    }

    fn create_child(&mut self, parent: DtNodeId, out: bool) -> DtNodeId {
        let child = self.new_node(Some(parent), Some(out));
        match &mut self.node_mut(parent).kind {
            DtNodeKind::Inner { children, .. } => {
                debug_assert!(children[out_index(out)].is_none());
                children[out_index(out)] = Some(child);
            }
            DtNodeKind::Leaf { .. } => panic!("leaves have no children"),
        }
        child
    }

    /// Descends from `start`, at every inner node observing the output of the
    /// sifted word extended by the node's discriminator and following the
    /// matching child edge, which is created as a fresh empty leaf if absent.
    /// A hard sift only stops at leaves, a soft sift additionally stops at
    /// temporary nodes, i.e. at block roots.
    pub(crate) fn sift<O>(
        &mut self,
        oracle: &O,
        start: DtNodeId,
        access: &Word<S>,
        hard: bool,
    ) -> Sifted
    where
        O: MembershipOracle,
        O::Alphabet: Alphabet<Symbol = S>,
    {
        let mut current = start;
        let mut root_outcome = None;
        loop {
            let node = self.node(current);
            let discriminator = match &node.kind {
                DtNodeKind::Leaf { .. } => break,
                DtNodeKind::Inner { .. } if node.temp && !hard => break,
                DtNodeKind::Inner { discriminator, .. } => discriminator.clone(),
            };
            let out = oracle.answer_query(access, &discriminator);
            if current == self.root {
                root_outcome = Some(out);
            }
            current = match self.child(current, out) {
                Some(child) => child,
                None => self.create_child(current, out),
            };
        }
        Sifted {
            node: current,
            root_outcome,
        }
    }

    /// Converts `leaf` into an inner node with the given discriminator and
    /// two fresh leaves below it, returned as `(old, new)` according to the
    /// outcomes of the state that sat at the leaf and the one being split
    /// off. The caller is responsible for linking the states and for marking
    /// the node as temporary.
    pub(crate) fn split_leaf(
        &mut self,
        leaf: DtNodeId,
        discriminator: Word<S>,
        old_out: bool,
        new_out: bool,
    ) -> (DtNodeId, DtNodeId) {
        debug_assert!(self.is_leaf(leaf));
        debug_assert_ne!(old_out, new_out);
        let old_child = self.new_node(Some(leaf), Some(old_out));
        let new_child = self.new_node(Some(leaf), Some(new_out));
        let mut children = [None, None];
        children[out_index(old_out)] = Some(old_child);
        children[out_index(new_out)] = Some(new_child);
        self.node_mut(leaf).kind = DtNodeKind::Inner {
            discriminator,
            children,
        };
        (old_child, new_child)
    }

    /// Turns the leaf `node` into an inner node with the given children,
    /// which must already have their parent pointers set.
    pub(crate) fn make_inner(
        &mut self,
        node: DtNodeId,
        discriminator: Word<S>,
        children: Vec<(bool, DtNodeId)>,
    ) {
        debug_assert!(self.is_leaf(node));
        let mut slots = [None, None];
        for (out, child) in children {
            debug_assert_eq!(self.node(child).parent, Some(node));
            slots[out_index(out)] = Some(child);
        }
        self.node_mut(node).kind = DtNodeKind::Inner {
            discriminator,
            children: slots,
        };
    }

    /// Replaces the children of the inner node `id`, reattaching the new
    /// children below it.
    pub(crate) fn replace_children(&mut self, id: DtNodeId, children: Vec<(bool, DtNodeId)>) {
        let mut slots = [None, None];
        for (out, child) in children {
            let depth = self.node(id).depth + 1;
            let record = self.node_mut(child);
            record.parent = Some(id);
            record.parent_edge = Some(out);
            record.depth = depth;
            slots[out_index(out)] = Some(child);
        }
        match &mut self.node_mut(id).kind {
            DtNodeKind::Inner { children, .. } => *children = slots,
            DtNodeKind::Leaf { .. } => panic!("only inner nodes have children"),
        }
    }

    /// The least common ancestor of two nodes.
    pub fn least_common_ancestor(&self, a: DtNodeId, b: DtNodeId) -> DtNodeId {
        let (mut a, mut b) = (a, b);
        while self.node(a).depth > self.node(b).depth {
            a = self.node(a).parent.expect("deeper node has a parent");
        }
        while self.node(b).depth > self.node(a).depth {
            b = self.node(b).parent.expect("deeper node has a parent");
        }
        while a != b {
            match (self.node(a).parent, self.node(b).parent) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                _ => unreachable!("nodes must always have a common ancestor"),
            }
        }
        a
    }

    /// All nodes of the subtree rooted at `id`, in depth-first order.
    pub(crate) fn subtree_nodes(&self, id: DtNodeId) -> Vec<DtNodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children_of(node));
        }
        out
    }

    /// The states linked to the leaves of the subtree rooted at `id`.
    pub(crate) fn subtree_states(&self, id: DtNodeId) -> Vec<StateId> {
        self.subtree_nodes(id)
            .into_iter()
            .filter_map(|n| self.state_of(n))
            .collect()
    }

    /// The outcome label on the edge leaving `above` towards the (strict)
    /// descendant `node`, or `None` if `node` does not lie below `above`.
    pub(crate) fn subtree_label(&self, above: DtNodeId, node: DtNodeId) -> Option<bool> {
        let mut current = node;
        loop {
            let parent = self.node(current).parent?;
            if parent == above {
                return self.node(current).parent_edge;
            }
            current = parent;
        }
    }

    pub(crate) fn incoming_head_mut(&mut self, id: DtNodeId) -> &mut Option<TransitionId> {
        &mut self.node_mut(id).incoming
    }

    pub(crate) fn split_data(&self, id: DtNodeId) -> &SplitData {
        self.node(id)
            .split
            .as_ref()
            .expect("node takes part in a split")
    }

    pub(crate) fn split_data_mut(&mut self, id: DtNodeId) -> &mut SplitData {
        self.node_mut(id)
            .split
            .as_mut()
            .expect("node takes part in a split")
    }

    pub(crate) fn split_incoming_head_mut(
        &mut self,
        id: DtNodeId,
        label: bool,
    ) -> &mut Option<TransitionId> {
        &mut self.split_data_mut(id).incoming[out_index(label)]
    }

    pub(crate) fn block_push(&mut self, head: &mut Option<DtNodeId>, node: DtNodeId) {
        if let Some(h) = *head {
            self.node_mut(h).block_prev = Some(node);
        }
        let record = self.node_mut(node);
        record.block_prev = None;
        record.block_next = *head;
        *head = Some(node);
    }

    pub(crate) fn block_remove(&mut self, head: &mut Option<DtNodeId>, node: DtNodeId) {
        let (prev, next) = {
            let record = self.node(node);
            (record.block_prev, record.block_next)
        };
        match prev {
            Some(p) => self.node_mut(p).block_next = next,
            None => {
                debug_assert_eq!(*head, Some(node));
                *head = next;
            }
        }
        if let Some(n) = next {
            self.node_mut(n).block_prev = prev;
        }
        let record = self.node_mut(node);
        record.block_prev = None;
        record.block_next = None;
    }

    pub(crate) fn block_collect(&self, head: Option<DtNodeId>) -> Vec<DtNodeId> {
        let mut out = Vec::new();
        let mut current = head;
        while let Some(node) = current {
            out.push(node);
            current = self.node(node).block_next;
        }
        out
    }

    /// Number of nodes reachable from the root.
    pub fn size(&self) -> usize {
        self.subtree_nodes(self.root).len()
    }

    /// Whether no temporary discriminators remain.
    pub fn all_final(&self) -> bool {
        self.subtree_nodes(self.root)
            .into_iter()
            .all(|n| !self.node(n).temp)
    }

    /// The discriminators of all inner nodes reachable from the root.
    pub fn inner_discriminators(&self) -> Vec<Word<S>> {
        self.subtree_nodes(self.root)
            .into_iter()
            .filter(|&n| self.is_inner(n))
            .map(|n| self.discriminator(n).clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::DiscriminationTree;
    use regulearn_core::prelude::*;

    #[test]
    fn lca_and_subtree_labels() {
        let mut tree: DiscriminationTree<char> = DiscriminationTree::new();
        let root = tree.root();
        let rej = tree.create_child(root, false);
        let acc = tree.create_child(root, true);
        let (left, right) = tree.split_leaf(rej, Word::from("b"), false, true);

        assert_eq!(tree.least_common_ancestor(left, right), rej);
        assert_eq!(tree.least_common_ancestor(left, acc), root);
        assert_eq!(tree.least_common_ancestor(acc, acc), acc);

        assert_eq!(tree.subtree_label(root, acc), Some(true));
        assert_eq!(tree.subtree_label(root, left), Some(false));
        assert_eq!(tree.subtree_label(rej, right), Some(true));
        assert_eq!(tree.subtree_label(rej, acc), None);
    }

    #[test]
    fn subtree_iteration() {
        let mut tree: DiscriminationTree<char> = DiscriminationTree::new();
        let root = tree.root();
        let rej = tree.create_child(root, false);
        let _acc = tree.create_child(root, true);
        tree.split_leaf(rej, Word::from("a"), false, true);
        assert_eq!(tree.size(), 5);
        assert_eq!(tree.subtree_nodes(rej).len(), 3);
        assert!(tree.all_final());
    }
}
