mod dtree;
pub use dtree::{DiscriminationTree, DtNodeId};

mod hypothesis;
pub use hypothesis::{Hypothesis, StateId, TransitionId, TransitionTarget};

mod ttt;
pub use ttt::TttLearner;
