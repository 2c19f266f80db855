//! A library for learning deterministic finite automata, both actively and
//! passively.
//!
//! The active path is the TTT algorithm: a discrimination-tree based learner
//! which poses membership queries to an oracle and digests counterexamples
//! provided by an equivalence oracle, see [`active::TttLearner`]. The passive
//! path builds a prefix tree acceptor from a labeled [`passive::Sample`] and
//! folds it with the blue-fringe variant of RPNI, see
//! [`passive::BlueFringeRpni`].

/// Abstract counterexample analysis, locates the breakpoint of a monotone
/// effect function.
pub mod acex;

/// Contains the active TTT learner together with its discrimination tree and
/// hypothesis data structures.
pub mod active;

/// Contains passive learners, most notably blue-fringe RPNI.
pub mod passive;

mod cancel;
mod error;

/// The deterministic finite automata that the learners produce.
pub mod dfa;

/// Oracle interfaces and some reference implementations.
pub mod oracle;

/// Generation of random automata, mainly useful for testing and benchmarks.
pub mod random;

pub use cancel::CancellationToken;
pub use error::{LearnError, Result};

pub mod prelude {
    pub use regulearn_core::prelude::*;

    pub use crate::acex::AcexStrategy;
    pub use crate::active::TttLearner;
    pub use crate::cancel::CancellationToken;
    pub use crate::dfa::{Dfa, DfaBuilder};
    pub use crate::error::{LearnError, Result};
    pub use crate::oracle::{
        CounterexampleQuery, DfaOracle, EquivalenceOracle, MembershipOracle, SymbolOf,
    };
    pub use crate::passive::{dfa_rpni, BlueFringeRpni, ProcessingOrder, Sample};
}
