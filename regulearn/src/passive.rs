use regulearn_core::prelude::*;

use crate::dfa::Dfa;
use crate::error::Result;

mod sample;
pub use sample::Sample;

mod pta;
pub use pta::{BlueFringePta, ProcessingOrder, PtaColor, RedBlueMerge};

mod rpni;
pub use rpni::BlueFringeRpni;

/// Executes blue-fringe RPNI with default settings on the given sample and
/// returns a DFA that classifies every sample word like its label.
pub fn dfa_rpni<A: Alphabet + Sync>(sample: &Sample<A>) -> Result<Dfa<A>> {
    BlueFringeRpni::new(sample.alphabet.clone()).compute_model(sample)
}
