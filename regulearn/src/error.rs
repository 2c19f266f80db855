use regulearn_core::alphabet::UnknownSymbolError;
use thiserror::Error;

/// The error type shared by the learners in this crate. Nothing is retried
/// internally, every variant is surfaced to the caller and all data
/// structures are left in an invariant-consistent state.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum LearnError {
    /// An input word contained a symbol that is not part of the alphabet the
    /// learner was created for.
    #[error(transparent)]
    UnknownSymbol(#[from] UnknownSymbolError),
    /// The membership oracle gave answers that contradict each other, for
    /// example an abstract counterexample whose endpoints agree.
    #[error("oracle answers are inconsistent: {0}")]
    OracleInconsistency(String),
    /// Two samples prescribe different labels for the same word.
    #[error("conflicting labels for sample word {word}: already recorded as {existing}")]
    ConflictingSample {
        word: String,
        existing: bool,
    },
    /// A learner method was invoked in a state it does not support, for
    /// example calling `refine` before `start`.
    #[error("illegal learner state: {0}")]
    IllegalState(&'static str),
    /// Cooperative cancellation was requested through a
    /// [`CancellationToken`](crate::CancellationToken).
    #[error("the learning run was cancelled")]
    Cancelled,
}

/// Result type with the error defaulting to [`LearnError`].
pub type Result<T, E = LearnError> = std::result::Result<T, E>;
