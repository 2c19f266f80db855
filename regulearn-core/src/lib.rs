//! Core primitives for learning automata: finite indexed alphabets and
//! immutable words whose prefix/suffix views share their backing storage.

pub mod alphabet;

pub mod word;

pub mod math;
mod show;

pub use show::Show;

pub mod prelude {
    pub use super::alphabet::{Alphabet, CharAlphabet, Symbol, UnknownSymbolError};
    pub use super::math;
    pub use super::show::Show;
    pub use super::word::Word;
}
