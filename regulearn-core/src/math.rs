//! Type aliases for the collection types used throughout the crates. These
//! exist to hide which concrete implementation is used.

pub use indexmap::map;
pub use indexmap::set;
pub use indexmap::Equivalent;
pub use std::collections::btree_map as ordered_map;
pub use std::collections::btree_set as ordered_set;

/// Type alias for sets that are unordered.
pub type Set<S> = indexmap::IndexSet<S>;
/// Type alias for maps that are unordered.
pub type Map<K, V> = indexmap::IndexMap<K, V>;

/// Type alias for sets which maintain their elements in ascending order.
pub type OrderedSet<S> = std::collections::BTreeSet<S>;
/// Type alias for maps which maintain their keys in ascending order.
pub type OrderedMap<K, V> = std::collections::BTreeMap<K, V>;
