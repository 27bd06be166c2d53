//! Graph index family (spec §4.7): adjacency/triple-store/hexastore triple
//! layouts, the maintainer that keeps the chosen layout in sync, and a
//! pattern query builder on top of it.

pub mod maintainer;
pub mod query;
pub mod triple;

pub use maintainer::GraphMaintainer;
pub use query::Pattern;
pub use triple::{Layout, Permutation, Triple};
