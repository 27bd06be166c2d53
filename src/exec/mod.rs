//! Plan execution (spec §4.10): turns a `query::PhysicalPlan` into rows,
//! and a `Cursor` contract for paging through them with stop reasons.

pub mod cursor;
pub mod leaf;
pub mod operators;

pub use cursor::{Continuation, Cursor, CursorStep, QueryLimits, StopReason};
pub use leaf::StoreLeafSource;
pub use operators::{execute, LeafSource};
