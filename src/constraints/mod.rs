//! Constraint Emitters
//!
//! - `equality`: path pairs that must hold equal values (explicit merges and
//!   implicit column conflicts)
//! - `uniqueness`: per-array path sets that must be jointly unique

pub mod equality;
pub mod uniqueness;

pub use equality::{EqualityConstraint, EqualityEmitter};
pub use uniqueness::{array_uniqueness_constraints, ArrayUniquenessConstraint};
