//! Identity Passes
//!
//! - `component`: decomposes each reference property into the tree of
//!   identity properties it exposes
//! - `flatten`: walks those trees into per-entity flattened identity
//!   properties (FIPs), one per terminal identity column

pub mod component;
pub mod flatten;

pub use component::{ComponentBuilder, ReferenceComponent};
pub use flatten::{flatten_identities, FlattenedIdentityProperty};
