//! API Schema Analysis Core
//!
//! Derives the canonical artifacts an API schema generator needs from a graph
//! of entity and property declarations: JSON paths for every scalar value,
//! flattened identities through reference chains, merge coverings, equality
//! constraints, array uniqueness constraints and type-coercion path sets.
//!
//! ## Pipeline
//!
//! ```text
//! declarations (JSON)
//!   └─ graph::loader        EntityGraph (arena + petgraph reference edges)
//!       └─ identity         reference components, flattened identities
//!           └─ paths        document paths, naming, document paths mapping
//!               └─ merge    merge coverings (directives + inherited)
//!                   └─ constraints   equality, array uniqueness
//!                       └─ classify  boolean / numeric / date-time
//! ```
//!
//! `AnalysisContext::build` runs every pass in order and is immutable afterwards.

pub mod classify;
pub mod collision;
pub mod config;
pub mod constraints;
pub mod context;
pub mod error;
pub mod graph;
pub mod identity;
pub mod merge;
pub mod paths;

pub use classify::{Classifier, PathType, TypeCoercion};
pub use config::AnalysisConfig;
pub use constraints::{ArrayUniquenessConstraint, EqualityConstraint};
pub use context::{AnalysisContext, EntityAnalysis, Stage};
pub use error::{AnalysisError, Result};
pub use graph::{Diagnostics, EntityGraph, EntityId, PropertyId};
pub use identity::{FlattenedIdentityProperty, ReferenceComponent};
pub use merge::{MergeCovering, MergeResolution};
pub use paths::{JsonPath, PropertyPath};
