//! Entity Graph Analysis
//!
//! Identity flattening and merge resolution recurse along identity edges
//! (identity references, identity groups, subclass -> superclass). Those edges
//! must form a DAG: a cycle would make an identity contain itself. This module
//! finds such cycles with `kosaraju_scc` and orders entities so that every
//! entity comes after everything its identity depends on.

use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::visit::{EdgeFiltered, EdgeRef};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use super::{EntityGraph, EntityId};
use crate::error::{AnalysisError, Result};

// =============================================================================
// Cycle Groups
// =============================================================================

/// A strongly connected component of the identity subgraph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleGroup {
    pub members: Vec<EntityId>,
    /// Single entity whose identity references itself
    pub is_self_referential: bool,
}

impl CycleGroup {
    /// Member names closed into a loop, for error messages
    pub fn path(&self, graph: &EntityGraph) -> Vec<String> {
        let mut names: Vec<String> = self
            .members
            .iter()
            .map(|id| graph.entity(*id).name.clone())
            .collect();
        if let Some(first) = names.first().cloned() {
            names.push(first);
        }
        names
    }
}

// =============================================================================
// Analysis Functions
// =============================================================================

/// All cycles along identity edges
pub fn identity_cycles(graph: &EntityGraph) -> Vec<CycleGroup> {
    let identity_edges = EdgeFiltered::from_fn(&graph.graph, |e| e.weight().is_identity_path());
    let mut groups = Vec::new();

    for scc in kosaraju_scc(&identity_edges) {
        if scc.len() == 1 {
            let node = scc[0];
            let has_self_ref = graph
                .graph
                .edges_directed(node, Direction::Outgoing)
                .any(|e| e.target() == node && e.weight().is_identity_path());
            if has_self_ref {
                groups.push(CycleGroup {
                    members: vec![graph.graph[node]],
                    is_self_referential: true,
                });
            }
        } else {
            let mut members: Vec<EntityId> = scc.iter().map(|idx| graph.graph[*idx]).collect();
            members.sort();
            groups.push(CycleGroup {
                members,
                is_self_referential: false,
            });
        }
    }

    groups.sort_by(|a, b| a.members.cmp(&b.members));
    groups
}

/// Fail on the first identity cycle
pub fn check_identity_acyclic(graph: &EntityGraph) -> Result<()> {
    match identity_cycles(graph).first() {
        Some(group) => Err(AnalysisError::IdentityCycle {
            path: group.path(graph),
        }),
        None => Ok(()),
    }
}

/// Entities ordered so identity dependencies come first
pub fn dependency_order(graph: &EntityGraph) -> Result<Vec<EntityId>> {
    check_identity_acyclic(graph)?;

    let identity_edges = EdgeFiltered::from_fn(&graph.graph, |e| e.weight().is_identity_path());
    let sorted = toposort(&identity_edges, None).map_err(|cycle| AnalysisError::IdentityCycle {
        path: vec![graph.entity(graph.graph[cycle.node_id()]).name.clone()],
    })?;

    Ok(sorted.into_iter().rev().map(|idx| graph.graph[idx]).collect())
}
