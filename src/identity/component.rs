//! Reference Component Builder
//!
//! A reference property to entity `E` becomes a `Group` whose children are
//! `E`'s identity properties in declaration order: scalar identities become
//! `Element`s, reference (and identity group) properties recurse into nested
//! `Group`s. Descriptor references are always a single `Element`.
//!
//! Children lists are memoized per target entity. An in-progress stack turns
//! a revisit into `AnalysisError::IdentityCycle` instead of unbounded recursion.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::{AnalysisError, Result};
use crate::graph::{EntityGraph, EntityId, PropertyId, PropertyKind};

/// Decomposition of a reference property into its identity surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReferenceComponent {
    /// One terminal identity value
    Element { property: PropertyId },
    /// One hop through a referenced (or embedded) entity
    Group {
        #[serde(rename = "sourceProperty")]
        source_property: PropertyId,
        children: Vec<ReferenceComponent>,
    },
}

impl ReferenceComponent {
    pub fn property(&self) -> PropertyId {
        match self {
            Self::Element { property } => *property,
            Self::Group { source_property, .. } => *source_property,
        }
    }

    /// Every root-to-element property chain, depth first
    pub fn leaf_chains(&self) -> Vec<Vec<PropertyId>> {
        let mut chains = Vec::new();
        self.collect_chains(&mut Vec::new(), &mut chains);
        chains
    }

    fn collect_chains(&self, prefix: &mut Vec<PropertyId>, out: &mut Vec<Vec<PropertyId>>) {
        match self {
            Self::Element { property } => {
                let mut chain = prefix.clone();
                chain.push(*property);
                out.push(chain);
            }
            Self::Group { source_property, children } => {
                prefix.push(*source_property);
                for child in children {
                    child.collect_chains(prefix, out);
                }
                prefix.pop();
            }
        }
    }

    /// Name-based rendering for output
    pub fn to_json(&self, graph: &EntityGraph) -> Value {
        match self {
            Self::Element { property } => json!({
                "element": graph.property(*property).full_name(),
            }),
            Self::Group { source_property, children } => json!({
                "group": graph.property(*source_property).full_name(),
                "children": children.iter().map(|c| c.to_json(graph)).collect::<Vec<_>>(),
            }),
        }
    }
}

/// Memoizing builder for reference components
pub struct ComponentBuilder<'a> {
    graph: &'a EntityGraph,
    memo: HashMap<EntityId, Vec<ReferenceComponent>>,
    in_progress: Vec<EntityId>,
}

impl<'a> ComponentBuilder<'a> {
    pub fn new(graph: &'a EntityGraph) -> Self {
        Self {
            graph,
            memo: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    /// Component for any property: terminals are elements, everything else groups
    pub fn build(&mut self, property: PropertyId) -> Result<ReferenceComponent> {
        let prop = self.graph.property(property);
        match prop.kind {
            PropertyKind::Scalar(_) | PropertyKind::SchoolYearEnumeration | PropertyKind::Descriptor(_) => {
                Ok(ReferenceComponent::Element { property })
            }
            PropertyKind::Reference(target)
            | PropertyKind::Common(target)
            | PropertyKind::InlineCommon(target)
            | PropertyKind::Choice(target) => Ok(ReferenceComponent::Group {
                source_property: property,
                children: self.identity_children(target, property)?,
            }),
        }
    }

    /// Components for every reference and descriptor property in the graph
    pub fn build_all(&mut self) -> Result<HashMap<PropertyId, ReferenceComponent>> {
        let graph = self.graph;
        let mut components = HashMap::new();
        for property in graph.all_properties() {
            if matches!(property.kind, PropertyKind::Reference(_) | PropertyKind::Descriptor(_)) {
                components.insert(property.id, self.build(property.id)?);
            }
        }
        tracing::debug!(count = components.len(), "built reference components");
        Ok(components)
    }

    fn identity_children(&mut self, entity: EntityId, via: PropertyId) -> Result<Vec<ReferenceComponent>> {
        if let Some(children) = self.memo.get(&entity) {
            return Ok(children.clone());
        }

        if let Some(start) = self.in_progress.iter().position(|e| *e == entity) {
            let mut path: Vec<String> = self.in_progress[start..]
                .iter()
                .map(|e| self.graph.entity(*e).name.clone())
                .collect();
            path.push(self.graph.entity(entity).name.clone());
            return Err(AnalysisError::IdentityCycle { path });
        }

        self.in_progress.push(entity);
        let result = self
            .graph
            .identity_properties(entity)
            .into_iter()
            .map(|q| self.build(q))
            .collect::<Result<Vec<_>>>();
        self.in_progress.pop();
        let children = result?;

        if children.is_empty() {
            let via_prop = self.graph.property(via);
            return Err(AnalysisError::IdentitylessReference {
                entity: self.graph.entity(via_prop.owner).name.clone(),
                property: via_prop.full_name(),
                target: self.graph.entity(entity).name.clone(),
            });
        }

        self.memo.insert(entity, children.clone());
        Ok(children)
    }
}
