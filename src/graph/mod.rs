//! Entity/Property Graph
//!
//! Central arena for entity and property declarations. Entities own ordered
//! property lists; reference-kind properties point at other entities by
//! `EntityId` only, never by ownership, so diamond and cyclic shapes are fine.
//!
//! A petgraph `DiGraph` mirrors the reference structure for SCC detection and
//! dependency ordering (see `analysis`).

pub mod analysis;
pub mod diagnostics;
pub mod loader;

pub use analysis::{dependency_order, identity_cycles, check_identity_acyclic};
pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};
pub use loader::{
    DirectiveDeclaration, EntityDeclaration, GraphDeclaration, PropertyDeclaration,
    PropertyTypeDeclaration,
};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::paths::PropertyPath;

// =============================================================================
// Identifiers
// =============================================================================

/// Index of an entity in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub(crate) usize);

impl EntityId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a property in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub(crate) usize);

impl PropertyId {
    pub fn index(self) -> usize {
        self.0
    }
}

// =============================================================================
// Entity
// =============================================================================

/// Kind of schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    DomainEntity,
    Association,
    DomainEntitySubclass,
    AssociationSubclass,
    Common,
    InlineCommon,
    Choice,
    Descriptor,
}

impl EntityKind {
    /// Entities that become API resources with their own document
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            Self::DomainEntity
                | Self::Association
                | Self::DomainEntitySubclass
                | Self::AssociationSubclass
        )
    }

    pub fn is_subclass(&self) -> bool {
        matches!(self, Self::DomainEntitySubclass | Self::AssociationSubclass)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DomainEntity => "domainEntity",
            Self::Association => "association",
            Self::DomainEntitySubclass => "domainEntitySubclass",
            Self::AssociationSubclass => "associationSubclass",
            Self::Common => "common",
            Self::InlineCommon => "inlineCommon",
            Self::Choice => "choice",
            Self::Descriptor => "descriptor",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An author-declared equivalence between two property paths on one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDirective {
    pub source: PropertyPath,
    pub target: PropertyPath,
}

/// A named schema node
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub namespace: String,
    /// Declared properties, in declaration order
    pub properties: Vec<PropertyId>,
    pub superclass: Option<EntityId>,
    pub merge_directives: Vec<MergeDirective>,
}

// =============================================================================
// Property
// =============================================================================

/// Declared scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalarType {
    Boolean,
    Currency,
    Date,
    DateTime,
    Decimal,
    Duration,
    Enumeration,
    Integer,
    Percent,
    SharedDecimal,
    SharedInteger,
    SharedShort,
    SharedString,
    Short,
    String,
    Time,
    Year,
}

/// What a property holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "camelCase")]
pub enum PropertyKind {
    Scalar(ScalarType),
    SchoolYearEnumeration,
    Descriptor(EntityId),
    /// Domain entity or association reference
    Reference(EntityId),
    Common(EntityId),
    InlineCommon(EntityId),
    Choice(EntityId),
}

impl PropertyKind {
    /// Referenced or embedded entity, if any
    pub fn target(&self) -> Option<EntityId> {
        match self {
            Self::Scalar(_) | Self::SchoolYearEnumeration => None,
            Self::Descriptor(id)
            | Self::Reference(id)
            | Self::Common(id)
            | Self::InlineCommon(id)
            | Self::Choice(id) => Some(*id),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }

    /// Terminal kinds hold a single value in the document
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Scalar(_) | Self::SchoolYearEnumeration | Self::Descriptor(_)
        )
    }

    /// Inline commons and choices add no document level of their own
    pub fn is_transparent(&self) -> bool {
        matches!(self, Self::InlineCommon(_) | Self::Choice(_))
    }
}

/// A property declared on exactly one entity
#[derive(Debug, Clone)]
pub struct Property {
    pub id: PropertyId,
    pub owner: EntityId,
    pub name: String,
    pub role_name: Option<String>,
    pub kind: PropertyKind,
    pub is_identity: bool,
    pub is_collection: bool,
    pub is_required: bool,
    pub extension_namespace: Option<String>,
    /// Superclass identity property this (subclass) property renames
    pub renames_identity: Option<String>,
}

impl Property {
    /// Role name prefixed name. A role name identical to the name adds nothing.
    pub fn full_name(&self) -> String {
        format!("{}{}", self.role_prefix(), self.name)
    }

    /// Role name contribution to column and JSON names
    pub fn role_prefix(&self) -> &str {
        match self.role_name.as_deref() {
            Some(role) if role != self.name => role,
            _ => "",
        }
    }
}

// =============================================================================
// Graph Edges
// =============================================================================

/// Kind of edge in the reference graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Identity property referencing (or embedding) another entity
    Identity,
    /// Non-identity reference to another resource
    Reference,
    /// Descriptor reference
    Descriptor,
    /// Embedded common, inline common or choice
    Contains,
    /// Subclass to superclass
    Superclass,
}

impl EdgeKind {
    /// Edges along which identity flattening recurses
    pub fn is_identity_path(&self) -> bool {
        matches!(self, Self::Identity | Self::Superclass)
    }
}

// =============================================================================
// EntityGraph
// =============================================================================

/// Arena of entities and properties plus the petgraph reference graph
#[derive(Debug, Clone)]
pub struct EntityGraph {
    pub(crate) entities: Vec<Entity>,
    pub(crate) properties: Vec<Property>,
    pub(crate) by_name: HashMap<String, EntityId>,
    pub(crate) graph: DiGraph<EntityId, EdgeKind>,
    pub(crate) node_indices: Vec<NodeIndex>,
    /// Digest of the declaration inputs, for host-side caching
    pub bundle_hash: String,
}

impl EntityGraph {
    /// Load declarations from a JSON file or a directory of JSON files
    pub fn from_path(path: &Path) -> Result<Self> {
        if path.is_dir() {
            loader::load_from_directory(path)
        } else {
            loader::load_from_file(path)
        }
    }

    /// Build from an in-memory JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let declaration: GraphDeclaration = serde_json::from_str(json)?;
        loader::build_graph(vec![declaration], loader::hash_inputs([json.as_bytes()]))
    }

    /// Build from a JSON value (handy with `serde_json::json!`)
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let hash = loader::hash_inputs([value.to_string().as_bytes()]);
        let declaration: GraphDeclaration = serde_json::from_value(value)?;
        loader::build_graph(vec![declaration], hash)
    }

    // ========== Public API ==========

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    pub fn property(&self, id: PropertyId) -> &Property {
        &self.properties[id.0]
    }

    /// Resolve an entity name (exact, then case-insensitive)
    pub fn resolve(&self, name: &str) -> Option<EntityId> {
        if let Some(id) = self.by_name.get(name) {
            return Some(*id);
        }
        let lower = name.to_lowercase();
        self.entities
            .iter()
            .find(|e| e.name.to_lowercase() == lower)
            .map(|e| e.id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// Resource entities in declaration order
    pub fn resources(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.kind.is_resource())
    }

    pub fn all_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    /// Properties as seen by a document of this entity.
    ///
    /// Subclasses see their superclass's properties first, with any renamed
    /// identity property replaced in place by the renaming property, followed
    /// by their own remaining properties.
    pub fn effective_properties(&self, id: EntityId) -> Vec<PropertyId> {
        let entity = self.entity(id);
        let Some(superclass) = entity.superclass else {
            return entity.properties.clone();
        };

        let renames: HashMap<&str, PropertyId> = entity
            .properties
            .iter()
            .filter_map(|pid| {
                let p = self.property(*pid);
                p.renames_identity.as_deref().map(|old| (old, *pid))
            })
            .collect();

        let mut result: Vec<PropertyId> = self
            .effective_properties(superclass)
            .into_iter()
            .map(|pid| {
                let p = self.property(pid);
                match renames.get(p.name.as_str()) {
                    Some(renamed) if p.is_identity => *renamed,
                    _ => pid,
                }
            })
            .collect();

        result.extend(
            entity
                .properties
                .iter()
                .filter(|pid| self.property(**pid).renames_identity.is_none()),
        );
        result
    }

    /// Effective identity properties, in declaration order
    pub fn identity_properties(&self, id: EntityId) -> Vec<PropertyId> {
        self.effective_properties(id)
            .into_iter()
            .filter(|pid| self.property(*pid).is_identity)
            .collect()
    }

    pub fn has_identity(&self, id: EntityId) -> bool {
        !self.identity_properties(id).is_empty()
    }

    /// Merge directives in effect on an entity (superclass directives first)
    pub fn merge_directives(&self, id: EntityId) -> Vec<MergeDirective> {
        let entity = self.entity(id);
        let mut directives = match entity.superclass {
            Some(superclass) => self.merge_directives(superclass),
            None => Vec::new(),
        };
        directives.extend(entity.merge_directives.iter().cloned());
        directives
    }

    pub(crate) fn node_index(&self, id: EntityId) -> NodeIndex {
        self.node_indices[id.0]
    }

    /// Immediate outgoing edges (dependencies)
    pub fn refs_out(&self, id: EntityId) -> Vec<(EntityId, EdgeKind)> {
        self.graph
            .edges_directed(self.node_index(id), Direction::Outgoing)
            .filter_map(|e| self.graph.node_weight(e.target()).map(|t| (*t, *e.weight())))
            .collect()
    }

    /// Immediate incoming edges (dependents)
    pub fn refs_in(&self, id: EntityId) -> Vec<(EntityId, EdgeKind)> {
        self.graph
            .edges_directed(self.node_index(id), Direction::Incoming)
            .filter_map(|e| self.graph.node_weight(e.source()).map(|s| (*s, *e.weight())))
            .collect()
    }

    /// Export the reference graph to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph EntityGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push('\n');

        let color_map = [
            (EntityKind::DomainEntity, "#00BCD4"),
            (EntityKind::Association, "#4CAF50"),
            (EntityKind::DomainEntitySubclass, "#2196F3"),
            (EntityKind::AssociationSubclass, "#8BC34A"),
            (EntityKind::Common, "#FF9800"),
            (EntityKind::InlineCommon, "#FFC107"),
            (EntityKind::Choice, "#9C27B0"),
            (EntityKind::Descriptor, "#607D8B"),
        ];

        for entity in &self.entities {
            let color = color_map
                .iter()
                .find(|(kind, _)| *kind == entity.kind)
                .map(|(_, color)| *color)
                .unwrap_or("#9E9E9E");
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\\n({})\", fillcolor=\"{}\"];\n",
                entity.name, entity.name, entity.kind, color
            ));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            if let (Some(source), Some(target)) = (
                self.graph.node_weight(edge.source()),
                self.graph.node_weight(edge.target()),
            ) {
                let style = match edge.weight() {
                    EdgeKind::Identity => "bold",
                    EdgeKind::Superclass => "dashed",
                    _ => "solid",
                };
                output.push_str(&format!(
                    "  \"{}\" -> \"{}\" [style={}];\n",
                    self.entity(*source).name,
                    self.entity(*target).name,
                    style
                ));
            }
        }

        output.push_str("}\n");
        output
    }
}
