//! Declaration Loading
//!
//! Builds an `EntityGraph` from JSON declaration documents, either a single
//! file or every `*.json` under a directory (sorted, so the bundle hash and
//! declaration order are stable). All names are resolved here; nothing
//! downstream ever sees an unresolved reference.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use petgraph::graph::DiGraph;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use super::{
    EdgeKind, Entity, EntityGraph, EntityId, EntityKind, MergeDirective, Property, PropertyId,
    PropertyKind, ScalarType,
};
use crate::error::{AnalysisError, Result};
use crate::paths::PropertyPath;

const DIRECTIVE_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$";
const DEFAULT_NAMESPACE: &str = "EdFi";

// =============================================================================
// Declaration Documents
// =============================================================================

/// One declaration document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDeclaration {
    /// Default namespace for entities that don't name one
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntityDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDeclaration {
    pub name: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDeclaration>,
    #[serde(default)]
    pub merge_directives: Vec<DirectiveDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyTypeDeclaration,
    /// Target entity name; defaults to the property name
    #[serde(default)]
    pub references: Option<String>,
    #[serde(default)]
    pub role_name: Option<String>,
    #[serde(default)]
    pub identity: bool,
    #[serde(default)]
    pub collection: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub extension_namespace: Option<String>,
    /// Superclass identity property renamed by this property
    #[serde(default)]
    pub renames: Option<String>,
}

/// Declared property type, as written in declaration documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyTypeDeclaration {
    Boolean,
    Currency,
    Date,
    #[serde(alias = "datetime")]
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
    SchoolYearEnumeration,
    Descriptor,
    DomainEntity,
    Association,
    Common,
    InlineCommon,
    Choice,
}

impl PropertyTypeDeclaration {
    fn scalar(self) -> Option<ScalarType> {
        let scalar = match self {
            Self::Boolean => ScalarType::Boolean,
            Self::Currency => ScalarType::Currency,
            Self::Date => ScalarType::Date,
            Self::DateTime => ScalarType::DateTime,
            Self::Decimal => ScalarType::Decimal,
            Self::Duration => ScalarType::Duration,
            Self::Enumeration => ScalarType::Enumeration,
            Self::Integer => ScalarType::Integer,
            Self::Percent => ScalarType::Percent,
            Self::SharedDecimal => ScalarType::SharedDecimal,
            Self::SharedInteger => ScalarType::SharedInteger,
            Self::SharedShort => ScalarType::SharedShort,
            Self::SharedString => ScalarType::SharedString,
            Self::Short => ScalarType::Short,
            Self::String => ScalarType::String,
            Self::Time => ScalarType::Time,
            Self::Year => ScalarType::Year,
            _ => return None,
        };
        Some(scalar)
    }

    /// Entity kinds a reference of this type may point at
    fn accepted_targets(self) -> &'static [EntityKind] {
        match self {
            Self::Descriptor => &[EntityKind::Descriptor],
            Self::DomainEntity => &[EntityKind::DomainEntity, EntityKind::DomainEntitySubclass],
            Self::Association => &[EntityKind::Association, EntityKind::AssociationSubclass],
            Self::Common => &[EntityKind::Common],
            Self::InlineCommon => &[EntityKind::InlineCommon],
            Self::Choice => &[EntityKind::Choice],
            _ => &[],
        }
    }

    fn kind_with_target(self, target: EntityId) -> PropertyKind {
        match self {
            Self::Descriptor => PropertyKind::Descriptor(target),
            Self::Common => PropertyKind::Common(target),
            Self::InlineCommon => PropertyKind::InlineCommon(target),
            Self::Choice => PropertyKind::Choice(target),
            _ => PropertyKind::Reference(target),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Descriptor => "descriptor",
            Self::DomainEntity => "domainEntity",
            Self::Association => "association",
            Self::Common => "common",
            Self::InlineCommon => "inlineCommon",
            Self::Choice => "choice",
            _ => "scalar",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectiveDeclaration {
    pub source: String,
    pub target: String,
}

// =============================================================================
// Loading
// =============================================================================

/// Load a single declaration file
pub fn load_from_file(path: &Path) -> Result<EntityGraph> {
    let content = fs::read_to_string(path)?;
    let declaration: GraphDeclaration = serde_json::from_str(&content)?;
    build_graph(vec![declaration], hash_inputs([content.as_bytes()]))
}

/// Load every `*.json` declaration document under a directory
pub fn load_from_directory(dir: &Path) -> Result<EntityGraph> {
    let mut declarations = Vec::new();
    let mut contents = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }

        let content = fs::read_to_string(path)?;
        declarations.push(serde_json::from_str::<GraphDeclaration>(&content)?);
        contents.push(content);
        tracing::debug!(path = %path.display(), "loaded declaration document");
    }

    let hash = hash_inputs(contents.iter().map(|c| c.as_bytes()));
    build_graph(declarations, hash)
}

/// Hex SHA-256 over the inputs, in order
pub(crate) fn hash_inputs<'a>(inputs: impl IntoIterator<Item = &'a [u8]>) -> String {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update(input);
    }
    format!("{:x}", hasher.finalize())
}

/// Resolve and assemble declarations into an `EntityGraph`
pub fn build_graph(declarations: Vec<GraphDeclaration>, bundle_hash: String) -> Result<EntityGraph> {
    let directive_syntax = Regex::new(DIRECTIVE_PATTERN)?;

    let entity_decls: Vec<(EntityDeclaration, Option<String>)> = declarations
        .into_iter()
        .flat_map(|doc| {
            let namespace = doc.namespace;
            doc.entities.into_iter().map(move |e| (e, namespace.clone()))
        })
        .collect();

    // Pass 1: register entity names
    let mut by_name: HashMap<String, EntityId> = HashMap::with_capacity(entity_decls.len());
    let mut graph = DiGraph::with_capacity(entity_decls.len(), entity_decls.len() * 3);
    let mut node_indices = Vec::with_capacity(entity_decls.len());

    for (index, (decl, _)) in entity_decls.iter().enumerate() {
        let id = EntityId(index);
        if by_name.insert(decl.name.clone(), id).is_some() {
            return Err(AnalysisError::DuplicateEntity(decl.name.clone()));
        }
        node_indices.push(graph.add_node(id));
    }

    // Pass 2: properties, superclasses, directives
    let mut entities = Vec::with_capacity(entity_decls.len());
    let mut properties: Vec<Property> = Vec::new();
    let mut pending_edges: Vec<(EntityId, EntityId, EdgeKind)> = Vec::new();

    for (index, (decl, doc_namespace)) in entity_decls.iter().enumerate() {
        let owner = EntityId(index);
        let mut property_ids = Vec::with_capacity(decl.properties.len());

        for prop in &decl.properties {
            let kind = match prop.property_type.scalar() {
                Some(scalar) => PropertyKind::Scalar(scalar),
                None if prop.property_type == PropertyTypeDeclaration::SchoolYearEnumeration => {
                    PropertyKind::SchoolYearEnumeration
                }
                None => {
                    let target_name = prop.references.as_deref().unwrap_or(&prop.name);
                    let target = resolve_target(&by_name, &decl.name, &prop.name, target_name)?;
                    let target_kind = entity_decls[target.0].0.kind;
                    if !prop.property_type.accepted_targets().contains(&target_kind) {
                        return Err(AnalysisError::ReferenceKindMismatch {
                            entity: decl.name.clone(),
                            property: prop.name.clone(),
                            target: target_name.to_string(),
                            expected: prop.property_type.label().to_string(),
                            actual: target_kind.to_string(),
                        });
                    }
                    let kind = prop.property_type.kind_with_target(target);
                    pending_edges.push((owner, target, edge_kind(&kind, prop.identity)));
                    kind
                }
            };

            let id = PropertyId(properties.len());
            properties.push(Property {
                id,
                owner,
                name: prop.name.clone(),
                role_name: prop.role_name.clone(),
                kind,
                is_identity: prop.identity,
                is_collection: prop.collection,
                is_required: prop.required || prop.identity,
                extension_namespace: prop.extension_namespace.clone(),
                renames_identity: prop.renames.clone(),
            });
            property_ids.push(id);
        }

        let superclass = match (&decl.superclass, decl.kind.is_subclass()) {
            (Some(name), true) => {
                let target = resolve_target(&by_name, &decl.name, "superclass", name)?;
                pending_edges.push((owner, target, EdgeKind::Superclass));
                Some(target)
            }
            (None, true) => {
                return Err(AnalysisError::InvalidSubclass {
                    entity: decl.name.clone(),
                    reason: "subclass without a superclass".to_string(),
                })
            }
            (Some(_), false) => {
                return Err(AnalysisError::InvalidSubclass {
                    entity: decl.name.clone(),
                    reason: format!("a {} cannot declare a superclass", decl.kind),
                })
            }
            (None, false) => None,
        };

        let mut merge_directives = Vec::with_capacity(decl.merge_directives.len());
        for directive in &decl.merge_directives {
            for text in [&directive.source, &directive.target] {
                if !directive_syntax.is_match(text) {
                    return Err(AnalysisError::InvalidDirective {
                        entity: decl.name.clone(),
                        directive: format!("{} -> {}", directive.source, directive.target),
                    });
                }
            }
            merge_directives.push(MergeDirective {
                source: PropertyPath::parse(&directive.source),
                target: PropertyPath::parse(&directive.target),
            });
        }

        entities.push(Entity {
            id: owner,
            name: decl.name.clone(),
            kind: decl.kind,
            namespace: decl
                .namespace
                .clone()
                .or_else(|| doc_namespace.clone())
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            properties: property_ids,
            superclass,
            merge_directives,
        });
    }

    for (source, target, kind) in pending_edges {
        graph.add_edge(node_indices[source.0], node_indices[target.0], kind);
    }

    let result = EntityGraph {
        entities,
        properties,
        by_name,
        graph,
        node_indices,
        bundle_hash,
    };

    validate_subclasses(&result)?;

    tracing::debug!(
        entities = result.entity_count(),
        properties = result.property_count(),
        edges = result.edge_count(),
        "built entity graph"
    );

    Ok(result)
}

fn edge_kind(kind: &PropertyKind, is_identity: bool) -> EdgeKind {
    match kind {
        PropertyKind::Descriptor(_) => EdgeKind::Descriptor,
        _ if is_identity => EdgeKind::Identity,
        PropertyKind::Reference(_) => EdgeKind::Reference,
        _ => EdgeKind::Contains,
    }
}

fn resolve_target(
    by_name: &HashMap<String, EntityId>,
    entity: &str,
    property: &str,
    target: &str,
) -> Result<EntityId> {
    by_name
        .get(target)
        .copied()
        .ok_or_else(|| AnalysisError::UnresolvedReference {
            entity: entity.to_string(),
            property: property.to_string(),
            target: target.to_string(),
            suggestion: suggest(by_name, target),
        })
}

/// Closest declared name, for error messages
fn suggest(by_name: &HashMap<String, EntityId>, query: &str) -> Option<String> {
    let matcher = SkimMatcherV2::default().ignore_case();
    by_name
        .keys()
        .filter_map(|name| matcher.fuzzy_match(name, query).map(|score| (score, name)))
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
        .map(|(_, name)| name.clone())
}

/// Superclass chains must be acyclic, kind-compatible, and rename only real identities
fn validate_subclasses(graph: &EntityGraph) -> Result<()> {
    for entity in graph.entities() {
        let Some(superclass) = entity.superclass else {
            continue;
        };

        let mut seen = HashSet::from([entity.id]);
        let mut cursor = Some(superclass);
        while let Some(id) = cursor {
            if !seen.insert(id) {
                return Err(AnalysisError::InvalidSubclass {
                    entity: entity.name.clone(),
                    reason: "superclass chain loops".to_string(),
                });
            }
            cursor = graph.entity(id).superclass;
        }

        let parent_kind = graph.entity(superclass).kind;
        let compatible = match entity.kind {
            EntityKind::DomainEntitySubclass => matches!(
                parent_kind,
                EntityKind::DomainEntity | EntityKind::DomainEntitySubclass
            ),
            EntityKind::AssociationSubclass => matches!(
                parent_kind,
                EntityKind::Association | EntityKind::AssociationSubclass
            ),
            _ => false,
        };
        if !compatible {
            return Err(AnalysisError::InvalidSubclass {
                entity: entity.name.clone(),
                reason: format!("cannot subclass a {}", parent_kind),
            });
        }

        let parent_identities: HashSet<String> = graph
            .identity_properties(superclass)
            .into_iter()
            .map(|p| graph.property(p).name.clone())
            .collect();
        for pid in &entity.properties {
            let property = graph.property(*pid);
            if let Some(old) = &property.renames_identity {
                if !parent_identities.contains(old) || !property.is_identity {
                    return Err(AnalysisError::InvalidSubclass {
                        entity: entity.name.clone(),
                        reason: format!(
                            "{} renames '{}', which is not a superclass identity property",
                            property.name, old
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}
