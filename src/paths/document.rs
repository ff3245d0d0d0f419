//! Document Path Walker
//!
//! Enumerates every terminal value location in an entity's generated
//! document: scalars, descriptors, school years and the identity leaves of
//! reference objects. Each location carries everything the later passes
//! need so none of them walk the graph again:
//!
//! - `property_path` / `json_path`: the two names of the location
//! - `column` and `scope`: the relational column and the chain of tables it
//!   lives in (root, then one per collection or common), for column conflicts
//! - `array_bases`: enclosing array element paths, outermost first
//! - `is_key`: whether the value is part of its array element's identity
//!
//! Reference leaves are produced from the referenced entity's flattened
//! identity properties. Leaves the referenced entity merged away are still
//! listed, marked with `merged_away`, but are not part of the document.
//!
//! Commons, inline commons and choices are expanded in place, so an
//! embedded entity that reaches itself again is a `ContainmentCycle`.

use std::collections::HashMap;

use super::names::{prefix_with_collapse, uncapitalize, Naming};
use super::{JsonPath, PropertyPath};
use crate::error::{AnalysisError, Result};
use crate::graph::{EntityGraph, EntityId, Property, PropertyId, PropertyKind};
use crate::identity::FlattenedIdentityProperty;

const SCHOOL_YEAR_LEAF: &str = "schoolYear";

// =============================================================================
// Document Path
// =============================================================================

/// Where a reference leaf came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSite {
    /// Path of the reference property itself
    pub property_path: PropertyPath,
    pub property: PropertyId,
    pub target: EntityId,
    /// The referenced entity's own identity path for this leaf
    pub identity_path: PropertyPath,
}

/// One terminal value location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPath {
    pub property_path: PropertyPath,
    pub json_path: JsonPath,
    pub terminal: PropertyId,
    /// Property on the entity this location descends from
    pub top_level: PropertyId,
    pub column: String,
    pub scope: Vec<PropertyPath>,
    pub scope_has_identity: bool,
    /// Innermost table is the element table of a common collection
    pub in_common_collection: bool,
    pub array_bases: Vec<JsonPath>,
    pub is_key: bool,
    pub reference: Option<ReferenceSite>,
    /// Covering path inherited from the referenced entity
    pub merged_away: Option<PropertyPath>,
}

impl DocumentPath {
    /// Whether the location exists in the document
    pub fn is_present(&self) -> bool {
        self.merged_away.is_none()
    }

    /// Number of enclosing arrays
    pub fn array_depth(&self) -> usize {
        self.array_bases.len()
    }
}

// =============================================================================
// Walker
// =============================================================================

#[derive(Debug, Clone)]
struct Frame {
    path: PropertyPath,
    json: JsonPath,
    column_prefix: String,
    name_prefix: String,
    scope: Vec<PropertyPath>,
    scope_has_identity: bool,
    in_common_collection: bool,
    array_bases: Vec<JsonPath>,
    key: bool,
    top_level: Option<PropertyId>,
    namespace: String,
    /// Entities being expanded on the way down, root first
    containers: Vec<EntityId>,
}

impl Frame {
    fn root(entity: EntityId, namespace: &str) -> Self {
        Self {
            path: PropertyPath::new(),
            json: JsonPath::root(),
            column_prefix: String::new(),
            name_prefix: String::new(),
            scope: vec![PropertyPath::new()],
            scope_has_identity: true,
            in_common_collection: false,
            array_bases: Vec::new(),
            key: true,
            top_level: None,
            namespace: namespace.to_string(),
            containers: vec![entity],
        }
    }
}

/// Where one property's values land, after collection handling
struct Placement {
    json: JsonPath,
    scope: Vec<PropertyPath>,
    scope_has_identity: bool,
    in_common_collection: bool,
    array_bases: Vec<JsonPath>,
    key: bool,
}

pub struct DocumentWalker<'a> {
    graph: &'a EntityGraph,
    naming: &'a Naming,
    fips: &'a HashMap<EntityId, Vec<FlattenedIdentityProperty>>,
}

impl<'a> DocumentWalker<'a> {
    pub fn new(
        graph: &'a EntityGraph,
        naming: &'a Naming,
        fips: &'a HashMap<EntityId, Vec<FlattenedIdentityProperty>>,
    ) -> Self {
        Self { graph, naming, fips }
    }

    /// All terminal locations of an entity's document, in declaration order
    pub fn walk(&self, entity: EntityId) -> Result<Vec<DocumentPath>> {
        let root = Frame::root(entity, &self.graph.entity(entity).namespace);
        let mut out = Vec::new();
        for property in self.graph.effective_properties(entity) {
            self.walk_property(property, &root, &mut out)?;
        }
        tracing::trace!(entity = %self.graph.entity(entity).name, count = out.len(), "walked document");
        Ok(out)
    }

    fn walk_property(&self, id: PropertyId, frame: &Frame, out: &mut Vec<DocumentPath>) -> Result<()> {
        let prop = self.graph.property(id);
        let path = frame.path.child(prop.full_name());
        let top_level = frame.top_level.unwrap_or(id);
        let key = frame.key && prop.is_identity;
        let name = self.naming.display_name(self.graph, prop, &frame.name_prefix);

        let mut json = frame.json.clone();
        let mut namespace = frame.namespace.clone();
        if let Some(ns) = &prop.extension_namespace {
            if *ns != frame.namespace {
                for segment in self.naming.extension_segments(ns) {
                    json = json.field(&segment);
                }
                namespace = ns.clone();
            }
        }

        match prop.kind {
            PropertyKind::Scalar(_) | PropertyKind::SchoolYearEnumeration | PropertyKind::Descriptor(_) => {
                let placement = self.place(prop, frame, &json, &name, &path, key, true);
                let mut value = placement.json.field(&Naming::element_segment(&prop.kind, &name));
                if prop.kind == PropertyKind::SchoolYearEnumeration {
                    value = value.field(SCHOOL_YEAR_LEAF);
                }
                out.push(DocumentPath {
                    property_path: path,
                    json_path: value,
                    terminal: id,
                    top_level,
                    column: prefix_with_collapse(&prop.full_name(), &frame.column_prefix),
                    scope: placement.scope,
                    scope_has_identity: placement.scope_has_identity,
                    in_common_collection: placement.in_common_collection,
                    array_bases: placement.array_bases,
                    is_key: placement.key,
                    reference: None,
                    merged_away: None,
                });
            }
            PropertyKind::Reference(target) => {
                let fips = self
                    .fips
                    .get(&target)
                    .ok_or_else(|| AnalysisError::UnknownEntity(self.graph.entity(target).name.clone()))?;
                let placement = self.place(prop, frame, &json, &name, &path, key, true);
                let object = placement.json.field(&Naming::element_segment(&prop.kind, &name));

                for fip in fips {
                    let terminal = self.graph.property(fip.terminal);
                    let fip_column = fip.column_name(self.graph);
                    out.push(DocumentPath {
                        property_path: path.join(&fip.path),
                        json_path: object.field(&Naming::leaf_segment(&terminal.kind, &fip_column)),
                        terminal: fip.terminal,
                        top_level,
                        column: prefix_with_collapse(&format!("{}{}", prop.role_prefix(), fip_column), &frame.column_prefix),
                        scope: placement.scope.clone(),
                        scope_has_identity: placement.scope_has_identity,
                        in_common_collection: placement.in_common_collection,
                        array_bases: placement.array_bases.clone(),
                        is_key: placement.key,
                        reference: Some(ReferenceSite {
                            property_path: path.clone(),
                            property: id,
                            target,
                            identity_path: fip.path.clone(),
                        }),
                        merged_away: fip.merge_covered_by.as_ref().map(|c| path.join(c)),
                    });
                }
            }
            PropertyKind::Common(target) => {
                let containers = self.enter(frame, target)?;
                let has_identity = self.graph.has_identity(target);
                let placement = if prop.is_collection {
                    Placement {
                        in_common_collection: true,
                        ..self.place(prop, frame, &json, &name, &path, key, has_identity)
                    }
                } else {
                    let mut scope = frame.scope.clone();
                    scope.push(path.clone());
                    Placement {
                        json: json.field(&uncapitalize(&name)),
                        scope,
                        scope_has_identity: has_identity,
                        in_common_collection: false,
                        array_bases: frame.array_bases.clone(),
                        key,
                    }
                };
                let child = Frame {
                    path,
                    json: placement.json,
                    column_prefix: String::new(),
                    name_prefix: String::new(),
                    scope: placement.scope,
                    scope_has_identity: placement.scope_has_identity,
                    in_common_collection: placement.in_common_collection,
                    array_bases: placement.array_bases,
                    key: placement.key,
                    top_level: Some(top_level),
                    namespace,
                    containers,
                };
                for property in self.graph.effective_properties(target) {
                    self.walk_property(property, &child, out)?;
                }
            }
            PropertyKind::InlineCommon(target) | PropertyKind::Choice(target) => {
                let containers = self.enter(frame, target)?;
                let child = Frame {
                    path,
                    json,
                    column_prefix: format!("{}{}", frame.column_prefix, prop.role_prefix()),
                    name_prefix: format!("{}{}", frame.name_prefix, prop.role_prefix()),
                    key,
                    top_level: Some(top_level),
                    namespace,
                    containers,
                    ..frame.clone()
                };
                for property in self.graph.effective_properties(target) {
                    self.walk_property(property, &child, out)?;
                }
            }
        }
        Ok(())
    }

    /// Container chain for expanding `target` below `frame`
    fn enter(&self, frame: &Frame, target: EntityId) -> Result<Vec<EntityId>> {
        if let Some(start) = frame.containers.iter().position(|id| *id == target) {
            let path = frame.containers[start..]
                .iter()
                .chain(std::iter::once(&target))
                .map(|id| self.graph.entity(*id).name.clone())
                .collect();
            return Err(AnalysisError::ContainmentCycle { path });
        }
        let mut containers = frame.containers.clone();
        containers.push(target);
        Ok(containers)
    }

    /// Open an array for collections; otherwise stay in the enclosing frame.
    /// Array elements are keyed by the element itself unless it is a common.
    #[allow(clippy::too_many_arguments)]
    fn place(
        &self,
        prop: &Property,
        frame: &Frame,
        json: &JsonPath,
        name: &str,
        path: &PropertyPath,
        key: bool,
        element_has_identity: bool,
    ) -> Placement {
        if !prop.is_collection {
            return Placement {
                json: json.clone(),
                scope: frame.scope.clone(),
                scope_has_identity: frame.scope_has_identity,
                in_common_collection: frame.in_common_collection,
                array_bases: frame.array_bases.clone(),
                key,
            };
        }

        let element = json.field(&self.naming.collection_segment(name)).array();
        let mut scope = frame.scope.clone();
        scope.push(path.clone());
        let mut array_bases = frame.array_bases.clone();
        array_bases.push(element.clone());
        Placement {
            json: element,
            scope,
            scope_has_identity: element_has_identity,
            in_common_collection: false,
            array_bases,
            key: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{flatten_identities, ComponentBuilder};
    use serde_json::json;

    fn walk(graph: &EntityGraph, entity: &str) -> Vec<DocumentPath> {
        let mut builder = ComponentBuilder::new(graph);
        let mut fips = HashMap::new();
        for resource in graph.resources() {
            fips.insert(resource.id, flatten_identities(graph, resource.id, &mut builder).unwrap());
        }
        let naming = Naming::default();
        DocumentWalker::new(graph, &naming, &fips)
            .walk(graph.resolve(entity).unwrap())
            .unwrap()
    }

    fn json_paths(paths: &[DocumentPath]) -> Vec<&str> {
        paths.iter().map(|p| p.json_path.as_str()).collect()
    }

    #[test]
    fn test_reference_and_school_year_rendering() {
        let graph = EntityGraph::from_value(json!({
            "entities": [
                { "name": "School", "kind": "domainEntity", "properties": [
                    { "name": "SchoolId", "type": "integer", "identity": true }
                ]},
                { "name": "Term", "kind": "descriptor" },
                { "name": "GradingPeriod", "kind": "domainEntity", "properties": [
                    { "name": "Term", "type": "descriptor", "identity": true },
                    { "name": "School", "type": "domainEntity", "identity": true },
                    { "name": "SchoolYear", "type": "schoolYearEnumeration", "identity": true }
                ]},
                { "name": "Session", "kind": "domainEntity", "properties": [
                    { "name": "SessionName", "type": "string", "identity": true },
                    { "name": "SchoolYear", "type": "schoolYearEnumeration", "identity": true },
                    { "name": "GradingPeriod", "type": "domainEntity", "collection": true }
                ]}
            ]
        }))
        .unwrap();

        let paths = walk(&graph, "Session");
        assert_eq!(
            json_paths(&paths),
            vec![
                "$.sessionName",
                "$.schoolYearTypeReference.schoolYear",
                "$.gradingPeriods[*].gradingPeriodReference.termDescriptor",
                "$.gradingPeriods[*].gradingPeriodReference.schoolId",
                "$.gradingPeriods[*].gradingPeriodReference.schoolYear",
            ]
        );
        assert!(paths[0].is_key);
        assert_eq!(paths[4].property_path.to_string(), "GradingPeriod.SchoolYear");
        assert_eq!(paths[4].array_bases, vec![JsonPath::new("$.gradingPeriods[*]")]);
        assert!(paths[4].is_key);
        let site = paths[3].reference.as_ref().unwrap();
        assert_eq!(site.identity_path.to_string(), "School.SchoolId");
    }

    #[test]
    fn test_common_collections_and_keys() {
        let graph = EntityGraph::from_value(json!({
            "entities": [
                { "name": "StudentEducationOrganizationAssociation", "kind": "association", "properties": [
                    { "name": "StudentId", "type": "integer", "identity": true },
                    { "name": "Address", "type": "common", "collection": true }
                ]},
                { "name": "Address", "kind": "common", "properties": [
                    { "name": "StreetNumberName", "type": "string", "required": true },
                    { "name": "Period", "type": "common", "collection": true }
                ]},
                { "name": "Period", "kind": "common", "properties": [
                    { "name": "BeginDate", "type": "integer", "identity": true },
                    { "name": "EndDate", "type": "integer" }
                ]}
            ]
        }))
        .unwrap();

        let paths = walk(&graph, "StudentEducationOrganizationAssociation");
        assert_eq!(
            json_paths(&paths),
            vec![
                "$.studentId",
                "$.addresses[*].streetNumberName",
                "$.addresses[*].periods[*].beginDate",
                "$.addresses[*].periods[*].endDate",
            ]
        );
        let keys: Vec<bool> = paths.iter().map(|p| p.is_key).collect();
        assert_eq!(keys, vec![true, false, true, false]);
        assert!(!paths[1].scope_has_identity);
        assert_eq!(paths[2].array_depth(), 2);
        assert_eq!(paths[2].scope.len(), 3);
    }

    #[test]
    fn test_inline_common_role_prefix_and_extension() {
        let graph = EntityGraph::from_value(json!({
            "namespace": "EdFi",
            "entities": [
                { "name": "Staff", "kind": "domainEntity", "properties": [
                    { "name": "StaffId", "type": "integer", "identity": true },
                    { "name": "Citizenship", "type": "inlineCommon", "roleName": "Birth" },
                    { "name": "PetName", "type": "string", "extensionNamespace": "Sample" }
                ]},
                { "name": "Citizenship", "kind": "inlineCommon", "properties": [
                    { "name": "Country", "type": "string" },
                    { "name": "BirthCity", "type": "string" }
                ]}
            ]
        }))
        .unwrap();

        let paths = walk(&graph, "Staff");
        assert_eq!(
            json_paths(&paths),
            vec!["$.staffId", "$.birthCountry", "$.birthCity", "$._ext.sample.petName"]
        );
        assert_eq!(paths[1].column, "BirthCountry");
        assert_eq!(paths[2].column, "BirthCity");
        assert_eq!(paths[1].property_path.to_string(), "BirthCitizenship.Country");
    }

    #[test]
    fn test_self_containing_common_is_an_error() {
        let graph = EntityGraph::from_value(json!({
            "entities": [
                { "name": "Thing", "kind": "domainEntity", "properties": [
                    { "name": "ThingId", "type": "integer", "identity": true },
                    { "name": "Node", "type": "common" }
                ]},
                { "name": "Node", "kind": "common", "properties": [
                    { "name": "Label", "type": "string" },
                    { "name": "ChildNode", "type": "common", "references": "Node", "collection": true }
                ]}
            ]
        }))
        .unwrap();

        let naming = Naming::default();
        let fips = HashMap::new();
        let result = DocumentWalker::new(&graph, &naming, &fips).walk(graph.resolve("Thing").unwrap());
        match result {
            Err(AnalysisError::ContainmentCycle { path }) => assert_eq!(path, vec!["Node", "Node"]),
            other => panic!("Expected ContainmentCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_common_collection_paths_are_flagged() {
        let graph = EntityGraph::from_value(json!({
            "entities": [
                { "name": "StudentAssessment", "kind": "domainEntity", "properties": [
                    { "name": "AssessmentId", "type": "integer", "identity": true },
                    { "name": "Item", "type": "common", "collection": true },
                    { "name": "Note", "type": "string", "collection": true }
                ]},
                { "name": "Item", "kind": "common", "properties": [
                    { "name": "Code", "type": "string", "identity": true },
                    { "name": "Response", "type": "string", "collection": true }
                ]}
            ]
        }))
        .unwrap();

        let paths = walk(&graph, "StudentAssessment");
        let flagged: Vec<(&str, bool)> = paths
            .iter()
            .map(|p| (p.json_path.as_str(), p.in_common_collection))
            .collect();
        assert_eq!(
            flagged,
            vec![
                ("$.assessmentId", false),
                ("$.items[*].code", true),
                ("$.items[*].responses[*].response", false),
                ("$.notes[*].note", false),
            ]
        );
    }
}
