//! Identity Flattener
//!
//! Produces an entity's flattened identity properties: every property path
//! from the entity down to a terminal scalar identity, depth first in
//! declaration order. Subclasses flatten over their effective identity list,
//! so a renamed superclass identity is replaced rather than duplicated.

use serde::Serialize;
use std::collections::HashSet;

use super::component::ComponentBuilder;
use crate::error::Result;
use crate::graph::{EntityGraph, EntityId, PropertyId};
use crate::paths::{JsonPath, PropertyPath};

/// One full path from an entity to one terminal identity value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenedIdentityProperty {
    pub path: PropertyPath,
    /// Properties along the path, the terminal last
    #[serde(skip)]
    pub chain: Vec<PropertyId>,
    #[serde(skip)]
    pub terminal: PropertyId,
    /// Document location, once paths are mapped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_path: Option<JsonPath>,
    /// Ultimate covering path when merged away
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_covered_by: Option<PropertyPath>,
}

impl FlattenedIdentityProperty {
    fn from_chain(graph: &EntityGraph, chain: Vec<PropertyId>) -> Option<Self> {
        let terminal = *chain.last()?;
        let path = PropertyPath::from_segments(chain.iter().map(|p| graph.property(*p).full_name()));
        Some(Self {
            path,
            chain,
            terminal,
            json_path: None,
            merge_covered_by: None,
        })
    }

    /// Relational column: role names along the hops, then the terminal's full name
    pub fn column_name(&self, graph: &EntityGraph) -> String {
        let (last, hops) = match self.chain.split_last() {
            Some(split) => split,
            None => return String::new(),
        };
        let mut column: String = hops.iter().map(|p| graph.property(*p).role_prefix()).collect();
        column.push_str(&graph.property(*last).full_name());
        column
    }

    /// Index of the first reference hop in the chain, if any
    pub fn first_reference_hop(&self, graph: &EntityGraph) -> Option<usize> {
        self.chain[..self.chain.len().saturating_sub(1)]
            .iter()
            .position(|p| graph.property(*p).kind.is_reference())
    }
}

/// Flatten the identity of one entity
pub fn flatten_identities(
    graph: &EntityGraph,
    entity: EntityId,
    builder: &mut ComponentBuilder<'_>,
) -> Result<Vec<FlattenedIdentityProperty>> {
    let mut seen: HashSet<PropertyPath> = HashSet::new();
    let mut result = Vec::new();

    for property in graph.identity_properties(entity) {
        let component = builder.build(property)?;
        for chain in component.leaf_chains() {
            let Some(fip) = FlattenedIdentityProperty::from_chain(graph, chain) else {
                continue;
            };
            if seen.insert(fip.path.clone()) {
                result.push(fip);
            }
        }
    }

    tracing::trace!(entity = %graph.entity(entity).name, count = result.len(), "flattened identities");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(fips: &[FlattenedIdentityProperty]) -> Vec<String> {
        fips.iter().map(|f| f.path.to_string()).collect()
    }

    fn graph() -> EntityGraph {
        EntityGraph::from_value(json!({
            "entities": [
                { "name": "EducationOrganization", "kind": "domainEntity", "properties": [
                    { "name": "EducationOrganizationId", "type": "integer", "identity": true },
                    { "name": "NameOfInstitution", "type": "string" }
                ]},
                { "name": "School", "kind": "domainEntitySubclass", "superclass": "EducationOrganization", "properties": [
                    { "name": "SchoolId", "type": "integer", "identity": true, "renames": "EducationOrganizationId" }
                ]},
                { "name": "GradingPeriodDescriptor", "kind": "descriptor" },
                { "name": "GradingPeriod", "kind": "domainEntity", "properties": [
                    { "name": "GradingPeriodDescriptor", "type": "descriptor", "identity": true },
                    { "name": "PeriodSequence", "type": "integer", "identity": true },
                    { "name": "School", "type": "domainEntity", "identity": true },
                    { "name": "SchoolYear", "type": "schoolYearEnumeration", "identity": true }
                ]},
                { "name": "Session", "kind": "domainEntity", "properties": [
                    { "name": "School", "type": "domainEntity", "identity": true },
                    { "name": "SchoolYear", "type": "schoolYearEnumeration", "identity": true },
                    { "name": "SessionName", "type": "string", "identity": true },
                    { "name": "GradingPeriod", "type": "domainEntity", "collection": true }
                ]},
                { "name": "Section", "kind": "domainEntity", "properties": [
                    { "name": "SectionIdentifier", "type": "string", "identity": true },
                    { "name": "Session", "type": "domainEntity", "identity": true },
                    { "name": "School", "roleName": "Location", "type": "domainEntity", "identity": true }
                ]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_multi_hop_flattening() {
        let graph = graph();
        let mut builder = ComponentBuilder::new(&graph);
        let section = graph.resolve("Section").unwrap();
        let fips = flatten_identities(&graph, section, &mut builder).unwrap();

        assert_eq!(
            paths(&fips),
            vec![
                "SectionIdentifier",
                "Session.School.SchoolId",
                "Session.SchoolYear",
                "Session.SessionName",
                "LocationSchool.SchoolId",
            ]
        );
        for fip in &fips {
            let terminal = graph.property(fip.terminal);
            assert!(terminal.is_identity);
            assert!(!terminal.kind.is_reference());
        }
    }

    #[test]
    fn test_subclass_rename_replaces_superclass_identity() {
        let graph = graph();
        let mut builder = ComponentBuilder::new(&graph);
        let school = graph.resolve("School").unwrap();
        let fips = flatten_identities(&graph, school, &mut builder).unwrap();
        assert_eq!(paths(&fips), vec!["SchoolId"]);
    }

    #[test]
    fn test_column_names_carry_role_prefixes() {
        let graph = graph();
        let mut builder = ComponentBuilder::new(&graph);
        let section = graph.resolve("Section").unwrap();
        let fips = flatten_identities(&graph, section, &mut builder).unwrap();
        let columns: Vec<String> = fips.iter().map(|f| f.column_name(&graph)).collect();
        assert_eq!(
            columns,
            vec!["SectionIdentifier", "SchoolId", "SchoolYear", "SessionName", "LocationSchoolId"]
        );
        assert_eq!(fips[0].first_reference_hop(&graph), None);
        assert_eq!(fips[1].first_reference_hop(&graph), Some(0));
    }

    #[test]
    fn test_no_duplicate_paths() {
        let graph = graph();
        let mut builder = ComponentBuilder::new(&graph);
        for entity in graph.resources() {
            let fips = flatten_identities(&graph, entity.id, &mut builder).unwrap();
            let unique: HashSet<&PropertyPath> = fips.iter().map(|f| &f.path).collect();
            assert_eq!(unique.len(), fips.len());
        }
    }
}
