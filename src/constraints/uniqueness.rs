//! Array Uniqueness Emitter
//!
//! Every array in a document gets the set of key paths that must be jointly
//! unique across its elements. Entries are grouped per top-level property:
//! two unrelated collections give two entries, while collections reached
//! through one non-collection common or inline common share an entry.
//!
//! Nested arrays become `nestedConstraints` whose `basePath` is the enclosing
//! array's element path, with their paths relative to it:
//!
//! ```text
//! { nestedConstraints: [{ basePath: "$.addresses[*]", paths: ["$.periods[*].beginDate"] }] }
//! ```

use serde::{Deserialize, Serialize};

use crate::graph::PropertyId;
use crate::paths::{DocumentPath, JsonPath};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayUniquenessConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<JsonPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<JsonPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_constraints: Vec<ArrayUniquenessConstraint>,
}

impl ArrayUniquenessConstraint {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.nested_constraints.is_empty()
    }
}

/// Uniqueness constraints for one entity's document paths
pub fn array_uniqueness_constraints(paths: &[DocumentPath]) -> Vec<ArrayUniquenessConstraint> {
    let mut groups: Vec<(PropertyId, Vec<&DocumentPath>)> = Vec::new();
    for path in paths {
        if !path.is_present() || !path.is_key || path.array_bases.is_empty() {
            continue;
        }
        match groups.iter_mut().find(|(top, _)| *top == path.top_level) {
            Some((_, members)) => members.push(path),
            None => groups.push((path.top_level, vec![path])),
        }
    }

    groups
        .iter()
        .map(|(_, members)| constraint_for(members, 0))
        .filter(|c| !c.is_empty())
        .collect()
}

/// Constraint for paths already inside `depth` accounted-for arrays
fn constraint_for(paths: &[&DocumentPath], depth: usize) -> ArrayUniquenessConstraint {
    let mut constraint = ArrayUniquenessConstraint::default();
    let mut nested: Vec<(&JsonPath, Vec<&DocumentPath>)> = Vec::new();

    for path in paths {
        let bases = &path.array_bases;
        if bases.len() == depth + 1 {
            let json = match depth {
                0 => path.json_path.clone(),
                _ => relative(&path.json_path, &bases[depth - 1]),
            };
            if !constraint.paths.contains(&json) {
                constraint.paths.push(json);
            }
        } else if bases.len() > depth + 1 {
            let key = &bases[depth + 1];
            match nested.iter_mut().find(|(base, _)| *base == key) {
                Some((_, members)) => members.push(path),
                None => nested.push((key, vec![path])),
            }
        }
    }

    for (_, members) in nested {
        let bases = &members[0].array_bases;
        let mut child = constraint_for(&members, depth + 1);
        child.base_path = Some(match depth {
            0 => bases[0].clone(),
            _ => relative(&bases[depth], &bases[depth - 1]),
        });
        constraint.nested_constraints.push(child);
    }
    constraint
}

fn relative(path: &JsonPath, base: &JsonPath) -> JsonPath {
    path.relative_to(base).unwrap_or_else(|| path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EntityGraph;
    use crate::identity::{flatten_identities, ComponentBuilder};
    use crate::paths::{DocumentWalker, Naming};
    use serde_json::json;
    use std::collections::HashMap;

    fn constraints(declaration: serde_json::Value, entity: &str) -> serde_json::Value {
        let graph = EntityGraph::from_value(declaration).unwrap();
        let mut builder = ComponentBuilder::new(&graph);
        let mut fips = HashMap::new();
        for resource in graph.resources() {
            fips.insert(resource.id, flatten_identities(&graph, resource.id, &mut builder).unwrap());
        }
        let naming = Naming::default();
        let paths = DocumentWalker::new(&graph, &naming, &fips)
            .walk(graph.resolve(entity).unwrap())
            .unwrap();
        serde_json::to_value(array_uniqueness_constraints(&paths)).unwrap()
    }

    #[test]
    fn test_scalar_collection() {
        let result = constraints(
            json!({ "entities": [
                { "name": "DomainEntityName", "kind": "domainEntity", "properties": [
                    { "name": "StringIdentity", "type": "string", "identity": true },
                    { "name": "RequiredStringProperty", "type": "string", "required": true, "collection": true }
                ]}
            ]}),
            "DomainEntityName",
        );
        assert_eq!(
            result,
            json!([{ "paths": ["$.requiredStringProperties[*].requiredStringProperty"] }])
        );
    }

    #[test]
    fn test_common_collection_in_common_collection() {
        let result = constraints(
            json!({ "entities": [
                { "name": "StudentEducationOrganizationAssociation", "kind": "domainEntity", "properties": [
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
            ]}),
            "StudentEducationOrganizationAssociation",
        );
        assert_eq!(
            result,
            json!([{ "nestedConstraints": [
                { "basePath": "$.addresses[*]", "paths": ["$.periods[*].beginDate"] }
            ]}])
        );
    }

    #[test]
    fn test_sibling_collections_in_common_collection() {
        let result = constraints(
            json!({ "entities": [
                { "name": "School", "kind": "domainEntity", "properties": [
                    { "name": "SchoolId", "type": "integer", "identity": true },
                    { "name": "Address", "type": "common", "collection": true }
                ]},
                { "name": "Address", "kind": "common", "properties": [
                    { "name": "StreetNumberName", "type": "string", "required": true },
                    { "name": "Period", "type": "common", "collection": true },
                    { "name": "Contact", "type": "common", "collection": true }
                ]},
                { "name": "Period", "kind": "common", "properties": [
                    { "name": "BeginDate", "type": "integer", "identity": true },
                    { "name": "EndDate", "type": "integer" }
                ]},
                { "name": "Contact", "kind": "common", "properties": [
                    { "name": "ContactType", "type": "descriptor", "identity": true },
                    { "name": "ContactValue", "type": "string" }
                ]},
                { "name": "ContactType", "kind": "descriptor" }
            ]}),
            "School",
        );
        assert_eq!(
            result,
            json!([{ "nestedConstraints": [
                { "basePath": "$.addresses[*]", "paths": ["$.periods[*].beginDate"] },
                { "basePath": "$.addresses[*]", "paths": ["$.contacts[*].contactTypeDescriptor"] }
            ]}])
        );
    }

    #[test]
    fn test_independent_collections_stay_separate() {
        let result = constraints(
            json!({ "entities": [
                { "name": "FirstType", "kind": "descriptor" },
                { "name": "SecondType", "kind": "descriptor" },
                { "name": "TestEntity", "kind": "domainEntity", "properties": [
                    { "name": "TestId", "type": "integer", "identity": true },
                    { "name": "FirstType", "type": "descriptor", "collection": true },
                    { "name": "SecondType", "type": "descriptor", "collection": true }
                ]}
            ]}),
            "TestEntity",
        );
        assert_eq!(
            result,
            json!([
                { "paths": ["$.firstTypes[*].firstTypeDescriptor"] },
                { "paths": ["$.secondTypes[*].secondTypeDescriptor"] }
            ])
        );
    }

    #[test]
    fn test_collections_under_scalar_common_share_entry() {
        let result = constraints(
            json!({ "entities": [
                { "name": "TravelDayOfWeek", "kind": "descriptor" },
                { "name": "TravelDirection", "kind": "descriptor" },
                { "name": "StudentTransportation", "kind": "domainEntity", "properties": [
                    { "name": "StudentId", "type": "integer", "identity": true },
                    { "name": "StudentBusDetails", "type": "common" }
                ]},
                { "name": "StudentBusDetails", "kind": "common", "properties": [
                    { "name": "TravelDayOfWeek", "type": "descriptor", "collection": true },
                    { "name": "TravelDirection", "type": "descriptor", "collection": true },
                    { "name": "BusNumber", "type": "string", "identity": true }
                ]}
            ]}),
            "StudentTransportation",
        );
        assert_eq!(
            result,
            json!([{ "paths": [
                "$.studentBusDetails.travelDayOfWeeks[*].travelDayOfWeekDescriptor",
                "$.studentBusDetails.travelDirections[*].travelDirectionDescriptor"
            ]}])
        );
    }

    #[test]
    fn test_three_levels_relative_base_paths() {
        let result = constraints(
            json!({ "entities": [
                { "name": "Program", "kind": "domainEntity", "properties": [
                    { "name": "ProgramId", "type": "integer", "identity": true },
                    { "name": "Service", "type": "common", "collection": true }
                ]},
                { "name": "Service", "kind": "common", "properties": [
                    { "name": "ServiceCode", "type": "string", "identity": true },
                    { "name": "Period", "type": "common", "collection": true }
                ]},
                { "name": "Period", "kind": "common", "properties": [
                    { "name": "BeginDate", "type": "date", "identity": true },
                    { "name": "Note", "type": "string", "collection": true }
                ]}
            ]}),
            "Program",
        );
        assert_eq!(
            result,
            json!([{
                "paths": ["$.services[*].serviceCode"],
                "nestedConstraints": [{
                    "basePath": "$.services[*]",
                    "paths": ["$.periods[*].beginDate"],
                    "nestedConstraints": [
                        { "basePath": "$.periods[*]", "paths": ["$.notes[*].note"] }
                    ]
                }]
            }])
        );
    }
}
