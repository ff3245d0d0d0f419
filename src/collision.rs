//! Subclass Naming Collisions
//!
//! A subclass property can render under the same JSON name as one of its
//! superclass's collections (owner-prefix stripping makes this common:
//! `SchoolIdentificationCode` on `School` and
//! `EducationOrganizationIdentificationCode` on `EducationOrganization` both
//! render as `identificationCodes`). Each collision is recorded both ways so
//! schema assembly can rename either side.

use serde::Serialize;
use std::collections::HashMap;

use crate::config::DiagnosticLevel;
use crate::graph::{DiagnosticCode, DiagnosticItem, Diagnostics, EntityGraph, PropertyId};
use crate::paths::Naming;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingCollision {
    pub subclass: String,
    pub subclass_property: PropertyId,
    pub superclass_property: PropertyId,
    pub json_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct NamingCollisions {
    collisions: Vec<NamingCollision>,
    counterparts: HashMap<PropertyId, PropertyId>,
}

impl NamingCollisions {
    /// The property on the other side of a collision
    pub fn counterpart(&self, property: PropertyId) -> Option<PropertyId> {
        self.counterparts.get(&property).copied()
    }

    pub fn collisions(&self) -> &[NamingCollision] {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.collisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collisions.is_empty()
    }
}

pub fn detect_naming_collisions(
    graph: &EntityGraph,
    naming: &Naming,
    level: DiagnosticLevel,
    diagnostics: &mut Diagnostics,
) -> NamingCollisions {
    let mut result = NamingCollisions::default();

    for subclass in graph.entities().filter(|e| e.kind.is_subclass()) {
        let Some(superclass) = subclass.superclass else {
            continue;
        };
        let inherited: Vec<(PropertyId, String)> = graph
            .effective_properties(superclass)
            .into_iter()
            .filter(|p| graph.property(*p).is_collection)
            .map(|p| (p, naming.top_level_segment(graph, graph.property(p))))
            .collect();

        for own in &subclass.properties {
            let property = graph.property(*own);
            if property.renames_identity.is_some() {
                continue;
            }
            let json_name = naming.top_level_segment(graph, property);
            for (inherited_id, inherited_name) in &inherited {
                if *inherited_name != json_name {
                    continue;
                }
                let inherited_property = graph.property(*inherited_id);
                diagnostics.push_at(
                    DiagnosticItem::new(
                        &subclass.name,
                        DiagnosticCode::NamingCollision,
                        format!(
                            "'{}' renders as '{}', colliding with superclass collection '{}'",
                            property.full_name(),
                            json_name,
                            inherited_property.full_name()
                        ),
                    )
                    .with_context(format!(
                        "superclass: {}",
                        graph.entity(inherited_property.owner).name
                    )),
                    level,
                );
                result.counterparts.insert(*own, *inherited_id);
                result.counterparts.insert(*inherited_id, *own);
                result.collisions.push(NamingCollision {
                    subclass: subclass.name.clone(),
                    subclass_property: *own,
                    superclass_property: *inherited_id,
                    json_name: json_name.clone(),
                });
            }
        }
    }

    tracing::debug!(count = result.len(), "detected naming collisions");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph() -> EntityGraph {
        EntityGraph::from_value(json!({ "entities": [
            { "name": "EducationOrganization", "kind": "domainEntity", "properties": [
                { "name": "EducationOrganizationId", "type": "integer", "identity": true },
                { "name": "EducationOrganizationIdentificationCode", "type": "common", "collection": true }
            ]},
            { "name": "School", "kind": "domainEntitySubclass", "superclass": "EducationOrganization", "properties": [
                { "name": "SchoolId", "type": "integer", "identity": true, "renames": "EducationOrganizationId" },
                { "name": "SchoolIdentificationCode", "type": "common", "collection": true },
                { "name": "CharterStatus", "type": "string" }
            ]},
            { "name": "EducationOrganizationIdentificationCode", "kind": "common", "properties": [
                { "name": "IdentificationCode", "type": "string", "identity": true }
            ]},
            { "name": "SchoolIdentificationCode", "kind": "common", "properties": [
                { "name": "IdentificationCode", "type": "string", "identity": true }
            ]}
        ]}))
        .unwrap()
    }

    #[test]
    fn test_collision_is_bidirectional() {
        let graph = graph();
        let mut diagnostics = Diagnostics::new();
        let collisions =
            detect_naming_collisions(&graph, &Naming::default(), DiagnosticLevel::Warn, &mut diagnostics);

        assert_eq!(collisions.len(), 1);
        let collision = &collisions.collisions()[0];
        assert_eq!(collision.subclass, "School");
        assert_eq!(collision.json_name, "identificationCodes");
        assert_eq!(collisions.counterpart(collision.subclass_property), Some(collision.superclass_property));
        assert_eq!(collisions.counterpart(collision.superclass_property), Some(collision.subclass_property));
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.all()[0].code, DiagnosticCode::NamingCollision);
    }

    #[test]
    fn test_allowed_level_still_records() {
        let graph = graph();
        let mut diagnostics = Diagnostics::new();
        let collisions =
            detect_naming_collisions(&graph, &Naming::default(), DiagnosticLevel::Allow, &mut diagnostics);
        assert_eq!(collisions.len(), 1);
        assert!(diagnostics.is_empty());
    }
}
