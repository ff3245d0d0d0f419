//! JSON Path Classification
//!
//! Tags every present terminal path by wire representation so hosts can
//! coerce string input (query parameters, CSV loads) to the declared type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::graph::{EntityGraph, PropertyKind, ScalarType};
use crate::paths::{DocumentPath, JsonPath};

/// Wire category of a terminal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathType {
    Boolean,
    Number,
    Date,
    DateTime,
    Time,
    String,
}

impl PathType {
    pub fn of(kind: &PropertyKind) -> Self {
        match kind {
            PropertyKind::Scalar(scalar) => match scalar {
                ScalarType::Boolean => Self::Boolean,
                ScalarType::Currency
                | ScalarType::Decimal
                | ScalarType::Duration
                | ScalarType::Integer
                | ScalarType::Percent
                | ScalarType::SharedDecimal
                | ScalarType::SharedInteger
                | ScalarType::SharedShort
                | ScalarType::Short
                | ScalarType::Year => Self::Number,
                ScalarType::Date => Self::Date,
                ScalarType::DateTime => Self::DateTime,
                ScalarType::Time => Self::Time,
                ScalarType::Enumeration | ScalarType::SharedString | ScalarType::String => Self::String,
            },
            PropertyKind::SchoolYearEnumeration => Self::Number,
            _ => Self::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Date => "date",
            Self::DateTime => "date-time",
            Self::Time => "time",
            Self::String => "string",
        }
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorted path sets per coercible category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCoercion {
    pub boolean_json_paths: Vec<JsonPath>,
    pub numeric_json_paths: Vec<JsonPath>,
    pub date_time_json_paths: Vec<JsonPath>,
}

pub struct Classifier<'a> {
    graph: &'a EntityGraph,
}

impl<'a> Classifier<'a> {
    pub fn new(graph: &'a EntityGraph) -> Self {
        Self { graph }
    }

    pub fn path_type(&self, path: &DocumentPath) -> PathType {
        PathType::of(&self.graph.property(path.terminal).kind)
    }

    pub fn classify_all(&self, paths: &[DocumentPath]) -> TypeCoercion {
        let mut coercion = TypeCoercion::default();
        for path in paths.iter().filter(|p| p.is_present()) {
            let bucket = match self.path_type(path) {
                PathType::Boolean => &mut coercion.boolean_json_paths,
                PathType::Number => &mut coercion.numeric_json_paths,
                PathType::DateTime => &mut coercion.date_time_json_paths,
                PathType::Date | PathType::Time | PathType::String => continue,
            };
            bucket.push(path.json_path.clone());
        }

        for bucket in [
            &mut coercion.boolean_json_paths,
            &mut coercion.numeric_json_paths,
            &mut coercion.date_time_json_paths,
        ] {
            bucket.sort();
            bucket.dedup();
        }
        coercion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{flatten_identities, ComponentBuilder};
    use crate::paths::{DocumentWalker, Naming};
    use serde_json::json;
    use std::collections::HashMap;

    fn classify(graph: &EntityGraph, entity: &str) -> TypeCoercion {
        let mut builder = ComponentBuilder::new(graph);
        let mut fips = HashMap::new();
        for resource in graph.resources() {
            fips.insert(resource.id, flatten_identities(graph, resource.id, &mut builder).unwrap());
        }
        let naming = Naming::default();
        let paths = DocumentWalker::new(graph, &naming, &fips)
            .walk(graph.resolve(entity).unwrap())
            .unwrap();
        Classifier::new(graph).classify_all(&paths)
    }

    #[test]
    fn test_scalar_categories() {
        let graph = EntityGraph::from_value(json!({ "entities": [
            { "name": "DomainEntityName", "kind": "domainEntity", "properties": [
                { "name": "OptionalBooleanProperty", "type": "boolean" },
                { "name": "RequiredCurrencyProperty", "type": "currency", "required": true },
                { "name": "RequiredDurationProperty", "type": "duration", "required": true },
                { "name": "RequiredDateProperty", "type": "date", "required": true },
                { "name": "RequiredDatetimeProperty", "type": "datetime", "required": true },
                { "name": "StringIdentity", "type": "string", "identity": true },
                { "name": "RequiredTimeProperty", "type": "time", "required": true },
                { "name": "SchoolYear", "type": "schoolYearEnumeration" },
                { "name": "OptionalYear", "type": "year" },
                { "name": "DateTimeIdentity", "type": "dateTime", "identity": true }
            ]}
        ]}))
        .unwrap();

        let coercion = classify(&graph, "DomainEntityName");
        assert_eq!(coercion.boolean_json_paths, vec![JsonPath::new("$.optionalBooleanProperty")]);
        assert_eq!(
            coercion.numeric_json_paths,
            vec![
                JsonPath::new("$.optionalYear"),
                JsonPath::new("$.requiredCurrencyProperty"),
                JsonPath::new("$.requiredDurationProperty"),
                JsonPath::new("$.schoolYearTypeReference.schoolYear"),
            ]
        );
        assert_eq!(
            coercion.date_time_json_paths,
            vec![JsonPath::new("$.dateTimeIdentity"), JsonPath::new("$.requiredDatetimeProperty")]
        );
    }

    #[test]
    fn test_reference_collection_leaves_use_wildcards() {
        let graph = EntityGraph::from_value(json!({ "entities": [
            { "name": "AssessmentScoreRangeLearningStandard", "kind": "domainEntity", "properties": [
                { "name": "ScoreRangeId", "type": "integer", "identity": true },
                { "name": "LearningStandard", "type": "domainEntity", "required": true, "collection": true }
            ]},
            { "name": "LearningStandard", "kind": "domainEntity", "properties": [
                { "name": "LearningStandardId", "type": "integer", "identity": true },
                { "name": "SomeDateTime", "type": "dateTime", "identity": true }
            ]}
        ]}))
        .unwrap();

        let coercion = classify(&graph, "AssessmentScoreRangeLearningStandard");
        assert!(coercion.boolean_json_paths.is_empty());
        assert_eq!(
            coercion.date_time_json_paths,
            vec![JsonPath::new("$.learningStandards[*].learningStandardReference.someDateTime")]
        );
        assert_eq!(
            coercion.numeric_json_paths,
            vec![
                JsonPath::new("$.learningStandards[*].learningStandardReference.learningStandardId"),
                JsonPath::new("$.scoreRangeId"),
            ]
        );
    }

    #[test]
    fn test_path_type_labels() {
        assert_eq!(PathType::DateTime.to_string(), "date-time");
        assert_eq!(serde_json::to_value(PathType::DateTime).unwrap(), json!("date-time"));
        assert_eq!(PathType::of(&PropertyKind::SchoolYearEnumeration), PathType::Number);
    }
}
