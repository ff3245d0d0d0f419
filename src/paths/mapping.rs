//! Document Paths Mapping
//!
//! Per resource, one entry for every property path that does not cross a
//! reference: scalars, descriptors, school years, and each reference as a
//! whole. Reference entries pair each location in this document with the
//! identity location it denotes in the referenced document, which is what a
//! host needs to resolve a reference to a stored document.

use serde::Serialize;
use std::collections::HashMap;

use super::document::DocumentPath;
use super::{JsonPath, PropertyPath};
use crate::classify::PathType;
use crate::graph::{EntityGraph, EntityId, PropertyKind};
use crate::identity::FlattenedIdentityProperty;

const SCHOOL_YEAR_RESOURCE: &str = "SchoolYearType";
const SCHOOL_YEAR_IDENTITY: &str = "$.schoolYear";

/// One referencing/referenced location pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceJsonPaths {
    pub reference_json_path: JsonPath,
    pub identity_json_path: JsonPath,
    #[serde(rename = "type")]
    pub path_type: PathType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DocumentPaths {
    Scalar {
        path: JsonPath,
        #[serde(rename = "type")]
        path_type: PathType,
    },
    #[serde(rename_all = "camelCase")]
    Descriptor {
        resource_name: String,
        path: JsonPath,
        #[serde(rename = "type")]
        path_type: PathType,
    },
    #[serde(rename_all = "camelCase")]
    Reference {
        resource_name: String,
        reference_json_paths: Vec<ReferenceJsonPaths>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPathsEntry {
    pub property_path: PropertyPath,
    #[serde(flatten)]
    pub paths: DocumentPaths,
}

/// Build the mapping from one entity's document paths
pub fn build_document_paths_mapping(
    graph: &EntityGraph,
    paths: &[DocumentPath],
    fips: &HashMap<EntityId, Vec<FlattenedIdentityProperty>>,
) -> Vec<DocumentPathsEntry> {
    let by_path: HashMap<&PropertyPath, &DocumentPath> = paths.iter().map(|p| (&p.property_path, p)).collect();
    let mut entries: Vec<DocumentPathsEntry> = Vec::new();
    let mut reference_entries: HashMap<&PropertyPath, usize> = HashMap::new();

    for path in paths {
        let terminal = graph.property(path.terminal);
        let path_type = PathType::of(&terminal.kind);

        let Some(site) = &path.reference else {
            let mapped = match terminal.kind {
                PropertyKind::Descriptor(target) => DocumentPaths::Descriptor {
                    resource_name: graph.entity(target).name.clone(),
                    path: path.json_path.clone(),
                    path_type,
                },
                PropertyKind::SchoolYearEnumeration => DocumentPaths::Reference {
                    resource_name: SCHOOL_YEAR_RESOURCE.to_string(),
                    reference_json_paths: vec![ReferenceJsonPaths {
                        reference_json_path: path.json_path.clone(),
                        identity_json_path: JsonPath::new(SCHOOL_YEAR_IDENTITY),
                        path_type,
                    }],
                },
                _ => DocumentPaths::Scalar {
                    path: path.json_path.clone(),
                    path_type,
                },
            };
            entries.push(DocumentPathsEntry {
                property_path: path.property_path.clone(),
                paths: mapped,
            });
            continue;
        };

        let index = *reference_entries.entry(&site.property_path).or_insert_with(|| {
            entries.push(DocumentPathsEntry {
                property_path: site.property_path.clone(),
                paths: DocumentPaths::Reference {
                    resource_name: graph.entity(site.target).name.clone(),
                    reference_json_paths: Vec::new(),
                },
            });
            entries.len() - 1
        });

        let identity = fips
            .get(&site.target)
            .and_then(|list| list.iter().find(|f| f.path == site.identity_path))
            .and_then(|f| f.json_path.clone());
        let Some(identity_json_path) = identity else {
            continue;
        };

        let reference_json_path = path
            .merged_away
            .as_ref()
            .and_then(|covering| by_path.get(covering))
            .map(|covering| covering.json_path.clone())
            .unwrap_or_else(|| path.json_path.clone());

        if let DocumentPaths::Reference { reference_json_paths, .. } = &mut entries[index].paths {
            reference_json_paths.push(ReferenceJsonPaths {
                reference_json_path,
                identity_json_path,
                path_type,
            });
        }
    }

    for entry in &mut entries {
        if let DocumentPaths::Reference { reference_json_paths, .. } = &mut entry.paths {
            reference_json_paths.sort_by(|a, b| {
                a.identity_json_path
                    .cmp(&b.identity_json_path)
                    .then_with(|| a.reference_json_path.cmp(&b.reference_json_path))
            });
            reference_json_paths.dedup_by(|a, b| {
                a.identity_json_path == b.identity_json_path && a.reference_json_path == b.reference_json_path
            });
        }
    }
    entries
}
