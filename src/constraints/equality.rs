//! Equality Constraint Emitter
//!
//! Explicit constraints come from directive coverings: the covered path's
//! JSON location must equal its covering's. Implicit constraints come from
//! column conflicts, where two present, uncovered paths land on the same
//! relational column without any directive saying so. The path in the
//! enclosing table is the source of such a pair, except when the nested
//! table belongs to a common collection: there the collection side is the
//! source, and an element with identity only conflicts once every one of
//! its identity columns is shared with an enclosing table.
//!
//! Constraints are unordered pairs; the first orientation seen is kept.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::DiagnosticLevel;
use crate::graph::{DiagnosticCode, DiagnosticItem, Diagnostics};
use crate::merge::MergeResolution;
use crate::paths::{DocumentPath, JsonPath, PropertyPath};

/// Two document locations that must hold equal values
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqualityConstraint {
    pub source_json_path: JsonPath,
    pub target_json_path: JsonPath,
}

impl EqualityConstraint {
    /// Same pair, either orientation
    pub fn same_pair(&self, a: &JsonPath, b: &JsonPath) -> bool {
        (self.source_json_path == *a && self.target_json_path == *b)
            || (self.source_json_path == *b && self.target_json_path == *a)
    }
}

pub struct EqualityEmitter<'a> {
    entity: &'a str,
    column_conflict: DiagnosticLevel,
}

impl<'a> EqualityEmitter<'a> {
    pub fn new(entity: &'a str, column_conflict: DiagnosticLevel) -> Self {
        Self { entity, column_conflict }
    }

    pub fn emit(
        &self,
        paths: &[DocumentPath],
        resolution: &MergeResolution,
        diagnostics: &mut Diagnostics,
    ) -> Vec<EqualityConstraint> {
        let mut constraints = Vec::new();
        self.explicit(paths, resolution, &mut constraints);
        let explicit = constraints.len();
        self.column_conflicts(paths, resolution, &mut constraints, diagnostics);

        tracing::debug!(
            entity = self.entity,
            explicit,
            implicit = constraints.len() - explicit,
            "emitted equality constraints"
        );
        constraints
    }

    fn explicit(&self, paths: &[DocumentPath], resolution: &MergeResolution, out: &mut Vec<EqualityConstraint>) {
        let by_path: HashMap<&PropertyPath, &DocumentPath> =
            paths.iter().map(|p| (&p.property_path, p)).collect();

        for covering in resolution.coverings() {
            if !covering.origin.is_directive() {
                continue;
            }
            let (Some(source), Some(target)) = (by_path.get(&covering.covered), by_path.get(&covering.covering))
            else {
                continue;
            };
            if source.is_present() && target.is_present() {
                push_unique(out, &source.json_path, &target.json_path);
            }
        }
    }

    fn column_conflicts(
        &self,
        paths: &[DocumentPath],
        resolution: &MergeResolution,
        out: &mut Vec<EqualityConstraint>,
        diagnostics: &mut Diagnostics,
    ) {
        // Same-column groups of present, uncovered paths, in traversal order
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (index, path) in paths.iter().enumerate() {
            if !path.is_present() || resolution.is_covered(&path.property_path) {
                continue;
            }
            match groups.iter_mut().find(|(column, _)| *column == path.column) {
                Some((_, members)) => members.push(index),
                None => groups.push((path.column.as_str(), vec![index])),
            }
        }

        let mut pairs: Vec<(usize, usize)> = Vec::new();
        for (_, members) in &groups {
            for (position, later) in members.iter().enumerate().skip(1) {
                let earlier = members[..position].iter().find(|earlier| {
                    conflicts(&paths[**earlier], &paths[*later])
                        && fully_matched(paths, &groups, nested(&paths[**earlier], &paths[*later]))
                });
                if let Some(earlier) = earlier {
                    pairs.push(orient(paths, *earlier, *later));
                }
            }
        }
        pairs.sort();

        for (source, target) in pairs {
            let (source, target) = (&paths[source], &paths[target]);
            if push_unique(out, &source.json_path, &target.json_path) {
                tracing::trace!(
                    entity = self.entity,
                    source = %source.json_path,
                    target = %target.json_path,
                    "column conflict"
                );
                diagnostics.push_at(
                    DiagnosticItem::new(
                        self.entity,
                        DiagnosticCode::ColumnConflict,
                        format!(
                            "'{}' and '{}' share column '{}' without a merge directive",
                            source.property_path, target.property_path, source.column
                        ),
                    )
                    .with_context(format!("{} = {}", source.json_path, target.json_path)),
                    self.column_conflict,
                );
            }
        }
    }
}

/// A common collection element with identity conflicts only when all of
/// its identity columns also appear in an enclosing table
fn fully_matched(paths: &[DocumentPath], groups: &[(&str, Vec<usize>)], deep: Option<&DocumentPath>) -> bool {
    let Some(deep) = deep else {
        return true;
    };
    if !deep.in_common_collection || !deep.scope_has_identity {
        return true;
    }
    groups.iter().all(|(_, members)| {
        members
            .iter()
            .map(|index| &paths[*index])
            .filter(|identity| identity.is_key && identity.scope == deep.scope)
            .all(|identity| {
                members.iter().map(|index| &paths[*index]).any(|outer| {
                    outer.scope.len() < identity.scope.len() && identity.scope.starts_with(&outer.scope)
                })
            })
    })
}

/// The deeper of two paths in different tables
fn nested<'p>(a: &'p DocumentPath, b: &'p DocumentPath) -> Option<&'p DocumentPath> {
    match a.scope.len().cmp(&b.scope.len()) {
        std::cmp::Ordering::Less => Some(b),
        std::cmp::Ordering::Greater => Some(a),
        std::cmp::Ordering::Equal => None,
    }
}

/// (source, target) for a conflicting pair given in traversal order
fn orient(paths: &[DocumentPath], earlier: usize, later: usize) -> (usize, usize) {
    let (a, b) = (&paths[earlier], &paths[later]);
    let (shallow, deep) = match a.scope.len().cmp(&b.scope.len()) {
        std::cmp::Ordering::Equal => return (earlier, later),
        std::cmp::Ordering::Less => (earlier, later),
        std::cmp::Ordering::Greater => (later, earlier),
    };
    if paths[deep].in_common_collection {
        (deep, shallow)
    } else {
        (shallow, deep)
    }
}

/// Same table, or a nested table whose path is part of its element's identity
fn conflicts(a: &DocumentPath, b: &DocumentPath) -> bool {
    if a.json_path == b.json_path {
        return false;
    }
    if a.scope == b.scope {
        return true;
    }
    let (shallow, deep) = if a.scope.len() < b.scope.len() { (a, b) } else { (b, a) };
    deep.scope.starts_with(&shallow.scope) && (deep.is_key || !deep.scope_has_identity)
}

fn push_unique(out: &mut Vec<EqualityConstraint>, source: &JsonPath, target: &JsonPath) -> bool {
    if source == target || out.iter().any(|c| c.same_pair(source, target)) {
        return false;
    }
    out.push(EqualityConstraint {
        source_json_path: source.clone(),
        target_json_path: target.clone(),
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{MergeDirective, PropertyId};
    use crate::merge::MergeResolver;
    use std::collections::HashMap as Map;

    fn path(property: &str, json: &str, column: &str, scope: &[&str], key: bool) -> DocumentPath {
        DocumentPath {
            property_path: PropertyPath::parse(property),
            json_path: JsonPath::new(json),
            terminal: PropertyId(0),
            top_level: PropertyId(0),
            column: column.to_string(),
            scope: scope.iter().map(|s| PropertyPath::parse(s)).collect(),
            scope_has_identity: true,
            in_common_collection: false,
            array_bases: Vec::new(),
            is_key: key,
            reference: None,
            merged_away: None,
        }
    }

    fn json_pairs(constraints: &[EqualityConstraint]) -> Vec<(&str, &str)> {
        constraints
            .iter()
            .map(|c| (c.source_json_path.as_str(), c.target_json_path.as_str()))
            .collect()
    }

    fn course_offering_paths() -> Vec<DocumentPath> {
        vec![
            path("LocalCourseCode", "$.localCourseCode", "LocalCourseCode", &[""], true),
            path("School.SchoolId", "$.schoolReference.schoolId", "SchoolId", &[""], true),
            path("Session.School.SchoolId", "$.sessionReference.schoolId", "SchoolId", &[""], true),
            path("Session.SessionName", "$.sessionReference.sessionName", "SessionName", &[""], true),
        ]
    }

    #[test]
    fn test_explicit_directive_suppresses_implicit_duplicate() {
        let paths = course_offering_paths();
        let candidates: Vec<PropertyPath> = paths.iter().map(|p| p.property_path.clone()).collect();
        let directives = vec![MergeDirective {
            source: PropertyPath::parse("School"),
            target: PropertyPath::parse("Session.School"),
        }];
        let mut diagnostics = Diagnostics::new();
        let resolution =
            MergeResolver::new("CourseOffering", &directives).resolve(&candidates, &Map::new(), &mut diagnostics);

        let constraints = EqualityEmitter::new("CourseOffering", DiagnosticLevel::Warn)
            .emit(&paths, &resolution, &mut diagnostics);
        assert_eq!(
            json_pairs(&constraints),
            vec![("$.schoolReference.schoolId", "$.sessionReference.schoolId")]
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_column_conflict_without_directive() {
        let paths = course_offering_paths();
        let mut diagnostics = Diagnostics::new();
        let constraints = EqualityEmitter::new("CourseOffering", DiagnosticLevel::Warn).emit(
            &paths,
            &MergeResolution::default(),
            &mut diagnostics,
        );
        assert_eq!(
            json_pairs(&constraints),
            vec![("$.schoolReference.schoolId", "$.sessionReference.schoolId")]
        );
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.all()[0].code, DiagnosticCode::ColumnConflict);
    }

    #[test]
    fn test_nested_scope_needs_key() {
        let mut paths = vec![
            path("SchoolYear", "$.schoolYearTypeReference.schoolYear", "SchoolYear", &[""], true),
            path("Note.SchoolYear", "$.notes[*].schoolYear", "SchoolYear", &["", "Note"], false),
        ];
        let mut diagnostics = Diagnostics::new();
        let none = EqualityEmitter::new("E", DiagnosticLevel::Allow).emit(
            &paths,
            &MergeResolution::default(),
            &mut diagnostics,
        );
        assert!(none.is_empty());

        paths[1].is_key = true;
        let some = EqualityEmitter::new("E", DiagnosticLevel::Allow).emit(
            &paths,
            &MergeResolution::default(),
            &mut diagnostics,
        );
        assert_eq!(some.len(), 1);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_sibling_scopes_do_not_conflict() {
        let paths = vec![
            path("A.Code", "$.as[*].code", "Code", &["", "A"], true),
            path("B.Code", "$.bs[*].code", "Code", &["", "B"], true),
        ];
        let mut diagnostics = Diagnostics::new();
        let constraints = EqualityEmitter::new("E", DiagnosticLevel::Warn).emit(
            &paths,
            &MergeResolution::default(),
            &mut diagnostics,
        );
        assert!(constraints.is_empty());
    }

    #[test]
    fn test_idempotent_on_rerun() {
        let paths = course_offering_paths();
        let emitter = EqualityEmitter::new("CourseOffering", DiagnosticLevel::Allow);
        let first = emitter.emit(&paths, &MergeResolution::default(), &mut Diagnostics::new());
        let second = emitter.emit(&paths, &MergeResolution::default(), &mut Diagnostics::new());
        assert_eq!(first, second);
    }

    #[test]
    fn test_common_collection_needs_every_identity_shared() {
        let element = |property: &str, json: &str, column: &str, key: bool| DocumentPath {
            in_common_collection: true,
            ..path(property, json, column, &["", "DegreeSpecialization"], key)
        };
        let mut paths = vec![
            path("BeginDate", "$.beginDate", "BeginDate", &[""], true),
            element("DegreeSpecialization.BeginDate", "$.degreeSpecializations[*].beginDate", "BeginDate", true),
            element(
                "DegreeSpecialization.MajorSpecialization",
                "$.degreeSpecializations[*].majorSpecialization",
                "MajorSpecialization",
                true,
            ),
        ];
        let emitter = EqualityEmitter::new("E", DiagnosticLevel::Allow);
        let partial = emitter.emit(&paths, &MergeResolution::default(), &mut Diagnostics::new());
        assert!(partial.is_empty());

        paths.insert(1, path("MajorSpecialization", "$.majorSpecialization", "MajorSpecialization", &[""], true));
        let full = emitter.emit(&paths, &MergeResolution::default(), &mut Diagnostics::new());
        assert_eq!(
            json_pairs(&full),
            vec![
                ("$.degreeSpecializations[*].beginDate", "$.beginDate"),
                ("$.degreeSpecializations[*].majorSpecialization", "$.majorSpecialization"),
            ]
        );
    }
}
