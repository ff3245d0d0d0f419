//! Analysis Context
//!
//! Runs every pass over an `EntityGraph` in a fixed order and freezes the
//! results. Nothing is mutated after `build()` returns; consumers read
//! per-entity results through `EntityAnalysis`.
//!
//! Pass order:
//! 1. reference components (fails on identity cycles)
//! 2. flattened identities for every resource
//! 3. identity-level merge coverings, referenced entities first
//! 4. document paths, with FIP JSON locations filled in
//! 5. document-level merge coverings
//! 6. equality constraints, array uniqueness, type coercion, document paths
//!    mapping, naming collisions

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::classify::{Classifier, TypeCoercion};
use crate::collision::{detect_naming_collisions, NamingCollisions};
use crate::config::AnalysisConfig;
use crate::constraints::{
    array_uniqueness_constraints, ArrayUniquenessConstraint, EqualityConstraint, EqualityEmitter,
};
use crate::error::{AnalysisError, Result};
use crate::graph::{check_identity_acyclic, dependency_order, Diagnostics, EntityGraph, EntityId, PropertyId};
use crate::identity::{flatten_identities, ComponentBuilder, FlattenedIdentityProperty, ReferenceComponent};
use crate::merge::{MergeCovering, MergeResolution, MergeResolver};
use crate::paths::{
    build_document_paths_mapping, DocumentPath, DocumentPathsEntry, DocumentWalker, JsonPath, Naming,
    PropertyPath,
};

// =============================================================================
// Stages
// =============================================================================

/// Progress of a context through the pass pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Loaded,
    ComponentsBuilt,
    IdentitiesFlattened,
    PathsMapped,
    MergesResolved,
    ConstraintsEmitted,
    Classified,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Loaded => Some(Self::ComponentsBuilt),
            Self::ComponentsBuilt => Some(Self::IdentitiesFlattened),
            Self::IdentitiesFlattened => Some(Self::PathsMapped),
            Self::PathsMapped => Some(Self::MergesResolved),
            Self::MergesResolved => Some(Self::ConstraintsEmitted),
            Self::ConstraintsEmitted => Some(Self::Classified),
            Self::Classified => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::ComponentsBuilt => "components-built",
            Self::IdentitiesFlattened => "identities-flattened",
            Self::PathsMapped => "paths-mapped",
            Self::MergesResolved => "merges-resolved",
            Self::ConstraintsEmitted => "constraints-emitted",
            Self::Classified => "classified",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage tracker; each pass must enter the stage right after the current one
#[derive(Debug)]
struct Pipeline {
    stage: Stage,
}

impl Pipeline {
    fn new() -> Self {
        Self { stage: Stage::Loaded }
    }

    fn enter(&mut self, requested: Stage) -> Result<()> {
        if self.stage.next() != Some(requested) {
            return Err(AnalysisError::StageOrder {
                requested: requested.to_string(),
                current: self.stage.to_string(),
            });
        }
        tracing::debug!(stage = %requested, "entering stage");
        self.stage = requested;
        Ok(())
    }
}

// =============================================================================
// Per-entity results
// =============================================================================

/// Everything derived for one resource
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAnalysis {
    pub entity: String,
    pub flattened_identity_properties: Vec<FlattenedIdentityProperty>,
    #[serde(skip)]
    pub document_paths: Vec<DocumentPath>,
    #[serde(skip)]
    pub merge_resolution: MergeResolution,
    pub merge_coverings: Vec<MergeCovering>,
    pub equality_constraints: Vec<EqualityConstraint>,
    pub array_uniqueness_constraints: Vec<ArrayUniquenessConstraint>,
    #[serde(flatten)]
    pub type_coercion: TypeCoercion,
    pub document_paths_mapping: Vec<DocumentPathsEntry>,
}

impl EntityAnalysis {
    /// JSON location of a property path, if it is present in the document
    pub fn json_path_of(&self, path: &PropertyPath) -> Option<&JsonPath> {
        self.document_paths
            .iter()
            .find(|p| p.property_path == *path && p.is_present())
            .map(|p| &p.json_path)
    }
}

// =============================================================================
// AnalysisContext
// =============================================================================

/// Immutable analysis context, frozen after `build()`
pub struct AnalysisContext {
    graph: EntityGraph,
    components: HashMap<PropertyId, ReferenceComponent>,
    analyses: Vec<EntityAnalysis>,
    index: HashMap<String, usize>,
    collisions: NamingCollisions,
    diagnostics: Diagnostics,
    stage: Stage,
}

impl AnalysisContext {
    /// Run every pass over `graph`.
    ///
    /// Structural failures (identity cycles, unknown entities) are errors;
    /// directive problems and collisions land in `diagnostics()`.
    pub fn build(graph: EntityGraph, config: &AnalysisConfig) -> Result<Self> {
        let mut pipeline = Pipeline::new();
        let mut diagnostics = Diagnostics::new();
        let naming = Naming::new(config.naming.clone());
        let resources: Vec<EntityId> = graph.resources().map(|e| e.id).collect();

        // Phase 1: Reference components
        pipeline.enter(Stage::ComponentsBuilt)?;
        check_identity_acyclic(&graph)?;
        let mut builder = ComponentBuilder::new(&graph);
        let components = builder.build_all()?;

        // Phase 2: Flattened identities, then identity-level coverings
        pipeline.enter(Stage::IdentitiesFlattened)?;
        let mut fips: HashMap<EntityId, Vec<FlattenedIdentityProperty>> = HashMap::new();
        for id in &resources {
            fips.insert(*id, flatten_identities(&graph, *id, &mut builder)?);
        }
        for id in dependency_order(&graph)? {
            if fips.contains_key(&id) {
                resolve_identity_merges(&graph, id, &mut fips);
            }
        }

        // Phase 3: Document paths
        pipeline.enter(Stage::PathsMapped)?;
        let mut documents: HashMap<EntityId, Vec<DocumentPath>> = HashMap::new();
        {
            let walker = DocumentWalker::new(&graph, &naming, &fips);
            for id in &resources {
                documents.insert(*id, walker.walk(*id)?);
            }
        }
        for id in &resources {
            if let (Some(list), Some(paths)) = (fips.get_mut(id), documents.get(id)) {
                assign_fip_json_paths(list, paths);
            }
        }

        // Phase 4: Document-level coverings
        pipeline.enter(Stage::MergesResolved)?;
        let mut resolutions: HashMap<EntityId, MergeResolution> = HashMap::new();
        for id in &resources {
            let entity = graph.entity(*id);
            let paths = documents.get(id).map(Vec::as_slice).unwrap_or_default();
            let candidates: Vec<PropertyPath> = paths.iter().map(|p| p.property_path.clone()).collect();
            let inherited: HashMap<PropertyPath, PropertyPath> = paths
                .iter()
                .filter_map(|p| p.merged_away.clone().map(|c| (p.property_path.clone(), c)))
                .collect();
            let directives = graph.merge_directives(*id);
            let resolution = MergeResolver::new(&entity.name, &directives)
                .with_unmatched_level(config.diagnostics.unmatched_directive)
                .resolve(&candidates, &inherited, &mut diagnostics);
            resolutions.insert(*id, resolution);
        }

        // Phase 5: Constraints
        pipeline.enter(Stage::ConstraintsEmitted)?;
        let mut analyses = Vec::with_capacity(resources.len());
        for id in &resources {
            let entity = graph.entity(*id);
            let paths = documents.remove(id).unwrap_or_default();
            let resolution = resolutions.remove(id).unwrap_or_default();
            let equality_constraints = EqualityEmitter::new(&entity.name, config.diagnostics.column_conflict)
                .emit(&paths, &resolution, &mut diagnostics);
            let uniqueness = array_uniqueness_constraints(&paths);

            analyses.push(EntityAnalysis {
                entity: entity.name.clone(),
                flattened_identity_properties: fips.get(id).cloned().unwrap_or_default(),
                merge_coverings: resolution.coverings().to_vec(),
                merge_resolution: resolution,
                equality_constraints,
                array_uniqueness_constraints: uniqueness,
                type_coercion: TypeCoercion::default(),
                document_paths_mapping: Vec::new(),
                document_paths: paths,
            });
        }

        // Phase 6: Classification and mapping
        pipeline.enter(Stage::Classified)?;
        let classifier = Classifier::new(&graph);
        for analysis in &mut analyses {
            analysis.type_coercion = classifier.classify_all(&analysis.document_paths);
            analysis.document_paths_mapping = build_document_paths_mapping(&graph, &analysis.document_paths, &fips);
        }
        let collisions =
            detect_naming_collisions(&graph, &naming, config.diagnostics.naming_collision, &mut diagnostics);

        let index = analyses
            .iter()
            .enumerate()
            .map(|(i, a)| (a.entity.clone(), i))
            .collect();

        tracing::info!(
            entities = graph.entity_count(),
            resources = analyses.len(),
            errors = diagnostics.error_count(),
            warnings = diagnostics.warning_count(),
            bundle = %graph.bundle_hash,
            "analysis complete"
        );

        Ok(Self {
            graph,
            components,
            analyses,
            index,
            collisions,
            diagnostics,
            stage: pipeline.stage,
        })
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn components(&self) -> &HashMap<PropertyId, ReferenceComponent> {
        &self.components
    }

    pub fn analysis(&self, entity: &str) -> Option<&EntityAnalysis> {
        self.index.get(entity).map(|i| &self.analyses[*i])
    }

    /// Per-resource results, in declaration order
    pub fn analyses(&self) -> &[EntityAnalysis] {
        &self.analyses
    }

    pub fn collisions(&self) -> &NamingCollisions {
        &self.collisions
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn bundle_hash(&self) -> &str {
        &self.graph.bundle_hash
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Identity-level coverings of one entity, seeded from its references' own
fn resolve_identity_merges(
    graph: &EntityGraph,
    id: EntityId,
    fips: &mut HashMap<EntityId, Vec<FlattenedIdentityProperty>>,
) {
    let Some(own) = fips.get(&id) else {
        return;
    };
    let candidates: Vec<PropertyPath> = own.iter().map(|f| f.path.clone()).collect();

    let mut inherited: HashMap<PropertyPath, PropertyPath> = HashMap::new();
    for fip in own {
        let Some(hop) = fip.first_reference_hop(graph) else {
            continue;
        };
        let Some(target) = graph.property(fip.chain[hop]).kind.target() else {
            continue;
        };
        let prefix = fip.path.truncate(hop + 1);
        let Some(rest) = fip.path.strip_prefix(&prefix) else {
            continue;
        };
        let covering = fips
            .get(&target)
            .and_then(|list| list.iter().find(|f| f.path == rest))
            .and_then(|f| f.merge_covered_by.as_ref());
        if let Some(covering) = covering {
            inherited.insert(fip.path.clone(), prefix.join(covering));
        }
    }

    // Directive problems are reported once, by the document-level pass
    let entity = graph.entity(id);
    let directives = graph.merge_directives(id);
    let resolution = MergeResolver::new(&entity.name, &directives)
        .with_unmatched_level(crate::config::DiagnosticLevel::Allow)
        .resolve(&candidates, &inherited, &mut Diagnostics::silent());

    if let Some(list) = fips.get_mut(&id) {
        for fip in list.iter_mut() {
            fip.merge_covered_by = resolution.covering_of(&fip.path).cloned();
        }
    }
}

/// Fill in each FIP's document location, following its covering when merged away
fn assign_fip_json_paths(fips: &mut [FlattenedIdentityProperty], paths: &[DocumentPath]) {
    let by_path: HashMap<&PropertyPath, &DocumentPath> = paths.iter().map(|p| (&p.property_path, p)).collect();
    for fip in fips {
        let Some(path) = by_path.get(&fip.path) else {
            continue;
        };
        let located = match &path.merged_away {
            None => Some(&path.json_path),
            Some(covering) => by_path.get(covering).map(|c| &c.json_path),
        };
        fip.json_path = located.cloned();
    }
}
