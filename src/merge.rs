//! Merge Resolver
//!
//! Turns an entity's merge directives into coverings over a list of candidate
//! property paths (its flattened identities, or every document path).
//!
//! A directive `(source, target)` applies to every candidate prefixed by
//! `source`, substituting the prefix: with `School -> Session.School`,
//! `School.SchoolId` is covered by `Session.School.SchoolId`. When several
//! directives match, the longest source wins. Candidates no directive touches
//! fall back to the covering inherited from the referenced entity. Coverings
//! are then chased to the ultimate, uncovered path.
//!
//! Problems are reported as diagnostics and leave the path uncovered.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::config::DiagnosticLevel;
use crate::graph::{Diagnostics, MergeDirective};
use crate::paths::PropertyPath;

// =============================================================================
// Coverings
// =============================================================================

/// What produced a covering's first hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CoveringOrigin {
    /// Index into the entity's effective directive list
    Directive(usize),
    /// Carried over from a referenced entity's own merge
    Inherited,
}

impl CoveringOrigin {
    pub fn is_directive(&self) -> bool {
        matches!(self, Self::Directive(_))
    }
}

/// A covered path and its ultimate covering path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCovering {
    pub covered: PropertyPath,
    pub covering: PropertyPath,
    pub origin: CoveringOrigin,
}

/// Resolved coverings of one entity, in candidate order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResolution {
    coverings: Vec<MergeCovering>,
    index: HashMap<PropertyPath, usize>,
}

impl MergeResolution {
    fn push(&mut self, covering: MergeCovering) {
        self.index.insert(covering.covered.clone(), self.coverings.len());
        self.coverings.push(covering);
    }

    pub fn covering(&self, covered: &PropertyPath) -> Option<&MergeCovering> {
        self.index.get(covered).map(|i| &self.coverings[*i])
    }

    /// Ultimate covering path of a covered path
    pub fn covering_of(&self, covered: &PropertyPath) -> Option<&PropertyPath> {
        self.covering(covered).map(|c| &c.covering)
    }

    pub fn is_covered(&self, path: &PropertyPath) -> bool {
        self.index.contains_key(path)
    }

    pub fn coverings(&self) -> &[MergeCovering] {
        &self.coverings
    }

    pub fn len(&self) -> usize {
        self.coverings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coverings.is_empty()
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// One directive's proposal for one candidate
struct Proposal {
    specificity: usize,
    target: PropertyPath,
    directive: usize,
}

pub struct MergeResolver<'a> {
    entity: &'a str,
    directives: &'a [MergeDirective],
    unmatched_level: DiagnosticLevel,
}

impl<'a> MergeResolver<'a> {
    pub fn new(entity: &'a str, directives: &'a [MergeDirective]) -> Self {
        Self {
            entity,
            directives,
            unmatched_level: DiagnosticLevel::Error,
        }
    }

    pub fn with_unmatched_level(mut self, level: DiagnosticLevel) -> Self {
        self.unmatched_level = level;
        self
    }

    /// Resolve coverings over `candidates`.
    ///
    /// `inherited` maps candidates to coverings carried from referenced
    /// entities; an own directive always takes priority over them.
    pub fn resolve(
        &self,
        candidates: &[PropertyPath],
        inherited: &HashMap<PropertyPath, PropertyPath>,
        diagnostics: &mut Diagnostics,
    ) -> MergeResolution {
        let known: HashSet<&PropertyPath> = candidates.iter().collect();
        let proposals = self.proposals(candidates, diagnostics);

        // Direct (one hop) coverings
        let mut direct: HashMap<&PropertyPath, (PropertyPath, CoveringOrigin)> = HashMap::new();
        for candidate in candidates {
            match proposals.get(candidate) {
                Some(list) => {
                    if let Some((target, directive)) = self.pick(candidate, list, &known, diagnostics) {
                        direct.insert(candidate, (target, CoveringOrigin::Directive(directive)));
                    }
                }
                None => {
                    if let Some(covering) = inherited.get(candidate) {
                        direct.insert(candidate, (covering.clone(), CoveringOrigin::Inherited));
                    }
                }
            }
        }

        // Chase to the ultimate covering
        let mut resolution = MergeResolution::default();
        let mut reported_cycles: HashSet<BTreeSet<PropertyPath>> = HashSet::new();
        for candidate in candidates {
            let Some((first, origin)) = direct.get(candidate) else {
                continue;
            };

            let mut chain = vec![candidate];
            let mut current = first;
            let mut cyclic = false;
            loop {
                if let Some(start) = chain.iter().position(|p| *p == current) {
                    let members: BTreeSet<PropertyPath> = chain[start..].iter().map(|p| (*p).clone()).collect();
                    if reported_cycles.insert(members) {
                        let mut looped: Vec<&PropertyPath> = chain[start..].to_vec();
                        looped.push(current);
                        diagnostics.directive_cycle(self.entity, &looped);
                    }
                    cyclic = true;
                    break;
                }
                chain.push(current);
                match direct.get(current) {
                    Some((next, _)) => current = next,
                    None => break,
                }
            }
            if cyclic {
                continue;
            }

            tracing::trace!(entity = self.entity, covered = %candidate, covering = %current, "merge covering");
            resolution.push(MergeCovering {
                covered: candidate.clone(),
                covering: current.clone(),
                origin: *origin,
            });
        }

        tracing::debug!(entity = self.entity, coverings = resolution.len(), "resolved merges");
        resolution
    }

    /// Prefix matches of every directive, grouped by candidate
    fn proposals(
        &self,
        candidates: &[PropertyPath],
        diagnostics: &mut Diagnostics,
    ) -> HashMap<PropertyPath, Vec<Proposal>> {
        let mut proposals: HashMap<PropertyPath, Vec<Proposal>> = HashMap::new();

        for (index, directive) in self.directives.iter().enumerate() {
            if directive.source == directive.target {
                diagnostics.self_directive(self.entity, &directive.source);
                continue;
            }

            let mut matched = false;
            for candidate in candidates {
                if let Some(suffix) = candidate.strip_prefix(&directive.source) {
                    matched = true;
                    proposals.entry(candidate.clone()).or_default().push(Proposal {
                        specificity: directive.source.len(),
                        target: directive.target.join(&suffix),
                        directive: index,
                    });
                }
            }

            if !matched {
                diagnostics.directive_unmatched(
                    self.entity,
                    &directive.source,
                    &directive.target,
                    self.unmatched_level,
                );
            }
        }
        proposals
    }

    /// Most specific proposal, if it is unambiguous and lands on a known path
    fn pick(
        &self,
        candidate: &PropertyPath,
        proposals: &[Proposal],
        known: &HashSet<&PropertyPath>,
        diagnostics: &mut Diagnostics,
    ) -> Option<(PropertyPath, usize)> {
        let best = proposals.iter().map(|p| p.specificity).max()?;
        let winners: Vec<&Proposal> = proposals.iter().filter(|p| p.specificity == best).collect();

        let mut targets: Vec<&PropertyPath> = Vec::new();
        for winner in &winners {
            if !targets.contains(&&winner.target) {
                targets.push(&winner.target);
            }
        }
        if targets.len() > 1 {
            diagnostics.directive_conflict(self.entity, candidate, &targets);
            return None;
        }

        let winner = winners[0];
        if winner.target == *candidate {
            return None;
        }
        if !known.contains(&winner.target) {
            diagnostics.directive_target_missing(self.entity, candidate, &winner.target);
            return None;
        }
        Some((winner.target.clone(), winner.directive))
    }
}
