//! Naming
//!
//! Renders property names into JSON path segments:
//! - camelCase via `uncapitalize` (declared names are already PascalCase)
//! - collection names via `pluralize`, with configurable irregular plurals
//! - `Reference` / `Descriptor` / `TypeReference` suffixes per property kind
//! - role name prefixes from inline commons and choices, collapsed when redundant
//! - owner-prefix stripping for collections (`AssessmentIdentificationCode` on
//!   `Assessment` renders as `identificationCodes`)

use crate::config::NamingConfig;
use crate::graph::{EntityGraph, Property, PropertyKind};

/// Lower-case the first character
pub fn uncapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Prepend `prefix` unless `name` already starts with it
pub fn prefix_with_collapse(name: &str, prefix: &str) -> String {
    if prefix.is_empty() || name.starts_with(prefix) {
        name.to_string()
    } else {
        format!("{}{}", prefix, name)
    }
}

/// Naming collaborator shared by every path-producing pass
#[derive(Debug, Clone, Default)]
pub struct Naming {
    config: NamingConfig,
}

impl Naming {
    pub fn new(config: NamingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NamingConfig {
        &self.config
    }

    /// English plural of a PascalCase name
    pub fn pluralize(&self, name: &str) -> String {
        for (singular, plural) in &self.config.irregular_plurals {
            if let Some(stem) = name.strip_suffix(singular.as_str()) {
                // Only whole trailing words: "StaffPerson" yes, "Salesperson" no
                let at_word_boundary = stem.is_empty()
                    || singular.chars().next().map(char::is_uppercase).unwrap_or(false);
                if at_word_boundary {
                    return format!("{}{}", stem, plural);
                }
            }
        }

        let lower = name.to_lowercase();
        if let Some(stem) = name.strip_suffix('y') {
            let before = stem.chars().last().map(|c| c.to_ascii_lowercase());
            if !matches!(before, Some('a' | 'e' | 'i' | 'o' | 'u') | None) {
                return format!("{}ies", stem);
            }
        }
        if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
            return format!("{}es", name);
        }
        format!("{}s", name)
    }

    /// The name a property renders under, before kind suffixes.
    ///
    /// `parent_prefix` carries role names of enclosing inline commons and choices.
    pub fn display_name(&self, graph: &EntityGraph, property: &Property, parent_prefix: &str) -> String {
        let name = prefix_with_collapse(&property.full_name(), parent_prefix);
        if property.is_collection && self.config.strip_owner_prefix {
            return self.strip_owner_prefix(graph, property, name);
        }
        name
    }

    fn strip_owner_prefix(&self, graph: &EntityGraph, property: &Property, name: String) -> String {
        let mut owner = Some(property.owner);
        while let Some(id) = owner {
            let entity = graph.entity(id);
            if let Some(rest) = name.strip_prefix(entity.name.as_str()) {
                if rest.chars().next().map(char::is_uppercase).unwrap_or(false) {
                    return rest.to_string();
                }
            }
            owner = entity.superclass;
        }
        name
    }

    /// `addresses` for `Address`
    pub fn collection_segment(&self, name: &str) -> String {
        uncapitalize(&self.pluralize(name))
    }

    /// Segment of a single (non-collection or array element) value
    pub fn element_segment(kind: &PropertyKind, name: &str) -> String {
        match kind {
            PropertyKind::Reference(_) => format!("{}Reference", uncapitalize(name)),
            PropertyKind::Descriptor(_) => format!("{}Descriptor", uncapitalize(name)),
            PropertyKind::SchoolYearEnumeration => format!("{}TypeReference", uncapitalize(name)),
            _ => uncapitalize(name),
        }
    }

    /// Segment of an identity leaf inside a reference object
    pub fn leaf_segment(kind: &PropertyKind, name: &str) -> String {
        match kind {
            PropertyKind::Descriptor(_) => format!("{}Descriptor", uncapitalize(name)),
            _ => uncapitalize(name),
        }
    }

    /// First document segment a property occupies on its owner
    pub fn top_level_segment(&self, graph: &EntityGraph, property: &Property) -> String {
        let name = self.display_name(graph, property, "");
        if property.is_collection {
            self.collection_segment(&name)
        } else {
            Self::element_segment(&property.kind, &name)
        }
    }

    /// `_ext.<namespace>` segments for extension properties
    pub fn extension_segments(&self, namespace: &str) -> [String; 2] {
        [self.config.extension_prefix.clone(), namespace.to_lowercase()]
    }
}
