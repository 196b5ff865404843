//! Registry of feature types.
//!
//! Every feature type declares a scope name (plural, used as a URL segment
//! and a reserved slug) and the scope it lives under: a directory, or
//! another feature type. Records carry their type name as a tag, so the
//! registry is the only place that knows which types exist.
//!
//! The registry is built with `&mut` access during startup and shared
//! read-only (behind an `Arc`) once requests are being served.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;

use crate::db::Database;
use crate::dispatch::ResourcePolicy;
use crate::models::slug::{RESERVED_ACTIONS, STRUCTURAL_NAMES};
use crate::models::{Attributes, Feature, FeatureParent, Mutation};

/// Scope a feature type is declared under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "scope", rename_all = "snake_case")]
pub enum ParentScope {
    Directory,
    /// Scope name of the containing feature type.
    Feature(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureEntry {
    pub scope: String,
    pub policy: ResourcePolicy,
    pub parent: ParentScope,
}

impl FeatureEntry {
    pub fn type_name(&self) -> &str {
        &self.policy.type_name
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown feature scope: {0}")]
    UnknownScope(String),

    #[error("Feature scope {scope} cannot live under {parent}")]
    ParentMismatch { scope: String, parent: String },

    #[error("Feature scope chain loops back to {0}")]
    Cycle(String),
}

#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    entries: BTreeMap<String, FeatureEntry>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the stock page, blog and blog post types.
    pub fn with_builtin_features() -> Self {
        let mut registry = Self::new();
        registry.register(
            "pages",
            ResourcePolicy::feature("Page", "Page", &["title", "slug", "body"]),
            ParentScope::Directory,
        );
        registry.register(
            "blogs",
            ResourcePolicy::feature("Blog", "Blog", &["title", "slug"]),
            ParentScope::Directory,
        );
        registry.register(
            "posts",
            ResourcePolicy::feature("BlogPost", "Post", &["title", "slug", "body"]),
            ParentScope::Feature("blogs".to_string()),
        );
        registry
    }

    /// Register `scope`. An identical entry is left alone; anything else
    /// replaces whatever was registered under the same scope name.
    ///
    /// Records are tagged with their type name, so a type belongs to one
    /// scope at a time: registering it again under another scope drops the
    /// earlier one.
    pub fn register(&mut self, scope: &str, policy: ResourcePolicy, parent: ParentScope) {
        let entry = FeatureEntry {
            scope: scope.to_string(),
            policy,
            parent,
        };

        if self.entries.get(scope) == Some(&entry) {
            return;
        }

        self.entries.retain(|name, existing| {
            let replaced = name != scope && existing.type_name() == entry.type_name();
            if replaced {
                tracing::warn!(
                    "Feature type {} moves from scope {} to {}",
                    entry.type_name(),
                    name,
                    scope
                );
            }
            !replaced
        });

        tracing::debug!(
            "Registered feature scope {} ({}) under {:?}",
            scope,
            entry.type_name(),
            entry.parent
        );
        self.entries.insert(scope.to_string(), entry);
    }

    /// Snapshot of every registered entry, ordered by scope name.
    pub fn features(&self) -> Vec<FeatureEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn get(&self, scope: &str) -> Option<&FeatureEntry> {
        self.entries.get(scope)
    }

    /// Entry whose policy stores records tagged `type_name`.
    pub fn by_type(&self, type_name: &str) -> Option<&FeatureEntry> {
        self.entries
            .values()
            .find(|entry| entry.type_name() == type_name)
    }

    pub fn contains_scope(&self, scope: &str) -> bool {
        self.entries.contains_key(scope)
    }

    /// Entries that may be created directly inside `parent`.
    pub fn scopes_under(&self, parent: &FeatureParent) -> Vec<&FeatureEntry> {
        self.entries
            .values()
            .filter(|entry| self.accepts(entry, parent))
            .collect()
    }

    /// Scoped query and constructors for `scope` inside `parent`.
    pub fn scope(&self, scope: &str, parent: FeatureParent) -> Result<FeatureScope<'_>, RegistryError> {
        let entry = self
            .get(scope)
            .ok_or_else(|| RegistryError::UnknownScope(scope.to_string()))?;

        if !self.accepts(entry, &parent) {
            let parent = match &parent {
                FeatureParent::Directory(_) => "a directory".to_string(),
                FeatureParent::Feature(feature) => feature.feature_type.clone(),
            };
            return Err(RegistryError::ParentMismatch {
                scope: scope.to_string(),
                parent,
            });
        }

        Ok(FeatureScope { entry, parent })
    }

    /// Action words, structural names and every registered scope name.
    pub fn reserved_slugs(&self) -> BTreeSet<String> {
        RESERVED_ACTIONS
            .iter()
            .chain(STRUCTURAL_NAMES)
            .map(|s| s.to_string())
            .chain(self.entries.keys().cloned())
            .collect()
    }

    /// `scope` followed by each scope it is nested in, up to the one declared
    /// under a directory.
    pub fn scope_chain(&self, scope: &str) -> Result<Vec<&FeatureEntry>, RegistryError> {
        let mut chain: Vec<&FeatureEntry> = Vec::new();
        let mut next = scope;

        loop {
            if chain.iter().any(|entry| entry.scope == next) {
                return Err(RegistryError::Cycle(next.to_string()));
            }
            let entry = self
                .get(next)
                .ok_or_else(|| RegistryError::UnknownScope(next.to_string()))?;
            chain.push(entry);

            match &entry.parent {
                ParentScope::Directory => return Ok(chain),
                ParentScope::Feature(parent) => next = parent,
            }
        }
    }

    fn accepts(&self, entry: &FeatureEntry, parent: &FeatureParent) -> bool {
        match (&entry.parent, parent) {
            (ParentScope::Directory, FeatureParent::Directory(_)) => true,
            (ParentScope::Feature(scope), FeatureParent::Feature(container)) => self
                .by_type(&container.feature_type)
                .is_some_and(|container_entry| &container_entry.scope == scope),
            _ => false,
        }
    }
}

/// The capabilities a registration grants its parent: a query over the
/// parent's children of the registered type, and constructors that attach
/// new records to the parent.
#[derive(Debug, Clone)]
pub struct FeatureScope<'a> {
    entry: &'a FeatureEntry,
    parent: FeatureParent,
}

impl<'a> FeatureScope<'a> {
    pub fn entry(&self) -> &'a FeatureEntry {
        self.entry
    }

    pub fn parent(&self) -> &FeatureParent {
        &self.parent
    }

    pub fn into_parent(self) -> FeatureParent {
        self.parent
    }

    pub fn query(&self, db: &Database) -> Result<Vec<Feature>> {
        db.features_of_type(&self.parent, self.entry.type_name())
    }

    /// Unsaved record of the registered type. The parent's identity is
    /// added; the supplied attributes are applied as given.
    pub fn build(&self, attributes: &Attributes) -> Feature {
        Feature::build(self.entry.type_name(), &self.parent, attributes)
    }

    pub fn create(
        &self,
        db: &Database,
        attributes: &Attributes,
        reserved: &BTreeSet<String>,
    ) -> Result<Mutation<Feature>> {
        db.insert_feature(self.build(attributes), reserved)
    }
}
