use std::ops::Deref;

use anyhow::Result;
use chrono::Utc;

use super::directories::dashboard_path;
use super::{ResourceDelegate, ResourceDispatcher, ResourcePolicy, Routes};
use crate::db::Database;
use crate::models::slug::absolute_path;
use crate::models::{join_path, Attributes, Directory, Feature, FeatureParent, Mutation};
use crate::registry::{FeatureRegistry, FeatureScope, RegistryError};

/// Feature side of the dispatch template, bound to one registered scope
/// inside one parent.
pub struct FeatureDelegate<'a> {
    db: &'a Database,
    registry: &'a FeatureRegistry,
    scope: FeatureScope<'a>,
    directories: Vec<Directory>,
}

impl<'a> FeatureDelegate<'a> {
    pub fn new(
        db: &'a Database,
        registry: &'a FeatureRegistry,
        scope: FeatureScope<'a>,
        directories: Vec<Directory>,
    ) -> Self {
        Self {
            db,
            registry,
            scope,
            directories,
        }
    }

    pub fn parent(&self) -> &FeatureParent {
        self.scope.parent()
    }

    fn directory_path(&self) -> String {
        absolute_path(self.directories.iter().map(|d| d.slug.as_str()))
    }

    fn parent_path(&self) -> Result<String> {
        match self.scope.parent() {
            FeatureParent::Directory(_) => Ok(self.directory_path()),
            FeatureParent::Feature(container) => {
                Ok(absolute_path([self.db.feature_path(container)?]))
            }
        }
    }

    fn save(&self, feature: Feature) -> Result<Mutation<Feature>> {
        self.db
            .update_feature(feature, &self.registry.reserved_slugs())
    }
}

impl ResourceDelegate for FeatureDelegate<'_> {
    type Resource = Feature;

    fn policy(&self) -> &ResourcePolicy {
        &self.scope.entry().policy
    }

    fn directories(&self) -> &[Directory] {
        &self.directories
    }

    fn load_resources(&self) -> Result<Vec<Feature>> {
        self.scope.query(self.db)
    }

    fn build_resource(&self, attributes: &Attributes) -> Feature {
        self.scope.build(attributes)
    }

    fn insert_resource(&self, feature: Feature) -> Result<Mutation<Feature>> {
        self.db
            .insert_feature(feature, &self.registry.reserved_slugs())
    }

    fn update_resource(&self, mut feature: Feature, attributes: &Attributes) -> Result<Mutation<Feature>> {
        feature.assign(attributes);
        self.save(feature)
    }

    fn destroy_resource(&self, feature: &Feature) -> Result<usize> {
        self.db.destroy_feature(feature.id)
    }

    fn publish_resource(&self, mut feature: Feature) -> Result<Mutation<Feature>> {
        feature.publish(Utc::now());
        self.save(feature)
    }

    fn unpublish_resource(&self, mut feature: Feature) -> Result<Mutation<Feature>> {
        feature.unpublish();
        self.save(feature)
    }

    fn routes(&self, feature: Option<&Feature>) -> Result<Routes> {
        let resource = feature
            .map(|f| Ok::<_, anyhow::Error>(absolute_path([self.db.feature_path(f)?])))
            .transpose()?;

        Ok(Routes {
            index: join_path([self.parent_path()?.as_str(), self.scope.entry().scope.as_str()]),
            resource,
            dashboard: Some(dashboard_path(&self.directory_path())),
            parent_dashboard: None,
        })
    }
}

/// Dispatcher for one feature scope. Creation attaches new records to the
/// parent the scope was opened on: the last resolved directory, or a
/// container feature for nested types.
pub struct FeatureDispatcher<'a> {
    inner: ResourceDispatcher<FeatureDelegate<'a>>,
}

impl<'a> FeatureDispatcher<'a> {
    pub fn for_scope(
        db: &'a Database,
        registry: &'a FeatureRegistry,
        scope: &str,
        directories: Vec<Directory>,
        parent: FeatureParent,
    ) -> Result<Self, RegistryError> {
        let scope = registry.scope(scope, parent)?;
        Ok(Self {
            inner: ResourceDispatcher::new(FeatureDelegate::new(db, registry, scope, directories)),
        })
    }

    /// Dispatcher for the scope `feature` was registered under, opened on
    /// the parent it lives in.
    pub fn for_feature(
        db: &'a Database,
        registry: &'a FeatureRegistry,
        feature: &Feature,
        directories: Vec<Directory>,
        parent: FeatureParent,
    ) -> Result<Self, RegistryError> {
        let entry = registry
            .by_type(&feature.feature_type)
            .ok_or_else(|| RegistryError::UnknownScope(feature.feature_type.clone()))?;
        Self::for_scope(db, registry, &entry.scope, directories, parent)
    }
}

impl<'a> Deref for FeatureDispatcher<'a> {
    type Target = ResourceDispatcher<FeatureDelegate<'a>>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
