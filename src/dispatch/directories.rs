use std::collections::BTreeMap;
use std::ops::Deref;

use anyhow::Result;
use serde_json::Value;

use super::import::{import_feature, import_subtree, ImportSummary};
use super::{
    Action, Assigns, Dispatch, Flash, FlashLevel, ResourceDelegate, ResourceDispatcher, ResourcePolicy,
    Routes,
};
use crate::access::{AccessPolicy, ResourceRef, Subject};
use crate::db::Database;
use crate::models::slug::{absolute_path, INDEX_SLUG};
use crate::models::{
    join_path, Attributes, Directory, DirectoryExport, Feature, FeatureExport, FeatureParent, FieldErrors,
    Mutation,
};
use crate::registry::FeatureRegistry;

const DASHBOARD_VIEW: &str = "admin/directories/dashboard";
const EXPORT_VIEW: &str = "admin/directories/export";
const FEATURES_INDEX_VIEW: &str = "admin/features/index";
const IMPORT_DIRECTORY_VIEW: &str = "admin/directories/import";
const IMPORT_FEATURE_VIEW: &str = "admin/features/import";

/// Directory side of the dispatch template. New directories are created
/// under the last directory of the resolved chain.
pub struct DirectoryDelegate<'a> {
    db: &'a Database,
    registry: &'a FeatureRegistry,
    directories: Vec<Directory>,
    policy: ResourcePolicy,
}

impl<'a> DirectoryDelegate<'a> {
    pub fn new(db: &'a Database, registry: &'a FeatureRegistry, directories: Vec<Directory>) -> Self {
        Self {
            db,
            registry,
            directories,
            policy: ResourcePolicy::directories(),
        }
    }

    fn parent_id(&self) -> Option<uuid::Uuid> {
        self.directories.last().map(|d| d.id)
    }

    fn public_path(&self, directory: &Directory) -> Result<String> {
        Ok(absolute_path([self.db.directory_path(directory)?]))
    }
}

impl ResourceDelegate for DirectoryDelegate<'_> {
    type Resource = Directory;

    fn policy(&self) -> &ResourcePolicy {
        &self.policy
    }

    fn directories(&self) -> &[Directory] {
        &self.directories
    }

    fn load_resources(&self) -> Result<Vec<Directory>> {
        self.db.child_directories(self.parent_id())
    }

    fn build_resource(&self, attributes: &Attributes) -> Directory {
        Directory::build(self.parent_id(), attributes)
    }

    fn insert_resource(&self, directory: Directory) -> Result<Mutation<Directory>> {
        self.db
            .insert_directory(directory, &self.registry.reserved_slugs())
    }

    fn update_resource(
        &self,
        mut directory: Directory,
        attributes: &Attributes,
    ) -> Result<Mutation<Directory>> {
        directory.assign(attributes);
        self.db
            .update_directory(directory, &self.registry.reserved_slugs())
    }

    fn destroy_resource(&self, directory: &Directory) -> Result<usize> {
        self.db.destroy_directory(directory.id)
    }

    fn routes(&self, directory: Option<&Directory>) -> Result<Routes> {
        let parent_path = match directory {
            Some(directory) => {
                let ancestors = self.db.directory_ancestors(directory)?;
                absolute_path(ancestors.iter().map(|d| d.slug.as_str()))
            }
            None => absolute_path(self.directories.iter().map(|d| d.slug.as_str())),
        };

        let resource = directory.map(|d| self.public_path(d)).transpose()?;
        let dashboard = resource.as_deref().map(dashboard_path);

        Ok(Routes {
            index: join_path([parent_path.as_str(), "directories"]),
            resource,
            dashboard,
            parent_dashboard: Some(dashboard_path(&parent_path)),
        })
    }
}

/// `/a/b` becomes `/a/b/dashboard`; the root dashboard is `/dashboard`.
pub fn dashboard_path(path: &str) -> String {
    join_path([path, "dashboard"])
}

/// Directory dispatcher: the shared actions plus dashboard, export and the
/// index-feature deference of `show`.
pub struct DirectoryDispatcher<'a> {
    inner: ResourceDispatcher<DirectoryDelegate<'a>>,
    db: &'a Database,
    registry: &'a FeatureRegistry,
    access: &'a dyn AccessPolicy,
    subject: Subject,
}

impl<'a> DirectoryDispatcher<'a> {
    pub fn new(
        db: &'a Database,
        registry: &'a FeatureRegistry,
        directories: Vec<Directory>,
        access: &'a dyn AccessPolicy,
        subject: Subject,
    ) -> Self {
        Self {
            inner: ResourceDispatcher::new(DirectoryDelegate::new(db, registry, directories)),
            db,
            registry,
            access,
            subject,
        }
    }

    /// Public view of a directory (`None` for the root).
    ///
    /// When the directory holds a feature with the index slug that is
    /// published, or that the subject may see anyway, that feature's own
    /// show view is rendered instead.
    pub fn show(&self, directory: Option<&Directory>) -> Result<Dispatch> {
        let parent = FeatureParent::Directory(directory.cloned());
        if let Some(dispatch) = self.show_index_feature(&parent)? {
            return Ok(dispatch);
        }

        match directory {
            Some(directory) => self.inner.show(directory),
            None => {
                let roots = self
                    .db
                    .root_directories()?
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<Result<Vec<_>, _>>()?;
                let assigns = Assigns {
                    resources: Some(roots),
                    ..Assigns::default()
                };
                Ok(Dispatch::render(&self.inner.policy().views.show, assigns))
            }
        }
    }

    fn show_index_feature(&self, parent: &FeatureParent) -> Result<Option<Dispatch>> {
        let Some(index) = self.db.find_feature(parent, INDEX_SLUG)? else {
            return Ok(None);
        };

        let visible = index.is_published()
            || self
                .access
                .allows(self.subject, Action::Show, ResourceRef::Feature(&index));
        if !visible {
            return Ok(None);
        }

        let Some(entry) = self.registry.by_type(&index.feature_type) else {
            tracing::warn!(
                "Index feature {} has unregistered type {}",
                index.id,
                index.feature_type
            );
            return Ok(None);
        };

        tracing::debug!("Deferring directory show to index {}", index.id);
        let assigns = Assigns {
            directories: self.inner.delegate().directories().to_vec(),
            resource: Some(serde_json::to_value(&index)?),
            ..Assigns::default()
        };
        Ok(Some(Dispatch::render(&entry.policy.views.show, assigns)))
    }

    /// Administrative landing page: child directories, the directory's
    /// features and the feature scopes that can be created in it.
    pub fn dashboard(&self, directory: Option<&Directory>) -> Result<Dispatch> {
        let parent = FeatureParent::Directory(directory.cloned());
        let children = self.db.child_directories(directory.map(|d| d.id))?;
        let features = self.db.features_in(&parent)?;
        let scopes: Vec<&str> = self
            .registry
            .scopes_under(&parent)
            .iter()
            .map(|entry| entry.scope.as_str())
            .collect();

        let mut locals = BTreeMap::new();
        locals.insert("children".to_string(), serde_json::to_value(&children)?);
        locals.insert("features".to_string(), serde_json::to_value(&features)?);
        locals.insert("scopes".to_string(), serde_json::to_value(&scopes)?);

        let assigns = Assigns {
            directories: self.inner.delegate().directories().to_vec(),
            resource: directory.map(serde_json::to_value).transpose()?,
            locals,
            ..Assigns::default()
        };
        Ok(Dispatch::render(DASHBOARD_VIEW, assigns))
    }

    /// Recursive dump of a subtree, or of everything when `directory` is
    /// `None`.
    pub fn export(&self, directory: Option<&Directory>) -> Result<Dispatch> {
        let export = export_subtree(self.db, directory.cloned())?;

        let mut locals = BTreeMap::new();
        locals.insert("record_count".to_string(), Value::from(export.record_count()));

        let assigns = Assigns {
            directories: self.inner.delegate().directories().to_vec(),
            resource: Some(serde_json::to_value(&export)?),
            locals,
            ..Assigns::default()
        };
        Ok(Dispatch::render(EXPORT_VIEW, assigns))
    }

    /// Every feature of the last resolved directory, whatever its type.
    pub fn features_index(&self) -> Result<Dispatch> {
        let directories = self.inner.delegate().directories();
        let parent = FeatureParent::Directory(directories.last().cloned());
        let features = self
            .db
            .features_in(&parent)?
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let assigns = Assigns {
            directories: directories.to_vec(),
            resources: Some(features),
            ..Assigns::default()
        };
        Ok(Dispatch::render(FEATURES_INDEX_VIEW, assigns))
    }
}

impl DirectoryDispatcher<'_> {
    /// Form for importing a directory export below the last resolved
    /// directory.
    pub fn import_directory_form(&self) -> Result<Dispatch> {
        self.import_form(IMPORT_DIRECTORY_VIEW, FieldErrors::new())
    }

    /// Form for importing a feature export into the last resolved directory.
    pub fn import_feature_form(&self) -> Result<Dispatch> {
        self.import_form(IMPORT_FEATURE_VIEW, FieldErrors::new())
    }

    /// Recreate a directory export document below the last resolved
    /// directory.
    pub fn import_directory(&self, document: &Attributes) -> Result<Dispatch> {
        let export: DirectoryExport = match serde_json::from_value(Value::Object(document.clone())) {
            Ok(export) => export,
            Err(e) => return self.invalid_document(IMPORT_DIRECTORY_VIEW, e),
        };
        let parent = self.inner.delegate().directories().last();
        let mutation = import_subtree(self.db, self.registry, parent, &export)?;
        self.import_response(IMPORT_DIRECTORY_VIEW, mutation)
    }

    /// Recreate a feature export document inside the last resolved
    /// directory.
    pub fn import_feature(&self, document: &Attributes) -> Result<Dispatch> {
        let export: FeatureExport = match serde_json::from_value(Value::Object(document.clone())) {
            Ok(export) => export,
            Err(e) => return self.invalid_document(IMPORT_FEATURE_VIEW, e),
        };
        let parent = FeatureParent::Directory(self.inner.delegate().directories().last().cloned());
        let mutation = import_feature(self.db, self.registry, parent, &export)?;
        self.import_response(IMPORT_FEATURE_VIEW, mutation)
    }

    fn import_form(&self, view: &str, errors: FieldErrors) -> Result<Dispatch> {
        let directories = self.inner.delegate().directories();
        let parent = FeatureParent::Directory(directories.last().cloned());
        let scopes: Vec<&str> = self
            .registry
            .scopes_under(&parent)
            .iter()
            .map(|entry| entry.scope.as_str())
            .collect();

        let mut locals = BTreeMap::new();
        locals.insert("scopes".to_string(), serde_json::to_value(&scopes)?);

        let assigns = Assigns {
            directories: directories.to_vec(),
            resource: directories.last().map(serde_json::to_value).transpose()?,
            errors,
            locals,
            ..Assigns::default()
        };
        Ok(Dispatch::render(view, assigns))
    }

    fn invalid_document(&self, view: &str, error: serde_json::Error) -> Result<Dispatch> {
        tracing::warn!("Rejected import document: {}", error);
        let mut errors = FieldErrors::new();
        errors.add("base", format!("is not an export document ({error})"));
        Ok(self
            .import_form(view, errors)?
            .invalid()
            .with_flash(Flash::now(FlashLevel::Warning, "Unable to import.")))
    }

    fn import_response(&self, view: &str, mutation: Mutation<ImportSummary>) -> Result<Dispatch> {
        let summary = mutation.record;
        if let Some(slug) = summary.rejected {
            tracing::warn!("Import stopped at {} after {} records", slug, summary.created);
            return Ok(self
                .import_form(view, mutation.errors)?
                .invalid()
                .with_flash(Flash::now(
                    FlashLevel::Warning,
                    format!("Unable to import {slug}; {} records were imported before it.", summary.created),
                )));
        }

        tracing::info!("Imported {} records", summary.created);
        let base = absolute_path(self.inner.delegate().directories().iter().map(|d| d.slug.as_str()));
        Ok(Dispatch::redirect(dashboard_path(&base)).with_flash(Flash::next(
            FlashLevel::Success,
            format!("Imported {} records.", summary.created),
        )))
    }
}

impl<'a> Deref for DirectoryDispatcher<'a> {
    type Target = ResourceDispatcher<DirectoryDelegate<'a>>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Build the export tree below `directory`, or from the synthetic root.
pub fn export_subtree(db: &Database, directory: Option<Directory>) -> Result<DirectoryExport> {
    let parent = FeatureParent::Directory(directory.clone());

    let features = db
        .features_in(&parent)?
        .into_iter()
        .map(|feature| export_feature(db, feature))
        .collect::<Result<Vec<_>>>()?;

    let directories = db
        .child_directories(directory.as_ref().map(|d| d.id))?
        .into_iter()
        .map(|child| export_subtree(db, Some(child)))
        .collect::<Result<Vec<_>>>()?;

    Ok(DirectoryExport {
        directory,
        features,
        directories,
    })
}

fn export_feature(db: &Database, feature: Feature) -> Result<FeatureExport> {
    let features = db
        .features_in(&FeatureParent::Feature(feature.clone()))?
        .into_iter()
        .map(|child| export_feature(db, child))
        .collect::<Result<Vec<_>>>()?;

    Ok(FeatureExport { feature, features })
}
