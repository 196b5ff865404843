//! Import of export documents back into the tree.
//!
//! Imported records get fresh ids and timestamps. Titles, slugs, slug locks,
//! bodies and publication state are kept. Records are written one at a time
//! without a transaction, so a rejection part way through leaves everything
//! written before it in place.

use std::collections::BTreeSet;

use anyhow::Result;
use serde::Serialize;

use crate::db::Database;
use crate::models::{
    Attributes, Directory, DirectoryExport, Feature, FeatureExport, FeatureParent, FieldErrors, Mutation,
};
use crate::registry::FeatureRegistry;

/// What an import wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    /// Slug of the record that was rejected, if any.
    pub rejected: Option<String>,
}

struct Importer<'a> {
    db: &'a Database,
    registry: &'a FeatureRegistry,
    reserved: BTreeSet<String>,
    created: usize,
}

/// Recreate `export` below `parent` (`None` for the root). A synthetic root
/// document contributes its features and directories directly.
pub fn import_subtree(
    db: &Database,
    registry: &FeatureRegistry,
    parent: Option<&Directory>,
    export: &DirectoryExport,
) -> Result<Mutation<ImportSummary>> {
    let mut importer = Importer::new(db, registry);
    let rejection = importer.directory(parent, export)?;
    Ok(importer.finish(rejection))
}

/// Recreate one exported feature, with the features it contains, inside
/// `parent`.
pub fn import_feature(
    db: &Database,
    registry: &FeatureRegistry,
    parent: FeatureParent,
    export: &FeatureExport,
) -> Result<Mutation<ImportSummary>> {
    let mut importer = Importer::new(db, registry);
    let rejection = importer.feature(parent, export)?;
    Ok(importer.finish(rejection))
}

type Rejection = Option<(String, FieldErrors)>;

impl<'a> Importer<'a> {
    fn new(db: &'a Database, registry: &'a FeatureRegistry) -> Self {
        Self {
            db,
            registry,
            reserved: registry.reserved_slugs(),
            created: 0,
        }
    }

    fn finish(self, rejection: Rejection) -> Mutation<ImportSummary> {
        match rejection {
            None => Mutation::saved(ImportSummary {
                created: self.created,
                rejected: None,
            }),
            Some((slug, errors)) => Mutation::rejected(
                ImportSummary {
                    created: self.created,
                    rejected: Some(slug),
                },
                errors,
            ),
        }
    }

    fn directory(&mut self, parent: Option<&Directory>, export: &DirectoryExport) -> Result<Rejection> {
        let target = match &export.directory {
            Some(source) => {
                let mut directory = Directory::build(parent.map(|p| p.id), &Attributes::new());
                directory.title = source.title.clone();
                directory.slug = source.slug.clone();
                directory.slug_lock = source.slug_lock;

                let mutation = self.db.insert_directory(directory, &self.reserved)?;
                if !mutation.is_success() {
                    return Ok(Some((source.slug.clone(), mutation.errors)));
                }
                self.created += 1;
                Some(mutation.record)
            }
            None => parent.cloned(),
        };

        for feature in &export.features {
            if let Some(rejection) = self.feature(FeatureParent::Directory(target.clone()), feature)? {
                return Ok(Some(rejection));
            }
        }

        for child in &export.directories {
            if let Some(rejection) = self.directory(target.as_ref(), child)? {
                return Ok(Some(rejection));
            }
        }

        Ok(None)
    }

    fn feature(&mut self, parent: FeatureParent, export: &FeatureExport) -> Result<Rejection> {
        let source = &export.feature;
        let rejected = |message: String| -> Result<Rejection> {
            let mut errors = FieldErrors::new();
            errors.add("feature_type", message);
            Ok(Some((source.slug.clone(), errors)))
        };

        let Some(entry) = self.registry.by_type(&source.feature_type) else {
            return rejected("is not registered".to_string());
        };
        let scope = match self.registry.scope(&entry.scope, parent) {
            Ok(scope) => scope,
            Err(e) => return rejected(e.to_string()),
        };

        let mut feature = scope.build(&Attributes::new());
        copy_content(&mut feature, source);

        let mutation = self.db.insert_feature(feature, &self.reserved)?;
        if !mutation.is_success() {
            return Ok(Some((source.slug.clone(), mutation.errors)));
        }
        self.created += 1;

        let container = FeatureParent::Feature(mutation.record);
        for child in &export.features {
            if let Some(rejection) = self.feature(container.clone(), child)? {
                return Ok(Some(rejection));
            }
        }

        Ok(None)
    }
}

fn copy_content(feature: &mut Feature, source: &Feature) {
    feature.title = source.title.clone();
    feature.slug = source.slug.clone();
    feature.slug_lock = source.slug_lock;
    feature.body = source.body.clone();
    feature.published_at = source.published_at;
    feature.published_order = source.published_order.clone();
}
