//! Path resolution against the content tree.
//!
//! [`AncestryResolver`] walks slug segments through directories only.
//! [`PathResolver`] continues the walk into features (and features nested
//! in features) once the directories run out.
//!
//! Both walks are accumulating loops: the matched prefix and the unmatched
//! remainder are returned as data. Only [`AncestryResolver::resolve`] turns
//! a partial match into an error.

mod render;

use thiserror::Error;

use crate::db::Database;
use crate::models::{join_path, Directory, Feature, FeatureParent};

pub use render::render_tree;

#[derive(Debug, Error)]
pub enum AncestryError {
    #[error("Malformed request: empty path")]
    MalformedRequest,

    #[error("Path not found: {search}")]
    NotFound {
        search: String,
        found: Vec<Directory>,
        missing: Vec<String>,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Longest matched directory chain plus the segments left over.
#[derive(Debug, Clone, Default)]
pub struct Ancestry {
    pub found: Vec<Directory>,
    pub missing: Vec<String>,
}

impl Ancestry {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub struct AncestryResolver<'a> {
    db: &'a Database,
}

impl<'a> AncestryResolver<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Match segments left to right, each against the children of the
    /// previous match (the roots for the first one). Stops at the first miss.
    pub fn walk<S: AsRef<str>>(&self, segments: &[S]) -> anyhow::Result<Ancestry> {
        let mut found: Vec<Directory> = Vec::with_capacity(segments.len());

        for (index, segment) in segments.iter().enumerate() {
            let parent_id = found.last().map(|d| d.id);
            match self.db.find_directory(parent_id, segment.as_ref())? {
                Some(directory) => found.push(directory),
                None => {
                    let missing = segments[index..]
                        .iter()
                        .map(|s| s.as_ref().to_string())
                        .collect();
                    return Ok(Ancestry { found, missing });
                }
            }
        }

        Ok(Ancestry {
            found,
            missing: Vec::new(),
        })
    }

    /// The directory chain, root first, for a non-empty segment list that
    /// matches completely.
    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> Result<Vec<Directory>, AncestryError> {
        if segments.is_empty() {
            return Err(AncestryError::MalformedRequest);
        }

        let ancestry = self.walk(segments)?;
        if ancestry.is_complete() {
            return Ok(ancestry.found);
        }

        let search = join_path(segments.iter().map(|s| s.as_ref()));
        tracing::debug!(
            "Ancestry miss for {}: {} found, {} missing",
            search,
            ancestry.found.len(),
            ancestry.missing.len()
        );
        Err(AncestryError::NotFound {
            search,
            found: ancestry.found,
            missing: ancestry.missing,
        })
    }
}

/// A path resolved into directories, then features.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPath {
    pub directories: Vec<Directory>,
    /// Outermost first: a blog, then a post inside it.
    pub features: Vec<Feature>,
    pub missing: Vec<String>,
}

impl ResolvedPath {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn directory(&self) -> Option<&Directory> {
        self.directories.last()
    }

    pub fn feature(&self) -> Option<&Feature> {
        self.features.last()
    }

    /// Where new features at the end of this path would be created.
    pub fn parent(&self) -> FeatureParent {
        match self.feature() {
            Some(feature) => FeatureParent::Feature(feature.clone()),
            None => FeatureParent::Directory(self.directory().cloned()),
        }
    }

    /// Absolute path of the deepest matched directory.
    pub fn directory_path(&self) -> String {
        crate::models::slug::absolute_path(self.directories.iter().map(|d| d.slug.as_str()))
    }
}

pub struct PathResolver<'a> {
    db: &'a Database,
}

impl<'a> PathResolver<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Resolve directories first, then features inside the deepest
    /// directory, then features inside that feature. An empty segment list
    /// is the root.
    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> anyhow::Result<ResolvedPath> {
        let ancestry = AncestryResolver::new(self.db).walk(segments)?;
        let mut resolved = ResolvedPath {
            directories: ancestry.found,
            features: Vec::new(),
            missing: Vec::new(),
        };

        let mut remaining = ancestry.missing.into_iter();
        while let Some(segment) = remaining.next() {
            match self.db.find_feature(&resolved.parent(), &segment)? {
                Some(feature) => resolved.features.push(feature),
                None => {
                    resolved.missing.push(segment);
                    resolved.missing.extend(remaining.by_ref());
                    break;
                }
            }
        }

        Ok(resolved)
    }
}
