use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attributes::{assign_sluggable, Attributes};
use super::feature::FeatureExport;

/// A structural node of the content tree.
///
/// Directories nest to any depth through `parent_id` (`None` is a root) and
/// host features. The slug is unique among everything sharing the parent,
/// directories and features alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub slug: String,
    /// When set, the slug no longer follows the title.
    pub slug_lock: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Directory {
    /// Build an unsaved directory under `parent_id`.
    pub fn build(parent_id: Option<Uuid>, attributes: &Attributes) -> Self {
        let now = Utc::now();
        let mut directory = Self {
            id: Uuid::new_v4(),
            parent_id,
            title: String::new(),
            slug: String::new(),
            slug_lock: false,
            created_at: now,
            updated_at: now,
        };
        directory.assign(attributes);
        directory
    }

    /// Apply sanitized attributes in memory.
    pub fn assign(&mut self, attributes: &Attributes) {
        assign_sluggable(&mut self.title, &mut self.slug, &mut self.slug_lock, attributes);
    }
}

/// A directory subtree as produced by the export action.
///
/// The synthetic root has `directory: None` and holds the root directories
/// and root features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryExport {
    pub directory: Option<Directory>,
    pub features: Vec<FeatureExport>,
    pub directories: Vec<DirectoryExport>,
}

impl DirectoryExport {
    /// Number of directory and feature records in the subtree, the synthetic
    /// root excluded.
    pub fn record_count(&self) -> usize {
        let own = usize::from(self.directory.is_some());
        own + self.features.iter().map(FeatureExport::record_count).sum::<usize>()
            + self
                .directories
                .iter()
                .map(DirectoryExport::record_count)
                .sum::<usize>()
    }
}
