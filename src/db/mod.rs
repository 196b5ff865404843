mod schema;

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::models::slug::INDEX_SLUG;
use crate::models::*;

const DIRECTORY_COLUMNS: &str = "id, parent_id, title, slug, slug_lock, created_at, updated_at";

const FEATURE_COLUMNS: &str = "id, feature_type, directory_id, container_id, title, slug, slug_lock, \
     body, published_at, published_order, created_at, updated_at";

/// A record another record depends on is gone.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found: {1}")]
    Missing(&'static str, Uuid),
}

/// SQLite-backed store for directories and features.
///
/// Writes validate first and report rejections as [`Mutation`] field errors;
/// `Err` is reserved for storage failures and missing parents.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "canopy")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("canopy.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    // ============================================================
    // Directory operations
    // ============================================================

    pub fn get_directory(&self, id: Uuid) -> Result<Option<Directory>> {
        let conn = self.lock()?;
        query_directory(&conn, id)
    }

    /// Find the child of `parent_id` (a root when `None`) with exactly `slug`.
    pub fn find_directory(&self, parent_id: Option<Uuid>, slug: &str) -> Result<Option<Directory>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE parent_id IS ? AND slug = ?"
        ))?;

        let mut rows = stmt.query((parent_id.map(|u| u.to_string()), slug))?;
        match rows.next()? {
            Some(row) => Ok(Some(directory_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn root_directories(&self) -> Result<Vec<Directory>> {
        self.child_directories(None)
    }

    /// Direct children of `parent_id`, or the roots when `None`.
    pub fn child_directories(&self, parent_id: Option<Uuid>) -> Result<Vec<Directory>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE parent_id IS ? ORDER BY title, slug"
        ))?;

        let directories = stmt
            .query_map([parent_id.map(|u| u.to_string())], directory_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(directories)
    }

    /// Ancestors of `directory`, root first, excluding the directory itself.
    pub fn directory_ancestors(&self, directory: &Directory) -> Result<Vec<Directory>> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([directory.id]);
        let mut next = directory.parent_id;

        while let Some(id) = next {
            if !seen.insert(id) {
                anyhow::bail!("Directory ancestry cycle detected at {}", id);
            }
            let parent = self
                .get_directory(id)?
                .ok_or(StoreError::Missing("Parent directory", id))?;
            next = parent.parent_id;
            ancestors.push(parent);
        }

        ancestors.reverse();
        Ok(ancestors)
    }

    /// Slug path of a directory from the root, without a leading separator.
    pub fn directory_path(&self, directory: &Directory) -> Result<String> {
        let mut slugs: Vec<String> = self
            .directory_ancestors(directory)?
            .into_iter()
            .map(|d| d.slug)
            .collect();
        slugs.push(directory.slug.clone());
        Ok(join_path(slugs))
    }

    pub fn insert_directory(
        &self,
        directory: Directory,
        reserved: &BTreeSet<String>,
    ) -> Result<Mutation<Directory>> {
        let conn = self.lock()?;

        if let Some(parent_id) = directory.parent_id {
            query_directory(&conn, parent_id)?.ok_or(StoreError::Missing("Parent directory", parent_id))?;
        }

        let errors = validate_directory(&conn, &directory, reserved)?;
        if !errors.is_empty() {
            return Ok(Mutation::rejected(directory, errors));
        }

        conn.execute(
            "INSERT INTO directories (id, parent_id, title, slug, slug_lock, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                directory.id.to_string(),
                directory.parent_id.map(|u| u.to_string()),
                &directory.title,
                &directory.slug,
                directory.slug_lock,
                directory.created_at.to_rfc3339(),
                directory.updated_at.to_rfc3339(),
            ),
        )?;

        tracing::info!("Created directory {} ({})", directory.slug, directory.id);
        Ok(Mutation::saved(directory))
    }

    pub fn update_directory(
        &self,
        mut directory: Directory,
        reserved: &BTreeSet<String>,
    ) -> Result<Mutation<Directory>> {
        let conn = self.lock()?;

        let errors = validate_directory(&conn, &directory, reserved)?;
        if !errors.is_empty() {
            return Ok(Mutation::rejected(directory, errors));
        }

        directory.updated_at = Utc::now();
        let rows = conn.execute(
            "UPDATE directories SET parent_id = ?, title = ?, slug = ?, slug_lock = ?, updated_at = ? WHERE id = ?",
            (
                directory.parent_id.map(|u| u.to_string()),
                &directory.title,
                &directory.slug,
                directory.slug_lock,
                directory.updated_at.to_rfc3339(),
                directory.id.to_string(),
            ),
        )?;

        if rows == 0 {
            return Err(StoreError::Missing("Directory", directory.id).into());
        }

        Ok(Mutation::saved(directory))
    }

    /// Destroy a directory with its whole subtree, returning the number of
    /// records removed.
    ///
    /// Records are deleted one at a time, depth first, outside a transaction:
    /// a failure part way through leaves the descendants that were not yet
    /// reached in place.
    pub fn destroy_directory(&self, id: Uuid) -> Result<usize> {
        let mut removed = 0;

        for child in self.child_directories(Some(id))? {
            removed += self.destroy_directory(child.id)?;
        }

        for feature in self.features_where(Some(id), None)? {
            removed += self.destroy_feature(feature.id)?;
        }

        let conn = self.lock()?;
        removed += conn.execute("DELETE FROM directories WHERE id = ?", [id.to_string()])?;
        Ok(removed)
    }

    // ============================================================
    // Feature operations
    // ============================================================

    pub fn get_feature(&self, id: Uuid) -> Result<Option<Feature>> {
        let conn = self.lock()?;
        query_feature(&conn, id)
    }

    /// Find the feature with exactly `slug` directly inside `parent`.
    pub fn find_feature(&self, parent: &FeatureParent, slug: &str) -> Result<Option<Feature>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FEATURE_COLUMNS} FROM features
             WHERE directory_id IS ? AND container_id IS ? AND slug = ?"
        ))?;

        let mut rows = stmt.query((
            parent.directory_id().map(|u| u.to_string()),
            parent.container_id().map(|u| u.to_string()),
            slug,
        ))?;
        match rows.next()? {
            Some(row) => Ok(Some(feature_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Every feature directly inside `parent`, whatever its type.
    pub fn features_in(&self, parent: &FeatureParent) -> Result<Vec<Feature>> {
        self.features_where(parent.directory_id(), parent.container_id())
    }

    /// Features directly inside `parent` tagged with `feature_type`.
    pub fn features_of_type(&self, parent: &FeatureParent, feature_type: &str) -> Result<Vec<Feature>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FEATURE_COLUMNS} FROM features
             WHERE directory_id IS ? AND container_id IS ? AND feature_type = ?
             ORDER BY published_order DESC, title"
        ))?;

        let features = stmt
            .query_map(
                (
                    parent.directory_id().map(|u| u.to_string()),
                    parent.container_id().map(|u| u.to_string()),
                    feature_type,
                ),
                feature_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(features)
    }

    fn features_where(
        &self,
        directory_id: Option<Uuid>,
        container_id: Option<Uuid>,
    ) -> Result<Vec<Feature>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FEATURE_COLUMNS} FROM features
             WHERE directory_id IS ? AND container_id IS ? ORDER BY title, slug"
        ))?;

        let features = stmt
            .query_map(
                (
                    directory_id.map(|u| u.to_string()),
                    container_id.map(|u| u.to_string()),
                ),
                feature_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(features)
    }

    /// Slug path of a feature: directory slugs, container slugs, then its own
    /// slug, without a leading separator.
    pub fn feature_path(&self, feature: &Feature) -> Result<String> {
        let mut slugs = vec![feature.slug.clone()];
        let mut seen = HashSet::from([feature.id]);
        let mut next = feature.container_id;

        while let Some(id) = next {
            if !seen.insert(id) {
                anyhow::bail!("Feature containment cycle detected at {}", id);
            }
            let container = self
                .get_feature(id)?
                .ok_or(StoreError::Missing("Container feature", id))?;
            slugs.push(container.slug.clone());
            next = container.container_id;
        }

        if let Some(directory_id) = feature.directory_id {
            let directory = self
                .get_directory(directory_id)?
                .ok_or(StoreError::Missing("Parent directory", directory_id))?;
            slugs.push(self.directory_path(&directory)?);
        }

        slugs.reverse();
        Ok(join_path(slugs))
    }

    pub fn insert_feature(
        &self,
        feature: Feature,
        reserved: &BTreeSet<String>,
    ) -> Result<Mutation<Feature>> {
        let conn = self.lock()?;

        if let Some(directory_id) = feature.directory_id {
            query_directory(&conn, directory_id)?
                .ok_or(StoreError::Missing("Parent directory", directory_id))?;
        }
        if let Some(container_id) = feature.container_id {
            query_feature(&conn, container_id)?
                .ok_or(StoreError::Missing("Container feature", container_id))?;
        }

        let errors = validate_feature(&conn, &feature, reserved)?;
        if !errors.is_empty() {
            return Ok(Mutation::rejected(feature, errors));
        }

        conn.execute(
            &format!(
                "INSERT INTO features ({FEATURE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            rusqlite::params![
                feature.id.to_string(),
                &feature.feature_type,
                feature.directory_id.map(|u| u.to_string()),
                feature.container_id.map(|u| u.to_string()),
                &feature.title,
                &feature.slug,
                feature.slug_lock,
                &feature.body,
                feature.published_at.map(|t| t.to_rfc3339()),
                &feature.published_order,
                feature.created_at.to_rfc3339(),
                feature.updated_at.to_rfc3339(),
            ],
        )?;

        tracing::info!(
            "Created {} {} ({})",
            feature.feature_type,
            feature.slug,
            feature.id
        );
        Ok(Mutation::saved(feature))
    }

    pub fn update_feature(
        &self,
        mut feature: Feature,
        reserved: &BTreeSet<String>,
    ) -> Result<Mutation<Feature>> {
        let conn = self.lock()?;

        let errors = validate_feature(&conn, &feature, reserved)?;
        if !errors.is_empty() {
            return Ok(Mutation::rejected(feature, errors));
        }

        feature.updated_at = Utc::now();
        let rows = conn.execute(
            "UPDATE features SET title = ?, slug = ?, slug_lock = ?, body = ?, published_at = ?,
                 published_order = ?, updated_at = ?
             WHERE id = ?",
            rusqlite::params![
                &feature.title,
                &feature.slug,
                feature.slug_lock,
                &feature.body,
                feature.published_at.map(|t| t.to_rfc3339()),
                &feature.published_order,
                feature.updated_at.to_rfc3339(),
                feature.id.to_string(),
            ],
        )?;

        if rows == 0 {
            return Err(StoreError::Missing("Feature", feature.id).into());
        }

        Ok(Mutation::saved(feature))
    }

    /// Destroy a feature and every feature it contains, returning the number
    /// of records removed. Not transactional, like [`Database::destroy_directory`].
    pub fn destroy_feature(&self, id: Uuid) -> Result<usize> {
        let mut removed = 0;

        let contained = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare("SELECT id FROM features WHERE container_id = ?")?;
            let ids = stmt
                .query_map([id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        for child in contained {
            removed += self.destroy_feature(parse_uuid(child))?;
        }

        let conn = self.lock()?;
        removed += conn.execute("DELETE FROM features WHERE id = ?", [id.to_string()])?;
        Ok(removed)
    }

    /// Total number of directory and feature records.
    pub fn count_records(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM directories) + (SELECT COUNT(*) FROM features)",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count)?)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn query_directory(conn: &Connection, id: Uuid) -> Result<Option<Directory>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE id = ?"
    ))?;

    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(directory_from_row(row)?)),
        None => Ok(None),
    }
}

fn query_feature(conn: &Connection, id: Uuid) -> Result<Option<Feature>> {
    let mut stmt = conn.prepare(&format!("SELECT {FEATURE_COLUMNS} FROM features WHERE id = ?"))?;

    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(feature_from_row(row)?)),
        None => Ok(None),
    }
}

fn validate_directory(
    conn: &Connection,
    directory: &Directory,
    reserved: &BTreeSet<String>,
) -> Result<FieldErrors> {
    let mut errors = FieldErrors::new();

    if directory.title.trim().is_empty() {
        errors.add("title", "can't be blank");
    }

    if directory.slug.is_empty() {
        errors.add("slug", "can't be blank");
    } else if reserved.contains(&directory.slug) {
        errors.add("slug", "is reserved");
    } else if slug_taken_in_directory(conn, directory.parent_id, &directory.slug, directory.id)? {
        errors.add("slug", "is already taken");
    }

    Ok(errors)
}

fn validate_feature(
    conn: &Connection,
    feature: &Feature,
    reserved: &BTreeSet<String>,
) -> Result<FieldErrors> {
    let mut errors = FieldErrors::new();

    if feature.title.trim().is_empty() {
        errors.add("title", "can't be blank");
    }

    if feature.slug.is_empty() {
        errors.add("slug", "can't be blank");
    } else if feature.slug != INDEX_SLUG && reserved.contains(&feature.slug) {
        errors.add("slug", "is reserved");
    } else {
        let taken = match feature.container_id {
            Some(container_id) => {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM features WHERE container_id = ? AND slug = ? AND id != ?",
                    (
                        container_id.to_string(),
                        &feature.slug,
                        feature.id.to_string(),
                    ),
                    |row| row.get(0),
                )?;
                count > 0
            }
            None => slug_taken_in_directory(conn, feature.directory_id, &feature.slug, feature.id)?,
        };
        if taken {
            errors.add("slug", "is already taken");
        }
    }

    Ok(errors)
}

/// Whether a directory or top-level feature other than `except` already uses
/// `slug` directly under `parent_id`.
fn slug_taken_in_directory(
    conn: &Connection,
    parent_id: Option<Uuid>,
    slug: &str,
    except: Uuid,
) -> Result<bool> {
    let parent = parent_id.map(|u| u.to_string());
    let except = except.to_string();

    let count: i64 = conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM directories WHERE parent_id IS ?1 AND slug = ?2 AND id != ?3)
          + (SELECT COUNT(*) FROM features
               WHERE directory_id IS ?1 AND container_id IS NULL AND slug = ?2 AND id != ?3)",
        (&parent, slug, &except),
        |row| row.get(0),
    )?;

    Ok(count > 0)
}

fn directory_from_row(row: &Row<'_>) -> rusqlite::Result<Directory> {
    Ok(Directory {
        id: parse_uuid(row.get::<_, String>(0)?),
        parent_id: row.get::<_, Option<String>>(1)?.map(parse_uuid),
        title: row.get(2)?,
        slug: row.get(3)?,
        slug_lock: row.get(4)?,
        created_at: parse_datetime(row.get::<_, String>(5)?),
        updated_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

fn feature_from_row(row: &Row<'_>) -> rusqlite::Result<Feature> {
    Ok(Feature {
        id: parse_uuid(row.get::<_, String>(0)?),
        feature_type: row.get(1)?,
        directory_id: row.get::<_, Option<String>>(2)?.map(parse_uuid),
        container_id: row.get::<_, Option<String>>(3)?.map(parse_uuid),
        title: row.get(4)?,
        slug: row.get(5)?,
        slug_lock: row.get(6)?,
        body: row.get(7)?,
        published_at: row.get::<_, Option<String>>(8)?.map(parse_datetime),
        published_order: row.get(9)?,
        created_at: parse_datetime(row.get::<_, String>(10)?),
        updated_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
