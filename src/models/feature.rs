use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attributes::{assign_sluggable, string_attribute, Attributes};
use super::directory::Directory;

/// A typed content leaf (or container) hosted by a directory.
///
/// `feature_type` is the discriminant tag naming the registered type
/// (`"Page"`, `"Blog"`, `"BlogPost"`, ...). Features nested inside another
/// feature (a post inside a blog) keep the directory reference of their
/// container and point at it through `container_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: Uuid,
    pub feature_type: String,
    pub directory_id: Option<Uuid>,
    pub container_id: Option<Uuid>,
    pub title: String,
    pub slug: String,
    pub slug_lock: bool,
    pub body: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Sort key derived from `published_at`; cleared on unpublish.
    pub published_order: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feature {
    /// Build an unsaved feature of `feature_type` inside `parent`.
    pub fn build(feature_type: &str, parent: &FeatureParent, attributes: &Attributes) -> Self {
        let now = Utc::now();
        let mut feature = Self {
            id: Uuid::new_v4(),
            feature_type: feature_type.to_string(),
            directory_id: parent.directory_id(),
            container_id: parent.container_id(),
            title: String::new(),
            slug: String::new(),
            slug_lock: false,
            body: None,
            published_at: None,
            published_order: None,
            created_at: now,
            updated_at: now,
        };
        feature.assign(attributes);
        feature
    }

    /// Apply sanitized attributes in memory.
    pub fn assign(&mut self, attributes: &Attributes) {
        assign_sluggable(&mut self.title, &mut self.slug, &mut self.slug_lock, attributes);
        if let Some(body) = string_attribute(attributes, "body") {
            self.body = body;
        }
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    /// Mark published at `at`. Re-publishing overwrites the timestamp.
    pub fn publish(&mut self, at: DateTime<Utc>) {
        self.published_at = Some(at);
        self.published_order = Some(at.to_rfc3339());
    }

    pub fn unpublish(&mut self) {
        self.published_at = None;
        self.published_order = None;
    }
}

/// Where a feature lives: directly in a directory (`None` is the root), or
/// inside a container feature.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureParent {
    Directory(Option<Directory>),
    Feature(Feature),
}

impl FeatureParent {
    pub fn directory_id(&self) -> Option<Uuid> {
        match self {
            Self::Directory(directory) => directory.as_ref().map(|d| d.id),
            Self::Feature(container) => container.directory_id,
        }
    }

    pub fn container_id(&self) -> Option<Uuid> {
        match self {
            Self::Directory(_) => None,
            Self::Feature(container) => Some(container.id),
        }
    }
}

/// A feature with the features it contains, as produced by export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureExport {
    #[serde(flatten)]
    pub feature: Feature,
    pub features: Vec<FeatureExport>,
}

impl FeatureExport {
    pub fn record_count(&self) -> usize {
        1 + self
            .features
            .iter()
            .map(FeatureExport::record_count)
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn build_injects_container_identity() {
        let blog = Feature::build(
            "Blog",
            &FeatureParent::Directory(None),
            &attrs(json!({"title": "News"})),
        );
        let post = Feature::build(
            "BlogPost",
            &FeatureParent::Feature(blog.clone()),
            &attrs(json!({"title": "Launch Day", "body": "We are live."})),
        );

        assert_eq!(post.container_id, Some(blog.id));
        assert_eq!(post.directory_id, blog.directory_id);
        assert_eq!(post.slug, "launch-day");
        assert_eq!(post.body.as_deref(), Some("We are live."));
    }

    #[test]
    fn publish_then_unpublish_clears_order() {
        let mut page = Feature::build(
            "Page",
            &FeatureParent::Directory(None),
            &attrs(json!({"title": "About"})),
        );
        page.publish(Utc::now());
        assert!(page.is_published());
        assert!(page.published_order.is_some());

        page.unpublish();
        assert!(page.published_at.is_none());
        assert!(page.published_order.is_none());
    }
}
