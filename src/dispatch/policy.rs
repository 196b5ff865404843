//! Per-type override values for the shared dispatch template.

use serde::{Deserialize, Serialize};

use super::action::{Action, Outcome};
use super::FlashLevel;
use crate::models::Attributes;

/// Everything a resource type overrides in the dispatch template: the
/// attribute allow-list, the view identifiers and the redirect rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    /// Type tag stored with records (`"Directory"`, `"BlogPost"`).
    pub type_name: String,
    /// Name used in flash messages (`"Post"`).
    pub display_name: String,
    /// Plural snake-case name used in view identifiers (`"blog_posts"`).
    pub resource_name: String,
    pub permitted: Vec<String>,
    pub views: ViewSet,
    pub redirects: Vec<RedirectOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSet {
    pub index: String,
    pub new: String,
    pub show: String,
    pub edit: String,
}

/// Redirect destination for one `(action, outcome)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectOverride {
    pub action: Action,
    pub outcome: Outcome,
    pub target: RouteTarget,
}

/// Named locations a delegate knows how to build paths for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Index,
    Resource,
    Dashboard,
    ParentDashboard,
}

impl ResourcePolicy {
    /// Policy for directories.
    pub fn directories() -> Self {
        Self {
            type_name: "Directory".to_string(),
            display_name: "Directory".to_string(),
            resource_name: "directories".to_string(),
            permitted: vec!["title".to_string(), "slug".to_string()],
            views: ViewSet {
                index: "admin/directories/index".to_string(),
                new: "admin/directories/new".to_string(),
                show: "directories/show".to_string(),
                edit: "admin/directories/edit".to_string(),
            },
            redirects: Vec::new(),
        }
        .with_redirect(Action::Create, Outcome::Success, RouteTarget::Dashboard)
        .with_redirect(Action::Update, Outcome::Success, RouteTarget::Dashboard)
        .with_redirect(Action::Destroy, Outcome::Success, RouteTarget::ParentDashboard)
        .with_redirect(Action::Publish, Outcome::Failure, RouteTarget::Dashboard)
        .with_redirect(Action::Unpublish, Outcome::Failure, RouteTarget::Dashboard)
    }

    /// Policy for a feature type. Successful writes land on the feature itself.
    pub fn feature(type_name: &str, display_name: &str, permitted: &[&str]) -> Self {
        let resource_name = plural_snake_case(type_name);
        Self {
            type_name: type_name.to_string(),
            display_name: display_name.to_string(),
            permitted: permitted.iter().map(|f| f.to_string()).collect(),
            views: ViewSet {
                index: format!("admin/features/{resource_name}/index"),
                new: format!("admin/features/{resource_name}/new"),
                show: format!("features/{resource_name}/show"),
                edit: format!("admin/features/{resource_name}/edit"),
            },
            resource_name,
            redirects: Vec::new(),
        }
        .with_redirect(Action::Create, Outcome::Success, RouteTarget::Resource)
        .with_redirect(Action::Update, Outcome::Success, RouteTarget::Resource)
        .with_redirect(Action::Publish, Outcome::Success, RouteTarget::Resource)
        .with_redirect(Action::Unpublish, Outcome::Success, RouteTarget::Resource)
        .with_redirect(Action::Publish, Outcome::Failure, RouteTarget::Resource)
        .with_redirect(Action::Unpublish, Outcome::Failure, RouteTarget::Resource)
    }

    /// Add or replace the redirect for `(action, outcome)`.
    pub fn with_redirect(mut self, action: Action, outcome: Outcome, target: RouteTarget) -> Self {
        self.redirects
            .retain(|r| !(r.action == action && r.outcome == outcome));
        self.redirects.push(RedirectOverride {
            action,
            outcome,
            target,
        });
        self
    }

    /// Where to send the client after `action` ended with `outcome`.
    /// Defaults to the collection index.
    pub fn redirect_target(&self, action: Action, outcome: Outcome) -> RouteTarget {
        self.redirects
            .iter()
            .find(|r| r.action == action && r.outcome == outcome)
            .map(|r| r.target)
            .unwrap_or(RouteTarget::Index)
    }

    /// Drop every attribute not on the allow-list.
    pub fn sanitize(&self, attributes: &Attributes) -> Attributes {
        sanitize(attributes, &self.permitted)
    }

    /// Flash message and severity for a mutation outcome.
    pub fn flash_message(&self, action: Action, outcome: Outcome) -> Option<(FlashLevel, String)> {
        let name = &self.display_name;
        let verb = match action {
            Action::Create => "created",
            Action::Update => "updated",
            Action::Destroy => "destroyed",
            Action::Publish => "published",
            Action::Unpublish => "unpublished",
            _ => return None,
        };

        Some(match outcome {
            Outcome::Success if action == Action::Destroy => {
                (FlashLevel::Danger, format!("{name} successfully {verb}."))
            }
            Outcome::Success => (FlashLevel::Success, format!("{name} successfully {verb}.")),
            Outcome::Failure => (
                FlashLevel::Warning,
                format!("Unable to {} {}.", action.as_str(), name.to_lowercase()),
            ),
        })
    }
}

/// Keep only the `permitted` keys of `attributes`. Unknown keys are dropped
/// silently.
pub fn sanitize(attributes: &Attributes, permitted: &[String]) -> Attributes {
    attributes
        .iter()
        .filter(|(key, _)| permitted.iter().any(|p| p == *key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// `"BlogPost"` becomes `"blog_posts"`.
fn plural_snake_case(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len() + 1);
    for (i, ch) in type_name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    if out.ends_with('s') {
        out
    } else {
        out + "s"
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
    fn sanitize_drops_unknown_fields() {
        let policy = ResourcePolicy::directories();
        let sanitized = policy.sanitize(&attrs(json!({"title": "T", "evil": "x"})));
        assert_eq!(sanitized, attrs(json!({"title": "T"})));
    }

    #[test]
    fn feature_views_use_plural_snake_case() {
        let policy = ResourcePolicy::feature("BlogPost", "Post", &["title"]);
        assert_eq!(policy.resource_name, "blog_posts");
        assert_eq!(policy.views.show, "features/blog_posts/show");
        assert_eq!(policy.views.edit, "admin/features/blog_posts/edit");
    }

    #[test]
    fn directory_redirects_override_defaults() {
        let policy = ResourcePolicy::directories();
        assert_eq!(
            policy.redirect_target(Action::Create, Outcome::Success),
            RouteTarget::Dashboard
        );
        assert_eq!(
            policy.redirect_target(Action::Destroy, Outcome::Success),
            RouteTarget::ParentDashboard
        );
        assert_eq!(
            policy.redirect_target(Action::Create, Outcome::Failure),
            RouteTarget::Index
        );
    }

    #[test]
    fn with_redirect_replaces_existing_override() {
        let policy = ResourcePolicy::directories().with_redirect(
            Action::Create,
            Outcome::Success,
            RouteTarget::Resource,
        );
        assert_eq!(
            policy.redirect_target(Action::Create, Outcome::Success),
            RouteTarget::Resource
        );
        assert_eq!(
            policy
                .redirects
                .iter()
                .filter(|r| r.action == Action::Create && r.outcome == Outcome::Success)
                .count(),
            1
        );
    }

    #[test]
    fn flash_messages_use_display_name() {
        let policy = ResourcePolicy::feature("BlogPost", "Post", &["title"]);
        assert_eq!(
            policy.flash_message(Action::Create, Outcome::Success),
            Some((FlashLevel::Success, "Post successfully created.".to_string()))
        );
        assert_eq!(
            policy.flash_message(Action::Destroy, Outcome::Success),
            Some((FlashLevel::Danger, "Post successfully destroyed.".to_string()))
        );
        assert_eq!(
            policy.flash_message(Action::Update, Outcome::Failure),
            Some((FlashLevel::Warning, "Unable to update post.".to_string()))
        );
        assert_eq!(policy.flash_message(Action::Show, Outcome::Success), None);
    }
}
