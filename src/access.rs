//! Authorization collaborator.
//!
//! The router only consumes a yes/no answer for `(subject, action,
//! resource)`; the rules live behind [`AccessPolicy`].

use serde::{Deserialize, Serialize};

use crate::dispatch::Action;
use crate::models::{Directory, Feature};

/// Who is making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Anonymous,
    Editor,
}

/// What an action targets.
#[derive(Debug, Clone, Copy)]
pub enum ResourceRef<'a> {
    /// The synthetic root above every root directory.
    Root,
    Directory(&'a Directory),
    Feature(&'a Feature),
    /// A collection scope name (`"directories"`, `"pages"`, ...).
    Collection(&'a str),
}

pub trait AccessPolicy: Send + Sync {
    fn allows(&self, subject: Subject, action: Action, resource: ResourceRef<'_>) -> bool;
}

impl<F> AccessPolicy for F
where
    F: Fn(Subject, Action, ResourceRef<'_>) -> bool + Send + Sync,
{
    fn allows(&self, subject: Subject, action: Action, resource: ResourceRef<'_>) -> bool {
        self(subject, action, resource)
    }
}

/// Editors may do anything. Anonymous visitors may view directories and
/// published features, nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditorPolicy;

impl AccessPolicy for EditorPolicy {
    fn allows(&self, subject: Subject, action: Action, resource: ResourceRef<'_>) -> bool {
        match subject {
            Subject::Editor => true,
            Subject::Anonymous => match (action, resource) {
                (Action::Show, ResourceRef::Root | ResourceRef::Directory(_)) => true,
                (Action::Show, ResourceRef::Feature(feature)) => feature.is_published(),
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attributes, FeatureParent};
    use chrono::Utc;

    fn page() -> Feature {
        Feature::build("Page", &FeatureParent::Directory(None), &Attributes::new())
    }

    #[test]
    fn editors_may_do_anything() {
        let page = page();
        assert!(EditorPolicy.allows(Subject::Editor, Action::Destroy, ResourceRef::Feature(&page)));
        assert!(EditorPolicy.allows(Subject::Editor, Action::Export, ResourceRef::Root));
    }

    #[test]
    fn anonymous_sees_only_published_features() {
        let mut page = page();
        assert!(!EditorPolicy.allows(Subject::Anonymous, Action::Show, ResourceRef::Feature(&page)));

        page.publish(Utc::now());
        assert!(EditorPolicy.allows(Subject::Anonymous, Action::Show, ResourceRef::Feature(&page)));
        assert!(!EditorPolicy.allows(Subject::Anonymous, Action::Edit, ResourceRef::Feature(&page)));
    }

    #[test]
    fn anonymous_cannot_use_admin_actions() {
        assert!(EditorPolicy.allows(Subject::Anonymous, Action::Show, ResourceRef::Root));
        assert!(!EditorPolicy.allows(Subject::Anonymous, Action::Dashboard, ResourceRef::Root));
        assert!(!EditorPolicy.allows(
            Subject::Anonymous,
            Action::Index,
            ResourceRef::Collection("pages")
        ));
    }

    #[test]
    fn closures_are_policies() {
        let deny_all = |_: Subject, _: Action, _: ResourceRef<'_>| false;
        assert!(!deny_all.allows(Subject::Editor, Action::Show, ResourceRef::Root));
    }
}
