//! Generic resource dispatch.
//!
//! [`ResourceDispatcher`] runs the shared template for every action
//! (sanitize, mutate, respond) and asks a [`ResourceDelegate`] for the parts
//! that differ between resource types: loading, building, persisting and
//! path computation. The per-type overrides themselves (allow-list, views,
//! redirect rule) are plain data in a [`ResourcePolicy`].
//!
//! Results are returned as a [`Dispatch`] value: a render or redirect plus an
//! optional flash message. The HTTP boundary decides how to deliver them.

mod action;
mod directories;
mod features;
mod import;
mod policy;

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Attributes, Directory, FieldErrors, Mutation};

pub use action::{Action, Outcome};
pub use directories::{dashboard_path, export_subtree, DirectoryDelegate, DirectoryDispatcher};
pub use features::{FeatureDelegate, FeatureDispatcher};
pub use import::{import_feature, import_subtree, ImportSummary};
pub use policy::{sanitize, RedirectOverride, ResourcePolicy, RouteTarget, ViewSet};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

/// Whether a flash message belongs to this response only or survives the
/// redirect that follows it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlashLifetime {
    Now,
    Next,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
    pub lifetime: FlashLifetime,
}

impl Flash {
    pub fn now(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            lifetime: FlashLifetime::Now,
        }
    }

    pub fn next(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            lifetime: FlashLifetime::Next,
        }
    }
}

/// Values exposed to a rendered view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Assigns {
    /// The resolved directory chain, root first.
    pub directories: Vec<Directory>,
    pub resource: Option<Value>,
    pub resources: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "FieldErrors::is_empty", default)]
    pub errors: FieldErrors,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub locals: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Render {
        view: String,
        /// Set when a form is rendered again because validation failed.
        invalid: bool,
        assigns: Assigns,
    },
    Redirect {
        location: String,
    },
}

/// Result of running one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispatch {
    pub response: Response,
    pub flash: Option<Flash>,
}

impl Dispatch {
    pub fn render(view: impl Into<String>, assigns: Assigns) -> Self {
        Self {
            response: Response::Render {
                view: view.into(),
                invalid: false,
                assigns,
            },
            flash: None,
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            response: Response::Redirect {
                location: location.into(),
            },
            flash: None,
        }
    }

    /// Mark a render as a form shown again after rejected input.
    pub fn invalid(mut self) -> Self {
        if let Response::Render { invalid, .. } = &mut self.response {
            *invalid = true;
        }
        self
    }

    pub fn with_flash(mut self, flash: Flash) -> Self {
        self.flash = Some(flash);
        self
    }

    pub fn view(&self) -> Option<&str> {
        match &self.response {
            Response::Render { view, .. } => Some(view),
            Response::Redirect { .. } => None,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match &self.response {
            Response::Redirect { location } => Some(location),
            Response::Render { .. } => None,
        }
    }

    pub fn assigns(&self) -> Option<&Assigns> {
        match &self.response {
            Response::Render { assigns, .. } => Some(assigns),
            Response::Redirect { .. } => None,
        }
    }
}

/// Absolute paths a delegate resolves for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub index: String,
    pub resource: Option<String>,
    pub dashboard: Option<String>,
    pub parent_dashboard: Option<String>,
}

impl Routes {
    /// Path for `target`, falling back to the index when the delegate has no
    /// such location.
    pub fn path_for(&self, target: RouteTarget) -> &str {
        let path = match target {
            RouteTarget::Index => None,
            RouteTarget::Resource => self.resource.as_deref(),
            RouteTarget::Dashboard => self.dashboard.as_deref(),
            RouteTarget::ParentDashboard => self.parent_dashboard.as_deref(),
        };
        path.unwrap_or(&self.index)
    }
}

/// Type-specific collaborator of [`ResourceDispatcher`].
pub trait ResourceDelegate {
    type Resource: Serialize;

    fn policy(&self) -> &ResourcePolicy;

    /// Directory chain resolved for this request.
    fn directories(&self) -> &[Directory];

    fn load_resources(&self) -> Result<Vec<Self::Resource>>;

    /// Build an unsaved resource from sanitized attributes, attached to the
    /// creation parent.
    fn build_resource(&self, attributes: &Attributes) -> Self::Resource;

    fn insert_resource(&self, resource: Self::Resource) -> Result<Mutation<Self::Resource>>;

    fn update_resource(
        &self,
        resource: Self::Resource,
        attributes: &Attributes,
    ) -> Result<Mutation<Self::Resource>>;

    /// Remove the resource and everything it owns; returns the record count.
    fn destroy_resource(&self, resource: &Self::Resource) -> Result<usize>;

    fn publish_resource(&self, resource: Self::Resource) -> Result<Mutation<Self::Resource>> {
        Ok(not_publishable(resource))
    }

    fn unpublish_resource(&self, resource: Self::Resource) -> Result<Mutation<Self::Resource>> {
        Ok(not_publishable(resource))
    }

    fn routes(&self, resource: Option<&Self::Resource>) -> Result<Routes>;
}

fn not_publishable<T>(resource: T) -> Mutation<T> {
    let mut errors = FieldErrors::new();
    errors.add("base", "can't be published");
    Mutation::rejected(resource, errors)
}

/// Shared implementation of the nine resource actions.
pub struct ResourceDispatcher<D> {
    delegate: D,
}

impl<D: ResourceDelegate> ResourceDispatcher<D> {
    pub fn new(delegate: D) -> Self {
        Self { delegate }
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn policy(&self) -> &ResourcePolicy {
        self.delegate.policy()
    }

    pub fn index(&self) -> Result<Dispatch> {
        let resources = self
            .delegate
            .load_resources()?
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let assigns = Assigns {
            resources: Some(resources),
            ..self.assigns(None)?
        };
        Ok(Dispatch::render(&self.policy().views.index, assigns))
    }

    pub fn new_resource(&self, attributes: &Attributes) -> Result<Dispatch> {
        let resource = self.build(attributes);
        let assigns = self.assigns(Some(&resource))?;
        Ok(Dispatch::render(&self.policy().views.new, assigns))
    }

    pub fn create(&self, attributes: &Attributes) -> Result<Dispatch> {
        let resource = self.build(attributes);
        let mutation = self.delegate.insert_resource(resource)?;
        self.respond(Action::Create, mutation, &self.policy().views.new)
    }

    pub fn show(&self, resource: &D::Resource) -> Result<Dispatch> {
        let assigns = self.assigns(Some(resource))?;
        Ok(Dispatch::render(&self.policy().views.show, assigns))
    }

    pub fn edit(&self, resource: &D::Resource) -> Result<Dispatch> {
        let assigns = self.assigns(Some(resource))?;
        Ok(Dispatch::render(&self.policy().views.edit, assigns))
    }

    pub fn update(&self, resource: D::Resource, attributes: &Attributes) -> Result<Dispatch> {
        let sanitized = self.policy().sanitize(attributes);
        let mutation = self.delegate.update_resource(resource, &sanitized)?;
        self.respond(Action::Update, mutation, &self.policy().views.edit)
    }

    pub fn destroy(&self, resource: D::Resource) -> Result<Dispatch> {
        let removed = self.delegate.destroy_resource(&resource)?;
        tracing::info!(
            "Destroyed {} and {} owned record(s)",
            self.policy().type_name,
            removed.saturating_sub(1)
        );
        self.respond(Action::Destroy, Mutation::saved(resource), &self.policy().views.show)
    }

    pub fn publish(&self, resource: D::Resource) -> Result<Dispatch> {
        let mutation = self.delegate.publish_resource(resource)?;
        self.respond(Action::Publish, mutation, &self.policy().views.show)
    }

    pub fn unpublish(&self, resource: D::Resource) -> Result<Dispatch> {
        let mutation = self.delegate.unpublish_resource(resource)?;
        self.respond(Action::Unpublish, mutation, &self.policy().views.show)
    }

    fn build(&self, attributes: &Attributes) -> D::Resource {
        let sanitized = self.policy().sanitize(attributes);
        self.delegate.build_resource(&sanitized)
    }

    /// Success: flash for the next request and redirect. Failure of a form
    /// action: flash for this response and render the form again with the
    /// rejected instance. Failure of publish/unpublish: redirect with a
    /// warning, there is no form to go back to.
    fn respond(
        &self,
        action: Action,
        mutation: Mutation<D::Resource>,
        failure_view: &str,
    ) -> Result<Dispatch> {
        let outcome = Outcome::from_success(mutation.is_success());
        let policy = self.policy();
        let flash = policy.flash_message(action, outcome);

        let rerender = outcome == Outcome::Failure
            && matches!(action, Action::Create | Action::Update);

        if rerender {
            tracing::warn!(
                "{} {} rejected: {}",
                policy.type_name,
                action,
                mutation.errors.full_messages().join(", ")
            );

            let mut assigns = self.assigns(Some(&mutation.record))?;
            assigns.errors = mutation.errors;

            let mut dispatch = Dispatch::render(failure_view, assigns).invalid();
            if let Some((level, message)) = flash {
                dispatch = dispatch.with_flash(Flash::now(level, message));
            }
            return Ok(dispatch);
        }

        let routes = self.delegate.routes(Some(&mutation.record))?;
        let location = routes.path_for(policy.redirect_target(action, outcome));

        let mut dispatch = Dispatch::redirect(location);
        if let Some((level, message)) = flash {
            dispatch = dispatch.with_flash(Flash::next(level, message));
        }
        Ok(dispatch)
    }

    fn assigns(&self, resource: Option<&D::Resource>) -> Result<Assigns> {
        Ok(Assigns {
            directories: self.delegate.directories().to_vec(),
            resource: resource.map(serde_json::to_value).transpose()?,
            ..Assigns::default()
        })
    }
}
