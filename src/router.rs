//! Request routing onto the dispatchers.
//!
//! A request is a verb plus the slash-separated segments of its path. The
//! trailing segments select the action (`…/edit`, `…/pages/new`, a
//! collection name, or nothing for a member); the rest is resolved against
//! the content tree. Misses and denials come back as redirects with a
//! warning flash, so callers only see `Err` for malformed input, unknown
//! routes and storage failures.

use thiserror::Error;

use crate::access::{AccessPolicy, ResourceRef, Subject};
use crate::db::{Database, StoreError};
use crate::dispatch::{
    dashboard_path, Action, Dispatch, DirectoryDispatcher, FeatureDispatcher, Flash, FlashLevel,
};
use crate::models::{join_path, Attributes, FeatureParent};
use crate::registry::{FeatureRegistry, RegistryError};
use crate::tree::{AncestryError, AncestryResolver, PathResolver, ResolvedPath};

const DIRECTORIES: &str = "directories";
const FEATURES: &str = "features";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub verb: Verb,
    pub segments: Vec<String>,
    pub attributes: Attributes,
    pub subject: Subject,
}

impl RouteRequest {
    pub fn new(verb: Verb, path: &str, subject: Subject) -> Self {
        Self {
            verb,
            segments: split_path(path),
            attributes: Attributes::new(),
            subject,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unsupported action: {verb:?} /{path}")]
    UnsupportedAction { verb: Verb, path: String },

    #[error(transparent)]
    UnknownScope(#[from] RegistryError),

    /// A record the request depends on disappeared while it was handled.
    #[error(transparent)]
    MissingRelated(StoreError),

    #[error(transparent)]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for RouteError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<StoreError>() {
            Ok(missing) => Self::MissingRelated(missing),
            Err(e) => Self::Store(e),
        }
    }
}

/// What a request addresses once the action selector is stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A directory or feature (the root when `path` is empty).
    Member { path: Vec<String>, action: Action },
    /// A collection below `prefix`: `directories`, `features` or a
    /// registered scope name.
    Collection {
        prefix: Vec<String>,
        scope: String,
        action: Action,
    },
}

/// Split a URL path into segments. Leading and trailing separators are
/// ignored; empty segments in between are kept so that parsing can reject
/// them.
pub fn split_path(path: &str) -> Vec<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').map(str::to_string).collect()
}

pub struct PathRouter<'a> {
    db: &'a Database,
    registry: &'a FeatureRegistry,
    access: &'a dyn AccessPolicy,
}

impl<'a> PathRouter<'a> {
    pub fn new(db: &'a Database, registry: &'a FeatureRegistry, access: &'a dyn AccessPolicy) -> Self {
        Self {
            db,
            registry,
            access,
        }
    }

    /// Work out the target and action of a request without touching the
    /// store.
    pub fn parse(&self, verb: Verb, segments: &[String]) -> Result<Target, RouteError> {
        if segments.iter().any(|s| s.is_empty()) {
            return Err(RouteError::MalformedRequest(format!(
                "empty segment in /{}",
                segments.join("/")
            )));
        }

        let unsupported = || RouteError::UnsupportedAction {
            verb,
            path: segments.join("/"),
        };

        let Some((last, rest)) = segments.split_last() else {
            return match verb {
                Verb::Get => Ok(Target::Member {
                    path: Vec::new(),
                    action: Action::Show,
                }),
                _ => Err(unsupported()),
            };
        };

        let member_action = match last.as_str() {
            "edit" | "dashboard" => Some((Action::from_str(last), verb == Verb::Get)),
            "publish" | "unpublish" => Some((
                Action::from_str(last),
                matches!(verb, Verb::Post | Verb::Put | Verb::Patch),
            )),
            _ => None,
        };
        if let Some((action, verb_ok)) = member_action {
            return match action {
                Some(action) if verb_ok => Ok(Target::Member {
                    path: rest.to_vec(),
                    action,
                }),
                _ => Err(unsupported()),
            };
        }

        // `…/directories/import` and `…/features/import`; elsewhere "import"
        // is an ordinary slug
        if last == "import" {
            if let Some((scope, prefix)) = rest.split_last() {
                if scope == DIRECTORIES || scope == FEATURES {
                    return match verb {
                        Verb::Get | Verb::Post => Ok(Target::Collection {
                            prefix: prefix.to_vec(),
                            scope: scope.clone(),
                            action: Action::Import,
                        }),
                        _ => Err(unsupported()),
                    };
                }
            }
        }

        if matches!(last.as_str(), "new" | "index") {
            return match rest.split_last() {
                Some((scope, prefix)) if self.is_collection(scope) && verb == Verb::Get => {
                    let action = if last == "new" { Action::New } else { Action::Index };
                    if action == Action::New && scope == FEATURES {
                        return Err(unsupported());
                    }
                    Ok(Target::Collection {
                        prefix: prefix.to_vec(),
                        scope: scope.clone(),
                        action,
                    })
                }
                // A feature may be called "index"
                _ if last == "index" && verb == Verb::Get => Ok(Target::Member {
                    path: segments.to_vec(),
                    action: Action::Show,
                }),
                _ => Err(unsupported()),
            };
        }

        if self.is_collection(last) {
            let action = match verb {
                Verb::Get => Action::Index,
                Verb::Post if last != FEATURES => Action::Create,
                _ => return Err(unsupported()),
            };
            return Ok(Target::Collection {
                prefix: rest.to_vec(),
                scope: last.clone(),
                action,
            });
        }

        let action = match verb {
            Verb::Get => Action::Show,
            Verb::Put | Verb::Patch => Action::Update,
            Verb::Delete => Action::Destroy,
            Verb::Post => return Err(unsupported()),
        };
        Ok(Target::Member {
            path: segments.to_vec(),
            action,
        })
    }

    pub fn route(&self, request: &RouteRequest) -> Result<Dispatch, RouteError> {
        let target = self.parse(request.verb, &request.segments)?;
        tracing::debug!("Routing {:?} /{} as {:?}", request.verb, request.segments.join("/"), target);

        match target {
            Target::Member { path, action } => self.member(request, &path, action),
            Target::Collection {
                prefix,
                scope,
                action,
            } => self.collection(request, &prefix, &scope, action),
        }
    }

    /// Export of the subtree at `segments` (everything for an empty list).
    pub fn export(&self, segments: &[String], subject: Subject) -> Result<Dispatch, RouteError> {
        let directories = if segments.is_empty() {
            Vec::new()
        } else {
            match AncestryResolver::new(self.db).resolve(segments) {
                Ok(found) => found,
                Err(AncestryError::NotFound { found, missing, .. }) => {
                    let resolved = ResolvedPath {
                        directories: found,
                        features: Vec::new(),
                        missing,
                    };
                    return Ok(self.not_found(&resolved, Action::Export));
                }
                Err(AncestryError::MalformedRequest) => {
                    return Err(RouteError::MalformedRequest("empty path".to_string()))
                }
                Err(AncestryError::Store(e)) => return Err(e.into()),
            }
        };

        let directory = directories.last().cloned();
        let resource = match &directory {
            Some(directory) => ResourceRef::Directory(directory),
            None => ResourceRef::Root,
        };
        if !self.access.allows(subject, Action::Export, resource) {
            let resolved = ResolvedPath {
                directories,
                ..ResolvedPath::default()
            };
            return Ok(self.unauthorized(&resolved, subject, Action::Export));
        }

        let dispatcher = DirectoryDispatcher::new(self.db, self.registry, directories, self.access, subject);
        Ok(dispatcher.export(directory.as_ref())?)
    }

    fn member(&self, request: &RouteRequest, path: &[String], action: Action) -> Result<Dispatch, RouteError> {
        let resolved = PathResolver::new(self.db).resolve(path)?;
        if !resolved.is_complete() {
            return Ok(self.not_found(&resolved, action));
        }

        let subject = request.subject;
        let attributes = &request.attributes;
        let unsupported = || RouteError::UnsupportedAction {
            verb: request.verb,
            path: path.join("/"),
        };

        if let Some(feature) = resolved.feature() {
            if !self.access.allows(subject, action, ResourceRef::Feature(feature)) {
                return Ok(self.unauthorized(&resolved, subject, action));
            }

            let parent = match resolved.features.len() {
                n if n >= 2 => FeatureParent::Feature(resolved.features[n - 2].clone()),
                _ => FeatureParent::Directory(resolved.directory().cloned()),
            };
            let dispatcher = FeatureDispatcher::for_feature(
                self.db,
                self.registry,
                feature,
                resolved.directories.clone(),
                parent,
            )?;

            let dispatch = match action {
                Action::Show => dispatcher.show(feature)?,
                Action::Edit => dispatcher.edit(feature)?,
                Action::Update => dispatcher.update(feature.clone(), attributes)?,
                Action::Destroy => dispatcher.destroy(feature.clone())?,
                Action::Publish => dispatcher.publish(feature.clone())?,
                Action::Unpublish => dispatcher.unpublish(feature.clone())?,
                _ => return Err(unsupported()),
            };
            return Ok(dispatch);
        }

        let directory = resolved.directory();
        let resource = match directory {
            Some(directory) => ResourceRef::Directory(directory),
            None => ResourceRef::Root,
        };
        if !self.access.allows(subject, action, resource) {
            return Ok(self.unauthorized(&resolved, subject, action));
        }

        let dispatcher = DirectoryDispatcher::new(
            self.db,
            self.registry,
            resolved.directories.clone(),
            self.access,
            subject,
        );

        let dispatch = match (action, directory) {
            (Action::Show, directory) => dispatcher.show(directory)?,
            (Action::Dashboard, directory) => dispatcher.dashboard(directory)?,
            (Action::Edit, Some(directory)) => dispatcher.edit(directory)?,
            (Action::Update, Some(directory)) => dispatcher.update(directory.clone(), attributes)?,
            (Action::Destroy, Some(directory)) => dispatcher.destroy(directory.clone())?,
            (Action::Publish, Some(directory)) => dispatcher.publish(directory.clone())?,
            (Action::Unpublish, Some(directory)) => dispatcher.unpublish(directory.clone())?,
            _ => return Err(unsupported()),
        };
        Ok(dispatch)
    }

    fn collection(
        &self,
        request: &RouteRequest,
        prefix: &[String],
        scope: &str,
        action: Action,
    ) -> Result<Dispatch, RouteError> {
        let resolved = PathResolver::new(self.db).resolve(prefix)?;
        if !resolved.is_complete() {
            return Ok(self.not_found(&resolved, action));
        }

        let subject = request.subject;
        if !self.access.allows(subject, action, ResourceRef::Collection(scope)) {
            return Ok(self.unauthorized(&resolved, subject, action));
        }

        let attributes = &request.attributes;
        let unsupported = || RouteError::UnsupportedAction {
            verb: request.verb,
            path: join_path([prefix.join("/").as_str(), scope]),
        };

        if scope == DIRECTORIES || scope == FEATURES {
            if resolved.feature().is_some() {
                return Err(unsupported());
            }

            let dispatcher = DirectoryDispatcher::new(
                self.db,
                self.registry,
                resolved.directories.clone(),
                self.access,
                subject,
            );
            let form = request.verb == Verb::Get;
            let dispatch = match (scope, action) {
                (DIRECTORIES, Action::Import) if form => dispatcher.import_directory_form()?,
                (DIRECTORIES, Action::Import) => dispatcher.import_directory(attributes)?,
                (FEATURES, Action::Import) if form => dispatcher.import_feature_form()?,
                (FEATURES, Action::Import) => dispatcher.import_feature(attributes)?,
                (FEATURES, Action::Index) => dispatcher.features_index()?,
                (DIRECTORIES, Action::Index) => dispatcher.index()?,
                (DIRECTORIES, Action::New) => dispatcher.new_resource(attributes)?,
                (DIRECTORIES, Action::Create) => dispatcher.create(attributes)?,
                _ => return Err(unsupported()),
            };
            return Ok(dispatch);
        }

        let dispatcher = FeatureDispatcher::for_scope(
            self.db,
            self.registry,
            scope,
            resolved.directories.clone(),
            resolved.parent(),
        )?;
        let dispatch = match action {
            Action::Index => dispatcher.index()?,
            Action::New => dispatcher.new_resource(attributes)?,
            Action::Create => dispatcher.create(attributes)?,
            _ => return Err(unsupported()),
        };
        Ok(dispatch)
    }

    fn is_collection(&self, segment: &str) -> bool {
        segment == DIRECTORIES || segment == FEATURES || self.registry.contains_scope(segment)
    }

    /// Redirect to the deepest directory that matched: its public path for
    /// `show`, its dashboard for everything else.
    fn not_found(&self, resolved: &ResolvedPath, action: Action) -> Dispatch {
        let base = resolved.directory_path();
        let location = match action {
            Action::Show => base,
            _ => dashboard_path(&base),
        };
        let missing = resolved.missing.join("/");

        tracing::warn!("Path not found: {} missing below {}", missing, location);
        Dispatch::redirect(location)
            .with_flash(Flash::next(FlashLevel::Warning, format!("Could not find {missing}")))
    }

    fn unauthorized(&self, resolved: &ResolvedPath, subject: Subject, action: Action) -> Dispatch {
        let location = resolved.directory_path();
        tracing::warn!("Denied {} for {:?}, redirecting to {}", action, subject, location);
        Dispatch::redirect(location).with_flash(Flash::next(FlashLevel::Warning, "Unauthorized action"))
    }
}
