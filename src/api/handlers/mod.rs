use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use super::AppState;
use crate::access::Subject;
use crate::dispatch::{Dispatch, Response as DispatchResponse};
use crate::models::Attributes;
use crate::registry::FeatureEntry;
use crate::router::{split_path, PathRouter, RouteError, RouteRequest, Verb};

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn route_error(e: RouteError) -> (StatusCode, String) {
    match e {
        RouteError::MalformedRequest(_) => {
            tracing::warn!("{}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        RouteError::UnsupportedAction { .. }
        | RouteError::UnknownScope(_)
        | RouteError::MissingRelated(_) => {
            tracing::warn!("{}", e);
            (StatusCode::NOT_FOUND, e.to_string())
        }
        RouteError::Store(e) => internal_error(e),
    }
}

// ============================================================
// Dispatch results
// ============================================================

/// Renders become JSON documents (422 when a form is shown again with
/// errors); redirects become `303 See Other`.
fn into_response(dispatch: Dispatch) -> Response {
    let flash = dispatch.flash;
    match dispatch.response {
        DispatchResponse::Render {
            view,
            invalid,
            assigns,
        } => {
            let status = if invalid {
                StatusCode::UNPROCESSABLE_ENTITY
            } else {
                StatusCode::OK
            };
            let body = json!({ "view": view, "assigns": assigns, "flash": flash });
            (status, Json(body)).into_response()
        }
        DispatchResponse::Redirect { location } => {
            let body = json!({ "location": location, "flash": flash });
            (
                StatusCode::SEE_OTHER,
                [(header::LOCATION, location)],
                Json(body),
            )
                .into_response()
        }
    }
}

fn verb(method: &Method) -> Option<Verb> {
    match method.as_str() {
        "GET" => Some(Verb::Get),
        "POST" => Some(Verb::Post),
        "PUT" => Some(Verb::Put),
        "PATCH" => Some(Verb::Patch),
        "DELETE" => Some(Verb::Delete),
        _ => None,
    }
}

fn parse_attributes(body: &Bytes) -> Result<Attributes, (StatusCode, String)> {
    if body.is_empty() {
        return Ok(Attributes::new());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(attributes)) => Ok(attributes),
        Ok(_) => Err((
            StatusCode::BAD_REQUEST,
            "Request body must be a JSON object".to_string(),
        )),
        Err(e) => Err((StatusCode::BAD_REQUEST, format!("Invalid JSON: {e}"))),
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ============================================================
// Content tree
// ============================================================

pub async fn dispatch_root(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    method: Method,
    body: Bytes,
) -> Result<Response, (StatusCode, String)> {
    dispatch(&state, subject, &method, "", &body)
}

pub async fn dispatch_path(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    method: Method,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<Response, (StatusCode, String)> {
    dispatch(&state, subject, &method, &path, &body)
}

fn dispatch(
    state: &AppState,
    subject: Subject,
    method: &Method,
    path: &str,
    body: &Bytes,
) -> Result<Response, (StatusCode, String)> {
    let verb = verb(method).ok_or_else(|| {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method {method} not supported"),
        )
    })?;
    let attributes = parse_attributes(body)?;

    let request = RouteRequest::new(verb, path, subject).with_attributes(attributes);
    let router = PathRouter::new(&state.db, &state.registry, state.access.as_ref());

    router
        .route(&request)
        .map(into_response)
        .map_err(route_error)
}

// ============================================================
// Export
// ============================================================

pub async fn export_root(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
) -> Result<Response, (StatusCode, String)> {
    export(&state, subject, "")
}

pub async fn export_path(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Path(path): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    export(&state, subject, &path)
}

fn export(state: &AppState, subject: Subject, path: &str) -> Result<Response, (StatusCode, String)> {
    let router = PathRouter::new(&state.db, &state.registry, state.access.as_ref());
    router
        .export(&split_path(path), subject)
        .map(into_response)
        .map_err(route_error)
}

// ============================================================
// Registry
// ============================================================

#[derive(Debug, Serialize)]
pub struct FeatureSummary {
    #[serde(flatten)]
    pub entry: FeatureEntry,
    /// Scope names from this one up to the directory level; `None` when
    /// the parent chain is broken or loops.
    pub chain: Option<Vec<String>>,
}

pub async fn list_features(State(state): State<AppState>) -> Json<Vec<FeatureSummary>> {
    let summaries = state
        .registry
        .features()
        .into_iter()
        .map(|entry| {
            let chain = state
                .registry
                .scope_chain(&entry.scope)
                .map(|chain| chain.iter().map(|e| e.scope.clone()).collect())
                .map_err(|e| tracing::warn!("{}", e))
                .ok();
            FeatureSummary { entry, chain }
        })
        .collect();

    Json(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use crate::registry::RegistryError;
    use uuid::Uuid;

    #[test]
    fn missing_records_are_not_found() {
        let missing: anyhow::Error = StoreError::Missing("Parent directory", Uuid::nil()).into();
        let (status, message) = route_error(RouteError::from(missing));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(message.starts_with("Parent directory not found"));
    }

    #[test]
    fn other_store_errors_are_hidden() {
        let failure = anyhow::anyhow!("disk I/O error: record not found in page");
        let (status, message) = route_error(RouteError::from(failure));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal server error");
    }

    #[test]
    fn routing_errors_map_to_client_statuses() {
        let (status, _) = route_error(RouteError::MalformedRequest("empty segment".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = route_error(RegistryError::UnknownScope("galleries".into()).into());
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
