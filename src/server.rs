//! HTTP surface: definition management, mock invocation and health.

use crate::config::{GlobalSettings, MockEngineConfig};
use crate::definition::{DefinitionInput, MockDefinition};
use crate::dispatcher::{DispatchStats, MockDispatcher, MockResponse};
use crate::error::MockError;
use crate::management::{DefinitionService, ListFilter};
use crate::matcher::MockRequest;
use crate::store::{build_store, DefinitionStore};
use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DefinitionService>,
    pub dispatcher: Arc<MockDispatcher>,
    pub settings: Arc<GlobalSettings>,
}

impl AppState {
    /// Build the state, opening the configured store.
    pub async fn from_config(config: &MockEngineConfig) -> anyhow::Result<Self> {
        let store = build_store(&config.storage).await;
        Self::with_store(config, store)
    }

    /// Build the state over an existing store.
    pub fn with_store(
        config: &MockEngineConfig,
        store: Arc<dyn DefinitionStore>,
    ) -> anyhow::Result<Self> {
        let demos = config.demo_definitions(Utc::now())?;
        let service = DefinitionService::new(store.clone(), config.default_ttl());
        let dispatcher = MockDispatcher::new(store, demos, &config.settings);

        Ok(Self {
            service: Arc::new(service),
            dispatcher: Arc::new(dispatcher),
            settings: Arc::new(config.settings.clone()),
        })
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let management = Router::new()
        .route(
            "/mock-definitions",
            get(get_definitions)
                .post(create_definition)
                .put(update_definition)
                .delete(delete_definition),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    Router::new()
        .merge(management)
        .route("/mock/:id", any(invoke_mock).options(preflight))
        .route("/health", get(health))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

// Management handlers

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionQuery {
    id: Option<String>,
    owner_id: Option<String>,
    shared: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteQuery {
    id: Option<String>,
    owner_id: Option<String>,
}

/// Hide the secret unless the caller named the owner.
fn visible_to(definition: MockDefinition, owner_id: Option<&str>) -> MockDefinition {
    if owner_id == Some(definition.owner_id.as_str()) {
        definition
    } else {
        definition.redacted()
    }
}

fn required_id(id: Option<String>) -> Result<String, MockError> {
    id.filter(|id| !id.is_empty())
        .ok_or_else(|| MockError::validation("id", "id is required"))
}

async fn get_definitions(
    State(state): State<AppState>,
    query: Result<Query<DefinitionQuery>, QueryRejection>,
) -> Result<Json<Value>, MockError> {
    let Query(query) = query.map_err(|e| MockError::validation("query", e.body_text()))?;

    if let Some(id) = query.id {
        let definition = state.service.get(&id).await?;
        let definition = visible_to(definition, query.owner_id.as_deref());
        return Ok(Json(json!({ "success": true, "definition": definition })));
    }

    let filter = ListFilter {
        owner_id: query.owner_id,
        shared: query.shared,
    };
    let definitions = state.service.list(&filter).await?;
    Ok(Json(json!({
        "success": true,
        "count": definitions.len(),
        "definitions": definitions,
    })))
}

async fn create_definition(
    State(state): State<AppState>,
    payload: Result<Json<DefinitionInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), MockError> {
    let Json(input) = payload.map_err(|e| MockError::validation("body", e.body_text()))?;

    let definition = state.service.create(input).await?;
    let invoke_url = state.settings.invoke_url(&definition.invoke_path());
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "definition": definition,
            "invokeUrl": invoke_url,
        })),
    ))
}

async fn update_definition(
    State(state): State<AppState>,
    payload: Result<Json<DefinitionInput>, JsonRejection>,
) -> Result<Json<Value>, MockError> {
    let Json(mut patch) = payload.map_err(|e| MockError::validation("body", e.body_text()))?;

    let id = required_id(patch.id.take())?;
    let owner_id = patch.owner_id.take();
    let definition = state
        .service
        .update(&id, owner_id.as_deref(), patch)
        .await?;
    Ok(Json(json!({ "success": true, "definition": definition })))
}

async fn delete_definition(
    State(state): State<AppState>,
    query: Result<Query<DeleteQuery>, QueryRejection>,
) -> Result<Json<Value>, MockError> {
    let Query(query) = query.map_err(|e| MockError::validation("query", e.body_text()))?;

    let id = required_id(query.id)?;
    state
        .service
        .delete(&id, query.owner_id.as_deref())
        .await?;
    Ok(Json(json!({ "success": true, "id": id })))
}

// Mock invocation handlers

/// Flatten headers to their first value per name.
fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flat = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            flat.entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    flat
}

fn into_http_response(mock: MockResponse) -> Response {
    let body = match mock.body {
        Some(body) => Body::from(body),
        None => Body::empty(),
    };
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::from_u16(mock.status).unwrap_or(StatusCode::OK);

    let headers = response.headers_mut();
    for (name, value) in mock.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid response header"),
        }
    }
    response
}

async fn invoke_mock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let request = MockRequest {
        method: method.as_str().to_string(),
        headers: flatten_headers(&headers),
    };
    into_http_response(state.dispatcher.dispatch(&id, &request).await)
}

async fn preflight(State(state): State<AppState>) -> Response {
    into_http_response(state.dispatcher.preflight())
}

async fn health(State(state): State<AppState>) -> Json<DispatchStats> {
    Json(state.dispatcher.stats())
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}
