use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use rest_store::TransportResponse;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{
    dto::{HealthResponse, ListParams},
    error::{ApiError, ApiResult},
    ndjson,
    state::AppState,
};

/// Relays a backend response without reinterpreting it.
fn relay(response: TransportResponse) -> Response {
    (
        response.status,
        [(header::CONTENT_TYPE, "application/json")],
        response.body,
    )
        .into_response()
}

fn require_body(body: Bytes) -> ApiResult<Bytes> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("request body is empty".to_string()));
    }
    Ok(body)
}

/// POST /namespaces/:namespace/:kind/:name
#[instrument(skip(state, body))]
pub async fn create_object(
    State(state): State<Arc<AppState>>,
    Path((namespace, kind, name)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult<Response> {
    info!("Creating {} {}/{}", kind, namespace, name);

    let response = state
        .transport
        .create(&kind, &namespace, &name, require_body(body)?)
        .await?;
    Ok(relay(response))
}

/// GET /namespaces/:namespace/:kind/:name
#[instrument(skip(state))]
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path((namespace, kind, name)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    debug!("Getting {} {}/{}", kind, namespace, name);

    let response = state.transport.get(&kind, &namespace, &name).await?;
    Ok(relay(response))
}

/// PUT /namespaces/:namespace/:kind/:name
/// The body carries the resourceVersion the write is based on
#[instrument(skip(state, body))]
pub async fn update_object(
    State(state): State<Arc<AppState>>,
    Path((namespace, kind, name)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult<Response> {
    info!("Updating {} {}/{}", kind, namespace, name);

    let response = state
        .transport
        .update(&kind, &namespace, &name, require_body(body)?)
        .await?;
    Ok(relay(response))
}

/// DELETE /namespaces/:namespace/:kind/:name
#[instrument(skip(state))]
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    Path((namespace, kind, name)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    info!("Deleting {} {}/{}", kind, namespace, name);

    let response = state.transport.delete(&kind, &namespace, &name).await?;
    Ok(relay(response))
}

/// GET /namespaces/:namespace/:kind
#[instrument(skip(state))]
pub async fn list_objects(
    State(state): State<Arc<AppState>>,
    Path((namespace, kind)): Path<(String, String)>,
    Query(params): Query<ListParams>,
) -> ApiResult<Response> {
    debug!("Listing {} in {}", kind, namespace);

    let options = params.into_options();
    let response = state.transport.list(&kind, &namespace, &options).await?;
    Ok(relay(response))
}

/// GET /watch/namespaces/:namespace/:kind
#[instrument(skip(state))]
pub async fn watch_collection(
    State(state): State<Arc<AppState>>,
    Path((namespace, kind)): Path<(String, String)>,
    Query(params): Query<ListParams>,
) -> ApiResult<Response> {
    watch(state, namespace, kind, None, params).await
}

/// GET /watch/namespaces/:namespace/:kind/:name
#[instrument(skip(state))]
pub async fn watch_object(
    State(state): State<Arc<AppState>>,
    Path((namespace, kind, name)): Path<(String, String, String)>,
    Query(params): Query<ListParams>,
) -> ApiResult<Response> {
    watch(state, namespace, kind, Some(name), params).await
}

async fn watch(
    state: Arc<AppState>,
    namespace: String,
    kind: String,
    name: Option<String>,
    params: ListParams,
) -> ApiResult<Response> {
    info!("Opening watch on {} in {} (name: {:?})", kind, namespace, name);

    let options = params.into_options();
    let events = state
        .transport
        .watch(&kind, &namespace, name.as_deref(), &options)
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(ndjson::lines(events)),
    )
        .into_response())
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "rest-store-backend".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
