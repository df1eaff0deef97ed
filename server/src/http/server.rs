use anyhow::Result;
use axum::{Router, routing::get};
use rest_store::Transport;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use super::{handlers, state::AppState};

/// Routes exposing `transport` over the namespace/kind/name scheme.
pub fn router(transport: Arc<dyn Transport>) -> Router {
    let app_state = Arc::new(AppState { transport });

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Object operations
        .route(
            "/namespaces/:namespace/:kind/:name",
            get(handlers::get_object)
                .post(handlers::create_object)
                .put(handlers::update_object)
                .delete(handlers::delete_object),
        )
        .route("/namespaces/:namespace/:kind", get(handlers::list_objects))
        // Watch streams
        .route(
            "/watch/namespaces/:namespace/:kind",
            get(handlers::watch_collection),
        )
        .route(
            "/watch/namespaces/:namespace/:kind/:name",
            get(handlers::watch_object),
        )
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn start_server(transport: Arc<dyn Transport>, bind_address: SocketAddr) -> Result<()> {
    let app = router(transport);

    info!("Server listening on {}", bind_address);

    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
