use api_router::{api_routes_v1, api_state::ApiState};
use axum::{extract::FromRef, Router};
use common::error::AppError;
use html_router::{html_routes, html_state::HtmlState};
use tracing::info;

use crate::resources::Resources;

#[derive(Clone, FromRef)]
struct AppState {
    api_state: ApiState,
    html_state: HtmlState,
}

/// JSON API under `/api/v1`, chat pages at the root.
pub async fn build_app(resources: &Resources) -> Result<Router, AppError> {
    let html_state = HtmlState::new_with_resources(
        resources.qa_chain.clone(),
        resources.config.clone(),
        None,
    )
    .await?;

    let api_state = ApiState::new(
        resources.db.clone(),
        &resources.config,
        resources.embedding_provider.clone(),
        resources.qa_chain.clone(),
        resources.ingestion_pipeline.clone(),
    );

    Ok(Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .merge(html_routes(&html_state))
        .with_state(AppState {
            api_state,
            html_state,
        }))
}

pub async fn serve(resources: &Resources) -> Result<(), AppError> {
    let app = build_app(resources).await?;

    let serve_address = format!("0.0.0.0:{}", resources.config.http_port);
    info!("Starting server listening on {serve_address}");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
