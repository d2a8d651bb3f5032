use axum::{extract::FromRef, middleware::from_fn_with_state, Router};
use axum_session::SessionLayer;
use tower_http::compression::CompressionLayer;

use crate::{html_state::HtmlState, middlewares::response_middleware::with_template_response};

pub const ASSETS_ROUTE: &str = "/assets";

/// Debug builds read `assets/` from disk so CSS edits show up on reload;
/// release builds serve the copy embedded at compile time.
macro_rules! asset_service {
    () => {{
        #[cfg(debug_assertions)]
        {
            let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("assets");
            tracing::debug!(path = %dir.display(), "Serving assets from disk");
            tower_http::services::ServeDir::new(dir)
        }
        #[cfg(not(debug_assertions))]
        {
            static ASSETS: include_dir::Dir<'static> =
                include_dir::include_dir!("$CARGO_MANIFEST_DIR/assets");
            tracing::debug!("Serving embedded assets");
            tower_serve_static::ServeDir::new(&ASSETS)
        }
    }};
}

/// Wraps the page routers in the template and session layers. Assets sit
/// outside those layers; compression covers everything.
pub fn compose_pages<S>(state: &HtmlState, pages: impl IntoIterator<Item = Router<S>>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    HtmlState: FromRef<S>,
{
    let pages = pages
        .into_iter()
        .fold(Router::new(), |merged, router| merged.merge(router))
        .layer(from_fn_with_state(
            state.clone(),
            with_template_response::<HtmlState>,
        ))
        .layer(SessionLayer::new((*state.session_store).clone()));

    Router::new()
        .nest_service(ASSETS_ROUTE, asset_service!())
        .merge(pages)
        .layer(CompressionLayer::new())
}
