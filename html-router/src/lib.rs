pub mod html_state;
pub mod middlewares;
pub mod router_factory;
pub mod routes;

use axum::{extract::FromRef, Router};
use axum_session::{Session, SessionNullPool, SessionStore};
use html_state::HtmlState;
use router_factory::compose_pages;

/// Chat history lives only in memory; nothing about a visitor is persisted.
pub type SessionType = Session<SessionNullPool>;
pub type SessionStoreType = SessionStore<SessionNullPool>;

/// Html routes
pub fn html_routes<S>(app_state: &HtmlState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    HtmlState: FromRef<S>,
{
    compose_pages(
        app_state,
        [routes::chat::router(), routes::instructions::router()],
    )
}

#[cfg(test)]
mod tests;
