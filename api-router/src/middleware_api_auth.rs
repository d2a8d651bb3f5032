use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{api_state::ApiState, error::ApiError};

const API_KEY_HEADER: &str = "X-API-Key";

/// Guards the rebuild endpoint. With no `api_key` configured every caller
/// is let through, which is what a local single-user install wants.
pub async fn api_auth(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state.config.api_key.as_deref().unwrap_or_default();
    if expected.is_empty() {
        return Ok(next.run(request).await);
    }

    match presented_key(request.headers()) {
        Some(key) if key == expected => Ok(next.run(request).await),
        presented => {
            warn!(
                path = %request.uri().path(),
                key_present = presented.is_some(),
                "Rejected request without a valid API key"
            );
            Err(ApiError::Unauthorized(
                "a valid API key is required".to_string(),
            ))
        }
    }
}

/// `X-API-Key` wins over `Authorization: Bearer`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

    header(API_KEY_HEADER).or_else(|| {
        header(AUTHORIZATION.as_str())
            .and_then(|auth| auth.strip_prefix("Bearer "))
            .map(str::trim)
    })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn reads_either_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer  secret "));
        assert_eq!(presented_key(&headers), Some("secret"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("other"));
        assert_eq!(presented_key(&headers), Some("other"));
    }

    #[test]
    fn ignores_non_bearer_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(presented_key(&headers), None);
    }
}
