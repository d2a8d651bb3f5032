use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    Extension,
};
use axum_htmx::{HxRequest, HX_REDIRECT, HX_TRIGGER};
use common::{
    error::AppError,
    utils::template_engine::{ProvidesTemplateEngine, TemplateEngine, Value},
};
use minijinja::{context, value::ValueKind};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::html_state::HtmlState;

const APP_NAME: &str = "法律RAG助手";

/// htmx headers a handler may set that must survive re-rendering.
const FORWARDED_HEADERS: [&str; 3] = ["HX-Push", "HX-Trigger", "HX-Redirect"];

/// Values every page needs, e.g. the sidebar's model label.
pub trait ProvidesPageContext {
    fn page_context(&self) -> PageContext;
}

#[derive(Clone, Debug, Serialize)]
pub struct PageContext {
    pub app_name: String,
    pub law_title: String,
    pub model_label: String,
    pub default_temperature: f32,
}

impl ProvidesPageContext for HtmlState {
    fn page_context(&self) -> PageContext {
        PageContext {
            app_name: APP_NAME.to_string(),
            law_title: self.config.law_title.clone(),
            model_label: self.qa_chain.model_label(),
            default_temperature: self.qa_chain.default_temperature(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum TemplateKind {
    Full(String),
    /// Template name and the block to render from it.
    Partial(String, String),
    Error(StatusCode),
    Redirect(String),
}

/// What a handler wants rendered. The actual rendering happens in
/// [`with_template_response`], which has the engine and the page context.
#[derive(Clone)]
pub struct TemplateResponse {
    template_kind: TemplateKind,
    context: Value,
}

impl TemplateResponse {
    pub fn new_template<T: Serialize>(name: impl Into<String>, context: T) -> Self {
        Self {
            template_kind: TemplateKind::Full(name.into()),
            context: Value::from_serialize(&context),
        }
    }

    pub fn new_partial<T: Serialize>(
        template: impl Into<String>,
        block: impl Into<String>,
        context: T,
    ) -> Self {
        Self {
            template_kind: TemplateKind::Partial(template.into(), block.into()),
            context: Value::from_serialize(&context),
        }
    }

    pub fn error(status: StatusCode, title: &str, description: &str) -> Self {
        Self {
            template_kind: TemplateKind::Error(status),
            context: context! {
                status_code => status.as_u16(),
                title => title,
                description => description
            },
        }
    }

    pub fn server_error() -> Self {
        Self::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "服务器错误",
            "处理请求时出现问题，请稍后再试。",
        )
    }

    pub fn service_unavailable(description: &str) -> Self {
        Self::error(StatusCode::SERVICE_UNAVAILABLE, "服务暂不可用", description)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::error(StatusCode::BAD_REQUEST, "请求无效", message)
    }

    pub fn redirect(path: impl Into<String>) -> Self {
        Self {
            template_kind: TemplateKind::Redirect(path.into()),
            context: Value::from_serialize(()),
        }
    }

    fn context_str(&self, key: &str) -> Option<String> {
        self.context
            .get_attr(key)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
    }
}

impl IntoResponse for TemplateResponse {
    fn into_response(self) -> Response {
        Extension(self).into_response()
    }
}

#[derive(Serialize)]
struct ContextWrapper<'a> {
    page: &'a PageContext,
    #[serde(flatten)]
    context: HashMap<String, Value>,
}

/// Flattens a handler's context so its keys sit next to `page`.
fn context_to_map(value: &Value) -> Result<HashMap<String, Value>, ValueKind> {
    match value.kind() {
        ValueKind::Map => Ok(value
            .try_iter()
            .map(|keys| {
                keys.filter_map(|key| {
                    let item = value.get_item(&key).ok()?;
                    Some((key.to_string(), item))
                })
                .collect()
            })
            .unwrap_or_default()),
        ValueKind::None | ValueKind::Undefined => Ok(HashMap::new()),
        other => Err(other),
    }
}

fn forward_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for name in FORWARDED_HEADERS {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            if let Some(value) = from.get(&name) {
                to.insert(name, value.clone());
            }
        }
    }
}

fn render_page(
    engine: &TemplateEngine,
    kind: &TemplateKind,
    context: &Value,
    original: &HeaderMap,
) -> Response {
    let rendered = match kind {
        TemplateKind::Full(name) => engine.render(name, context),
        TemplateKind::Partial(template, block) => engine.render_block(template, block, context),
        TemplateKind::Error(_) | TemplateKind::Redirect(_) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Html(fallback_error())).into_response();
        }
    };

    match rendered {
        Ok(html) => {
            let mut response = Html(html).into_response();
            forward_headers(original, response.headers_mut());
            response
        }
        Err(err) => {
            error!(template = ?kind, error = ?err, "Failed to render template");
            (StatusCode::INTERNAL_SERVER_ERROR, Html(fallback_error())).into_response()
        }
    }
}

/// htmx swaps nothing on 204; the toast is raised through `HX-Trigger`.
fn htmx_toast(template_response: &TemplateResponse) -> Response {
    let title = template_response
        .context_str("title")
        .unwrap_or_else(|| "错误".to_string());
    let description = template_response
        .context_str("description")
        .unwrap_or_else(|| "发生未知错误。".to_string());

    let payload = json!({"toast": {"title": title, "description": description, "type": "error"}});
    (StatusCode::NO_CONTENT, [(HX_TRIGGER, payload.to_string())], "").into_response()
}

pub async fn with_template_response<S>(
    State(state): State<S>,
    HxRequest(is_htmx): HxRequest,
    req: Request,
    next: Next,
) -> Response
where
    S: ProvidesTemplateEngine + ProvidesPageContext + Clone + Send + Sync + 'static,
{
    let response = next.run(req).await;
    let Some(template_response) = response.extensions().get::<TemplateResponse>().cloned() else {
        return response;
    };

    match &template_response.template_kind {
        TemplateKind::Redirect(path) if is_htmx => {
            return (StatusCode::OK, [(HX_REDIRECT, path.as_str())], "").into_response();
        }
        TemplateKind::Redirect(path) => return Redirect::to(path).into_response(),
        TemplateKind::Error(_) if is_htmx => return htmx_toast(&template_response),
        _ => {}
    }

    let context_map = match context_to_map(&template_response.context) {
        Ok(map) => map,
        Err(kind) => {
            error!(
                ?kind,
                template = ?template_response.template_kind,
                "Template context must be a map or unit"
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, Html(fallback_error())).into_response();
        }
    };
    let page = state.page_context();
    let context = Value::from_serialize(&ContextWrapper {
        page: &page,
        context: context_map,
    });
    let engine = state.template_engine();

    match &template_response.template_kind {
        TemplateKind::Error(status) => match engine.render("errors/error.html", &context) {
            Ok(html) => (*status, Html(html)).into_response(),
            Err(err) => {
                error!(error = ?err, "Failed to render errors/error.html");
                (*status, Html(fallback_error())).into_response()
            }
        },
        kind => render_page(engine, kind, &context, response.headers()),
    }
}

#[derive(Debug)]
pub enum HtmlError {
    AppError(AppError),
    TemplateError(String),
}

impl From<AppError> for HtmlError {
    fn from(err: AppError) -> Self {
        Self::AppError(err)
    }
}

impl From<minijinja::Error> for HtmlError {
    fn from(err: minijinja::Error) -> Self {
        Self::TemplateError(err.to_string())
    }
}

impl IntoResponse for HtmlError {
    fn into_response(self) -> Response {
        let template_response = match self {
            Self::AppError(AppError::NotFound(msg)) => {
                TemplateResponse::error(StatusCode::NOT_FOUND, "未找到", &msg)
            }
            Self::AppError(AppError::Validation(msg)) => TemplateResponse::bad_request(&msg),
            Self::AppError(AppError::EmbeddingMismatch { stored, current }) => {
                error!(%stored, %current, "Index built with another embedding model");
                TemplateResponse::service_unavailable(
                    "法律条文索引由其他嵌入模型生成，请运行 `legal-rag process` 重建索引。",
                )
            }
            Self::AppError(err) => {
                error!(error = ?err, "Request failed");
                TemplateResponse::server_error()
            }
            Self::TemplateError(err) => {
                error!(error = %err, "Template error");
                TemplateResponse::server_error()
            }
        };
        template_response.into_response()
    }
}

fn fallback_error() -> String {
    r#"
    <html>
        <body>
            <h1>出错了</h1>
            <p>页面暂时无法显示，请稍后再试。</p>
        </body>
    </html>
    "#
    .to_string()
}
