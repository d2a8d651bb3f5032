use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::{
    storage::db::SurrealDbClient,
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use ingestion_pipeline::IngestionPipeline;
use retrieval_pipeline::{llm::ExtractiveModel, LegalQaChain};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{html_routes, html_state::HtmlState};

const LABOR_LAW: &str = "中华人民共和国劳动法
第五章 工资
第五十条 工资应当以货币形式按月支付给劳动者本人。不得克扣或者无故拖欠劳动者的工资。
第六章 劳动安全卫生
第五十二条 用人单位必须建立、健全劳动安全卫生制度。
";

struct TestApp {
    router: Router,
    pipeline: IngestionPipeline,
    _corpus: TempDir,
}

async fn test_app() -> TestApp {
    let corpus = tempfile::tempdir().expect("tempdir");
    std::fs::write(corpus.path().join("labor_law.txt"), LABOR_LAW).expect("write corpus");
    let config = AppConfig {
        data_dir: corpus.path().to_string_lossy().into_owned(),
        ..AppConfig::default()
    };

    let database = &Uuid::new_v4().to_string();
    let db = Arc::new(
        SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb"),
    );
    let embedding_provider = Arc::new(EmbeddingProvider::new_hashed(64));
    let qa_chain = Arc::new(LegalQaChain::new(
        Arc::clone(&db),
        Arc::clone(&embedding_provider),
        Arc::new(ExtractiveModel::new(config.law_title.clone())),
        &config,
    ));
    let pipeline = IngestionPipeline::new(db, &config, embedding_provider).expect("pipeline");

    let state = HtmlState::new_with_resources(qa_chain, config, None)
        .await
        .expect("html state");
    let router = html_routes(&state).with_state(state);

    TestApp {
        router,
        pipeline,
        _corpus: corpus,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_form(uri: &str, body: &str, htmx: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded");
    if htmx {
        builder = builder.header("HX-Request", "true");
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn chat_page_renders_settings() {
    let app = test_app().await;

    let response = app.router.oneshot(get("/")).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("法律RAG助手"));
    assert!(html.contains("name=\"temperature\""));
    assert!(html.contains("extractive"));
}

#[tokio::test]
async fn instructions_list_example_questions() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/instructions"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("劳动法第60条是什么？"));
    assert!(html.contains("用人单位有什么义务？"));
}

#[tokio::test]
async fn asking_before_ingestion_raises_a_toast() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(post_form("/ask", "question=工资", true))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let trigger = response
        .headers()
        .get("HX-Trigger")
        .and_then(|value| value.to_str().ok())
        .expect("HX-Trigger header");
    assert!(trigger.contains("toast"));
}

#[tokio::test]
async fn asking_returns_the_messages_partial() {
    let app = test_app().await;
    app.pipeline.run(false).await.expect("ingest");

    let response = app
        .router
        .clone()
        .oneshot(post_form(
            "/ask",
            "question=第50条工资应当怎样支付？&temperature=0.2&show_sources=on",
            true,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("第50条工资应当怎样支付？"));
    assert!(html.contains("第五十条"));
    assert!(html.contains("来源: labor_law.txt"));
    assert!(!html.contains("<html"));
}

#[tokio::test]
async fn blank_temperature_uses_the_saved_setting() {
    let app = test_app().await;
    app.pipeline.run(false).await.expect("ingest");

    let response = app
        .router
        .oneshot(post_form("/ask", "question=工资&temperature=&show_sources=on", true))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("第五十条"));
}

#[tokio::test]
async fn plain_form_posts_redirect_back_to_chat() {
    let app = test_app().await;
    app.pipeline.run(false).await.expect("ingest");

    let response = app
        .router
        .clone()
        .oneshot(post_form("/ask", "question=工资", false))
        .await
        .expect("response");
    assert!(response.status().is_redirection());

    let response = app
        .router
        .oneshot(post_form("/clear", "", false))
        .await
        .expect("response");
    assert!(response.status().is_redirection());
}

#[tokio::test]
async fn blank_question_is_a_bad_request() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(post_form("/ask", "question=+", false))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
