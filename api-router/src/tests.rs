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
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{api_routes_v1, api_state::ApiState};

const LABOR_LAW: &str = "中华人民共和国劳动法
第四章 工作时间和休息休假
第三十六条 国家实行劳动者每日工作时间不超过八小时、平均每周工作时间不超过四十四小时的工时制度。
第五章 工资
第五十条 工资应当以货币形式按月支付给劳动者本人。不得克扣或者无故拖欠劳动者的工资。
";

async fn test_app(api_key: Option<&str>) -> (Router, TempDir) {
    let corpus = tempfile::tempdir().expect("tempdir");
    std::fs::write(corpus.path().join("labor_law.txt"), LABOR_LAW).expect("write corpus");

    let config = AppConfig {
        data_dir: corpus.path().to_string_lossy().into_owned(),
        api_key: api_key.map(str::to_string),
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
    let ingestion_pipeline = Arc::new(
        IngestionPipeline::new(Arc::clone(&db), &config, Arc::clone(&embedding_provider))
            .expect("pipeline"),
    );

    let state = ApiState::new(db, &config, embedding_provider, qa_chain, ingestion_pipeline);
    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&state))
        .with_state(state);
    (app, corpus)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, body: &Value, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("Authorization", format!("Bearer {key}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn live_is_always_ok() {
    let (app, _corpus) = test_app(None).await;
    let response = app.oneshot(get("/api/v1/live")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ready_waits_for_an_index() {
    let (app, _corpus) = test_app(None).await;

    let response = app
        .clone()
        .oneshot(get("/api/v1/ready"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["checks"]["db"], "ok");
    assert_eq!(body["checks"]["index"], "fail");

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/ingest", &json!({}), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/v1/ready")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ingest_requires_configured_key() {
    let (app, _corpus) = test_app(Some("secret")).await;

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/ingest", &json!({"force": true}), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/ingest", &json!({}), Some("wrong")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(post_json("/api/v1/ingest", &json!({"force": true}), Some("secret")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let report = json_body(response).await;
    assert_eq!(report["documents_indexed"], 1);
    assert_eq!(report["total_chunks"], 3);
    assert_eq!(report["rebuilt"], true);
}

#[tokio::test]
async fn query_answers_after_ingestion() {
    let (app, _corpus) = test_app(None).await;

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/query", &json!({"question": "工资"}), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.clone()
        .oneshot(post_json("/api/v1/ingest", &json!({}), None))
        .await
        .expect("ingest");

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/query",
            &json!({"question": "第50条 工资应当怎样支付？", "top_k": 2}),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let answer = json_body(response).await;
    assert!(answer["answer"]
        .as_str()
        .is_some_and(|text| text.contains("第五十条")));
    assert_eq!(answer["model"], "extractive");
    assert!(answer["sources"]
        .as_array()
        .is_some_and(|sources| !sources.is_empty() && sources.len() <= 2));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/query",
            &json!({"question": "工作时间", "show_sources": false}),
            None,
        ))
        .await
        .expect("response");
    let answer = json_body(response).await;
    assert_eq!(answer["sources"], json!([]));

    let response = app
        .oneshot(post_json("/api/v1/query", &json!({"question": "  "}), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
