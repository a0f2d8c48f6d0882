//! # Embeddings API Tests

use ai_factory::{create_router, AppState, Config};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> Router {
    let mut config = Config::for_test();
    config.embedding_models = "all-MiniLM-L6-v2, bge-small".to_string();
    config.embedding_dimension = 64;
    create_router(AppState::from_config(config).unwrap())
}

async fn embed(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_batch_embeddings_shape() {
    let (status, body) = embed(
        test_app(),
        "/v1/embeddings",
        json!({"model": "all-MiniLM-L6-v2", "input": ["first text", "second text", "third"]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "list");
    assert_eq!(body["model"], "all-MiniLM-L6-v2");
    assert_eq!(body["usage"], json!({"prompt_tokens": 0, "total_tokens": 0}));

    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 3);
    for (i, item) in data.iter().enumerate() {
        assert_eq!(item["object"], "embedding");
        assert_eq!(item["index"], i);
        assert_eq!(item["embedding"].as_array().unwrap().len(), 64);
    }
}

#[tokio::test]
async fn test_single_input_on_embed_alias() {
    let (status, body) = embed(test_app(), "/v1/embed", json!({"model": "bge-small", "inputs": "hello"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_model_or_input_is_not_found() {
    let cases = [
        (json!({"input": ["x"]}), "Model name must be provided"),
        (json!({"model": "", "input": ["x"]}), "Model name must be provided"),
        (json!({"model": "all-MiniLM-L6-v2"}), "Input text must be provided"),
        (json!({"model": "all-MiniLM-L6-v2", "input": []}), "Input text must be provided"),
        (json!({"model": "all-MiniLM-L6-v2", "input": ""}), "Input text must be provided"),
    ];

    for (body, detail) in cases {
        let (status, response) = embed(test_app(), "/v1/embeddings", body).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(response["detail"], detail);
    }
}

#[tokio::test]
async fn test_unknown_model_is_backend_failure() {
    let (status, body) = embed(test_app(), "/v1/embeddings", json!({"model": "text-embedding-3-large", "input": "x"})).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("text-embedding-3-large"));
}
