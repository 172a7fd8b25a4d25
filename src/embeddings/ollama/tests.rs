use super::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(dimension: usize) -> EmbeddingConfig {
    EmbeddingConfig {
        dimension,
        ..EmbeddingConfig::default()
    }
}

fn embedder_for(server: &MockServer, dimension: usize) -> OllamaEmbedder {
    let url = Url::parse(&server.uri()).expect("valid mock URL");
    OllamaEmbedder::new(&test_config(dimension))
        .expect("embedder")
        .with_base_url(url)
}

#[test]
fn embedder_configuration() {
    let config = EmbeddingConfig {
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        dimension: 512,
        ..EmbeddingConfig::default()
    };
    let embedder = OllamaEmbedder::new(&config).expect("embedder");

    assert_eq!(embedder.model, "test-model");
    assert_eq!(embedder.batch_size, 128);
    assert_eq!(embedder.dimension(), 512);
    assert_eq!(embedder.base_url.host_str(), Some("test-host"));
    assert_eq!(embedder.base_url.port(), Some(1234));
}

#[tokio::test(flavor = "multi_thread")]
async fn single_embedding_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embedding": [0.1, 0.2, 0.3, 0.4] })),
        )
        .mount(&server)
        .await;

    let embedder = embedder_for(&server, 4);
    let vector = tokio::task::spawn_blocking(move || embedder.embed("hello"))
        .await
        .expect("join")
        .expect("embedding");
    assert_eq!(vector, vec![0.1, 0.2, 0.3, 0.4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_embedding_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0], [0.0, 1.0]]
        })))
        .mount(&server)
        .await;

    let embedder = embedder_for(&server, 2);
    let texts = vec!["a".to_string(), "b".to_string()];
    let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .expect("join")
        .expect("embeddings");
    assert_eq!(vectors.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limit_classifies_as_quota_exceeded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let embedder = embedder_for(&server, 4);
    let err = tokio::task::spawn_blocking(move || embedder.embed("hello"))
        .await
        .expect("join")
        .expect_err("should fail");
    assert!(matches!(err, EmbeddingError::QuotaExceeded(_)));
    assert!(err.is_retryable());
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_classifies_as_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let embedder = embedder_for(&server, 4);
    let err = tokio::task::spawn_blocking(move || embedder.embed("hello"))
        .await
        .expect("join")
        .expect_err("should fail");
    assert!(matches!(err, EmbeddingError::Unavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test(flavor = "multi_thread")]
async fn client_error_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let embedder = embedder_for(&server, 4);
    let err = tokio::task::spawn_blocking(move || embedder.embed("hello"))
        .await
        .expect("join")
        .expect_err("should fail");
    assert!(matches!(err, EmbeddingError::Backend(_)));
    assert!(!err.is_retryable());
}

#[tokio::test(flavor = "multi_thread")]
async fn dimension_mismatch_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embedding": [0.1, 0.2] })),
        )
        .mount(&server)
        .await;

    let embedder = embedder_for(&server, 768);
    let err = tokio::task::spawn_blocking(move || embedder.embed("hello"))
        .await
        .expect("join")
        .expect_err("should fail");
    assert!(matches!(err, EmbeddingError::Backend(_)));
    assert!(!err.is_retryable());
}
