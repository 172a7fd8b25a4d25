use super::*;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn generator_for(server: &MockServer) -> OpenAiChatGenerator {
    OpenAiChatGenerator {
        base_url: Url::parse(&format!("{}/v1", server.uri())).expect("valid mock URL"),
        model: "test-model".to_string(),
        api_key: "test-key".to_string(),
        agent: ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(5)))
            .build()
            .into(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn completion_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Welcome to the show." } }
            ]
        })))
        .mount(&server)
        .await;

    let generator = generator_for(&server);
    let text = tokio::task::spawn_blocking(move || generator.generate("say hi"))
        .await
        .expect("join")
        .expect("completion");
    assert_eq!(text, "Welcome to the show.");
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_choices_is_a_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let generator = generator_for(&server);
    let err = tokio::task::spawn_blocking(move || generator.generate("say hi"))
        .await
        .expect("join")
        .expect_err("should fail");
    assert!(matches!(err, GenerationError::Backend(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limit_and_outage_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let generator = generator_for(&server);
    let err = tokio::task::spawn_blocking(move || generator.generate("say hi"))
        .await
        .expect("join")
        .expect_err("should fail");
    assert!(matches!(err, GenerationError::QuotaExceeded(_)));
}
