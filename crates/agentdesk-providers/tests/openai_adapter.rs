use std::time::Duration;

use agentdesk_providers::{
    GeneratedPayload, GenerationJob, GenerationProvider, ImageJob, OpenAiAdapter, ProviderConfig,
    ProviderError, ProviderKind, TextJob,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ProviderConfig {
    let mut config = ProviderConfig::default()
        .with_api_key(ProviderKind::OpenAi, "sk-test")
        .with_base_url(ProviderKind::OpenAi, server.uri())
        .with_timeout(Duration::from_secs(5));
    config.openai.input_cost_per_1k = 1.0;
    config.openai.output_cost_per_1k = 2.0;
    config.openai.cost_per_image = 0.04;
    config
}

fn text_job(prompt: &str) -> GenerationJob {
    GenerationJob::Text(TextJob {
        prompt: prompt.to_string(),
        system_prompt: Some("be brief".to_string()),
        model_override: None,
        temperature: Some(0.2),
        max_output_tokens: Some(128),
    })
}

#[tokio::test]
async fn text_call_sends_responses_payload_and_parses_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_json(json!({
            "model": "gpt-5.2",
            "input": [
                {"role": "system", "content": [{"type": "input_text", "text": "be brief"}]},
                {"role": "user", "content": [{"type": "input_text", "text": "hello"}]}
            ],
            "temperature": 0.2,
            "max_output_tokens": 128
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output_text": "hi there",
            "usage": {"input_tokens": 1000, "output_tokens": 500}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&config_for(&server)).unwrap();
    let result = adapter.generate(&text_job("hello")).await.unwrap();

    assert_eq!(result.provider, ProviderKind::OpenAi);
    assert_eq!(result.model_name, "gpt-5.2");
    assert_eq!(result.payload.text(), Some("hi there"));
    assert_eq!(result.token_input_count, Some(1000));
    assert_eq!(result.token_output_count, Some(500));
    assert_eq!(result.cost_usd, 2.0);
}

#[tokio::test]
async fn text_call_falls_back_to_nested_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": [{"content": [{"type": "output_text", "text": "a"}, {"type": "output_text", "text": "b"}]}]
        })))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&config_for(&server)).unwrap();
    let result = adapter.generate(&text_job("hello")).await.unwrap();

    assert_eq!(result.payload.text(), Some("a\nb"));
    assert_eq!(result.token_input_count, None);
    assert_eq!(result.cost_usd, 0.0);
}

#[tokio::test]
async fn model_override_is_sent_and_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output_text": "ok"})))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&config_for(&server)).unwrap();
    let job = GenerationJob::Text(TextJob {
        prompt: "hello".into(),
        model_override: Some("gpt-mini".into()),
        ..TextJob::default()
    });
    let result = adapter.generate(&job).await.unwrap();
    assert_eq!(result.model_name, "gpt-mini");

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["model"], "gpt-mini");
    assert!(body.get("temperature").is_none());
}

#[tokio::test]
async fn missing_key_fails_without_calling_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = ProviderConfig::default().with_base_url(ProviderKind::OpenAi, server.uri());
    let adapter = OpenAiAdapter::new(&config).unwrap();
    let err = adapter.generate(&text_job("hello")).await.unwrap_err();

    assert_eq!(
        err,
        ProviderError::NotConfigured {
            var: "OPENAI_API_KEY"
        }
    );
    assert!(!err.is_upstream());
}

#[tokio::test]
async fn server_errors_are_upstream() {
    for status in [500u16, 503, 429, 408] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(ResponseTemplate::new(status).set_body_string("upstream trouble"))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new(&config_for(&server)).unwrap();
        let err = adapter.generate(&text_job("hello")).await.unwrap_err();

        assert!(err.is_upstream(), "status {status} should be upstream");
        assert_eq!(
            err.to_string(),
            format!("OpenAI text call failed: {status} upstream trouble")
        );
    }
}

#[tokio::test]
async fn client_errors_are_not_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(400).set_body_string("x".repeat(1000)))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&config_for(&server)).unwrap();
    let err = adapter.generate(&text_job("hello")).await.unwrap_err();

    assert!(!err.is_upstream());
    match err {
        ProviderError::Http { status, body, .. } => {
            assert_eq!(status, 400);
            assert_eq!(body.len(), 300);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn timeout_is_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"output_text": "late"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = config_for(&server).with_timeout(Duration::from_millis(50));
    let adapter = OpenAiAdapter::new(&config).unwrap();
    let err = adapter.generate(&text_job("hello")).await.unwrap_err();

    assert_eq!(
        err,
        ProviderError::Timeout {
            provider: ProviderKind::OpenAi
        }
    );
    assert!(err.is_upstream());
}

#[tokio::test]
async fn unreachable_host_is_connectivity_error() {
    let config = ProviderConfig::default()
        .with_api_key(ProviderKind::OpenAi, "sk-test")
        .with_base_url(ProviderKind::OpenAi, "http://127.0.0.1:1")
        .with_timeout(Duration::from_secs(2));
    let adapter = OpenAiAdapter::new(&config).unwrap();
    let err = adapter.generate(&text_job("hello")).await.unwrap_err();

    assert!(matches!(err, ProviderError::Connectivity { .. }), "{err:?}");
    assert!(err.is_upstream());
}

#[tokio::test]
async fn malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&config_for(&server)).unwrap();
    let err = adapter.generate(&text_job("hello")).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
    assert!(!err.is_upstream());
}

#[tokio::test]
async fn image_call_returns_base64_payload_and_flat_cost() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_json(json!({
            "model": "gpt-image-1",
            "prompt": "a red fox",
            "size": "1024x1024"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"b64_json": "aGVsbG8="}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&config_for(&server)).unwrap();
    let job = GenerationJob::Image(ImageJob {
        prompt: "a red fox".into(),
        size: Some("1024x1024".into()),
        model_override: None,
    });
    let result = adapter.generate(&job).await.unwrap();

    assert_eq!(result.cost_usd, 0.04);
    assert_eq!(
        result.payload,
        GeneratedPayload::Image {
            mime_type: Some("image/png".into()),
            image_base64: Some("aGVsbG8=".into()),
            image_url: None,
        }
    );
}

#[tokio::test]
async fn image_without_data_is_missing_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&config_for(&server)).unwrap();
    let job = GenerationJob::Image(ImageJob {
        prompt: "a red fox".into(),
        ..ImageJob::default()
    });
    let err = adapter.generate(&job).await.unwrap_err();

    assert!(matches!(err, ProviderError::MissingField(_)));
    assert!(!err.is_upstream());
}

#[tokio::test]
async fn image_with_empty_payload_fields_is_missing_field() {
    for datum in [json!({"b64_json": ""}), json!({"b64_json": "", "url": "  "}), json!({})] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [datum]})))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new(&config_for(&server)).unwrap();
        let job = GenerationJob::Image(ImageJob {
            prompt: "a red fox".into(),
            ..ImageJob::default()
        });
        let err = adapter.generate(&job).await.unwrap_err();

        assert!(matches!(err, ProviderError::MissingField(_)), "{err:?}");
        assert!(!err.is_upstream());
    }
}

#[tokio::test]
async fn image_url_is_used_when_base64_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"b64_json": "", "url": "https://cdn.example/fox.png"}]
        })))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(&config_for(&server)).unwrap();
    let job = GenerationJob::Image(ImageJob {
        prompt: "a red fox".into(),
        ..ImageJob::default()
    });
    let result = adapter.generate(&job).await.unwrap();

    assert_eq!(
        result.payload,
        GeneratedPayload::Image {
            mime_type: Some("image/png".into()),
            image_base64: None,
            image_url: Some("https://cdn.example/fox.png".into()),
        }
    );
}
