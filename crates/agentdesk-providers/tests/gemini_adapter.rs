use std::time::Duration;

use agentdesk_providers::{
    GeneratedPayload, GeminiAdapter, GenerationJob, GenerationProvider, ImageJob, ProviderConfig,
    ProviderError, ProviderKind, TextJob,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ProviderConfig {
    let mut config = ProviderConfig::default()
        .with_api_key(ProviderKind::Gemini, "g-key")
        .with_base_url(ProviderKind::Gemini, server.uri())
        .with_timeout(Duration::from_secs(5));
    config.gemini.input_cost_per_1k = 0.5;
    config.gemini.output_cost_per_1k = 1.0;
    config.gemini.cost_per_image = 0.02;
    config
}

#[tokio::test]
async fn text_call_uses_query_key_and_parses_candidates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-3-pro-preview:generateContent"))
        .and(query_param("key", "g-key"))
        .and(body_json(json!({
            "contents": [{"parts": [{"text": "hello"}]}],
            "systemInstruction": {"parts": [{"text": "be brief"}]},
            "generationConfig": {"maxOutputTokens": 256, "temperature": 0.7}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "first"}, {"text": "second"}]}}],
            "usageMetadata": {"promptTokenCount": 2000, "candidatesTokenCount": 1000}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::new(&config_for(&server)).unwrap();
    let job = GenerationJob::Text(TextJob {
        prompt: "hello".into(),
        system_prompt: Some("be brief".into()),
        model_override: None,
        temperature: Some(0.7),
        max_output_tokens: Some(256),
    });
    let result = adapter.generate(&job).await.unwrap();

    assert_eq!(result.provider, ProviderKind::Gemini);
    assert_eq!(result.model_name, "gemini-3-pro-preview");
    assert_eq!(result.payload.text(), Some("first\nsecond"));
    assert_eq!(result.token_input_count, Some(2000));
    assert_eq!(result.token_output_count, Some(1000));
    assert_eq!(result.cost_usd, 2.0);
}

#[tokio::test]
async fn text_call_without_knobs_omits_generation_config() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-3-pro-preview:generateContent"))
        .and(body_json(json!({"contents": [{"parts": [{"text": "hello"}]}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::new(&config_for(&server)).unwrap();
    let job = GenerationJob::Text(TextJob {
        prompt: "hello".into(),
        ..TextJob::default()
    });
    let result = adapter.generate(&job).await.unwrap();

    assert_eq!(result.payload.text(), Some(""));
    assert_eq!(result.cost_usd, 0.0);
}

#[tokio::test]
async fn missing_key_is_configuration_failure() {
    let config = ProviderConfig::default().with_base_url(ProviderKind::Gemini, "http://127.0.0.1:1");
    let adapter = GeminiAdapter::new(&config).unwrap();
    let job = GenerationJob::Text(TextJob {
        prompt: "hello".into(),
        ..TextJob::default()
    });
    let err = adapter.generate(&job).await.unwrap_err();

    assert_eq!(err.to_string(), "GEMINI_API_KEY is not configured");
    assert!(!err.is_upstream());
}

#[tokio::test]
async fn bad_gateway_is_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::new(&config_for(&server)).unwrap();
    let job = GenerationJob::Text(TextJob {
        prompt: "hello".into(),
        ..TextJob::default()
    });
    let err = adapter.generate(&job).await.unwrap_err();

    assert!(err.is_upstream());
    assert_eq!(err.to_string(), "Gemini text call failed: 502 bad gateway");
}

#[tokio::test]
async fn image_call_reads_inline_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-3-pro-image-preview:generateContent"))
        .and(query_param("key", "g-key"))
        .and(body_json(json!({
            "contents": [{"parts": [{"text": "a red fox"}]}],
            "generationConfig": {"responseModalities": ["IMAGE", "TEXT"]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [
                {"text": "here you go"},
                {"inlineData": {"mimeType": "image/jpeg", "data": "Zm94"}}
            ]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::new(&config_for(&server)).unwrap();
    let job = GenerationJob::Image(ImageJob {
        prompt: "a red fox".into(),
        ..ImageJob::default()
    });
    let result = adapter.generate(&job).await.unwrap();

    assert_eq!(result.cost_usd, 0.02);
    assert_eq!(
        result.payload,
        GeneratedPayload::Image {
            mime_type: Some("image/jpeg".into()),
            image_base64: Some("Zm94".into()),
            image_url: None,
        }
    );
}

#[tokio::test]
async fn image_without_inline_data_is_caller_side_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "I can only describe it"}]}}]
        })))
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::new(&config_for(&server)).unwrap();
    let job = GenerationJob::Image(ImageJob {
        prompt: "a red fox".into(),
        ..ImageJob::default()
    });
    let err = adapter.generate(&job).await.unwrap_err();

    assert_eq!(
        err,
        ProviderError::MissingField("Gemini image response did not include inlineData with image data".into())
    );
    assert!(!err.is_upstream());
}

#[tokio::test]
async fn image_with_empty_inline_data_is_missing_field() {
    for part in [
        json!({"inlineData": {}}),
        json!({"inlineData": {"mimeType": "image/png"}}),
        json!({"inlineData": {"mimeType": "image/png", "data": ""}}),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [part]}}]
            })))
            .mount(&server)
            .await;

        let adapter = GeminiAdapter::new(&config_for(&server)).unwrap();
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
async fn image_skips_empty_inline_part_for_later_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/png"}},
                {"inlineData": {"mimeType": "image/jpeg", "data": "Zm94"}}
            ]}}]
        })))
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::new(&config_for(&server)).unwrap();
    let job = GenerationJob::Image(ImageJob {
        prompt: "a red fox".into(),
        ..ImageJob::default()
    });
    let result = adapter.generate(&job).await.unwrap();

    assert_eq!(
        result.payload,
        GeneratedPayload::Image {
            mime_type: Some("image/jpeg".into()),
            image_base64: Some("Zm94".into()),
            image_url: None,
        }
    );
}
