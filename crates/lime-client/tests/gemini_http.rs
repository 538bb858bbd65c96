use lime_client::GeminiClient;
use lime_config::AssistantSettings;
use lime_core::{AssistantClient, LimeError, Message};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer) -> AssistantSettings {
    AssistantSettings {
        api_key: Some("test-key".to_string()),
        model: "gemini-test".to_string(),
        image_model: "imagen-test".to_string(),
        base_url: server.uri(),
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn generate_answer_posts_history_and_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gemini-test:generateContent"))
        .and(query_param("key", "test-key"))
        .and(body_json(json!({
            "contents": [
                {"role": "model", "parts": [{"text": "greeting"}]},
                {"role": "user", "parts": [{"text": "Hi"}]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello!"}]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(&settings(&server)).unwrap();
    let history = vec![Message::model("greeting").to_history_entry()];
    let answer = client.generate_answer("Hi", &history).await.unwrap();

    assert_eq!(answer, "Hello!");
}

#[tokio::test]
async fn http_error_is_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gemini-test:generateContent"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&settings(&server)).unwrap();
    let err = client.generate_answer("Hi", &[]).await.unwrap_err();

    assert!(matches!(err, LimeError::ServiceError(_)));
    assert!(err.to_string().contains("Quota exceeded"));
}

#[tokio::test]
async fn malformed_body_is_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&settings(&server)).unwrap();
    let err = client.generate_answer("Hi", &[]).await.unwrap_err();

    assert!(matches!(err, LimeError::ServiceError(_)));
}

#[tokio::test]
async fn generate_image_returns_data_uri() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/imagen-test:predict"))
        .and(query_param("key", "test-key"))
        .and(body_json(json!({
            "instances": [{"prompt": "a lime"}],
            "parameters": {"sampleCount": 1, "outputMimeType": "image/jpeg"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "predictions": [{"bytesBase64Encoded": "QUJD", "mimeType": "image/jpeg"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(&settings(&server)).unwrap();
    let image = client.generate_image("a lime").await.unwrap();

    assert_eq!(image.as_deref(), Some("data:image/jpeg;base64,QUJD"));
}

#[test]
fn missing_api_key_is_config_error() {
    let settings = AssistantSettings {
        api_key: Some("   ".to_string()),
        ..AssistantSettings::default()
    };
    // Only meaningful when the fallback variable is not set either
    if std::env::var("GEMINI_API_KEY").is_err() {
        assert!(matches!(
            GeminiClient::new(&settings),
            Err(LimeError::ConfigError(_))
        ));
    }
}
