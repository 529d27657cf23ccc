use httpmock::prelude::*;
use papergrade::config::GraderConfig;
use papergrade::error::GradeError;
use papergrade::grader_client::GraderClient;
use serde_json::json;

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
const ENDPOINT: &str = "/v1beta/models/test-model:generateContent";

fn grader_config(server: &MockServer) -> GraderConfig {
    GraderConfig {
        api_key: "test-key".to_string(),
        api_base: server.base_url(),
        model: "test-model".to_string(),
        max_attempts: 3,
        base_delay_ms: 1,
        timeout_secs: 5,
    }
}

fn model_reply(scores: &[f64]) -> serde_json::Value {
    let details: Vec<_> = scores
        .iter()
        .enumerate()
        .map(|(i, s)| json!({"question": i + 1, "score": s, "feedback": format!("feedback {}", i + 1)}))
        .collect();
    let text = json!({"details": details, "final_comment": "Study drainage design."}).to_string();
    json!({"candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]})
}

#[tokio::test]
async fn grades_image_with_answer_key() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(ENDPOINT)
                .header("x-goog-api-key", "test-key")
                .body_contains("1) CBR = 8%")
                .body_contains("image/jpeg");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(model_reply(&[5.0, 4.0, 3.5, 2.0]));
        })
        .await;

    let client = GraderClient::new(&grader_config(&server), None).unwrap();
    let result = client.grade(JPEG, "image/jpeg", "1) CBR = 8%", 4).await.unwrap();

    mock.assert_async().await;
    assert_eq!(result.details.len(), 4);
    assert_eq!(result.details[2].score, 3.5);
    assert_eq!(result.final_comment, "Study drainage design.");
    assert_eq!(result.normalized(4), 14.5);
}

#[tokio::test]
async fn retries_rate_limit_up_to_max_attempts() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(ENDPOINT);
            then.status(429)
                .json_body(json!({"error": {"code": 429, "status": "RESOURCE_EXHAUSTED"}}));
        })
        .await;

    let client = GraderClient::new(&grader_config(&server), None).unwrap();
    let err = client.grade(JPEG, "image/jpeg", "key", 4).await.unwrap_err();

    assert!(matches!(err, GradeError::RateLimited(_)));
    mock.assert_hits_async(3).await;
}

#[tokio::test]
async fn resource_exhausted_body_counts_as_rate_limit() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(ENDPOINT);
            then.status(503)
                .json_body(json!({"error": {"code": 503, "status": "RESOURCE_EXHAUSTED"}}));
        })
        .await;

    let client = GraderClient::new(&grader_config(&server), None).unwrap();
    let err = client.grade(JPEG, "image/jpeg", "key", 4).await.unwrap_err();

    assert!(err.is_rate_limited());
    mock.assert_hits_async(3).await;
}

#[tokio::test]
async fn other_failures_are_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(ENDPOINT);
            then.status(400)
                .json_body(json!({"error": {"code": 400, "status": "INVALID_ARGUMENT"}}));
        })
        .await;

    let client = GraderClient::new(&grader_config(&server), None).unwrap();
    let err = client.grade(JPEG, "image/jpeg", "key", 4).await.unwrap_err();

    assert!(matches!(err, GradeError::Grader(_)));
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn unparseable_model_output_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(ENDPOINT);
            then.status(200).json_body(json!({
                "candidates": [{"content": {"parts": [{"text": "I could not read the image."}]}}]
            }));
        })
        .await;

    let client = GraderClient::new(&grader_config(&server), None).unwrap();
    let err = client.grade(JPEG, "image/jpeg", "key", 4).await.unwrap_err();
    assert!(matches!(err, GradeError::Grader(_)));
}

#[tokio::test]
async fn custom_prompt_template_is_sent() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(ENDPOINT)
                .body_contains("Grade 5 answers using: KEY-TEXT");
            then.status(200).json_body(model_reply(&[1.0, 1.0, 1.0, 1.0, 1.0]));
        })
        .await;

    let template = "Grade {num_questions} answers using: {answer_key}".to_string();
    let client = GraderClient::new(&grader_config(&server), Some(template)).unwrap();
    let result = client.grade(JPEG, "image/jpeg", "KEY-TEXT", 5).await.unwrap();

    mock.assert_async().await;
    assert_eq!(result.normalized(5), 4.0);
}
