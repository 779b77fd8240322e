use std::time::Duration;

use renderz::models::render::UpscaleFactor;
use renderz::services::generation::GenerationClient;
use renderz::services::polling::PollPolicy;
use renderz::services::upscale::UpscaleClient;
use renderz::services::vendor::VendorError;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRreference";

fn fast_policy(max_attempts: u32) -> PollPolicy {
    PollPolicy::new(Duration::from_millis(5), max_attempts)
}

fn generation_client(server: &MockServer, max_attempts: u32) -> GenerationClient {
    GenerationClient::new(&server.uri(), "gen-token", "model-v1", fast_policy(max_attempts))
        .expect("client builds")
}

#[tokio::test]
async fn generation_polls_until_output_is_ready() {
    let server = MockServer::start().await;
    let output_url = format!("{}/outputs/render.png", server.uri());

    Mock::given(method("POST"))
        .and(path("/v1/predictions"))
        .and(header("authorization", "Bearer gen-token"))
        .and(body_partial_json(json!({"version": "model-v1", "input": {"num_outputs": 1}})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "pred-1", "status": "starting"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/predictions/pred-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "pred-1", "status": "processing"})),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/predictions/pred-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pred-1",
            "status": "succeeded",
            "output": [output_url]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/outputs/render.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"rendered-bytes".to_vec()))
        .mount(&server)
        .await;

    let client = generation_client(&server, 10);
    let prediction = client
        .create_prediction(PNG, "sunlit loft")
        .await
        .expect("prediction created");
    assert_eq!(prediction.id, "pred-1");

    let url = client.await_prediction(&prediction).await.expect("prediction finished");
    assert_eq!(url, output_url);

    let bytes = client.fetch_output(&url).await.expect("output downloaded");
    assert_eq!(bytes, b"rendered-bytes");
}

#[tokio::test]
async fn generation_failure_carries_vendor_message() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/predictions/pred-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pred-2",
            "status": "failed",
            "error": "NSFW content detected"
        })))
        .mount(&server)
        .await;

    let client = generation_client(&server, 5);
    let pending: renderz::services::generation::Prediction =
        serde_json::from_value(json!({"id": "pred-2", "status": "starting"})).unwrap();

    match client.await_prediction(&pending).await {
        Err(VendorError::Rejected(message)) => assert_eq!(message, "NSFW content detected"),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn generation_gives_up_after_bounded_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/predictions/slow"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "slow", "status": "processing"})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let client = generation_client(&server, 3);
    let pending: renderz::services::generation::Prediction =
        serde_json::from_value(json!({"id": "slow", "status": "starting"})).unwrap();

    let err = client.await_prediction(&pending).await.unwrap_err();
    assert!(matches!(err, VendorError::TimedOut { attempts: 3 }));
}

#[tokio::test]
async fn generation_http_error_is_reported_with_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/predictions"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid version"))
        .mount(&server)
        .await;

    let client = generation_client(&server, 3);
    match client.create_prediction(PNG, "attic").await {
        Err(VendorError::Status { status, body }) => {
            assert_eq!(status, 422);
            assert_eq!(body, "invalid version");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn upscale_sends_factor_and_returns_generated_image() {
    let server = MockServer::start().await;
    let output_url = format!("{}/outputs/upscaled.png", server.uri());

    Mock::given(method("POST"))
        .and(path("/v1/ai/image-upscaler"))
        .and(header("x-api-key", "up-key"))
        .and(body_partial_json(json!({"scale_factor": "4x", "optimized_for": "standard"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"task_id": "task-1", "status": "CREATED", "generated": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/ai/image-upscaler/task-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"task_id": "task-1", "status": "IN_PROGRESS"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/ai/image-upscaler/task-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"task_id": "task-1", "status": "COMPLETED", "generated": [output_url]}
        })))
        .mount(&server)
        .await;

    let client = UpscaleClient::new(&server.uri(), "up-key", fast_policy(10)).unwrap();
    let task = client
        .create_task(b"render-bytes", UpscaleFactor::X4)
        .await
        .expect("task created");
    assert_eq!(task.task_id, "task-1");

    let url = client.await_task(&task).await.expect("task finished");
    assert_eq!(url, output_url);
}

#[tokio::test]
async fn upscale_failure_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/ai/image-upscaler"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"task_id": "task-2", "status": "FAILED"}
        })))
        .mount(&server)
        .await;

    let client = UpscaleClient::new(&server.uri(), "up-key", fast_policy(10)).unwrap();
    let task = client.create_task(b"render", UpscaleFactor::X2).await.unwrap();
    assert!(matches!(
        client.await_task(&task).await,
        Err(VendorError::Rejected(_))
    ));
}
