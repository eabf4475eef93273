//! Inference client against a local stand-in service.

use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use le_client::{ClientError, InferenceClient};
use le_core::{AttentionScorer, AttentionState, LectureId};

async fn infer(headers: HeaderMap, body: Bytes) -> (StatusCode, String) {
    let is_multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&body);
    if !is_multipart || !body.contains("name=\"frame\"") {
        return (StatusCode::BAD_REQUEST, "missing frame".to_string());
    }
    if body.contains("uncalibrated-lecture") {
        return (
            StatusCode::OK,
            r#"{"calibrated":false,"attention":null,"state":null}"#.to_string(),
        );
    }
    (
        StatusCode::OK,
        r#"{"calibrated":true,"attention":72.5,"state":"ATTENTIVE"}"#.to_string(),
    )
}

async fn spawn_service() -> String {
    let app = Router::new().route("/infer", post(infer));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}/infer")
}

#[tokio::test]
async fn calibrated_response_is_parsed() {
    let url = spawn_service().await;
    let client = InferenceClient::new(&url, Duration::from_secs(5)).expect("client");
    let lecture = LectureId::new("lec-1").expect("valid id");

    let response = client
        .score(vec![0xd8; 2048], &lecture)
        .await
        .expect("inference");
    assert!(response.calibrated);
    assert_eq!(response.attention, Some(72.5));
    assert_eq!(response.state, Some(AttentionState::Attentive));
}

#[tokio::test]
async fn uncalibrated_response_has_no_score() {
    let url = spawn_service().await;
    let client = InferenceClient::new(&url, Duration::from_secs(5)).expect("client");
    let lecture = LectureId::new("uncalibrated-lecture").expect("valid id");

    let response = client.infer(vec![1; 2048], &lecture).await.expect("inference");
    assert!(!response.calibrated);
    assert_eq!(response.attention, None);
    assert_eq!(response.state, None);
}

#[tokio::test]
async fn unreachable_service_is_a_request_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let client = InferenceClient::new(&format!("http://{addr}/infer"), Duration::from_secs(2))
        .expect("client");
    let lecture = LectureId::new("lec-1").expect("valid id");
    let err = client.infer(vec![1; 2048], &lecture).await.unwrap_err();
    assert!(matches!(err, ClientError::Request(_)));
}
