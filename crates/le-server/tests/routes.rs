use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use le_core::IngestLimits;
use le_server::{AllowAll, AppState, StaticTokens};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const TOKEN: &str = "test-token";

struct TestApp {
    router: Router,
    _dir: TempDir,
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::open(
        dir.path().join("analytics.db"),
        IngestLimits::default(),
        Arc::new(StaticTokens::new([TOKEN])),
    )
    .unwrap();
    TestApp {
        router: le_server::app(state),
        _dir: dir,
    }
}

impl TestApp {
    async fn post(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/analytics{path}"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn lecture(&self, id: &str) -> Value {
        let (status, body) = self.get(&format!("/api/analytics/lecture/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app();
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn unknown_lecture_reads_as_zero() {
    let app = test_app();
    let body = app.lecture("nobody-watched").await;
    assert_eq!(
        body,
        json!({
            "lectureId": "nobody-watched",
            "totalViews": 0,
            "totalWatchTimeSec": 0,
            "attentionTimeline": {}
        })
    );
}

#[tokio::test]
async fn attention_samples_fold_into_running_mean() {
    let app = test_app();
    for score in [90, 60, 30] {
        let (status, body) = app
            .post(
                "/attention",
                &json!({"lectureId": "lec-1", "second": 4, "score": score}),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
    }
    let body = app.lecture("lec-1").await;
    assert_eq!(body["attentionTimeline"]["4"]["samples"], 3);
    assert_eq!(body["attentionTimeline"]["4"]["avgScore"], 60.0);
}

#[tokio::test]
async fn out_of_range_score_is_clamped() {
    let app = test_app();
    app.post(
        "/attention",
        &json!({"lectureId": "lec-1", "second": 0, "score": 250}),
    )
    .await;
    app.post(
        "/attention",
        &json!({"lectureId": "lec-1", "second": 1, "score": -5}),
    )
    .await;
    let body = app.lecture("lec-1").await;
    assert_eq!(body["attentionTimeline"]["0"]["avgScore"], 100.0);
    assert_eq!(body["attentionTimeline"]["1"]["avgScore"], 0.0);
}

#[tokio::test]
async fn watch_and_view_update_counters() {
    let app = test_app();
    for _ in 0..3 {
        let (status, _) = app
            .post(
                "/watch",
                &json!({"lectureId": "lec-1", "delta": 1, "duration": 600}),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (status, _) = app.post("/view", &json!({"lectureId": "lec-1"})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let body = app.lecture("lec-1").await;
    assert_eq!(body["totalWatchTimeSec"], 3);
    assert_eq!(body["totalViews"], 1);
    assert_eq!(body["durationSec"], 600);
    assert!(body["createdAt"].is_string());
}

#[tokio::test]
async fn negative_delta_is_rejected_without_creating_record() {
    let app = test_app();
    let (status, body) = app
        .post("/watch", &json!({"lectureId": "lec-2", "delta": -1}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let body = app.lecture("lec-2").await;
    assert!(body.get("createdAt").is_none());
}

#[tokio::test]
async fn attention_past_duration_is_rejected() {
    let app = test_app();
    app.post(
        "/watch",
        &json!({"lectureId": "lec-1", "delta": 1, "duration": 30}),
    )
    .await;
    let (status, body) = app
        .post(
            "/attention",
            &json!({"lectureId": "lec-1", "second": 31, "score": 50}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_lecture_id_is_rejected() {
    let app = test_app();
    let (status, body) = app
        .post("/view", &json!({"lectureId": "../etc/passwd"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app.get("/api/analytics/lecture/bad%20id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/analytics/view")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn mutations_require_credentials() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/analytics/view")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"lectureId":"lec-1"}"#))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let request = Request::builder()
        .method("POST")
        .uri("/api/analytics/view")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, format!("token={TOKEN}"))
        .body(Body::from(r#"{"lectureId":"lec-1"}"#))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(app.lecture("lec-1").await["totalViews"], 1);
}

#[tokio::test]
async fn start_creates_record_and_returns_snapshot() {
    let app = test_app();
    let (status, body) = app.post("/start", &json!({"lectureId": "lec-9"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lectureId"], "lec-9");
    assert_eq!(body["totalViews"], 0);
    assert!(body["createdAt"].is_string());
}

#[tokio::test]
async fn allow_all_admits_anonymous_callers() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::open(
        dir.path().join("analytics.db"),
        IngestLimits::default(),
        Arc::new(AllowAll),
    )
    .unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/api/analytics/view")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"lectureId":"lec-1"}"#))
        .unwrap();
    let response = le_server::app(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn concurrent_views_are_all_counted() {
    let app = test_app();
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..20 {
        let router = app.router.clone();
        tasks.spawn(async move {
            let request = Request::builder()
                .method("POST")
                .uri("/api/analytics/view")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .body(Body::from(r#"{"lectureId":"busy"}"#))
                .unwrap();
            router.oneshot(request).await.unwrap().status()
        });
    }
    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), StatusCode::NO_CONTENT);
    }
    assert_eq!(app.lecture("busy").await["totalViews"], 20);
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[tokio::test]
async fn folds_are_logged_with_the_caller() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = test_app();
    let (status, _) = app.post("/view", &json!({"lectureId": "lec-1"})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let logs = logs.contents();
    let line = logs
        .lines()
        .find(|line| line.contains("folding event"))
        .unwrap_or_else(|| panic!("no fold logged in:\n{logs}"));
    assert!(line.contains("caller=api-token-1"), "{line}");
    assert!(line.contains("lecture_id=lec-1"), "{line}");

    // The caller never splits the aggregate.
    assert_eq!(app.lecture("lec-1").await["totalViews"], 1);
}
