//! HTTP clients for lecture engagement analytics.
//!
//! Provides:
//! - [`InferenceClient`]: sends camera frames to the attention inference service
//! - [`IngressClient`]: posts telemetry to the analytics ingress and reads snapshots
//! - [`IngressSink`]: fire-and-forget [`TelemetrySink`] over an [`IngressClient`]

use std::fmt;
use std::future::Future;
use std::time::Duration;

use le_core::{
    AnalyticsRecord, AttentionSample, AttentionScorer, InferenceResponse, LectureId,
    StartLecture, Telemetry, TelemetrySink, ViewEvent, WatchDelta,
};
use reqwest::Url;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default request timeout for both services.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured base URL could not be parsed.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The service answered with an error status.
    #[error("{status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

fn build_http(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ClientError::ClientBuild)
}

fn parse_url(url: &str) -> Result<Url, ClientError> {
    Url::parse(url).map_err(|err| ClientError::InvalidUrl {
        url: url.to_string(),
        reason: err.to_string(),
    })
}

/// Client for the attention inference service.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    url: Url,
}

impl InferenceClient {
    /// Creates a client that posts frames to `url`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http(timeout)?,
            url: parse_url(url)?,
        })
    }

    /// Scores one JPEG frame for `lecture_id`.
    pub async fn infer(
        &self,
        frame: Vec<u8>,
        lecture_id: &LectureId,
    ) -> Result<InferenceResponse, ClientError> {
        let frame = Part::bytes(frame)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .part("frame", frame)
            .text("lectureId", lecture_id.to_string());

        let response = self
            .http
            .post(self.url.clone())
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }
}

impl AttentionScorer for InferenceClient {
    type Error = ClientError;

    fn score(
        &self,
        frame: Vec<u8>,
        lecture_id: &LectureId,
    ) -> impl Future<Output = Result<InferenceResponse, ClientError>> + Send {
        self.infer(frame, lecture_id)
    }
}

/// Outcome of a best-effort batch delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub sent: usize,
    pub dropped: usize,
}

/// Client for the analytics ingress.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct IngressClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl fmt::Debug for IngressClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngressClient")
            .field("base", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl IngressClient {
    /// Creates a client rooted at `base_url` (e.g. `http://host/api/analytics`).
    ///
    /// `token` is sent as a bearer token on mutating requests.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let mut base = parse_url(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: build_http(timeout)?,
            base,
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|err| ClientError::InvalidUrl {
                url: format!("{}{path}", self.base),
                reason: err.to_string(),
            })
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self.http.post(self.endpoint(path)?).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        check_status(response).await
    }

    pub async fn post_attention(&self, sample: &AttentionSample) -> Result<(), ClientError> {
        self.post("attention", sample).await.map(drop)
    }

    pub async fn post_watch(&self, delta: &WatchDelta) -> Result<(), ClientError> {
        self.post("watch", delta).await.map(drop)
    }

    pub async fn post_view(&self, view: &ViewEvent) -> Result<(), ClientError> {
        self.post("view", view).await.map(drop)
    }

    /// Sends one telemetry event to its endpoint.
    pub async fn send(&self, event: &Telemetry) -> Result<(), ClientError> {
        match event {
            Telemetry::Attention(sample) => self.post_attention(sample).await,
            Telemetry::Watch(delta) => self.post_watch(delta).await,
            Telemetry::View(view) => self.post_view(view).await,
        }
    }

    /// Sends events in order, dropping the ones that fail.
    ///
    /// Failures are logged at debug level and never retried.
    pub async fn deliver(&self, events: &[Telemetry]) -> Delivery {
        let mut delivery = Delivery::default();
        for event in events {
            match self.send(event).await {
                Ok(()) => delivery.sent += 1,
                Err(err) => {
                    tracing::debug!(
                        error = %err,
                        lecture_id = %event.lecture_id(),
                        "telemetry dropped"
                    );
                    delivery.dropped += 1;
                }
            }
        }
        delivery
    }

    /// Ensures the lecture's record exists and returns its snapshot.
    pub async fn start(&self, lecture_id: &LectureId) -> Result<AnalyticsRecord, ClientError> {
        let body = StartLecture {
            lecture_id: lecture_id.clone(),
        };
        let response = self.post("start", &body).await?;
        read_json(response).await
    }

    /// Reads the current snapshot for a lecture.
    pub async fn lecture(&self, lecture_id: &LectureId) -> Result<AnalyticsRecord, ClientError> {
        let url = self.endpoint(&format!("lecture/{lecture_id}"))?;
        let response = self.http.get(url).send().await?;
        read_json(response).await
    }
}

/// Telemetry sink that posts each event on its own task.
///
/// `send` returns immediately. Failed posts are logged at debug level and
/// dropped.
#[derive(Debug, Clone)]
pub struct IngressSink {
    client: IngressClient,
    runtime: tokio::runtime::Handle,
}

impl IngressSink {
    /// Creates a sink that spawns posts onto `runtime`.
    pub const fn new(client: IngressClient, runtime: tokio::runtime::Handle) -> Self {
        Self { client, runtime }
    }
}

impl TelemetrySink for IngressSink {
    fn send(&self, event: Telemetry) {
        let client = self.client.clone();
        self.runtime.spawn(async move {
            if let Err(err) = client.send(&event).await {
                tracing::debug!(
                    error = %err,
                    lecture_id = %event.lecture_id(),
                    "telemetry dropped"
                );
            }
        });
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await?;
    Err(parse_api_error(status.as_u16(), &body))
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let response = check_status(response).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|err| ClientError::InvalidResponse(err.to_string()))
}

fn parse_api_error(status: u16, body: &str) -> ClientError {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: String,
        code: Option<String>,
    }

    match serde_json::from_str::<ErrorPayload>(body) {
        Ok(payload) => ClientError::Api {
            status,
            code: payload.code,
            message: payload.error,
        },
        Err(_) => ClientError::Api {
            status,
            code: None,
            message: body.trim().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_send_does_not_wait_for_the_network() {
        let client =
            IngressClient::new("http://127.0.0.1:9/api/analytics", None, DEFAULT_TIMEOUT)
                .unwrap();
        let sink = IngressSink::new(client, tokio::runtime::Handle::current());
        let started = std::time::Instant::now();
        for _ in 0..10 {
            sink.send(Telemetry::View(ViewEvent {
                lecture_id: LectureId::new("lec-1").unwrap(),
            }));
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn ingress_client_rejects_invalid_url() {
        assert!(matches!(
            IngressClient::new("not a url", None, DEFAULT_TIMEOUT),
            Err(ClientError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn ingress_client_normalizes_base_path() {
        let client =
            IngressClient::new("http://localhost:8080/api/analytics", None, DEFAULT_TIMEOUT)
                .unwrap();
        assert_eq!(
            client.endpoint("view").unwrap().as_str(),
            "http://localhost:8080/api/analytics/view"
        );
        let lecture = LectureId::new("lec_1").unwrap();
        assert_eq!(
            client
                .endpoint(&format!("lecture/{lecture}"))
                .unwrap()
                .as_str(),
            "http://localhost:8080/api/analytics/lecture/lec_1"
        );
    }

    #[test]
    fn ingress_client_debug_redacts_token() {
        let client = IngressClient::new(
            "http://localhost:8080/api/analytics/",
            Some("secret-token".to_string()),
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn blank_token_is_ignored() {
        let client = IngressClient::new(
            "http://localhost:8080/api/analytics/",
            Some("  ".to_string()),
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        assert!(client.token.is_none());
    }

    #[test]
    fn parse_api_error_reads_envelope() {
        let err = parse_api_error(
            400,
            r#"{"success":false,"error":"delta must not be negative","code":"VALIDATION_ERROR"}"#,
        );
        let ClientError::Api {
            status,
            code,
            message,
        } = err
        else {
            panic!("expected api error");
        };
        assert_eq!(status, 400);
        assert_eq!(code.as_deref(), Some("VALIDATION_ERROR"));
        assert_eq!(message, "delta must not be negative");
    }

    #[test]
    fn parse_api_error_falls_back_to_body() {
        let err = parse_api_error(502, "bad gateway\n");
        assert_eq!(err.to_string(), "502: bad gateway");
    }

    #[test]
    fn inference_client_rejects_invalid_url() {
        assert!(matches!(
            InferenceClient::new("::", DEFAULT_TIMEOUT),
            Err(ClientError::InvalidUrl { .. })
        ));
    }
}
