// HTTP request handlers for server mode
//
// Implements the webhook endpoint and health check endpoints

use axum::{
    extract::{rejection::BytesRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use dbt2datadog_core::{relay_event, WebhookPayload};
use metrics::{counter, histogram};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::{AppError, AppState};

const NOT_AUTHENTICATED: &str = "Message not authenticated";

/// GET /health - Basic health check
pub(crate) async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

/// GET /ready - Readiness check
pub(crate) async fn ready_check(State(_state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ready"})))
}

/// POST / - dbt Cloud job-run webhook
///
/// Responds with the payload it received once processing is over. Failures
/// talking to the Metadata API or Datadog are logged, not returned.
pub(crate) async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<axum::body::Bytes, BytesRejection>,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    counter!("webhook.requests").increment(1);

    let result = process_webhook(&state, &headers, body).await;

    histogram!("webhook.latency_ms").record(start.elapsed().as_secs_f64() * 1000.0);
    result
}

async fn process_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<axum::body::Bytes, BytesRejection>,
) -> Result<Json<Value>, AppError> {
    // The router's body limit is `request.max_payload_bytes`
    let body = body.map_err(|rejection| {
        counter!("webhook.rejected").increment(1);
        AppError::with_status(
            rejection.status(),
            anyhow::anyhow!(
                "{} (limit {} bytes)",
                rejection.body_text(),
                state.max_payload_bytes
            ),
        )
    })?;

    debug!(
        bytes = body.len(),
        body = %String::from_utf8_lossy(&body),
        "Received webhook"
    );

    let signature = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if !state.verifier.verify(&body, signature) {
        counter!("webhook.rejected").increment(1);
        return Err(AppError::forbidden(NOT_AUTHENTICATED));
    }

    let payload = WebhookPayload::parse(&body).map_err(AppError::bad_request)?;

    if payload.is_running() {
        counter!("webhook.skipped_running").increment(1);
        debug!("Run still in progress; nothing to relay");
        return Ok(Json(payload.into_json()));
    }

    let event = payload.event().map_err(AppError::bad_request)?;
    info!(
        webhook = %event.webhook_name,
        job_id = event.data.job_id,
        run_id = event.data.run_id,
        status = event.data.run_status.as_deref().unwrap_or("unknown"),
        "Relaying finished run"
    );

    let report = relay_event(
        &event,
        state.metadata.as_ref(),
        state.sink.as_ref(),
        &state.options,
    )
    .await;

    counter!("pipeline.records").increment(report.records_submitted as u64);
    counter!("pipeline.batches").increment(report.batches_submitted as u64);
    counter!("pipeline.batch_failures").increment(report.batch_failures() as u64);
    counter!("pipeline.fetch_failures").increment(report.fetch_failures() as u64);

    if !report.is_clean() {
        warn!(
            job_id = event.data.job_id,
            run_id = event.data.run_id,
            failures = report.failures.len(),
            "Run relayed with failures"
        );
    }

    Ok(Json(payload.into_json()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use dbt2datadog_core::{
        LogRecord, LogSink, MetadataItem, MetadataSource, PipelineOptions, ResourceKind,
        WebhookVerifier,
    };
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    #[derive(Default)]
    struct CountingSource {
        calls: Mutex<Vec<ResourceKind>>,
    }

    #[async_trait]
    impl MetadataSource for CountingSource {
        async fn fetch(
            &self,
            kind: ResourceKind,
            _job_id: u64,
            _run_id: u64,
        ) -> Result<Option<Vec<MetadataItem>>> {
            self.calls.lock().unwrap().push(kind);
            Ok(Some(vec![json!({"uniqueId": format!("{}.a", kind)})]))
        }
    }

    #[derive(Default)]
    struct MemorySink {
        batches: Mutex<Vec<Vec<LogRecord>>>,
    }

    #[async_trait]
    impl LogSink for MemorySink {
        async fn submit(&self, batch: &[LogRecord]) -> Result<()> {
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    fn state(source: Arc<CountingSource>, sink: Arc<MemorySink>, max_payload: usize) -> AppState {
        AppState {
            verifier: Arc::new(WebhookVerifier::new(SECRET)),
            metadata: source,
            sink,
            options: Arc::new(PipelineOptions::default()),
            max_payload_bytes: max_payload,
        }
    }

    fn signed_request(body: &str) -> Request<Body> {
        let signature = WebhookVerifier::new(SECRET).sign(body.as_bytes());
        Request::builder()
            .method("POST")
            .uri("/")
            .header("authorization", signature)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const FINISHED: &str = r#"{"webhookName":"hook","data":{"runStatus":"Success","jobId":"11","runId":"22","projectName":"P","environmentName":"E","jobName":"J","runReason":"R"}}"#;

    #[tokio::test]
    async fn test_finished_run_is_relayed_and_echoed() {
        let source = Arc::new(CountingSource::default());
        let sink = Arc::new(MemorySink::default());
        let app = router(state(source.clone(), sink.clone(), 1024 * 1024));

        let response = app.oneshot(signed_request(FINISHED)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let echoed = body_json(response).await;
        let expected: Value = serde_json::from_str(FINISHED).unwrap();
        assert_eq!(echoed, expected);

        assert_eq!(source.calls.lock().unwrap().len(), 4);
        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 4);
        assert_eq!(
            batches[0][0].tags,
            "project:P,environment:E,job:J,run:22,webhook:hook,run_reason:R,resource:models"
        );
    }

    #[tokio::test]
    async fn test_bad_signature_is_forbidden() {
        let source = Arc::new(CountingSource::default());
        let sink = Arc::new(MemorySink::default());
        let app = router(state(source.clone(), sink.clone(), 1024 * 1024));

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("authorization", "00ff")
            .body(Body::from(FINISHED))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await,
            json!({"detail": "Message not authenticated"})
        );
        assert!(source.calls.lock().unwrap().is_empty());
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_running_run_is_echoed_without_work() {
        let source = Arc::new(CountingSource::default());
        let sink = Arc::new(MemorySink::default());
        let app = router(state(source.clone(), sink.clone(), 1024 * 1024));

        let body = r#"{"data":{"runStatus":"Running"}}"#;
        let response = app.oneshot(signed_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"data": {"runStatus": "Running"}}));
        assert!(source.calls.lock().unwrap().is_empty());
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_payload() {
        let source = Arc::new(CountingSource::default());
        let sink = Arc::new(MemorySink::default());
        let app = router(state(source.clone(), sink, 16));

        let response = app.oneshot(signed_request(FINISHED)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.contains("limit 16 bytes"), "{}", detail);
        assert!(source.calls.lock().unwrap().is_empty());
    }

    fn running_with_padding(padding: usize) -> String {
        json!({"data": {"runStatus": "Running"}, "padding": "x".repeat(padding)}).to_string()
    }

    #[tokio::test]
    async fn test_configured_limit_above_axum_default() {
        let source = Arc::new(CountingSource::default());
        let sink = Arc::new(MemorySink::default());
        let app = router(state(source, sink, 10 * 1024 * 1024));

        let body = running_with_padding(3 * 1024 * 1024);
        let response = app.oneshot(signed_request(&body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let echoed = body_json(response).await;
        assert_eq!(echoed["padding"].as_str().unwrap().len(), 3 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_limit_is_inclusive() {
        let source = Arc::new(CountingSource::default());
        let sink = Arc::new(MemorySink::default());

        let body = running_with_padding(4096);
        let app = router(state(source.clone(), sink.clone(), body.len()));
        let response = app.oneshot(signed_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let app = router(state(source, sink, body.len() - 1));
        let response = app.oneshot(signed_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_missing_run_status_is_relayed() {
        let source = Arc::new(CountingSource::default());
        let sink = Arc::new(MemorySink::default());
        let app = router(state(source.clone(), sink.clone(), 1024 * 1024));

        let body = r#"{"webhookName":"hook","data":{"jobId":"11","runId":"22","projectName":"P","environmentName":"E","jobName":"J","runReason":"R"}}"#;
        let response = app.oneshot(signed_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            source.calls.lock().unwrap().clone(),
            ResourceKind::ALL.to_vec()
        );
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_authenticated_but_malformed() {
        let source = Arc::new(CountingSource::default());
        let sink = Arc::new(MemorySink::default());
        let app = router(state(source.clone(), sink, 1024 * 1024));

        let response = app
            .oneshot(signed_request(r#"{"data":{"runStatus":"Success"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let source = Arc::new(CountingSource::default());
        let sink = Arc::new(MemorySink::default());
        let app = router(state(source, sink, 1024));

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "healthy"}));

        let response = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Keeps the names of histograms recorded through it.
    #[derive(Default)]
    struct HistogramLog {
        names: Arc<Mutex<Vec<String>>>,
    }

    struct NamedHistogram {
        name: String,
        names: Arc<Mutex<Vec<String>>>,
    }

    impl metrics::HistogramFn for NamedHistogram {
        fn record(&self, _value: f64) {
            self.names.lock().unwrap().push(self.name.clone());
        }
    }

    impl metrics::Recorder for HistogramLog {
        fn describe_counter(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
        fn describe_gauge(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
        fn describe_histogram(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}

        fn register_counter(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Counter {
            metrics::Counter::noop()
        }

        fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
            metrics::Gauge::noop()
        }

        fn register_histogram(&self, key: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Histogram {
            metrics::Histogram::from_arc(Arc::new(NamedHistogram {
                name: key.name().to_string(),
                names: self.names.clone(),
            }))
        }
    }

    #[test]
    fn test_latency_recorded_for_every_outcome() {
        let recorder = HistogramLog::default();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let statuses = metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let mut statuses = Vec::new();
                let requests = [
                    (1024 * 1024, signed_request(FINISHED)),
                    (16, signed_request(FINISHED)),
                    (
                        1024 * 1024,
                        Request::builder()
                            .method("POST")
                            .uri("/")
                            .header("authorization", "00ff")
                            .body(Body::from(FINISHED))
                            .unwrap(),
                    ),
                    (1024 * 1024, signed_request("not json")),
                ];
                for (limit, request) in requests {
                    let app = router(state(
                        Arc::new(CountingSource::default()),
                        Arc::new(MemorySink::default()),
                        limit,
                    ));
                    statuses.push(app.oneshot(request).await.unwrap().status());
                }
                statuses
            })
        });

        assert_eq!(
            statuses,
            vec![
                StatusCode::OK,
                StatusCode::PAYLOAD_TOO_LARGE,
                StatusCode::FORBIDDEN,
                StatusCode::BAD_REQUEST,
            ]
        );
        let names = recorder.names.lock().unwrap();
        let latencies = names.iter().filter(|n| *n == "webhook.latency_ms").count();
        assert_eq!(latencies, 4);
    }
}
