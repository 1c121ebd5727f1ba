//! HTTP endpoints for event submission and pipeline administration
//!
//! Producers post events to `/events`. Operators inspect and replay the
//! overflow store and drive the consumer under `/admin`.

use ingestion_pipeline::{
    IngestionPipeline, PipelineError, RecoveryError, RecoveryOutcome, StartOutcome, StopOutcome,
    SubmitRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Upper bound on request bodies; payload limits are enforced by the pipeline
const MAX_BODY_BYTES: u64 = 1024 * 1024;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Error envelope shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

/// Failed request, rendered as an `ErrorResponse`
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
                details: self.details,
            },
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        reply(self.status, &body)
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        let message = error.to_string();
        match error {
            PipelineError::UnknownEventType(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "UNKNOWN_EVENT_TYPE", message)
            }
            PipelineError::PayloadTooLarge { size, max } => {
                ApiError::new(StatusCode::BAD_REQUEST, "PAYLOAD_TOO_LARGE", message)
                    .with_details(json!({ "size": size, "max": max }))
            }
            PipelineError::InvalidPayload(_)
            | PipelineError::InvalidEventId(_)
            | PipelineError::InvalidPriority(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
            }
            PipelineError::DuplicateEventId(event_id) => {
                ApiError::new(StatusCode::CONFLICT, "DUPLICATE_EVENT_ID", message)
                    .with_details(json!({ "event_id": event_id }))
            }
            PipelineError::AtCapacity { event_id } => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "AT_CAPACITY", message)
                    .with_details(json!({ "event_id": event_id }))
            }
            PipelineError::Store(e) if e.is_not_found() => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
            }
            PipelineError::Store(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", message)
            }
            PipelineError::Recovery(e) => ApiError::from(e),
            PipelineError::Config(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", message)
            }
            PipelineError::InvalidState(_) => {
                ApiError::new(StatusCode::CONFLICT, "INVALID_STATE", message)
            }
        }
    }
}

impl From<RecoveryError> for ApiError {
    fn from(error: RecoveryError) -> Self {
        let message = error.to_string();
        let retry_count = error.retry_count();
        match error {
            RecoveryError::NotFound(event_id) => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
                    .with_details(json!({ "event_id": event_id }))
            }
            RecoveryError::QueueFull { event_id, size, capacity, .. } => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "QUEUE_FULL", message).with_details(
                    json!({
                        "event_id": event_id,
                        "queue_size": size,
                        "queue_capacity": capacity,
                        "retry_count": retry_count,
                    }),
                )
            }
            RecoveryError::AlreadyQueued { event_id, .. } => {
                ApiError::new(StatusCode::CONFLICT, "ALREADY_QUEUED", message)
                    .with_details(json!({ "event_id": event_id, "retry_count": retry_count }))
            }
            RecoveryError::Corrupt { event_id, .. } => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "CORRUPT_RECORD", message)
                    .with_details(json!({ "event_id": event_id, "retry_count": retry_count }))
            }
            RecoveryError::Store(e) if e.is_not_found() => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
            }
            RecoveryError::Store(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", message)
            }
        }
    }
}

/// Overflow listing parameters
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub processed: Option<bool>,
    pub limit: Option<usize>,
}

/// Batch recovery parameters
#[derive(Debug, Deserialize)]
pub struct BatchParams {
    pub max_events: Option<usize>,
}

/// Retention cleanup parameters
#[derive(Debug, Deserialize)]
pub struct CleanupParams {
    pub older_than_days: u64,
}

fn reply<T: Serialize>(status: StatusCode, body: &T) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn ok<T: Serialize>(body: &T) -> Response {
    reply(StatusCode::OK, body)
}

fn with_pipeline(
    pipeline: Arc<IngestionPipeline>,
) -> impl Filter<Extract = (Arc<IngestionPipeline>,), Error = Infallible> + Clone {
    warp::any().map(move || pipeline.clone())
}

/// Build every route served by the ingestion service
pub fn create_routes(
    pipeline: Arc<IngestionPipeline>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    // Event submission
    let submit = warp::path("events")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_pipeline(pipeline.clone()))
        .and_then(submit_event);

    // Overflow statistics
    let overflow_stats = warp::path("admin")
        .and(warp::path("overflow"))
        .and(warp::path("stats"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_pipeline(pipeline.clone()))
        .and_then(get_overflow_stats);

    // Overflow listing
    let list_overflow = warp::path("admin")
        .and(warp::path("overflow"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<ListParams>())
        .and(with_pipeline(pipeline.clone()))
        .and_then(list_overflow_events);

    // Single overflow record
    let get_overflow = warp::path("admin")
        .and(warp::path("overflow"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_pipeline(pipeline.clone()))
        .and_then(get_overflow_event);

    // Batch recovery
    let process_batch = warp::path("admin")
        .and(warp::path("overflow"))
        .and(warp::path("process"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<BatchParams>())
        .and(with_pipeline(pipeline.clone()))
        .and_then(process_overflow_batch);

    // Single-record recovery
    let process_one = warp::path("admin")
        .and(warp::path("overflow"))
        .and(warp::path::param::<String>())
        .and(warp::path("process"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_pipeline(pipeline.clone()))
        .and_then(process_overflow_event);

    // Retention cleanup
    let cleanup = warp::path("admin")
        .and(warp::path("overflow"))
        .and(warp::path::end())
        .and(warp::delete())
        .and(warp::query::<CleanupParams>())
        .and(with_pipeline(pipeline.clone()))
        .and_then(cleanup_overflow);

    // Consumer lifecycle
    let start = warp::path("admin")
        .and(warp::path("processing"))
        .and(warp::path("start"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_pipeline(pipeline.clone()))
        .and_then(start_processing);

    let stop = warp::path("admin")
        .and(warp::path("processing"))
        .and(warp::path("stop"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_pipeline(pipeline.clone()))
        .and_then(stop_processing);

    let status = warp::path("admin")
        .and(warp::path("processing"))
        .and(warp::path("status"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_pipeline(pipeline.clone()))
        .map(|pipeline: Arc<IngestionPipeline>| ok(&pipeline.status()));

    let metrics = warp::path("admin")
        .and(warp::path("metrics"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_pipeline(pipeline.clone()))
        .map(|pipeline: Arc<IngestionPipeline>| ok(&pipeline.status().metrics));

    // Health check endpoint
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_pipeline(pipeline))
        .map(|pipeline: Arc<IngestionPipeline>| {
            ok(&json!({
                "status": "healthy",
                "processing": pipeline.processing_state().active,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }))
        });

    submit
        .or(overflow_stats)
        .or(list_overflow)
        .or(get_overflow)
        .or(process_batch)
        .or(process_one)
        .or(cleanup)
        .or(start)
        .or(stop)
        .or(status)
        .or(metrics)
        .or(health)
        .recover(handle_rejection)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_headers(vec!["content-type"])
                .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS"]),
        )
}

async fn submit_event(
    request: SubmitRequest,
    pipeline: Arc<IngestionPipeline>,
) -> Result<Response, Infallible> {
    match pipeline.submit(request).await {
        Ok(response) => Ok(reply(StatusCode::ACCEPTED, &response)),
        Err(e) => {
            let error = ApiError::from(e);
            let mut details = error.details.clone().unwrap_or_else(|| json!({}));
            if let Value::Object(map) = &mut details {
                map.insert("status".to_string(), json!("rejected"));
            }
            Ok(error.with_details(details).into_response())
        }
    }
}

async fn get_overflow_stats(pipeline: Arc<IngestionPipeline>) -> Result<Response, Infallible> {
    Ok(match pipeline.overflow_stats().await {
        Ok(stats) => ok(&stats),
        Err(e) => ApiError::from(e).into_response(),
    })
}

async fn list_overflow_events(
    params: ListParams,
    pipeline: Arc<IngestionPipeline>,
) -> Result<Response, Infallible> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);

    Ok(match pipeline.list_overflow(params.processed, limit).await {
        Ok(events) => ok(&json!({ "count": events.len(), "events": events })),
        Err(e) => ApiError::from(e).into_response(),
    })
}

async fn get_overflow_event(
    event_id: String,
    pipeline: Arc<IngestionPipeline>,
) -> Result<Response, Infallible> {
    Ok(match pipeline.get_overflow(&event_id).await {
        Ok(record) => ok(&record),
        Err(e) => ApiError::from(e).into_response(),
    })
}

async fn process_overflow_event(
    event_id: String,
    pipeline: Arc<IngestionPipeline>,
) -> Result<Response, Infallible> {
    Ok(match pipeline.process_overflow_event(&event_id).await {
        Ok(outcome) => {
            let message = match outcome {
                RecoveryOutcome::Requeued => "Event returned to the ingestion queue",
                RecoveryOutcome::AlreadyProcessed => "Event was already processed",
            };
            ok(&json!({ "event_id": event_id, "outcome": outcome, "message": message }))
        }
        Err(e) => ApiError::from(e).into_response(),
    })
}

async fn process_overflow_batch(
    params: BatchParams,
    pipeline: Arc<IngestionPipeline>,
) -> Result<Response, Infallible> {
    Ok(match pipeline.process_overflow_batch(params.max_events).await {
        Ok(report) => ok(&report),
        Err(e) => ApiError::from(e).into_response(),
    })
}

async fn cleanup_overflow(
    params: CleanupParams,
    pipeline: Arc<IngestionPipeline>,
) -> Result<Response, Infallible> {
    let Some(secs) = params.older_than_days.checked_mul(SECS_PER_DAY) else {
        return Ok(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            format!("older_than_days out of range: {}", params.older_than_days),
        )
        .into_response());
    };

    Ok(match pipeline.cleanup_overflow(Duration::from_secs(secs)).await {
        Ok(deleted) => ok(&json!({
            "deleted_count": deleted,
            "older_than_days": params.older_than_days
        })),
        Err(e) => ApiError::from(e).into_response(),
    })
}

async fn start_processing(pipeline: Arc<IngestionPipeline>) -> Result<Response, Infallible> {
    let body = match pipeline.start().await {
        StartOutcome::Started { start_time } => json!({
            "status": "started",
            "start_time": start_time.to_rfc3339()
        }),
        StartOutcome::AlreadyRunning => json!({
            "status": "already_running",
            "start_time": pipeline.processing_state().start_time.map(|t| t.to_rfc3339())
        }),
    };
    Ok(ok(&body))
}

async fn stop_processing(pipeline: Arc<IngestionPipeline>) -> Result<Response, Infallible> {
    let body = match pipeline.stop().await {
        StopOutcome::Stopped { graceful } => json!({ "status": "stopped", "graceful": graceful }),
        StopOutcome::AlreadyStopped => json!({ "status": "already_stopped" }),
    };
    Ok(ok(&body))
}

/// Render warp's own rejections with the shared error envelope
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let error = if err.is_not_found() {
        ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Route not found")
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        ApiError::new(StatusCode::BAD_REQUEST, "INVALID_BODY", e.to_string())
            .with_details(json!({ "status": "rejected" }))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        ApiError::new(StatusCode::BAD_REQUEST, "INVALID_QUERY", e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", "Request body too large")
            .with_details(json!({ "status": "rejected" }))
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        ApiError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "UNSUPPORTED_MEDIA_TYPE",
            "Expected application/json",
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED", "Method not allowed")
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal server error")
    };

    Ok(error.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion_pipeline::{LoggingEventHandler, PipelineConfig};
    use overflow_store::{InMemoryOverflowStore, OverflowStore};

    fn pipeline_with_capacity(capacity: usize) -> (Arc<IngestionPipeline>, Arc<InMemoryOverflowStore>) {
        let store = Arc::new(InMemoryOverflowStore::new());
        let config = PipelineConfig { queue_capacity: capacity, ..PipelineConfig::default() };
        let pipeline =
            IngestionPipeline::new(config, store.clone(), Arc::new(LoggingEventHandler)).unwrap();
        (Arc::new(pipeline), store)
    }

    fn body_json(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    async fn submit(
        pipeline: &Arc<IngestionPipeline>,
        event_id: &str,
        event_type: &str,
    ) -> warp::http::Response<warp::hyper::body::Bytes> {
        warp::test::request()
            .method("POST")
            .path("/events")
            .json(&json!({
                "event_id": event_id,
                "event_type": event_type,
                "payload": { "account": "acc-1" },
                "source_system": "tests"
            }))
            .reply(&create_routes(pipeline.clone()))
            .await
    }

    #[tokio::test]
    async fn test_submit_queues_event() {
        let (pipeline, _) = pipeline_with_capacity(10);
        let routes = create_routes(pipeline.clone());

        let response = submit(&pipeline, "evt-1", "fraud_detection").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = body_json(&response);
        assert_eq!(body["event_id"], "evt-1");
        assert_eq!(body["status"], "queued");
        assert_eq!(body["priority"], 1);
        assert_eq!(pipeline.queue().size(), 1);
    }

    #[tokio::test]
    async fn test_submit_unknown_type_is_rejected() {
        let (pipeline, _) = pipeline_with_capacity(10);
        let routes = create_routes(pipeline.clone());

        let response = submit(&pipeline, "evt-1", "weather_report").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(&response);
        assert_eq!(body["error"]["code"], "UNKNOWN_EVENT_TYPE");
        assert_eq!(body["error"]["details"]["status"], "rejected");
        assert!(body["timestamp"].is_string());
        assert!(pipeline.queue().is_empty());
    }

    #[tokio::test]
    async fn test_submit_malformed_body_is_rejected() {
        let (pipeline, _) = pipeline_with_capacity(10);
        let routes = create_routes(pipeline);

        let response = warp::test::request()
            .method("POST")
            .path("/events")
            .header("content-type", "application/json")
            .body("{\"event_type\": ")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&response)["error"]["code"], "INVALID_BODY");
    }

    #[tokio::test]
    async fn test_submit_duplicate_id_conflicts() {
        let (pipeline, _) = pipeline_with_capacity(10);
        let routes = create_routes(pipeline.clone());

        assert_eq!(submit(&pipeline, "evt-1", "alert").await.status(), StatusCode::ACCEPTED);

        let response = submit(&pipeline, "evt-1", "alert").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(&response)["error"]["code"], "DUPLICATE_EVENT_ID");
    }

    #[tokio::test]
    async fn test_full_queue_overflows_and_lists() {
        let (pipeline, _) = pipeline_with_capacity(1);
        let routes = create_routes(pipeline.clone());

        submit(&pipeline, "evt-1", "security_breach").await;
        let response = submit(&pipeline, "evt-2", "alert").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = body_json(&response);
        assert_eq!(body["status"], "queued_with_overflow");
        assert_eq!(body["overflow_stored"], true);

        let response = warp::test::request()
            .method("GET")
            .path("/admin/overflow?processed=false&limit=10")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(&response);
        assert_eq!(body["count"], 1);
        assert_eq!(body["events"][0]["event_id"], "evt-2");

        let response =
            warp::test::request().method("GET").path("/admin/overflow/evt-2").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(&response)["processed"], false);

        let response =
            warp::test::request().method("GET").path("/admin/overflow/stats").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(&response)["pending"], 1);
    }

    #[tokio::test]
    async fn test_unknown_overflow_id_is_not_found() {
        let (pipeline, _) = pipeline_with_capacity(10);
        let routes = create_routes(pipeline);

        let response =
            warp::test::request().method("GET").path("/admin/overflow/missing").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = warp::test::request()
            .method("POST")
            .path("/admin/overflow/missing/process")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(&response)["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_process_one_with_full_queue_is_unavailable() {
        let (pipeline, _) = pipeline_with_capacity(1);
        let routes = create_routes(pipeline.clone());

        submit(&pipeline, "evt-1", "security_breach").await;
        submit(&pipeline, "evt-2", "alert").await;

        let response = warp::test::request()
            .method("POST")
            .path("/admin/overflow/evt-2/process")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(&response);
        assert_eq!(body["error"]["code"], "QUEUE_FULL");
        assert_eq!(body["error"]["details"]["retry_count"], 1);
    }

    #[tokio::test]
    async fn test_process_one_and_batch_replay() {
        let (pipeline, store) = pipeline_with_capacity(1);
        let routes = create_routes(pipeline.clone());

        submit(&pipeline, "evt-1", "security_breach").await;
        submit(&pipeline, "evt-2", "alert").await;
        pipeline.queue().drain();

        let response = warp::test::request()
            .method("POST")
            .path("/admin/overflow/evt-2/process")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(&response)["outcome"], "requeued");
        assert!(store.get("evt-2").await.unwrap().unwrap().processed);

        let response = warp::test::request()
            .method("POST")
            .path("/admin/overflow/process?max_events=10")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(&response);
        assert_eq!(body["processed_count"], 0);
        assert_eq!(body["failed_count"], 0);
    }

    #[tokio::test]
    async fn test_cleanup_requires_age() {
        let (pipeline, _) = pipeline_with_capacity(10);
        let routes = create_routes(pipeline);

        let response =
            warp::test::request().method("DELETE").path("/admin/overflow").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = warp::test::request()
            .method("DELETE")
            .path("/admin/overflow?older_than_days=7")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(&response)["deleted_count"], 0);
    }

    #[tokio::test]
    async fn test_processing_lifecycle_routes() {
        let (pipeline, _) = pipeline_with_capacity(10);
        let routes = create_routes(pipeline.clone());

        let response = warp::test::request()
            .method("POST")
            .path("/admin/processing/start")
            .reply(&routes)
            .await;
        assert_eq!(body_json(&response)["status"], "started");

        let response = warp::test::request()
            .method("POST")
            .path("/admin/processing/start")
            .reply(&routes)
            .await;
        assert_eq!(body_json(&response)["status"], "already_running");

        let response = warp::test::request()
            .method("GET")
            .path("/admin/processing/status")
            .reply(&routes)
            .await;
        let body = body_json(&response);
        assert_eq!(body["processing"]["phase"], "running");
        assert_eq!(body["queue_capacity"], 10);

        let response =
            warp::test::request().method("POST").path("/admin/processing/stop").reply(&routes).await;
        assert_eq!(body_json(&response)["status"], "stopped");

        let response =
            warp::test::request().method("POST").path("/admin/processing/stop").reply(&routes).await;
        assert_eq!(body_json(&response)["status"], "already_stopped");
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let (pipeline, _) = pipeline_with_capacity(10);
        let routes = create_routes(pipeline.clone());

        submit(&pipeline, "evt-1", "alert").await;

        let response = warp::test::request().method("GET").path("/health").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(&response)["status"], "healthy");

        let response =
            warp::test::request().method("GET").path("/admin/metrics").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(&response);
        assert_eq!(body["events_submitted_total"], 1);
        assert_eq!(body["queue_depth"], 1);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (pipeline, _) = pipeline_with_capacity(10);
        let routes = create_routes(pipeline);

        let response = warp::test::request().method("GET").path("/nowhere").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(&response)["error"]["code"], "NOT_FOUND");
    }
}
