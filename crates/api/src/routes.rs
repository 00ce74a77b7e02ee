use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use detect::{
    AnalysisRequest, DetectorKind, DetectorSpec, InputModality, PATIENT_FIELDS, Pipeline,
    PipelineError, PipelineOutcome,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

use crate::metrics::{Metrics, MetricsSnapshot, RequestOutcome, TimedOperation};

/// Shared, read-only handler state. The pipeline is stateless, so no
/// per-request locking is needed.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            metrics: Metrics::new(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct DetectorInfo {
    detector: DetectorKind,
    modality: InputModality,
    labels: &'static [&'static str],
}

#[derive(Debug)]
pub enum ApiError {
    UnknownDetector(String),
    InvalidInput(String),
    Analysis(InputModality),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::UnknownDetector(message) => (StatusCode::NOT_FOUND, message),
            ApiError::InvalidInput(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Analysis(InputModality::Image) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Error analyzing image".to_string())
            }
            ApiError::Analysis(InputModality::Tabular) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Error analyzing data".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/api/detectors", get(list_detectors))
        .route("/api/analyze/:detector", post(analyze))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn list_detectors() -> Json<Vec<DetectorInfo>> {
    Json(
        DetectorSpec::all()
            .iter()
            .map(|spec| DetectorInfo {
                detector: spec.kind,
                modality: spec.input_modality(),
                labels: spec.label_set,
            })
            .collect(),
    )
}

async fn analyze(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PipelineOutcome>, ApiError> {
    let timer = TimedOperation::start();
    let span = info_span!("analyze", request_id = %Uuid::new_v4(), detector = %slug);

    let result = run_detector(&state.pipeline, &slug, body).instrument(span).await;

    let outcome = match &result {
        Ok(outcome) => RequestOutcome::Completed(outcome.quality),
        Err(ApiError::Analysis(_)) => RequestOutcome::Failed,
        Err(_) => RequestOutcome::Rejected,
    };
    state.metrics.record(outcome, timer.elapsed());

    result.map(Json)
}

async fn run_detector(
    pipeline: &Pipeline,
    slug: &str,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<PipelineOutcome, ApiError> {
    let kind: DetectorKind = slug
        .parse()
        .map_err(|e: detect::UnknownDetector| ApiError::UnknownDetector(e.to_string()))?;
    let Json(body) = body.map_err(|e| ApiError::InvalidInput(e.body_text()))?;

    let spec = DetectorSpec::get(kind);
    let request = parse_request(spec.input_modality(), &body)?;

    pipeline.run(kind, &request).await.map_err(|e| match e {
        PipelineError::InvalidInput(message) => ApiError::InvalidInput(message),
        PipelineError::Analysis(cause) => {
            error!(error = %cause, "Error analyzing request");
            ApiError::Analysis(spec.input_modality())
        }
    })
}

fn parse_request(modality: InputModality, body: &Value) -> Result<AnalysisRequest, ApiError> {
    match modality {
        InputModality::Image => body
            .get("imageUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.trim().is_empty())
            .map(AnalysisRequest::image)
            .ok_or_else(|| ApiError::InvalidInput("No image URL provided".to_string())),
        InputModality::Tabular => {
            let object = body.as_object().ok_or_else(|| {
                ApiError::InvalidInput("Request body must be a JSON object".to_string())
            })?;

            let mut fields = BTreeMap::new();
            for name in PATIENT_FIELDS {
                let value = match object.get(name) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => {
                        return Err(ApiError::InvalidInput(format!(
                            "Missing or invalid field: {}",
                            name
                        )))
                    }
                };
                fields.insert(name.to_string(), value);
            }
            Ok(AnalysisRequest::Tabular { fields })
        }
    }
}
