//! HTTP surface: routes, multipart intake and the response envelope mapping.

use crate::config::Config;
use crate::converter::DocumentConverter;
use crate::error::ProcessingError;
use crate::llm::LanguageModel;
use crate::mapper::ReportMapper;
use crate::ocr::OcrProvider;
use crate::pipeline::{request_span, ProcessingResponse, ReportPipeline, Stage, Upload};
use crate::schema::ReportType;
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::HeaderValue,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Instrument};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pipeline: Arc<ReportPipeline>,
}

impl AppState {
    pub fn new(
        config: Config,
        ocr: Arc<dyn OcrProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let pipeline = ReportPipeline::new(
            DocumentConverter::new(ocr),
            ReportMapper::new(model),
            config.upload_dir.clone(),
        );
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/therapies", post(process_therapy_report))
        .route("/radiation", post(process_radiation_report))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for ProcessingError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ProcessingResponse::failure(&self))).into_response()
    }
}

/// A failed request, answered with the id its log lines carry.
#[derive(Debug)]
pub struct RequestFailure {
    pub request_id: Uuid,
    pub error: ProcessingError,
}

impl IntoResponse for RequestFailure {
    fn into_response(self) -> Response {
        with_request_id(self.error.into_response(), self.request_id)
    }
}

fn with_request_id(mut response: Response, request_id: Uuid) -> Response {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

// ============================================================================
// Handlers
// ============================================================================

/// Service information.
async fn root() -> Json<Value> {
    Json(json!({
        "message": "Medical Report Processing API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Process therapy and radiation PDF reports and extract structured data",
        "endpoints": {
            "health": "GET /health - Check API health status",
            "therapies": "POST /therapies - Process therapy PDF report (chemotherapy, biological, etc.)",
            "radiation": "POST /radiation - Process radiation therapy PDF report"
        }
    }))
}

/// Health check endpoint. Never calls out.
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "mistral_api_configured": state.config.api_key_configured(),
    }))
}

async fn process_therapy_report(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, RequestFailure> {
    process_report(&state, multipart, ReportType::Therapy).await
}

async fn process_radiation_report(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, RequestFailure> {
    process_report(&state, multipart, ReportType::Radiation).await
}

async fn process_report(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
    report_type: ReportType,
) -> Result<Response, RequestFailure> {
    let request_id = Uuid::new_v4();
    let span = request_span(request_id, report_type);

    let upload = async {
        match multipart {
            Ok(multipart) => read_upload(multipart).await,
            Err(e) => Err(ProcessingError::InvalidInput(format!(
                "Expected multipart upload: {}",
                e
            ))),
        }
    }
    .instrument(span.clone())
    .await
    .map_err(|err| {
        span.in_scope(|| {
            error!(
                failed_stage = %Stage::Validating,
                kind = err.kind(),
                "Error processing {} report: {}",
                report_type.label(),
                err
            )
        });
        RequestFailure {
            request_id,
            error: err,
        }
    })?;

    let report = state
        .pipeline
        .process(request_id, upload, report_type)
        .await
        .map_err(|error| RequestFailure { request_id, error })?;

    Ok(with_request_id(
        Json(ProcessingResponse::success(report)).into_response(),
        request_id,
    ))
}

/// Pull the `file` field out of a multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ProcessingError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProcessingError::InvalidInput(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ProcessingError::InvalidInput(format!("Failed to read file: {}", e)))?
            .to_vec();

        info!(
            "Received upload: {} ({} bytes)",
            filename.as_deref().unwrap_or("<unnamed>"),
            data.len()
        );
        return Ok(Upload {
            filename,
            content_type,
            data,
        });
    }

    Err(ProcessingError::InvalidInput("No file uploaded".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{radiation_json, therapy_json, MockModel, MockOcr, PDF_BYTES};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::path::Path;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-REPORT-BOUNDARY";

    fn app(ocr: Arc<MockOcr>, model: Arc<MockModel>, upload_dir: &Path) -> Router {
        let config = Config {
            mistral_api_key: Some("test-key".to_string()),
            upload_dir: Some(upload_dir.to_path_buf()),
            ..Config::default()
        };
        build_router(AppState::new(config, ocr, model))
    }

    fn multipart_request(uri: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    fn request_id(response: &Response) -> Uuid {
        let header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .expect("missing x-request-id header");
        header.to_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let ocr = MockOcr::with_text("unused");
        let model = MockModel::ok("{}");
        let app = app(ocr.clone(), model.clone(), dir.path());

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["mistral_api_configured"], true);
        assert_eq!(ocr.calls(), 0);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_root_lists_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(MockOcr::with_text(""), MockModel::ok("{}"), dir.path());

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let body = json_body(app.oneshot(req).await.unwrap()).await;
        assert!(body["endpoints"]["therapies"].as_str().unwrap().starts_with("POST /therapies"));
    }

    #[tokio::test]
    async fn test_therapy_report_success() {
        let dir = tempfile::tempdir().unwrap();
        let ocr = MockOcr::with_text("Patient PAT123 received Docetaxel 75 mg/m² IV on 2024-03-01");
        let model = MockModel::ok(therapy_json().to_string());
        let app = app(ocr.clone(), model, dir.path());

        let req = multipart_request("/therapies", "therapy.pdf", "application/pdf", PDF_BYTES);
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        request_id(&response);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["patient_id"], "PAT123");
        assert_eq!(
            body["message"],
            "Successfully processed therapy report: therapy.pdf"
        );
        assert!(body["processing_time"].is_number());
        assert_eq!(ocr.calls(), 1);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_radiation_missing_field_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut response_json = radiation_json();
        response_json.as_object_mut().unwrap().remove("fractions");
        let app = app(
            MockOcr::with_text("EBRT to the spine, 30 Gy"),
            MockModel::ok(response_json.to_string()),
            dir.path(),
        );

        let req = multipart_request("/radiation", "rad.pdf", "application/pdf", PDF_BYTES);
        let response = app.oneshot(req).await.unwrap();

        assert!(response.status().is_server_error());
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("fractions"));
        assert!(body["data"].is_null());
        assert!(body["processing_time"].is_null());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_non_pdf_upload_rejected_without_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let ocr = MockOcr::with_text("text");
        let app = app(ocr.clone(), MockModel::ok("{}"), dir.path());

        let req = multipart_request("/therapies", "notes.txt", "text/plain", b"hello world");
        let response = app.oneshot(req).await.unwrap();

        assert!(response.status().is_client_error());
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(ocr.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ocr = MockOcr::with_text("text");
        let model = MockModel::ok("{}");
        let app = app(ocr.clone(), model.clone(), dir.path());

        let req = multipart_request("/radiation", "empty.pdf", "application/pdf", b"");
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ocr.calls(), 0);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(MockOcr::with_text("text"), MockModel::ok("{}"), dir.path());

        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
        );
        let req = Request::builder()
            .method("POST")
            .uri("/therapies")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        request_id(&response);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Invalid input: No file uploaded");
    }

    #[tokio::test]
    async fn test_non_multipart_body_gets_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(MockOcr::with_text("text"), MockModel::ok("{}"), dir.path());

        let req = Request::builder()
            .method("POST")
            .uri("/therapies")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        request_id(&response);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_ocr_timeout_reports_ocr_failure() {
        let dir = tempfile::tempdir().unwrap();
        let model = MockModel::ok("{}");
        let app = app(
            MockOcr::failing("error sending request: operation timed out"),
            model.clone(),
            dir.path(),
        );

        let req = multipart_request("/therapies", "report.pdf", "application/pdf", PDF_BYTES);
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        request_id(&response);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().starts_with("OCR service error"));
        assert_eq!(model.calls(), 0);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_request_ids_are_unique_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(MockOcr::failing("boom"), MockModel::ok("{}"), dir.path());

        let first = app
            .clone()
            .oneshot(multipart_request("/therapies", "a.pdf", "application/pdf", PDF_BYTES))
            .await
            .unwrap();
        let second = app
            .oneshot(multipart_request("/therapies", "a.pdf", "application/pdf", PDF_BYTES))
            .await
            .unwrap();

        assert_ne!(request_id(&first), request_id(&second));
    }

    #[tokio::test]
    async fn test_json_in_prose_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let prose = format!(
            "Based on the report, here is the structured data:\n\n{}\n\nAll dates were normalised.",
            therapy_json()
        );
        let app = app(
            MockOcr::with_text("Patient PAT123"),
            MockModel::ok(prose),
            dir.path(),
        );

        let req = multipart_request("/therapies", "therapy.pdf", "application/pdf", PDF_BYTES);
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"], therapy_json());
    }
}
