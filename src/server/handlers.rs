use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use super::AppState;
use super::payloads::{
    ComparisonSummary, DetectResponse, ErrorBody, ImageDimensions, JPEG_DATA_URI, RoutesResponse,
    SelectPayload, SelectResponse,
};
use crate::core::store::RouteStore;
use crate::detection::HoldDetector;
use crate::detection::preprocessing;
use crate::error::{ErrorKind, PipelineError};
use crate::models::SelectionRequest;
use crate::route::{RouteComparator, SelectionOutcome};

/// A pipeline error rendered as a `{success: false, ...}` JSON body.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PipelineError::InvalidInput(rejection.body_text()))
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::UpstreamDetection | ErrorKind::UpstreamComparison => StatusCode::BAD_GATEWAY,
        ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(kind = %kind, error = %self.0, "request failed");
        }
        let body = ErrorBody {
            success: false,
            error: self.0.to_string(),
            kind: kind.as_str(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Climbing Hold Detection API",
        "endpoints": {
            "/detect-holds": "POST - Upload an image to detect climbing holds",
            "/select/{submission_id}": "POST - Submit a route selection for duplicate checking",
            "/routes": "GET - List stored routes",
            "/routes/images/{filename}": "GET - Fetch a stored route image",
        }
    }))
}

pub async fn detect_holds<D, S, C>(
    State(state): State<Arc<AppState<D, S, C>>>,
    mut multipart: Multipart,
) -> ApiResult<Json<DetectResponse>>
where
    D: HoldDetector,
    S: RouteStore,
    C: RouteComparator,
{
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let is_image = field
            .content_type()
            .is_some_and(|content_type| content_type.starts_with("image/"));
        if !is_image {
            return Err(PipelineError::InvalidInput("File must be an image".to_string()).into());
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PipelineError::InvalidInput(format!("reading upload: {e}")))?;
        upload = Some(bytes);
        break;
    }
    let bytes = upload.ok_or_else(|| PipelineError::InvalidInput("missing multipart field `file`".to_string()))?;
    if bytes.is_empty() {
        return Err(PipelineError::InvalidInput("uploaded file is empty".to_string()).into());
    }

    let image = state
        .pool
        .run_blocking("decode", move || preprocessing::decode_image(&bytes))
        .await??;
    let result = state.detection.detect(image).await?;

    Ok(Json(DetectResponse {
        success: true,
        total_detections: result.detections.len(),
        image: STANDARD.encode(&result.resized_jpeg),
        image_format: JPEG_DATA_URI,
        image_dimensions: ImageDimensions {
            width: result.resized.width(),
            height: result.resized.height(),
            original_width: result.original_width,
            original_height: result.original_height,
        },
        detections: result.detections,
    }))
}

pub async fn select_holds<D, S, C>(
    State(state): State<Arc<AppState<D, S, C>>>,
    Path(submission_id): Path<String>,
    payload: Result<Json<SelectPayload>, JsonRejection>,
) -> ApiResult<Json<SelectResponse>>
where
    D: HoldDetector,
    S: RouteStore,
    C: RouteComparator,
{
    let Json(payload) = payload?;
    let bytes = payload.image_bytes()?;
    let ids = payload.hold_ids();
    let detections = payload.into_detections();

    let image = state
        .pool
        .run_blocking("decode", move || preprocessing::decode_image(&bytes))
        .await??;
    let request = SelectionRequest::new(ids, detections, image);
    let outcome = state.orchestrator.submit(&submission_id, request).await?;

    let response = match outcome {
        SelectionOutcome::Matched { route, explanation } => SelectResponse {
            success: true,
            is_match: true,
            matching_image_filename: Some(route.name),
            blue_image: None,
            red_image: None,
            blue_filename: None,
            red_filename: None,
            gemini_response: ComparisonSummary { explanation },
        },
        SelectionOutcome::Saved {
            route,
            accepted,
            comparison,
            comparison_name,
            explanation,
        } => SelectResponse {
            success: true,
            is_match: false,
            matching_image_filename: None,
            blue_image: Some(STANDARD.encode(&accepted.jpeg)),
            red_image: Some(STANDARD.encode(&comparison.jpeg)),
            blue_filename: Some(route.name),
            red_filename: Some(comparison_name),
            gemini_response: ComparisonSummary { explanation },
        },
    };
    Ok(Json(response))
}

pub async fn list_routes<D, S, C>(
    State(state): State<Arc<AppState<D, S, C>>>,
) -> ApiResult<Json<RoutesResponse>>
where
    D: HoldDetector,
    S: RouteStore,
    C: RouteComparator,
{
    let images = state.orchestrator.store().list_recent().await?;
    Ok(Json(RoutesResponse {
        success: true,
        count: images.len(),
        images,
    }))
}

pub async fn route_image<D, S, C>(
    State(state): State<Arc<AppState<D, S, C>>>,
    Path(filename): Path<String>,
) -> ApiResult<Response>
where
    D: HoldDetector,
    S: RouteStore,
    C: RouteComparator,
{
    let bytes = state.orchestrator.store().read(&filename).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}
