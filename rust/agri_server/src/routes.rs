use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::multipart::{Field, Multipart, MultipartRejection},
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use common::http::{
    API_VERSION, CROP_PREDICT_PATH, DISEASE_PREDICT_PATH, HEALTH_PATH, INFO_PATH, NOT_AN_IMAGE,
    SERVICE_NAME, UPLOAD_FIELD,
};
use common::{
    CropRecRequest, CropRecResponse, ErrorResponse, HealthResponse, InfoResponse, RootResponse,
};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::AppError;
use crate::state::SharedState;
use crate::upload::ScopedUpload;

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse::default())
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

pub async fn info(State(state): State<SharedState>) -> Json<InfoResponse> {
    let memory_rss_mb = {
        let mut system = state.system.lock().await;
        sysinfo::get_current_pid()
            .ok()
            .and_then(|pid| {
                system.refresh_process(pid);
                system.process(pid).map(|p| p.memory() as f64 / 1024.0 / 1024.0)
            })
            .unwrap_or(0.0)
    };

    let cpu_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    Json(InfoResponse {
        service: SERVICE_NAME.to_string(),
        version: API_VERSION.to_string(),
        uptime_seconds: state.uptime_seconds(),
        crop_requests: state.crop_requests.load(Ordering::Relaxed),
        disease_requests: state.disease_requests.load(Ordering::Relaxed),
        failed_requests: state.failed_requests.load(Ordering::Relaxed),
        crop_model: state.model_paths.crop.clone(),
        disease_model: state.model_paths.disease.clone(),
        cpu_count,
        memory_rss_mb,
    })
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            detail: "Not Found".to_string(),
        }),
    )
}

pub async fn predict_crop(
    State(state): State<SharedState>,
    payload: Result<Json<CropRecRequest>, JsonRejection>,
) -> Result<Json<CropRecResponse>, AppError> {
    state.crop_requests.fetch_add(1, Ordering::Relaxed);

    let result = recommend_crop(&state, payload).await;
    if let Err(err) = &result {
        state.record_failure();
        warn!("Crop prediction failed: {}", err);
    }
    result.map(Json)
}

async fn recommend_crop(
    state: &SharedState,
    payload: Result<Json<CropRecRequest>, JsonRejection>,
) -> Result<CropRecResponse, AppError> {
    let Json(request) = payload?;
    let recommender = Arc::clone(&state.crop);
    let features = request.features;

    let crop = tokio::task::spawn_blocking(move || recommender.predict_crop(&features)).await??;

    Ok(CropRecResponse { crop })
}

pub async fn predict_disease(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    state.disease_requests.fetch_add(1, Ordering::Relaxed);

    let result = detect_disease(&state, multipart).await;
    if let Err(err) = &result {
        state.record_failure();
        warn!("Disease prediction failed: {}", err);
    }
    result.map(Json)
}

async fn detect_disease(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Value, AppError> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            return stage_and_predict(state, field).await;
        }
    }

    Err(AppError::BadRequest("Missing file field".to_string()))
}

async fn stage_and_predict(state: &SharedState, mut field: Field<'_>) -> Result<Value, AppError> {
    let is_image = field
        .content_type()
        .is_some_and(|content_type| content_type.starts_with("image/"));
    if !is_image {
        return Err(AppError::BadRequest(NOT_AN_IMAGE.to_string()));
    }

    // Dropping `upload` on any early return below removes the staged file.
    let (upload, mut file) = ScopedUpload::create(&state.upload_dir, field.file_name())?;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    let detector = Arc::clone(&state.disease);
    let prediction = tokio::task::spawn_blocking(move || {
        let outcome = detector.predict(upload.path());
        upload.release();
        outcome
    })
    .await??;

    Ok(prediction)
}

/// OpenAPI description served at `/docs`.
pub async fn docs() -> Json<Value> {
    let error = json!({
        "description": "Invalid input or inference failure",
        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ErrorResponse"}}}
    });

    Json(json!({
        "openapi": "3.0.3",
        "info": {
            "title": SERVICE_NAME,
            "description": "Unified API for crop recommendation and disease detection",
            "version": API_VERSION
        },
        "paths": {
            "/": {"get": {"summary": "API information", "responses": {"200": {"description": "Endpoint index"}}}},
            HEALTH_PATH: {"get": {"summary": "Health check", "responses": {"200": {"description": "Static health report"}}}},
            INFO_PATH: {"get": {"summary": "Runtime information", "responses": {"200": {"description": "Counters and resource usage"}}}},
            CROP_PREDICT_PATH: {"post": {
                "summary": "Recommend a crop from soil and weather readings",
                "requestBody": {"required": true, "content": {"application/json": {"schema": {"$ref": "#/components/schemas/CropRecRequest"}}}},
                "responses": {
                    "200": {"description": "Recommended crop", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/CropRecResponse"}}}},
                    "400": error.clone()
                }
            }},
            DISEASE_PREDICT_PATH: {"post": {
                "summary": "Detect plant disease from an image",
                "requestBody": {"required": true, "content": {"multipart/form-data": {"schema": {
                    "type": "object",
                    "required": [UPLOAD_FIELD],
                    "properties": {UPLOAD_FIELD: {"type": "string", "format": "binary"}}
                }}}},
                "responses": {
                    "200": {"description": "Model prediction"},
                    "400": error
                }
            }}
        },
        "components": {"schemas": {
            "CropRecRequest": {
                "type": "object",
                "required": ["features"],
                "properties": {"features": {
                    "type": "array",
                    "items": {"type": "number"},
                    "description": "[N, P, K, temperature, humidity, ph, rainfall]"
                }}
            },
            "CropRecResponse": {"type": "object", "required": ["crop"], "properties": {"crop": {"type": "string"}}},
            "ErrorResponse": {"type": "object", "required": ["detail"], "properties": {"detail": {"type": "string"}}}
        }}
    }))
}
