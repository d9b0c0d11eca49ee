//! Request handlers

use super::{error::ApiError, AppState};
use crate::config::{PipelineConfig, ProcessRequest};
use crate::processor::PackshotProcessor;
use crate::services::TracingObserver;
use crate::tracing_config::spans;
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use instant::Instant;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, Instrument};

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "ok": true, "service": state.service_name }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /process`: multipart upload in, encoded packshot out
pub async fn process(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    check_api_key(state.api_key.as_deref(), &headers)?;

    let upload = read_upload(multipart).await?;
    let config = upload.request.apply(&state.base_config)?;
    let file = upload
        .file
        .ok_or_else(|| ApiError::bad_request("Missing file"))?;

    let request_id = uuid::Uuid::new_v4().to_string();
    let span = spans::request(&request_id, file.len());

    run_pipeline(state, config, file).instrument(span).await
}

async fn run_pipeline(
    state: AppState,
    config: PipelineConfig,
    file: Bytes,
) -> Result<Response, ApiError> {
    let start = Instant::now();
    let remover = state.session.get().await?;
    let processor =
        PackshotProcessor::new(config, remover)?.with_observer(Arc::new(TracingObserver));

    let result = tokio::task::spawn_blocking(move || processor.process_bytes(&file))
        .await
        .map_err(|e| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Processing task failed: {e}"),
            )
        })??;

    info!(
        width = result.dimensions.0,
        height = result.dimensions.1,
        bytes = result.encoded.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "processed upload"
    );

    let disposition = format!("inline; filename=\"{}\"", result.encoded.filename_hint());
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(result.encoded.media_type())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        result.into_bytes(),
    )
        .into_response())
}

/// Reject the request unless the configured key matches
fn check_api_key(expected: Option<&str>, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);

    match provided {
        Some(key) if key == expected => Ok(()),
        _ => Err(ApiError::unauthorized()),
    }
}

struct Upload {
    file: Option<Bytes>,
    request: ProcessRequest,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload {
        file: None,
        request: ProcessRequest::default(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;
            upload.file = Some(data);
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read field '{name}': {e}")))?;
            upload.request.set_field(&name, &value)?;
        }
    }

    Ok(upload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_check() {
        let mut headers = HeaderMap::new();
        assert!(check_api_key(None, &headers).is_ok());
        assert_eq!(
            check_api_key(Some("secret"), &headers).unwrap_err().status(),
            StatusCode::UNAUTHORIZED
        );

        headers.insert(API_KEY_HEADER, HeaderValue::from_static(" secret "));
        assert!(check_api_key(Some("secret"), &headers).is_ok());

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("other"));
        assert!(check_api_key(Some("secret"), &headers).is_err());
    }
}
