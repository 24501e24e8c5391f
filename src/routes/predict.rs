use crate::{
    classifier::ClassifierError,
    prediction::{classify, Prediction},
    server::SharedState,
};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("model or class data not loaded")]
    NotReady,
    #[error("multipart upload failed: {0}")]
    Upload(String),
    #[error("no `file` field in multipart upload")]
    MissingFile,
    #[error("classification failed: {0}")]
    Classification(#[from] ClassifierError),
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        match self {
            PredictError::NotReady => {
                tracing::warn!("Prediction requested while degraded: {}", self);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"error": "Service unavailable: model or class data not loaded."})),
                )
                    .into_response()
            }
            other => {
                // The caller gets a fixed opaque body; the detail only goes
                // to the logs.
                tracing::error!("Error during prediction processing: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Internal server error during prediction."})),
                )
                    .into_response()
            }
        }
    }
}

#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Prediction>, PredictError> {
    state.metrics.record_request("/predict");

    let (classifier, class_table) = match (&state.classifier, &state.class_table) {
        (Some(classifier), Some(class_table)) => (classifier, class_table),
        _ => return Err(PredictError::NotReady),
    };

    let mut image_data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PredictError::Upload(e.to_string()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| PredictError::Upload(e.to_string()))?;
            image_data = Some(bytes);
            break;
        }
    }
    let image_data = image_data.ok_or(PredictError::MissingFile)?;

    let started = Instant::now();
    let prediction = classify(classifier.as_ref(), class_table, &image_data)?;
    state
        .metrics
        .record_prediction_duration(started.elapsed().as_millis() as u64, "/predict");

    Ok(Json(prediction))
}
