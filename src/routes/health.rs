use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    model_loaded: bool,
    class_data_loaded: bool,
}

pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    let model_loaded = state.classifier.is_some();
    let class_data_loaded = state.class_table.is_some();
    let status = if model_loaded && class_data_loaded {
        "Available"
    } else {
        "Degraded"
    };

    Json(Status {
        status: status.into(),
        model_loaded,
        class_data_loaded,
    })
}
