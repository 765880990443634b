use axum::{response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
}

pub async fn healthcheck() -> impl IntoResponse {
    tracing::info!("Root endpoint was accessed");
    Json(Status {
        status: "running".into(),
    })
}
