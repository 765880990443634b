use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Message returned to callers for every failed prediction.
pub const PREDICTION_FAILED: &str = "Prediction failed";

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to load model from {path:?}: {source}")]
    Session {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Failed to read image bytes: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("ONNX Runtime error: {0}")]
    Runtime(#[from] ort::Error),
    #[error("Session mutex poisoned: {0}")]
    Poisoned(String),
    #[error("Invalid tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Model produced no output named `{0}`")]
    MissingOutput(String),
    #[error("Model returned an empty output")]
    EmptyOutput,
    #[error("Inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "An error occurred during prediction");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                detail: PREDICTION_FAILED.to_string(),
            }),
        )
            .into_response()
    }
}
